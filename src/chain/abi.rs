//! Static interface descriptors for every contract shape the resolver
//! and the attribution engine read. Selectors are precomputed 4-byte
//! constants; the transport never derives them at runtime.

/// Argument kinds we encode. Everything in this system is a read with
/// at most one index or address argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Uint,
    Address,
}

/// Return shapes we decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Uint,
    Address,
    Text,
    /// Dynamic array of per-market lender statuses (name, assets).
    LenderStatuses,
}

#[derive(Debug)]
pub struct MethodSpec {
    pub name: &'static str,
    pub selector: [u8; 4],
    pub args: &'static [ArgKind],
    pub returns: ReturnShape,
}

#[derive(Debug)]
pub struct Interface {
    pub name: &'static str,
    pub methods: &'static [MethodSpec],
}

impl Interface {
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

pub static ERC20: Interface = Interface {
    name: "erc20",
    methods: &[
        MethodSpec {
            name: "symbol",
            selector: [0x95, 0xd8, 0x9b, 0x41],
            args: &[],
            returns: ReturnShape::Text,
        },
        MethodSpec {
            name: "decimals",
            selector: [0x31, 0x3c, 0xe5, 0x67],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalSupply",
            selector: [0x18, 0x16, 0x0d, 0xdd],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOf",
            selector: [0x70, 0xa0, 0x82, 0x31],
            args: &[ArgKind::Address],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Legacy vault shape: `getPricePerFullShare` at fixed 18 decimals.
pub static VAULT_V1: Interface = Interface {
    name: "vault_v1",
    methods: &[
        MethodSpec {
            name: "token",
            selector: [0xfc, 0x0c, 0x54, 0x6a],
            args: &[],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "getPricePerFullShare",
            selector: [0x77, 0xc7, 0xb8, 0xfc],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalSupply",
            selector: [0x18, 0x16, 0x0d, 0xdd],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOf",
            selector: [0x70, 0xa0, 0x82, 0x31],
            args: &[ArgKind::Address],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Current vault shape: `pricePerShare` at the vault's own decimals.
pub static VAULT_V2: Interface = Interface {
    name: "vault_v2",
    methods: &[
        MethodSpec {
            name: "token",
            selector: [0xfc, 0x0c, 0x54, 0x6a],
            args: &[],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "pricePerShare",
            selector: [0x99, 0x53, 0x0b, 0x06],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalSupply",
            selector: [0x18, 0x16, 0x0d, 0xdd],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOf",
            selector: [0x70, 0xa0, 0x82, 0x31],
            args: &[ArgKind::Address],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Generic pool accessor shape: `coins(uint256)` / `balances(uint256)`.
pub static CURVE_POOL: Interface = Interface {
    name: "curve_pool",
    methods: &[
        MethodSpec {
            name: "coins",
            selector: [0xc6, 0x61, 0x06, 0x57],
            args: &[ArgKind::Uint],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "balances",
            selector: [0x49, 0x03, 0xb0, 0xd1],
            args: &[ArgKind::Uint],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Alternate three-coin accessor shape (`int128` indices), used by the
/// 3Crv/musd3CRV generation of pools.
pub static CURVE_POOL_3: Interface = Interface {
    name: "curve_pool_3",
    methods: &[
        MethodSpec {
            name: "coins",
            selector: [0x23, 0x74, 0x6e, 0xb8],
            args: &[ArgKind::Uint],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "balances",
            selector: [0x06, 0x5a, 0x80, 0xd8],
            args: &[ArgKind::Uint],
            returns: ReturnShape::Uint,
        },
    ],
};

/// cToken-style lending receipt.
pub static LENDING_TOKEN: Interface = Interface {
    name: "lending_token",
    methods: &[
        MethodSpec {
            name: "underlying",
            selector: [0x6f, 0x30, 0x7d, 0xc3],
            args: &[],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "getCash",
            selector: [0x3b, 0x1d, 0x21, 0xa2],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalBorrows",
            selector: [0x47, 0xbd, 0x37, 0x18],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalReserves",
            selector: [0x8f, 0x84, 0x0d, 0xdd],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "totalSupply",
            selector: [0x18, 0x16, 0x0d, 0xdd],
            args: &[],
            returns: ReturnShape::Uint,
        },
    ],
};

/// iEarn-style aggregator share.
pub static AGGREGATOR_TOKEN: Interface = Interface {
    name: "aggregator_token",
    methods: &[
        MethodSpec {
            name: "token",
            selector: [0xfc, 0x0c, 0x54, 0x6a],
            args: &[],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "getPricePerFullShare",
            selector: [0x77, 0xc7, 0xb8, 0xfc],
            args: &[],
            returns: ReturnShape::Uint,
        },
    ],
};

/// aToken-style interest-bearing token.
pub static INTEREST_BEARING_TOKEN: Interface = Interface {
    name: "interest_bearing_token",
    methods: &[MethodSpec {
        name: "underlyingAssetAddress",
        selector: [0x89, 0xd1, 0xa0, 0xfc],
        args: &[],
        returns: ReturnShape::Address,
    }],
};

/// Common strategy surface: the want token and the nominal balance
/// accessors the attribution rules dispatch over.
pub static STRATEGY: Interface = Interface {
    name: "strategy",
    methods: &[
        MethodSpec {
            name: "want",
            selector: [0x1f, 0x1f, 0xcd, 0x51],
            args: &[],
            returns: ReturnShape::Address,
        },
        MethodSpec {
            name: "balanceOf",
            selector: [0x72, 0x27, 0x13, 0xf7],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOfy3CRV",
            selector: [0x5c, 0x15, 0x48, 0xfb],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOfYYCRV",
            selector: [0x63, 0x79, 0x0d, 0xbd],
            args: &[],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Maker collateral/debt delegate strategy.
pub static MAKER_STRATEGY: Interface = Interface {
    name: "maker_strategy",
    methods: &[
        MethodSpec {
            name: "getTotalDebtAmount",
            selector: [0x4c, 0x0b, 0x67, 0xa1],
            args: &[],
            returns: ReturnShape::Uint,
        },
        MethodSpec {
            name: "balanceOfmVault",
            selector: [0x9a, 0xa7, 0xdf, 0x94],
            args: &[],
            returns: ReturnShape::Uint,
        },
    ],
};

/// Lender-optimizer strategy exposing per-market statuses.
pub static LENDER_OPTIMISER: Interface = Interface {
    name: "lender_optimiser",
    methods: &[
        MethodSpec {
            name: "lendStatuses",
            selector: [0x04, 0xbd, 0x4e, 0x29],
            args: &[],
            returns: ReturnShape::LenderStatuses,
        },
        MethodSpec {
            name: "lentTotalAssets",
            selector: [0x35, 0xa3, 0xa4, 0xee],
            args: &[],
            returns: ReturnShape::Uint,
        },
    ],
};
