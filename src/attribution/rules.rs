//! Strategy name matching.
//!
//! Strategies expose no category on chain, so attribution keys off the
//! registered strategy name. Rules are checked in declaration order and
//! the first match wins; unmatched names fall through to the caller's
//! unknown handling.

/// How a rule matches a strategy name.
#[derive(Debug, Clone, Copy)]
pub enum NameMatcher {
    Exact(&'static str),
    Substring(&'static str),
    Prefix(&'static str),
    AnyOfExact(&'static [&'static str]),
    AnyOfSubstring(&'static [&'static str]),
}

impl NameMatcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Exact(expected) => name == *expected,
            NameMatcher::Substring(needle) => name.contains(needle),
            NameMatcher::Prefix(prefix) => name.starts_with(prefix),
            NameMatcher::AnyOfExact(expected) => expected.contains(&name),
            NameMatcher::AnyOfSubstring(needles) => needles.iter().any(|n| name.contains(n)),
        }
    }
}

/// The decode routine a matched rule dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRoutine {
    /// Want token staked through a voter proxy; pool exposure only.
    CurveVoterProxy,
    /// Stablecoin deposited into the 3pool through a meta vault; both
    /// vault and pool exposure.
    ThreePoolVault,
    /// Want token staked in governance.
    Governance,
    /// Collateralized debt position minting against a vault deposit.
    MakerDelegate,
    /// Funds spread across lending markets, enumerated live.
    LenderOptimiser,
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyRule {
    pub matcher: NameMatcher,
    pub routine: DecodeRoutine,
}

pub static RULES: &[StrategyRule] = &[
    StrategyRule {
        matcher: NameMatcher::AnyOfSubstring(&["VoterProxy", "StrategyGUSDRescue"]),
        routine: DecodeRoutine::CurveVoterProxy,
    },
    StrategyRule {
        matcher: NameMatcher::AnyOfExact(&[
            "StrategyTUSDypool",
            "StrategyUSDC3pool",
            "StrategyDAI3pool",
            "StrategyUSDT3pool",
        ]),
        routine: DecodeRoutine::ThreePoolVault,
    },
    StrategyRule {
        matcher: NameMatcher::Substring("StrategyYFIGovernance"),
        routine: DecodeRoutine::Governance,
    },
    StrategyRule {
        matcher: NameMatcher::Exact("StrategyMKRVaultDAIDelegate"),
        routine: DecodeRoutine::MakerDelegate,
    },
    StrategyRule {
        matcher: NameMatcher::Exact("StrategyLenderYieldOptimiser"),
        routine: DecodeRoutine::LenderOptimiser,
    },
];

pub fn match_rule(name: &str) -> Option<&'static StrategyRule> {
    RULES.iter().find(|rule| rule.matcher.matches(name))
}

/// The 3pool strategies report their pool share through different
/// accessors depending on the meta vault they route through.
pub fn three_pool_share_method(name: &str) -> &'static str {
    if name == "StrategyTUSDypool" {
        "balanceOfYYCRV"
    } else {
        "balanceOfy3CRV"
    }
}

/// Maps a raw lending market identifier (e.g. "aave-v2", "ib-usdc") to
/// its display protocol name. Unrecognized identifiers pass through
/// unchanged so new markets stay visible instead of vanishing.
pub fn normalize_lender_name(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("aave") {
        "Aave".to_string()
    } else if lowered.contains("dydx") {
        "DyDx".to_string()
    } else if lowered.contains("alphahomo") {
        "Alpha Homora".to_string()
    } else if lowered.contains("cream") {
        "Cream".to_string()
    } else if lowered.contains("ironbank") || lowered.contains("ib") {
        "Iron Bank".to_string()
    } else {
        raw.to_string()
    }
}
