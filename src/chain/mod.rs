//! Read-only contract call transport.
//!
//! The rest of the system speaks to the chain through the [`ChainReader`]
//! trait: an address, an interface descriptor, a method name and
//! arguments in, a decoded value or a [`TransportError`] out. No state
//! mutation, no gas.

pub mod abi;
pub mod rpc;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use num_bigint::BigUint;

pub use abi::Interface;
pub use crate::errors::TransportError;

/// Call arguments. Reads in this system take at most a single index or
/// address argument.
#[derive(Debug, Clone)]
pub enum CallArg {
    Uint(u64),
    Address(String),
}

/// One reported market from a lender-optimizer strategy.
#[derive(Debug, Clone)]
pub struct LenderStatus {
    pub name: String,
    pub assets: BigUint,
}

/// Decoded return value of a read.
#[derive(Debug, Clone)]
pub enum CallValue {
    Uint(BigUint),
    Address(String),
    Text(String),
    LenderStatuses(Vec<LenderStatus>),
}

impl CallValue {
    pub fn into_uint(self) -> Result<BigUint, TransportError> {
        match self {
            CallValue::Uint(v) => Ok(v),
            other => Err(TransportError::new(format!(
                "expected uint return, got {:?}",
                other
            ))),
        }
    }

    pub fn into_address(self) -> Result<String, TransportError> {
        match self {
            CallValue::Address(v) => Ok(v),
            other => Err(TransportError::new(format!(
                "expected address return, got {:?}",
                other
            ))),
        }
    }

    pub fn into_text(self) -> Result<String, TransportError> {
        match self {
            CallValue::Text(v) => Ok(v),
            other => Err(TransportError::new(format!(
                "expected string return, got {:?}",
                other
            ))),
        }
    }

    pub fn into_lender_statuses(self) -> Result<Vec<LenderStatus>, TransportError> {
        match self {
            CallValue::LenderStatuses(v) => Ok(v),
            other => Err(TransportError::new(format!(
                "expected lender statuses, got {:?}",
                other
            ))),
        }
    }
}

/// Executes read-only contract calls.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(
        &self,
        address: &str,
        interface: &'static Interface,
        method: &str,
        args: &[CallArg],
    ) -> Result<CallValue, TransportError>;
}
