//! Failure taxonomy.
//!
//! `TransportError` covers both chain and metadata-service reads and is
//! always recovered at the smallest enclosing item: a coin read stops a
//! pool's coin enumeration, a strategy accessor zeroes that strategy, a
//! vault-level read zeroes that vault. Nothing is fatal to a run.
//! Classifier table overlaps are a load-time validation failure
//! (`anyhow` at startup), and recursion-depth caps degrade to a
//! zero-value leaf inside the resolver.

/// A chain or metadata transport failure. Decode failures are reported
/// the same way since callers recover identically.
#[derive(Debug, Clone)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}
