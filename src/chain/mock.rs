//! Scripted [`ChainReader`] for tests: exact responses keyed by
//! contract address, method name and rendered arguments, plus forced
//! transport failures per method or per address.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CallArg, CallValue, ChainReader, Interface, TransportError};
use crate::models::norm_addr;

#[derive(Default)]
pub struct MockChainReader {
    responses: RwLock<HashMap<String, CallValue>>,
    failing_methods: RwLock<HashSet<String>>,
    failing_addresses: RwLock<HashSet<String>>,
    pub calls: AtomicUsize,
}

fn render_args(args: &[CallArg]) -> String {
    args.iter()
        .map(|a| match a {
            CallArg::Uint(v) => v.to_string(),
            CallArg::Address(a) => norm_addr(a),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn key(address: &str, method: &str, args: &[CallArg]) -> String {
    format!("{}|{}|{}", norm_addr(address), method, render_args(args))
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, address: &str, method: &str, args: &[CallArg], value: CallValue) {
        self.responses
            .write()
            .insert(key(address, method, args), value);
    }

    pub fn stub_uint(&self, address: &str, method: &str, args: &[CallArg], value: u128) {
        self.stub(
            address,
            method,
            args,
            CallValue::Uint(num_bigint::BigUint::from(value)),
        );
    }

    pub fn stub_address(&self, address: &str, method: &str, args: &[CallArg], value: &str) {
        self.stub(
            address,
            method,
            args,
            CallValue::Address(norm_addr(value)),
        );
    }

    pub fn stub_text(&self, address: &str, method: &str, value: &str) {
        self.stub(address, method, &[], CallValue::Text(value.to_string()));
    }

    /// Every call to `method` on `address` fails with a transport error.
    pub fn fail_method(&self, address: &str, method: &str) {
        self.failing_methods
            .write()
            .insert(format!("{}|{}", norm_addr(address), method));
    }

    /// Every call to `address` fails with a transport error.
    pub fn fail_address(&self, address: &str) {
        self.failing_addresses.write().insert(norm_addr(address));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ChainReader for MockChainReader {
    async fn call(
        &self,
        address: &str,
        _interface: &'static Interface,
        method: &str,
        args: &[CallArg],
    ) -> Result<CallValue, TransportError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.failing_addresses.read().contains(&norm_addr(address)) {
            return Err(TransportError::new(format!("forced failure for {address}")));
        }
        if self
            .failing_methods
            .read()
            .contains(&format!("{}|{}", norm_addr(address), method))
        {
            return Err(TransportError::new(format!(
                "forced failure for {address}.{method}"
            )));
        }

        self.responses
            .read()
            .get(&key(address, method, args))
            .cloned()
            .ok_or_else(|| {
                TransportError::new(format!(
                    "no scripted response for {}.{}({})",
                    norm_addr(address),
                    method,
                    render_args(args)
                ))
            })
    }
}
