//! JSON-RPC `eth_call` implementation of [`ChainReader`].

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::abi::{ArgKind, Interface, ReturnShape};
use super::{CallArg, CallValue, ChainReader, LenderStatus, TransportError};

pub struct JsonRpcChainReader {
    client: Client,
    rpc_url: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

impl JsonRpcChainReader {
    pub fn new(rpc_url: String) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("yieldscope/0.1")
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, rpc_url })
    }

    fn encode_calldata(
        selector: [u8; 4],
        arg_kinds: &[ArgKind],
        args: &[CallArg],
    ) -> Result<String, TransportError> {
        if arg_kinds.len() != args.len() {
            return Err(TransportError::new(format!(
                "expected {} args, got {}",
                arg_kinds.len(),
                args.len()
            )));
        }

        let mut data = hex::encode(selector);
        for (kind, arg) in arg_kinds.iter().zip(args) {
            match (kind, arg) {
                (ArgKind::Uint, CallArg::Uint(v)) => {
                    data.push_str(&format!("{v:064x}"));
                }
                (ArgKind::Address, CallArg::Address(addr)) => {
                    let bare = addr.trim_start_matches("0x");
                    if bare.len() != 40 || !bare.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(TransportError::new(format!("bad address arg: {addr}")));
                    }
                    data.push_str(&"0".repeat(24));
                    data.push_str(&bare.to_ascii_lowercase());
                }
                (kind, arg) => {
                    return Err(TransportError::new(format!(
                        "arg mismatch: expected {kind:?}, got {arg:?}"
                    )));
                }
            }
        }
        Ok(format!("0x{data}"))
    }

    fn decode(shape: ReturnShape, bytes: &[u8]) -> Result<CallValue, TransportError> {
        match shape {
            ReturnShape::Uint => Ok(CallValue::Uint(BigUint::from_bytes_be(word(bytes, 0)?))),
            ReturnShape::Address => Ok(CallValue::Address(decode_address(word(bytes, 0)?))),
            ReturnShape::Text => Ok(CallValue::Text(decode_string(bytes, 0)?)),
            ReturnShape::LenderStatuses => decode_lender_statuses(bytes),
        }
    }
}

#[async_trait::async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn call(
        &self,
        address: &str,
        interface: &'static Interface,
        method: &str,
        args: &[CallArg],
    ) -> Result<CallValue, TransportError> {
        let spec = interface.method(method).ok_or_else(|| {
            TransportError::new(format!("{} has no method {method}", interface.name))
        })?;

        let calldata = Self::encode_calldata(spec.selector, spec.args, args)?;

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{ "to": address, "data": calldata }, "latest"],
            "id": 1
        });

        let response: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("RPC request failed: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::new(format!("failed to parse RPC response: {e}")))?;

        if let Some(err) = response.error {
            return Err(TransportError::new(format!("RPC error: {err:?}")));
        }

        let result = response
            .result
            .ok_or_else(|| TransportError::new("no result in RPC response"))?;

        let bytes = hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| TransportError::new(format!("failed to decode hex response: {e}")))?;

        debug!(
            contract = %address,
            method = %method,
            returned = bytes.len(),
            "eth_call completed"
        );

        Self::decode(spec.returns, &bytes)
    }
}

fn word(bytes: &[u8], index: usize) -> Result<&[u8], TransportError> {
    let start = index * 32;
    bytes
        .get(start..start + 32)
        .ok_or_else(|| TransportError::new(format!("return data too short for word {index}")))
}

fn word_usize(bytes: &[u8], index: usize) -> Result<usize, TransportError> {
    let w = word(bytes, index)?;
    BigUint::from_bytes_be(w)
        .to_usize()
        .ok_or_else(|| TransportError::new("offset word out of range"))
}

fn decode_address(w: &[u8]) -> String {
    format!("0x{}", hex::encode(&w[12..32]))
}

/// ABI `string` at head word `index`: offset word, then length word,
/// then utf8 bytes.
fn decode_string(bytes: &[u8], index: usize) -> Result<String, TransportError> {
    let offset = word_usize(bytes, index)?;
    let len = BigUint::from_bytes_be(
        bytes
            .get(offset..offset + 32)
            .ok_or_else(|| TransportError::new("string length out of bounds"))?,
    )
    .to_usize()
    .ok_or_else(|| TransportError::new("string length out of range"))?;

    let data = bytes
        .get(offset + 32..offset + 32 + len)
        .ok_or_else(|| TransportError::new("string data out of bounds"))?;

    String::from_utf8(data.to_vec())
        .map(|s| s.trim_end_matches('\0').to_string())
        .map_err(|e| TransportError::new(format!("string not utf8: {e}")))
}

/// `lendStatuses()` returns a dynamic array of structs whose first two
/// fields are `(string name, uint256 assets)`; trailing fields are
/// ignored. Layout: head offset -> array length -> per-element offsets
/// (relative to the array data start) -> element tuples.
fn decode_lender_statuses(bytes: &[u8]) -> Result<CallValue, TransportError> {
    let array_off = word_usize(bytes, 0)?;
    let data = bytes
        .get(array_off..)
        .ok_or_else(|| TransportError::new("status array out of bounds"))?;
    let len = word_usize(data, 0)?;
    if len > 64 {
        return Err(TransportError::new(format!(
            "implausible status count: {len}"
        )));
    }

    let elements = data
        .get(32..)
        .ok_or_else(|| TransportError::new("status array truncated"))?;

    let mut statuses = Vec::with_capacity(len);
    for i in 0..len {
        let elem_off = word_usize(elements, i)?;
        let elem = elements
            .get(elem_off..)
            .ok_or_else(|| TransportError::new("status element out of bounds"))?;
        let name = decode_string(elem, 0)?;
        let assets = BigUint::from_bytes_be(word(elem, 1)?);
        statuses.push(LenderStatus { name, assets });
    }

    Ok(CallValue::LenderStatuses(statuses))
}
