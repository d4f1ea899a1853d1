//! JSON-RPC 2.0 envelopes and the node result shapes this crate reads.

use ic_chain_client::{NodeCapabilities, TransportError};
use serde::Deserialize;
use serde_json::Value;

use crate::CONTRACTS_CALL;

/// Bit 0 of the ink! return flags marks a reverted execution.
const FLAG_REVERT: u64 = 1;

#[derive(Debug)]
pub(crate) enum RpcFailure {
    Transport(TransportError),
    Rpc { code: i64, message: String },
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcResponse {
    pub(crate) fn id_matches(&self, id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(id),
            Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    pub(crate) fn into_result(self) -> Result<Value, RpcFailure> {
        if let Some(err) = self.error {
            return Err(RpcFailure::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ExecOutcome {
    Ok { reverted: bool, data: String },
    Err(String),
}

/// Reads `rpc_methods` output: `{ "methods": [..] }`.
pub(crate) fn capabilities(result: &Value) -> NodeCapabilities {
    let contracts_enabled = result
        .get("methods")
        .and_then(Value::as_array)
        .is_some_and(|methods| methods.iter().any(|m| m.as_str() == Some(CONTRACTS_CALL)));

    NodeCapabilities { contracts_enabled }
}

/// Reads a `ContractExecResult`: `{ "result": { "Ok": { flags, data } } }`
/// or `{ "result": { "Err": .. } }`.
pub(crate) fn exec_outcome(value: &Value) -> Result<ExecOutcome, String> {
    let result = value
        .get("result")
        .ok_or_else(|| "contract result missing".to_owned())?;

    if let Some(ok) = result.get("Ok").or_else(|| result.get("ok")) {
        let data = ok
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| "contract result has no data".to_owned())?;
        return Ok(ExecOutcome::Ok {
            reverted: flag_bits(ok.get("flags")) & FLAG_REVERT != 0,
            data: data.to_owned(),
        });
    }

    if let Some(err) = result.get("Err").or_else(|| result.get("err")) {
        return Ok(ExecOutcome::Err(err.to_string()));
    }

    Err("unrecognized contract result".to_owned())
}

// Older nodes encode flags as `{ "bits": n }`.
fn flag_bits(flags: Option<&Value>) -> u64 {
    match flags {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::Object(obj)) => obj.get("bits").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    }
}
