use ic_api_types::{AccountAddress, ContractAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an ink! message selector.
pub const SELECTOR_LEN: usize = 4;

/// Gas bound attached to every contract call.
pub const DEFAULT_GAS_LIMIT: GasLimit = GasLimit {
    ref_time: 1_000_000_000,
    proof_size: 131_072,
};

const SIGNING_DOMAIN_TAG: &[u8] = b"ink-counter:call:v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("counter payload too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),
    #[error("unknown selector 0x{0}")]
    UnknownSelector(String),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("envelope field of {0} bytes exceeds the u32 length prefix")]
    FieldTooLong(usize),
}

/// Logical operations exposed by the counter contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSelector {
    Get,
    Increment,
    Decrement,
    /// The `default()` constructor.
    Default,
}

impl CallSelector {
    pub const ALL: [CallSelector; 4] = [
        CallSelector::Get,
        CallSelector::Increment,
        CallSelector::Decrement,
        CallSelector::Default,
    ];

    pub const fn bytes(self) -> [u8; SELECTOR_LEN] {
        match self {
            CallSelector::Get => [0x2f, 0x86, 0x5b, 0xd9],
            CallSelector::Increment => [0x12, 0xbd, 0x51, 0xd3],
            CallSelector::Decrement => [0x41, 0x51, 0xff, 0xe0],
            CallSelector::Default => [0xed, 0x4b, 0x9d, 0x1b],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::ALL
            .into_iter()
            .find(|op| bytes.len() >= SELECTOR_LEN && op.bytes() == bytes[..SELECTOR_LEN])
            .ok_or_else(|| DecodeError::UnknownSelector(to_hex(&bytes[..bytes.len().min(SELECTOR_LEN)])))
    }

    /// Messages that change contract storage and therefore need a signed submission.
    pub fn is_mutating(self) -> bool {
        matches!(self, CallSelector::Increment | CallSelector::Decrement)
    }

    pub fn name(self) -> &'static str {
        match self {
            CallSelector::Get => "get",
            CallSelector::Increment => "increment",
            CallSelector::Decrement => "decrement",
            CallSelector::Default => "default",
        }
    }
}

/// Encodes the input data for `op`. None of the counter messages take
/// arguments, so the payload is the bare selector.
pub fn encode_call(op: CallSelector) -> Vec<u8> {
    op.bytes().to_vec()
}

pub fn decode_counter(bytes: &[u8]) -> Result<i32, DecodeError> {
    let Some(head) = bytes.first_chunk::<4>() else {
        return Err(DecodeError::TooShort(bytes.len()));
    };
    Ok(i32::from_le_bytes(*head))
}

pub fn encode_counter(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasLimit {
    pub ref_time: u64,
    pub proof_size: u64,
}

/// A call against a deployed contract, in the shape the node expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub dest: ContractAddress,
    pub value: u128,
    pub gas_limit: GasLimit,
    pub storage_deposit_limit: Option<u128>,
    pub input: Vec<u8>,
}

impl ContractCall {
    pub fn new(dest: ContractAddress, op: CallSelector) -> Self {
        Self {
            dest,
            value: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
            storage_deposit_limit: None,
            input: encode_call(op),
        }
    }

    pub fn selector(&self) -> Result<CallSelector, DecodeError> {
        CallSelector::from_bytes(&self.input)
    }

    /// Canonical bytes a signing capability signs for this call.
    pub fn signing_payload(&self) -> Vec<u8> {
        let dest = self.dest.0.as_bytes();
        let mut out = Vec::with_capacity(SIGNING_DOMAIN_TAG.len() + dest.len() + self.input.len() + 64);
        out.extend_from_slice(SIGNING_DOMAIN_TAG);
        put_prefixed(&mut out, dest);
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.ref_time.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.proof_size.to_le_bytes());
        match self.storage_deposit_limit {
            Some(limit) => {
                out.push(1);
                out.extend_from_slice(&limit.to_le_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.input);
        out
    }
}

/// A contract call together with the signature authorizing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCall {
    pub call: ContractCall,
    pub signer: AccountAddress,
    pub signature: Vec<u8>,
}

impl SignedCall {
    /// Envelope submitted to the node: signing payload, signer, signature.
    pub fn envelope(&self) -> Result<Vec<u8>, DecodeError> {
        let payload = self.call.signing_payload();
        let mut out = Vec::with_capacity(payload.len() + self.signer.0.len() + self.signature.len() + 12);
        put_prefixed(&mut out, &payload)?;
        put_prefixed(&mut out, self.signer.0.as_bytes())?;
        put_prefixed(&mut out, &self.signature)?;
        Ok(out)
    }
}

fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), DecodeError> {
    out.extend_from_slice(&length_prefix(bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(())
}

// Fields are prefixed with their length as a LE u32.
fn length_prefix(len: usize) -> Result<[u8; 4], DecodeError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| DecodeError::FieldTooLong(len))
}

pub fn to_hex(input: &[u8]) -> String {
    hex::encode(input)
}

/// Hex with the `0x` prefix the node RPC uses.
pub fn to_prefixed_hex(input: &[u8]) -> String {
    format!("0x{}", to_hex(input))
}

pub fn from_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    let raw = input.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(raw).map_err(|_| DecodeError::InvalidHex(input.to_owned()))
}
