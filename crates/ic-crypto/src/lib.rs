use anyhow::{Result, anyhow};
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use ic_api_types::{AccountAddress, SignPurpose};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

const DOMAIN_PREFIX: &[u8] = b"ink-counter:v1:";

pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8], purpose: SignPurpose) -> Result<Vec<u8>>;
}

pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn new_random() -> Self {
        let mut rng = OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    pub fn from_secret_key_bytes(secret_key: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret_key),
        }
    }

    /// Builds a signer from a 32-byte hex seed (with or without `0x`).
    /// The decoded seed buffer is scrubbed before returning.
    pub fn from_seed_hex(seed: &str) -> Result<Self> {
        let raw = seed.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);

        let mut secret_key = [0_u8; 32];
        if let Err(err) = hex::decode_to_slice(raw, &mut secret_key) {
            secret_key.zeroize();
            return Err(anyhow!("signer seed must be 32 bytes of hex: {err}"));
        }

        let signer = Self::from_secret_key_bytes(secret_key);
        secret_key.zeroize();
        Ok(signer)
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn address(&self) -> AccountAddress {
        address_from_public_key(&self.public_key_bytes())
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, payload: &[u8], purpose: SignPurpose) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(anyhow!("payload cannot be empty"));
        }

        let signature: Signature = self.signing_key.sign(&signing_input(payload, purpose));
        Ok(signature.to_bytes().to_vec())
    }
}

pub fn address_from_public_key(public_key: &[u8; 32]) -> AccountAddress {
    let digest = Sha256::digest(public_key);
    AccountAddress(format!("0x{}", hex::encode(&digest[..20])))
}

pub fn verify(public_key: &[u8; 32], payload: &[u8], purpose: SignPurpose, signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|err| anyhow!("invalid public key: {err}"))?;
    let signature = Signature::from_slice(signature).map_err(|err| anyhow!("invalid signature: {err}"))?;
    key.verify(&signing_input(payload, purpose), &signature)
        .map_err(|err| anyhow!("signature mismatch: {err}"))
}

fn signing_input(payload: &[u8], purpose: SignPurpose) -> Vec<u8> {
    let purpose_tag = match purpose {
        SignPurpose::Transaction => "transaction",
        SignPurpose::Auth => "auth",
    };

    let mut input = Vec::with_capacity(DOMAIN_PREFIX.len() + purpose_tag.len() + 1 + payload.len());
    input.extend_from_slice(DOMAIN_PREFIX);
    input.extend_from_slice(purpose_tag.as_bytes());
    input.extend_from_slice(b":");
    input.extend_from_slice(payload);
    input
}
