//! Ed25519 account signer

use crate::error::{ClientError, ClientResult};
use crate::extrinsic::{Call, SignedCall};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use etrid_core::AccountId;

/// Signing identity for extrinsics and off-chain channel states
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    /// Fresh random keypair
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Seed as 64 hex digits, optionally `0x`-prefixed
    pub fn from_hex(seed: &str) -> ClientResult<Self> {
        let digits = seed.trim().strip_prefix("0x").unwrap_or(seed.trim());
        let bytes = hex::decode(digits).map_err(|e| ClientError::Signing(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClientError::Signing("seed must be 32 bytes".to_string()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// `0x` + hex public key
    pub fn address(&self) -> AccountId {
        format!("0x{}", hex::encode(self.public_key()))
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }

    /// Sign the canonical `(call, nonce)` payload
    pub fn sign_call(&self, call: Call, nonce: u64) -> ClientResult<SignedCall> {
        let payload = signing_payload(&call, nonce)?;
        let signature = hex::encode(self.sign(&payload));
        Ok(SignedCall {
            call,
            signer: self.address(),
            nonce,
            signature,
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address())
            .finish()
    }
}

/// Bytes covered by an extrinsic signature
pub fn signing_payload(call: &Call, nonce: u64) -> ClientResult<Vec<u8>> {
    Ok(serde_json::to_vec(&(call, nonce))?)
}

/// Verify `signature` over `message` against a `0x`-hex address
pub fn verify(address: &str, message: &[u8], signature: &[u8; 64]) -> bool {
    let Some(digits) = address.strip_prefix("0x") else {
        return false;
    };
    let Ok(bytes) = hex::decode(digits) else {
        return false;
    };
    let Ok(bytes) = <[u8; 32]>::try_from(bytes) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&bytes) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature)).is_ok()
}

/// Verify a signed call against its embedded signer
pub fn verify_call(xt: &SignedCall) -> bool {
    let Ok(payload) = signing_payload(&xt.call, xt.nonce) else {
        return false;
    };
    let Ok(sig) = hex::decode(&xt.signature) else {
        return false;
    };
    let Ok(sig) = <[u8; 64]>::try_from(sig) else {
        return false;
    };
    verify(&xt.signer, &payload, &sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deterministic_address() {
        let a = Signer::from_seed([7u8; 32]);
        let b = Signer::from_hex(&format!("0x{}", hex::encode([7u8; 32]))).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.address().len(), 66);
    }

    #[test]
    fn test_sign_and_verify_call() {
        let signer = Signer::generate();
        let call = Call::new("lightningBloc", "closeChannel").arg(json!("ch-1"));
        let xt = signer.sign_call(call, 4).unwrap();
        assert!(verify_call(&xt));

        let mut tampered = xt.clone();
        tampered.nonce = 5;
        assert!(!verify_call(&tampered));
    }

    #[test]
    fn test_invalid_seed() {
        assert!(Signer::from_hex("0x1234").is_err());
        assert!(Signer::from_hex("not hex").is_err());
    }
}
