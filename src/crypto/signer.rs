use ed25519_dalek::{Keypair, Signature as DalekSignature, Signer as _, Verifier as _};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

/// Opaque, base64-encoded signature. Kept as a newtype so call sites never
/// have to reach for the underlying curve library directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub String);

/// Capability interface consumed by any component that emits signed
/// records: the Immutable Log writer, the Parliament (per-vote signatures),
/// and the Playbook Executor (signed outcomes). The signing key is supplied
/// by the secrets-vault collaborator at startup and never leaves process
/// memory once loaded.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Signature;
    fn verify(&self, message: &[u8], signature: &Signature) -> bool;
    fn key_id(&self) -> &str;
}

/// Concrete Ed25519 signer. Keys are generated in-process for a fresh
/// identity or provided by the caller (e.g. loaded from the secrets
/// provider).
pub struct Ed25519Signer {
    keypair: Keypair,
    key_id: String,
}

impl Ed25519Signer {
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut csprng = OsRng {};
        Self {
            keypair: Keypair::generate(&mut csprng),
            key_id: key_id.into(),
        }
    }

    pub fn from_bytes(key_id: impl Into<String>, bytes: &[u8]) -> Result<Self, String> {
        let keypair = Keypair::from_bytes(bytes).map_err(|e| e.to_string())?;
        Ok(Self {
            keypair,
            key_id: key_id.into(),
        })
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.keypair.sign(message);
        Signature(base64::encode(sig.to_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(bytes) = base64::decode(&signature.0) else {
            return false;
        };
        let Ok(sig) = DalekSignature::from_bytes(&bytes) else {
            return false;
        };
        self.keypair.public.verify(message, &sig).is_ok()
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = Ed25519Signer::generate("test-key");
        let sig = signer.sign(b"hello");
        assert!(signer.verify(b"hello", &sig));
        assert!(!signer.verify(b"tampered", &sig));
    }
}
