use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

use super::{HashType, PublicKey};
use crate::{
    error::SignerError,
    transaction::{Member, MemberType},
};

/// Signing material of the local node, used to endorse synthesized
/// transactions.
pub trait SigningIdentity: Send + Sync {
    /// Member describing this identity inside a transaction
    fn member(&self) -> Member;

    /// Sign `data` after hashing it with `hash_type`
    fn sign(&self, data: &[u8], hash_type: HashType) -> Result<Vec<u8>, SignerError>;
}

/// Ed25519 identity whose member is carried as a raw public key.
pub struct Ed25519Identity {
    org_id: String,
    key: SigningKey,
}

impl Ed25519Identity {
    pub fn generate(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret(org_id: impl Into<String>, secret: &[u8]) -> Result<Self, SignerError> {
        let bytes: [u8; SECRET_KEY_LENGTH] = secret
            .try_into()
            .map_err(|_| SignerError::InvalidKey(format!("expected {} bytes, got {}", SECRET_KEY_LENGTH, secret.len())))?;

        Ok(Self {
            org_id: org_id.into(),
            key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.key.verifying_key().to_bytes().to_vec())
    }
}

impl SigningIdentity for Ed25519Identity {
    fn member(&self) -> Member {
        Member {
            org_id: self.org_id.clone(),
            member_type: MemberType::PublicKey,
            member_info: self.public_key().as_bytes().to_vec(),
        }
    }

    fn sign(&self, data: &[u8], hash_type: HashType) -> Result<Vec<u8>, SignerError> {
        let digest = hash_type.hash(data);
        Ok(self.key.sign(&digest).to_bytes().to_vec())
    }
}
