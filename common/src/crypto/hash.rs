use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use std::fmt::{Display, Error, Formatter};
use strum::{Display as StrumDisplay, EnumString};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

/// Hash algorithm configured for a chain
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, StrumDisplay, EnumString,
)]
pub enum HashType {
    #[default]
    #[strum(serialize = "SHA256")]
    #[serde(rename = "SHA256")]
    Sha256,
    #[strum(serialize = "SHA3_256")]
    #[serde(rename = "SHA3_256")]
    Sha3_256,
    #[strum(serialize = "BLAKE3")]
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl HashType {
    pub fn hash(&self, data: &[u8]) -> [u8; HASH_SIZE] {
        match self {
            HashType::Sha256 => Sha256::digest(data).into(),
            HashType::Sha3_256 => Sha3_256::digest(data).into(),
            HashType::Blake3 => blake3::hash(data).into(),
        }
    }
}

/// Raw public key bytes of a member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.to_hex())
    }
}
