use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{HashType, PublicKey};
use crate::{config::ZXL_ADDRESS_PREFIX, error::AddressError};

/// Address format configured for the VM
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum AddrType {
    /// `hex(hash(pk))`
    #[default]
    #[strum(serialize = "CHAINMAKER")]
    #[serde(rename = "CHAINMAKER")]
    ChainMaker,
    /// `"ZX" + hex(hash(pk))`
    #[strum(serialize = "ZXL")]
    #[serde(rename = "ZXL")]
    Zxl,
}

/// Derive the account address of a public key.
pub fn public_key_to_address(
    public_key: &PublicKey,
    addr_type: AddrType,
    hash_type: HashType,
) -> Result<String, AddressError> {
    if public_key.is_empty() {
        return Err(AddressError::EmptyPublicKey);
    }

    let digest = hex::encode(hash_type.hash(public_key.as_bytes()));
    Ok(match addr_type {
        AddrType::ChainMaker => digest,
        AddrType::Zxl => format!("{}{}", ZXL_ADDRESS_PREFIX, digest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zxl_address_has_prefix() {
        let pk = PublicKey::new(vec![1, 2, 3]);
        let cm = public_key_to_address(&pk, AddrType::ChainMaker, HashType::Sha256).unwrap();
        let zx = public_key_to_address(&pk, AddrType::Zxl, HashType::Sha256).unwrap();
        assert_eq!(cm.len(), 64);
        assert_eq!(zx, format!("ZX{}", cm));
    }

    #[test]
    fn test_empty_public_key_rejected() {
        let pk = PublicKey::new(Vec::new());
        assert_eq!(
            public_key_to_address(&pk, AddrType::Zxl, HashType::Sha256),
            Err(AddressError::EmptyPublicKey)
        );
    }
}
