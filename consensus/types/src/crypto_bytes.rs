//! Byte-level stand-ins for BLS public keys and signatures.
//!
//! The real pairing-based cryptography is injected via `bls::BlsVerifier` (see §6 / §4.F.5 of the
//! design) and is out of scope for this crate. These wrapper types only carry the canonical
//! compressed byte encodings so that SSZ/tree-hash of containers that reference them (validators,
//! deposits, blocks) is well-defined, matching the shape of lighthouse's `bls::PublicKeyBytes` /
//! `bls::SignatureBytes`.

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use std::fmt;
use tree_hash::TreeHash;

macro_rules! impl_fixed_bytes {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub fn zero() -> Self {
                Self([0; $len])
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(&self.0[..]))
            }
        }

        impl Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0);
            }
        }

        impl Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                if bytes.len() != $len {
                    return Err(DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $len,
                    });
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> tree_hash::TreeHashType {
                tree_hash::TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            fn tree_hash_packing_factor() -> usize {
                1
            }

            fn tree_hash_root(&self) -> Vec<u8> {
                tree_hash::merkle_root(&self.0, 0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&format!("0x{}", hex::encode(&self.0[..])))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                let stripped = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(stripped).map_err(SerdeError::custom)?;
                Self::from_ssz_bytes(&bytes).map_err(|e| SerdeError::custom(format!("{:?}", e)))
            }
        }
    };
}

impl_fixed_bytes!(PublicKeyBytes, 48);
impl_fixed_bytes!(SignatureBytes, 96);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_ssz() {
        let mut bytes = [0u8; 48];
        bytes[0] = 7;
        let key = PublicKeyBytes(bytes);
        let encoded = key.as_ssz_bytes();
        let decoded = PublicKeyBytes::from_ssz_bytes(&encoded).unwrap();
        assert_eq!(key, decoded);
    }
}
