//! A minimal variable-length bitfield used for `Attestation::aggregation_bits`.
//!
//! Lighthouse proper uses `ssz_types::BitList<N>`, a compile-time-bounded bitfield with a custom
//! SSZ/tree-hash encoding (length-delimited by a sentinel high bit). This crate favours plain
//! runtime-checked collections over compile-time list bounds (see DESIGN.md), so `Bitfield` is a
//! thin `Vec<bool>` with the same semantics: each bit marks whether a committee member
//! participated.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use tree_hash::TreeHash;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield(Vec<bool>);

impl Bitfield {
    pub fn with_capacity(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<bool> {
        self.0.get(i).copied()
    }

    pub fn set(&mut self, i: usize, value: bool) {
        if i >= self.0.len() {
            self.0.resize(i + 1, false);
        }
        self.0[i] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }

    pub fn num_set_bits(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self(bits)
    }
}

impl Encode for Bitfield {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn ssz_bytes_len(&self) -> usize {
        (self.0.len() + 7) / 8
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        let mut bytes = vec![0u8; self.ssz_bytes_len()];
        for (i, bit) in self.0.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        buf.extend_from_slice(&bytes);
    }
}

impl Decode for Bitfield {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut bits = Vec::with_capacity(bytes.len() * 8);
        for byte in bytes {
            for i in 0..8 {
                bits.push(byte & (1 << i) != 0);
            }
        }
        Ok(Self(bits))
    }
}

impl TreeHash for Bitfield {
    fn tree_hash_type() -> tree_hash::TreeHashType {
        tree_hash::TreeHashType::List
    }

    fn tree_hash_packed_encoding(&self) -> Vec<u8> {
        unreachable!("Bitfield is not a basic type")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("Bitfield is not a basic type")
    }

    fn tree_hash_root(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.0.len() + 7) / 8];
        for (i, bit) in self.0.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        let chunk_root = tree_hash::merkle_root(&bytes, 0);
        tree_hash::mix_in_length(&chunk_root, self.0.len())
    }
}

impl Serialize for Bitfield {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut bytes = vec![0u8; self.ssz_bytes_len()];
        for (i, bit) in self.0.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }
}

impl<'de> Deserialize<'de> for Bitfield {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(d)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(stripped).map_err(Error::custom)?;
        Self::from_ssz_bytes(&bytes).map_err(|e| Error::custom(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut b = Bitfield::with_capacity(4);
        b.set(1, true);
        b.set(3, true);
        assert_eq!(b.get(0), Some(false));
        assert_eq!(b.get(1), Some(true));
        assert_eq!(b.get(2), Some(false));
        assert_eq!(b.get(3), Some(true));
        assert_eq!(b.num_set_bits(), 2);
    }

    #[test]
    fn ssz_round_trip() {
        let mut b = Bitfield::with_capacity(10);
        b.set(0, true);
        b.set(9, true);
        let encoded = b.as_ssz_bytes();
        let decoded = Bitfield::from_ssz_bytes(&encoded).unwrap();
        assert!(decoded.get(0).unwrap());
        assert!(decoded.get(9).unwrap());
    }
}
