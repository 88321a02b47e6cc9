//! Kademlia keys, the XOR metric and key generation.

use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default key length in bytes (160 bits).
pub const DEFAULT_KEY_LENGTH: usize = 20;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Fixed length identifier of a node or a lookup target.
///
/// All keys of one deployment share the same length, see [KeyFactory].
pub struct Key(Bytes);

impl Key {
    pub(crate) fn new(bytes: impl Into<Bytes>) -> Self {
        Key(bytes.into())
    }

    // === Getters ===

    /// Length of this key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for a zero length key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of bits in this key.
    pub fn bit_length(&self) -> usize {
        self.0.len() * 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if every bit of this key is 0.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    // === Public Methods ===

    /// Bitwise XOR with another key of the same length.
    pub fn xor(&self, other: &Key) -> Result<Key> {
        if self.len() != other.len() {
            return Err(Error::InvalidKeyLength {
                expected: self.len(),
                found: other.len(),
            });
        }

        let bytes: Vec<u8> = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        Ok(Key(bytes.into()))
    }

    /// Position of the most significant set bit, counting from the least
    /// significant bit of the last byte.
    ///
    /// Returns `None` for the all zero key.
    pub fn first_set_bit_index(&self) -> Option<usize> {
        let len = self.len();

        self.0.iter().enumerate().find_map(|(i, byte)| {
            if *byte == 0 {
                return None;
            }

            let bit = 7 - byte.leading_zeros() as usize;

            Some((len - i - 1) * 8 + bit)
        })
    }

    /// The unsigned big endian integer value of this key modulo `nr_colors`.
    ///
    /// Returns 0 if `nr_colors` is 0.
    pub fn color(&self, nr_colors: u32) -> u32 {
        if nr_colors == 0 {
            return 0;
        }

        let modulus = nr_colors as u64;

        self.0
            .iter()
            .fold(0_u64, |acc, byte| (acc * 256 + *byte as u64) % modulus) as u32
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Parse a hex encoded key of any length.
    pub fn from_hex(hex: &str) -> Result<Key> {
        if hex.len() % 2 != 0 {
            return Err(Error::InvalidKey(format!("odd hex length {}", hex.len())));
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| {
                hex.get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| Error::InvalidKey(hex.to_string()))
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Key(bytes.into()))
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Key> {
        Key::from_hex(s)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Creates keys of one fixed length.
pub struct KeyFactory {
    key_length: usize,
}

impl Default for KeyFactory {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_LENGTH)
    }
}

impl KeyFactory {
    pub fn new(key_length: usize) -> Self {
        Self { key_length }
    }

    // === Getters ===

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        self.key_length
    }

    // === Public Methods ===

    /// The all zero key.
    pub fn zero(&self) -> Key {
        Key(vec![0; self.key_length].into())
    }

    pub fn random(&self) -> Key {
        self.random_with(&mut rand::thread_rng())
    }

    /// Random key drawn from the given rng, useful for reproducible networks.
    pub fn random_with<R: RngCore + ?Sized>(&self, rng: &mut R) -> Key {
        let mut bytes = vec![0; self.key_length];
        rng.fill_bytes(&mut bytes);

        Key(bytes.into())
    }

    /// Random key whose most significant set bit is `pow2_max`, that is
    /// a key in the range `[2^pow2_max, 2^(pow2_max + 1))`.
    ///
    /// `pow2_max` is clamped to the last bit of the key.
    pub fn generate(&self, pow2_max: usize) -> Key {
        if self.key_length == 0 {
            return self.zero();
        }

        let pow2_max = pow2_max.min(self.key_length * 8 - 1);
        let mut bytes = vec![0; self.key_length];
        let top = self.key_length - 1 - pow2_max / 8;
        let bit = pow2_max % 8;

        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut bytes[top..]);

        let mask = ((1_u16 << bit) - 1) as u8;
        bytes[top] = (bytes[top] & mask) | (1 << bit);

        Key(bytes.into())
    }

    /// Create a key from raw bytes, rejecting the wrong length.
    pub fn from_bytes<T: AsRef<[u8]>>(&self, bytes: T) -> Result<Key> {
        let bytes = bytes.as_ref();
        if bytes.len() != self.key_length {
            return Err(Error::InvalidKeyLength {
                expected: self.key_length,
                found: bytes.len(),
            });
        }

        Ok(Key(Bytes::copy_from_slice(bytes)))
    }

    /// Parse a hex encoded key, rejecting the wrong length.
    pub fn from_hex(&self, hex: &str) -> Result<Key> {
        let key = Key::from_hex(hex)?;

        self.from_bytes(key.as_bytes())
    }

    /// Deterministic key for a list of topics.
    ///
    /// The SHA-1 digest of the joined topics is repeated or truncated to the key length.
    pub fn create<S: AsRef<str>>(&self, topics: &[S]) -> Key {
        let mut hasher = sha1_smol::Sha1::new();
        for topic in topics {
            hasher.update(topic.as_ref().as_bytes());
            hasher.update(b"/");
        }
        let digest = hasher.digest().bytes();

        let bytes: Vec<u8> = digest
            .iter()
            .cycle()
            .take(self.key_length)
            .copied()
            .collect();

        Key(bytes.into())
    }

    /// Random key that lands in bucket `index` of a routing table owned by `local`.
    pub fn random_in_bucket(&self, local: &Key, index: usize) -> Result<Key> {
        self.generate(index).xor(local)
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn xor_with_self_is_zero() {
        let factory = KeyFactory::default();

        for _ in 0..20 {
            let key = factory.random();
            let xor = key.xor(&key).unwrap();

            assert!(xor.is_zero());
            assert_eq!(xor.first_set_bit_index(), None);
        }
    }

    #[test]
    fn xor_length_mismatch() {
        let a = KeyFactory::new(2).random();
        let b = KeyFactory::new(3).random();

        assert!(matches!(
            a.xor(&b),
            Err(Error::InvalidKeyLength {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn first_set_bit_index() {
        assert_eq!(Key::new(vec![0, 1]).first_set_bit_index(), Some(0));
        assert_eq!(Key::new(vec![0, 0x80]).first_set_bit_index(), Some(7));
        assert_eq!(Key::new(vec![1, 0]).first_set_bit_index(), Some(8));
        assert_eq!(Key::new(vec![0x80, 0xff]).first_set_bit_index(), Some(15));
        assert_eq!(Key::new(vec![0, 0]).first_set_bit_index(), None);
    }

    #[test]
    fn generate_lands_on_requested_bit() {
        let factory = KeyFactory::new(4);

        for index in 0..32 {
            let key = factory.generate(index);
            assert_eq!(key.first_set_bit_index(), Some(index));
        }
    }

    #[test]
    fn random_in_bucket() {
        let factory = KeyFactory::new(3);
        let local = factory.random();

        for index in 0..24 {
            let key = factory.random_in_bucket(&local, index).unwrap();
            let distance = key.xor(&local).unwrap();

            assert_eq!(distance.first_set_bit_index(), Some(index));
        }
    }

    #[test]
    fn color_is_integer_value_modulo() {
        let key = Key::new(vec![0x01, 0x00]);
        assert_eq!(key.color(10), 256 % 10);

        let key = Key::new(vec![0xff, 0xff, 0xff]);
        assert_eq!(key.color(7), 0xffffff % 7);

        assert_eq!(key.color(0), 0);
    }

    #[test]
    fn hex_round_trip() {
        let factory = KeyFactory::default();
        let key = factory.random();

        let parsed: Key = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);

        assert!(factory.from_hex("abcd").is_err());
        assert!(Key::from_hex("zz").is_err());
        assert!(Key::from_hex("abc").is_err());
    }

    #[test]
    fn from_bytes_validates_length() {
        let factory = KeyFactory::new(2);

        assert!(factory.from_bytes([1, 2]).is_ok());
        assert!(factory.from_bytes([1, 2, 3]).is_err());
    }

    #[test]
    fn create_from_topics() {
        let factory = KeyFactory::new(32);

        let a = factory.create(&["music", "jazz"]);
        let b = factory.create(&["music", "jazz"]);
        let c = factory.create(&["music", "rock"]);

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert_eq!(KeyFactory::new(4).create(&["music"]).len(), 4);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let factory = KeyFactory::new(8);

        let a = factory.random_with(&mut StdRng::seed_from_u64(7));
        let b = factory.random_with(&mut StdRng::seed_from_u64(7));

        assert_eq!(a, b);
    }
}
