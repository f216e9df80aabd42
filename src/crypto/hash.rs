use crate::{
    error::Error,
    util::ser,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash as StdHash, Hasher};

/// An enum we can pass to various functions to tell them which hashing
/// algorithm to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgo {
    /// Blake3 (256 bit)
    #[default]
    Blake3,
}

/// A cryptographic hash. By defining this as an enum, we allow expansion of
/// hash algorithms in the future.
///
/// When stringified, the hash is in the format `base64([<hash bytes>|<u8 tag>])`
/// where the `tag` is the specific hash algorithm we use. This allows the hash
/// to shine on its own without the tag getting in the way. Yes, it's vain.
///
/// Hashes serialize as that string form, which keeps them readable inside
/// json statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hash {
    /// Blake3 256bit hash
    Blake3([u8; 32]),
}

impl Hash {
    /// Hash a message with the given algorithm.
    pub fn new(algo: HashAlgo, message: &[u8]) -> Self {
        match algo {
            HashAlgo::Blake3 => Self::new_blake3(message),
        }
    }

    /// Create a new blake3 hash from a message
    pub fn new_blake3(message: &[u8]) -> Self {
        Self::Blake3(*blake3::hash(message).as_bytes())
    }

    /// Which algorithm made this hash.
    pub fn algo(&self) -> HashAlgo {
        match self {
            Self::Blake3(..) => HashAlgo::Blake3,
        }
    }

    /// Return the byte slice representing this hash.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Blake3(bytes) => &bytes[..],
        }
    }

    #[cfg(test)]
    pub(crate) fn random_blake3() -> Self {
        use rand::RngCore;
        let mut randbuf = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut randbuf);
        Self::Blake3(randbuf)
    }
}

impl From<&Hash> for String {
    fn from(hash: &Hash) -> Self {
        let (bytes, tag) = match hash {
            Hash::Blake3(bytes) => (&bytes[..], 0u8),
        };
        let mut enc = Vec::with_capacity(bytes.len() + 1);
        enc.extend_from_slice(bytes);
        enc.push(tag);
        ser::base64_encode(&enc)
    }
}

impl TryFrom<&str> for Hash {
    type Error = Error;

    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        let dec = ser::base64_decode(string)?;
        let (tag, bytes) = dec.split_last().ok_or(Error::BadLength)?;
        let hash = match tag {
            0 => {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::BadLength)?;
                Self::Blake3(arr)
            }
            _ => Err(Error::CryptoAlgoMismatch)?,
        };
        Ok(hash)
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(self))
    }
}

impl StdHash for Hash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from(self))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::try_from(s.as_str()).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_blake3_encode_decode_fmt() {
        let msg = b"that kook dropped in on me. we need to send him a (cryptographically hashed) message.";
        let hash = Hash::new_blake3(&msg[..]);
        assert_eq!(hash.as_bytes(), blake3::hash(&msg[..]).as_bytes());
        assert_eq!(hash.algo(), HashAlgo::Blake3);

        let string = format!("{}", hash);
        // 32 bytes + tag = 33 bytes = 44 base64 chars, no padding
        assert_eq!(string.len(), 44);
        assert!(string.ends_with('A'));
        let hash2 = Hash::try_from(string.as_str()).unwrap();
        assert_eq!(hash, hash2);

        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", string));
        let hash3: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash3, hash);
    }

    #[test]
    fn hash_decode_bad_input() {
        assert_eq!(Hash::try_from(""), Err(Error::BadLength));
        // right length, unknown tag
        let mut bytes = vec![0u8; 32];
        bytes.push(9);
        assert_eq!(Hash::try_from(ser::base64_encode(&bytes).as_str()), Err(Error::CryptoAlgoMismatch));
        // known tag, short body
        assert_eq!(Hash::try_from(ser::base64_encode([1u8, 2, 3, 0]).as_str()), Err(Error::BadLength));
    }

    #[test]
    fn hash_one_byte_difference() {
        let h1 = Hash::new_blake3(b"get a job");
        let h2 = Hash::new_blake3(b"get a jab");
        let h3 = Hash::new_blake3(b"get a job");
        assert_ne!(h1, h2);
        assert_eq!(h1, h3);
    }
}
