//! Helpful serialization tools.
//!
//! Everything that gets hashed or signed goes through [canonical_json]. The
//! bytes it produces are what the link ID is computed over, so the output for
//! a given value must never change: struct fields serialize in declaration
//! order, absent optional sections are skipped entirely, and there is no
//! whitespace.

use crate::error::Result;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use serde::{de::DeserializeOwned, Serialize};

/// Serialize an object into its canonical (compact json) byte form.
pub(crate) fn canonical_json<T: Serialize>(obj: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(obj)?)
}

/// Deserialize an object from json bytes.
pub(crate) fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Convert bytes to url-safe base64 (used for IDs)
pub fn base64_encode<T: AsRef<[u8]>>(bytes: T) -> String {
    URL_SAFE_NO_PAD.encode(bytes.as_ref())
}

/// Convert url-safe base64 back into bytes
pub fn base64_decode<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(bytes.as_ref())?)
}

/// Standard (padded) base64, the alphabet armored signatures are published in.
pub fn base64_encode_std<T: AsRef<[u8]>>(bytes: T) -> String {
    STANDARD.encode(bytes.as_ref())
}

/// Decode standard (padded) base64.
pub fn base64_decode_std<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(bytes.as_ref())?)
}

/// Lets us tell "field absent" apart from "field present but null" when
/// deserializing an `Option<Option<T>>`. Use alongside `#[serde(default)]`.
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Deserialize::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sig {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option::deserialize")]
        reverse_sig: Option<Option<String>>,
    }

    #[test]
    fn double_option_absent_null_present() {
        let absent = Sig { reverse_sig: None };
        let null = Sig { reverse_sig: Some(None) };
        let present = Sig { reverse_sig: Some(Some("g0".into())) };
        assert_eq!(canonical_json(&absent).unwrap(), b"{}");
        assert_eq!(canonical_json(&null).unwrap(), br#"{"reverse_sig":null}"#);
        assert_eq!(canonical_json(&present).unwrap(), br#"{"reverse_sig":"g0"}"#);
        assert_eq!(from_json::<Sig>(b"{}").unwrap(), absent);
        assert_eq!(from_json::<Sig>(br#"{"reverse_sig":null}"#).unwrap(), null);
        assert_eq!(from_json::<Sig>(br#"{"reverse_sig":"g0"}"#).unwrap(), present);
    }

    #[test]
    fn base64_alphabets() {
        let bytes = [251u8, 255, 190];
        assert_eq!(base64_encode(bytes), "-_--");
        assert_eq!(base64_encode_std(bytes), "+/++");
        assert_eq!(base64_decode("-_--").unwrap(), bytes);
        assert_eq!(base64_decode_std("+/++").unwrap(), bytes);
        assert!(base64_decode_std("-_--").is_err());
    }
}
