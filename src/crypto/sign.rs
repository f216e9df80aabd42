//! Signing keys and the armored signature format.
//!
//! The chain code never touches secret key material directly. It hands
//! canonical bytes to a [Signer] and gets back an armored signature and a
//! [SigID]. [SignKeypair] is the ed25519 implementation of that collaborator.
//!
//! An armored signature is the standard base64 of a json packet:
//!
//! ```txt
//! {"body":{"key":<kid>,"payload":<b64>,"sig":<b64>,"sig_type":0},"tag":"signature","version":1}
//! ```
//!
//! The packet bytes (the base64-decoded armor) are the "signed body" that a
//! remote proof has to contain, and the [SigID] is the hash of those bytes.

use crate::{
    crypto::hash::Hash,
    error::{Error, Result},
    util::ser,
};
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_derive::{Deserialize as De, Serialize as Ser};
use std::ops::Deref;
use std::str::FromStr;
use zeroize::Zeroizing;

/// The key-type byte for ed25519 KIDs.
const KID_TYPE_ED25519: u8 = 0x20;
/// KID format version.
const KID_VERSION: u8 = 0x01;
/// KID trailer byte.
const KID_SUFFIX: u8 = 0x0a;

/// A value that lets us reference keys by a unique identifier. For the
/// asymmetric keys we deal with, this is just the public key.
///
/// The string form is hex: `<version><type><pubkey><suffix>`, so an ed25519
/// key reads `0120....0a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyID {
    Ed25519([u8; 32]),
}

impl KeyID {
    /// The raw public key material this ID refers to.
    pub fn key_material(&self) -> &[u8] {
        match self {
            Self::Ed25519(pubkey) => &pubkey[..],
        }
    }

    /// A cryptographic hash of the key material.
    pub fn full_hash(&self) -> Hash {
        Hash::new_blake3(self.key_material())
    }

    pub fn as_string(&self) -> String {
        let (ty, material) = match self {
            Self::Ed25519(pubkey) => (KID_TYPE_ED25519, &pubkey[..]),
        };
        let mut bytes = Vec::with_capacity(material.len() + 3);
        bytes.push(KID_VERSION);
        bytes.push(ty);
        bytes.extend_from_slice(material);
        bytes.push(KID_SUFFIX);
        hex::encode(bytes)
    }

    #[cfg(test)]
    pub(crate) fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::Ed25519(bytes)
    }
}

impl FromStr for KeyID {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() < 3 || bytes[0] != KID_VERSION || bytes[bytes.len() - 1] != KID_SUFFIX {
            Err(Error::CryptoBadKey)?;
        }
        let material = &bytes[2..bytes.len() - 1];
        match bytes[1] {
            KID_TYPE_ED25519 => {
                let arr: [u8; 32] = material.try_into().map_err(|_| Error::BadLength)?;
                Ok(Self::Ed25519(arr))
            }
            _ => Err(Error::CryptoAlgoMismatch),
        }
    }
}

impl std::fmt::Display for KeyID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl Serialize for KeyID {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for KeyID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyID::from_str(&s).map_err(de::Error::custom)
    }
}

/// Identifies one signature: the hash of its packet bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ser, De)]
pub struct SigID(Hash);

impl SigID {
    /// Derive the ID for a set of packet bytes.
    pub fn from_packet(packet: &[u8]) -> Self {
        Self(Hash::new_blake3(packet))
    }

    #[cfg(test)]
    pub(crate) fn random() -> Self {
        Self(Hash::random_blake3())
    }
}

impl Deref for SigID {
    type Target = Hash;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Hash> for SigID {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl TryFrom<&str> for SigID {
    type Error = Error;
    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        Ok(Self(Hash::try_from(string)?))
    }
}

impl std::fmt::Display for SigID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signing collaborator. Given canonical bytes, produce an armored
/// signature and its ID.
pub trait Signer {
    /// The ID of the key doing the signing.
    fn key_id(&self) -> KeyID;

    /// Sign `msg`, returning `(armored signature, signature ID)`.
    fn sign_to_string(&self, msg: &[u8]) -> Result<(String, SigID)>;
}

/// An asymmetric signing keypair.
#[derive(Clone)]
pub enum SignKeypair {
    /// Ed25519 signing keypair
    Ed25519 {
        public: [u8; 32],
        secret: Option<Zeroizing<[u8; 32]>>,
    },
}

impl SignKeypair {
    /// Create a new ed25519 keypair
    pub fn new_ed25519<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut randbuf = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut randbuf[..]);
        Self::new_ed25519_from_bytes(*randbuf)
    }

    /// Create a new ed25519 keypair from a cryptographic seed
    pub fn new_ed25519_from_bytes(secret_bytes: [u8; 32]) -> Self {
        let secret = ed25519_consensus::SigningKey::from(secret_bytes);
        Self::Ed25519 {
            public: secret.verification_key().to_bytes(),
            secret: Some(Zeroizing::new(secret_bytes)),
        }
    }

    /// Sign a value, returning the detached signature bytes.
    pub fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        match self {
            Self::Ed25519 { secret, .. } => {
                let sec_bytes = secret.as_ref().ok_or(Error::CryptoKeyMissing)?;
                let seckey = ed25519_consensus::SigningKey::from(**sec_bytes);
                Ok(seckey.sign(data).to_bytes())
            }
        }
    }

    /// Drop the secret half of this keypair.
    pub fn to_public(&self) -> Self {
        match self {
            Self::Ed25519 { public, .. } => Self::Ed25519 {
                public: *public,
                secret: None,
            },
        }
    }

    /// Create a KeyID from this keypair.
    pub fn key_id(&self) -> KeyID {
        match self {
            Self::Ed25519 { public, .. } => KeyID::Ed25519(*public),
        }
    }
}

impl std::fmt::Debug for SignKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ed25519 { secret, .. } => f
                .debug_struct("SignKeypair::Ed25519")
                .field("public", &self.key_id().as_string())
                .field("secret", &secret.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

impl Signer for SignKeypair {
    fn key_id(&self) -> KeyID {
        SignKeypair::key_id(self)
    }

    fn sign_to_string(&self, msg: &[u8]) -> Result<(String, SigID)> {
        let sig = self.sign(msg)?;
        let packet = SigPacket {
            body: SigPacketBody {
                key: self.key_id(),
                payload: ser::base64_encode_std(msg),
                sig: ser::base64_encode_std(sig),
                sig_type: SIG_TYPE_ATTACHED,
            },
            tag: PACKET_TAG.into(),
            version: PACKET_VERSION,
        };
        let bytes = ser::canonical_json(&packet)?;
        let sig_id = SigID::from_packet(&bytes);
        Ok((ser::base64_encode_std(&bytes), sig_id))
    }
}

const PACKET_TAG: &str = "signature";
const PACKET_VERSION: u32 = 1;
const SIG_TYPE_ATTACHED: u32 = 0;

#[derive(Debug, Ser, De)]
struct SigPacketBody {
    key: KeyID,
    payload: String,
    sig: String,
    sig_type: u32,
}

#[derive(Debug, Ser, De)]
struct SigPacket {
    body: SigPacketBody,
    tag: String,
    version: u32,
}

/// Strip any armor header/footer lines and whitespace, leaving the bare
/// base64.
fn dearmor(armored: &str) -> String {
    armored
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.starts_with("-----") && !line.contains(": "))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn decode_packet(armored: &str) -> Result<(Vec<u8>, SigPacket)> {
    let bytes = ser::base64_decode_std(dearmor(armored))
        .map_err(|e| Error::BadArmor(format!("base64: {}", e)))?;
    let packet: SigPacket = ser::from_json(&bytes)
        .map_err(|e| Error::BadArmor(format!("packet: {}", e)))?;
    if packet.tag != PACKET_TAG || packet.version != PACKET_VERSION {
        Err(Error::BadArmor(format!("unsupported packet {}/v{}", packet.tag, packet.version)))?;
    }
    Ok((bytes, packet))
}

/// Open an armored signature, returning the packet bytes (the signed body
/// that remote evidence must contain) and the signature's ID.
///
/// This does *not* check the signature itself, see [verify_sig].
pub fn open_sig(armored: &str) -> Result<(Vec<u8>, SigID)> {
    let (bytes, _) = decode_packet(armored)?;
    let sig_id = SigID::from_packet(&bytes);
    Ok((bytes, sig_id))
}

/// Open an armored signature and verify it, returning the signed payload and
/// the key that signed it.
pub fn verify_sig(armored: &str) -> Result<(Vec<u8>, KeyID)> {
    let (_, packet) = decode_packet(armored)?;
    let payload = ser::base64_decode_std(&packet.body.payload)?;
    let sig_bytes = ser::base64_decode_std(&packet.body.sig)?;
    let sig_arr: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| Error::BadLength)?;
    match &packet.body.key {
        KeyID::Ed25519(pubkey) => {
            let vk = ed25519_consensus::VerificationKey::try_from(*pubkey)
                .map_err(|_| Error::CryptoBadKey)?;
            vk.verify(&ed25519_consensus::Signature::from(sig_arr), &payload)
                .map_err(|_| Error::CryptoSignatureVerificationFailed)?;
        }
    }
    Ok((payload, packet.body.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;

    #[test]
    fn kid_string_roundtrip() {
        let key = SignKeypair::new_ed25519_from_bytes([7u8; 32]);
        let kid = key.key_id();
        let string = kid.as_string();
        assert!(string.starts_with("0120"));
        assert!(string.ends_with("0a"));
        assert_eq!(string.len(), (32 + 3) * 2);
        assert_eq!(KeyID::from_str(&string).unwrap(), kid);
        let json = serde_json::to_string(&kid).unwrap();
        assert_eq!(serde_json::from_str::<KeyID>(&json).unwrap(), kid);
    }

    #[test]
    fn kid_bad_strings() {
        assert!(KeyID::from_str("zz").is_err());
        assert_eq!(KeyID::from_str("0120000a"), Err(Error::BadLength));
        assert_eq!(KeyID::from_str(&format!("0121{}0a", "00".repeat(32))), Err(Error::CryptoAlgoMismatch));
        assert_eq!(KeyID::from_str(&format!("0220{}0a", "00".repeat(32))), Err(Error::CryptoBadKey));
    }

    #[test]
    fn sign_open_verify() {
        let mut rng = test::rng();
        let key = SignKeypair::new_ed25519(&mut rng);
        let (armored, sig_id) = key.sign_to_string(b"hi i'm butch").unwrap();

        let (body, sig_id2) = open_sig(&armored).unwrap();
        assert_eq!(sig_id, sig_id2);
        assert_eq!(ser::base64_encode_std(&body), armored);

        let (payload, kid) = verify_sig(&armored).unwrap();
        assert_eq!(payload, b"hi i'm butch");
        assert_eq!(kid, key.key_id());

        // deterministic: ed25519 signatures don't use randomness
        let (armored2, sig_id3) = key.sign_to_string(b"hi i'm butch").unwrap();
        assert_eq!(armored, armored2);
        assert_eq!(sig_id, sig_id3);
    }

    #[test]
    fn open_sig_tolerates_armor_and_wrapping() {
        let key = SignKeypair::new_ed25519_from_bytes([3u8; 32]);
        let (armored, sig_id) = key.sign_to_string(b"wrap me").unwrap();
        let wrapped = armored
            .as_bytes()
            .chunks(64)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let framed = format!("-----BEGIN SIGNATURE-----\nVersion: 1\n\n{}\n-----END SIGNATURE-----\n", wrapped);
        let (_, sig_id2) = open_sig(&framed).unwrap();
        assert_eq!(sig_id, sig_id2);
    }

    #[test]
    fn open_sig_garbage() {
        assert!(matches!(open_sig("!!!!"), Err(Error::BadArmor(_))));
        // valid base64, not a packet
        assert!(matches!(open_sig(&ser::base64_encode_std(b"{\"nope\":1}")), Err(Error::BadArmor(_))));
    }

    #[test]
    fn verify_sig_tampered() {
        let key = SignKeypair::new_ed25519_from_bytes([5u8; 32]);
        let (armored, _) = key.sign_to_string(b"original").unwrap();
        let bytes = ser::base64_decode_std(&armored).unwrap();
        let mut packet: SigPacket = ser::from_json(&bytes).unwrap();
        packet.body.payload = ser::base64_encode_std(b"forged");
        let forged = ser::base64_encode_std(ser::canonical_json(&packet).unwrap());
        assert_eq!(verify_sig(&forged), Err(Error::CryptoSignatureVerificationFailed));
    }

    #[test]
    fn public_only_cannot_sign() {
        let key = SignKeypair::new_ed25519_from_bytes([9u8; 32]).to_public();
        assert_eq!(key.sign(b"nope").err(), Some(Error::CryptoKeyMissing));
        assert!(!format!("{:?}", key).contains("redacted"));
        let full = SignKeypair::new_ed25519_from_bytes([9u8; 32]);
        assert!(format!("{:?}", full).contains("redacted"));
    }
}
