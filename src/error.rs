//! The main error enum for the project lives here, and documents the various
//! conditions that can arise while building, linking, and signing chain
//! statements.
//!
//! Note that failures while *verifying a remote proof* are not errors in this
//! sense. Those are [ProofError][crate::proof::ProofError] values: they are
//! stable results that get handed back to the caller and cached.

use crate::{chain::link::{LinkID, Seqno}, identity::UserID};
use thiserror::Error;

/// This is our error enum. It contains an entry for any part of the system in
/// which an expectation is not met or a problem occurs.
#[derive(Error, Debug)]
pub enum Error {
    /// Tried to decode a hash/key/signature with an unknown algorithm tag.
    #[error("cryptographic algorithm mismatch")]
    CryptoAlgoMismatch,

    /// Bad key.
    #[error("key is invalid")]
    CryptoBadKey,

    /// A key is missing from a crypto operation (ie, signing with a
    /// public-only keypair)
    #[error("crypto key missing")]
    CryptoKeyMissing,

    /// A signature failed to verify.
    #[error("the given signature/public key/data combo does not verify")]
    CryptoSignatureVerificationFailed,

    /// An armored signature could not be opened (bad base64, bad packet).
    #[error("armored signature is malformed: {0}")]
    BadArmor(String),

    /// A value had the wrong number of bytes.
    #[error("bad length")]
    BadLength,

    /// Another writer currently holds this identity's chain, and we asked not
    /// to wait for it.
    #[error("sigchain for {0} is being extended by another writer")]
    ChainBusy(UserID),

    /// The link we're trying to append doesn't follow the current tail's
    /// sequence number.
    #[error("seqno gap: expected {expected}, got {got}")]
    SeqnoGap {
        expected: Seqno,
        got: Seqno,
    },

    /// The link we're trying to append points at something other than the
    /// current tail.
    #[error("prev mismatch: expected {expected:?}, got {got:?}")]
    PrevMismatch {
        expected: Option<LinkID>,
        got: Option<LinkID>,
    },

    /// A link's stored ID doesn't match the hash of its payload bytes.
    #[error("link ID mismatch for {0}")]
    LinkIDMismatch(LinkID),

    /// A user ID string isn't a well-formed user ID.
    #[error("bad user id: {0}")]
    BadUserID(String),

    /// Something the statement needs (an active key, a known device, ...) is
    /// missing from the identity.
    #[error("identity is incomplete: {0}")]
    IncompleteIdentity(String),

    /// A remote username doesn't fit the service's format.
    #[error("bad username {username:?} for {service}")]
    BadUsername {
        service: String,
        username: String,
    },

    /// No service type is registered under this name.
    #[error("unknown service type {0:?}")]
    UnknownServiceType(String),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(String),

    /// An error while engaging in json (de)serialization.
    #[error("json serialization error")]
    Json(#[from] serde_json::Error),

    /// An error while decoding base64.
    #[error("base64 decoding error")]
    DeserializeBase64(#[from] base64::DecodeError),

    /// An error while decoding hex.
    #[error("hex decoding error")]
    DeserializeHex(#[from] hex::FromHexError),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        // the #[from] variants carry foreign errors with no PartialEq, so we
        // compare the debug output. good enough for tests.
        format!("{:?}", self) == format!("{:?}", other)
    }
}

/// Wraps `std::result::Result` around our `Error` enum
pub type Result<T> = std::result::Result<T, Error>;
