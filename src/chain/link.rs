//! A `ChainLink` is one signed statement inside a user's sigchain.
//!
//! Links have a [Statement] (the canonical json that was signed), the exact
//! payload bytes that went into the signature, the armored signature itself,
//! and an ID ([LinkID]) which is the hash of those payload bytes. Each link's
//! statement names the ID of the link before it, so changing any byte of any
//! link breaks every link after it.

use crate::{
    chain::statement::{LinkType, Statement},
    crypto::{verify_sig, Hash, HashAlgo, KeyID, SigID},
    error::{Error, Result},
    util::ser,
};
use getset;
use serde_derive::{Deserialize, Serialize};
use std::ops::Deref;

/// A link's position in its chain. The first link is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seqno(u64);

impl Seqno {
    /// The seqno of the first link in any chain.
    pub const FIRST: Seqno = Seqno(1);

    pub fn new(seqno: u64) -> Self {
        Self(seqno)
    }

    /// The seqno that has to come after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Seqno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The LinkID is a [Hash] of the link's signed payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkID(Hash);

impl From<Hash> for LinkID {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl Deref for LinkID {
    type Target = Hash;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<&str> for LinkID {
    type Error = Error;

    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        Ok(LinkID::from(Hash::try_from(string)?))
    }
}

impl std::fmt::Display for LinkID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.deref())
    }
}

#[cfg(test)]
impl LinkID {
    pub(crate) fn random() -> Self {
        Self(Hash::random_blake3())
    }
}

/// Compute a link ID from the exact bytes that were signed.
///
/// Never feed this a re-serialization of a parsed statement: the ID is only
/// reproducible from the original signed bytes.
pub fn compute_link_id(payload: &[u8]) -> LinkID {
    LinkID::from(Hash::new(HashAlgo::Blake3, payload))
}

/// The end of a chain: what the next link has to build on.
#[derive(Debug, Clone, PartialEq, Eq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct ChainTail {
    seqno: Seqno,
    link_id: LinkID,
}

impl ChainTail {
    pub fn new(seqno: Seqno, link_id: LinkID) -> Self {
        Self { seqno, link_id }
    }
}

/// One signed, immutable entry in a sigchain.
///
/// There are no setters here on purpose: a link is fixed once it's signed.
/// Corrections are new links (a revocation, an untrack).
#[derive(Debug, Clone, getset::Getters)]
#[getset(get = "pub")]
pub struct ChainLink {
    /// Hash of `payload`.
    id: LinkID,
    /// The parsed form of `payload`.
    statement: Statement,
    /// The exact bytes that were signed.
    payload: Vec<u8>,
    /// The armored signature over `payload`.
    sig: String,
    sig_id: SigID,
}

impl ChainLink {
    /// Wrap up a signed payload. The payload is parsed to learn the seqno/prev
    /// the statement claims, and the link ID is computed from the raw bytes.
    pub fn from_signed(payload: Vec<u8>, sig: String, sig_id: SigID) -> Result<Self> {
        let statement: Statement = ser::from_json(&payload)?;
        Ok(Self {
            id: compute_link_id(&payload),
            statement,
            payload,
            sig,
            sig_id,
        })
    }

    /// Rebuild a link loaded from storage, keeping the ID it was stored
    /// under. Nothing is checked here; run it through
    /// [verify_id][ChainLink::verify_id] (or [Sigchain][crate::chain::Sigchain])
    /// before trusting it.
    pub fn from_stored(id: LinkID, payload: Vec<u8>, sig: String, sig_id: SigID) -> Result<Self> {
        let statement: Statement = ser::from_json(&payload)?;
        Ok(Self {
            id,
            statement,
            payload,
            sig,
            sig_id,
        })
    }

    pub fn seqno(&self) -> Seqno {
        *self.statement().seqno()
    }

    pub fn prev(&self) -> Option<&LinkID> {
        self.statement().prev().as_ref()
    }

    pub fn link_type(&self) -> &LinkType {
        self.statement().body().ty()
    }

    /// The key that claims to have signed this link.
    pub fn signing_kid(&self) -> &KeyID {
        self.statement().body().key().kid()
    }

    /// The tail a chain has after this link is appended.
    pub fn as_tail(&self) -> ChainTail {
        ChainTail::new(self.seqno(), self.id().clone())
    }

    /// Make sure our ID is still the hash of our payload.
    pub fn verify_id(&self) -> Result<()> {
        if &compute_link_id(self.payload()) != self.id() {
            Err(Error::LinkIDMismatch(self.id().clone()))?;
        }
        Ok(())
    }

    /// Make sure the signature covers exactly our payload and was made by
    /// the key the statement names.
    pub fn verify_signature(&self) -> Result<()> {
        let (signed, kid) = verify_sig(self.sig())?;
        if &signed != self.payload() || &kid != self.signing_kid() {
            Err(Error::CryptoSignatureVerificationFailed)?;
        }
        Ok(())
    }
}
