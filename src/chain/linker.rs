//! Linking signed statements into a chain.
//!
//! [extend_chain] is the pure rule: the new link has to be at `tail + 1` and
//! has to point at the tail's ID. [Sigchain] applies that rule to an owned
//! list of links, and [ChainLinker] makes sure only one writer at a time is
//! extending any given identity's chain, since picking the next seqno/prev and
//! appending is a read-modify-write over the tail.

use crate::{
    chain::link::{ChainLink, ChainTail, Seqno},
    error::{Error, Result},
    identity::UserID,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Check that `link` can come directly after `tail` (`None` meaning the chain
/// is empty). Nothing is modified.
pub fn extend_chain(tail: Option<&ChainTail>, link: &ChainLink) -> Result<()> {
    let expected_seqno = tail.map(|t| t.seqno().next()).unwrap_or(Seqno::FIRST);
    if link.seqno() != expected_seqno {
        Err(Error::SeqnoGap {
            expected: expected_seqno,
            got: link.seqno(),
        })?;
    }
    let expected_prev = tail.map(|t| t.link_id());
    if link.prev() != expected_prev {
        Err(Error::PrevMismatch {
            expected: expected_prev.cloned(),
            got: link.prev().cloned(),
        })?;
    }
    Ok(())
}

/// An ordered list of links that is known to hang together.
#[derive(Debug, Clone, Default)]
pub struct Sigchain {
    links: Vec<ChainLink>,
}

impl Sigchain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay a list of links (ie, loaded from storage) into a chain, checking
    /// every ID, signature, seqno, and prev along the way.
    pub fn from_links(links: Vec<ChainLink>) -> Result<Self> {
        let mut chain = Self::new();
        for link in links {
            chain.extend(link)?;
        }
        Ok(chain)
    }

    pub fn links(&self) -> &Vec<ChainLink> {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn tail(&self) -> Option<ChainTail> {
        self.links.last().map(|l| l.as_tail())
    }

    /// Append a link. On failure the chain is left exactly as it was.
    pub fn extend(&mut self, link: ChainLink) -> Result<()> {
        link.verify_id()?;
        link.verify_signature()?;
        extend_chain(self.tail().as_ref(), &link)?;
        self.links.push(link);
        Ok(())
    }
}

/// Holds each identity's chain behind its own lock.
///
/// Writers for different identities never wait on each other. Writers for
/// the same identity either queue ([extend_with][ChainLinker::extend_with])
/// or bail with [Error::ChainBusy]
/// ([try_extend_with][ChainLinker::try_extend_with]).
#[derive(Debug, Default)]
pub struct ChainLinker {
    chains: Mutex<HashMap<UserID, Arc<Mutex<Sigchain>>>>,
}

impl ChainLinker {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain_for(&self, uid: &UserID) -> Arc<Mutex<Sigchain>> {
        self.chains.lock().entry(uid.clone()).or_default().clone()
    }

    /// Install an already-verified chain for an identity, replacing whatever
    /// we had.
    pub fn load(&self, uid: &UserID, chain: Sigchain) {
        *self.chain_for(uid).lock() = chain;
    }

    /// The chain we already hold for an identity, without making one.
    fn existing(&self, uid: &UserID) -> Option<Arc<Mutex<Sigchain>>> {
        self.chains.lock().get(uid).cloned()
    }

    /// The current tail for an identity, if it has any links.
    pub fn tail(&self, uid: &UserID) -> Option<ChainTail> {
        self.existing(uid)?.lock().tail()
    }

    /// A copy of an identity's chain (empty if we've never seen them).
    pub fn chain(&self, uid: &UserID) -> Sigchain {
        self.existing(uid).map(|chain| chain.lock().clone()).unwrap_or_default()
    }

    /// Append an already-signed link.
    pub fn extend(&self, uid: &UserID, link: ChainLink) -> Result<ChainTail> {
        self.extend_with(uid, move |_| Ok(link))
    }

    /// Build and append a link while holding the identity's chain. `build` is
    /// handed the current tail, so it can pick the seqno/prev for the new
    /// statement without anyone else slipping a link in first.
    pub fn extend_with<F>(&self, uid: &UserID, build: F) -> Result<ChainTail>
    where
        F: FnOnce(Option<&ChainTail>) -> Result<ChainLink>,
    {
        let chain = self.chain_for(uid);
        let mut guard = chain.lock();
        Self::append(uid, &mut guard, build)
    }

    /// Like [extend_with][ChainLinker::extend_with], but if another writer
    /// currently holds this identity's chain we return [Error::ChainBusy]
    /// instead of waiting.
    pub fn try_extend_with<F>(&self, uid: &UserID, build: F) -> Result<ChainTail>
    where
        F: FnOnce(Option<&ChainTail>) -> Result<ChainLink>,
    {
        let chain = self.chain_for(uid);
        let mut guard = match chain.try_lock() {
            Some(guard) => guard,
            None => {
                debug!(uid = %uid, "chain busy");
                return Err(Error::ChainBusy(uid.clone()));
            }
        };
        Self::append(uid, &mut guard, build)
    }

    fn append<F>(uid: &UserID, chain: &mut Sigchain, build: F) -> Result<ChainTail>
    where
        F: FnOnce(Option<&ChainTail>) -> Result<ChainLink>,
    {
        let tail = chain.tail();
        let link = build(tail.as_ref())?;
        let seqno = link.seqno();
        let new_tail = link.as_tail();
        match chain.extend(link) {
            Ok(()) => {
                debug!(uid = %uid, seqno = %seqno, link_id = %new_tail.link_id(), "sigchain extended");
                Ok(new_tail)
            }
            Err(e) => {
                warn!(uid = %uid, seqno = %seqno, error = %e, "sigchain extension rejected");
                Err(e)
            }
        }
    }
}
