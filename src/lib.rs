//! The trust core of a sigchain client.
//!
//! A sigchain is a per-identity list of signed statements. Each statement
//! records something that happened to the identity (a key was added or
//! revoked, a remote account was claimed, someone else was tracked...) and
//! names the hash of the statement before it, so the whole history is
//! tamper-evident: change one byte anywhere and every later link stops
//! verifying.
//!
//! This crate does three things:
//!
//! 1. Builds canonical statements ([chain::StatementBuilder]) whose bytes are
//! reproducible, so their hashes and signatures are too.
//! 1. Links signed statements into a chain ([chain::ChainLinker]), enforcing
//! seqno/prev ordering with exactly one writer per identity at a time.
//! 1. Verifies remote proofs ([proof::checker]) by fetching the page they're
//! posted on and looking for our signature, and caches the outcomes
//! ([cache::ProofCache]) for longer or shorter depending on how they failed.
//!
//! Transport, key storage, and the durable store itself are someone else's
//! job. They plug in through small traits ([crypto::Signer],
//! [proof::fetch::HtmlFetcher], [cache::store::LocalDb],
//! [chain::MerkleRootSource]).

pub mod error;
pub mod util;
pub mod config;
pub mod logging;
pub mod crypto;
pub mod identity;
pub mod chain;
pub mod proof;
pub mod cache;
