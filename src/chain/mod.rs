//! The sigchain: building statements, signing them into links, and linking
//! those into a per-identity chain where every link commits to the one before
//! it.

pub mod link;
pub mod linker;
pub mod statement;

pub use link::{compute_link_id, ChainLink, ChainTail, LinkID, Seqno};
pub use linker::{extend_chain, ChainLinker, Sigchain};
pub use statement::{
    CurrencyType, Delegation, LinkBody, LinkType, MerkleRoot, MerkleRootSource, RevokeTarget, ServiceSection, Statement,
    StatementBuilder,
};
