//! The services we know how to check proofs for.

mod coinbase;
mod hackernews;

pub use coinbase::Coinbase;
pub use hackernews::HackerNews;
