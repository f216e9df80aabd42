use crate::proof::checker::ServiceType;
use regex::Regex;
use std::sync::LazyLock;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@?(?i:[a-z0-9_]{2,16})$").expect("coinbase username regex is valid"));

/// Proofs posted to a Coinbase public key page.
#[derive(Debug, Default, Clone, Copy)]
pub struct Coinbase;

impl Coinbase {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceType for Coinbase {
    fn type_name(&self) -> &'static str {
        "coinbase"
    }

    fn display_name(&self) -> &'static str {
        "Coinbase"
    }

    fn proof_type(&self) -> u32 {
        5
    }

    fn profile_url(&self, username: &str) -> String {
        format!("https://coinbase.com/{}/public-key", username)
    }

    fn content_selector(&self) -> &'static str {
        "div#public_key_content pre.statement"
    }

    fn username_pattern(&self) -> &Regex {
        &USERNAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn usernames() {
        let cb = Coinbase::new();
        for good in ["al", "alice_99", "@Alice", "ABCDEFGHIJKLMNOP"] {
            cb.check_username(good).unwrap();
        }
        for bad in ["a", "alice-99", "alice smith", "ABCDEFGHIJKLMNOPQ", "@@alice", ""] {
            assert!(matches!(cb.check_username(bad), Err(Error::BadUsername { .. })), "{:?}", bad);
        }
        assert_eq!(cb.normalize_username("@Alice").unwrap(), "alice");
    }

    #[test]
    fn url() {
        assert_eq!(Coinbase::new().profile_url("alice"), "https://coinbase.com/alice/public-key");
    }
}
