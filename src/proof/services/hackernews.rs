use crate::proof::checker::ServiceType;
use regex::Regex;
use std::sync::LazyLock;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@?(?i:[a-z0-9_-]{2,15})$").expect("hackernews username regex is valid"));

/// Proofs posted to the "about" field of a Hacker News profile.
///
/// HN usernames are case-sensitive in URLs, but the hint check ignores case
/// like every other service does.
#[derive(Debug, Default, Clone, Copy)]
pub struct HackerNews;

impl HackerNews {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceType for HackerNews {
    fn type_name(&self) -> &'static str {
        "hackernews"
    }

    fn display_name(&self) -> &'static str {
        "Hacker News"
    }

    fn proof_type(&self) -> u32 {
        6
    }

    fn profile_url(&self, username: &str) -> String {
        format!("https://news.ycombinator.com/user?id={}", username)
    }

    fn content_selector(&self) -> &'static str {
        "table#hnmain td.default"
    }

    fn username_pattern(&self) -> &Regex {
        &USERNAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ProofCache,
        crypto::{SignKeypair, Signer},
        proof::{checker::ServiceRegistry, ProofErrorKind, RemoteProof, SigHint},
        util::{test::StaticFetcher, Timestamp},
    };

    #[test]
    fn usernames() {
        let hn = HackerNews::new();
        hn.check_username("pg").unwrap();
        hn.check_username("dang-2").unwrap();
        assert!(hn.check_username("x").is_err());
        assert!(hn.check_username("sixteen_chars_xx").is_err());
    }

    #[test]
    fn same_checks_different_page() {
        let url = "https://news.ycombinator.com/user?id=bob";
        let key = SignKeypair::new_ed25519_from_bytes([11u8; 32]);
        let (armored, sig_id) = key.sign_to_string(b"bob on hn").unwrap();
        let hint = SigHint::new("bob", url, url, armored.clone());
        let proof = RemoteProof::new("hackernews", "bob", armored.clone(), sig_id, Some(hint));
        let html = format!(
            r#"<html><body><table id="hnmain"><tr><td class="default">about: [ my keybase proof ]<br>{}</td></tr></table></body></html>"#,
            armored
        );
        let fetcher = StaticFetcher::new().page(url, html);
        let registry = ServiceRegistry::with_defaults();
        let now = Timestamp::from_unix(1700000000);
        assert!(registry.check(&proof, &fetcher, &None::<ProofCache>, &now).status().is_none());

        // a coinbase page layout doesn't parse here
        let wrong_layout = StaticFetcher::new().page(url, format!(r#"<div id="public_key_content"><pre class="statement">{}</pre></div>"#, armored));
        let result = registry.check(&proof, &wrong_layout, &None::<ProofCache>, &now);
        assert_eq!(result.status().as_ref().unwrap().kind(), &ProofErrorKind::FailedParse);
    }
}
