//! Checking remote proofs.
//!
//! Every service is checked the same way: make sure the server's hint points
//! at the profile URL we'd derive ourselves, fetch that page, find the region
//! where the proof text lives, pull the base64 blocks out of it, and look for
//! the body of our own signature in one of them. The only things that differ
//! between services are captured by [ServiceType]: the URL shape, the css
//! selector for the proof region, and what a valid username looks like.
//!
//! Services are looked up in a [ServiceRegistry], which the caller builds at
//! startup and passes around. Adding a service means registering one more
//! [ServiceType], never touching [ProofChecker].

use crate::{
    cache::{CheckResult, ResultCache},
    chain::statement::ServiceSection,
    crypto::open_sig,
    error::{Error, Result},
    proof::{
        fetch::{HtmlDocument, HtmlFetcher},
        services::{Coinbase, HackerNews},
        ProofError, ProofErrorKind, RemoteProof, SigHint,
    },
    util::{ser, Timestamp},
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Shortest run of base64 characters we'll consider to be a block. Anything
/// shorter can't hold a signature packet.
const MIN_BLOCK_LEN: usize = 32;

static BASE64_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("base64 token regex is valid"));

/// What makes one service different from another.
pub trait ServiceType: Send + Sync {
    /// The name used in chain statements and the registry ("coinbase").
    fn type_name(&self) -> &'static str;

    /// Human name ("Coinbase").
    fn display_name(&self) -> &'static str;

    /// Numeric proof type written into tracking statements.
    fn proof_type(&self) -> u32;

    /// Where a user's proof can be found.
    fn profile_url(&self, username: &str) -> String;

    /// Css selector for the element holding the proof text.
    fn content_selector(&self) -> &'static str;

    /// Pattern a username (optionally with a leading `@`) has to match.
    fn username_pattern(&self) -> &Regex;

    fn check_username(&self, username: &str) -> Result<()> {
        if !self.username_pattern().is_match(username) {
            Err(Error::BadUsername {
                service: self.type_name().into(),
                username: username.into(),
            })?;
        }
        Ok(())
    }

    /// Validate then canonicalize a username: no leading `@`, lowercase.
    fn normalize_username(&self, username: &str) -> Result<String> {
        self.check_username(username)?;
        Ok(username.trim_start_matches('@').to_lowercase())
    }

    /// The `service` section a proof binding for this username carries.
    fn to_service_section(&self, username: &str) -> Result<ServiceSection> {
        Ok(ServiceSection::new(self.type_name(), self.normalize_username(username)?))
    }
}

/// The set of services we know how to check.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Box<dyn ServiceType>>,
}

impl ServiceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in service.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Coinbase::new());
        registry.register(HackerNews::new());
        registry
    }

    /// Add (or replace) a service.
    pub fn register<S: ServiceType + 'static>(&mut self, service: S) {
        self.services.insert(service.type_name().to_string(), Box::new(service));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ServiceType> {
        self.services.get(name).map(|s| s.as_ref())
    }

    /// Names of all registered services, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.services.keys().map(|k| k.as_str()).collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Grab a checker for this proof's service.
    pub fn checker_for<'a>(&'a self, proof: &'a RemoteProof) -> std::result::Result<ProofChecker<'a>, ProofError> {
        let service = self.get(proof.service_type()).ok_or_else(|| {
            ProofError::new(ProofErrorKind::UnknownType, format!("no checker for service {:?}", proof.service_type()))
        })?;
        Ok(ProofChecker::new(service, proof))
    }

    /// Check a proof with whichever service it belongs to. A proof for a
    /// service we don't know gets an `UnknownType` result, which isn't cached.
    pub fn check(&self, proof: &RemoteProof, fetcher: &dyn HtmlFetcher, cache: &dyn ResultCache, now: &Timestamp) -> CheckResult {
        match self.checker_for(proof) {
            Ok(checker) => checker.check(fetcher, cache, now),
            Err(e) => {
                warn!(sig_id = %proof.sig_id(), error = %e, "no checker for proof");
                CheckResult::new(Some(e), now.clone())
            }
        }
    }
}

/// Checks one remote proof against one service.
pub struct ProofChecker<'a> {
    service: &'a dyn ServiceType,
    proof: &'a RemoteProof,
}

impl<'a> ProofChecker<'a> {
    pub fn new(service: &'a dyn ServiceType, proof: &'a RemoteProof) -> Self {
        Self { service, proof }
    }

    /// Where we expect this proof to be posted.
    pub fn profile_url(&self) -> String {
        self.service.profile_url(self.proof.username())
    }

    pub fn check_username_format(&self) -> std::result::Result<(), ProofError> {
        self.service
            .check_username(self.proof.username())
            .map_err(|e| ProofError::new(ProofErrorKind::BadUsername, format!("{}", e)))
    }

    /// Make sure the server's hint points where we'd look on our own.
    pub fn check_hint(&self, hint: &SigHint) -> std::result::Result<(), ProofError> {
        let wanted = self.profile_url();
        if wanted.to_lowercase() != hint.api_url().to_lowercase() {
            Err(ProofError::new(
                ProofErrorKind::BadApiUrl,
                format!("bad hint from server; URL should be {:?}, got {:?}", wanted, hint.api_url()),
            ))?;
        }
        Ok(())
    }

    /// Fetch the hinted page and look for our signature in it.
    ///
    /// This blocks on the fetcher. Don't call it holding any lock you care
    /// about.
    pub fn check_status(&self, fetcher: &dyn HtmlFetcher, hint: &SigHint) -> std::result::Result<(), ProofError> {
        let url = hint.api_url();
        let body = fetcher.fetch(url).map_err(|e| e.to_proof_error(url))?;
        let region = {
            let doc = HtmlDocument::parse(&body);
            let selector = self.service.content_selector();
            doc.select_first_html(selector)?
                .ok_or_else(|| ProofError::new(ProofErrorKind::FailedParse, format!("couldn't find {:?}", selector)))?
        };
        let blocks = find_base64_blocks(&region);
        if blocks.is_empty() {
            Err(ProofError::new(ProofErrorKind::ContentMissing, "missing proof content"))?;
        }
        let (sig_body, _) = open_sig(self.proof.armored_sig())
            .map_err(|e| ProofError::new(ProofErrorKind::BadSignature, format!("bad signature: {}", e)))?;
        if !blocks.iter().any(|block| contains_block(block, &sig_body)) {
            Err(ProofError::new(ProofErrorKind::TextNotFound, "signature not found in body"))?;
        }
        Ok(())
    }

    /// Check the proof, consulting the cache first and recording the outcome
    /// in it after. The cache is never held across the fetch.
    pub fn check(&self, fetcher: &dyn HtmlFetcher, cache: &dyn ResultCache, now: &Timestamp) -> CheckResult {
        let sig_id = self.proof.sig_id();
        if let Some(cached) = cache.lookup(sig_id, now) {
            debug!(sig_id = %sig_id, "proof check served from cache");
            return cached;
        }
        let status = self.run_checks(fetcher).err();
        match &status {
            None => debug!(sig_id = %sig_id, service = self.service.type_name(), "proof ok"),
            Some(e) => warn!(sig_id = %sig_id, service = self.service.type_name(), soft = e.is_soft(), error = %e, "proof failed"),
        }
        let result = CheckResult::new(status, now.clone());
        cache.record(sig_id, result.clone());
        result
    }

    fn run_checks(&self, fetcher: &dyn HtmlFetcher) -> std::result::Result<(), ProofError> {
        self.check_username_format()?;
        let hint = self
            .proof
            .hint()
            .as_ref()
            .ok_or_else(|| ProofError::new(ProofErrorKind::NoHint, "no server hint for proof"))?;
        self.check_hint(hint)?;
        self.check_status(fetcher, hint)
    }
}

/// Pull every base64 block that decodes cleanly out of a chunk of text.
///
/// Blocks may be wrapped across lines and may sit right next to prose, so we
/// gather runs of base64-looking words, join each run once, and cut it after
/// every stretch of padding. Each piece is decoded once. The page is remote
/// input, so this stays linear in the size of the text.
pub fn find_base64_blocks(text: &str) -> Vec<Vec<u8>> {
    let mut blocks = Vec::new();
    let mut run = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == '<' || c == '>') {
        if token.is_empty() {
            continue;
        }
        if BASE64_TOKEN.is_match(token) {
            run.push(token);
        } else {
            decode_run(&run, &mut blocks);
            run.clear();
        }
    }
    decode_run(&run, &mut blocks);
    blocks
}

fn decode_run(run: &[&str], blocks: &mut Vec<Vec<u8>>) {
    let joined = run.concat();
    let mut rest = joined.as_str();
    while !rest.is_empty() {
        let end = match rest.find('=') {
            Some(pad) => pad + rest[pad..].find(|c: char| c != '=').unwrap_or(rest.len() - pad),
            None => rest.len(),
        };
        let (segment, tail) = rest.split_at(end);
        decode_segment(segment, blocks);
        rest = tail;
    }
}

fn decode_segment(segment: &str, blocks: &mut Vec<Vec<u8>>) {
    if segment.len() < MIN_BLOCK_LEN {
        return;
    }
    // a block always ends its segment, so words glued on in front show up as
    // a misaligned prefix
    let aligned = &segment[segment.len() % 4..];
    if let Ok(bytes) = ser::base64_decode_std(aligned) {
        blocks.push(bytes);
    }
}

/// Does `block` contain `needle` as a contiguous run of bytes?
fn contains_block(block: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > block.len() {
        return false;
    }
    block.windows(needle.len()).any(|window| bool::from(window.ct_eq(needle)))
}
