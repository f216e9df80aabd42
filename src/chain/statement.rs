//! Statements are the unsigned, canonical form of a chain link.
//!
//! A [StatementBuilder] takes the caller's view of an identity (its tail, its
//! keys, its devices) plus a [LinkBody] describing the event being recorded,
//! and produces a [Statement]. The statement's json form is what gets signed,
//! and what the link ID is computed over, so field order and presence here are
//! fixed: every struct lists its fields alphabetically, and sections that don't
//! apply to a link type are left out entirely rather than written as null.

use crate::{
    chain::link::{ChainLink, ChainTail, LinkID, Seqno},
    config::StatementConfig,
    crypto::{Hash, KeyID, SigID, Signer},
    error::{Error, Result},
    identity::{Device, DeviceID, DeviceStatus, Identity, UserID},
    proof::{checker::ServiceRegistry, ProofState, TrackedProof},
    util::{ser, ser::double_option, Timestamp},
};
use getset;
use rand::{CryptoRng, RngCore};
use serde_derive::{Deserialize, Serialize};

/// The tag every statement carries.
pub const STATEMENT_TAG: &str = "signature";
/// Version of the statement body layout.
pub const BODY_VERSION: u32 = 1;
/// Version of the password-hashing scheme named in passphrase updates.
pub const PASSPHRASE_HASH_VERSION: u32 = 3;
/// `sig_type` written into tracked remote proofs.
const REMOTE_PROOF_SIG_TYPE: u32 = 2;

/// What kind of event a link records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Eldest,
    Sibkey,
    Subkey,
    PgpUpdate,
    Revoke,
    Track,
    Untrack,
    WebServiceBinding,
    Cryptocurrency,
    UpdatePassphraseHash,
    Authentication,
}

/// Which client wrote the statement.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct ClientInfo {
    name: String,
    version: String,
}

/// A snapshot of the merkle tree root, as the client last saw it.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct MerkleRoot {
    ctime: i64,
    hash: String,
    seqno: u64,
}

impl MerkleRoot {
    pub fn new<T: Into<String>>(ctime: i64, hash: T, seqno: u64) -> Self {
        Self { ctime, hash: hash.into(), seqno }
    }
}

/// Something that knows the latest merkle root. Not having one (or it not
/// knowing) just means the statement doesn't reference the tree.
pub trait MerkleRootSource {
    fn latest_root(&self) -> Option<MerkleRoot>;
}

/// The signing key section, present on every statement.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct KeySection {
    eldest_kid: KeyID,
    /// Only set on eldest links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_hash: Option<Hash>,
    host: String,
    kid: KeyID,
    uid: UserID,
    username: String,
}

/// A key being delegated to (sibkey, subkey, pgp_update).
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct DelegatedKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_hash: Option<Hash>,
    kid: KeyID,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_kid: Option<KeyID>,
    /// Sibkeys always carry this, even if it's null: the reverse signature is
    /// filled in after the new key counter-signs the statement.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option::deserialize")]
    reverse_sig: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct DeviceSection {
    id: DeviceID,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyID>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    status: DeviceStatus,
    #[serde(rename = "type")]
    ty: String,
}

impl DeviceSection {
    fn from_device(device: &Device, kid: Option<KeyID>, status: DeviceStatus) -> Self {
        Self {
            id: device.id().clone(),
            kid,
            name: device.name().clone(),
            status,
            ty: device.ty().clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct RevokeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kids: Option<Vec<KeyID>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sig_id: Option<SigID>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sig_ids: Option<Vec<SigID>>,
}

/// A service's canonical view of a claimed username.
#[derive(Debug, Clone, PartialEq, Eq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct ServiceSection {
    name: String,
    username: String,
}

impl ServiceSection {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, username: U) -> Self {
        Self { name: name.into(), username: username.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyType {
    Bitcoin,
    Zcash,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct CryptocurrencySection {
    address: String,
    #[serde(rename = "type")]
    ty: CurrencyType,
}

/// Records a passphrase change. `hash` is the derived password hash, never
/// the passphrase.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct PassphraseSection {
    hash: String,
    passphrase_generation: u64,
    version: u32,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct AuthSection {
    nonce: String,
    session: String,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct TrackBasics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_id_change: Option<i64>,
    username: String,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct TrackKey {
    kid: KeyID,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct RemoteKeyProof {
    check_data_json: ServiceSection,
    proof_type: u32,
    state: ProofState,
}

/// One of the target's remote proofs, as we saw it when we tracked them.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct RemoteProofEntry {
    ctime: i64,
    curr: LinkID,
    etime: i64,
    prev: Option<LinkID>,
    remote_key_proof: RemoteKeyProof,
    sig_id: SigID,
    sig_type: u32,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct SeqTail {
    payload_hash: LinkID,
    seqno: Seqno,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct TrackSection {
    basics: TrackBasics,
    id: UserID,
    key: TrackKey,
    remote_proofs: Vec<RemoteProofEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seq_tail: Option<SeqTail>,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct UntrackBasics {
    username: String,
}

#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct UntrackSection {
    basics: UntrackBasics,
    id: UserID,
}

/// The `body` of a statement. Exactly the sections that apply to `ty` are
/// set.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct StatementBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<AuthSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cryptocurrency: Option<CryptocurrencySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device: Option<DeviceSection>,
    key: KeySection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pgp_update: Option<DelegatedKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revoke: Option<RevokeSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<ServiceSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sibkey: Option<DelegatedKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subkey: Option<DelegatedKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track: Option<TrackSection>,
    #[serde(rename = "type")]
    ty: LinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    untrack: Option<UntrackSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update_passphrase_hash: Option<PassphraseSection>,
    version: u32,
}

impl StatementBody {
    fn new(ty: LinkType, key: KeySection) -> Self {
        Self {
            auth: None,
            cryptocurrency: None,
            device: None,
            key,
            pgp_update: None,
            revoke: None,
            service: None,
            sibkey: None,
            subkey: None,
            track: None,
            ty,
            untrack: None,
            update_passphrase_hash: None,
            version: BODY_VERSION,
        }
    }
}

/// An unsigned chain statement.
#[derive(Debug, Clone, PartialEq, getset::Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct Statement {
    body: StatementBody,
    client: ClientInfo,
    ctime: i64,
    expire_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merkle_root: Option<MerkleRoot>,
    prev: Option<LinkID>,
    seqno: Seqno,
    tag: String,
}

impl Statement {
    /// The exact bytes to sign.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        ser::canonical_json(self)
    }

    /// Sign this statement, producing a link ready to be appended. The signer
    /// has to be the key the statement names.
    pub fn sign(&self, signer: &dyn Signer) -> Result<ChainLink> {
        if &signer.key_id() != self.body().key().kid() {
            Err(Error::CryptoBadKey)?;
        }
        let payload = self.to_canonical_bytes()?;
        let (sig, sig_id) = signer.sign_to_string(&payload)?;
        ChainLink::from_signed(payload, sig, sig_id)
    }
}

/// How a new key relates to the identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Delegation {
    /// The identity's first key. It signs its own delegation.
    Eldest,
    /// A peer of the signing key, which counter-signs the statement.
    Sibkey { reverse_sig: Option<String> },
    /// A key subordinate to `parent_kid` (ie, an encryption key).
    Subkey { parent_kid: KeyID },
    /// An update to an imported PGP key.
    PgpUpdate,
}

/// What a revocation revokes.
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeTarget {
    Keys(Vec<KeyID>),
    Sigs(Vec<SigID>),
}

/// The event a link records, with the caller-supplied data it needs.
#[derive(Debug, Clone)]
pub enum LinkBody {
    KeyDelegation {
        kind: Delegation,
        new_key: KeyID,
        device: Option<Device>,
    },
    Revocation {
        target: RevokeTarget,
        disable_device: Option<DeviceID>,
    },
    Track {
        target: Identity,
        proofs: Vec<TrackedProof>,
    },
    Untrack {
        target: Identity,
    },
    ProofBinding {
        service: String,
        username: String,
    },
    CryptoAddressBinding {
        address: String,
        currency: CurrencyType,
        revoke: Option<SigID>,
    },
    PassphraseUpdate {
        hash: String,
        generation: u64,
    },
    Authentication {
        session: String,
        nonce: [u8; 16],
    },
}

impl LinkBody {
    /// An authentication statement with a fresh random nonce.
    pub fn authentication<R: RngCore + CryptoRng, T: Into<String>>(rng: &mut R, session: T) -> Self {
        let mut nonce = [0u8; 16];
        rng.fill_bytes(&mut nonce);
        Self::Authentication { session: session.into(), nonce }
    }

    pub fn link_type(&self) -> LinkType {
        match self {
            Self::KeyDelegation { kind, .. } => match kind {
                Delegation::Eldest => LinkType::Eldest,
                Delegation::Sibkey { .. } => LinkType::Sibkey,
                Delegation::Subkey { .. } => LinkType::Subkey,
                Delegation::PgpUpdate => LinkType::PgpUpdate,
            },
            Self::Revocation { .. } => LinkType::Revoke,
            Self::Track { .. } => LinkType::Track,
            Self::Untrack { .. } => LinkType::Untrack,
            Self::ProofBinding { .. } => LinkType::WebServiceBinding,
            Self::CryptoAddressBinding { .. } => LinkType::Cryptocurrency,
            Self::PassphraseUpdate { .. } => LinkType::UpdatePassphraseHash,
            Self::Authentication { .. } => LinkType::Authentication,
        }
    }
}

/// Builds statements for one identity, signed by one key.
///
/// ```ignore
/// let statement = StatementBuilder::new(&me, kid, &config.statement)
///     .services(&registry)
///     .build(LinkBody::ProofBinding { service: "coinbase".into(), username: "alice".into() })?;
/// ```
pub struct StatementBuilder<'a> {
    me: &'a Identity,
    signing_kid: KeyID,
    config: &'a StatementConfig,
    ctime: Option<Timestamp>,
    expire_in: u64,
    last_link: Option<ChainTail>,
    merkle: Option<&'a dyn MerkleRootSource>,
    services: Option<&'a ServiceRegistry>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(me: &'a Identity, signing_kid: KeyID, config: &'a StatementConfig) -> Self {
        Self {
            me,
            signing_kid,
            config,
            ctime: None,
            expire_in: 0,
            last_link: None,
            merkle: None,
            services: None,
        }
    }

    /// Pin the creation time (defaults to now).
    pub fn ctime(mut self, ctime: Timestamp) -> Self {
        self.ctime = Some(ctime);
        self
    }

    /// Set the validity window in seconds. Zero means the configured default.
    pub fn expire_in(mut self, secs: u64) -> Self {
        self.expire_in = secs;
        self
    }

    /// Build on this tail instead of the identity's own. Used when delegating
    /// a key without having the chain loaded.
    pub fn last_link(mut self, tail: ChainTail) -> Self {
        self.last_link = Some(tail);
        self
    }

    pub fn merkle_root_source(mut self, source: &'a dyn MerkleRootSource) -> Self {
        self.merkle = Some(source);
        self
    }

    pub fn services(mut self, registry: &'a ServiceRegistry) -> Self {
        self.services = Some(registry);
        self
    }

    /// Build a statement following the explicit last link if we were given
    /// one, otherwise the identity's tail.
    pub fn build(&self, body: LinkBody) -> Result<Statement> {
        let tail = self.last_link.as_ref().or(self.me.tail().as_ref());
        self.build_on(tail, body)
    }

    /// Build a statement that follows `tail` (`None` for an empty chain).
    pub fn build_on(&self, tail: Option<&ChainTail>, body: LinkBody) -> Result<Statement> {
        let (seqno, prev) = match tail {
            Some(tail) => (tail.seqno().next(), Some(tail.link_id().clone())),
            None => (Seqno::FIRST, None),
        };
        let ctime = self.ctime.clone().unwrap_or_else(Timestamp::now);
        let expire_in = if self.expire_in == 0 { *self.config.expire_in_secs() } else { self.expire_in };

        let ty = body.link_type();
        let mut sbody = match &body {
            LinkBody::KeyDelegation { kind: Delegation::Eldest, new_key, .. } => {
                if new_key != &self.signing_kid {
                    Err(Error::CryptoBadKey)?;
                }
                let mut key = self.key_section(new_key.clone());
                key.full_hash = Some(new_key.full_hash());
                StatementBody::new(ty, key)
            }
            _ => StatementBody::new(ty, self.key_section(self.me.require_eldest()?.clone())),
        };

        match body {
            LinkBody::KeyDelegation { kind, new_key, device } => {
                sbody.device = device.map(|d| DeviceSection::from_device(&d, Some(new_key.clone()), DeviceStatus::Active));
                match kind {
                    Delegation::Eldest => {}
                    Delegation::Sibkey { reverse_sig } => {
                        sbody.sibkey = Some(DelegatedKey {
                            full_hash: Some(new_key.full_hash()),
                            kid: new_key,
                            parent_kid: None,
                            reverse_sig: Some(reverse_sig),
                        });
                    }
                    Delegation::Subkey { parent_kid } => {
                        sbody.subkey = Some(DelegatedKey {
                            full_hash: None,
                            kid: new_key,
                            parent_kid: Some(parent_kid),
                            reverse_sig: None,
                        });
                    }
                    Delegation::PgpUpdate => {
                        sbody.pgp_update = Some(DelegatedKey {
                            full_hash: Some(new_key.full_hash()),
                            kid: new_key,
                            parent_kid: None,
                            reverse_sig: None,
                        });
                    }
                }
            }
            LinkBody::Revocation { target, disable_device } => {
                sbody.revoke = Some(match target {
                    RevokeTarget::Keys(kids) => RevokeSection { kids: Some(kids), ..Default::default() },
                    RevokeTarget::Sigs(sig_ids) => RevokeSection { sig_ids: Some(sig_ids), ..Default::default() },
                });
                if let Some(device_id) = disable_device {
                    let device = self.me.require_device(&device_id)?;
                    sbody.device = Some(DeviceSection::from_device(device, None, DeviceStatus::Defunct));
                }
            }
            LinkBody::Track { target, proofs } => {
                sbody.track = Some(self.track_section(&target, &proofs)?);
            }
            LinkBody::Untrack { target } => {
                sbody.untrack = Some(UntrackSection {
                    basics: UntrackBasics { username: target.username().clone() },
                    id: target.uid().clone(),
                });
            }
            LinkBody::ProofBinding { service, username } => {
                let service_type = self.registry(&service)?;
                sbody.service = Some(service_type.to_service_section(&username)?);
            }
            LinkBody::CryptoAddressBinding { address, currency, revoke } => {
                sbody.cryptocurrency = Some(CryptocurrencySection { address, ty: currency });
                sbody.revoke = revoke.map(|sig_id| RevokeSection { sig_id: Some(sig_id), ..Default::default() });
            }
            LinkBody::PassphraseUpdate { hash, generation } => {
                sbody.update_passphrase_hash = Some(PassphraseSection {
                    hash,
                    passphrase_generation: generation,
                    version: PASSPHRASE_HASH_VERSION,
                });
            }
            LinkBody::Authentication { session, nonce } => {
                sbody.auth = Some(AuthSection { nonce: hex::encode(nonce), session });
            }
        }

        Ok(Statement {
            body: sbody,
            client: ClientInfo {
                name: self.config.client_name().clone(),
                version: self.config.client_version().clone(),
            },
            ctime: ctime.unix(),
            expire_in,
            merkle_root: self.merkle.and_then(|m| m.latest_root()),
            prev,
            seqno,
            tag: STATEMENT_TAG.into(),
        })
    }

    fn key_section(&self, eldest_kid: KeyID) -> KeySection {
        KeySection {
            eldest_kid,
            full_hash: None,
            host: self.config.host().clone(),
            kid: self.signing_kid.clone(),
            uid: self.me.uid().clone(),
            username: self.me.username().clone(),
        }
    }

    fn registry(&self, service: &str) -> Result<&'a dyn crate::proof::checker::ServiceType> {
        self.services
            .and_then(|r| r.get(service))
            .ok_or_else(|| Error::UnknownServiceType(service.into()))
    }

    fn track_section(&self, target: &Identity, proofs: &[TrackedProof]) -> Result<TrackSection> {
        let kid = target.require_eldest()?.clone();
        let remote_proofs = proofs
            .iter()
            .map(|tracked| {
                let proof = tracked.proof();
                let service_type = self.registry(proof.service_type())?;
                Ok(RemoteProofEntry {
                    ctime: *tracked.ctime(),
                    curr: tracked.link_id().clone(),
                    etime: *tracked.etime(),
                    prev: tracked.prev().clone(),
                    remote_key_proof: RemoteKeyProof {
                        check_data_json: service_type.to_service_section(proof.username())?,
                        proof_type: service_type.proof_type(),
                        state: *tracked.state(),
                    },
                    sig_id: proof.sig_id().clone(),
                    sig_type: REMOTE_PROOF_SIG_TYPE,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TrackSection {
            basics: TrackBasics {
                id_version: *target.id_version(),
                last_id_change: *target.last_id_change(),
                username: target.username().clone(),
            },
            id: target.uid().clone(),
            key: TrackKey { kid },
            remote_proofs,
            seq_tail: target.tail().as_ref().map(|tail| SeqTail {
                payload_hash: tail.link_id().clone(),
                seqno: *tail.seqno(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::SignKeypair,
        proof::{RemoteProof, TrackedProof},
        util::test,
    };
    use serde_json::Value;
    use std::str::FromStr;

    struct FixedRoot;
    impl MerkleRootSource for FixedRoot {
        fn latest_root(&self) -> Option<MerkleRoot> {
            Some(MerkleRoot::new(1500000000, "d2f3", 812))
        }
    }

    fn setup() -> (SignKeypair, Identity, StatementConfig, ServiceRegistry) {
        let key = SignKeypair::new_ed25519(&mut test::rng());
        let uid = UserID::from_str("dbb165b7879fe7b1174df73bed0b9519").unwrap();
        let me = Identity::new(uid, "t_alice").with_eldest(key.key_id());
        (key, me, StatementConfig::default(), ServiceRegistry::with_defaults())
    }

    fn json(statement: &Statement) -> Value {
        serde_json::from_slice(&statement.to_canonical_bytes().unwrap()).unwrap()
    }

    #[test]
    fn build_first_and_next() {
        let (key, me, config, _) = setup();
        let builder = StatementBuilder::new(&me, key.key_id(), &config);
        let body = LinkBody::PassphraseUpdate { hash: "ab12".into(), generation: 3 };
        let first = builder.build(body.clone()).unwrap();
        assert_eq!(first.seqno(), &Seqno::FIRST);
        assert_eq!(first.prev(), &None);
        assert_eq!(first.expire_in(), config.expire_in_secs());
        assert_eq!(first.tag(), STATEMENT_TAG);

        let tail = ChainTail::new(Seqno::new(7), LinkID::random());
        let next = builder.build_on(Some(&tail), body).unwrap();
        assert_eq!(next.seqno(), &Seqno::new(8));
        assert_eq!(next.prev().as_ref(), Some(tail.link_id()));
    }

    #[test]
    fn build_explicit_last_link_wins() {
        let (key, me, config, _) = setup();
        let me = me.with_tail(ChainTail::new(Seqno::new(2), LinkID::random()));
        let over = ChainTail::new(Seqno::new(10), LinkID::random());
        let statement = StatementBuilder::new(&me, key.key_id(), &config)
            .last_link(over.clone())
            .build(LinkBody::PassphraseUpdate { hash: "x".into(), generation: 1 })
            .unwrap();
        assert_eq!(statement.seqno(), &Seqno::new(11));
        assert_eq!(statement.prev().as_ref(), Some(over.link_id()));
    }

    #[test]
    fn build_is_deterministic() {
        let (key, me, config, registry) = setup();
        let ts = Timestamp::from_unix(1600000000);
        let build = || {
            StatementBuilder::new(&me, key.key_id(), &config)
                .ctime(ts.clone())
                .expire_in(600)
                .services(&registry)
                .build(LinkBody::ProofBinding { service: "coinbase".into(), username: "@Alice".into() })
                .unwrap()
                .to_canonical_bytes()
                .unwrap()
        };
        let bytes = build();
        assert_eq!(bytes, build());
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"body":{"key":{"eldest_kid":"#));
        assert!(text.contains(r#""service":{"name":"coinbase","username":"alice"},"type":"web_service_binding","version":1}"#));
        assert!(text.contains(r#""ctime":1600000000,"expire_in":600,"prev":null,"seqno":1,"tag":"signature"}"#));
        assert!(!text.contains("merkle_root"));
        assert!(!text.contains(' '));
    }

    #[test]
    fn build_needs_active_key() {
        let (key, _, config, _) = setup();
        let me = Identity::new(UserID::random(), "t_nobody");
        let res = StatementBuilder::new(&me, key.key_id(), &config)
            .build(LinkBody::PassphraseUpdate { hash: "x".into(), generation: 1 });
        assert!(matches!(res, Err(Error::IncompleteIdentity(_))));
    }

    #[test]
    fn build_eldest() {
        let (key, _, config, _) = setup();
        let me = Identity::new(UserID::random(), "t_new");
        let statement = StatementBuilder::new(&me, key.key_id(), &config)
            .build(LinkBody::KeyDelegation { kind: Delegation::Eldest, new_key: key.key_id(), device: None })
            .unwrap();
        assert_eq!(statement.body().ty(), &LinkType::Eldest);
        assert_eq!(statement.body().key().eldest_kid(), &key.key_id());
        assert_eq!(statement.body().key().full_hash(), &Some(key.key_id().full_hash()));

        // an eldest link is self-signed
        let other = KeyID::random();
        let res = StatementBuilder::new(&me, key.key_id(), &config)
            .build(LinkBody::KeyDelegation { kind: Delegation::Eldest, new_key: other, device: None });
        assert_eq!(res.err(), Some(Error::CryptoBadKey));
    }

    #[test]
    fn build_sibkey_and_subkey() {
        let (key, me, config, _) = setup();
        let builder = StatementBuilder::new(&me, key.key_id(), &config);
        let new_key = KeyID::random();
        let device = Device::new(DeviceID::new("d0"), "desktop", Some("home".into()));
        let sib = builder
            .build(LinkBody::KeyDelegation {
                kind: Delegation::Sibkey { reverse_sig: None },
                new_key: new_key.clone(),
                device: Some(device),
            })
            .unwrap();
        let value = json(&sib);
        assert_eq!(value["body"]["type"], "sibkey");
        assert_eq!(value["body"]["sibkey"]["reverse_sig"], Value::Null);
        assert!(value["body"]["sibkey"].as_object().unwrap().contains_key("reverse_sig"));
        assert_eq!(value["body"]["sibkey"]["kid"], new_key.as_string());
        assert_eq!(value["body"]["sibkey"]["full_hash"], format!("{}", new_key.full_hash()));
        assert_eq!(value["body"]["device"]["kid"], new_key.as_string());
        assert_eq!(value["body"]["device"]["status"], 1);
        assert_eq!(value["body"]["device"]["type"], "desktop");

        let sub = builder
            .build(LinkBody::KeyDelegation {
                kind: Delegation::Subkey { parent_kid: key.key_id() },
                new_key: new_key.clone(),
                device: None,
            })
            .unwrap();
        let value = json(&sub);
        assert_eq!(value["body"]["subkey"]["parent_kid"], key.key_id().as_string());
        assert!(value["body"]["subkey"].get("reverse_sig").is_none());
        assert!(value["body"].get("device").is_none());
    }

    #[test]
    fn build_revocations() {
        let (key, mut me, config, _) = setup();
        let dev = DeviceID::new("d1");
        let kids = vec![KeyID::random(), KeyID::random()];
        {
            let builder = StatementBuilder::new(&me, key.key_id(), &config);
            let statement = builder
                .build(LinkBody::Revocation { target: RevokeTarget::Keys(kids.clone()), disable_device: None })
                .unwrap();
            assert_eq!(statement.body().revoke().as_ref().unwrap().kids(), &Some(kids.clone()));
            assert_eq!(statement.body().revoke().as_ref().unwrap().sig_ids(), &None);

            let res = builder.build(LinkBody::Revocation { target: RevokeTarget::Keys(kids.clone()), disable_device: Some(dev.clone()) });
            assert!(matches!(res, Err(Error::IncompleteIdentity(_))));
        }
        me.add_device(Device::new(dev.clone(), "mobile", None));
        let statement = StatementBuilder::new(&me, key.key_id(), &config)
            .build(LinkBody::Revocation { target: RevokeTarget::Sigs(vec![SigID::random()]), disable_device: Some(dev) })
            .unwrap();
        let value = json(&statement);
        assert_eq!(value["body"]["type"], "revoke");
        assert_eq!(value["body"]["device"]["status"], 2);
        assert_eq!(value["body"]["revoke"]["sig_ids"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn build_proof_binding_checks_username() {
        let (key, me, config, registry) = setup();
        let builder = StatementBuilder::new(&me, key.key_id(), &config);
        let body = LinkBody::ProofBinding { service: "coinbase".into(), username: "alice".into() };
        assert_eq!(builder.build(body.clone()).err(), Some(Error::UnknownServiceType("coinbase".into())));

        let builder = builder.services(&registry);
        let res = builder.build(LinkBody::ProofBinding { service: "coinbase".into(), username: "a".into() });
        assert!(matches!(res, Err(Error::BadUsername { .. })));
        let res = builder.build(LinkBody::ProofBinding { service: "myspace".into(), username: "tom".into() });
        assert_eq!(res.err(), Some(Error::UnknownServiceType("myspace".into())));
        let statement = builder.build(body).unwrap();
        assert_eq!(statement.body().service(), &Some(ServiceSection::new("coinbase", "alice")));
    }

    #[test]
    fn build_track_untrack() {
        let (key, me, config, registry) = setup();
        let them_key = KeyID::random();
        let tail = ChainTail::new(Seqno::new(4), LinkID::random());
        let mut them = Identity::new(UserID::random(), "t_bob").with_eldest(them_key.clone()).with_tail(tail.clone());
        them.set_last_id_change(Some(1400000000));
        let proof = RemoteProof::new("hackernews", "bob", "armored", SigID::random(), None);
        let tracked = TrackedProof::new(proof, LinkID::random(), None, 1400000000, 1900000000, ProofState::Ok);

        let builder = StatementBuilder::new(&me, key.key_id(), &config).services(&registry);
        let statement = builder.build(LinkBody::Track { target: them.clone(), proofs: vec![tracked] }).unwrap();
        let value = json(&statement);
        let track = &value["body"]["track"];
        assert_eq!(track["basics"]["username"], "t_bob");
        assert_eq!(track["basics"]["last_id_change"], 1400000000);
        assert!(track["basics"].get("id_version").is_none());
        assert_eq!(track["key"]["kid"], them_key.as_string());
        assert_eq!(track["seq_tail"]["seqno"], 4);
        let rp = &track["remote_proofs"][0];
        assert_eq!(rp["sig_type"], 2);
        assert_eq!(rp["prev"], Value::Null);
        assert_eq!(rp["remote_key_proof"]["proof_type"], 6);
        assert_eq!(rp["remote_key_proof"]["state"], 1);
        assert_eq!(rp["remote_key_proof"]["check_data_json"]["name"], "hackernews");

        let keyless = Identity::new(UserID::random(), "t_ghost");
        let res = builder.build(LinkBody::Track { target: keyless.clone(), proofs: vec![] });
        assert!(matches!(res, Err(Error::IncompleteIdentity(_))));

        let statement = builder.build(LinkBody::Untrack { target: keyless.clone() }).unwrap();
        assert_eq!(statement.body().untrack().as_ref().unwrap().id(), keyless.uid());
        assert_eq!(statement.body().ty(), &LinkType::Untrack);
    }

    #[test]
    fn build_misc_bodies() {
        let (key, me, config, _) = setup();
        let root = FixedRoot;
        let builder = StatementBuilder::new(&me, key.key_id(), &config).merkle_root_source(&root);

        let revoked = SigID::random();
        let statement = builder
            .build(LinkBody::CryptoAddressBinding {
                address: "1BoatSLRHtKNngkdXEeobR76b53LETtpyT".into(),
                currency: CurrencyType::Bitcoin,
                revoke: Some(revoked.clone()),
            })
            .unwrap();
        let value = json(&statement);
        assert_eq!(value["body"]["cryptocurrency"]["type"], "bitcoin");
        assert_eq!(value["body"]["revoke"]["sig_id"], format!("{}", revoked));
        assert_eq!(value["merkle_root"]["seqno"], 812);

        let statement = builder.build(LinkBody::PassphraseUpdate { hash: "c0ffee".into(), generation: 9 }).unwrap();
        let value = json(&statement);
        assert_eq!(value["body"]["update_passphrase_hash"]["version"], 3);
        assert_eq!(value["body"]["update_passphrase_hash"]["passphrase_generation"], 9);
        assert_eq!(value["body"]["type"], "update_passphrase_hash");

        let statement = builder.build(LinkBody::authentication(&mut test::rng(), "s3ss")).unwrap();
        let nonce = statement.body().auth().as_ref().unwrap().nonce();
        assert_eq!(nonce.len(), 32);
        assert!(hex::decode(nonce).is_ok());
    }

    #[test]
    fn sign_checks_signer_and_roundtrips() {
        let (key, me, config, _) = setup();
        let statement = StatementBuilder::new(&me, key.key_id(), &config)
            .build(LinkBody::PassphraseUpdate { hash: "x".into(), generation: 1 })
            .unwrap();
        let link = statement.sign(&key).unwrap();
        assert_eq!(link.statement(), &statement);
        assert_eq!(link.payload(), &statement.to_canonical_bytes().unwrap());
        link.verify_id().unwrap();
        link.verify_signature().unwrap();

        let stranger = SignKeypair::new_ed25519_from_bytes([1u8; 32]);
        assert_eq!(statement.sign(&stranger).err(), Some(Error::CryptoBadKey));
    }
}
