//! Remote proofs: claims that an identity also owns a username somewhere else.
//!
//! A proof is posted by the user (a signed statement pasted into their profile
//! on the remote service) and recorded in their sigchain as a proof binding
//! link. Verifying it means going and looking at the remote service (see
//! [checker]), and the result of that is either success or a [ProofError].
//!
//! Proof errors come in two flavors. *Soft* errors are about the remote
//! service being unavailable (5xx, timeouts, DNS) and say nothing about the
//! proof. *Hard* errors mean we looked and the proof isn't right. The cache
//! treats them very differently.

pub mod checker;
pub mod fetch;
pub mod services;

use crate::{chain::link::LinkID, crypto::SigID};
use getset;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

macro_rules! proof_error_kinds {
    ($( $(#[$meta:meta])* $kind:ident = $code:literal, $name:literal, $soft:literal; )*) => {
        /// Every way verifying a remote proof can fail.
        ///
        /// Codes match the proof status numbers the rest of the system (and
        /// anything we've persisted) already uses.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ProofErrorKind {
            $( $(#[$meta])* $kind, )*
        }

        impl ProofErrorKind {
            /// Numeric status code.
            pub fn code(&self) -> u32 {
                match self {
                    $( Self::$kind => $code, )*
                }
            }

            /// Look a kind up by its status code.
            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$kind), )*
                    _ => None,
                }
            }

            /// Is this a transient/infrastructure failure rather than a
            /// problem with the proof itself?
            pub fn is_soft(&self) -> bool {
                match self {
                    $( Self::$kind => $soft, )*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$kind => $name, )*
                }
            }
        }
    }
}

proof_error_kinds! {
    /// Couldn't reach the remote host.
    HostUnreachable = 101, "HOST_UNREACHABLE", true;
    DnsError = 107, "DNS_ERROR", true;
    /// Rate limited.
    Http429 = 129, "HTTP_429", true;
    /// The remote service had a 5xx.
    Http500 = 150, "HTTP_500", true;
    Timeout = 160, "TIMEOUT", true;
    InternalError = 170, "INTERNAL_ERROR", true;
    /// The response was cut off or garbled in transit.
    MalformedResponse = 180, "MALFORMED_RESPONSE", true;
    /// The page had no region where a proof could live.
    FailedParse = 106, "FAILED_PARSE", false;
    NotFound = 201, "NOT_FOUND", false;
    BadUsername = 203, "BAD_USERNAME", false;
    /// The region exists but has no signature block in it.
    TextNotFound = 205, "TEXT_NOT_FOUND", false;
    ContentMissing = 207, "CONTENT_MISSING", false;
    Http300 = 230, "HTTP_300", false;
    Http400 = 240, "HTTP_400", false;
    HttpOther = 260, "HTTP_OTHER", false;
    /// The user took the proof down.
    Deleted = 301, "DELETED", false;
    /// Our own copy of the signature won't open.
    BadSignature = 303, "BAD_SIGNATURE", false;
    /// The server's hint doesn't point where we'd look ourselves.
    BadApiUrl = 304, "BAD_API_URL", false;
    /// No checker registered for this service.
    UnknownType = 305, "UNKNOWN_TYPE", false;
    NoHint = 306, "NO_HINT", false;
}

impl std::fmt::Display for ProofErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A failed proof check. These are results, not exceptions: they're handed
/// back to the caller and cached.
#[derive(Error, Debug, Clone, PartialEq, Eq, getset::Getters)]
#[error("{kind}: {desc}")]
#[getset(get = "pub")]
pub struct ProofError {
    kind: ProofErrorKind,
    desc: String,
}

impl ProofError {
    pub fn new<T: Into<String>>(kind: ProofErrorKind, desc: T) -> Self {
        Self { kind, desc: desc.into() }
    }

    pub fn is_soft(&self) -> bool {
        self.kind.is_soft()
    }
}

/// Where a tracked proof stood when the tracking statement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofState {
    None,
    Ok,
    TempFailure,
    PermFailure,
    Looking,
    Superseded,
    Posted,
    Revoked,
}

impl ProofState {
    pub fn code(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Ok => 1,
            Self::TempFailure => 2,
            Self::PermFailure => 3,
            Self::Looking => 4,
            Self::Superseded => 5,
            Self::Posted => 6,
            Self::Revoked => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let state = match code {
            0 => Self::None,
            1 => Self::Ok,
            2 => Self::TempFailure,
            3 => Self::PermFailure,
            4 => Self::Looking,
            5 => Self::Superseded,
            6 => Self::Posted,
            7 => Self::Revoked,
            _ => return None,
        };
        Some(state)
    }

    /// Turn a check outcome into a tracking state.
    pub fn from_status(status: Option<&ProofError>) -> Self {
        match status {
            None => Self::Ok,
            Some(e) if e.is_soft() => Self::TempFailure,
            Some(_) => Self::PermFailure,
        }
    }
}

impl Serialize for ProofState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ProofState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        ProofState::from_code(code).ok_or_else(|| de::Error::custom(format!("unknown proof state {}", code)))
    }
}

/// The server's idea of where a proof lives.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct SigHint {
    remote_id: String,
    api_url: String,
    human_url: String,
    check_text: String,
}

impl SigHint {
    pub fn new<R, A, H, C>(remote_id: R, api_url: A, human_url: H, check_text: C) -> Self
    where
        R: Into<String>,
        A: Into<String>,
        H: Into<String>,
        C: Into<String>,
    {
        Self {
            remote_id: remote_id.into(),
            api_url: api_url.into(),
            human_url: human_url.into(),
            check_text: check_text.into(),
        }
    }
}

/// A claim that the identity owns `username` on `service_type`.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct RemoteProof {
    service_type: String,
    username: String,
    /// The signature from the identity's own proof binding link. This is what
    /// we expect to find posted on the remote service.
    armored_sig: String,
    sig_id: SigID,
    hint: Option<SigHint>,
}

impl RemoteProof {
    pub fn new<T: Into<String>, U: Into<String>, A: Into<String>>(
        service_type: T,
        username: U,
        armored_sig: A,
        sig_id: SigID,
        hint: Option<SigHint>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            username: username.into(),
            armored_sig: armored_sig.into(),
            sig_id,
            hint,
        }
    }
}

/// A remote proof along with where it sits in its owner's chain, as recorded
/// when tracking them.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct TrackedProof {
    proof: RemoteProof,
    /// ID of the proof binding link.
    link_id: LinkID,
    prev: Option<LinkID>,
    ctime: i64,
    etime: i64,
    state: ProofState,
}

impl TrackedProof {
    pub fn new(proof: RemoteProof, link_id: LinkID, prev: Option<LinkID>, ctime: i64, etime: i64, state: ProofState) -> Self {
        Self { proof, link_id, prev, ctime, etime, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_hard() {
        use ProofErrorKind::*;
        for kind in [HostUnreachable, DnsError, Http429, Http500, Timeout, InternalError, MalformedResponse] {
            assert!(kind.is_soft(), "{} should be soft", kind);
        }
        for kind in [
            BadApiUrl, ContentMissing, FailedParse, BadSignature, TextNotFound, NotFound, Http300, Http400, HttpOther,
            BadUsername, NoHint, UnknownType, Deleted,
        ] {
            assert!(!kind.is_soft(), "{} should be hard", kind);
        }
    }

    #[test]
    fn codes_roundtrip() {
        assert_eq!(ProofErrorKind::BadApiUrl.code(), 304);
        assert_eq!(ProofErrorKind::TextNotFound.code(), 205);
        assert_eq!(ProofErrorKind::from_code(150), Some(ProofErrorKind::Http500));
        assert_eq!(ProofErrorKind::from_code(160), Some(ProofErrorKind::Timeout));
        assert_eq!(ProofErrorKind::from_code(106), Some(ProofErrorKind::FailedParse));
        assert_eq!(ProofErrorKind::from_code(999), None);
    }

    #[test]
    fn error_display() {
        let err = ProofError::new(ProofErrorKind::BadApiUrl, "wanted x, got y");
        assert_eq!(format!("{}", err), "BAD_API_URL: wanted x, got y");
        assert!(!err.is_soft());
    }

    #[test]
    fn state_from_status() {
        assert_eq!(ProofState::from_status(None), ProofState::Ok);
        let soft = ProofError::new(ProofErrorKind::Timeout, "slow");
        let hard = ProofError::new(ProofErrorKind::TextNotFound, "gone");
        assert_eq!(ProofState::from_status(Some(&soft)), ProofState::TempFailure);
        assert_eq!(ProofState::from_status(Some(&hard)), ProofState::PermFailure);
        assert_eq!(serde_json::to_string(&ProofState::PermFailure).unwrap(), "3");
        assert!(serde_json::from_str::<ProofState>("12").is_err());
    }
}
