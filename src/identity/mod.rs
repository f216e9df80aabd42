//! The identity module holds the caller-supplied state we need to write chain
//! statements: who the user is, their eldest key, the devices they've
//! provisioned, and where their sigchain currently ends.
//!
//! None of this is authoritative; the engine layer loads it (from the server,
//! from local storage) and hands it to the
//! [StatementBuilder][crate::chain::StatementBuilder].

use crate::{
    chain::ChainTail,
    crypto::KeyID,
    error::{Error, Result},
};
use getset;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_derive::{Deserialize as De, Serialize as Ser};
use std::collections::HashMap;
use std::str::FromStr;

/// Trailer byte on every user ID.
const UID_SUFFIX: u8 = 0x19;
/// Number of bytes in a user ID.
const UID_LEN: usize = 16;

/// A user's unique (and permanent) ID: 16 bytes, hex-encoded, ending in `19`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserID([u8; UID_LEN]);

impl UserID {
    pub fn as_string(&self) -> String {
        hex::encode(self.0)
    }

    #[cfg(test)]
    pub(crate) fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; UID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        bytes[UID_LEN - 1] = UID_SUFFIX;
        Self(bytes)
    }
}

impl FromStr for UserID {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; UID_LEN] = hex::decode(s)?.try_into().map_err(|_| Error::BadLength)?;
        if bytes[UID_LEN - 1] != UID_SUFFIX {
            Err(Error::BadUserID(format!("bad suffix in {}", s)))?;
        }
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl Serialize for UserID {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for UserID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        UserID::from_str(&s).map_err(de::Error::custom)
    }
}

/// Opaque device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ser, De)]
pub struct DeviceID(String);

impl DeviceID {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DeviceID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a device is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Active,
    Defunct,
}

impl DeviceStatus {
    /// Wire value (1 active, 2 defunct)
    pub fn code(&self) -> u8 {
        match self {
            Self::Active => 1,
            Self::Defunct => 2,
        }
    }
}

impl Serialize for DeviceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for DeviceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(Self::Active),
            2 => Ok(Self::Defunct),
            x => Err(de::Error::custom(format!("unknown device status {}", x))),
        }
    }
}

/// A provisioned device (a desktop, a phone, a paper key...)
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct Device {
    id: DeviceID,
    /// "desktop", "mobile", "backup", ...
    ty: String,
    name: Option<String>,
    status: DeviceStatus,
}

impl Device {
    pub fn new<T: Into<String>>(id: DeviceID, ty: T, name: Option<String>) -> Self {
        Self {
            id,
            ty: ty.into(),
            name,
            status: DeviceStatus::Active,
        }
    }
}

/// Everything we know about a user that a chain statement might need.
#[derive(Debug, Clone, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct Identity {
    uid: UserID,
    username: String,
    /// The root key. An identity without one has nothing to sign with and
    /// nothing for others to track.
    eldest_kid: Option<KeyID>,
    /// Where this user's sigchain ends, as far as we know.
    tail: Option<ChainTail>,
    /// Known devices, by ID.
    devices: HashMap<DeviceID, Device>,
    last_id_change: Option<i64>,
    id_version: Option<i64>,
}

impl Identity {
    /// Create a brand new identity with no keys and an empty chain.
    pub fn new<T: Into<String>>(uid: UserID, username: T) -> Self {
        Self {
            uid,
            username: username.into(),
            eldest_kid: None,
            tail: None,
            devices: HashMap::new(),
            last_id_change: None,
            id_version: None,
        }
    }

    /// Builder-style eldest key setter.
    pub fn with_eldest(mut self, kid: KeyID) -> Self {
        self.eldest_kid = Some(kid);
        self
    }

    /// Builder-style tail setter.
    pub fn with_tail(mut self, tail: ChainTail) -> Self {
        self.tail = Some(tail);
        self
    }

    /// Register a device with this identity.
    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.id().clone(), device);
    }

    /// Does this identity have a key others can track and we can sign under?
    pub fn has_active_key(&self) -> bool {
        self.eldest_kid.is_some()
    }

    /// Grab the eldest key, or complain about it.
    pub fn require_eldest(&self) -> Result<&KeyID> {
        self.eldest_kid
            .as_ref()
            .ok_or_else(|| Error::IncompleteIdentity(format!("user {} doesn't have an active key", self.username)))
    }

    /// Grab a known device, or complain about it.
    pub fn require_device(&self, id: &DeviceID) -> Result<&Device> {
        self.devices
            .get(id)
            .ok_or_else(|| Error::IncompleteIdentity(format!("user {} has no device {}", self.username, id)))
    }
}
