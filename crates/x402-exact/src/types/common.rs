use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

pub type AnyJson = serde_json::Value;

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq)]
pub enum X402Version {
    #[default]
    V1,
}

impl X402Version {
    pub fn as_u8(&self) -> u8 {
        match self {
            X402Version::V1 => 1,
        }
    }
}

impl TryFrom<u64> for X402Version {
    type Error = UnsupportedVersion;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            other => Err(UnsupportedVersion(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown X402 version: {0}")]
pub struct UnsupportedVersion(pub u64);

impl Serialize for X402Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u64::deserialize(deserializer)?;
        X402Version::try_from(v).map_err(serde::de::Error::custom)
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
