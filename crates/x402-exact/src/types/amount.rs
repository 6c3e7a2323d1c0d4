use std::{fmt::Display, str::FromStr};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// An amount of a token in its smallest indivisible unit.
///
/// Carried on the wire as a base-10 string of at most [`AmountValue::MAX_DIGITS`] digits,
/// never as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AmountValue(U256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must only contain base-10 digits: {0:?}")]
    NotAnInteger(String),
    #[error("amount exceeds {max} digits: {0}", max = AmountValue::MAX_DIGITS)]
    TooManyDigits(String),
}

impl AmountValue {
    pub const MAX_DIGITS: usize = 18;

    pub fn value(&self) -> U256 {
        self.0
    }
}

impl From<u8> for AmountValue {
    fn from(value: u8) -> Self {
        AmountValue(U256::from(value))
    }
}

impl From<u16> for AmountValue {
    fn from(value: u16) -> Self {
        AmountValue(U256::from(value))
    }
}

impl From<u32> for AmountValue {
    fn from(value: u32) -> Self {
        AmountValue(U256::from(value))
    }
}

impl TryFrom<u64> for AmountValue {
    type Error = AmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        AmountValue::try_from(U256::from(value))
    }
}

impl TryFrom<U256> for AmountValue {
    type Error = AmountError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        let digits = value.to_string();
        if digits.len() > Self::MAX_DIGITS {
            return Err(AmountError::TooManyDigits(digits));
        }
        Ok(AmountValue(value))
    }
}

impl FromStr for AmountValue {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::NotAnInteger(s.to_string()));
        }
        if s.len() > Self::MAX_DIGITS {
            return Err(AmountError::TooManyDigits(s.to_string()));
        }
        U256::from_str_radix(s, 10)
            .map(AmountValue)
            .map_err(|_| AmountError::NotAnInteger(s.to_string()))
    }
}

impl Display for AmountValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AmountValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AmountValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AmountValue::from_str(&s).map_err(serde::de::Error::custom)
    }
}
