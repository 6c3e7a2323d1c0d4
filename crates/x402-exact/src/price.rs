//! Conversion of human prices into atomic token amounts.

use std::fmt::Display;

use alloy_primitives::U256;

use crate::{
    networks::evm::{EvmAsset, EvmNetwork, NetworkError},
    types::{AmountError, AmountValue, AnyJson},
};

/// Smallest accepted money amount, in ten-thousandths.
const MIN_MONEY_TEN_THOUSANDTHS: u64 = 1;
/// Largest accepted money amount, in whole units.
const MAX_MONEY_UNITS: u64 = 999_999_999;
/// Longest accepted fractional part of a money string.
const MAX_MONEY_SCALE: usize = 36;

/// A price, either in the network's reference stablecoin or as an explicit token amount.
#[derive(Debug, Clone, PartialEq)]
pub enum Price {
    /// A money-like value such as `"$0.01"`, `"0.10"` or `0.001`.
    Money(String),
    /// An amount already expressed in atomic units of a specific token.
    TokenAmount(TokenAmount),
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Price::Money(value.to_string())
    }
}

impl From<String> for Price {
    fn from(value: String) -> Self {
        Price::Money(value)
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Price::Money(value.to_string())
    }
}

impl From<u32> for Price {
    fn from(value: u32) -> Self {
        Price::Money(value.to_string())
    }
}

impl From<TokenAmount> for Price {
    fn from(value: TokenAmount) -> Self {
        Price::TokenAmount(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenAmount {
    pub amount: AmountValue,
    pub asset: AssetInfo,
}

/// A token contract as advertised in payment requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub address: String,
    pub decimals: u8,
    /// EIP-712 domain `{name, version}` of the token, placed in `requirements.extra`
    pub extra: Option<AnyJson>,
}

impl From<EvmAsset> for AssetInfo {
    fn from(asset: EvmAsset) -> Self {
        AssetInfo {
            address: asset.address.to_string(),
            decimals: asset.decimals,
            extra: Some(asset.eip712_extra()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicAmount {
    pub max_amount_required: AmountValue,
    pub asset: AssetInfo,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceError {
    #[error("Invalid price (price: {0}). Must be in the form \"$3.10\", 0.10, \"0.001\"")]
    Malformed(String),
    #[error("Invalid price (price: {0}). Must be between 0.0001 and 999999999")]
    OutOfRange(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("Price does not fit the token's amount format: {0}")]
    Amount(#[from] AmountError),
}

/// An exact decimal amount of money: `digits / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Money {
    digits: U256,
    scale: u32,
}

impl Money {
    /// Parse a money-like string, ignoring currency symbols, separators and whitespace.
    pub fn parse(input: &str) -> Result<Money, PriceError> {
        let malformed = || PriceError::Malformed(input.to_string());

        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        let (negative, unsigned) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty())
            || !all_digits(whole)
            || !all_digits(fraction)
            || fraction.len() > MAX_MONEY_SCALE
        {
            return Err(malformed());
        }

        let digits = U256::from_str_radix(&format!("{whole}{fraction}"), 10)
            .map_err(|_| malformed())?;
        let money = Money {
            digits,
            scale: fraction.len() as u32,
        };

        if negative && !money.digits.is_zero() {
            return Err(PriceError::OutOfRange(input.to_string()));
        }
        money.check_range(input)?;
        Ok(money)
    }

    fn check_range(&self, input: &str) -> Result<(), PriceError> {
        let denominator = pow10(self.scale);
        let lower_ok = self.digits.saturating_mul(U256::from(10_000u64))
            >= U256::from(MIN_MONEY_TEN_THOUSANDTHS).saturating_mul(denominator);
        let upper_ok = self.digits <= U256::from(MAX_MONEY_UNITS).saturating_mul(denominator);
        if lower_ok && upper_ok {
            Ok(())
        } else {
            Err(PriceError::OutOfRange(input.to_string()))
        }
    }

    /// Convert to atomic units of a token with `decimals` decimals, truncating any remainder.
    pub fn to_atomic(&self, decimals: u8) -> U256 {
        let scaled = self.digits.saturating_mul(pow10(decimals as u32));
        scaled / pow10(self.scale)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.digits.to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{fraction}")
        }
    }
}

fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Resolve a price on a network into the amount and asset to put in payment requirements.
///
/// Money prices are converted with the network's default stablecoin; token amounts pass
/// through unchanged.
pub fn process_price_to_atomic_amount(
    price: &Price,
    network: &str,
) -> Result<AtomicAmount, PriceError> {
    match price {
        Price::Money(raw) => {
            let money = Money::parse(raw)?;
            let network = EvmNetwork::try_from_name(network)?;
            let asset = network
                .default_asset()
                .ok_or_else(|| NetworkError::NoDefaultAsset(network.name.to_string()))?;
            let max_amount_required = AmountValue::try_from(money.to_atomic(asset.decimals))?;
            Ok(AtomicAmount {
                max_amount_required,
                asset: asset.into(),
            })
        }
        Price::TokenAmount(token) => Ok(AtomicAmount {
            max_amount_required: token.amount,
            asset: token.asset.clone(),
        }),
    }
}
