//! Paywall settings read from the environment.
//!
//! | Variable               | Default                         |
//! |------------------------|---------------------------------|
//! | `X402_PAY_TO`          | required                        |
//! | `X402_FACILITATOR_URL` | `https://x402.org/facilitator`  |
//! | `X402_NETWORK`         | `base-sepolia`, or `base` when `X402_TESTNET=false` |
//! | `X402_TESTNET`         | derived from the network        |
//!
//! `X402_TESTNET` must agree with the network when both are set.

use url::Url;
pub use x402_exact::facilitator::DEFAULT_FACILITATOR_URL;
use x402_exact::networks::evm::{EvmAddress, EvmNetwork};

use crate::routes::DEFAULT_NETWORK;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("X402_TESTNET={testnet} contradicts network {network}")]
    TestnetMismatch { network: String, testnet: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayWallEnv {
    pub pay_to: EvmAddress,
    pub facilitator_url: Url,
    pub network: String,
    pub testnet: bool,
}

impl PayWallEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let invalid = |name: &'static str, value: &str| ConfigError::Invalid {
            name,
            value: value.to_string(),
        };

        let raw_pay_to = var("X402_PAY_TO").ok_or(ConfigError::Missing("X402_PAY_TO"))?;
        let pay_to = raw_pay_to
            .trim()
            .parse::<EvmAddress>()
            .map_err(|_| invalid("X402_PAY_TO", &raw_pay_to))?;

        let facilitator_url = match var("X402_FACILITATOR_URL") {
            Some(raw) => {
                Url::parse(raw.trim()).map_err(|_| invalid("X402_FACILITATOR_URL", &raw))?
            }
            None => Url::parse(DEFAULT_FACILITATOR_URL)
                .map_err(|_| invalid("X402_FACILITATOR_URL", DEFAULT_FACILITATOR_URL))?,
        };

        let testnet = match var("X402_TESTNET") {
            Some(raw) => Some(parse_bool(&raw).ok_or_else(|| invalid("X402_TESTNET", &raw))?),
            None => None,
        };

        let network = match (var("X402_NETWORK"), testnet) {
            (Some(network), _) => network.trim().to_string(),
            (None, Some(false)) => "base".to_string(),
            (None, _) => DEFAULT_NETWORK.to_string(),
        };
        let Some(known) = EvmNetwork::by_name(&network) else {
            return Err(invalid("X402_NETWORK", &network));
        };
        if let Some(testnet) = testnet.filter(|t| *t != known.testnet) {
            return Err(ConfigError::TestnetMismatch { network, testnet });
        }

        Ok(PayWallEnv {
            pay_to,
            facilitator_url,
            testnet: known.testnet,
            network,
        })
    }
}

#[cfg(feature = "facilitator-client")]
impl PayWallEnv {
    /// A facilitator client for the configured URL.
    pub fn facilitator(&self) -> x402_exact::facilitator_client::RemoteFacilitatorClient {
        x402_exact::facilitator_client::RemoteFacilitatorClient::from_url(
            self.facilitator_url.clone(),
        )
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn env(vars: &[(&str, &str)]) -> Result<PayWallEnv, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PayWallEnv::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let env = env(&[("X402_PAY_TO", PAY_TO)]).unwrap();
        assert_eq!(env.pay_to, PAY_TO.parse().unwrap());
        assert_eq!(env.facilitator_url.as_str(), DEFAULT_FACILITATOR_URL);
        assert_eq!(env.network, "base-sepolia");
        assert!(env.testnet);
    }

    #[test]
    fn test_testnet_flag_selects_network() {
        let env = env(&[("X402_PAY_TO", PAY_TO), ("X402_TESTNET", "false")]).unwrap();
        assert_eq!(env.network, "base");
        assert!(!env.testnet);
    }

    #[test]
    fn test_explicit_network() {
        let env = env(&[
            ("X402_PAY_TO", PAY_TO),
            ("X402_NETWORK", "avalanche"),
            ("X402_FACILITATOR_URL", "http://localhost:8080/"),
        ])
        .unwrap();
        assert_eq!(env.network, "avalanche");
        assert!(!env.testnet);
        assert_eq!(env.facilitator_url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(env(&[]), Err(ConfigError::Missing("X402_PAY_TO"))));
        assert!(matches!(
            env(&[("X402_PAY_TO", "0x1234")]),
            Err(ConfigError::Invalid { name: "X402_PAY_TO", .. })
        ));
        assert!(matches!(
            env(&[("X402_PAY_TO", PAY_TO), ("X402_NETWORK", "solana")]),
            Err(ConfigError::Invalid { name: "X402_NETWORK", .. })
        ));
        assert!(matches!(
            env(&[("X402_PAY_TO", PAY_TO), ("X402_TESTNET", "maybe")]),
            Err(ConfigError::Invalid { name: "X402_TESTNET", .. })
        ));
    }

    #[test]
    fn test_testnet_flag_must_match_network() {
        let err = env(&[
            ("X402_PAY_TO", PAY_TO),
            ("X402_NETWORK", "base"),
            ("X402_TESTNET", "true"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TestnetMismatch { ref network, testnet: true } if network == "base"
        ));

        let env = env(&[
            ("X402_PAY_TO", PAY_TO),
            ("X402_NETWORK", "avalanche-fuji"),
            ("X402_TESTNET", "yes"),
        ])
        .unwrap();
        assert!(env.testnet);
        assert_eq!(env.network, "avalanche-fuji");
    }
}
