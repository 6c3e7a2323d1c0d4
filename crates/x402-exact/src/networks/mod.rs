//! Network families and the networks known to this crate.

pub mod evm;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A family of networks sharing address, signature and transaction formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    Evm,
}

impl NetworkFamily {
    /// Resolve the family of a network name, if the network is known.
    pub fn of(network: &str) -> Option<NetworkFamily> {
        evm::EvmNetwork::by_name(network).map(|_| NetworkFamily::Evm)
    }
}

impl Display for NetworkFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkFamily::Evm => write!(f, "evm"),
        }
    }
}
