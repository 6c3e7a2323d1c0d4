use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use alloy_primitives::address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmNetwork {
    pub name: &'static str,
    /// Human-readable name, e.g. `Base Sepolia`.
    pub display_name: &'static str,
    pub chain_id: u64,
    /// Whether the network is a test network.
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("No default asset registered for network: {0}")]
    NoDefaultAsset(String),
}

impl EvmNetwork {
    pub fn by_name(name: &str) -> Option<EvmNetwork> {
        NETWORKS.iter().find(|n| n.name == name).copied()
    }

    pub fn by_chain_id(chain_id: u64) -> Option<EvmNetwork> {
        NETWORKS.iter().find(|n| n.chain_id == chain_id).copied()
    }

    pub fn try_from_name(name: &str) -> Result<EvmNetwork, NetworkError> {
        Self::by_name(name).ok_or_else(|| NetworkError::UnsupportedNetwork(name.to_string()))
    }

    /// The reference stablecoin of this network, used to price money amounts.
    pub fn default_asset(&self) -> Option<EvmAsset> {
        ASSETS
            .iter()
            .find(|(network, _)| network.chain_id == self.chain_id)
            .map(|(_, asset)| *asset)
    }
}

impl Display for EvmNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EvmAddress(pub alloy_primitives::Address);

impl From<alloy_primitives::Address> for EvmAddress {
    fn from(addr: alloy_primitives::Address) -> Self {
        EvmAddress(addr)
    }
}

impl FromStr for EvmAddress {
    type Err = <alloy_primitives::Address as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = alloy_primitives::Address::from_str(s)?;
        Ok(EvmAddress(addr))
    }
}

impl Display for EvmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for EvmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EvmAddress({})", self.0)
    }
}

impl Serialize for EvmAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EvmAddress::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A 65-byte ECDSA signature, `0x` hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmSignature(pub alloy_primitives::Signature);

impl Display for EvmSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl Debug for EvmSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EvmSignature({self})")
    }
}

impl FromStr for EvmSignature {
    type Err = <alloy_primitives::Signature as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sig = alloy_primitives::Signature::from_str(s)?;
        Ok(EvmSignature(sig))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EvmSignature::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<alloy_primitives::Signature> for EvmSignature {
    fn from(sig: alloy_primitives::Signature) -> Self {
        EvmSignature(sig)
    }
}

/// Name and version of a token's EIP-712 signing domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Eip712DomainInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmAsset {
    pub address: EvmAddress,
    pub decimals: u8,
    pub eip712: Eip712DomainInfo,
}

impl EvmAsset {
    /// The `extra` object advertised in payment requirements for this asset.
    pub fn eip712_extra(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.eip712.name,
            "version": self.eip712.version,
        })
    }
}

macro_rules! define_evm_network {
    ($const_name:ident, $name:expr, $display_name:expr, $chain_id:expr, $testnet:expr) => {
        pub const $const_name: EvmNetwork = EvmNetwork {
            name: $name,
            display_name: $display_name,
            chain_id: $chain_id,
            testnet: $testnet,
        };
    };
}

define_evm_network!(BASE, "base", "Base", 8453, false);
define_evm_network!(BASE_SEPOLIA, "base-sepolia", "Base Sepolia", 84532, true);
define_evm_network!(AVALANCHE, "avalanche", "Avalanche", 43114, false);
define_evm_network!(AVALANCHE_FUJI, "avalanche-fuji", "Avalanche Fuji", 43113, true);
define_evm_network!(IOTEX, "iotex", "IoTeX", 4689, false);

pub const NETWORKS: &[EvmNetwork] = &[BASE, BASE_SEPOLIA, AVALANCHE, AVALANCHE_FUJI, IOTEX];

macro_rules! define_usdc {
    ($const_name:ident, $addr:expr, $eip712_name:expr) => {
        pub const $const_name: EvmAsset = EvmAsset {
            address: EvmAddress(address!($addr)),
            decimals: 6,
            eip712: Eip712DomainInfo {
                name: $eip712_name,
                version: "2",
            },
        };
    };
}

define_usdc!(
    USDC_BASE,
    "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
    "USD Coin"
);
define_usdc!(
    USDC_BASE_SEPOLIA,
    "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    "USDC"
);
define_usdc!(
    USDC_AVALANCHE,
    "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
    "USD Coin"
);
define_usdc!(
    USDC_AVALANCHE_FUJI,
    "0x5425890298aed601595a70AB815c96711a31Bc65",
    "USD Coin"
);
define_usdc!(
    USDC_IOTEX,
    "0xcdf79194c6c285077a58da47641d4dbe51f63542",
    "Bridged USDC"
);

const ASSETS: &[(EvmNetwork, EvmAsset)] = &[
    (BASE, USDC_BASE),
    (BASE_SEPOLIA, USDC_BASE_SEPOLIA),
    (AVALANCHE, USDC_AVALANCHE),
    (AVALANCHE_FUJI, USDC_AVALANCHE_FUJI),
    (IOTEX, USDC_IOTEX),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_networks() {
        assert_eq!(EvmNetwork::by_name("base-sepolia"), Some(BASE_SEPOLIA));
        assert_eq!(EvmNetwork::by_chain_id(43113), Some(AVALANCHE_FUJI));
        assert_eq!(EvmNetwork::by_name("solana"), None);
        assert_eq!(
            EvmNetwork::try_from_name("ethereum"),
            Err(NetworkError::UnsupportedNetwork("ethereum".to_string()))
        );
    }

    #[test]
    fn test_default_assets() {
        let asset = BASE.default_asset().unwrap();
        assert_eq!(asset.decimals, 6);
        assert_eq!(asset.eip712.name, "USD Coin");
        assert_eq!(
            asset.address.to_string(),
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
        );

        let extra = BASE_SEPOLIA.default_asset().unwrap().eip712_extra();
        assert_eq!(extra["name"], "USDC");
        assert_eq!(extra["version"], "2");
    }

    #[test]
    fn test_address_serde() {
        let addr: EvmAddress =
            serde_json::from_str("\"0x036cbd53842c5426634e7929541ec2318f3dcf7e\"").unwrap();
        assert_eq!(addr, USDC_BASE_SEPOLIA.address);
        assert!(serde_json::from_str::<EvmAddress>("\"0x1234\"").is_err());
    }
}
