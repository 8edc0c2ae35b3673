//! CAIP-2 network identifiers and family patterns.
//!
//! A [`NetworkId`] is the chain-agnostic identifier used throughout the x402
//! protocol wire format (`eip155:8453`, `solana:<genesis>`,
//! `starknet:mainnet`). A [`CaipFamilyPattern`] groups handlers and signer
//! addresses by chain family (`eip155:*`) for the `/supported` aggregate
//! view.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 chain identifier of the form `family:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkId {
    family: String,
    reference: String,
}

impl NetworkId {
    pub fn new<F: Into<String>, R: Into<String>>(family: F, reference: R) -> Self {
        Self {
            family: family.into(),
            reference: reference.into(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.reference)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid CAIP-2 network id: {0}")]
pub struct NetworkIdFormatError(String);

impl FromStr for NetworkId {
    type Err = NetworkIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, reference) = s.split_once(':').ok_or_else(|| NetworkIdFormatError(s.into()))?;
        if family.is_empty() || reference.is_empty() {
            return Err(NetworkIdFormatError(s.into()));
        }
        Ok(NetworkId {
            family: family.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NetworkId::from_str(&s).map_err(de::Error::custom)
    }
}

/// A `family:*` pattern used to group handlers and signers by chain family
/// for the `/supported` aggregate view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaipFamilyPattern(String);

impl CaipFamilyPattern {
    pub fn new<S: Into<String>>(family: S) -> Self {
        Self(family.into())
    }

    pub fn matches(&self, network: &NetworkId) -> bool {
        self.0 == network.family()
    }
}

impl fmt::Display for CaipFamilyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:*", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_family_and_reference() {
        let id: NetworkId = "eip155:8453".parse().unwrap();
        assert_eq!(id.family(), "eip155");
        assert_eq!(id.reference(), "8453");
        assert_eq!(id.to_string(), "eip155:8453");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("eip155".parse::<NetworkId>().is_err());
        assert!(":8453".parse::<NetworkId>().is_err());
    }

    #[test]
    fn family_pattern_matches_same_family_only() {
        let pattern = CaipFamilyPattern::new("eip155");
        assert!(pattern.matches(&"eip155:8453".parse().unwrap()));
        assert!(!pattern.matches(&"solana:mainnet".parse().unwrap()));
    }
}
