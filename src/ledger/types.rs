//! Wire format types for the Sui ledger side of the bridge.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The byte length of a Sui address (256 bits).
pub const SUI_ADDRESS_BYTE_LEN: usize = 32;

/// A Sui address that serializes as a 0x-prefixed hex string.
///
/// Sui addresses are 32-byte identifiers. Shorter hex inputs are accepted and
/// left-padded with zeros, matching how Sui tooling normalizes addresses.
/// Holding a `SuiAddress` is proof the recipient string was syntactically
/// valid; the bridge performs no deeper validation — an address that does not
/// exist on-chain fails at mint submission and is reported, not retried.
///
/// # Example
///
/// ```
/// use ln_sui_bridge::ledger::SuiAddress;
///
/// let addr: SuiAddress = "0x2a".parse().unwrap();
/// assert_eq!(addr.as_bytes()[31], 0x2a);
/// assert!(addr.to_string().starts_with("0x"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SuiAddress([u8; SUI_ADDRESS_BYTE_LEN]);

impl SuiAddress {
    /// Creates an address from exactly 32 raw bytes.
    pub fn from_bytes(bytes: [u8; SUI_ADDRESS_BYTE_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the full-width hex encoding with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

/// Errors parsing a [`SuiAddress`] from a string.
#[derive(Debug, thiserror::Error)]
pub enum SuiAddressParseError {
    #[error("address is empty")]
    Empty,

    #[error("address is longer than {max} hex characters: got {got}")]
    TooLong { max: usize, got: usize },

    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

impl FromStr for SuiAddress {
    type Err = SuiAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Err(SuiAddressParseError::Empty);
        }
        let max = SUI_ADDRESS_BYTE_LEN * 2;
        if s.len() > max {
            return Err(SuiAddressParseError::TooLong { max, got: s.len() });
        }

        // Left-pad odd or short inputs to the full 64 hex characters.
        let padded = format!("{s:0>64}");
        let decoded = hex::decode(&padded)
            .map_err(|e| SuiAddressParseError::InvalidHex(e.to_string()))?;
        let mut bytes = [0u8; SUI_ADDRESS_BYTE_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Display for SuiAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for SuiAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
