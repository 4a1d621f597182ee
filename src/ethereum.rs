//! Wallet address validation.
//!
//! Addresses are validated as 20-byte hex values but kept exactly as
//! configured: the configured spelling is the partition key written to every
//! row, so no checksumming or case folding happens here.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),

    #[error("Address too short or long: {0}")]
    InvalidLength(String),
}

/// A wallet address that parsed as a 20-byte hex value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress {
    raw: String,
}

impl WalletAddress {
    /// Parse and validate an address string, keeping its original spelling.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        if !(trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
            return Err(AddressError::InvalidFormat(input.to_string()));
        }

        if trimmed.len() != 42 {
            return Err(AddressError::InvalidLength(input.to_string()));
        }

        // Mixed-case spellings from the explorer UI are not always valid
        // EIP-55, so only the hex payload is checked.
        trimmed
            .parse::<Address>()
            .map_err(|_| AddressError::InvalidFormat(input.to_string()))?;

        Ok(Self {
            raw: trimmed.to_string(),
        })
    }

    /// The address exactly as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(addr: WalletAddress) -> Self {
        addr.raw
    }
}

/// Parse a list of addresses, failing on the first invalid entry.
pub fn parse_wallets<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<WalletAddress>, AddressError> {
    inputs.iter().map(|s| WalletAddress::parse(s.as_ref())).collect()
}
