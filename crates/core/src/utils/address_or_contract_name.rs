use crate::error::VerifyError;
use crate::utils::ledger::{DeploymentLedger, DeploymentRecord};
use alloy::primitives::Address;
use eyre::{Result, eyre};
use serde::{Deserialize, Deserializer, de::Error};
use std::fmt;
use std::str::FromStr;

/// Verification target as given by the operator: either a literal address or
/// the name of a factory whose latest confirmed deployment is in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressOrContractName {
    Address(Address),
    ContractName(String),
}

/// Strict address parsing: rejects empty input, wrong length, non-hex and
/// mixed-case input with a bad EIP-55 checksum.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    if s.is_empty() {
        return Err(eyre!("Invalid address: empty string"));
    }
    let hex_part = s
        .strip_prefix("0x")
        .ok_or_else(|| eyre!("Invalid address {}: missing 0x prefix", s))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(eyre!(
            "Invalid address {}: expected 0x followed by 40 hex characters",
            s
        ));
    }
    let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
        && hex_part.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case {
        return Address::parse_checksummed(s, None)
            .map_err(|_| eyre!("Invalid address {}: checksum mismatch", s));
    }
    s.parse::<Address>()
        .map_err(|e| eyre!("Invalid address {}: {}", s, e))
}

impl FromStr for AddressOrContractName {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(eyre!("Invalid target: empty string"));
        }
        if s.starts_with("0x") {
            // Anything that looks like an address must be one
            return parse_address(s).map(AddressOrContractName::Address);
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(eyre!("Invalid contract name: {}", s));
        }
        Ok(AddressOrContractName::ContractName(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for AddressOrContractName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: eyre::Report| D::Error::custom(e.to_string()))
    }
}

impl fmt::Display for AddressOrContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOrContractName::Address(addr) => write!(f, "{}", addr),
            AddressOrContractName::ContractName(name) => write!(f, "{}", name),
        }
    }
}

impl AddressOrContractName {
    /// Resolves to an address, together with the ledger record describing it
    /// when one exists. A target that names nothing verifiable fails with
    /// `VerifyError::InvalidAddress`; ledger read errors pass through as is.
    pub fn resolve(
        &self,
        ledger: &DeploymentLedger,
        network: &str,
    ) -> Result<(Address, Option<DeploymentRecord>)> {
        match self {
            AddressOrContractName::Address(addr) => {
                if addr.is_zero() {
                    return Err(VerifyError::InvalidAddress(format!("{} is the zero address", self)).into());
                }
                Ok((*addr, ledger.find_by_address(network, *addr)?))
            }
            AddressOrContractName::ContractName(name) => {
                let Some(record) = ledger.latest_confirmed(network, name)? else {
                    return Err(VerifyError::InvalidAddress(format!(
                        "no confirmed deployment of {} on {} in ledger {}",
                        self,
                        network,
                        ledger.path_for(network).display()
                    ))
                    .into());
                };
                let address = record.address.ok_or_else(|| {
                    VerifyError::InvalidAddress(format!("ledger record {} has no address", record.tx_hash))
                })?;
                Ok((address, Some(record)))
            }
        }
    }
}
