use alloy::primitives::{Address, Bytes};
use eyre::{Result, eyre};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub runs: u64,
}

/// What the explorer needs to recompile the contract and match it against
/// the deployed bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerMetadata {
    /// Full solc version, e.g. `0.8.17+commit.8df45f5f`.
    pub compiler_version: String,
    pub source_name: String,
    pub contract_name: String,
    pub optimizer: OptimizerSettings,
    /// Solidity standard-JSON compiler input.
    pub standard_json_input: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: Value,
}

impl CompilerMetadata {
    pub fn from_build_info(path: &Path, source_name: &str, contract_name: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read build info {}: {}", path.display(), e))?;
        let build_info: BuildInfo = serde_json::from_str(&content)
            .map_err(|e| eyre!("Malformed build info {}: {}", path.display(), e))?;

        if build_info
            .input
            .get("sources")
            .and_then(|s| s.get(source_name))
            .is_none()
        {
            return Err(eyre!(
                "Build info {} does not contain source {}",
                path.display(),
                source_name
            ));
        }

        let optimizer = build_info
            .input
            .get("settings")
            .and_then(|s| s.get("optimizer"));
        let optimizer = OptimizerSettings {
            enabled: optimizer
                .and_then(|o| o.get("enabled"))
                .and_then(|e| e.as_bool())
                .unwrap_or(false),
            runs: optimizer
                .and_then(|o| o.get("runs"))
                .and_then(|r| r.as_u64())
                .unwrap_or(200),
        };

        Ok(Self {
            compiler_version: build_info.solc_long_version,
            source_name: source_name.to_string(),
            contract_name: contract_name.to_string(),
            optimizer,
            standard_json_input: build_info.input,
        })
    }

    pub fn with_compiler_version(mut self, version: impl Into<String>) -> Self {
        self.compiler_version = version.into();
        self
    }

    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Version string in the form explorers expect (`v0.8.17+commit.8df45f5f`).
    pub fn explorer_compiler_version(&self) -> String {
        if self.compiler_version.starts_with('v') {
            self.compiler_version.clone()
        } else {
            format!("v{}", self.compiler_version)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub address: Address,
    pub metadata: CompilerMetadata,
    pub constructor_args: Bytes,
}

impl VerificationRequest {
    pub fn new(address: Address, metadata: CompilerMetadata, constructor_args: Bytes) -> Self {
        Self {
            address,
            metadata,
            constructor_args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
}
