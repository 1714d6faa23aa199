use crate::types::network_config::NetworkConfig;
use alloy::primitives::{Address, Bytes, TxHash};
use serde_json::{Value, json};

pub const DEFAULT_FACTORY: &str = "InsuranceProtocolFactory";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub factory: String,
    /// Raw values, coerced against the ABI constructor inputs before submission.
    pub constructor_args: Vec<String>,
    /// Submit even if the ledger still holds a pending deployment of this factory.
    pub allow_pending: bool,
}

impl DeploymentRequest {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            constructor_args: Vec::new(),
            allow_pending: false,
        }
    }

    pub fn with_constructor_args(mut self, args: Vec<String>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn allow_pending(mut self, allow: bool) -> Self {
        self.allow_pending = allow;
        self
    }
}

impl Default for DeploymentRequest {
    fn default() -> Self {
        Self::new(DEFAULT_FACTORY)
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub factory: String,
    pub address: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub constructor_args: Bytes,
    pub network: NetworkConfig,
}

impl DeploymentResult {
    pub fn describe(&self) -> Value {
        json!({
            "factory": self.factory,
            "address": self.address.to_string(),
            "transactionHash": self.tx_hash.to_string(),
            "blockNumber": self.block_number,
            "constructorArgs": self.constructor_args.to_string(),
            "network": self.network.redacted(),
        })
    }
}
