use crate::types::secret::Secret;
use crate::utils::backoff::PollPolicy;
use reqwest::Url;
use serde_json::{Value, json};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: Option<u64>,
    /// Legacy pricing, takes precedence over the EIP-1559 fields when set.
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Everything a workflow needs to know about the network it runs against.
/// Built once at start-up and passed explicitly into each workflow.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Secret,
    pub explorer_api_url: Option<String>,
    pub explorer_url: Option<String>,
    pub gas: GasPolicy,
    pub confirmations: u64,
    pub confirmation: PollPolicy,
    pub verification: PollPolicy,
    pub verification_submit_attempts: u32,
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>, chain_id: u64, rpc_url: Secret) -> Self {
        Self {
            name: name.into(),
            chain_id,
            rpc_url,
            explorer_api_url: None,
            explorer_url: None,
            gas: GasPolicy::default(),
            confirmations: 1,
            confirmation: PollPolicy::default(),
            verification: PollPolicy::default(),
            verification_submit_attempts: 3,
        }
    }

    /// Operator-facing echo of the active configuration. Credentials are left
    /// out and the RPC endpoint is reduced to scheme and host.
    pub fn redacted(&self) -> Value {
        json!({
            "name": self.name,
            "chainId": self.chain_id,
            "url": redact_url(self.rpc_url.expose()),
            "explorerApiUrl": self.explorer_api_url,
            "explorerUrl": self.explorer_url,
            "gas": self.gas.gas_limit.map(|g| g.to_string()).unwrap_or_else(|| "auto".to_string()),
            "gasPrice": self.gas.gas_price.map(|g| g.to_string()).unwrap_or_else(|| "auto".to_string()),
            "maxFeePerGas": self.gas.max_fee_per_gas.map(|g| g.to_string()),
            "maxPriorityFeePerGas": self.gas.max_priority_fee_per_gas.map(|g| g.to_string()),
            "confirmations": self.confirmations,
            "confirmationTimeoutSecs": self.confirmation.timeout.as_secs(),
            "verificationTimeoutSecs": self.verification.timeout.as_secs(),
        })
    }

    pub fn explorer_address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/address/{}#code", base.trim_end_matches('/'), address))
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

/// Keeps scheme, host and port; anything that may carry an API token (path,
/// query, userinfo) is dropped.
pub fn redact_url(raw: &str) -> String {
    let Ok(url) = raw.parse::<Url>() else {
        return "<redacted>".to_string();
    };
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return "<redacted>".to_string(),
    };
    let has_extra = url.path() != "/" || url.query().is_some() || !url.username().is_empty();
    if has_extra {
        format!("{}://{}/<redacted>", url.scheme(), host)
    } else {
        format!("{}://{}", url.scheme(), host)
    }
}
