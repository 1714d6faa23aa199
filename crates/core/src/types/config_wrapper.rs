use crate::types::network_config::{GasPolicy, NetworkConfig};
use crate::types::secret::Secret;
use crate::utils::backoff::PollPolicy;
use eyre::{Result, eyre};
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};
use toml::Value;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_DEPLOYER_KEY: &str = "env:DEPLOYER_PRIVATE_KEY";

pub struct ConfigWrapper {
    raw_config: Value,
}

impl ConfigWrapper {
    pub fn from_file(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let config_content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config file {}: {}", path, e))?;
        let raw_config: Value = config_content.parse::<Value>()?;

        Ok(Self { raw_config })
    }

    pub fn from_str(config_content: &str) -> Result<Self> {
        Ok(Self {
            raw_config: config_content.parse::<Value>()?,
        })
    }

    pub fn default_network(&self) -> Option<String> {
        self.raw_config
            .get("default_network")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.get_top_level_path("artifacts_dir", "artifacts")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.get_top_level_path("ledger_dir", "deployments")
    }

    pub fn network_names(&self) -> Vec<String> {
        self.raw_config
            .get("networks")
            .and_then(|n| n.as_table())
            .map(|t| t.keys().filter(|k| *k != "default").cloned().collect())
            .unwrap_or_default()
    }

    fn get_top_level_path(&self, key: &str, default: &str) -> PathBuf {
        self.raw_config
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .into()
    }

    fn get_network_value(&self, network: &str, key: &str) -> Option<&Value> {
        // Try network specific value first
        self.raw_config
            .get("networks")
            .and_then(|n| n.get(network))
            .and_then(|n| n.get(key))
            .or_else(|| {
                // Fallback to default if network specific not found
                self.raw_config
                    .get("networks")
                    .and_then(|n| n.get("default"))
                    .and_then(|n| n.get(key))
            })
    }

    fn ensure_network(&self, network: &str) -> Result<()> {
        let declared = network != "default"
            && self
                .raw_config
                .get("networks")
                .and_then(|n| n.get(network))
                .is_some_and(|n| n.is_table());
        if declared {
            Ok(())
        } else {
            Err(eyre!(
                "Network {} is not declared in config (known: {})",
                network,
                self.network_names().join(", ")
            ))
        }
    }

    pub fn get_network_string(&self, network: &str, key: &str) -> Result<String> {
        let raw = self
            .get_network_value(network, key)
            .ok_or_else(|| eyre!("{} not found for network: {}", key, network))?
            .as_str()
            .ok_or_else(|| eyre!("{} must be a string for network: {}", key, network))?;

        resolve_env(raw)
    }

    pub fn get_optional_network_string(&self, network: &str, key: &str) -> Result<Option<String>> {
        match self.get_network_value(network, key) {
            Some(_) => self.get_network_string(network, key).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_network_u64(&self, network: &str, key: &str) -> Result<Option<u64>> {
        let Some(value) = self.get_network_value(network, key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Integer(i) => u64::try_from(*i).ok(),
            Value::String(s) => resolve_env(s)?.parse::<u64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| eyre!("{} must be a non-negative integer for network: {}", key, network))
    }

    fn get_network_u128(&self, network: &str, key: &str) -> Result<Option<u128>> {
        let Some(value) = self.get_network_value(network, key) else {
            return Ok(None);
        };
        // Wei amounts may exceed the TOML integer range, so strings are accepted too.
        let parsed = match value {
            Value::Integer(i) => u128::try_from(*i).ok(),
            Value::String(s) => resolve_env(s)?.parse::<u128>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| eyre!("{} must be a non-negative integer for network: {}", key, network))
    }

    pub fn network_config(&self, network: &str) -> Result<NetworkConfig> {
        self.ensure_network(network)?;

        let chain_id = self
            .get_network_u64(network, "chain_id")?
            .ok_or_else(|| eyre!("chain_id not found for network: {}", network))?;
        let rpc_url = Secret::new(self.get_network_string(network, "rpc_url")?);

        let mut config = NetworkConfig::new(network, chain_id, rpc_url);
        config.explorer_api_url = self
            .get_optional_network_string(network, "explorer_api_url")?
            .map(|u| u.trim_end_matches('/').to_string());
        config.explorer_url = self
            .get_optional_network_string(network, "explorer_url")?
            .map(|u| u.trim_end_matches('/').to_string());
        config.gas = GasPolicy {
            gas_limit: self.get_network_u64(network, "gas_limit")?,
            gas_price: self.get_network_u128(network, "gas_price")?,
            max_fee_per_gas: self.get_network_u128(network, "max_fee_per_gas")?,
            max_priority_fee_per_gas: self.get_network_u128(network, "max_priority_fee_per_gas")?,
        };

        if let Some(confirmations) = self.get_network_u64(network, "confirmations")? {
            config.confirmations = confirmations.max(1);
        }
        config.confirmation = self.poll_policy(
            network,
            "poll_interval_ms",
            "max_poll_interval_ms",
            "confirmation_timeout_secs",
            PollPolicy::default(),
        )?;
        config.verification = self.poll_policy(
            network,
            "verification_poll_interval_ms",
            "max_verification_poll_interval_ms",
            "verification_timeout_secs",
            PollPolicy::new(
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(300),
            ),
        )?;
        if let Some(attempts) = self.get_network_u64(network, "verification_submit_attempts")? {
            config.verification_submit_attempts = u32::try_from(attempts).unwrap_or(u32::MAX).max(1);
        }

        Ok(config)
    }

    fn poll_policy(
        &self,
        network: &str,
        interval_key: &str,
        max_interval_key: &str,
        timeout_key: &str,
        default: PollPolicy,
    ) -> Result<PollPolicy> {
        let initial = self
            .get_network_u64(network, interval_key)?
            .map(Duration::from_millis)
            .unwrap_or(default.initial_interval);
        let max = self
            .get_network_u64(network, max_interval_key)?
            .map(Duration::from_millis)
            .unwrap_or(default.max_interval);
        let timeout = self
            .get_network_u64(network, timeout_key)?
            .map(Duration::from_secs)
            .unwrap_or(default.timeout);
        Ok(PollPolicy::new(initial, max, timeout))
    }

    pub fn deployer_key(&self, network: &str) -> Result<Secret> {
        self.ensure_network(network)?;
        let raw = self
            .get_network_value(network, "deployer_key")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_DEPLOYER_KEY);
        let key = Secret::new(resolve_env(raw)?);
        if key.is_empty() {
            return Err(eyre!("Deployer key for network {} is empty", network));
        }
        Ok(key)
    }

    pub fn explorer_api_key(&self, network: &str) -> Result<Secret> {
        self.ensure_network(network)?;
        Ok(Secret::new(self.get_network_string(network, "explorer_api_key")?))
    }
}

/// Values prefixed with `env:` are read from the named environment variable.
pub fn resolve_env(raw: &str) -> Result<String> {
    match raw.strip_prefix("env:") {
        Some(env_var) => {
            env::var(env_var).map_err(|_| eyre!("Environment variable {} not set", env_var))
        }
        None => Ok(raw.to_string()),
    }
}
