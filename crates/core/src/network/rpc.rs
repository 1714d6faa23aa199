use crate::network::provider::{NetworkProvider, TransactionStatus};
use crate::types::network_config::{GasPolicy, NetworkConfig};
use crate::types::secret::Secret;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{Result, eyre};
use log::{debug, info};
use reqwest::Url;
use std::fmt::Display;
use std::sync::Arc;

/// JSON-RPC backed provider. Signs with a local private key when built with
/// [`RpcNetworkProvider::connect`]; the read-only variant cannot submit.
pub struct RpcNetworkProvider<P> {
    provider: P,
    network: NetworkConfig,
    deployer: Option<Address>,
}

impl RpcNetworkProvider<()> {
    /// Connects to the network's RPC endpoint and checks that the node serves
    /// the configured chain.
    pub async fn connect(network: NetworkConfig, deployer_key: &Secret) -> Result<Arc<dyn NetworkProvider>> {
        // The parse error would echo the key material
        let signer: PrivateKeySigner = deployer_key
            .expose()
            .trim()
            .parse()
            .map_err(|_| eyre!("Deployer key for network {} is not a valid private key", network.name))?;
        let deployer = signer.address();

        let url = rpc_url(&network)?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .on_http(url);
        let connected = RpcNetworkProvider::checked(provider, network, Some(deployer)).await?;
        Ok(Arc::new(connected))
    }

    /// Connects without a signer, for chain reads only.
    pub async fn connect_read_only(network: NetworkConfig) -> Result<Arc<dyn NetworkProvider>> {
        let url = rpc_url(&network)?;
        let provider = ProviderBuilder::new().on_http(url);
        let connected = RpcNetworkProvider::checked(provider, network, None).await?;
        Ok(Arc::new(connected))
    }
}

impl<P: Provider> RpcNetworkProvider<P> {
    async fn checked(provider: P, network: NetworkConfig, deployer: Option<Address>) -> Result<Self> {
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| scrubbed(&network.rpc_url, e))?;
        if chain_id != network.chain_id {
            return Err(eyre!(
                "RPC endpoint for {} serves chain {} but {} is configured",
                network.name,
                chain_id,
                network.chain_id
            ));
        }
        match deployer {
            Some(deployer) => info!("Connected to {} (chain {}) as {}", network.name, chain_id, deployer),
            None => info!("Connected to {} (chain {}) read-only", network.name, chain_id),
        }

        Ok(Self {
            provider,
            network,
            deployer,
        })
    }
}

impl<P> RpcNetworkProvider<P> {
    fn scrub(&self, err: impl Display) -> eyre::Report {
        scrubbed(&self.network.rpc_url, err)
    }
}

fn rpc_url(network: &NetworkConfig) -> Result<Url> {
    network
        .rpc_url
        .expose()
        .parse()
        .map_err(|_| eyre!("RPC url for network {} is not a valid url", network.name))
}

/// RPC errors can embed the endpoint url, which often carries an API token.
fn scrubbed(rpc_url: &Secret, err: impl Display) -> eyre::Report {
    eyre!(rpc_url.scrub(&err.to_string()))
}

pub fn deployment_request(creation_code: Bytes, chain_id: u64, gas: &GasPolicy) -> TransactionRequest {
    let mut tx = TransactionRequest::default()
        .with_deploy_code(creation_code)
        .with_chain_id(chain_id);
    if let Some(gas_limit) = gas.gas_limit {
        tx = tx.with_gas_limit(gas_limit);
    }
    if let Some(gas_price) = gas.gas_price {
        tx = tx.with_gas_price(gas_price);
    } else {
        if let Some(max_fee) = gas.max_fee_per_gas {
            tx = tx.with_max_fee_per_gas(max_fee);
        }
        if let Some(priority_fee) = gas.max_priority_fee_per_gas {
            tx = tx.with_max_priority_fee_per_gas(priority_fee);
        }
    }
    tx
}

#[async_trait]
impl<P> NetworkProvider for RpcNetworkProvider<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn network(&self) -> NetworkConfig {
        self.network.clone()
    }

    async fn submit_deployment(&self, creation_code: Bytes) -> Result<TxHash> {
        let deployer = self
            .deployer
            .ok_or_else(|| eyre!("Provider for {} has no signer", self.network.name))?;
        let tx = deployment_request(creation_code, self.network.chain_id, &self.network.gas)
            .with_from(deployer);
        debug!("Sending deployment transaction from {}", deployer);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TransactionStatus> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.scrub(e))?;
        if let Some(receipt) = receipt {
            return Ok(TransactionStatus::Mined {
                block_number: receipt.block_number().unwrap_or_default(),
                contract_address: receipt.contract_address(),
                success: receipt.status(),
            });
        }

        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(match tx {
            Some(_) => TransactionStatus::Pending,
            None => TransactionStatus::Unknown,
        })
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| self.scrub(e))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| self.scrub(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxKind;

    #[test]
    fn test_deployment_request_applies_eip1559_policy() {
        let gas = GasPolicy {
            gas_limit: Some(6_000_000),
            gas_price: None,
            max_fee_per_gas: Some(30_000_000_000),
            max_priority_fee_per_gas: Some(1_000_000_000),
        };
        let tx = deployment_request(Bytes::from(vec![0x60, 0x80]), 11155111, &gas);

        assert_eq!(tx.to, Some(TxKind::Create));
        assert_eq!(tx.chain_id, Some(11155111));
        assert_eq!(tx.gas, Some(6_000_000));
        assert_eq!(tx.max_fee_per_gas, Some(30_000_000_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(1_000_000_000));
        assert_eq!(tx.gas_price, None);
        assert_eq!(tx.input.input().map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_legacy_gas_price_wins() {
        let gas = GasPolicy {
            gas_limit: None,
            gas_price: Some(5_000_000_000),
            max_fee_per_gas: Some(30_000_000_000),
            max_priority_fee_per_gas: None,
        };
        let tx = deployment_request(Bytes::new(), 31337, &gas);
        assert_eq!(tx.gas_price, Some(5_000_000_000));
        assert_eq!(tx.max_fee_per_gas, None);
        assert_eq!(tx.gas, None);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_key_without_echoing_it() {
        let network = NetworkConfig::new("localhost", 31337, Secret::new("http://127.0.0.1:8545"));
        let err = match RpcNetworkProvider::connect(network, &Secret::new("not-a-key-0123")).await {
            Ok(_) => panic!("connect accepted an invalid key"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("not a valid private key"));
        assert!(!err.contains("not-a-key-0123"));
    }
}
