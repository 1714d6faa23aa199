use crate::types::network_config::NetworkConfig;
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// The node has never seen the transaction, or dropped it.
    Unknown,
    /// Accepted into the pending pool, not yet included.
    Pending,
    Mined {
        block_number: u64,
        contract_address: Option<Address>,
        success: bool,
    },
}

/// The chain as seen by the workflows. Every method is a network round trip
/// and the only place the workflows suspend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// The configuration this provider was built from.
    fn network(&self) -> NetworkConfig;

    /// Signs and sends a contract creation transaction, returning once the
    /// node has accepted it into its pending pool.
    async fn submit_deployment(&self, creation_code: Bytes) -> Result<TxHash>;

    async fn transaction_status(&self, tx_hash: TxHash) -> Result<TransactionStatus>;

    async fn block_number(&self) -> Result<u64>;

    async fn code_at(&self, address: Address) -> Result<Bytes>;
}
