use crate::error::DeployError;
use crate::network::provider::{NetworkProvider, TransactionStatus};
use crate::types::constructor_args::encode_constructor_args;
use crate::types::deployment::{DeploymentRequest, DeploymentResult};
use crate::types::network_config::NetworkConfig;
use crate::types::workflow_state::WorkflowState;
use crate::utils::artifact_registry::ArtifactRegistry;
use crate::utils::backoff::Backoff;
use crate::utils::ledger::{DeploymentLedger, DeploymentRecord};
use alloy::primitives::{Address, Bytes, TxHash};
use log::{debug, info, warn};
use std::sync::Arc;

/// One-shot "create and wait" workflow for a contract factory.
///
/// **`deploy` is not idempotent.** Every successful call submits a new,
/// fee-incurring creation transaction and yields a new contract at a new
/// address. If a run is interrupted after submission, use [`Deployer::recover`]
/// with the transaction hash instead of deploying again.
pub struct Deployer {
    registry: Arc<dyn ArtifactRegistry>,
    provider: Arc<dyn NetworkProvider>,
    ledger: Option<DeploymentLedger>,
}

impl Deployer {
    pub fn new(registry: Arc<dyn ArtifactRegistry>, provider: Arc<dyn NetworkProvider>) -> Self {
        Self {
            registry,
            provider,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: DeploymentLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult, DeployError> {
        let network = self.provider.network();
        let mut state = WorkflowState::Initiated;
        info!(
            "[{}] Deploying {} on {} (chain {})",
            state, request.factory, network.name, network.chain_id
        );

        let prepared = self.prepare(request, &network);
        let (creation_code, constructor_args) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                state.advance("Deployment", WorkflowState::Failed(e.kind().to_string()));
                return Err(e);
            }
        };

        let tx_hash = match self.provider.submit_deployment(creation_code).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                let err = DeployError::Submission(format!("{:#}", e));
                state.advance("Deployment", WorkflowState::Failed(err.kind().to_string()));
                return Err(err);
            }
        };
        state.advance("Deployment", WorkflowState::Submitted);
        info!("Deployment transaction {} accepted by {}", tx_hash, network.name);
        if let Some(url) = network.explorer_tx_url(&tx_hash.to_string()) {
            info!("Track it at {}", url);
        }

        if let Some(ledger) = &self.ledger {
            let record = DeploymentRecord::pending(
                &request.factory,
                &network.name,
                network.chain_id,
                tx_hash,
                constructor_args.clone(),
            );
            if let Err(e) = ledger.record_pending(record) {
                warn!(
                    "Could not record pending deployment {} in ledger: {}",
                    tx_hash, e
                );
            }
        }

        let confirmed = self.await_confirmation(tx_hash, &network).await;
        self.finish(
            state,
            &request.factory,
            constructor_args,
            tx_hash,
            network,
            confirmed,
        )
    }

    /// Re-queries a previously submitted deployment instead of resubmitting
    /// it, then waits for confirmation like `deploy` does. A transaction the
    /// ledger does not know yet is recorded under `factory`; a recorded one
    /// keeps its own factory and constructor arguments.
    pub async fn recover(&self, tx_hash: TxHash, factory: &str) -> Result<DeploymentResult, DeployError> {
        let network = self.provider.network();
        let record = match &self.ledger {
            Some(ledger) => ledger.find_by_tx(&network.name, tx_hash).unwrap_or_else(|e| {
                warn!("Could not read ledger for {}: {}", network.name, e);
                None
            }),
            None => None,
        };
        let recorded = record.is_some();
        let (factory, constructor_args) = record
            .map(|r| (r.factory, r.constructor_args))
            .unwrap_or_else(|| (factory.to_string(), Bytes::new()));

        info!("Recovering deployment {} of {} on {}", tx_hash, factory, network.name);
        let status = self
            .provider
            .transaction_status(tx_hash)
            .await
            .map_err(|e| DeployError::StatusQuery {
                tx_hash,
                reason: format!("{:#}", e),
            })?;
        if status == TransactionStatus::Unknown {
            return Err(DeployError::UnknownTransaction { tx_hash });
        }

        if !recorded {
            if let Some(ledger) = &self.ledger {
                let record = DeploymentRecord::pending(
                    &factory,
                    &network.name,
                    network.chain_id,
                    tx_hash,
                    constructor_args.clone(),
                );
                if let Err(e) = ledger.record_pending(record) {
                    warn!("Could not record recovered deployment {} in ledger: {}", tx_hash, e);
                }
            }
        }

        let confirmed = self.await_confirmation(tx_hash, &network).await;
        self.finish(
            WorkflowState::Submitted,
            &factory,
            constructor_args,
            tx_hash,
            network,
            confirmed,
        )
    }

    fn prepare(
        &self,
        request: &DeploymentRequest,
        network: &NetworkConfig,
    ) -> Result<(Bytes, Bytes), DeployError> {
        let artifact = self.registry.resolve(&request.factory)?;
        debug!(
            "Resolved {} ({} bytes of creation code)",
            artifact.fully_qualified_name(),
            artifact.bytecode.len()
        );
        let constructor_args = encode_constructor_args(&artifact.abi, &request.constructor_args)?;

        if !request.allow_pending {
            if let Some(ledger) = &self.ledger {
                match ledger.pending_for(&network.name, &request.factory) {
                    Ok(Some(pending)) => {
                        return Err(DeployError::PendingDeploymentExists {
                            factory: request.factory.clone(),
                            network: network.name.clone(),
                            tx_hash: pending.tx_hash,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Could not read ledger for {}: {}", network.name, e),
                }
            }
        }

        let mut creation_code = artifact.bytecode.to_vec();
        creation_code.extend_from_slice(&constructor_args);
        Ok((Bytes::from(creation_code), constructor_args))
    }

    /// Polls until the creation is mined at the configured depth, reverts or
    /// the confirmation deadline passes. RPC errors while polling are logged
    /// and polling continues.
    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        network: &NetworkConfig,
    ) -> Result<(Address, u64), DeployError> {
        let mut backoff = Backoff::new(network.confirmation);
        loop {
            match self.provider.transaction_status(tx_hash).await {
                Ok(TransactionStatus::Mined {
                    block_number,
                    contract_address,
                    success,
                }) => {
                    if !success {
                        return Err(DeployError::RevertedDeployment {
                            tx_hash,
                            block_number,
                        });
                    }
                    let address = contract_address
                        .filter(|a| !a.is_zero())
                        .ok_or(DeployError::MissingContractAddress { tx_hash })?;
                    if network.confirmations <= 1 {
                        return Ok((address, block_number));
                    }
                    match self.provider.block_number().await {
                        Ok(head) => {
                            let depth = head.saturating_sub(block_number) + 1;
                            if depth >= network.confirmations {
                                return Ok((address, block_number));
                            }
                            debug!(
                                "{} mined in block {}, {}/{} confirmations",
                                tx_hash, block_number, depth, network.confirmations
                            );
                        }
                        Err(e) => warn!("Failed to read block number: {:#}", e),
                    }
                }
                Ok(TransactionStatus::Pending) => debug!("{} still pending", tx_hash),
                // Load-balanced RPCs can lag behind the node that took the tx
                Ok(TransactionStatus::Unknown) => debug!("{} not yet visible", tx_hash),
                Err(e) => warn!("Failed to query status of {}: {:#}", tx_hash, e),
            }

            match backoff.next_delay() {
                Some(delay) => {
                    debug!(
                        "Confirmation attempt {} for {}, retrying in {:?}",
                        backoff.attempts(),
                        tx_hash,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(DeployError::ConfirmationTimeout {
                        tx_hash,
                        waited: backoff.elapsed(),
                    });
                }
            }
        }
    }

    fn finish(
        &self,
        mut state: WorkflowState,
        factory: &str,
        constructor_args: Bytes,
        tx_hash: TxHash,
        network: NetworkConfig,
        confirmed: Result<(Address, u64), DeployError>,
    ) -> Result<DeploymentResult, DeployError> {
        match confirmed {
            Ok((address, block_number)) => {
                if let Some(ledger) = &self.ledger {
                    if let Err(e) = ledger.mark_confirmed(&network.name, tx_hash, address, block_number) {
                        warn!("Could not mark {} as confirmed in ledger: {}", tx_hash, e);
                    }
                }
                state.advance("Deployment", WorkflowState::Completed);
                info!("{} deployed at {} in block {}", factory, address, block_number);
                Ok(DeploymentResult {
                    factory: factory.to_string(),
                    address,
                    tx_hash,
                    block_number,
                    constructor_args,
                    network,
                })
            }
            Err(e) => {
                // A timed out transaction may still land, so its record stays pending
                let failed_on_chain = matches!(
                    e,
                    DeployError::RevertedDeployment { .. } | DeployError::MissingContractAddress { .. }
                );
                if failed_on_chain {
                    if let Some(ledger) = &self.ledger {
                        if let Err(le) = ledger.mark_failed(&network.name, tx_hash, &e.to_string()) {
                            warn!("Could not mark {} as failed in ledger: {}", tx_hash, le);
                        }
                    }
                }
                state.advance("Deployment", WorkflowState::Failed(e.kind().to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::provider::MockNetworkProvider;
    use crate::types::deployment::DEFAULT_FACTORY;
    use crate::types::secret::Secret;
    use crate::utils::artifact_registry::tests::FACTORY_ABI;
    use crate::utils::artifact_registry::{FactoryArtifact, MockArtifactRegistry};
    use crate::utils::backoff::PollPolicy;
    use crate::utils::ledger::RecordStatus;
    use alloy::json_abi::JsonAbi;
    use eyre::eyre;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const CREATION_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

    fn test_network() -> NetworkConfig {
        let mut network = NetworkConfig::new(
            "sepolia",
            11155111,
            Secret::new("https://rpc.example.org/v2/token"),
        );
        network.confirmation = PollPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::from_secs(10),
        );
        network
    }

    fn registry() -> Arc<MockArtifactRegistry> {
        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_resolve()
            .returning(|name| match name {
                DEFAULT_FACTORY => Ok(FactoryArtifact {
                    contract_name: name.to_string(),
                    source_name: "contracts/InsuranceProtocolFactory.sol".to_string(),
                    abi: serde_json::from_str::<JsonAbi>(FACTORY_ABI).unwrap(),
                    bytecode: Bytes::from(CREATION_CODE.to_vec()),
                    build_info: None,
                }),
                _ => Err(DeployError::ArtifactNotFound {
                    name: name.to_string(),
                    searched: "artifacts".into(),
                }),
            });
        Arc::new(registry)
    }

    fn created_address(tx_hash: TxHash) -> Address {
        Address::from_slice(&tx_hash[12..])
    }

    /// Every submission gets a fresh hash, and every hash mines a contract at
    /// an address derived from it.
    fn mining_provider(network: NetworkConfig) -> MockNetworkProvider {
        let nonce = Arc::new(AtomicU8::new(1));
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(move || network.clone());
        provider.expect_submit_deployment().returning(move |code| {
            assert!(code.starts_with(&CREATION_CODE));
            Ok(TxHash::repeat_byte(nonce.fetch_add(1, Ordering::SeqCst)))
        });
        provider
            .expect_transaction_status()
            .returning(|tx_hash| {
                Ok(TransactionStatus::Mined {
                    block_number: 100,
                    contract_address: Some(created_address(tx_hash)),
                    success: true,
                })
            });
        provider.expect_block_number().returning(|| Ok(100));
        provider
    }

    #[tokio::test]
    async fn test_deploy_returns_well_formed_address() {
        let deployer = Deployer::new(registry(), Arc::new(mining_provider(test_network())));
        let result = deployer.deploy(&DeploymentRequest::default()).await.unwrap();

        let rendered = result.address.to_string();
        assert_eq!(rendered.len(), 42);
        assert!(rendered.starts_with("0x"));
        assert!(rendered[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(result.block_number, 100);

        let described = result.describe().to_string();
        assert!(!described.contains("token"));
    }

    #[tokio::test]
    async fn test_deploy_twice_yields_two_contracts() {
        let deployer = Deployer::new(registry(), Arc::new(mining_provider(test_network())));
        let request = DeploymentRequest::default();

        let first = deployer.deploy(&request).await.unwrap();
        let second = deployer.deploy(&request).await.unwrap();
        assert_ne!(first.address, second.address);
        assert_ne!(first.tx_hash, second.tx_hash);
    }

    #[tokio::test]
    async fn test_unknown_factory_fails_before_submission() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider.expect_submit_deployment().never();

        let deployer = Deployer::new(registry(), Arc::new(provider));
        let err = deployer
            .deploy(&DeploymentRequest::new("PolicyFactoryV9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ArtifactNotFoundError");
    }

    #[tokio::test]
    async fn test_bad_constructor_arguments_fail_before_submission() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider.expect_submit_deployment().never();

        let deployer = Deployer::new(registry(), Arc::new(provider));
        let request = DeploymentRequest::default().with_constructor_args(vec!["42".to_string()]);
        let err = deployer.deploy(&request).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidConstructorArgumentsError");
    }

    #[tokio::test]
    async fn test_rejected_submission_emits_no_address() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());

        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider
            .expect_submit_deployment()
            .times(1)
            .returning(|_| Err(eyre!("insufficient funds for gas * price + value")));
        provider.expect_transaction_status().never();

        let deployer = Deployer::new(registry(), Arc::new(provider)).with_ledger(ledger.clone());
        let err = deployer.deploy(&DeploymentRequest::default()).await.unwrap_err();

        assert!(matches!(err, DeployError::Submission(ref msg) if msg.contains("insufficient funds")));
        assert_eq!(err.tx_hash(), None);
        assert!(ledger.load("sepolia").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_deployment_is_marked_failed() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());
        let tx_hash = TxHash::repeat_byte(0xaa);

        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider.expect_submit_deployment().returning(move |_| Ok(tx_hash));
        provider.expect_transaction_status().returning(|_| {
            Ok(TransactionStatus::Mined {
                block_number: 7,
                contract_address: None,
                success: false,
            })
        });

        let deployer = Deployer::new(registry(), Arc::new(provider)).with_ledger(ledger.clone());
        let err = deployer.deploy(&DeploymentRequest::default()).await.unwrap_err();

        assert_eq!(err.kind(), "RevertedDeploymentError");
        assert_eq!(err.tx_hash(), Some(tx_hash));
        let record = ledger.find_by_tx("sepolia", tx_hash).unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_keeps_record_pending() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());
        let tx_hash = TxHash::repeat_byte(0xbb);

        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider.expect_submit_deployment().returning(move |_| Ok(tx_hash));
        provider
            .expect_transaction_status()
            .returning(|_| Ok(TransactionStatus::Pending));

        let deployer = Deployer::new(registry(), Arc::new(provider)).with_ledger(ledger.clone());
        let err = deployer.deploy(&DeploymentRequest::default()).await.unwrap_err();

        match err {
            DeployError::ConfirmationTimeout { tx_hash: hash, waited } => {
                assert_eq!(hash, tx_hash);
                assert!(waited >= Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        let record = ledger.find_by_tx("sepolia", tx_hash).unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_confirmation_depth() {
        let head = Arc::new(AtomicU8::new(100));

        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(|| {
            let mut network = test_network();
            network.confirmations = 3;
            network
        });
        provider
            .expect_submit_deployment()
            .returning(|_| Ok(TxHash::repeat_byte(1)));
        provider.expect_transaction_status().returning(|tx_hash| {
            Ok(TransactionStatus::Mined {
                block_number: 100,
                contract_address: Some(created_address(tx_hash)),
                success: true,
            })
        });
        let polled = head.clone();
        provider
            .expect_block_number()
            .returning(move || Ok(polled.fetch_add(1, Ordering::SeqCst) as u64));

        let deployer = Deployer::new(registry(), Arc::new(provider));
        let result = deployer.deploy(&DeploymentRequest::default()).await.unwrap();
        assert_eq!(result.block_number, 100);
        // Heads 100, 101 are too shallow, 102 gives three confirmations
        assert_eq!(head.load(Ordering::SeqCst), 103);
    }

    #[tokio::test]
    async fn test_pending_record_blocks_new_deployment() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());
        let stuck = TxHash::repeat_byte(0xcc);
        ledger
            .record_pending(DeploymentRecord::pending(
                DEFAULT_FACTORY,
                "sepolia",
                11155111,
                stuck,
                Bytes::new(),
            ))
            .unwrap();

        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider.expect_submit_deployment().never();
        let deployer = Deployer::new(registry(), Arc::new(provider)).with_ledger(ledger.clone());

        let err = deployer.deploy(&DeploymentRequest::default()).await.unwrap_err();
        assert!(matches!(err, DeployError::PendingDeploymentExists { tx_hash, .. } if tx_hash == stuck));

        let deployer = Deployer::new(registry(), Arc::new(mining_provider(test_network())))
            .with_ledger(ledger.clone());
        let result = deployer
            .deploy(&DeploymentRequest::default().allow_pending(true))
            .await
            .unwrap();
        let record = ledger.find_by_tx("sepolia", result.tx_hash).unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Confirmed);
        assert_eq!(record.address, Some(result.address));
    }

    #[tokio::test]
    async fn test_recover_confirms_recorded_deployment() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());
        let tx_hash = TxHash::repeat_byte(0x42);
        ledger
            .record_pending(DeploymentRecord::pending(
                DEFAULT_FACTORY,
                "sepolia",
                11155111,
                tx_hash,
                Bytes::from(vec![1u8; 32]),
            ))
            .unwrap();

        let deployer = Deployer::new(registry(), Arc::new(mining_provider(test_network())))
            .with_ledger(ledger.clone());

        let result = deployer.recover(tx_hash, "PolicyFactory").await.unwrap();
        assert_eq!(result.factory, DEFAULT_FACTORY);
        assert_eq!(result.address, created_address(tx_hash));
        assert_eq!(result.constructor_args.len(), 32);
        assert_eq!(
            ledger.find_by_tx("sepolia", tx_hash).unwrap().unwrap().status,
            RecordStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_recover_unknown_transaction() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider
            .expect_transaction_status()
            .times(1)
            .returning(|_| Ok(TransactionStatus::Unknown));

        let deployer = Deployer::new(registry(), Arc::new(provider));
        let err = deployer
            .recover(TxHash::repeat_byte(9), DEFAULT_FACTORY)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownTransactionError");
        assert_eq!(err.tx_hash(), Some(TxHash::repeat_byte(9)));
    }

    #[tokio::test]
    async fn test_recover_records_untracked_deployment() {
        let dir = TempDir::new().unwrap();
        let ledger = DeploymentLedger::new(dir.path());
        let tx_hash = TxHash::repeat_byte(0x24);
        assert!(ledger.find_by_tx("sepolia", tx_hash).unwrap().is_none());

        let deployer = Deployer::new(registry(), Arc::new(mining_provider(test_network())))
            .with_ledger(ledger.clone());
        let result = deployer.recover(tx_hash, DEFAULT_FACTORY).await.unwrap();
        assert_eq!(result.factory, DEFAULT_FACTORY);
        assert_eq!(result.address, created_address(tx_hash));

        let record = ledger.find_by_tx("sepolia", tx_hash).unwrap().unwrap();
        assert_eq!(record.factory, DEFAULT_FACTORY);
        assert_eq!(record.status, RecordStatus::Confirmed);
        assert_eq!(record.address, Some(created_address(tx_hash)));
        assert_eq!(
            ledger.latest_confirmed("sepolia", DEFAULT_FACTORY).unwrap().map(|r| r.tx_hash),
            Some(tx_hash)
        );
    }

    #[tokio::test]
    async fn test_recover_status_query_failure_keeps_tx_hash() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(test_network);
        provider
            .expect_transaction_status()
            .times(1)
            .returning(|_| Err(eyre!("connection reset by peer")));

        let tx_hash = TxHash::repeat_byte(5);
        let deployer = Deployer::new(registry(), Arc::new(provider));
        let err = deployer.recover(tx_hash, DEFAULT_FACTORY).await.unwrap_err();
        assert_eq!(err.kind(), "StatusQueryError");
        assert_eq!(err.tx_hash(), Some(tx_hash));
        assert!(err.to_string().contains("connection reset by peer"));
    }
}
