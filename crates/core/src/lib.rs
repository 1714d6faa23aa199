pub mod deployer;
pub mod error;
pub mod explorer;
pub mod network;
pub mod types;
pub mod utils;
pub mod verifier;

pub use alloy::primitives::{Address, Bytes, TxHash};

use crate::deployer::Deployer;
use crate::explorer::EtherscanClient;
use crate::network::RpcNetworkProvider;
use crate::types::config_wrapper::ConfigWrapper;
use crate::types::deployment::{DEFAULT_FACTORY, DeploymentRequest, DeploymentResult};
use crate::types::verification::{CompilerMetadata, VerificationOutcome, VerificationRequest};
use crate::utils::address_or_contract_name::AddressOrContractName;
use crate::utils::artifact_registry::{ArtifactRegistry, HardhatArtifacts};
use crate::utils::ledger::{DeploymentLedger, DeploymentRecord};
use crate::verifier::Verifier;
use dotenv::dotenv;
use eyre::{Result, eyre};
use log::info;
use std::sync::Arc;

/// Reads `.env` and the config file. Called once at process start.
pub fn load_config(path: Option<&str>) -> Result<ConfigWrapper> {
    dotenv().ok();
    ConfigWrapper::from_file(path)
}

/// Network given on the command line, else the config's `default_network`.
pub fn resolve_network(config: &ConfigWrapper, requested: Option<&str>) -> Result<String> {
    requested
        .map(|n| n.to_string())
        .or_else(|| config.default_network())
        .ok_or_else(|| eyre!("No network given and no default_network in config"))
}

/// Deploys a new instance of the requested factory. Not idempotent: each
/// call creates a new contract.
pub async fn deploy_factory(
    config: &ConfigWrapper,
    network: &str,
    request: &DeploymentRequest,
) -> Result<DeploymentResult> {
    let network_config = config.network_config(network)?;
    let deployer_key = config.deployer_key(network)?;
    let provider = RpcNetworkProvider::connect(network_config, &deployer_key).await?;

    let deployer = Deployer::new(Arc::new(HardhatArtifacts::new(config.artifacts_dir())), provider)
        .with_ledger(DeploymentLedger::new(config.ledger_dir()));
    Ok(deployer.deploy(request).await?)
}

/// Resumes waiting on a deployment submitted by an earlier run. `factory`
/// names the contract when the ledger has no record of `tx_hash`.
pub async fn recover_deployment(
    config: &ConfigWrapper,
    network: &str,
    tx_hash: TxHash,
    factory: &str,
) -> Result<DeploymentResult> {
    let network_config = config.network_config(network)?;
    let deployer_key = config.deployer_key(network)?;
    let provider = RpcNetworkProvider::connect(network_config, &deployer_key).await?;

    let deployer = Deployer::new(Arc::new(HardhatArtifacts::new(config.artifacts_dir())), provider)
        .with_ledger(DeploymentLedger::new(config.ledger_dir()));
    Ok(deployer.recover(tx_hash, factory).await?)
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Artifact to verify against. Defaults to the factory recorded for the
    /// target in the ledger, then to the target name, then to
    /// `InsuranceProtocolFactory`.
    pub factory: Option<String>,
    /// ABI-encoded constructor arguments, overriding the ledger's.
    pub constructor_args: Option<Bytes>,
    /// Full solc version, overriding the build info's.
    pub compiler_version: Option<String>,
    pub skip_code_check: bool,
}

#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub address: Address,
    pub contract: String,
    pub outcome: VerificationOutcome,
    pub explorer_url: Option<String>,
}

pub async fn verify_contract(
    config: &ConfigWrapper,
    network: &str,
    target: &AddressOrContractName,
    options: &VerifyOptions,
) -> Result<VerifySummary> {
    let network_config = config.network_config(network)?;
    let ledger = DeploymentLedger::new(config.ledger_dir());
    let (address, record) = target.resolve(&ledger, network)?;
    if let AddressOrContractName::ContractName(_) = target {
        info!("Resolved {} to {} through the ledger", target, address);
    }

    let factory = options
        .factory
        .clone()
        .or_else(|| record.as_ref().map(|r| r.factory.clone()))
        .or_else(|| match target {
            AddressOrContractName::ContractName(name) => Some(name.clone()),
            AddressOrContractName::Address(_) => None,
        })
        .unwrap_or_else(|| DEFAULT_FACTORY.to_string());

    let artifact = HardhatArtifacts::new(config.artifacts_dir()).resolve(&factory)?;
    let build_info = artifact.build_info.as_ref().ok_or_else(|| {
        eyre!(
            "No build info for {}, recompile with Hardhat to produce it",
            artifact.fully_qualified_name()
        )
    })?;
    let mut metadata =
        CompilerMetadata::from_build_info(build_info, &artifact.source_name, &artifact.contract_name)?;
    if let Some(version) = &options.compiler_version {
        metadata = metadata.with_compiler_version(version);
    }

    let constructor_args = options
        .constructor_args
        .clone()
        .or_else(|| record.map(|r| r.constructor_args))
        .unwrap_or_default();

    let explorer_api_url = network_config
        .explorer_api_url
        .clone()
        .ok_or_else(|| eyre!("explorer_api_url not found for network: {}", network))?;
    let api_key = config.explorer_api_key(network)?;
    let service = EtherscanClient::new(explorer_api_url, api_key, network_config.chain_id)?;

    let mut verifier = Verifier::new(Arc::new(service), &network_config);
    if !options.skip_code_check {
        let provider = RpcNetworkProvider::connect_read_only(network_config.clone()).await?;
        verifier = verifier.with_code_check(provider);
    }

    let contract = metadata.fully_qualified_name();
    info!("Verifying {} at {} on {}", contract, address, network);
    let request = VerificationRequest::new(address, metadata, constructor_args);
    let outcome = verifier.verify(&request).await?;

    Ok(VerifySummary {
        address,
        contract,
        outcome,
        explorer_url: network_config.explorer_address_url(&address.to_string()),
    })
}

pub fn ledger_records(config: &ConfigWrapper, network: &str) -> Result<Vec<DeploymentRecord>> {
    config.network_config(network)?;
    DeploymentLedger::new(config.ledger_dir()).load(network)
}
