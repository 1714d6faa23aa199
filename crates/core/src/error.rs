use alloy::primitives::{Address, TxHash};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the deploy workflow. Every variant produced after submission
/// carries the transaction hash so the operator can recover manually.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("artifact {name} not found under {}", searched.display())]
    ArtifactNotFound { name: String, searched: PathBuf },

    #[error("artifact {name} is not deployable: {reason}")]
    InvalidArtifact { name: String, reason: String },

    #[error("invalid constructor arguments: {0}")]
    InvalidConstructorArguments(String),

    #[error(
        "{factory} already has a pending deployment {tx_hash} on {network}, run `recover --tx {tx_hash}` or pass --allow-pending"
    )]
    PendingDeploymentExists {
        factory: String,
        network: String,
        tx_hash: TxHash,
    },

    #[error("deployment transaction rejected: {0}")]
    Submission(String),

    #[error("deployment transaction {tx_hash} not confirmed after {}s", waited.as_secs())]
    ConfirmationTimeout { tx_hash: TxHash, waited: Duration },

    #[error("deployment transaction {tx_hash} reverted in block {block_number}")]
    RevertedDeployment { tx_hash: TxHash, block_number: u64 },

    #[error("deployment transaction {tx_hash} was mined without creating a contract")]
    MissingContractAddress { tx_hash: TxHash },

    #[error("transaction {tx_hash} is unknown to the network")]
    UnknownTransaction { tx_hash: TxHash },

    #[error("status query for transaction {tx_hash} failed: {reason}")]
    StatusQuery { tx_hash: TxHash, reason: String },
}

impl DeployError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::ArtifactNotFound { .. } => "ArtifactNotFoundError",
            DeployError::InvalidArtifact { .. } => "InvalidArtifactError",
            DeployError::InvalidConstructorArguments(_) => "InvalidConstructorArgumentsError",
            DeployError::PendingDeploymentExists { .. } => "PendingDeploymentError",
            DeployError::Submission(_) => "SubmissionError",
            DeployError::ConfirmationTimeout { .. } => "ConfirmationTimeoutError",
            DeployError::RevertedDeployment { .. } => "RevertedDeploymentError",
            DeployError::MissingContractAddress { .. } => "MissingContractAddressError",
            DeployError::UnknownTransaction { .. } => "UnknownTransactionError",
            DeployError::StatusQuery { .. } => "StatusQueryError",
        }
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            DeployError::PendingDeploymentExists { tx_hash, .. }
            | DeployError::ConfirmationTimeout { tx_hash, .. }
            | DeployError::RevertedDeployment { tx_hash, .. }
            | DeployError::MissingContractAddress { tx_hash }
            | DeployError::UnknownTransaction { tx_hash }
            | DeployError::StatusQuery { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid target address: {0}")]
    InvalidAddress(String),

    #[error("no deployed bytecode matches {address}: {reason}")]
    AddressMismatch { address: Address, reason: String },

    /// Reported by the service for contracts whose source is already public.
    /// The verifier turns this into a successful outcome.
    #[error("contract {0} is already verified")]
    AlreadyVerified(Address),

    #[error("compiled bytecode does not match the deployed contract: {0}")]
    CompilerMismatch(String),

    #[error("verification service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("verification {guid} did not complete within {}s", waited.as_secs())]
    VerificationTimeout { guid: String, waited: Duration },

    #[error("verification request rejected: {0}")]
    Rejected(String),

    #[error("network query failed: {0}")]
    Network(String),
}

impl VerifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::InvalidAddress(_) => "InvalidAddressError",
            VerifyError::AddressMismatch { .. } => "AddressMismatchError",
            VerifyError::AlreadyVerified(_) => "AlreadyVerifiedError",
            VerifyError::CompilerMismatch(_) => "CompilerMismatchError",
            VerifyError::ServiceUnavailable(_) => "ServiceUnavailableError",
            VerifyError::VerificationTimeout { .. } => "VerificationTimeoutError",
            VerifyError::Rejected(_) => "VerificationRejectedError",
            VerifyError::Network(_) => "NetworkError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::ServiceUnavailable(_))
    }
}

/// Taxonomy name of the first typed workflow error in the chain, if any.
pub fn error_kind(err: &eyre::Report) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<DeployError>()
            .map(DeployError::kind)
            .or_else(|| cause.downcast_ref::<VerifyError>().map(VerifyError::kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn test_post_submission_errors_carry_tx_hash() {
        let tx_hash = TxHash::with_last_byte(7);
        let err = DeployError::ConfirmationTimeout {
            tx_hash,
            waited: Duration::from_secs(600),
        };
        assert_eq!(err.tx_hash(), Some(tx_hash));
        assert!(err.to_string().contains(&tx_hash.to_string()));

        let err = DeployError::Submission("insufficient funds for gas * price + value".into());
        assert_eq!(err.tx_hash(), None);
        assert_eq!(err.kind(), "SubmissionError");
    }

    #[test]
    fn test_error_kind_through_report_chain() {
        let report = eyre::Report::new(VerifyError::CompilerMismatch("Fail - Unable to verify".into()));
        assert_eq!(error_kind(&report), Some("CompilerMismatchError"));

        let wrapped: eyre::Result<()> = Err(DeployError::Submission("nonce too low".into()))
            .wrap_err("deploying InsuranceProtocolFactory");
        assert_eq!(error_kind(&wrapped.unwrap_err()), Some("SubmissionError"));

        assert_eq!(error_kind(&eyre::eyre!("plain")), None);
    }

    #[test]
    fn test_only_service_outages_are_retryable() {
        assert!(VerifyError::ServiceUnavailable("502".into()).is_retryable());
        assert!(!VerifyError::CompilerMismatch("x".into()).is_retryable());
        assert!(
            !VerifyError::AddressMismatch {
                address: Address::ZERO,
                reason: "no code".into()
            }
            .is_retryable()
        );
    }
}
