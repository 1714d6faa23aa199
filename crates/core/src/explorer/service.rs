use crate::error::VerifyError;
use crate::types::verification::{VerificationRequest, VerificationStatus};
use alloy::primitives::Address;
use async_trait::async_trait;

/// External source-verification service (Etherscan and compatibles).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Submits source and compiler metadata, returning the service's job id.
    async fn submit(&self, request: &VerificationRequest) -> Result<String, VerifyError>;

    /// Polls the job `guid` submitted for `address`.
    async fn check_status(&self, guid: &str, address: Address) -> Result<VerificationStatus, VerifyError>;
}
