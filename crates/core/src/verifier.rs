use crate::error::VerifyError;
use crate::explorer::service::VerificationService;
use crate::network::provider::NetworkProvider;
use crate::types::network_config::NetworkConfig;
use crate::types::verification::{VerificationOutcome, VerificationRequest, VerificationStatus};
use crate::types::workflow_state::WorkflowState;
use crate::utils::backoff::{Backoff, PollPolicy};
use alloy::primitives::Address;
use log::{debug, info, warn};
use std::sync::Arc;

/// Registers a deployed contract's source with a verification service and
/// waits for the verdict. "Already verified" counts as success.
pub struct Verifier {
    service: Arc<dyn VerificationService>,
    provider: Option<Arc<dyn NetworkProvider>>,
    policy: PollPolicy,
    submit_attempts: u32,
}

impl Verifier {
    pub fn new(service: Arc<dyn VerificationService>, network: &NetworkConfig) -> Self {
        Self {
            service,
            provider: None,
            policy: network.verification,
            submit_attempts: network.verification_submit_attempts.max(1),
        }
    }

    /// Checks that the target holds code before anything is sent to the
    /// service.
    pub fn with_code_check(mut self, provider: Arc<dyn NetworkProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome, VerifyError> {
        let mut state = WorkflowState::Initiated;
        info!(
            "[{}] Verifying {} at {}",
            state,
            request.metadata.fully_qualified_name(),
            request.address
        );

        let result = self.run(request, &mut state).await;
        match &result {
            Ok(outcome) => {
                state.advance("Verification", WorkflowState::Completed);
                info!("{} at {}: {:?}", request.metadata.contract_name, request.address, outcome);
            }
            Err(e) => state.advance("Verification", WorkflowState::Failed(e.kind().to_string())),
        }
        result
    }

    async fn run(
        &self,
        request: &VerificationRequest,
        state: &mut WorkflowState,
    ) -> Result<VerificationOutcome, VerifyError> {
        if request.address.is_zero() {
            return Err(VerifyError::InvalidAddress(request.address.to_string()));
        }
        self.check_code(request).await?;

        let guid = match self.submit(request).await {
            Ok(guid) => guid,
            Err(VerifyError::AlreadyVerified(address)) => {
                info!("{} is already verified", address);
                state.advance("Verification", WorkflowState::Submitted);
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            Err(e) => return Err(e),
        };
        state.advance("Verification", WorkflowState::Submitted);
        info!("Verification submitted, guid {}", guid);

        self.await_result(&guid, request.address).await
    }

    async fn check_code(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        let code = provider
            .code_at(request.address)
            .await
            .map_err(|e| VerifyError::Network(format!("{:#}", e)))?;
        if code.is_empty() {
            return Err(VerifyError::AddressMismatch {
                address: request.address,
                reason: format!("no contract code on {}", provider.network().name),
            });
        }
        debug!("{} holds {} bytes of code", request.address, code.len());
        Ok(())
    }

    /// Only `ServiceUnavailable` is retried; every other error ends the run.
    async fn submit(&self, request: &VerificationRequest) -> Result<String, VerifyError> {
        let mut backoff = Backoff::new(self.policy);
        let mut attempt = 1;
        loop {
            match self.service.submit(request).await {
                Err(e) if e.is_retryable() && attempt < self.submit_attempts => {
                    let Some(delay) = backoff.next_delay() else {
                        return Err(e);
                    };
                    warn!(
                        "Verification submit attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, self.submit_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn await_result(&self, guid: &str, address: Address) -> Result<VerificationOutcome, VerifyError> {
        let mut backoff = Backoff::new(self.policy);
        loop {
            let Some(delay) = backoff.next_delay() else {
                return Err(VerifyError::VerificationTimeout {
                    guid: guid.to_string(),
                    waited: backoff.elapsed(),
                });
            };
            tokio::time::sleep(delay).await;

            match self.service.check_status(guid, address).await {
                Ok(VerificationStatus::Verified) => return Ok(VerificationOutcome::Verified),
                Ok(VerificationStatus::AlreadyVerified) => {
                    return Ok(VerificationOutcome::AlreadyVerified);
                }
                Ok(VerificationStatus::Pending) => {
                    debug!("Verification {} pending (check {})", guid, backoff.attempts())
                }
                // Status checks are reads, an outage only delays the verdict
                Err(e) if e.is_retryable() => warn!("Status check for {} failed: {}", guid, e),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::service::MockVerificationService;
    use crate::network::provider::MockNetworkProvider;
    use crate::types::secret::Secret;
    use crate::types::verification::tests::sample_metadata;
    use alloy::primitives::{Bytes, address};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const TARGET: Address = address!("0x5F2F11ad8656439d5C14d9B351f8b09cDaC2A02d");

    fn network() -> NetworkConfig {
        let mut network = NetworkConfig::new("sepolia", 11155111, Secret::new("http://localhost:8545"));
        network.verification = PollPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(4),
            Duration::from_secs(30),
        );
        network
    }

    fn request() -> VerificationRequest {
        VerificationRequest::new(TARGET, sample_metadata(), Bytes::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_after_pending() {
        let checks = Arc::new(AtomicU32::new(0));
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|_| Ok("guid-1".to_string()));
        let counter = checks.clone();
        service.expect_check_status().returning(move |guid, address| {
            assert_eq!(guid, "guid-1");
            assert_eq!(address, TARGET);
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(VerificationStatus::Pending)
            } else {
                Ok(VerificationStatus::Verified)
            }
        });

        let verifier = Verifier::new(Arc::new(service), &network());
        assert_eq!(
            verifier.verify(&request()).await.unwrap(),
            VerificationOutcome::Verified
        );
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_already_verified_is_success() {
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|r| Err(VerifyError::AlreadyVerified(r.address)));
        service.expect_check_status().never();

        let verifier = Verifier::new(Arc::new(service), &network());
        assert_eq!(
            verifier.verify(&request()).await.unwrap(),
            VerificationOutcome::AlreadyVerified
        );
    }

    #[tokio::test]
    async fn test_missing_code_fails_without_contacting_service() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_network().returning(network);
        provider.expect_code_at().times(1).returning(|_| Ok(Bytes::new()));
        let mut service = MockVerificationService::new();
        service.expect_submit().never();

        let verifier = Verifier::new(Arc::new(service), &network()).with_code_check(Arc::new(provider));
        let err = verifier.verify(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "AddressMismatchError");
    }

    #[tokio::test]
    async fn test_address_mismatch_is_not_retried() {
        let mut service = MockVerificationService::new();
        service.expect_submit().times(1).returning(|r| {
            Err(VerifyError::AddressMismatch {
                address: r.address,
                reason: "Unable to locate ContractCode".to_string(),
            })
        });

        let verifier = Verifier::new(Arc::new(service), &network());
        let err = verifier.verify(&request()).await.unwrap_err();
        assert!(matches!(err, VerifyError::AddressMismatch { address, .. } if address == TARGET));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compiler_mismatch_surfaces_exact_kind() {
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|_| Ok("guid-2".to_string()));
        service
            .expect_check_status()
            .times(1)
            .returning(|_, _| Err(VerifyError::CompilerMismatch("Fail - Unable to verify".to_string())));

        let verifier = Verifier::new(Arc::new(service), &network());
        let err = verifier.verify(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "CompilerMismatchError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_code_reported_by_status_check() {
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|_| Ok("guid-5".to_string()));
        service.expect_check_status().times(1).returning(|_, address| {
            Err(VerifyError::AddressMismatch {
                address,
                reason: "Fail - Unable to verify. Unable to locate ContractCode".to_string(),
            })
        });

        let verifier = Verifier::new(Arc::new(service), &network());
        let err = verifier.verify(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "AddressMismatchError");
        assert!(matches!(err, VerifyError::AddressMismatch { address, .. } if address == TARGET));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_outage_is_retried() {
        let submits = Arc::new(AtomicU32::new(0));
        let counter = submits.clone();
        let mut service = MockVerificationService::new();
        service.expect_submit().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VerifyError::ServiceUnavailable("HTTP 502 Bad Gateway".to_string()))
            } else {
                Ok("guid-3".to_string())
            }
        });
        service
            .expect_check_status()
            .returning(|_, _| Ok(VerificationStatus::Verified));

        let verifier = Verifier::new(Arc::new(service), &network());
        assert_eq!(
            verifier.verify(&request()).await.unwrap(),
            VerificationOutcome::Verified
        );
        assert_eq!(submits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_outage_gives_up_after_attempts() {
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .times(3)
            .returning(|_| Err(VerifyError::ServiceUnavailable("HTTP 503".to_string())));

        let verifier = Verifier::new(Arc::new(service), &network());
        let err = verifier.verify(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out() {
        let mut service = MockVerificationService::new();
        service
            .expect_submit()
            .returning(|_| Ok("guid-4".to_string()));
        service
            .expect_check_status()
            .returning(|_, _| Ok(VerificationStatus::Pending));

        let verifier = Verifier::new(Arc::new(service), &network());
        match verifier.verify(&request()).await.unwrap_err() {
            VerifyError::VerificationTimeout { guid, waited } => {
                assert_eq!(guid, "guid-4");
                assert!(waited >= Duration::from_secs(30));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_address_is_rejected() {
        let mut service = MockVerificationService::new();
        service.expect_submit().never();

        let verifier = Verifier::new(Arc::new(service), &network());
        let request = VerificationRequest::new(Address::ZERO, sample_metadata(), Bytes::new());
        assert_eq!(
            verifier.verify(&request).await.unwrap_err().kind(),
            "InvalidAddressError"
        );
    }
}
