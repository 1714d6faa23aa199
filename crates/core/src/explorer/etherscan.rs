use crate::error::VerifyError;
use crate::explorer::service::VerificationService;
use crate::types::secret::Secret;
use crate::types::verification::{VerificationRequest, VerificationStatus};
use alloy::primitives::Address;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Etherscan API client for source verification.
pub struct EtherscanClient {
    client: Client,
    api_url: String,
    api_key: Secret,
    chain_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct EtherscanResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub result: String,
}

impl EtherscanClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(api_url: impl Into<String>, api_key: Secret, chain_id: u64) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerifyError::Network(e.without_url().to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            chain_id,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<EtherscanResponse, VerifyError> {
        // Request urls carry the API key, so they are dropped from errors.
        let response = request
            .send()
            .await
            .map_err(|e| VerifyError::ServiceUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VerifyError::ServiceUnavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(VerifyError::Rejected(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VerifyError::ServiceUnavailable(e.without_url().to_string()))?;
        serde_json::from_str::<EtherscanResponse>(&body).map_err(|_| {
            VerifyError::ServiceUnavailable(format!(
                "unexpected response: {}",
                self.api_key.scrub(truncate(&body, 200))
            ))
        })
    }
}

#[async_trait]
impl VerificationService for EtherscanClient {
    async fn submit(&self, request: &VerificationRequest) -> Result<String, VerifyError> {
        let source_code = serde_json::to_string(&request.metadata.standard_json_input)
            .map_err(|e| VerifyError::Rejected(format!("cannot encode compiler input: {}", e)))?;
        let chain_id = self.chain_id.to_string();
        let address = request.address.to_string();
        let contract_name = request.metadata.fully_qualified_name();
        let compiler_version = request.metadata.explorer_compiler_version();
        let constructor_args = hex::encode(&request.constructor_args);
        let optimization_used = if request.metadata.optimizer.enabled { "1" } else { "0" };
        let runs = request.metadata.optimizer.runs.to_string();

        debug!(
            "Submitting {} at {} for verification with {}",
            contract_name, address, compiler_version
        );
        let form = [
            ("apikey", self.api_key.expose()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source_code.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            ("optimizationUsed", optimization_used),
            ("runs", runs.as_str()),
            // Misspelling is part of the Etherscan API
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response = self
            .send(
                self.client
                    .post(&self.api_url)
                    .query(&[("chainid", chain_id.as_str())])
                    .form(&form),
            )
            .await?;
        classify_submission(request.address, response)
    }

    async fn check_status(&self, guid: &str, address: Address) -> Result<VerificationStatus, VerifyError> {
        let chain_id = self.chain_id.to_string();
        let response = self
            .send(self.client.get(&self.api_url).query(&[
                ("apikey", self.api_key.expose()),
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ]))
            .await?;
        classify_status(address, response)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn is_rate_limited(text: &str) -> bool {
    text.contains("rate limit") || text.contains("too many") || text.contains("try again later")
}

fn is_missing_code(text: &str) -> bool {
    text.contains("unable to locate contractcode") || text.contains("no contract code")
}

fn is_compiler_mismatch(text: &str) -> bool {
    text.contains("unable to verify")
        || text.contains("does not match")
        || text.contains("bytecode mismatch")
        || text.contains("compilation error")
        || text.contains("invalid compilerversion")
}

/// Maps a `verifysourcecode` response to a job id or a typed failure.
pub fn classify_submission(address: Address, response: EtherscanResponse) -> Result<String, VerifyError> {
    let text = response.result.to_lowercase();
    if response.status == "1" && !response.result.is_empty() {
        return Ok(response.result);
    }
    if text.contains("already verified") {
        return Err(VerifyError::AlreadyVerified(address));
    }
    if is_missing_code(&text) {
        return Err(VerifyError::AddressMismatch {
            address,
            reason: response.result,
        });
    }
    if is_rate_limited(&text) {
        return Err(VerifyError::ServiceUnavailable(response.result));
    }
    if is_compiler_mismatch(&text) {
        return Err(VerifyError::CompilerMismatch(response.result));
    }
    Err(VerifyError::Rejected(format!(
        "{}: {}",
        response.message, response.result
    )))
}

/// Maps a `checkverifystatus` response to a job status or a typed failure.
/// Missing code is checked before the generic "Fail - Unable to verify"
/// prefix, which Etherscan puts in front of both.
pub fn classify_status(address: Address, response: EtherscanResponse) -> Result<VerificationStatus, VerifyError> {
    let text = response.result.to_lowercase();
    if text.contains("pending in queue") || text.contains("in progress") {
        return Ok(VerificationStatus::Pending);
    }
    if text.contains("already verified") {
        return Ok(VerificationStatus::AlreadyVerified);
    }
    if text.starts_with("pass") {
        return Ok(VerificationStatus::Verified);
    }
    if is_rate_limited(&text) {
        return Err(VerifyError::ServiceUnavailable(response.result));
    }
    if is_missing_code(&text) {
        return Err(VerifyError::AddressMismatch {
            address,
            reason: response.result,
        });
    }
    if is_compiler_mismatch(&text) || text.starts_with("fail") {
        return Err(VerifyError::CompilerMismatch(response.result));
    }
    Err(VerifyError::Rejected(format!(
        "{}: {}",
        response.message, response.result
    )))
}
