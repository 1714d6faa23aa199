pub mod etherscan;
pub mod service;

pub use etherscan::EtherscanClient;
pub use service::VerificationService;
