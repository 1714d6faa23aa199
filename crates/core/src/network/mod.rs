pub mod provider;
pub mod rpc;

pub use provider::{NetworkProvider, TransactionStatus};
pub use rpc::RpcNetworkProvider;
