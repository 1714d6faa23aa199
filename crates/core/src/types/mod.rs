pub mod config_wrapper;
pub mod constructor_args;
pub mod deployment;
pub mod network_config;
pub mod secret;
pub mod verification;
pub mod workflow_state;
