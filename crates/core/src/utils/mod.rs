pub mod address_or_contract_name;
pub mod artifact_registry;
pub mod backoff;
pub mod ledger;
