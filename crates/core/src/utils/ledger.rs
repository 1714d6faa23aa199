use alloy::primitives::{Address, Bytes, TxHash};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub factory: String,
    pub network: String,
    pub chain_id: u64,
    pub tx_hash: TxHash,
    pub address: Option<Address>,
    pub block_number: Option<u64>,
    pub constructor_args: Bytes,
    pub status: RecordStatus,
    pub submitted_at: u64,
    pub confirmed_at: Option<u64>,
    pub failure: Option<String>,
}

impl DeploymentRecord {
    pub fn pending(
        factory: &str,
        network: &str,
        chain_id: u64,
        tx_hash: TxHash,
        constructor_args: Bytes,
    ) -> Self {
        Self {
            factory: factory.to_string(),
            network: network.to_string(),
            chain_id,
            tx_hash,
            address: None,
            block_number: None,
            constructor_args,
            status: RecordStatus::Pending,
            submitted_at: unix_now(),
            confirmed_at: None,
            failure: None,
        }
    }
}

/// Operator-inspectable record of every deployment submitted through this
/// tool, one pretty-printed JSON array per network.
#[derive(Debug, Clone)]
pub struct DeploymentLedger {
    dir: PathBuf,
}

impl DeploymentLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, network: &str) -> PathBuf {
        self.dir.join(format!("{}.json", network))
    }

    pub fn load(&self, network: &str) -> Result<Vec<DeploymentRecord>> {
        let path = self.path_for(network);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| eyre!("Ledger {} is corrupted: {}", path.display(), e))
    }

    fn store(&self, network: &str, records: &[DeploymentRecord]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(network);
        // Write-then-rename so an interrupted run never truncates the ledger.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(records)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn update<F>(&self, network: &str, tx_hash: TxHash, apply: F) -> Result<DeploymentRecord>
    where
        F: FnOnce(&mut DeploymentRecord),
    {
        let mut records = self.load(network)?;
        let record = records
            .iter_mut()
            .find(|r| r.tx_hash == tx_hash)
            .ok_or_else(|| eyre!("Transaction {} not found in ledger", tx_hash))?;
        apply(record);
        let updated = record.clone();
        self.store(network, &records)?;
        Ok(updated)
    }

    pub fn record_pending(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load(&record.network)?;
        if records.iter().any(|r| r.tx_hash == record.tx_hash) {
            return Err(eyre!("Transaction {} already recorded", record.tx_hash));
        }
        let network = record.network.clone();
        records.push(record);
        self.store(&network, &records)
    }

    pub fn mark_confirmed(
        &self,
        network: &str,
        tx_hash: TxHash,
        address: Address,
        block_number: u64,
    ) -> Result<DeploymentRecord> {
        self.update(network, tx_hash, |record| {
            record.status = RecordStatus::Confirmed;
            record.address = Some(address);
            record.block_number = Some(block_number);
            record.confirmed_at = Some(unix_now());
            record.failure = None;
        })
    }

    pub fn mark_failed(&self, network: &str, tx_hash: TxHash, reason: &str) -> Result<DeploymentRecord> {
        self.update(network, tx_hash, |record| {
            record.status = RecordStatus::Failed;
            record.failure = Some(reason.to_string());
        })
    }

    pub fn find_by_tx(&self, network: &str, tx_hash: TxHash) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .load(network)?
            .into_iter()
            .find(|r| r.tx_hash == tx_hash))
    }

    pub fn pending_for(&self, network: &str, factory: &str) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .load(network)?
            .into_iter()
            .rev()
            .find(|r| r.factory == factory && r.status == RecordStatus::Pending))
    }

    pub fn latest_confirmed(&self, network: &str, factory: &str) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .load(network)?
            .into_iter()
            .filter(|r| r.factory == factory && r.status == RecordStatus::Confirmed)
            .max_by_key(|r| (r.block_number, r.confirmed_at)))
    }

    pub fn find_by_address(&self, network: &str, address: Address) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .load(network)?
            .into_iter()
            .find(|r| r.address == Some(address)))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
