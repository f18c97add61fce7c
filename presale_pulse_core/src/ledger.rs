// Durable ledger: the single owner of the watcher's persisted state.

use crate::error::CoreError;
use crate::settings::Settings;
use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Aggregate sale state: running totals plus the set of buyer addresses
/// already counted toward the holder figure. Serialized field names match
/// the ledger files written by earlier deployments of this watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    pub total_holders: u64,
    pub total_raised: Decimal,
    #[serde(default)]
    pub previous_buyers: HashSet<String>,
}

impl LedgerState {
    /// Fresh state seeded from the configured baselines.
    pub fn seeded(settings: &Settings) -> Self {
        let total_raised = Decimal::from_f64_retain(settings.baseline_raised_usd)
            .unwrap_or_default()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            total_holders: settings.baseline_holders,
            total_raised,
            previous_buyers: HashSet::new(),
        }
    }
}

/// Abstract ledger storage. The file-backed implementation is the normal
/// one; tests substitute in-memory fakes.
#[async_trait(?Send)]
pub trait LedgerStore {
    /// Read the persisted state. Missing or unreadable storage yields the
    /// seeded default with a warning; it never fails fatally.
    async fn load(&self) -> LedgerState;

    /// Atomically overwrite storage with the full current state.
    async fn save(&self, state: &LedgerState) -> Result<(), CoreError>;
}

/// JSON-file ledger store. Saves go through a temp file and a rename so an
/// interrupted write can never leave a half-written ledger behind.
pub struct FileLedgerStore {
    path: PathBuf,
    seed: LedgerState,
}

impl FileLedgerStore {
    pub fn new(path: &str, seed: LedgerState) -> Self {
        Self {
            path: PathBuf::from(path),
            seed,
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

#[async_trait(?Send)]
impl LedgerStore for FileLedgerStore {
    async fn load(&self) -> LedgerState {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "no ledger at {}, starting from seeded baselines",
                    self.path.display()
                );
                return self.seed.clone();
            }
            Err(e) => {
                warn!(
                    "ledger at {} unreadable ({}), starting from seeded baselines",
                    self.path.display(),
                    e
                );
                return self.seed.clone();
            }
        };
        match serde_json::from_str(&json) {
            Ok(state) => {
                debug!("ledger loaded from {}", self.path.display());
                state
            }
            Err(e) => {
                warn!(
                    "ledger at {} is malformed ({}), starting from seeded baselines",
                    self.path.display(),
                    e
                );
                self.seed.clone()
            }
        }
    }

    async fn save(&self, state: &LedgerState) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CoreError::Storage(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CoreError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CoreError::Storage(format!("rename to {}: {}", self.path.display(), e)))?;
        debug!("ledger saved to {}", self.path.display());
        Ok(())
    }
}
