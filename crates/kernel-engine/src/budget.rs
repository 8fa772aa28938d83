// crates/kernel-engine/src/budget.rs
// ============================================================================
// Module: Budget Tracker
// Description: Prices step attempts against a model-tier price table and
//              enforces the run's hard budget cap.
// Purpose: Give the orchestrator a single point of truth for spend so it can
//          abort before a run's cost runs away.
// Dependencies: kernel-core, kernel-config, serde, toml
// ============================================================================

//! ## Overview
//! [`PriceTable`] is loaded once per installation from the path named in
//! [`kernel_config::KernelConfig::price_table_path`] and maps a model tier to
//! its per-million-token input/output rates. [`BudgetTracker`] prices each
//! step attempt against that table, appends the resulting [`StepCost`] to an
//! append-only `cost.jsonl` ledger, and reports [`CapStatus`] against the
//! run's configured hard cap. A fixed fraction of the hard cap is treated as
//! the soft-warning threshold; the price table carries no such field of its
//! own.

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use kernel_core::core::StepCost;
use kernel_core::core::StepId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Fraction of the hard budget cap at which [`BudgetTracker::check_caps`]
/// starts returning [`CapStatus::Warn`] instead of [`CapStatus::Ok`].
pub const SOFT_WARN_RATIO: f64 = 0.8;

/// Per-million-token rates for one model tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TierRate {
    /// USD per million input tokens.
    pub input_per_million: f64,
    /// USD per million output tokens.
    pub output_per_million: f64,
}

/// A model-tier name to rate mapping, loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PriceTable {
    /// Rates keyed by model tier name.
    #[serde(flatten)]
    pub tiers: BTreeMap<String, TierRate>,
}

/// Errors raised while loading or applying a price table.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// The price table file could not be read.
    #[error("price table io error: {0}")]
    Io(String),
    /// The price table could not be parsed as TOML.
    #[error("price table parse error: {0}")]
    Parse(String),
    /// The requested model tier has no entry in the price table.
    #[error("unknown model tier: {0}")]
    UnknownTier(String),
}

impl From<io::Error> for BudgetError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl PriceTable {
    /// Loads a price table from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, BudgetError> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| BudgetError::Parse(err.to_string()))
    }

    /// Prices `input_tokens`/`output_tokens` against `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::UnknownTier`] when `tier` has no entry.
    pub fn price(&self, tier: &str, input_tokens: u64, output_tokens: u64) -> Result<f64, BudgetError> {
        let rate = self.tiers.get(tier).ok_or_else(|| BudgetError::UnknownTier(tier.to_string()))?;
        #[allow(clippy::cast_precision_loss, reason = "token counts are far below f64's exact-integer range")]
        let usd = (input_tokens as f64 / 1_000_000.0) * rate.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * rate.output_per_million;
        Ok(usd)
    }
}

/// Result of checking cumulative spend against a run's caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStatus {
    /// Spend is comfortably within the hard cap.
    Ok,
    /// Spend has crossed [`SOFT_WARN_RATIO`] of the hard cap.
    Warn,
    /// Spend has reached or exceeded the hard cap; the run must abort.
    Abort,
}

/// One line of a run's `cost.jsonl` ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Step this cost was incurred for.
    pub step_id: StepId,
    /// Model tier the step was dispatched to.
    pub model_tier: String,
    /// Cost incurred by this step attempt.
    pub cost: StepCost,
}

/// Tracks cumulative spend for one run against its hard budget cap.
pub struct BudgetTracker {
    ledger_path: PathBuf,
    hard_cap_usd: f64,
    spent: StepCost,
}

impl BudgetTracker {
    /// Opens a tracker for a run whose ledger lives at `ledger_path`,
    /// replaying any entries already written so cumulative spend survives a
    /// process restart.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] when an existing ledger cannot be read.
    pub fn open(ledger_path: PathBuf, hard_cap_usd: f64) -> Result<Self, BudgetError> {
        let mut spent = StepCost::zero();
        if let Ok(raw) = fs::read_to_string(&ledger_path) {
            for line in raw.lines().filter(|line| !line.trim().is_empty()) {
                let entry: CostEntry = serde_json::from_str(line).map_err(|err| BudgetError::Parse(err.to_string()))?;
                spent = spent.add(entry.cost);
            }
        }
        Ok(Self { ledger_path, hard_cap_usd, spent })
    }

    /// Cumulative cost spent so far.
    #[must_use]
    pub const fn spent(&self) -> StepCost {
        self.spent
    }

    /// Prices and records one step attempt against `table`, appending to the
    /// ledger and updating cumulative spend.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] when the tier is unknown or the append fails.
    pub fn record(
        &mut self,
        table: &PriceTable,
        step_id: &StepId,
        model_tier: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<StepCost, BudgetError> {
        let usd = table.price(model_tier, input_tokens, output_tokens)?;
        let cost = StepCost { usd, input_tokens, output_tokens };
        let entry = CostEntry { step_id: step_id.clone(), model_tier: model_tier.to_string(), cost };
        append_json_line(&self.ledger_path, &entry)?;
        self.spent = self.spent.add(cost);
        Ok(cost)
    }

    /// Checks cumulative spend against the run's hard cap.
    #[must_use]
    pub fn check_caps(&self) -> CapStatus {
        if self.spent.usd >= self.hard_cap_usd {
            CapStatus::Abort
        } else if self.spent.usd >= self.hard_cap_usd * SOFT_WARN_RATIO {
            CapStatus::Warn
        } else {
            CapStatus::Ok
        }
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<(), BudgetError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut serialized = serde_json::to_vec(value).map_err(|err| BudgetError::Parse(err.to_string()))?;
    serialized.push(b'\n');
    let mut file = File::options().create(true).append(true).open(path)?;
    file.write_all(&serialized)?;
    file.flush()?;
    Ok(())
}
