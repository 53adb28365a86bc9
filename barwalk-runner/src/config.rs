//! TOML run settings.
//!
//! One file describes everything needed to reproduce a run: engine costs and
//! capital, sizing, the strategy and its overrides, an optional parameter
//! grid, an optional walk-forward split and an optional basket.
//!
//! ```toml
//! [engine]
//! initial_capital = 50000.0
//! costs = { slippage_per_unit = 0.01, commission_rate = 0.0005 }
//!
//! [sizing]
//! kind = "percent_of_equity"
//! percent = 50.0
//!
//! [strategy]
//! id = "ema_crossover"
//! params = { fast_period = 12, slow_period = 26 }
//!
//! [grid]
//! fast_period = [8, 12]
//! slow_period = [26, 40]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwalk_core::engine::{EngineConfig, SizingConfig};
use barwalk_core::ParamValue;

use crate::grid::ParamGrid;
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySettings {
    pub id: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasketSettings {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
    /// Per-symbol wall-clock budget.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Directory holding `<SYMBOL>.csv` files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    pub strategy: StrategySettings,
    #[serde(default)]
    pub grid: BTreeMap<String, Vec<ParamValue>>,
    #[serde(default)]
    pub walk_forward: Option<WalkForwardConfig>,
    #[serde(default)]
    pub basket: Option<BasketSettings>,
}

impl RunSettings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn param_grid(&self) -> ParamGrid {
        ParamGrid::new(self.grid.clone())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let capital = self.engine.initial_capital;
        if !capital.is_finite() || capital <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "initial_capital must be positive, got {capital}"
            )));
        }
        let costs = self.engine.costs;
        if costs.slippage_per_unit < 0.0 || costs.commission_rate < 0.0 {
            return Err(ConfigError::Invalid("costs must be non-negative".into()));
        }
        match self.sizing {
            SizingConfig::PercentOfEquity { percent } if !(percent > 0.0 && percent <= 100.0) => {
                return Err(ConfigError::Invalid(format!(
                    "percent_of_equity must be in (0, 100], got {percent}"
                )));
            }
            _ => {}
        }
        if let Some((name, _)) = self.grid.iter().find(|(_, values)| values.is_empty()) {
            return Err(ConfigError::Invalid(format!("grid axis '{name}' has no values")));
        }
        if let Some(wf) = &self.walk_forward {
            wf.validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if let Some(basket) = &self.basket {
            if basket.symbols.is_empty() {
                return Err(ConfigError::Invalid("basket has no symbols".into()));
            }
            if basket.end < basket.start {
                return Err(ConfigError::Invalid(format!(
                    "basket end {} is before start {}",
                    basket.end, basket.start
                )));
            }
        }
        Ok(())
    }
}
