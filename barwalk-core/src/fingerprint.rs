//! Run fingerprinting: deterministic identity for ledgers and run configurations.
//!
//! - `LedgerHash`: blake3 over the canonical JSON of a trade list. Two runs
//!   with identical inputs must produce identical hashes.
//! - `RunKey`: strategy id + bound parameters + engine config, hashed the same
//!   way so results can be grouped and deduplicated.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::domain::{ParamValue, ParameterSet, Trade};
use crate::engine::EngineConfig;

/// Hex-encoded blake3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerHash(String);

impl LedgerHash {
    fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Hasher writes are infallible and every hashed type has string keys.
        let _ = serde_json::to_writer(&mut hasher, value);
        let _ = hasher.flush();
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of a trade list, order-sensitive.
pub fn ledger_fingerprint(trades: &[Trade]) -> LedgerHash {
    LedgerHash::of(trades)
}

/// Identity of a single run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunKey {
    pub strategy: String,
    pub params: BTreeMap<String, ParamValue>,
    pub engine: EngineConfig,
}

impl RunKey {
    pub fn new(strategy: impl Into<String>, params: &ParameterSet, engine: &EngineConfig) -> Self {
        Self {
            strategy: strategy.into(),
            params: params.values().clone(),
            engine: *engine,
        }
    }

    pub fn hash(&self) -> LedgerHash {
        LedgerHash::of(self)
    }
}
