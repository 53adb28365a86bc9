//! Strategy registry: identifier → (parameter schema, factory).

use std::collections::BTreeMap;

use super::{donchian_breakout, ema_crossover, trend_pyramid, Strategy};
use super::{DonchianBreakout, EmaCrossover, TrendPyramid};
use crate::domain::{ParamSchema, ParamValue, ParameterSet};
use crate::error::EngineError;

#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub id: &'static str,
    pub schema: fn() -> ParamSchema,
    pub factory: fn() -> Box<dyn Strategy>,
}

#[derive(Clone)]
pub struct StrategyRegistry {
    entries: Vec<RegistryEntry>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry with every strategy shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(RegistryEntry {
            id: ema_crossover::ID,
            schema: ema_crossover::schema,
            factory: || Box::new(EmaCrossover::new()),
        });
        registry.register(RegistryEntry {
            id: trend_pyramid::ID,
            schema: trend_pyramid::schema,
            factory: || Box::new(TrendPyramid::new()),
        });
        registry.register(RegistryEntry {
            id: donchian_breakout::ID,
            schema: donchian_breakout::schema,
            factory: || Box::new(DonchianBreakout::new()),
        });
        registry
    }

    /// Add or replace an entry.
    pub fn register(&mut self, entry: RegistryEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.push(entry);
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    fn entry(&self, id: &str) -> Result<&RegistryEntry, EngineError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| EngineError::UnknownStrategy(id.to_string()))
    }

    pub fn schema(&self, id: &str) -> Result<ParamSchema, EngineError> {
        Ok((self.entry(id)?.schema)())
    }

    /// Bind overrides against the strategy's schema.
    pub fn bind(
        &self,
        id: &str,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<ParameterSet, EngineError> {
        self.schema(id)?.bind(overrides)
    }

    /// Fresh, uninitialized strategy instance.
    pub fn create(&self, id: &str) -> Result<Box<dyn Strategy>, EngineError> {
        Ok((self.entry(id)?.factory)())
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_sorted() {
        assert_eq!(
            StrategyRegistry::builtin().ids(),
            vec!["donchian_breakout", "ema_crossover", "trend_pyramid"]
        );
    }

    #[test]
    fn unknown_strategy_is_typed() {
        let err = StrategyRegistry::builtin().create("martingale").err().unwrap();
        assert_eq!(err, EngineError::UnknownStrategy("martingale".into()));
    }

    #[test]
    fn create_returns_matching_id() {
        let registry = StrategyRegistry::builtin();
        for id in registry.ids() {
            assert_eq!(registry.create(id).unwrap().id(), id);
            assert!(registry.schema(id).unwrap().spec("exit_priority").is_some());
        }
    }
}
