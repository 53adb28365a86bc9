//! Parameter grids for optimization.
//!
//! A grid is a set of named axes. Combinations are enumerated in a fixed
//! order (axes by name, last axis varying fastest), so candidate indices are
//! stable across runs and usable as the final tie-break.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use barwalk_core::domain::{ParamSchema, ParamValue, ParameterSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<ParamValue>>,
}

/// A bound, range-checked parameter set with its position in the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: usize,
    pub params: ParameterSet,
}

/// A combination that failed schema binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub index: usize,
    pub overrides: BTreeMap<String, ParamValue>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridExpansion {
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<RejectedCandidate>,
}

impl ParamGrid {
    pub fn new(axes: BTreeMap<String, Vec<ParamValue>>) -> Self {
        Self { axes }
    }

    pub fn axis(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.axes.insert(name.into(), values);
        self
    }

    /// Number of combinations. An empty grid has one: the base parameters.
    pub fn size(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Every combination as a raw override map.
    pub fn combinations(&self) -> Vec<BTreeMap<String, ParamValue>> {
        let axes: Vec<(&String, &Vec<ParamValue>)> = self.axes.iter().collect();
        let total = self.size();
        let mut out = Vec::with_capacity(total);
        let mut digits = vec![0usize; axes.len()];

        for _ in 0..total {
            out.push(
                axes.iter()
                    .zip(&digits)
                    .map(|((name, values), &d)| ((*name).clone(), values[d]))
                    .collect(),
            );
            // Odometer increment, last axis fastest.
            for pos in (0..axes.len()).rev() {
                digits[pos] += 1;
                if digits[pos] < axes[pos].1.len() {
                    break;
                }
                digits[pos] = 0;
            }
        }
        out
    }

    /// Bind every combination on top of `base` against `schema`.
    ///
    /// Out-of-range or unknown values reject that combination only.
    pub fn expand(
        &self,
        schema: &ParamSchema,
        base: &BTreeMap<String, ParamValue>,
    ) -> GridExpansion {
        let mut expansion = GridExpansion::default();
        for (index, combo) in self.combinations().into_iter().enumerate() {
            let mut overrides = base.clone();
            overrides.extend(combo);
            match schema.bind(&overrides) {
                Ok(params) => expansion.candidates.push(Candidate { index, params }),
                Err(e) => {
                    debug!("grid candidate {index} rejected: {e}");
                    expansion.rejected.push(RejectedCandidate {
                        index,
                        overrides,
                        reason: e.to_string(),
                    });
                }
            }
        }
        expansion
    }
}
