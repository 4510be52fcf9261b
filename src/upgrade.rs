//! Grade-monotone material substitution.
//!
//! A part may move to a better core of the same thickness with the same
//! faces, but only to cores named in the upgrade sequence, and never down.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, Result};
use crate::material::{MaterialCatalog, MaterialSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSequence(pub Vec<String>);

impl UpgradeSequence {
    /// Parse `"18MR, 18BWR, 18HDHMR"`.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cores(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn validate(&self, catalog: &MaterialCatalog) -> Result<()> {
        let mut seen = BTreeSet::new();
        for core in self.cores() {
            if !seen.insert(core) {
                return Err(PlacementError::InvalidUpgradeSequence(format!(
                    "core '{core}' listed twice"
                )));
            }
            if catalog.core(core).is_none() {
                return Err(PlacementError::InvalidUpgradeSequence(format!(
                    "core '{core}' not in catalog"
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<String>> for UpgradeSequence {
    fn from(cores: Vec<String>) -> Self {
        Self(cores)
    }
}

pub struct UpgradeResolver<'a> {
    catalog: &'a MaterialCatalog,
    sequence: &'a UpgradeSequence,
}

impl<'a> UpgradeResolver<'a> {
    pub fn new(catalog: &'a MaterialCatalog, sequence: &'a UpgradeSequence) -> Self {
        Self { catalog, sequence }
    }

    /// The requested material followed by its legal upgrades, cheapest
    /// grade first. Equal grades keep sequence order.
    pub fn candidates(&self, requested: &MaterialSpec) -> Vec<MaterialSpec> {
        let base_grade = self.catalog.grade_of(&requested.core_name);
        let mut upgrades: Vec<(u32, MaterialSpec)> = self
            .sequence
            .cores()
            .filter(|&core| core != requested.core_name)
            .filter_map(|core| {
                let spec = self.catalog.core(core)?;
                (spec.thickness == requested.thickness && spec.grade_level > base_grade)
                    .then(|| (spec.grade_level, requested.with_core(core, spec.thickness)))
            })
            .collect();
        upgrades.sort_by_key(|(grade, _)| *grade);

        let mut candidates = Vec::with_capacity(upgrades.len() + 1);
        candidates.push(requested.clone());
        candidates.extend(upgrades.into_iter().map(|(_, spec)| spec));
        candidates
    }
}
