//! Board materials: laminate/core specs and the price and grade catalog.
//!
//! A material string names the top laminate, the core and the bottom
//! laminate, e.g. `2614 SF_18MR_2614 SF` or `362 SUD-18HDHMR-362 SUD`.
//! A bare core such as `17WPC` has no laminates (`NONE` on both faces).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, PlacementError, Result};
use crate::log::RunLog;

/// Laminate name used for faces of a bare core.
pub const NO_LAMINATE: &str = "NONE";

/// Board size used when a core has no catalog entry.
pub const DEFAULT_BOARD_LENGTH: f64 = 2440.0;
pub const DEFAULT_BOARD_WIDTH: f64 = 1220.0;

const DEFAULT_THICKNESS: u32 = 18;

// Checked in order; first case-insensitive substring match wins.
const THICKNESS_BY_FAMILY: [(&str, u32); 6] = [
    ("MR MDF", 18),
    ("PARTICLE BOARD", 18),
    ("PLYWOOD", 18),
    ("HDHMR", 18),
    ("BWR", 18),
    ("WPC", 17),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialSpec {
    pub top_laminate: String,
    pub core_name: String,
    pub thickness: u32,
    pub bottom_laminate: String,
}

impl MaterialSpec {
    pub fn parse(input: &str) -> std::result::Result<Self, ParseError> {
        let clean = input.trim();
        if clean.is_empty() {
            return Err(ParseError::Empty);
        }

        let parts: Vec<&str> = if clean.contains('-') {
            clean.split('-').collect()
        } else {
            clean.split('_').collect()
        };

        let (top, core, bottom) = match parts.as_slice() {
            [top, core, bottom] => (top.trim(), core.trim(), bottom.trim()),
            [core] => (NO_LAMINATE, core.trim(), NO_LAMINATE),
            _ => {
                return Err(ParseError::Format {
                    input: input.to_string(),
                });
            }
        };

        if core.is_empty() {
            return Err(ParseError::MissingCore {
                input: input.to_string(),
            });
        }
        if top.is_empty() || bottom.is_empty() {
            return Err(ParseError::Format {
                input: input.to_string(),
            });
        }

        Ok(Self {
            top_laminate: top.to_string(),
            core_name: core.to_string(),
            thickness: thickness_of(core),
            bottom_laminate: bottom.to_string(),
        })
    }

    /// Same faces and thickness with a different core.
    pub fn with_core(&self, core_name: &str, thickness: u32) -> Self {
        Self {
            top_laminate: self.top_laminate.clone(),
            core_name: core_name.to_string(),
            thickness,
            bottom_laminate: self.bottom_laminate.clone(),
        }
    }

    pub fn same_laminates(&self, other: &MaterialSpec) -> bool {
        self.top_laminate == other.top_laminate && self.bottom_laminate == other.bottom_laminate
    }

    /// Grouping key: `top_core_bottom`.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MaterialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.top_laminate, self.core_name, self.bottom_laminate
        )
    }
}

impl std::str::FromStr for MaterialSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn thickness_of(core: &str) -> u32 {
    let digits: String = core.chars().take_while(|c| c.is_ascii_digit()).collect();
    if let Ok(t) = digits.parse::<u32>() {
        return t;
    }
    let upper = core.to_uppercase();
    THICKNESS_BY_FAMILY
        .iter()
        .find(|(family, _)| upper.contains(family))
        .map(|&(_, t)| t)
        .unwrap_or(DEFAULT_THICKNESS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSpec {
    pub thickness: u32,
    pub price_per_sqm: f64,
    pub standard_length: f64,
    pub standard_width: f64,
    pub grade_level: u32,
}

/// Core and laminate tables. Read-only once a run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialCatalog {
    pub cores: BTreeMap<String, CoreSpec>,
    #[serde(default)]
    pub laminates: BTreeMap<String, f64>,
}

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core(mut self, name: &str, core: CoreSpec) -> Self {
        self.cores.insert(name.to_string(), core);
        self
    }

    pub fn with_laminate(mut self, name: &str, price_per_sqm: f64) -> Self {
        self.laminates.insert(name.to_string(), price_per_sqm);
        self
    }

    /// Structural check run before any optimization.
    pub fn validate(&self) -> Result<()> {
        if self.cores.is_empty() {
            return Err(PlacementError::EmptyCatalog);
        }
        for (name, core) in &self.cores {
            let reason = if core.thickness == 0 {
                Some("thickness must be positive".to_string())
            } else if !core.price_per_sqm.is_finite() || core.price_per_sqm < 0.0 {
                Some(format!("invalid price {}", core.price_per_sqm))
            } else if !(core.standard_length > 0.0 && core.standard_width > 0.0) {
                Some(format!(
                    "invalid board size {}x{}",
                    core.standard_length, core.standard_width
                ))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(PlacementError::InvalidCatalogEntry {
                    name: name.clone(),
                    reason,
                });
            }
        }
        for (name, price) in &self.laminates {
            if !price.is_finite() || *price < 0.0 {
                return Err(PlacementError::InvalidCatalogEntry {
                    name: name.clone(),
                    reason: format!("invalid laminate price {price}"),
                });
            }
        }
        Ok(())
    }

    pub fn resolve(&self, material: &str) -> std::result::Result<MaterialSpec, ParseError> {
        MaterialSpec::parse(material)
    }

    pub fn core(&self, name: &str) -> Option<&CoreSpec> {
        self.cores.get(name)
    }

    /// Grade of a core; unknown cores rank lowest.
    pub fn grade_of(&self, core_name: &str) -> u32 {
        match self.cores.get(core_name) {
            Some(core) => core.grade_level,
            None => {
                tracing::debug!(core = core_name, "core not in catalog, grade 0");
                0
            }
        }
    }

    fn laminate_price(&self, name: &str) -> f64 {
        if name == NO_LAMINATE {
            return 0.0;
        }
        self.laminates.get(name).copied().unwrap_or(0.0)
    }

    /// Top laminate + bottom laminate + core, per square metre.
    pub fn cost_per_sqm(&self, spec: &MaterialSpec) -> f64 {
        let core = self
            .cores
            .get(&spec.core_name)
            .map(|c| c.price_per_sqm)
            .unwrap_or(0.0);
        self.laminate_price(&spec.top_laminate) + self.laminate_price(&spec.bottom_laminate) + core
    }

    /// Standard (length, width) of a board of this material.
    pub fn board_dims(&self, spec: &MaterialSpec) -> (f64, f64) {
        self.cores
            .get(&spec.core_name)
            .map(|c| (c.standard_length, c.standard_width))
            .unwrap_or((DEFAULT_BOARD_LENGTH, DEFAULT_BOARD_WIDTH))
    }

    /// Price of one full standard board.
    pub fn board_cost(&self, spec: &MaterialSpec) -> f64 {
        let (length, width) = self.board_dims(spec);
        length * width / 1_000_000.0 * self.cost_per_sqm(spec)
    }

    /// Whether a part requesting `requested` may be cut from `candidate`.
    pub fn can_substitute(&self, requested: &MaterialSpec, candidate: &MaterialSpec) -> bool {
        requested.same_laminates(candidate)
            && requested.thickness == candidate.thickness
            && self.grade_of(&candidate.core_name) >= self.grade_of(&requested.core_name)
    }

    /// Core names, lowest grade first.
    pub fn cores_by_grade(&self) -> Vec<&str> {
        let mut cores: Vec<(&str, u32)> = self
            .cores
            .iter()
            .map(|(name, c)| (name.as_str(), c.grade_level))
            .collect();
        cores.sort_by_key(|&(_, grade)| grade);
        cores.into_iter().map(|(name, _)| name).collect()
    }

    /// Warn once per core or laminate that parts reference but the catalog lacks.
    pub fn report_missing<'a>(
        &self,
        materials: impl IntoIterator<Item = &'a MaterialSpec>,
        log: &mut RunLog,
    ) {
        let mut missing_cores = BTreeSet::new();
        let mut missing_laminates = BTreeSet::new();
        for spec in materials {
            if !self.cores.contains_key(&spec.core_name) {
                missing_cores.insert(spec.core_name.clone());
            }
            for lam in [&spec.top_laminate, &spec.bottom_laminate] {
                if lam != NO_LAMINATE && !self.laminates.contains_key(lam) {
                    missing_laminates.insert(lam.clone());
                }
            }
        }
        for core in missing_cores {
            log.warn(format!(
                "core '{core}' not found in catalog: grade 0, default board {DEFAULT_BOARD_LENGTH}x{DEFAULT_BOARD_WIDTH}, no core cost"
            ));
        }
        for lam in missing_laminates {
            log.warn(format!("laminate '{lam}' not found in catalog: priced at 0"));
        }
    }
}
