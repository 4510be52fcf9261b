//! Guillotine panel-cutting optimizer for beam saws.
//!
//! Parts are grouped by material, packed onto standard boards with
//! kerf-aware guillotine splits, upgraded to better cores only when a
//! configured sequence allows it, and finally consolidated so that sparse
//! boards are merged or left with one large reusable offcut.

pub mod board;
pub mod consolidate;
pub mod cost;
pub mod error;
pub mod guillotine;
pub mod log;
pub mod material;
pub mod placement;
pub mod render;
pub mod shelf;
pub mod skyline;
pub mod solver;
pub mod types;
pub mod upgrade;

pub use error::{ParseError, PlacementError};
pub use material::{CoreSpec, MaterialCatalog, MaterialSpec};
pub use solver::Optimizer;
pub use types::{OptimizeConfig, PartRequest, PlacementResult, Strategy};
