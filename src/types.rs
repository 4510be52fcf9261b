use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PlacementError, Result};
use crate::log::LogEntry;
use crate::material::MaterialSpec;

/// Tolerance for coordinate comparisons, in millimetres.
pub const EPS: f64 = 1e-6;

/// Axis-aligned rectangle on a board. `x` runs along the board length,
/// `y` along its width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, length: f64, width: f64) -> Self {
        Self {
            x,
            y,
            length,
            width,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.length
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.width
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.length <= EPS || self.width <= EPS
    }

    /// True when the interiors intersect. Touching edges do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right() - EPS
            && other.x < self.right() - EPS
            && self.y < other.bottom() - EPS
            && other.y < self.bottom() - EPS
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    /// Whether a `length` x `width` piece fits inside.
    pub fn fits(&self, length: f64, width: f64) -> bool {
        length <= self.length + EPS && width <= self.width + EPS
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ ({}, {})",
            self.length, self.width, self.x, self.y
        )
    }
}

pub fn deserialize_u32_from_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value > u32::MAX as f64 || value.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative whole number, got {value}"
        )));
    }
    Ok(value as u32)
}

/// One line of the cutting list as it arrives from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRequest {
    pub id: String,
    pub length_mm: f64,
    pub width_mm: f64,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub quantity: u32,
    #[serde(alias = "material")]
    pub material_string: String,
    #[serde(default)]
    pub grain_sensitive: bool,
}

impl PartRequest {
    pub fn new(id: &str, length_mm: f64, width_mm: f64, quantity: u32, material: &str) -> Self {
        Self {
            id: id.to_string(),
            length_mm,
            width_mm,
            quantity,
            material_string: material.to_string(),
            grain_sensitive: false,
        }
    }

    pub fn grain_sensitive(mut self) -> Self {
        self.grain_sensitive = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if !ok(self.length_mm) || !ok(self.width_mm) {
            return Err(PlacementError::InvalidPart {
                part: self.id.clone(),
                reason: format!(
                    "dimensions must be positive, got {}x{}",
                    self.length_mm, self.width_mm
                ),
            });
        }
        if self.quantity == 0 {
            return Err(PlacementError::InvalidPart {
                part: self.id.clone(),
                reason: "quantity must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Where a part ended up. Replaced as a whole when the part moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub board_id: usize,
    pub material: MaterialSpec,
    pub x: f64,
    pub y: f64,
    pub rotated: bool,
}

/// A single physical piece; quantities are expanded into one unit each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartUnit {
    pub id: String,
    pub request_id: String,
    pub length: f64,
    pub width: f64,
    pub grain_sensitive: bool,
    pub material: MaterialSpec,
    pub placement: Option<Placement>,
}

impl PartUnit {
    pub fn new(id: &str, length: f64, width: f64, material: MaterialSpec) -> Self {
        Self {
            id: id.to_string(),
            request_id: id.to_string(),
            length,
            width,
            grain_sensitive: false,
            material,
            placement: None,
        }
    }

    /// Expand a request into `quantity` units named `<id>#<n>`.
    /// A single-quantity request keeps its id.
    pub fn expand(request: &PartRequest, material: &MaterialSpec) -> Vec<PartUnit> {
        (1..=request.quantity)
            .map(|n| PartUnit {
                id: if request.quantity == 1 {
                    request.id.clone()
                } else {
                    format!("{}#{n}", request.id)
                },
                request_id: request.id.clone(),
                length: request.length_mm,
                width: request.width_mm,
                grain_sensitive: request.grain_sensitive,
                material: material.clone(),
                placement: None,
            })
            .collect()
    }

    /// (length, width) in the given orientation.
    pub fn dims(&self, rotated: bool) -> (f64, f64) {
        if rotated {
            (self.width, self.length)
        } else {
            (self.length, self.width)
        }
    }

    /// Orientations worth trying, unrotated first.
    pub fn orientations(&self) -> &'static [bool] {
        if self.grain_sensitive || (self.length - self.width).abs() <= EPS {
            &[false]
        } else {
            &[false, true]
        }
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    pub fn inflated_area(&self, kerf: f64) -> f64 {
        (self.length + kerf) * (self.width + kerf)
    }

    /// Kerf-inflated footprint on its board, if placed.
    pub fn footprint(&self, kerf: f64) -> Option<Rect> {
        self.placement.as_ref().map(|p| {
            let (l, w) = self.dims(p.rotated);
            Rect::new(p.x, p.y, l + kerf, w + kerf)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    /// No candidate material's board can hold the part in any orientation.
    OversizedPart,
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::OversizedPart => write!(f, "part larger than any compatible board"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnplacedPart {
    pub part: PartUnit,
    pub reason: UnplacedReason,
}

/// A request dropped before optimization, e.g. for a malformed material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRequest {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub part_id: String,
    pub from: MaterialSpec,
    pub to: MaterialSpec,
}

/// A board whose parts were rearranged to leave one large reusable offcut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialBoardSaving {
    pub board_id: usize,
    pub material: MaterialSpec,
    pub offcut: Rect,
    /// Fraction of a board credited back.
    pub credit: f64,
    /// Credit in currency, `credit * board_cost`.
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Fast,
    BestFit,
    Skyline,
    Shelf,
    Multi,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Strategy::Fast),
            "best_fit" | "best-fit" => Ok(Strategy::BestFit),
            "skyline" => Ok(Strategy::Skyline),
            "shelf" => Ok(Strategy::Shelf),
            "multi" => Ok(Strategy::Multi),
            _ => Err(format!(
                "invalid strategy '{s}', expected: fast, best_fit, skyline, shelf, or multi"
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Fast => "fast",
            Strategy::BestFit => "best_fit",
            Strategy::Skyline => "skyline",
            Strategy::Shelf => "shelf",
            Strategy::Multi => "multi",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Boards below this utilization (%) are merge sources.
    pub merge_threshold: f64,
    /// Merge targets must be below this utilization (%).
    pub merge_target_ceiling: f64,
    /// Boards below this utilization (%) get off-cut rearrangement.
    pub offcut_threshold: f64,
    /// Minimum offcut area as a fraction of the board.
    pub offcut_target_fraction: f64,
    pub max_passes: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 50.0,
            merge_target_ceiling: 85.0,
            offcut_threshold: 50.0,
            offcut_target_fraction: 0.5,
            max_passes: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub kerf: f64,
    /// Core names in upgrade order. Empty disables upgrades.
    pub upgrade_sequence: Vec<String>,
    pub strategy: Strategy,
    /// Let a part land on any existing board of its material, not just the newest.
    pub global_offcuts: bool,
    /// Leftover strips thinner than this (mm) count as slivers.
    pub min_useful: f64,
    pub consolidation: ConsolidationConfig,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            kerf: 4.4,
            upgrade_sequence: Vec::new(),
            strategy: Strategy::Multi,
            global_offcuts: true,
            min_useful: 100.0,
            consolidation: ConsolidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardReport {
    pub id: usize,
    pub material: MaterialSpec,
    pub length: f64,
    pub width: f64,
    pub utilization: f64,
    pub parts: Vec<PartUnit>,
    pub free_rects: Vec<Rect>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacementResult {
    pub boards: Vec<BoardReport>,
    pub unplaced: Vec<UnplacedPart>,
    pub upgrade_log: Vec<UpgradeRecord>,
    pub partial_savings: Vec<PartialBoardSaving>,
    pub baseline_cost: f64,
    pub final_cost: f64,
    pub log: Vec<LogEntry>,
    pub rejected: Vec<RejectedRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub boards_by_material: BTreeMap<String, usize>,
    pub placed: usize,
    pub unplaced: usize,
    pub utilization: f64,
    pub waste_area: f64,
    pub savings: f64,
}

impl PlacementResult {
    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    pub fn placed_count(&self) -> usize {
        self.boards.iter().map(|b| b.parts.len()).sum()
    }

    fn total_board_area(&self) -> f64 {
        self.boards.iter().map(|b| b.length * b.width).sum()
    }

    /// Area-weighted utilization (%) across all boards.
    pub fn total_utilization(&self) -> f64 {
        let total = self.total_board_area();
        if total <= 0.0 {
            return 0.0;
        }
        let used: f64 = self
            .boards
            .iter()
            .map(|b| b.utilization / 100.0 * b.length * b.width)
            .sum();
        used / total * 100.0
    }

    pub fn waste_area(&self) -> f64 {
        self.boards.iter().map(|b| b.free_rects.iter().map(Rect::area).sum::<f64>()).sum()
    }

    /// Final cost less partial-board credits.
    pub fn net_cost(&self) -> f64 {
        self.final_cost - self.partial_savings.iter().map(|s| s.value).sum::<f64>()
    }

    pub fn summary(&self) -> Summary {
        let mut boards_by_material = BTreeMap::new();
        for b in &self.boards {
            *boards_by_material.entry(b.material.signature()).or_insert(0) += 1;
        }
        Summary {
            boards_by_material,
            placed: self.placed_count(),
            unplaced: self.unplaced.len(),
            utilization: self.total_utilization(),
            waste_area: self.waste_area(),
            savings: self.baseline_cost - self.net_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mr() -> MaterialSpec {
        MaterialSpec::parse("SF_18MR_SF").unwrap()
    }

    #[test]
    fn test_rect_overlap_ignores_touching_edges() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(100.0, 0.0, 50.0, 100.0);
        let c = Rect::new(99.0, 50.0, 10.0, 10.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(a.contains(&Rect::new(10.0, 10.0, 90.0, 90.0)));
        assert!(!a.contains(&c));
    }

    #[test]
    fn test_expand_quantities() {
        let req = PartRequest::new("P1", 600.0, 400.0, 3, "SF_18MR_SF").grain_sensitive();
        let units = PartUnit::expand(&req, &mr());
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].id, "P1#1");
        assert_eq!(units[2].id, "P1#3");
        assert!(units.iter().all(|u| u.grain_sensitive && u.request_id == "P1"));

        let single = PartUnit::expand(&PartRequest::new("P2", 1.0, 1.0, 1, "x"), &mr());
        assert_eq!(single[0].id, "P2");
    }

    #[test]
    fn test_orientations() {
        let mut p = PartUnit::new("a", 600.0, 400.0, mr());
        assert_eq!(p.orientations(), &[false, true]);
        p.grain_sensitive = true;
        assert_eq!(p.orientations(), &[false]);
        let square = PartUnit::new("b", 500.0, 500.0, mr());
        assert_eq!(square.orientations(), &[false]);
    }

    #[test]
    fn test_footprint_is_kerf_inflated() {
        let mut p = PartUnit::new("a", 600.0, 400.0, mr());
        assert!(p.footprint(4.4).is_none());
        p.placement = Some(Placement {
            board_id: 1,
            material: mr(),
            x: 10.0,
            y: 20.0,
            rotated: true,
        });
        let f = p.footprint(4.4).unwrap();
        assert_relative_eq!(f.length, 404.4);
        assert_relative_eq!(f.width, 604.4);
        assert_relative_eq!(p.inflated_area(4.4), 604.4 * 404.4);
    }

    #[test]
    fn test_request_validation() {
        assert!(PartRequest::new("ok", 10.0, 10.0, 1, "m").validate().is_ok());
        assert!(PartRequest::new("z", 0.0, 10.0, 1, "m").validate().is_err());
        assert!(PartRequest::new("q", 10.0, 10.0, 0, "m").validate().is_err());
        assert!(PartRequest::new("n", f64::NAN, 10.0, 1, "m").validate().is_err());
    }

    #[test]
    fn test_request_json_accepts_float_quantity() {
        let json = r#"{"id":"P1","length_mm":600,"width_mm":400,"quantity":2.0,"material":"SF_18MR_SF"}"#;
        let req: PartRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.quantity, 2);
        assert!(!req.grain_sensitive);

        let bad = r#"{"id":"P1","length_mm":600,"width_mm":400,"quantity":2.5,"material":"m"}"#;
        assert!(serde_json::from_str::<PartRequest>(bad).is_err());
    }

    #[test]
    fn test_strategy_parse_and_serde() {
        assert_eq!("best_fit".parse::<Strategy>(), Ok(Strategy::BestFit));
        assert!("greedy".parse::<Strategy>().is_err());
        assert_eq!(serde_json::to_string(&Strategy::BestFit).unwrap(), "\"best_fit\"");
        let cfg: OptimizeConfig = serde_json::from_str(r#"{"strategy":"shelf"}"#).unwrap();
        assert_eq!(cfg.strategy, Strategy::Shelf);
        assert_relative_eq!(cfg.kerf, 4.4);
        assert!(cfg.global_offcuts);
    }

    #[test]
    fn test_result_summary() {
        let board = BoardReport {
            id: 1,
            material: mr(),
            length: 1000.0,
            width: 1000.0,
            utilization: 25.0,
            parts: vec![PartUnit::new("a", 500.0, 500.0, mr())],
            free_rects: vec![Rect::new(500.0, 0.0, 500.0, 1000.0), Rect::new(0.0, 500.0, 500.0, 500.0)],
        };
        let result = PlacementResult {
            boards: vec![board],
            baseline_cost: 300.0,
            final_cost: 100.0,
            partial_savings: vec![PartialBoardSaving {
                board_id: 1,
                material: mr(),
                offcut: Rect::new(500.0, 0.0, 500.0, 1000.0),
                credit: 0.5,
                value: 50.0,
            }],
            ..Default::default()
        };
        assert_relative_eq!(result.net_cost(), 50.0);
        let s = result.summary();
        assert_eq!(s.boards_by_material["SF_18MR_SF"], 1);
        assert_eq!(s.placed, 1);
        assert_relative_eq!(s.utilization, 25.0);
        assert_relative_eq!(s.waste_area, 750_000.0);
        assert_relative_eq!(s.savings, 250.0);
    }
}
