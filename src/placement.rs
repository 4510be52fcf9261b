use std::cmp::Ordering;

use crate::board::{Board, SplitRule};
use crate::skyline::Skyline;
use crate::types::{EPS, PartUnit, Rect, Strategy};

/// Weight of the board-fill term in the best-fit score.
const UTILIZATION_WEIGHT: f64 = 500.0;
/// Added to the best-fit score when a placement leaves a sliver.
const SLIVER_PENALTY: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Heuristic {
    BestFit,
    Skyline,
    Shelf,
}

impl Heuristic {
    pub const ALL: [Heuristic; 3] = [Heuristic::BestFit, Heuristic::Skyline, Heuristic::Shelf];

    pub fn for_strategy(strategy: Strategy) -> Option<Self> {
        match strategy {
            Strategy::Fast | Strategy::BestFit => Some(Heuristic::BestFit),
            Strategy::Skyline => Some(Heuristic::Skyline),
            Strategy::Shelf => Some(Heuristic::Shelf),
            Strategy::Multi => None,
        }
    }
}

/// A chosen spot: board `slot` of the candidate list, its free rectangle
/// `rect`, and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub slot: usize,
    pub rect: usize,
    pub rotated: bool,
}

type Score = [f64; 3];

fn cmp_scores(a: &Score, b: &Score) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, Copy)]
pub struct PlacementEngine {
    pub heuristic: Heuristic,
    pub min_useful: f64,
}

impl PlacementEngine {
    pub fn new(heuristic: Heuristic, min_useful: f64) -> Self {
        Self {
            heuristic,
            min_useful,
        }
    }

    pub fn split_rule(&self) -> SplitRule {
        match self.heuristic {
            Heuristic::Shelf => SplitRule::HorizontalFirst,
            Heuristic::BestFit | Heuristic::Skyline => SplitRule::VerticalFirst,
        }
    }

    /// Best spot for `part` over the free rectangles of `candidates`.
    ///
    /// Options are ranked by the heuristic's score, earlier boards and the
    /// unrotated orientation winning ties, and the first one that keeps its
    /// board guillotine-cuttable is returned.
    pub fn place(&self, part: &PartUnit, candidates: &[&Board]) -> Option<Choice> {
        let mut options: Vec<(Score, Choice)> = Vec::new();
        for (slot, board) in candidates.iter().enumerate() {
            let skyline = (self.heuristic == Heuristic::Skyline)
                .then(|| Skyline::from_footprints(board.length, &board.footprints()));
            for (rect, free) in board.free_rects().iter().enumerate() {
                for &rotated in part.orientations() {
                    if !board.can_fit(part, rect, rotated) {
                        continue;
                    }
                    let (pl, pw) = board.inflated_dims(part, rotated);
                    let score = self.score(board, free.rect, pl, pw, skyline.as_ref());
                    options.push((score, Choice { slot, rect, rotated }));
                }
            }
        }
        options.sort_by(|a, b| cmp_scores(&a.0, &b.0));

        options
            .into_iter()
            .map(|(_, choice)| choice)
            .find(|c| {
                let board = candidates[c.slot];
                let at = board.free_rects()[c.rect].rect;
                board.admits(part, at.x, at.y, c.rotated)
            })
    }

    fn score(&self, board: &Board, free: Rect, pl: f64, pw: f64, skyline: Option<&Skyline>) -> Score {
        match self.heuristic {
            Heuristic::BestFit => {
                let waste = free.area() - pl * pw;
                let sliver = |rem: f64| rem > EPS && rem < self.min_useful;
                let penalty = if sliver(free.length - pl) || sliver(free.width - pw) {
                    SLIVER_PENALTY
                } else {
                    0.0
                };
                let fill = (board.used_area() + pl * pw) / board.area();
                [waste + penalty + (1.0 - fill) * UTILIZATION_WEIGHT, waste, 0.0]
            }
            Heuristic::Skyline => {
                let base = skyline.map_or(0.0, |s| s.height_over(free.x, pl));
                let top = base.max(free.y) + pw;
                [top, free.x, free.area() - pl * pw]
            }
            Heuristic::Shelf => [free.y, pw, free.x],
        }
    }
}
