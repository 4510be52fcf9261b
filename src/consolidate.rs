//! Post-placement passes over a finished set of boards.
//!
//! Merging and off-cut maximization only combine or rearrange boards of one
//! material and size. Relocation moves parts onto spare room of boards of
//! any material the upgrade sequence allows. Every pass works on copies: a
//! trial that does not place every part, or that is not guillotine-cuttable,
//! is dropped without touching the input.

use rayon::prelude::*;

use crate::board::{Board, SplitRule};
use crate::log::RunLog;
use crate::material::MaterialSpec;
use crate::placement::{Choice, Heuristic, PlacementEngine};
use crate::types::{ConsolidationConfig, EPS, PartUnit, PartialBoardSaving, Rect};
use crate::upgrade::UpgradeResolver;

/// Re-place `parts` one by one on `board`, using `pick` to choose each spot.
fn repack<F>(mut board: Board, mut parts: Vec<PartUnit>, split: SplitRule, pick: F) -> Option<Board>
where
    F: Fn(&Board, &PartUnit) -> Option<Choice>,
{
    for mut p in parts.drain(..) {
        p.placement = None;
        let choice = pick(&board, &p)?;
        board.try_place(p, choice.rect, choice.rotated, split).ok()?;
    }
    board.is_guillotine().then_some(board)
}

fn same_stock(a: &Board, b: &Board) -> bool {
    a.material == b.material && (a.length - b.length).abs() <= EPS && (a.width - b.width).abs() <= EPS
}

fn by_area_desc(parts: &mut [PartUnit], kerf: f64) {
    parts.sort_by(|a, b| {
        b.inflated_area(kerf)
            .total_cmp(&a.inflated_area(kerf))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Try to empty one low-utilization board into another of the same stock.
fn merge_once(boards: &mut Vec<Board>, config: &ConsolidationConfig, engine: &PlacementEngine) -> bool {
    let mut order: Vec<usize> = (0..boards.len()).collect();
    order.sort_by(|&a, &b| boards[a].utilization().total_cmp(&boards[b].utilization()));

    for &src in &order {
        if boards[src].utilization() >= config.merge_threshold {
            break;
        }
        // fullest eligible target first
        for &dst in order.iter().rev() {
            if dst == src || !same_stock(&boards[src], &boards[dst]) {
                continue;
            }
            if boards[dst].utilization() >= config.merge_target_ceiling {
                continue;
            }
            let combined = boards[src].used_area() + boards[dst].used_area();
            if combined > boards[dst].area() + EPS {
                continue;
            }

            let mut parts: Vec<PartUnit> = boards[dst].parts().to_vec();
            parts.extend_from_slice(boards[src].parts());
            by_area_desc(&mut parts, boards[dst].kerf);

            let trial = repack(boards[dst].blank(), parts, engine.split_rule(), |b, p| {
                engine.place(p, &[b])
            });
            if let Some(trial) = trial {
                tracing::debug!(from = boards[src].id, into = boards[dst].id, "merged boards");
                boards[dst] = trial;
                boards.remove(src);
                return true;
            }
        }
    }
    false
}

/// Merge low-utilization boards into others of the same stock until no
/// merge succeeds. Returns the number of boards removed.
pub fn merge_boards(boards: &mut Vec<Board>, config: &ConsolidationConfig, min_useful: f64, log: &mut RunLog) -> usize {
    let engine = PlacementEngine::new(Heuristic::BestFit, min_useful);
    let mut merges = 0;
    while merges < config.max_passes && merge_once(boards, config, &engine) {
        merges += 1;
    }
    if merges > 0 {
        log.info(format!("consolidation merged away {merges} board(s)"));
    }
    merges
}

/// Try to move every part of one sparse board onto the free space of the
/// others, each part going to its own material or a legal upgrade of it.
fn relocate_once(
    boards: &mut Vec<Board>,
    resolver: &UpgradeResolver<'_>,
    config: &ConsolidationConfig,
    engine: &PlacementEngine,
) -> Option<MaterialSpec> {
    let mut order: Vec<usize> = (0..boards.len()).collect();
    order.sort_by(|&a, &b| boards[a].utilization().total_cmp(&boards[b].utilization()));

    'source: for &src in &order {
        if boards[src].utilization() >= config.merge_threshold {
            break;
        }
        let mut parts = boards[src].parts().to_vec();
        by_area_desc(&mut parts, boards[src].kerf);
        let candidates: Vec<Vec<MaterialSpec>> =
            parts.iter().map(|p| resolver.candidates(&p.material)).collect();

        // private copies of every board some part may land on
        let mut hosts: Vec<(usize, Board)> = boards
            .iter()
            .enumerate()
            .filter(|&(i, b)| i != src && candidates.iter().any(|c| c.contains(&b.material)))
            .map(|(i, b)| (i, b.clone()))
            .collect();
        if hosts.is_empty() {
            continue;
        }

        for (mut part, materials) in parts.into_iter().zip(&candidates) {
            part.placement = None;
            let mut placed = false;
            for material in materials {
                let pool: Vec<usize> = (0..hosts.len())
                    .filter(|&h| &hosts[h].1.material == material)
                    .collect();
                let choice = {
                    let refs: Vec<&Board> = pool.iter().map(|&h| &hosts[h].1).collect();
                    engine.place(&part, &refs)
                };
                let Some(c) = choice else {
                    continue;
                };
                match hosts[pool[c.slot]].1.try_place(part, c.rect, c.rotated, engine.split_rule()) {
                    Ok(()) => {
                        placed = true;
                        break;
                    }
                    Err(p) => part = p,
                }
            }
            if !placed {
                continue 'source;
            }
        }

        tracing::debug!(from = boards[src].id, "relocated every part of board");
        for (i, host) in hosts {
            boards[i] = host;
        }
        return Some(boards.remove(src).material);
    }
    None
}

/// Empty sparse boards by moving their parts onto spare room of other
/// boards, across materials where the upgrade sequence allows it. Returns
/// the number of boards removed.
pub fn relocate_parts(
    boards: &mut Vec<Board>,
    resolver: &UpgradeResolver<'_>,
    config: &ConsolidationConfig,
    min_useful: f64,
    log: &mut RunLog,
) -> usize {
    let engine = PlacementEngine::new(Heuristic::BestFit, min_useful);
    let mut removed = 0;
    while removed < config.max_passes {
        let Some(material) = relocate_once(boards, resolver, config, &engine) else {
            break;
        };
        log.info(format!("{material} board emptied into spare room of other boards"));
        removed += 1;
    }
    removed
}

/// Layout templates tried when rearranging a board for one large offcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Rows along the board length, filled from the top edge.
    LinearHorizontal,
    /// Columns across the board width, filled from the left edge.
    LinearVertical,
    /// Everything pulled toward the origin corner.
    CornerCompact,
    /// Parts along the top and left edges.
    LShaped,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::LinearHorizontal,
        Template::LinearVertical,
        Template::CornerCompact,
        Template::LShaped,
    ];

    fn split_rule(self) -> SplitRule {
        match self {
            Template::LinearHorizontal => SplitRule::HorizontalFirst,
            _ => SplitRule::VerticalFirst,
        }
    }

    fn order(self, parts: &mut [PartUnit], kerf: f64) {
        let key = |p: &PartUnit| match self {
            Template::LinearHorizontal => p.length.min(p.width),
            Template::LinearVertical => p.length.max(p.width),
            Template::CornerCompact | Template::LShaped => p.inflated_area(kerf),
        };
        parts.sort_by(|a, b| key(b).total_cmp(&key(a)).then_with(|| a.id.cmp(&b.id)));
    }

    /// Orientations, preferred first.
    fn orientations(self, part: &PartUnit) -> Vec<bool> {
        let mut o = part.orientations().to_vec();
        let long_along_x = |r: bool| {
            let (l, w) = part.dims(r);
            l >= w
        };
        match self {
            Template::LinearHorizontal => o.sort_by_key(|&r| !long_along_x(r)),
            Template::LinearVertical => o.sort_by_key(|&r| long_along_x(r)),
            Template::CornerCompact | Template::LShaped => {}
        }
        o
    }

    fn score(self, at: Rect, pl: f64, pw: f64) -> (f64, f64) {
        match self {
            Template::LinearHorizontal => (at.y, at.x),
            Template::LinearVertical => (at.x, at.y),
            Template::CornerCompact => ((at.x + pl).max(at.y + pw), at.x + at.y),
            Template::LShaped => {
                let on_edge = if at.x.min(at.y) <= EPS { 0.0 } else { 1.0 };
                (on_edge, at.x + at.y)
            }
        }
    }

    fn pick(self, board: &Board, part: &PartUnit) -> Option<Choice> {
        let mut options: Vec<((f64, f64), Choice)> = Vec::new();
        for (rect, free) in board.free_rects().iter().enumerate() {
            for rotated in self.orientations(part) {
                if !board.can_fit(part, rect, rotated) {
                    continue;
                }
                let (pl, pw) = board.inflated_dims(part, rotated);
                let score = self.score(free.rect, pl, pw);
                options.push((score, Choice { slot: 0, rect, rotated }));
            }
        }
        options.sort_by(|a, b| a.0.0.total_cmp(&b.0.0).then(a.0.1.total_cmp(&b.0.1)));
        options.into_iter().map(|(_, c)| c).find(|c| {
            let at = board.free_rects()[c.rect].rect;
            board.admits(part, at.x, at.y, c.rotated)
        })
    }

    fn apply(self, board: &Board) -> Option<Board> {
        let mut parts = board.parts().to_vec();
        self.order(&mut parts, board.kerf);
        let mut trial = repack(board.blank(), parts, self.split_rule(), |b, p| self.pick(b, p))?;
        trial.merge_free_rects();
        Some(trial)
    }
}

fn largest_merged(board: &Board) -> f64 {
    let mut merged = board.clone();
    merged.merge_free_rects();
    merged.largest_free_rect().map_or(0.0, |r| r.area())
}

/// Rearrange low-utilization boards to open up one large offcut.
///
/// Boards that already keep an offcut of the target fraction are left as
/// they are. Otherwise the template with the largest single free rectangle
/// replaces the layout only when that rectangle reaches the target, and the
/// board is reported as partially saved.
pub fn maximize_offcuts(
    boards: &mut [Board],
    config: &ConsolidationConfig,
    log: &mut RunLog,
) -> Vec<PartialBoardSaving> {
    let mut savings = Vec::new();
    for board in boards.iter_mut() {
        if board.is_empty() || board.utilization() >= config.offcut_threshold {
            continue;
        }
        let target = config.offcut_target_fraction * board.area();
        if largest_merged(board) + EPS >= target {
            continue;
        }
        let before: &Board = board;

        let trials: Vec<(Template, Board, Rect)> = Template::ALL
            .par_iter()
            .filter_map(|&t| {
                let trial = t.apply(before)?;
                let offcut = trial.largest_free_rect()?;
                Some((t, trial, offcut))
            })
            .collect();

        let best = trials
            .into_iter()
            .fold(None, |best: Option<(Template, Board, Rect)>, cand| match best {
                Some(b) if b.2.area() >= cand.2.area() => Some(b),
                _ => Some(cand),
            });
        let Some((template, trial, offcut)) = best else {
            continue;
        };
        if offcut.area() + EPS < target {
            tracing::debug!(board = board.id, offcut = offcut.area(), "no template reached the offcut target");
            continue;
        }

        tracing::debug!(board = board.id, ?template, offcut = offcut.area(), "rearranged board");
        *board = trial;
        log.info(format!(
            "board {} rearranged to keep a {:.0}x{:.0} offcut",
            board.id, offcut.length, offcut.width
        ));
        savings.push(PartialBoardSaving {
            board_id: board.id,
            material: board.material.clone(),
            offcut,
            credit: config.offcut_target_fraction,
            value: 0.0,
        });
    }
    savings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{assert_board_valid, mr, part};
    use crate::material::tests::sample_catalog;
    use crate::upgrade::UpgradeSequence;

    fn board_with(id: usize, parts: &[(&str, f64, f64)]) -> Board {
        let engine = PlacementEngine::new(Heuristic::BestFit, 100.0);
        let mut board = Board::new(id, mr(), 2440.0, 1220.0, 4.4);
        for &(pid, l, w) in parts {
            let p = part(pid, l, w);
            let c = engine.place(&p, &[&board]).unwrap();
            board.try_place(p, c.rect, c.rotated, engine.split_rule()).unwrap();
        }
        board
    }

    fn all_ids(boards: &[Board]) -> Vec<String> {
        let mut ids: Vec<String> = boards
            .iter()
            .flat_map(|b| b.parts().iter().map(|p| p.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_merges_two_sparse_boards() {
        let mut boards = vec![
            board_with(1, &[("a", 1000.0, 600.0)]),
            board_with(2, &[("b", 1000.0, 600.0), ("c", 400.0, 400.0)]),
        ];
        let before = all_ids(&boards);
        let mut log = RunLog::new();
        let merged = merge_boards(&mut boards, &ConsolidationConfig::default(), 100.0, &mut log);
        assert_eq!(merged, 1);
        assert_eq!(boards.len(), 1);
        assert_eq!(all_ids(&boards), before);
        assert_eq!(boards[0].id, 2);
        assert!(boards[0].parts().iter().all(|p| p.placement.as_ref().unwrap().board_id == 2));
        assert_board_valid(&boards[0]);
    }

    #[test]
    fn test_never_merges_different_materials() {
        let mut other = board_with(2, &[("b", 1000.0, 600.0)]);
        other.material = MaterialSpec::parse("SF_18BWR_SF").unwrap();
        let mut boards = vec![board_with(1, &[("a", 1000.0, 600.0)]), other];
        let mut log = RunLog::new();
        assert_eq!(
            merge_boards(&mut boards, &ConsolidationConfig::default(), 100.0, &mut log),
            0
        );
        assert_eq!(boards.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut boards = vec![
            board_with(1, &[("a", 1200.0, 1000.0)]),
            board_with(2, &[("b", 1200.0, 1000.0)]),
            board_with(3, &[("c", 2000.0, 1100.0)]),
        ];
        let config = ConsolidationConfig::default();
        let mut log = RunLog::new();
        merge_boards(&mut boards, &config, 100.0, &mut log);
        let snapshot: Vec<(usize, Vec<String>)> = boards
            .iter()
            .map(|b| (b.id, b.parts().iter().map(|p| p.id.clone()).collect()))
            .collect();
        assert_eq!(merge_boards(&mut boards, &config, 100.0, &mut log), 0);
        let again: Vec<(usize, Vec<String>)> = boards
            .iter()
            .map(|b| (b.id, b.parts().iter().map(|p| p.id.clone()).collect()))
            .collect();
        assert_eq!(snapshot, again);
    }

    /// A short strip and a tall block side by side leave only fragmented
    /// free space.
    fn fragmented() -> Board {
        let mut board = Board::new(1, mr(), 2440.0, 1220.0, 0.0);
        board
            .try_place(part("a", 1000.0, 300.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let idx = board
            .free_rects()
            .iter()
            .position(|f| f.rect.x > 0.0)
            .unwrap();
        board
            .try_place(part("b", 400.0, 900.0), idx, false, SplitRule::VerticalFirst)
            .unwrap();
        board
    }

    #[test]
    fn test_offcut_maximization_opens_large_offcut() {
        let board = fragmented();
        assert!(largest_merged(&board) < 0.5 * board.area());

        let mut boards = vec![board];
        let mut log = RunLog::new();
        let savings = maximize_offcuts(&mut boards, &ConsolidationConfig::default(), &mut log);
        assert_eq!(savings.len(), 1);
        assert!(savings[0].offcut.area() >= 0.5 * 2440.0 * 1220.0);
        assert_eq!(boards[0].parts().len(), 2);
        assert_board_valid(&boards[0]);

        // the offcut is there now, so a second run changes nothing
        let layout: Vec<_> = boards[0].footprints();
        let again = maximize_offcuts(&mut boards, &ConsolidationConfig::default(), &mut log);
        assert_eq!(boards[0].footprints(), layout);
        assert!(again.is_empty());
    }

    #[test]
    fn test_rearrangement_below_target_is_discarded() {
        let mut board = fragmented();
        board.id = 4;
        let layout = board.footprints();
        let config = ConsolidationConfig {
            offcut_target_fraction: 0.95,
            ..ConsolidationConfig::default()
        };
        let mut boards = vec![board];
        let mut log = RunLog::new();
        let savings = maximize_offcuts(&mut boards, &config, &mut log);
        assert!(savings.is_empty());
        assert_eq!(boards[0].footprints(), layout);
    }

    #[test]
    fn test_board_with_large_offcut_is_kept() {
        let mut boards = vec![board_with(1, &[("a", 600.0, 400.0)])];
        let layout = boards[0].footprints();
        let mut log = RunLog::new();
        let savings = maximize_offcuts(&mut boards, &ConsolidationConfig::default(), &mut log);
        assert!(savings.is_empty());
        assert_eq!(boards[0].footprints(), layout);
        assert!(!boards[0].parts()[0].placement.as_ref().unwrap().rotated);
    }

    #[test]
    fn test_busy_board_is_left_alone() {
        let mut boards = vec![board_with(1, &[("a", 2000.0, 1000.0)])];
        let layout = boards[0].footprints();
        let mut log = RunLog::new();
        let savings = maximize_offcuts(&mut boards, &ConsolidationConfig::default(), &mut log);
        assert!(savings.is_empty());
        assert_eq!(boards[0].footprints(), layout);
    }

    fn bwr_board(id: usize) -> Board {
        let bwr = MaterialSpec::parse("SF_18BWR_SF").unwrap();
        let mut board = Board::new(id, bwr.clone(), 2440.0, 1220.0, 4.4);
        board
            .try_place(PartUnit::new("door", 2000.0, 1000.0, bwr), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        board
    }

    #[test]
    fn test_relocation_fills_upgrade_board() {
        let catalog = sample_catalog();
        let sequence = UpgradeSequence::parse("18MR,18BWR");
        let resolver = UpgradeResolver::new(&catalog, &sequence);
        let mut boards = vec![bwr_board(1), board_with(1, &[("shelf", 400.0, 150.0)])];
        let mut log = RunLog::new();

        let removed = relocate_parts(&mut boards, &resolver, &ConsolidationConfig::default(), 100.0, &mut log);
        assert_eq!(removed, 1);
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].material.core_name, "18BWR");
        let shelf = boards[0].parts().iter().find(|p| p.id == "shelf").unwrap();
        assert_eq!(shelf.material, mr());
        assert_eq!(shelf.placement.as_ref().unwrap().material, boards[0].material);
        assert_board_valid(&boards[0]);
    }

    #[test]
    fn test_relocation_needs_upgrade_sequence() {
        let catalog = sample_catalog();
        let sequence = UpgradeSequence::default();
        let resolver = UpgradeResolver::new(&catalog, &sequence);
        let mut boards = vec![bwr_board(1), board_with(1, &[("shelf", 400.0, 150.0)])];
        let mut log = RunLog::new();

        let removed = relocate_parts(&mut boards, &resolver, &ConsolidationConfig::default(), 100.0, &mut log);
        assert_eq!(removed, 0);
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[1].parts()[0].id, "shelf");
    }
}
