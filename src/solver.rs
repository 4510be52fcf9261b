use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::board::Board;
use crate::consolidate;
use crate::cost;
use crate::error::{PlacementError, Result};
use crate::log::RunLog;
use crate::material::MaterialCatalog;
use crate::placement::{Heuristic, PlacementEngine};
use crate::shelf;
use crate::types::{
    OptimizeConfig, PartRequest, PartUnit, PlacementResult, RejectedRequest, Strategy,
    UnplacedPart, UnplacedReason, UpgradeRecord,
};
use crate::upgrade::{UpgradeResolver, UpgradeSequence};

/// Boards and leftovers produced for one material group.
#[derive(Debug, Clone, Default)]
struct Packing {
    boards: Vec<Board>,
    unplaced: Vec<UnplacedPart>,
    log: RunLog,
}

impl Packing {
    fn waste(&self) -> f64 {
        self.boards.iter().map(|b| b.area() - b.used_area()).sum()
    }
}

pub struct Optimizer {
    catalog: MaterialCatalog,
    config: OptimizeConfig,
    sequence: UpgradeSequence,
}

impl Optimizer {
    pub fn new(catalog: MaterialCatalog, config: OptimizeConfig) -> Self {
        let sequence = UpgradeSequence::from(config.upgrade_sequence.clone());
        Self {
            catalog,
            config,
            sequence,
        }
    }

    pub fn catalog(&self) -> &MaterialCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &OptimizeConfig {
        &self.config
    }

    pub fn optimize(&self, requests: &[PartRequest]) -> Result<PlacementResult> {
        self.catalog.validate()?;
        if !self.config.kerf.is_finite() || self.config.kerf < 0.0 {
            return Err(PlacementError::InvalidKerf(self.config.kerf));
        }
        self.sequence.validate(&self.catalog)?;

        let mut log = RunLog::new();
        let (units, rejected) = self.expand_requests(requests, &mut log);
        self.catalog
            .report_missing(units.iter().map(|u| &u.material), &mut log);

        let mut groups: BTreeMap<String, Vec<PartUnit>> = BTreeMap::new();
        for unit in &units {
            groups
                .entry(unit.material.signature())
                .or_default()
                .push(unit.clone());
        }
        log.info(format!(
            "{} part(s) in {} material group(s), strategy {}",
            units.len(),
            groups.len(),
            self.config.strategy
        ));

        let groups: Vec<(String, Vec<PartUnit>)> = groups.into_iter().collect();
        let packings: Vec<Packing> = groups
            .into_par_iter()
            .map(|(signature, parts)| self.solve_group(&signature, parts))
            .collect();

        let mut boards = Vec::new();
        let mut unplaced = Vec::new();
        for packing in packings {
            boards.extend(packing.boards);
            unplaced.extend(packing.unplaced);
            log.extend(packing.log);
        }
        if self.config.global_offcuts {
            let resolver = UpgradeResolver::new(&self.catalog, &self.sequence);
            consolidate::relocate_parts(
                &mut boards,
                &resolver,
                &self.config.consolidation,
                self.config.min_useful,
                &mut log,
            );
        }
        for (i, board) in boards.iter_mut().enumerate() {
            board.set_id(i + 1);
        }
        let upgrade_log = upgrade_records(&boards, &mut log);

        let mut partial_savings = if self.config.strategy == Strategy::Fast {
            Vec::new()
        } else {
            consolidate::maximize_offcuts(&mut boards, &self.config.consolidation, &mut log)
        };
        cost::value_savings(&self.catalog, &mut partial_savings);

        for board in &boards {
            let valid = board.is_guillotine() && board.tiles_exactly();
            if !valid {
                tracing::error!(board = board.id, "board failed final validation");
                log.warn(format!("board {} failed final validation", board.id));
            }
            debug_assert!(valid, "board {} failed final validation", board.id);
        }

        let baseline_cost = cost::baseline_cost(&self.catalog, &units);
        let final_cost = cost::final_cost(&self.catalog, &boards);
        log.info(format!(
            "{} board(s), {} unplaced, cost {:.2} vs baseline {:.2}",
            boards.len(),
            unplaced.len(),
            final_cost,
            baseline_cost
        ));

        Ok(PlacementResult {
            boards: boards.iter().map(Board::report).collect(),
            unplaced,
            upgrade_log,
            partial_savings,
            baseline_cost,
            final_cost,
            log: log.into_entries(),
            rejected,
        })
    }

    /// Expand requests into units, setting aside the ones that cannot be used.
    fn expand_requests(&self, requests: &[PartRequest], log: &mut RunLog) -> (Vec<PartUnit>, Vec<RejectedRequest>) {
        let mut units = Vec::new();
        let mut rejected = Vec::new();
        for req in requests {
            let material = req.validate().and_then(|_| {
                self.catalog
                    .resolve(&req.material_string)
                    .map_err(|source| PlacementError::Material {
                        part: req.id.clone(),
                        source,
                    })
            });
            match material {
                Ok(material) => units.extend(PartUnit::expand(req, &material)),
                Err(e) => {
                    log.warn(format!("rejected request: {e}"));
                    rejected.push(RejectedRequest {
                        id: req.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        (units, rejected)
    }

    fn heuristics(&self) -> Vec<Heuristic> {
        match Heuristic::for_strategy(self.config.strategy) {
            Some(h) => vec![h],
            None => Heuristic::ALL.to_vec(),
        }
    }

    /// Pack one material group with every heuristic in play and keep the
    /// packing with the fewest boards, then the least waste.
    fn solve_group(&self, signature: &str, parts: Vec<PartUnit>) -> Packing {
        let heuristics = self.heuristics();
        let runs: Vec<(Heuristic, Packing)> = heuristics
            .par_iter()
            .map(|&h| (h, self.pack(parts.clone(), h)))
            .collect();

        let best = runs.into_iter().reduce(|best, cand| {
            let better = cand.1.boards.len() < best.1.boards.len()
                || (cand.1.boards.len() == best.1.boards.len()
                    && cand.1.waste() < best.1.waste() - 1e-6);
            if better { cand } else { best }
        });
        let Some((heuristic, mut packing)) = best else {
            return Packing::default();
        };

        let mut log = RunLog::new();
        log.info(format!(
            "group {signature}: {} part(s) on {} board(s) using {heuristic:?}",
            parts.len(),
            packing.boards.len()
        ));
        log.extend(std::mem::take(&mut packing.log));
        packing.log = log;
        packing
    }

    fn ordered(&self, mut parts: Vec<PartUnit>, heuristic: Heuristic) -> Vec<PartUnit> {
        let kerf = self.config.kerf;
        parts.sort_by(|a, b| {
            b.inflated_area(kerf)
                .total_cmp(&a.inflated_area(kerf))
                .then_with(|| a.id.cmp(&b.id))
        });
        if heuristic != Heuristic::Shelf {
            return parts;
        }
        match parts.first().map(|p| self.catalog.board_dims(&p.material)) {
            Some((length, width)) => shelf::plan_order(parts, length, width, kerf),
            None => parts,
        }
    }

    fn pack(&self, parts: Vec<PartUnit>, heuristic: Heuristic) -> Packing {
        let engine = PlacementEngine::new(heuristic, self.config.min_useful);
        let resolver = UpgradeResolver::new(&self.catalog, &self.sequence);
        let mut packing = Packing::default();

        for part in self.ordered(parts, heuristic) {
            self.place_part(part, &engine, &resolver, &mut packing);
        }

        consolidate::merge_boards(
            &mut packing.boards,
            &self.config.consolidation,
            self.config.min_useful,
            &mut packing.log,
        );
        packing
    }

    /// Existing boards of each candidate material first, then a fresh board
    /// of the first candidate material large enough.
    fn place_part(
        &self,
        mut part: PartUnit,
        engine: &PlacementEngine,
        resolver: &UpgradeResolver<'_>,
        packing: &mut Packing,
    ) {
        let candidates = resolver.candidates(&part.material);

        for material in &candidates {
            let mut pool: Vec<usize> = packing
                .boards
                .iter()
                .enumerate()
                .filter(|(_, b)| &b.material == material)
                .map(|(i, _)| i)
                .collect();
            if !self.config.global_offcuts {
                pool = pool.split_off(pool.len().saturating_sub(1));
            }
            let choice = {
                let refs: Vec<&Board> = pool.iter().map(|&i| &packing.boards[i]).collect();
                engine.place(&part, &refs)
            };
            if let Some(c) = choice {
                let idx = pool[c.slot];
                match packing.boards[idx].try_place(part, c.rect, c.rotated, engine.split_rule()) {
                    Ok(()) => return,
                    Err(p) => part = p,
                }
            }
        }

        for material in &candidates {
            let (length, width) = self.catalog.board_dims(material);
            let mut board = Board::new(
                packing.boards.len() + 1,
                material.clone(),
                length,
                width,
                self.config.kerf,
            );
            if !board.fits_blank(&part) {
                continue;
            }
            let Some(c) = engine.place(&part, &[&board]) else {
                continue;
            };
            match board.try_place(part, c.rect, c.rotated, engine.split_rule()) {
                Ok(()) => {
                    packing.boards.push(board);
                    return;
                }
                Err(p) => part = p,
            }
        }

        packing.log.warn(format!(
            "part {} ({}x{}) does not fit any board of {}",
            part.id, part.length, part.width, part.material
        ));
        packing.unplaced.push(UnplacedPart {
            part,
            reason: UnplacedReason::OversizedPart,
        });
    }
}

/// One record per part sitting on a board of another material than it asked for.
fn upgrade_records(boards: &[Board], log: &mut RunLog) -> Vec<UpgradeRecord> {
    let mut records = Vec::new();
    for board in boards {
        for part in board.parts().iter().filter(|p| p.material != board.material) {
            log.info(format!(
                "upgraded part {} from {} to {} on board {}",
                part.id, part.material.core_name, board.material.core_name, board.id
            ));
            records.push(UpgradeRecord {
                part_id: part.id.clone(),
                from: part.material.clone(),
                to: board.material.clone(),
            });
        }
    }
    records
}
