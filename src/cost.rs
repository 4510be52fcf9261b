use crate::board::Board;
use crate::material::MaterialCatalog;
use crate::types::{PartUnit, PartialBoardSaving};

/// Cost of cutting every part from its own board of the requested material.
pub fn baseline_cost<'a>(catalog: &MaterialCatalog, parts: impl IntoIterator<Item = &'a PartUnit>) -> f64 {
    parts
        .into_iter()
        .map(|p| catalog.board_cost(&p.material))
        .sum()
}

/// Cost of the boards actually opened.
pub fn final_cost(catalog: &MaterialCatalog, boards: &[Board]) -> f64 {
    boards.iter().map(|b| catalog.board_cost(&b.material)).sum()
}

/// Fill in the currency value of each partial-board credit.
pub fn value_savings(catalog: &MaterialCatalog, savings: &mut [PartialBoardSaving]) {
    for s in savings {
        s.value = s.credit * catalog.board_cost(&s.material);
    }
}
