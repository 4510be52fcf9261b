use crate::types::BoardReport;

const MAX_COLS: f64 = 80.0;
const MAX_ROWS: f64 = 40.0;

/// ASCII drawing of a board: its outline, each part's outline and a label
/// with the part id, or its size when the id does not fit.
pub fn render_board(board: &BoardReport) -> String {
    let scale = f64::min(MAX_COLS / board.length, MAX_ROWS / board.width);
    let cols = (board.length * scale).round() as usize;
    let rows = (board.width * scale).round() as usize;
    if cols == 0 || rows == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; cols + 1]; rows + 1];
    outline(&mut grid, 0, 0, cols, rows);

    for part in &board.parts {
        let Some(p) = part.placement.as_ref() else {
            continue;
        };
        let (l, w) = part.dims(p.rotated);
        let sx = (p.x * scale).round() as usize;
        let sy = (p.y * scale).round() as usize;
        let sw = (l * scale).round() as usize;
        let sh = (w * scale).round() as usize;
        if sw == 0 || sh == 0 {
            continue;
        }
        outline(&mut grid, sx, sy, sw, sh);

        let dims = format!("{l}x{w}");
        let label = if part.id.len() < sw.saturating_sub(1) { &part.id } else { &dims };
        let cy = sy + sh / 2;
        let start = (sx + sw / 2).saturating_sub(label.chars().count() / 2);
        for (i, ch) in label.chars().enumerate() {
            let cx = start + i;
            if cx > sx && cx < sx + sw && cy > sy && cy < sy + sh {
                grid[cy][cx] = ch;
            }
        }
    }

    let mut out = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn put(grid: &mut [Vec<char>], x: usize, y: usize, edge: char) {
    let Some(cell) = grid.get_mut(y).and_then(|row| row.get_mut(x)) else {
        return;
    };
    *cell = match (*cell, edge) {
        ('+', _) | ('|', '-') | ('-', '|') => '+',
        _ => edge,
    };
}

fn outline(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    for i in x..=x + w {
        put(grid, i, y, '-');
        put(grid, i, y + h, '-');
    }
    for j in y..=y + h {
        put(grid, x, j, '|');
        put(grid, x + w, j, '|');
    }
    for (cx, cy) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
        put(grid, cx, cy, '+');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialSpec;
    use crate::types::{PartUnit, Placement};

    fn board(parts: Vec<PartUnit>) -> BoardReport {
        BoardReport {
            id: 1,
            material: MaterialSpec::parse("SF_18MR_SF").unwrap(),
            length: 2440.0,
            width: 1220.0,
            utilization: 0.0,
            parts,
            free_rects: Vec::new(),
        }
    }

    fn placed(id: &str, l: f64, w: f64, x: f64, y: f64) -> PartUnit {
        let material = MaterialSpec::parse("SF_18MR_SF").unwrap();
        let mut p = PartUnit::new(id, l, w, material.clone());
        p.placement = Some(Placement {
            board_id: 1,
            material,
            x,
            y,
            rotated: false,
        });
        p
    }

    #[test]
    fn test_render_labels_parts() {
        let out = render_board(&board(vec![
            placed("door", 1200.0, 1220.0, 0.0, 0.0),
            placed("shelf", 1200.0, 600.0, 1220.0, 0.0),
        ]));
        assert!(out.contains("door"));
        assert!(out.contains("shelf"));
        assert!(out.contains('+') && out.contains('|') && out.contains('-'));
    }

    #[test]
    fn test_long_id_falls_back_to_size() {
        let out = render_board(&board(vec![placed(
            "a-very-long-part-name",
            600.0,
            400.0,
            0.0,
            0.0,
        )]));
        assert!(out.contains("600x400"));
    }

    #[test]
    fn test_empty_board_draws_outline() {
        let out = render_board(&board(Vec::new()));
        assert!(out.starts_with('+'));
        assert_eq!(out.lines().count(), 41);
    }
}
