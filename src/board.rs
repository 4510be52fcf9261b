use crate::guillotine;
use crate::material::MaterialSpec;
use crate::types::{BoardReport, EPS, PartUnit, Placement, Rect};

/// Upper bound on free-rectangle joins in one merge call.
pub const MAX_MERGE_PASSES: usize = 64;

/// A free region of a board, reusable as an offcut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeRect {
    pub rect: Rect,
    pub source_board: usize,
}

/// Order of the two cuts around a newly placed part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRule {
    /// Rip along the part's right edge first: the right remainder keeps the
    /// full height of the consumed rectangle.
    VerticalFirst,
    /// Cross-cut under the part first: the bottom remainder keeps the full
    /// length, which is how shelves are built.
    HorizontalFirst,
}

#[derive(Debug, Clone)]
pub struct Board {
    pub id: usize,
    pub material: MaterialSpec,
    pub length: f64,
    pub width: f64,
    pub kerf: f64,
    placed: Vec<PartUnit>,
    free_rects: Vec<FreeRect>,
}

impl Board {
    pub fn new(id: usize, material: MaterialSpec, length: f64, width: f64, kerf: f64) -> Self {
        Self {
            id,
            material,
            length,
            width,
            kerf,
            placed: Vec::new(),
            free_rects: vec![FreeRect {
                rect: Rect::new(0.0, 0.0, length, width),
                source_board: id,
            }],
        }
    }

    /// An empty board with the same material and size.
    pub fn blank(&self) -> Self {
        Self::new(self.id, self.material.clone(), self.length, self.width, self.kerf)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.length, self.width)
    }

    pub fn parts(&self) -> &[PartUnit] {
        &self.placed
    }

    pub fn free_rects(&self) -> &[FreeRect] {
        &self.free_rects
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Kerf-inflated (length, width) of `part` in an orientation.
    pub fn inflated_dims(&self, part: &PartUnit, rotated: bool) -> (f64, f64) {
        let (l, w) = part.dims(rotated);
        (l + self.kerf, w + self.kerf)
    }

    pub fn can_fit(&self, part: &PartUnit, rect_idx: usize, rotated: bool) -> bool {
        if rotated && part.grain_sensitive {
            return false;
        }
        let (pl, pw) = self.inflated_dims(part, rotated);
        self.free_rects
            .get(rect_idx)
            .is_some_and(|f| f.rect.fits(pl, pw))
    }

    /// Whether the part fits an empty board of this size in some orientation.
    pub fn fits_blank(&self, part: &PartUnit) -> bool {
        let bounds = self.bounds();
        part.orientations().iter().any(|&rotated| {
            let (pl, pw) = self.inflated_dims(part, rotated);
            bounds.fits(pl, pw)
        })
    }

    /// Place `part` at the corner of free rectangle `rect_idx`.
    ///
    /// On failure the board is untouched and the part is handed back.
    #[allow(clippy::result_large_err)]
    pub fn try_place(
        &mut self,
        mut part: PartUnit,
        rect_idx: usize,
        rotated: bool,
        split: SplitRule,
    ) -> Result<(), PartUnit> {
        if !self.can_fit(&part, rect_idx, rotated) {
            return Err(part);
        }
        let (pl, pw) = self.inflated_dims(&part, rotated);
        let free = self.free_rects.swap_remove(rect_idx);
        self.split(free.rect, pl, pw, split);

        tracing::debug!(
            board = self.id,
            part = %part.id,
            x = free.rect.x,
            y = free.rect.y,
            rotated,
            "placed part"
        );
        part.placement = Some(Placement {
            board_id: self.id,
            material: self.material.clone(),
            x: free.rect.x,
            y: free.rect.y,
            rotated,
        });
        self.placed.push(part);
        Ok(())
    }

    fn split(&mut self, rect: Rect, pl: f64, pw: f64, rule: SplitRule) {
        let (x, y) = (rect.x, rect.y);
        let (right, bottom) = match rule {
            SplitRule::VerticalFirst => (
                Rect::new(x + pl, y, rect.right() - (x + pl), rect.width),
                Rect::new(x, y + pw, pl, rect.bottom() - (y + pw)),
            ),
            SplitRule::HorizontalFirst => (
                Rect::new(x + pl, y, rect.right() - (x + pl), pw),
                Rect::new(x, y + pw, rect.length, rect.bottom() - (y + pw)),
            ),
        };
        for r in [right, bottom] {
            if !r.is_empty() {
                self.free_rects.push(FreeRect {
                    rect: r,
                    source_board: self.id,
                });
            }
        }
    }

    /// Remove a part and give its footprint back as free space.
    pub fn unplace(&mut self, part_id: &str) -> Option<PartUnit> {
        let idx = self.placed.iter().position(|p| p.id == part_id)?;
        let mut part = self.placed.remove(idx);
        if let Some(rect) = part.footprint(self.kerf) {
            self.free_rects.push(FreeRect {
                rect,
                source_board: self.id,
            });
        }
        part.placement = None;
        self.merge_free_rects();
        Some(part)
    }

    /// Remove every part, leaving a blank board.
    pub fn take_parts(&mut self) -> Vec<PartUnit> {
        self.free_rects = vec![FreeRect {
            rect: self.bounds(),
            source_board: self.id,
        }];
        let mut parts = std::mem::take(&mut self.placed);
        for p in &mut parts {
            p.placement = None;
        }
        parts
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = id;
        for p in &mut self.placed {
            if let Some(placement) = p.placement.as_mut() {
                placement.board_id = id;
            }
        }
        for f in &mut self.free_rects {
            f.source_board = id;
        }
    }

    /// Join free rectangles that share a full edge, at most
    /// `MAX_MERGE_PASSES` joins per call.
    pub fn merge_free_rects(&mut self) {
        for _ in 0..MAX_MERGE_PASSES {
            if !self.merge_one_pair() {
                break;
            }
        }
    }

    fn merge_one_pair(&mut self) -> bool {
        for i in 0..self.free_rects.len() {
            for j in (i + 1)..self.free_rects.len() {
                if let Some(m) = try_merge(self.free_rects[i].rect, self.free_rects[j].rect) {
                    self.free_rects[i].rect = m;
                    self.free_rects.swap_remove(j);
                    return true;
                }
            }
        }
        false
    }

    pub fn footprints(&self) -> Vec<Rect> {
        self.placed
            .iter()
            .filter_map(|p| p.footprint(self.kerf))
            .collect()
    }

    pub fn used_area(&self) -> f64 {
        self.placed.iter().map(|p| p.inflated_area(self.kerf)).sum()
    }

    pub fn free_area(&self) -> f64 {
        self.free_rects.iter().map(|f| f.rect.area()).sum()
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Kerf-inflated part area as a percentage of the board.
    pub fn utilization(&self) -> f64 {
        if self.area() <= 0.0 {
            return 0.0;
        }
        self.used_area() / self.area() * 100.0
    }

    pub fn largest_free_rect(&self) -> Option<Rect> {
        self.free_rects
            .iter()
            .map(|f| f.rect)
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }

    pub fn is_guillotine(&self) -> bool {
        guillotine::is_separable_within(self.bounds(), &self.footprints())
    }

    /// Whether placing `part` at `(x, y)` keeps the layout guillotine-cuttable.
    pub fn admits(&self, part: &PartUnit, x: f64, y: f64, rotated: bool) -> bool {
        let (pl, pw) = self.inflated_dims(part, rotated);
        guillotine::admits(self.bounds(), &self.footprints(), Rect::new(x, y, pl, pw))
    }

    /// Free space and footprints tile the board exactly, with no overlaps.
    pub fn tiles_exactly(&self) -> bool {
        let bounds = self.bounds();
        let mut all: Vec<Rect> = self.footprints();
        all.extend(self.free_rects.iter().map(|f| f.rect));
        if all.iter().any(|r| !bounds.contains(r)) {
            return false;
        }
        for (i, a) in all.iter().enumerate() {
            if all[i + 1..].iter().any(|b| a.overlaps(b)) {
                return false;
            }
        }
        let covered: f64 = all.iter().map(Rect::area).sum();
        (covered - bounds.area()).abs() <= 1e-6 * bounds.area().max(1.0)
    }

    pub fn report(&self) -> BoardReport {
        BoardReport {
            id: self.id,
            material: self.material.clone(),
            length: self.length,
            width: self.width,
            utilization: self.utilization(),
            parts: self.placed.clone(),
            free_rects: self.free_rects.iter().map(|f| f.rect).collect(),
        }
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS
}

fn try_merge(a: Rect, b: Rect) -> Option<Rect> {
    // side by side along x
    if close(a.y, b.y) && close(a.width, b.width) {
        if close(a.right(), b.x) {
            return Some(Rect::new(a.x, a.y, a.length + b.length, a.width));
        }
        if close(b.right(), a.x) {
            return Some(Rect::new(b.x, b.y, a.length + b.length, a.width));
        }
    }
    // stacked along y
    if close(a.x, b.x) && close(a.length, b.length) {
        if close(a.bottom(), b.y) {
            return Some(Rect::new(a.x, a.y, a.length, a.width + b.width));
        }
        if close(b.bottom(), a.y) {
            return Some(Rect::new(b.x, b.y, a.length, a.width + b.width));
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn mr() -> MaterialSpec {
        MaterialSpec::parse("SF_18MR_SF").unwrap()
    }

    pub(crate) fn part(id: &str, l: f64, w: f64) -> PartUnit {
        PartUnit::new(id, l, w, mr())
    }

    fn standard(kerf: f64) -> Board {
        Board::new(1, mr(), 2440.0, 1220.0, kerf)
    }

    pub(crate) fn assert_board_valid(board: &Board) {
        assert!(
            board.tiles_exactly(),
            "board {} does not tile: parts {:?} free {:?}",
            board.id,
            board.footprints(),
            board.free_rects()
        );
        assert!(board.is_guillotine(), "board {} not guillotine", board.id);
    }

    #[test]
    fn test_place_single_part() {
        let mut board = standard(4.4);
        board
            .try_place(part("a", 600.0, 400.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let p = board.parts()[0].placement.as_ref().unwrap();
        assert_eq!((p.x, p.y, p.rotated, p.board_id), (0.0, 0.0, false, 1));
        assert_relative_eq!(
            board.utilization(),
            604.4 * 404.4 / (2440.0 * 1220.0) * 100.0
        );
        assert_board_valid(&board);
    }

    #[test]
    fn test_canonical_split() {
        let mut board = standard(4.4);
        board
            .try_place(part("a", 1800.0, 600.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let free = board.free_rects();
        assert_eq!(free.len(), 2);
        let right = free[0].rect;
        let bottom = free[1].rect;
        assert_relative_eq!(right.x, 1804.4);
        assert_relative_eq!(right.length, 2440.0 - 1804.4);
        assert_relative_eq!(right.width, 1220.0);
        assert_relative_eq!(bottom.y, 604.4);
        assert_relative_eq!(bottom.length, 1804.4);
        assert_relative_eq!(bottom.width, 1220.0 - 604.4);
    }

    #[test]
    fn test_shelf_split() {
        let mut board = standard(0.0);
        board
            .try_place(part("a", 1000.0, 300.0), 0, false, SplitRule::HorizontalFirst)
            .unwrap();
        let free = board.free_rects();
        assert_eq!(free[0].rect, Rect::new(1000.0, 0.0, 1440.0, 300.0));
        assert_eq!(free[1].rect, Rect::new(0.0, 300.0, 2440.0, 920.0));
        assert_board_valid(&board);
    }

    #[test]
    fn test_part_too_large_is_handed_back() {
        let mut board = standard(4.4);
        let err = board
            .try_place(part("big", 3000.0, 500.0), 0, false, SplitRule::VerticalFirst)
            .unwrap_err();
        assert_eq!(err.id, "big");
        assert!(err.placement.is_none());
        assert!(board.is_empty());
        assert_eq!(board.free_rects().len(), 1);
    }

    #[test]
    fn test_kerf_counts_against_fit() {
        let mut board = Board::new(1, mr(), 100.0, 100.0, 5.0);
        // 100 + kerf does not fit a 100 board
        assert!(!board.can_fit(&part("a", 100.0, 50.0), 0, false));
        board
            .try_place(part("b", 50.0, 95.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        assert!(board.free_rects().iter().any(|f| close(f.rect.length, 45.0)));
    }

    #[test]
    fn test_grain_sensitive_refuses_rotation() {
        let mut board = standard(0.0);
        let mut p = part("g", 600.0, 400.0);
        p.grain_sensitive = true;
        assert!(!board.can_fit(&p, 0, true));
        assert!(board.try_place(p, 0, true, SplitRule::VerticalFirst).is_err());
    }

    #[test]
    fn test_exact_fit_leaves_no_free_space() {
        let mut board = Board::new(1, mr(), 100.0, 100.0, 0.0);
        board
            .try_place(part("a", 100.0, 100.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        assert!(board.free_rects().is_empty());
        assert_relative_eq!(board.utilization(), 100.0);
    }

    #[test]
    fn test_unplace_restores_whole_board() {
        let mut board = standard(4.4);
        board
            .try_place(part("a", 600.0, 400.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let p = board.unplace("a").unwrap();
        assert!(p.placement.is_none());
        assert!(board.is_empty());
        assert_eq!(board.free_rects().len(), 1);
        let whole = board.free_rects()[0].rect;
        assert_relative_eq!(whole.length, 2440.0, epsilon = 1e-9);
        assert_relative_eq!(whole.width, 1220.0, epsilon = 1e-9);
        assert!(board.unplace("a").is_none());
    }

    #[test]
    fn test_unplace_middle_part() {
        let mut board = standard(0.0);
        let top_at = |b: &Board, x: f64| {
            b.free_rects()
                .iter()
                .position(|f| close(f.rect.x, x) && close(f.rect.y, 0.0))
                .unwrap()
        };
        board
            .try_place(part("a", 600.0, 400.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let idx = top_at(&board, 600.0);
        board
            .try_place(part("b", 500.0, 400.0), idx, false, SplitRule::VerticalFirst)
            .unwrap();
        let idx = top_at(&board, 1100.0);
        board
            .try_place(part("c", 700.0, 400.0), idx, false, SplitRule::VerticalFirst)
            .unwrap();

        let b = board.unplace("b").unwrap();
        assert!(b.placement.is_none());
        let ids: Vec<&str> = board.parts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        // the freed slot joins the strip below it
        assert!(board.free_rects().iter().any(|f| {
            close(f.rect.x, 600.0) && close(f.rect.y, 0.0) && close(f.rect.width, 1220.0)
        }));
        assert_relative_eq!(board.used_area(), 600.0 * 400.0 + 700.0 * 400.0);
        assert_board_valid(&board);
    }

    #[test]
    fn test_merge_free_rects_is_bounded() {
        // a row of unit strips that could all join into one
        let mut board = Board::new(1, mr(), (2 * MAX_MERGE_PASSES + 2) as f64, 10.0, 0.0);
        board
            .try_place(part("a", 1.0, 10.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        board.free_rects = (1..board.length as usize)
            .map(|x| FreeRect {
                rect: Rect::new(x as f64, 0.0, 1.0, 10.0),
                source_board: 1,
            })
            .collect();
        let before = board.free_rects().len();
        board.merge_free_rects();
        assert_eq!(board.free_rects().len(), before - MAX_MERGE_PASSES);
        assert!(board.tiles_exactly());
    }

    #[test]
    fn test_set_id_updates_placements() {
        let mut board = standard(0.0);
        board
            .try_place(part("a", 100.0, 100.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        board.set_id(7);
        assert_eq!(board.parts()[0].placement.as_ref().unwrap().board_id, 7);
        assert!(board.free_rects().iter().all(|f| f.source_board == 7));
    }

    #[test]
    fn test_take_parts_resets() {
        let mut board = standard(0.0);
        board
            .try_place(part("a", 100.0, 100.0), 0, false, SplitRule::VerticalFirst)
            .unwrap();
        let parts = board.take_parts();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].placement.is_none());
        assert_relative_eq!(board.free_area(), board.area());
    }
}
