//! Guillotine feasibility.
//!
//! A layout is guillotine-cuttable when it can be split by a straight
//! end-to-end cut into two non-empty halves, each of which is again
//! guillotine-cuttable, down to single pieces. Rectangles passed here are
//! kerf-inflated footprints, so touching edges are legal cut lines.

use crate::types::{EPS, Rect};

/// Smallest rectangle enclosing all of `rects`.
pub fn bounding_box(rects: &[Rect]) -> Option<Rect> {
    let first = rects.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.right(), first.bottom());
    for r in &rects[1..] {
        x0 = x0.min(r.x);
        y0 = y0.min(r.y);
        x1 = x1.max(r.right());
        y1 = y1.max(r.bottom());
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

pub fn is_separable(rects: &[Rect]) -> bool {
    match bounding_box(rects) {
        Some(bounds) => is_separable_within(bounds, rects),
        None => true,
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Vertical,
    Horizontal,
}

impl Axis {
    fn span(self, r: &Rect) -> (f64, f64) {
        match self {
            Axis::Vertical => (r.x, r.right()),
            Axis::Horizontal => (r.y, r.bottom()),
        }
    }

    fn halves(self, bounds: Rect, at: f64) -> (Rect, Rect) {
        match self {
            Axis::Vertical => (
                Rect::new(bounds.x, bounds.y, at - bounds.x, bounds.width),
                Rect::new(at, bounds.y, bounds.right() - at, bounds.width),
            ),
            Axis::Horizontal => (
                Rect::new(bounds.x, bounds.y, bounds.length, at - bounds.y),
                Rect::new(bounds.x, at, bounds.length, bounds.bottom() - at),
            ),
        }
    }
}

/// Recursive check on working rectangle `bounds`.
///
/// Cuts are only tried at piece edges strictly inside `bounds`. Any clean
/// cut is as good as any other: a sub-layout of a guillotine layout is
/// itself guillotine, so the first cut with both sides occupied decides.
pub fn is_separable_within(bounds: Rect, rects: &[Rect]) -> bool {
    if rects.len() <= 1 {
        return true;
    }
    for axis in [Axis::Vertical, Axis::Horizontal] {
        if let Some((first, second, at)) = clean_cut(axis, bounds, rects) {
            let (lo, hi) = axis.halves(bounds, at);
            return is_separable_within(lo, &first) && is_separable_within(hi, &second);
        }
    }
    false
}

fn clean_cut(axis: Axis, bounds: Rect, rects: &[Rect]) -> Option<(Vec<Rect>, Vec<Rect>, f64)> {
    let (lo, hi) = axis.span(&bounds);
    let mut cuts: Vec<f64> = rects
        .iter()
        .flat_map(|r| {
            let (a, b) = axis.span(r);
            [a, b]
        })
        .filter(|&c| c > lo + EPS && c < hi - EPS)
        .collect();
    cuts.sort_by(f64::total_cmp);
    cuts.dedup_by(|a, b| (*a - *b).abs() <= EPS);

    for at in cuts {
        let straddles = rects.iter().any(|r| {
            let (a, b) = axis.span(r);
            a < at - EPS && b > at + EPS
        });
        if straddles {
            continue;
        }
        let (first, second): (Vec<Rect>, Vec<Rect>) =
            rects.iter().partition(|r| axis.span(r).1 <= at + EPS);
        if !first.is_empty() && !second.is_empty() {
            return Some((first, second, at));
        }
    }
    None
}

/// Whether `candidate` can join `placed` inside `bounds` without leaving
/// the board, overlapping, or breaking guillotine feasibility.
pub fn admits(bounds: Rect, placed: &[Rect], candidate: Rect) -> bool {
    if !bounds.contains(&candidate) {
        return false;
    }
    if placed.iter().any(|p| p.overlaps(&candidate)) {
        return false;
    }
    let mut all = Vec::with_capacity(placed.len() + 1);
    all.extend_from_slice(placed);
    all.push(candidate);
    is_separable_within(bounds, &all)
}
