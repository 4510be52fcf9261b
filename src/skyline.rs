use crate::types::{EPS, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub length: f64,
}

impl Segment {
    fn right(&self) -> f64 {
        self.x + self.length
    }
}

/// Upper contour of the occupied area of a board, as seen along x.
///
/// Segments are sorted by `x`, contiguous, cover `[0, length)` and no two
/// neighbours share a height.
#[derive(Debug, Clone, PartialEq)]
pub struct Skyline {
    segments: Vec<Segment>,
}

impl Skyline {
    pub fn new(length: f64) -> Self {
        Self {
            segments: vec![Segment {
                x: 0.0,
                y: 0.0,
                length,
            }],
        }
    }

    pub fn from_footprints(length: f64, footprints: &[Rect]) -> Self {
        let mut skyline = Self::new(length);
        for r in footprints {
            skyline.raise(r.x, r.length, r.bottom());
        }
        skyline
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Highest segment under the span `[x, x + length)`.
    pub fn height_over(&self, x: f64, length: f64) -> f64 {
        let end = x + length;
        self.segments
            .iter()
            .filter(|s| s.x < end - EPS && s.right() > x + EPS)
            .map(|s| s.y)
            .fold(0.0, f64::max)
    }

    /// Lift the span `[x, x + length)` to at least `top`.
    pub fn raise(&mut self, x: f64, length: f64, top: f64) {
        let end = x + length;
        let mut next = Vec::with_capacity(self.segments.len() + 2);
        for s in &self.segments {
            if s.right() <= x + EPS || s.x >= end - EPS {
                next.push(*s);
                continue;
            }
            if s.x < x - EPS {
                next.push(Segment {
                    x: s.x,
                    y: s.y,
                    length: x - s.x,
                });
            }
            let lo = s.x.max(x);
            let hi = s.right().min(end);
            next.push(Segment {
                x: lo,
                y: s.y.max(top),
                length: hi - lo,
            });
            if s.right() > end + EPS {
                next.push(Segment {
                    x: end,
                    y: s.y,
                    length: s.right() - end,
                });
            }
        }
        self.segments = merge_level(next);
    }
}

fn merge_level(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for s in segments {
        match out.last_mut() {
            Some(last) if (last.y - s.y).abs() <= EPS => last.length = s.right() - last.x,
            _ => out.push(s),
        }
    }
    out
}
