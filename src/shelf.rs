//! Shelf planning: decides the order in which parts are fed to the shelf
//! heuristic so that each shelf is filled by parts of similar height.

use crate::types::{EPS, PartUnit};

const HEIGHT_CANDIDATES: usize = 5;

/// (length, height) of a part laid flat on a shelf.
fn flat_dims(part: &PartUnit) -> (f64, f64) {
    if part.grain_sensitive {
        (part.length, part.width)
    } else {
        (part.length.max(part.width), part.length.min(part.width))
    }
}

struct Shelf {
    members: Vec<usize>,
    utilization: f64,
}

/// Fill one shelf of height `height` (kerf included) starting with `lead`.
fn fill_shelf(parts: &[PartUnit], lead: usize, height: f64, length: f64, kerf: f64) -> Shelf {
    let mut order: Vec<usize> = (0..parts.len()).filter(|&i| i != lead).collect();
    order.sort_by(|&a, &b| flat_dims(&parts[b]).0.total_cmp(&flat_dims(&parts[a]).0));

    let mut members = vec![lead];
    let mut x = flat_dims(&parts[lead]).0 + kerf;
    let mut area = parts[lead].area();
    for i in order {
        let (fl, fh) = flat_dims(&parts[i]);
        if fh + kerf <= height + EPS && x + fl + kerf <= length + EPS {
            members.push(i);
            x += fl + kerf;
            area += parts[i].area();
        }
    }
    Shelf {
        members,
        utilization: area / (length * height),
    }
}

/// Order `parts` shelf by shelf for a `length` x `width` board.
///
/// Each shelf height is picked among the tallest few distinct part heights
/// that still fit, keeping the one whose shelf is most densely filled. When
/// the board is used up planning starts over on a fresh board. Parts that
/// cannot lie flat on any shelf come last.
pub fn plan_order(parts: Vec<PartUnit>, length: f64, width: f64, kerf: f64) -> Vec<PartUnit> {
    let (mut remaining, mut misfits): (Vec<PartUnit>, Vec<PartUnit>) =
        parts.into_iter().partition(|p| {
            let (fl, fh) = flat_dims(p);
            fl + kerf <= length + EPS && fh + kerf <= width + EPS
        });
    remaining.sort_by(|a, b| b.area().total_cmp(&a.area()));

    let mut out = Vec::with_capacity(remaining.len() + misfits.len());
    let mut height_left = width;

    while !remaining.is_empty() {
        let mut heights: Vec<(f64, usize)> = remaining
            .iter()
            .enumerate()
            .map(|(i, p)| (flat_dims(p).1 + kerf, i))
            .filter(|&(h, _)| h <= height_left + EPS)
            .collect();
        heights.sort_by(|a, b| b.0.total_cmp(&a.0));
        heights.dedup_by(|a, b| (a.0 - b.0).abs() <= EPS);
        heights.truncate(HEIGHT_CANDIDATES);

        if heights.is_empty() {
            // board exhausted; remaining parts go to the next one
            height_left = width;
            continue;
        }

        let mut best: Option<(Shelf, f64)> = None;
        for &(h, lead) in &heights {
            let shelf = fill_shelf(&remaining, lead, h, length, kerf);
            if best
                .as_ref()
                .is_none_or(|(b, _)| shelf.utilization > b.utilization + EPS)
            {
                best = Some((shelf, h));
            }
        }
        let Some((shelf, h)) = best else { break };

        let mut taken: Vec<Option<PartUnit>> = remaining.into_iter().map(Some).collect();
        for &i in &shelf.members {
            if let Some(p) = taken[i].take() {
                out.push(p);
            }
        }
        remaining = taken.into_iter().flatten().collect();
        height_left -= h;
    }

    out.append(&mut misfits);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialSpec;

    fn part(id: &str, l: f64, w: f64) -> PartUnit {
        PartUnit::new(id, l, w, MaterialSpec::parse("SF_18MR_SF").unwrap())
    }

    fn ids(parts: &[PartUnit]) -> Vec<&str> {
        parts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_groups_equal_heights() {
        let parts = vec![
            part("tall1", 400.0, 500.0),
            part("low1", 900.0, 200.0),
            part("tall2", 500.0, 400.0),
            part("low2", 800.0, 200.0),
        ];
        let ordered = plan_order(parts, 1000.0, 1000.0, 0.0);
        assert_eq!(ordered.len(), 4);
        // 400-high shelf holds both tall parts laid flat (500 + 500 = 1000)
        assert_eq!(ids(&ordered[..2]), vec!["tall1", "tall2"]);
    }

    #[test]
    fn test_grain_sensitive_keeps_orientation() {
        let mut p = part("g", 200.0, 600.0);
        p.grain_sensitive = true;
        assert_eq!(flat_dims(&p), (200.0, 600.0));
        assert_eq!(flat_dims(&part("f", 200.0, 600.0)), (600.0, 200.0));
    }

    #[test]
    fn test_misfits_go_last_and_nothing_is_lost() {
        let mut parts = vec![part("huge", 3000.0, 100.0)];
        for i in 0..12 {
            parts.push(part(&format!("p{i}"), 300.0, 300.0));
        }
        let ordered = plan_order(parts, 1000.0, 1000.0, 4.4);
        assert_eq!(ordered.len(), 13);
        assert_eq!(ordered.last().unwrap().id, "huge");
    }
}
