//! Geometry repair for patch polygons.
//!
//! Raster-derived polygons are rectilinear and almost always valid, but
//! two diagonally touching background cells make the boundary tracer
//! produce a ring that touches itself at a single vertex, and polygons
//! read from disk may carry duplicate vertices, spikes, or bow-ties.
//! Sanitizing rebuilds every patch from its rings:
//!
//! 1. Orient rings (exteriors counter-clockwise, interiors clockwise).
//! 2. Drop consecutive duplicates and zero-width spikes.
//! 3. Node intersections so that every crossing or touching point is a
//!    vertex of both segments involved.
//! 4. Split each ring at repeated vertices into simple sub-rings.
//! 5. Drop zero-area rings and reassemble: counter-clockwise rings become
//!    shells, clockwise rings become holes of the smallest shell that
//!    contains them.
//!
//! 6. Union the polygons of a patch when any two of them overlap with
//!    positive area, so overlapping shells are not counted twice.
//!
//! Patches with no area left are dropped and reported. Polygons that only
//! touch along edges or at corners are kept apart.
//!
//! This is step 4 in the pipeline.

use std::collections::HashMap;

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{BooleanOps, BoundingRect, Coord, Line, LineString, MultiPolygon, Polygon, Rect};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};

use crate::metrics::{measure, signed_ring_area};
use crate::types::{Patch, PatchId};

/// Rings whose area is below this fraction of their squared bounding-box
/// size are treated as zero-area.
const ZERO_AREA_EPSILON: f64 = 1e-12;

/// A segment of ring `.0`, starting at vertex `.1`.
type IndexedSegment = GeomWithData<Line<f64>, (usize, usize)>;

/// Bounding box of polygon `.data`.
type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Output of [`sanitize_patches`].
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeReport {
    /// Patches with valid, non-empty geometry, in input order.
    pub patches: Vec<Patch>,
    /// Ids of patches removed because no area survived repair.
    pub dropped: Vec<PatchId>,
    /// Number of kept patches whose rings had to be changed.
    pub repaired: usize,
}

/// Repair every patch, dropping those left without area.
#[must_use = "returns the sanitized patches"]
pub fn sanitize_patches(patches: Vec<Patch>) -> SanitizeReport {
    let repaired: Vec<(Patch, bool)> = patches
        .into_par_iter()
        .map(|patch| {
            let (geometry, changed) = sanitize_geometry(&patch.geometry);
            (
                Patch {
                    id: patch.id,
                    geometry,
                },
                changed,
            )
        })
        .collect();

    let mut out = SanitizeReport {
        patches: Vec::with_capacity(repaired.len()),
        dropped: Vec::new(),
        repaired: 0,
    };
    for (patch, changed) in repaired {
        if patch.geometry.0.is_empty() {
            tracing::warn!(patch_id = patch.id, "dropping patch with no area after repair");
            out.dropped.push(patch.id);
            continue;
        }
        out.repaired += usize::from(changed);
        out.patches.push(patch);
    }
    tracing::debug!(
        kept = out.patches.len(),
        dropped = out.dropped.len(),
        repaired = out.repaired,
        "sanitized patches"
    );
    out
}

/// Repair one multi-polygon.
///
/// Returns the rebuilt geometry and whether any ring had to change. The
/// result is empty when nothing with area remains.
#[must_use]
pub fn sanitize_geometry(geometry: &MultiPolygon<f64>) -> (MultiPolygon<f64>, bool) {
    let mut changed = false;
    let mut rings = Vec::new();
    for polygon in geometry {
        rings.push(oriented(polygon.exterior(), true));
        rings.extend(polygon.interiors().iter().map(|hole| oriented(hole, false)));
    }

    for ring in &mut rings {
        let cleaned = clean_ring(ring);
        changed |= cleaned.len() != ring.len();
        *ring = cleaned;
    }

    changed |= node_rings(&mut rings) > 0;

    let mut simple = Vec::with_capacity(rings.len());
    for ring in rings {
        let parts = split_at_repeats(ring);
        changed |= parts.len() > 1;
        simple.extend(parts);
    }

    let before = simple.len();
    simple.retain(|ring| !is_degenerate(ring));
    changed |= simple.len() != before;

    let (geometry, merged) = merge_overlaps(assemble_rings(simple));
    (geometry, changed || merged)
}

/// Union all polygons if any two of them share interior area.
fn merge_overlaps(geometry: MultiPolygon<f64>) -> (MultiPolygon<f64>, bool) {
    if geometry.0.len() < 2 {
        return (geometry, false);
    }
    let polygons = &geometry.0;
    let bounds: Vec<Option<Rect<f64>>> = polygons.iter().map(BoundingRect::bounding_rect).collect();
    let tree: RTree<IndexedBox> = RTree::bulk_load(
        bounds
            .iter()
            .enumerate()
            .filter_map(|(i, rect)| {
                rect.map(|r| {
                    GeomWithData::new(
                        Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
                        i,
                    )
                })
            })
            .collect(),
    );
    let tolerance = measure(&geometry).0 * ZERO_AREA_EPSILON;
    let overlapping = tree
        .intersection_candidates_with_other_tree(&tree)
        .filter(|(a, b)| a.data < b.data)
        .filter(|(a, b)| match (bounds[a.data], bounds[b.data]) {
            (Some(ra), Some(rb)) => rects_overlap(&ra, &rb),
            _ => false,
        })
        .any(|(a, b)| measure(&polygons[a.data].intersection(&polygons[b.data])).0 > tolerance);
    if !overlapping {
        return (geometry, false);
    }

    let mut parts = geometry.0.into_iter();
    let Some(first) = parts.next() else {
        return (MultiPolygon::new(Vec::new()), true);
    };
    let union = parts.fold(MultiPolygon::new(vec![first]), |acc, polygon| acc.union(&polygon));
    let polygons = union
        .into_iter()
        .map(|polygon| {
            let (exterior, interiors) = polygon.into_inner();
            Polygon::new(
                LineString::from(oriented(&exterior, true)),
                interiors
                    .iter()
                    .map(|hole| LineString::from(oriented(hole, false)))
                    .collect(),
            )
        })
        .collect();
    (MultiPolygon::new(polygons), true)
}

/// Whether two boxes share interior area, not just an edge or corner.
fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

/// Open ring coordinates, oriented counter-clockwise for exteriors and
/// clockwise for holes.
fn oriented(ring: &LineString<f64>, exterior: bool) -> Vec<Coord<f64>> {
    let mut coords = ring.0.clone();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    let area = signed_ring_area(&coords);
    if (exterior && area < 0.0) || (!exterior && area > 0.0) {
        coords.reverse();
    }
    coords
}

/// Remove consecutive duplicates and `a, b, a` spikes, including across
/// the ring's closing seam.
fn clean_ring(ring: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(ring.len());
    for &c in ring {
        if out.last() == Some(&c) {
            continue;
        }
        if out.len() >= 2 && out[out.len() - 2] == c {
            out.pop();
            continue;
        }
        out.push(c);
    }

    while out.len() >= 3 {
        let n = out.len();
        if out[0] == out[n - 1] || out[n - 2] == out[0] {
            out.pop();
        } else if out[n - 1] == out[1] {
            out.remove(0);
        } else {
            break;
        }
    }
    out
}

/// Insert a vertex at every point where two segments cross or touch.
///
/// Returns the number of vertices inserted.
fn node_rings(rings: &mut [Vec<Coord<f64>>]) -> usize {
    let segments: Vec<IndexedSegment> = rings
        .iter()
        .enumerate()
        .flat_map(|(r, ring)| {
            let n = ring.len();
            (0..n).map(move |i| GeomWithData::new(Line::new(ring[i], ring[(i + 1) % n]), (r, i)))
        })
        .filter(|s| s.geom().start != s.geom().end)
        .collect();
    let tree = RTree::bulk_load(segments);

    let mut splits: HashMap<(usize, usize), Vec<Coord<f64>>> = HashMap::new();
    for (a, b) in tree.intersection_candidates_with_other_tree(&tree) {
        if a.data >= b.data {
            continue;
        }
        let adjacent = a.data.0 == b.data.0 && {
            let n = rings[a.data.0].len();
            b.data.1 == a.data.1 + 1 || (a.data.1 == 0 && b.data.1 == n - 1)
        };
        match line_intersection(*a.geom(), *b.geom()) {
            None => {}
            Some(LineIntersection::SinglePoint { intersection, .. }) => {
                if !adjacent {
                    add_split(&mut splits, a, intersection);
                    add_split(&mut splits, b, intersection);
                }
            }
            Some(LineIntersection::Collinear { intersection }) => {
                for p in [intersection.start, intersection.end] {
                    add_split(&mut splits, a, p);
                    add_split(&mut splits, b, p);
                }
            }
        }
    }

    let mut inserted = 0;
    for (r, ring) in rings.iter_mut().enumerate() {
        let n = ring.len();
        if !(0..n).any(|i| splits.contains_key(&(r, i))) {
            continue;
        }
        let mut noded = Vec::with_capacity(n);
        for i in 0..n {
            let start = ring[i];
            noded.push(start);
            if let Some(points) = splits.get_mut(&(r, i)) {
                let distance = |p: &Coord<f64>| {
                    let d = *p - start;
                    d.x.hypot(d.y)
                };
                points.sort_by(|p, q| distance(p).total_cmp(&distance(q)));
                points.dedup();
                inserted += points.len();
                noded.extend(points.iter().copied());
            }
        }
        *ring = noded;
    }
    inserted
}

/// Record `p` as a split point of `segment` unless it is an endpoint.
fn add_split(
    splits: &mut HashMap<(usize, usize), Vec<Coord<f64>>>,
    segment: &IndexedSegment,
    p: Coord<f64>,
) {
    let line = segment.geom();
    if p != line.start && p != line.end {
        splits.entry(segment.data).or_default().push(p);
    }
}

/// Bit pattern of a coordinate, with `-0.0` folded into `0.0`.
fn vertex_key(c: Coord<f64>) -> (u64, u64) {
    ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits())
}

/// Split an open ring at every repeated vertex into rings that visit each
/// vertex once.
fn split_at_repeats(ring: Vec<Coord<f64>>) -> Vec<Vec<Coord<f64>>> {
    let mut parts = Vec::new();
    let mut stack: Vec<Coord<f64>> = Vec::with_capacity(ring.len());
    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();

    for c in ring {
        let key = vertex_key(c);
        if let Some(&pos) = seen.get(&key) {
            let part = stack.split_off(pos);
            for v in &part {
                seen.remove(&vertex_key(*v));
            }
            parts.push(part);
        }
        seen.insert(key, stack.len());
        stack.push(c);
    }
    parts.push(stack);
    parts
}

/// Whether an open ring encloses no meaningful area.
fn is_degenerate(ring: &[Coord<f64>]) -> bool {
    if ring.len() < 3 {
        return true;
    }
    let (mut min, mut max) = (ring[0], ring[0]);
    for c in ring {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    let size = (max.x - min.x).max(max.y - min.y);
    signed_ring_area(ring).abs() <= ZERO_AREA_EPSILON * size * size
}

/// Assemble simple open rings into polygons.
///
/// Counter-clockwise rings are shells. Each clockwise ring becomes a hole
/// of the smallest shell containing it; a clockwise ring outside every
/// shell is reversed into a shell of its own. Zero-area rings are ignored.
pub(crate) fn assemble_rings(rings: Vec<Vec<Coord<f64>>>) -> MultiPolygon<f64> {
    struct Shell {
        polygon: Polygon<f64>,
        bounds: Bounds,
        area: f64,
        holes: Vec<LineString<f64>>,
    }

    let mut shells = Vec::new();
    let mut holes = Vec::new();
    for ring in rings {
        if is_degenerate(&ring) {
            continue;
        }
        let area = signed_ring_area(&ring);
        if area > 0.0 {
            shells.push(Shell {
                bounds: Bounds::of(&ring),
                polygon: Polygon::new(LineString::from(ring), Vec::new()),
                area,
                holes: Vec::new(),
            });
        } else {
            holes.push(ring);
        }
    }

    let mut orphans = Vec::new();
    for hole in holes {
        let bounds = Bounds::of(&hole);
        let parent = shells
            .iter()
            .enumerate()
            .filter(|(_, s)| s.bounds.contains(&bounds) && encloses(&s.polygon, &hole))
            .min_by(|(_, a), (_, b)| a.area.total_cmp(&b.area))
            .map(|(i, _)| i);
        match parent {
            Some(i) => shells[i].holes.push(LineString::from(hole)),
            None => orphans.push(hole),
        }
    }

    let mut polygons: Vec<Polygon<f64>> = shells
        .into_iter()
        .map(|s| {
            let (exterior, _) = s.polygon.into_inner();
            Polygon::new(exterior, s.holes)
        })
        .collect();
    polygons.extend(orphans.into_iter().map(|mut ring| {
        ring.reverse();
        Polygon::new(LineString::from(ring), Vec::new())
    }));
    MultiPolygon::new(polygons)
}

/// Whether `shell` encloses `ring`, judged at the first vertex or edge
/// midpoint of `ring` that is not on the shell boundary.
fn encloses(shell: &Polygon<f64>, ring: &[Coord<f64>]) -> bool {
    let n = ring.len();
    let midpoints = (0..n).map(|i| {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        Coord {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    });
    ring.iter()
        .copied()
        .chain(midpoints)
        .map(|p| shell.coordinate_position(&p))
        .find(|pos| *pos != CoordPos::OnBoundary)
        == Some(CoordPos::Inside)
}

/// Axis-aligned bounds of an open ring.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: Coord<f64>,
    max: Coord<f64>,
}

impl Bounds {
    fn of(ring: &[Coord<f64>]) -> Self {
        let mut bounds = Self {
            min: Coord {
                x: f64::INFINITY,
                y: f64::INFINITY,
            },
            max: Coord {
                x: f64::NEG_INFINITY,
                y: f64::NEG_INFINITY,
            },
        };
        for c in ring {
            bounds.min.x = bounds.min.x.min(c.x);
            bounds.min.y = bounds.min.y.min(c.y);
            bounds.max.x = bounds.max.x.max(c.x);
            bounds.max.y = bounds.max.y.max(c.y);
        }
        bounds
    }

    fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{Area, coord, polygon};

    use super::*;

    fn patch(id: PatchId, polygon: Polygon<f64>) -> Patch {
        Patch {
            id,
            geometry: MultiPolygon::new(vec![polygon]),
        }
    }

    fn total_area(mp: &MultiPolygon<f64>) -> f64 {
        mp.unsigned_area()
    }

    #[test]
    fn valid_polygon_is_unchanged() {
        let square = polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 4.0, y: 0.0),
                (x: 4.0, y: 4.0),
                (x: 0.0, y: 4.0),
            ],
            interiors: [[
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 2.0),
                (x: 2.0, y: 2.0),
                (x: 2.0, y: 1.0),
            ]],
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![square]));
        assert!(!changed);
        assert_eq!(fixed.0.len(), 1);
        assert_eq!(fixed.0[0].interiors().len(), 1);
        assert!((total_area(&fixed) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn clockwise_exterior_is_reoriented() {
        let cw = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
        ];
        let (fixed, _) = sanitize_geometry(&MultiPolygon::new(vec![cw]));
        assert_eq!(fixed.0.len(), 1);
        assert!(signed_ring_area(&fixed.0[0].exterior().0) > 0.0);
    }

    #[test]
    fn duplicate_vertices_and_spikes_are_removed() {
        let spiky = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![spiky]));
        assert!(changed);
        assert_eq!(fixed.0.len(), 1);
        // Closed ring of five distinct vertices.
        assert_eq!(fixed.0[0].exterior().0.len(), 6);
        assert!((total_area(&fixed) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn bow_tie_is_split_into_two_triangles() {
        let bow_tie = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![bow_tie]));
        assert!(changed);
        assert_eq!(fixed.0.len(), 2);
        assert!((total_area(&fixed) - 2.0).abs() < 1e-12);
        for polygon in &fixed {
            assert!(signed_ring_area(&polygon.exterior().0) > 0.0);
        }
    }

    #[test]
    fn self_touching_ring_becomes_shell_with_hole() {
        // 3x3 block missing its centre and bottom-right cell: the outline
        // touches the hole at (2, 1).
        let ring = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 3.0, y: 3.0),
            (x: 0.0, y: 3.0),
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![ring]));
        assert!(changed);
        assert_eq!(fixed.0.len(), 1);
        assert_eq!(fixed.0[0].interiors().len(), 1);
        assert!((total_area(&fixed) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn collinear_backtrack_is_removed() {
        let ring = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 3.0),
            (x: 4.0, y: 2.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![ring]));
        assert!(changed);
        assert_eq!(fixed.0.len(), 1);
        assert!((total_area(&fixed) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn hole_outside_shell_becomes_its_own_polygon() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            vec![LineString::from(vec![
                (5.0, 5.0),
                (5.0, 6.0),
                (6.0, 6.0),
                (6.0, 5.0),
            ])],
        );
        let (fixed, _) = sanitize_geometry(&MultiPolygon::new(vec![polygon]));
        assert_eq!(fixed.0.len(), 2);
        assert!(fixed.iter().all(|p| p.interiors().is_empty()));
        assert!((total_area(&fixed) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nested_island_is_kept_separate() {
        let with_hole = polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ],
            interiors: [[
                (x: 2.0, y: 2.0),
                (x: 2.0, y: 8.0),
                (x: 8.0, y: 8.0),
                (x: 8.0, y: 2.0),
            ]],
        ];
        let island = polygon![
            (x: 4.0, y: 4.0),
            (x: 6.0, y: 4.0),
            (x: 6.0, y: 6.0),
            (x: 4.0, y: 6.0),
        ];
        let (fixed, changed) = sanitize_geometry(&MultiPolygon::new(vec![with_hole, island]));
        assert!(!changed);
        assert_eq!(fixed.0.len(), 2);
        assert_eq!(fixed.0[0].interiors().len(), 1);
        assert!((total_area(&fixed) - 68.0).abs() < 1e-12);
    }

    fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]
    }

    #[test]
    fn overlapping_shells_are_unioned() {
        let (fixed, changed) =
            sanitize_geometry(&MultiPolygon::new(vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)]));
        assert!(changed);
        assert_eq!(fixed.0.len(), 1);
        assert!(signed_ring_area(&fixed.0[0].exterior().0) > 0.0);
        assert!((total_area(&fixed) - 6.0).abs() < 1e-9);
        assert!((measure(&fixed).1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn corner_touching_shells_stay_apart() {
        let (fixed, changed) =
            sanitize_geometry(&MultiPolygon::new(vec![square(0.0, 0.0, 1.0), square(1.0, 1.0, 1.0)]));
        assert!(!changed);
        assert_eq!(fixed.0.len(), 2);
    }

    #[test]
    fn overlapping_shells_conserve_area_across_grids() {
        let patches = vec![Patch {
            id: 1,
            geometry: MultiPolygon::new(vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)]),
        }];
        for spacing in [10.0, 1.5, 0.7] {
            let result =
                crate::process_patches(patches.clone(), crate::PipelineConfig::new("1", spacing))
                    .unwrap();
            let total: f64 = result.summaries.iter().map(|s| s.surface).sum();
            assert!((total - 6.0).abs() < 1e-9, "spacing {spacing}: {total}");
        }
    }

    #[test]
    fn zero_area_patch_is_dropped() {
        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]),
            Vec::new(),
        );
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let out = sanitize_patches(vec![patch(1, flat), patch(2, square)]);
        assert_eq!(out.dropped, vec![1]);
        assert_eq!(out.patches.len(), 1);
        assert_eq!(out.patches[0].id, 2);
        assert_eq!(out.repaired, 0);
    }

    #[test]
    fn split_at_repeats_separates_loops() {
        let ring = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 2.0, y: 1.0 },
            coord! { x: 2.0, y: 2.0 },
            coord! { x: 1.0, y: 2.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 0.0, y: 1.0 },
        ];
        let parts = split_at_repeats(ring);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[1].len(), 4);
    }

    #[test]
    fn negative_zero_matches_positive_zero() {
        assert_eq!(
            vertex_key(coord! { x: -0.0, y: 1.0 }),
            vertex_key(coord! { x: 0.0, y: 1.0 })
        );
    }
}
