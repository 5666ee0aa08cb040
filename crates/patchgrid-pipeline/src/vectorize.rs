//! Raster-to-polygon conversion of labeled patches.
//!
//! Every side of a patch cell whose neighbour carries a different label is
//! a directed boundary edge between two cell-grid vertices, oriented so
//! that the patch lies on its left. Edges are then chained into closed
//! rings. Where two diagonal cells of the same patch meet at a vertex,
//! four boundary edges share it; the tracer always prefers the left turn,
//! which keeps the diagonal parts as separate rings touching at a corner.
//!
//! Only direction changes become vertices, so a ring follows the cell
//! edges exactly without any simplification. Outer rings come out
//! counter-clockwise and hole rings clockwise in world coordinates.
//!
//! A pair of diagonally adjacent background cells can still fuse an outer
//! ring with a hole ring at their shared vertex. Such rings are valid in
//! area and perimeter but not simple; the sanitizer splits them.
//!
//! This is step 3 in the pipeline.

use std::collections::{BTreeMap, HashMap};

use geo::Coord;
use rayon::prelude::*;

use crate::sanitize::assemble_rings;
use crate::types::{BACKGROUND, GeoTransform, LabelRaster, Patch, PatchId};

/// Cell-grid vertex as `(col, row)`.
type Vertex = (u32, u32);

/// Direction of a boundary edge in world space (north is up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    East,
    North,
    West,
    South,
}

impl Heading {
    const fn left(self) -> Self {
        match self {
            Self::East => Self::North,
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
        }
    }

    const fn right(self) -> Self {
        match self {
            Self::East => Self::South,
            Self::North => Self::East,
            Self::West => Self::North,
            Self::South => Self::West,
        }
    }

    /// Vertex one step from `v` in this direction. Rows grow southward.
    const fn step(self, (col, row): Vertex) -> Vertex {
        match self {
            Self::East => (col + 1, row),
            Self::North => (col, row - 1),
            Self::West => (col - 1, row),
            Self::South => (col, row + 1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    heading: Heading,
}

impl Edge {
    const fn to(self) -> Vertex {
        self.heading.step(self.from)
    }
}

/// Convert every patch of a labeled raster into polygons.
///
/// Returns one [`Patch`] per distinct non-zero label, ordered by label.
#[must_use = "returns the vectorized patches"]
pub fn vectorize(labels: &LabelRaster) -> Vec<Patch> {
    let transform = *labels.transform();
    let groups: Vec<(PatchId, Vec<Edge>)> = boundary_edges(labels).into_iter().collect();

    let patches: Vec<Patch> = groups
        .into_par_iter()
        .map(|(id, edges)| {
            let rings = trace_rings(&edges)
                .into_iter()
                .map(|ring| to_world(&ring, &transform))
                .collect();
            Patch {
                id,
                geometry: assemble_rings(rings),
            }
        })
        .collect();

    tracing::debug!(patches = patches.len(), "vectorized patches");
    patches
}

/// Directed boundary edges of every patch, keyed by label.
fn boundary_edges(labels: &LabelRaster) -> BTreeMap<PatchId, Vec<Edge>> {
    let width = labels.width();
    let height = labels.height();
    let cells = labels.cells();
    let w = width as usize;

    let mut edges: BTreeMap<PatchId, Vec<Edge>> = BTreeMap::new();
    for row in 0..height {
        for col in 0..width {
            let i = row as usize * w + col as usize;
            let label = cells[i];
            if label == BACKGROUND {
                continue;
            }
            let above = row > 0 && cells[i - w] == label;
            let below = row + 1 < height && cells[i + w] == label;
            let left = col > 0 && cells[i - 1] == label;
            let right = col + 1 < width && cells[i + 1] == label;
            if above && below && left && right {
                continue;
            }

            let patch = edges.entry(label).or_default();
            if !below {
                patch.push(Edge {
                    from: (col, row + 1),
                    heading: Heading::East,
                });
            }
            if !right {
                patch.push(Edge {
                    from: (col + 1, row + 1),
                    heading: Heading::North,
                });
            }
            if !above {
                patch.push(Edge {
                    from: (col + 1, row),
                    heading: Heading::West,
                });
            }
            if !left {
                patch.push(Edge {
                    from: (col, row),
                    heading: Heading::South,
                });
            }
        }
    }
    edges
}

/// Chain one patch's edges into closed rings of corner vertices.
fn trace_rings(edges: &[Edge]) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let next_edge = |edge: Edge| -> Option<usize> {
        let candidates = outgoing.get(&edge.to())?;
        [edge.heading.left(), edge.heading, edge.heading.right()]
            .into_iter()
            .find_map(|h| candidates.iter().copied().find(|&j| edges[j].heading == h))
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            let edge = edges[current];
            let Some(next) = next_edge(edge) else {
                break;
            };
            if edges[next].heading != edge.heading {
                ring.push(edge.to());
            }
            if next == start || used[next] {
                break;
            }
            current = next;
        }
        rings.push(ring);
    }
    rings
}

fn to_world(ring: &[Vertex], transform: &GeoTransform) -> Vec<Coord<f64>> {
    ring.iter().map(|&(col, row)| transform.vertex(col, row)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{Area, MultiPolygon};

    use super::*;
    use crate::metrics::{measure, signed_ring_area};
    use crate::types::{Dimensions, Raster};

    fn labels(rows: &[&[PatchId]], transform: GeoTransform) -> LabelRaster {
        let height = u32::try_from(rows.len()).unwrap();
        let width = u32::try_from(rows[0].len()).unwrap();
        let cells = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Raster::new(Dimensions { width, height }, transform, cells).unwrap()
    }

    fn area(mp: &MultiPolygon<f64>) -> f64 {
        measure(mp).0
    }

    #[test]
    fn single_cell_is_a_square() {
        let t = GeoTransform::new(100.0, 200.0, 10.0, 10.0);
        let patches = vectorize(&labels(&[&[1]], t));
        assert_eq!(patches.len(), 1);
        let polygon = &patches[0].geometry.0[0];
        // Four corners plus the closing vertex.
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(signed_ring_area(&polygon.exterior().0) > 0.0);
        assert!((area(&patches[0].geometry) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn l_shape_has_six_corners() {
        let t = GeoTransform::new(0.0, 40.0, 10.0, 10.0);
        let patches = vectorize(&labels(
            &[&[1, 0, 0, 0], &[1, 0, 0, 0], &[1, 0, 0, 0], &[1, 1, 0, 0]],
            t,
        ));
        assert_eq!(patches.len(), 1);
        let geometry = &patches[0].geometry;
        assert_eq!(geometry.0.len(), 1);
        assert_eq!(geometry.0[0].exterior().0.len(), 7);
        let (a, p) = measure(geometry);
        assert!((a - 500.0).abs() < 1e-9);
        assert!((p - 120.0).abs() < 1e-9);
        assert!((geometry.unsigned_area() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn enclosed_background_becomes_hole() {
        let patches = vectorize(&labels(
            &[&[1, 1, 1], &[1, 0, 1], &[1, 1, 1]],
            GeoTransform::identity(),
        ));
        let geometry = &patches[0].geometry;
        assert_eq!(geometry.0.len(), 1);
        assert_eq!(geometry.0[0].interiors().len(), 1);
        assert!(signed_ring_area(&geometry.0[0].interiors()[0].0) < 0.0);
        let (a, p) = measure(geometry);
        assert!((a - 8.0).abs() < 1e-12);
        assert!((p - 16.0).abs() < 1e-12);
    }

    #[test]
    fn diagonal_cells_stay_separate_polygons() {
        let patches = vectorize(&labels(
            &[&[0, 1, 0], &[1, 0, 1], &[0, 1, 0]],
            GeoTransform::identity(),
        ));
        assert_eq!(patches.len(), 1);
        let geometry = &patches[0].geometry;
        assert_eq!(geometry.0.len(), 4);
        assert!(geometry.iter().all(|p| p.interiors().is_empty()));
        assert!((area(geometry) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn diagonal_background_fuses_outline_and_hole() {
        let patches = vectorize(&labels(
            &[&[1, 1, 1], &[1, 0, 1], &[1, 1, 0]],
            GeoTransform::identity(),
        ));
        let (a, p) = measure(&patches[0].geometry);
        assert!((a - 7.0).abs() < 1e-12);
        assert!((p - 16.0).abs() < 1e-12);
    }

    #[test]
    fn patches_are_ordered_by_label() {
        let patches = vectorize(&labels(
            &[&[3, 0, 1], &[0, 0, 0], &[2, 0, 0]],
            GeoTransform::identity(),
        ));
        let ids: Vec<PatchId> = patches.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn touching_labels_share_boundary() {
        let patches = vectorize(&labels(&[&[1, 1, 2, 2]], GeoTransform::identity()));
        assert_eq!(patches.len(), 2);
        assert!((area(&patches[0].geometry) - 2.0).abs() < 1e-12);
        assert!((area(&patches[1].geometry) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn full_raster_is_one_rectangle() {
        let rows: Vec<Vec<PatchId>> = vec![vec![1; 5]; 4];
        let refs: Vec<&[PatchId]> = rows.iter().map(Vec::as_slice).collect();
        let patches = vectorize(&labels(&refs, GeoTransform::new(0.0, 4.0, 1.0, 1.0)));
        let exterior = patches[0].geometry.0[0].exterior();
        assert_eq!(exterior.0.len(), 5);
        assert!((area(&patches[0].geometry) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn all_background_yields_nothing() {
        assert!(vectorize(&labels(&[&[0, 0], &[0, 0]], GeoTransform::identity())).is_empty());
    }
}
