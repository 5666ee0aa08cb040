//! Fragment metrics: planar area and perimeter.
//!
//! Area is the shoelace formula over every ring (holes subtracted) and
//! perimeter is the summed length of every ring, holes included. Both
//! accumulate with Neumaier compensated summation, and the shoelace terms
//! are taken relative to the ring's first vertex so that large projected
//! coordinates (e.g. UTM northings) do not cancel catastrophically.
//!
//! This is step 7 in the pipeline, between overlay and aggregation.

use geo::{Coord, LineString, MultiPolygon, Polygon};

use crate::types::{MeasuredFragment, OverlayFragment};

/// Running sum with Neumaier error compensation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    /// Add a term.
    pub(crate) fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    /// Current compensated total.
    pub(crate) fn value(self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for CompensatedSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut total = Self::default();
        for v in iter {
            total.add(v);
        }
        total
    }
}

/// Signed area of a ring given as coordinates (closed or open).
///
/// Positive for counter-clockwise rings in a Y-up frame.
#[must_use]
pub fn signed_ring_area(coords: &[Coord<f64>]) -> f64 {
    let Some(&origin) = coords.first() else {
        return 0.0;
    };
    let n = coords.len();
    let twice: CompensatedSum = (0..n)
        .map(|i| {
            let a = coords[i] - origin;
            let b = coords[(i + 1) % n] - origin;
            a.x.mul_add(b.y, -(b.x * a.y))
        })
        .collect();
    twice.value() / 2.0
}

/// Length of a ring or line string.
#[must_use]
pub fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.lines()
        .map(|line| {
            let d = line.delta();
            d.x.hypot(d.y)
        })
        .collect::<CompensatedSum>()
        .value()
}

/// Area of a polygon with its holes subtracted.
///
/// Independent of ring orientation.
#[must_use]
pub fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    let mut total = CompensatedSum::default();
    total.add(signed_ring_area(&polygon.exterior().0).abs());
    for hole in polygon.interiors() {
        total.add(-signed_ring_area(&hole.0).abs());
    }
    total.value()
}

/// Perimeter of a polygon: exterior length plus every hole length.
#[must_use]
pub fn polygon_perimeter(polygon: &Polygon<f64>) -> f64 {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_length)
        .collect::<CompensatedSum>()
        .value()
}

/// Area and perimeter of a multi-polygon.
#[must_use]
pub fn measure(geometry: &MultiPolygon<f64>) -> (f64, f64) {
    let area: CompensatedSum = geometry.iter().map(polygon_area).collect();
    let perimeter: CompensatedSum = geometry.iter().map(polygon_perimeter).collect();
    (area.value(), perimeter.value())
}

/// Measure every fragment, preserving order.
#[must_use = "returns the measured fragments"]
pub fn measure_fragments(fragments: &[OverlayFragment]) -> Vec<MeasuredFragment> {
    fragments
        .iter()
        .map(|f| {
            let (area, perimeter) = measure(&f.geometry);
            MeasuredFragment {
                cell_id: f.cell_id,
                patch_id: f.patch_id,
                area,
                perimeter,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::{Area, coord, polygon};

    use super::*;

    #[test]
    fn unit_square_area_and_perimeter() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-12);
        assert!((polygon_perimeter(&square) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ring_orientation_sets_sign() {
        let ccw = [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 2.0, y: 0.0 },
            coord! { x: 2.0, y: 2.0 },
            coord! { x: 0.0, y: 2.0 },
        ];
        let mut cw = ccw;
        cw.reverse();
        assert!((signed_ring_area(&ccw) - 4.0).abs() < 1e-12);
        assert!((signed_ring_area(&cw) + 4.0).abs() < 1e-12);
    }

    #[test]
    fn hole_is_subtracted_and_counted_in_perimeter() {
        let with_hole = polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 3.0, y: 0.0),
                (x: 3.0, y: 3.0),
                (x: 0.0, y: 3.0),
            ],
            interiors: [[
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 2.0),
                (x: 2.0, y: 2.0),
                (x: 2.0, y: 1.0),
            ]],
        ];
        assert!((polygon_area(&with_hole) - 8.0).abs() < 1e-12);
        assert!((polygon_perimeter(&with_hole) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn agrees_with_geo_area_far_from_origin() {
        // UTM-like coordinates: 1 m cells near 5,000 km northing.
        let x0 = 699_960.0;
        let y0 = 5_000_040.0;
        let l_shape = polygon![
            (x: x0, y: y0),
            (x: x0 + 2.0, y: y0),
            (x: x0 + 2.0, y: y0 + 1.0),
            (x: x0 + 1.0, y: y0 + 1.0),
            (x: x0 + 1.0, y: y0 + 4.0),
            (x: x0, y: y0 + 4.0),
        ];
        let ours = polygon_area(&l_shape);
        assert!((ours - 5.0).abs() < 1e-9, "area = {ours}");
        assert!((ours - l_shape.unsigned_area()).abs() < 1e-6);
        assert!((polygon_perimeter(&l_shape) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn compensated_sum_keeps_small_terms() {
        let mut sum = CompensatedSum::default();
        sum.add(1e16);
        for _ in 0..10 {
            sum.add(1.0);
        }
        sum.add(-1e16);
        assert!((sum.value() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn measure_fragments_preserves_order() {
        let square = |x: f64| {
            MultiPolygon::new(vec![polygon![
                (x: x, y: 0.0),
                (x: x + 1.0, y: 0.0),
                (x: x + 1.0, y: 2.0),
                (x: x, y: 2.0),
            ]])
        };
        let fragments = vec![
            OverlayFragment {
                cell_id: 2,
                patch_id: 7,
                geometry: square(0.0),
            },
            OverlayFragment {
                cell_id: 1,
                patch_id: 3,
                geometry: square(5.0),
            },
        ];
        let measured = measure_fragments(&fragments);
        assert_eq!(measured.len(), 2);
        assert_eq!((measured[0].cell_id, measured[0].patch_id), (2, 7));
        assert_eq!((measured[1].cell_id, measured[1].patch_id), (1, 3));
        assert!((measured[0].area - 2.0).abs() < 1e-12);
        assert!((measured[1].perimeter - 6.0).abs() < 1e-12);
    }

    #[test]
    fn empty_ring_has_zero_area() {
        assert!(signed_ring_area(&[]).abs() < f64::EPSILON);
    }
}
