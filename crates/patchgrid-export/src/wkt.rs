//! Well-known text for grid cell rectangles.

use patchgrid_pipeline::Extent;

/// `POLYGON` of a rectangle, counter-clockwise from its bottom-left corner.
#[must_use]
pub fn extent_polygon(extent: &Extent) -> String {
    let Extent {
        left,
        top,
        right,
        bottom,
    } = *extent;
    format!(
        "POLYGON (({left} {bottom}, {right} {bottom}, {right} {top}, {left} {top}, {left} {bottom}))"
    )
}
