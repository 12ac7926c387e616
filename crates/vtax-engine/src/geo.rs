//! # Point-in-Polygon
//!
//! Ray casting with the odd-crossing rule: cast a ray from the point toward
//! +longitude and count edge crossings; an odd count means inside.
//!
//! Arithmetic is exact [`Decimal`]; an edge whose intersection overflows is
//! treated as not crossed. Points exactly on an edge may fall either side.

use rust_decimal::Decimal;
use vtax_catalog::GeoPoint;

/// Whether `point` lies inside the closed ring `polygon`.
///
/// Rings with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].longitude, polygon[i].latitude);
        let (xj, yj) = (polygon[j].longitude, polygon[j].latitude);
        if (yi > y) != (yj > y) && crosses(x, y, xi, yi, xj, yj) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether the horizontal ray from `(x, y)` crosses edge `(xi, yi)-(xj, yj)`.
/// Caller guarantees `yi != yj`.
fn crosses(x: Decimal, y: Decimal, xi: Decimal, yi: Decimal, xj: Decimal, yj: Decimal) -> bool {
    let intersect = (xj - xi)
        .checked_mul(y - yi)
        .and_then(|n| n.checked_div(yj - yi))
        .and_then(|t| t.checked_add(xi));
    matches!(intersect, Some(ix) if x < ix)
}
