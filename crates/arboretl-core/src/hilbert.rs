//! Hilbert curve index computation for spatially sorting rows.
//!
//! Points are scaled onto a 2^order x 2^order grid spanning the dataset
//! extent and ranked by their distance along the curve. Rows that are close
//! on the curve are close in space, which keeps row groups spatially
//! coherent after sorting.

use crate::geometry::BoundingBox;

/// Curve order used for row ordering. 2^16 cells per axis is fine-grained
/// enough that municipal datasets rarely collide on a cell.
pub const CURVE_ORDER: u32 = 16;

/// Distance along a Hilbert curve of the given order for grid cell (x, y).
///
/// Coordinates must be below `2^order`; the order must be at most 16 so the
/// distance fits comfortably in a `u64`.
#[must_use]
pub fn hilbert_index(order: u32, x: u32, y: u32) -> u64 {
    debug_assert!(order <= 16);
    let side: u32 = 1 << order;
    debug_assert!(x < side && y < side);

    let mut x = x;
    let mut y = y;
    let mut d: u64 = 0;
    let mut s = side / 2;
    while s > 0 {
        let rx = u32::from((x & s) > 0);
        let ry = u32::from((y & s) > 0);
        d += u64::from(s) * u64::from(s) * u64::from((3 * rx) ^ ry);
        rotate_quadrant(side, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d
}

// Rotate/flip the quadrant so the sub-curve has the canonical orientation.
fn rotate_quadrant(side: u32, x: &mut u32, y: &mut u32, rx: u32, ry: u32) {
    if ry == 0 {
        if rx == 1 {
            *x = side - 1 - *x;
            *y = side - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Curve distance for a point inside `extent`, on the order-16 grid.
///
/// Degenerate extents (zero width or height) collapse that axis to cell 0,
/// and points outside the extent clamp to the nearest edge cell.
#[must_use]
pub fn index_for_point(extent: &BoundingBox, x: f64, y: f64) -> u64 {
    let cx = cell(x, extent.min_x, extent.width());
    let cy = cell(y, extent.min_y, extent.height());
    hilbert_index(CURVE_ORDER, cx, cy)
}

fn cell(value: f64, min: f64, span: f64) -> u32 {
    let side = f64::from(1u32 << CURVE_ORDER);
    if span <= 0.0 || !value.is_finite() {
        return 0;
    }
    let scaled = ((value - min) / span * side).floor();
    scaled.clamp(0.0, side - 1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_one_visits_quadrants_in_curve_order() {
        assert_eq!(hilbert_index(1, 0, 0), 0);
        assert_eq!(hilbert_index(1, 0, 1), 1);
        assert_eq!(hilbert_index(1, 1, 1), 2);
        assert_eq!(hilbert_index(1, 1, 0), 3);
    }

    #[test]
    fn order_two_matches_reference_sequence() {
        let expected = [
            (0, 0),
            (1, 0),
            (1, 1),
            (0, 1),
            (0, 2),
            (0, 3),
            (1, 3),
            (1, 2),
            (2, 2),
            (2, 3),
            (3, 3),
            (3, 2),
            (3, 1),
            (2, 1),
            (2, 0),
            (3, 0),
        ];
        for (d, (x, y)) in expected.iter().enumerate() {
            assert_eq!(hilbert_index(2, *x, *y), d as u64, "cell ({x}, {y})");
        }
    }

    #[test]
    fn index_is_a_bijection_on_small_grids() {
        let order = 4;
        let side = 1u32 << order;
        let mut seen = vec![false; (side * side) as usize];
        for x in 0..side {
            for y in 0..side {
                let d = hilbert_index(order, x, y) as usize;
                assert!(!seen[d], "duplicate distance {d}");
                seen[d] = true;
            }
        }
        assert!(seen.iter().all(|v| *v));
    }

    #[test]
    fn consecutive_distances_are_adjacent_cells() {
        let order = 4;
        let side = 1u32 << order;
        let mut cells = vec![(0u32, 0u32); (side * side) as usize];
        for x in 0..side {
            for y in 0..side {
                cells[hilbert_index(order, x, y) as usize] = (x, y);
            }
        }
        for pair in cells.windows(2) {
            let (ax, ay) = pair[0];
            let (bx, by) = pair[1];
            let step = ax.abs_diff(bx) + ay.abs_diff(by);
            assert_eq!(step, 1, "jump between ({ax},{ay}) and ({bx},{by})");
        }
    }

    #[test]
    fn point_scaling_spans_the_extent() {
        let extent = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let origin = index_for_point(&extent, 0.0, 0.0);
        let far = index_for_point(&extent, 10.0, 0.0);
        assert_eq!(origin, 0);
        // (max, min) corner is the last cell of the order-16 curve.
        assert_eq!(far, (1u64 << 32) - 1);
    }

    #[test]
    fn degenerate_extent_collapses_to_cell_zero() {
        let extent = BoundingBox::from_point(3.0, 3.0);
        assert_eq!(index_for_point(&extent, 3.0, 3.0), 0);
    }

    #[test]
    fn out_of_extent_points_clamp_to_edges() {
        let extent = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let inside = index_for_point(&extent, 0.999, 0.0);
        let outside = index_for_point(&extent, 5.0, -5.0);
        assert_eq!(outside, index_for_point(&extent, 1.0, 0.0));
        assert!(outside >= inside);
    }
}
