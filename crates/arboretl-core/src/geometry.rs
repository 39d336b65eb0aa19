//! Geometry utilities: bounding boxes, coordinate mapping, emptiness and
//! structural validity checks.
//!
//! These are deliberately plain coordinate-level operations; nothing here
//! knows about CRS semantics beyond "x then y".

use geo_types::{Coord, Geometry, LineString, Polygon};

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its corners.
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box covering a single point.
    #[must_use]
    pub fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grow the box to include a point.
    pub fn expand_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow the box to include another box.
    pub fn expand_box(&mut self, other: &BoundingBox) {
        self.expand_point(other.min_x, other.min_y);
        self.expand_point(other.max_x, other.max_y);
    }

    /// Width of the box (x extent).
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the box (y extent).
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point of the box.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Visit every coordinate of a geometry.
pub fn for_each_coord(geom: &Geometry<f64>, f: &mut impl FnMut(f64, f64)) {
    match geom {
        Geometry::Point(p) => f(p.x(), p.y()),
        Geometry::Line(l) => {
            f(l.start.x, l.start.y);
            f(l.end.x, l.end.y);
        },
        Geometry::LineString(ls) => {
            for c in &ls.0 {
                f(c.x, c.y);
            }
        },
        Geometry::Polygon(poly) => visit_polygon(poly, f),
        Geometry::MultiPoint(mp) => {
            for p in &mp.0 {
                f(p.x(), p.y());
            }
        },
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                for c in &ls.0 {
                    f(c.x, c.y);
                }
            }
        },
        Geometry::MultiPolygon(mpoly) => {
            for poly in &mpoly.0 {
                visit_polygon(poly, f);
            }
        },
        Geometry::GeometryCollection(gc) => {
            for g in &gc.0 {
                for_each_coord(g, f);
            }
        },
        Geometry::Rect(r) => {
            f(r.min().x, r.min().y);
            f(r.max().x, r.max().y);
        },
        Geometry::Triangle(t) => {
            f(t.0.x, t.0.y);
            f(t.1.x, t.1.y);
            f(t.2.x, t.2.y);
        },
    }
}

fn visit_polygon(poly: &Polygon<f64>, f: &mut impl FnMut(f64, f64)) {
    for c in &poly.exterior().0 {
        f(c.x, c.y);
    }
    for ring in poly.interiors() {
        for c in &ring.0 {
            f(c.x, c.y);
        }
    }
}

/// Rewrite every coordinate of a geometry in place.
pub fn map_coords_mut(geom: &mut Geometry<f64>, f: &impl Fn(f64, f64) -> (f64, f64)) {
    match geom {
        Geometry::Point(p) => map_coord(&mut p.0, f),
        Geometry::Line(l) => {
            map_coord(&mut l.start, f);
            map_coord(&mut l.end, f);
        },
        Geometry::LineString(ls) => map_line_string(ls, f),
        Geometry::Polygon(poly) => map_polygon(poly, f),
        Geometry::MultiPoint(mp) => {
            for p in &mut mp.0 {
                map_coord(&mut p.0, f);
            }
        },
        Geometry::MultiLineString(mls) => {
            for ls in &mut mls.0 {
                map_line_string(ls, f);
            }
        },
        Geometry::MultiPolygon(mpoly) => {
            for poly in &mut mpoly.0 {
                map_polygon(poly, f);
            }
        },
        Geometry::GeometryCollection(gc) => {
            for g in &mut gc.0 {
                map_coords_mut(g, f);
            }
        },
        Geometry::Rect(r) => {
            let (min_x, min_y) = f(r.min().x, r.min().y);
            let (max_x, max_y) = f(r.max().x, r.max().y);
            r.set_min(Coord { x: min_x, y: min_y });
            r.set_max(Coord { x: max_x, y: max_y });
        },
        Geometry::Triangle(t) => {
            map_coord(&mut t.0, f);
            map_coord(&mut t.1, f);
            map_coord(&mut t.2, f);
        },
    }
}

fn map_coord(c: &mut Coord<f64>, f: &impl Fn(f64, f64) -> (f64, f64)) {
    let (x, y) = f(c.x, c.y);
    c.x = x;
    c.y = y;
}

fn map_line_string(ls: &mut LineString<f64>, f: &impl Fn(f64, f64) -> (f64, f64)) {
    for c in &mut ls.0 {
        map_coord(c, f);
    }
}

fn map_polygon(poly: &mut Polygon<f64>, f: &impl Fn(f64, f64) -> (f64, f64)) {
    poly.exterior_mut(|ls| map_line_string(ls, f));
    poly.interiors_mut(|rings| {
        for ls in rings {
            map_line_string(ls, f);
        }
    });
}

/// Axis-aligned bounding box of a geometry, `None` when it has no coordinates.
#[must_use]
pub fn bounding_box(geom: &Geometry<f64>) -> Option<BoundingBox> {
    let mut bbox: Option<BoundingBox> = None;
    for_each_coord(geom, &mut |x, y| match &mut bbox {
        Some(b) => b.expand_point(x, y),
        None => bbox = Some(BoundingBox::from_point(x, y)),
    });
    bbox
}

/// A geometry is topologically empty when it contains no coordinates at all
/// (empty multi-geometries, empty collections, zero-point linestrings).
#[must_use]
pub fn is_empty(geom: &Geometry<f64>) -> bool {
    let mut any = false;
    for_each_coord(geom, &mut |_, _| any = true);
    !any
}

/// Structural validity: finite coordinates, minimum point counts, and closed
/// polygon rings. Empty geometries are invalid.
#[must_use]
pub fn is_structurally_valid(geom: &Geometry<f64>) -> bool {
    match geom {
        Geometry::Point(p) => p.x().is_finite() && p.y().is_finite(),
        Geometry::Line(l) => {
            l.start.x.is_finite()
                && l.start.y.is_finite()
                && l.end.x.is_finite()
                && l.end.y.is_finite()
        },
        Geometry::LineString(ls) => line_string_valid(ls),
        Geometry::Polygon(poly) => polygon_valid(poly),
        Geometry::MultiPoint(mp) => {
            !mp.0.is_empty() && mp.0.iter().all(|p| p.x().is_finite() && p.y().is_finite())
        },
        Geometry::MultiLineString(mls) => {
            !mls.0.is_empty() && mls.0.iter().all(line_string_valid)
        },
        Geometry::MultiPolygon(mpoly) => {
            !mpoly.0.is_empty() && mpoly.0.iter().all(polygon_valid)
        },
        Geometry::GeometryCollection(gc) => {
            !gc.0.is_empty() && gc.0.iter().all(is_structurally_valid)
        },
        Geometry::Rect(r) => {
            r.min().x.is_finite()
                && r.min().y.is_finite()
                && r.max().x.is_finite()
                && r.max().y.is_finite()
                && r.min().x <= r.max().x
                && r.min().y <= r.max().y
        },
        Geometry::Triangle(t) => [t.0, t.1, t.2]
            .iter()
            .all(|c| c.x.is_finite() && c.y.is_finite()),
    }
}

fn line_string_valid(ls: &LineString<f64>) -> bool {
    ls.0.len() >= 2 && ls.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

fn polygon_valid(poly: &Polygon<f64>) -> bool {
    ring_valid(poly.exterior()) && poly.interiors().iter().all(ring_valid)
}

// A ring needs at least 4 points and must close on itself.
fn ring_valid(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    coords.len() >= 4
        && coords.iter().all(|c| c.x.is_finite() && c.y.is_finite())
        && coords.first() == coords.last()
}

/// Whether every coordinate lies inside WGS84 lon/lat bounds.
#[must_use]
pub fn within_wgs84_bounds(geom: &Geometry<f64>) -> bool {
    let mut inside = true;
    for_each_coord(geom, &mut |x, y| {
        if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
            inside = false;
        }
    });
    inside
}

/// The OGC-style name of a geometry's type.
#[must_use]
pub fn geometry_type_name(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}
