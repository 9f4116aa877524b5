use serde_json::{Value, json};
use shapefile::{Point, PointM, PointZ, PolygonRing, Shape};

/// Coordinates of one vertex as written to GeoJSON.
trait Coord {
    fn coord(&self) -> Vec<f64>;
}

impl Coord for Point {
    fn coord(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}

impl Coord for PointM {
    fn coord(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}

impl Coord for PointZ {
    fn coord(&self) -> Vec<f64> {
        vec![self.x, self.y, self.z]
    }
}

/// Convert a shape to a GeoJSON geometry object.
///
/// Null shapes become `null`. Returns `None` for multipatch shapes, which
/// have no GeoJSON equivalent.
pub fn to_geojson(shape: &Shape) -> Option<Value> {
    let geometry = match shape {
        Shape::NullShape => Value::Null,
        Shape::Point(p) => point(p),
        Shape::PointM(p) => point(p),
        Shape::PointZ(p) => point(p),
        Shape::Multipoint(mp) => multipoint(mp.points()),
        Shape::MultipointM(mp) => multipoint(mp.points()),
        Shape::MultipointZ(mp) => multipoint(mp.points()),
        Shape::Polyline(line) => polyline(line.parts()),
        Shape::PolylineM(line) => polyline(line.parts()),
        Shape::PolylineZ(line) => polyline(line.parts()),
        Shape::Polygon(polygon) => polygons(polygon.rings()),
        Shape::PolygonM(polygon) => polygons(polygon.rings()),
        Shape::PolygonZ(polygon) => polygons(polygon.rings()),
        Shape::Multipatch(_) => return None,
    };
    Some(geometry)
}

fn point<P: Coord>(p: &P) -> Value {
    json!({"type": "Point", "coordinates": p.coord()})
}

fn line<P: Coord>(points: &[P]) -> Vec<Vec<f64>> {
    points.iter().map(Coord::coord).collect()
}

fn multipoint<P: Coord>(points: &[P]) -> Value {
    json!({"type": "MultiPoint", "coordinates": line(points)})
}

fn polyline<P: Coord>(parts: &[Vec<P>]) -> Value {
    match parts {
        [single] => json!({"type": "LineString", "coordinates": line(single)}),
        _ => {
            let lines: Vec<_> = parts.iter().map(|part| line(part)).collect();
            json!({"type": "MultiLineString", "coordinates": lines})
        }
    }
}

/// Every outer ring starts a polygon; inner rings are holes of the last one.
fn polygons<P: Coord>(rings: &[PolygonRing<P>]) -> Value {
    let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::new();
    for ring in rings {
        let coords = line(ring.points());
        match (ring, polygons.last_mut()) {
            (PolygonRing::Inner(_), Some(current)) => current.push(coords),
            _ => polygons.push(vec![coords]),
        }
    }

    match polygons.as_slice() {
        [single] => json!({"type": "Polygon", "coordinates": single}),
        _ => json!({"type": "MultiPolygon", "coordinates": polygons}),
    }
}
