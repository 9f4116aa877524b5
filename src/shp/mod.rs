//! Shapefile reading.
//!
//! A located target (usually the `.shx` index) names a shapefile set; the
//! sibling `.shp` geometry file and `.dbf` attribute table are read together
//! with the `shapefile` crate and each record becomes a [`RawRecord`]:
//! ordered attributes plus a GeoJSON geometry.

mod geometry;
mod reader;

pub use geometry::to_geojson;
pub use reader::{RawRecord, field_names, for_each_record};
