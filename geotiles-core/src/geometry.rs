//! Geometry codec shared by the store and the tile service.
//!
//! Three representations meet here:
//!
//! - [`geo::Geometry`], the in-memory value carried by [`crate::Feature`];
//! - ISO WKB bytes, the native spatial value persisted by the store;
//! - [`geojson::Geometry`], the interchange value carried by [`crate::Tile`].
//!
//! Every geometry is tagged with [`SRID_WGS84`]: coordinates are WGS84 with
//! `x = longitude` and `y = latitude`, in degrees.

use geo::{CoordsIter, Geometry};
use geo_traits::to_geo::ToGeoGeometry;
use thiserror::Error;
use wkb::Endianness;
use wkb::reader::read_wkb;
use wkb::writer::{WriteOptions, write_geometry};

/// Spatial reference identifier for WGS84 longitude/latitude.
pub const SRID_WGS84: i32 = 4326;

/// Errors raised while validating or converting geometries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The interchange value could not be turned into a geometry.
    #[error("invalid GeoJSON geometry: {message}")]
    Interchange {
        /// Description produced by the GeoJSON converter.
        message: String,
    },
    /// The geometry contains no coordinates.
    #[error("geometry has no coordinates")]
    Empty,
    /// A line or polygon ring has fewer positions than its type requires.
    #[error("{shape} needs at least {minimum} positions, found {found}")]
    TooFewPositions {
        /// `"line string"` or `"polygon ring"`.
        shape: &'static str,
        /// Positions required.
        minimum: usize,
        /// Positions supplied.
        found: usize,
    },
    /// A polygon ring does not end on its first position.
    #[error("polygon ring is not closed")]
    UnclosedRing,
    /// A coordinate is NaN, infinite, or outside WGS84 bounds.
    #[error("coordinate ({x}, {y}) is outside WGS84 longitude/latitude bounds")]
    OutOfBounds {
        /// Longitude of the offending coordinate.
        x: f64,
        /// Latitude of the offending coordinate.
        y: f64,
    },
    /// Writing WKB bytes failed.
    #[error("failed to encode geometry as WKB: {message}")]
    Encode {
        /// Description produced by the WKB writer.
        message: String,
    },
    /// Reading WKB bytes failed.
    #[error("failed to decode WKB geometry: {message}")]
    Decode {
        /// Description produced by the WKB reader.
        message: String,
    },
}

/// Check that `geometry` has at least one coordinate and that every
/// coordinate lies within WGS84 bounds.
///
/// # Examples
/// ```
/// use geo::{Geometry, point};
/// use geotiles_core::geometry::{GeometryError, validate};
///
/// assert!(validate(&Geometry::Point(point!(x: 77.59, y: 12.97))).is_ok());
/// assert_eq!(
///     validate(&Geometry::Point(point!(x: 200.0, y: 12.97))),
///     Err(GeometryError::OutOfBounds { x: 200.0, y: 12.97 }),
/// );
/// ```
pub fn validate(geometry: &Geometry<f64>) -> Result<(), GeometryError> {
    if geometry.coords_count() == 0 {
        return Err(GeometryError::Empty);
    }
    match geometry.coords_iter().find(|coord| !within_wgs84(coord.x, coord.y)) {
        Some(coord) => Err(GeometryError::OutOfBounds {
            x: coord.x,
            y: coord.y,
        }),
        None => Ok(()),
    }
}

fn within_wgs84(lon: f64, lat: f64) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}

/// Encode `geometry` as little-endian ISO WKB.
pub fn encode_wkb(geometry: &Geometry<f64>) -> Result<Vec<u8>, GeometryError> {
    let mut buffer = Vec::new();
    let options = WriteOptions {
        endianness: Endianness::LittleEndian,
    };
    write_geometry(&mut buffer, geometry, &options).map_err(|err| GeometryError::Encode {
        message: err.to_string(),
    })?;
    Ok(buffer)
}

/// Decode WKB bytes produced by [`encode_wkb`].
pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>, GeometryError> {
    let wkb = read_wkb(bytes).map_err(|err| GeometryError::Decode {
        message: err.to_string(),
    })?;
    wkb.try_to_geometry().ok_or_else(|| GeometryError::Decode {
        message: "WKB value has no geo-types equivalent".to_owned(),
    })
}

const MIN_LINE_POSITIONS: usize = 2;
const MIN_RING_POSITIONS: usize = 4;

/// Check the structure of an interchange value before conversion.
///
/// Line strings need two positions and polygon rings need four with the last
/// equal to the first. The check recurses through multi-geometries and
/// collections. Conversion into `geo` would otherwise close rings silently.
pub fn check_shape(value: &geojson::Value) -> Result<(), GeometryError> {
    use geojson::Value;

    match value {
        Value::Point(_) | Value::MultiPoint(_) => Ok(()),
        Value::LineString(line) => check_line(line),
        Value::MultiLineString(lines) => lines.iter().try_for_each(|line| check_line(line)),
        Value::Polygon(rings) => check_rings(rings),
        Value::MultiPolygon(polygons) => {
            polygons.iter().try_for_each(|rings| check_rings(rings))
        }
        Value::GeometryCollection(members) => members
            .iter()
            .try_for_each(|member| check_shape(&member.value)),
    }
}

fn check_line(line: &[geojson::Position]) -> Result<(), GeometryError> {
    if line.len() < MIN_LINE_POSITIONS {
        return Err(GeometryError::TooFewPositions {
            shape: "line string",
            minimum: MIN_LINE_POSITIONS,
            found: line.len(),
        });
    }
    Ok(())
}

fn check_rings(rings: &[Vec<geojson::Position>]) -> Result<(), GeometryError> {
    rings.iter().try_for_each(|ring| {
        if ring.len() < MIN_RING_POSITIONS {
            return Err(GeometryError::TooFewPositions {
                shape: "polygon ring",
                minimum: MIN_RING_POSITIONS,
                found: ring.len(),
            });
        }
        if ring.first() != ring.last() {
            return Err(GeometryError::UnclosedRing);
        }
        Ok(())
    })
}

/// Convert an interchange geometry into a validated [`Geometry`].
///
/// The value must pass [`check_shape`] and [`validate`].
///
/// # Examples
/// ```
/// use geotiles_core::geometry::from_interchange;
///
/// let json = r#"{"type": "Point", "coordinates": [77.59, 12.97]}"#;
/// let interchange: geojson::Geometry = serde_json::from_str(json).expect("valid GeoJSON");
/// let geometry = from_interchange(&interchange)?;
/// assert!(matches!(geometry, geo::Geometry::Point(_)));
/// # Ok::<(), geotiles_core::GeometryError>(())
/// ```
pub fn from_interchange(interchange: &geojson::Geometry) -> Result<Geometry<f64>, GeometryError> {
    check_shape(&interchange.value)?;
    let geometry = Geometry::<f64>::try_from(interchange.value.clone()).map_err(|err| {
        GeometryError::Interchange {
            message: err.to_string(),
        }
    })?;
    validate(&geometry)?;
    Ok(geometry)
}

/// Convert a [`Geometry`] into its interchange form.
pub fn to_interchange(geometry: &Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}
