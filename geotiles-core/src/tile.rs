//! Interchange representation returned by the CRUD surface.

use serde::{Deserialize, Serialize};

use crate::Feature;
use crate::geometry::{GeometryError, from_interchange, to_interchange};

/// A stored feature as seen by API callers.
///
/// Serialises as `{"id": <int>, "geometry": <GeoJSON geometry object>}`.
///
/// # Examples
/// ```
/// use geotiles_core::Tile;
///
/// let tile: Tile = serde_json::from_str(
///     r#"{"id": 7, "geometry": {"type": "Point", "coordinates": [77.59, 12.97]}}"#,
/// )?;
/// assert_eq!(tile.id, 7);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: i64,
    pub geometry: geojson::Geometry,
}

impl Tile {
    /// Validate the interchange geometry and convert it into a [`Feature`].
    pub fn to_feature(&self) -> Result<Feature, GeometryError> {
        from_interchange(&self.geometry).map(|geometry| Feature::new(self.id, geometry))
    }
}

impl From<&Feature> for Tile {
    fn from(feature: &Feature) -> Self {
        Self {
            id: feature.id,
            geometry: to_interchange(&feature.geometry),
        }
    }
}

impl From<Feature> for Tile {
    fn from(feature: Feature) -> Self {
        Self::from(&feature)
    }
}
