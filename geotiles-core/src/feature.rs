use geo::Geometry;

/// One spatial record read from the upstream dataset or the store.
///
/// The geometry is WGS84 (SRID 4326) with `x = longitude` and
/// `y = latitude`. Ingestion assigns ids by document order, so an id is only
/// stable within one ingestion run.
///
/// # Examples
/// ```
/// use geo::{Geometry, point};
/// use geotiles_core::Feature;
///
/// let feature = Feature::new(1, Geometry::Point(point!(x: 77.59, y: 12.97)));
/// assert_eq!(feature.id, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: i64,
    pub geometry: Geometry<f64>,
}

impl Feature {
    /// Construct a `Feature` from an id and a WGS84 geometry.
    pub fn new(id: i64, geometry: Geometry<f64>) -> Self {
        Self { id, geometry }
    }
}
