use geojson::GeoJson;
use geotiles_core::Feature;
use geotiles_core::geometry::from_interchange;

use super::FetchError;

/// Parse a GeoJSON `FeatureCollection` into features with ids `1..=N`.
///
/// Every feature must carry a well-formed geometry; the first one that does
/// not fails the whole document.
///
/// # Examples
/// ```
/// use geotiles_data::parse_feature_collection;
///
/// let body = r#"{
///     "type": "FeatureCollection",
///     "features": [
///         {"type": "Feature", "id": 40, "properties": null,
///          "geometry": {"type": "Point", "coordinates": [77.59, 12.97]}},
///         {"type": "Feature", "properties": {"name": "Mysuru"},
///          "geometry": {"type": "Point", "coordinates": [76.64, 12.30]}}
///     ]
/// }"#;
///
/// let features = parse_feature_collection(body)?;
/// let ids: Vec<i64> = features.iter().map(|feature| feature.id).collect();
/// assert_eq!(ids, vec![1, 2]);
/// # Ok::<(), geotiles_data::FetchError>(())
/// ```
pub fn parse_feature_collection(body: &str) -> Result<Vec<Feature>, FetchError> {
    let document: GeoJson = body.parse().map_err(|err: geojson::Error| FetchError::Parse {
        message: err.to_string(),
    })?;
    let GeoJson::FeatureCollection(collection) = document else {
        return Err(FetchError::Parse {
            message: "document is not a FeatureCollection".to_owned(),
        });
    };

    collection
        .features
        .iter()
        .zip(1_i64..)
        .map(|(feature, id)| {
            let interchange = feature.geometry.as_ref().ok_or_else(|| FetchError::Parse {
                message: format!("feature {id} has no geometry"),
            })?;
            let geometry = from_interchange(interchange).map_err(|err| FetchError::Parse {
                message: format!("feature {id}: {err}"),
            })?;
            Ok(Feature::new(id, geometry))
        })
        .collect()
}
