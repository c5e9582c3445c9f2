//! Deterministic geometry fixtures shared by unit and behaviour tests.

use geo::{Geometry, Polygon, polygon};

use crate::Feature;

/// Axis-aligned square with a 0.01° side whose south-west corner is at
/// (`lon`, `lat`).
pub fn square(lon: f64, lat: f64) -> Polygon<f64> {
    let side = 0.01;
    polygon![
        (x: lon, y: lat),
        (x: lon + side, y: lat),
        (x: lon + side, y: lat + side),
        (x: lon, y: lat + side),
        (x: lon, y: lat),
    ]
}

/// Square feature whose position is derived from `id`, so equal ids always
/// produce equal geometries.
pub fn square_feature(id: i64) -> Feature {
    let column = id.rem_euclid(100) as f64;
    let row = id.div_euclid(100).rem_euclid(100) as f64;
    Feature::new(
        id,
        Geometry::Polygon(square(74.0 + column * 0.02, 11.5 + row * 0.02)),
    )
}

/// `count` square features with ids `1..=count`.
pub fn square_features(count: usize) -> Vec<Feature> {
    (1..=count)
        .map(|id| square_feature(i64::try_from(id).unwrap_or(i64::MAX)))
        .collect()
}
