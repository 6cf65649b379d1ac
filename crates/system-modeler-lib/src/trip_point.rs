//! Trip points - equal-interval reference locations along a path
//!
//! A street segment is sampled once, when it is created, and the samples are stored with the
//! entity. Arbitrary features (a probe vehicle, a cross-street intersection) are later snapped
//! onto the nearest sample, which gives them a distance along the segment and therefore an
//! order.

use crate::geodesy;
use crate::geometry::{MeasuredPath, coord_array};
use crate::{ModelerError, Result};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// Consecutive vertices closer than this are collapsed when filtering short segments, in meters
pub const MIN_SEGMENT_METERS: f64 = 0.01;

/// Upper bound on the samples taken from one path
pub const MAX_TRIP_POINTS: usize = 1_000_000;

/// A sampled location along a path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPointLocation {
    /// Cumulative distance from the start of the path, in meters
    pub distance_along_path: f64,
    /// Geographic `(lon, lat)` coordinate of the sample
    #[serde(with = "coord_array")]
    pub coordinate: Coord<f64>,
    /// Compass bearing of the path segment the sample lies on
    pub bearing_degrees: f64,
}

/// Sampling configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPointConfig {
    /// Distance between consecutive samples, in meters (default 15)
    pub interval_meters: f64,
    /// Collapse near-duplicate consecutive vertices before sampling (default true)
    pub filter_short_segments: bool,
}

impl Default for TripPointConfig {
    fn default() -> Self {
        Self {
            interval_meters: 15.0,
            filter_short_segments: true,
        }
    }
}

/// Samples paths into [`TripPointLocation`] sequences
#[derive(Debug, Clone, Default)]
pub struct TripPointSampler {
    config: TripPointConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TripPointSampler {
    /// Create a sampler, rejecting non-positive intervals
    pub fn new(config: TripPointConfig) -> Result<Self> {
        validate_interval(config.interval_meters)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TripPointConfig {
        &self.config
    }

    /// Sample `path` at the configured interval
    ///
    /// Produces samples at `0, interval, 2·interval, …` and always ends with the path's final
    /// vertex at the full path length, even when the length is not a multiple of the interval.
    pub fn sample(&self, path: &LineString<f64>) -> Result<Vec<TripPointLocation>> {
        let coords = if self.config.filter_short_segments {
            collapse_short_segments(&path.0)
        } else {
            path.0.clone()
        };
        let measured = MeasuredPath::new(&coords)?;
        let total = measured.total();
        if total <= 0.0 {
            return Err(ModelerError::InvalidPath(
                "path has zero length".to_string(),
            ));
        }

        let interval = self.config.interval_meters;
        // Tolerance keeps the endpoint from being emitted twice through rounding
        let last_nominal = total - 1e-9;
        let steps = (last_nominal / interval).floor();
        if steps >= MAX_TRIP_POINTS as f64 {
            return Err(ModelerError::InvalidInterval(interval));
        }
        let steps = steps as usize;

        let mut samples = Vec::with_capacity(steps + 2);
        samples.extend((0..=steps).map(|k| {
            let distance = k as f64 * interval;
            TripPointLocation {
                distance_along_path: distance,
                coordinate: measured.point_at(distance),
                bearing_degrees: measured.bearing_at(distance),
            }
        }));
        samples.push(TripPointLocation {
            distance_along_path: total,
            coordinate: measured.last(),
            bearing_degrees: measured.segment_bearing(measured.last_segment()),
        });

        tracing::trace!(
            vertices = coords.len(),
            samples = samples.len(),
            length_meters = total,
            "Sampled trip points"
        );
        Ok(samples)
    }

}

/// Sample `path` every `interval_meters` with default filtering
pub fn sample(path: &LineString<f64>, interval_meters: f64) -> Result<Vec<TripPointLocation>> {
    TripPointSampler::new(TripPointConfig {
        interval_meters,
        ..Default::default()
    })?
    .sample(path)
}

/// Sample in `samples` closest to `query`, with its distance in meters
///
/// Ties resolve to the sample with the smallest distance along the path. Returns `None` for an
/// empty sequence.
pub fn nearest(
    query: Coord<f64>,
    samples: &[TripPointLocation],
) -> Option<(&TripPointLocation, f64)> {
    samples
        .iter()
        .map(|sample| (sample, geodesy::distance(query, sample.coordinate)))
        .min_by(|(a, da), (b, db)| {
            da.total_cmp(db)
                .then(a.distance_along_path.total_cmp(&b.distance_along_path))
        })
}

/// Snap each feature onto the route samples and order the features along the route
///
/// Each result carries the sample the feature snapped to and the feature's distance from it.
/// Features equally far along keep their input order. Features are dropped only when
/// `route_samples` is empty.
pub fn order_along_route<T>(
    route_samples: &[TripPointLocation],
    features: impl IntoIterator<Item = (Coord<f64>, T)>,
) -> Vec<(TripPointLocation, f64, T)> {
    let mut snapped: Vec<_> = features
        .into_iter()
        .filter_map(|(coordinate, feature)| {
            nearest(coordinate, route_samples).map(|(sample, offset)| (*sample, offset, feature))
        })
        .collect();
    snapped.sort_by(|a, b| a.0.distance_along_path.total_cmp(&b.0.distance_along_path));
    snapped
}

fn validate_interval(interval_meters: f64) -> Result<()> {
    if interval_meters.is_finite() && interval_meters > 0.0 {
        Ok(())
    } else {
        Err(ModelerError::InvalidInterval(interval_meters))
    }
}

/// Drop vertices closer than [`MIN_SEGMENT_METERS`] to the previously kept one, always keeping
/// the path endpoints
fn collapse_short_segments(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut kept: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for &coord in coords {
        match kept.last() {
            Some(&prev) if geodesy::distance(prev, coord) < MIN_SEGMENT_METERS => {}
            _ => kept.push(coord),
        }
    }
    if let Some(&last) = coords.last() {
        let n = kept.len();
        if n > 1 {
            kept[n - 1] = last;
        } else if kept.last() != Some(&last) {
            kept.push(last);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;

    fn test_path() -> LineString<f64> {
        LineString::from(vec![
            (-84.190029501915, 34.017980435211),
            (-84.1900938749313, 34.0177892414078),
            (-84.190571308136, 34.0163397115892),
            (-84.1910004615784, 34.0149657479003),
        ])
    }

    #[test]
    fn test_sample_reference_path() {
        let path = test_path();
        let samples = sample(&path, 15.0).unwrap();
        let length = geometry::path_length(&path).unwrap();

        // 0, 15, ..., 405 plus the endpoint
        assert_eq!(samples.len(), 29);
        assert_eq!(samples[0].distance_along_path, 0.0);
        assert_eq!(samples[0].coordinate, path.0[0]);

        let last = samples.last().unwrap();
        assert_eq!(last.coordinate, path.0[3]);
        assert!((last.distance_along_path - length).abs() < 1e-9);

        for pair in samples.windows(2) {
            assert!(pair[1].distance_along_path > pair[0].distance_along_path);
            assert!(pair[1].distance_along_path <= length);
        }
    }

    #[test]
    fn test_samples_lie_at_their_distance() {
        let path = test_path();
        let samples = sample(&path, 15.0).unwrap();
        for s in &samples {
            let expected = geometry::point_at_distance(&path, s.distance_along_path).unwrap();
            assert!((s.coordinate.x - expected.x).abs() < 1e-12);
            assert!((s.coordinate.y - expected.y).abs() < 1e-12);
        }
        // The path runs roughly south-south-west
        assert!(samples.iter().all(|s| (190.0..200.0).contains(&s.bearing_degrees)));
    }

    #[test]
    fn test_exact_multiple_does_not_repeat_endpoint() {
        let path = test_path();
        let length = geometry::path_length(&path).unwrap();
        let samples = sample(&path, length / 4.0).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[4].coordinate, path.0[3]);
    }

    #[test]
    fn test_interval_longer_than_path() {
        let samples = sample(&test_path(), 10_000.0).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_invalid_interval() {
        for interval in [0.0, -15.0, f64::NAN] {
            assert!(matches!(
                sample(&test_path(), interval),
                Err(ModelerError::InvalidInterval(_))
            ));
        }
    }

    #[test]
    fn test_interval_too_small_for_path() {
        for interval in [1e-300, f64::MIN_POSITIVE, 1e-4] {
            assert!(matches!(
                sample(&test_path(), interval),
                Err(ModelerError::InvalidInterval(_))
            ));
        }
        // Just under the sample limit still succeeds
        let samples = sample(&test_path(), 1e-3).unwrap();
        assert_eq!(samples.len(), 419_068);
    }

    #[test]
    fn test_degenerate_paths() {
        let single = LineString::from(vec![(0.0, 0.0)]);
        assert!(matches!(sample(&single, 1.0), Err(ModelerError::InvalidPath(_))));

        let stationary = LineString::from(vec![(1.0, 1.0), (1.0, 1.0)]);
        assert!(matches!(
            sample(&stationary, 1.0),
            Err(ModelerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_short_segments_are_collapsed() {
        let mut coords = test_path().0;
        coords.insert(1, coords[0]);
        let path = LineString::new(coords);

        let filtered = sample(&path, 15.0).unwrap();
        let unfiltered = TripPointSampler::new(TripPointConfig {
            filter_short_segments: false,
            ..Default::default()
        })
        .unwrap()
        .sample(&path)
        .unwrap();

        assert_eq!(filtered.len(), unfiltered.len());
        assert_eq!(filtered.last().unwrap().coordinate, path.0[4]);
        assert!((filtered[0].bearing_degrees - unfiltered[0].bearing_degrees).abs() < 1e-9);
    }

    #[test]
    fn test_collapse_keeps_true_endpoint() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 0.0, y: 0.001 };
        let b_jitter = Coord { x: 0.0, y: 0.001 + 1e-9 };
        assert_eq!(collapse_short_segments(&[a, b, b_jitter]), vec![a, b_jitter]);
    }

    #[test]
    fn test_nearest() {
        let samples = sample(&test_path(), 15.0).unwrap();
        let (hit, offset) = nearest(samples[7].coordinate, &samples).unwrap();
        assert_eq!(hit.distance_along_path, samples[7].distance_along_path);
        assert!(offset < 1e-6);

        assert!(nearest(samples[0].coordinate, &[]).is_none());
    }

    #[test]
    fn test_nearest_tie_prefers_earliest_sample() {
        let point = TripPointLocation {
            distance_along_path: 30.0,
            coordinate: Coord { x: 0.0, y: 0.0 },
            bearing_degrees: 0.0,
        };
        let earlier = TripPointLocation {
            distance_along_path: 15.0,
            ..point
        };
        let samples = [point, earlier];
        let (hit, _) = nearest(Coord { x: 0.0, y: 0.0 }, &samples).unwrap();
        assert_eq!(hit.distance_along_path, 15.0);
    }

    #[test]
    fn test_order_along_route() {
        let path = test_path();
        let samples = sample(&path, 15.0).unwrap();
        let ordered = order_along_route(
            &samples,
            vec![(path.0[3], "end"), (path.0[0], "start"), (path.0[2], "middle")],
        );
        let names: Vec<_> = ordered.iter().map(|(_, _, name)| *name).collect();
        assert_eq!(names, vec!["start", "middle", "end"]);
    }

    #[test]
    fn test_trip_point_serializes_camel_case() {
        let point = TripPointLocation {
            distance_along_path: 15.0,
            coordinate: Coord { x: -84.19, y: 34.01 },
            bearing_degrees: 195.5,
        };
        let value = serde_json::to_value(point).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "distanceAlongPath": 15.0,
                "coordinate": [-84.19, 34.01],
                "bearingDegrees": 195.5
            })
        );
    }
}
