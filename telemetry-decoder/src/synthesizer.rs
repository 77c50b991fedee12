//! Derived-stream synthesis
//!
//! Turns raw navigation records (latitude/longitude/altitude, Euler angles,
//! ENU velocity) into a pose record, and keeps a bounded trajectory history
//! from which path records are emitted in batches.

use crate::config::SynthesizerConfig;
use crate::types::{Composite, Result};
use serde::Serialize;
use std::collections::VecDeque;

/// Planar distance units per degree of latitude/longitude.
///
/// A flat approximation of metres per degree at the equator, applied to both
/// axes. Not a geodesic projection.
pub const DEGREES_TO_PLANAR: f64 = 111_320.0;

pub const MAP_FRAME: &str = "map";
pub const BASE_FRAME: &str = "base_link";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl Quaternion {
    /// Aerospace Z-Y-X (yaw-pitch-roll) Euler angles in radians to a quaternion
    ///
    /// The result has unit norm for finite inputs; it is not renormalized.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();

        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn norm_squared(&self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }
}

/// Shorthand for [`Quaternion::from_euler`]
pub fn quaternion_from_euler(roll: f64, pitch: f64, yaw: f64) -> Quaternion {
    Quaternion::from_euler(roll, pitch, yaw)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    /// Milliseconds since the epoch
    pub stamp: i64,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Odometry-style pose record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseRecord {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: Pose,
    pub twist: Twist,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StampedPose {
    pub header: Header,
    pub pose: Pose,
}

/// Ordered list of recent poses in the map frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathRecord {
    pub header: Header,
    pub poses: Vec<StampedPose>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub timestamp: i64,
    pub position: Vector3,
    pub orientation: Quaternion,
}

/// Fixed-capacity, append-only trajectory buffer
///
/// Once `capacity` points are held, each push evicts the oldest point.
#[derive(Debug, Clone)]
pub struct TrajectoryHistory {
    points: VecDeque<TrajectoryPoint>,
    capacity: usize,
}

impl TrajectoryHistory {
    /// A capacity of zero is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, returning the evicted oldest point if the buffer was full
    pub fn push(&mut self, point: TrajectoryPoint) -> Option<TrajectoryPoint> {
        let evicted = if self.points.len() == self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points.iter()
    }

    /// The most recent `n` points, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points.iter().skip(self.points.len().saturating_sub(n))
    }

    pub fn latest(&self) -> Option<&TrajectoryPoint> {
        self.points.back()
    }
}

/// Output of one accepted navigation record
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub pose: PoseRecord,
    /// Present on every batch boundary once the history holds two points
    pub path: Option<PathRecord>,
}

/// Converts navigation records into pose and path records
#[derive(Debug, Clone)]
pub struct PoseSynthesizer {
    history: TrajectoryHistory,
    batch_every: usize,
    path_limit: usize,
    accepted: u64,
}

impl PoseSynthesizer {
    /// Create a synthesizer that owns `history` for its lifetime
    pub fn new(history: TrajectoryHistory, config: &SynthesizerConfig) -> Self {
        Self {
            history,
            batch_every: config.batch_every.max(1),
            path_limit: config.path_limit.max(1),
            accepted: 0,
        }
    }

    /// Validate the config and allocate a history of the configured capacity
    pub fn from_config(config: &SynthesizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(TrajectoryHistory::with_capacity(config.history_capacity), config))
    }

    pub fn history(&self) -> &TrajectoryHistory {
        &self.history
    }

    /// Navigation records accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Build the pose for one navigation record; missing fields read as 0.0
    pub fn pose_from_fields(timestamp: i64, fields: &Composite) -> PoseRecord {
        let number = |name: &str| fields.get_f64(name).unwrap_or(0.0);
        let vector = |name: &str| {
            let nested = fields.get_composite(name);
            let axis = |a: &str| nested.and_then(|c| c.get_f64(a)).unwrap_or(0.0);
            Vector3::new(axis("x"), axis("y"), axis("z"))
        };

        PoseRecord {
            header: Header {
                stamp: timestamp,
                frame_id: MAP_FRAME.to_string(),
            },
            child_frame_id: BASE_FRAME.to_string(),
            pose: Pose {
                position: Vector3::new(
                    number("longitude") * DEGREES_TO_PLANAR,
                    number("latitude") * DEGREES_TO_PLANAR,
                    number("altitude"),
                ),
                orientation: Quaternion::from_euler(number("roll"), number("pitch"), number("yaw")),
            },
            twist: Twist {
                linear: vector("enu_velocity"),
                angular: vector("vehicle_angular_velocity"),
            },
        }
    }

    /// Accept one navigation record
    pub fn on_navigation_record(&mut self, timestamp: i64, fields: &Composite) -> Synthesized {
        let pose = Self::pose_from_fields(timestamp, fields);

        self.history.push(TrajectoryPoint {
            timestamp,
            position: pose.pose.position,
            orientation: pose.pose.orientation,
        });
        self.accepted += 1;

        let path = if self.accepted % self.batch_every as u64 == 0 {
            self.path_snapshot()
        } else {
            None
        };

        if let Some(p) = &path {
            log::debug!("Emitting path with {} poses", p.poses.len());
        }

        Synthesized { pose, path }
    }

    /// Path over the most recent points, or `None` with fewer than two points
    pub fn path_snapshot(&self) -> Option<PathRecord> {
        if self.history.len() < 2 {
            return None;
        }

        let poses = self
            .history
            .recent(self.path_limit)
            .map(|point| StampedPose {
                header: Header {
                    stamp: point.timestamp,
                    frame_id: MAP_FRAME.to_string(),
                },
                pose: Pose {
                    position: point.position,
                    orientation: point.orientation,
                },
            })
            .collect();

        Some(PathRecord {
            header: Header {
                stamp: self.history.latest().map_or(0, |p| p.timestamp),
                frame_id: MAP_FRAME.to_string(),
            },
            poses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalValue, Scalar};

    fn nav(lat: f64, lon: f64) -> Composite {
        Composite::new()
            .with("latitude", Scalar::Float(lat))
            .with("longitude", Scalar::Float(lon))
    }

    #[test]
    fn test_identity_quaternion() {
        let q = quaternion_from_euler(0.0, 0.0, 0.0);
        assert_eq!(q, Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 });
    }

    #[test]
    fn test_quaternion_unit_norm() {
        let angles = [-3.1, -1.2, -0.4, 0.0, 0.3, 1.5707963, 2.7, 6.5, 100.0];
        for &r in &angles {
            for &p in &angles {
                for &y in &angles {
                    let q = Quaternion::from_euler(r, p, y);
                    assert!((q.norm_squared() - 1.0).abs() < 1e-9, "r={} p={} y={}", r, p, y);
                }
            }
        }
    }

    #[test]
    fn test_pure_yaw() {
        let q = Quaternion::from_euler(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        assert!((q.w - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((q.z - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!(q.x.abs() < 1e-12 && q.y.abs() < 1e-12);
    }

    #[test]
    fn test_pose_from_fields() {
        let velocity = Composite::new()
            .with("x", Scalar::Float(1.0))
            .with("y", Scalar::Float(-2.0))
            .with("z", Scalar::Int(3));
        let fields = nav(2.0, 1.0)
            .with("altitude", Scalar::Float(12.5))
            .with("enu_velocity", CanonicalValue::Composite(velocity));

        let pose = PoseSynthesizer::pose_from_fields(42, &fields);
        assert_eq!(pose.header.frame_id, "map");
        assert_eq!(pose.child_frame_id, "base_link");
        assert_eq!(pose.pose.position, Vector3::new(111_320.0, 222_640.0, 12.5));
        assert_eq!(pose.twist.linear, Vector3::new(1.0, -2.0, 3.0));
        assert_eq!(pose.twist.angular, Vector3::default());
    }

    #[test]
    fn test_missing_altitude_defaults_to_zero() {
        let pose = PoseSynthesizer::pose_from_fields(0, &nav(1.0, 1.0));
        assert_eq!(pose.pose.position.z, 0.0);
        assert_eq!(pose.pose.orientation, Quaternion::default());
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = TrajectoryHistory::with_capacity(3);
        for t in 0..5 {
            history.push(TrajectoryPoint {
                timestamp: t,
                position: Vector3::default(),
                orientation: Quaternion::default(),
            });
        }
        let stamps: Vec<i64> = history.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
        assert_eq!(history.capacity(), 3);
    }

    #[test]
    fn test_path_emitted_every_batch() {
        let mut synth = PoseSynthesizer::from_config(&SynthesizerConfig::default()).unwrap();
        let mut emitted = Vec::new();
        for i in 0..25 {
            let out = synth.on_navigation_record(i * 100, &nav(i as f64, 0.0));
            if out.path.is_some() {
                emitted.push(i + 1);
            }
        }
        assert_eq!(emitted, vec![10, 20]);
        assert_eq!(synth.accepted(), 25);
    }

    #[test]
    fn test_single_record_batch_needs_two_points() {
        let config = SynthesizerConfig {
            batch_every: 1,
            ..Default::default()
        };
        let mut synth = PoseSynthesizer::from_config(&config).unwrap();
        assert!(synth.on_navigation_record(0, &nav(0.0, 0.0)).path.is_none());
        assert_eq!(synth.on_navigation_record(1, &nav(0.0, 0.0)).path.unwrap().poses.len(), 2);
    }

    #[test]
    fn test_path_capped_at_most_recent() {
        let mut synth = PoseSynthesizer::from_config(&SynthesizerConfig::default()).unwrap();
        let mut last_path = None;
        for i in 0..250 {
            if let Some(path) = synth.on_navigation_record(i, &nav(0.0, 0.0)).path {
                assert!(path.poses.len() <= 100);
                last_path = Some(path);
            }
        }
        let path = last_path.unwrap();
        let stamps: Vec<i64> = path.poses.iter().map(|p| p.header.stamp).collect();
        let expected: Vec<i64> = (150..250).collect();
        assert_eq!(stamps, expected);
        assert_eq!(path.header.stamp, 249);
        assert_eq!(synth.history().len(), 250);
    }

    #[test]
    fn test_zero_config_rejected() {
        let config = SynthesizerConfig {
            path_limit: 0,
            ..Default::default()
        };
        assert!(PoseSynthesizer::from_config(&config).is_err());
    }
}
