use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use instant::Instant;

pub mod constants;
pub mod spline;
pub mod network;
pub mod occupancy;
pub mod pathing;
pub mod behavior;
pub mod traffic;
pub mod hash;
pub mod physics;
pub mod system;

pub use network::*;
pub use occupancy::*;
pub use pathing::*;
pub use behavior::*;
pub use traffic::*;
pub use hash::*;
pub use physics::*;
pub use system::*;

pub type Vec3 = Vector3<f32>;
pub type Point = Point3<f32>;

/// Vehicle identity. Zero is reserved for "empty" in the occupancy grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub u32);

impl VehicleId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a vehicle is along the road graph and how it wants to move.
#[derive(Debug, Clone)]
pub struct VehiclePathing {
    pub vehicle_id: VehicleId,
    pub road_index: usize,
    /// Normalised position along the current section, in [0, 1).
    pub curve_pos: f32,
    pub lane_index: u8,
    pub wanted_lane_index: u8,
    pub lane_tween: f32,
    /// Ticks left before an aborted switch may be re-evaluated.
    pub lane_switch_delay: u32,
    pub speed: f32,
    pub target_speed: f32,
    pub speed_mult: f32,
    pub speed_range_selected: f32,
    pub want_new_lane: bool,
    pub random: StdRng,
}

impl VehiclePathing {
    pub fn new(vehicle_id: VehicleId, road_index: usize, lane: u8, seed: u64) -> Self {
        Self {
            vehicle_id,
            road_index,
            curve_pos: 0.0,
            lane_index: lane,
            wanted_lane_index: lane,
            lane_tween: 0.0,
            lane_switch_delay: 0,
            speed: 0.0,
            target_speed: 0.0,
            speed_mult: 1.0,
            speed_range_selected: 0.5,
            want_new_lane: false,
            random: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_switching_lanes(&self) -> bool {
        self.lane_index != self.wanted_lane_index
    }
}

/// The point on the spline the vehicle should be at, and how fast it should go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleTargetPosition {
    pub ideal_position: Point,
    pub ideal_speed: f32,
}

impl Default for VehicleTargetPosition {
    fn default() -> Self {
        Self {
            ideal_position: Point::origin(),
            ideal_speed: 0.0,
        }
    }
}

/// Simulated body. Steering may pull this away from the ideal spline point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePhysicsState {
    pub position: Point,
    pub heading: Vec3,
    pub velocity: Vec3,
    pub speed_mult: f32,
    pub bank_radians: f32,
}

impl Default for VehiclePhysicsState {
    fn default() -> Self {
        Self {
            position: Point::origin(),
            heading: Vec3::z(),
            velocity: Vec3::zeros(),
            speed_mult: 1.0,
            bank_radians: 0.0,
        }
    }
}

/// Final world transform handed to rendering, audio and camera collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleTransform {
    pub position: Point,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for VehicleTransform {
    fn default() -> Self {
        Self {
            position: Point::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

/// Lifecycle stage tag carried alongside the component columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleStage {
    /// Instantiated, not yet advanced by the pipeline.
    Spawned,
    Active,
    SwitchingLanes,
    /// Ran off a terminal section; removed when the frame completes.
    PendingDespawn,
}

/// Everything needed to instantiate one vehicle.
#[derive(Debug, Clone)]
pub struct VehicleBundle {
    pub pathing: VehiclePathing,
    pub target: VehicleTargetPosition,
    pub physics: VehiclePhysicsState,
}

/// Struct-of-arrays vehicle population. Row `i` of every column belongs to the
/// same vehicle; removal keeps the relative order of survivors.
#[derive(Debug, Clone, Default)]
pub struct VehicleStore {
    pub ids: Vec<VehicleId>,
    pub pathing: Vec<VehiclePathing>,
    pub targets: Vec<VehicleTargetPosition>,
    pub physics: Vec<VehiclePhysicsState>,
    pub transforms: Vec<VehicleTransform>,
    pub stages: Vec<VehicleStage>,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, bundle: VehicleBundle) {
        let transform = VehicleTransform {
            position: bundle.physics.position,
            rotation: spline::look_rotation(&bundle.physics.heading),
        };
        self.ids.push(bundle.pathing.vehicle_id);
        self.pathing.push(bundle.pathing);
        self.targets.push(bundle.target);
        self.physics.push(bundle.physics);
        self.transforms.push(transform);
        self.stages.push(VehicleStage::Spawned);
    }

    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.ids.iter().position(|&v| v == id)
    }

    /// Drops every row tagged `PendingDespawn`, returning how many went.
    pub fn remove_pending(&mut self) -> usize {
        let keep: Vec<bool> = self.stages
            .iter()
            .map(|&s| s != VehicleStage::PendingDespawn)
            .collect();
        let removed = keep.iter().filter(|&&k| !k).count();
        if removed == 0 {
            return 0;
        }

        retain_by_mask(&mut self.ids, &keep);
        retain_by_mask(&mut self.pathing, &keep);
        retain_by_mask(&mut self.targets, &keep);
        retain_by_mask(&mut self.physics, &keep);
        retain_by_mask(&mut self.transforms, &keep);
        retain_by_mask(&mut self.stages, &keep);
        removed
    }

    pub fn count_in_stage(&self, stage: VehicleStage) -> usize {
        self.stages.iter().filter(|&&s| s == stage).count()
    }
}

fn retain_by_mask<T>(column: &mut Vec<T>, keep: &[bool]) {
    let mut i = 0;
    column.retain(|_| {
        let k = keep[i];
        i += 1;
        k
    });
}

#[derive(Debug, Clone)]
pub struct SimulationState {
    pub vehicles: VehicleStore,
    pub time: f32,
    pub dt: f32,
    pub frame: u64,
    pub total_spawned: u32,
    pub total_despawned: u32,
}

impl SimulationState {
    pub fn new(dt: f32) -> Self {
        Self {
            vehicles: VehicleStore::new(),
            time: 0.0,
            dt,
            frame: 0,
            total_spawned: 0,
            total_despawned: 0,
        }
    }

    pub fn active_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    pub fn average_speed(&self) -> f32 {
        if self.vehicles.is_empty() {
            return 0.0;
        }
        self.vehicles.pathing.iter().map(|p| p.speed).sum::<f32>() / self.vehicles.len() as f32
    }

    pub fn get_speed_distribution(&self, num_buckets: usize) -> Vec<usize> {
        let mut distribution = vec![0; num_buckets];

        if self.vehicles.is_empty() || num_buckets == 0 {
            return distribution;
        }

        let max_speed = self.vehicles.pathing
            .iter()
            .map(|p| p.speed)
            .fold(0.0, f32::max);

        if max_speed == 0.0 {
            return distribution;
        }

        let bucket_size = max_speed / num_buckets as f32;

        for pathing in &self.vehicles.pathing {
            let bucket_index = ((pathing.speed / bucket_size) as usize).min(num_buckets - 1);
            distribution[bucket_index] += 1;
        }

        distribution
    }
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub frame_time: Duration,
    pub simulation_time: Duration,
}

#[derive(Debug)]
pub struct PerformanceTracker {
    samples: VecDeque<PerformanceMetrics>,
    max_samples: usize,
    current_frame_start: Option<Instant>,
    current_sim_start: Option<Instant>,
    last_simulation_time: Duration,
}

impl PerformanceTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            current_frame_start: None,
            current_sim_start: None,
            last_simulation_time: Duration::ZERO,
        }
    }

    pub fn start_frame(&mut self) {
        self.current_frame_start = Some(Instant::now());
    }

    pub fn start_simulation(&mut self) {
        self.current_sim_start = Some(Instant::now());
    }

    pub fn end_simulation(&mut self) {
        if let Some(start) = self.current_sim_start.take() {
            self.last_simulation_time = start.elapsed();
        }
    }

    pub fn end_frame(&mut self) {
        if let Some(start) = self.current_frame_start.take() {
            let metrics = PerformanceMetrics {
                frame_time: start.elapsed(),
                simulation_time: self.last_simulation_time,
            };

            if self.samples.len() >= self.max_samples {
                self.samples.pop_front();
            }
            self.samples.push_back(metrics);
        }
    }

    pub fn average_frame_time(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.samples.iter().map(|s| s.frame_time).sum();
        total / self.samples.len() as u32
    }

    pub fn average_simulation_time(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.samples.iter().map(|s| s.simulation_time).sum();
        total / self.samples.len() as u32
    }

    pub fn fps(&self) -> f32 {
        let avg_frame_time = self.average_frame_time();
        if avg_frame_time.is_zero() {
            return 0.0;
        }
        1.0 / avg_frame_time.as_secs_f32()
    }
}
