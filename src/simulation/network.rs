use std::collections::HashMap;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::constants::*;
use super::spline;
use super::traffic::Spawner;
use super::{Point, Vec3};
use crate::config::{NetworkConfig, PathConfig};
use crate::error::{TrafficError, TrafficResult};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// One Catmull-Rom segment of the road graph. Immutable once the network is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSection {
    pub p0: Point,
    pub p1: Point,
    pub p2: Point,
    pub p3: Point,
    pub arc_length: f32,
    pub width: f32,
    pub height: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Occupancy slots in use, 1..=ROAD_OCCUPATION_SLOTS_MAX.
    pub occupation_limit: usize,
    pub link_next: Option<usize>,
    pub link_extra: Option<usize>,
    pub link_extra_chance: f32,
    /// Half the vehicle length as a fraction of `arc_length`.
    pub vehicle_half_len: f32,
    pub sort_index: usize,
}

impl RoadSection {
    /// Builds a section from four control points, deriving arc length, slot
    /// count and vehicle footprint. Links start out terminal.
    pub fn from_control_points(
        p0: Point,
        p1: Point,
        p2: Point,
        p3: Point,
        width: f32,
        min_speed: f32,
        max_speed: f32,
    ) -> Self {
        let arc_length = spline::arc_length(&p0, &p1, &p2, &p3, ARC_LENGTH_SAMPLES);
        let occupation_limit = ((arc_length / VEHICLE_LENGTH).round() as usize)
            .clamp(1, ROAD_OCCUPATION_SLOTS_MAX);

        Self {
            p0,
            p1,
            p2,
            p3,
            arc_length,
            width,
            height: 5.0,
            min_speed,
            max_speed,
            occupation_limit,
            link_next: None,
            link_extra: None,
            link_extra_chance: 0.0,
            vehicle_half_len: VEHICLE_LENGTH / arc_length.max(f32::EPSILON) / 2.0,
            sort_index: 0,
        }
    }

    /// A straight section from `start` to `end`; handy for tests and tooling.
    pub fn straight(start: Point, end: Point, width: f32, min_speed: f32, max_speed: f32) -> Self {
        let d = end - start;
        Self::from_control_points(start - d, start, end, end + d, width, min_speed, max_speed)
    }

    pub fn position(&self, t: f32) -> Point {
        spline::position(&self.p0, &self.p1, &self.p2, &self.p3, t)
    }

    pub fn tangent(&self, t: f32) -> Vec3 {
        spline::tangent(&self.p0, &self.p1, &self.p2, &self.p3, t)
    }

    pub fn concavity(&self, t: f32) -> Vec3 {
        spline::concavity(&self.p0, &self.p1, &self.p2, &self.p3, t)
    }

    pub fn orientation(&self, t: f32) -> nalgebra::UnitQuaternion<f32> {
        spline::orientation(&self.p0, &self.p1, &self.p2, &self.p3, t)
    }

    /// Occupancy slot holding `curve_pos`, clamped into this section.
    pub fn slot_for(&self, curve_pos: f32) -> usize {
        let slot = (curve_pos * self.occupation_limit as f32).floor();
        if slot <= 0.0 {
            0
        } else {
            (slot as usize).min(self.occupation_limit - 1)
        }
    }

    /// Unclamped slot; may exceed `occupation_limit` when the footprint
    /// spills into the successor.
    pub fn raw_slot(&self, curve_pos: f32) -> i64 {
        (curve_pos * self.occupation_limit as f32).floor() as i64
    }

    fn squared_distance_to_bounds(&self, point: &Point) -> f32 {
        let min = self.p1.coords.inf(&self.p2.coords);
        let max = self.p1.coords.sup(&self.p2.coords);
        let mut sq = 0.0;
        for axis in 0..3 {
            let v = point[axis];
            if v < min[axis] {
                sq += (min[axis] - v) * (min[axis] - v);
            } else if v > max[axis] {
                sq += (v - max[axis]) * (v - max[axis]);
            }
        }
        sq
    }
}

/// The flattened road graph. `sections[i].sort_index == i`.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    pub sections: Vec<RoadSection>,
}

impl RoadNetwork {
    /// Takes sections in any order and places each at its `sort_index`.
    pub fn from_sections(mut sections: Vec<RoadSection>) -> Self {
        sections.sort_by_key(|s| s.sort_index);
        for (i, section) in sections.iter_mut().enumerate() {
            section.sort_index = i;
        }
        Self { sections }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, index: usize) -> &RoadSection {
        &self.sections[index]
    }

    pub fn get(&self, index: usize) -> Option<&RoadSection> {
        self.sections.get(index)
    }

    /// Sections whose `p1..p2` bounding box overlaps the sphere.
    pub fn sections_near(&self, center: &Point, radius: f32) -> Vec<usize> {
        let radius_sq = radius * radius;
        self.sections
            .par_iter()
            .enumerate()
            .filter(|(_, rs)| rs.squared_distance_to_bounds(center) <= radius_sq)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Endpoint snapped to the node rounding grid so coincident nodes from
/// separately authored paths compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey(i32, i32, i32);

impl PositionKey {
    pub fn from_point(p: &Point) -> Self {
        PositionKey(
            (p.x * NODE_POSITION_ROUNDING).round() as i32,
            (p.y * NODE_POSITION_ROUNDING).round() as i32,
            (p.z * NODE_POSITION_ROUNDING).round() as i32,
        )
    }
}

#[derive(Debug)]
pub struct BuiltNetwork {
    pub network: RoadNetwork,
    pub spawners: Vec<Spawner>,
}

/// Flattens authored paths into sections, then wires ramps and merges by
/// matching rounded endpoint positions.
#[derive(Debug, Default)]
pub struct RoadNetworkBuilder {
    seed: Option<u64>,
    sections: Vec<RoadSection>,
    spawners: Vec<Spawner>,
    path_base: Vec<usize>,
    ramp_map: HashMap<PositionKey, usize>,
    merge_map: HashMap<PositionKey, usize>,
}

impl RoadNetworkBuilder {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn build(mut self, config: &NetworkConfig) -> TrafficResult<BuiltNetwork> {
        let paths = &config.network.paths;
        let nodes: Vec<Vec<Point>> = paths.iter().map(|p| p.world_nodes()).collect();

        for (path, path_nodes) in paths.iter().zip(&nodes) {
            self.add_path(path, path_nodes)?;
        }

        let mut ramps = 0;
        let mut merges = 0;
        for (i, (path, path_nodes)) in paths.iter().zip(&nodes).enumerate() {
            if path.on_ramp && self.link_ramp(i, path, path_nodes) {
                ramps += 1;
            }
            if self.link_merge(i, path, path_nodes) {
                merges += 1;
            }
        }

        info!(
            "Built road network '{}': {} sections, {} spawners, {} ramps, {} merges",
            config.network.name,
            self.sections.len(),
            self.spawners.len(),
            ramps,
            merges
        );

        Ok(BuiltNetwork {
            network: RoadNetwork::from_sections(self.sections),
            spawners: self.spawners,
        })
    }

    fn add_path(&mut self, path: &PathConfig, nodes: &[Point]) -> TrafficResult<()> {
        if nodes.len() < 2 {
            return Err(TrafficError::PathTooShort(path.id.clone()));
        }

        let base = self.sections.len();
        self.path_base.push(base);

        for n in 1..nodes.len() {
            let (p0, p1, p2, p3) = control_points(nodes, n - 1);
            let r_index = self.sections.len();

            let mut rs = RoadSection::from_control_points(
                p0, p1, p2, p3, path.width, path.min_speed, path.max_speed,
            );
            if rs.arc_length <= f32::EPSILON {
                return Err(TrafficError::DegenerateSection {
                    path: path.id.clone(),
                    section: n - 1,
                });
            }
            rs.height = path.height;
            rs.sort_index = r_index;
            rs.link_next = Some(r_index + 1);

            if n == nodes.len() - 1 {
                rs.link_next = None;
                self.merge_map.insert(PositionKey::from_point(&nodes[n]), r_index);
            }

            if !path.on_ramp {
                self.ramp_map.insert(PositionKey::from_point(&nodes[n - 1]), r_index);
                if n == 1 {
                    let spawner = self.make_spawner(path, &rs, r_index);
                    self.spawners.push(spawner);
                }
            }

            self.sections.push(rs);
        }

        Ok(())
    }

    fn make_spawner(&self, path: &PathConfig, rs: &RoadSection, r_index: usize) -> Spawner {
        let curve_pos = rs.vehicle_half_len.fract();
        let direction = rs.tangent(curve_pos).normalize();
        let right = spline::look_rotation(&direction) * Vec3::x();
        let lateral = (SPAWN_LANE as f32 - 1.0) * ((rs.width - VEHICLE_WIDTH) / 2.0);
        let position = rs.position(curve_pos) + right * lateral;

        let stream = (r_index as u64 + 1) ^ self.seed.unwrap_or(0).wrapping_mul(MIXING_CONSTANT);

        Spawner::new(
            r_index,
            SPAWN_LANE,
            curve_pos,
            position,
            direction,
            path.min_speed,
            path.max_speed,
            path.vehicle_selection,
            StdRng::seed_from_u64(stream),
        )
    }

    /// Gives the main-road section ending where the ramp starts a
    /// probabilistic `link_extra` onto the ramp.
    fn link_ramp(&mut self, path_index: usize, path: &PathConfig, nodes: &[Point]) -> bool {
        let entry = PositionKey::from_point(&nodes[0]);
        let ramp_base = self.path_base[path_index];

        let Some(&start) = self.ramp_map.get(&entry) else {
            debug!("On-ramp '{}' start matches no road section", path.id);
            return false;
        };
        if start == 0 {
            debug!("On-ramp '{}' joins the first section; no predecessor to branch from", path.id);
            return false;
        }

        let from = start - 1;
        let rs = &mut self.sections[from];
        if rs.link_next != Some(from + 1) {
            debug!("On-ramp '{}' joins a path start; no predecessor to branch from", path.id);
            return false;
        }

        rs.link_extra = Some(ramp_base);
        rs.link_extra_chance = path.on_ramp_chance / 100.0;
        true
    }

    /// Links a terminal section ending where this path starts onto the path.
    /// Only one predecessor per merge point is tracked.
    fn link_merge(&mut self, path_index: usize, path: &PathConfig, nodes: &[Point]) -> bool {
        let start = PositionKey::from_point(&nodes[0]);
        let to = self.path_base[path_index];

        let Some(&from) = self.merge_map.get(&start) else {
            return false;
        };
        if from == to {
            return false;
        }

        let rs = &mut self.sections[from];
        if rs.link_next.is_some() {
            return false;
        }

        debug!("Merging section {} into path '{}' at section {}", from, path.id, to);
        rs.link_next = Some(to);
        true
    }
}

/// Control points for the segment between `nodes[i]` and `nodes[i + 1]`,
/// extrapolating past either end of the path.
fn control_points(nodes: &[Point], i: usize) -> (Point, Point, Point, Point) {
    let p1 = nodes[i];
    let p2 = nodes[i + 1];
    let p0 = if i > 0 { nodes[i - 1] } else { p1 - (p2 - p1) };
    let p3 = if i + 2 < nodes.len() { nodes[i + 2] } else { p2 + (p2 - p1) };
    (p0, p1, p2, p3)
}
