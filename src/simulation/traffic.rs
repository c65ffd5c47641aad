use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

use super::constants::*;
use super::network::RoadNetwork;
use super::occupancy::OccupancyGrid;
use super::{
    Point, Vec3, VehicleBundle, VehicleId, VehiclePathing, VehiclePhysicsState, VehicleStage,
    VehicleTargetPosition,
};
use crate::config::VehicleType;

/// Vehicle archetypes spawners choose from. Spawner masks index this list by
/// position, so at most 32 entries are addressable.
#[derive(Debug, Clone, Default)]
pub struct VehiclePool {
    entries: Vec<VehicleType>,
}

impl VehiclePool {
    pub fn new(entries: Vec<VehicleType>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VehicleType> {
        self.entries.get(index)
    }

    pub fn speed_multiplier(&self, index: usize) -> f32 {
        self.entries.get(index).map_or(1.0, |v| v.speed_multiplier)
    }

    /// Picks an entry allowed by `mask`. A mask with no bits inside the pool
    /// selects uniformly; otherwise one of the set bits is chosen uniformly.
    pub fn select_index(&self, rng: &mut StdRng, mask: u32) -> Option<usize> {
        select_pool_index(rng, mask, self.entries.len())
    }
}

pub fn select_pool_index(rng: &mut StdRng, mask: u32, pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }

    let valid = if pool_len >= 32 { u32::MAX } else { (1u32 << pool_len) - 1 };
    let allowed = mask & valid;
    if allowed == 0 {
        return Some(rng.gen_range(0..pool_len));
    }

    let pick = rng.gen_range(0..allowed.count_ones());
    let mut bits = allowed;
    for _ in 0..pick {
        bits &= bits - 1; // drop the lowest set bit
    }
    Some(bits.trailing_zeros() as usize)
}

fn spawn_delay(rng: &mut StdRng, inverse_speed: f32, low: f32, high: f32) -> u32 {
    let lo = (inverse_speed * low) as u32;
    let hi = (inverse_speed * high) as u32;
    let jitter = if hi > lo { rng.gen_range(lo..hi) } else { lo };
    VEHICLE_LENGTH as u32 + jitter
}

/// Fixed injection point at the start of an entry path.
#[derive(Debug, Clone)]
pub struct Spawner {
    pub road_index: usize,
    pub lane: u8,
    pub curve_pos: f32,
    pub position: Point,
    pub direction: Vec3,
    pub min_speed: f32,
    pub max_speed: f32,
    pub pool_mask: u32,
    /// Ticks until the next spawn attempt.
    pub delay: u32,
    pub random: StdRng,
}

impl Spawner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        road_index: usize,
        lane: u8,
        curve_pos: f32,
        position: Point,
        direction: Vec3,
        min_speed: f32,
        max_speed: f32,
        pool_mask: u32,
        mut random: StdRng,
    ) -> Self {
        let delay = spawn_delay(&mut random, 1.0 / min_speed.max(f32::EPSILON), 60.0, 120.0);
        Self {
            road_index,
            lane,
            curve_pos,
            position,
            direction,
            min_speed,
            max_speed,
            pool_mask,
            delay,
            random,
        }
    }

    /// True when no vehicle covers the spawn footprint in the spawn lane.
    pub fn footprint_clear(&self, network: &RoadNetwork, occupancy: &OccupancyGrid) -> bool {
        let rs = network.section(self.road_index);
        let start = rs.slot_for(self.curve_pos - rs.vehicle_half_len);
        let end = rs.slot_for(self.curve_pos + rs.vehicle_half_len);
        !occupancy.any_occupied(self.road_index, self.lane as usize, start, end)
    }

    fn reschedule(&mut self) {
        self.delay = spawn_delay(&mut self.random, 1.0 / self.min_speed.max(f32::EPSILON), 10.0, 120.0);
    }

    /// Counts down, and at zero tries to emit a spawn. Reschedules after every
    /// attempt, successful or not.
    pub fn tick(
        &mut self,
        index: usize,
        network: &RoadNetwork,
        occupancy: &OccupancyGrid,
        pool: &VehiclePool,
    ) -> Option<SpawnCommand> {
        if self.delay > 0 {
            self.delay -= 1;
            return None;
        }

        let command = if self.footprint_clear(network, occupancy) {
            pool.select_index(&mut self.random, self.pool_mask).map(|pool_index| SpawnCommand {
                spawner: index,
                pool_index,
                road_index: self.road_index,
                lane: self.lane,
                curve_pos: self.curve_pos,
                position: self.position,
                heading: self.direction,
                speed_mult: pool.speed_multiplier(pool_index),
                speed_range_selected: self.random.gen(),
                seed: self.random.gen_range(1..u32::MAX),
            })
        } else {
            None
        };

        self.reschedule();
        command
    }
}

/// A vehicle waiting to be instantiated once the frame completes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnCommand {
    pub spawner: usize,
    pub pool_index: usize,
    pub road_index: usize,
    pub lane: u8,
    pub curve_pos: f32,
    pub position: Point,
    pub heading: Vec3,
    pub speed_mult: f32,
    pub speed_range_selected: f32,
    pub seed: u32,
}

impl SpawnCommand {
    pub fn into_bundle(self, id: VehicleId) -> VehicleBundle {
        let mut pathing = VehiclePathing::new(id, self.road_index, self.lane, self.seed as u64);
        pathing.curve_pos = self.curve_pos;
        pathing.speed_mult = self.speed_mult;
        pathing.speed_range_selected = self.speed_range_selected;

        VehicleBundle {
            pathing,
            target: VehicleTargetPosition {
                ideal_position: self.position,
                ideal_speed: 0.0,
            },
            physics: VehiclePhysicsState {
                position: self.position,
                heading: self.heading,
                speed_mult: self.speed_mult,
                ..Default::default()
            },
        }
    }
}

/// Ticks every spawner, collecting commands in spawner order.
pub fn run_spawners(
    network: &RoadNetwork,
    occupancy: &OccupancyGrid,
    pool: &VehiclePool,
    spawners: &mut [Spawner],
    commands: &mut Vec<SpawnCommand>,
) {
    let emitted: Vec<SpawnCommand> = spawners
        .par_iter_mut()
        .enumerate()
        .filter_map(|(i, spawner)| spawner.tick(i, network, occupancy, pool))
        .collect();
    commands.extend(emitted);
}

/// Tags vehicles that ran off a terminal section. Returns how many were tagged.
pub fn mark_despawns(pathing: &[VehiclePathing], stages: &mut [VehicleStage]) -> usize {
    pathing
        .par_iter()
        .zip(stages.par_iter_mut())
        .map(|(p, stage)| {
            if p.curve_pos >= 1.0 {
                *stage = VehicleStage::PendingDespawn;
                1
            } else {
                0
            }
        })
        .sum()
}
