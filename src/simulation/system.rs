use log::{debug, info, trace};
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::behavior::{moderate_speeds, switch_lanes};
use super::constants::FIXED_TIMESTEP;
use super::hash::CellMap;
use super::network::{RoadNetwork, RoadNetworkBuilder};
use super::occupancy::*;
use super::pathing::{advance_paths, link_paths, position_lanes};
use super::physics::{move_vehicles, write_transforms};
use super::traffic::{mark_despawns, run_spawners, SpawnCommand, Spawner, VehiclePool};
use super::{
    Point, SimulationState, Vec3, VehicleId, VehiclePathing, VehiclePhysicsState, VehicleStage,
    VehicleStore, VehicleTargetPosition, VehicleTransform,
};
use crate::compute::{Access, Resource, TaskGraph, TaskId, WorkerPool};
use crate::config::{NetworkConfig, TrafficSettings, VehicleType};
use crate::error::TrafficResult;

/// External body the traffic avoids, typically the player's vehicle.
pub trait RigidBodySource: Send + Sync {
    fn position(&self) -> Point;
    fn velocity(&self) -> Vec3;
}

/// Outcome of one `TrafficSystem::update` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Setup is still waiting on a network or vehicle pool.
    pub deferred: bool,
    pub substeps: u32,
    pub spawned: usize,
    pub despawned: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn into_inner<T>(lock: RwLock<T>) -> T {
    lock.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Buffers moved out of the store and the system for the duration of a frame.
/// Each task locks only what it declared, so locks never contend.
struct FrameResources {
    pathing: RwLock<Vec<VehiclePathing>>,
    targets: RwLock<Vec<VehicleTargetPosition>>,
    physics: RwLock<Vec<VehiclePhysicsState>>,
    transforms: RwLock<Vec<VehicleTransform>>,
    stages: RwLock<Vec<VehicleStage>>,
    occupancy: RwLock<OccupancyGrid>,
    slot_writes: RwLock<SlotWriteBuffer>,
    cells: RwLock<CellMap>,
    spawners: RwLock<Vec<Spawner>>,
    spawn_commands: RwLock<Vec<SpawnCommand>>,
}

struct FrameContext<'a> {
    network: &'a RoadNetwork,
    pool: &'a VehiclePool,
    res: FrameResources,
    dt: f32,
    speed_factor: f32,
    player: Option<(Point, Vec3)>,
    despawned: AtomicUsize,
}

/// Owns the road network, occupancy buffers and spawners, and drives one
/// frame of traffic per `update`.
pub struct TrafficSystem {
    settings: TrafficSettings,
    network_config: Option<NetworkConfig>,
    pool: VehiclePool,
    network: RoadNetwork,
    spawners: Vec<Spawner>,
    occupancy: OccupancyGrid,
    slot_writes: SlotWriteBuffer,
    cells: CellMap,
    player: Option<Arc<dyn RigidBodySource>>,
    accumulator: f32,
    next_vehicle_id: u32,
    initialized: bool,
}

impl TrafficSystem {
    pub fn new(settings: TrafficSettings, network_config: Option<NetworkConfig>) -> Self {
        let pool = VehiclePool::new(settings.vehicles.clone());
        Self {
            settings,
            network_config,
            pool,
            network: RoadNetwork::default(),
            spawners: Vec::new(),
            occupancy: OccupancyGrid::default(),
            slot_writes: SlotWriteBuffer::new(),
            cells: CellMap::new(),
            player: None,
            accumulator: 0.0,
            next_vehicle_id: 1,
            initialized: false,
        }
    }

    /// Replaces the authored network. The graph is rebuilt on the next update,
    /// which also removes every live vehicle since their road indices belong
    /// to the old graph.
    pub fn set_network(&mut self, config: NetworkConfig) {
        self.network_config = Some(config);
        self.initialized = false;
    }

    pub fn set_vehicle_pool(&mut self, vehicles: Vec<VehicleType>) {
        self.settings.vehicles = vehicles.clone();
        self.pool = VehiclePool::new(vehicles);
    }

    pub fn set_player_reference(&mut self, player: Arc<dyn RigidBodySource>) {
        self.player = Some(player);
    }

    pub fn clear_player_reference(&mut self) {
        self.player = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn settings(&self) -> &TrafficSettings {
        &self.settings
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn spawners(&self) -> &[Spawner] {
        &self.spawners
    }

    pub fn vehicle_pool(&self) -> &VehiclePool {
        &self.pool
    }

    /// Occupancy as of the last completed frame.
    pub fn occupancy(&self) -> &OccupancyGrid {
        &self.occupancy
    }

    /// Builds the network and spawners once both inputs are present.
    /// Returns `Ok(false)` while anything is still missing.
    pub fn setup(&mut self) -> TrafficResult<bool> {
        if self.initialized {
            return Ok(true);
        }

        let Some(config) = self.network_config.as_ref() else {
            debug!("Traffic setup deferred: no road network");
            return Ok(false);
        };
        if self.pool.is_empty() {
            debug!("Traffic setup deferred: vehicle pool is empty");
            return Ok(false);
        }

        let built = RoadNetworkBuilder::new(self.settings.random.seed).build(config)?;
        if built.network.is_empty() {
            debug!("Traffic setup deferred: road network has no sections");
            return Ok(false);
        }

        self.occupancy = OccupancyGrid::new(built.network.len());
        self.network = built.network;
        self.spawners = built.spawners;
        self.initialized = true;

        info!(
            "Traffic ready: {} sections, {} spawners, {} vehicle types",
            self.network.len(),
            self.spawners.len(),
            self.pool.len()
        );
        Ok(true)
    }

    /// Drops vehicles left over from a previous road graph.
    fn reset_population(&mut self, state: &mut SimulationState) -> usize {
        self.accumulator = 0.0;
        let cleared = state.vehicles.len();
        if cleared > 0 {
            info!("Road network rebuilt, removing {} vehicles", cleared);
            state.vehicles = VehicleStore::new();
        }
        cleared
    }

    /// Task names of one frame grouped into the waves they run in.
    pub fn frame_schedule(substeps: u32, spawning: bool, has_player: bool) -> Vec<Vec<&'static str>> {
        let graph = frame_graph(substeps, spawning, has_player);
        graph
            .waves()
            .into_iter()
            .map(|wave| wave.into_iter().map(|id| graph.name(id)).collect())
            .collect()
    }

    fn consume_substeps(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut substeps = 0;
        while self.accumulator >= FIXED_TIMESTEP {
            self.accumulator -= FIXED_TIMESTEP;
            substeps += 1;
        }
        substeps
    }

    /// Advances one frame: runs the task graph on `workers`, then removes
    /// despawned vehicles and instantiates spawned ones.
    pub fn update(&mut self, state: &mut SimulationState, workers: &WorkerPool) -> TrafficResult<FrameReport> {
        let was_initialized = self.initialized;
        if !self.setup()? {
            return Ok(FrameReport {
                deferred: true,
                ..Default::default()
            });
        }
        let cleared = if was_initialized { 0 } else { self.reset_population(state) };

        let max_cars = self.settings.simulation.max_cars as usize;
        let substeps = self.consume_substeps(state.dt);
        let spawning = state.vehicles.len() < max_cars;
        let player = self.player.as_ref().map(|p| (p.position(), p.velocity()));

        let store = &mut state.vehicles;
        let ctx = FrameContext {
            network: &self.network,
            pool: &self.pool,
            res: FrameResources {
                pathing: RwLock::new(mem::take(&mut store.pathing)),
                targets: RwLock::new(mem::take(&mut store.targets)),
                physics: RwLock::new(mem::take(&mut store.physics)),
                transforms: RwLock::new(mem::take(&mut store.transforms)),
                stages: RwLock::new(mem::take(&mut store.stages)),
                occupancy: RwLock::new(mem::take(&mut self.occupancy)),
                slot_writes: RwLock::new(mem::take(&mut self.slot_writes)),
                cells: RwLock::new(mem::take(&mut self.cells)),
                spawners: RwLock::new(mem::take(&mut self.spawners)),
                spawn_commands: RwLock::new(Vec::new()),
            },
            dt: state.dt,
            speed_factor: self.settings.simulation.global_speed_factor,
            player,
            despawned: AtomicUsize::new(0),
        };

        frame_graph(substeps, spawning, player.is_some()).execute(&ctx, workers);

        let marked = ctx.despawned.load(Ordering::Relaxed);
        let res = ctx.res;
        store.pathing = into_inner(res.pathing);
        store.targets = into_inner(res.targets);
        store.physics = into_inner(res.physics);
        store.transforms = into_inner(res.transforms);
        store.stages = into_inner(res.stages);
        self.occupancy = into_inner(res.occupancy);
        self.slot_writes = into_inner(res.slot_writes);
        self.cells = into_inner(res.cells);
        self.spawners = into_inner(res.spawners);
        let commands = into_inner(res.spawn_commands);

        let despawned = store.remove_pending();
        debug_assert_eq!(despawned, marked);
        let despawned = despawned + cleared;
        let spawned = play_spawns(&mut self.next_vehicle_id, store, commands, max_cars);

        state.total_despawned += despawned as u32;
        state.total_spawned += spawned as u32;
        state.time += state.dt;
        state.frame += 1;

        trace!("frame {}: {} substeps, +{} -{} vehicles", state.frame, substeps, spawned, despawned);

        Ok(FrameReport {
            deferred: false,
            substeps,
            spawned,
            despawned,
        })
    }
}

/// Instantiates queued spawns in spawner order, up to the vehicle cap.
fn play_spawns(next_id: &mut u32, store: &mut VehicleStore, commands: Vec<SpawnCommand>, max_cars: usize) -> usize {
    let headroom = max_cars.saturating_sub(store.len());
    if commands.len() > headroom {
        debug!("Vehicle cap {} reached, dropping {} spawns", max_cars, commands.len() - headroom);
    }

    let mut spawned = 0;
    for command in commands.into_iter().take(headroom) {
        let id = VehicleId(*next_id);
        *next_id = next_id.checked_add(1).unwrap_or(1);
        store.push(command.into_bundle(id));
        spawned += 1;
    }
    spawned
}

fn frame_graph<'a>(substeps: u32, spawning: bool, has_player: bool) -> TaskGraph<'a, FrameContext<'a>> {
    use Access::{Read, Write};
    use Resource::*;

    let mut g: TaskGraph<'a, FrameContext<'a>> = TaskGraph::new();

    g.add("clear_occupancy", &[Write(Occupancy)], &[], |c| {
        write(&c.res.occupancy).clear(c.network.len());
    });
    g.add("clear_slot_writes", &[Write(SlotWrites)], &[], |c| {
        write(&c.res.slot_writes).clear();
    });

    g.add("path_advance", &[Write(Pathing), Write(Targets), Read(Physics)], &[], |c| {
        advance_paths(
            c.network,
            &mut write(&c.res.pathing),
            &mut write(&c.res.targets),
            &read(&c.res.physics),
            c.dt,
            c.speed_factor,
        );
    });
    g.add("path_link", &[Write(Pathing)], &[], |c| {
        link_paths(c.network, &mut write(&c.res.pathing));
    });
    g.add("lane_position", &[Write(Pathing), Write(Targets)], &[], |c| {
        position_lanes(c.network, &mut write(&c.res.pathing), &mut write(&c.res.targets), c.dt);
    });

    g.add("occupancy_aliasing", &[Read(Pathing), Write(SlotWrites)], &[], |c| {
        occupation_aliasing(c.network, &read(&c.res.pathing), &mut write(&c.res.slot_writes));
    });
    g.add("occupancy_fill", &[Read(SlotWrites), Write(Occupancy)], &[], |c| {
        occupation_fill(&mut write(&c.res.occupancy), &read(&c.res.slot_writes));
    });
    g.add("gap_fill", &[Write(Occupancy)], &[], |c| {
        occupation_gap_fill(&mut write(&c.res.occupancy));
    });
    g.add("gap_adjust", &[Write(Occupancy)], &[], |c| {
        occupation_gap_adjustment(&mut write(&c.res.occupancy), c.network);
    });
    g.add("gap_fill_2", &[Write(Occupancy)], &[], |c| {
        occupation_gap_fill_2(&mut write(&c.res.occupancy));
    });

    g.add("speed_moderate", &[Read(Occupancy), Write(Pathing)], &[], |c| {
        moderate_speeds(c.network, &read(&c.res.occupancy), &mut write(&c.res.pathing), c.dt);
    });
    let lane_switch = g.add(
        "lane_switch",
        &[Read(Occupancy), Write(Pathing), Write(Stages)],
        &[],
        |c| {
            switch_lanes(
                c.network,
                &read(&c.res.occupancy),
                &mut write(&c.res.pathing),
                &mut write(&c.res.stages),
            );
        },
    );

    let despawn = g.add("despawn", &[Read(Pathing), Write(Stages)], &[lane_switch], |c| {
        let marked = mark_despawns(&read(&c.res.pathing), &mut write(&c.res.stages));
        c.despawned.store(marked, Ordering::Relaxed);
    });
    let mut lifecycle = vec![despawn];
    if spawning {
        let spawn = g.add(
            "spawn",
            &[Read(Occupancy), Write(Spawners), Write(SpawnCommands)],
            &[lane_switch],
            |c| {
                run_spawners(
                    c.network,
                    &read(&c.res.occupancy),
                    c.pool,
                    &mut write(&c.res.spawners),
                    &mut write(&c.res.spawn_commands),
                );
            },
        );
        lifecycle.push(spawn);
    }

    // Movement starts once the frame's spawns and despawns are settled.
    let mut after: Vec<TaskId> = lifecycle;
    for _ in 0..substeps {
        let clear = g.add("clear_cells", &[Write(Cells)], &after, |c| {
            write(&c.res.cells).clear();
        });
        let mut previous = g.add("hash_vehicles", &[Read(Physics), Write(Cells)], &[clear], |c| {
            write(&c.res.cells).hash_vehicles(&read(&c.res.physics));
        });
        if has_player {
            previous = g.add("hash_player", &[Write(Cells)], &[previous], |c| {
                if let Some((position, velocity)) = c.player {
                    write(&c.res.cells).insert_player(position, velocity);
                }
            });
        }
        previous = g.add(
            "movement",
            &[Read(Cells), Read(Targets), Write(Physics)],
            &[previous],
            |c| {
                move_vehicles(&read(&c.res.cells), &read(&c.res.targets), &mut write(&c.res.physics), FIXED_TIMESTEP);
            },
        );
        after = vec![previous];
    }

    if substeps > 0 {
        g.add("transform_writeback", &[Read(Physics), Write(Transforms)], &after, |c| {
            write_transforms(&read(&c.res.physics), &mut write(&c.res.transforms));
        });
    }

    g
}
