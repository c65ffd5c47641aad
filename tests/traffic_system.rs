mod common;

use anyhow::Result;
use megacity_traffic::compute::WorkerPool;
use megacity_traffic::config::{NetworkConfig, TrafficSettings, VehicleType};
use megacity_traffic::simulation::*;
use std::sync::Arc;

use common::{settings, straight_network};

struct ParkedPlayer {
    position: Point,
}

impl RigidBodySource for ParkedPlayer {
    fn position(&self) -> Point {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        Vec3::zeros()
    }
}

#[test]
fn test_setup_waits_for_network() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(settings(10), None);
    let mut state = SimulationState::new(1.0 / 60.0);

    let report = system.update(&mut state, &workers)?;
    assert!(report.deferred);
    assert!(!system.is_initialized());
    assert_eq!(state.frame, 0);

    system.set_network(straight_network());
    let report = system.update(&mut state, &workers)?;
    assert!(!report.deferred);
    assert!(system.is_initialized());
    assert_eq!(system.network().len(), 2);
    assert_eq!(system.spawners().len(), 1);
    assert_eq!(system.occupancy().sections(), 2);
    assert_eq!(state.frame, 1);
    Ok(())
}

fn short_network() -> NetworkConfig {
    toml::from_str(
        r#"
        [network]
        name = "Short"

        [[network.paths]]
        id = "stub"
        nodes = [[0.0, 0.0, 0.0], [100.0, 0.0, 0.0]]
        width = 16.0
        min_speed = 8.0
        max_speed = 12.0
        "#,
    )
    .expect("valid network")
}

fn wave_index(schedule: &[Vec<&'static str>], name: &str) -> usize {
    schedule
        .iter()
        .position(|wave| wave.contains(&name))
        .unwrap_or_else(|| panic!("{} not scheduled", name))
}

#[test]
fn test_network_swap_clears_live_vehicles() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(settings(10), Some(straight_network()));
    let mut state = SimulationState::new(1.0 / 60.0);

    // Run until someone sits on a section the replacement network lacks.
    for _ in 0..3000 {
        system.update(&mut state, &workers)?;
        if state.vehicles.pathing.iter().any(|p| p.road_index == 1) {
            break;
        }
    }
    assert!(state.vehicles.pathing.iter().any(|p| p.road_index == 1));
    let live = state.active_vehicles();

    system.set_network(short_network());
    let report = system.update(&mut state, &workers)?;
    assert!(!report.deferred);
    assert_eq!(report.despawned, live);
    assert_eq!(system.network().len(), 1);
    assert_eq!(state.active_vehicles(), report.spawned);

    for _ in 0..600 {
        system.update(&mut state, &workers)?;
        assert!(state.vehicles.pathing.iter().all(|p| p.road_index == 0));
    }
    assert_eq!(
        (state.total_spawned - state.total_despawned) as usize,
        state.active_vehicles()
    );
    println!("✓ {} vehicles dropped on network swap", live);
    Ok(())
}

#[test]
fn test_movement_waits_for_spawn_and_despawn() {
    let schedule = TrafficSystem::frame_schedule(2, true, false);
    let first_clear = wave_index(&schedule, "clear_cells");
    assert!(first_clear > wave_index(&schedule, "despawn"));
    assert!(first_clear > wave_index(&schedule, "spawn"));
    assert!(wave_index(&schedule, "transform_writeback") > wave_index(&schedule, "movement"));

    // Without spawning the chain still waits on despawn.
    let schedule = TrafficSystem::frame_schedule(1, false, true);
    assert!(wave_index(&schedule, "clear_cells") > wave_index(&schedule, "despawn"));
    assert!(wave_index(&schedule, "hash_player") > wave_index(&schedule, "hash_vehicles"));
    assert!(!schedule.iter().flatten().any(|&n| n == "spawn"));
}

#[test]
fn test_setup_waits_for_vehicle_pool() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(TrafficSettings::new(10, Vec::new()), Some(straight_network()));
    let mut state = SimulationState::new(1.0 / 60.0);

    assert!(system.update(&mut state, &workers)?.deferred);

    system.set_vehicle_pool(vec![VehicleType { id: "cab".into(), speed_multiplier: 1.0 }]);
    assert!(!system.update(&mut state, &workers)?.deferred);
    assert_eq!(system.vehicle_pool().len(), 1);
    assert_eq!(system.settings().vehicles.len(), 1);
    Ok(())
}

#[test]
fn test_vehicle_cap_is_respected() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(settings(2), Some(straight_network()));
    let mut state = SimulationState::new(1.0 / 60.0);

    for frame in 0..4000 {
        system.update(&mut state, &workers)?;
        assert!(state.active_vehicles() <= 2, "{} vehicles at frame {}", state.active_vehicles(), frame);
    }
    assert!(state.total_spawned >= 1);

    // Ids are never reused while alive.
    let mut ids = state.vehicles.ids.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), state.active_vehicles());
    Ok(())
}

#[test]
fn test_substeps_follow_accumulated_time() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(settings(10), Some(straight_network()));

    let mut state = SimulationState::new(0.025);
    let mut substeps = 0;
    for _ in 0..60 {
        substeps += system.update(&mut state, &workers)?.substeps;
    }
    // 1.5 seconds of frames at a 1/60 step.
    assert!((89..=90).contains(&substeps), "{} substeps", substeps);

    let mut paused = SimulationState::new(0.0);
    let report = system.update(&mut paused, &workers)?;
    assert!(!report.deferred);
    assert!(report.substeps <= 1);
    let report = system.update(&mut paused, &workers)?;
    assert_eq!(report.substeps, 0);
    Ok(())
}

#[test]
fn test_spawned_vehicles_start_in_spawn_lane() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut system = TrafficSystem::new(settings(10), Some(straight_network()));
    let mut state = SimulationState::new(1.0 / 60.0);

    let mut first = None;
    for _ in 0..200 {
        let report = system.update(&mut state, &workers)?;
        if report.spawned > 0 {
            first = Some(state.vehicles.len() - 1);
            break;
        }
    }

    let index = first.expect("a spawn within 200 frames");
    assert_eq!(state.vehicles.ids[index], VehicleId(1));
    assert_eq!(state.vehicles.stages[index], VehicleStage::Spawned);
    assert_eq!(state.vehicles.pathing[index].lane_index, constants::SPAWN_LANE);
    assert_eq!(state.vehicles.pathing[index].road_index, 0);

    system.update(&mut state, &workers)?;
    assert_ne!(state.vehicles.stages[index], VehicleStage::Spawned);
    Ok(())
}

#[test]
fn test_player_body_deflects_traffic() -> Result<()> {
    let workers = WorkerPool::serial()?;
    let mut plain = TrafficSystem::new(settings(10), Some(straight_network()));
    let mut with_player = TrafficSystem::new(settings(10), Some(straight_network()));
    let mut plain_state = SimulationState::new(1.0 / 60.0);
    let mut player_state = SimulationState::new(1.0 / 60.0);

    plain.update(&mut plain_state, &workers)?;
    with_player.update(&mut player_state, &workers)?;

    let spawner = &with_player.spawners()[0];
    let parked = spawner.position + spawner.direction * 30.0;
    with_player.set_player_reference(Arc::new(ParkedPlayer { position: parked }));

    for _ in 0..1200 {
        plain.update(&mut plain_state, &workers)?;
        with_player.update(&mut player_state, &workers)?;
    }

    assert!(plain_state.total_spawned > 0);
    assert_ne!(plain_state.vehicles.physics, player_state.vehicles.physics);

    with_player.clear_player_reference();
    with_player.update(&mut player_state, &workers)?;
    println!("✓ player body changed {} vehicle paths", player_state.active_vehicles());
    Ok(())
}
