mod common;

use megacity_traffic::config::VehicleType;
use megacity_traffic::simulation::constants::*;
use megacity_traffic::simulation::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use common::{straight_chain, vehicle};

fn pool() -> VehiclePool {
    VehiclePool::new(vec![
        VehicleType { id: "cab".into(), speed_multiplier: 1.0 },
        VehicleType { id: "courier".into(), speed_multiplier: 1.2 },
        VehicleType { id: "freighter".into(), speed_multiplier: 0.8 },
    ])
}

fn spawner_on(network: &RoadNetwork, mask: u32, seed: u64) -> Spawner {
    let rs = network.section(0);
    let curve_pos = rs.vehicle_half_len;
    Spawner::new(
        0,
        SPAWN_LANE,
        curve_pos,
        rs.position(curve_pos),
        Vec3::x(),
        rs.min_speed,
        rs.max_speed,
        mask,
        StdRng::seed_from_u64(seed),
    )
}

fn rebuilt(network: &RoadNetwork, vehicles: &[VehiclePathing]) -> OccupancyGrid {
    let mut grid = OccupancyGrid::new(network.len());
    let mut writes = SlotWriteBuffer::new();
    rebuild_occupancy(&mut grid, &mut writes, network, vehicles);
    grid
}

#[test]
fn test_initial_delay_range() {
    let network = straight_chain(&[100.0]);
    for seed in 0..50 {
        let spawner = spawner_on(&network, 0, seed);
        // min speed 5: VEHICLE_LENGTH + [60 / 5, 120 / 5)
        assert!((22..34).contains(&spawner.delay), "delay {}", spawner.delay);
    }
}

#[test]
fn test_delay_counts_down() {
    let network = straight_chain(&[100.0]);
    let grid = rebuilt(&network, &[]);
    let mut spawner = spawner_on(&network, 0, 1);
    spawner.delay = 3;

    assert!(spawner.tick(0, &network, &grid, &pool()).is_none());
    assert_eq!(spawner.delay, 2);
}

#[test]
fn test_blocked_footprint_reschedules() {
    let network = straight_chain(&[100.0]);
    let blocker = vehicle(1, 0, 0.05, SPAWN_LANE, 0.0);
    let grid = rebuilt(&network, &[blocker]);

    let mut spawner = spawner_on(&network, 0, 3);
    spawner.delay = 0;
    assert!(!spawner.footprint_clear(&network, &grid));

    let command = spawner.tick(0, &network, &grid, &pool());
    assert!(command.is_none());
    // VEHICLE_LENGTH + [10 / 5, 120 / 5)
    assert!(spawner.delay >= VEHICLE_LENGTH as u32);
    assert!(spawner.delay < VEHICLE_LENGTH as u32 + 24);
}

#[test]
fn test_other_lane_does_not_block() {
    let network = straight_chain(&[100.0]);
    let beside = vehicle(1, 0, 0.05, 0, 0.0);
    let grid = rebuilt(&network, &[beside]);

    let spawner = spawner_on(&network, 0, 3);
    assert!(spawner.footprint_clear(&network, &grid));
}

#[test]
fn test_clear_footprint_emits_command() {
    let network = straight_chain(&[100.0]);
    let grid = rebuilt(&network, &[]);
    let pool = pool();

    let mut spawner = spawner_on(&network, 0b010, 11);
    spawner.delay = 0;

    let command = spawner.tick(4, &network, &grid, &pool).expect("spawn command");
    assert_eq!(command.spawner, 4);
    assert_eq!(command.pool_index, 1);
    assert_eq!(command.road_index, 0);
    assert_eq!(command.lane, SPAWN_LANE);
    assert_eq!(command.speed_mult, 1.2);
    assert!((0.0..1.0).contains(&command.speed_range_selected));
    assert!(command.seed >= 1);
    assert!(spawner.delay >= VEHICLE_LENGTH as u32);

    let bundle = command.clone().into_bundle(VehicleId(17));
    assert_eq!(bundle.pathing.vehicle_id, VehicleId(17));
    assert_eq!(bundle.pathing.lane_index, SPAWN_LANE);
    assert_eq!(bundle.pathing.wanted_lane_index, SPAWN_LANE);
    assert_eq!(bundle.pathing.curve_pos, command.curve_pos);
    assert_eq!(bundle.pathing.speed, 0.0);
    assert_eq!(bundle.physics.position, command.position);
    assert_eq!(bundle.physics.speed_mult, 1.2);
}

#[test]
fn test_run_spawners_keeps_spawner_order() {
    let network = straight_chain(&[100.0]);
    let grid = rebuilt(&network, &[]);
    let pool = pool();

    let mut spawners: Vec<Spawner> = (0..4).map(|i| spawner_on(&network, 0, i)).collect();
    spawners[1].delay = 0;
    spawners[3].delay = 0;

    let mut commands = Vec::new();
    run_spawners(&network, &grid, &pool, &mut spawners, &mut commands);

    let order: Vec<usize> = commands.iter().map(|c| c.spawner).collect();
    assert_eq!(order, vec![1, 3]);
}

#[test]
fn test_mask_selects_only_allowed_entries() {
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..200 {
        assert_eq!(select_pool_index(&mut rng, 0b100, 3), Some(2));
    }

    let mut seen = [0usize; 3];
    for _ in 0..600 {
        let index = select_pool_index(&mut rng, 0b101, 3).expect("non-empty pool");
        seen[index] += 1;
    }
    assert_eq!(seen[1], 0);
    assert!(seen[0] > 200 && seen[2] > 200, "{:?}", seen);
}

#[test]
fn test_empty_mask_selects_uniformly() {
    let mut rng = StdRng::seed_from_u64(9);

    for mask in [0u32, 0b1000] {
        let mut seen = [0usize; 3];
        for _ in 0..900 {
            let index = select_pool_index(&mut rng, mask, 3).expect("non-empty pool");
            seen[index] += 1;
        }
        assert!(seen.iter().all(|&n| n > 200), "mask {:#b}: {:?}", mask, seen);
    }
}

#[test]
fn test_empty_pool_selects_nothing() {
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(select_pool_index(&mut rng, u32::MAX, 0), None);
    assert_eq!(VehiclePool::default().select_index(&mut rng, 1), None);
}
