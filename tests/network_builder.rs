use anyhow::Result;
use megacity_traffic::config::{NetworkConfig, SimulationConfig, Validate};
use megacity_traffic::simulation::*;
use megacity_traffic::TrafficError;

fn downtown() -> Result<BuiltNetwork> {
    let config = SimulationConfig::load_from_files("network.toml", "traffic.toml")?;
    Ok(RoadNetworkBuilder::new(Some(42)).build(&config.network)?)
}

fn parse(toml_src: &str) -> NetworkConfig {
    toml::from_str(toml_src).expect("valid toml")
}

#[test]
fn test_sections_are_flattened_in_path_order() -> Result<()> {
    let built = downtown()?;
    let network = &built.network;

    // ring 9, exit_ramp 2, boulevard 3, approach 4
    assert_eq!(network.len(), 18);
    for (i, rs) in network.sections.iter().enumerate() {
        assert_eq!(rs.sort_index, i);
        assert!((1..=16).contains(&rs.occupation_limit));
        assert!(rs.arc_length > 0.0);
    }

    // Within a path every section leads to the next.
    assert_eq!(network.section(0).link_next, Some(1));
    assert_eq!(network.section(9).link_next, Some(10));
    assert_eq!(network.section(12).link_next, Some(13));
    assert_eq!(network.section(13).link_next, None);
    assert_eq!(network.section(17).link_next, None);

    println!("✓ {} sections flattened", network.len());
    Ok(())
}

#[test]
fn test_ramp_and_merge_links() -> Result<()> {
    let built = downtown()?;
    let network = &built.network;

    // The ramp starts where ring section 3 starts, so section 2 branches.
    let branch = network.section(2);
    assert_eq!(branch.link_next, Some(3));
    assert_eq!(branch.link_extra, Some(9));
    assert!((branch.link_extra_chance - 0.3).abs() < 1e-6);

    let linked_extra: Vec<usize> = network
        .sections
        .iter()
        .enumerate()
        .filter(|(_, rs)| rs.link_extra.is_some())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(linked_extra, vec![2]);

    // Closed ring merges back onto its own start.
    assert_eq!(network.section(8).link_next, Some(0));
    // Ramp end merges onto the boulevard.
    assert_eq!(network.section(10).link_next, Some(11));

    Ok(())
}

#[test]
fn test_spawners_sit_on_entry_paths() -> Result<()> {
    let built = downtown()?;

    let roads: Vec<usize> = built.spawners.iter().map(|s| s.road_index).collect();
    assert_eq!(roads, vec![0, 11, 14]);

    let masks: Vec<u32> = built.spawners.iter().map(|s| s.pool_mask).collect();
    assert_eq!(masks, vec![0, 3, 4]);

    for spawner in &built.spawners {
        let rs = built.network.section(spawner.road_index);
        assert_eq!(spawner.lane, constants::SPAWN_LANE);
        assert!((spawner.curve_pos - rs.vehicle_half_len).abs() < 1e-6);
        assert!((spawner.direction.norm() - 1.0).abs() < 1e-4);
        assert!(spawner.delay >= constants::VEHICLE_LENGTH as u32);
    }

    Ok(())
}

#[test]
fn test_reversed_path_starts_at_last_node() -> Result<()> {
    let built = downtown()?;
    let approach = built.network.section(14);

    // origin [0, 60, -300] plus the last authored node [0, 0, 0]
    assert!((approach.p1 - Point::new(0.0, 60.0, -300.0)).norm() < 1e-4);
    assert!((built.network.section(17).p2 - Point::new(600.0, 60.0, -300.0)).norm() < 1e-4);
    Ok(())
}

#[test]
fn test_same_seed_builds_same_spawners() -> Result<()> {
    let a = downtown()?;
    let b = downtown()?;

    let delays_a: Vec<u32> = a.spawners.iter().map(|s| s.delay).collect();
    let delays_b: Vec<u32> = b.spawners.iter().map(|s| s.delay).collect();
    assert_eq!(delays_a, delays_b);
    assert_eq!(a.network.sections, b.network.sections);
    Ok(())
}

#[test]
fn test_endpoints_match_within_rounding() {
    let config = parse(
        r#"
        [network]
        name = "Nudge"

        [[network.paths]]
        id = "first"
        nodes = [[0.0, 0.0, 0.0], [100.03, 0.0, 0.0]]
        width = 16.0
        min_speed = 5.0
        max_speed = 10.0

        [[network.paths]]
        id = "second"
        nodes = [[100.0, 0.0, 0.0], [200.0, 0.0, 0.0]]
        width = 16.0
        min_speed = 5.0
        max_speed = 10.0
        "#,
    );

    let built = RoadNetworkBuilder::new(None).build(&config).expect("builds");
    assert_eq!(built.network.section(0).link_next, Some(1));

    assert_eq!(
        PositionKey::from_point(&Point::new(100.0, 0.0, 0.0)),
        PositionKey::from_point(&Point::new(100.04, 0.0, 0.0))
    );
    assert_ne!(
        PositionKey::from_point(&Point::new(100.0, 0.0, 0.0)),
        PositionKey::from_point(&Point::new(100.2, 0.0, 0.0))
    );
}

#[test]
fn test_short_path_is_rejected() {
    let config = parse(
        r#"
        [network]
        name = "Stub"

        [[network.paths]]
        id = "stub"
        nodes = [[0.0, 0.0, 0.0]]
        width = 16.0
        min_speed = 5.0
        max_speed = 10.0
        "#,
    );

    assert!(config.validate().is_err());
    match RoadNetworkBuilder::new(None).build(&config) {
        Err(TrafficError::PathTooShort(id)) => assert_eq!(id, "stub"),
        other => panic!("expected PathTooShort, got {:?}", other.map(|b| b.network.len())),
    }
}

#[test]
fn test_degenerate_section_is_rejected() {
    let config = parse(
        r#"
        [network]
        name = "Pinch"

        [[network.paths]]
        id = "pinch"
        nodes = [[50.0, 0.0, 0.0], [50.0, 0.0, 0.0]]
        width = 16.0
        min_speed = 5.0
        max_speed = 10.0
        "#,
    );

    let err = RoadNetworkBuilder::new(None).build(&config).err();
    assert!(
        matches!(err, Some(TrafficError::DegenerateSection { ref path, section: 0 }) if path == "pinch"),
        "{:?}",
        err
    );
}

#[test]
fn test_sections_near_query() -> Result<()> {
    let built = downtown()?;
    let network = &built.network;

    let on_ring = network.section(0).position(0.5);
    let near = network.sections_near(&on_ring, 5.0);
    assert!(near.contains(&0));

    assert!(network
        .sections_near(&Point::new(10_000.0, 0.0, 10_000.0), 50.0)
        .is_empty());
    Ok(())
}
