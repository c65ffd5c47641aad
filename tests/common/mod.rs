#![allow(dead_code)]

use megacity_traffic::config::{NetworkConfig, TrafficSettings, VehicleType};
use megacity_traffic::simulation::{Point, RoadNetwork, RoadSection, VehicleId, VehiclePathing};

/// Straight sections laid end to end along +x, each linked to the next.
pub fn straight_chain(lengths: &[f32]) -> RoadNetwork {
    let mut start = 0.0;
    let mut sections = Vec::new();
    for (i, &len) in lengths.iter().enumerate() {
        let mut rs = RoadSection::straight(
            Point::new(start, 0.0, 0.0),
            Point::new(start + len, 0.0, 0.0),
            16.0,
            5.0,
            10.0,
        );
        rs.sort_index = i;
        rs.link_next = if i + 1 < lengths.len() { Some(i + 1) } else { None };
        sections.push(rs);
        start += len;
    }
    RoadNetwork::from_sections(sections)
}

pub fn vehicle(id: u32, road: usize, curve_pos: f32, lane: u8, speed: f32) -> VehiclePathing {
    let mut p = VehiclePathing::new(VehicleId(id), road, lane, id as u64);
    p.curve_pos = curve_pos;
    p.speed = speed;
    p
}

pub fn settings(max_cars: u32) -> TrafficSettings {
    let mut settings = TrafficSettings::new(
        max_cars,
        vec![
            VehicleType { id: "cab".into(), speed_multiplier: 1.0 },
            VehicleType { id: "van".into(), speed_multiplier: 0.8 },
        ],
    );
    settings.random.seed = Some(7);
    settings
}

/// One straight path with a spawner at its start and a terminal end.
pub fn straight_network() -> NetworkConfig {
    toml::from_str(
        r#"
        [network]
        name = "Straight"

        [[network.paths]]
        id = "main"
        nodes = [[0.0, 0.0, 0.0], [120.0, 0.0, 0.0], [240.0, 0.0, 0.0]]
        width = 16.0
        min_speed = 8.0
        max_speed = 12.0
        "#,
    )
    .expect("valid network")
}
