use rayon::prelude::*;

use super::constants::*;
use super::network::RoadNetwork;
use super::occupancy::OccupancyGrid;
use super::{VehiclePathing, VehicleStage};

/// Road index and slot one slot ahead of the vehicle's front bumper.
fn look_ahead_slot(network: &RoadNetwork, p: &VehiclePathing) -> (usize, usize) {
    let rs = network.section(p.road_index);
    let front = p.curve_pos + rs.vehicle_half_len;
    let slot = rs.raw_slot(front).max(-1) + 1;

    if slot < rs.occupation_limit as i64 {
        return (p.road_index, slot as usize);
    }
    match rs.link_next {
        Some(next) => (next, 0),
        None => (p.road_index, rs.occupation_limit - 1),
    }
}

/// Relaxes each vehicle's speed toward what the road ahead allows and flags
/// vehicles held well below their wanted speed.
pub fn moderate_speeds(
    network: &RoadNetwork,
    occupancy: &OccupancyGrid,
    pathing: &mut [VehiclePathing],
    dt: f32,
) {
    pathing
        .par_iter_mut()
        .for_each(|p| moderate_speed(network, occupancy, p, dt));
}

pub fn moderate_speed(network: &RoadNetwork, occupancy: &OccupancyGrid, p: &mut VehiclePathing, dt: f32) {
    let (road, slot) = look_ahead_slot(network, p);
    let rs = network.section(road);

    let wanted_speed = p.speed_mult * lerp(rs.min_speed, rs.max_speed, p.speed_range_selected);
    let ahead = occupancy.get(road, slot, p.lane_index as usize);

    p.target_speed = wanted_speed.min(ahead.speed);
    p.speed = lerp(p.speed, p.target_speed, dt.min(1.0));
    p.want_new_lane = (p.target_speed - wanted_speed).abs() > WANT_NEW_LANE_RATIO * wanted_speed;
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Slots `slot-1 ..= slot+1` around the vehicle, clamped to the section.
fn switch_window(network: &RoadNetwork, p: &VehiclePathing) -> (usize, usize) {
    let rs = network.section(p.road_index);
    let slot = rs.raw_slot(p.curve_pos);
    let start = (slot - 1).max(0) as usize;
    let end = ((slot + 1).max(0) as usize).min(rs.occupation_limit - 1);
    (start.min(end), end)
}

/// Speed a candidate lane offers at the rear of the window. Stopped or empty
/// readings count as unlimited.
fn lane_speed(occupancy: &OccupancyGrid, road: usize, slot: usize, lane: u8) -> f32 {
    let speed = occupancy.get(road, slot, lane as usize).speed;
    if speed <= 0.0 {
        f32::MAX
    } else {
        speed
    }
}

fn neighbour_lanes(lane: u8) -> &'static [u8] {
    match lane {
        0 => &[1],
        1 => &[0, 2],
        2 => &[1],
        _ => &[],
    }
}

/// Aborts lane changes that became unsafe and starts new ones for vehicles
/// that asked for a faster lane. Also retags each vehicle's stage.
pub fn switch_lanes(
    network: &RoadNetwork,
    occupancy: &OccupancyGrid,
    pathing: &mut [VehiclePathing],
    stages: &mut [VehicleStage],
) {
    pathing
        .par_iter_mut()
        .zip(stages.par_iter_mut())
        .for_each(|(p, stage)| {
            switch_lane(network, occupancy, p);
            if *stage != VehicleStage::PendingDespawn {
                *stage = if p.is_switching_lanes() {
                    VehicleStage::SwitchingLanes
                } else {
                    VehicleStage::Active
                };
            }
        });
}

pub fn switch_lane(network: &RoadNetwork, occupancy: &OccupancyGrid, p: &mut VehiclePathing) {
    let road = p.road_index;
    let (start, end) = switch_window(network, p);

    if p.is_switching_lanes() {
        if p.lane_switch_delay > 0 {
            p.lane_switch_delay -= 1;
        } else if occupancy.occupied_by_other(road, p.wanted_lane_index as usize, start, end, p.vehicle_id.raw()) {
            std::mem::swap(&mut p.lane_index, &mut p.wanted_lane_index);
            p.lane_tween = 1.0 - p.lane_tween;
            p.lane_switch_delay = LANE_SWITCH_DELAY;
        }
        return;
    }

    if !p.want_new_lane {
        return;
    }

    let candidate = neighbour_lanes(p.lane_index).iter().copied().find(|&lane| {
        lane_speed(occupancy, road, start, lane) > p.speed
            && !occupancy.any_occupied(road, lane as usize, start, end)
    });

    if let Some(lane) = candidate {
        p.wanted_lane_index = lane;
        p.lane_tween = 0.0;
    }
}
