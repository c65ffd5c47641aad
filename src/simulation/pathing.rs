use rand::Rng;
use rayon::prelude::*;

use super::constants::*;
use super::network::{RoadNetwork, RoadSection};
use super::{VehiclePathing, VehiclePhysicsState, VehicleTargetPosition, Vec3};

/// Moves every tethered vehicle along its section at constant real-world
/// speed and records the spline point it should be at.
pub fn advance_paths(
    network: &RoadNetwork,
    pathing: &mut [VehiclePathing],
    targets: &mut [VehicleTargetPosition],
    physics: &[VehiclePhysicsState],
    dt: f32,
    speed_factor: f32,
) {
    let dt = dt * speed_factor;
    pathing
        .par_iter_mut()
        .zip(targets.par_iter_mut())
        .zip(physics.par_iter())
        .for_each(|((p, target), body)| advance_path(network.section(p.road_index), p, target, body, dt));
}

pub fn advance_path(
    rs: &RoadSection,
    p: &mut VehiclePathing,
    target: &mut VehicleTargetPosition,
    body: &VehiclePhysicsState,
    dt: f32,
) {
    let ideal = rs.position(p.curve_pos);
    let curve_speed = rs.tangent(p.curve_pos).norm().max(f32::EPSILON);

    target.ideal_position = ideal;
    target.ideal_speed = p.speed;

    // Drifted vehicles hold their place until steering pulls them back.
    if (body.position - ideal).norm_squared() < MAX_TETHER_SQUARED {
        p.curve_pos += VEHICLE_SPEED_FUDGE / rs.arc_length * p.speed / curve_speed * dt;
    }
}

/// Hands vehicles that ran off the end of a section to the off-ramp or the
/// successor. Overshoot carries into the successor only. Vehicles on terminal sections keep `curve_pos >= 1` so the
/// despawn pass picks them up.
pub fn link_paths(network: &RoadNetwork, pathing: &mut [VehiclePathing]) {
    pathing.par_iter_mut().for_each(|p| link_path(network, p));
}

pub fn link_path(network: &RoadNetwork, p: &mut VehiclePathing) {
    if p.curve_pos < 1.0 {
        return;
    }

    let rs = network.section(p.road_index);
    let draw: f32 = p.random.gen();

    match rs.link_extra {
        // Ramps are entered from their start.
        Some(extra) if draw < rs.link_extra_chance => {
            p.road_index = extra;
            p.curve_pos = 0.0;
        }
        _ => {
            if let Some(next) = rs.link_next {
                let overshoot = (p.curve_pos - 1.0) * rs.arc_length;
                let next_arc = network.section(next).arc_length.max(f32::EPSILON);
                p.road_index = next;
                p.curve_pos = (overshoot / next_arc).clamp(0.0, 1.0 - f32::EPSILON);
            }
        }
    }
}

fn lane_offset(lane: u8, right: &Vec3, width: f32) -> Vec3 {
    right * (lane as f32 - 1.0) * ((width - VEHICLE_WIDTH) / 2.0)
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Shifts each ideal position sideways into its lane and advances any lane
/// change in progress.
pub fn position_lanes(
    network: &RoadNetwork,
    pathing: &mut [VehiclePathing],
    targets: &mut [VehicleTargetPosition],
    dt: f32,
) {
    pathing
        .par_iter_mut()
        .zip(targets.par_iter_mut())
        .for_each(|(p, target)| position_lane(network.section(p.road_index), p, target, dt));
}

pub fn position_lane(rs: &RoadSection, p: &mut VehiclePathing, target: &mut VehicleTargetPosition, dt: f32) {
    let right = rs.orientation(p.curve_pos) * Vec3::x();
    let current = lane_offset(p.lane_index, &right, rs.width);
    let wanted = lane_offset(p.wanted_lane_index, &right, rs.width);

    target.ideal_position += current.lerp(&wanted, smoothstep(p.lane_tween));

    if p.is_switching_lanes() {
        p.lane_tween += dt * p.speed * 0.1;
        if p.lane_tween >= 1.0 {
            p.lane_index = p.wanted_lane_index;
            p.lane_tween = 0.0;
        }
    }
}
