use nalgebra::{Quaternion, UnitQuaternion};
use rayon::prelude::*;
use std::f32::consts::PI;

use super::constants::*;
use super::hash::{CellKey, CellMap, VehicleCell};
use super::spline::look_rotation;
use super::{Point, Vec3, VehiclePhysicsState, VehicleTargetPosition, VehicleTransform};

/// Push-out away from the closest predicted conflict among `cells`, in the
/// vehicle's right/up steering plane.
pub fn cell_avoidance(cells: &[VehicleCell], pos: &Point, velocity: &Vec3, radius: f32, time_step: f32) -> Vec3 {
    if cells.is_empty() || velocity.norm() < 0.001 {
        return Vec3::zeros();
    }

    let vnorm = velocity.normalize();
    let right = vnorm.cross(&Vec3::y());
    let Some(up) = right.cross(&vnorm).try_normalize(f32::EPSILON) else {
        // Climbing straight up or down leaves no steering plane.
        return Vec3::zeros();
    };

    let own_anticipated = pos + velocity * time_step;

    let mut closest = f32::MAX;
    let mut xa = 0.0;
    let mut ya = 0.0;
    let mut mag = 0.0;

    for cell in cells {
        let anticipated = cell.position + cell.velocity * time_step;
        let current_delta = pos - cell.position;
        let delta = anticipated - own_anticipated;

        if current_delta.norm_squared() < 0.3 {
            continue; // self
        }

        let dz = delta.dot(&vnorm);
        if !(0.0..=MAX_SCAN_RANGE).contains(&dz) {
            continue;
        }

        let reach = cell.radius + radius;
        let lsq = delta.norm_squared();
        if lsq < closest && lsq < reach * reach {
            closest = lsq;
            xa = delta.dot(&right);
            ya = delta.dot(&up);
            mag = reach;
        }
    }

    if mag == 0.0 {
        return Vec3::zeros();
    }

    let mut result = Vec3::zeros();
    if xa < 0.0 {
        result += right * (mag + xa);
    } else if xa > 0.0 {
        result -= right * (mag - xa);
    }
    if ya < 0.0 {
        result += up * (mag + ya);
    } else if ya > 0.0 {
        result -= up * (mag - ya);
    }

    result * ((MAX_SCAN_RANGE - closest.sqrt()) / MAX_SCAN_RANGE)
}

/// Scans the vehicle's own cell, plus the cell it is heading into when that
/// differs.
pub fn avoidance(cells: &CellMap, pos: &Point, velocity: &Vec3, radius: f32, time_step: f32) -> Vec3 {
    let key = CellKey::from_position(pos);
    let projected = CellKey::from_position(&(pos + velocity * CELL_LOOKAHEAD_SECONDS));

    let mut steering = cell_avoidance(cells.get(&key), pos, velocity, radius, time_step);
    if projected != key {
        steering += cell_avoidance(cells.get(&projected), pos, velocity, radius, time_step);
    }
    steering
}

/// Slowing-radius seek toward `target`.
pub fn seek(target: &Point, current: &Point, velocity: &Vec3, speed_mult: f32) -> Vec3 {
    let offset = target - current;
    let distance = offset.norm();
    if distance <= f32::EPSILON {
        return Vec3::zeros();
    }

    let max_speed = MAX_SEEK_SPEED * speed_mult;
    let ramped = max_speed * (distance / SLOWING_DISTANCE);
    let desired = offset * (ramped.min(max_speed) / distance);

    let steering = desired - velocity;
    if steering.norm_squared() < SEEK_DEADBAND_SQUARED {
        return Vec3::zeros();
    }
    steering
}

/// Bank angle after one step of relaxing toward the lateral-acceleration
/// target. Inside the dead zone the bank snaps back to level.
pub fn bank(current: f32, target_heading: &Vec3, velocity: &Vec3, speed_mult: f32, time_step: f32) -> f32 {
    if target_heading.dot(velocity) <= 0.0 {
        return current;
    }

    let bank_max = PI / 16.0 * speed_mult;
    let speed_ratio = 100.0 * bank_max / (MAX_SEEK_SPEED * speed_mult);

    let lateral = target_heading.z * velocity.x - target_heading.x * velocity.z;
    let amount = (lateral * speed_ratio).clamp(-bank_max, bank_max);

    if amount.abs() > BANK_DEAD_ZONE {
        current - (current - amount) * time_step
    } else {
        0.0
    }
}

/// One fixed sub-step: steer, integrate, bank.
pub fn integrate_movement(cells: &CellMap, target: &VehicleTargetPosition, state: &mut VehiclePhysicsState, time_step: f32) {
    let seek_steering = seek(&target.ideal_position, &state.position, &state.velocity, state.speed_mult);
    let avoid_steering = avoidance(cells, &state.position, &state.velocity, AVOIDANCE_RADIUS, time_step);

    let steering = if avoid_steering.norm_squared() > AVOIDANCE_THRESHOLD_SQUARED {
        avoid_steering
    } else {
        seek_steering
    };

    let target_heading = steering.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);
    if let Some(heading) = (state.heading + target_heading * time_step).try_normalize(f32::EPSILON) {
        state.heading = heading;
    }
    state.velocity = state.heading * target.ideal_speed;
    state.position += state.velocity * time_step;
    state.bank_radians = bank(state.bank_radians, &target_heading, &state.velocity, state.speed_mult, time_step);
}

pub fn move_vehicles(
    cells: &CellMap,
    targets: &[VehicleTargetPosition],
    physics: &mut [VehiclePhysicsState],
    time_step: f32,
) {
    physics
        .par_iter_mut()
        .zip(targets.par_iter())
        .for_each(|(state, target)| integrate_movement(cells, target, state, time_step));
}

/// Roll about local forward using the first-order approximations
/// `sin(x) ~ x` and `cos(x) ~ 1`, renormalised. Good for small angles.
pub fn fast_bank_quat(radians: f32) -> UnitQuaternion<f32> {
    let half = radians * 0.5;
    let length = (1.0 + half * half).sqrt();
    UnitQuaternion::new_unchecked(Quaternion::new(1.0 / length, 0.0, 0.0, half / length))
}

pub fn vehicle_rotation(heading: &Vec3, bank_radians: f32) -> UnitQuaternion<f32> {
    look_rotation(heading) * fast_bank_quat(bank_radians)
}

pub fn write_transforms(physics: &[VehiclePhysicsState], transforms: &mut [VehicleTransform]) {
    transforms
        .par_iter_mut()
        .zip(physics.par_iter())
        .for_each(|(transform, state)| {
            transform.position = state.position;
            transform.rotation = vehicle_rotation(&state.heading, state.bank_radians);
        });
}
