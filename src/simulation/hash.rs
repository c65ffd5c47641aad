use std::collections::HashMap;

use rayon::prelude::*;

use super::constants::*;
use super::{Point, Vec3, VehiclePhysicsState};

/// Integer coordinates of a `CELL_SIZE` cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey(pub i32, pub i32, pub i32);

impl CellKey {
    pub fn from_position(p: &Point) -> Self {
        CellKey(
            (p.x / CELL_SIZE).floor() as i32,
            (p.y / CELL_SIZE).floor() as i32,
            (p.z / CELL_SIZE).floor() as i32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleCell {
    pub position: Point,
    pub velocity: Vec3,
    pub radius: f32,
}

/// Spatial hash rebuilt every movement sub-step. Entries within a cell keep
/// vehicle order, with the player appended last.
#[derive(Debug, Clone, Default)]
pub struct CellMap {
    cells: HashMap<CellKey, Vec<VehicleCell>>,
}

impl CellMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, key: &CellKey) -> &[VehicleCell] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, entry: VehicleCell) {
        self.cells
            .entry(CellKey::from_position(&entry.position))
            .or_default()
            .push(entry);
    }

    /// Hashes every vehicle body with the standard avoidance radius.
    pub fn hash_vehicles(&mut self, bodies: &[VehiclePhysicsState]) {
        let built = bodies
            .par_iter()
            .fold(HashMap::new, |mut cells: HashMap<CellKey, Vec<VehicleCell>>, body| {
                cells
                    .entry(CellKey::from_position(&body.position))
                    .or_default()
                    .push(VehicleCell {
                        position: body.position,
                        velocity: body.velocity,
                        radius: AVOIDANCE_RADIUS,
                    });
                cells
            })
            .reduce(HashMap::new, |mut left, right| {
                for (key, mut entries) in right {
                    left.entry(key).or_default().append(&mut entries);
                }
                left
            });

        for (key, mut entries) in built {
            self.cells.entry(key).or_default().append(&mut entries);
        }
    }

    pub fn insert_player(&mut self, position: Point, velocity: Vec3) {
        self.insert(VehicleCell {
            position,
            velocity,
            radius: AVOIDANCE_RADIUS_PLAYER,
        });
    }
}
