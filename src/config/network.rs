use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use std::collections::HashSet;
use super::Validate;
use crate::simulation::constants::VEHICLE_WIDTH;
use crate::simulation::Point;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub network: Network,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

/// One authored spline path. Consecutive node pairs become road sections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathConfig {
    pub id: String,
    #[serde(default)]
    pub origin: [f32; 3],
    pub nodes: Vec<[f32; 3]>,
    #[serde(default)]
    pub reversed: bool,
    pub width: f32,
    #[serde(default = "default_height")]
    pub height: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    #[serde(default)]
    pub on_ramp: bool,
    /// Chance, in percent, that traffic on the joined road takes this ramp.
    #[serde(default)]
    pub on_ramp_chance: f32,
    /// Bitmask over the vehicle pool; 0 selects uniformly.
    #[serde(default)]
    pub vehicle_selection: u32,
}

fn default_height() -> f32 {
    5.0
}

impl PathConfig {
    /// Node positions in world space, honouring `origin` and `reversed`.
    pub fn world_nodes(&self) -> Vec<Point> {
        let origin = Point::new(self.origin[0], self.origin[1], self.origin[2]);
        let mut nodes: Vec<Point> = self.nodes
            .iter()
            .map(|n| Point::new(origin.x + n[0], origin.y + n[1], origin.z + n[2]))
            .collect();
        if self.reversed {
            nodes.reverse();
        }
        nodes
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.network.paths.is_empty() {
            return Err(anyhow!("Network '{}' has no paths", self.network.name));
        }

        let mut seen = HashSet::new();
        for path in &self.network.paths {
            if !seen.insert(path.id.as_str()) {
                return Err(anyhow!("Duplicate path id '{}'", path.id));
            }

            if path.nodes.len() < 2 {
                return Err(anyhow!("Path '{}' needs at least two nodes", path.id));
            }

            if path.width <= VEHICLE_WIDTH {
                return Err(anyhow!("Path '{}' width {} must exceed vehicle width {}",
                                   path.id, path.width, VEHICLE_WIDTH));
            }

            if path.min_speed <= 0.0 {
                return Err(anyhow!("Path '{}' minimum speed must be positive", path.id));
            }

            if path.max_speed < path.min_speed {
                return Err(anyhow!("Path '{}' maximum speed must not be below minimum speed", path.id));
            }

            if path.on_ramp_chance < 0.0 || path.on_ramp_chance > 100.0 {
                return Err(anyhow!("Path '{}' on-ramp chance {} must be in range [0, 100]",
                                   path.id, path.on_ramp_chance));
            }
        }

        Ok(())
    }
}
