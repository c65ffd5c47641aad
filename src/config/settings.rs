use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use super::Validate;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficSettings {
    pub simulation: SimulationParams,
    #[serde(default)]
    pub vehicles: Vec<VehicleType>,
    #[serde(default)]
    pub random: RandomConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationParams {
    pub max_cars: u32,
    #[serde(default = "default_speed_factor")]
    pub global_speed_factor: f32,
}

fn default_speed_factor() -> f32 {
    1.0
}

/// One entry of the vehicle pool. Spawners index this list by position.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehicleType {
    pub id: String,
    pub speed_multiplier: f32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RandomConfig {
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
    pub timing_samples: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { timing_samples: 120 }
    }
}

impl TrafficSettings {
    pub fn new(max_cars: u32, vehicles: Vec<VehicleType>) -> Self {
        Self {
            simulation: SimulationParams {
                max_cars,
                global_speed_factor: 1.0,
            },
            vehicles,
            random: RandomConfig::default(),
            workers: WorkerConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Validate for TrafficSettings {
    fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if sim.global_speed_factor < 0.0 {
            return Err(anyhow!("Global speed factor must be non-negative"));
        }

        if self.vehicles.is_empty() {
            return Err(anyhow!("At least one vehicle type must be defined"));
        }

        if self.vehicles.len() > 32 {
            return Err(anyhow!("Vehicle pool holds at most 32 types, got {}", self.vehicles.len()));
        }

        for vehicle in &self.vehicles {
            if vehicle.speed_multiplier <= 0.0 {
                return Err(anyhow!("Speed multiplier for '{}' must be positive", vehicle.id));
            }
        }

        if let Some(threads) = self.workers.threads {
            if threads == 0 {
                return Err(anyhow!("Worker thread count must be at least one"));
            }
        }

        if self.performance.timing_samples == 0 {
            return Err(anyhow!("Timing samples must be greater than zero"));
        }

        Ok(())
    }
}
