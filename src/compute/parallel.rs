use crate::simulation::{FrameReport, SimulationState, TrafficSystem};
use crate::config::{NetworkConfig, TrafficSettings};
use anyhow::{Context, Result};
use log::info;
use super::{SimulationBackend, WorkerPool};

/// Runs each wave of the frame graph concurrently on a rayon pool.
pub struct ParallelBackend {
    system: TrafficSystem,
    workers: WorkerPool,
}

impl ParallelBackend {
    pub fn new(settings: TrafficSettings, network: Option<NetworkConfig>, threads: usize) -> Result<Self> {
        let workers = WorkerPool::with_threads(threads)
            .with_context(|| format!("Failed to start {} traffic workers", threads))?;
        info!("Parallel backend using {} worker threads", workers.threads());

        Ok(Self {
            system: TrafficSystem::new(settings, network),
            workers,
        })
    }

    pub fn system(&self) -> &TrafficSystem {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut TrafficSystem {
        &mut self.system
    }
}

impl SimulationBackend for ParallelBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<FrameReport> {
        Ok(self.system.update(state, &self.workers)?)
    }

    fn get_name(&self) -> &'static str {
        "Parallel"
    }

    fn worker_count(&self) -> usize {
        self.workers.threads()
    }
}
