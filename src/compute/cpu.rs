use crate::simulation::{FrameReport, SimulationState, TrafficSystem};
use crate::config::{NetworkConfig, TrafficSettings};
use anyhow::Result;
use super::{SimulationBackend, WorkerPool};

/// Runs the frame graph on a single worker, task by task.
pub struct CpuBackend {
    system: TrafficSystem,
    workers: WorkerPool,
}

impl CpuBackend {
    pub fn new(settings: TrafficSettings, network: Option<NetworkConfig>) -> Result<Self> {
        Ok(Self {
            system: TrafficSystem::new(settings, network),
            workers: WorkerPool::serial()?,
        })
    }

    pub fn system(&self) -> &TrafficSystem {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut TrafficSystem {
        &mut self.system
    }
}

impl SimulationBackend for CpuBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<FrameReport> {
        Ok(self.system.update(state, &self.workers)?)
    }

    fn get_name(&self) -> &'static str {
        "CPU"
    }

    fn worker_count(&self) -> usize {
        self.workers.threads()
    }
}
