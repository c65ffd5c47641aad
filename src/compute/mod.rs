use crate::config::{NetworkConfig, TrafficSettings};
use crate::simulation::{FrameReport, SimulationState};
use anyhow::Result;

pub mod graph;
pub mod pool;
pub mod cpu;

#[cfg(feature = "parallel-sim")]
pub mod parallel;

pub use graph::*;
pub use pool::*;
pub use cpu::*;

#[cfg(feature = "parallel-sim")]
pub use parallel::*;

pub trait SimulationBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<FrameReport>;
    fn get_name(&self) -> &'static str;
    fn worker_count(&self) -> usize;
}

pub enum ComputeBackend {
    Cpu(CpuBackend),
    #[cfg(feature = "parallel-sim")]
    Parallel(ParallelBackend),
}

impl ComputeBackend {
    pub fn new_cpu(settings: TrafficSettings, network: Option<NetworkConfig>) -> Result<Self> {
        Ok(ComputeBackend::Cpu(CpuBackend::new(settings, network)?))
    }

    #[cfg(feature = "parallel-sim")]
    pub fn new_parallel(
        settings: TrafficSettings,
        network: Option<NetworkConfig>,
        threads: usize,
    ) -> Result<Self> {
        Ok(ComputeBackend::Parallel(ParallelBackend::new(settings, network, threads)?))
    }

    #[cfg(not(feature = "parallel-sim"))]
    pub fn new_parallel(
        _settings: TrafficSettings,
        _network: Option<NetworkConfig>,
        _threads: usize,
    ) -> Result<Self> {
        anyhow::bail!("Parallel simulation not compiled in. Enable 'parallel-sim' feature.")
    }

    pub fn system(&self) -> &crate::simulation::TrafficSystem {
        match self {
            ComputeBackend::Cpu(backend) => backend.system(),
            #[cfg(feature = "parallel-sim")]
            ComputeBackend::Parallel(backend) => backend.system(),
        }
    }

    pub fn system_mut(&mut self) -> &mut crate::simulation::TrafficSystem {
        match self {
            ComputeBackend::Cpu(backend) => backend.system_mut(),
            #[cfg(feature = "parallel-sim")]
            ComputeBackend::Parallel(backend) => backend.system_mut(),
        }
    }
}

impl SimulationBackend for ComputeBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<FrameReport> {
        match self {
            ComputeBackend::Cpu(backend) => backend.update(state),
            #[cfg(feature = "parallel-sim")]
            ComputeBackend::Parallel(backend) => backend.update(state),
        }
    }

    fn get_name(&self) -> &'static str {
        match self {
            ComputeBackend::Cpu(backend) => backend.get_name(),
            #[cfg(feature = "parallel-sim")]
            ComputeBackend::Parallel(backend) => backend.get_name(),
        }
    }

    fn worker_count(&self) -> usize {
        match self {
            ComputeBackend::Cpu(backend) => backend.worker_count(),
            #[cfg(feature = "parallel-sim")]
            ComputeBackend::Parallel(backend) => backend.worker_count(),
        }
    }
}
