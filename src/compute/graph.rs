//! Per-frame task graph.
//!
//! Tasks declare which frame resources they read and write. A task runs after
//! every earlier task whose access conflicts with its own (write/write or
//! read/write on the same resource) and after any explicit dependencies.
//! Tasks are grouped into waves by longest dependency path; each wave runs
//! concurrently on the worker pool and the next wave starts only once the
//! previous one has finished. `execute` returns after the last wave, which is
//! the frame barrier.

use log::trace;
use std::fmt;

use super::pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Pathing,
    Targets,
    Physics,
    Transforms,
    Stages,
    Occupancy,
    SlotWrites,
    Cells,
    Spawners,
    SpawnCommands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(Resource),
    Write(Resource),
}

impl Access {
    pub fn resource(&self) -> Resource {
        match *self {
            Access::Read(r) | Access::Write(r) => r,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write(_))
    }

    pub fn conflicts_with(&self, other: &Access) -> bool {
        self.resource() == other.resource() && (self.is_write() || other.is_write())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

type TaskFn<'a, C> = Box<dyn Fn(&C) + Send + Sync + 'a>;

struct Task<'a, C> {
    name: &'static str,
    access: Vec<Access>,
    deps: Vec<TaskId>,
    run: TaskFn<'a, C>,
}

pub struct TaskGraph<'a, C> {
    tasks: Vec<Task<'a, C>>,
}

impl<'a, C> fmt::Debug for TaskGraph<'a, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tasks.iter().map(|t| (t.name, &t.access, &t.deps)))
            .finish()
    }
}

impl<'a, C> Default for TaskGraph<'a, C> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<'a, C: Sync> TaskGraph<'a, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn name(&self, id: TaskId) -> &'static str {
        self.tasks[id.0].name
    }

    /// Adds a task. `deps` can only name tasks added earlier, so the graph is
    /// acyclic by construction.
    pub fn add<F>(&mut self, name: &'static str, access: &[Access], deps: &[TaskId], run: F) -> TaskId
    where
        F: Fn(&C) + Send + Sync + 'a,
    {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            name,
            access: access.to_vec(),
            deps: deps.to_vec(),
            run: Box::new(run),
        });
        id
    }

    /// Every task `id` must wait for, explicit and implied by access conflicts.
    pub fn predecessors(&self, id: TaskId) -> Vec<TaskId> {
        let task = &self.tasks[id.0];
        let mut preds: Vec<TaskId> = task.deps.clone();

        for (i, earlier) in self.tasks[..id.0].iter().enumerate() {
            let conflict = task
                .access
                .iter()
                .any(|a| earlier.access.iter().any(|b| a.conflicts_with(b)));
            if conflict {
                preds.push(TaskId(i));
            }
        }

        preds.sort();
        preds.dedup();
        preds
    }

    /// Groups tasks into waves; tasks in one wave have no ordering between
    /// them. Within a wave, tasks keep insertion order.
    pub fn waves(&self) -> Vec<Vec<TaskId>> {
        let mut level = vec![0usize; self.tasks.len()];
        let mut waves: Vec<Vec<TaskId>> = Vec::new();

        for i in 0..self.tasks.len() {
            let id = TaskId(i);
            let l = self
                .predecessors(id)
                .iter()
                .map(|p| level[p.0] + 1)
                .max()
                .unwrap_or(0);
            level[i] = l;

            if waves.len() <= l {
                waves.resize_with(l + 1, Vec::new);
            }
            waves[l].push(id);
        }

        waves
    }

    /// Runs every task and returns once all have completed. Single-threaded
    /// pools run tasks in insertion order, which is a valid topological order.
    pub fn execute(&self, ctx: &C, workers: &WorkerPool) {
        workers.install(|| {
            if !workers.is_parallel() {
                for task in &self.tasks {
                    trace!("task {}", task.name);
                    (task.run)(ctx);
                }
                return;
            }

            for (n, wave) in self.waves().iter().enumerate() {
                trace!("wave {}: {:?}", n, wave.iter().map(|&id| self.name(id)).collect::<Vec<_>>());
                rayon::scope(|s| {
                    for &id in wave {
                        let task = &self.tasks[id.0];
                        s.spawn(move |_| (task.run)(ctx));
                    }
                });
            }
        });
    }
}
