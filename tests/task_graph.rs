use anyhow::Result;
use megacity_traffic::compute::{Access, Resource, TaskGraph, TaskId, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Trace {
    events: Mutex<Vec<&'static str>>,
    runs: AtomicUsize,
}

impl Trace {
    fn record(&self, name: &'static str) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.events.lock().expect("trace lock").push(name);
    }

    fn events(&self) -> Vec<&'static str> {
        self.events.lock().expect("trace lock").clone()
    }
}

/// a writes pathing, b and c read it, d is independent, e rewrites pathing
/// and waits on d explicitly.
fn sample_graph<'a>() -> (TaskGraph<'a, Trace>, [TaskId; 5]) {
    use Access::{Read, Write};
    use Resource::*;

    let mut g: TaskGraph<Trace> = TaskGraph::new();
    let a = g.add("a", &[Write(Pathing)], &[], |t| t.record("a"));
    let b = g.add("b", &[Read(Pathing), Write(Targets)], &[], |t| t.record("b"));
    let c = g.add("c", &[Read(Pathing), Write(Physics)], &[], |t| t.record("c"));
    let d = g.add("d", &[Write(Occupancy)], &[], |t| t.record("d"));
    let e = g.add("e", &[Write(Pathing)], &[d], |t| t.record("e"));
    (g, [a, b, c, d, e])
}

fn wave_of(name: &str) -> usize {
    match name {
        "a" | "d" => 0,
        "b" | "c" => 1,
        _ => 2,
    }
}

#[test]
fn test_access_conflicts() {
    use Access::{Read, Write};
    use Resource::*;

    assert!(Write(Pathing).conflicts_with(&Write(Pathing)));
    assert!(Write(Pathing).conflicts_with(&Read(Pathing)));
    assert!(Read(Pathing).conflicts_with(&Write(Pathing)));
    assert!(!Read(Pathing).conflicts_with(&Read(Pathing)));
    assert!(!Write(Pathing).conflicts_with(&Write(Occupancy)));
}

#[test]
fn test_predecessors_and_waves() {
    let (g, [a, b, c, d, e]) = sample_graph();

    assert_eq!(g.len(), 5);
    assert_eq!(g.name(c), "c");
    assert!(g.predecessors(a).is_empty());
    assert_eq!(g.predecessors(b), vec![a]);
    assert_eq!(g.predecessors(c), vec![a]);
    assert!(g.predecessors(d).is_empty());
    assert_eq!(g.predecessors(e), vec![a, b, c, d]);

    assert_eq!(g.waves(), vec![vec![a, d], vec![b, c], vec![e]]);
}

#[test]
fn test_serial_pool_runs_in_insertion_order() -> Result<()> {
    let (g, _) = sample_graph();
    let trace = Trace::default();
    let workers = WorkerPool::serial()?;

    g.execute(&trace, &workers);

    assert_eq!(trace.events(), vec!["a", "b", "c", "d", "e"]);
    Ok(())
}

#[test]
fn test_parallel_pool_respects_waves() -> Result<()> {
    let workers = WorkerPool::with_threads(4)?;
    assert!(workers.is_parallel());
    assert_eq!(workers.threads(), 4);

    for _ in 0..50 {
        let (g, _) = sample_graph();
        let trace = Trace::default();
        g.execute(&trace, &workers);

        let events = trace.events();
        assert_eq!(trace.runs.load(Ordering::SeqCst), 5);
        let waves: Vec<usize> = events.iter().map(|n| wave_of(n)).collect();
        assert!(waves.windows(2).all(|w| w[0] <= w[1]), "out of order: {:?}", events);
    }

    println!("✓ waves never overlap on a 4-thread pool");
    Ok(())
}

#[test]
fn test_empty_graph_executes() -> Result<()> {
    let g: TaskGraph<Trace> = TaskGraph::new();
    assert!(g.is_empty());
    assert!(g.waves().is_empty());

    let trace = Trace::default();
    g.execute(&trace, &WorkerPool::with_threads(2)?);
    assert!(trace.events().is_empty());
    Ok(())
}
