use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sluice::connector::{InputConnector, OutputConnector};
use sluice::error::Error;
use sluice::node::{Node, NodeAction, NodeIo};
use sluice::pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

mod kill_skips_class_teardown {
    use super::*;

    struct CountingTeardown {
        release: Arc<AtomicBool>,
        class_teardowns: Arc<AtomicUsize>,
    }

    impl NodeAction for CountingTeardown {
        type Item = u32;

        fn action(&self, _io: &NodeIo<u32>) {
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        fn class_teardown(&self) {
            self.class_teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn killed_node_does_not_run_class_teardown() {
        init_tracing();
        let release = Arc::new(AtomicBool::new(false));
        let class_teardowns = Arc::new(AtomicUsize::new(0));
        let node = Node::builder(
            "held-open",
            CountingTeardown { release: release.clone(), class_teardowns: class_teardowns.clone() },
        )
        .output("out")
        .build()
        .unwrap();
        let sink = Node::builder("sink", Relay).input("in", 0).build().unwrap();
        node.io().output("out").unwrap().connect(sink.io().input("in").unwrap()).unwrap();

        node.start_async().unwrap();
        node.kill().unwrap();
        node.join().unwrap();

        assert_eq!(class_teardowns.load(Ordering::SeqCst), 0);
        release.store(true, Ordering::SeqCst);
    }
}

const GET_TIMEOUT: Duration = Duration::from_secs(5);
const REFRESH: Duration = Duration::from_millis(20);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Produces `0..count`, splitting the range across however many workers
/// the node was built with via a shared cursor.
struct Range {
    cursor: AtomicUsize,
    count: usize,
}

impl Range {
    fn new(count: usize) -> Self {
        Self { cursor: AtomicUsize::new(0), count }
    }
}

impl NodeAction for Range {
    type Item = u32;

    fn action(&self, io: &NodeIo<u32>) {
        let output = io.output("out").unwrap();
        loop {
            let next = self.cursor.fetch_add(1, Ordering::SeqCst);
            if next >= self.count {
                return;
            }
            output.put(next as u32).unwrap();
        }
    }
}

/// Relays every item from `in` to `out` unchanged.
struct Relay;

impl NodeAction for Relay {
    type Item = u32;

    fn action(&self, io: &NodeIo<u32>) {
        let input = io.input("in").unwrap();
        let output = io.output("out").unwrap();
        // refresh_interval: None relies on the input's configured default.
        for item in input.iter_get(Some(GET_TIMEOUT), None).unwrap() {
            output.put(item.unwrap()).unwrap();
        }
    }
}

/// Collects everything it receives into a shared `Vec`.
struct Collect {
    items: Arc<Mutex<Vec<u32>>>,
}

impl NodeAction for Collect {
    type Item = u32;

    fn action(&self, io: &NodeIo<u32>) {
        let input = io.input("in").unwrap();
        for item in input.iter_get(Some(GET_TIMEOUT), None).unwrap() {
            self.items.lock().push(item.unwrap());
        }
    }
}

#[test]
fn three_stage_line_delivers_every_item_exactly_once() {
    init_tracing();
    let extract = Node::builder("extract", Range::new(10))
        .output("out")
        .num_processes(3)
        .build()
        .unwrap();
    let transform = Node::builder("transform", Relay)
        .input("in", 0)
        .output("out")
        .num_processes(2)
        .build()
        .unwrap();
    let load_items = Arc::new(Mutex::new(Vec::new()));
    let load = Node::builder("load", Collect { items: load_items.clone() })
        .input("in", 0)
        .num_processes(1)
        .build()
        .unwrap();

    extract.io().output("out").unwrap().connect(transform.io().input("in").unwrap()).unwrap();
    transform.io().output("out").unwrap().connect(load.io().input("in").unwrap()).unwrap();

    let mut pipeline = Pipeline::new("etl-line");
    pipeline.add_node(extract).add_node(transform).add_node(load);
    pipeline.run().unwrap();

    let mut collected = load_items.lock().clone();
    collected.sort_unstable();
    assert_eq!(collected, (0..10).collect::<Vec<_>>());
}

/// Routes incoming items to an even or odd output by parity.
struct Sorter;

impl NodeAction for Sorter {
    type Item = u32;

    fn action(&self, io: &NodeIo<u32>) {
        let input = io.input("in").unwrap();
        let even = io.output("even").unwrap();
        let odd = io.output("odd").unwrap();
        for item in input.iter_get(Some(GET_TIMEOUT), None).unwrap() {
            let item = item.unwrap();
            if item % 2 == 0 {
                even.put(item).unwrap();
            } else {
                odd.put(item).unwrap();
            }
        }
    }
}

struct FixedSource {
    items: Vec<u32>,
}

impl NodeAction for FixedSource {
    type Item = u32;

    fn action(&self, io: &NodeIo<u32>) {
        let output = io.output("out").unwrap();
        for &item in &self.items {
            output.put(item).unwrap();
        }
    }
}

#[test]
fn even_odd_split_routes_every_item_to_the_matching_collector() {
    init_tracing();
    let evens = Node::builder("evens", FixedSource { items: vec![0, 2, 4, 6, 8] })
        .output("out")
        .build()
        .unwrap();
    let odds = Node::builder("odds", FixedSource { items: vec![1, 3, 5, 7, 9] })
        .output("out")
        .build()
        .unwrap();
    let sorter = Node::builder("sorter", Sorter)
        .input("in", 0)
        .output("even")
        .output("odd")
        .build()
        .unwrap();
    let even_items = Arc::new(Mutex::new(Vec::new()));
    let odd_items = Arc::new(Mutex::new(Vec::new()));
    let even_collector = Node::builder("even-collector", Collect { items: even_items.clone() })
        .input("in", 0)
        .build()
        .unwrap();
    let odd_collector = Node::builder("odd-collector", Collect { items: odd_items.clone() })
        .input("in", 0)
        .build()
        .unwrap();

    evens.io().output("out").unwrap().connect(sorter.io().input("in").unwrap()).unwrap();
    odds.io().output("out").unwrap().connect(sorter.io().input("in").unwrap()).unwrap();
    sorter.io().output("even").unwrap().connect(even_collector.io().input("in").unwrap()).unwrap();
    sorter.io().output("odd").unwrap().connect(odd_collector.io().input("in").unwrap()).unwrap();

    let mut pipeline = Pipeline::new("even-odd-split");
    pipeline.add_node(evens).add_node(odds).add_node(sorter).add_node(even_collector).add_node(odd_collector);
    pipeline.run().unwrap();

    let mut even_result = even_items.lock().clone();
    even_result.sort_unstable();
    let mut odd_result = odd_items.lock().clone();
    odd_result.sort_unstable();
    assert_eq!(even_result, vec![0, 2, 4, 6, 8]);
    assert_eq!(odd_result, vec![1, 3, 5, 7, 9]);
}

#[test]
fn cyclic_graph_is_rejected_by_validation() {
    init_tracing();
    let a = Node::builder("a", Relay).input("in", 0).output("out").build().unwrap();
    let b = Node::builder("b", Relay).input("in", 0).output("out").build().unwrap();
    a.io().output("out").unwrap().connect(b.io().input("in").unwrap()).unwrap();
    b.io().output("out").unwrap().connect(a.io().input("in").unwrap()).unwrap();

    let mut pipeline = Pipeline::new("cycle");
    pipeline.add_node(a).add_node(b);
    let err = pipeline.validate().unwrap_err();
    assert!(matches!(err, Error::PipelineValidation(_)));
}

#[test]
fn disconnected_component_is_rejected_by_validation() {
    init_tracing();
    let a = Node::builder("a", Relay).input("in", 0).output("out").build().unwrap();
    let b = Node::builder("b", Relay).input("in", 0).output("out").build().unwrap();
    a.io().output("out").unwrap().connect(b.io().input("in").unwrap()).unwrap();

    let isolated = Node::builder("isolated", Relay).input("in", 0).output("out").build().unwrap();
    // Stray connectors owned by no node in the pipeline: enough to satisfy
    // the isolated node's own validate(), without drawing an edge to any
    // registered node, so only the pipeline-level connectivity check fails.
    let stray_output: OutputConnector<u32> = OutputConnector::new("stray-out");
    let stray_input: InputConnector<u32> = InputConnector::new("stray-in", 0);
    stray_output.connect(isolated.io().input("in").unwrap()).unwrap();
    isolated.io().output("out").unwrap().connect(&stray_input).unwrap();

    let mut pipeline = Pipeline::new("disconnected");
    pipeline.add_node(a).add_node(b).add_node(isolated);
    let err = pipeline.validate().unwrap_err();
    assert!(matches!(err, Error::PipelineValidation(_)));
}

#[test]
fn put_blocks_on_back_pressure_until_a_get_drains_the_queue() {
    init_tracing();
    let source = Node::builder("source", FixedSource { items: vec![1, 2] })
        .output("out")
        .build()
        .unwrap();
    let sink = Node::builder("sink", Relay).input("in", 1).build().unwrap();
    source.io().output("out").unwrap().connect(sink.io().input("in").unwrap()).unwrap();

    source.start_async().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    // The second put is blocked: the bounded input holds only the first item.
    assert_eq!(sink.io().input("in").unwrap().size(), 1);
    assert!(!source.is_finished());

    let first = sink.io().input("in").unwrap().get(Some(GET_TIMEOUT), Some(REFRESH)).unwrap();
    assert_eq!(first, 1);
    source.join().unwrap();
    let second = sink.io().input("in").unwrap().get(Some(GET_TIMEOUT), Some(REFRESH)).unwrap();
    assert_eq!(second, 2);
}

/// A no-op worker that exits only once told to, so tests can observe
/// `is_expecting_data()` transition from true to false deterministically.
struct HoldOpen {
    release: Arc<AtomicBool>,
}

impl NodeAction for HoldOpen {
    type Item = u32;

    fn action(&self, _io: &NodeIo<u32>) {
        while !self.release.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[test]
fn get_times_out_while_upstream_is_alive_then_reports_empty_once_it_finishes() {
    init_tracing();
    let release = Arc::new(AtomicBool::new(false));
    let upstream = Node::builder("upstream", HoldOpen { release: release.clone() })
        .output("out")
        .build()
        .unwrap();
    let downstream = Node::builder("downstream", Relay).input("in", 0).build().unwrap();
    upstream.io().output("out").unwrap().connect(downstream.io().input("in").unwrap()).unwrap();

    upstream.start_async().unwrap();

    let err = downstream
        .io()
        .input("in")
        .unwrap()
        .get(Some(Duration::from_millis(100)), Some(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    release.store(true, Ordering::SeqCst);
    upstream.join().unwrap();

    let err = downstream
        .io()
        .input("in")
        .unwrap()
        .get(Some(Duration::from_millis(200)), Some(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, Error::Empty { .. }));
}
