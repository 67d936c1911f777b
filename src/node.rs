//! The node layer: worker-pool lifecycle, `setup`/`action`/`teardown`
//! phases, and the `is_expecting_data` termination oracle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::connector::{ConnectorHandle, InputConnector, NodeLifecycle, OutputConnector};
use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::util::panic_message;
use crate::pool::Pool;

/// The user-supplied work a node performs.
///
/// `action` runs once per worker (the framework does not loop it); a
/// typical implementation loops internally over `io.input(..).iter_get(..)`
/// until the iterator ends and pushes results via `io.output(..).put(..)`.
/// `setup`/`teardown`/`class_setup`/`class_teardown` default to no-ops.
pub trait NodeAction: Send + Sync + 'static {
    /// The item type flowing through every connector this node owns.
    type Item: Clone + Send + 'static;

    /// Runs once in the coordinating thread before any worker starts.
    fn class_setup(&self) {}

    /// Runs once per worker, before `action`.
    fn setup(&self) {}

    /// The node's work. Runs once per worker.
    fn action(&self, io: &NodeIo<Self::Item>);

    /// Runs once per worker, after `action` returns (skipped if `action`
    /// or `setup` panicked).
    fn teardown(&self) {}

    /// Runs once in the coordinating thread after every worker has been
    /// joined normally. Skipped if the pool was `kill`ed instead.
    fn class_teardown(&self) {}
}

/// A node's named inputs and outputs, handed to [`NodeAction::action`].
pub struct NodeIo<T> {
    inputs: Vec<(String, InputConnector<T>)>,
    outputs: Vec<(String, OutputConnector<T>)>,
}

impl<T> Clone for NodeIo<T> {
    fn clone(&self) -> Self {
        Self { inputs: self.inputs.clone(), outputs: self.outputs.clone() }
    }
}

impl<T> fmt::Debug for NodeIo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIo")
            .field("inputs", &self.inputs.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("outputs", &self.outputs.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl<T> NodeIo<T> {
    /// Looks up an input by the name it was registered under.
    pub fn input(&self, name: &str) -> Option<&InputConnector<T>> {
        self.inputs.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Looks up an output by the name it was registered under.
    pub fn output(&self, name: &str) -> Option<&OutputConnector<T>> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Every input, in registration order, alongside its name.
    pub fn inputs(&self) -> &[(String, InputConnector<T>)] {
        &self.inputs
    }

    /// Every output, in registration order, alongside its name.
    pub fn outputs(&self) -> &[(String, OutputConnector<T>)] {
        &self.outputs
    }
}

struct Inner<A: NodeAction> {
    id: NodeId,
    name: String,
    action: Arc<A>,
    io: NodeIo<A::Item>,
    pool: Pool,
    class_teardown_done: AtomicBool,
}

impl<A: NodeAction> NodeLifecycle for Inner<A> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_finished(&self) -> bool {
        self.pool.is_finished()
    }

    fn is_expecting_data(&self) -> bool {
        for (_, input) in self.io.inputs.iter() {
            if !input.empty() {
                return true;
            }
            if input.any_upstream_unfinished() {
                return true;
            }
        }
        false
    }
}

/// A unit of computation: an owned input/output surface plus a pool of
/// concurrent workers. Cloning a `Node` is cheap; clones share identity
/// and state.
pub struct Node<A: NodeAction> {
    inner: Arc<Inner<A>>,
}

impl<A: NodeAction> Clone for Node<A> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<A: NodeAction> fmt::Debug for Node<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Builds a [`Node`], registering its inputs and outputs explicitly —
/// the static-typing counterpart of the source's declarative,
/// annotation-scanned connector fields.
pub struct NodeBuilder<A: NodeAction> {
    name: String,
    action: A,
    input_specs: Vec<(String, Option<usize>)>,
    output_specs: Vec<String>,
    num_processes: Option<usize>,
    config: Config,
}

impl<A: NodeAction> fmt::Debug for NodeBuilder<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("name", &self.name)
            .field("input_specs", &self.input_specs)
            .field("output_specs", &self.output_specs)
            .field("num_processes", &self.num_processes)
            .field("config", &self.config)
            .finish()
    }
}

impl<A: NodeAction> NodeBuilder<A> {
    fn new(name: impl Into<String>, action: A) -> Self {
        Self {
            name: name.into(),
            action,
            input_specs: Vec::new(),
            output_specs: Vec::new(),
            num_processes: None,
            config: Config::default(),
        }
    }

    /// Registers a named input. `maxsize == 0` means unbounded.
    pub fn input(mut self, name: impl Into<String>, maxsize: usize) -> Self {
        self.input_specs.push((name.into(), Some(maxsize)));
        self
    }

    /// Registers a named input with no explicit `maxsize`, falling back
    /// to `config`'s `default_maxsize` at `build` time — the declarative-
    /// field path's "default `maxsize` (unbounded) for inputs" (§4.2.1),
    /// carried over as an explicit opt-in rather than reflective field
    /// scanning.
    pub fn input_default(mut self, name: impl Into<String>) -> Self {
        self.input_specs.push((name.into(), None));
        self
    }

    /// Registers a named output.
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.output_specs.push(name.into());
        self
    }

    /// Sets the initial worker count. Overrides `config`'s
    /// `default_num_processes` for this node. Defaults to 1.
    pub fn num_processes(mut self, n: usize) -> Self {
        self.num_processes = Some(n);
        self
    }

    /// Sets the validated defaults (worker count, `get` refresh interval)
    /// this node falls back to wherever a builder call doesn't override
    /// them explicitly. Defaults to [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Constructs the node, validating `num_processes` and wiring every
    /// registered input/output back to it.
    pub fn build(self) -> Result<Node<A>> {
        let num_processes = self.num_processes.unwrap_or_else(|| self.config.default_num_processes());
        if num_processes == 0 {
            tracing::warn!(node = %self.name, "rejected a node build with num_processes == 0");
            return Err(Error::InvalidArgument("num_processes must be at least 1".into()));
        }
        let id = NodeId::new();
        let mut inputs = Vec::with_capacity(self.input_specs.len());
        for (name, maxsize) in self.input_specs {
            let maxsize = maxsize.unwrap_or_else(|| self.config.default_maxsize());
            let connector = InputConnector::with_config(name.clone(), maxsize, self.config)?;
            inputs.push((name, connector));
        }
        let outputs = self
            .output_specs
            .into_iter()
            .map(|name| (name.clone(), OutputConnector::new(name)))
            .collect();
        let io = NodeIo { inputs, outputs };

        let inner = Arc::new(Inner {
            id,
            name: self.name,
            action: Arc::new(self.action),
            io,
            pool: Pool::new(id, num_processes),
            class_teardown_done: AtomicBool::new(false),
        });

        let lifecycle: Arc<dyn NodeLifecycle> = inner.clone();
        for (_, input) in inner.io.inputs.iter() {
            input.bind_parent(id, lifecycle.clone());
        }
        for (_, output) in inner.io.outputs.iter() {
            output.bind_parent(id, lifecycle.clone());
        }

        Ok(Node { inner })
    }
}

impl<A: NodeAction> Node<A> {
    /// Starts building a node named `name` that runs `action`.
    pub fn builder(name: impl Into<String>, action: A) -> NodeBuilder<A> {
        NodeBuilder::new(name, action)
    }

    /// This node's stable identity.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// This node's human-readable name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// This node's named inputs and outputs.
    pub fn io(&self) -> &NodeIo<A::Item> {
        &self.inner.io
    }

    /// The pool's current worker count.
    pub fn num_processes(&self) -> usize {
        self.inner.pool.num_processes()
    }

    /// Settable only before the pool has been started.
    pub fn set_num_processes(&self, n: usize) -> Result<()> {
        self.inner.pool.set_num_processes(n)
    }

    /// True iff every worker in the pool has reported completion (normal
    /// exit or kill).
    pub fn is_finished(&self) -> bool {
        self.inner.pool.is_finished()
    }

    /// True iff some upstream node is not yet finished, or any of this
    /// node's inputs is non-empty.
    pub fn is_expecting_data(&self) -> bool {
        self.inner.is_expecting_data()
    }

    /// A node validates when it has at least one connector and every
    /// connector it owns has at least one partner.
    pub fn validate(&self) -> Result<()> {
        if self.inner.io.inputs.is_empty() && self.inner.io.outputs.is_empty() {
            tracing::warn!(node = %self.inner.id, "node has no input or output connectors");
            return Err(Error::NodeValidation {
                node: self.inner.id,
                reason: "node has no input or output connectors".into(),
            });
        }
        for (name, input) in self.inner.io.inputs.iter() {
            if !input.is_connected() {
                tracing::warn!(node = %self.inner.id, input = %name, "node input has no partner");
                return Err(Error::NodeValidation {
                    node: self.inner.id,
                    reason: format!("input '{name}' has no partner"),
                });
            }
        }
        for (name, output) in self.inner.io.outputs.iter() {
            if !output.is_connected() {
                tracing::warn!(node = %self.inner.id, output = %name, "node output has no partner");
                return Err(Error::NodeValidation {
                    node: self.inner.id,
                    reason: format!("output '{name}' has no partner"),
                });
            }
        }
        Ok(())
    }

    /// Runs `class_setup` once, then spawns `num_processes` workers that
    /// each run `setup → action → teardown`, and returns immediately
    /// without waiting for them.
    pub fn start_async(&self) -> Result<()> {
        self.inner.action.class_setup();
        let action = self.inner.action.clone();
        let io = self.inner.io.clone();
        let name = self.inner.name.clone();
        self.inner.pool.start(move |idx, finished| {
            let action = action.clone();
            let io = io.clone();
            thread::Builder::new()
                .name(format!("{name}-worker-{idx}"))
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        action.setup();
                        action.action(&io);
                        action.teardown();
                    }));
                    finished.store(true, Ordering::SeqCst);
                    result.map_err(panic_message)
                })
                .expect("failed to spawn worker thread")
        })
    }

    /// Joins every worker, then runs `class_teardown` exactly once — unless
    /// the pool was `kill`ed, in which case `class_teardown` is skipped.
    pub fn join(&self) -> Result<()> {
        let result = self.inner.pool.join();
        if !self.inner.pool.was_killed()
            && self
                .inner
                .class_teardown_done
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.inner.action.class_teardown();
        }
        result
    }

    /// `start_async` followed by `join`.
    pub fn execute(&self) -> Result<()> {
        self.start_async()?;
        self.join()
    }

    /// Forcibly terminates all workers without running `teardown` or
    /// `class_teardown`. Threads still mid-flight are detached, not
    /// joined — see the crate-level docs for why a hard kill of an OS
    /// thread isn't offered.
    pub fn kill(&self) -> Result<()> {
        self.inner.pool.kill()
    }

    /// Returns the pool to a pre-start state. Only valid once finished.
    pub fn reset(&self) -> Result<()> {
        self.inner.pool.reset()?;
        self.inner.class_teardown_done.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn input_handles(&self) -> Vec<Box<dyn ConnectorHandle>> {
        self.inner
            .io
            .inputs
            .iter()
            .map(|(_, c)| Box::new(c.clone()) as Box<dyn ConnectorHandle>)
            .collect()
    }

    pub(crate) fn output_handles(&self) -> Vec<Box<dyn ConnectorHandle>> {
        self.inner
            .io
            .outputs
            .iter()
            .map(|(_, c)| Box::new(c.clone()) as Box<dyn ConnectorHandle>)
            .collect()
    }
}
