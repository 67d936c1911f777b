//! A parallel dataflow framework: typed, bounded channels between
//! worker-pooled graph nodes.
//!
//! A [`Pipeline`] is a directed acyclic graph of [`Node`]s. Each node owns
//! named [`InputConnector`]s and [`OutputConnector`]s and a pool of
//! threads that run a user-supplied [`NodeAction`]. Connectors are
//! bounded FIFO queues: an [`OutputConnector::put`] fans an item out to
//! every connected input, blocking when a downstream queue is full; an
//! [`InputConnector::get`] blocks while its queue is empty and at least
//! one upstream node is still producing, and reports an empty-and-done
//! condition once none are.
//!
//! Every node carries a validated [`Config`] of defaults — bounded queue
//! size, a `get` refresh interval, and worker count — so call sites can
//! lean on `None` for the refresh interval instead of repeating a constant.
//!
//! ```no_run
//! use sluice::node::{Node, NodeAction, NodeIo};
//! use sluice::pipeline::Pipeline;
//!
//! struct Doubler;
//!
//! impl NodeAction for Doubler {
//!     type Item = u32;
//!
//!     fn action(&self, io: &NodeIo<u32>) {
//!         let input = io.input("in").unwrap();
//!         let output = io.output("out").unwrap();
//!         for item in input.iter_get(None, None).unwrap() {
//!             output.put(item.unwrap() * 2).unwrap();
//!         }
//!     }
//! }
//!
//! # fn main() -> sluice::error::Result<()> {
//! let source = Node::builder("source", Doubler).output("out").build()?;
//! let sink = Node::builder("sink", Doubler).input("in", 8).build()?;
//! source.io().output("out").unwrap().connect(sink.io().input("in").unwrap())?;
//!
//! let mut pipeline = Pipeline::new("demo");
//! pipeline.add_node(source).add_node(sink);
//! pipeline.run()?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod connector;
pub mod error;
mod ids;
pub mod node;
pub mod pipeline;
mod pool;
mod util;

pub use config::Config;
pub use connector::{ConnectorHandle, ConnectorKind, InputConnector, IterGet, NodeLifecycle, OutputConnector};
pub use error::{Error, Result};
pub use ids::{ConnectorId, NodeId, PipelineId};
pub use node::{Node, NodeAction, NodeBuilder, NodeIo};
pub use pipeline::{Pipeline, PipelineNode};
