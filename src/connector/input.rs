use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::{ConnectorId, NodeId};

use super::{ConnectorHandle, ConnectorKind, NodeLifecycle, OutputLink};

struct Inner<T> {
    id: ConnectorId,
    name: String,
    maxsize: usize,
    default_refresh_interval: Duration,
    sender: Sender<T>,
    receiver: Receiver<T>,
    parent_node: RwLock<Option<NodeId>>,
    parent: RwLock<Option<Arc<dyn NodeLifecycle>>>,
    partners: Mutex<Vec<OutputLink>>,
}

/// A bounded FIFO queue receiving items fanned out from one or more
/// [`OutputConnector`](super::OutputConnector)s.
///
/// Cloning an `InputConnector` is cheap and shares the same underlying
/// queue and bookkeeping — this is how a node's worker pool gives every
/// worker a handle to pull from the same input concurrently.
pub struct InputConnector<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for InputConnector<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> InputConnector<T> {
    /// Creates a new, unattached input using [`Config::default`]'s refresh
    /// interval. `maxsize == 0` means unbounded.
    pub fn new(name: impl Into<String>, maxsize: usize) -> Self {
        Self::with_config(name, maxsize, Config::default()).expect("Config::default is always valid")
    }

    /// Creates a new, unattached input whose default `get`/`iter_get`
    /// refresh interval comes from `config`, validated the same way
    /// [`Config::new`] validates it. `maxsize == 0` means unbounded.
    pub fn with_config(name: impl Into<String>, maxsize: usize, config: Config) -> Result<Self> {
        let name = name.into();
        let default_refresh_interval = config.default_refresh_interval();
        if default_refresh_interval.is_zero() {
            tracing::warn!(input = %name, "rejected input connector with a zero default refresh interval");
            return Err(Error::InvalidArgument(
                "default_refresh_interval must be strictly positive".into(),
            ));
        }
        let (sender, receiver) = if maxsize == 0 {
            unbounded()
        } else {
            bounded(maxsize)
        };
        Ok(Self {
            inner: Arc::new(Inner {
                id: ConnectorId::new(),
                name,
                maxsize,
                default_refresh_interval,
                sender,
                receiver,
                parent_node: RwLock::new(None),
                parent: RwLock::new(None),
                partners: Mutex::new(Vec::new()),
            }),
        })
    }

    /// This connector's stable identity.
    pub fn id(&self) -> ConnectorId {
        self.inner.id
    }

    /// This connector's human-readable name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `0` means unbounded.
    pub fn maxsize(&self) -> usize {
        self.inner.maxsize
    }

    /// The number of items currently queued.
    pub fn size(&self) -> usize {
        self.inner.receiver.len()
    }

    /// True iff no items are currently queued.
    pub fn empty(&self) -> bool {
        self.inner.receiver.is_empty()
    }

    /// True iff this is a bounded input and its queue is at `maxsize`.
    pub fn full(&self) -> bool {
        self.inner.maxsize > 0 && self.inner.receiver.len() >= self.inner.maxsize
    }

    /// The refresh interval `get`/`iter_get` fall back to when called with
    /// `refresh_interval: None`, fixed at construction time.
    pub fn default_refresh_interval(&self) -> Duration {
        self.inner.default_refresh_interval
    }

    /// True iff at least one output is connected to this input.
    pub fn is_connected(&self) -> bool {
        !self.inner.partners.lock().is_empty()
    }

    /// The node that owns this input, if any.
    pub fn parent_node(&self) -> Option<NodeId> {
        *self.inner.parent_node.read()
    }

    /// Called once by `Node` construction to wire this input back to the
    /// node that owns it. Not part of the public API users compose a
    /// graph with.
    pub(crate) fn bind_parent(&self, node_id: NodeId, status: Arc<dyn NodeLifecycle>) {
        *self.inner.parent_node.write() = Some(node_id);
        *self.inner.parent.write() = Some(status);
    }

    /// Called by a connected `OutputConnector::connect` to record the
    /// partner and its upstream liveness handle. Idempotent by id.
    pub(crate) fn register_partner(&self, link: OutputLink) {
        let mut partners = self.inner.partners.lock();
        if !partners.iter().any(|p| p.id == link.id) {
            partners.push(link);
        }
    }

    /// Symmetric half of `OutputConnector::disconnect`.
    pub(crate) fn unregister_partner(&self, id: ConnectorId) -> Result<()> {
        let mut partners = self.inner.partners.lock();
        let before = partners.len();
        partners.retain(|p| p.id != id);
        if partners.len() == before {
            tracing::warn!(input = %self.inner.name, "disconnect of a non-partner connector");
            return Err(Error::MissingConnection(format!(
                "input {} has no partner with that id",
                self.inner.name
            )));
        }
        Ok(())
    }

    /// Whether any upstream producer connected to this input is still not
    /// finished. Used by the owning node's `is_expecting_data`.
    pub(crate) fn any_upstream_unfinished(&self) -> bool {
        self.inner
            .partners
            .lock()
            .iter()
            .any(|p| p.status.as_ref().map_or(true, |s| !s.is_finished()))
    }

    /// Accepts an item from a connected output. Internal: only
    /// `OutputConnector::put` calls this.
    pub(crate) fn _put(&self, item: T) -> Result<()> {
        self.inner.sender.send(item).map_err(|_| {
            Error::MissingConnection(format!(
                "input {} has no live receiver (connector was dropped)",
                self.inner.name
            ))
        })
    }

    /// Removes and returns the oldest item, blocking while the queue is
    /// empty and the owning node is still expecting data.
    ///
    /// `timeout` of `None` waits indefinitely. `refresh_interval` bounds
    /// how long a blocked call sits before re-checking upstream liveness;
    /// `None` falls back to [`Self::default_refresh_interval`], the value
    /// fixed when this input was constructed. Either way it must be
    /// strictly positive.
    pub fn get(&self, timeout: Option<Duration>, refresh_interval: Option<Duration>) -> Result<T> {
        let refresh_interval = refresh_interval.unwrap_or(self.inner.default_refresh_interval);
        if refresh_interval.is_zero() {
            tracing::warn!(input = %self.inner.name, "get called with a zero refresh_interval");
            return Err(Error::InvalidArgument(
                "refresh_interval must be strictly positive".into(),
            ));
        }
        let start = Instant::now();
        let mut remaining = timeout;
        loop {
            let step = match remaining {
                Some(r) => r.min(refresh_interval),
                None => refresh_interval,
            };
            match self.inner.receiver.recv_timeout(step) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!(input = %self.inner.name, "input disconnected with an empty queue");
                    return Err(Error::Empty { connector: self.inner.id });
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(r) = remaining {
                        remaining = Some(r.saturating_sub(step));
                    }
                    let expecting = self
                        .inner
                        .parent
                        .read()
                        .as_ref()
                        .map_or(true, |p| p.is_expecting_data());
                    if !expecting {
                        tracing::debug!(input = %self.inner.name, "get found an empty queue with no upstream left");
                        return Err(Error::Empty { connector: self.inner.id });
                    }
                    if remaining == Some(Duration::ZERO) {
                        tracing::debug!(input = %self.inner.name, "get timed out while upstream is still expected");
                        return Err(Error::Timeout {
                            connector: self.inner.id,
                            waited_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    /// A lazy stream of items, terminating when the owning node is no
    /// longer expecting data and the queue has drained. Requires this
    /// input to be attached to a parent node. `refresh_interval: None`
    /// falls back to [`Self::default_refresh_interval`] on every pull.
    pub fn iter_get(&self, timeout: Option<Duration>, refresh_interval: Option<Duration>) -> Result<IterGet<'_, T>> {
        if self.inner.parent.read().is_none() {
            tracing::warn!(input = %self.inner.name, "iter_get called with no parent node");
            return Err(Error::MissingConnection(format!(
                "input {} has no parent node to iterate against",
                self.inner.name
            )));
        }
        Ok(IterGet { input: self, timeout, refresh_interval })
    }
}

impl<T: Send + 'static> ConnectorHandle for InputConnector<T> {
    fn id(&self) -> ConnectorId {
        self.inner.id
    }

    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Input
    }

    fn node_id(&self) -> Option<NodeId> {
        *self.inner.parent_node.read()
    }

    fn partner_ids(&self) -> Vec<ConnectorId> {
        self.inner.partners.lock().iter().map(|p| p.id).collect()
    }
}

impl<T> fmt::Debug for InputConnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputConnector({}, {})", self.inner.name, self.inner.id)
    }
}

impl<T> fmt::Display for InputConnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputConnector({}, {})", self.inner.name, self.inner.id)
    }
}

/// Iterator returned by [`InputConnector::iter_get`].
///
/// Yields `Ok(item)` for each item pulled, `Err(Error::Timeout { .. })`
/// if a single pull exceeds its time budget while upstream is still
/// expected to produce (the timeout applies per item, not to the
/// iteration as a whole — call `next()` again to keep waiting), and ends
/// the iteration (`None`) once the queue is drained and upstream is done.
pub struct IterGet<'a, T> {
    input: &'a InputConnector<T>,
    timeout: Option<Duration>,
    refresh_interval: Option<Duration>,
}

impl<'a, T> Iterator for IterGet<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.input.get(self.timeout, self.refresh_interval) {
            Ok(item) => Some(Ok(item)),
            Err(Error::Empty { .. }) => None,
            Err(other) => Some(Err(other)),
        }
    }
}
