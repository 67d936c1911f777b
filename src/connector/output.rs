use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::ids::{ConnectorId, NodeId};

use super::{ConnectorHandle, ConnectorKind, NodeLifecycle, OutputLink};
use super::input::InputConnector;

struct Partner<T> {
    connector: InputConnector<T>,
}

struct Inner<T> {
    id: ConnectorId,
    name: String,
    parent_node: RwLock<Option<NodeId>>,
    parent: RwLock<Option<Arc<dyn NodeLifecycle>>>,
    partners: Mutex<Vec<Partner<T>>>,
}

/// The sending side of a connector: `put` fans an item out to every
/// connected [`InputConnector`], blocking on any partner that is full.
///
/// Cheap to clone; clones share the same partner set.
pub struct OutputConnector<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OutputConnector<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> OutputConnector<T> {
    /// Creates a new, unattached output.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ConnectorId::new(),
                name: name.into(),
                parent_node: RwLock::new(None),
                parent: RwLock::new(None),
                partners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// This connector's stable identity.
    pub fn id(&self) -> ConnectorId {
        self.inner.id
    }

    /// This connector's human-readable name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The node that owns this output, if any.
    pub fn parent_node(&self) -> Option<NodeId> {
        *self.inner.parent_node.read()
    }

    pub(crate) fn bind_parent(&self, node_id: NodeId, status: Arc<dyn NodeLifecycle>) {
        *self.inner.parent_node.write() = Some(node_id);
        *self.inner.parent.write() = Some(status);
    }

    /// Attaches `input` as a partner of this output. Idempotent: connecting
    /// an already-connected pair leaves the partner set unchanged.
    pub fn connect(&self, input: &InputConnector<T>) -> Result<()> {
        let mut partners = self.inner.partners.lock();
        if partners.iter().any(|p| p.connector.id() == input.id()) {
            return Ok(());
        }
        partners.push(Partner { connector: input.clone() });
        drop(partners);

        input.register_partner(OutputLink {
            id: self.inner.id,
            name: self.inner.name.clone(),
            node: *self.inner.parent_node.read(),
            status: self.inner.parent.read().clone(),
        });
        Ok(())
    }

    /// Detaches `input` from this output. Errors if the two were never
    /// connected.
    pub fn disconnect(&self, input: &InputConnector<T>) -> Result<()> {
        let mut partners = self.inner.partners.lock();
        let before = partners.len();
        partners.retain(|p| p.connector.id() != input.id());
        if partners.len() == before {
            tracing::warn!(output = %self.inner.name, "disconnect of a non-partner connector");
            return Err(Error::MissingConnection(format!(
                "output {} has no partner with that id",
                self.inner.name
            )));
        }
        drop(partners);
        input.unregister_partner(self.inner.id)
    }

    /// The number of inputs currently connected to this output.
    pub fn partner_count(&self) -> usize {
        self.inner.partners.lock().len()
    }

    /// True iff at least one input is connected to this output.
    pub fn is_connected(&self) -> bool {
        !self.inner.partners.lock().is_empty()
    }
}

impl<T: Clone> OutputConnector<T> {
    /// Enqueues `item` into every connected input's queue, in partner
    /// order, blocking on any partner whose queue is currently full.
    ///
    /// Errors with [`Error::MissingConnection`] if there are no partners.
    pub fn put(&self, item: T) -> Result<()> {
        let partners = self.inner.partners.lock();
        if partners.is_empty() {
            tracing::warn!(output = %self.inner.name, "put on an output with no partners");
            return Err(Error::MissingConnection(format!(
                "output {} has no partners",
                self.inner.name
            )));
        }
        for partner in partners.iter() {
            partner.connector._put(item.clone())?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> ConnectorHandle for OutputConnector<T> {
    fn id(&self) -> ConnectorId {
        self.inner.id
    }

    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Output
    }

    fn node_id(&self) -> Option<NodeId> {
        *self.inner.parent_node.read()
    }

    fn partner_ids(&self) -> Vec<ConnectorId> {
        self.inner.partners.lock().iter().map(|p| p.connector.id()).collect()
    }
}

impl<T> fmt::Debug for OutputConnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputConnector({}, {})", self.inner.name, self.inner.id)
    }
}

impl<T> fmt::Display for OutputConnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputConnector({}, {})", self.inner.name, self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn connect_is_idempotent() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let input: InputConnector<u32> = InputConnector::new("in", 0);
        output.connect(&input).unwrap();
        output.connect(&input).unwrap();
        assert_eq!(output.partner_count(), 1);
    }

    #[test]
    fn disconnect_is_symmetric() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let input: InputConnector<u32> = InputConnector::new("in", 0);
        output.connect(&input).unwrap();
        output.disconnect(&input).unwrap();
        assert_eq!(output.partner_count(), 0);
        assert!(!input.is_connected());
    }

    #[test]
    fn disconnect_of_a_non_partner_fails() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let input: InputConnector<u32> = InputConnector::new("in", 0);
        let err = output.disconnect(&input).unwrap_err();
        assert!(matches!(err, Error::MissingConnection(_)));
    }

    #[test]
    fn put_without_partners_fails() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let err = output.put(1).unwrap_err();
        assert!(matches!(err, Error::MissingConnection(_)));
    }

    #[test]
    fn put_fans_out_to_every_partner() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let a: InputConnector<u32> = InputConnector::new("a", 0);
        let b: InputConnector<u32> = InputConnector::new("b", 0);
        output.connect(&a).unwrap();
        output.connect(&b).unwrap();
        output.put(7).unwrap();
        assert_eq!(a.get(None, Some(Duration::from_millis(10))).unwrap(), 7);
        assert_eq!(b.get(None, Some(Duration::from_millis(10))).unwrap(), 7);
    }

    #[test]
    fn put_blocks_on_a_full_partner_until_drained() {
        let output: OutputConnector<u32> = OutputConnector::new("out");
        let input: InputConnector<u32> = InputConnector::new("in", 1);
        output.connect(&input).unwrap();
        output.put(1).unwrap();

        let output2 = output.clone();
        let handle = std::thread::spawn(move || {
            output2.put(2).unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        assert_eq!(input.get(None, Some(Duration::from_millis(10))).unwrap(), 1);
        handle.join().unwrap();
        assert_eq!(input.get(None, Some(Duration::from_millis(10))).unwrap(), 2);
    }
}
