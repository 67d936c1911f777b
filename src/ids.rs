//! Stable identity for connectors and nodes.

use std::fmt;

use uuid::Uuid;

macro_rules! id_type {
    ($name:ident, $tag:literal) => {
        /// Stable, process-wide unique identity.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            pub(crate) fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "-{}"), self.0)
            }
        }
    };
}

id_type!(ConnectorId, "connector");
id_type!(NodeId, "node");
id_type!(PipelineId, "pipeline");
