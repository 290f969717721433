//! Tagged graph events fanned out to listeners.
//!
//! The same enumeration carries two granularities of notification:
//!
//! - **statement-level** events emitted by the graph store for every
//!   effective insertion or removal (consumed by the change history), and
//! - **resource-level** events emitted by the protocol handler once per
//!   completed request (consumed by the interaction history).
//!
//! Listeners fold the variants they care about and ignore the rest.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::term::{GraphName, Quad};

/// Kind of protocol operation on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// `GET`: serialize the resource.
    Retrieve,
    /// `PUT`: replace the resource content.
    Replace,
    /// `DELETE`: remove the resource.
    Delete,
    /// `POST`: add statements to the resource.
    Extend,
}

impl OperationKind {
    /// All kinds, in interaction-history column order.
    pub const ALL: [Self; 4] = [Self::Retrieve, Self::Replace, Self::Delete, Self::Extend];

    /// Position of this kind in [`OperationKind::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Retrieve => 0,
            Self::Replace => 1,
            Self::Delete => 2,
            Self::Extend => 3,
        }
    }

    /// Short label used in column headers.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Retrieve => "get",
            Self::Replace => "put",
            Self::Delete => "delete",
            Self::Extend => "post",
        }
    }
}

/// Payload of a resource-level event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAccess {
    /// The resource (named graph) the operation targeted.
    pub graph: GraphName,
    /// Time spent in the store operation.
    pub elapsed: Duration,
}

/// A notification published to every registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A statement was inserted into the store.
    StatementAdded(Quad),
    /// A statement was removed from the store.
    StatementRemoved(Quad),
    /// A resource was retrieved.
    ResourceRetrieved(ResourceAccess),
    /// A resource was replaced.
    ResourceReplaced(ResourceAccess),
    /// A resource was extended.
    ResourceExtended(ResourceAccess),
    /// A resource was deleted.
    ResourceDeleted(ResourceAccess),
}

impl GraphEvent {
    /// Build the resource-level event for `kind`.
    pub const fn resource(kind: OperationKind, graph: GraphName, elapsed: Duration) -> Self {
        let access = ResourceAccess { graph, elapsed };
        match kind {
            OperationKind::Retrieve => Self::ResourceRetrieved(access),
            OperationKind::Replace => Self::ResourceReplaced(access),
            OperationKind::Delete => Self::ResourceDeleted(access),
            OperationKind::Extend => Self::ResourceExtended(access),
        }
    }

    /// Operation kind and payload for resource-level events, `None` for
    /// statement-level events.
    pub const fn as_resource(&self) -> Option<(OperationKind, &ResourceAccess)> {
        match self {
            Self::ResourceRetrieved(access) => Some((OperationKind::Retrieve, access)),
            Self::ResourceReplaced(access) => Some((OperationKind::Replace, access)),
            Self::ResourceExtended(access) => Some((OperationKind::Extend, access)),
            Self::ResourceDeleted(access) => Some((OperationKind::Delete, access)),
            Self::StatementAdded(_) | Self::StatementRemoved(_) => None,
        }
    }
}
