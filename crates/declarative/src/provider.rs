//! Provider trait - the narrow seam to whatever actually creates resources
//!
//! The driver hands a provider fully resolved attribute maps; the provider
//! returns the fields it assigned (generated ids, identity principal ids,
//! endpoints). Those outputs feed reference resolution for dependents.

use crate::state::NodeRecord;
use crate::types::NodeId;
use crate::value::Attributes;
use anyhow::Result;

/// What the provider can tell about a resource's actual state
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// The provider cannot (or does not) report actual state
    Unknown,
    /// The resource does not exist
    Absent,
    /// The resource exists with these attributes
    Present(Attributes),
}

/// Client for the system that owns the resources
///
/// # Example
///
/// ```ignore
/// use declarative::{Attributes, NodeId, NodeRecord, Provider, Value};
///
/// struct EchoProvider;
///
/// impl Provider for EchoProvider {
///     fn create(&self, id: &NodeId, _attributes: &Attributes) -> anyhow::Result<Attributes> {
///         let mut outputs = Attributes::new();
///         outputs.insert("id".into(), Value::from(format!("/{}/{}", id.resource_type, id.name)));
///         Ok(outputs)
///     }
///
///     fn update(
///         &self,
///         _id: &NodeId,
///         _attributes: &Attributes,
///         prior: &NodeRecord,
///     ) -> anyhow::Result<Attributes> {
///         Ok(prior.outputs.clone())
///     }
///
///     fn delete(&self, _id: &NodeId, _record: &NodeRecord) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Provider: Send + Sync {
    /// Create a resource; returns provider-assigned outputs
    fn create(&self, id: &NodeId, attributes: &Attributes) -> Result<Attributes>;

    /// Update an existing resource; returns its outputs after the update
    fn update(
        &self,
        id: &NodeId,
        attributes: &Attributes,
        prior: &NodeRecord,
    ) -> Result<Attributes>;

    /// Delete a resource
    fn delete(&self, id: &NodeId, record: &NodeRecord) -> Result<()>;

    /// Observe the actual state, used to detect drift from the recorded state
    fn read(&self, _id: &NodeId) -> Result<Observed> {
        Ok(Observed::Unknown)
    }
}
