//! Local provider
//!
//! Stands in for a cloud API client. It assigns deterministic outputs so
//! plans and reports are reproducible, and rejects any node whose attributes
//! set `fail = true`.

use anyhow::{Result, bail};
use declarative::{Attributes, NodeId, NodeRecord, Provider, Value};

/// Provider that "creates" resources by deriving their outputs
#[derive(Debug, Clone)]
pub struct LocalProvider {
    scope: String,
}

impl LocalProvider {
    /// Outputs are namespaced by `scope` (the variant name)
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    fn outputs(&self, id: &NodeId) -> Attributes {
        let mut outputs = Attributes::new();
        outputs.insert(
            "id".into(),
            Value::from(format!(
                "/scopes/{}/{}/{}",
                self.scope, id.resource_type, id.name
            )),
        );
        outputs.insert("principal_id".into(), Value::from(self.principal_id(id)));
        outputs
    }

    /// UUID-shaped identity derived from the scope and node
    fn principal_id(&self, id: &NodeId) -> String {
        let hash = blake3::hash(format!("{}/{}", self.scope, id).as_bytes());
        let hex = hash.to_hex();
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

fn check_fail(id: &NodeId, attributes: &Attributes, operation: &str) -> Result<()> {
    if attributes.get("fail").and_then(Value::as_bool) == Some(true) {
        bail!("{operation} of {id} rejected (fail = true)");
    }
    Ok(())
}

impl Provider for LocalProvider {
    fn create(&self, id: &NodeId, attributes: &Attributes) -> Result<Attributes> {
        check_fail(id, attributes, "create")?;
        log::debug!("local: create {id}");
        Ok(self.outputs(id))
    }

    fn update(
        &self,
        id: &NodeId,
        attributes: &Attributes,
        _prior: &NodeRecord,
    ) -> Result<Attributes> {
        check_fail(id, attributes, "update")?;
        log::debug!("local: update {id}");
        Ok(self.outputs(id))
    }

    fn delete(&self, id: &NodeId, record: &NodeRecord) -> Result<()> {
        check_fail(id, &record.attributes, "delete")?;
        log::debug!("local: delete {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_are_deterministic() {
        let provider = LocalProvider::new("dev");
        let id = NodeId::new("workspace", "w");
        let first = provider.create(&id, &Attributes::new()).unwrap();
        let second = provider.create(&id, &Attributes::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["id"], Value::from("/scopes/dev/workspace/w"));

        let principal = first["principal_id"].as_str().unwrap();
        assert_eq!(principal.len(), 36);
        assert_eq!(principal.matches('-').count(), 4);
    }

    #[test]
    fn test_scopes_get_distinct_principals() {
        let id = NodeId::new("workspace", "w");
        let dev = LocalProvider::new("dev").create(&id, &Attributes::new()).unwrap();
        let prod = LocalProvider::new("prod").create(&id, &Attributes::new()).unwrap();
        assert_ne!(dev["principal_id"], prod["principal_id"]);
    }

    #[test]
    fn test_fail_attribute_rejects() {
        let provider = LocalProvider::new("dev");
        let id = NodeId::new("storage_account", "s");
        let mut attributes = Attributes::new();
        attributes.insert("fail".into(), Value::Bool(true));

        let err = provider.create(&id, &attributes).unwrap_err();
        assert!(err.to_string().contains("storage_account.s"));
        assert!(provider.delete(&id, &NodeRecord::new(attributes, Attributes::new())).is_err());
        assert!(provider.delete(&id, &NodeRecord::default()).is_ok());
    }
}
