//! Configuration file schema
//!
//! A variant file declares resources as `[[resource]]` tables. String values
//! may use `${var.NAME}` placeholders for entries of `[variables]`; those are
//! expanded here, before the graph builder sees the declarations.

use anyhow::{Context, Result, bail};
use declarative::{Attributes, Graph, ResourceDeclaration, Value};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{var\.([A-Za-z0-9_-]+)\}").expect("valid regex"));

/// One configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    /// Human-readable description shown by `strata variants`
    #[serde(default)]
    pub description: Option<String>,

    /// Values substituted into `${var.NAME}` placeholders
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    /// Resource declarations, in declaration order
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDeclaration>,
}

impl VariantConfig {
    /// Load a config file and expand its variables
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse TOML content and expand its variables
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).context("Invalid TOML format")?;
        config.expand_variables()?;
        Ok(config)
    }

    fn expand_variables(&mut self) -> Result<()> {
        let variables = &self.variables;
        for resource in &mut self.resources {
            let id = resource.id();
            let attributes = std::mem::take(&mut resource.attributes);
            resource.attributes = attributes
                .into_iter()
                .map(|(key, value)| {
                    expand_value(value, variables)
                        .map(|v| (key.clone(), v))
                        .with_context(|| format!("{id}: attribute '{key}'"))
                })
                .collect::<Result<Attributes>>()?;
        }
        Ok(())
    }

    /// Build the dependency graph for this configuration
    pub fn graph(&self) -> Result<Graph, declarative::ValidationError> {
        Graph::build(self.resources.clone())
    }
}

/// Expand `${var.NAME}` placeholders in a value
///
/// A string that is exactly one placeholder takes the variable's value with
/// its type; placeholders inside longer strings are rendered as text.
fn expand_value(value: Value, variables: &BTreeMap<String, Value>) -> Result<Value> {
    match value {
        Value::String(s) => expand_string(&s, variables),
        Value::List(items) => items
            .into_iter()
            .map(|v| expand_value(v, variables))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| expand_value(v, variables).map(|v| (k, v)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Object),
        other => Ok(other),
    }
}

fn expand_string(s: &str, variables: &BTreeMap<String, Value>) -> Result<Value> {
    let mut names = VARIABLE.captures_iter(s).map(|c| c[1].to_string()).peekable();
    if names.peek().is_none() {
        return Ok(Value::String(s.to_string()));
    }

    for name in names {
        if !variables.contains_key(&name) {
            bail!("unknown variable '{name}'");
        }
    }

    if let Some(caps) = VARIABLE.captures(s)
        && caps.get(0).is_some_and(|m| m.as_str() == s)
    {
        return Ok(variables[&caps[1]].clone());
    }

    let expanded = VARIABLE.replace_all(s, |caps: &regex::Captures<'_>| {
        match &variables[&caps[1]] {
            Value::String(text) => text.clone(),
            other => other.render(),
        }
    });
    Ok(Value::String(expanded.into_owned()))
}
