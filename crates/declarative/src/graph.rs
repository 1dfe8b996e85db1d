//! Resource graph builder
//!
//! Turns an ordered list of declarations into a validated dependency graph.
//! Edges come from two places: the explicit `depends_on` list and every
//! reference found in the attribute values. Building is a pure
//! transformation; on any validation error no graph is produced.

use crate::error::ValidationError;
use crate::resolver;
use crate::types::{NodeId, NodeStatus, is_identifier};
use crate::value::{Attributes, Expression, Reference, Value, parse_expression};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One resource as written by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Addresses (`type.name`) or unique symbolic names
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDeclaration {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            attributes: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style explicit dependency
    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.depends_on.push(target.into());
        self
    }

    pub fn id(&self) -> NodeId {
        NodeId::new(&self.resource_type, &self.name)
    }
}

/// Where an edge came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Listed in `depends_on`
    Explicit,
    /// Implied by a reference in an attribute value
    Reference,
}

/// Directed edge from a dependent node to its dependency (node indices)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub dependent: usize,
    pub dependency: usize,
    pub kind: EdgeKind,
}

/// A node of the graph
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub id: NodeId,
    /// Position in the declaration list; used as the ordering tie-break
    pub index: usize,
    /// Attributes with reference expressions turned into [`Value::Reference`]
    pub attributes: Attributes,
    /// Indices of every node this one depends on, ascending
    pub dependencies: Vec<usize>,
    pub status: NodeStatus,
    /// Provider outputs recorded by the last reconciliation pass
    pub outputs: Option<Attributes>,
}

/// Validated, acyclic resource graph
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<ResourceNode>,
    edges: Vec<Edge>,
    dependents: Vec<Vec<usize>>,
    by_id: HashMap<NodeId, usize>,
}

impl Graph {
    /// Build and validate a graph from declarations
    pub fn build(declarations: Vec<ResourceDeclaration>) -> Result<Self, ValidationError> {
        let mut by_id = HashMap::with_capacity(declarations.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, decl) in declarations.iter().enumerate() {
            if !is_identifier(&decl.resource_type) || !is_identifier(&decl.name) {
                return Err(ValidationError::InvalidAddress {
                    address: format!("{}.{}", decl.resource_type, decl.name),
                });
            }
            let id = decl.id();
            if by_id.insert(id.clone(), index).is_some() {
                return Err(ValidationError::DuplicateNode { node: id });
            }
            by_name.entry(decl.name.clone()).or_default().push(index);
        }

        let names = NameTable {
            by_id: &by_id,
            by_name: &by_name,
            ids: declarations.iter().map(ResourceDeclaration::id).collect(),
        };

        let mut nodes = Vec::with_capacity(declarations.len());
        let mut edges = Vec::new();

        for (index, decl) in declarations.into_iter().enumerate() {
            let id = decl.id();
            let mut deps: BTreeSet<usize> = BTreeSet::new();

            for target in &decl.depends_on {
                let dep = names.resolve_address(&id, target)?;
                if deps.insert(dep) {
                    edges.push(Edge {
                        dependent: index,
                        dependency: dep,
                        kind: EdgeKind::Explicit,
                    });
                }
            }

            let mut attributes = Attributes::new();
            for (key, value) in decl.attributes {
                let value = names.parse_value(&id, &key, value)?;
                for reference in value.references() {
                    let dep = names.resolve_reference(&id, reference)?;
                    if deps.insert(dep) {
                        edges.push(Edge {
                            dependent: index,
                            dependency: dep,
                            kind: EdgeKind::Reference,
                        });
                    }
                }
                attributes.insert(key, value);
            }

            nodes.push(ResourceNode {
                id,
                index,
                attributes,
                dependencies: deps.into_iter().collect(),
                status: NodeStatus::Pending,
                outputs: None,
            });
        }

        let adjacency: Vec<Vec<usize>> = nodes.iter().map(|n| n.dependencies.clone()).collect();
        if let Some(cycle) = resolver::find_cycle(&adjacency) {
            return Err(ValidationError::CyclicReference {
                cycle: cycle.into_iter().map(|i| nodes[i].id.clone()).collect(),
            });
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        for edge in &edges {
            dependents[edge.dependency].push(edge.dependent);
        }
        for list in &mut dependents {
            list.sort_unstable();
            list.dedup();
        }

        log::debug!(
            "Built resource graph: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            nodes,
            edges,
            dependents,
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &ResourceNode {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut ResourceNode {
        &mut self.nodes[index]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Indices of the nodes `index` depends on
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.nodes[index].dependencies
    }

    /// Indices of the nodes that depend on `index`
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Adjacency lists (node → dependencies), one per node
    pub(crate) fn adjacency(&self) -> Vec<Vec<usize>> {
        self.nodes.iter().map(|n| n.dependencies.clone()).collect()
    }
}

/// Name lookups used while building
struct NameTable<'a> {
    by_id: &'a HashMap<NodeId, usize>,
    by_name: &'a HashMap<String, Vec<usize>>,
    ids: Vec<NodeId>,
}

impl NameTable<'_> {
    /// Resolve a `depends_on` entry: `type.name` or a unique bare name
    fn resolve_address(&self, node: &NodeId, target: &str) -> Result<usize, ValidationError> {
        if let Ok(id) = target.parse::<NodeId>() {
            return self.by_id.get(&id).copied().ok_or_else(|| {
                ValidationError::UnresolvedReference {
                    node: node.clone(),
                    target: target.to_string(),
                }
            });
        }
        self.resolve_bare(node, target)
    }

    fn resolve_bare(&self, node: &NodeId, name: &str) -> Result<usize, ValidationError> {
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([only]) => Ok(*only),
            Some(many) if many.len() > 1 => Err(ValidationError::AmbiguousReference {
                node: node.clone(),
                target: name.to_string(),
                candidates: many.iter().map(|&i| self.ids[i].clone()).collect(),
            }),
            _ => Err(ValidationError::UnresolvedReference {
                node: node.clone(),
                target: name.to_string(),
            }),
        }
    }

    fn resolve_reference(
        &self,
        node: &NodeId,
        reference: &Reference,
    ) -> Result<usize, ValidationError> {
        self.by_id
            .get(&reference.node)
            .copied()
            .ok_or_else(|| ValidationError::UnresolvedReference {
                node: node.clone(),
                target: reference.node.to_string(),
            })
    }

    /// Turn `${...}` strings into references, recursing into containers
    fn parse_value(
        &self,
        node: &NodeId,
        attribute: &str,
        value: Value,
    ) -> Result<Value, ValidationError> {
        Ok(match value {
            Value::String(s) => match parse_expression(&s) {
                Expression::Literal => Value::String(s),
                Expression::Path(segments) => {
                    Value::Reference(self.reference_from_path(node, &segments)?)
                }
                Expression::Malformed(expression) => {
                    return Err(ValidationError::MalformedReference {
                        node: node.clone(),
                        attribute: attribute.to_string(),
                        expression: expression.to_string(),
                    });
                }
            },
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.parse_value(node, attribute, v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| self.parse_value(node, attribute, v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
            other => other,
        })
    }

    /// `type.name.field...` when `type.name` is declared, otherwise
    /// `name.field...` with a unique bare name
    fn reference_from_path(
        &self,
        node: &NodeId,
        segments: &[&str],
    ) -> Result<Reference, ValidationError> {
        if segments.len() >= 3 {
            let id = NodeId::new(segments[0], segments[1]);
            if self.by_id.contains_key(&id) {
                return Ok(Reference::new(id, segments[2..].join(".")));
            }
        }

        let index = match self.resolve_bare(node, segments[0]) {
            Ok(index) => index,
            Err(ValidationError::UnresolvedReference { .. }) if segments.len() >= 3 => {
                return Err(ValidationError::UnresolvedReference {
                    node: node.clone(),
                    target: format!("{}.{}", segments[0], segments[1]),
                });
            }
            Err(e) => return Err(e),
        };
        Ok(Reference::new(
            self.ids[index].clone(),
            segments[1..].join("."),
        ))
    }
}
