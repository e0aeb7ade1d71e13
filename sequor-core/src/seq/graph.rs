//! The compiled sequence graph.
//!
//! Built once from a validated [`SequenceDefinition`] and read-only
//! thereafter. The graph is a flat registry of nodes plus transitions
//! indexed by source id; cycles are expected (loops are a feature), so
//! there is no ownership between nodes. The per-sync expected-arrival
//! sets used by the fork/join protocol are precomputed here.

use super::definition::SequenceDefinition;
use super::node::NodeDefinition;
use crate::error::{Result, SequorError};
use crate::types::NodeId;
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// A compiled transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Condition expression; `None` is always satisfied.
    pub condition: Option<String>,
}

/// A wrapper declaration on a compiled function node.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperSpec {
    /// Registered wrapper name.
    pub name: String,
    /// Constructor argument bindings.
    pub arguments: HashMap<String, Value>,
}

/// The function-specific attributes of a compiled node.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    /// Registered function name.
    pub function: String,
    /// Argument bindings (name → expression string or literal).
    pub arguments: HashMap<String, Value>,
    /// Wrappers in declared order.
    pub wrappers: Vec<WrapperSpec>,
    /// Execution time limit.
    pub timeout: Option<Duration>,
    /// On-the-fly name to bind the returned value to.
    pub return_alias: Option<String>,
    /// Whether a function failure fails the whole run.
    pub is_test: bool,
}

/// The variable-specific attributes of a compiled node.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    /// Ordered assignments (name, binding).
    pub assignments: Vec<(String, Value)>,
}

/// The kind-specific payload of a compiled node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Entry point.
    Start,
    /// Terminal node.
    Stop,
    /// User function invocation.
    Function(FunctionSpec),
    /// On-the-fly variable writes.
    Variable(VariableSpec),
    /// Parallel fork.
    ParallelSplit,
    /// Parallel join.
    ParallelSync,
}

/// A compiled node.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Unique node id.
    pub id: NodeId,
    /// Optional display name.
    pub name: Option<String>,
    /// Kind-specific payload.
    pub kind: NodeKind,
}

impl GraphNode {
    /// A label for logging: the display name if present, the id otherwise.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.id, name),
            None => self.id.to_string(),
        }
    }
}

/// The compiled, immutable sequence graph.
#[derive(Debug)]
pub struct SequenceGraph {
    nodes: HashMap<NodeId, GraphNode>,
    /// Outgoing transitions per source node, in declared order.
    outgoing: HashMap<NodeId, Vec<Transition>>,
    start_nodes: Vec<NodeId>,
    /// For each parallel_sync node: the static set of node ids with a
    /// transition into it. A sync fires for a color once its arrival set
    /// equals this set.
    expected_arrivals: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl SequenceGraph {
    /// Build a graph from a definition.
    ///
    /// The definition must have passed validation; `build` assumes ids are
    /// unique and targets resolve.
    pub(super) fn build(definition: &SequenceDefinition) -> Self {
        let mut nodes = HashMap::with_capacity(definition.nodes.len());
        let mut outgoing: HashMap<NodeId, Vec<Transition>> = HashMap::new();
        let mut start_nodes = Vec::new();

        for node in &definition.nodes {
            let id = node.id();
            let transitions: Vec<Transition> = node
                .transitions()
                .iter()
                .map(|t| Transition {
                    source: id,
                    target: t.target,
                    condition: t.condition.clone(),
                })
                .collect();

            let kind = match node {
                NodeDefinition::Start { .. } => {
                    start_nodes.push(id);
                    NodeKind::Start
                }
                NodeDefinition::Stop { .. } => NodeKind::Stop,
                NodeDefinition::Function {
                    function,
                    arguments,
                    wrappers,
                    timeout_ms,
                    return_alias,
                    is_test,
                    ..
                } => NodeKind::Function(FunctionSpec {
                    function: function.clone(),
                    arguments: arguments.clone(),
                    wrappers: wrappers
                        .iter()
                        .map(|w| WrapperSpec {
                            name: w.name.clone(),
                            arguments: w.arguments.clone(),
                        })
                        .collect(),
                    timeout: timeout_ms.map(Duration::from_millis),
                    return_alias: return_alias.clone(),
                    is_test: *is_test,
                }),
                NodeDefinition::Variable { assignments, .. } => {
                    NodeKind::Variable(VariableSpec {
                        assignments: assignments
                            .iter()
                            .map(|a| (a.name.clone(), a.value.clone()))
                            .collect(),
                    })
                }
                NodeDefinition::ParallelSplit { .. } => NodeKind::ParallelSplit,
                NodeDefinition::ParallelSync { .. } => NodeKind::ParallelSync,
            };

            nodes.insert(
                id,
                GraphNode {
                    id,
                    name: node.name().map(str::to_string),
                    kind,
                },
            );
            outgoing.insert(id, transitions);
        }

        // Expected arrivals: the direct predecessors of each sync node.
        let mut expected_arrivals: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for (source, transitions) in &outgoing {
            for transition in transitions {
                if let Some(target) = nodes.get(&transition.target) {
                    if matches!(target.kind, NodeKind::ParallelSync) {
                        expected_arrivals
                            .entry(transition.target)
                            .or_default()
                            .insert(*source);
                    }
                }
            }
        }

        Self {
            nodes,
            outgoing,
            start_nodes,
            expected_arrivals,
        }
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Result<&GraphNode> {
        self.nodes
            .get(&id)
            .ok_or(SequorError::NodeNotFound { node_id: id })
    }

    /// The outgoing transitions of a node, in declared order.
    pub fn outgoing(&self, id: NodeId) -> &[Transition] {
        self.outgoing.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The ids of all start nodes.
    pub fn start_nodes(&self) -> &[NodeId] {
        &self.start_nodes
    }

    /// The static set of node ids expected to arrive at a sync node.
    pub fn expected_arrivals(&self, sync: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.expected_arrivals.get(&sync)
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// The registered function names used by this graph.
    pub fn function_names(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .filter_map(|n| match &n.kind {
                NodeKind::Function(spec) => Some(spec.function.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The registered wrapper names used by this graph.
    pub fn wrapper_names(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .filter_map(|n| match &n.kind {
                NodeKind::Function(spec) => Some(&spec.wrappers),
                _ => None,
            })
            .flatten()
            .map(|w| w.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(yaml: &str) -> SequenceGraph {
        SequenceDefinition::from_yaml(yaml).unwrap().compile().unwrap()
    }

    const PARALLEL: &str = r#"
name: parallel
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: parallel_split
    transitions:
      - target: 2
      - target: 3
  - id: 2
    type: function
    function: left
    transitions:
      - target: 4
  - id: 3
    type: function
    function: right
    transitions:
      - target: 4
  - id: 4
    type: parallel_sync
    transitions:
      - target: 5
  - id: 5
    type: stop
"#;

    #[test]
    fn start_nodes_and_lookup() {
        let graph = graph(PARALLEL);
        assert_eq!(graph.start_nodes(), &[NodeId::new(0)]);
        assert!(graph.node(NodeId::new(4)).is_ok());
        let err = graph.node(NodeId::new(42)).unwrap_err();
        assert_eq!(err.code(), "E305");
    }

    #[test]
    fn outgoing_preserves_declared_order() {
        let graph = graph(PARALLEL);
        let targets: Vec<u32> = graph
            .outgoing(NodeId::new(1))
            .iter()
            .map(|t| t.target.as_u32())
            .collect();
        assert_eq!(targets, vec![2, 3]);
    }

    #[test]
    fn expected_arrivals_computed() {
        let graph = graph(PARALLEL);
        let expected = graph.expected_arrivals(NodeId::new(4)).unwrap();
        let ids: Vec<u32> = expected.iter().map(|id| id.as_u32()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn no_arrivals_for_non_sync() {
        let graph = graph(PARALLEL);
        assert!(graph.expected_arrivals(NodeId::new(2)).is_none());
    }

    #[test]
    fn registry_name_queries() {
        let graph = graph(PARALLEL);
        let functions: Vec<&str> = graph.function_names().into_iter().collect();
        assert_eq!(functions, vec!["left", "right"]);
        assert!(graph.wrapper_names().is_empty());
    }

    #[test]
    fn timeout_converted_to_duration() {
        let yaml = r#"
name: with_timeout
nodes:
  - id: 0
    type: start
    transitions:
      - target: 1
  - id: 1
    type: function
    function: slow
    timeout_ms: 250
    transitions:
      - target: 2
  - id: 2
    type: stop
"#;
        let graph = graph(yaml);
        match &graph.node(NodeId::new(1)).unwrap().kind {
            NodeKind::Function(spec) => {
                assert_eq!(spec.timeout, Some(Duration::from_millis(250)));
            }
            other => panic!("expected function node, got {:?}", other),
        }
    }
}
