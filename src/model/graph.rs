// This module implements Model, the append-only node container behind a map. Nodes are
// stored in insertion order and identified by their index; adding a node validates that
// every port range it consumes points at an existing output port of an earlier node, which
// is what makes index order a dependency order and lets the compiler walk the graph with a
// plain loop. The model also answers the connectivity questions the compiler asks: full or
// partial references to an output port, how many distinct nodes consume a node's outputs
// (the "single descendant" test used by region merging), and which nodes play the input and
// output roles.

//! The node graph.

use super::node::{Node, NodeId, NodeRole};
use super::port::{OutputPort, OutputPortRef, PortElements, PortRange};
use crate::core::{CompileError, CompileResult};
use hashbrown::HashMap;

#[derive(Debug, Default)]
pub struct Model {
    nodes: Vec<Box<dyn Node>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> CompileResult<NodeId> {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, node: Box<dyn Node>) -> CompileResult<NodeId> {
        for input in node.input_ports() {
            for range in input.elements().ranges() {
                let port = self.output_port(range.port()).ok_or_else(|| {
                    CompileError::invalid_argument(format!(
                        "{} input '{}' references unknown port {}:{}",
                        node.type_name(),
                        input.name(),
                        range.port().node,
                        range.port().index
                    ))
                })?;
                if range.start() + range.count() > port.size() {
                    return Err(CompileError::invalid_argument(format!(
                        "{} input '{}' reads past the end of port '{}'",
                        node.type_name(),
                        input.name(),
                        port.name()
                    )));
                }
            }
        }

        let id = NodeId(self.nodes.len());
        log::trace!("Adding node {} ({})", id, node.type_name());
        self.nodes.push(node);
        Ok(id)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id.0).map(|node| node.as_ref())
    }

    /// Nodes in dependency order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &dyn Node)> + '_ {
        self.nodes.iter().enumerate().map(|(idx, node)| (NodeId(idx), node.as_ref()))
    }

    pub fn output_port(&self, port: OutputPortRef) -> Option<&OutputPort> {
        self.node(port.node).and_then(|node| node.output_ports().get(port.index))
    }

    fn require_port(&self, port: OutputPortRef) -> CompileResult<&OutputPort> {
        self.output_port(port).ok_or_else(|| {
            CompileError::invalid_argument(format!("no output port {} on node {}", port.index, port.node))
        })
    }

    /// All elements of output port `index` of `node`.
    pub fn full_output(&self, node: NodeId, index: usize) -> CompileResult<PortElements> {
        let port = OutputPortRef::new(node, index);
        let desc = self.require_port(port)?;
        Ok(PortRange::full(port, desc).into())
    }

    /// Elements `start..start + count` of output port `index` of `node`.
    pub fn output_range(&self, node: NodeId, index: usize, start: usize, count: usize) -> CompileResult<PortElements> {
        let port = OutputPortRef::new(node, index);
        let desc = self.require_port(port)?;
        Ok(PortRange::new(port, desc, start, count)?.into())
    }

    /// Number of distinct nodes consuming any output of each node.
    pub fn dependent_counts(&self) -> HashMap<NodeId, usize> {
        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        for (_, node) in self.nodes() {
            let mut parents: Vec<NodeId> = Vec::new();
            for input in node.input_ports() {
                for parent in input.parent_nodes() {
                    if !parents.contains(&parent) {
                        parents.push(parent);
                    }
                }
            }
            for parent in parents {
                *counts.entry(parent).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.role() == role)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementKind, TensorShape};
    use crate::nodes::{BinaryOperationNode, InputNode, OutputNode};
    use crate::core::BinaryOperator;

    #[test]
    fn test_add_node_validates_references() {
        let mut model = Model::new();
        let input = model
            .add_node(InputNode::new(ElementKind::Real, TensorShape::vector(3)))
            .unwrap();
        assert_eq!(input, NodeId(0));

        let elements = model.full_output(input, 0).unwrap();
        assert_eq!(elements.size(), 3);
        assert!(model.full_output(input, 1).is_err());
        assert!(model.output_range(input, 0, 2, 2).is_err());

        // A port range that was valid for another model does not fit here.
        let mut other = Model::new();
        let result = other.add_node(OutputNode::new(ElementKind::Real, elements, TensorShape::vector(3)));
        assert!(matches!(result, Err(CompileError::InvalidArgument { .. })));
    }

    #[test]
    fn test_dependent_counts() {
        let mut model = Model::new();
        let input = model
            .add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2)))
            .unwrap();
        let x = model.full_output(input, 0).unwrap();
        let sum = model
            .add_node(BinaryOperationNode::new(BinaryOperator::Add, x.clone(), x.clone()).unwrap())
            .unwrap();
        let product = model
            .add_node(BinaryOperationNode::new(BinaryOperator::Multiply, x.clone(), model.full_output(sum, 0).unwrap()).unwrap())
            .unwrap();

        let counts = model.dependent_counts();
        // `sum` reads the input twice but is one dependent.
        assert_eq!(counts[&input], 2);
        assert_eq!(counts[&sum], 1);
        assert_eq!(counts.get(&product), None);
        assert_eq!(model.nodes_with_role(NodeRole::Input), vec![input]);
    }
}
