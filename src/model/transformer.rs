// This module implements the refinement driver. A refinement pass walks a model in
// dependency order and builds a brand new model: for each node the TransformContext's
// policy callback decides whether the node is copied as-is or asked to refine itself into
// simpler nodes. Either way the transformer records, for every output port of the old node,
// which elements of the new model now stand in for it, so later nodes (and the map's
// designated inputs and outputs) can have their port references remapped. Passes repeat
// until nothing refines, which is how a node can refine into nodes that refine again.

//! Model refinement.

use super::graph::Model;
use super::node::{Node, NodeAction, NodeId};
use super::port::{OutputPortRef, PortElements};
use crate::core::{CompileError, CompileResult};
use hashbrown::HashMap;

/// Policy deciding, per node, between direct compilation and refinement.
pub struct TransformContext<'a> {
    action: Box<dyn Fn(&dyn Node) -> NodeAction + 'a>,
}

impl<'a> TransformContext<'a> {
    pub fn new(action: impl Fn(&dyn Node) -> NodeAction + 'a) -> Self {
        Self { action: Box::new(action) }
    }

    /// Refine every node that cannot be compiled directly.
    pub fn compilable() -> Self {
        Self::new(|node| {
            if node.is_compilable() {
                NodeAction::Compile
            } else {
                NodeAction::Refine
            }
        })
    }

    pub fn action(&self, node: &dyn Node) -> NodeAction {
        (self.action)(node)
    }
}

/// Builds a new model from an old one, remapping port references.
#[derive(Debug, Default)]
pub struct ModelTransformer {
    model: Model,
    port_map: HashMap<OutputPortRef, PortElements>,
    refined: usize,
}

impl ModelTransformer {
    /// Run one refinement pass over `model`.
    pub fn refine_pass(model: &Model, context: &TransformContext<'_>) -> CompileResult<Self> {
        let mut transformer = Self::default();
        for (id, node) in model.nodes() {
            let outputs = match context.action(node) {
                NodeAction::Refine => match node.refine(&mut transformer)? {
                    Some(outputs) => {
                        log::trace!("Refined node {} ({})", id, node.type_name());
                        transformer.refined += 1;
                        outputs
                    }
                    None => transformer.copy(node)?,
                },
                NodeAction::Compile => transformer.copy(node)?,
            };
            transformer.map_outputs(id, node, outputs)?;
        }
        Ok(transformer)
    }

    fn copy(&mut self, node: &dyn Node) -> CompileResult<Vec<PortElements>> {
        let copy = node.copy_node(self)?;
        let output_count = copy.output_ports().len();
        let id = self.model.add_boxed(copy)?;
        (0..output_count).map(|index| self.model.full_output(id, index)).collect()
    }

    fn map_outputs(&mut self, id: NodeId, node: &dyn Node, outputs: Vec<PortElements>) -> CompileResult<()> {
        if outputs.len() != node.output_ports().len() {
            return Err(CompileError::invalid_argument(format!(
                "{} produced {} outputs for {} ports",
                node.type_name(),
                outputs.len(),
                node.output_ports().len()
            )));
        }
        for (index, (elements, port)) in outputs.into_iter().zip(node.output_ports()).enumerate() {
            if elements.size() != port.size() {
                return Err(CompileError::invalid_argument(format!(
                    "{} output '{}' maps to {} elements, expected {}",
                    node.type_name(),
                    port.name(),
                    elements.size(),
                    port.size()
                )));
            }
            self.port_map.insert(OutputPortRef::new(id, index), elements);
        }
        Ok(())
    }

    /// Translate elements of the old model into elements of the new one.
    pub fn transform_input(&self, elements: &PortElements) -> CompileResult<PortElements> {
        let mut result = PortElements::new();
        for range in elements.ranges() {
            let mapped = self.port_map.get(&range.port()).ok_or_else(|| {
                CompileError::not_supported(format!(
                    "port {}:{} has not been transformed yet",
                    range.port().node,
                    range.port().index
                ))
            })?;
            result.append(&mapped.slice(range.start(), range.count())?);
        }
        Ok(result)
    }

    /// Add a node to the new model.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> CompileResult<NodeId> {
        self.model.add_node(node)
    }

    /// All elements of output `index` of a node in the new model.
    pub fn full_output(&self, node: NodeId, index: usize) -> CompileResult<PortElements> {
        self.model.full_output(node, index)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Number of nodes refined in this pass.
    pub fn refined_count(&self) -> usize {
        self.refined
    }

    pub fn into_model(self) -> Model {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementKind, TensorShape};
    use crate::nodes::{ConstantNode, DotProductNode, InputNode};
    use crate::core::Literal;

    #[test]
    fn test_copy_pass_preserves_structure() {
        let mut model = Model::new();
        let input = model
            .add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2)))
            .unwrap();
        let constant = model
            .add_node(ConstantNode::new(ElementKind::Real, vec![Literal::Double(1.0), Literal::Double(2.0)]).unwrap())
            .unwrap();
        let dot = model
            .add_node(
                DotProductNode::new(model.full_output(input, 0).unwrap(), model.full_output(constant, 0).unwrap())
                    .unwrap(),
            )
            .unwrap();

        let copy_all = TransformContext::new(|_| NodeAction::Compile);
        let transformer = ModelTransformer::refine_pass(&model, &copy_all).unwrap();
        assert_eq!(transformer.refined_count(), 0);
        assert_eq!(transformer.model().size(), 3);

        let refined = ModelTransformer::refine_pass(&model, &TransformContext::compilable()).unwrap();
        assert_eq!(refined.refined_count(), 1);
        // Dot product becomes a multiply followed by a sum.
        assert_eq!(refined.model().size(), 4);

        let old_output = model.full_output(dot, 0).unwrap();
        let new_output = refined.transform_input(&old_output).unwrap();
        assert_eq!(new_output.size(), 1);
        let producer = refined.model().node(new_output.ranges()[0].port().node).unwrap();
        assert_eq!(producer.type_name(), "SumNode");
    }
}
