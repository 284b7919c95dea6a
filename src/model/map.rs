// This module defines DynamicMap, the unit submitted for compilation: a model plus the
// designation of its logical inputs (input nodes) and logical outputs (arbitrary port
// elements, which may select a sub-range of a port or concatenate several ports). The map
// answers the questions the compiler and the generated accessors need (port counts, element
// counts, element types, the input nodes and the output nodes) and drives refinement:
// repeated transformation passes until no node refines any more, after which the designated
// inputs and outputs are remapped into the refined model.

//! Maps: models with designated inputs and outputs.

use super::graph::Model;
use super::node::{NodeId, NodeRole};
use super::port::{OutputPortRef, PortElements, PortType};
use super::transformer::{ModelTransformer, TransformContext};
use crate::core::{CompileError, CompileResult};

/// Upper bound on refinement passes.
const MAX_REFINEMENT_PASSES: usize = 10;

#[derive(Debug)]
pub struct DynamicMap {
    model: Model,
    inputs: Vec<(String, NodeId)>,
    outputs: Vec<(String, PortElements)>,
}

impl DynamicMap {
    pub fn new(model: Model, inputs: Vec<(String, NodeId)>, outputs: Vec<(String, PortElements)>) -> CompileResult<Self> {
        for (name, id) in &inputs {
            let node = model
                .node(*id)
                .ok_or_else(|| CompileError::invalid_argument(format!("map input '{}' names unknown node {}", name, id)))?;
            if node.role() != NodeRole::Input {
                return Err(CompileError::invalid_argument(format!(
                    "map input '{}' is a {}, not an input node",
                    name,
                    node.type_name()
                )));
            }
        }
        for (name, elements) in &outputs {
            for range in elements.ranges() {
                if model.output_port(range.port()).is_none() {
                    return Err(CompileError::invalid_argument(format!(
                        "map output '{}' references unknown port {}:{}",
                        name,
                        range.port().node,
                        range.port().index
                    )));
                }
            }
        }
        Ok(Self { model, inputs, outputs })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn num_input_ports(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_output_ports(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_name(&self, index: usize) -> Option<&str> {
        self.inputs.get(index).map(|(name, _)| name.as_str())
    }

    pub fn output_name(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).map(|(name, _)| name.as_str())
    }

    /// The input node behind input port `index`.
    pub fn input_node(&self, index: usize) -> CompileResult<NodeId> {
        self.inputs
            .get(index)
            .map(|(_, id)| *id)
            .ok_or_else(|| CompileError::invalid_argument(format!("map has no input {}", index)))
    }

    /// The output port of the input node behind input port `index`.
    pub fn input_port(&self, index: usize) -> CompileResult<OutputPortRef> {
        Ok(OutputPortRef::new(self.input_node(index)?, 0))
    }

    pub fn output(&self, index: usize) -> CompileResult<&PortElements> {
        self.outputs
            .get(index)
            .map(|(_, elements)| elements)
            .ok_or_else(|| CompileError::invalid_argument(format!("map has no output {}", index)))
    }

    pub fn reset_output(&mut self, index: usize, elements: PortElements) -> CompileResult<()> {
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| CompileError::invalid_argument(format!("map has no output {}", index)))?;
        slot.1 = elements;
        Ok(())
    }

    /// Input nodes designated by the map, in port order.
    pub fn input_nodes(&self) -> Vec<NodeId> {
        self.inputs.iter().map(|(_, id)| *id).collect()
    }

    /// All output nodes of the model.
    pub fn output_nodes(&self) -> Vec<NodeId> {
        self.model.nodes_with_role(NodeRole::Output)
    }

    pub fn input_size(&self) -> usize {
        self.inputs
            .first()
            .and_then(|(_, id)| self.model.output_port(OutputPortRef::new(*id, 0)))
            .map(|port| port.size())
            .unwrap_or(0)
    }

    pub fn input_type(&self) -> PortType {
        self.inputs
            .first()
            .and_then(|(_, id)| self.model.output_port(OutputPortRef::new(*id, 0)))
            .map(|port| port.port_type())
            .unwrap_or(PortType::None)
    }

    pub fn output_size(&self) -> usize {
        self.outputs.first().map(|(_, elements)| elements.size()).unwrap_or(0)
    }

    pub fn output_type(&self) -> PortType {
        self.outputs
            .first()
            .map(|(_, elements)| elements.port_type())
            .unwrap_or(PortType::None)
    }

    /// Refine the model until no node refines, then remap inputs and outputs.
    pub fn refine(&mut self, context: &TransformContext<'_>) -> CompileResult<()> {
        for pass in 0..MAX_REFINEMENT_PASSES {
            let transformer = ModelTransformer::refine_pass(&self.model, context)?;

            let mut inputs = Vec::with_capacity(self.inputs.len());
            for (name, id) in &self.inputs {
                let old = self.model.full_output(*id, 0)?;
                let new = transformer.transform_input(&old)?;
                if !new.is_full_port_output() {
                    return Err(CompileError::invalid_argument(format!(
                        "map input '{}' was refined into more than one node",
                        name
                    )));
                }
                inputs.push((name.clone(), new.ranges()[0].port().node));
            }

            let mut outputs = Vec::with_capacity(self.outputs.len());
            for (name, elements) in &self.outputs {
                outputs.push((name.clone(), transformer.transform_input(elements)?));
            }

            let refined = transformer.refined_count();
            self.model = transformer.into_model();
            self.inputs = inputs;
            self.outputs = outputs;

            log::debug!("Refinement pass {}: {} nodes refined, {} nodes total", pass, refined, self.model.size());
            if refined == 0 {
                return Ok(());
            }
        }
        log::warn!("Refinement stopped after {} passes", MAX_REFINEMENT_PASSES);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Literal;
    use crate::model::{ElementKind, TensorShape};
    use crate::nodes::{ConstantNode, DotProductNode, InputNode};

    fn dot_map() -> DynamicMap {
        let mut model = Model::new();
        let input = model
            .add_node(InputNode::new(ElementKind::Real, TensorShape::vector(3)))
            .unwrap();
        let weights = model
            .add_node(
                ConstantNode::new(
                    ElementKind::Real,
                    vec![Literal::Double(1.0), Literal::Double(2.0), Literal::Double(3.0)],
                )
                .unwrap(),
            )
            .unwrap();
        let dot = model
            .add_node(
                DotProductNode::new(model.full_output(input, 0).unwrap(), model.full_output(weights, 0).unwrap())
                    .unwrap(),
            )
            .unwrap();
        let output = model.full_output(dot, 0).unwrap();
        DynamicMap::new(model, vec![("input".into(), input)], vec![("output".into(), output)]).unwrap()
    }

    #[test]
    fn test_map_queries() {
        let map = dot_map();
        assert_eq!(map.num_input_ports(), 1);
        assert_eq!(map.num_output_ports(), 1);
        assert_eq!(map.input_size(), 3);
        assert_eq!(map.input_type(), PortType::Real);
        assert_eq!(map.output_size(), 1);
        assert!(map.output_nodes().is_empty());
        assert!(map.output(1).is_err());
    }

    #[test]
    fn test_input_must_be_input_node() {
        let mut model = Model::new();
        let constant = model
            .add_node(ConstantNode::new(ElementKind::Integer, vec![Literal::Int32(1)]).unwrap())
            .unwrap();
        let result = DynamicMap::new(model, vec![("input".into(), constant)], vec![]);
        assert!(matches!(result, Err(CompileError::InvalidArgument { .. })));
    }

    #[test]
    fn test_refine_remaps_outputs() {
        let mut map = dot_map();
        map.refine(&TransformContext::compilable()).unwrap();

        assert_eq!(map.model().size(), 4);
        assert!(map.model().nodes().all(|(_, node)| node.is_compilable()));
        assert_eq!(map.input_node(0).unwrap(), NodeId(0));

        let output = map.output(0).unwrap();
        assert!(output.is_full_port_output());
        let producer = map.model().node(output.ranges()[0].port().node).unwrap();
        assert_eq!(producer.type_name(), "SumNode");
    }
}
