// This module defines the Node trait, the unit of computation in the dataflow graph. To the
// compiler every node is opaque: it exposes ordered input and output ports, says whether it
// can be compiled directly or must first be refined into simpler nodes, knows how to copy
// itself into a new model while a ModelTransformer remaps its inputs, and provides a compile
// hook that drives the NodeCompiler. Input and output nodes additionally report a role and
// a tensor shape, which is what the public shape accessors are generated from. NodeId is a
// dense index into the owning model; because nodes can only reference nodes that already
// exist, index order is a valid dependency order.

//! Graph nodes.

use super::port::{InputPort, OutputPort, PortElements};
use super::shape::TensorShape;
use super::transformer::ModelTransformer;
use crate::compiler::NodeCompiler;
use crate::core::CompileResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Input,
    Output,
    Compute,
}

/// What the refinement driver should do with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Compile,
    Refine,
}

pub trait Node: fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn input_ports(&self) -> Vec<&InputPort>;

    fn output_ports(&self) -> &[OutputPort];

    fn role(&self) -> NodeRole {
        NodeRole::Compute
    }

    /// Shape of an input or output node.
    fn shape(&self) -> Option<TensorShape> {
        None
    }

    /// Whether the compile hook can handle this node directly.
    fn is_compilable(&self) -> bool {
        true
    }

    /// A copy of this node whose inputs reference the transformer's new model.
    fn copy_node(&self, transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>>;

    /// Add simpler nodes equivalent to this one.
    ///
    /// Returns the new elements standing in for each output port, or `None` when the
    /// node has no refinement and should be copied instead.
    fn refine(&self, _transformer: &mut ModelTransformer) -> CompileResult<Option<Vec<PortElements>>> {
        Ok(None)
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()>;
}

/// Short identity used for block labels, e.g. `BinaryOperationNode_3`.
pub fn id_string(id: NodeId, node: &dyn Node) -> String {
    format!("{}_{}", node.type_name(), id)
}

/// Longer description printed when diagnostic info is enabled.
pub fn diagnostic_string(id: NodeId, node: &dyn Node) -> String {
    let inputs: Vec<String> = node
        .input_ports()
        .iter()
        .map(|port| format!("{}[{}]", port.name(), port.size()))
        .collect();
    let outputs: Vec<String> = node
        .output_ports()
        .iter()
        .map(|port| format!("{}:{}[{}]", port.name(), port.port_type(), port.size()))
        .collect();
    format!(
        "node {} ({}) in: {} out: {}",
        id,
        node.type_name(),
        inputs.join(", "),
        outputs.join(", ")
    )
}
