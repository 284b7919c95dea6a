use crate::compiler::NodeCompiler;
use crate::core::CompileResult;
use crate::model::{ElementKind, InputPort, ModelTransformer, Node, NodeId, NodeRole, OutputPort, OutputPortRef, TensorShape};

/// A typed, shaped source of values.
///
/// When the node is a map input its output port is bound to the predict function's
/// input argument before any node is compiled.
#[derive(Debug, Clone)]
pub struct InputNode {
    kind: ElementKind,
    shape: TensorShape,
    outputs: [OutputPort; 1],
}

impl InputNode {
    pub fn new(kind: ElementKind, shape: TensorShape) -> Self {
        Self {
            kind,
            shape,
            outputs: [OutputPort::new("output", kind.port_type(), shape.size())],
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }
}

impl Node for InputNode {
    fn type_name(&self) -> &'static str {
        "InputNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        Vec::new()
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn role(&self) -> NodeRole {
        NodeRole::Input
    }

    fn shape(&self) -> Option<TensorShape> {
        Some(self.shape)
    }

    fn copy_node(&self, _transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        Ok(Box::new(self.clone()))
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        compiler.ensure_output_port_emitted(OutputPortRef::new(id, 0), &self.outputs[0])?;
        Ok(())
    }
}
