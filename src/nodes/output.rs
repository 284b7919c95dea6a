use crate::compiler::NodeCompiler;
use crate::core::{CompileError, CompileResult};
use crate::model::{
    ElementKind,
    InputPort,
    ModelTransformer,
    Node,
    NodeId,
    NodeRole,
    OutputPort,
    OutputPortRef,
    PortElements,
    TensorShape,
};

/// Copies its input into a contiguous, shaped output port.
#[derive(Debug, Clone)]
pub struct OutputNode {
    kind: ElementKind,
    shape: TensorShape,
    input: InputPort,
    outputs: [OutputPort; 1],
}

impl OutputNode {
    pub fn new(kind: ElementKind, input: PortElements, shape: TensorShape) -> Self {
        let size = input.size();
        Self {
            kind,
            shape,
            input: InputPort::new("input", input),
            outputs: [OutputPort::new("output", kind.port_type(), size)],
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn input(&self) -> &InputPort {
        &self.input
    }
}

impl Node for OutputNode {
    fn type_name(&self) -> &'static str {
        "OutputNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn role(&self) -> NodeRole {
        NodeRole::Output
    }

    fn shape(&self) -> Option<TensorShape> {
        Some(self.shape)
    }

    fn copy_node(&self, transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        let input = transformer.transform_input(self.input.elements())?;
        Ok(Box::new(OutputNode::new(self.kind, input, self.shape)))
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        if self.input.port_type() != self.kind.port_type() {
            return Err(CompileError::type_mismatch(format!(
                "{} output node reads {} elements",
                self.kind.name(),
                self.input.port_type()
            )));
        }
        let output = OutputPortRef::new(id, 0);
        for index in 0..self.input.size() {
            let value = compiler.load_port_element_variable(self.input.input_element(index)?)?;
            compiler.store_output_element(output, &self.outputs[0], index, value)?;
        }
        Ok(())
    }
}
