use super::element_kind_of;
use crate::compiler::NodeCompiler;
use crate::core::{BinaryOperator, CompileError, CompileResult};
use crate::model::{ElementKind, InputPort, ModelTransformer, Node, NodeId, OutputPort, OutputPortRef, PortElements};

/// Sum of all input elements.
#[derive(Debug, Clone)]
pub struct SumNode {
    input: InputPort,
    outputs: [OutputPort; 1],
}

impl SumNode {
    pub fn new(input: PortElements) -> CompileResult<Self> {
        let kind = element_kind_of(&input, "SumNode")?;
        if kind == ElementKind::Boolean {
            return Err(CompileError::type_mismatch("cannot sum boolean elements"));
        }
        Ok(Self {
            input: InputPort::new("input", input),
            outputs: [OutputPort::new("output", kind.port_type(), 1)],
        })
    }
}

impl Node for SumNode {
    fn type_name(&self) -> &'static str {
        "SumNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn copy_node(&self, transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        Ok(Box::new(SumNode::new(transformer.transform_input(self.input.elements())?)?))
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        let mut total = compiler.load_port_variable(&self.input)?;
        for index in 1..self.input.size() {
            let value = compiler.load_port_element_variable(self.input.input_element(index)?)?;
            total = compiler.emitter().operator(BinaryOperator::Add, total, value)?;
        }
        compiler.store_output_element(OutputPortRef::new(id, 0), &self.outputs[0], 0, total)
    }
}
