use super::{check_same_shape, element_kind_of, BinaryOperationNode, SumNode};
use crate::compiler::NodeCompiler;
use crate::core::{BinaryOperator, CompileError, CompileResult};
use crate::model::{ElementKind, InputPort, ModelTransformer, Node, NodeId, OutputPort, PortElements};

/// Dot product of two equally sized vectors.
///
/// Not compilable on its own: refinement replaces it with an element-wise multiply
/// feeding a [`SumNode`].
#[derive(Debug, Clone)]
pub struct DotProductNode {
    input1: InputPort,
    input2: InputPort,
    outputs: [OutputPort; 1],
}

impl DotProductNode {
    pub fn new(input1: PortElements, input2: PortElements) -> CompileResult<Self> {
        let kind = element_kind_of(&input1, "DotProductNode")?;
        if kind == ElementKind::Boolean {
            return Err(CompileError::type_mismatch("cannot take the dot product of boolean elements"));
        }
        let node = Self {
            input1: InputPort::new("input1", input1),
            input2: InputPort::new("input2", input2),
            outputs: [OutputPort::new("output", kind.port_type(), 1)],
        };
        check_same_shape(&node.input1, &node.input2, "DotProductNode")?;
        Ok(node)
    }
}

impl Node for DotProductNode {
    fn type_name(&self) -> &'static str {
        "DotProductNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        vec![&self.input1, &self.input2]
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn is_compilable(&self) -> bool {
        false
    }

    fn copy_node(&self, transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        let input1 = transformer.transform_input(self.input1.elements())?;
        let input2 = transformer.transform_input(self.input2.elements())?;
        Ok(Box::new(DotProductNode::new(input1, input2)?))
    }

    fn refine(&self, transformer: &mut ModelTransformer) -> CompileResult<Option<Vec<PortElements>>> {
        let input1 = transformer.transform_input(self.input1.elements())?;
        let input2 = transformer.transform_input(self.input2.elements())?;
        let product = transformer.add_node(BinaryOperationNode::new(BinaryOperator::Multiply, input1, input2)?)?;
        let sum = transformer.add_node(SumNode::new(transformer.full_output(product, 0)?)?)?;
        Ok(Some(vec![transformer.full_output(sum, 0)?]))
    }

    fn compile(&self, id: NodeId, _compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        Err(CompileError::not_supported(format!(
            "DotProductNode {} must be refined before compilation",
            id
        )))
    }
}
