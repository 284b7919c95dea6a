use super::{check_same_shape, element_kind_of};
use crate::compiler::NodeCompiler;
use crate::core::{BinaryOperator, CompileError, CompileResult};
use crate::model::{ElementKind, InputPort, ModelTransformer, Node, NodeId, OutputPort, OutputPortRef, PortElements};

/// Element-wise arithmetic on two equally sized inputs.
#[derive(Debug, Clone)]
pub struct BinaryOperationNode {
    operation: BinaryOperator,
    input1: InputPort,
    input2: InputPort,
    outputs: [OutputPort; 1],
}

impl BinaryOperationNode {
    pub fn new(operation: BinaryOperator, input1: PortElements, input2: PortElements) -> CompileResult<Self> {
        let kind = element_kind_of(&input1, "BinaryOperationNode")?;
        if kind == ElementKind::Boolean {
            return Err(CompileError::type_mismatch(format!(
                "cannot {} boolean elements",
                operation.name()
            )));
        }
        let size = input1.size();
        let node = Self {
            operation,
            input1: InputPort::new("input1", input1),
            input2: InputPort::new("input2", input2),
            outputs: [OutputPort::new("output", kind.port_type(), size)],
        };
        check_same_shape(&node.input1, &node.input2, "BinaryOperationNode")?;
        Ok(node)
    }

    pub fn operation(&self) -> BinaryOperator {
        self.operation
    }
}

impl Node for BinaryOperationNode {
    fn type_name(&self) -> &'static str {
        "BinaryOperationNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        vec![&self.input1, &self.input2]
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn copy_node(&self, transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        let input1 = transformer.transform_input(self.input1.elements())?;
        let input2 = transformer.transform_input(self.input2.elements())?;
        Ok(Box::new(BinaryOperationNode::new(self.operation, input1, input2)?))
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        let output = OutputPortRef::new(id, 0);
        for index in 0..self.input1.size() {
            let lhs = compiler.load_port_element_variable(self.input1.input_element(index)?)?;
            let rhs = compiler.load_port_element_variable(self.input2.input_element(index)?)?;
            let result = compiler.emitter().operator(self.operation, lhs, rhs)?;
            compiler.store_output_element(output, &self.outputs[0], index, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, TensorShape};
    use crate::nodes::InputNode;

    #[test]
    fn test_operands_must_agree() {
        let mut model = Model::new();
        let a = model.add_node(InputNode::new(ElementKind::Real, TensorShape::vector(3))).unwrap();
        let b = model.add_node(InputNode::new(ElementKind::Integer, TensorShape::vector(3))).unwrap();
        let flag = model.add_node(InputNode::new(ElementKind::Boolean, TensorShape::vector(3))).unwrap();

        let a_out = model.full_output(a, 0).unwrap();
        let b_out = model.full_output(b, 0).unwrap();
        assert!(matches!(
            BinaryOperationNode::new(BinaryOperator::Add, a_out.clone(), b_out),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            BinaryOperationNode::new(BinaryOperator::Add, a_out.clone(), model.output_range(a, 0, 0, 2).unwrap()),
            Err(CompileError::InvalidArgument { .. })
        ));
        let flags = model.full_output(flag, 0).unwrap();
        assert!(BinaryOperationNode::new(BinaryOperator::Multiply, flags.clone(), flags).is_err());

        let node = BinaryOperationNode::new(BinaryOperator::Subtract, a_out.clone(), a_out).unwrap();
        assert_eq!(node.output_ports()[0].size(), 3);
        assert_eq!(node.input_ports().len(), 2);
    }
}
