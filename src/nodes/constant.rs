use crate::compiler::NodeCompiler;
use crate::core::{CompileError, CompileResult, Literal, Variable};
use crate::model::{id_string, ElementKind, InputPort, ModelTransformer, Node, NodeId, OutputPort, OutputPortRef};

/// A fixed vector of values.
///
/// Compiling a constant registers literal storage for its output port; consumers read
/// the values directly and no code is emitted for the node itself.
#[derive(Debug, Clone)]
pub struct ConstantNode {
    kind: ElementKind,
    values: Vec<Literal>,
    outputs: [OutputPort; 1],
}

impl ConstantNode {
    pub fn new(kind: ElementKind, values: Vec<Literal>) -> CompileResult<Self> {
        if values.is_empty() {
            return Err(CompileError::invalid_argument("constant node needs at least one value"));
        }
        if let Some(bad) = values.iter().find(|value| value.value_type() != kind.variable_type()) {
            return Err(CompileError::type_mismatch(format!(
                "literal {} does not have type {}",
                bad,
                kind.name()
            )));
        }
        let size = values.len();
        Ok(Self {
            kind,
            values,
            outputs: [OutputPort::new("output", kind.port_type(), size)],
        })
    }

    /// Build a constant from plain numbers, converting each to `kind`.
    pub fn from_f64(kind: ElementKind, values: &[f64]) -> CompileResult<Self> {
        let literals = values
            .iter()
            .map(|value| {
                Literal::from_f64(kind.variable_type(), *value)
                    .ok_or_else(|| CompileError::type_mismatch(format!("no literal of type {}", kind.name())))
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Self::new(kind, literals)
    }

    pub fn values(&self) -> &[Literal] {
        &self.values
    }
}

impl Node for ConstantNode {
    fn type_name(&self) -> &'static str {
        "ConstantNode"
    }

    fn input_ports(&self) -> Vec<&InputPort> {
        Vec::new()
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    fn copy_node(&self, _transformer: &ModelTransformer) -> CompileResult<Box<dyn Node>> {
        Ok(Box::new(self.clone()))
    }

    fn compile(&self, id: NodeId, compiler: &mut dyn NodeCompiler) -> CompileResult<()> {
        let variable = Variable::literal(id_string(id, self), self.kind.variable_type(), self.values.clone());
        compiler.set_port_variable(OutputPortRef::new(id, 0), variable)
    }
}
