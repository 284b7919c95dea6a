// This module defines Variable, the resolved storage binding behind a port of the dataflow
// graph. A variable records where a port's values live in generated code: embedded
// literals, an argument of the predict function (passed by value when scalar, by pointer
// when a vector), or memory the emitter allocates (a local slot for scalars, a module
// global for vectors). It also fixes the arity at creation: a scalar variable holds a
// single element and may never be indexed past zero, a vector variable has a declared
// dimension that bounds every element index. Variables are created by the map compiler's
// port table, which assigns their ids; emitters key their realization caches on that id.

//! Storage variables for port values.

use super::emitter::{Literal, VariableType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Where a variable's storage comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    /// Values embedded in the generated code.
    Literal,
    /// Function-local memory.
    Local,
    /// Module-level memory.
    Global,
    /// Predict function input argument.
    Input,
    /// Predict function output argument.
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub(crate) id: VarId,
    name: String,
    element_type: VariableType,
    scope: VariableScope,
    dimension: usize,
    vector: bool,
    literals: Vec<Literal>,
}

impl Variable {
    fn new(name: impl Into<String>, element_type: VariableType, scope: VariableScope, dimension: usize, vector: bool) -> Self {
        Self {
            id: VarId(u32::MAX),
            name: name.into(),
            element_type,
            scope,
            dimension,
            vector,
            literals: Vec::new(),
        }
    }

    /// Literal values. A single value makes a scalar literal.
    pub fn literal(name: impl Into<String>, element_type: VariableType, values: Vec<Literal>) -> Self {
        let dimension = values.len();
        let mut var = Self::new(name, element_type, VariableScope::Literal, dimension, dimension != 1);
        var.literals = values;
        var
    }

    pub fn local_scalar(name: impl Into<String>, element_type: VariableType) -> Self {
        Self::new(name, element_type, VariableScope::Local, 1, false)
    }

    pub fn global_vector(name: impl Into<String>, element_type: VariableType, dimension: usize) -> Self {
        Self::new(name, element_type, VariableScope::Global, dimension, true)
    }

    pub fn input_scalar(name: impl Into<String>, element_type: VariableType) -> Self {
        Self::new(name, element_type, VariableScope::Input, 1, false)
    }

    pub fn input_vector(name: impl Into<String>, element_type: VariableType, dimension: usize) -> Self {
        Self::new(name, element_type, VariableScope::Input, dimension, true)
    }

    pub fn output_vector(name: impl Into<String>, element_type: VariableType, dimension: usize) -> Self {
        Self::new(name, element_type, VariableScope::Output, dimension, true)
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> VariableType {
        self.element_type
    }

    pub fn scope(&self) -> VariableScope {
        self.scope
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn is_scalar(&self) -> bool {
        !self.vector
    }

    pub fn is_vector(&self) -> bool {
        self.vector
    }

    pub fn is_literal(&self) -> bool {
        self.scope == VariableScope::Literal
    }

    pub fn is_input_argument(&self) -> bool {
        self.scope == VariableScope::Input
    }

    /// Type of the value the emitter produces for this variable.
    ///
    /// Scalar literals and scalar inputs are values; everything else is a pointer.
    pub fn emitted_type(&self) -> Option<VariableType> {
        if self.is_scalar() && (self.is_literal() || self.is_input_argument()) {
            Some(self.element_type)
        } else {
            self.element_type.pointer_to()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_arity() {
        let scalar = Variable::literal("c", VariableType::Double, vec![Literal::Double(2.0)]);
        assert!(scalar.is_scalar());
        assert!(scalar.is_literal());
        assert_eq!(scalar.emitted_type(), Some(VariableType::Double));

        let vector = Variable::literal("v", VariableType::Int32, vec![Literal::Int32(1), Literal::Int32(2)]);
        assert!(vector.is_vector());
        assert_eq!(vector.dimension(), 2);
        assert_eq!(vector.emitted_type(), Some(VariableType::Int32Pointer));
    }

    #[test]
    fn test_argument_kinds() {
        let input = Variable::input_scalar("x", VariableType::Float);
        assert!(input.is_input_argument());
        assert_eq!(input.emitted_type(), Some(VariableType::Float));

        let output = Variable::output_vector("y", VariableType::Float, 4);
        assert!(!output.is_input_argument());
        assert_eq!(output.emitted_type(), Some(VariableType::FloatPointer));

        let local = Variable::local_scalar("t", VariableType::Int64);
        assert_eq!(local.scope(), VariableScope::Local);
        assert_eq!(local.emitted_type(), Some(VariableType::Int64Pointer));
    }
}
