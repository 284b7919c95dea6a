// This module implements the scoped port/variable table. Every output port whose values
// are consumed by generated code resolves to exactly one Variable; the table maps ports
// to variables, one layer per active scope, and assigns each registered variable a fresh
// id that emitters use to cache the realized storage. Lookups search from the innermost
// scope outwards, so a nested compilation can shadow a port without disturbing the outer
// binding, and popping the scope restores it. The element accessor enforces the arity
// fixed at registration: element indices past zero are rejected on scalar variables and
// indices past the declared dimension are rejected on vector variables.

//! Scoped port to variable bindings.

use crate::core::{CompileError, CompileResult, VarId, Variable};
use crate::model::{OutputPortRef, PortElement};
use hashbrown::HashMap;

#[derive(Debug, Default)]
pub struct PortVariables {
    scopes: Vec<HashMap<OutputPortRef, Variable>>,
    next_id: u32,
}

impl PortVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) -> CompileResult<()> {
        self.scopes
            .pop()
            .map(|_| ())
            .ok_or_else(|| CompileError::invalid_argument("variable scope stack is empty"))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Register `variable` for `port` in the innermost scope and return the stored copy.
    pub fn set(&mut self, port: OutputPortRef, mut variable: Variable) -> CompileResult<Variable> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::invalid_argument("no active variable scope"))?;
        variable.id = VarId(self.next_id);
        self.next_id += 1;
        log::trace!("Port {}:{} -> variable {} ({:?})", port.node, port.index, variable.name(), variable.scope());
        scope.insert(port, variable.clone());
        Ok(variable)
    }

    /// Innermost binding of `port`.
    pub fn get(&self, port: OutputPortRef) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&port))
    }

    /// The variable holding `element`, checked against the variable's arity.
    pub fn element_variable(&self, element: PortElement) -> CompileResult<&Variable> {
        let variable = self.get(element.port).ok_or_else(|| {
            CompileError::not_supported(format!(
                "no variable registered for port {}:{}",
                element.port.node, element.port.index
            ))
        })?;
        if variable.is_scalar() && element.index > 0 {
            return Err(CompileError::VectorVariableExpected { index: element.index });
        }
        if element.index >= variable.dimension() {
            return Err(CompileError::IndexOutOfRange {
                index: element.index,
                dimension: variable.dimension(),
            });
        }
        Ok(variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Literal, VariableType};
    use crate::model::NodeId;

    fn element(node: usize, index: usize) -> PortElement {
        PortElement {
            port: OutputPortRef::new(NodeId(node), 0),
            index,
        }
    }

    #[test]
    fn test_resolution_errors() {
        let mut table = PortVariables::new();
        table.push_scope();

        assert!(matches!(
            table.element_variable(element(0, 0)),
            Err(CompileError::NotSupported { .. })
        ));

        table
            .set(OutputPortRef::new(NodeId(0), 0), Variable::local_scalar("s", VariableType::Double))
            .unwrap();
        table
            .set(OutputPortRef::new(NodeId(1), 0), Variable::global_vector("v", VariableType::Double, 4))
            .unwrap();

        assert!(table.element_variable(element(0, 0)).is_ok());
        assert_eq!(
            table.element_variable(element(0, 1)),
            Err(CompileError::VectorVariableExpected { index: 1 })
        );
        assert!(table.element_variable(element(1, 3)).is_ok());
        assert_eq!(
            table.element_variable(element(1, 4)),
            Err(CompileError::IndexOutOfRange { index: 4, dimension: 4 })
        );
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut table = PortVariables::new();
        table.push_scope();
        let port = OutputPortRef::new(NodeId(2), 0);
        let outer = table
            .set(port, Variable::literal("outer", VariableType::Int32, vec![Literal::Int32(1)]))
            .unwrap();

        table.push_scope();
        let inner = table
            .set(port, Variable::literal("inner", VariableType::Int32, vec![Literal::Int32(2)]))
            .unwrap();
        assert_ne!(outer.id(), inner.id());
        assert_eq!(table.get(port).unwrap().name(), "inner");

        table.pop_scope().unwrap();
        assert_eq!(table.get(port).unwrap().name(), "outer");
        table.pop_scope().unwrap();
        assert!(table.pop_scope().is_err());
        assert!(table.set(port, outer).is_err());
    }
}
