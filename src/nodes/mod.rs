//! Built-in node kinds.
//!
//! [`InputNode`] and [`OutputNode`] carry tensor shapes and map onto the predict
//! function's arguments. [`ConstantNode`] contributes literal storage and emits no
//! code. [`BinaryOperationNode`] and [`SumNode`] are compiled element by element.
//! [`DotProductNode`] cannot be compiled directly and refines into a multiply
//! followed by a sum.

mod input;
mod output;
mod constant;
mod binary;
mod sum;
mod dot;

pub use input::InputNode;
pub use output::OutputNode;
pub use constant::ConstantNode;
pub use binary::BinaryOperationNode;
pub use sum::SumNode;
pub use dot::DotProductNode;

use crate::core::{CompileError, CompileResult};
use crate::model::{ElementKind, InputPort, PortElements};

/// Element kind of a non-empty input, rejecting categorical and untyped ports.
pub(crate) fn element_kind_of(elements: &PortElements, node: &str) -> CompileResult<ElementKind> {
    if elements.is_empty() {
        return Err(CompileError::invalid_argument(format!("{} input is empty", node)));
    }
    for range in elements.ranges() {
        if range.port_type() != elements.port_type() {
            return Err(CompileError::type_mismatch(format!(
                "{} input mixes {} and {} elements",
                node,
                elements.port_type(),
                range.port_type()
            )));
        }
    }
    ElementKind::try_from(elements.port_type())
}

/// Check that two inputs agree in size and element type.
pub(crate) fn check_same_shape(lhs: &InputPort, rhs: &InputPort, node: &str) -> CompileResult<()> {
    if lhs.size() != rhs.size() {
        return Err(CompileError::invalid_argument(format!(
            "{} inputs differ in size ({} vs {})",
            node,
            lhs.size(),
            rhs.size()
        )));
    }
    if lhs.port_type() != rhs.port_type() {
        return Err(CompileError::type_mismatch(format!(
            "{} inputs differ in type ({} vs {})",
            node,
            lhs.port_type(),
            rhs.port_type()
        )));
    }
    Ok(())
}
