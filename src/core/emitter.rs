// This module defines the Emitter trait, the capability interface the map compiler drives to
// produce low-level code, plus the small value types that cross it. The compiler never
// builds instructions itself: it asks an Emitter to declare struct types and globals, open
// and close functions with typed parameters, realize storage variables, produce literals,
// load and store through pointers, compare values, create and link blocks, and group
// blocks into regions that can later be concatenated. Handles (ValueRef, BlockRef,
// RegionRef, StructRef, FunctionRef) are plain indices owned by the emitter, which keeps the
// trait object safe so node compile hooks can receive `&mut dyn Emitter`. ModuleBuilder
// extends Emitter with the one-shot `finish` that consumes the builder and hands back the
// finished module, enforcing the single transfer of module ownership at the type level.
// The built-in block IR (`crate::ir`) and the optional LLVM backend both implement it.

//! Low-level emitter capability.
//!
//! The emitter keeps an implicit "current function" and "current block", the way an
//! instruction builder keeps an insertion point. Every instruction-level call appends
//! to the current block of the current function and fails with
//! [`CompileError::Emitter`](super::CompileError::Emitter) when there is none.

use super::error::CompileResult;
use super::parameters::TargetDevice;
use super::variable::Variable;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(pub u32);

/// Index of a code region in the emitter's region arena.
///
/// Region handles stay valid after a merge; the absorbed region is simply never
/// used as a destination again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub u32);

/// Types understood by the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    Void,
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Struct(StructRef),
    BooleanPointer,
    Int32Pointer,
    Int64Pointer,
    FloatPointer,
    DoublePointer,
    StructPointer(StructRef),
}

impl VariableType {
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            VariableType::BooleanPointer
                | VariableType::Int32Pointer
                | VariableType::Int64Pointer
                | VariableType::FloatPointer
                | VariableType::DoublePointer
                | VariableType::StructPointer(_)
        )
    }

    pub fn pointer_to(self) -> Option<VariableType> {
        match self {
            VariableType::Boolean => Some(VariableType::BooleanPointer),
            VariableType::Int32 => Some(VariableType::Int32Pointer),
            VariableType::Int64 => Some(VariableType::Int64Pointer),
            VariableType::Float => Some(VariableType::FloatPointer),
            VariableType::Double => Some(VariableType::DoublePointer),
            VariableType::Struct(s) => Some(VariableType::StructPointer(s)),
            _ => None,
        }
    }

    pub fn pointee(self) -> Option<VariableType> {
        match self {
            VariableType::BooleanPointer => Some(VariableType::Boolean),
            VariableType::Int32Pointer => Some(VariableType::Int32),
            VariableType::Int64Pointer => Some(VariableType::Int64),
            VariableType::FloatPointer => Some(VariableType::Float),
            VariableType::DoublePointer => Some(VariableType::Double),
            VariableType::StructPointer(s) => Some(VariableType::Struct(s)),
            _ => None,
        }
    }

    /// Name of the type in generated C declarations.
    pub fn c_name(self) -> &'static str {
        match self {
            VariableType::Void => "void",
            VariableType::Boolean => "bool",
            VariableType::Int32 => "int32_t",
            VariableType::Int64 => "int64_t",
            VariableType::Float => "float",
            VariableType::Double => "double",
            VariableType::Struct(_) => "struct",
            VariableType::BooleanPointer => "bool*",
            VariableType::Int32Pointer => "int32_t*",
            VariableType::Int64Pointer => "int64_t*",
            VariableType::FloatPointer => "float*",
            VariableType::DoublePointer => "double*",
            VariableType::StructPointer(_) => "struct*",
        }
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
}

impl Literal {
    pub fn value_type(self) -> VariableType {
        match self {
            Literal::Boolean(_) => VariableType::Boolean,
            Literal::Int32(_) => VariableType::Int32,
            Literal::Int64(_) => VariableType::Int64,
            Literal::Float(_) => VariableType::Float,
            Literal::Double(_) => VariableType::Double,
        }
    }

    /// Zero value of a scalar type.
    pub fn zero(ty: VariableType) -> Option<Literal> {
        match ty {
            VariableType::Boolean => Some(Literal::Boolean(false)),
            VariableType::Int32 => Some(Literal::Int32(0)),
            VariableType::Int64 => Some(Literal::Int64(0)),
            VariableType::Float => Some(Literal::Float(0.0)),
            VariableType::Double => Some(Literal::Double(0.0)),
            _ => None,
        }
    }

    /// Convert a number into a literal of the given scalar type.
    pub fn from_f64(ty: VariableType, value: f64) -> Option<Literal> {
        match ty {
            VariableType::Boolean => Some(Literal::Boolean(value != 0.0)),
            VariableType::Int32 => Some(Literal::Int32(value as i32)),
            VariableType::Int64 => Some(Literal::Int64(value as i64)),
            VariableType::Float => Some(Literal::Float(value as f32)),
            VariableType::Double => Some(Literal::Double(value)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Literal::Boolean(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Literal::Int32(v) => v as f64,
            Literal::Int64(v) => v as f64,
            Literal::Float(v) => v as f64,
            Literal::Double(v) => v,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(v) => write!(f, "{}", v),
            Literal::Int32(v) => write!(f, "{}", v),
            Literal::Int64(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::Double(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
}

impl BinaryOperator {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Subtract => "sub",
            BinaryOperator::Multiply => "mul",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonPredicate {
    Equal,
    NotEqual,
    Less,
    Greater,
}

impl ComparisonPredicate {
    pub fn name(self) -> &'static str {
        match self {
            ComparisonPredicate::Equal => "eq",
            ComparisonPredicate::NotEqual => "ne",
            ComparisonPredicate::Less => "lt",
            ComparisonPredicate::Greater => "gt",
        }
    }
}

/// Low-level code construction capability driven by the map compiler.
pub trait Emitter {
    /// Name of the module being built.
    fn module_name(&self) -> &str;

    // ----- module level -----

    fn declare_struct(&mut self, name: &str, fields: &[(&str, VariableType)]) -> CompileResult<StructRef>;

    fn get_struct(&self, name: &str) -> Option<StructRef>;

    /// Tag a struct type for the generated public header.
    fn include_type_in_header(&mut self, ty: StructRef) -> CompileResult<()>;

    fn add_preprocessor_definition(&mut self, name: &str, value: &str);

    /// Declare a module global holding `initial.len()` elements of `ty`.
    ///
    /// Returns a pointer usable from any function of the module.
    fn global(&mut self, name: &str, ty: VariableType, initial: &[Literal]) -> CompileResult<ValueRef>;

    // ----- functions -----

    fn begin_function(
        &mut self,
        name: &str,
        return_type: VariableType,
        params: &[(&str, VariableType)],
    ) -> CompileResult<FunctionRef>;

    fn end_function(&mut self) -> CompileResult<()>;

    /// Tag the current function for the generated public header.
    fn include_in_header(&mut self) -> CompileResult<()>;

    /// Tag the current function as the predict entry point.
    fn include_in_predict_interface(&mut self) -> CompileResult<()>;

    fn argument(&self, index: usize) -> CompileResult<ValueRef>;

    // ----- variables and values -----

    /// Realize a storage variable, reusing the value produced by earlier calls.
    fn ensure_emitted(&mut self, variable: &Variable) -> CompileResult<ValueRef>;

    /// Bind a variable to an existing value (a function argument).
    fn bind_variable(&mut self, variable: &Variable, value: ValueRef) -> CompileResult<()>;

    fn is_pointer(&self, value: ValueRef) -> bool;

    fn literal(&mut self, value: Literal) -> CompileResult<ValueRef>;

    fn load(&mut self, pointer: ValueRef) -> CompileResult<ValueRef>;

    fn store(&mut self, pointer: ValueRef, value: ValueRef) -> CompileResult<()>;

    /// Load `pointer[offset]`.
    fn value_at(&mut self, pointer: ValueRef, offset: ValueRef) -> CompileResult<ValueRef>;

    /// Store `value` into `pointer[offset]`.
    fn set_value_at(&mut self, pointer: ValueRef, offset: ValueRef, value: ValueRef) -> CompileResult<()>;

    /// Pointer to field `field` of the struct `pointer` points to.
    fn field_pointer(&mut self, pointer: ValueRef, field: usize) -> CompileResult<ValueRef>;

    fn operator(&mut self, op: BinaryOperator, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef>;

    fn compare(&mut self, predicate: ComparisonPredicate, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef>;

    /// A monotonically increasing 64-bit tick count.
    fn timestamp(&mut self) -> CompileResult<ValueRef>;

    /// Diagnostic output, no effect on semantics.
    fn print(&mut self, message: &str) -> CompileResult<()>;

    // ----- blocks -----

    /// Create a block without moving the insertion point.
    fn block(&mut self, label: &str) -> CompileResult<BlockRef>;

    /// Create a block and make it current.
    fn begin_block(&mut self, label: &str) -> CompileResult<BlockRef>;

    fn current_block(&self) -> Option<BlockRef>;

    fn set_current_block(&mut self, block: BlockRef) -> CompileResult<()>;

    fn branch(&mut self, target: BlockRef) -> CompileResult<()>;

    fn branch_if(&mut self, condition: ValueRef, then_block: BlockRef, else_block: BlockRef) -> CompileResult<()>;

    fn ret(&mut self, value: Option<ValueRef>) -> CompileResult<()>;

    /// Chain blocks in order: each unterminated block branches to the next one.
    fn concatenate_blocks(&mut self, blocks: &[BlockRef]) -> CompileResult<()>;

    // ----- regions -----

    /// Open a region anchored at `start` and make it the current region.
    fn add_region(&mut self, start: BlockRef) -> CompileResult<RegionRef>;

    fn current_region(&self) -> Option<RegionRef>;

    fn set_current_region(&mut self, region: RegionRef) -> CompileResult<()>;

    fn region_end(&self, region: RegionRef) -> CompileResult<BlockRef>;

    fn set_region_end(&mut self, region: RegionRef, block: BlockRef) -> CompileResult<()>;

    /// Append the blocks of `src` to the end of `dest`.
    fn concat_regions(&mut self, dest: RegionRef, src: RegionRef) -> CompileResult<()>;
}

/// An emitter that produces a module exactly once.
pub trait ModuleBuilder: Emitter {
    type Module;

    /// Consume the builder, stamp the target descriptors and return the module.
    fn finish(self, device: &TargetDevice) -> CompileResult<Self::Module>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_round_trip() {
        for ty in [
            VariableType::Boolean,
            VariableType::Int32,
            VariableType::Int64,
            VariableType::Float,
            VariableType::Double,
            VariableType::Struct(StructRef(2)),
        ] {
            let ptr = ty.pointer_to().unwrap();
            assert!(ptr.is_pointer());
            assert_eq!(ptr.pointee(), Some(ty));
        }
        assert_eq!(VariableType::Void.pointer_to(), None);
        assert_eq!(VariableType::Int32.pointee(), None);
    }

    #[test]
    fn test_literal_conversion() {
        assert_eq!(Literal::from_f64(VariableType::Int32, 3.7), Some(Literal::Int32(3)));
        assert_eq!(Literal::from_f64(VariableType::Boolean, 0.0), Some(Literal::Boolean(false)));
        assert_eq!(Literal::zero(VariableType::Double), Some(Literal::Double(0.0)));
        assert_eq!(Literal::zero(VariableType::Void), None);
        assert_eq!(Literal::Int64(-4).as_f64(), -4.0);
        assert_eq!(Literal::Float(1.5).to_string(), "1.5");
    }
}
