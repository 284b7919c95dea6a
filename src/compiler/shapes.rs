// This module generates the shape table accessors. A shape accessor takes an index and a
// pointer to a TensorShape record and fills the record with the shape at that index, or
// with zeros when the index matches nothing. Lookup is a chain of equality tests: the
// entry block jumps to the first test, each test either stores its shape and returns or
// falls through to the next test, and the last test falls through to the zero-filling
// default block. The fall-through edges are not written explicitly: the blocks are
// listed in chain order and handed to concatenate_blocks, which links every block left
// without a terminator to the block after it. The same module emits the constant-valued
// size accessors, which are single-block functions returning an i32.

//! Shape table and size accessor generation.

use crate::core::{
    CompileError,
    CompileResult,
    ComparisonPredicate,
    Emitter,
    Literal,
    StructRef,
    ValueRef,
    VariableType,
};
use crate::model::TensorShape;

/// Name of the shape record type in the generated module and header.
pub const TENSOR_SHAPE_TYPE: &str = "TensorShape";

/// Declare the shape record type once and tag it for the header.
pub fn declare_tensor_shape(emitter: &mut dyn Emitter) -> CompileResult<StructRef> {
    if let Some(existing) = emitter.get_struct(TENSOR_SHAPE_TYPE) {
        return Ok(existing);
    }
    let shape = emitter.declare_struct(
        TENSOR_SHAPE_TYPE,
        &[
            ("rows", VariableType::Int32),
            ("columns", VariableType::Int32),
            ("channels", VariableType::Int32),
        ],
    )?;
    emitter.include_type_in_header(shape)?;
    Ok(shape)
}

fn to_i32(value: usize, what: &str) -> CompileResult<i32> {
    i32::try_from(value).map_err(|_| CompileError::invalid_argument(format!("{} {} does not fit in i32", what, value)))
}

fn store_shape(emitter: &mut dyn Emitter, record: ValueRef, values: [i32; 3]) -> CompileResult<()> {
    for (field, value) in values.into_iter().enumerate() {
        let pointer = emitter.field_pointer(record, field)?;
        let value = emitter.literal(Literal::Int32(value))?;
        emitter.store(pointer, value)?;
    }
    Ok(())
}

/// Emit the body of a shape accessor into the current function.
///
/// The function's first argument is the `i32` index, the second the record pointer.
pub fn emit_shape_conditionals(emitter: &mut dyn Emitter, shapes: &[TensorShape]) -> CompileResult<()> {
    let entry = emitter
        .current_block()
        .ok_or_else(|| CompileError::emitter("shape table emitted outside of a block"))?;
    let index = emitter.argument(0)?;
    let record = emitter.argument(1)?;

    let no_match = emitter.begin_block("NoMatchBlock")?;
    store_shape(emitter, record, [0, 0, 0])?;
    emitter.ret(None)?;

    let mut chain = vec![entry];
    for (i, shape) in shapes.iter().enumerate() {
        let values = [
            to_i32(shape.rows, "rows")?,
            to_i32(shape.columns, "columns")?,
            to_i32(shape.channels, "channels")?,
        ];

        let if_block = emitter.begin_block(&format!("IfBlock{}", i))?;
        let then_block = emitter.block(&format!("ThenBlock{}", i))?;
        let else_block = emitter.block(&format!("ElseBlock{}", i))?;

        let expected = emitter.literal(Literal::Int32(to_i32(i, "shape index")?))?;
        let matches = emitter.compare(ComparisonPredicate::Equal, index, expected)?;
        emitter.branch_if(matches, then_block, else_block)?;

        emitter.set_current_block(then_block)?;
        store_shape(emitter, record, values)?;
        emitter.ret(None)?;

        chain.extend([if_block, then_block, else_block]);
    }
    chain.push(no_match);

    emitter.set_current_block(entry)?;
    emitter.branch(chain[1])?;
    emitter.concatenate_blocks(&chain)
}

/// Emit `void name(i32 index, TensorShape* shape)` over `shapes`.
pub fn emit_shape_accessor(emitter: &mut dyn Emitter, name: &str, shapes: &[TensorShape]) -> CompileResult<()> {
    let shape_type = declare_tensor_shape(emitter)?;
    emitter.begin_function(
        name,
        VariableType::Void,
        &[("index", VariableType::Int32), ("shape", VariableType::StructPointer(shape_type))],
    )?;
    emitter.include_in_header()?;
    emit_shape_conditionals(emitter, shapes)?;
    emitter.end_function()?;
    log::debug!("Emitted {} with {} shapes", name, shapes.len());
    Ok(())
}

/// Emit `i32 name()` returning a constant.
pub fn emit_size_accessor(emitter: &mut dyn Emitter, name: &str, value: usize) -> CompileResult<()> {
    emitter.begin_function(name, VariableType::Int32, &[])?;
    emitter.include_in_header()?;
    let result = emitter.literal(Literal::Int32(to_i32(value, name)?))?;
    emitter.ret(Some(result))?;
    emitter.end_function()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompilationSession;
    use crate::ir::{Interpreter, IrModuleEmitter, RtValue};
    use crate::core::{ModuleBuilder, TargetDevice};
    use bumpalo::Bump;

    #[test]
    fn test_block_layout() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("shapes", &session);
        emit_shape_accessor(&mut emitter, "GetShape", &[TensorShape::new(2, 3, 4)]).unwrap();
        let module = emitter.finish(&TargetDevice::default()).unwrap();

        let function = module.function("GetShape").unwrap();
        let labels: Vec<&str> = function.blocks().iter().map(|block| block.label()).collect();
        assert_eq!(labels, vec!["entry", "NoMatchBlock", "IfBlock0", "ThenBlock0", "ElseBlock0"]);
        assert!(function.blocks().iter().all(|block| block.terminator().is_some()));
    }

    #[test]
    fn test_empty_table_branches_to_default() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("shapes", &session);
        emit_shape_accessor(&mut emitter, "GetShape", &[]).unwrap();
        let module = emitter.finish(&TargetDevice::default()).unwrap();

        let mut interpreter = Interpreter::new(&module);
        let record = interpreter.alloc_values(vec![RtValue::I32(9); 3]);
        interpreter.call("GetShape", &[RtValue::I32(0), record]).unwrap();
        assert_eq!(
            interpreter.read_values(record, 3).unwrap(),
            vec![RtValue::I32(0), RtValue::I32(0), RtValue::I32(0)]
        );
    }
}
