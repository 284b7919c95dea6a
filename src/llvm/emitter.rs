// LlvmModuleEmitter drives an inkwell Builder over a Module owned by the emitter. Opaque
// pointers carry no pointee type, so every value handed out through the Emitter interface
// is recorded together with its VariableType; loads, GEPs and stores take their element
// types from that record. Block, region and variable bookkeeping follows the built-in IR
// emitter: regions live in a per-function list, merged regions are linked by a branch
// from the destination's end to the source's start, surviving regions are linked in
// creation order when the function closes, and function-local memory is allocated at the
// top of the entry block. Terminators added outside the insertion point use a scratch
// builder so the main builder keeps its position.

//! Emitter for LLVM modules.

use crate::core::{
    BinaryOperator,
    BlockRef,
    CompilationSession,
    CompileError,
    CompileResult,
    ComparisonPredicate,
    Emitter,
    FunctionRef,
    Literal,
    ModuleBuilder,
    RegionRef,
    StructRef,
    TargetDevice,
    ValueRef,
    VarId,
    Variable,
    VariableScope,
    VariableType,
};
use crate::ir::header::{prototype, HeaderDeclarations};
use hashbrown::HashMap;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{TargetData, TargetTriple};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, PointerType, StructType};
use inkwell::values::{ArrayValue, BasicValueEnum, FunctionValue};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};
use std::fmt;

fn builder_error(error: BuilderError) -> CompileError {
    CompileError::emitter(format!("LLVM builder: {}", error))
}

#[derive(Debug, Clone, Copy)]
struct ValueSlot<'ctx> {
    value: BasicValueEnum<'ctx>,
    ty: VariableType,
    /// Owning function, `None` for globals.
    owner: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct RegionState {
    start: BlockRef,
    end: BlockRef,
    absorbed: bool,
}

struct DeclaredStruct<'ctx> {
    name: String,
    llvm_type: StructType<'ctx>,
    fields: Vec<(String, VariableType)>,
    in_header: bool,
}

struct FunctionState<'ctx> {
    index: usize,
    function: FunctionValue<'ctx>,
    name: String,
    return_type: VariableType,
    params: Vec<(String, VariableType)>,
    arguments: Vec<ValueRef>,
    blocks: Vec<BasicBlock<'ctx>>,
    current_block: Option<BlockRef>,
    regions: Vec<RegionState>,
    current_region: Option<RegionRef>,
    variables: HashMap<VarId, ValueRef>,
}

/// A finished LLVM module with its public interface.
pub struct LlvmModule<'ctx> {
    module: Module<'ctx>,
    header: HeaderDeclarations,
    predict_function: Option<String>,
}

impl<'ctx> LlvmModule<'ctx> {
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn into_inner(self) -> Module<'ctx> {
        self.module
    }

    pub fn predict_function(&self) -> Option<&str> {
        self.predict_function.as_deref()
    }

    pub fn header_declarations(&self) -> &HeaderDeclarations {
        &self.header
    }

    pub fn header(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.header.write(&mut out);
        out
    }
}

impl fmt::Display for LlvmModule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module.print_to_string().to_string())
    }
}

pub struct LlvmModuleEmitter<'ctx, 's, 'arena> {
    context: &'ctx Context,
    session: &'s CompilationSession<'arena>,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    values: Vec<ValueSlot<'ctx>>,
    structs: Vec<DeclaredStruct<'ctx>>,
    definitions: Vec<(String, String)>,
    prototypes: Vec<String>,
    predict_function: Option<String>,
    function_count: usize,
    state: Option<FunctionState<'ctx>>,
    global_variables: HashMap<VarId, ValueRef>,
}

impl<'ctx, 's, 'arena> LlvmModuleEmitter<'ctx, 's, 'arena> {
    pub fn new(context: &'ctx Context, module_name: &str, session: &'s CompilationSession<'arena>) -> Self {
        Self {
            context,
            session,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            values: Vec::new(),
            structs: Vec::new(),
            definitions: Vec::new(),
            prototypes: Vec::new(),
            predict_function: None,
            function_count: 0,
            state: None,
            global_variables: HashMap::new(),
        }
    }

    fn ptr_type(&self) -> PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    fn basic_type(&self, ty: VariableType) -> CompileResult<BasicTypeEnum<'ctx>> {
        Ok(match ty {
            VariableType::Boolean => self.context.bool_type().into(),
            VariableType::Int32 => self.context.i32_type().into(),
            VariableType::Int64 => self.context.i64_type().into(),
            VariableType::Float => self.context.f32_type().into(),
            VariableType::Double => self.context.f64_type().into(),
            VariableType::Struct(s) => self.declared_struct(s)?.llvm_type.into(),
            VariableType::Void => return Err(CompileError::type_mismatch("void has no value type")),
            _ => self.ptr_type().into(),
        })
    }

    fn c_type(&self, ty: VariableType) -> String {
        match ty {
            VariableType::Struct(s) => self.declared_struct(s).map(|s| s.name.clone()).unwrap_or_else(|_| "void".into()),
            VariableType::StructPointer(s) => format!("{}*", self.c_type(VariableType::Struct(s))),
            other => other.c_name().to_string(),
        }
    }

    fn declared_struct(&self, ty: StructRef) -> CompileResult<&DeclaredStruct<'ctx>> {
        self.structs
            .get(ty.0 as usize)
            .ok_or_else(|| CompileError::emitter(format!("unknown struct {}", ty.0)))
    }

    fn const_value(&self, literal: Literal) -> BasicValueEnum<'ctx> {
        match literal {
            Literal::Boolean(v) => self.context.bool_type().const_int(v as u64, false).into(),
            Literal::Int32(v) => self.context.i32_type().const_int(v as u64, true).into(),
            Literal::Int64(v) => self.context.i64_type().const_int(v as u64, true).into(),
            Literal::Float(v) => self.context.f32_type().const_float(v as f64).into(),
            Literal::Double(v) => self.context.f64_type().const_float(v).into(),
        }
    }

    fn const_array(&self, ty: VariableType, values: &[Literal]) -> CompileResult<ArrayValue<'ctx>> {
        let elements: Vec<BasicValueEnum<'ctx>> = values.iter().map(|l| self.const_value(*l)).collect();
        Ok(match ty {
            VariableType::Boolean => self.context.bool_type().const_array(&ints(&elements)),
            VariableType::Int32 => self.context.i32_type().const_array(&ints(&elements)),
            VariableType::Int64 => self.context.i64_type().const_array(&ints(&elements)),
            VariableType::Float => self.context.f32_type().const_array(&floats(&elements)),
            VariableType::Double => self.context.f64_type().const_array(&floats(&elements)),
            other => return Err(CompileError::type_mismatch(format!("no constant array of {:?}", other))),
        })
    }

    fn state(&self) -> CompileResult<&FunctionState<'ctx>> {
        self.state
            .as_ref()
            .ok_or_else(|| CompileError::emitter("no function is being emitted"))
    }

    fn state_mut(&mut self) -> CompileResult<&mut FunctionState<'ctx>> {
        self.state
            .as_mut()
            .ok_or_else(|| CompileError::emitter("no function is being emitted"))
    }

    fn basic_block(&self, block: BlockRef) -> CompileResult<BasicBlock<'ctx>> {
        self.state()?
            .blocks
            .get(block.0 as usize)
            .copied()
            .ok_or_else(|| CompileError::emitter(format!("unknown block {}", block.0)))
    }

    fn region(&self, region: RegionRef) -> CompileResult<RegionState> {
        self.state()?
            .regions
            .get(region.0 as usize)
            .copied()
            .ok_or_else(|| CompileError::emitter(format!("unknown region {}", region.0)))
    }

    fn region_mut(&mut self, region: RegionRef) -> CompileResult<&mut RegionState> {
        self.state_mut()?
            .regions
            .get_mut(region.0 as usize)
            .ok_or_else(|| CompileError::emitter(format!("unknown region {}", region.0)))
    }

    fn new_value(&mut self, value: BasicValueEnum<'ctx>, ty: VariableType, owner: Option<usize>) -> ValueRef {
        self.values.push(ValueSlot { value, ty, owner });
        ValueRef((self.values.len() - 1) as u32)
    }

    fn local_value(&mut self, value: BasicValueEnum<'ctx>, ty: VariableType) -> CompileResult<ValueRef> {
        let owner = self.state()?.index;
        Ok(self.new_value(value, ty, Some(owner)))
    }

    /// A value visible from the current function.
    fn slot(&self, value: ValueRef) -> CompileResult<ValueSlot<'ctx>> {
        let index = self.state()?.index;
        let slot = self
            .values
            .get(value.0 as usize)
            .copied()
            .ok_or_else(|| CompileError::emitter(format!("unknown value {}", value.0)))?;
        match slot.owner {
            Some(owner) if owner != index => {
                Err(CompileError::emitter(format!("value {} belongs to another function", value.0)))
            }
            _ => Ok(slot),
        }
    }

    fn typed(&self, value: ValueRef, expected: VariableType) -> CompileResult<BasicValueEnum<'ctx>> {
        let slot = self.slot(value)?;
        if slot.ty != expected {
            return Err(CompileError::type_mismatch(format!(
                "value {} has type {:?}, expected {:?}",
                value.0, slot.ty, expected
            )));
        }
        Ok(slot.value)
    }

    fn scalar_pointee_of(&self, pointer: ValueRef) -> CompileResult<VariableType> {
        let ty = self.slot(pointer)?.ty;
        match ty.pointee() {
            Some(VariableType::Struct(_)) | None => Err(CompileError::type_mismatch(format!(
                "value {} of type {:?} is not a scalar pointer",
                pointer.0, ty
            ))),
            Some(pointee) => Ok(pointee),
        }
    }

    fn offset(&self, offset: ValueRef) -> CompileResult<inkwell::values::IntValue<'ctx>> {
        let slot = self.slot(offset)?;
        match slot.ty {
            VariableType::Int32 | VariableType::Int64 => Ok(slot.value.into_int_value()),
            other => Err(CompileError::type_mismatch(format!("offset of type {:?}", other))),
        }
    }

    /// The current block, positioned and open for instructions.
    fn open_block(&self) -> CompileResult<BasicBlock<'ctx>> {
        let block = self
            .state()?
            .current_block
            .ok_or_else(|| CompileError::emitter("no current block"))?;
        let block = self.basic_block(block)?;
        if block.get_terminator().is_some() {
            return Err(CompileError::emitter(format!(
                "block '{}' is already terminated",
                block.get_name().to_string_lossy()
            )));
        }
        Ok(block)
    }

    fn add_global(&mut self, name: &str, ty: VariableType, initial: &[Literal], constant: bool) -> CompileResult<ValueRef> {
        let pointer = ty
            .pointer_to()
            .ok_or_else(|| CompileError::type_mismatch(format!("no global of type {:?}", ty)))?;
        if let Some(bad) = initial.iter().find(|literal| literal.value_type() != ty) {
            return Err(CompileError::type_mismatch(format!(
                "initializer {} does not have type {:?}",
                bad, ty
            )));
        }
        let array_type = self.basic_type(ty)?.array_type(initial.len() as u32);
        let global = self.module.add_global(array_type, Some(AddressSpace::default()), name);
        global.set_initializer(&self.const_array(ty, initial)?);
        global.set_constant(constant);
        global.set_linkage(Linkage::Internal);
        log::trace!("Declared global @{} ({} x {:?})", name, initial.len(), ty);
        Ok(self.new_value(global.as_pointer_value().into(), pointer, None))
    }

    fn alloca_in_entry(&mut self, name: &str, ty: VariableType) -> CompileResult<ValueRef> {
        let pointer = ty
            .pointer_to()
            .ok_or_else(|| CompileError::type_mismatch(format!("cannot allocate {:?}", ty)))?;
        let entry = self.basic_block(BlockRef(0))?;
        let scratch = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => scratch.position_before(&first),
            None => scratch.position_at_end(entry),
        }
        let slot = scratch.build_alloca(self.basic_type(ty)?, name).map_err(builder_error)?;
        self.local_value(slot.into(), pointer)
    }

    /// Terminate `from` with a branch to `to` unless it already has a terminator.
    fn link(&self, from: BlockRef, to: BlockRef) -> CompileResult<()> {
        let from = self.basic_block(from)?;
        if from.get_terminator().is_some() {
            return Ok(());
        }
        let scratch = self.context.create_builder();
        scratch.position_at_end(from);
        scratch
            .build_unconditional_branch(self.basic_block(to)?)
            .map_err(builder_error)?;
        Ok(())
    }

    fn seal_function(&mut self) -> CompileResult<()> {
        let state = self.state()?;
        let live: Vec<RegionState> = state.regions.iter().filter(|r| !r.absorbed).copied().collect();
        let last = live.last().map(|r| r.end).or(state.current_block);
        let returns_void = state.return_type == VariableType::Void;

        for pair in live.windows(2) {
            self.link(pair[0].end, pair[1].start)?;
        }
        if let (Some(last), true) = (last, returns_void) {
            let block = self.basic_block(last)?;
            if block.get_terminator().is_none() {
                let scratch = self.context.create_builder();
                scratch.position_at_end(block);
                scratch.build_return(None).map_err(builder_error)?;
            }
        }

        let state = self.state()?;
        if let Some(open) = state.blocks.iter().find(|block| block.get_terminator().is_none()) {
            return Err(CompileError::emitter(format!(
                "block '{}' of function '{}' has no terminator",
                open.get_name().to_string_lossy(),
                state.name
            )));
        }
        Ok(())
    }
}

fn ints<'ctx>(values: &[BasicValueEnum<'ctx>]) -> Vec<inkwell::values::IntValue<'ctx>> {
    values.iter().map(|v| v.into_int_value()).collect()
}

fn floats<'ctx>(values: &[BasicValueEnum<'ctx>]) -> Vec<inkwell::values::FloatValue<'ctx>> {
    values.iter().map(|v| v.into_float_value()).collect()
}

impl<'ctx> Emitter for LlvmModuleEmitter<'ctx, '_, '_> {
    fn module_name(&self) -> &str {
        self.module.get_name().to_str().unwrap_or("module")
    }

    fn declare_struct(&mut self, name: &str, fields: &[(&str, VariableType)]) -> CompileResult<StructRef> {
        if self.get_struct(name).is_some() {
            return Err(CompileError::emitter(format!("struct '{}' already declared", name)));
        }
        if let Some((field, ty)) = fields.iter().find(|(_, ty)| ty.is_pointer() || *ty == VariableType::Void) {
            return Err(CompileError::not_supported(format!(
                "struct field '{}' of type {:?}",
                field, ty
            )));
        }
        let field_types = fields
            .iter()
            .map(|(_, ty)| self.basic_type(*ty))
            .collect::<CompileResult<Vec<_>>>()?;
        let llvm_type = self.context.opaque_struct_type(name);
        llvm_type.set_body(&field_types, false);
        self.structs.push(DeclaredStruct {
            name: name.to_string(),
            llvm_type,
            fields: fields.iter().map(|(field, ty)| (field.to_string(), *ty)).collect(),
            in_header: false,
        });
        Ok(StructRef((self.structs.len() - 1) as u32))
    }

    fn get_struct(&self, name: &str) -> Option<StructRef> {
        self.structs
            .iter()
            .position(|s| s.name == name)
            .map(|index| StructRef(index as u32))
    }

    fn include_type_in_header(&mut self, ty: StructRef) -> CompileResult<()> {
        let declared = self
            .structs
            .get_mut(ty.0 as usize)
            .ok_or_else(|| CompileError::emitter(format!("unknown struct {}", ty.0)))?;
        declared.in_header = true;
        Ok(())
    }

    fn add_preprocessor_definition(&mut self, name: &str, value: &str) {
        match self.definitions.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.definitions.push((name.to_string(), value.to_string())),
        }
    }

    fn global(&mut self, name: &str, ty: VariableType, initial: &[Literal]) -> CompileResult<ValueRef> {
        self.add_global(name, ty, initial, false)
    }

    fn begin_function(
        &mut self,
        name: &str,
        return_type: VariableType,
        params: &[(&str, VariableType)],
    ) -> CompileResult<FunctionRef> {
        if let Some(state) = &self.state {
            return Err(CompileError::emitter(format!("function '{}' is still open", state.name)));
        }
        if self.module.get_function(name).is_some() {
            return Err(CompileError::emitter(format!("function '{}' already defined", name)));
        }

        let param_types = params
            .iter()
            .map(|(_, ty)| self.basic_type(*ty).map(BasicMetadataTypeEnum::from))
            .collect::<CompileResult<Vec<_>>>()?;
        let fn_type = match return_type {
            VariableType::Void => self.context.void_type().fn_type(&param_types, false),
            other => self.basic_type(other)?.fn_type(&param_types, false),
        };
        let function = self.module.add_function(name, fn_type, None);
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        let index = self.function_count;
        self.function_count += 1;
        let mut arguments = Vec::with_capacity(params.len());
        for (i, (param, ty)) in params.iter().enumerate() {
            let value = function
                .get_nth_param(i as u32)
                .ok_or_else(|| CompileError::emitter(format!("function '{}' has no parameter {}", name, i)))?;
            value.set_name(param);
            arguments.push(self.new_value(value, *ty, Some(index)));
        }

        self.state = Some(FunctionState {
            index,
            function,
            name: name.to_string(),
            return_type,
            params: params.iter().map(|(param, ty)| (param.to_string(), *ty)).collect(),
            arguments,
            blocks: vec![entry],
            current_block: Some(BlockRef(0)),
            regions: Vec::new(),
            current_region: None,
            variables: HashMap::new(),
        });
        log::debug!("Begin function {}", name);
        Ok(FunctionRef(index as u32))
    }

    fn end_function(&mut self) -> CompileResult<()> {
        self.seal_function()?;
        let state = self.state.take().ok_or_else(|| CompileError::emitter("no function is being emitted"))?;
        self.session.record_function_emitted(&state.name, state.blocks.len());
        log::debug!("End function {} ({} blocks)", state.name, state.blocks.len());
        Ok(())
    }

    fn include_in_header(&mut self) -> CompileResult<()> {
        let state = self.state()?;
        let params: Vec<(String, String)> = state
            .params
            .iter()
            .map(|(name, ty)| (self.c_type(*ty), name.clone()))
            .collect();
        let declaration = prototype(&self.c_type(state.return_type), &state.name, &params);
        if !self.prototypes.contains(&declaration) {
            self.prototypes.push(declaration);
        }
        Ok(())
    }

    fn include_in_predict_interface(&mut self) -> CompileResult<()> {
        self.predict_function = Some(self.state()?.name.clone());
        Ok(())
    }

    fn argument(&self, index: usize) -> CompileResult<ValueRef> {
        let state = self.state()?;
        state
            .arguments
            .get(index)
            .copied()
            .ok_or_else(|| CompileError::emitter(format!("function '{}' has no argument {}", state.name, index)))
    }

    fn ensure_emitted(&mut self, variable: &Variable) -> CompileResult<ValueRef> {
        match variable.scope() {
            VariableScope::Literal if variable.is_scalar() => {
                let value = variable
                    .literals()
                    .first()
                    .copied()
                    .ok_or_else(|| CompileError::invalid_argument(format!("literal '{}' has no value", variable.name())))?;
                if value.value_type() != variable.element_type() {
                    return Err(CompileError::type_mismatch(format!(
                        "literal '{}' holds {:?}, declared {:?}",
                        variable.name(),
                        value.value_type(),
                        variable.element_type()
                    )));
                }
                self.literal(value)
            }
            VariableScope::Literal | VariableScope::Global => {
                if let Some(value) = self.global_variables.get(&variable.id()) {
                    return Ok(*value);
                }
                let value = if variable.is_literal() {
                    self.add_global(variable.name(), variable.element_type(), variable.literals(), true)?
                } else {
                    let zero = Literal::zero(variable.element_type()).ok_or_else(|| {
                        CompileError::type_mismatch(format!("no storage for {:?}", variable.element_type()))
                    })?;
                    self.add_global(variable.name(), variable.element_type(), &vec![zero; variable.dimension()], false)?
                };
                self.global_variables.insert(variable.id(), value);
                Ok(value)
            }
            VariableScope::Local => {
                if let Some(value) = self.state()?.variables.get(&variable.id()) {
                    return Ok(*value);
                }
                let value = self.alloca_in_entry(variable.name(), variable.element_type())?;
                self.state_mut()?.variables.insert(variable.id(), value);
                Ok(value)
            }
            VariableScope::Input | VariableScope::Output => self
                .state()?
                .variables
                .get(&variable.id())
                .copied()
                .ok_or_else(|| CompileError::emitter(format!("argument variable '{}' is not bound", variable.name()))),
        }
    }

    fn bind_variable(&mut self, variable: &Variable, value: ValueRef) -> CompileResult<()> {
        let expected = variable
            .emitted_type()
            .ok_or_else(|| CompileError::type_mismatch(format!("variable '{}' has no value type", variable.name())))?;
        self.typed(value, expected)?;
        self.state_mut()?.variables.insert(variable.id(), value);
        Ok(())
    }

    fn is_pointer(&self, value: ValueRef) -> bool {
        self.values
            .get(value.0 as usize)
            .map(|slot| slot.ty.is_pointer())
            .unwrap_or(false)
    }

    fn literal(&mut self, value: Literal) -> CompileResult<ValueRef> {
        self.open_block()?;
        let constant = self.const_value(value);
        self.local_value(constant, value.value_type())
    }

    fn load(&mut self, pointer: ValueRef) -> CompileResult<ValueRef> {
        let ty = self.scalar_pointee_of(pointer)?;
        let address = self.slot(pointer)?.value.into_pointer_value();
        self.open_block()?;
        let loaded = self
            .builder
            .build_load(self.basic_type(ty)?, address, "")
            .map_err(builder_error)?;
        self.local_value(loaded, ty)
    }

    fn store(&mut self, pointer: ValueRef, value: ValueRef) -> CompileResult<()> {
        let ty = self.scalar_pointee_of(pointer)?;
        let address = self.slot(pointer)?.value.into_pointer_value();
        let value = self.typed(value, ty)?;
        self.open_block()?;
        self.builder.build_store(address, value).map_err(builder_error)?;
        Ok(())
    }

    fn value_at(&mut self, pointer: ValueRef, offset: ValueRef) -> CompileResult<ValueRef> {
        let ty = self.scalar_pointee_of(pointer)?;
        let address = self.slot(pointer)?.value.into_pointer_value();
        let offset = self.offset(offset)?;
        self.open_block()?;
        let element_type = self.basic_type(ty)?;
        // SAFETY: element indices are bounds-checked against the variable dimension before emission.
        let element = unsafe { self.builder.build_in_bounds_gep(element_type, address, &[offset], "") }
            .map_err(builder_error)?;
        let loaded = self.builder.build_load(element_type, element, "").map_err(builder_error)?;
        self.local_value(loaded, ty)
    }

    fn set_value_at(&mut self, pointer: ValueRef, offset: ValueRef, value: ValueRef) -> CompileResult<()> {
        let ty = self.scalar_pointee_of(pointer)?;
        let address = self.slot(pointer)?.value.into_pointer_value();
        let offset = self.offset(offset)?;
        let value = self.typed(value, ty)?;
        self.open_block()?;
        let element_type = self.basic_type(ty)?;
        // SAFETY: element indices are bounds-checked against the variable dimension before emission.
        let element = unsafe { self.builder.build_in_bounds_gep(element_type, address, &[offset], "") }
            .map_err(builder_error)?;
        self.builder.build_store(element, value).map_err(builder_error)?;
        Ok(())
    }

    fn field_pointer(&mut self, pointer: ValueRef, field: usize) -> CompileResult<ValueRef> {
        let slot = self.slot(pointer)?;
        let Some(VariableType::Struct(s)) = slot.ty.pointee() else {
            return Err(CompileError::type_mismatch(format!("value {} does not point to a struct", pointer.0)));
        };
        let declared = self.declared_struct(s)?;
        let field_type = declared
            .fields
            .get(field)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| CompileError::emitter(format!("struct '{}' has no field {}", declared.name, field)))?;
        let pointer_type = field_type
            .pointer_to()
            .ok_or_else(|| CompileError::type_mismatch(format!("field {} cannot be addressed", field)))?;
        let struct_type = declared.llvm_type;
        self.open_block()?;
        let address = self
            .builder
            .build_struct_gep(struct_type, slot.value.into_pointer_value(), field as u32, "")
            .map_err(builder_error)?;
        self.local_value(address.into(), pointer_type)
    }

    fn operator(&mut self, op: BinaryOperator, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef> {
        let left = self.slot(lhs)?;
        let right = self.typed(rhs, left.ty)?;
        self.open_block()?;
        let result: BasicValueEnum<'ctx> = match left.ty {
            VariableType::Int32 | VariableType::Int64 => {
                let (a, b) = (left.value.into_int_value(), right.into_int_value());
                match op {
                    BinaryOperator::Add => self.builder.build_int_add(a, b, ""),
                    BinaryOperator::Subtract => self.builder.build_int_sub(a, b, ""),
                    BinaryOperator::Multiply => self.builder.build_int_mul(a, b, ""),
                }
                .map_err(builder_error)?
                .into()
            }
            VariableType::Float | VariableType::Double => {
                let (a, b) = (left.value.into_float_value(), right.into_float_value());
                match op {
                    BinaryOperator::Add => self.builder.build_float_add(a, b, ""),
                    BinaryOperator::Subtract => self.builder.build_float_sub(a, b, ""),
                    BinaryOperator::Multiply => self.builder.build_float_mul(a, b, ""),
                }
                .map_err(builder_error)?
                .into()
            }
            other => {
                return Err(CompileError::type_mismatch(format!("cannot {} values of type {:?}", op.name(), other)));
            }
        };
        self.local_value(result, left.ty)
    }

    fn compare(&mut self, predicate: ComparisonPredicate, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef> {
        let left = self.slot(lhs)?;
        let right = self.typed(rhs, left.ty)?;
        self.open_block()?;
        let result = match left.ty {
            VariableType::Boolean | VariableType::Int32 | VariableType::Int64 => {
                let signed = left.ty != VariableType::Boolean;
                let predicate = match predicate {
                    ComparisonPredicate::Equal => IntPredicate::EQ,
                    ComparisonPredicate::NotEqual => IntPredicate::NE,
                    ComparisonPredicate::Less if signed => IntPredicate::SLT,
                    ComparisonPredicate::Less => IntPredicate::ULT,
                    ComparisonPredicate::Greater if signed => IntPredicate::SGT,
                    ComparisonPredicate::Greater => IntPredicate::UGT,
                };
                self.builder
                    .build_int_compare(predicate, left.value.into_int_value(), right.into_int_value(), "")
            }
            VariableType::Float | VariableType::Double => {
                let predicate = match predicate {
                    ComparisonPredicate::Equal => FloatPredicate::OEQ,
                    ComparisonPredicate::NotEqual => FloatPredicate::UNE,
                    ComparisonPredicate::Less => FloatPredicate::OLT,
                    ComparisonPredicate::Greater => FloatPredicate::OGT,
                };
                self.builder
                    .build_float_compare(predicate, left.value.into_float_value(), right.into_float_value(), "")
            }
            other => return Err(CompileError::type_mismatch(format!("cannot compare values of type {:?}", other))),
        }
        .map_err(builder_error)?;
        self.local_value(result.into(), VariableType::Boolean)
    }

    fn timestamp(&mut self) -> CompileResult<ValueRef> {
        self.open_block()?;
        let declaration = Intrinsic::find("llvm.readcyclecounter")
            .and_then(|intrinsic| intrinsic.get_declaration(&self.module, &[]))
            .ok_or_else(|| CompileError::not_supported("llvm.readcyclecounter is unavailable"))?;
        let ticks = self
            .builder
            .build_call(declaration, &[], "ticks")
            .map_err(builder_error)?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| CompileError::emitter("llvm.readcyclecounter returned no value"))?;
        self.local_value(ticks, VariableType::Int64)
    }

    fn print(&mut self, message: &str) -> CompileResult<()> {
        self.open_block()?;
        let puts = match self.module.get_function("puts") {
            Some(puts) => puts,
            None => {
                let fn_type = self.context.i32_type().fn_type(&[self.ptr_type().into()], false);
                self.module.add_function("puts", fn_type, Some(Linkage::External))
            }
        };
        let text = self
            .builder
            .build_global_string_ptr(message, "message")
            .map_err(builder_error)?;
        self.builder
            .build_call(puts, &[text.as_pointer_value().into()], "")
            .map_err(builder_error)?;
        Ok(())
    }

    fn block(&mut self, label: &str) -> CompileResult<BlockRef> {
        let function = self.state()?.function;
        let block = self.context.append_basic_block(function, label);
        let state = self.state_mut()?;
        state.blocks.push(block);
        Ok(BlockRef((state.blocks.len() - 1) as u32))
    }

    fn begin_block(&mut self, label: &str) -> CompileResult<BlockRef> {
        let block = self.block(label)?;
        self.set_current_block(block)?;
        Ok(block)
    }

    fn current_block(&self) -> Option<BlockRef> {
        self.state.as_ref().and_then(|state| state.current_block)
    }

    fn set_current_block(&mut self, block: BlockRef) -> CompileResult<()> {
        let basic_block = self.basic_block(block)?;
        self.builder.position_at_end(basic_block);
        self.state_mut()?.current_block = Some(block);
        Ok(())
    }

    fn branch(&mut self, target: BlockRef) -> CompileResult<()> {
        let target = self.basic_block(target)?;
        self.open_block()?;
        self.builder.build_unconditional_branch(target).map_err(builder_error)?;
        Ok(())
    }

    fn branch_if(&mut self, condition: ValueRef, then_block: BlockRef, else_block: BlockRef) -> CompileResult<()> {
        let condition = self.typed(condition, VariableType::Boolean)?.into_int_value();
        let (then_block, else_block) = (self.basic_block(then_block)?, self.basic_block(else_block)?);
        self.open_block()?;
        self.builder
            .build_conditional_branch(condition, then_block, else_block)
            .map_err(builder_error)?;
        Ok(())
    }

    fn ret(&mut self, value: Option<ValueRef>) -> CompileResult<()> {
        let return_type = self.state()?.return_type;
        self.open_block()?;
        match value {
            Some(value) => {
                let value = self.typed(value, return_type)?;
                self.builder.build_return(Some(&value)).map_err(builder_error)?;
            }
            None if return_type != VariableType::Void => {
                return Err(CompileError::type_mismatch(format!("missing return value of type {:?}", return_type)));
            }
            None => {
                self.builder.build_return(None).map_err(builder_error)?;
            }
        }
        Ok(())
    }

    fn concatenate_blocks(&mut self, blocks: &[BlockRef]) -> CompileResult<()> {
        for block in blocks {
            self.basic_block(*block)?;
        }
        for pair in blocks.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn add_region(&mut self, start: BlockRef) -> CompileResult<RegionRef> {
        self.basic_block(start)?;
        let state = self.state_mut()?;
        state.regions.push(RegionState { start, end: start, absorbed: false });
        let region = RegionRef((state.regions.len() - 1) as u32);
        state.current_region = Some(region);
        Ok(region)
    }

    fn current_region(&self) -> Option<RegionRef> {
        self.state.as_ref().and_then(|state| state.current_region)
    }

    fn set_current_region(&mut self, region: RegionRef) -> CompileResult<()> {
        self.region(region)?;
        self.state_mut()?.current_region = Some(region);
        Ok(())
    }

    fn region_end(&self, region: RegionRef) -> CompileResult<BlockRef> {
        Ok(self.region(region)?.end)
    }

    fn set_region_end(&mut self, region: RegionRef, block: BlockRef) -> CompileResult<()> {
        self.basic_block(block)?;
        self.region_mut(region)?.end = block;
        Ok(())
    }

    fn concat_regions(&mut self, dest: RegionRef, src: RegionRef) -> CompileResult<()> {
        let to = self.region(dest)?;
        let from = self.region(src)?;
        if dest == src || to.absorbed || from.absorbed {
            return Err(CompileError::emitter(format!(
                "cannot concatenate region {} onto region {}",
                src.0, dest.0
            )));
        }

        self.link(to.end, from.start)?;
        let (to_end, from_start) = (self.basic_block(to.end)?, self.basic_block(from.start)?);
        from_start
            .move_after(to_end)
            .map_err(|_| CompileError::emitter("cannot reorder basic blocks"))?;
        self.region_mut(dest)?.end = from.end;
        self.region_mut(src)?.absorbed = true;

        let state = self.state_mut()?;
        if state.current_region == Some(src) {
            state.current_region = Some(dest);
        }
        Ok(())
    }
}

impl<'ctx> ModuleBuilder for LlvmModuleEmitter<'ctx, '_, '_> {
    type Module = LlvmModule<'ctx>;

    fn finish(self, device: &TargetDevice) -> CompileResult<LlvmModule<'ctx>> {
        if let Some(state) = &self.state {
            return Err(CompileError::emitter(format!("function '{}' was never finished", state.name)));
        }
        self.module.set_triple(&TargetTriple::create(&device.triple));
        let target_data = TargetData::create(&device.data_layout);
        self.module.set_data_layout(&target_data.get_data_layout());
        self.module
            .verify()
            .map_err(|message| CompileError::emitter(format!("LLVM verification failed: {}", message)))?;

        let structs = self
            .structs
            .iter()
            .filter(|s| s.in_header)
            .map(|s| {
                let fields = s.fields.iter().map(|(name, ty)| (self.c_type(*ty), name.clone())).collect();
                (s.name.clone(), fields)
            })
            .collect();
        let header = HeaderDeclarations {
            module_name: self.module_name().to_string(),
            definitions: self.definitions.clone(),
            structs,
            prototypes: self.prototypes.clone(),
        };
        log::debug!(
            "Finished LLVM module {} ({} functions)",
            self.module_name(),
            self.module.get_functions().count()
        );
        Ok(LlvmModule {
            module: self.module,
            header,
            predict_function: self.predict_function,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_regions_and_globals() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let context = Context::create();
        let mut emitter = LlvmModuleEmitter::new(&context, "test", &session);

        let table = emitter.global("table", VariableType::Int32, &[Literal::Int32(4), Literal::Int32(5)]).unwrap();
        emitter.begin_function("f", VariableType::Int32, &[]).unwrap();
        let entry = emitter.current_block().unwrap();
        let r0 = emitter.add_region(entry).unwrap();
        let next = emitter.begin_block("next").unwrap();
        let r1 = emitter.add_region(next).unwrap();
        let one = emitter.literal(Literal::Int32(1)).unwrap();
        let value = emitter.value_at(table, one).unwrap();
        emitter.concat_regions(r0, r1).unwrap();
        assert_eq!(emitter.region_end(r0).unwrap(), next);
        emitter.ret(Some(value)).unwrap();
        emitter.include_in_header().unwrap();
        emitter.end_function().unwrap();

        let module = emitter.finish(&TargetDevice::default()).unwrap();
        assert!(module.header().contains("int32_t f(void);"));
        assert!(module.to_string().contains("@table"));
    }
}
