// This module implements IrModuleEmitter, the Emitter/ModuleBuilder for the built-in IR.
// The emitter owns the module under construction and, while a function is open, its
// insertion state: the current block, the function's code regions and the current
// region, and the values realized for function-scoped variables. Instructions are
// type-checked as they are appended, so a misbehaving node fails at compile time with an
// Emitter or TypeMismatch error instead of producing a module the interpreter rejects.
//
// Regions are kept in a per-function arena and addressed by index. Merging appends the
// source region to the destination (linking the destination's end to the source's start
// when the end has no terminator) and retires the source. When the function is closed the
// surviving regions are linked in creation order and the final block of a void function
// returns. Function-local memory is allocated in the entry block so that storage realized
// by one node dominates every node that reads it, whatever order the regions end up in.

//! Emitter for the built-in IR.

use super::{Instruction, IrBlock, IrFunction, IrGlobal, IrModule, IrStruct, Terminator, ValueDef, ValueInfo};
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
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy)]
struct RegionState {
    start: BlockRef,
    end: BlockRef,
    absorbed: bool,
}

#[derive(Debug)]
struct FunctionState {
    index: usize,
    current_block: Option<BlockRef>,
    regions: Vec<RegionState>,
    current_region: Option<RegionRef>,
    variables: HashMap<VarId, ValueRef>,
}

pub struct IrModuleEmitter<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    module: IrModule<'arena>,
    state: Option<FunctionState>,
    global_variables: HashMap<VarId, ValueRef>,
}

impl<'s, 'arena> IrModuleEmitter<'s, 'arena> {
    pub fn new(module_name: &str, session: &'s CompilationSession<'arena>) -> Self {
        Self {
            session,
            module: IrModule::new(session.intern_str(module_name)),
            state: None,
            global_variables: HashMap::new(),
        }
    }

    /// The module built so far.
    pub fn module(&self) -> &IrModule<'arena> {
        &self.module
    }

    fn state(&self) -> CompileResult<&FunctionState> {
        self.state
            .as_ref()
            .ok_or_else(|| CompileError::emitter("no function is being emitted"))
    }

    fn state_mut(&mut self) -> CompileResult<&mut FunctionState> {
        self.state
            .as_mut()
            .ok_or_else(|| CompileError::emitter("no function is being emitted"))
    }

    fn function(&self) -> CompileResult<&IrFunction<'arena>> {
        let index = self.state()?.index;
        Ok(&self.module.functions[index])
    }

    fn function_mut(&mut self) -> CompileResult<&mut IrFunction<'arena>> {
        let index = self.state()?.index;
        Ok(&mut self.module.functions[index])
    }

    fn block_mut(&mut self, block: BlockRef) -> CompileResult<&mut IrBlock<'arena>> {
        self.function_mut()?
            .blocks
            .get_mut(block.0 as usize)
            .ok_or_else(|| CompileError::emitter(format!("unknown block {}", block.0)))
    }

    fn check_block(&self, block: BlockRef) -> CompileResult<()> {
        if (block.0 as usize) < self.function()?.blocks.len() {
            Ok(())
        } else {
            Err(CompileError::emitter(format!("unknown block {}", block.0)))
        }
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

    fn new_value(&mut self, ty: VariableType, def: ValueDef) -> ValueRef {
        let value = ValueRef(self.module.values.len() as u32);
        self.module.values.push(ValueInfo { ty, def });
        value
    }

    fn instruction_value(&mut self, ty: VariableType) -> CompileResult<ValueRef> {
        let function = self.state()?.index;
        Ok(self.new_value(ty, ValueDef::Instruction { function }))
    }

    fn value_type(&self, value: ValueRef) -> CompileResult<VariableType> {
        self.module
            .value_info(value)
            .map(|info| info.ty)
            .ok_or_else(|| CompileError::emitter(format!("unknown value {}", value.0)))
    }

    /// Values visible from the current function: its own, and globals.
    fn check_visible(&self, value: ValueRef) -> CompileResult<()> {
        let index = self.state()?.index;
        match self.module.value_info(value).map(|info| info.def) {
            Some(ValueDef::Global(_)) => Ok(()),
            Some(ValueDef::Argument { function, .. }) | Some(ValueDef::Instruction { function }) if function == index => {
                Ok(())
            }
            Some(_) => Err(CompileError::emitter(format!(
                "value {} belongs to another function",
                value.0
            ))),
            None => Err(CompileError::emitter(format!("unknown value {}", value.0))),
        }
    }

    fn current_block_mut(&mut self) -> CompileResult<&mut IrBlock<'arena>> {
        let block = self
            .state()?
            .current_block
            .ok_or_else(|| CompileError::emitter("no current block"))?;
        let current = self.block_mut(block)?;
        if current.terminator.is_some() {
            return Err(CompileError::emitter(format!("block '{}' is already terminated", current.label)));
        }
        Ok(current)
    }

    fn push(&mut self, instruction: Instruction) -> CompileResult<()> {
        self.current_block_mut()?.instructions.push(instruction);
        Ok(())
    }

    fn terminate(&mut self, terminator: Terminator) -> CompileResult<()> {
        self.current_block_mut()?.terminator = Some(terminator);
        Ok(())
    }

    fn pointee_of(&self, pointer: ValueRef) -> CompileResult<VariableType> {
        self.check_visible(pointer)?;
        let ty = self.value_type(pointer)?;
        ty.pointee()
            .ok_or_else(|| CompileError::type_mismatch(format!("value {} of type {:?} is not a pointer", pointer.0, ty)))
    }

    fn scalar_pointee_of(&self, pointer: ValueRef) -> CompileResult<VariableType> {
        match self.pointee_of(pointer)? {
            VariableType::Struct(_) => Err(CompileError::type_mismatch(format!(
                "cannot access value {} as a scalar",
                pointer.0
            ))),
            ty => Ok(ty),
        }
    }

    fn check_type(&self, value: ValueRef, expected: VariableType) -> CompileResult<()> {
        self.check_visible(value)?;
        let actual = self.value_type(value)?;
        if actual != expected {
            return Err(CompileError::type_mismatch(format!(
                "value {} has type {:?}, expected {:?}",
                value.0, actual, expected
            )));
        }
        Ok(())
    }

    fn check_offset(&self, offset: ValueRef) -> CompileResult<()> {
        self.check_visible(offset)?;
        match self.value_type(offset)? {
            VariableType::Int32 | VariableType::Int64 => Ok(()),
            other => Err(CompileError::type_mismatch(format!("offset of type {:?}", other))),
        }
    }

    fn unique_global_name(&self, name: &str) -> &'arena str {
        let taken = |candidate: &str| self.module.globals.iter().any(|g| g.name == candidate);
        if !taken(name) {
            return self.session.intern_str(name);
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}.{}", name, suffix);
            if !taken(&candidate) {
                return self.session.intern_str(&candidate);
            }
            suffix += 1;
        }
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
        let name = self.unique_global_name(name);
        let index = self.module.globals.len();
        self.module.globals.push(IrGlobal {
            name,
            element_type: ty,
            initial: initial.to_vec(),
            constant,
        });
        log::trace!("Declared global @{} ({} x {:?})", name, initial.len(), ty);
        Ok(self.new_value(pointer, ValueDef::Global(index)))
    }

    fn alloca_in_entry(&mut self, ty: VariableType) -> CompileResult<ValueRef> {
        let pointer = ty
            .pointer_to()
            .ok_or_else(|| CompileError::type_mismatch(format!("cannot allocate {:?}", ty)))?;
        let dest = self.instruction_value(pointer)?;
        let entry = self
            .function_mut()?
            .blocks
            .first_mut()
            .ok_or_else(|| CompileError::emitter("function has no entry block"))?;
        entry.instructions.insert(0, Instruction::Alloca { dest, ty });
        Ok(dest)
    }

    /// Link surviving regions and close the final block.
    fn seal_function(&mut self) -> CompileResult<()> {
        let state = self.state()?;
        let live: Vec<RegionState> = state.regions.iter().filter(|r| !r.absorbed).copied().collect();
        let fallback = state.current_block;

        for pair in live.windows(2) {
            let end = self.block_mut(pair[0].end)?;
            if end.terminator.is_none() {
                end.terminator = Some(Terminator::Branch(pair[1].start));
            }
        }

        let last = live.last().map(|r| r.end).or(fallback);
        let function = self.function_mut()?;
        let returns_void = function.return_type == VariableType::Void;
        if let Some(last) = last {
            let block = &mut function.blocks[last.0 as usize];
            if block.terminator.is_none() && returns_void {
                block.terminator = Some(Terminator::Return(None));
            }
        }
        if let Some(open) = function.blocks.iter().find(|block| block.terminator.is_none()) {
            return Err(CompileError::emitter(format!(
                "block '{}' of function '{}' has no terminator",
                open.label, function.name
            )));
        }
        Ok(())
    }
}

impl Emitter for IrModuleEmitter<'_, '_> {
    fn module_name(&self) -> &str {
        self.module.name
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
        let declared = IrStruct {
            name: self.session.intern_str(name),
            fields: fields
                .iter()
                .map(|(field, ty)| (self.session.intern_str(field), *ty))
                .collect(),
            in_header: false,
        };
        self.module.structs.push(declared);
        Ok(StructRef((self.module.structs.len() - 1) as u32))
    }

    fn get_struct(&self, name: &str) -> Option<StructRef> {
        self.module
            .structs
            .iter()
            .position(|s| s.name == name)
            .map(|index| StructRef(index as u32))
    }

    fn include_type_in_header(&mut self, ty: StructRef) -> CompileResult<()> {
        let declared = self
            .module
            .structs
            .get_mut(ty.0 as usize)
            .ok_or_else(|| CompileError::emitter(format!("unknown struct {}", ty.0)))?;
        declared.in_header = true;
        Ok(())
    }

    fn add_preprocessor_definition(&mut self, name: &str, value: &str) {
        let definitions = &mut self.module.preprocessor_definitions;
        match definitions.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => definitions.push((name.to_string(), value.to_string())),
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
            return Err(CompileError::emitter(format!(
                "function '{}' is still open",
                self.module.functions[state.index].name
            )));
        }
        if self.module.function(name).is_some() {
            return Err(CompileError::emitter(format!("function '{}' already defined", name)));
        }

        let index = self.module.functions.len();
        let arguments = params
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| self.new_value(*ty, ValueDef::Argument { function: index, index: i }))
            .collect();
        self.module.functions.push(IrFunction {
            name: self.session.intern_str(name),
            return_type,
            params: params
                .iter()
                .map(|(param, ty)| (self.session.intern_str(param), *ty))
                .collect(),
            arguments,
            blocks: vec![IrBlock::new(self.session.intern_str("entry"))],
            in_header: false,
            predict: false,
        });
        self.state = Some(FunctionState {
            index,
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
        let function = self.function()?;
        let (name, blocks) = (function.name, function.blocks.len());
        self.session.record_function_emitted(name, blocks);
        self.state = None;
        log::debug!("End function {} ({} blocks)", name, blocks);
        Ok(())
    }

    fn include_in_header(&mut self) -> CompileResult<()> {
        self.function_mut()?.in_header = true;
        Ok(())
    }

    fn include_in_predict_interface(&mut self) -> CompileResult<()> {
        self.function_mut()?.predict = true;
        Ok(())
    }

    fn argument(&self, index: usize) -> CompileResult<ValueRef> {
        let function = self.function()?;
        function.arguments.get(index).copied().ok_or_else(|| {
            CompileError::emitter(format!("function '{}' has no argument {}", function.name, index))
        })
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
                let value = self.alloca_in_entry(variable.element_type())?;
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
        self.check_type(value, expected)?;
        self.state_mut()?.variables.insert(variable.id(), value);
        Ok(())
    }

    fn is_pointer(&self, value: ValueRef) -> bool {
        self.module
            .value_info(value)
            .map(|info| info.ty.is_pointer())
            .unwrap_or(false)
    }

    fn literal(&mut self, value: Literal) -> CompileResult<ValueRef> {
        let dest = self.instruction_value(value.value_type())?;
        self.push(Instruction::Literal { dest, value })?;
        Ok(dest)
    }

    fn load(&mut self, pointer: ValueRef) -> CompileResult<ValueRef> {
        let ty = self.scalar_pointee_of(pointer)?;
        let dest = self.instruction_value(ty)?;
        self.push(Instruction::Load { dest, pointer })?;
        Ok(dest)
    }

    fn store(&mut self, pointer: ValueRef, value: ValueRef) -> CompileResult<()> {
        let ty = self.scalar_pointee_of(pointer)?;
        self.check_type(value, ty)?;
        self.push(Instruction::Store { pointer, value })
    }

    fn value_at(&mut self, pointer: ValueRef, offset: ValueRef) -> CompileResult<ValueRef> {
        let ty = self.scalar_pointee_of(pointer)?;
        self.check_offset(offset)?;
        let dest = self.instruction_value(ty)?;
        self.push(Instruction::ValueAt { dest, pointer, offset })?;
        Ok(dest)
    }

    fn set_value_at(&mut self, pointer: ValueRef, offset: ValueRef, value: ValueRef) -> CompileResult<()> {
        let ty = self.scalar_pointee_of(pointer)?;
        self.check_offset(offset)?;
        self.check_type(value, ty)?;
        self.push(Instruction::SetValueAt { pointer, offset, value })
    }

    fn field_pointer(&mut self, pointer: ValueRef, field: usize) -> CompileResult<ValueRef> {
        let VariableType::Struct(s) = self.pointee_of(pointer)? else {
            return Err(CompileError::type_mismatch(format!("value {} does not point to a struct", pointer.0)));
        };
        let field_type = self
            .module
            .struct_type(s)
            .and_then(|declared| declared.fields.get(field))
            .map(|(_, ty)| *ty)
            .ok_or_else(|| CompileError::emitter(format!("struct {} has no field {}", s.0, field)))?;
        let pointer_type = field_type
            .pointer_to()
            .ok_or_else(|| CompileError::type_mismatch(format!("field {} cannot be addressed", field)))?;
        let dest = self.instruction_value(pointer_type)?;
        self.push(Instruction::FieldPointer { dest, pointer, field })?;
        Ok(dest)
    }

    fn operator(&mut self, op: BinaryOperator, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef> {
        self.check_visible(lhs)?;
        let ty = self.value_type(lhs)?;
        self.check_type(rhs, ty)?;
        if !matches!(
            ty,
            VariableType::Int32 | VariableType::Int64 | VariableType::Float | VariableType::Double
        ) {
            return Err(CompileError::type_mismatch(format!("cannot {} values of type {:?}", op.name(), ty)));
        }
        let dest = self.instruction_value(ty)?;
        self.push(Instruction::Binary { dest, op, lhs, rhs })?;
        Ok(dest)
    }

    fn compare(&mut self, predicate: ComparisonPredicate, lhs: ValueRef, rhs: ValueRef) -> CompileResult<ValueRef> {
        self.check_visible(lhs)?;
        let ty = self.value_type(lhs)?;
        self.check_type(rhs, ty)?;
        if ty.is_pointer() || matches!(ty, VariableType::Void | VariableType::Struct(_)) {
            return Err(CompileError::type_mismatch(format!("cannot compare values of type {:?}", ty)));
        }
        let dest = self.instruction_value(VariableType::Boolean)?;
        self.push(Instruction::Compare { dest, predicate, lhs, rhs })?;
        Ok(dest)
    }

    fn timestamp(&mut self) -> CompileResult<ValueRef> {
        let dest = self.instruction_value(VariableType::Int64)?;
        self.push(Instruction::Timestamp { dest })?;
        Ok(dest)
    }

    fn print(&mut self, message: &str) -> CompileResult<()> {
        self.push(Instruction::Print { message: message.to_string() })
    }

    fn block(&mut self, label: &str) -> CompileResult<BlockRef> {
        let label = self.session.intern_str(label);
        let function = self.function_mut()?;
        function.blocks.push(IrBlock::new(label));
        Ok(BlockRef((function.blocks.len() - 1) as u32))
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
        self.check_block(block)?;
        self.state_mut()?.current_block = Some(block);
        Ok(())
    }

    fn branch(&mut self, target: BlockRef) -> CompileResult<()> {
        self.check_block(target)?;
        self.terminate(Terminator::Branch(target))
    }

    fn branch_if(&mut self, condition: ValueRef, then_block: BlockRef, else_block: BlockRef) -> CompileResult<()> {
        self.check_type(condition, VariableType::Boolean)?;
        self.check_block(then_block)?;
        self.check_block(else_block)?;
        self.terminate(Terminator::BranchIf { condition, then_block, else_block })
    }

    fn ret(&mut self, value: Option<ValueRef>) -> CompileResult<()> {
        let return_type = self.function()?.return_type;
        match value {
            Some(value) => self.check_type(value, return_type)?,
            None if return_type != VariableType::Void => {
                return Err(CompileError::type_mismatch(format!("missing return value of type {:?}", return_type)));
            }
            None => {}
        }
        self.terminate(Terminator::Return(value))
    }

    fn concatenate_blocks(&mut self, blocks: &[BlockRef]) -> CompileResult<()> {
        for block in blocks {
            self.check_block(*block)?;
        }
        for pair in blocks.windows(2) {
            let current = self.block_mut(pair[0])?;
            if current.terminator.is_none() {
                current.terminator = Some(Terminator::Branch(pair[1]));
            }
        }
        Ok(())
    }

    fn add_region(&mut self, start: BlockRef) -> CompileResult<RegionRef> {
        self.check_block(start)?;
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
        self.check_block(block)?;
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

        let end = self.block_mut(to.end)?;
        if end.terminator.is_none() {
            end.terminator = Some(Terminator::Branch(from.start));
        }
        self.region_mut(dest)?.end = from.end;
        self.region_mut(src)?.absorbed = true;

        let state = self.state_mut()?;
        if state.current_region == Some(src) {
            state.current_region = Some(dest);
        }
        Ok(())
    }
}

impl<'s, 'arena> ModuleBuilder for IrModuleEmitter<'s, 'arena> {
    type Module = IrModule<'arena>;

    fn finish(mut self, device: &TargetDevice) -> CompileResult<IrModule<'arena>> {
        if let Some(state) = &self.state {
            return Err(CompileError::emitter(format!(
                "function '{}' was never finished",
                self.module.functions[state.index].name
            )));
        }
        self.module.triple = device.triple.clone();
        self.module.data_layout = device.data_layout.clone();
        log::debug!(
            "Finished module {} ({} functions, {} globals)",
            self.module.name,
            self.module.functions.len(),
            self.module.globals.len()
        );
        Ok(self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_instruction_type_checks() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("test", &session);

        assert!(matches!(emitter.literal(Literal::Int32(1)), Err(CompileError::Emitter { .. })));

        emitter
            .begin_function("f", VariableType::Int32, &[("p", VariableType::DoublePointer)])
            .unwrap();
        let p = emitter.argument(0).unwrap();
        let one = emitter.literal(Literal::Int32(1)).unwrap();
        let half = emitter.literal(Literal::Double(0.5)).unwrap();

        assert!(emitter.is_pointer(p));
        assert!(!emitter.is_pointer(one));
        assert!(matches!(emitter.store(p, one), Err(CompileError::TypeMismatch { .. })));
        assert!(matches!(emitter.load(one), Err(CompileError::TypeMismatch { .. })));
        assert!(matches!(
            emitter.operator(BinaryOperator::Add, one, half),
            Err(CompileError::TypeMismatch { .. })
        ));
        emitter.store(p, half).unwrap();
        assert!(emitter.ret(None).is_err());
        emitter.ret(Some(one)).unwrap();
        assert!(emitter.literal(Literal::Int32(2)).is_err());
        emitter.end_function().unwrap();

        let module = emitter.finish(&TargetDevice::default()).unwrap();
        assert_eq!(module.triple(), "x86_64-pc-linux-gnu");
        assert_eq!(module.function("f").unwrap().blocks().len(), 1);
    }

    #[test]
    fn test_regions_link_in_creation_order() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("test", &session);
        emitter.begin_function("f", VariableType::Void, &[]).unwrap();

        let entry = emitter.current_block().unwrap();
        let r0 = emitter.add_region(entry).unwrap();
        let a = emitter.begin_block("a").unwrap();
        let r1 = emitter.add_region(a).unwrap();
        assert_ne!(r0, r1);
        let b = emitter.begin_block("b").unwrap();
        let r2 = emitter.add_region(b).unwrap();

        emitter.concat_regions(r0, r2).unwrap();
        assert_eq!(emitter.current_region(), Some(r0));
        assert_eq!(emitter.region_end(r0).unwrap(), b);
        assert!(emitter.concat_regions(r0, r2).is_err());
        emitter.end_function().unwrap();

        let module = emitter.finish(&TargetDevice::default()).unwrap();
        let f = module.function("f").unwrap();
        // entry -> b (merge), b -> a (region order), a returns.
        assert_eq!(f.block(entry).unwrap().terminator(), Some(&Terminator::Branch(b)));
        assert_eq!(f.block(b).unwrap().terminator(), Some(&Terminator::Branch(a)));
        assert_eq!(f.block(a).unwrap().terminator(), Some(&Terminator::Return(None)));
    }

    #[test]
    fn test_locals_live_in_entry_block() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("test", &session);
        emitter.begin_function("f", VariableType::Void, &[]).unwrap();
        let later = emitter.block("later").unwrap();
        emitter.branch(later).unwrap();
        emitter.set_current_block(later).unwrap();

        let mut local = Variable::local_scalar("t", VariableType::Int64);
        local.id = VarId(3);
        let first = emitter.ensure_emitted(&local).unwrap();
        assert_eq!(emitter.ensure_emitted(&local).unwrap(), first);
        emitter.end_function().unwrap();

        let module = emitter.finish(&TargetDevice::default()).unwrap();
        let entry = &module.function("f").unwrap().blocks()[0];
        assert!(matches!(entry.instructions()[0], Instruction::Alloca { ty: VariableType::Int64, .. }));
    }
}
