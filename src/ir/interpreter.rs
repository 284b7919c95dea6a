// This module implements a reference interpreter for the built-in IR. Memory is a list of
// allocations, each a vector of runtime values; pointers are (allocation, offset) pairs,
// structs are laid out as one slot per field, and every access is bounds-checked. Module
// globals are allocated once when the interpreter is created and keep their values
// across calls, which is what lets profiling counters accumulate. Function-local memory
// is released when the outermost call returns. The timestamp instruction yields the
// number of instructions executed so far, so timing results are deterministic.
//
// The interpreter is how generated code is checked end to end: CompiledMap::predict runs
// the predict function over host-provided input and returns the output as f64 values.

//! Reference interpreter for the built-in IR.

use super::{Instruction, IrFunction, IrModule, Terminator, ValueDef};
use crate::compiler::CompiledMap;
use crate::core::{BinaryOperator, ComparisonPredicate, Literal, ValueRef, VariableType};
use crate::model::{DynamicMap, ElementKind, PortType, TensorShape};
use hashbrown::HashMap;
use thiserror::Error;

/// Default bound on executed instructions per call.
const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{function}' takes {expected} arguments, {found} given")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Value %{value} used before definition")]
    UndefinedValue { value: u32 },

    #[error("Type mismatch: {reason}")]
    TypeMismatch { reason: String },

    #[error("Invalid memory access: {reason}")]
    InvalidAccess { reason: String },

    #[error("Block '{block}' has no terminator")]
    MissingTerminator { block: String },

    #[error("Step limit of {limit} instructions exceeded")]
    StepLimit { limit: u64 },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl ExecutionError {
    fn type_mismatch(reason: impl Into<String>) -> Self {
        ExecutionError::TypeMismatch { reason: reason.into() }
    }

    fn invalid_access(reason: impl Into<String>) -> Self {
        ExecutionError::InvalidAccess { reason: reason.into() }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RtValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Pointer { allocation: usize, offset: usize },
}

impl RtValue {
    pub fn from_literal(literal: Literal) -> Self {
        match literal {
            Literal::Boolean(v) => RtValue::Bool(v),
            Literal::Int32(v) => RtValue::I32(v),
            Literal::Int64(v) => RtValue::I64(v),
            Literal::Float(v) => RtValue::F32(v),
            Literal::Double(v) => RtValue::F64(v),
        }
    }

    /// Convert a host number into a scalar of type `ty`.
    pub fn from_f64(ty: VariableType, value: f64) -> ExecutionResult<Self> {
        Literal::from_f64(ty, value)
            .map(RtValue::from_literal)
            .ok_or_else(|| ExecutionError::type_mismatch(format!("no scalar of type {:?}", ty)))
    }

    pub fn as_f64(self) -> ExecutionResult<f64> {
        match self {
            RtValue::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
            RtValue::I32(v) => Ok(v as f64),
            RtValue::I64(v) => Ok(v as f64),
            RtValue::F32(v) => Ok(v as f64),
            RtValue::F64(v) => Ok(v),
            RtValue::Pointer { .. } => Err(ExecutionError::type_mismatch("pointer used as a number")),
        }
    }

    fn zero(ty: VariableType) -> ExecutionResult<Self> {
        Literal::zero(ty)
            .map(RtValue::from_literal)
            .ok_or_else(|| ExecutionError::type_mismatch(format!("no zero value for {:?}", ty)))
    }

    fn matches(self, ty: VariableType) -> bool {
        matches!(
            (self, ty),
            (RtValue::Bool(_), VariableType::Boolean)
                | (RtValue::I32(_), VariableType::Int32)
                | (RtValue::I64(_), VariableType::Int64)
                | (RtValue::F32(_), VariableType::Float)
                | (RtValue::F64(_), VariableType::Double)
        ) || (matches!(self, RtValue::Pointer { .. }) && ty.is_pointer())
    }

    fn as_offset(self) -> ExecutionResult<usize> {
        let offset = match self {
            RtValue::I32(v) => v as i64,
            RtValue::I64(v) => v,
            other => return Err(ExecutionError::type_mismatch(format!("offset {:?}", other))),
        };
        usize::try_from(offset).map_err(|_| ExecutionError::invalid_access(format!("negative offset {}", offset)))
    }
}

fn binary(op: BinaryOperator, lhs: RtValue, rhs: RtValue) -> ExecutionResult<RtValue> {
    use BinaryOperator::*;
    Ok(match (lhs, rhs) {
        (RtValue::I32(a), RtValue::I32(b)) => RtValue::I32(match op {
            Add => a.wrapping_add(b),
            Subtract => a.wrapping_sub(b),
            Multiply => a.wrapping_mul(b),
        }),
        (RtValue::I64(a), RtValue::I64(b)) => RtValue::I64(match op {
            Add => a.wrapping_add(b),
            Subtract => a.wrapping_sub(b),
            Multiply => a.wrapping_mul(b),
        }),
        (RtValue::F32(a), RtValue::F32(b)) => RtValue::F32(match op {
            Add => a + b,
            Subtract => a - b,
            Multiply => a * b,
        }),
        (RtValue::F64(a), RtValue::F64(b)) => RtValue::F64(match op {
            Add => a + b,
            Subtract => a - b,
            Multiply => a * b,
        }),
        (a, b) => return Err(ExecutionError::type_mismatch(format!("{} {:?}, {:?}", op.name(), a, b))),
    })
}

fn compare(predicate: ComparisonPredicate, lhs: RtValue, rhs: RtValue) -> ExecutionResult<RtValue> {
    use std::cmp::Ordering;
    let ordering = match (lhs, rhs) {
        (RtValue::Bool(a), RtValue::Bool(b)) => a.partial_cmp(&b),
        (RtValue::I32(a), RtValue::I32(b)) => a.partial_cmp(&b),
        (RtValue::I64(a), RtValue::I64(b)) => a.partial_cmp(&b),
        (RtValue::F32(a), RtValue::F32(b)) => a.partial_cmp(&b),
        (RtValue::F64(a), RtValue::F64(b)) => a.partial_cmp(&b),
        (a, b) => return Err(ExecutionError::type_mismatch(format!("compare {:?}, {:?}", a, b))),
    };
    let result = match predicate {
        ComparisonPredicate::Equal => ordering == Some(Ordering::Equal),
        ComparisonPredicate::NotEqual => ordering != Some(Ordering::Equal),
        ComparisonPredicate::Less => ordering == Some(Ordering::Less),
        ComparisonPredicate::Greater => ordering == Some(Ordering::Greater),
    };
    Ok(RtValue::Bool(result))
}

pub struct Interpreter<'m, 'a> {
    module: &'m IrModule<'a>,
    memory: Vec<Vec<RtValue>>,
    globals: Vec<usize>,
    steps: u64,
    step_limit: u64,
    printed: Vec<String>,
}

impl<'m, 'a> Interpreter<'m, 'a> {
    pub fn new(module: &'m IrModule<'a>) -> Self {
        let mut memory = Vec::with_capacity(module.globals().len());
        let mut globals = Vec::with_capacity(module.globals().len());
        for global in module.globals() {
            globals.push(memory.len());
            memory.push(global.initial().iter().map(|l| RtValue::from_literal(*l)).collect());
        }
        Self {
            module,
            memory,
            globals,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            printed: Vec::new(),
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Messages written by print instructions.
    pub fn printed(&self) -> &[String] {
        &self.printed
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Host-allocated memory initialized with `values`.
    pub fn alloc_values(&mut self, values: Vec<RtValue>) -> RtValue {
        self.memory.push(values);
        RtValue::Pointer { allocation: self.memory.len() - 1, offset: 0 }
    }

    pub fn read_values(&self, pointer: RtValue, count: usize) -> ExecutionResult<Vec<RtValue>> {
        (0..count).map(|i| self.read(pointer, i)).collect()
    }

    /// Current contents of a module global.
    pub fn global_values(&self, name: &str) -> Option<&[RtValue]> {
        let index = self.module.globals().iter().position(|g| g.name() == name)?;
        self.memory.get(self.globals[index]).map(|values| values.as_slice())
    }

    fn slot(&self, pointer: RtValue, index: usize) -> ExecutionResult<(usize, usize)> {
        let RtValue::Pointer { allocation, offset } = pointer else {
            return Err(ExecutionError::type_mismatch(format!("{:?} is not a pointer", pointer)));
        };
        let len = self
            .memory
            .get(allocation)
            .map(|values| values.len())
            .ok_or_else(|| ExecutionError::invalid_access(format!("allocation {} does not exist", allocation)))?;
        let position = offset + index;
        if position >= len {
            return Err(ExecutionError::invalid_access(format!(
                "offset {} past the end of allocation {} ({} elements)",
                position, allocation, len
            )));
        }
        Ok((allocation, position))
    }

    fn read(&self, pointer: RtValue, index: usize) -> ExecutionResult<RtValue> {
        let (allocation, position) = self.slot(pointer, index)?;
        Ok(self.memory[allocation][position])
    }

    fn write(&mut self, pointer: RtValue, index: usize, value: RtValue) -> ExecutionResult<()> {
        let (allocation, position) = self.slot(pointer, index)?;
        self.memory[allocation][position] = value;
        Ok(())
    }

    /// Call a function by name.
    pub fn call(&mut self, name: &str, args: &[RtValue]) -> ExecutionResult<Option<RtValue>> {
        let function = self
            .module
            .function(name)
            .ok_or_else(|| ExecutionError::UnknownFunction { name: name.to_string() })?;
        if function.params().len() != args.len() {
            return Err(ExecutionError::ArgumentCount {
                function: name.to_string(),
                expected: function.params().len(),
                found: args.len(),
            });
        }
        for ((param, ty), arg) in function.params().iter().zip(args) {
            if !arg.matches(*ty) {
                return Err(ExecutionError::type_mismatch(format!(
                    "argument '{}' of '{}' expects {:?}, got {:?}",
                    param, name, ty, arg
                )));
            }
        }

        let mark = self.memory.len();
        self.steps = 0;
        let result = self.execute(function, args);
        self.memory.truncate(mark);
        log::trace!("Call {} finished after {} steps", name, self.steps);
        result
    }

    fn execute(&mut self, function: &IrFunction<'_>, args: &[RtValue]) -> ExecutionResult<Option<RtValue>> {
        let mut frame: HashMap<ValueRef, RtValue> = HashMap::new();
        for (value, arg) in function.arguments().iter().zip(args) {
            frame.insert(*value, *arg);
        }

        let mut current = 0usize;
        loop {
            let block = function
                .blocks()
                .get(current)
                .ok_or_else(|| ExecutionError::invalid_access(format!("block {} does not exist", current)))?;

            for instruction in block.instructions() {
                self.step()?;
                self.execute_instruction(&mut frame, instruction)?;
            }

            self.step()?;
            match block.terminator() {
                Some(Terminator::Branch(target)) => current = target.0 as usize,
                Some(Terminator::BranchIf { condition, then_block, else_block }) => {
                    current = match self.value(&frame, *condition)? {
                        RtValue::Bool(true) => then_block.0 as usize,
                        RtValue::Bool(false) => else_block.0 as usize,
                        other => return Err(ExecutionError::type_mismatch(format!("branch on {:?}", other))),
                    };
                }
                Some(Terminator::Return(value)) => {
                    return match value {
                        Some(value) => self.value(&frame, *value).map(Some),
                        None => Ok(None),
                    };
                }
                None => {
                    return Err(ExecutionError::MissingTerminator { block: block.label().to_string() });
                }
            }
        }
    }

    fn step(&mut self) -> ExecutionResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(ExecutionError::StepLimit { limit: self.step_limit });
        }
        Ok(())
    }

    fn value(&self, frame: &HashMap<ValueRef, RtValue>, value: ValueRef) -> ExecutionResult<RtValue> {
        match self.module.value_info(value).map(|info| info.def) {
            Some(ValueDef::Global(index)) => Ok(RtValue::Pointer { allocation: self.globals[index], offset: 0 }),
            _ => frame
                .get(&value)
                .copied()
                .ok_or(ExecutionError::UndefinedValue { value: value.0 }),
        }
    }

    fn execute_instruction(&mut self, frame: &mut HashMap<ValueRef, RtValue>, instruction: &Instruction) -> ExecutionResult<()> {
        match instruction {
            Instruction::Literal { dest, value } => {
                frame.insert(*dest, RtValue::from_literal(*value));
            }
            Instruction::Alloca { dest, ty } => {
                let pointer = self.alloc_values(vec![RtValue::zero(*ty)?]);
                frame.insert(*dest, pointer);
            }
            Instruction::Load { dest, pointer } => {
                let pointer = self.value(frame, *pointer)?;
                frame.insert(*dest, self.read(pointer, 0)?);
            }
            Instruction::Store { pointer, value } => {
                let pointer = self.value(frame, *pointer)?;
                let value = self.value(frame, *value)?;
                self.write(pointer, 0, value)?;
            }
            Instruction::ValueAt { dest, pointer, offset } => {
                let pointer = self.value(frame, *pointer)?;
                let offset = self.value(frame, *offset)?.as_offset()?;
                frame.insert(*dest, self.read(pointer, offset)?);
            }
            Instruction::SetValueAt { pointer, offset, value } => {
                let pointer = self.value(frame, *pointer)?;
                let offset = self.value(frame, *offset)?.as_offset()?;
                let value = self.value(frame, *value)?;
                self.write(pointer, offset, value)?;
            }
            Instruction::FieldPointer { dest, pointer, field } => {
                let RtValue::Pointer { allocation, offset } = self.value(frame, *pointer)? else {
                    return Err(ExecutionError::type_mismatch("field of a non-pointer"));
                };
                frame.insert(*dest, RtValue::Pointer { allocation, offset: offset + field });
            }
            Instruction::Binary { dest, op, lhs, rhs } => {
                let result = binary(*op, self.value(frame, *lhs)?, self.value(frame, *rhs)?)?;
                frame.insert(*dest, result);
            }
            Instruction::Compare { dest, predicate, lhs, rhs } => {
                let result = compare(*predicate, self.value(frame, *lhs)?, self.value(frame, *rhs)?)?;
                frame.insert(*dest, result);
            }
            Instruction::Timestamp { dest } => {
                frame.insert(*dest, RtValue::I64(self.steps as i64));
            }
            Instruction::Print { message } => {
                log::info!("{}", message);
                self.printed.push(message.clone());
            }
        }
        Ok(())
    }

    /// Run the predict function of `map` over `input`.
    pub fn predict(&mut self, function: &str, map: &DynamicMap, input: &[f64]) -> ExecutionResult<Vec<f64>> {
        if input.len() != map.input_size() {
            return Err(ExecutionError::InvalidInput {
                reason: format!("expected {} input values, got {}", map.input_size(), input.len()),
            });
        }
        let input_type = scalar_type(map.input_type())?;
        let output_type = scalar_type(map.output_type())?;

        let values = input
            .iter()
            .map(|value| RtValue::from_f64(input_type, *value))
            .collect::<ExecutionResult<Vec<_>>>()?;
        let mark = self.memory.len();
        let input_pointer = self.alloc_values(values);
        let output_pointer = self.alloc_values(vec![RtValue::zero(output_type)?; map.output_size()]);

        let result = self
            .call(function, &[input_pointer, output_pointer])
            .and_then(|_| self.read_values(output_pointer, map.output_size()))
            .and_then(|values| values.into_iter().map(RtValue::as_f64).collect());
        self.memory.truncate(mark);
        result
    }

    /// Call a shape accessor and return the shape it writes.
    pub fn shape(&mut self, function: &str, index: i32) -> ExecutionResult<TensorShape> {
        let mark = self.memory.len();
        let record = self.alloc_values(vec![RtValue::I32(-1); 3]);
        let result = self
            .call(function, &[RtValue::I32(index), record])
            .and_then(|_| self.read_values(record, 3));
        self.memory.truncate(mark);

        let dimension = |value: RtValue| match value {
            RtValue::I32(v) => usize::try_from(v).map_err(|_| ExecutionError::type_mismatch(format!("negative dimension {}", v))),
            other => Err(ExecutionError::type_mismatch(format!("dimension {:?}", other))),
        };
        let values = result?;
        Ok(TensorShape::new(dimension(values[0])?, dimension(values[1])?, dimension(values[2])?))
    }

    /// Call a function taking no arguments and returning an integer.
    pub fn call_int(&mut self, function: &str, args: &[RtValue]) -> ExecutionResult<i64> {
        match self.call(function, args)? {
            Some(RtValue::I32(v)) => Ok(v as i64),
            Some(RtValue::I64(v)) => Ok(v),
            other => Err(ExecutionError::type_mismatch(format!("'{}' returned {:?}", function, other))),
        }
    }
}

fn scalar_type(port_type: PortType) -> ExecutionResult<VariableType> {
    ElementKind::try_from(port_type)
        .map(ElementKind::variable_type)
        .map_err(|error| ExecutionError::InvalidInput { reason: error.to_string() })
}

impl<'a> CompiledMap<IrModule<'a>> {
    /// An interpreter over the compiled module.
    pub fn interpreter(&self) -> Interpreter<'_, 'a> {
        Interpreter::new(self.module())
    }

    /// Run the predict function once on a fresh interpreter.
    pub fn predict(&self, input: &[f64]) -> ExecutionResult<Vec<f64>> {
        self.interpreter().predict(self.function_name(), self.map(), input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(
            binary(BinaryOperator::Add, RtValue::I32(i32::MAX), RtValue::I32(1)).unwrap(),
            RtValue::I32(i32::MIN)
        );
        assert_eq!(
            binary(BinaryOperator::Multiply, RtValue::F64(1.5), RtValue::F64(2.0)).unwrap(),
            RtValue::F64(3.0)
        );
        assert!(binary(BinaryOperator::Subtract, RtValue::I32(1), RtValue::I64(1)).is_err());
        assert_eq!(
            compare(ComparisonPredicate::Less, RtValue::I64(-2), RtValue::I64(3)).unwrap(),
            RtValue::Bool(true)
        );
        assert_eq!(
            compare(ComparisonPredicate::Equal, RtValue::F32(f32::NAN), RtValue::F32(f32::NAN)).unwrap(),
            RtValue::Bool(false)
        );
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(RtValue::from_f64(VariableType::Int64, 7.9).unwrap(), RtValue::I64(7));
        assert_eq!(RtValue::Bool(true).as_f64().unwrap(), 1.0);
        assert!(RtValue::Pointer { allocation: 0, offset: 0 }.as_f64().is_err());
        assert!(RtValue::I32(-1).as_offset().is_err());
        assert!(RtValue::I32(3).matches(VariableType::Int32));
        assert!(!RtValue::I32(3).matches(VariableType::Int64));
    }
}
