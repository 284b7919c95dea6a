// This module defines the built-in block IR that the map compiler targets when the LLVM
// backend is not enabled. An IrModule holds struct types, module globals, preprocessor
// definitions and functions; a function is a list of labelled blocks, each a run of
// instructions closed by one terminator. Values are numbered module-wide so that globals
// can be referenced from any function; every value records its type and whether it is a
// function argument, a global address, or an instruction result. Labels and names are
// interned in the compilation session arena and borrowed for the module's lifetime.
// The module prints as text through Display, renders a C header through write_header,
// and can be executed by the Interpreter.

//! Built-in block IR backend.

pub mod emitter;
pub mod header;
pub mod interpreter;

pub use emitter::IrModuleEmitter;
pub use header::{write_header, HeaderDeclarations};
pub use interpreter::{ExecutionError, Interpreter, RtValue};

use crate::core::{BinaryOperator, BlockRef, ComparisonPredicate, Literal, StructRef, ValueRef, VariableType};
use std::fmt;

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    Argument { function: usize, index: usize },
    Global(usize),
    Instruction { function: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub ty: VariableType,
    pub def: ValueDef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Literal { dest: ValueRef, value: Literal },
    /// One element of function-local memory.
    Alloca { dest: ValueRef, ty: VariableType },
    Load { dest: ValueRef, pointer: ValueRef },
    Store { pointer: ValueRef, value: ValueRef },
    ValueAt { dest: ValueRef, pointer: ValueRef, offset: ValueRef },
    SetValueAt { pointer: ValueRef, offset: ValueRef, value: ValueRef },
    FieldPointer { dest: ValueRef, pointer: ValueRef, field: usize },
    Binary { dest: ValueRef, op: BinaryOperator, lhs: ValueRef, rhs: ValueRef },
    Compare { dest: ValueRef, predicate: ComparisonPredicate, lhs: ValueRef, rhs: ValueRef },
    Timestamp { dest: ValueRef },
    Print { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Branch(BlockRef),
    BranchIf { condition: ValueRef, then_block: BlockRef, else_block: BlockRef },
    Return(Option<ValueRef>),
}

#[derive(Debug, Clone)]
pub struct IrBlock<'a> {
    label: &'a str,
    instructions: Vec<Instruction>,
    terminator: Option<Terminator>,
}

impl<'a> IrBlock<'a> {
    fn new(label: &'a str) -> Self {
        Self { label, instructions: Vec::new(), terminator: None }
    }

    pub fn label(&self) -> &'a str {
        self.label
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn terminator(&self) -> Option<&Terminator> {
        self.terminator.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction<'a> {
    name: &'a str,
    return_type: VariableType,
    params: Vec<(&'a str, VariableType)>,
    arguments: Vec<ValueRef>,
    blocks: Vec<IrBlock<'a>>,
    in_header: bool,
    predict: bool,
}

impl<'a> IrFunction<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn return_type(&self) -> VariableType {
        self.return_type
    }

    pub fn params(&self) -> &[(&'a str, VariableType)] {
        &self.params
    }

    pub fn arguments(&self) -> &[ValueRef] {
        &self.arguments
    }

    pub fn blocks(&self) -> &[IrBlock<'a>] {
        &self.blocks
    }

    pub fn block(&self, block: BlockRef) -> Option<&IrBlock<'a>> {
        self.blocks.get(block.0 as usize)
    }

    pub fn is_in_header(&self) -> bool {
        self.in_header
    }

    pub fn is_predict(&self) -> bool {
        self.predict
    }
}

#[derive(Debug, Clone)]
pub struct IrStruct<'a> {
    name: &'a str,
    fields: Vec<(&'a str, VariableType)>,
    in_header: bool,
}

impl<'a> IrStruct<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn fields(&self) -> &[(&'a str, VariableType)] {
        &self.fields
    }

    pub fn is_in_header(&self) -> bool {
        self.in_header
    }
}

#[derive(Debug, Clone)]
pub struct IrGlobal<'a> {
    name: &'a str,
    element_type: VariableType,
    initial: Vec<Literal>,
    constant: bool,
}

impl<'a> IrGlobal<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn element_type(&self) -> VariableType {
        self.element_type
    }

    pub fn initial(&self) -> &[Literal] {
        &self.initial
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }
}

/// A finished module of the built-in IR.
#[derive(Debug, Clone)]
pub struct IrModule<'a> {
    name: &'a str,
    triple: String,
    data_layout: String,
    preprocessor_definitions: Vec<(String, String)>,
    structs: Vec<IrStruct<'a>>,
    globals: Vec<IrGlobal<'a>>,
    functions: Vec<IrFunction<'a>>,
    values: Vec<ValueInfo>,
}

impl<'a> IrModule<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            triple: String::new(),
            data_layout: String::new(),
            preprocessor_definitions: Vec::new(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    pub fn data_layout(&self) -> &str {
        &self.data_layout
    }

    pub fn preprocessor_definitions(&self) -> &[(String, String)] {
        &self.preprocessor_definitions
    }

    pub fn structs(&self) -> &[IrStruct<'a>] {
        &self.structs
    }

    pub fn struct_type(&self, ty: StructRef) -> Option<&IrStruct<'a>> {
        self.structs.get(ty.0 as usize)
    }

    pub fn globals(&self) -> &[IrGlobal<'a>] {
        &self.globals
    }

    pub fn functions(&self) -> &[IrFunction<'a>] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction<'a>> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// The function tagged as the predict entry point.
    pub fn predict_function(&self) -> Option<&IrFunction<'a>> {
        self.functions.iter().find(|function| function.predict)
    }

    pub fn value_info(&self, value: ValueRef) -> Option<ValueInfo> {
        self.values.get(value.0 as usize).copied()
    }

    /// Text rendering of the header declarations.
    pub fn header(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_header(self, &mut out);
        out
    }

    fn type_name(&self, ty: VariableType) -> String {
        match ty {
            VariableType::Void => "void".to_string(),
            VariableType::Boolean => "i1".to_string(),
            VariableType::Int32 => "i32".to_string(),
            VariableType::Int64 => "i64".to_string(),
            VariableType::Float => "float".to_string(),
            VariableType::Double => "double".to_string(),
            VariableType::Struct(s) => format!("%{}", self.struct_name(s)),
            pointer => match pointer.pointee() {
                Some(pointee) => format!("{}*", self.type_name(pointee)),
                None => "?".to_string(),
            },
        }
    }

    fn struct_name(&self, ty: StructRef) -> &str {
        self.struct_type(ty).map(|s| s.name).unwrap_or("?")
    }

    fn value_name(&self, value: ValueRef) -> String {
        match self.value_info(value).map(|info| info.def) {
            Some(ValueDef::Argument { function, index }) => self
                .functions
                .get(function)
                .and_then(|f| f.params.get(index))
                .map(|(name, _)| format!("%{}", name))
                .unwrap_or_else(|| format!("%{}", value.0)),
            Some(ValueDef::Global(index)) => self
                .globals
                .get(index)
                .map(|g| format!("@{}", g.name))
                .unwrap_or_else(|| format!("@{}", value.0)),
            _ => format!("%{}", value.0),
        }
    }

    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, instruction: &Instruction) -> fmt::Result {
        let v = |value: &ValueRef| self.value_name(*value);
        let ty = |value: &ValueRef| {
            self.value_info(*value)
                .map(|info| self.type_name(info.ty))
                .unwrap_or_else(|| "?".to_string())
        };
        match instruction {
            Instruction::Literal { dest, value } => write!(f, "{} = {} {}", v(dest), ty(dest), value),
            Instruction::Alloca { dest, ty: elem } => write!(f, "{} = alloca {}", v(dest), self.type_name(*elem)),
            Instruction::Load { dest, pointer } => write!(f, "{} = load {} {}", v(dest), ty(pointer), v(pointer)),
            Instruction::Store { pointer, value } => {
                write!(f, "store {} {}, {} {}", ty(value), v(value), ty(pointer), v(pointer))
            }
            Instruction::ValueAt { dest, pointer, offset } => {
                write!(f, "{} = load {} {}[{}]", v(dest), ty(pointer), v(pointer), v(offset))
            }
            Instruction::SetValueAt { pointer, offset, value } => {
                write!(f, "store {} {}, {} {}[{}]", ty(value), v(value), ty(pointer), v(pointer), v(offset))
            }
            Instruction::FieldPointer { dest, pointer, field } => {
                write!(f, "{} = field {} {}, {}", v(dest), ty(pointer), v(pointer), field)
            }
            Instruction::Binary { dest, op, lhs, rhs } => {
                write!(f, "{} = {} {} {}, {}", v(dest), op.name(), ty(lhs), v(lhs), v(rhs))
            }
            Instruction::Compare { dest, predicate, lhs, rhs } => {
                write!(f, "{} = cmp {} {} {}, {}", v(dest), predicate.name(), ty(lhs), v(lhs), v(rhs))
            }
            Instruction::Timestamp { dest } => write!(f, "{} = timestamp", v(dest)),
            Instruction::Print { message } => write!(f, "print {:?}", message),
        }
    }

    fn write_terminator(&self, f: &mut fmt::Formatter<'_>, function: &IrFunction<'_>, terminator: &Terminator) -> fmt::Result {
        let label = |block: &BlockRef| function.block(*block).map(|b| b.label).unwrap_or("?");
        match terminator {
            Terminator::Branch(target) => write!(f, "br {}", label(target)),
            Terminator::BranchIf { condition, then_block, else_block } => write!(
                f,
                "br {}, {}, {}",
                self.value_name(*condition),
                label(then_block),
                label(else_block)
            ),
            Terminator::Return(Some(value)) => write!(f, "ret {}", self.value_name(*value)),
            Terminator::Return(None) => write!(f, "ret void"),
        }
    }
}

impl fmt::Display for IrModule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        writeln!(f, "target triple = {:?}", self.triple)?;
        writeln!(f, "target datalayout = {:?}", self.data_layout)?;

        for (name, value) in &self.preprocessor_definitions {
            writeln!(f, "#define {} {}", name, value)?;
        }

        for s in &self.structs {
            let fields: Vec<String> = s
                .fields
                .iter()
                .map(|(name, ty)| format!("{} {}", self.type_name(*ty), name))
                .collect();
            write!(f, "\n%{} = type {{ {} }}", s.name, fields.join(", "))?;
            if s.in_header {
                write!(f, " ; header")?;
            }
        }
        if !self.structs.is_empty() {
            writeln!(f)?;
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for g in &self.globals {
            let values: Vec<String> = g.initial.iter().map(|l| l.to_string()).collect();
            writeln!(
                f,
                "@{} = {} [{} x {}] [{}]",
                g.name,
                if g.constant { "constant" } else { "global" },
                g.initial.len(),
                self.type_name(g.element_type),
                values.join(", ")
            )?;
        }

        for function in &self.functions {
            let params: Vec<String> = function
                .params
                .iter()
                .map(|(name, ty)| format!("{} %{}", self.type_name(*ty), name))
                .collect();
            write!(
                f,
                "\ndefine {} @{}({})",
                self.type_name(function.return_type),
                function.name,
                params.join(", ")
            )?;
            if function.predict {
                write!(f, " predict")?;
            }
            if function.in_header {
                write!(f, " header")?;
            }
            writeln!(f, " {{")?;
            for block in &function.blocks {
                writeln!(f, "{}:", block.label)?;
                for instruction in &block.instructions {
                    write!(f, "  ")?;
                    self.write_instruction(f, instruction)?;
                    writeln!(f)?;
                }
                match &block.terminator {
                    Some(terminator) => {
                        write!(f, "  ")?;
                        self.write_terminator(f, function, terminator)?;
                        writeln!(f)?;
                    }
                    None => writeln!(f, "  ; no terminator")?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
