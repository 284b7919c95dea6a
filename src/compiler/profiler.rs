// This module implements the optional profiler. When profiling is enabled the compiler
// declares module globals holding the model call count and accumulated model time, plus
// one call counter and one accumulated time per node of the refined model. Start hooks
// store a timestamp, end hooks add the elapsed ticks and bump the counters. After the
// predict function is finished the profiler emits the accessors that read the counters
// (per-node reads outside the node range give 0)
// and the function that resets them. A disabled profiler turns every hook into a no-op.

//! Model and node profiling instrumentation.

use crate::core::{
    BinaryOperator,
    CompileError,
    CompileResult,
    ComparisonPredicate,
    Emitter,
    Literal,
    ValueRef,
    VariableType,
};
use crate::model::NodeId;

#[derive(Debug, Clone, Copy)]
struct ProfilerGlobals {
    model_calls: ValueRef,
    model_time: ValueRef,
    model_start: ValueRef,
    node_calls: ValueRef,
    node_times: ValueRef,
    node_start: ValueRef,
}

#[derive(Debug, Default)]
pub struct Profiler {
    prefix: String,
    node_count: usize,
    globals: Option<ProfilerGlobals>,
}

impl Profiler {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Declare the profiling globals for a model of `node_count` nodes.
    pub fn new(emitter: &mut dyn Emitter, prefix: &str, node_count: usize) -> CompileResult<Self> {
        let zero = [Literal::Int64(0)];
        let zeros = vec![Literal::Int64(0); node_count.max(1)];
        let globals = ProfilerGlobals {
            model_calls: emitter.global(&format!("{}_ModelCallCount", prefix), VariableType::Int64, &zero)?,
            model_time: emitter.global(&format!("{}_ModelTime", prefix), VariableType::Int64, &zero)?,
            model_start: emitter.global(&format!("{}_ModelStartTime", prefix), VariableType::Int64, &zero)?,
            node_calls: emitter.global(&format!("{}_NodeCallCounts", prefix), VariableType::Int64, &zeros)?,
            node_times: emitter.global(&format!("{}_NodeTimes", prefix), VariableType::Int64, &zeros)?,
            node_start: emitter.global(&format!("{}_NodeStartTime", prefix), VariableType::Int64, &zero)?,
        };
        log::debug!("Profiling enabled for {} nodes", node_count);
        Ok(Self {
            prefix: prefix.to_string(),
            node_count,
            globals: Some(globals),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.globals.is_some()
    }

    pub fn start_model(&self, emitter: &mut dyn Emitter) -> CompileResult<()> {
        let Some(globals) = self.globals else {
            return Ok(());
        };
        let now = emitter.timestamp()?;
        emitter.store(globals.model_start, now)
    }

    pub fn end_model(&self, emitter: &mut dyn Emitter) -> CompileResult<()> {
        let Some(globals) = self.globals else {
            return Ok(());
        };
        let elapsed = elapsed_since(emitter, globals.model_start)?;
        let zero = emitter.literal(Literal::Int32(0))?;
        accumulate(emitter, globals.model_time, zero, elapsed)?;
        let one = emitter.literal(Literal::Int64(1))?;
        accumulate(emitter, globals.model_calls, zero, one)
    }

    pub fn start_node(&self, emitter: &mut dyn Emitter, _node: NodeId) -> CompileResult<()> {
        let Some(globals) = self.globals else {
            return Ok(());
        };
        let now = emitter.timestamp()?;
        emitter.store(globals.node_start, now)
    }

    pub fn end_node(&self, emitter: &mut dyn Emitter, node: NodeId) -> CompileResult<()> {
        let Some(globals) = self.globals else {
            return Ok(());
        };
        let slot = emitter.literal(Literal::Int32(node_index(node)?))?;
        let elapsed = elapsed_since(emitter, globals.node_start)?;
        accumulate(emitter, globals.node_times, slot, elapsed)?;
        let one = emitter.literal(Literal::Int64(1))?;
        accumulate(emitter, globals.node_calls, slot, one)
    }

    /// Emit the profiling accessors and the reset function.
    pub fn emit_accessors(&self, emitter: &mut dyn Emitter) -> CompileResult<()> {
        let Some(globals) = self.globals else {
            return Ok(());
        };
        let prefix = &self.prefix;

        emitter.begin_function(&format!("{}_GetNumProfiledNodes", prefix), VariableType::Int32, &[])?;
        emitter.include_in_header()?;
        let count = emitter.literal(Literal::Int32(node_index(NodeId(self.node_count))?))?;
        emitter.ret(Some(count))?;
        emitter.end_function()?;

        emit_counter_getter(emitter, &format!("{}_GetModelCallCount", prefix), globals.model_calls)?;
        emit_counter_getter(emitter, &format!("{}_GetModelTime", prefix), globals.model_time)?;
        emit_indexed_getter(emitter, &format!("{}_GetNodeCallCount", prefix), globals.node_calls, self.node_count)?;
        emit_indexed_getter(emitter, &format!("{}_GetNodeTime", prefix), globals.node_times, self.node_count)?;

        emitter.begin_function(&format!("{}_ResetProfilingInfo", prefix), VariableType::Void, &[])?;
        emitter.include_in_header()?;
        let zero = emitter.literal(Literal::Int64(0))?;
        emitter.store(globals.model_calls, zero)?;
        emitter.store(globals.model_time, zero)?;
        for node in 0..self.node_count {
            let slot = emitter.literal(Literal::Int32(node_index(NodeId(node))?))?;
            emitter.set_value_at(globals.node_calls, slot, zero)?;
            emitter.set_value_at(globals.node_times, slot, zero)?;
        }
        emitter.ret(None)?;
        emitter.end_function()
    }
}

fn node_index(node: NodeId) -> CompileResult<i32> {
    i32::try_from(node.0).map_err(|_| CompileError::invalid_argument(format!("node index {} does not fit in i32", node)))
}

fn elapsed_since(emitter: &mut dyn Emitter, start: ValueRef) -> CompileResult<ValueRef> {
    let now = emitter.timestamp()?;
    let then = emitter.load(start)?;
    emitter.operator(BinaryOperator::Subtract, now, then)
}

/// `counter[slot] += amount`
fn accumulate(emitter: &mut dyn Emitter, counter: ValueRef, slot: ValueRef, amount: ValueRef) -> CompileResult<()> {
    let current = emitter.value_at(counter, slot)?;
    let updated = emitter.operator(BinaryOperator::Add, current, amount)?;
    emitter.set_value_at(counter, slot, updated)
}

fn emit_counter_getter(emitter: &mut dyn Emitter, name: &str, counter: ValueRef) -> CompileResult<()> {
    emitter.begin_function(name, VariableType::Int64, &[])?;
    emitter.include_in_header()?;
    let value = emitter.load(counter)?;
    emitter.ret(Some(value))?;
    emitter.end_function()
}

/// `i64 name(i32 index)` reading `counters[index]`, or 0 when `index` is outside `0..count`.
fn emit_indexed_getter(emitter: &mut dyn Emitter, name: &str, counters: ValueRef, count: usize) -> CompileResult<()> {
    emitter.begin_function(name, VariableType::Int64, &[("index", VariableType::Int32)])?;
    emitter.include_in_header()?;
    let index = emitter.argument(0)?;
    let check_upper = emitter.block("CheckUpper")?;
    let in_range = emitter.block("InRange")?;
    let out_of_range = emitter.block("OutOfRange")?;

    let zero = emitter.literal(Literal::Int32(0))?;
    let negative = emitter.compare(ComparisonPredicate::Less, index, zero)?;
    emitter.branch_if(negative, out_of_range, check_upper)?;

    emitter.set_current_block(check_upper)?;
    let limit = emitter.literal(Literal::Int32(node_index(NodeId(count))?))?;
    let below = emitter.compare(ComparisonPredicate::Less, index, limit)?;
    emitter.branch_if(below, in_range, out_of_range)?;

    emitter.set_current_block(in_range)?;
    let value = emitter.value_at(counters, index)?;
    emitter.ret(Some(value))?;

    emitter.set_current_block(out_of_range)?;
    let nothing = emitter.literal(Literal::Int64(0))?;
    emitter.ret(Some(nothing))?;
    emitter.end_function()
}
