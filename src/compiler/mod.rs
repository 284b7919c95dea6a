// This module implements the map compiler, the orchestrator that turns a DynamicMap into a
// module. A compile call validates and normalizes the map, refines it until every node can
// be compiled directly, optionally sets up profiling, and then emits the predict function:
// the input and output arguments are bound to the map's input and output ports, and every
// node of the refined model is compiled in dependency order inside its own code region,
// which is folded into its parent's region whenever the two form a straight chain. After
// the predict function come the public accessors (sizes, node count, input and output
// shapes) and the profiling accessors. `compile` consumes the compiler, so the module it
// builds can be handed out exactly once, stamped with the target triple and data layout.
//
// Nodes see the compiler through the object-safe NodeCompiler trait, which resolves ports
// to storage, loads and stores port elements, and runs nested compilation in a scope.

//! Map compilation.
//!
//! ```ignore
//! use bumpalo::Bump;
//! use mapc::core::{CompilationSession, MapCompilerParameters};
//! use mapc::compiler::MapCompiler;
//! use mapc::ir::IrModuleEmitter;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let emitter = IrModuleEmitter::new("model", &session);
//! let compiler = MapCompiler::new(emitter, MapCompilerParameters::default(), &session);
//! let compiled = compiler.compile(map)?;
//! let output = compiled.predict(&[1.0, 2.0, 3.0])?;
//! ```

pub mod normalize;
pub mod profiler;
pub mod regions;
pub mod shapes;
pub mod variables;

pub use normalize::ensure_valid_map;
pub use profiler::Profiler;
pub use regions::{NodeRegions, RegionScope};
pub use shapes::{emit_shape_conditionals, TENSOR_SHAPE_TYPE};
pub use variables::PortVariables;

use crate::core::{
    CompilationSession,
    CompileError,
    CompileResult,
    Emitter,
    Literal,
    MapCompilerParameters,
    ModuleBuilder,
    ValueRef,
    Variable,
    VariableType,
};
use crate::model::{
    diagnostic_string,
    id_string,
    DynamicMap,
    ElementKind,
    InputPort,
    Node,
    NodeId,
    OutputPort,
    OutputPortRef,
    PortElement,
    PortType,
    TensorShape,
    TransformContext,
};
use hashbrown::HashMap;

/// The compiler services available to a node's compile hook.
pub trait NodeCompiler {
    fn emitter(&mut self) -> &mut dyn Emitter;

    /// Realize the storage behind element 0 of `port`.
    fn ensure_port_emitted(&mut self, port: &InputPort) -> CompileResult<ValueRef>;

    /// Realize the storage of an output port, allocating it on first use.
    fn ensure_output_port_emitted(&mut self, port: OutputPortRef, desc: &OutputPort) -> CompileResult<ValueRef>;

    fn ensure_port_element_emitted(&mut self, element: PortElement) -> CompileResult<ValueRef>;

    /// Load the value of one element.
    fn load_port_element_variable(&mut self, element: PortElement) -> CompileResult<ValueRef>;

    /// Load element 0 of `port`.
    fn load_port_variable(&mut self, port: &InputPort) -> CompileResult<ValueRef>;

    fn port_element_variable(&self, element: PortElement) -> CompileResult<Variable>;

    fn port_variable(&self, port: &InputPort) -> CompileResult<Variable>;

    /// Bind an output port to caller-provided storage in the innermost scope.
    fn set_port_variable(&mut self, port: OutputPortRef, variable: Variable) -> CompileResult<()>;

    /// Store `value` into element `index` of an output port.
    fn store_output_element(
        &mut self,
        port: OutputPortRef,
        desc: &OutputPort,
        index: usize,
        value: ValueRef,
    ) -> CompileResult<()>;

    /// Run `body` in a fresh scope, popped exactly once whatever the outcome.
    fn with_scope(&mut self, body: &mut dyn FnMut(&mut dyn NodeCompiler) -> CompileResult<()>) -> CompileResult<()>;
}

/// The result of a successful compile call.
#[derive(Debug)]
pub struct CompiledMap<M> {
    map: DynamicMap,
    function_name: String,
    module: M,
}

impl<M> CompiledMap<M> {
    /// The normalized, refined map the module was compiled from.
    pub fn map(&self) -> &DynamicMap {
        &self.map
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn into_module(self) -> M {
        self.module
    }
}

pub struct MapCompiler<'s, 'arena, B: ModuleBuilder> {
    parameters: MapCompilerParameters,
    session: &'s CompilationSession<'arena>,
    emitter: B,
    regions: NodeRegions,
    variables: PortVariables,
    profiler: Profiler,
    dependents: HashMap<NodeId, usize>,
}

impl<'s, 'arena, B: ModuleBuilder> MapCompiler<'s, 'arena, B> {
    pub fn new(emitter: B, parameters: MapCompilerParameters, session: &'s CompilationSession<'arena>) -> Self {
        let mut compiler = Self {
            parameters,
            session,
            emitter,
            regions: NodeRegions::new(),
            variables: PortVariables::new(),
            profiler: Profiler::disabled(),
            dependents: HashMap::new(),
        };
        compiler.push_scope();
        compiler
    }

    pub fn parameters(&self) -> &MapCompilerParameters {
        &self.parameters
    }

    /// Prefix of the public accessor names.
    pub fn namespace_prefix(&self) -> &str {
        &self.parameters.module_name
    }

    pub fn push_scope(&mut self) {
        self.regions.push_scope();
        self.variables.push_scope();
    }

    pub fn pop_scope(&mut self) -> CompileResult<()> {
        self.regions.pop_scope()?;
        self.variables.pop_scope()
    }

    pub fn current_scope(&self) -> Option<&RegionScope> {
        self.regions.current_scope()
    }

    /// Compile `map` into a module, consuming the compiler.
    pub fn compile(mut self, mut map: DynamicMap) -> CompileResult<CompiledMap<B::Module>> {
        log::debug!(
            "Compiling map into module '{}' (function '{}')",
            self.parameters.module_name,
            self.parameters.map_function_name
        );

        ensure_valid_map(&mut map)?;
        map.refine(&TransformContext::compilable())?;

        if self.parameters.profile {
            let prefix = self.parameters.module_name.clone();
            self.emitter.add_preprocessor_definition(&format!("{}_PROFILING", prefix), "1");
            self.profiler = Profiler::new(&mut self.emitter, &prefix, map.model().size())?;
        }

        self.dependents = map.model().dependent_counts();
        self.compile_map_function(&map)?;
        self.emit_model_accessors(&map)?;
        self.profiler.emit_accessors(&mut self.emitter)?;

        self.pop_scope()?;
        if self.regions.depth() != 0 || self.variables.depth() != 0 {
            return Err(CompileError::invalid_argument("unbalanced compiler scopes"));
        }

        let MapCompiler { parameters, emitter, .. } = self;
        let module = emitter.finish(&parameters.compiler_settings.target_device)?;
        log::info!(
            "Compiled map into module '{}' ({} nodes)",
            parameters.module_name,
            map.model().size()
        );
        Ok(CompiledMap {
            map,
            function_name: parameters.map_function_name,
            module,
        })
    }

    fn compile_map_function(&mut self, map: &DynamicMap) -> CompileResult<()> {
        let input_type = element_type(map.input_type())?;
        let output_type = element_type(map.output_type())?;
        let input_pointer = pointer_type(input_type)?;
        let output_pointer = pointer_type(output_type)?;

        let function_name = self.parameters.map_function_name.clone();
        self.emitter
            .begin_function(&function_name, VariableType::Void, &[("input", input_pointer), ("output", output_pointer)])?;

        let input = self
            .variables
            .set(map.input_port(0)?, Variable::input_vector("input", input_type, map.input_size()))?;
        let argument = self.emitter.argument(0)?;
        self.emitter.bind_variable(&input, argument)?;

        let output_port = map.output(0)?.ranges()[0].port();
        let output = self
            .variables
            .set(output_port, Variable::output_vector("output", output_type, map.output_size()))?;
        let argument = self.emitter.argument(1)?;
        self.emitter.bind_variable(&output, argument)?;

        self.on_begin_compile_model()?;
        for (id, node) in map.model().nodes() {
            self.compile_node(id, node)?;
        }
        self.on_end_compile_model()?;
        self.emitter.end_function()
    }

    fn compile_node(&mut self, id: NodeId, node: &dyn Node) -> CompileResult<()> {
        log::trace!("Compiling node {} ({})", id, node.type_name());
        self.on_begin_compile_node()?;
        self.new_node_region(id, node)?;
        self.profiler.start_node(&mut self.emitter, id)?;
        node.compile(id, self)?;
        self.session.record_node_compiled(node.type_name());
        self.try_merge_node_region(id, node)?;
        self.on_end_compile_node(id)
    }

    /// Open a region at the current block when none is active.
    fn ensure_current_region(&mut self) -> CompileResult<()> {
        if self.emitter.current_region().is_none() {
            let block = self
                .emitter
                .current_block()
                .ok_or_else(|| CompileError::emitter("no current block"))?;
            self.emitter.add_region(block)?;
        }
        Ok(())
    }

    fn on_begin_compile_model(&mut self) -> CompileResult<()> {
        self.ensure_current_region()?;
        self.emitter.include_in_header()?;
        self.emitter.include_in_predict_interface()?;
        self.profiler.start_model(&mut self.emitter)
    }

    fn on_end_compile_model(&mut self) -> CompileResult<()> {
        if self.profiler.is_enabled() {
            // Model timing must run after every node region, merged or not.
            let block = self.emitter.begin_block("ModelEnd")?;
            self.emitter.add_region(block)?;
            self.profiler.end_model(&mut self.emitter)?;
        }
        Ok(())
    }

    fn on_begin_compile_node(&mut self) -> CompileResult<()> {
        self.ensure_current_region()
    }

    fn on_end_compile_node(&mut self, id: NodeId) -> CompileResult<()> {
        self.profiler.end_node(&mut self.emitter, id)?;
        if let (Some(region), Some(block)) = (self.emitter.current_region(), self.emitter.current_block()) {
            if self.emitter.region_end(region)? != block {
                self.emitter.set_region_end(region, block)?;
            }
        }
        Ok(())
    }

    /// Start a block and region of its own for `node`.
    pub fn new_node_region(&mut self, id: NodeId, node: &dyn Node) -> CompileResult<()> {
        let block = self.emitter.begin_block(&id_string(id, node))?;
        let region = self.emitter.add_region(block)?;
        self.regions.set(id, region)?;
        self.session.record_region_created();
        if self.parameters.compiler_settings.include_diagnostic_info {
            self.emitter.print(&diagnostic_string(id, node))?;
        }
        Ok(())
    }

    /// Fold the region of `id` into its unique parent's region when possible.
    pub fn try_merge_node_region(&mut self, id: NodeId, node: &dyn Node) -> CompileResult<bool> {
        let merged = self
            .regions
            .try_merge_node_region(&mut self.emitter, id, node, &self.dependents)?;
        if merged {
            self.session.record_region_merged();
        }
        Ok(merged)
    }

    fn emit_model_accessors(&mut self, map: &DynamicMap) -> CompileResult<()> {
        let prefix = self.parameters.module_name.clone();
        let model = map.model();

        shapes::emit_size_accessor(&mut self.emitter, &format!("{}_GetInputSize", prefix), map.input_size())?;
        shapes::emit_size_accessor(&mut self.emitter, &format!("{}_GetOutputSize", prefix), map.output_size())?;
        shapes::emit_size_accessor(&mut self.emitter, &format!("{}_GetNumNodes", prefix), model.size())?;

        let shapes_of = |ids: Vec<NodeId>| -> Vec<TensorShape> {
            ids.into_iter()
                .filter_map(|id| model.node(id).and_then(|node| node.shape()))
                .collect()
        };
        let input_shapes = shapes_of(map.input_nodes());
        let output_shapes = shapes_of(map.output_nodes());

        shapes::declare_tensor_shape(&mut self.emitter)?;
        shapes::emit_shape_accessor(&mut self.emitter, &format!("{}_GetInputShape", prefix), &input_shapes)?;
        shapes::emit_shape_accessor(&mut self.emitter, &format!("{}_GetOutputShape", prefix), &output_shapes)?;
        log::debug!("Emitted public accessors for '{}'", prefix);
        Ok(())
    }

    fn allocate_port_variable(&mut self, port: OutputPortRef, desc: &OutputPort) -> CompileResult<Variable> {
        let element_type = element_type(desc.port_type())?;
        let name = format!("node{}_{}", port.node, desc.name());
        let variable = if desc.size() == 1 {
            Variable::local_scalar(name, element_type)
        } else {
            Variable::global_vector(name, element_type, desc.size())
        };
        self.session.record_variable_allocated();
        self.variables.set(port, variable)
    }

    fn index_value(&mut self, index: usize) -> CompileResult<ValueRef> {
        let index = i32::try_from(index)
            .map_err(|_| CompileError::invalid_argument(format!("element index {} does not fit in i32", index)))?;
        self.emitter.literal(Literal::Int32(index))
    }
}

fn element_type(port_type: PortType) -> CompileResult<VariableType> {
    Ok(ElementKind::try_from(port_type)?.variable_type())
}

fn pointer_type(element_type: VariableType) -> CompileResult<VariableType> {
    element_type
        .pointer_to()
        .ok_or_else(|| CompileError::type_mismatch(format!("no pointer type for {:?}", element_type)))
}

impl<'s, 'arena, B: ModuleBuilder> NodeCompiler for MapCompiler<'s, 'arena, B> {
    fn emitter(&mut self) -> &mut dyn Emitter {
        &mut self.emitter
    }

    fn ensure_port_emitted(&mut self, port: &InputPort) -> CompileResult<ValueRef> {
        self.ensure_port_element_emitted(port.input_element(0)?)
    }

    fn ensure_output_port_emitted(&mut self, port: OutputPortRef, desc: &OutputPort) -> CompileResult<ValueRef> {
        let variable = match self.variables.get(port) {
            Some(variable) => variable.clone(),
            None => self.allocate_port_variable(port, desc)?,
        };
        self.emitter.ensure_emitted(&variable)
    }

    fn ensure_port_element_emitted(&mut self, element: PortElement) -> CompileResult<ValueRef> {
        let variable = self.variables.get(element.port).cloned().ok_or_else(|| {
            CompileError::not_supported(format!(
                "no variable registered for port {}:{}",
                element.port.node, element.port.index
            ))
        })?;
        self.emitter.ensure_emitted(&variable)
    }

    fn load_port_element_variable(&mut self, element: PortElement) -> CompileResult<ValueRef> {
        let variable = self.variables.element_variable(element)?.clone();
        let value = self.emitter.ensure_emitted(&variable)?;
        if variable.is_scalar() {
            if variable.is_literal() || variable.is_input_argument() {
                Ok(value)
            } else {
                self.emitter.load(value)
            }
        } else if !self.emitter.is_pointer(value) {
            Ok(value)
        } else {
            let offset = self.index_value(element.index)?;
            self.emitter.value_at(value, offset)
        }
    }

    fn load_port_variable(&mut self, port: &InputPort) -> CompileResult<ValueRef> {
        self.load_port_element_variable(port.input_element(0)?)
    }

    fn port_element_variable(&self, element: PortElement) -> CompileResult<Variable> {
        self.variables.element_variable(element).cloned()
    }

    fn port_variable(&self, port: &InputPort) -> CompileResult<Variable> {
        self.port_element_variable(port.input_element(0)?)
    }

    fn set_port_variable(&mut self, port: OutputPortRef, variable: Variable) -> CompileResult<()> {
        self.variables.set(port, variable)?;
        Ok(())
    }

    fn store_output_element(
        &mut self,
        port: OutputPortRef,
        desc: &OutputPort,
        index: usize,
        value: ValueRef,
    ) -> CompileResult<()> {
        let pointer = self.ensure_output_port_emitted(port, desc)?;
        let variable = self.variables.element_variable(PortElement { port, index })?.clone();
        if variable.is_literal() || variable.is_input_argument() {
            return Err(CompileError::not_supported(format!(
                "cannot store into read-only variable '{}'",
                variable.name()
            )));
        }
        if variable.is_scalar() {
            self.emitter.store(pointer, value)
        } else {
            let offset = self.index_value(index)?;
            self.emitter.set_value_at(pointer, offset, value)
        }
    }

    fn with_scope(&mut self, body: &mut dyn FnMut(&mut dyn NodeCompiler) -> CompileResult<()>) -> CompileResult<()> {
        self.push_scope();
        let result = body(self);
        let popped = self.pop_scope();
        result.and(popped)
    }
}
