//! End-to-end map compilation tests.
//!
//! Maps are written in the test-map format, compiled to the built-in IR and
//! executed with the interpreter.

use bumpalo::Bump;
use mapc::compiler::CompiledMap;
use mapc::ir::{ExecutionError, RtValue};
use mapc::model::{DynamicMap, ElementKind, Model, TensorShape};
use mapc::nodes::InputNode;
use mapc::test_map::parse_map;
use mapc::{CompilationSession, CompileError, CompileResult, IrModule, IrModuleEmitter, MapCompiler, MapCompilerParameters};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn compile<'a>(
    session: &CompilationSession<'a>,
    text: &str,
    params: MapCompilerParameters,
) -> CompileResult<CompiledMap<IrModule<'a>>> {
    let map = parse_map(text).unwrap();
    let emitter = IrModuleEmitter::new(&params.module_name, session);
    MapCompiler::new(emitter, params, session).compile(map)
}

#[test]
fn test_add_constant() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(
        &session,
        "%x = input real[3]\n%c = constant real [1, 2, 3]\n%s = add %x, %c\nmap %x -> %s",
        MapCompilerParameters::default(),
    )
    .unwrap();

    assert_eq!(compiled.predict(&[1.0, 1.0, 1.0]).unwrap(), vec![2.0, 3.0, 4.0]);
    assert_eq!(compiled.predict(&[-1.0, 0.5, 10.0]).unwrap(), vec![0.0, 2.5, 13.0]);
    // The output is a whole compute port, so no output node is added.
    assert_eq!(compiled.map().model().size(), 3);
}

#[test]
fn test_every_numeric_kind() {
    init_logging();
    for kind in ["int", "int64", "float", "real"] {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let text = format!(
            "%x = input {kind}[3]\n%c = constant {kind} [1, 2, 3]\n%s = mul %x, %c\nmap %x -> %s",
            kind = kind
        );
        let compiled = compile(&session, &text, MapCompilerParameters::default()).unwrap();
        assert_eq!(compiled.predict(&[2.0, 2.0, 2.0]).unwrap(), vec![2.0, 4.0, 6.0], "kind {}", kind);
    }
}

#[test]
fn test_sub_range_output_is_copied() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(&session, "%x = input int[4]\nmap %x -> %x[1..3]", MapCompilerParameters::default()).unwrap();

    assert_eq!(compiled.predict(&[1.0, 2.0, 3.0, 4.0]).unwrap(), vec![2.0, 3.0]);
    assert_eq!(compiled.map().model().size(), 2);
    assert_eq!(compiled.map().output_nodes().len(), 1);
}

#[test]
fn test_boolean_passthrough() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(&session, "%x = input bool[2]\nmap %x -> %x", MapCompilerParameters::default()).unwrap();
    assert_eq!(compiled.predict(&[1.0, 0.0]).unwrap(), vec![1.0, 0.0]);
}

#[test]
fn test_scalar_intermediate() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(
        &session,
        "%x = input real[2]\n%t = sum %x\n%o = output {%t, %t}\nmap %x -> %o",
        MapCompilerParameters::default(),
    )
    .unwrap();
    assert_eq!(compiled.predict(&[1.0, 2.0]).unwrap(), vec![3.0, 3.0]);

    let stats = session.stats();
    assert_eq!(stats.nodes_compiled, 3);
    // Only the sum needs storage of its own: the input and output are arguments.
    assert_eq!(stats.variables_allocated, 1);
}

#[test]
fn test_dot_product_is_refined() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(
        &session,
        "%x = input real[3]\n%w = constant real [1, 2, 3]\n%d = dot %x, %w\nmap %x -> %d",
        MapCompilerParameters::default(),
    )
    .unwrap();

    assert_eq!(compiled.predict(&[1.0, 1.0, 1.0]).unwrap(), vec![6.0]);
    assert_eq!(compiled.predict(&[2.0, 0.0, -1.0]).unwrap(), vec![-1.0]);

    let model = compiled.map().model();
    let types: Vec<&str> = model.nodes().map(|(_, node)| node.type_name()).collect();
    assert_eq!(types, vec!["InputNode", "ConstantNode", "BinaryOperationNode", "SumNode"]);

    let mut interpreter = compiled.interpreter();
    assert_eq!(interpreter.call_int("model_GetNumNodes", &[]).unwrap(), 4);
}

#[test]
fn test_public_accessors() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(
        &session,
        "%x = input real[4] shape(2,2,1)\n%s = add %x, %x\nmap %x -> %s[0..3]",
        MapCompilerParameters::default(),
    )
    .unwrap();

    let mut interpreter = compiled.interpreter();
    assert_eq!(interpreter.call_int("model_GetInputSize", &[]).unwrap(), 4);
    assert_eq!(interpreter.call_int("model_GetOutputSize", &[]).unwrap(), 3);
    assert_eq!(interpreter.call_int("model_GetNumNodes", &[]).unwrap(), 3);

    assert_eq!(interpreter.shape("model_GetInputShape", 0).unwrap(), TensorShape::new(2, 2, 1));
    assert_eq!(interpreter.shape("model_GetInputShape", 1).unwrap(), TensorShape::new(0, 0, 0));
    assert_eq!(interpreter.shape("model_GetOutputShape", 0).unwrap(), TensorShape::new(3, 1, 1));
    assert_eq!(interpreter.shape("model_GetOutputShape", -1).unwrap(), TensorShape::new(0, 0, 0));

    let stats = session.stats();
    assert_eq!(stats.functions_emitted, 6);
}

#[test]
fn test_module_name_prefixes_accessors() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let params = MapCompilerParameters::default()
        .with_module_name("net")
        .with_function_name("run");
    let compiled = compile(&session, "%x = input real[2]\n%s = sum %x\nmap %x -> %s", params).unwrap();

    let module = compiled.module();
    assert_eq!(module.name(), "net");
    assert_eq!(module.predict_function().map(|f| f.name()), Some("run"));
    for name in ["net_GetInputSize", "net_GetOutputSize", "net_GetNumNodes", "net_GetInputShape", "net_GetOutputShape"] {
        assert!(module.function(name).is_some(), "missing {}", name);
    }
    assert!(module.function("model_GetInputSize").is_none());
    assert_eq!(compiled.predict(&[1.5, 2.5]).unwrap(), vec![4.0]);
}

#[test]
fn test_header_declarations() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(&session, "%x = input real[2]\nmap %x -> %x", MapCompilerParameters::default()).unwrap();

    let header = compiled.module().header();
    assert!(header.contains("void predict(double* input, double* output);"));
    assert!(header.contains("int32_t model_GetInputSize(void);"));
    assert!(header.contains("int32_t model_GetNumNodes(void);"));
    assert!(header.contains("typedef struct TensorShape"));
    assert!(header.contains("void model_GetOutputShape(int32_t index, TensorShape* shape);"));
    assert!(!header.contains("PROFILING"));
}

#[test]
fn test_profiling_counters() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let params = MapCompilerParameters::default().with_profiling(true);
    let compiled = compile(&session, "%x = input real[2]\n%s = sum %x\nmap %x -> %s", params).unwrap();
    assert!(compiled.module().header().contains("#define model_PROFILING 1"));

    let mut interpreter = compiled.interpreter();
    for _ in 0..2 {
        let output = interpreter
            .predict(compiled.function_name(), compiled.map(), &[1.0, 2.0])
            .unwrap();
        assert_eq!(output, vec![3.0]);
    }

    assert_eq!(interpreter.call_int("model_GetNumProfiledNodes", &[]).unwrap(), 2);
    assert_eq!(interpreter.call_int("model_GetModelCallCount", &[]).unwrap(), 2);
    assert!(interpreter.call_int("model_GetModelTime", &[]).unwrap() > 0);
    assert_eq!(interpreter.call_int("model_GetNodeCallCount", &[RtValue::I32(1)]).unwrap(), 2);
    assert!(interpreter.call_int("model_GetNodeTime", &[RtValue::I32(1)]).unwrap() > 0);

    for index in [-1, 2, 99, i32::MAX, i32::MIN] {
        assert_eq!(interpreter.call_int("model_GetNodeCallCount", &[RtValue::I32(index)]).unwrap(), 0);
        assert_eq!(interpreter.call_int("model_GetNodeTime", &[RtValue::I32(index)]).unwrap(), 0);
    }

    interpreter.call("model_ResetProfilingInfo", &[]).unwrap();
    assert_eq!(interpreter.call_int("model_GetModelCallCount", &[]).unwrap(), 0);
    assert_eq!(interpreter.call_int("model_GetModelTime", &[]).unwrap(), 0);
    assert_eq!(interpreter.call_int("model_GetNodeCallCount", &[RtValue::I32(1)]).unwrap(), 0);
}

#[test]
fn test_profiling_disabled_emits_nothing() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(&session, "%x = input real[2]\n%s = sum %x\nmap %x -> %s", MapCompilerParameters::default()).unwrap();
    let module = compiled.module();
    assert!(module.function("model_GetModelCallCount").is_none());
    assert!(module.globals().is_empty());
    assert!(module.preprocessor_definitions().is_empty());
}

#[test]
fn test_diagnostic_info_prints_each_node() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let params = MapCompilerParameters::default().with_diagnostic_info(true);
    let compiled = compile(&session, "%x = input real[2]\n%s = sum %x\nmap %x -> %s", params).unwrap();

    let mut interpreter = compiled.interpreter();
    interpreter
        .predict(compiled.function_name(), compiled.map(), &[1.0, 2.0])
        .unwrap();
    let printed = interpreter.printed();
    assert_eq!(printed.len(), 2);
    assert!(printed[0].contains("InputNode"));
    assert!(printed[1].contains("SumNode"));
}

#[test]
fn test_map_must_have_one_input_and_output() {
    init_logging();
    let mut model = Model::new();
    let input = model
        .add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2)))
        .unwrap();
    let map = DynamicMap::new(model, vec![("input".into(), input)], vec![]).unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let result = MapCompiler::new(emitter, MapCompilerParameters::default(), &session).compile(map);
    assert!(matches!(result, Err(CompileError::InvalidArgument { .. })));
}

#[test]
fn test_predict_checks_input_length() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let compiled = compile(&session, "%x = input real[2]\nmap %x -> %x", MapCompilerParameters::default()).unwrap();
    assert!(matches!(
        compiled.predict(&[1.0]),
        Err(ExecutionError::InvalidInput { .. })
    ));
}

#[test]
fn test_target_device_is_stamped() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut params = MapCompilerParameters::default();
    params.compiler_settings.target_device.triple = "aarch64-unknown-linux-gnu".to_string();
    let compiled = compile(&session, "%x = input real[1]\nmap %x -> %x", params).unwrap();
    assert_eq!(compiled.module().triple(), "aarch64-unknown-linux-gnu");
    assert!(!compiled.module().data_layout().is_empty());
}
