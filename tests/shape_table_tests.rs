//! Shape accessor generation and lookup.

use bumpalo::Bump;
use mapc::compiler::shapes::emit_shape_accessor;
use mapc::ir::Interpreter;
use mapc::test_map::parse_map;
use mapc::{
    CompilationSession,
    IrModuleEmitter,
    MapCompiler,
    MapCompilerParameters,
    ModuleBuilder,
    TargetDevice,
    TensorShape,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_output_shapes_follow_node_order() {
    init_logging();
    let map = parse_map(
        "%x = input real[4] shape(2,2,1)
         %first = output %x[0..2] shape(2,1,1)
         %second = output %x shape(1,4,1)
         map %x -> %second",
    )
    .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let compiled = MapCompiler::new(emitter, MapCompilerParameters::default(), &session)
        .compile(map)
        .unwrap();

    let mut interpreter = compiled.interpreter();
    assert_eq!(interpreter.shape("model_GetOutputShape", 0).unwrap(), TensorShape::new(2, 1, 1));
    assert_eq!(interpreter.shape("model_GetOutputShape", 1).unwrap(), TensorShape::new(1, 4, 1));
    assert_eq!(interpreter.shape("model_GetOutputShape", 2).unwrap(), TensorShape::new(0, 0, 0));
    assert_eq!(interpreter.shape("model_GetOutputShape", -1).unwrap(), TensorShape::new(0, 0, 0));

    assert_eq!(compiled.predict(&[1.0, 2.0, 3.0, 4.0]).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_conditional_chain_layout() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut emitter = IrModuleEmitter::new("shapes", &session);
    let shapes = [
        TensorShape::new(1, 2, 3),
        TensorShape::new(4, 5, 6),
        TensorShape::new(7, 8, 9),
    ];
    emit_shape_accessor(&mut emitter, "GetShape", &shapes).unwrap();
    let module = emitter.finish(&TargetDevice::default()).unwrap();

    let function = module.function("GetShape").unwrap();
    let labels: Vec<&str> = function.blocks().iter().map(|block| block.label()).collect();
    assert_eq!(
        labels,
        vec![
            "entry",
            "NoMatchBlock",
            "IfBlock0",
            "ThenBlock0",
            "ElseBlock0",
            "IfBlock1",
            "ThenBlock1",
            "ElseBlock1",
            "IfBlock2",
            "ThenBlock2",
            "ElseBlock2",
        ]
    );
    assert!(function.blocks().iter().all(|block| block.terminator().is_some()));

    let mut interpreter = Interpreter::new(&module);
    for (index, shape) in shapes.iter().enumerate() {
        assert_eq!(interpreter.shape("GetShape", index as i32).unwrap(), *shape);
    }
    assert_eq!(interpreter.shape("GetShape", 3).unwrap(), TensorShape::new(0, 0, 0));
}

#[test]
fn test_empty_table_writes_zeros_for_any_index() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut emitter = IrModuleEmitter::new("shapes", &session);
    emit_shape_accessor(&mut emitter, "GetShape", &[]).unwrap();
    let module = emitter.finish(&TargetDevice::default()).unwrap();

    let mut interpreter = Interpreter::new(&module);
    for index in [i32::MIN, -1, 0, 1, 99, i32::MAX] {
        assert_eq!(
            interpreter.shape("GetShape", index).unwrap(),
            TensorShape::new(0, 0, 0),
            "index {}",
            index
        );
    }
}

#[test]
fn test_two_shape_table_dispatch() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut emitter = IrModuleEmitter::new("shapes", &session);
    emit_shape_accessor(
        &mut emitter,
        "GetShape",
        &[TensorShape::new(2, 3, 4), TensorShape::new(5, 6, 7)],
    )
    .unwrap();
    let module = emitter.finish(&TargetDevice::default()).unwrap();

    let mut interpreter = Interpreter::new(&module);
    assert_eq!(interpreter.shape("GetShape", 0).unwrap(), TensorShape::new(2, 3, 4));
    assert_eq!(interpreter.shape("GetShape", 1).unwrap(), TensorShape::new(5, 6, 7));
    for index in [2, -1, 99] {
        assert_eq!(
            interpreter.shape("GetShape", index).unwrap(),
            TensorShape::new(0, 0, 0),
            "index {}",
            index
        );
    }
}
