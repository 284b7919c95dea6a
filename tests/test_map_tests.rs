//! Maps written in the text format, compiled and run.

use bumpalo::Bump;
use mapc::test_map::{parse_map, ParseError};
use mapc::{CompilationSession, CompileError, IrModuleEmitter, MapCompiler, MapCompilerParameters, TensorShape};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const DOCUMENT: &str = "\
; Every operation of the format in one map.
%x = input real[4] shape(2,2,1)
%c = constant real [1, 2, 3, 4]
%s = add %x, %c
%d = dot %x, %c
%t = sum {%s[0..2], %d}
%o = output %s[0..2] shape(2,1,1)
map %x -> %t
";

#[test]
fn test_full_document() {
    init_logging();
    let map = parse_map(DOCUMENT).unwrap();
    assert_eq!(map.model().size(), 6);
    assert_eq!(map.input_size(), 4);
    assert_eq!(map.output_size(), 1);

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let compiled = MapCompiler::new(emitter, MapCompilerParameters::default(), &session)
        .compile(map)
        .unwrap();

    // s = [2, 3, 4, 5], d = 10, t = 2 + 3 + 10
    assert_eq!(compiled.predict(&[1.0, 1.0, 1.0, 1.0]).unwrap(), vec![15.0]);

    let mut interpreter = compiled.interpreter();
    assert_eq!(interpreter.shape("model_GetInputShape", 0).unwrap(), TensorShape::new(2, 2, 1));
    assert_eq!(interpreter.shape("model_GetOutputShape", 0).unwrap(), TensorShape::new(2, 1, 1));
    // The dot product refines into a multiply and a sum.
    assert_eq!(interpreter.call_int("model_GetNumNodes", &[]).unwrap(), 7);
}

#[test]
fn test_syntax_errors() {
    init_logging();
    let err = parse_map("%x = input real[2]\n%y = add %x,\nmap %x -> %y").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 3, .. }), "{}", err);

    let err = parse_map("%x = input real[2]\n%x = input real[2]\nmap %x -> %x").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

    let err = parse_map("%x = input real[2]\nmap %x -> %x\nmap %x -> %x").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 3, .. }));

    let err = parse_map("%x = input real[2]\n%c = constant quux [1]\nmap %x -> %c").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
}

#[test]
fn test_model_errors_carry_their_cause() {
    init_logging();
    let err = parse_map("%x = input bool[2]\n%s = sum %x\nmap %x -> %s").unwrap_err();
    match err {
        ParseError::Model { line, column, source } => {
            assert_eq!((line, column), (2, 1));
            assert!(matches!(source, CompileError::TypeMismatch { .. }));
        }
        other => panic!("unexpected error {}", other),
    }

    let err = parse_map("%x = input real[2]\nmap %x -> %x[1..5]").unwrap_err();
    assert!(matches!(err, ParseError::Model { line: 2, .. }));
}
