//! Region merging observed through whole-map compilation.

use bumpalo::Bump;
use mapc::test_map::parse_map;
use mapc::{CompilationSession, IrModuleEmitter, MapCompiler, MapCompilerParameters};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_chain_collapses_into_one_region() {
    init_logging();
    let map = parse_map(
        "%x = input real[2]
         %a = add %x, %x
         %b = mul %a, %a
         %c = add %b, %b
         map %x -> %c",
    )
    .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let compiled = MapCompiler::new(emitter, MapCompilerParameters::default(), &session)
        .compile(map)
        .unwrap();

    let stats = session.stats();
    assert_eq!(stats.regions_created, 4);
    assert_eq!(stats.regions_merged, 3);
    assert_eq!(compiled.predict(&[1.0, 2.0]).unwrap(), vec![8.0, 32.0]);
}

#[test]
fn test_fan_out_keeps_regions_apart() {
    init_logging();
    let map = parse_map(
        "%x = input real[2]
         %a = add %x, %x
         %b = mul %x, %x
         %c = add %a, %b
         map %x -> %c",
    )
    .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let compiled = MapCompiler::new(emitter, MapCompilerParameters::default(), &session)
        .compile(map)
        .unwrap();

    let stats = session.stats();
    assert_eq!(stats.regions_created, 4);
    assert_eq!(stats.regions_merged, 0);
    assert_eq!(compiled.predict(&[1.0, 2.0]).unwrap(), vec![3.0, 8.0]);
}

#[test]
fn test_merged_and_unmerged_regions_agree() {
    init_logging();
    // `%s` feeds only `%t`, but `%t` also reads the shared input.
    let map = parse_map(
        "%x = input int[3]
         %s = sum %x
         %t = add {%s, %s, %s}, %x
         map %x -> %t",
    )
    .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let emitter = IrModuleEmitter::new("model", &session);
    let compiled = MapCompiler::new(emitter, MapCompilerParameters::default(), &session)
        .compile(map)
        .unwrap();

    assert_eq!(session.stats().regions_merged, 0);
    assert_eq!(compiled.predict(&[1.0, 2.0, 3.0]).unwrap(), vec![7.0, 8.0, 9.0]);
}
