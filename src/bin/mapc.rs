//! mapc: compile a test-map file and inspect the result.

use std::path::PathBuf;
use std::process::ExitCode;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use mapc::test_map::parse_map;
use mapc::{CompilationSession, DynamicMap, IrModuleEmitter, MapCompiler, MapCompilerParameters};

/// Compile a dataflow map into a predict function.
#[derive(Parser, Debug)]
#[command(name = "mapc")]
#[command(version = "0.1.0")]
#[command(about = "Compile a dataflow map into a predict function")]
struct Cli {
    /// Path to the map file
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// What to print after compiling
    #[arg(long, value_enum, default_value_t = Emit::Ir)]
    emit: Emit,

    /// Module name, also the prefix of the public accessors
    #[arg(long, default_value = "model")]
    module_name: String,

    /// Name of the predict function
    #[arg(long, default_value = "predict")]
    function_name: String,

    /// Instrument the model with profiling counters
    #[arg(long)]
    profile: bool,

    /// Print each node's identity when its code runs
    #[arg(long)]
    diagnostics: bool,

    /// Target triple stamped on the module
    #[arg(long, value_name = "TRIPLE")]
    triple: Option<String>,

    /// Comma separated input values to run through the predict function
    #[arg(long, value_name = "VALUES", allow_hyphen_values = true)]
    predict: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Textual dump of the built-in IR
    #[default]
    Ir,
    /// Public C header
    Header,
    /// Compilation statistics
    Stats,
    /// LLVM IR (requires the `llvm` feature)
    Llvm,
    /// Nothing
    None,
}

fn parse_input(values: &str) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|e| -> Box<dyn std::error::Error> { format!("invalid input value '{}': {}", value, e).into() })
        })
        .collect()
}

fn parameters(cli: &Cli) -> MapCompilerParameters {
    let mut params = MapCompilerParameters::default()
        .with_module_name(cli.module_name.clone())
        .with_function_name(cli.function_name.clone())
        .with_profiling(cli.profile)
        .with_diagnostic_info(cli.diagnostics);
    if let Some(triple) = &cli.triple {
        params.compiler_settings.target_device.triple = triple.clone();
    }
    params
}

#[cfg(feature = "llvm")]
fn print_llvm(cli: &Cli, map: DynamicMap) -> Result<(), Box<dyn std::error::Error>> {
    use inkwell::context::Context;
    use mapc::llvm::LlvmModuleEmitter;

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let context = Context::create();
    let params = parameters(cli);
    let emitter = LlvmModuleEmitter::new(&context, &params.module_name, &session);
    let compiled = MapCompiler::new(emitter, params, &session).compile(map)?;
    print!("{}", compiled.module());
    Ok(())
}

#[cfg(not(feature = "llvm"))]
fn print_llvm(_cli: &Cli, _map: DynamicMap) -> Result<(), Box<dyn std::error::Error>> {
    Err("mapc was built without the `llvm` feature".into())
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(&cli.path)
        .map_err(|e| format!("cannot read {}: {}", cli.path.display(), e))?;
    let map = parse_map(&text)?;
    log::debug!("Parsed {} ({} nodes)", cli.path.display(), map.model().size());

    if cli.emit == Emit::Llvm {
        return print_llvm(cli, map);
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let params = parameters(cli);
    let emitter = IrModuleEmitter::new(&params.module_name, &session);
    let compiled = MapCompiler::new(emitter, params, &session).compile(map)?;

    match cli.emit {
        Emit::Ir => print!("{}", compiled.module()),
        Emit::Header => print!("{}", compiled.module().header()),
        Emit::Stats => print!("{}", session.stats()),
        Emit::Llvm | Emit::None => {}
    }

    if let Some(values) = &cli.predict {
        let input = parse_input(values)?;
        let output = compiled.predict(&input)?;
        let rendered: Vec<String> = output.iter().map(|v| v.to_string()).collect();
        println!("{}", rendered.join(", "));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mapc: {}", e);
            ExitCode::FAILURE
        }
    }
}
