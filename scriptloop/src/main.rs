// SPDX-License-Identifier: MIT
// scriptloop: runs JSON action programs on a single-threaded event loop
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use scriptloop::script::{Interpreter, Program};
use scriptloop::{EventLoop, LoopConfig, LoopError, LoopMode};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Program file (JSON array of statements)
    #[arg(long, value_name = "FILE")]
    program: Option<PathBuf>,

    /// Program given inline (JSON encoded)
    #[arg(long = "program-json", value_name = "JSON")]
    program_json: Option<String>,

    /// Program given inline (base64-encoded JSON)
    #[arg(long = "program-base64", value_name = "BASE64")]
    program_base64: Option<String>,

    /// Do not install the console; logging from the program fails
    #[arg(long = "no-console")]
    no_console: bool,

    /// Block until all work is done (run) or pump on a worker thread (start)
    #[arg(long, value_enum, default_value_t)]
    mode: LoopMode,

    /// How long the loop stays started in start mode
    #[arg(long = "duration-ms", value_name = "MS", default_value_t = 2000)]
    duration_ms: u64,
}

fn validate_args(args: &Args) -> Result<(), String> {
    let given = [
        args.program.is_some(),
        args.program_json.is_some(),
        args.program_base64.is_some(),
    ]
    .iter()
    .filter(|given| **given)
    .count();

    match given {
        1 => {}
        0 => {
            return Err("one of --program, --program-json or --program-base64 is required".into());
        }
        _ => {
            return Err(
                "--program, --program-json and --program-base64 may not be used together".into(),
            );
        }
    }

    Ok(())
}

/// Returns the program name (for error messages) and its source.
fn read_program(args: &Args) -> anyhow::Result<(String, String)> {
    if let Some(path) = &args.program {
        let source = std::fs::read_to_string(path)?;
        return Ok((path.display().to_string(), source));
    }
    if let Some(json) = &args.program_json {
        return Ok(("<program-json>".to_string(), json.clone()));
    }
    if let Some(b64) = &args.program_base64 {
        let decoded = BASE64_STANDARD.decode(b64)?;
        return Ok(("<program-base64>".to_string(), String::from_utf8(decoded)?));
    }
    unreachable!("validate_args enforces exactly one program source")
}

fn run_blocking(program: &Program, config: LoopConfig) -> Result<(), LoopError> {
    let event_loop = EventLoop::with_config(Interpreter::new(), config);
    event_loop.run(|vm| vm.run(program).map_err(Into::into))
}

fn run_started(program: Program, config: LoopConfig, duration: Duration) -> Vec<LoopError> {
    let event_loop = EventLoop::with_config(Interpreter::new(), config);
    let errors = event_loop.errors();

    if let Err(e) = event_loop.start() {
        return vec![e];
    }
    event_loop.run_on_loop(move |vm| vm.run(&program).map_err(Into::into));
    debug!("keeping the loop started for {duration:?}");
    thread::sleep(duration);

    let mut failures = Vec::new();
    if let Err(e) = event_loop.stop() {
        failures.push(e);
    }
    if event_loop.job_count() > 0 {
        info!("{} jobs still pending at stop", event_loop.job_count());
    }
    while let Ok(e) = errors.try_recv() {
        failures.push(e);
    }
    failures
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let (name, source) = match read_program(&args) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: failed to read program: {e}");
            std::process::exit(2);
        }
    };

    let program = match Interpreter::compile(&name, &source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let config = LoopConfig::default().with_console(!args.no_console);
    let failures: Vec<LoopError> = match args.mode {
        LoopMode::Run => run_blocking(&program, config).err().into_iter().collect(),
        LoopMode::Start => run_started(program, config, Duration::from_millis(args.duration_ms)),
    };

    if let Some(first) = failures.first() {
        eprintln!("{first}");
        std::process::exit(1);
    }
}
