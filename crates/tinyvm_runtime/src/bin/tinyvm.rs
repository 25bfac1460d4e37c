//! tinyvm CLI entry point.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tinyvm_runtime::{Session, stdout_sink};
use tinyvm_vm::{Vm, VmConfig};

const DEFAULT_LOG_FILTER: &str = "warn";
const TRACE_VM_FILTER: &str = "tinyvm::dispatch=trace";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Command {
    #[default]
    Help,
    Run,
    Disasm,
}

/// CLI configuration parsed from arguments.
#[derive(Default)]
struct CliConfig {
    command: Command,
    image: Option<PathBuf>,
    show_version: bool,
    sandboxed: bool,
    unbounded: bool,
    max_stack: Option<usize>,
    max_frames: Option<usize>,
    max_steps: Option<u64>,
    // Debug flags
    trace_vm: bool,
    dump_stack: bool,
}

impl CliConfig {
    fn vm_config(&self) -> VmConfig {
        let mut config = if self.sandboxed {
            VmConfig::sandboxed()
        } else if self.unbounded {
            VmConfig::unbounded()
        } else {
            VmConfig::default()
        };
        if let Some(max_stack) = self.max_stack {
            config = config.with_max_stack(max_stack);
        }
        if let Some(max_frames) = self.max_frames {
            config = config.with_max_frames(max_frames);
        }
        if self.max_steps.is_some() {
            config = config.with_max_steps(self.max_steps);
        }
        config
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_value<T: std::str::FromStr>(
    args: &[String],
    i: &mut usize,
    flag: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    *i += 1;
    let raw = args
        .get(*i)
        .ok_or_else(|| format!("{flag} requires a value"))?;
    raw.parse::<T>()
        .map_err(|_| format!("invalid {flag} value: {raw}").into())
}

fn parse_args(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => config.command = Command::Help,
            "-V" | "--version" => config.show_version = true,
            "--sandbox" => config.sandboxed = true,
            "--unbounded" => config.unbounded = true,
            "--trace-vm" => config.trace_vm = true,
            "--dump-stack" => config.dump_stack = true,
            "--max-stack" => config.max_stack = Some(parse_value(&args, &mut i, "--max-stack")?),
            "--max-frames" => {
                config.max_frames = Some(parse_value(&args, &mut i, "--max-frames")?);
            }
            "--max-steps" => config.max_steps = Some(parse_value(&args, &mut i, "--max-steps")?),
            "run" if config.command == Command::Help && config.image.is_none() => {
                config.command = Command::Run;
            }
            "disasm" if config.command == Command::Help && config.image.is_none() => {
                config.command = Command::Disasm;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option: {arg}").into());
            }
            path => {
                if config.image.is_some() {
                    return Err(format!("unexpected argument: {path}").into());
                }
                config.image = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn init_logging(trace_vm: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let base = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let expr = if trace_vm {
        format!("{base},{TRACE_VM_FILTER}")
    } else {
        base
    };
    let filter = EnvFilter::try_new(&expr).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args(args)?;

    if config.show_version {
        println!("tinyvm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if config.command == Command::Help {
        print_help();
        return Ok(());
    }

    init_logging(config.trace_vm);

    let Some(image) = &config.image else {
        return Err("missing image path".into());
    };
    let session = Session::load(image, &stdout_sink())?.with_config(config.vm_config());

    match config.command {
        Command::Disasm => {
            print!("{}", session.disassemble()?);
            Ok(())
        }
        Command::Run => {
            let mut vm = session.vm();
            let result = session.execute(&mut vm);
            if config.dump_stack {
                dump_stack(&vm);
            }
            let outcome = result?;
            tracing::info!(steps = outcome.steps, halted_at = outcome.halted_at, "halted");
            Ok(())
        }
        Command::Help => Ok(()),
    }
}

fn dump_stack(vm: &Vm) {
    eprintln!("\x1b[1;36m=== Stack ===\x1b[0m");
    eprintln!("PC: {}", vm.pc());
    eprintln!("Steps: {}", vm.steps());
    eprintln!("Frames: {}", vm.frame_depth());

    let frame = vm.stack().frame();
    for (slot, value) in vm.stack().values().iter().enumerate().rev() {
        let marker = if slot >= frame.window_top() {
            ' '
        } else if slot >= frame.locals_base {
            'L'
        } else if slot >= frame.floor {
            'A'
        } else {
            '.'
        };
        eprintln!("  {marker} {slot:>5}: {value:?}");
    }

    eprintln!();
}

fn print_help() {
    println!(
        "\x1b[1mtinyvm\x1b[0m - Stack-based, object-capable bytecode VM

\x1b[1mUSAGE:\x1b[0m
    tinyvm run [OPTIONS] <IMAGE>
    tinyvm disasm <IMAGE>

\x1b[1mCOMMANDS:\x1b[0m
    run       Execute a program image
    disasm    Print the class table, constants, and code of an image

\x1b[1mOPTIONS:\x1b[0m
    -h, --help         Print help information
    -V, --version      Print version information
    --sandbox          Start from the sandboxed limits
    --unbounded        Start with no stack, frame, or step limits
    --max-stack N      Limit operand stack slots
    --max-frames N     Limit call depth
    --max-steps N      Limit executed instructions

\x1b[1mDEBUG OPTIONS:\x1b[0m
    --trace-vm         Log every dispatched instruction
    --dump-stack       Print the operand stack when execution stops

\x1b[1mENVIRONMENT:\x1b[0m
    RUST_LOG           Log filter, e.g. RUST_LOG=tinyvm_vm=debug

\x1b[1mEXAMPLES:\x1b[0m
    tinyvm run hello.tvm                  Run an image
    tinyvm run --max-steps 10000 loop.tvm Stop runaway loops
    tinyvm run --trace-vm --dump-stack p.tvm
    tinyvm disasm hello.tvm               Inspect an image"
    );
}
