use clap::Parser as ClapParser;
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process,
};

use ow::{
    ExceptionExport, HeapSettings, InvokeFlags, Machine, MachineConfig, ModuleSource, ObjRef,
    PrintFlags, compiler,
};

const REPL_MODULE: &str = "repl";

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source files to run in order, `-` reads standard input
    #[arg(required = false, help = "The .ow files to run")]
    files: Vec<PathBuf>,

    /// Source text to run after the files
    #[arg(short, long)]
    eval: Option<String>,

    /// Call each module's `main` after its top level ran
    #[arg(long)]
    main: bool,

    /// Extra directories searched when a module is loaded by name
    #[arg(short = 'I', long = "path")]
    paths: Vec<PathBuf>,

    /// Collect on every allocation
    #[arg(long)]
    gc_stress: bool,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Start a REPL after the inputs ran (default if there are none)
    #[arg(long)]
    repl: bool,

    /// Print the compiled top level of each input instead of running it
    #[arg(long)]
    dump_bytecode: bool,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = MachineConfig {
        heap: HeapSettings {
            stress: cli.gc_stress,
            ..HeapSettings::default()
        },
        ..MachineConfig::default()
    };
    config.search_paths.extend(cli.paths.iter().cloned());
    let mut machine = Machine::with_config(config);

    for file in &cli.files {
        let (name, source) = if file.as_os_str() == "-" {
            ("main".to_owned(), ModuleSource::Stdin)
        } else {
            (module_name(file), ModuleSource::File(file))
        };
        run_module(&mut machine, &name, source, &cli);
    }
    if let Some(code) = &cli.eval {
        run_module(&mut machine, "main", ModuleSource::String(code), &cli);
    }

    if cli.dump_bytecode {
        return;
    }
    if cli.repl || (cli.files.is_empty() && cli.eval.is_none()) {
        run_repl(&mut machine);
    }
}

/// File stem of `path`, the name modules loaded from it are known by.
fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_owned())
}

/// Builds and runs one module, exiting the process on the first fault.
fn run_module(machine: &mut Machine, name: &str, source: ModuleSource, cli: &Cli) {
    if machine.make_module(Some(name), source).is_err() {
        exit_with_exception(machine);
    }

    if cli.dump_bytecode {
        let listing = machine
            .stack()
            .local(0)
            .ok()
            .and_then(|module| machine.as_module(module))
            .and_then(|module| machine.module_body(module))
            .and_then(|body| machine.disassemble(body.into()));
        match listing {
            Some(listing) => print!("{listing}"),
            None => println!("== {name}: no compiled code =="),
        }
        machine.drop(1);
        return;
    }

    let mut flags = InvokeFlags::MODULE | InvokeFlags::NO_RETURN;
    if cli.main {
        flags |= InvokeFlags::MODULE_MAIN;
    }
    if machine.invoke(0, flags).is_err() {
        exit_with_exception(machine);
    }
}

fn exit_with_exception(machine: &mut Machine) -> ! {
    let mut stderr = io::stderr().lock();
    if machine
        .read_exception(0, ExceptionExport::Print(&mut stderr), PrintFlags::all())
        .is_err()
    {
        let _ = writeln!(stderr, "error: unknown failure");
    }
    process::exit(1);
}

fn run_repl(machine: &mut Machine) {
    println!("ow {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' to quit.");

    // stays on the stack for the whole session, which keeps it alive
    if machine
        .make_module(Some(REPL_MODULE), ModuleSource::Empty)
        .is_err()
    {
        exit_with_exception(machine);
    }
    let Some(module) = machine
        .stack()
        .local(0)
        .ok()
        .and_then(|module| machine.as_module(module))
    else {
        eprintln!("error: cannot create the repl module");
        process::exit(1);
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {err}");
            break;
        }

        input_buffer.clear();
        match stdin.lock().read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }
                eval_line(machine, module, input);
            }
            Err(err) => {
                eprintln!("Error reading input: {err}");
                break;
            }
        }
    }
}

/// Compiles `input` into the session module, runs it and prints the result.
fn eval_line(machine: &mut Machine, module: ObjRef, input: &str) {
    let body = match compiler::compile(machine, module, input.as_bytes(), "<repl>") {
        Ok(body) => body,
        Err(err) => {
            eprintln!("Error: {err}");
            return;
        }
    };

    machine.push(body.into());
    match machine.invoke(0, InvokeFlags::empty()) {
        Ok(()) => {
            if let Ok(result) = machine.stack().local(0) {
                println!("{}", machine.repr_value(result));
            }
        }
        Err(_) => {
            let mut stderr = io::stderr().lock();
            let _ = machine.read_exception(
                0,
                ExceptionExport::Print(&mut stderr),
                PrintFlags::all(),
            );
        }
    }
    machine.drop(1);
}
