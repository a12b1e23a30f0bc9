use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dynwrap::{InvokeKind, Session, TaggedValue};

#[derive(Parser)]
#[command(name = "dynwrap", version, about = "Call native functions by name with tagged arguments")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log registrations and generated call stubs (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register MODULE!FUNCTION and call it once with kind:value arguments
    Call {
        module: String,
        function: String,
        /// e.g. i32:-5 u64:0x10 f64:2.5 str:hello null
        args: Vec<String>,
    },
    /// Register functions from MODULE and print the name table
    Names {
        module: String,
        functions: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> dynwrap::Result<()> {
    let mut session = Session::open()?;
    match &cli.command {
        Command::Call { module, function, args } => {
            let args = args.iter().map(|a| a.parse()).collect::<dynwrap::Result<Vec<TaggedValue>>>()?;
            register(&mut session, module, function)?;
            let id = session.id_of_name(function)?;
            // The user supplied both the symbol and its argument kinds.
            let result = unsafe { session.invoke(id, InvokeKind::Method, &args) }?;
            if cli.json {
                println!("{}", to_json(&result));
            } else {
                println!("{}", result);
            }
        }
        Command::Names { module, functions } => {
            for function in functions {
                register(&mut session, module, function)?;
            }
            if cli.json {
                println!("{}", to_json(session.names()));
            } else {
                for entry in session.names().entries() {
                    println!("{} {}", entry.id, entry.name);
                }
            }
        }
    }
    Ok(())
}

/// Register through the host protocol: look up `DwRegister` and invoke it.
fn register(session: &mut Session, module: &str, function: &str) -> dynwrap::Result<()> {
    let register_id = session.id_of_name("DwRegister")?;
    let args = [TaggedValue::Str(function.to_string()), TaggedValue::Str(module.to_string())];
    // DwRegister only resolves symbols; it never calls into them.
    unsafe { session.invoke(register_id, InvokeKind::Method, &args) }?;
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
}
