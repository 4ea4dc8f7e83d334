//! Coral CLI: execute files, evaluate one-liners, or run the REPL.

use std::env;
use std::fs;
use std::process;

use colored::Colorize;

use coral::repl::Repl;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Coral {} - a small scripting language", VERSION);
    eprintln!();
    eprintln!("Usage: coral [options] [script.co]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e, --eval <code>   Evaluate a string and print its value");
    eprintln!("  -d, --disassemble   Print bytecode before executing");
    eprintln!("  -h, --help          Show this help");
    eprintln!("  -V, --version       Show version");
    eprintln!();
    eprintln!("With no script, an interactive REPL is started.");
}

fn parse_options() -> Result<Options, String> {
    let mut command = None;
    let mut disassemble = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                println!("coral {}", VERSION);
                process::exit(0);
            }
            "-d" | "--disassemble" => disassemble = true,
            "-e" | "--eval" => {
                let code = args.next().ok_or("option -e requires an argument")?;
                command = Some(Command::Eval { code });
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option '{}'", flag));
            }
            file => {
                if command.is_some() {
                    return Err(format!("unexpected argument '{}'", file));
                }
                command = Some(Command::Run {
                    file: file.to_string(),
                });
            }
        }
    }

    Ok(Options {
        command: command.unwrap_or(Command::Repl),
        disassemble,
    })
}

fn main() {
    let options = match parse_options() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message.red());
            print_usage();
            process::exit(2);
        }
    };

    match options.command {
        Command::Repl => Repl::new().run(),

        Command::Eval { code } => {
            match coral::run_with_disassembly(&code, options.disassemble) {
                Ok(value) => println!("{}", value),
                Err(err) => {
                    eprintln!("{}", err.to_string().red());
                    process::exit(1);
                }
            }
        }

        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("{}", format!("Failed to read '{}': {}", file, err).red());
                    process::exit(1);
                }
            };

            if let Err(err) = coral::run_with_disassembly(&source, options.disassemble) {
                eprintln!("{}", err.to_string().red());
                process::exit(1);
            }
        }
    }
}
