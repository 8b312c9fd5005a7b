use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, IsTerminal, Read, Write},
    process,
};

use tern::{Error, HeapSettings, Vm, VmSettings};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "The .tn files to execute")]
    files: Vec<String>,

    /// Print the disassembled segment instead of executing
    #[arg(long, help = "Dump bytecode + data section for inputs")]
    dump_bytecode: bool,

    /// Arena size in bytes
    #[arg(long, default_value_t = HeapSettings::default().arena_size)]
    arena_size: usize,

    /// Maximum call depth
    #[arg(long, default_value_t = VmSettings::default().max_frames)]
    max_frames: usize,

    /// Print garbage collector statistics on exit
    #[arg(long)]
    gc_stats: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = VmSettings {
        heap: HeapSettings {
            arena_size: cli.arena_size,
        },
        max_frames: cli.max_frames,
    };
    let mut vm = match Vm::new(settings) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(2);
        }
    };

    if cli.files.is_empty() {
        if io::stdin().is_terminal() && !cli.dump_bytecode {
            run_repl(&mut vm);
        } else {
            let mut source = String::new();
            if let Err(err) = io::stdin().read_to_string(&mut source) {
                eprintln!("Error reading stdin: {err}");
                process::exit(1);
            }
            process_source(&mut vm, &cli, "<stdin>", &source, None);
        }
    }

    for filename in &cli.files {
        let source_code = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{filename}': {err}");
                process::exit(1);
            }
        };
        process_source(&mut vm, &cli, filename, &source_code, Some(filename));
    }

    if cli.gc_stats {
        print_gc_stats(&vm);
    }
}

fn process_source(
    vm: &mut Vm,
    cli: &Cli,
    name: &str,
    source: &str,
    file: Option<&str>,
) {
    if cli.dump_bytecode {
        match vm.compile_source(source) {
            Ok(image) => {
                println!("== {name} ==");
                print!("{}", bytecode::disassemble(&image.code, &image.data));
            }
            Err(err) => {
                eprintln!("Error compiling {name}: {err}");
                process::exit(1);
            }
        }
        return;
    }

    let result = match file {
        Some(path) => vm.run_file(path),
        None => vm.run(source),
    };
    if let Err(err) = result {
        report(name, source, &err);
        if cli.gc_stats {
            print_gc_stats(vm);
        }
        process::exit(1);
    }
}

fn run_repl(vm: &mut Vm) {
    println!("tern REPL");
    println!("Type 'exit' to quit.");

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
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }
                match vm.run(&input_buffer) {
                    Ok(value) if value == vm.null() => {}
                    Ok(value) => println!("{}", vm.display(value)),
                    Err(err) => report("<input>", &input_buffer, &err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {err}");
                break;
            }
        }
    }
}

/// Print `err`, with the offending source line for parse and compile
/// errors.
fn report(name: &str, source: &str, err: &Error) {
    eprintln!("Error executing {name}: {err}");
    let span = match err {
        Error::Parse(err) => Some(err.span),
        Error::Compile(err) => err.span,
        _ => None,
    };
    if let Some(span) = span {
        if let Some(line) = source.lines().nth(span.start.line.saturating_sub(1)) {
            eprintln!("  {line}");
            eprintln!("  {}^", " ".repeat(span.start.column.saturating_sub(1)));
        }
    }
}

fn print_gc_stats(vm: &Vm) {
    let stats = vm.gc_stats();
    eprintln!(
        "gc: {} collections, {} live bytes, {} freed last cycle, {} freed total, arena {} bytes",
        stats.collections,
        stats.live_bytes,
        stats.last_freed,
        stats.total_freed,
        stats.arena_capacity
    );
}
