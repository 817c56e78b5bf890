use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use tlox::{
    interpreter::Interpreter,
    parser::{self, ParseErrors},
    tokenizer::{Token, Tokenizer},
};
use tracing_subscriber::EnvFilter;

const EXIT_UNREADABLE: u8 = 1;
const EXIT_DATA_ERROR: u8 = 65;
const EXIT_SOFTWARE: u8 = 70;

#[derive(Debug, Parser)]
#[command(version, about = "Tree-walking interpreter for a statically annotated scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every token, one per line.
    Tokenize(FileArgs),
    /// Print the syntax tree as S-expressions.
    Parse(ParseArgs),
    /// Evaluate the file as a single expression and print the result.
    Evaluate(FileArgs),
    /// Execute the file as a program.
    Run(FileArgs),
    Repl,
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ParseArgs {
    file: PathBuf,
    /// Parse a whole program instead of a single expression.
    #[arg(long)]
    program: bool,
}

fn main() -> ExitCode {
    install_tracing();
    let args = Cli::parse();

    match args.command() {
        Command::Tokenize(args) => tokenize_command(args),
        Command::Parse(args) => parse_command(args),
        Command::Evaluate(args) => evaluate_command(args),
        Command::Run(args) => run_command(args),
        Command::Repl => {
            repl_command();
            ExitCode::SUCCESS
        }
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(file: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(file).map_err(|e| {
        eprintln!("Could not read '{}': {}", file.display(), e);
        ExitCode::from(EXIT_UNREADABLE)
    })
}

/// Reports lexical errors, then still parses so syntax errors show up in
/// the same run. Returns `None` when anything was reported.
fn front_end<T>(source: &str, parse: impl FnOnce(&[Token]) -> Result<T, ParseErrors>) -> Option<T> {
    let (tokens, errors) = Tokenizer::new(source).scan();
    for error in &errors {
        eprintln!("{}", error);
    }

    match parse(&tokens) {
        Ok(parsed) if errors.is_empty() => Some(parsed),
        Ok(_) => None,
        Err(parse_errors) => {
            eprintln!("{}", parse_errors);
            None
        }
    }
}

fn tokenize_command(args: &FileArgs) -> ExitCode {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let (tokens, errors) = Tokenizer::new(&source).scan();
    for error in &errors {
        eprintln!("{}", error);
    }
    for token in &tokens {
        println!("{}", token);
    }

    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_DATA_ERROR)
    }
}

fn parse_command(args: &ParseArgs) -> ExitCode {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let printed = if args.program {
        front_end(&source, parser::program).map(|program| program.to_string())
    } else {
        front_end(&source, parser::single_expression).map(|expression| format!("{}\n", expression))
    };

    match printed {
        Some(printed) => {
            print!("{}", printed);
            ExitCode::SUCCESS
        }
        None => ExitCode::from(EXIT_DATA_ERROR),
    }
}

fn evaluate_command(args: &FileArgs) -> ExitCode {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let Some(expression) = front_end(&source, parser::single_expression) else {
        return ExitCode::from(EXIT_DATA_ERROR);
    };

    match Interpreter::default().evaluate_expression(&expression) {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}

fn run_command(args: &FileArgs) -> ExitCode {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let Some(program) = front_end(&source, parser::program) else {
        return ExitCode::from(EXIT_DATA_ERROR);
    };

    match Interpreter::default().interpret_file(&args.file, &program) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}

fn repl_command() {
    println!("Welcome to the tlox REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut interpreter = Interpreter::default();
    let mut input = String::new();

    loop {
        print!("> ");
        if std::io::stdout().flush().is_err() {
            break;
        }

        input.clear();
        match std::io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let program = match tlox::parse_program(input.trim()) {
            Ok(program) => program,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        if let Err(e) = interpreter.interpret(&program) {
            eprintln!("{}", e);
        }
    }
}
