use std::io::{self, BufRead, Write};

use calcrepl::{Evaluator, Lexer, Parser, lex::tokenize};
use clap::{Parser as _, Subcommand};
use miette::{Diagnostic, IntoDiagnostic, NamedSource, Report, WrapErr};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const WELCOME: &str = "\
====================================
 Welcome to the Math Expression CLI
====================================

Operators:
  Addition (+), Subtraction (-), Multiplication (*), Division (/)
  Integer Division (\\), Power (^), Modulus (%), Factorial (!)
  Unary plus (+), Unary minus (-), and assignment (x = 5)

Built-in functions:
  Trigonometry: sin, cos, tan, asin, acos, atan, atan2
  Exponential & logs: exp, sqrt, log (ln), log10
  Rounding & absolute: abs, floor, ceil, round
  Aggregates: min, max, factorial

Constants: pi, e, inf, nan
User functions take one parameter; built-in names cannot be redefined.

Examples:
  x = 5
  y = 3
  f(x) = x^2 + 2
  f(3)            -> 11
  max(1, 5, 2)    -> 5

Type `help` to see this again, `exit` to quit.
------------------------------------
";

/// Evaluates arithmetic expressions with variables and single-parameter functions.
#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Log more (-v for debug, -vv for trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Do not print the welcome banner when starting the interactive prompt.
    #[arg(long)]
    no_banner: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tokens of an expression, one per line.
    Tokenize { expression: String },
    /// Print the syntax tree of an expression.
    Parse { expression: String },
    /// Evaluate expressions in order within one session.
    Eval {
        #[arg(required = true)]
        expressions: Vec<String>,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Some(Commands::Tokenize { expression }) => {
            for token in Lexer::new(&expression) {
                let token = token.map_err(|e| report(e, &expression))?;
                println!("{token}");
            }
        }
        Some(Commands::Parse { expression }) => {
            let tokens = tokenize(&expression).map_err(|e| report(e, &expression))?;
            let node = Parser::new(tokens)
                .parse()
                .map_err(|e| report(e, &expression))?;
            print!("{}", node.tree());
        }
        Some(Commands::Eval { expressions }) => {
            let mut session = Evaluator::new();
            for expression in &expressions {
                let value = session
                    .eval_line(expression)
                    .map_err(|e| report(e, expression))?;
                println!("{value}");
            }
        }
        None => repl(!args.no_banner)?,
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("warn,calcrepl={level}")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn report(error: impl Diagnostic + Send + Sync + 'static, source: &str) -> Report {
    Report::new(error).with_source_code(NamedSource::new("<input>", source.to_string()))
}

fn repl(banner: bool) -> miette::Result<()> {
    if banner {
        print!("{WELCOME}");
    }

    let mut session = Evaluator::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!(">> ");
        io::stdout().flush().into_diagnostic()?;

        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .into_diagnostic()
            .wrap_err("reading from stdin failed")?;
        if read == 0 {
            break;
        }

        let input = line.trim();
        match input {
            "" => continue,
            "exit" => {
                println!("See you again!");
                break;
            }
            "help" | "?" => {
                print!("{WELCOME}");
                continue;
            }
            _ => {}
        }

        match session.eval_line(input) {
            Ok(value) => println!("{value}"),
            Err(e) => {
                println!("Error: \"{e}\"");
                debug!("{:?}", report(e, input));
            }
        }
    }

    Ok(())
}
