use clap::{Parser, Subcommand};
use lamina::api::Session;
use lamina::runtime::reduce::Mode;
use std::io::{self, Write};

#[derive(Subcommand)]
enum Commands {
  /// Load a definitions file and evaluate an expression
  #[command(aliases = &["r"])]
  Run {
    /// A definitions file to load.
    #[arg(short = 'f', long, default_value = "")]
    file: String,

    /// The expression to evaluate.
    expr: String,
  },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Set the node store capacity ("auto" sizes from available memory).
  #[arg(short = 's', long, default_value = "auto", value_parser = parse_size)]
  size: usize,

  /// Surface (weak-head) reduction instead of deep reduction.
  #[arg(long, default_value_t = false)]
  surface: bool,

  /// Print each traversal step.
  #[arg(short = 't', long, default_value_t = false)]
  trace: bool,

  /// Print rule firings and elapsed time.
  #[arg(short = 'c', long, default_value_t = false)]
  stats: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

fn parse_size(text: &str) -> Result<usize, String> {
  if text == "auto" {
    Ok(lamina::runtime::default_capacity())
  } else {
    text.parse::<usize>().map_err(|err| format!("{}", err))
  }
}

fn run_cli() -> Result<(), String> {
  let Cli { size, surface, trace, stats, command } = Cli::parse();
  let mode = if surface { Mode::Surface } else { Mode::Deep };
  let mut session = Session::new(size, mode, trace);

  let show = |result: (String, u64, u64)| {
    let (norm, steps, time) = result;
    println!("{}", norm);
    if stats {
      eprintln!("\x1b[32m[TIME: {:.2}s | STEPS: {}]\x1b[0m", time as f64 / 1000.0, steps);
    }
  };

  match command {
    Some(Commands::Run { file, expr }) => {
      if !file.is_empty() {
        let code = std::fs::read_to_string(&file).map_err(|err| format!("{}: {}", file, err))?;
        session.load(&code)?;
      }
      show(session.eval(&expr)?);
      Ok(())
    }
    None => repl(&mut session, show),
  }
}

fn repl(session: &mut Session, show: impl Fn((String, u64, u64))) -> Result<(), String> {
  let stdin = io::stdin();
  println!("lamina {} | definitions as `Name = term`, anything else evaluates", env!("CARGO_PKG_VERSION"));
  loop {
    print!("> ");
    io::stdout().flush().map_err(|err| format!("{}", err))?;
    let mut line = String::new();
    match stdin.read_line(&mut line) {
      Ok(0) => return Ok(()),
      Ok(_) => {}
      Err(err) => return Err(format!("{}", err)),
    }
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let outcome = if let Some((name, body)) = definition_of(line) {
      session.define(name, body).map(|_| None)
    } else {
      session.eval(line).map(Some)
    };
    match outcome {
      Ok(Some(result)) => show(result),
      Ok(None) => {}
      Err(err) => eprintln!("{}", err),
    }
  }
}

// A line is a definition when it starts with a name followed by a single
// `=`; `==` belongs to expressions.
fn definition_of(line: &str) -> Option<(&str, &str)> {
  let eq = line.find('=')?;
  if line[eq + 1..].starts_with('=') {
    return None;
  }
  let name = line[..eq].trim();
  if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
    return None;
  }
  Some((name, line[eq + 1..].trim()))
}

fn main() {
  if let Err(err) = run_cli() {
    eprintln!("{}", err);
    std::process::exit(1);
  }
}
