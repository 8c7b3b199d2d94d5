mod theme;

use clap::{Parser as ClapParser, Subcommand};
use cliclack::{input, intro, set_theme};
use js_host::{describe_error, EngineError, Engine, Options, Value};
use theme::DefaultTheme;

/// A JavaScript engine
#[derive(Debug, ClapParser)]
#[command(name = "js_cli")]
#[command(about = "A JavaScript engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluates one or more files
    Eval {
        /// Evaluates the last file as an ECMAScript module.
        #[arg(short, long)]
        module: bool,

        /// Caps evaluator recursion depth.
        #[arg(long, default_value_t = 2048)]
        max_call_depth: usize,

        /// The files to evaluate.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Prints the result of every file's evaluation.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Runs the REPL
    Repl {
        #[arg(long, default_value_t = 2048)]
        max_call_depth: usize,
    },
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    match args.command {
        Command::Eval { module, max_call_depth, paths, verbose } => run_eval(module, max_call_depth, paths, verbose),
        Command::Repl { max_call_depth } => run_repl(max_call_depth),
    }
}

fn run_eval(module: bool, max_call_depth: usize, paths: Vec<String>, verbose: bool) {
    let options = Options { max_call_depth, ..Options::default() };
    let mut engine = Engine::new(options);
    let last_index = paths.len() - 1;

    for (index, path) in paths.into_iter().enumerate() {
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("{path}: {err}");
                std::process::exit(1);
            }
        };
        log::debug!("evaluating {path} ({} bytes, module={})", source.len(), module && index == last_index);
        let result = if module && index == last_index { engine.eval_module(&path, &source) } else { engine.eval(&source) };
        print_result(result, verbose);
    }
}

fn run_repl(max_call_depth: usize) {
    let options = Options { max_call_depth, ..Options::default() };
    let mut engine = Engine::new(options);

    set_theme(DefaultTheme);
    println!();
    let mut placeholder = "Enter a line of Javascript".to_string();

    let _ = ctrlc::set_handler(|| std::process::exit(0));

    loop {
        if intro("JS Repl").is_err() {
            return;
        }
        let Ok(line): Result<std::string::String, _> = input("").placeholder(&placeholder).interact() else {
            return;
        };
        if line == "exit" {
            return;
        }
        placeholder = line.clone();
        match engine.eval(&line) {
            Ok(value) => println!("{}\n", value.to_display_string()),
            Err(err) => eprintln!("Uncaught exception: {}\n", describe_error(&err)),
        }
    }
}

fn print_result(result: Result<Value, js_host::EngineError>, verbose: bool) {
    match result {
        Ok(value) => {
            if verbose {
                println!("{}", value.to_display_string());
            }
        }
        Err(EngineError::Parse(e)) => {
            eprintln!("Parse errors: {e}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Uncaught exception: {}", describe_error(&err));
            std::process::exit(1);
        }
    }
}
