mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::Parser as _;

use error::Error;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

/// Tree-walking interpreter for the Ell scripting language.
#[derive(clap::Parser)]
#[command(name = "ell", version)]
struct Args {
    /// Script to run; starts a REPL when omitted.
    script: Option<PathBuf>,
}

struct Ell {
    interpreter: Interpreter,
    // watermark for variable-reference ids; resolution data outlives a
    // single REPL line, so ids must never repeat within a session
    next_id: usize,
}

impl Ell {
    fn new() -> Self {
        Ell {
            interpreter: Interpreter::new(),
            next_id: 0,
        }
    }

    fn run_file(&mut self, path: &PathBuf) -> Result<(), Error> {
        let contents = fs::read_to_string(path)?;
        self.run(contents)
    }

    fn run_prompt(&mut self) -> Result<(), Error> {
        self.interpreter.set_repl(true);

        let stdin = io::stdin();
        let mut handle = stdin.lock();

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if handle.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                break;
            }

            // a bad line doesn't end the session; compile diagnostics were
            // printed where they were found and runtime errors print here
            match self.run(line.to_string()) {
                Ok(()) | Err(Error::Parse) => (),
                Err(err @ Error::Runtime { .. }) => eprintln!("{err}"),
                Err(other) => return Err(other),
            }
        }

        Ok(())
    }

    fn run(&mut self, source: String) -> Result<(), Error> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens();

        let mut parser = Parser::new(tokens);
        parser.next_id = self.next_id;
        let statements = parser.parse()?;
        self.next_id = parser.next_id;
        let had_parse_error = parser.had_error;

        // code with a syntax error never runs, so there is no point in
        // resolving it
        if had_parse_error || scanner.had_error {
            return Err(Error::Parse);
        }
        log::debug!("parsed {} statements", statements.len());

        // The resolver has a reference to the interpreter and pokes the
        // resolution data directly into it as it walks over variables.
        // When the interpreter runs next, it has everything it needs.
        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);

        if resolver.had_error {
            return Err(Error::Parse);
        }

        self.interpreter.interpret(&statements)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    env_logger::init();

    let args = Args::parse();
    let mut ell = Ell::new();

    match args.script {
        Some(path) => match ell.run_file(&path) {
            Ok(()) => (),
            Err(err @ Error::Runtime { .. }) => {
                eprintln!("{err}");
                exit(70)
            }
            Err(Error::Parse) => exit(65),
            Err(Error::Io(err)) => {
                eprintln!("{err}");
                exit(74)
            }
        },
        None => ell.run_prompt()?,
    }

    Ok(())
}
