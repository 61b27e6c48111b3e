//! `query DB [QUERYFILE]` — reads a query in the minimal grammar from
//! `QUERYFILE` if given, else runs an interactive REPL over stdin.
//! Interactive commands: `help`, `exit`; a leading `explain ` prefix
//! prints the plan tree instead of running it.

use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use rdf_core::codegen;
use rdf_core::database::Database;
use rdf_core::operator::results_printer::ResultsPrinter;
use rdf_core::operator::Operator;
use rdf_core::query::parser::Parser;
use rdf_core::query::planner::build_plan;
use rdf_core::runtime::Runtime;
use rdf_core::log::init_log;

fn explain(src: &str) -> Result<String, String> {
    let graph = Parser::parse(src).map_err(|e| e.to_string())?;
    let plan = build_plan(&graph).map_err(|e| e.to_string())?;
    Ok(format!("{:#?}", plan.root))
}

fn run_query(db: &Database, src: &str) -> Result<(), String> {
    let graph = Parser::parse(src).map_err(|e| e.to_string())?;
    let plan = build_plan(&graph).map_err(|e| e.to_string())?;
    let compiled = codegen::compile(&plan, db.facts(), db.differential(), db.dictionary())
        .map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut printer = ResultsPrinter::new(
        compiled.operator,
        compiled.output_registers,
        db.dictionary(),
        compiled.duplicates,
        stdout.lock(),
    );
    let mut rt = Runtime::new(compiled.register_count);

    let mut mult = printer.first(&mut rt).map_err(|e| e.to_string())?;
    let mut rows = 0u64;
    while mult != 0 {
        rows += 1;
        mult = printer.next(&mut rt).map_err(|e| e.to_string())?;
    }
    if rows == 0 {
        println!("<empty result>");
    }
    Ok(())
}

fn handle(db: &Database, line: &str) {
    if let Some(rest) = line.strip_prefix("explain ") {
        match explain(rest) {
            Ok(plan) => println!("{}", plan),
            Err(e) => eprintln!("query: {}", e),
        }
    } else if let Err(e) = run_query(db, line) {
        eprintln!("query: {}", e);
    }
}

fn repl(db: &Database) {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "exit" => break,
            "help" => {
                println!("commands: help, exit; prefix a query with 'explain ' to print its plan");
            }
            _ => handle(db, line),
        }
    }
}

fn run() -> Result<(), String> {
    init_log();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().ok_or("usage: query DB [QUERYFILE]")?;
    let query_path = args.next();

    let db = Database::open(&db_path).map_err(|e| e.to_string())?;

    match query_path {
        Some(path) => {
            let src = fs::read_to_string(&path).map_err(|e| e.to_string())?;
            handle(&db, src.trim());
        }
        None => repl(&db),
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("query: {}", e);
            ExitCode::FAILURE
        }
    }
}
