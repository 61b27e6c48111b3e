//! `bulkload DB INPUT` — parses line-oriented `subject predicate object .`
//! facts and writes all six permutation indices plus their
//! aggregated/fully-aggregated projections directly (bypassing the
//! differential overlay, which is the online-update path).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use rdf_core::database::Database;
use rdf_core::ids::Triple;
use rdf_core::log::init_log;

fn parse_line(line: &str) -> Option<(String, String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.last() == Some(&".") {
        tokens.pop();
    }
    if tokens.len() != 3 {
        return None;
    }
    let strip = |t: &str| -> String {
        t.trim_start_matches('<').trim_end_matches('>').to_string()
    };
    Some((strip(tokens[0]), strip(tokens[1]), strip(tokens[2])))
}

fn run() -> Result<(), String> {
    init_log();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().ok_or("usage: bulkload DB INPUT")?;
    let input_path = args.next().ok_or("usage: bulkload DB INPUT")?;

    let db = Database::create(&db_path).map_err(|e| e.to_string())?;

    let file = File::open(&input_path).map_err(|e| e.to_string())?;
    let reader = BufReader::new(file);

    let mut count = 0u64;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        let (s, p, o) = match parse_line(&line) {
            Some(parts) => parts,
            None => continue,
        };
        let s = db.intern(&s).map_err(|e| e.to_string())?;
        let p = db.intern(&p).map_err(|e| e.to_string())?;
        let o = db.intern(&o).map_err(|e| e.to_string())?;
        db.bulk_insert(Triple::new(s, p, o))
            .map_err(|e| format!("line {}: {}", lineno + 1, e))?;
        count += 1;
    }

    db.sync().map_err(|e| e.to_string())?;
    log::info!("bulkload: loaded {} facts into {}", count, PathBuf::from(db_path).display());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bulkload: {}", e);
            ExitCode::FAILURE
        }
    }
}
