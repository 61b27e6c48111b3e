//! `updatetest INPUT` — splits the line-oriented fact file into
//! fixed-size chunks, loads the first chunk through the ordinary
//! bulkload path, then replays the remaining chunks concurrently
//! against a [`DifferentialIndex`] from worker threads and reports
//! throughput and how many triples were loaded by more than one chunk.

use std::collections::HashSet;
use std::fs;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rdf_core::database::Database;
use rdf_core::dictionary::Dictionary;
use rdf_core::differential::DifferentialIndex;
use rdf_core::ids::Triple;
use rdf_core::log::init_log;

const CHUNK_SIZE: usize = 1000;
const WORKER_COUNT: usize = 4;

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

fn load_chunk(db: &Database, lines: &[String]) -> u64 {
    let mut count = 0;
    for line in lines {
        if let Some((s, p, o)) = parse_line(line) {
            let s = db.intern(&s).unwrap();
            let p = db.intern(&p).unwrap();
            let o = db.intern(&o).unwrap();
            db.bulk_insert(Triple::new(s, p, o)).unwrap();
            count += 1;
        }
    }
    count
}

fn replay_chunk(
    dict: &Dictionary,
    diff: &DifferentialIndex,
    seen: &Mutex<HashSet<(u32, u32, u32)>>,
    tx_counter: &AtomicU64,
    lines: &[String],
) -> (u64, u64) {
    let mut loaded = 0u64;
    let mut conflicts = 0u64;
    for line in lines {
        let (s, p, o) = match parse_line(line) {
            Some(parts) => parts,
            None => continue,
        };
        let s = dict.intern(&s).unwrap();
        let p = dict.intern(&p).unwrap();
        let o = dict.intern(&o).unwrap();
        let triple = Triple::new(s, p, o);

        let first_seen = seen.lock().unwrap().insert((s, p, o));
        if !first_seen {
            conflicts += 1;
        }

        let tx = tx_counter.fetch_add(1, Ordering::SeqCst);
        diff.load(tx, triple);
        loaded += 1;
    }
    (loaded, conflicts)
}

fn run() -> Result<(), String> {
    init_log();

    let mut args = std::env::args().skip(1);
    let input_path = args.next().ok_or("usage: updatetest INPUT")?;

    let text = fs::read_to_string(&input_path).map_err(|e| e.to_string())?;
    let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    let chunks: Vec<Vec<String>> = lines.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect();
    if chunks.is_empty() {
        return Err("input file is empty".to_string());
    }

    let db_dir = std::env::temp_dir().join(format!("updatetest-{}", std::process::id()));
    fs::create_dir_all(&db_dir).map_err(|e| e.to_string())?;
    let db = Database::create(db_dir.join("updatetest.rdfdb")).map_err(|e| e.to_string())?;

    let prefix_loaded = load_chunk(&db, &chunks[0]);
    db.sync().map_err(|e| e.to_string())?;
    log::info!("updatetest: loaded prefix chunk ({} facts)", prefix_loaded);

    let dict = db.dictionary();
    let diff = db.differential();
    let seen: Mutex<HashSet<(u32, u32, u32)>> = Mutex::new(HashSet::new());
    let tx_counter = AtomicU64::new(1);

    let remaining = &chunks[1..];
    let start = Instant::now();

    let mut total_loaded = 0u64;
    let mut total_conflicts = 0u64;
    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = remaining
            .chunks((remaining.len() / WORKER_COUNT).max(1))
            .map(|worker_chunks| {
                let dict = dict.clone();
                let diff = diff.clone();
                let seen = &seen;
                let tx_counter = &tx_counter;
                scope.spawn(move |_| {
                    let mut loaded = 0u64;
                    let mut conflicts = 0u64;
                    for chunk in worker_chunks {
                        let (l, c) = replay_chunk(&dict, &diff, seen, tx_counter, chunk);
                        loaded += l;
                        conflicts += c;
                    }
                    (loaded, conflicts)
                })
            })
            .collect();

        for handle in handles {
            let (loaded, conflicts) = handle.join().unwrap();
            total_loaded += loaded;
            total_conflicts += conflicts;
        }
    })
    .map_err(|_| "worker thread panicked".to_string())?;

    let elapsed = start.elapsed();
    let throughput = total_loaded as f64 / elapsed.as_secs_f64().max(1e-9);

    println!(
        "updatetest: replayed {} facts in {:?} ({:.1} facts/sec), {} conflicting triples",
        total_loaded, elapsed, throughput, total_conflicts
    );
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("updatetest: {}", e);
            ExitCode::FAILURE
        }
    }
}
