//! Hash-verified checkpoint files.
//!
//! One pair of files per checkpointed block, named `<kind>-<blockhash>.dat`:
//!
//! ```text
//! balances-<hash>.dat   address=property:balance;property:balance;
//! globals-<hash>.dat    legacy_counter,next_main_id,next_test_id
//! ```
//!
//! Every data line feeds a SHA-256 accumulator (without its newline). The
//! last line of each file is `!<hex>` holding the double SHA-256 of the
//! accumulated bytes. Empty lines and lines starting with `#` are ignored on
//! load.

use crate::CheckpointError;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tallyscan_ledger::{TallyKind, TallyLedger};
use tallyscan_types::{Address, Ecosystem, Hash, PropertyId};
use tracing::{debug, info, warn};

/// Counters persisted next to the balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalCounters {
    /// Last-processed legacy counter.
    pub legacy_counter: u64,
    pub next_main: PropertyId,
    pub next_test: PropertyId,
}

impl Default for GlobalCounters {
    fn default() -> Self {
        Self {
            legacy_counter: 0,
            next_main: Ecosystem::Main.first_issued(),
            next_test: Ecosystem::Test.first_issued(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckpointKind {
    Balances,
    Globals,
}

impl CheckpointKind {
    pub const ALL: [CheckpointKind; 2] = [CheckpointKind::Balances, CheckpointKind::Globals];

    pub fn prefix(self) -> &'static str {
        match self {
            CheckpointKind::Balances => "balances",
            CheckpointKind::Globals => "globals",
        }
    }
}

/// State restored from one checkpoint pair.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub block_hash: Hash,
    pub ledger: TallyLedger,
    pub globals: GlobalCounters,
}

/// Directory of checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if needed) the checkpoint directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: CheckpointKind, block_hash: &Hash) -> PathBuf {
        self.dir
            .join(format!("{}-{}.dat", kind.prefix(), block_hash.to_hex()))
    }

    /// Write the checkpoint pair for `block_hash`.
    ///
    /// If either file fails to write, both are removed so no partial pair
    /// is left behind.
    pub fn write(
        &self,
        block_hash: &Hash,
        ledger: &TallyLedger,
        globals: &GlobalCounters,
    ) -> Result<(), CheckpointError> {
        let result = write_lines(
            &self.path(CheckpointKind::Balances, block_hash),
            &encode_balances(ledger),
        )
        .and_then(|()| {
            write_lines(
                &self.path(CheckpointKind::Globals, block_hash),
                &[encode_globals(globals)],
            )
        });

        if let Err(e) = result {
            warn!(block_hash = %block_hash, error = %e, "Checkpoint write failed, removing partial files");
            // Best effort: the original error is what the caller needs.
            let _ = self.remove(block_hash);
            return Err(e);
        }
        debug!(block_hash = %block_hash, addresses = ledger.len(), "Checkpoint written");
        Ok(())
    }

    /// Load the checkpoint pair for `block_hash`.
    ///
    /// With `verify`, a missing or mismatched integrity tag in either file
    /// rejects the whole checkpoint.
    pub fn load(&self, block_hash: &Hash, verify: bool) -> Result<Checkpoint, CheckpointError> {
        let balances_path = self.path(CheckpointKind::Balances, block_hash);
        let ledger = decode_balances(&balances_path, &read_lines(&balances_path, verify)?)?;

        let globals_path = self.path(CheckpointKind::Globals, block_hash);
        let globals = decode_globals(&globals_path, &read_lines(&globals_path, verify)?)?;

        Ok(Checkpoint {
            block_hash: *block_hash,
            ledger,
            globals,
        })
    }

    /// Block hashes with at least one checkpoint file present.
    pub fn list(&self) -> Result<BTreeSet<Hash>, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;
        let mut hashes = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.dir, e))?;
            let name = entry.file_name();
            if let Some(hash) = name.to_str().and_then(parse_file_name) {
                hashes.insert(hash);
            }
        }
        Ok(hashes)
    }

    /// Remove both files for `block_hash`. Missing files are not an error.
    pub fn remove(&self, block_hash: &Hash) -> Result<(), CheckpointError> {
        for kind in CheckpointKind::ALL {
            let path = self.path(kind, block_hash);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::io(&path, e)),
            }
        }
        Ok(())
    }

    /// Remove every checkpoint for which `is_stale` returns true.
    pub fn prune(&self, is_stale: impl Fn(&Hash) -> bool) -> Result<usize, CheckpointError> {
        let mut removed = 0;
        for hash in self.list()? {
            if is_stale(&hash) {
                self.remove(&hash)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Pruned stale checkpoints");
        }
        Ok(removed)
    }

    /// Remove every checkpoint in the directory.
    pub fn wipe(&self) -> Result<usize, CheckpointError> {
        let removed = self.prune(|_| true)?;
        info!(removed, dir = %self.dir.display(), "Checkpoint directory wiped");
        Ok(removed)
    }
}

fn parse_file_name(name: &str) -> Option<Hash> {
    let stem = name.strip_suffix(".dat")?;
    let (prefix, hash) = stem.split_once('-')?;
    CheckpointKind::ALL
        .iter()
        .any(|k| k.prefix() == prefix)
        .then(|| Hash::from_hex(hash).ok())
        .flatten()
}

/// Balance lines: non-zero available balances only, properties in
/// first-touch order, addresses ascending. Addresses with nothing to write
/// get no line.
pub fn encode_balances(ledger: &TallyLedger) -> Vec<String> {
    let mut lines = Vec::new();
    for (address, tally) in ledger.iter() {
        let mut line = String::new();
        for property in tally.properties() {
            let balance = tally.balance(property, TallyKind::Available);
            if balance != 0 {
                line.push_str(&format!("{property}:{balance};"));
            }
        }
        if !line.is_empty() {
            lines.push(format!("{address}={line}"));
        }
    }
    lines
}

pub fn encode_globals(globals: &GlobalCounters) -> String {
    format!(
        "{},{},{}",
        globals.legacy_counter, globals.next_main, globals.next_test
    )
}

fn integrity_tag(lines: &[String]) -> Hash {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
    }
    Hash::from_bytes(Sha256::digest(hasher.finalize()).into())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), CheckpointError> {
    let file = File::create(path).map_err(|e| CheckpointError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let io = |e| CheckpointError::io(path, e);

    for line in lines {
        writeln!(writer, "{line}").map_err(io)?;
    }
    writeln!(writer, "!{}", integrity_tag(lines)).map_err(io)?;

    let file = writer
        .into_inner()
        .map_err(|e| CheckpointError::io(path, e.into_error()))?;
    file.sync_all().map_err(io)
}

/// Data lines of a checkpoint file, after optional tag verification.
fn read_lines(path: &Path, verify: bool) -> Result<Vec<String>, CheckpointError> {
    let file = File::open(path).map_err(|e| CheckpointError::io(path, e))?;
    let mut data = Vec::new();
    let mut tag: Option<String> = None;

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| CheckpointError::io(path, e))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(hex) = line.strip_prefix('!') {
            tag = Some(hex.to_string());
            continue;
        }
        data.push(line.to_string());
    }

    if verify {
        let expected = integrity_tag(&data).to_hex();
        match tag {
            Some(found) if found.eq_ignore_ascii_case(&expected) => {}
            _ => {
                warn!(path = %path.display(), "Checkpoint integrity tag mismatch");
                return Err(CheckpointError::HashMismatch(path.to_path_buf()));
            }
        }
    }
    Ok(data)
}

fn decode_balances(path: &Path, lines: &[String]) -> Result<TallyLedger, CheckpointError> {
    let malformed = |line: usize, reason: String| CheckpointError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut ledger = TallyLedger::new();
    for (n, line) in lines.iter().enumerate() {
        let (address, balances) = line
            .split_once('=')
            .ok_or_else(|| malformed(n, "missing '='".into()))?;
        let address = Address::new(address).map_err(|e| malformed(n, e.to_string()))?;

        for item in balances.split(';').filter(|s| !s.is_empty()) {
            let (property, balance) = item
                .split_once(':')
                .ok_or_else(|| malformed(n, format!("bad entry {item:?}")))?;
            let property: PropertyId = property
                .parse()
                .map_err(|_| malformed(n, format!("bad property {property:?}")))?;
            let balance: i64 = balance
                .parse()
                .map_err(|_| malformed(n, format!("bad balance {balance:?}")))?;
            if balance == 0 {
                continue;
            }
            if !ledger.credit(&address, property, balance, TallyKind::Available) {
                return Err(malformed(n, format!("balance {balance} out of range")));
            }
        }
    }
    Ok(ledger)
}

fn decode_globals(path: &Path, lines: &[String]) -> Result<GlobalCounters, CheckpointError> {
    let malformed = |reason: String| CheckpointError::Malformed {
        path: path.to_path_buf(),
        line: 0,
        reason,
    };
    let [line] = lines else {
        return Err(malformed(format!("expected one line, found {}", lines.len())));
    };

    let fields: Vec<&str> = line.split(',').collect();
    let [legacy, main, test] = fields.as_slice() else {
        return Err(malformed(format!("expected 3 fields, found {}", fields.len())));
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| malformed(format!("bad counter {s:?}")))
    };
    let id = |s: &str| -> Result<PropertyId, CheckpointError> {
        let v = parse(s)?;
        u32::try_from(v)
            .map(PropertyId)
            .map_err(|_| malformed(format!("property id {v} out of range")))
    };

    Ok(GlobalCounters {
        legacy_counter: parse(*legacy)?,
        next_main: id(*main)?,
        next_test: id(*test)?,
    })
}
