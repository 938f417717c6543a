//! Block dump read as a chain source.
//!
//! The file holds one JSON-encoded [`Block`] per line, in height order,
//! each block linking to the previous one by `prev_hash`. Blank lines are
//! ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tallyscan_classifier::TransactionSource;
use tallyscan_engine::ChainSource;
use tallyscan_types::{Block, BlockHeader, BlockHeight, Hash, Transaction};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ChainFileError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {reason}")]
    Discontinuous { line: usize, reason: String },
}

#[derive(Default)]
struct ChainData {
    blocks: Vec<Block>,
    by_hash: HashMap<Hash, usize>,
    transactions: HashMap<Hash, (usize, usize)>,
}

/// Read-only chain loaded from a JSON-lines block dump.
pub struct FileChain {
    data: ChainData,
    base: BlockHeight,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for FileChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChain")
            .field("base", &self.base)
            .field("blocks", &self.data.blocks.len())
            .field("transactions", &self.data.transactions.len())
            .finish_non_exhaustive()
    }
}

impl FileChain {
    /// Load and validate the dump at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainFileError> {
        let path = path.as_ref();
        let io = |source| ChainFileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io)?);

        let mut blocks = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(io)?;
            if line.trim().is_empty() {
                continue;
            }
            let block: Block = serde_json::from_str(&line).map_err(|source| ChainFileError::Parse {
                line: index + 1,
                source,
            })?;
            blocks.push((index + 1, block));
        }

        let chain = Self::from_numbered(blocks)?;
        info!(
            path = %path.display(),
            blocks = chain.data.blocks.len(),
            tip = ?chain.tip_height(),
            "Block file loaded"
        );
        Ok(chain)
    }

    /// Build from blocks already in memory.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, ChainFileError> {
        Self::from_numbered(blocks.into_iter().enumerate().map(|(i, b)| (i + 1, b)).collect())
    }

    fn from_numbered(blocks: Vec<(usize, Block)>) -> Result<Self, ChainFileError> {
        let base = blocks
            .first()
            .map_or(BlockHeight::GENESIS, |(_, b)| b.height());
        let mut data = ChainData::default();

        for (line, block) in blocks {
            let index = data.blocks.len();
            if let Some(prev) = data.blocks.last() {
                if block.header.prev_hash != prev.hash() {
                    return Err(ChainFileError::Discontinuous {
                        line,
                        reason: format!(
                            "block {} does not build on {}",
                            block.hash(),
                            prev.hash()
                        ),
                    });
                }
            }
            if block.height().0 != base.0 + index as u64 {
                return Err(ChainFileError::Discontinuous {
                    line,
                    reason: format!("expected height {}, found {}", base.0 + index as u64, block.height()),
                });
            }

            data.by_hash.insert(block.hash(), index);
            for (position, tx) in block.transactions.iter().enumerate() {
                data.transactions.insert(tx.txid, (index, position));
            }
            data.blocks.push(block);
        }

        Ok(Self {
            data,
            base,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between blocks. Setting it stops a running scan.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.blocks.is_empty()
    }

    fn index_of(&self, height: BlockHeight) -> Option<usize> {
        let offset = height.0.checked_sub(self.base.0)?;
        usize::try_from(offset).ok()
    }
}

/// Write `blocks` as a JSON-lines dump.
pub fn write_block_file(path: impl AsRef<Path>, blocks: &[Block]) -> Result<(), ChainFileError> {
    let path = path.as_ref();
    let io = |source| ChainFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io)?);
    for (index, block) in blocks.iter().enumerate() {
        serde_json::to_writer(&mut writer, block).map_err(|source| ChainFileError::Parse {
            line: index + 1,
            source,
        })?;
        writer.write_all(b"\n").map_err(io)?;
    }
    writer.flush().map_err(io)
}

impl TransactionSource for FileChain {
    fn fetch_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)> {
        let (index, position) = *self.data.transactions.get(txid)?;
        let block = self.data.blocks.get(index)?;
        let tx = block.transactions.get(position)?;
        Some((tx.clone(), block.hash()))
    }
}

impl ChainSource for FileChain {
    fn tip_height(&self) -> Option<BlockHeight> {
        self.data.blocks.last().map(|b| b.height())
    }

    fn block_at(&self, height: BlockHeight) -> Option<Block> {
        self.data.blocks.get(self.index_of(height)?).cloned()
    }

    fn header(&self, hash: &Hash) -> Option<BlockHeader> {
        let index = *self.data.by_hash.get(hash)?;
        self.data.blocks.get(index).map(|b| b.header.clone())
    }

    fn is_active(&self, hash: &Hash) -> bool {
        self.data.by_hash.contains_key(hash)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn header_at(&self, height: BlockHeight) -> Option<BlockHeader> {
        self.data
            .blocks
            .get(self.index_of(height)?)
            .map(|b| b.header.clone())
    }
}
