//! Seeded workload generation.
//!
//! A workload is a list of blocks of transactions built from a fixed set of
//! actors. The same seed always yields byte-identical blocks.

use crate::builder::{funding, tagged, Payload};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use tallyscan_types::{tx_type, Address, PropertyId, Transaction};
use tracing::debug;

/// The first managed property a fresh main ecosystem hands out.
pub const MANAGED_PROPERTY: PropertyId = PropertyId::FIRST_MAIN_ISSUED;

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// At least two.
    pub actors: usize,
    pub blocks: usize,
    pub max_transactions_per_block: usize,
    /// Probability that a block carries freeze-rule transactions.
    pub freeze_probability: f64,
    /// Probability that a transaction carries an undecodable payload.
    pub malformed_probability: f64,
    pub magic: Vec<u8>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            actors: 5,
            blocks: 30,
            max_transactions_per_block: 6,
            freeze_probability: 0.0,
            malformed_probability: 0.05,
            magic: b"omni".to_vec(),
        }
    }
}

/// Generated blocks plus what went into them.
#[derive(Clone)]
pub struct Workload {
    pub actors: Vec<Address>,
    pub funding: Vec<Transaction>,
    /// Block contents, index 0 is the genesis block.
    pub blocks: Vec<Vec<Transaction>>,
    pub tagged_transactions: usize,
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workload")
            .field("actors", &self.actors.len())
            .field("blocks", &self.blocks.len())
            .field("tagged_transactions", &self.tagged_transactions)
            .finish_non_exhaustive()
    }
}

struct Generator {
    rng: ChaCha8Rng,
    config: WorkloadConfig,
    actors: Vec<Address>,
    funding: Vec<Transaction>,
    seed: u64,
    serial: u64,
    freezing_enabled: bool,
}

impl Generator {
    fn label(&mut self, kind: &str) -> String {
        self.serial += 1;
        format!("sim-{}-{kind}-{}", self.seed, self.serial)
    }

    fn pick(&mut self) -> usize {
        self.rng.gen_range(0..self.actors.len())
    }

    fn tx(&mut self, kind: &str, from: usize, payload: &[u8], to: Option<usize>) -> Transaction {
        let label = self.label(kind);
        let reference = to.map(|i| self.actors[i].clone());
        tagged(
            &label,
            &self.config.magic,
            &self.funding[from],
            payload,
            reference.as_ref(),
        )
    }

    fn random_tx(&mut self) -> Transaction {
        if self.rng.gen::<f64>() < self.config.malformed_probability {
            let from = self.pick();
            return self.tx("junk", from, &[0xde, 0xad], None);
        }

        match self.rng.gen_range(0..10) {
            0..=1 => {
                let amount = self.rng.gen_range(1..=10_000);
                let payload = Payload::new(tx_type::GRANT_PROPERTY_TOKENS, MANAGED_PROPERTY, amount);
                // Non-issuers are rejected by the interpreter.
                let from = if self.rng.gen_bool(0.8) { 0 } else { self.pick() };
                self.tx("grant", from, &payload.encode(), None)
            }
            _ => {
                let from = self.pick();
                let to = self.pick();
                let amount = self.rng.gen_range(1..=2_000);
                let payload = Payload::new(tx_type::SIMPLE_SEND, MANAGED_PROPERTY, amount);
                self.tx("send", from, &payload.encode(), Some(to))
            }
        }
    }

    fn freeze_txs(&mut self) -> Vec<Transaction> {
        if !self.freezing_enabled {
            self.freezing_enabled = true;
            let payload = Payload::new(tx_type::ENABLE_FREEZING, MANAGED_PROPERTY, 0);
            return vec![self.tx("enable", 0, &payload.encode(), None)];
        }
        let target = self.rng.gen_range(1..self.actors.len());
        let kind = if self.rng.gen_bool(0.5) {
            tx_type::FREEZE_PROPERTY_TOKENS
        } else {
            tx_type::UNFREEZE_PROPERTY_TOKENS
        };
        let payload = Payload::new(kind, MANAGED_PROPERTY, 0);
        vec![self.tx("freeze", 0, &payload.encode(), Some(target))]
    }
}

impl Workload {
    /// Generate a workload.
    ///
    /// Block 0 funds every actor, block 1 creates [`MANAGED_PROPERTY`] with
    /// actor 0 as issuer, and the remaining blocks are random.
    pub fn generate(config: WorkloadConfig, seed: u64) -> Self {
        let actors: Vec<Address> = (0..config.actors.max(2))
            .filter_map(|i| Address::new(format!("sim{seed}actor{i}")).ok())
            .collect();
        let funding: Vec<Transaction> = actors
            .iter()
            .enumerate()
            .map(|(i, a)| funding(&format!("sim-{seed}-fund-{i}"), a))
            .collect();

        let mut gen = Generator {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            actors: actors.clone(),
            funding: funding.clone(),
            seed,
            serial: 0,
            freezing_enabled: false,
        };

        let mut blocks = vec![funding.clone()];
        let create = Payload::new(tx_type::CREATE_PROPERTY_MANUAL, PropertyId(1), 0);
        blocks.push(vec![gen.tx("create", 0, &create.encode(), None)]);

        for _ in 2..gen.config.blocks {
            let count = gen.rng.gen_range(0..=gen.config.max_transactions_per_block);
            let mut txs: Vec<Transaction> = (0..count).map(|_| gen.random_tx()).collect();
            if gen.rng.gen::<f64>() < gen.config.freeze_probability {
                txs.extend(gen.freeze_txs());
            }
            blocks.push(txs);
        }

        let tagged_transactions = blocks.iter().skip(1).map(Vec::len).sum();
        debug!(seed, blocks = blocks.len(), tagged_transactions, "Workload generated");
        Self {
            actors,
            funding,
            blocks,
            tagged_transactions,
        }
    }

    /// Transactions for one extra block, drawn from a fresh stream so it
    /// does not disturb the main sequence.
    pub fn extra_block(&self, config: &WorkloadConfig, seed: u64, count: usize) -> Vec<Transaction> {
        let mut gen = Generator {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config: config.clone(),
            actors: self.actors.clone(),
            funding: self.funding.clone(),
            seed,
            serial: 1_000_000,
            freezing_enabled: true,
        };
        (0..count).map(|_| gen.random_tx()).collect()
    }
}
