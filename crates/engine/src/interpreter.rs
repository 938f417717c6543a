//! The seam between the engine and transaction-type business logic.
//!
//! The engine classifies transactions and hands each [`Intent`] to an
//! [`Interpreter`]. The interpreter decodes the payload and applies its
//! effects through a [`LedgerContext`], the only mutable handle it gets on
//! derived state.

use tallyscan_freeze::{FreezeError, FreezeState};
use tallyscan_ledger::{TallyKind, TallyLedger};
use tallyscan_storage::{PropertyEntry, PropertyRegistry, StorageError, SubRecord};
use tallyscan_types::{Address, BlockHeight, Ecosystem, Hash, Intent, PropertyId};
use tracing::debug;

/// Result of interpreting one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Valid,
    /// Well-formed but refused by the business rules. The code is negative.
    Invalid(i32),
    /// The payload could not be decoded. Such transactions are not indexed.
    Malformed,
}

impl InterpretResult {
    /// Code recorded for payloads that fail to decode.
    pub const MALFORMED_CODE: i32 = -9002;

    pub fn code(self) -> i32 {
        match self {
            InterpretResult::Valid => 0,
            InterpretResult::Invalid(code) => code,
            InterpretResult::Malformed => Self::MALFORMED_CODE,
        }
    }

    pub fn is_valid(self) -> bool {
        self.code() >= 0
    }
}

/// What the interpreter reports back for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub tx_type: u16,
    pub result: InterpretResult,
    /// Amount actually moved, when the interpreter adjusted the requested one.
    pub amended_amount: u64,
    /// Per-payout records of multi-payout transactions.
    pub sub_records: Vec<SubRecord>,
}

impl Interpretation {
    pub fn valid(tx_type: u16, amended_amount: u64) -> Self {
        Self {
            tx_type,
            result: InterpretResult::Valid,
            amended_amount,
            sub_records: Vec::new(),
        }
    }

    pub fn invalid(tx_type: u16, code: i32) -> Self {
        Self {
            tx_type,
            result: InterpretResult::Invalid(code),
            amended_amount: 0,
            sub_records: Vec::new(),
        }
    }

    pub fn malformed() -> Self {
        Self {
            tx_type: 0,
            result: InterpretResult::Malformed,
            amended_amount: 0,
            sub_records: Vec::new(),
        }
    }
}

/// Downstream business logic.
///
/// Calls arrive strictly in block order and, within a block, in
/// transaction order.
pub trait Interpreter: Send + Sync {
    /// Called before the first transaction of a block.
    fn on_block_begin(&mut self, _height: BlockHeight, _ctx: &mut LedgerContext<'_>) {}

    fn interpret(&mut self, intent: &Intent, ctx: &mut LedgerContext<'_>) -> Interpretation;

    /// Called after the last transaction of a block.
    fn on_block_end(&mut self, _height: BlockHeight, _ctx: &mut LedgerContext<'_>) {}

    /// Drop any state the interpreter keeps outside the ledger.
    fn reset(&mut self) {}
}

/// Mutable view of derived state for one block.
pub struct LedgerContext<'a> {
    ledger: &'a mut TallyLedger,
    freeze: &'a mut FreezeState,
    registry: &'a mut PropertyRegistry,
    legacy_counter: &'a mut u64,
    height: BlockHeight,
    block_hash: Hash,
}

impl<'a> LedgerContext<'a> {
    pub(crate) fn new(
        ledger: &'a mut TallyLedger,
        freeze: &'a mut FreezeState,
        registry: &'a mut PropertyRegistry,
        legacy_counter: &'a mut u64,
        height: BlockHeight,
        block_hash: Hash,
    ) -> Self {
        Self {
            ledger,
            freeze,
            registry,
            legacy_counter,
            height,
            block_hash,
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Balances
    // ═══════════════════════════════════════════════════════════════════════

    pub fn balance(&self, address: &Address, property: PropertyId, kind: TallyKind) -> i64 {
        self.ledger.balance(address, property, kind)
    }

    pub fn available(&self, address: &Address, property: PropertyId) -> i64 {
        self.ledger.available(address, property)
    }

    pub fn credit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: i64,
        kind: TallyKind,
    ) -> bool {
        self.ledger.credit(address, property, amount, kind)
    }

    /// Subtract `amount`. An available-balance debit from a frozen address
    /// is refused before the ledger is touched.
    pub fn debit(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: i64,
        kind: TallyKind,
    ) -> bool {
        if kind == TallyKind::Available && self.freeze.is_address_frozen(address, property) {
            debug!(%address, %property, amount, "Debit refused: address is frozen");
            return false;
        }
        self.ledger.debit(address, property, amount, kind)
    }

    /// Move available balance between addresses. All or nothing.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        property: PropertyId,
        amount: i64,
    ) -> bool {
        if !self.debit(from, property, amount, TallyKind::Available) {
            return false;
        }
        if !self.ledger.credit(to, property, amount, TallyKind::Available) {
            self.ledger
                .credit(from, property, amount, TallyKind::Available);
            return false;
        }
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Freeze rules
    // ═══════════════════════════════════════════════════════════════════════

    pub fn enable_freezing(&mut self, property: PropertyId, live_height: BlockHeight) -> Result<(), FreezeError> {
        self.freeze.enable_freezing(property, live_height)
    }

    pub fn disable_freezing(&mut self, property: PropertyId) -> Result<(), FreezeError> {
        self.freeze.disable_freezing(property)
    }

    pub fn is_freezing_enabled(&self, property: PropertyId) -> bool {
        self.freeze.is_freezing_enabled(property, self.height)
    }

    pub fn freeze(&mut self, address: Address, property: PropertyId) {
        self.freeze.freeze(address, property);
    }

    pub fn unfreeze(&mut self, address: &Address, property: PropertyId) -> bool {
        self.freeze.unfreeze(address, property)
    }

    pub fn is_frozen(&self, address: &Address, property: PropertyId) -> bool {
        self.freeze.is_frozen(address, property, self.height)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════

    pub fn property(&self, id: PropertyId) -> Result<Option<PropertyEntry>, StorageError> {
        self.registry.get(id)
    }

    pub fn property_exists(&self, id: PropertyId) -> Result<bool, StorageError> {
        self.registry.exists(id)
    }

    /// Register a property created by `txid` in the current block.
    pub fn register_property(
        &mut self,
        ecosystem: Ecosystem,
        issuer: Address,
        name: impl Into<String>,
        divisible: bool,
        txid: Hash,
    ) -> Result<PropertyId, StorageError> {
        let entry = PropertyEntry {
            issuer,
            name: name.into(),
            divisible,
            creation_txid: txid,
            creation_block: self.block_hash,
            update_block: self.block_hash,
        };
        self.registry.register(ecosystem, entry)
    }

    /// Replace the issuer of `id`, recorded against the current block.
    pub fn change_issuer(&mut self, id: PropertyId, issuer: Address) -> Result<bool, StorageError> {
        let Some(mut entry) = self.registry.get(id)? else {
            return Ok(false);
        };
        entry.issuer = issuer;
        entry.update_block = self.block_hash;
        self.registry.update(id, entry)?;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Globals
    // ═══════════════════════════════════════════════════════════════════════

    pub fn legacy_counter(&self) -> u64 {
        *self.legacy_counter
    }

    pub fn set_legacy_counter(&mut self, value: u64) {
        *self.legacy_counter = value;
    }
}
