//! A small but complete interpreter for simulated workloads.
//!
//! Supports sends, managed properties and the freeze rules. Every result is
//! a pure function of the intent and the ledger context, so two engines fed
//! the same chain end up in the same state.

use crate::builder::Payload;
use tallyscan_engine::{Interpretation, Interpreter, LedgerContext};
use tallyscan_ledger::TallyKind;
use tallyscan_types::{tx_type, Ecosystem, Intent, PropertyId};
use tracing::trace;

pub const ERR_UNKNOWN_TYPE: i32 = -1;
pub const ERR_BAD_VERSION: i32 = -2;
pub const ERR_NO_PROPERTY: i32 = -3;
pub const ERR_NOT_ISSUER: i32 = -4;
pub const ERR_INSUFFICIENT: i32 = -5;
pub const ERR_NO_REFERENCE: i32 = -6;
pub const ERR_FREEZING: i32 = -7;
pub const ERR_STORAGE: i32 = -8;
pub const ERR_BAD_AMOUNT: i32 = -9;

/// Reference interpreter for [`Payload`]-encoded transactions.
#[derive(Debug, Default)]
pub struct ReferenceInterpreter {
    interpreted: u64,
}

impl ReferenceInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intents seen since the last reset.
    pub fn interpreted(&self) -> u64 {
        self.interpreted
    }

    fn apply(&self, intent: &Intent, payload: Payload, ctx: &mut LedgerContext<'_>) -> Result<u64, i32> {
        if payload.version != 0 {
            return Err(ERR_BAD_VERSION);
        }
        let property = payload.property;
        let amount = i64::try_from(payload.amount).map_err(|_| ERR_BAD_AMOUNT)?;

        match payload.tx_type {
            tx_type::SIMPLE_SEND => {
                self.require_property(property, ctx)?;
                let to = intent.reference.as_ref().ok_or(ERR_NO_REFERENCE)?;
                if amount <= 0 {
                    return Err(ERR_BAD_AMOUNT);
                }
                if !ctx.transfer(&intent.sender, to, property, amount) {
                    return Err(ERR_INSUFFICIENT);
                }
                Ok(payload.amount)
            }
            tx_type::CREATE_PROPERTY_MANUAL => {
                let ecosystem = match payload.property.0 {
                    1 => Ecosystem::Main,
                    2 => Ecosystem::Test,
                    _ => return Err(ERR_NO_PROPERTY),
                };
                let name = format!("managed-{}", intent.txid.to_hex().get(..8).unwrap_or_default());
                ctx.register_property(ecosystem, intent.sender.clone(), name, true, intent.txid)
                    .map_err(|_| ERR_STORAGE)?;
                Ok(0)
            }
            tx_type::GRANT_PROPERTY_TOKENS => {
                self.require_issuer(intent, property, ctx)?;
                if amount <= 0 {
                    return Err(ERR_BAD_AMOUNT);
                }
                if !ctx.credit(&intent.sender, property, amount, TallyKind::Available) {
                    return Err(ERR_BAD_AMOUNT);
                }
                Ok(payload.amount)
            }
            tx_type::ENABLE_FREEZING => {
                self.require_issuer(intent, property, ctx)?;
                ctx.enable_freezing(property, ctx.height())
                    .map_err(|_| ERR_FREEZING)?;
                Ok(0)
            }
            tx_type::DISABLE_FREEZING => {
                self.require_issuer(intent, property, ctx)?;
                ctx.disable_freezing(property).map_err(|_| ERR_FREEZING)?;
                Ok(0)
            }
            tx_type::FREEZE_PROPERTY_TOKENS | tx_type::UNFREEZE_PROPERTY_TOKENS => {
                self.require_issuer(intent, property, ctx)?;
                if !ctx.is_freezing_enabled(property) {
                    return Err(ERR_FREEZING);
                }
                let target = intent.reference.clone().ok_or(ERR_NO_REFERENCE)?;
                if payload.tx_type == tx_type::FREEZE_PROPERTY_TOKENS {
                    ctx.freeze(target, property);
                } else if !ctx.unfreeze(&target, property) {
                    return Err(ERR_FREEZING);
                }
                Ok(0)
            }
            _ => Err(ERR_UNKNOWN_TYPE),
        }
    }

    fn require_property(&self, property: PropertyId, ctx: &LedgerContext<'_>) -> Result<(), i32> {
        match ctx.property_exists(property) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ERR_NO_PROPERTY),
            Err(_) => Err(ERR_STORAGE),
        }
    }

    fn require_issuer(&self, intent: &Intent, property: PropertyId, ctx: &LedgerContext<'_>) -> Result<(), i32> {
        let entry = ctx
            .property(property)
            .map_err(|_| ERR_STORAGE)?
            .ok_or(ERR_NO_PROPERTY)?;
        if entry.issuer != intent.sender {
            return Err(ERR_NOT_ISSUER);
        }
        Ok(())
    }
}

impl Interpreter for ReferenceInterpreter {
    fn interpret(&mut self, intent: &Intent, ctx: &mut LedgerContext<'_>) -> Interpretation {
        self.interpreted += 1;
        let Some(payload) = Payload::decode(&intent.payload) else {
            return Interpretation::malformed();
        };

        let result = self.apply(intent, payload, ctx);
        trace!(
            txid = %intent.txid,
            tx_type = tx_type::name(payload.tx_type),
            result = ?result,
            "Interpreted"
        );
        match result {
            Ok(amount) => Interpretation::valid(payload.tx_type, amount),
            Err(code) => Interpretation::invalid(payload.tx_type, code),
        }
    }

    fn reset(&mut self) {
        self.interpreted = 0;
    }
}
