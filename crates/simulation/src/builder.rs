//! Transaction and payload builders.

use tallyscan_types::{Address, Hash, OutPoint, OutputScript, PropertyId, Transaction, TxIn, TxOut};

/// Value locked in every funding output.
pub const FUNDING_VALUE: i64 = 100_000;

/// Fee paid by every tagged transaction.
pub const TAGGED_FEE: i64 = 1_000;

/// Value of the reference output.
pub const REFERENCE_VALUE: i64 = 546;

/// Length of an encoded [`Payload`].
pub const PAYLOAD_LEN: usize = 16;

/// Fixed-width overlay payload understood by the reference interpreter.
///
/// Layout, big-endian: version (u16), type (u16), property (u32),
/// amount (u64).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    pub version: u16,
    pub tx_type: u16,
    pub property: PropertyId,
    pub amount: u64,
}

impl Payload {
    pub fn new(tx_type: u16, property: PropertyId, amount: u64) -> Self {
        Self {
            version: 0,
            tx_type,
            property,
            amount,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYLOAD_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.tx_type.to_be_bytes());
        out.extend_from_slice(&self.property.0.to_be_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        out
    }

    /// Decode the leading [`PAYLOAD_LEN`] bytes. Trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..PAYLOAD_LEN)?;
        let version = u16::from_be_bytes(bytes[0..2].try_into().ok()?);
        let tx_type = u16::from_be_bytes(bytes[2..4].try_into().ok()?);
        let property = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
        let amount = u64::from_be_bytes(bytes[8..16].try_into().ok()?);
        Some(Self {
            version,
            tx_type,
            property: PropertyId(property),
            amount,
        })
    }
}

/// Deterministic transaction id for a label.
pub fn txid(label: &str) -> Hash {
    Hash::sha256(label.as_bytes())
}

/// Input-less transaction paying [`FUNDING_VALUE`] to `owner`.
pub fn funding(label: &str, owner: &Address) -> Transaction {
    Transaction {
        txid: txid(label),
        inputs: vec![],
        outputs: vec![TxOut {
            value: FUNDING_VALUE,
            script: OutputScript::pay_to(owner.clone()),
        }],
    }
}

/// Marker-tagged transaction spending output zero of `funding`.
///
/// The magic-prefixed payload goes first, then the optional reference
/// output.
pub fn tagged(
    label: &str,
    magic: &[u8],
    funding: &Transaction,
    payload: &[u8],
    reference: Option<&Address>,
) -> Transaction {
    let mut push = magic.to_vec();
    push.extend_from_slice(payload);

    let mut outputs = vec![TxOut {
        value: 0,
        script: OutputScript::NullData { pushes: vec![push] },
    }];
    if let Some(reference) = reference {
        outputs.push(TxOut {
            value: REFERENCE_VALUE,
            script: OutputScript::pay_to(reference.clone()),
        });
    }
    let spent: i64 = outputs.iter().map(|o| o.value).sum();
    outputs.push(TxOut {
        value: FUNDING_VALUE - TAGGED_FEE - spent,
        script: funding.outputs[0].script.clone(),
    });

    Transaction {
        txid: txid(label),
        inputs: vec![TxIn {
            prevout: OutPoint::new(funding.txid, 0),
        }],
        outputs,
    }
}
