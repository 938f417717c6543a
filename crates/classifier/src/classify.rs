//! Turning base-chain transactions into overlay intents.

use crate::{ClassifierConfig, InputCache, Rejection, TransactionSource};
use tallyscan_types::{
    Address, BlockHeight, Intent, OutputScript, PacketClass, Transaction,
};
use tracing::trace;

/// Where in the chain the transaction being classified sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub height: BlockHeight,
    pub time: u64,
    pub index: u32,
}

/// Stateful classifier: configuration plus the input cache.
///
/// Classification itself is deterministic. The cache only avoids repeated
/// fetches of the same previous transaction.
#[derive(Debug)]
pub struct Classifier {
    config: ClassifierConfig,
    cache: InputCache,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, cache_capacity: usize) -> Self {
        Self {
            config,
            cache: InputCache::new(cache_capacity),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn cache(&self) -> &InputCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut InputCache {
        &mut self.cache
    }

    /// Packet class of `tx`, or `None` if it carries no protocol marker.
    ///
    /// A magic-tagged null-data output wins over a payment to the system
    /// address.
    pub fn packet_class(&self, tx: &Transaction, height: BlockHeight) -> Option<PacketClass> {
        let rules = &self.config.script_rules;
        let magic = self.config.magic_bytes();

        let tagged = tx.outputs.iter().any(|out| match &out.script {
            OutputScript::NullData { pushes } => {
                out.script
                    .kind()
                    .is_some_and(|k| rules.is_allowed_output(k, height))
                    && pushes.first().is_some_and(|p| p.starts_with(magic))
            }
            _ => false,
        });
        if tagged {
            return Some(PacketClass::MarkerTagged);
        }

        let legacy = tx
            .outputs
            .iter()
            .any(|out| out.script.destination() == Some(&self.config.system_address));
        legacy.then_some(PacketClass::Legacy)
    }

    /// Classify `tx` in the given block context.
    pub fn classify<S>(
        &mut self,
        tx: &Transaction,
        ctx: BlockContext,
        source: &S,
    ) -> Result<Intent, Rejection>
    where
        S: TransactionSource + ?Sized,
    {
        let result = self.classify_inner(tx, ctx, source);
        if let Err(rejection) = &result {
            trace!(
                txid = %tx.txid,
                height = %ctx.height,
                code = rejection.code(),
                %rejection,
                "Transaction not classified"
            );
        }
        result
    }

    fn classify_inner<S>(
        &mut self,
        tx: &Transaction,
        ctx: BlockContext,
        source: &S,
    ) -> Result<Intent, Rejection>
    where
        S: TransactionSource + ?Sized,
    {
        let class = self
            .packet_class(tx, ctx.height)
            .ok_or(Rejection::NoMarker)?;

        if tx.inputs.is_empty() || tx.is_coinbase() {
            return Err(Rejection::NoSender);
        }
        self.cache.fill(tx, source)?;

        let value_in = tx
            .inputs
            .iter()
            .map(|i| self.cache.get(&i.prevout).map_or(0, |o| o.value))
            .try_fold(0i64, |acc, v| acc.checked_add(v))
            .ok_or(Rejection::ValueOutOfRange)?;
        let value_out = tx.value_out().ok_or(Rejection::ValueOutOfRange)?;
        let net_amount = value_in
            .checked_sub(value_out)
            .ok_or(Rejection::ValueOutOfRange)?;

        let sender = match class {
            PacketClass::Legacy => self.legacy_sender(tx, ctx.height)?,
            PacketClass::MarkerTagged => self.tagged_sender(tx, ctx.height)?,
        };

        let candidates = self.reference_candidates(tx, ctx.height);
        let (reference, reference_amount) = select_reference(&candidates, &sender).unzip();

        let payload = match class {
            PacketClass::MarkerTagged => self.tagged_payload(tx, ctx.height),
            PacketClass::Legacy => Vec::new(),
        };

        trace!(
            txid = %tx.txid,
            height = %ctx.height,
            %sender,
            reference = ?reference,
            class = %class,
            "Transaction classified"
        );

        Ok(Intent {
            txid: tx.txid,
            block_height: ctx.height,
            block_time: ctx.time,
            index_in_block: ctx.index,
            sender,
            reference,
            reference_amount,
            payload,
            net_amount,
            packet_class: class,
        })
    }

    /// The address contributing the strictly largest input value.
    ///
    /// Sums are grouped in order of first appearance among the inputs, and a
    /// later address must beat the current best outright, so on a tie the
    /// earlier address wins.
    fn legacy_sender(&self, tx: &Transaction, height: BlockHeight) -> Result<Address, Rejection> {
        let rules = &self.config.script_rules;
        let mut sums: Vec<(&Address, i64)> = Vec::new();

        for input in &tx.inputs {
            let prev = self
                .cache
                .get(&input.prevout)
                .ok_or(Rejection::MissingInputs(input.prevout))?;
            let kind = prev.script.kind().ok_or(Rejection::LegacyBadOutputType)?;
            if !rules.is_allowed_input(kind, height) {
                return Err(Rejection::LegacyBadInputType(kind));
            }
            let address = prev
                .script
                .destination()
                .ok_or(Rejection::LegacyNoDestination)?;

            match sums.iter_mut().find(|(a, _)| *a == address) {
                Some((_, sum)) => *sum = sum.saturating_add(prev.value),
                None => sums.push((address, prev.value)),
            }
        }

        let mut best: Option<(&Address, i64)> = None;
        for (address, sum) in sums {
            if sum > best.map_or(0, |(_, s)| s) {
                best = Some((address, sum));
            }
        }
        best.map(|(a, _)| a.clone()).ok_or(Rejection::NoSender)
    }

    /// The destination of input zero.
    fn tagged_sender(&self, tx: &Transaction, height: BlockHeight) -> Result<Address, Rejection> {
        let input = tx.inputs.first().ok_or(Rejection::NoSender)?;
        let prev = self
            .cache
            .get(&input.prevout)
            .ok_or(Rejection::MissingInputs(input.prevout))?;
        let kind = prev.script.kind().ok_or(Rejection::TaggedBadOutputType)?;
        if !self.config.script_rules.is_allowed_input(kind, height) {
            return Err(Rejection::TaggedBadInputType(kind));
        }
        prev.script
            .destination()
            .cloned()
            .ok_or(Rejection::TaggedNoDestination)
    }

    /// Allow-listed outputs with a destination other than the system
    /// address, in output order.
    fn reference_candidates(&self, tx: &Transaction, height: BlockHeight) -> Vec<(Address, i64)> {
        let rules = &self.config.script_rules;
        tx.outputs
            .iter()
            .filter(|out| {
                out.script
                    .kind()
                    .is_some_and(|k| rules.is_allowed_output(k, height))
            })
            .filter_map(|out| {
                let address = out.script.destination()?;
                (*address != self.config.system_address).then(|| (address.clone(), out.value))
            })
            .collect()
    }

    /// Bytes after the magic of every tagged null-data output, followed by
    /// any further pushes of that output, concatenated in output order.
    fn tagged_payload(&self, tx: &Transaction, height: BlockHeight) -> Vec<u8> {
        let rules = &self.config.script_rules;
        let magic = self.config.magic_bytes();
        let mut payload = Vec::new();

        for out in &tx.outputs {
            if !out
                .script
                .kind()
                .is_some_and(|k| rules.is_allowed_output(k, height))
            {
                continue;
            }
            let Some(pushes) = out.script.pushes() else {
                continue;
            };
            let Some((first, rest)) = pushes.split_first() else {
                continue;
            };
            let Some(data) = first.strip_prefix(magic) else {
                continue;
            };
            payload.extend_from_slice(data);
            for push in rest {
                payload.extend_from_slice(push);
            }
        }
        payload
    }
}

/// Pick the reference output.
///
/// A single candidate is the reference outright, even if it pays the sender.
/// Otherwise the first output paying the sender is taken as change and the
/// last remaining candidate wins. Only one change output is ever removed.
pub fn select_reference(candidates: &[(Address, i64)], sender: &Address) -> Option<(Address, i64)> {
    if let [only] = candidates {
        return Some(only.clone());
    }

    let mut change_removed = false;
    let mut reference = None;
    for (address, value) in candidates {
        if !change_removed && address == sender {
            change_removed = true;
        } else {
            reference = Some((address.clone(), *value));
        }
    }
    reference
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScriptRule, ScriptRules};
    use tallyscan_types::test_utils::{test_address, test_hash};
    use tallyscan_types::{Hash, OutPoint, ScriptKind, TxIn, TxOut};

    #[derive(Default)]
    struct Source(Vec<Transaction>);

    impl Source {
        /// Add a funding transaction whose outputs are the given scripts.
        fn fund(&mut self, seed: u8, outputs: Vec<(OutputScript, i64)>) -> Hash {
            let txid = test_hash(seed);
            self.0.push(Transaction {
                txid,
                inputs: vec![],
                outputs: outputs
                    .into_iter()
                    .map(|(script, value)| TxOut { value, script })
                    .collect(),
            });
            txid
        }
    }

    impl TransactionSource for Source {
        fn fetch_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)> {
            self.0
                .iter()
                .find(|tx| tx.txid == *txid)
                .map(|tx| (tx.clone(), test_hash(0xbb)))
        }
    }

    fn p2pkh(label: &str) -> OutputScript {
        OutputScript::pay_to(test_address(label))
    }

    fn out(script: OutputScript, value: i64) -> TxOut {
        TxOut { value, script }
    }

    fn tagged(payload: &[u8]) -> TxOut {
        let mut push = b"omni".to_vec();
        push.extend_from_slice(payload);
        out(
            OutputScript::NullData {
                pushes: vec![push],
            },
            0,
        )
    }

    fn system() -> OutputScript {
        OutputScript::pay_to(ClassifierConfig::default().system_address)
    }

    fn tx(inputs: Vec<OutPoint>, outputs: Vec<TxOut>) -> Transaction {
        Transaction {
            txid: test_hash(0xaa),
            inputs: inputs.into_iter().map(|prevout| TxIn { prevout }).collect(),
            outputs,
        }
    }

    fn ctx() -> BlockContext {
        BlockContext {
            height: BlockHeight(100),
            time: 1_600_000_000,
            index: 3,
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default(), 1000)
    }

    #[test]
    fn test_marker_tagged_payload_and_sender() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("alice"), 50_000)]);
        let payload = hex::decode("000000000000000105f5e100").unwrap();
        let t = tx(
            vec![OutPoint::new(funding, 0)],
            vec![tagged(&payload), out(p2pkh("bob"), 546)],
        );

        let intent = classifier().classify(&t, ctx(), &source).unwrap();

        assert_eq!(intent.packet_class, PacketClass::MarkerTagged);
        assert_eq!(intent.payload, payload);
        assert_eq!(intent.sender, test_address("alice"));
        assert_eq!(intent.reference, Some(test_address("bob")));
        assert_eq!(intent.reference_amount, Some(546));
        assert_eq!(intent.net_amount, 50_000 - 546);
        assert_eq!(intent.block_height, BlockHeight(100));
        assert_eq!(intent.index_in_block, 3);
    }

    #[test]
    fn test_payload_concatenates_tagged_outputs_in_order() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("alice"), 1000)]);
        let second = out(
            OutputScript::NullData {
                pushes: vec![b"omni\x01\x02".to_vec(), vec![0x03]],
            },
            0,
        );
        let untagged = out(
            OutputScript::NullData {
                pushes: vec![b"other".to_vec()],
            },
            0,
        );
        let t = tx(
            vec![OutPoint::new(funding, 0)],
            vec![tagged(&[0xaa]), untagged, second],
        );

        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.payload, vec![0xaa, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_no_marker_is_rejected() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("alice"), 1000)]);
        let t = tx(vec![OutPoint::new(funding, 0)], vec![out(p2pkh("bob"), 900)]);

        let rejection = classifier().classify(&t, ctx(), &source).unwrap_err();
        assert_eq!(rejection, Rejection::NoMarker);
        assert_eq!(rejection.code(), -1);
    }

    #[test]
    fn test_missing_input_is_distinct() {
        let source = Source::default();
        let missing = OutPoint::new(test_hash(42), 0);
        let t = tx(vec![missing], vec![tagged(&[1])]);

        let rejection = classifier().classify(&t, ctx(), &source).unwrap_err();
        assert!(rejection.is_input_unavailable());
        assert_eq!(rejection.code(), -101);
    }

    #[test]
    fn test_tagged_sender_uses_input_zero_only() {
        let mut source = Source::default();
        let funding = source.fund(
            1,
            vec![(p2pkh("small"), 10), (p2pkh("large"), 1_000_000)],
        );
        let t = tx(
            vec![OutPoint::new(funding, 0), OutPoint::new(funding, 1)],
            vec![tagged(&[1])],
        );

        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.sender, test_address("small"));
    }

    #[test]
    fn test_tagged_input_type_codes() {
        let mut source = Source::default();
        let funding = source.fund(
            1,
            vec![
                (OutputScript::NonStandard { raw: vec![0x51] }, 10),
                (
                    OutputScript::Multisig {
                        required: 1,
                        keys: vec!["k1".into()],
                    },
                    10,
                ),
            ],
        );
        let mut c = classifier();

        let bad_output = tx(vec![OutPoint::new(funding, 0)], vec![tagged(&[1])]);
        assert_eq!(
            c.classify(&bad_output, ctx(), &source).unwrap_err().code(),
            -108
        );

        let bad_input = tx(vec![OutPoint::new(funding, 1)], vec![tagged(&[1])]);
        assert_eq!(
            c.classify(&bad_input, ctx(), &source).unwrap_err(),
            Rejection::TaggedBadInputType(ScriptKind::Multisig)
        );
    }

    #[test]
    fn test_tagged_input_without_destination() {
        let mut source = Source::default();
        let funding = source.fund(
            1,
            vec![(
                OutputScript::Multisig {
                    required: 1,
                    keys: vec!["k1".into()],
                },
                10,
            )],
        );
        // Allow multisig as input so the destination check is reached.
        let mut rules = ScriptRules::default();
        rules.0.push(ScriptRule {
            kind: ScriptKind::Multisig,
            activation_height: BlockHeight(0),
            input: true,
            output: false,
        });
        let config = ClassifierConfig {
            script_rules: rules,
            ..ClassifierConfig::default()
        };
        let t = tx(vec![OutPoint::new(funding, 0)], vec![tagged(&[1])]);

        let rejection = Classifier::new(config, 10)
            .classify(&t, ctx(), &source)
            .unwrap_err();
        assert_eq!(rejection, Rejection::TaggedNoDestination);
        assert_eq!(rejection.code(), -110);
    }

    #[test]
    fn test_legacy_sender_is_largest_input_sum() {
        let mut source = Source::default();
        let funding = source.fund(
            1,
            vec![
                (p2pkh("alice"), 300),
                (p2pkh("bob"), 500),
                (p2pkh("alice"), 300),
            ],
        );
        let t = tx(
            (0..3).map(|i| OutPoint::new(funding, i)).collect(),
            vec![out(system(), 100), out(p2pkh("carol"), 200)],
        );

        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.packet_class, PacketClass::Legacy);
        // alice: 600 across two inputs, bob: 500.
        assert_eq!(intent.sender, test_address("alice"));
        assert!(intent.payload.is_empty());
        // The system address is never a reference.
        assert_eq!(intent.reference, Some(test_address("carol")));
    }

    #[test]
    fn test_legacy_sender_tie_goes_to_first_seen_input() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("zed"), 400), (p2pkh("amy"), 400)]);
        let t = tx(
            vec![OutPoint::new(funding, 0), OutPoint::new(funding, 1)],
            vec![out(system(), 100)],
        );
        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.sender, test_address("zed"));

        // Same inputs in the other order flip the winner.
        let t = tx(
            vec![OutPoint::new(funding, 1), OutPoint::new(funding, 0)],
            vec![out(system(), 100)],
        );
        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.sender, test_address("amy"));
    }

    #[test]
    fn test_legacy_input_type_codes() {
        let mut source = Source::default();
        let funding = source.fund(
            1,
            vec![
                (p2pkh("alice"), 100),
                (OutputScript::NonStandard { raw: vec![] }, 100),
                (
                    OutputScript::PubKey {
                        address: test_address("pk"),
                    },
                    100,
                ),
            ],
        );
        let mut c = classifier();

        let bad_output = tx(
            vec![OutPoint::new(funding, 0), OutPoint::new(funding, 1)],
            vec![out(system(), 1)],
        );
        assert_eq!(
            c.classify(&bad_output, ctx(), &source).unwrap_err(),
            Rejection::LegacyBadOutputType
        );

        let bad_input = tx(vec![OutPoint::new(funding, 2)], vec![out(system(), 1)]);
        let rejection = c.classify(&bad_input, ctx(), &source).unwrap_err();
        assert_eq!(rejection, Rejection::LegacyBadInputType(ScriptKind::PubKey));
        assert_eq!(rejection.code(), -105);
    }

    #[test]
    fn test_legacy_zero_value_inputs_have_no_sender() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("alice"), 0)]);
        let t = tx(vec![OutPoint::new(funding, 0)], vec![out(system(), 0)]);
        assert_eq!(
            classifier().classify(&t, ctx(), &source).unwrap_err(),
            Rejection::NoSender
        );
    }

    #[test]
    fn test_single_candidate_is_reference_even_if_sender() {
        let sender = test_address("alice");
        let candidates = vec![(sender.clone(), 10)];
        assert_eq!(
            select_reference(&candidates, &sender),
            Some((sender.clone(), 10))
        );
        assert_eq!(select_reference(&[], &sender), None);
    }

    #[test]
    fn test_only_first_change_output_is_stripped() {
        let sender = test_address("alice");
        let bob = test_address("bob");
        let carol = test_address("carol");

        // Change first: last remaining candidate wins.
        let candidates = vec![(sender.clone(), 1), (bob.clone(), 2), (carol.clone(), 3)];
        assert_eq!(
            select_reference(&candidates, &sender),
            Some((carol.clone(), 3))
        );

        // A second sender output is not change and can win as the last one.
        let candidates = vec![(sender.clone(), 1), (bob.clone(), 2), (sender.clone(), 4)];
        assert_eq!(
            select_reference(&candidates, &sender),
            Some((sender.clone(), 4))
        );

        // Two outputs, both the sender: the second is the reference.
        let candidates = vec![(sender.clone(), 1), (sender.clone(), 2)];
        assert_eq!(
            select_reference(&candidates, &sender),
            Some((sender.clone(), 2))
        );
    }

    #[test]
    fn test_disallowed_output_types_are_not_candidates() {
        let mut source = Source::default();
        let funding = source.fund(1, vec![(p2pkh("alice"), 1000)]);
        let t = tx(
            vec![OutPoint::new(funding, 0)],
            vec![
                tagged(&[1]),
                out(
                    OutputScript::PubKey {
                        address: test_address("pk"),
                    },
                    5,
                ),
                out(p2pkh("bob"), 7),
            ],
        );
        let intent = classifier().classify(&t, ctx(), &source).unwrap();
        assert_eq!(intent.reference, Some(test_address("bob")));
    }
}
