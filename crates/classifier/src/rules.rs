//! Consensus rules the classifier applies.

use serde::{Deserialize, Serialize};
use tallyscan_types::{Address, BlockHeight, ScriptKind};

/// Activation of one script template as a sender input and/or an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRule {
    pub kind: ScriptKind,
    /// First height at which the rule applies.
    #[serde(default)]
    pub activation_height: BlockHeight,
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub output: bool,
}

/// Height-dependent allow-list of script templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptRules(pub Vec<ScriptRule>);

impl ScriptRules {
    pub fn is_allowed_input(&self, kind: ScriptKind, height: BlockHeight) -> bool {
        self.0
            .iter()
            .any(|r| r.kind == kind && r.input && height >= r.activation_height)
    }

    pub fn is_allowed_output(&self, kind: ScriptKind, height: BlockHeight) -> bool {
        self.0
            .iter()
            .any(|r| r.kind == kind && r.output && height >= r.activation_height)
    }
}

impl Default for ScriptRules {
    fn default() -> Self {
        let rule = |kind, input, output| ScriptRule {
            kind,
            activation_height: BlockHeight(0),
            input,
            output,
        };
        Self(vec![
            rule(ScriptKind::PubKeyHash, true, true),
            rule(ScriptKind::ScriptHash, true, true),
            rule(ScriptKind::Multisig, false, true),
            rule(ScriptKind::NullData, false, true),
        ])
    }
}

/// Classifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Prefix that tags a null-data push as an overlay payload.
    #[serde(default = "default_magic")]
    pub magic: String,

    /// Reserved protocol address. Payments to it mark legacy packets and
    /// are never a reference.
    #[serde(default = "default_system_address")]
    pub system_address: Address,

    #[serde(default)]
    pub script_rules: ScriptRules,
}

fn default_magic() -> String {
    "omni".to_string()
}

fn default_system_address() -> Address {
    Address::new("1EXoDusjGwvnjZUyKkxZ4UHEf77z6A5S4P").expect("static address is valid")
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            magic: default_magic(),
            system_address: default_system_address(),
            script_rules: ScriptRules::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn magic_bytes(&self) -> &[u8] {
        self.magic.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = ScriptRules::default();
        let h = BlockHeight(100);
        assert!(rules.is_allowed_input(ScriptKind::PubKeyHash, h));
        assert!(rules.is_allowed_input(ScriptKind::ScriptHash, h));
        assert!(!rules.is_allowed_input(ScriptKind::Multisig, h));
        assert!(!rules.is_allowed_input(ScriptKind::PubKey, h));
        assert!(rules.is_allowed_output(ScriptKind::NullData, h));
        assert!(!rules.is_allowed_output(ScriptKind::PubKey, h));
    }

    #[test]
    fn test_activation_height_gates_rule() {
        let rules = ScriptRules(vec![ScriptRule {
            kind: ScriptKind::ScriptHash,
            activation_height: BlockHeight(200),
            input: true,
            output: false,
        }]);
        assert!(!rules.is_allowed_input(ScriptKind::ScriptHash, BlockHeight(199)));
        assert!(rules.is_allowed_input(ScriptKind::ScriptHash, BlockHeight(200)));
        assert!(!rules.is_allowed_output(ScriptKind::ScriptHash, BlockHeight(300)));
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config: ClassifierConfig = toml::from_str(r#"magic = "elys""#).unwrap();
        assert_eq!(config.magic_bytes(), b"elys");
        assert_eq!(config.script_rules, ScriptRules::default());

        let config: ClassifierConfig = toml::from_str(
            r#"
            [[script_rules]]
            kind = "pub_key_hash"
            input = true
            output = true
            "#,
        )
        .unwrap();
        assert_eq!(config.script_rules.0.len(), 1);
        assert_eq!(config.magic, "omni");
    }
}
