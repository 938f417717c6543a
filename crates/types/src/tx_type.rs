//! Overlay transaction type codes.
//!
//! The engine interprets none of these itself; it needs them to recognise
//! rule-state records (freeze, activation, alert) in the transaction index.

pub const SIMPLE_SEND: u16 = 0;
pub const SEND_ALL: u16 = 4;
pub const CREATE_PROPERTY_FIXED: u16 = 50;
pub const CREATE_PROPERTY_MANUAL: u16 = 54;
pub const GRANT_PROPERTY_TOKENS: u16 = 55;
pub const REVOKE_PROPERTY_TOKENS: u16 = 56;
pub const CHANGE_ISSUER_ADDRESS: u16 = 70;
pub const ENABLE_FREEZING: u16 = 71;
pub const DISABLE_FREEZING: u16 = 72;
pub const FREEZE_PROPERTY_TOKENS: u16 = 185;
pub const UNFREEZE_PROPERTY_TOKENS: u16 = 186;
pub const ACTIVATION: u16 = 65534;
pub const ALERT: u16 = 65535;

/// Types whose effects live in freeze state rather than the tally.
pub const FREEZE_TYPES: [u16; 4] = [
    ENABLE_FREEZING,
    DISABLE_FREEZING,
    FREEZE_PROPERTY_TOKENS,
    UNFREEZE_PROPERTY_TOKENS,
];

pub fn is_freeze_related(tx_type: u16) -> bool {
    FREEZE_TYPES.contains(&tx_type)
}

/// Short name for logs.
pub fn name(tx_type: u16) -> &'static str {
    match tx_type {
        SIMPLE_SEND => "Simple Send",
        SEND_ALL => "Send All",
        CREATE_PROPERTY_FIXED => "Create Property - Fixed",
        CREATE_PROPERTY_MANUAL => "Create Property - Manual",
        GRANT_PROPERTY_TOKENS => "Grant Property Tokens",
        REVOKE_PROPERTY_TOKENS => "Revoke Property Tokens",
        CHANGE_ISSUER_ADDRESS => "Change Issuer Address",
        ENABLE_FREEZING => "Enable Freezing",
        DISABLE_FREEZING => "Disable Freezing",
        FREEZE_PROPERTY_TOKENS => "Freeze Property Tokens",
        UNFREEZE_PROPERTY_TOKENS => "Unfreeze Property Tokens",
        ACTIVATION => "Feature Activation",
        ALERT => "ALERT",
        _ => "* unknown type *",
    }
}
