//! Shared type definitions for the Coinfloor client.

// ============================================================================
// Assets
// ============================================================================

/// Numeric asset code as used on the wire.
pub type AssetCode = u16;

/// Bitcoin
pub const XBT: AssetCode = 0xF800;

/// Pound sterling
pub const GBP: AssetCode = 0xFA20;

// ============================================================================
// AssetPair
// ============================================================================

/// A market, identified by its base and counter assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetPair {
    pub base: AssetCode,
    pub counter: AssetCode,
}

impl AssetPair {
    pub fn new(base: AssetCode, counter: AssetCode) -> Self {
        Self { base, counter }
    }
}

impl From<(AssetCode, AssetCode)> for AssetPair {
    fn from((base, counter): (AssetCode, AssetCode)) -> Self {
        Self { base, counter }
    }
}
