//! Protocol-wide constants and field bounds

/// Maximum number of satoshis a transaction output can carry (21M coins)
pub const SATOSHI_QTY_MAX: u64 = 2_100_000_000_000_000;

/// Maximum number of asset units in existence for a single asset
pub const ASSET_QTY_MAX: u64 = 100_000_000_000_000;

/// Payment references are confined to 52 bits so they survive conversion
/// through IEEE 754 doubles in other implementations
pub const PAYMENT_REF_MAX: u64 = (1 << 52) - 1;

/// Identifier opening every metadata blob
pub const METADATA_IDENTIFIER: &[u8] = b"SPK";
pub const METADATA_IDENTIFIER_LEN: usize = 3;

/// Largest value a chained-segment length byte may take; type characters of
/// final segments are always above this
pub const LENGTH_PREFIX_MAX: u8 = 96;

/// Segment type character for genesis metadata
pub const GENESIS_PREFIX: u8 = b'g';
/// Segment type character for transfer-list metadata
pub const TRANSFERS_PREFIX: u8 = b't';
/// Segment type character for payment-reference metadata
pub const PAYMENTREF_PREFIX: u8 = b'r';

pub const GENESIS_QTY_MANTISSA_MIN: u16 = 1;
pub const GENESIS_QTY_MANTISSA_MAX: u16 = 1000;
pub const GENESIS_QTY_EXPONENT_MAX: u8 = 11;

pub const GENESIS_CHARGE_FLAT_MANTISSA_MAX: u8 = 100;
/// Tighter mantissa bound when the flat-charge exponent is at its maximum
pub const GENESIS_CHARGE_FLAT_MANTISSA_MAX_IF_EXP_MAX: u8 = 50;
pub const GENESIS_CHARGE_FLAT_EXPONENT_MAX: u8 = 2;

pub const GENESIS_CHARGE_BASIS_POINTS_MAX: u8 = 250;

pub const GENESIS_DOMAIN_NAME_MAX_LEN: usize = 32;
pub const GENESIS_PAGE_PATH_MAX_LEN: usize = 24;

pub const GENESIS_HASH_MIN_LEN: usize = 12;
pub const GENESIS_HASH_MAX_LEN: usize = 32;

/// Transaction input and output indices fit in two bytes on the wire
pub const IO_INDEX_MAX: u16 = 65535;

/// Cap on the per-output fee basis used when computing minimum transaction
/// fees for asset activity
pub const FEE_BASIS_MAX_SATOSHIS: u64 = 1000;

/// Bytes of txid carried to disambiguate an asset reference
pub const ASSETREF_TXID_PREFIX_LEN: usize = 2;
