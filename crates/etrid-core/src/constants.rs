//! Native token units and chain timing

/// Native token symbol
pub const ETR_SYMBOL: &str = "ETR";

/// Stable token symbol
pub const ETD_SYMBOL: &str = "ETD";

/// Decimal places of ETR and ETD
pub const DECIMALS: u8 = 18;

/// One ETR in planck
pub const ONE_ETR: u128 = 1_000_000_000_000_000_000; // 10^18

/// One ETD in its smallest unit
pub const ONE_ETD: u128 = ONE_ETR;

/// Target block time of the relay chain in seconds
pub const BLOCK_TIME_SECS: u64 = 5;

/// Blocks produced per day at the target block time
pub const BLOCKS_PER_DAY: u64 = 24 * 3600 / BLOCK_TIME_SECS; // 17,280

/// Default SS58 address prefix
pub const SS58_PREFIX: u16 = 42;
