//! Display formatting for token amounts, addresses, hashes and durations
//!
//! All functions are pure. Amounts are integers in the smallest unit and are
//! only converted to decimal text at the edge, so no precision is lost for
//! 18-decimal tokens.

use crate::constants::{DECIMALS, ETD_SYMBOL, ETR_SYMBOL};
use crate::error::{EtridError, Result};
use crate::types::{Balance, SignedBalance};
use chrono::{DateTime, Utc};

/// Fraction digits kept by compact balance formatting
const COMPACT_FRACTION_DIGITS: u8 = 4;

// ============================================================================
// BALANCES
// ============================================================================

/// Options for [`format_balance`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceFormat {
    /// Decimal places of the token
    pub decimals: u8,
    /// Append the symbol after a space
    pub include_symbol: bool,
    /// Token symbol
    pub symbol: String,
    /// Separator between groups of three whole digits
    pub thousands_separator: String,
    /// Separator between whole and fractional digits
    pub decimal_separator: String,
    /// Round to at most four fraction digits once the amount reaches one unit
    pub compact: bool,
}

impl Default for BalanceFormat {
    fn default() -> Self {
        Self {
            decimals: DECIMALS,
            include_symbol: true,
            symbol: ETR_SYMBOL.to_string(),
            thousands_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
            compact: false,
        }
    }
}

impl BalanceFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn without_symbol(mut self) -> Self {
        self.include_symbol = false;
        self
    }

    pub fn separators(mut self, thousands: impl Into<String>, decimal: impl Into<String>) -> Self {
        self.thousands_separator = thousands.into();
        self.decimal_separator = decimal.into();
        self
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }
}

/// Format an unsigned amount, e.g. `1_500_000_000_000_000_000` → `"1.5 ETR"`
pub fn format_balance(amount: Balance, fmt: &BalanceFormat) -> String {
    render_balance(false, amount, fmt)
}

/// Format a signed amount; negatives get a leading `-`
pub fn format_signed_balance(amount: SignedBalance, fmt: &BalanceFormat) -> String {
    render_balance(amount < 0, amount.unsigned_abs(), fmt)
}

fn render_balance(negative: bool, abs: Balance, fmt: &BalanceFormat) -> String {
    // past 38 decimals every u128 amount is below one whole unit
    let (mut whole, mut fraction) = match pow10(fmt.decimals) {
        Some(divisor) => (abs / divisor, abs % divisor),
        None => (0, abs),
    };
    let mut width = fmt.decimals;

    if fmt.compact && whole > 0 {
        let narrow = fmt.decimals.min(COMPACT_FRACTION_DIGITS);
        if let (Some(unit), Some(limit)) = (pow10(fmt.decimals - narrow), pow10(narrow)) {
            width = narrow;
            // half-up rounding
            let round_up = fraction % unit >= unit - unit / 2;
            fraction = fraction / unit + u128::from(round_up);
            if fraction == limit {
                whole += 1;
                fraction = 0;
            }
        }
    }

    let mut out = String::new();
    if negative && abs != 0 {
        out.push('-');
    }
    out.push_str(&group_thousands(&whole.to_string(), &fmt.thousands_separator));

    if width > 0 {
        let digits = format!("{:0>width$}", fraction, width = width as usize);
        let trimmed = digits.trim_end_matches('0');
        if !trimmed.is_empty() {
            out.push_str(&fmt.decimal_separator);
            out.push_str(trimmed);
        }
    }

    if fmt.include_symbol {
        out.push(' ');
        out.push_str(&fmt.symbol);
    }
    out
}

/// Parse display text back into the smallest unit
///
/// Symbol letters, surrounding whitespace and `,` separators are ignored.
/// Extra fraction digits beyond `decimals` are truncated.
pub fn parse_balance(value: &str, decimals: u8) -> Result<Balance> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_ascii_uppercase() && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err(EtridError::InvalidAmount(format!("empty balance: {:?}", value)));
    }

    let mut parts = cleaned.split('.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if parts.next().is_some() {
        return Err(EtridError::InvalidAmount(format!("multiple decimal points: {}", value)));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(EtridError::InvalidAmount(value.to_string()));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let mut fraction: String = fraction.chars().take(decimals as usize).collect();
    while fraction.len() < decimals as usize {
        fraction.push('0');
    }

    format!("{}{}", whole, fraction)
        .parse::<u128>()
        .map_err(|_| EtridError::InvalidAmount(format!("balance overflows u128: {}", value)))
}

/// Format an amount of ETR with default options
pub fn format_etr(amount: Balance) -> String {
    format_balance(amount, &BalanceFormat::default())
}

/// Format an amount of ETD with default options
pub fn format_etd(amount: Balance) -> String {
    format_balance(amount, &BalanceFormat::default().symbol(ETD_SYMBOL))
}

/// Format a fee in compact ETR
pub fn format_fee(fee: Balance) -> String {
    format_balance(fee, &BalanceFormat::default().compact())
}

/// `None` once `10^exp` no longer fits in a u128
fn pow10(exp: u8) -> Option<u128> {
    10u128.checked_pow(u32::from(exp))
}

fn group_thousands(digits: &str, separator: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

// ============================================================================
// NUMBERS
// ============================================================================

/// `12.345` → `"12.35%"` with `places = 2`
pub fn format_percentage(value: f64, places: usize) -> String {
    format!("{:.*}%", places, value)
}

/// APY rendering, same shape as [`format_percentage`]
pub fn format_apy(apy: f64, places: usize) -> String {
    format_percentage(apy, places)
}

/// Block height with thousands separators
pub fn format_block_number(block: u64) -> String {
    group_thousands(&block.to_string(), ",")
}

/// `1500` → `"1.5K"`, `2_500_000` → `"2.5M"`, `3_500_000_000` → `"3.5B"`
pub fn format_compact(value: f64) -> String {
    if value >= 1e9 {
        format!("{:.1}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.1}M", value / 1e6)
    } else if value >= 1e3 {
        format!("{:.1}K", value / 1e3)
    } else {
        value.to_string()
    }
}

/// Inverse of [`format_compact`]; suffix is case-insensitive
pub fn parse_compact(value: &str) -> Result<f64> {
    let invalid = || EtridError::InvalidAmount(format!("Invalid compact notation: {}", value));

    let (number, multiplier) = match value.chars().last() {
        Some('k' | 'K') => (&value[..value.len() - 1], 1e3),
        Some('m' | 'M') => (&value[..value.len() - 1], 1e6),
        Some('b' | 'B') => (&value[..value.len() - 1], 1e9),
        Some(_) => (value, 1.0),
        None => return Err(invalid()),
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }
    let parsed: f64 = number.parse().map_err(|_| invalid())?;
    Ok(parsed * multiplier)
}

// ============================================================================
// ADDRESSES & HASHES
// ============================================================================

/// `"5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"` → `"5Grwv...utQY"`
pub fn shorten_address(address: &str, prefix_len: usize, suffix_len: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= prefix_len + suffix_len {
        return address.to_string();
    }
    let head: String = chars[..prefix_len].iter().collect();
    let tail: String = chars[chars.len() - suffix_len..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Prefix with `0x` when missing and truncate the middle
pub fn format_hash(hash: &str, prefix_len: usize, suffix_len: usize) -> String {
    let hash = if hash.starts_with("0x") {
        hash.to_string()
    } else {
        format!("0x{}", hash)
    };
    shorten_address(&hash, prefix_len, suffix_len)
}

/// Decode hex text with or without `0x`
pub fn hex_to_bytes(value: &str) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| EtridError::Serialization(format!("invalid hex: {}", e)))
}

/// Encode bytes as `0x`-prefixed lowercase hex
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Accepts SS58 text or 0x-hex account ids (20 or 32 bytes)
pub fn validate_address(address: &str) -> Result<()> {
    let invalid = || EtridError::InvalidAddress(address.to_string());

    if let Some(digits) = address.strip_prefix("0x") {
        return match hex::decode(digits) {
            Ok(bytes) if bytes.len() == 20 || bytes.len() == 32 => Ok(()),
            _ => Err(invalid()),
        };
    }

    let well_formed = (46..=48).contains(&address.len())
        && address.chars().all(|c| BASE58_ALPHABET.contains(c));
    if well_formed {
        Ok(())
    } else {
        Err(invalid())
    }
}

// ============================================================================
// TIME
// ============================================================================

/// `"YYYY-MM-DD HH:MM:SS"` in UTC, or just the date
pub fn format_timestamp(ts: DateTime<Utc>, include_time: bool) -> String {
    if include_time {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Human duration of `blocks` at `block_time_secs` per block
///
/// Minutes are only shown for durations under a day.
pub fn format_duration(blocks: u64, block_time_secs: u64) -> String {
    let seconds = i64::try_from(blocks.saturating_mul(block_time_secs)).unwrap_or(i64::MAX);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 && days == 0 {
        parts.push(plural(minutes, "minute"));
    }

    if parts.is_empty() {
        "less than a minute".to_string()
    } else {
        parts.join(", ")
    }
}

/// Alias of [`format_duration`]
pub fn format_block_time(blocks: u64, block_time_secs: u64) -> String {
    format_duration(blocks, block_time_secs)
}

/// `"just now"`, `"5 minutes ago"`, `"1 year ago"`
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - ts).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} ago", plural(minutes, "minute"));
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} ago", plural(hours, "hour"));
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{} ago", plural(days, "day"));
    }
    let months = days / 30;
    if months < 12 {
        return format!("{} ago", plural(months, "month"));
    }
    format!("{} ago", plural(months / 12, "year"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_ETR;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    #[test]
    fn test_format_balance_defaults() {
        assert_eq!(format_etr(ONE_ETR), "1 ETR");
        assert_eq!(format_etr(ONE_ETR * 3 / 2), "1.5 ETR");
        assert_eq!(format_etr(1_234_567 * ONE_ETR), "1,234,567 ETR");
        assert_eq!(format_etr(0), "0 ETR");
        assert_eq!(format_etr(1), "0.000000000000000001 ETR");
        assert_eq!(format_etd(ONE_ETR / 4), "0.25 ETD");
    }

    #[test]
    fn test_format_balance_options() {
        let fmt = BalanceFormat::new().decimals(8).symbol("BTC");
        assert_eq!(format_balance(150_000_000, &fmt), "1.5 BTC");

        let fmt = BalanceFormat::new().without_symbol().separators(".", ",");
        assert_eq!(format_balance(1_234 * ONE_ETR + ONE_ETR / 2, &fmt), "1.234,5");

        let fmt = BalanceFormat::new().decimals(0).without_symbol();
        assert_eq!(format_balance(1_000, &fmt), "1,000");
    }

    #[test]
    fn test_format_signed_balance() {
        let fmt = BalanceFormat::default();
        assert_eq!(format_signed_balance(-(ONE_ETR as i128) * 2, &fmt), "-2 ETR");
        assert_eq!(format_signed_balance(0, &fmt), "0 ETR");
    }

    #[test]
    fn test_format_balance_compact() {
        let fmt = BalanceFormat::new().compact();
        // 1.23456789 ETR rounds to four places
        assert_eq!(format_balance(1_234_567_890_000_000_000, &fmt), "1.2346 ETR");
        // 2.99999 rounds up into the whole part
        assert_eq!(format_balance(2_999_990_000_000_000_000, &fmt), "3 ETR");
        // below one unit keeps full precision
        assert_eq!(format_balance(1_234_567, &fmt), "0.000000000001234567 ETR");
        assert_eq!(format_fee(ONE_ETR / 100), "0.01 ETR");
    }

    #[test]
    fn test_format_balance_beyond_u128_scale() {
        let fmt = BalanceFormat::new().decimals(39).without_symbol();
        let text = format_balance(1, &fmt);
        assert_eq!(text, format!("0.{}1", "0".repeat(38)));
        assert_eq!(parse_balance(&text, 39).unwrap(), 1);

        let compact = BalanceFormat::new().decimals(39).compact();
        assert_eq!(format_balance(0, &compact), "0 ETR");
        assert!(format_balance(u128::MAX, &compact).starts_with("0.3402823"));
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance("1.5 ETR", 18).unwrap(), ONE_ETR * 3 / 2);
        assert_eq!(parse_balance("1,234,567", 18).unwrap(), 1_234_567 * ONE_ETR);
        assert_eq!(parse_balance(".5", 2).unwrap(), 50);
        assert_eq!(parse_balance("1.23456", 2).unwrap(), 123);
        assert!(parse_balance("", 18).is_err());
        assert!(parse_balance("ETR", 18).is_err());
        assert!(parse_balance("1.2.3", 18).is_err());
        assert!(parse_balance("-1", 18).is_err());
        assert!(parse_balance("abc", 18).is_err());
    }

    proptest! {
        #[test]
        fn prop_balance_roundtrip(amount in any::<u128>(), decimals in 0u8..=48) {
            let fmt = BalanceFormat::new().decimals(decimals).without_symbol();
            let text = format_balance(amount, &fmt);
            prop_assert_eq!(parse_balance(&text, decimals).unwrap(), amount);
        }
    }

    #[test]
    fn test_compact_roundtrip() {
        for n in [500.0, 1_500.0, 2_500_000.0, 3_500_000_000.0] {
            let text = format_compact(n);
            let back = parse_compact(&text).unwrap();
            assert!((back - n).abs() / n < 0.05, "{} -> {} -> {}", n, text, back);
        }
        assert_eq!(format_compact(1_500.0), "1.5K");
        assert_eq!(format_compact(500.0), "500");
        assert_eq!(parse_compact("2.5m").unwrap(), 2_500_000.0);
    }

    #[test]
    fn test_parse_compact_rejects() {
        let err = parse_compact("1.5X").unwrap_err();
        assert_eq!(err.to_string(), "Invalid amount: Invalid compact notation: 1.5X");
        assert!(parse_compact("").is_err());
        assert!(parse_compact("K").is_err());
    }

    #[test]
    fn test_percentages() {
        assert_eq!(format_percentage(12.345, 2), "12.35%");
        assert_eq!(format_apy(5.0, 1), "5.0%");
    }

    #[test]
    fn test_addresses_and_hashes() {
        let addr = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
        assert_eq!(shorten_address(addr, 5, 4), "5Grwv...utQY");
        assert_eq!(shorten_address("short", 5, 4), "short");
        assert!(validate_address(addr).is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000800").is_ok());
        assert!(validate_address("invalid-address").is_err());

        assert_eq!(format_hash("abcdef0123456789abcdef", 10, 8), "0xabcdef01...89abcdef");
        assert_eq!(format_hash("0x1234", 10, 8), "0x1234");

        assert_eq!(hex_to_bytes("0x0aff").unwrap(), vec![0x0a, 0xff]);
        assert_eq!(bytes_to_hex(&[0x0a, 0xff]), "0x0aff");
        assert!(hex_to_bytes("0xzz").is_err());
    }

    #[test]
    fn test_block_number() {
        assert_eq!(format_block_number(1_234_567), "1,234,567");
        assert_eq!(format_block_number(999), "999");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0, 6), "less than a minute");
        assert_eq!(format_duration(10, 6), "1 minute");
        assert_eq!(format_duration(600, 6), "1 hour");
        assert_eq!(format_duration(610, 6), "1 hour, 1 minute");
        assert_eq!(format_duration(14_400, 6), "1 day");
        // minutes dropped once days appear
        assert_eq!(format_duration(15_010, 6), "1 day, 1 hour");
        assert_eq!(format_block_time(28_800, 5), "1 day, 16 hours");
        assert_eq!(format_duration(u64::MAX, 6), "106751991167300 days, 15 hours");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(ts, true), "2024-03-09 07:05:01");
        assert_eq!(format_timestamp(ts, false), "2024-03-09");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_relative_time(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(format_relative_time(now - Duration::days(3), now), "3 days ago");
        assert_eq!(format_relative_time(now - Duration::days(65), now), "2 months ago");
        assert_eq!(format_relative_time(now - Duration::days(800), now), "2 years ago");
    }
}
