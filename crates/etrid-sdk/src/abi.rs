//! Minimal Ethereum ABI codec for the ETH PBC precompiles
//!
//! Call data is a 4-byte selector followed by 32-byte words. Static values
//! sit in the head; `string` and `address[]` sit in the tail behind an offset
//! word.
//!
//! ```text
//!   ┌──────────┬────────┬────────┬─────┬──────────────────────┐
//!   │ selector │ word 0 │ word 1 │ ... │ tail (dynamic data)  │
//!   └──────────┴────────┴────────┴─────┴──────────────────────┘
//! ```

use etrid_core::EtridError;
use thiserror::Error;

/// One ABI slot
pub type Word = [u8; 32];

/// A 20-byte EVM address
pub type EvmAddress = [u8; 20];

// ============================================================================
// SELECTORS
// ============================================================================

/// First 4 bytes of keccak256 of each precompile function signature
static SELECTORS: &[(&str, [u8; 4])] = &[
    // Oracle (0x800)
    ("getPrice(bytes32,bytes32)", [0x07, 0x76, 0xf2, 0x44]),
    ("getPriceInETH(bytes32)", [0xee, 0x29, 0x73, 0x27]),
    ("getLastUpdate(bytes32)", [0xa3, 0x4e, 0xa2, 0xa3]),
    // Governance (0x801)
    ("submitProposal(string,string)", [0xbe, 0x0d, 0xc4, 0xb7]),
    ("voteOnProposal(uint256,bool)", [0x16, 0x14, 0x66, 0x5c]),
    ("getProposalStatus(uint256)", [0x40, 0x18, 0x53, 0xb7]),
    // Staking (0x802)
    ("getValidatorStake(bytes32)", [0xee, 0xae, 0x23, 0xd7]),
    ("isValidatorActive(bytes32)", [0x23, 0x24, 0xe5, 0xe1]),
    ("getTotalStaked()", [0x09, 0x17, 0xe7, 0x76]),
    ("getValidatorCount()", [0x70, 0x71, 0x68, 0x8a]),
    // Native ETH wrapping (0x803)
    ("wrap()", [0xd4, 0x6e, 0xb1, 0x19]),
    ("unwrap(uint256)", [0xde, 0x0e, 0x9a, 0x3e]),
    ("getWrapRate()", [0xf3, 0x0f, 0x31, 0x0c]),
    // Token registry (0x805)
    ("getTokenInfo(address)", [0x1f, 0x69, 0x56, 0x5f]),
    ("registerToken(address)", [0x09, 0x82, 0x4a, 0x80]),
    ("getBridgedTokens()", [0xc8, 0x72, 0x7c, 0xc5]),
    // State proof (0x806)
    ("getLatestEthBlock()", [0x9c, 0xf2, 0x80, 0x2c]),
];

/// Selector for a known function signature
pub fn selector(signature: &str) -> Result<[u8; 4], AbiError> {
    SELECTORS
        .iter()
        .find(|(sig, _)| *sig == signature)
        .map(|(_, sel)| *sel)
        .ok_or_else(|| AbiError::UnknownFunction(signature.to_string()))
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Value does not fit in bytes32: {0}")]
    TooLong(String),

    #[error("Output too short: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Value overflows {0}")]
    Overflow(&'static str),

    #[error("Invalid UTF-8 in string output")]
    InvalidUtf8,
}

impl From<AbiError> for EtridError {
    fn from(err: AbiError) -> Self {
        match err {
            AbiError::InvalidAddress(a) => EtridError::InvalidAddress(a),
            AbiError::TooLong(v) => EtridError::validation("bytes32", format!("{} is longer than 31 bytes", v)),
            AbiError::UnknownFunction(_) => EtridError::Internal(err.to_string()),
            other => EtridError::Serialization(other.to_string()),
        }
    }
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// `formatBytes32String`: UTF-8 bytes right-padded, at most 31 bytes
pub fn bytes32_from_str(value: &str) -> Result<Word, AbiError> {
    let bytes = value.as_bytes();
    if bytes.len() > 31 {
        return Err(AbiError::TooLong(value.to_string()));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(word)
}

/// `hexZeroPad`: hex value left-padded to 32 bytes
pub fn bytes32_from_hex(value: &str) -> Result<Word, AbiError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let digits = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let bytes = hex::decode(&digits).map_err(|_| AbiError::InvalidAddress(value.to_string()))?;
    if bytes.len() > 32 {
        return Err(AbiError::TooLong(value.to_string()));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

/// Parse a `0x`-prefixed 20-byte address
pub fn parse_address(value: &str) -> Result<EvmAddress, AbiError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| AbiError::InvalidAddress(value.to_string()))?;
    let bytes = hex::decode(digits).map_err(|_| AbiError::InvalidAddress(value.to_string()))?;
    <EvmAddress>::try_from(bytes.as_slice()).map_err(|_| AbiError::InvalidAddress(value.to_string()))
}

/// Lowercase `0x` form of an address
pub fn format_address(address: &EvmAddress) -> String {
    format!("0x{}", hex::encode(address))
}

fn uint_word(value: u128) -> Word {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

// ============================================================================
// ENCODER
// ============================================================================

enum Token {
    Static(Word),
    Dynamic(Vec<u8>),
}

/// Builds call data for one function call
pub struct AbiEncoder {
    selector: [u8; 4],
    tokens: Vec<Token>,
}

impl AbiEncoder {
    pub fn new(signature: &str) -> Result<Self, AbiError> {
        Ok(Self {
            selector: selector(signature)?,
            tokens: Vec::new(),
        })
    }

    pub fn uint(mut self, value: u128) -> Self {
        self.tokens.push(Token::Static(uint_word(value)));
        self
    }

    pub fn boolean(mut self, value: bool) -> Self {
        self.tokens.push(Token::Static(uint_word(value as u128)));
        self
    }

    pub fn bytes32(mut self, value: Word) -> Self {
        self.tokens.push(Token::Static(value));
        self
    }

    pub fn address(mut self, value: EvmAddress) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&value);
        self.tokens.push(Token::Static(word));
        self
    }

    /// Dynamic `string`: length word then the bytes padded to 32
    pub fn string(mut self, value: &str) -> Self {
        let bytes = value.as_bytes();
        let mut tail = uint_word(bytes.len() as u128).to_vec();
        tail.extend_from_slice(bytes);
        tail.resize(32 + padded_len(bytes.len()), 0);
        self.tokens.push(Token::Dynamic(tail));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let head_len = self.tokens.len() * 32;
        let mut head = Vec::with_capacity(4 + head_len);
        let mut tail = Vec::new();
        head.extend_from_slice(&self.selector);

        for token in self.tokens {
            match token {
                Token::Static(word) => head.extend_from_slice(&word),
                Token::Dynamic(bytes) => {
                    head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                    tail.extend_from_slice(&bytes);
                }
            }
        }

        head.extend_from_slice(&tail);
        head
    }
}

// ============================================================================
// DECODER
// ============================================================================

/// Reads return data by head slot index
pub struct AbiDecoder<'a> {
    data: &'a [u8],
}

impl<'a> AbiDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// `data[start..start + len]`; offsets come from remote output
    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], AbiError> {
        let end = start.checked_add(len).ok_or(AbiError::Overflow("offset"))?;
        self.data.get(start..end).ok_or(AbiError::Truncated {
            needed: end,
            got: self.data.len(),
        })
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], AbiError> {
        self.slice(offset, 32)
    }

    fn head(slot: usize) -> Result<usize, AbiError> {
        slot.checked_mul(32).ok_or(AbiError::Overflow("offset"))
    }

    fn uint_at(&self, offset: usize) -> Result<u128, AbiError> {
        let word = self.word_at(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(AbiError::Overflow("u128"));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn offset_at(&self, offset: usize) -> Result<usize, AbiError> {
        usize::try_from(self.uint_at(offset)?).map_err(|_| AbiError::Overflow("usize"))
    }

    pub fn uint(&self, slot: usize) -> Result<u128, AbiError> {
        self.uint_at(Self::head(slot)?)
    }

    pub fn uint64(&self, slot: usize) -> Result<u64, AbiError> {
        u64::try_from(self.uint(slot)?).map_err(|_| AbiError::Overflow("u64"))
    }

    pub fn uint8(&self, slot: usize) -> Result<u8, AbiError> {
        u8::try_from(self.uint(slot)?).map_err(|_| AbiError::Overflow("u8"))
    }

    pub fn boolean(&self, slot: usize) -> Result<bool, AbiError> {
        Ok(self.uint(slot)? != 0)
    }

    pub fn bytes32(&self, slot: usize) -> Result<Word, AbiError> {
        let mut word = [0u8; 32];
        word.copy_from_slice(self.word_at(Self::head(slot)?)?);
        Ok(word)
    }

    pub fn address(&self, slot: usize) -> Result<EvmAddress, AbiError> {
        self.address_at(Self::head(slot)?)
    }

    fn address_at(&self, offset: usize) -> Result<EvmAddress, AbiError> {
        let word = self.word_at(offset)?;
        let mut address = [0u8; 20];
        address.copy_from_slice(&word[12..]);
        Ok(address)
    }

    pub fn string(&self, slot: usize) -> Result<String, AbiError> {
        let start = self.offset_at(Self::head(slot)?)?;
        let len = self.offset_at(start)?;
        let body = start.checked_add(32).ok_or(AbiError::Overflow("offset"))?;
        let bytes = self.slice(body, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }

    pub fn address_array(&self, slot: usize) -> Result<Vec<EvmAddress>, AbiError> {
        let start = self.offset_at(Self::head(slot)?)?;
        let count = self.offset_at(start)?;
        let body = start.checked_add(32).ok_or(AbiError::Overflow("offset"))?;
        let items = count.checked_mul(32).ok_or(AbiError::Overflow("offset"))?;
        // bounds-check the whole array before decoding any element
        self.slice(body, items)?;
        (0..count).map(|i| self.address_at(body + i * 32)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_lookup() {
        assert_eq!(selector("wrap()").unwrap(), [0xd4, 0x6e, 0xb1, 0x19]);
        assert_eq!(
            selector("transfer(address,uint256)").unwrap_err(),
            AbiError::UnknownFunction("transfer(address,uint256)".into())
        );
    }

    #[test]
    fn test_static_encoding() {
        let data = AbiEncoder::new("voteOnProposal(uint256,bool)")
            .unwrap()
            .uint(7)
            .boolean(true)
            .finish();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &[0x16, 0x14, 0x66, 0x5c]);
        assert_eq!(data[4 + 31], 7);
        assert_eq!(data[4 + 63], 1);
    }

    #[test]
    fn test_dynamic_string_encoding() {
        let data = AbiEncoder::new("submitProposal(string,string)")
            .unwrap()
            .string("Upgrade")
            .string("")
            .finish();
        let body = &data[4..];
        let decoder = AbiDecoder::new(body);

        assert_eq!(decoder.uint(0).unwrap(), 0x40);
        assert_eq!(decoder.uint(1).unwrap(), 0x80);
        assert_eq!(decoder.string(0).unwrap(), "Upgrade");
        assert_eq!(decoder.string(1).unwrap(), "");
        assert_eq!(body.len(), 64 + 64 + 32);
    }

    #[test]
    fn test_bytes32_helpers() {
        let word = bytes32_from_str("BTC").unwrap();
        assert_eq!(&word[..3], b"BTC");
        assert!(word[3..].iter().all(|b| *b == 0));
        assert!(bytes32_from_str(&"x".repeat(32)).is_err());

        let id = bytes32_from_hex("0x01ff").unwrap();
        assert_eq!(id[30], 0x01);
        assert_eq!(id[31], 0xff);
        assert!(id[..30].iter().all(|b| *b == 0));
        assert_eq!(bytes32_from_hex("0xabc").unwrap()[30], 0x0a);
    }

    #[test]
    fn test_address_array_decoding() {
        let mut out = uint_word(0x20).to_vec();
        out.extend_from_slice(&uint_word(2));
        let mut first = [0u8; 32];
        first[31] = 0xaa;
        let mut second = [0u8; 32];
        second[12] = 0xbb;
        out.extend_from_slice(&first);
        out.extend_from_slice(&second);

        let tokens = AbiDecoder::new(&out).address_array(0).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(format_address(&tokens[0]), "0x00000000000000000000000000000000000000aa");
        assert_eq!(tokens[1][0], 0xbb);
    }

    #[test]
    fn test_decoder_bounds() {
        let decoder = AbiDecoder::new(&[0u8; 16]);
        assert_eq!(
            decoder.uint(0).unwrap_err(),
            AbiError::Truncated { needed: 32, got: 16 }
        );

        let mut big = [0u8; 32];
        big[0] = 1;
        assert_eq!(AbiDecoder::new(&big).uint(0).unwrap_err(), AbiError::Overflow("u128"));
    }

    #[test]
    fn test_hostile_offsets_are_errors() {
        let far = uint_word(u64::MAX as u128);
        let decoder = AbiDecoder::new(&far);
        assert_eq!(decoder.string(0).unwrap_err(), AbiError::Overflow("offset"));
        assert_eq!(decoder.address_array(0).unwrap_err(), AbiError::Overflow("offset"));

        // valid head, absurd length or count
        let mut out = uint_word(0x20).to_vec();
        out.extend_from_slice(&uint_word(u64::MAX as u128));
        let decoder = AbiDecoder::new(&out);
        assert!(decoder.string(0).is_err());
        assert!(decoder.address_array(0).is_err());

        let mut out = uint_word(0x20).to_vec();
        out.extend_from_slice(&uint_word(3));
        assert_eq!(
            AbiDecoder::new(&out).address_array(0).unwrap_err(),
            AbiError::Truncated { needed: 160, got: 64 }
        );
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x0000000000000000000000000000000000000805").unwrap();
        assert_eq!(addr[18], 0x08);
        assert_eq!(addr[19], 0x05);
        assert!(parse_address("0805").is_err());
        assert!(parse_address("0x1234").is_err());
    }
}
