//! Domain name and page path compression
//!
//! Asset web locators are squeezed three ways before hitting the wire:
//! common prefixes ("www.") and TLD suffixes are replaced by dictionary
//! indices packed into one byte, IPv4 literals are stored as raw octets
//! behind a marker, and whatever text remains is packed 3 characters into
//! 2 bytes over a 40-symbol alphabet. Two alphabet symbols (`<` and `>`)
//! terminate a part while simultaneously carrying a boolean flag (https for
//! the domain part, the locator prefix for the page path).

use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::quantity::{read_unsigned, write_unsigned};

/// Dictionary of domain-name prefixes, indexed by the top 2 packing bits
pub const DOMAIN_NAME_PREFIXES: &[&str] = &["", "www."];

/// Dictionary of domain-name suffixes, indexed by the low 6 packing bits
pub const DOMAIN_NAME_SUFFIXES: &[&str] = &[
    "", ".at", ".au", ".be", ".biz", ".br", ".ca", ".ch", ".cn", ".co.jp", ".co.kr", ".co.uk",
    ".co.za", ".co", ".com.ar", ".com.au", ".com.br", ".com.cn", ".com.mx", ".com.tr", ".com.tw",
    ".com.ua", ".com", ".cz", ".de", ".dk", ".edu", ".es", ".eu", ".fr", ".gov", ".gr", ".hk",
    ".hu", ".il", ".in", ".info", ".ir", ".it", ".jp", ".kr", ".me", ".mx", ".net", ".nl", ".no",
    ".org", ".pl", ".ps", ".ro", ".ru", ".se", ".sg", ".tr", ".tv", ".tw", ".ua", ".uk", ".us",
    ".vn",
];

/// 40-symbol alphabet for triplet packing; `<` and `>` are part terminators
const DOMAIN_NAME_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz-.<>";

const DOMAIN_PACKING_PREFIX_MASK: u8 = 0xC0;
const DOMAIN_PACKING_PREFIX_SHIFT: u8 = 6;
const DOMAIN_PACKING_SUFFIX_MASK: u8 = 0x3F;

/// Suffix index value reserved to mark a raw IPv4 address
const DOMAIN_PACKING_SUFFIX_IPV4: u8 = 63;
/// Https flag carried in the IPv4 marker byte itself
const DOMAIN_PACKING_IPV4_HTTPS: u8 = 0x40;

const DOMAIN_PATH_ENCODE_BASE: u64 = 40;
const DOMAIN_PATH_FALSE_END_CHAR: char = '<';
const DOMAIN_PATH_TRUE_END_CHAR: char = '>';

/// A dictionary-compressed domain name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShrunkDomain {
    /// Lower-cased domain text with dictionary prefix and suffix removed
    pub residual: String,
    /// `prefix_index << 6 | suffix_index`
    pub packing: u8,
}

/// Result of decoding a domain/path block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedDomainPath {
    pub domain_name: String,
    pub use_https: bool,
    pub page_path: String,
    pub use_prefix: bool,
    /// Bytes consumed from the metadata handed in
    pub consumed: usize,
}

/// Lower-case `domain_name` and strip the longest matching dictionary prefix
/// and suffix, packing their indices into one byte.
pub fn shrink_lower_domain_name(domain_name: &str) -> EncodeResult<ShrunkDomain> {
    if domain_name.is_empty() {
        return Err(EncodeError::Invalid {
            field: "domain_name",
            reason: "must not be empty",
        });
    }

    let lowered = domain_name.to_lowercase();

    let mut best_prefix_index = 0;
    let mut best_prefix_len = 0;
    for (index, prefix) in DOMAIN_NAME_PREFIXES.iter().enumerate() {
        if prefix.len() > best_prefix_len && lowered.starts_with(prefix) {
            best_prefix_index = index;
            best_prefix_len = prefix.len();
        }
    }

    let stripped = &lowered[best_prefix_len..];

    let mut best_suffix_index = 0;
    let mut best_suffix_len = 0;
    for (index, suffix) in DOMAIN_NAME_SUFFIXES.iter().enumerate() {
        if suffix.len() > best_suffix_len && stripped.ends_with(suffix) {
            best_suffix_index = index;
            best_suffix_len = suffix.len();
        }
    }

    let residual = stripped[..stripped.len() - best_suffix_len].to_string();

    let packing = (((best_prefix_index as u8) << DOMAIN_PACKING_PREFIX_SHIFT)
        & DOMAIN_PACKING_PREFIX_MASK)
        | (best_suffix_index as u8 & DOMAIN_PACKING_SUFFIX_MASK);

    Ok(ShrunkDomain { residual, packing })
}

/// Inverse of [`shrink_lower_domain_name`]: re-attach the dictionary prefix
/// and suffix selected by `packing`.
pub fn expand_domain_name(residual: &str, packing: u8) -> DecodeResult<String> {
    let prefix_index = ((packing & DOMAIN_PACKING_PREFIX_MASK) >> DOMAIN_PACKING_PREFIX_SHIFT) as usize;
    let prefix = DOMAIN_NAME_PREFIXES
        .get(prefix_index)
        .ok_or(DecodeError::OutOfRange {
            field: "domain prefix index",
        })?;

    let suffix_index = (packing & DOMAIN_PACKING_SUFFIX_MASK) as usize;
    let suffix = DOMAIN_NAME_SUFFIXES
        .get(suffix_index)
        .ok_or(DecodeError::OutOfRange {
            field: "domain suffix index",
        })?;

    Ok(format!("{prefix}{residual}{suffix}"))
}

/// Parse a strict dotted-quad IPv4 literal; anything else returns `None`.
///
/// IPv4 detection takes priority over dictionary compression, so this is
/// consulted before [`shrink_lower_domain_name`] on every encode.
pub fn read_ipv4_address(domain_name: &str) -> Option<[u8; 4]> {
    if domain_name
        .bytes()
        .any(|b| !b.is_ascii_digit() && b != b'.')
    {
        return None;
    }

    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in domain_name.split('.') {
        if count == 4 || part.is_empty() {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        if value > 255 {
            return None;
        }
        octets[count] = value as u8;
        count += 1;
    }

    (count == 4).then_some(octets)
}

/// Pack `text` 3 characters at a time into small-endian 2-byte groups,
/// appending to `metadata`.
fn encode_domain_path_triplets(text: &str, metadata: &mut Vec<u8>) -> EncodeResult<()> {
    let mut triplet: u64 = 0;
    let last_pos = text.len().saturating_sub(1);

    for (pos, byte) in text.bytes().enumerate() {
        let encode_value = DOMAIN_NAME_CHARS
            .iter()
            .position(|&c| c == byte)
            .ok_or(EncodeError::UnpackableChar(byte as char))? as u64;

        match pos % 3 {
            0 => triplet = encode_value,
            1 => triplet += encode_value * DOMAIN_PATH_ENCODE_BASE,
            _ => triplet += encode_value * DOMAIN_PATH_ENCODE_BASE * DOMAIN_PATH_ENCODE_BASE,
        }

        if pos % 3 == 2 || pos == last_pos {
            metadata.extend_from_slice(&write_unsigned(triplet, 2)?);
        }
    }

    Ok(())
}

/// Unpack 2-byte groups until `parts` terminator characters have been seen,
/// returning the recovered string and the bytes consumed.
fn decode_domain_path_triplets(metadata: &[u8], mut parts: usize) -> DecodeResult<(String, usize)> {
    let mut text = String::new();
    let mut consumed = 0;
    let mut string_pos = 0;
    let mut triplet: u64 = 0;

    while parts > 0 {
        if string_pos % 3 == 0 {
            triplet = read_unsigned(&metadata[consumed..], 2)?;
            consumed += 2;
            if triplet
                >= DOMAIN_PATH_ENCODE_BASE * DOMAIN_PATH_ENCODE_BASE * DOMAIN_PATH_ENCODE_BASE
            {
                return Err(DecodeError::OutOfRange {
                    field: "string triplet",
                });
            }
        }

        let decode_value = match string_pos % 3 {
            0 => triplet % DOMAIN_PATH_ENCODE_BASE,
            1 => (triplet / DOMAIN_PATH_ENCODE_BASE) % DOMAIN_PATH_ENCODE_BASE,
            _ => triplet / (DOMAIN_PATH_ENCODE_BASE * DOMAIN_PATH_ENCODE_BASE),
        };

        let decode_char = DOMAIN_NAME_CHARS[decode_value as usize] as char;
        text.push(decode_char);
        string_pos += 1;

        if decode_char == DOMAIN_PATH_TRUE_END_CHAR || decode_char == DOMAIN_PATH_FALSE_END_CHAR {
            parts -= 1;
        }
    }

    Ok((text, consumed))
}

fn end_char(flag: bool) -> char {
    if flag {
        DOMAIN_PATH_TRUE_END_CHAR
    } else {
        DOMAIN_PATH_FALSE_END_CHAR
    }
}

/// Encode a domain name plus page path into the wire block used by genesis
/// metadata.
pub fn encode_domain_and_path(
    domain_name: &str,
    use_https: bool,
    page_path: &str,
    use_prefix: bool,
) -> EncodeResult<Vec<u8>> {
    let mut metadata = Vec::new();
    let mut encode_string = String::new();

    if let Some(octets) = read_ipv4_address(domain_name) {
        let https_flag = if use_https {
            DOMAIN_PACKING_IPV4_HTTPS
        } else {
            0
        };
        metadata.push(DOMAIN_PACKING_SUFFIX_IPV4 + https_flag);
        metadata.extend_from_slice(&octets);
    } else {
        let shrunk = shrink_lower_domain_name(domain_name)?;
        encode_string.push_str(&shrunk.residual);
        encode_string.push(end_char(use_https));
        metadata.push(shrunk.packing);
    }

    encode_string.push_str(page_path);
    encode_string.push(end_char(use_prefix));

    encode_domain_path_triplets(&encode_string, &mut metadata)?;

    Ok(metadata)
}

/// Decode the wire block produced by [`encode_domain_and_path`].
pub fn decode_domain_and_path(metadata: &[u8]) -> DecodeResult<DecodedDomainPath> {
    let packing = *metadata.first().ok_or(DecodeError::Truncated {
        wanted: 1,
        available: 0,
    })?;
    let mut consumed = 1;

    let is_ip_address = packing & DOMAIN_PACKING_SUFFIX_MASK == DOMAIN_PACKING_SUFFIX_IPV4;

    let mut domain_name = String::new();
    let mut use_https = false;
    let mut parts = 1; // page path is always present

    if is_ip_address {
        use_https = packing & DOMAIN_PACKING_IPV4_HTTPS != 0;
        let octets = metadata
            .get(consumed..consumed + 4)
            .ok_or(DecodeError::Truncated {
                wanted: 4,
                available: metadata.len() - consumed,
            })?;
        domain_name = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
        consumed += 4;
    } else {
        parts += 1;
    }

    let (decoded, used) = decode_domain_path_triplets(&metadata[consumed..], parts)?;
    consumed += used;
    let mut remainder = decoded.as_str();

    if !is_ip_address {
        let end_pos = remainder
            .find(|c| c == DOMAIN_PATH_TRUE_END_CHAR || c == DOMAIN_PATH_FALSE_END_CHAR)
            .ok_or(DecodeError::MalformedChain("unterminated domain name"))?;
        domain_name = expand_domain_name(&remainder[..end_pos], packing)?;
        use_https = remainder.as_bytes()[end_pos] == DOMAIN_PATH_TRUE_END_CHAR as u8;
        remainder = &remainder[end_pos + 1..];
    }

    let end_pos = remainder
        .find(|c| c == DOMAIN_PATH_TRUE_END_CHAR || c == DOMAIN_PATH_FALSE_END_CHAR)
        .ok_or(DecodeError::MalformedChain("unterminated page path"))?;
    let page_path = remainder[..end_pos].to_string();
    let use_prefix = remainder.as_bytes()[end_pos] == DOMAIN_PATH_TRUE_END_CHAR as u8;

    Ok(DecodedDomainPath {
        domain_name,
        use_https,
        page_path,
        use_prefix,
        consumed,
    })
}
