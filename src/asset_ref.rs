//! Asset references
//!
//! A transfer names the asset it is moving by pointing at the transaction
//! that carried the asset's genesis: block number, byte offset of the
//! transaction within that block, and the first two bytes of its txid as a
//! disambiguator. A reserved sentinel stands in for the default route, which
//! moves every asset not claimed by an explicit transfer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, EncodeError, EncodeResult};

/// Reference to an asset by the location of its genesis transaction.
///
/// The derived ordering puts the default route before every genesis
/// reference, and orders genesis references by block number, then tx
/// offset, then txid prefix bytes. That is the order transfer grouping
/// relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum AssetRef {
    /// Sentinel for the default route (moves all otherwise-unclaimed assets)
    #[default]
    DefaultRoute,
    Genesis {
        block_num: u32,
        tx_offset: u32,
        txid_prefix: [u8; 2],
    },
}

impl AssetRef {
    pub fn is_default_route(&self) -> bool {
        matches!(self, AssetRef::DefaultRoute)
    }

    /// Render the canonical `block-offset-prefix` text form. The default
    /// route has no text form.
    pub fn encode(&self) -> EncodeResult<String> {
        match self {
            AssetRef::DefaultRoute => Err(EncodeError::Invalid {
                field: "asset_ref",
                reason: "default route has no text form",
            }),
            AssetRef::Genesis {
                block_num,
                tx_offset,
                txid_prefix,
            } => Ok(format!(
                "{}-{}-{}",
                block_num,
                tx_offset,
                256 * txid_prefix[1] as u32 + txid_prefix[0] as u32
            )),
        }
    }
}

impl FromStr for AssetRef {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.bytes().any(|b| !b.is_ascii_digit() && b != b'-') {
            return Err(DecodeError::BadGrammar("asset reference expects digits and hyphens"));
        }

        let mut parts = s.split('-');
        let (Some(block), Some(offset), Some(prefix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::BadGrammar("asset reference expects three parts"));
        };

        let block_num: u32 = block
            .parse()
            .map_err(|_| DecodeError::OutOfRange { field: "block number" })?;
        let tx_offset: u32 = offset
            .parse()
            .map_err(|_| DecodeError::OutOfRange { field: "tx offset" })?;
        let prefix_value: u32 = prefix
            .parse()
            .map_err(|_| DecodeError::OutOfRange { field: "txid prefix" })?;
        if prefix_value > 0xFFFF {
            return Err(DecodeError::OutOfRange { field: "txid prefix" });
        }

        Ok(AssetRef::Genesis {
            block_num,
            tx_offset,
            txid_prefix: [(prefix_value & 0xFF) as u8, (prefix_value >> 8) as u8],
        })
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRef::DefaultRoute => write!(f, "default route"),
            AssetRef::Genesis {
                block_num,
                tx_offset,
                txid_prefix,
            } => write!(
                f,
                "{}-{}-{}",
                block_num,
                tx_offset,
                256 * txid_prefix[1] as u32 + txid_prefix[0] as u32
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        let asset_ref = AssetRef::Genesis {
            block_num: 500,
            tx_offset: 3,
            txid_prefix: [0xAB, 0xCD],
        };
        let text = asset_ref.encode().unwrap();
        assert_eq!(text, "500-3-52651"); // 256*0xCD + 0xAB
        assert_eq!(text.parse::<AssetRef>().unwrap(), asset_ref);
    }

    #[test]
    fn test_parse_rejects_bad_grammar() {
        assert!("500-3".parse::<AssetRef>().is_err());
        assert!("500-3-1-2".parse::<AssetRef>().is_err());
        assert!("500-3-ab".parse::<AssetRef>().is_err());
        assert!("".parse::<AssetRef>().is_err());
        assert!("500--3-1".parse::<AssetRef>().is_err());
    }

    #[test]
    fn test_parse_rejects_prefix_above_two_bytes() {
        assert!("500-3-65536".parse::<AssetRef>().is_err());
        assert!("500-3-65535".parse::<AssetRef>().is_ok());
    }

    #[test]
    fn test_default_route_has_no_text_form() {
        assert!(AssetRef::DefaultRoute.encode().is_err());
    }

    #[test]
    fn test_ordering_default_route_first() {
        let default_route = AssetRef::DefaultRoute;
        let early = AssetRef::Genesis {
            block_num: 100,
            tx_offset: 9,
            txid_prefix: [0xFF, 0xFF],
        };
        let later = AssetRef::Genesis {
            block_num: 100,
            tx_offset: 10,
            txid_prefix: [0x00, 0x00],
        };
        assert!(default_route < early);
        assert!(early < later);
    }
}
