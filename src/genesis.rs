//! Genesis metadata
//!
//! A genesis record creates an asset: how many units exist, what transfer
//! charges the issuer levies, where the asset's web page lives and a hash
//! binding the on-chain record to the asset's off-chain contract. Quantities
//! and flat charges are stored as mantissa/exponent pairs so large round
//! numbers stay compact on the wire.

use serde::{Deserialize, Serialize};

use crate::constants::{
    GENESIS_CHARGE_BASIS_POINTS_MAX, GENESIS_CHARGE_FLAT_EXPONENT_MAX,
    GENESIS_CHARGE_FLAT_MANTISSA_MAX, GENESIS_CHARGE_FLAT_MANTISSA_MAX_IF_EXP_MAX,
    GENESIS_DOMAIN_NAME_MAX_LEN, GENESIS_HASH_MAX_LEN, GENESIS_HASH_MIN_LEN,
    GENESIS_PAGE_PATH_MAX_LEN, GENESIS_PREFIX, GENESIS_QTY_EXPONENT_MAX, GENESIS_QTY_MANTISSA_MAX,
    GENESIS_QTY_MANTISSA_MIN, METADATA_IDENTIFIER, METADATA_IDENTIFIER_LEN, SATOSHI_QTY_MAX,
};
use crate::domain::{
    decode_domain_and_path, encode_domain_and_path, read_ipv4_address, shrink_lower_domain_name,
};
use crate::errors::{DecodeResult, EncodeError, EncodeResult};
use crate::metadata::locate_metadata_range;
use crate::quantity::{
    mantissa_exponent_to_qty, qty_to_mantissa_exponent, read_unsigned, write_unsigned, Rounding,
};
use crate::utils::{count_non_last_regular_outputs, last_regular_output, min_fee_basis};

const QTY_FLAGS_LENGTH: usize = 2;
const QTY_MASK: u64 = 0x3FFF;
const QTY_EXPONENT_MULTIPLE: u64 = 1001;
const FLAG_CHARGE_FLAT: u64 = 0x4000;
const FLAG_CHARGE_BPS: u64 = 0x8000;

const CHARGE_FLAT_LENGTH: usize = 1;
const CHARGE_FLAT_EXPONENT_MULTIPLE: u64 = 101;
const CHARGE_BPS_LENGTH: usize = 1;

/// An asset issuance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Issued quantity, as `qty_mantissa * 10^qty_exponent` units
    pub qty_mantissa: u16,
    pub qty_exponent: u8,
    /// Flat per-transfer charge, as `mantissa * 10^exponent` units; zero
    /// mantissa means no flat charge
    pub charge_flat_mantissa: u8,
    pub charge_flat_exponent: u8,
    /// Proportional per-transfer charge in basis points (hundredths of a
    /// percent)
    pub charge_basis_points: u8,
    pub use_https: bool,
    pub domain_name: String,
    /// Whether asset URLs insert the `coinspark/` path prefix
    pub use_prefix: bool,
    /// Fixed page path for the asset web page; empty means the path is
    /// derived from the first spent txid
    pub page_path: String,
    /// Prefix of the hash of the asset's contract, 12 to 32 bytes
    pub asset_hash: Vec<u8>,
}

impl Default for Genesis {
    fn default() -> Self {
        Genesis {
            qty_mantissa: GENESIS_QTY_MANTISSA_MIN,
            qty_exponent: 0,
            charge_flat_mantissa: 0,
            charge_flat_exponent: 0,
            charge_basis_points: 0,
            use_https: false,
            domain_name: String::new(),
            use_prefix: true,
            page_path: String::new(),
            asset_hash: Vec::new(),
        }
    }
}

impl Genesis {
    /// Check every field against its protocol bounds.
    pub fn validate(&self) -> EncodeResult<()> {
        if self.qty_mantissa < GENESIS_QTY_MANTISSA_MIN || self.qty_mantissa > GENESIS_QTY_MANTISSA_MAX
        {
            return Err(EncodeError::Invalid {
                field: "qty_mantissa",
                reason: "must be 1 to 1000",
            });
        }
        if self.qty_exponent > GENESIS_QTY_EXPONENT_MAX {
            return Err(EncodeError::Invalid {
                field: "qty_exponent",
                reason: "must be 0 to 11",
            });
        }
        if self.charge_flat_exponent > GENESIS_CHARGE_FLAT_EXPONENT_MAX {
            return Err(EncodeError::Invalid {
                field: "charge_flat_exponent",
                reason: "must be 0 to 2",
            });
        }
        let flat_mantissa_max = if self.charge_flat_exponent == GENESIS_CHARGE_FLAT_EXPONENT_MAX {
            GENESIS_CHARGE_FLAT_MANTISSA_MAX_IF_EXP_MAX
        } else {
            GENESIS_CHARGE_FLAT_MANTISSA_MAX
        };
        if self.charge_flat_mantissa > flat_mantissa_max {
            return Err(EncodeError::Invalid {
                field: "charge_flat_mantissa",
                reason: "exceeds flat charge mantissa bound",
            });
        }
        if self.charge_basis_points > GENESIS_CHARGE_BASIS_POINTS_MAX {
            return Err(EncodeError::Invalid {
                field: "charge_basis_points",
                reason: "must be 0 to 250",
            });
        }
        if self.domain_name.len() > GENESIS_DOMAIN_NAME_MAX_LEN {
            return Err(EncodeError::Invalid {
                field: "domain_name",
                reason: "longer than 32 characters",
            });
        }
        if self.page_path.len() > GENESIS_PAGE_PATH_MAX_LEN {
            return Err(EncodeError::Invalid {
                field: "page_path",
                reason: "longer than 24 characters",
            });
        }
        if self.asset_hash.len() < GENESIS_HASH_MIN_LEN || self.asset_hash.len() > GENESIS_HASH_MAX_LEN
        {
            return Err(EncodeError::Invalid {
                field: "asset_hash",
                reason: "must be 12 to 32 bytes",
            });
        }
        Ok(())
    }

    /// Issued quantity in asset units.
    pub fn get_qty(&self) -> u64 {
        mantissa_exponent_to_qty(self.qty_mantissa as u64, self.qty_exponent as u32)
    }

    /// Quantize `desired` into the genesis mantissa/exponent fields and
    /// return the quantity actually representable.
    pub fn set_qty(&mut self, desired: u64, rounding: Rounding) -> u64 {
        let result = qty_to_mantissa_exponent(
            desired,
            rounding,
            GENESIS_QTY_MANTISSA_MAX as u64,
            GENESIS_QTY_EXPONENT_MAX as u32,
        );
        self.qty_mantissa = result.mantissa as u16;
        self.qty_exponent = result.exponent as u8;
        self.get_qty()
    }

    /// Flat per-transfer charge in asset units.
    pub fn get_charge_flat(&self) -> u64 {
        mantissa_exponent_to_qty(
            self.charge_flat_mantissa as u64,
            self.charge_flat_exponent as u32,
        )
    }

    /// Quantize `desired` into the flat-charge fields and return the charge
    /// actually representable.
    pub fn set_charge_flat(&mut self, desired: u64, rounding: Rounding) -> u64 {
        let result = qty_to_mantissa_exponent(
            desired,
            rounding,
            GENESIS_CHARGE_FLAT_MANTISSA_MAX as u64,
            GENESIS_CHARGE_FLAT_EXPONENT_MAX as u32,
        );
        self.charge_flat_mantissa = result.mantissa as u8;
        self.charge_flat_exponent = result.exponent as u8;

        if self.charge_flat_exponent == GENESIS_CHARGE_FLAT_EXPONENT_MAX {
            self.charge_flat_mantissa = self
                .charge_flat_mantissa
                .min(GENESIS_CHARGE_FLAT_MANTISSA_MAX_IF_EXP_MAX);
        }

        self.get_charge_flat()
    }

    /// Issuer's charge on a gross transfer quantity, never exceeding the
    /// quantity itself. The proportional part rounds to nearest.
    pub fn calc_charge(&self, qty_gross: u64) -> u64 {
        let charge = self.get_charge_flat()
            + (qty_gross * self.charge_basis_points as u64 + 5000) / 10000;
        charge.min(qty_gross)
    }

    /// Units arriving after the issuer's charge is deducted.
    pub fn calc_net(&self, qty_gross: u64) -> u64 {
        qty_gross - self.calc_charge(qty_gross)
    }

    /// Smallest gross quantity whose net is at least `qty_net`.
    pub fn calc_gross(&self, qty_net: u64) -> u64 {
        if qty_net == 0 {
            return 0;
        }

        let lower_gross =
            ((qty_net + self.get_charge_flat()) * 10000) / (10000 - self.charge_basis_points as u64);

        if self.calc_net(lower_gross) >= qty_net {
            lower_gross
        } else {
            lower_gross + 1
        }
    }

    /// How many asset-hash bytes would fit if this record were encoded into
    /// `metadata_max_len` bytes, capped at the protocol hash maximum.
    pub fn calc_hash_len(&self, metadata_max_len: usize) -> usize {
        let mut hash_len =
            metadata_max_len as isize - METADATA_IDENTIFIER_LEN as isize - 1 - QTY_FLAGS_LENGTH as isize;

        if self.charge_flat_mantissa > 0 {
            hash_len -= CHARGE_FLAT_LENGTH as isize;
        }
        if self.charge_basis_points > 0 {
            hash_len -= CHARGE_BPS_LENGTH as isize;
        }

        let mut domain_path_len = self.page_path.len() as isize + 1;

        if read_ipv4_address(&self.domain_name).is_some() {
            hash_len -= 5; // packing byte plus four octets
        } else {
            hash_len -= 1; // packing byte
            match shrink_lower_domain_name(&self.domain_name) {
                Ok(shrunk) => domain_path_len += shrunk.residual.len() as isize + 1,
                Err(_) => return 0,
            }
        }

        hash_len -= 2 * ((domain_path_len + 2) / 3);

        hash_len.clamp(0, GENESIS_HASH_MAX_LEN as isize) as usize
    }

    /// Minimum transaction fee for a genesis: one fee basis per regular
    /// output that receives units.
    pub fn calc_min_fee(&self, outputs_satoshis: &[u64], outputs_regular: &[bool]) -> u64 {
        if outputs_satoshis.len() != outputs_regular.len() {
            return SATOSHI_QTY_MAX;
        }

        count_non_last_regular_outputs(outputs_regular) as u64
            * min_fee_basis(outputs_satoshis, outputs_regular)
    }

    /// Split the issued quantity across the transaction's regular outputs,
    /// excluding the last one. Division remainders go to the first receiving
    /// output.
    pub fn apply(&self, outputs_regular: &[bool]) -> Vec<u64> {
        let last_regular = last_regular_output(outputs_regular);
        let divide_outputs = count_non_last_regular_outputs(outputs_regular) as u64;
        let genesis_qty = self.get_qty();

        let qty_per_output = if divide_outputs == 0 {
            0
        } else {
            genesis_qty / divide_outputs
        };
        let mut extra_first_output = genesis_qty - qty_per_output * divide_outputs;

        let mut output_balances = vec![0u64; outputs_regular.len()];
        for (index, balance) in output_balances.iter_mut().enumerate() {
            if outputs_regular[index] && Some(index) != last_regular {
                *balance = qty_per_output + extra_first_output;
                extra_first_output = 0;
            }
        }

        output_balances
    }

    /// Build the asset's web page URL. When `page_path` is empty the path is
    /// a 16-character window into the doubled first-spent txid, selected by
    /// the spent output index.
    pub fn calc_asset_url(&self, first_spent_txid: &str, first_spent_vout: u32) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        let prefix = if self.use_prefix { "coinspark/" } else { "" };

        let path = if self.page_path.is_empty() {
            let doubled = format!("{first_spent_txid}{first_spent_txid}");
            let start = (first_spent_vout % 64) as usize;
            doubled
                .get(start..start + 16)
                .unwrap_or_default()
                .to_string()
        } else {
            self.page_path.clone()
        };

        format!("{scheme}://{}/{prefix}{path}/", self.domain_name).to_lowercase()
    }

    /// Compare two genesis records. `strict` compares raw mantissa/exponent
    /// pairs; otherwise the represented quantities are compared, so records
    /// that round to the same values match. Hash prefixes are compared over
    /// their common length.
    pub fn matches(&self, other: &Genesis, strict: bool) -> bool {
        let hash_compare_len = self
            .asset_hash
            .len()
            .min(other.asset_hash.len())
            .min(GENESIS_HASH_MAX_LEN);

        let float_quantities_match = if strict {
            self.qty_mantissa == other.qty_mantissa
                && self.qty_exponent == other.qty_exponent
                && self.charge_flat_mantissa == other.charge_flat_mantissa
                && self.charge_flat_exponent == other.charge_flat_exponent
        } else {
            self.get_qty() == other.get_qty()
                && self.get_charge_flat() == other.get_charge_flat()
        };

        float_quantities_match
            && self.charge_basis_points == other.charge_basis_points
            && self.use_https == other.use_https
            && self.domain_name.to_lowercase() == other.domain_name.to_lowercase()
            && self.use_prefix == other.use_prefix
            && self.page_path.to_lowercase() == other.page_path.to_lowercase()
            && self.asset_hash[..hash_compare_len] == other.asset_hash[..hash_compare_len]
    }

    /// Serialise into a standalone metadata blob of at most
    /// `metadata_max_len` bytes.
    pub fn encode(&self, metadata_max_len: usize) -> EncodeResult<Vec<u8>> {
        self.validate()?;

        let mut metadata = Vec::with_capacity(metadata_max_len);
        metadata.extend_from_slice(METADATA_IDENTIFIER);
        metadata.push(GENESIS_PREFIX);

        let mut quantity_encoded = (self.qty_exponent as u64 * QTY_EXPONENT_MULTIPLE
            + self.qty_mantissa as u64)
            & QTY_MASK;
        if self.charge_flat_mantissa > 0 {
            quantity_encoded |= FLAG_CHARGE_FLAT;
        }
        if self.charge_basis_points > 0 {
            quantity_encoded |= FLAG_CHARGE_BPS;
        }
        metadata.extend_from_slice(&write_unsigned(quantity_encoded, QTY_FLAGS_LENGTH)?);

        if quantity_encoded & FLAG_CHARGE_FLAT != 0 {
            let charge_encoded = self.charge_flat_exponent as u64 * CHARGE_FLAT_EXPONENT_MULTIPLE
                + self.charge_flat_mantissa as u64;
            metadata.extend_from_slice(&write_unsigned(charge_encoded, CHARGE_FLAT_LENGTH)?);
        }
        if quantity_encoded & FLAG_CHARGE_BPS != 0 {
            metadata.extend_from_slice(&write_unsigned(
                self.charge_basis_points as u64,
                CHARGE_BPS_LENGTH,
            )?);
        }

        metadata.extend_from_slice(&encode_domain_and_path(
            &self.domain_name,
            self.use_https,
            &self.page_path,
            self.use_prefix,
        )?);

        metadata.extend_from_slice(&self.asset_hash);

        if metadata.len() > metadata_max_len {
            return Err(EncodeError::Capacity {
                needed: metadata.len(),
                max_len: metadata_max_len,
            });
        }

        Ok(metadata)
    }

    /// Parse a genesis record out of a metadata blob (locating its segment
    /// within any chain).
    pub fn decode(metadata: &[u8]) -> DecodeResult<Genesis> {
        let payload = locate_metadata_range(metadata, Some(GENESIS_PREFIX))?;
        let mut position = 0;

        let quantity_encoded = read_unsigned(&payload[position..], QTY_FLAGS_LENGTH)?;
        position += QTY_FLAGS_LENGTH;

        let mut genesis = Genesis {
            qty_mantissa: ((quantity_encoded & QTY_MASK) % QTY_EXPONENT_MULTIPLE) as u16,
            qty_exponent: ((quantity_encoded & QTY_MASK) / QTY_EXPONENT_MULTIPLE) as u8,
            ..Genesis::default()
        };

        if quantity_encoded & FLAG_CHARGE_FLAT != 0 {
            let charge_encoded = read_unsigned(&payload[position..], CHARGE_FLAT_LENGTH)?;
            position += CHARGE_FLAT_LENGTH;
            genesis.charge_flat_mantissa = (charge_encoded % CHARGE_FLAT_EXPONENT_MULTIPLE) as u8;
            genesis.charge_flat_exponent = (charge_encoded / CHARGE_FLAT_EXPONENT_MULTIPLE) as u8;
        }

        if quantity_encoded & FLAG_CHARGE_BPS != 0 {
            genesis.charge_basis_points = read_unsigned(&payload[position..], CHARGE_BPS_LENGTH)? as u8;
            position += CHARGE_BPS_LENGTH;
        }

        let domain_path = decode_domain_and_path(&payload[position..])?;
        position += domain_path.consumed;
        genesis.use_https = domain_path.use_https;
        genesis.domain_name = domain_path.domain_name;
        genesis.use_prefix = domain_path.use_prefix;
        genesis.page_path = domain_path.page_path;

        let hash_len = (payload.len() - position).min(GENESIS_HASH_MAX_LEN);
        genesis.asset_hash = payload[position..position + hash_len].to_vec();

        genesis.validate().map_err(EncodeError::into_decode)?;

        Ok(genesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> Vec<u8> {
        (0u8..20).collect()
    }

    fn sample_genesis() -> Genesis {
        Genesis {
            qty_mantissa: 250,
            qty_exponent: 3,
            use_https: false,
            domain_name: "www.example.com".to_string(),
            use_prefix: true,
            page_path: String::new(),
            asset_hash: sample_hash(),
            ..Genesis::default()
        }
    }

    #[test]
    fn test_encode_known_bytes() {
        let genesis = sample_genesis();
        let encoded = genesis.encode(40).unwrap();

        // identifier + 'g', qty word 3*1001+250=3253 LE, packing (www. | .com),
        // triplets for "example<" and ">", then the hash
        let expected = format!("53504b67b50c56b6433e87bef9{}", hex::encode(sample_hash()));
        assert_eq!(hex::encode(&encoded), expected);
    }

    #[test]
    fn test_decode_round_trip() {
        let mut genesis = sample_genesis();
        genesis.charge_flat_mantissa = 10;
        genesis.charge_flat_exponent = 1;
        genesis.charge_basis_points = 25;

        let encoded = genesis.encode(60).unwrap();
        let decoded = Genesis::decode(&encoded).unwrap();
        assert_eq!(decoded, genesis);
        assert!(decoded.matches(&genesis, true));
    }

    #[test]
    fn test_encode_rejects_over_budget() {
        let genesis = sample_genesis();
        assert!(matches!(
            genesis.encode(20),
            Err(EncodeError::Capacity { .. })
        ));
    }

    #[test]
    fn test_decode_truncates_long_hash() {
        let mut genesis = sample_genesis();
        genesis.asset_hash = (0u8..32).collect();
        let mut encoded = genesis.encode(60).unwrap();
        encoded.extend_from_slice(&[0xEE; 4]); // trailing junk beyond the hash maximum

        let decoded = Genesis::decode(&encoded).unwrap();
        assert_eq!(decoded.asset_hash.len(), 32);
        assert_eq!(decoded.asset_hash, genesis.asset_hash);
    }

    #[test]
    fn test_validate_bounds() {
        let mut genesis = sample_genesis();
        genesis.qty_mantissa = 0;
        assert!(genesis.validate().is_err());

        let mut genesis = sample_genesis();
        genesis.qty_exponent = 12;
        assert!(genesis.validate().is_err());

        // flat mantissa 51 is fine at exponent 1 but not at exponent 2
        let mut genesis = sample_genesis();
        genesis.charge_flat_mantissa = 51;
        genesis.charge_flat_exponent = 1;
        assert!(genesis.validate().is_ok());
        genesis.charge_flat_exponent = 2;
        assert!(genesis.validate().is_err());

        let mut genesis = sample_genesis();
        genesis.asset_hash = vec![0; 11];
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_set_qty_and_charge_flat() {
        let mut genesis = sample_genesis();
        assert_eq!(genesis.set_qty(1_234_500, Rounding::Nearest), 1_230_000);
        assert_eq!(genesis.qty_mantissa, 123);
        assert_eq!(genesis.qty_exponent, 4);

        // 5000 quantizes to mantissa 50 exponent 2; 6000 would need mantissa
        // 60 at the maximum exponent, which gets clamped to 50
        assert_eq!(genesis.set_charge_flat(5000, Rounding::Down), 5000);
        assert_eq!(genesis.set_charge_flat(6000, Rounding::Down), 5000);
    }

    #[test]
    fn test_charge_arithmetic() {
        let mut genesis = sample_genesis();
        genesis.charge_flat_mantissa = 10;
        genesis.charge_flat_exponent = 0;
        genesis.charge_basis_points = 100; // 1%

        // 10 flat + round(1% of 5000) = 60
        assert_eq!(genesis.calc_charge(5000), 60);
        assert_eq!(genesis.calc_net(5000), 4940);
        // gross inverts net
        assert_eq!(genesis.calc_net(genesis.calc_gross(4940)), 4940);
        // charge never exceeds the gross quantity
        assert_eq!(genesis.calc_charge(5), 5);
        assert_eq!(genesis.calc_net(5), 0);
        assert_eq!(genesis.calc_gross(0), 0);
    }

    #[test]
    fn test_calc_hash_len_matches_encode() {
        let mut genesis = sample_genesis();
        for max_len in [20usize, 25, 30, 40, 60] {
            let hash_len = genesis.calc_hash_len(max_len);
            if hash_len >= GENESIS_HASH_MIN_LEN {
                genesis.asset_hash = vec![0xAB; hash_len];
                let encoded = genesis.encode(max_len).unwrap();
                assert!(encoded.len() <= max_len);
                // one more hash byte would overflow the budget (below the cap)
                if hash_len < GENESIS_HASH_MAX_LEN {
                    assert_eq!(encoded.len(), max_len);
                }
            }
        }
    }

    #[test]
    fn test_apply_splits_evenly_with_remainder_first() {
        let mut genesis = sample_genesis();
        genesis.set_qty(100, Rounding::Down);

        // regular outputs 0, 1, 3; last regular (3) is excluded
        let balances = genesis.apply(&[true, true, false, true]);
        assert_eq!(balances, vec![50, 50, 0, 0]);

        genesis.set_qty(101, Rounding::Down);
        let balances = genesis.apply(&[true, true, false, true]);
        assert_eq!(balances, vec![51, 50, 0, 0]);

        // a single regular output receives nothing
        assert_eq!(genesis.apply(&[false, true]), vec![0, 0]);
    }

    #[test]
    fn test_calc_min_fee() {
        let genesis = sample_genesis();
        // two counted outputs at basis 600
        assert_eq!(
            genesis.calc_min_fee(&[5000, 600, 800], &[true, true, true]),
            1200
        );
        assert_eq!(genesis.calc_min_fee(&[5000], &[true, true]), SATOSHI_QTY_MAX);
    }

    #[test]
    fn test_calc_asset_url() {
        let mut genesis = sample_genesis();
        genesis.page_path = "assets".to_string();
        assert_eq!(
            genesis.calc_asset_url("ABCD", 0),
            "http://www.example.com/coinspark/assets/"
        );

        genesis.page_path = String::new();
        genesis.use_https = true;
        genesis.use_prefix = false;
        let txid = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert_eq!(
            genesis.calc_asset_url(txid, 4),
            "https://www.example.com/456789abcdef0123/"
        );
    }

    #[test]
    fn test_matches_shared_hash_prefix() {
        let genesis = sample_genesis();
        let mut other = genesis.clone();
        other.asset_hash.truncate(12);
        assert!(genesis.matches(&other, true));

        other.asset_hash[0] ^= 0xFF;
        assert!(!genesis.matches(&other, true));
    }

    #[test]
    fn test_matches_loose_quantity_comparison() {
        let genesis = sample_genesis();
        let mut other = genesis.clone();
        // 250 * 10^3 == 25 * 10^4 after a hypothetical renormalization is
        // impossible here, so use the charge: 10*10^1 == 100*10^0
        other.charge_flat_mantissa = 10;
        other.charge_flat_exponent = 1;
        let mut first = genesis.clone();
        first.charge_flat_mantissa = 100;
        first.charge_flat_exponent = 0;

        assert!(first.matches(&other, false));
        assert!(!first.matches(&other, true));
    }
}
