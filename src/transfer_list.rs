//! Transfer lists and the balance-application engine
//!
//! A transfer-list record carries every asset movement of a transaction.
//! Encoding groups transfers so that delta compression against the previous
//! entry does the most good; applying a list turns per-input asset balances
//! into per-output balances, with anything unclaimed following the default
//! route.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset_ref::AssetRef;
use crate::constants::{METADATA_IDENTIFIER, SATOSHI_QTY_MAX, TRANSFERS_PREFIX};
use crate::errors::{DecodeResult, EncodeError, EncodeResult};
use crate::genesis::Genesis;
use crate::metadata::locate_metadata_range;
use crate::transfer::Transfer;
use crate::utils::{last_regular_output, min_fee_basis};

/// Every asset movement of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferList {
    pub transfers: Vec<Transfer>,
}

impl TransferList {
    pub fn validate(&self) -> EncodeResult<()> {
        for transfer in &self.transfers {
            transfer.validate()?;
        }
        Ok(())
    }

    /// Compare two lists. `strict` compares position by position; otherwise
    /// both lists are compared in their encoding order, so lists that differ
    /// only by grouping match.
    pub fn matches(&self, other: &TransferList, strict: bool) -> bool {
        if self.transfers.len() != other.transfers.len() {
            return false;
        }

        if strict {
            self.transfers
                .iter()
                .zip(&other.transfers)
                .all(|(mine, theirs)| mine.matches(theirs))
        } else {
            let this_ordering = self.group_ordering();
            let other_ordering = other.group_ordering();
            this_ordering
                .iter()
                .zip(&other_ordering)
                .all(|(&mine, &theirs)| self.transfers[mine].matches(&other.transfers[theirs]))
        }
    }

    /// Serialise into a standalone metadata blob of at most
    /// `metadata_max_len` bytes. Transfers are reordered (default routes
    /// first, then grouped by asset reference) so the delta compression can
    /// bite; decoding yields them in that order.
    pub fn encode(
        &self,
        count_inputs: u16,
        count_outputs: u16,
        metadata_max_len: usize,
    ) -> EncodeResult<Vec<u8>> {
        let mut metadata = Vec::with_capacity(metadata_max_len);
        metadata.extend_from_slice(METADATA_IDENTIFIER);
        metadata.push(TRANSFERS_PREFIX);

        let ordering = self.group_ordering();
        let mut previous: Option<&Transfer> = None;

        for &transfer_index in &ordering {
            let transfer = &self.transfers[transfer_index];
            let budget = metadata_max_len.saturating_sub(metadata.len());
            let written = transfer.encode(previous, budget, count_inputs, count_outputs)?;
            metadata.extend_from_slice(&written);
            previous = Some(transfer);
        }

        if metadata.len() > metadata_max_len {
            return Err(EncodeError::Capacity {
                needed: metadata.len(),
                max_len: metadata_max_len,
            });
        }

        Ok(metadata)
    }

    /// Parse a transfer list out of a metadata blob (locating its segment
    /// within any chain). The decoded order is the wire order.
    pub fn decode(metadata: &[u8], count_inputs: u16, count_outputs: u16) -> DecodeResult<TransferList> {
        let mut payload = locate_metadata_range(metadata, Some(TRANSFERS_PREFIX))?;

        let mut transfers: Vec<Transfer> = Vec::new();

        while !payload.is_empty() {
            let (transfer, consumed) =
                Transfer::decode(payload, transfers.last(), count_inputs, count_outputs)?;
            payload = &payload[consumed..];
            transfers.push(transfer);
        }

        debug!(count = transfers.len(), "decoded transfer list");

        Ok(TransferList { transfers })
    }

    /// Minimum transaction fee for this list: one fee basis per regular
    /// output covered by each explicit transfer with at least one valid
    /// input.
    pub fn calc_min_fee(
        &self,
        count_inputs: u16,
        outputs_satoshis: &[u64],
        outputs_regular: &[bool],
    ) -> u64 {
        let count_outputs = outputs_satoshis.len();
        if count_outputs != outputs_regular.len() {
            return SATOSHI_QTY_MAX;
        }

        let mut transfers_to_cover = 0u64;

        for transfer in &self.transfers {
            if transfer.asset_ref.is_default_route()
                || transfer.inputs.count == 0
                || transfer.inputs.first >= count_inputs
            {
                continue;
            }

            let first_output = transfer.outputs.first as usize;
            let last_output =
                (first_output + transfer.outputs.count as usize).min(count_outputs);
            for output_index in first_output..last_output {
                if outputs_regular[output_index] {
                    transfers_to_cover += 1;
                }
            }
        }

        transfers_to_cover * min_fee_basis(outputs_satoshis, outputs_regular)
    }

    /// Move one asset's per-input balances to per-output balances.
    ///
    /// Explicit transfers for `asset_ref` run first, draining inputs left to
    /// right; the input cursor carries across outputs while each output's
    /// quota starts afresh. The issuer's transfer charge (from `genesis`)
    /// then comes off every explicitly routed quantity, and whatever is left
    /// on the inputs follows the default route map untouched.
    pub fn apply(
        &self,
        asset_ref: &AssetRef,
        genesis: &Genesis,
        input_balances: &[u64],
        outputs_regular: &[bool],
    ) -> Vec<u64> {
        let mut input_balances = input_balances.to_vec();
        let count_inputs = input_balances.len();
        let count_outputs = outputs_regular.len();
        let mut output_balances = vec![0u64; count_outputs];

        for transfer in &self.transfers {
            if transfer.asset_ref != *asset_ref {
                continue;
            }

            let mut input_index = transfer.inputs.first as usize;
            let last_input = (transfer.inputs.first as usize + transfer.inputs.count as usize)
                .min(count_inputs);
            let first_output = transfer.outputs.first as usize;
            let last_output =
                (first_output + transfer.outputs.count as usize).min(count_outputs);

            for output_index in first_output..last_output {
                if !outputs_regular[output_index] {
                    continue;
                }
                let mut transfer_remaining = transfer.qty_per_output;

                while input_index < last_input {
                    let transfer_quantity = transfer_remaining.min(input_balances[input_index]);
                    input_balances[input_index] -= transfer_quantity;
                    transfer_remaining -= transfer_quantity;
                    output_balances[output_index] += transfer_quantity;

                    if transfer_remaining > 0 {
                        input_index += 1; // this input is drained
                    } else {
                        break;
                    }
                }
            }
        }

        // transfer charges apply to explicitly routed quantities only
        for (output_index, balance) in output_balances.iter_mut().enumerate() {
            if outputs_regular[output_index] {
                *balance = genesis.calc_net(*balance);
            }
        }

        let input_default_output = self.default_route_map(count_inputs, outputs_regular);
        for (input_index, default_output) in input_default_output.iter().enumerate() {
            if let Some(output_index) = default_output {
                output_balances[*output_index] += input_balances[input_index];
            }
        }

        output_balances
    }

    /// Balance movement when a transaction carries no (valid) transfer
    /// metadata: every asset moves in full to the last regular output.
    pub fn apply_none(input_balances: &[u64], outputs_regular: &[bool]) -> Vec<u64> {
        let mut output_balances = vec![0u64; outputs_regular.len()];

        if let Some(output_index) = last_regular_output(outputs_regular) {
            output_balances[output_index] = input_balances.iter().sum();
        }

        output_balances
    }

    /// Which outputs receive default-routed assets from any input.
    pub fn default_outputs(&self, count_inputs: u16, outputs_regular: &[bool]) -> Vec<bool> {
        let mut outputs_default = vec![false; outputs_regular.len()];

        for default_output in self.default_route_map(count_inputs as usize, outputs_regular) {
            if let Some(output_index) = default_output {
                outputs_default[output_index] = true;
            }
        }

        outputs_default
    }

    /// Encoding order: default routes first, then runs grouped by asset
    /// reference, ties going to the lower reference. The relative order is
    /// deterministic regardless of the order transfers were added in.
    pub fn group_ordering(&self) -> Vec<usize> {
        let count_transfers = self.transfers.len();
        let mut used = vec![false; count_transfers];
        let mut ordering: Vec<usize> = Vec::with_capacity(count_transfers);

        for order_index in 0..count_transfers {
            let mut best_score = 0u8;
            let mut best_index: Option<usize> = None;

            for (transfer_index, transfer) in self.transfers.iter().enumerate() {
                if used[transfer_index] {
                    continue;
                }

                let score = if transfer.asset_ref.is_default_route() {
                    3 // default routes must head the encoded list
                } else if order_index > 0
                    && transfer.asset_ref
                        == self.transfers[ordering[order_index - 1]].asset_ref
                {
                    2 // extending the current run costs the least
                } else {
                    1
                };

                match best_index {
                    Some(best)
                        if score == best_score
                            && transfer.asset_ref >= self.transfers[best].asset_ref => {}
                    _ if score >= best_score => {
                        best_score = score;
                        best_index = Some(transfer_index);
                    }
                    _ => {}
                }
            }

            let Some(best) = best_index else { break };
            ordering.push(best);
            used[best] = true;
        }

        ordering
    }

    /// Map each input to the output its default-routed balance lands on.
    /// The last regular output is the fallback; default-route transfers
    /// override it, with earlier transfers taking precedence.
    pub fn default_route_map(
        &self,
        count_inputs: usize,
        outputs_regular: &[bool],
    ) -> Vec<Option<usize>> {
        let count_outputs = outputs_regular.len();
        let mut input_default_output = vec![last_regular_output(outputs_regular); count_inputs];

        for transfer in self.transfers.iter().rev() {
            if !transfer.asset_ref.is_default_route() {
                continue;
            }

            let output_index = transfer.outputs.first as usize;
            if output_index < count_outputs {
                let first_input = transfer.inputs.first as usize;
                let last_input =
                    (first_input + transfer.inputs.count as usize).min(count_inputs);
                for default_output in &mut input_default_output[first_input.min(count_inputs)..last_input] {
                    *default_output = Some(output_index);
                }
            }
        }

        input_default_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::InOutRange;

    fn asset(block_num: u32, tx_offset: u32) -> AssetRef {
        AssetRef::Genesis {
            block_num,
            tx_offset,
            txid_prefix: [0xAB, 0xCD],
        }
    }

    fn transfer(asset_ref: AssetRef, inputs: (u16, u16), outputs: (u16, u16), qty: u64) -> Transfer {
        Transfer {
            asset_ref,
            inputs: InOutRange::new(inputs.0, inputs.1),
            outputs: InOutRange::new(outputs.0, outputs.1),
            qty_per_output: qty,
        }
    }

    #[test]
    fn test_encode_known_bytes() {
        let list = TransferList {
            transfers: vec![transfer(asset(500, 3), (0, 1), (0, 2), 100)],
        };
        let encoded = list.encode(1, 2, 40).unwrap();
        assert_eq!(hex::encode(&encoded), "53504b7451f40100030000abcd64");
    }

    #[test]
    fn test_decode_round_trip_multiple_assets() {
        let list = TransferList {
            transfers: vec![
                transfer(asset(500, 3), (0, 1), (0, 1), 100),
                transfer(asset(500, 3), (1, 1), (1, 1), 250),
                transfer(asset(720, 9), (0, 2), (2, 1), 60_000),
            ],
        };

        let encoded = list.encode(3, 4, 60).unwrap();
        let decoded = TransferList::decode(&encoded, 3, 4).unwrap();

        assert_eq!(decoded.transfers.len(), 3);
        assert!(decoded.matches(&list, false));
        // re-encoding the decoded list is stable
        assert_eq!(decoded.encode(3, 4, 60).unwrap(), encoded);
    }

    #[test]
    fn test_group_ordering() {
        let default_route = transfer(AssetRef::DefaultRoute, (0, 1), (1, 1), 0);
        let asset_a = asset(100, 1);
        let asset_b = asset(200, 1);

        let list = TransferList {
            transfers: vec![
                transfer(asset_b, (0, 1), (0, 1), 5),
                transfer(asset_a, (0, 1), (0, 1), 5),
                default_route.clone(),
                transfer(asset_b, (1, 1), (1, 1), 5),
            ],
        };

        // default route first, then asset A, then the asset B run
        assert_eq!(list.group_ordering(), vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_group_ordering_is_idempotent_after_decode() {
        let list = TransferList {
            transfers: vec![
                transfer(asset(720, 9), (0, 1), (0, 1), 7),
                transfer(AssetRef::DefaultRoute, (0, 1), (1, 1), 0),
                transfer(asset(500, 3), (0, 1), (1, 1), 9),
            ],
        };

        let encoded = list.encode(2, 2, 60).unwrap();
        let decoded = TransferList::decode(&encoded, 2, 2).unwrap();
        // decoded order is already grouped
        assert_eq!(decoded.group_ordering(), vec![0, 1, 2]);
        assert_eq!(decoded.encode(2, 2, 60).unwrap(), encoded);
    }

    #[test]
    fn test_calc_min_fee_counts_covered_regular_outputs() {
        let list = TransferList {
            transfers: vec![
                transfer(asset(500, 3), (0, 1), (0, 2), 100), // covers outputs 0 and 1
                transfer(AssetRef::DefaultRoute, (0, 1), (2, 1), 0), // not counted
                transfer(asset(500, 3), (5, 1), (0, 1), 100), // input index out of range
                transfer(asset(500, 3), (0, 0), (0, 1), 100), // empty input range
            ],
        };

        let satoshis = [5000, 600, 800];
        let regular = [true, true, true];
        assert_eq!(list.calc_min_fee(2, &satoshis, &regular), 1200);

        // op-return output inside the covered range is not charged for, and
        // it no longer contributes to the fee basis either
        let regular = [true, false, true];
        assert_eq!(list.calc_min_fee(2, &satoshis, &regular), 800);

        assert_eq!(
            list.calc_min_fee(2, &satoshis, &[true, true]),
            SATOSHI_QTY_MAX
        );
    }

    #[test]
    fn test_apply_drains_inputs_left_to_right() {
        let asset_ref = asset(500, 3);
        let list = TransferList {
            transfers: vec![transfer(asset_ref, (0, 2), (0, 2), 60)],
        };
        let genesis = Genesis {
            qty_mantissa: 100,
            qty_exponent: 0,
            domain_name: "example.com".to_string(),
            asset_hash: vec![0; 12],
            ..Genesis::default()
        };

        // input 0 holds 50, input 1 holds 100; output 0 takes 50+10, output 1
        // takes the remaining quota of 60 from input 1; 30 left over follows
        // the default route to the last regular output
        let balances = list.apply(&asset_ref, &genesis, &[50, 100], &[true, true, true]);
        assert_eq!(balances, vec![60, 60, 30]);
    }

    #[test]
    fn test_apply_charges_explicit_but_not_default_routed() {
        let asset_ref = asset(500, 3);
        let list = TransferList {
            transfers: vec![transfer(asset_ref, (0, 1), (0, 1), 1000)],
        };
        let mut genesis = Genesis {
            qty_mantissa: 100,
            qty_exponent: 0,
            domain_name: "example.com".to_string(),
            asset_hash: vec![0; 12],
            ..Genesis::default()
        };
        genesis.charge_basis_points = 100; // 1%

        let balances = list.apply(&asset_ref, &genesis, &[1500], &[true, true]);
        // 1000 routed minus 1% charge; 500 default-routed uncharged
        assert_eq!(balances, vec![990, 500]);
    }

    #[test]
    fn test_apply_ignores_other_assets() {
        let asset_ref = asset(500, 3);
        let list = TransferList {
            transfers: vec![transfer(asset(720, 9), (0, 1), (0, 1), 100)],
        };
        let genesis = Genesis {
            qty_mantissa: 100,
            qty_exponent: 0,
            domain_name: "example.com".to_string(),
            asset_hash: vec![0; 12],
            ..Genesis::default()
        };

        // no matching transfer: everything follows the default route
        let balances = list.apply(&asset_ref, &genesis, &[80], &[true, true]);
        assert_eq!(balances, vec![0, 80]);
    }

    #[test]
    fn test_apply_none_sends_everything_to_last_regular() {
        assert_eq!(
            TransferList::apply_none(&[10, 20, 30], &[true, true, false]),
            vec![0, 60, 0]
        );
        assert_eq!(
            TransferList::apply_none(&[10], &[false, false]),
            vec![0, 0]
        );
    }

    #[test]
    fn test_default_route_map_reverse_precedence() {
        let list = TransferList {
            transfers: vec![
                transfer(AssetRef::DefaultRoute, (0, 2), (0, 1), 0),
                transfer(AssetRef::DefaultRoute, (1, 1), (1, 1), 0),
            ],
        };

        // the earlier transfer wins for input 1 because later transfers are
        // applied first and then overwritten
        let map = list.default_route_map(3, &[true, true, true]);
        assert_eq!(map, vec![Some(0), Some(0), Some(2)]);

        let defaults = list.default_outputs(3, &[true, true, true]);
        assert_eq!(defaults, vec![true, false, true]);
    }

    #[test]
    fn test_default_route_map_ignores_out_of_range_output() {
        let list = TransferList {
            transfers: vec![transfer(AssetRef::DefaultRoute, (0, 1), (9, 1), 0)],
        };
        let map = list.default_route_map(1, &[true, true]);
        assert_eq!(map, vec![Some(1)]);
    }

    #[test]
    fn test_matches_loose_ignores_insertion_order() {
        let first = TransferList {
            transfers: vec![
                transfer(asset(500, 3), (0, 1), (0, 1), 10),
                transfer(asset(720, 9), (1, 1), (1, 1), 20),
            ],
        };
        let second = TransferList {
            transfers: vec![
                transfer(asset(720, 9), (1, 1), (1, 1), 20),
                transfer(asset(500, 3), (0, 1), (0, 1), 10),
            ],
        };

        assert!(first.matches(&second, false));
        assert!(!first.matches(&second, true));
    }
}
