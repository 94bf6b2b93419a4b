//! Shared helpers over transaction output shapes

use crate::constants::{FEE_BASIS_MAX_SATOSHIS, SATOSHI_QTY_MAX};

/// Per-output fee basis: the smallest satoshi value among regular outputs,
/// capped at [`FEE_BASIS_MAX_SATOSHIS`].
pub fn min_fee_basis(outputs_satoshis: &[u64], outputs_regular: &[bool]) -> u64 {
    let mut basis = SATOSHI_QTY_MAX;

    if outputs_satoshis.len() == outputs_regular.len() {
        for (satoshis, &regular) in outputs_satoshis.iter().zip(outputs_regular) {
            if regular && *satoshis < basis {
                basis = *satoshis;
            }
        }
    }

    basis.min(FEE_BASIS_MAX_SATOSHIS)
}

/// Index of the last regular output, if any.
pub fn last_regular_output(outputs_regular: &[bool]) -> Option<usize> {
    outputs_regular.iter().rposition(|&regular| regular)
}

/// Number of regular outputs excluding the last one.
pub fn count_non_last_regular_outputs(outputs_regular: &[bool]) -> usize {
    outputs_regular
        .iter()
        .filter(|&&regular| regular)
        .count()
        .saturating_sub(1)
}
