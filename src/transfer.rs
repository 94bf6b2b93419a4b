//! Single asset transfers
//!
//! A transfer moves `qty_per_output` units of one asset from a range of
//! transaction inputs to a range of outputs. The wire form is aggressively
//! delta-compressed against the previous transfer in the list: a leading
//! packing byte says how the asset reference, the index ranges and the
//! quantity are represented, and most fields collapse to zero bytes when
//! they repeat the previous transfer or a common pattern.

use serde::{Deserialize, Serialize};

use crate::asset_ref::AssetRef;
use crate::constants::{ASSETREF_TXID_PREFIX_LEN, ASSET_QTY_MAX};
use crate::errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::quantity::{
    mantissa_exponent_to_qty, qty_to_mantissa_exponent, read_unsigned, write_unsigned, Rounding,
};

const PACKING_GENESIS_MASK: u8 = 0xC0;
const PACKING_GENESIS_PREV: u8 = 0x00;
/// 3 bytes block number, 3 bytes tx offset
const PACKING_GENESIS_3_3_BYTES: u8 = 0x40;
/// 3 bytes block number, 4 bytes tx offset
const PACKING_GENESIS_3_4_BYTES: u8 = 0x80;
/// 4 bytes block number, 4 bytes tx offset
const PACKING_GENESIS_4_4_BYTES: u8 = 0xC0;

const PACKING_INDICES_MASK: u8 = 0x38;
const PACKING_INDICES_0P_0P: u8 = 0x00;
const PACKING_INDICES_0P_1S: u8 = 0x08;
const PACKING_INDICES_0P_ALL: u8 = 0x10;
const PACKING_INDICES_1S_0P: u8 = 0x18;
const PACKING_INDICES_ALL_0P: u8 = 0x20;
const PACKING_INDICES_ALL_1S: u8 = 0x28;
const PACKING_INDICES_ALL_ALL: u8 = 0x30;
/// Index ranges carried in a second packing byte
const PACKING_INDICES_EXTEND: u8 = 0x38;

const PACKING_EXTEND_INPUTS_SHIFT: u8 = 3;
const PACKING_EXTEND_OUTPUTS_SHIFT: u8 = 0;
const PACKING_EXTEND_MASK: u8 = 0x07;

const PACKING_QUANTITY_MASK: u8 = 0x07;
const PACKING_QUANTITY_1P: u8 = 0x00;
const PACKING_QUANTITY_1_BYTE: u8 = 0x01;
const PACKING_QUANTITY_2_BYTES: u8 = 0x02;
const PACKING_QUANTITY_3_BYTES: u8 = 0x03;
const PACKING_QUANTITY_4_BYTES: u8 = 0x04;
const PACKING_QUANTITY_6_BYTES: u8 = 0x05;
const PACKING_QUANTITY_FLOAT: u8 = 0x06;
const PACKING_QUANTITY_MAX: u8 = 0x07;

const QTY_FLOAT_LENGTH: usize = 2;
const QTY_FLOAT_MANTISSA_MAX: u64 = 1000;
const QTY_FLOAT_EXPONENT_MAX: u32 = 11;
const QTY_FLOAT_MASK: u64 = 0x3FFF;
const QTY_FLOAT_EXPONENT_MULTIPLE: u64 = 1001;

const UNSIGNED_BYTE_MAX: u64 = 0xFF;
const UNSIGNED_2_BYTES_MAX: u64 = 0xFFFF;
const UNSIGNED_3_BYTES_MAX: u64 = 0xFF_FFFF;

/// A contiguous range of transaction input or output indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InOutRange {
    pub first: u16,
    pub count: u16,
}

impl InOutRange {
    pub fn new(first: u16, count: u16) -> Self {
        InOutRange { first, count }
    }

    pub fn matches(&self, other: &InOutRange) -> bool {
        self == other
    }
}

/// How an index range is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangePacking {
    /// Index 0 with count 1, or repeat the previous transfer's range
    ZeroOrPrev,
    /// Index 1 with count 1, or the single index after the previous range
    OneOrSubsequent,
    /// Every input or output of the transaction
    All,
    /// 1 byte for a single index
    SingleByte,
    /// 2 bytes for a single index
    SingleTwoBytes,
    /// 1 byte first index, 1 byte count
    OneOneBytes,
    /// 2 bytes first index, 1 byte count
    TwoOneBytes,
    /// 2 bytes first index, 2 bytes count
    TwoTwoBytes,
}

/// Wire tag for each range representation, listed in the encoder's order of
/// preference (most compact first; `TwoTwoBytes` can represent anything).
const RANGE_PACKING_MAP: &[(RangePacking, u8)] = &[
    (RangePacking::ZeroOrPrev, 0x00),
    (RangePacking::OneOrSubsequent, 0x01),
    (RangePacking::All, 0x07),
    (RangePacking::SingleByte, 0x02),
    (RangePacking::SingleTwoBytes, 0x03),
    (RangePacking::OneOneBytes, 0x04),
    (RangePacking::TwoOneBytes, 0x05),
    (RangePacking::TwoTwoBytes, 0x06),
];

/// Which representations can hold a given range in a given context.
#[derive(Debug, Clone, Copy, Default)]
struct PackingOptions {
    zero_or_prev: bool,
    one_or_subsequent: bool,
    all: bool,
    single_byte: bool,
    single_two_bytes: bool,
    one_one_bytes: bool,
    two_one_bytes: bool,
    two_two_bytes: bool,
}

impl PackingOptions {
    fn allows(&self, packing: RangePacking) -> bool {
        match packing {
            RangePacking::ZeroOrPrev => self.zero_or_prev,
            RangePacking::OneOrSubsequent => self.one_or_subsequent,
            RangePacking::All => self.all,
            RangePacking::SingleByte => self.single_byte,
            RangePacking::SingleTwoBytes => self.single_two_bytes,
            RangePacking::OneOneBytes => self.one_one_bytes,
            RangePacking::TwoOneBytes => self.two_one_bytes,
            RangePacking::TwoTwoBytes => self.two_two_bytes,
        }
    }
}

fn range_packing_options(
    previous: Option<&InOutRange>,
    range: &InOutRange,
    count_io: u16,
) -> PackingOptions {
    let first_zero = range.first == 0;
    let count_one = range.count == 1;

    let (zero_or_prev, one_or_subsequent) = match previous {
        Some(prev) => (
            range.matches(prev),
            // computed in u32: the subsequent index can exceed u16
            count_one && range.first as u32 == prev.first as u32 + prev.count as u32,
        ),
        None => (first_zero && count_one, range.first == 1 && count_one),
    };

    PackingOptions {
        zero_or_prev,
        one_or_subsequent,
        all: first_zero && range.count >= count_io,
        single_byte: range.first as u64 <= UNSIGNED_BYTE_MAX && count_one,
        single_two_bytes: count_one,
        one_one_bytes: range.first as u64 <= UNSIGNED_BYTE_MAX
            && range.count as u64 <= UNSIGNED_BYTE_MAX,
        two_one_bytes: range.count as u64 <= UNSIGNED_BYTE_MAX,
        two_two_bytes: true,
    }
}

/// Reconstruct whatever part of a range is implied by its representation
/// alone; explicit first/count bytes are filled in afterwards.
fn range_from_packing(
    packing: RangePacking,
    previous: Option<&InOutRange>,
    count_io: u16,
) -> DecodeResult<InOutRange> {
    let range = match packing {
        RangePacking::ZeroOrPrev => match previous {
            Some(prev) => *prev,
            None => InOutRange::new(0, 1),
        },
        RangePacking::OneOrSubsequent => {
            let first = match previous {
                Some(prev) => {
                    let next = prev.first as u32 + prev.count as u32;
                    u16::try_from(next).map_err(|_| DecodeError::OutOfRange {
                        field: "subsequent input/output index",
                    })?
                }
                None => 1,
            };
            InOutRange::new(first, 1)
        }
        RangePacking::All => InOutRange::new(0, count_io),
        RangePacking::SingleByte | RangePacking::SingleTwoBytes => InOutRange::new(0, 1),
        _ => InOutRange::default(),
    };

    Ok(range)
}

/// Most compact representation the options allow. `TwoTwoBytes` is always
/// allowed so this is total.
fn encode_packing_extend(options: PackingOptions) -> u8 {
    for &(packing, tag) in RANGE_PACKING_MAP {
        if options.allows(packing) {
            return tag;
        }
    }
    unreachable!("TwoTwoBytes accepts every range")
}

fn decode_packing_extend(tag: u8) -> DecodeResult<RangePacking> {
    RANGE_PACKING_MAP
        .iter()
        .find(|&&(_, map_tag)| map_tag == tag)
        .map(|&(packing, _)| packing)
        .ok_or(DecodeError::BadPacking { value: tag })
}

/// Byte widths of every wire field, derived from the packing byte(s).
#[derive(Debug, Clone, Copy, Default)]
struct ByteCounts {
    block_num: usize,
    tx_offset: usize,
    txid_prefix: usize,
    first_input: usize,
    count_inputs: usize,
    first_output: usize,
    count_outputs: usize,
    quantity: usize,
}

fn extend_byte_counts(tag: u8) -> (usize, usize) {
    match tag & PACKING_EXTEND_MASK {
        0x02 => (1, 0), // single index in 1 byte
        0x03 => (2, 0), // single index in 2 bytes
        0x04 => (1, 1),
        0x05 => (2, 1),
        0x06 => (2, 2),
        _ => (0, 0),
    }
}

fn packing_to_byte_counts(packing: u8, packing_extend: u8) -> ByteCounts {
    let mut counts = ByteCounts::default();

    match packing & PACKING_GENESIS_MASK {
        PACKING_GENESIS_3_3_BYTES => {
            counts.block_num = 3;
            counts.tx_offset = 3;
            counts.txid_prefix = ASSETREF_TXID_PREFIX_LEN;
        }
        PACKING_GENESIS_3_4_BYTES => {
            counts.block_num = 3;
            counts.tx_offset = 4;
            counts.txid_prefix = ASSETREF_TXID_PREFIX_LEN;
        }
        PACKING_GENESIS_4_4_BYTES => {
            counts.block_num = 4;
            counts.tx_offset = 4;
            counts.txid_prefix = ASSETREF_TXID_PREFIX_LEN;
        }
        _ => {}
    }

    if packing & PACKING_INDICES_MASK == PACKING_INDICES_EXTEND {
        let (first, count) = extend_byte_counts(packing_extend >> PACKING_EXTEND_INPUTS_SHIFT);
        counts.first_input = first;
        counts.count_inputs = count;

        let (first, count) = extend_byte_counts(packing_extend >> PACKING_EXTEND_OUTPUTS_SHIFT);
        counts.first_output = first;
        counts.count_outputs = count;
    }

    counts.quantity = match packing & PACKING_QUANTITY_MASK {
        PACKING_QUANTITY_1_BYTE => 1,
        PACKING_QUANTITY_2_BYTES => 2,
        PACKING_QUANTITY_3_BYTES => 3,
        PACKING_QUANTITY_4_BYTES => 4,
        PACKING_QUANTITY_6_BYTES => 6,
        PACKING_QUANTITY_FLOAT => QTY_FLOAT_LENGTH,
        _ => 0,
    };

    counts
}

/// One asset movement within a transfer list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub asset_ref: AssetRef,
    pub inputs: InOutRange,
    pub outputs: InOutRange,
    /// Units delivered to each output in the range
    pub qty_per_output: u64,
}

impl Transfer {
    pub fn validate(&self) -> EncodeResult<()> {
        if self.qty_per_output > ASSET_QTY_MAX {
            return Err(EncodeError::Invalid {
                field: "qty_per_output",
                reason: "exceeds maximum asset quantity",
            });
        }
        Ok(())
    }

    /// Compare two transfers. For default routes only the inputs and the
    /// first output are significant.
    pub fn matches(&self, other: &Transfer) -> bool {
        if self.asset_ref.is_default_route() {
            other.asset_ref.is_default_route()
                && self.inputs.matches(&other.inputs)
                && self.outputs.first == other.outputs.first
        } else {
            self.asset_ref == other.asset_ref
                && self.inputs.matches(&other.inputs)
                && self.outputs.matches(&other.outputs)
                && self.qty_per_output == other.qty_per_output
        }
    }

    /// Serialise this transfer, delta-compressed against `previous`, into at
    /// most `metadata_max_len` bytes.
    pub fn encode(
        &self,
        previous: Option<&Transfer>,
        metadata_max_len: usize,
        count_inputs: u16,
        count_outputs: u16,
    ) -> EncodeResult<Vec<u8>> {
        self.validate()?;

        let mut packing = 0u8;
        let mut packing_extend = 0u8;

        // asset reference representation
        match self.asset_ref {
            AssetRef::DefaultRoute => {
                if previous.is_some_and(|prev| !prev.asset_ref.is_default_route()) {
                    return Err(EncodeError::Invalid {
                        field: "asset_ref",
                        reason: "default route transfers must come before explicit ones",
                    });
                }
                packing |= PACKING_GENESIS_PREV;
            }
            AssetRef::Genesis {
                block_num,
                tx_offset,
                ..
            } => {
                if previous.is_some_and(|prev| prev.asset_ref == self.asset_ref) {
                    packing |= PACKING_GENESIS_PREV;
                } else if block_num as u64 <= UNSIGNED_3_BYTES_MAX {
                    if tx_offset as u64 <= UNSIGNED_3_BYTES_MAX {
                        packing |= PACKING_GENESIS_3_3_BYTES;
                    } else {
                        packing |= PACKING_GENESIS_3_4_BYTES;
                    }
                } else {
                    packing |= PACKING_GENESIS_4_4_BYTES;
                }
            }
        }

        // input and output index representation
        let input_options =
            range_packing_options(previous.map(|prev| &prev.inputs), &self.inputs, count_inputs);
        let output_options = range_packing_options(
            previous.map(|prev| &prev.outputs),
            &self.outputs,
            count_outputs,
        );

        packing |= match (
            input_options.zero_or_prev,
            input_options.one_or_subsequent,
            input_options.all,
            output_options.zero_or_prev,
            output_options.one_or_subsequent,
            output_options.all,
        ) {
            (true, _, _, true, _, _) => PACKING_INDICES_0P_0P,
            (true, _, _, _, true, _) => PACKING_INDICES_0P_1S,
            (true, _, _, _, _, true) => PACKING_INDICES_0P_ALL,
            (_, true, _, true, _, _) => PACKING_INDICES_1S_0P,
            (_, _, true, true, _, _) => PACKING_INDICES_ALL_0P,
            (_, _, true, _, true, _) => PACKING_INDICES_ALL_1S,
            (_, _, true, _, _, true) => PACKING_INDICES_ALL_ALL,
            _ => {
                packing_extend = (encode_packing_extend(input_options)
                    << PACKING_EXTEND_INPUTS_SHIFT)
                    | (encode_packing_extend(output_options) << PACKING_EXTEND_OUTPUTS_SHIFT);
                PACKING_INDICES_EXTEND
            }
        };

        // quantity representation
        let mut encode_quantity = self.qty_per_output;
        let previous_qty = previous.map_or(1, |prev| prev.qty_per_output);

        packing |= if self.qty_per_output == previous_qty {
            PACKING_QUANTITY_1P
        } else if self.qty_per_output >= ASSET_QTY_MAX {
            PACKING_QUANTITY_MAX
        } else if self.qty_per_output <= UNSIGNED_BYTE_MAX {
            PACKING_QUANTITY_1_BYTE
        } else if self.qty_per_output <= UNSIGNED_2_BYTES_MAX {
            PACKING_QUANTITY_2_BYTES
        } else {
            let float = qty_to_mantissa_exponent(
                self.qty_per_output,
                Rounding::Down,
                QTY_FLOAT_MANTISSA_MAX,
                QTY_FLOAT_EXPONENT_MAX,
            );
            if float.qty == self.qty_per_output {
                encode_quantity = (float.exponent as u64 * QTY_FLOAT_EXPONENT_MULTIPLE
                    + float.mantissa)
                    & QTY_FLOAT_MASK;
                PACKING_QUANTITY_FLOAT
            } else if self.qty_per_output <= UNSIGNED_3_BYTES_MAX {
                PACKING_QUANTITY_3_BYTES
            } else if self.qty_per_output <= (1u64 << 32) - 1 {
                PACKING_QUANTITY_4_BYTES
            } else {
                PACKING_QUANTITY_6_BYTES
            }
        };

        // write out the fields the packing calls for
        let counts = packing_to_byte_counts(packing, packing_extend);

        let mut metadata = Vec::new();
        metadata.push(packing);
        if packing & PACKING_INDICES_MASK == PACKING_INDICES_EXTEND {
            metadata.push(packing_extend);
        }

        let (block_num, tx_offset, txid_prefix) = match self.asset_ref {
            AssetRef::Genesis {
                block_num,
                tx_offset,
                txid_prefix,
            } => (block_num as u64, tx_offset as u64, txid_prefix),
            AssetRef::DefaultRoute => (0, 0, [0u8; ASSETREF_TXID_PREFIX_LEN]),
        };

        write_field(&mut metadata, block_num, counts.block_num)?;
        write_field(&mut metadata, tx_offset, counts.tx_offset)?;
        metadata.extend_from_slice(&txid_prefix[..counts.txid_prefix]);
        write_field(&mut metadata, self.inputs.first as u64, counts.first_input)?;
        write_field(&mut metadata, self.inputs.count as u64, counts.count_inputs)?;
        write_field(&mut metadata, self.outputs.first as u64, counts.first_output)?;
        write_field(&mut metadata, self.outputs.count as u64, counts.count_outputs)?;
        write_field(&mut metadata, encode_quantity, counts.quantity)?;

        if metadata.len() > metadata_max_len {
            return Err(EncodeError::Capacity {
                needed: metadata.len(),
                max_len: metadata_max_len,
            });
        }

        Ok(metadata)
    }

    /// Parse one transfer from the front of `metadata`, delta-decompressing
    /// against `previous`. Returns the transfer and the bytes consumed.
    pub fn decode(
        metadata: &[u8],
        previous: Option<&Transfer>,
        count_inputs: u16,
        count_outputs: u16,
    ) -> DecodeResult<(Transfer, usize)> {
        let packing = *metadata.first().ok_or(DecodeError::Truncated {
            wanted: 1,
            available: 0,
        })?;
        let mut position = 1;
        let mut packing_extend = 0u8;

        // asset reference: either carried in following bytes, repeated from
        // the previous transfer, or (with no previous) the default route
        let mut asset_ref = if packing & PACKING_GENESIS_MASK == PACKING_GENESIS_PREV {
            match previous {
                Some(prev) => prev.asset_ref,
                None => AssetRef::DefaultRoute,
            }
        } else {
            AssetRef::Genesis {
                block_num: 0,
                tx_offset: 0,
                txid_prefix: [0; ASSETREF_TXID_PREFIX_LEN],
            }
        };

        // index range representations
        let (input_packing, output_packing) = if packing & PACKING_INDICES_MASK
            == PACKING_INDICES_EXTEND
        {
            packing_extend = *metadata.get(position).ok_or(DecodeError::Truncated {
                wanted: 1,
                available: 0,
            })?;
            position += 1;
            (
                decode_packing_extend((packing_extend >> PACKING_EXTEND_INPUTS_SHIFT) & PACKING_EXTEND_MASK)?,
                decode_packing_extend((packing_extend >> PACKING_EXTEND_OUTPUTS_SHIFT) & PACKING_EXTEND_MASK)?,
            )
        } else {
            match packing & PACKING_INDICES_MASK {
                PACKING_INDICES_0P_0P => (RangePacking::ZeroOrPrev, RangePacking::ZeroOrPrev),
                PACKING_INDICES_0P_1S => (RangePacking::ZeroOrPrev, RangePacking::OneOrSubsequent),
                PACKING_INDICES_0P_ALL => (RangePacking::ZeroOrPrev, RangePacking::All),
                PACKING_INDICES_1S_0P => (RangePacking::OneOrSubsequent, RangePacking::ZeroOrPrev),
                PACKING_INDICES_ALL_0P => (RangePacking::All, RangePacking::ZeroOrPrev),
                PACKING_INDICES_ALL_1S => (RangePacking::All, RangePacking::OneOrSubsequent),
                _ => (RangePacking::All, RangePacking::All),
            }
        };

        let mut inputs =
            range_from_packing(input_packing, previous.map(|prev| &prev.inputs), count_inputs)?;
        let mut outputs = range_from_packing(
            output_packing,
            previous.map(|prev| &prev.outputs),
            count_outputs,
        )?;

        // read the explicit fields the packing calls for
        let counts = packing_to_byte_counts(packing, packing_extend);

        let block_num = read_field(metadata, &mut position, counts.block_num)?;
        let tx_offset = read_field(metadata, &mut position, counts.tx_offset)?;

        let mut txid_prefix_bytes = [0u8; ASSETREF_TXID_PREFIX_LEN];
        if counts.txid_prefix > 0 {
            let available = metadata.len().saturating_sub(position);
            if available < counts.txid_prefix {
                return Err(DecodeError::Truncated {
                    wanted: counts.txid_prefix,
                    available,
                });
            }
            txid_prefix_bytes.copy_from_slice(&metadata[position..position + counts.txid_prefix]);
            position += counts.txid_prefix;
        }

        if let AssetRef::Genesis {
            block_num: ref_block,
            tx_offset: ref_offset,
            txid_prefix,
        } = &mut asset_ref
        {
            if let Some(value) = block_num {
                *ref_block = value as u32;
            }
            if let Some(value) = tx_offset {
                *ref_offset = value as u32;
            }
            if counts.txid_prefix > 0 {
                *txid_prefix = txid_prefix_bytes;
            }
        }

        if let Some(value) = read_field(metadata, &mut position, counts.first_input)? {
            inputs.first = value as u16;
        }
        if let Some(value) = read_field(metadata, &mut position, counts.count_inputs)? {
            inputs.count = value as u16;
        }
        if let Some(value) = read_field(metadata, &mut position, counts.first_output)? {
            outputs.first = value as u16;
        }
        if let Some(value) = read_field(metadata, &mut position, counts.count_outputs)? {
            outputs.count = value as u16;
        }
        let raw_quantity = read_field(metadata, &mut position, counts.quantity)?;

        // quantity finishes decoding from the packing bits
        let qty_per_output = match packing & PACKING_QUANTITY_MASK {
            PACKING_QUANTITY_1P => previous.map_or(1, |prev| prev.qty_per_output),
            PACKING_QUANTITY_MAX => ASSET_QTY_MAX,
            PACKING_QUANTITY_FLOAT => {
                let raw = raw_quantity.unwrap_or(0) & QTY_FLOAT_MASK;
                mantissa_exponent_to_qty(
                    raw % QTY_FLOAT_EXPONENT_MULTIPLE,
                    (raw / QTY_FLOAT_EXPONENT_MULTIPLE) as u32,
                )
            }
            _ => raw_quantity.unwrap_or(0),
        };

        let transfer = Transfer {
            asset_ref,
            inputs,
            outputs,
            qty_per_output,
        };
        transfer.validate().map_err(EncodeError::into_decode)?;

        Ok((transfer, position))
    }
}

fn write_field(metadata: &mut Vec<u8>, value: u64, width: usize) -> EncodeResult<()> {
    if width > 0 {
        metadata.extend_from_slice(&write_unsigned(value, width)?);
    }
    Ok(())
}

fn read_field(metadata: &[u8], position: &mut usize, width: usize) -> DecodeResult<Option<u64>> {
    if width == 0 {
        return Ok(None);
    }
    let available = metadata.len().saturating_sub(*position);
    if available < width {
        return Err(DecodeError::Truncated {
            wanted: width,
            available,
        });
    }
    let value = read_unsigned(&metadata[*position..], width)?;
    *position += width;
    Ok(Some(value))
}
