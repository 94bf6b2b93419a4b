//! Metadata container chaining
//!
//! A metadata blob opens with the 3-byte `SPK` identifier and then carries
//! one or more segments. Every segment but the last is introduced by a
//! length byte (at most 96) covering the segment body including its type
//! character; the final segment is introduced directly by its ASCII type
//! character, which is always greater than 96 so the two header forms never
//! collide.

use tracing::debug;

use crate::constants::{LENGTH_PREFIX_MAX, METADATA_IDENTIFIER, METADATA_IDENTIFIER_LEN};
use crate::errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Find the segment of `metadata` whose type character is `desired`, or the
/// final segment when `desired` is `None`. Returns the segment payload
/// (excluding the type character).
pub fn locate_metadata_range(metadata: &[u8], desired: Option<u8>) -> DecodeResult<&[u8]> {
    if metadata.len() < METADATA_IDENTIFIER_LEN + 1 {
        return Err(DecodeError::Truncated {
            wanted: METADATA_IDENTIFIER_LEN + 1,
            available: metadata.len(),
        });
    }

    if &metadata[..METADATA_IDENTIFIER_LEN] != METADATA_IDENTIFIER {
        return Err(DecodeError::BadIdentifier);
    }

    let mut position = METADATA_IDENTIFIER_LEN;

    while position < metadata.len() {
        let found = metadata[position];

        if found > LENGTH_PREFIX_MAX {
            // final segment, introduced by its type character
            let matched = match desired {
                Some(want) => found == want,
                None => true,
            };
            if matched {
                return Ok(&metadata[position + 1..]);
            }
            return Err(DecodeError::SegmentNotFound(desired.unwrap_or(0)));
        }

        // chained segment, introduced by a length byte
        let segment_len = found as usize;
        if position + 1 + segment_len > metadata.len() {
            return Err(DecodeError::MalformedChain("segment length overruns metadata"));
        }
        if segment_len == 0 {
            return Err(DecodeError::MalformedChain("empty chained segment"));
        }

        if desired == Some(metadata[position + 1]) {
            return Ok(&metadata[position + 2..position + 1 + segment_len]);
        }

        position += 1 + segment_len;
    }

    Err(DecodeError::MalformedChain("metadata ends without final segment"))
}

/// Append the metadata blob `append` onto `metadata`, converting the latter's
/// final segment into a chained one. Fails if the result would exceed
/// `max_len` bytes or the converted segment would need a length byte above
/// the chaining limit.
pub fn metadata_append(metadata: &[u8], max_len: usize, append: &[u8]) -> EncodeResult<Vec<u8>> {
    let last_payload = locate_metadata_range(metadata, None).map_err(|_| EncodeError::Invalid {
        field: "metadata",
        reason: "no final segment to convert",
    })?;

    if append.len() < METADATA_IDENTIFIER_LEN + 1
        || &append[..METADATA_IDENTIFIER_LEN] != METADATA_IDENTIFIER
    {
        return Err(EncodeError::Invalid {
            field: "append",
            reason: "not a metadata blob",
        });
    }

    // identifier of `append` is dropped, one length byte is inserted
    let needed = metadata.len() + 1 + append.len() - METADATA_IDENTIFIER_LEN;
    if needed > max_len {
        return Err(EncodeError::Capacity {
            needed,
            max_len,
        });
    }

    // length byte covers the type character plus the payload
    let last_len = last_payload.len() + 1;
    if last_len > LENGTH_PREFIX_MAX as usize {
        return Err(EncodeError::Invalid {
            field: "metadata",
            reason: "final segment too long to chain",
        });
    }

    let last_pos = metadata.len() - last_len;
    let mut combined = Vec::with_capacity(needed);
    combined.extend_from_slice(&metadata[..last_pos]);
    combined.push(last_len as u8);
    combined.extend_from_slice(&metadata[last_pos..]);
    combined.extend_from_slice(&append[METADATA_IDENTIFIER_LEN..]);

    debug!(
        combined_len = combined.len(),
        "appended metadata segment"
    );

    Ok(combined)
}

/// Largest blob that [`metadata_append`] could still fit after `metadata`,
/// given an overall limit of `max_len` bytes.
pub fn metadata_max_append_len(metadata: &[u8], max_len: usize) -> usize {
    (max_len as isize - (metadata.len() as isize + 1 - METADATA_IDENTIFIER_LEN as isize)).max(0)
        as usize
}
