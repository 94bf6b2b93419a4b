//! Payment references
//!
//! A payment reference is an opaque number a merchant attaches to a payment
//! request so the incoming transaction can be matched to it. References stay
//! below 2^52 so implementations holding them in doubles never lose
//! precision; the wire form is a minimal-width little-endian integer.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{METADATA_IDENTIFIER, PAYMENTREF_PREFIX, PAYMENT_REF_MAX};
use crate::errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::metadata::locate_metadata_range;
use crate::quantity::{read_unsigned, write_unsigned};

/// Longest wire encoding of a reference (52 bits needs at most 7 bytes)
const PAYMENT_REF_MAX_LEN: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRef {
    pub reference: u64,
}

impl PaymentRef {
    pub fn new(reference: u64) -> Self {
        PaymentRef { reference }
    }

    /// A uniformly random reference, suitable when the merchant has no
    /// numbering scheme of their own.
    pub fn random() -> Self {
        PaymentRef {
            reference: rand::rng().random_range(0..=PAYMENT_REF_MAX),
        }
    }

    pub fn validate(&self) -> EncodeResult<()> {
        if self.reference > PAYMENT_REF_MAX {
            return Err(EncodeError::Invalid {
                field: "reference",
                reason: "exceeds 52 bits",
            });
        }
        Ok(())
    }

    /// Serialise into a standalone metadata blob of at most
    /// `metadata_max_len` bytes, using as few bytes as the value needs.
    pub fn encode(&self, metadata_max_len: usize) -> EncodeResult<Vec<u8>> {
        self.validate()?;

        let mut bytes = 0;
        let mut left = self.reference;
        while left > 0 {
            left >>= 8;
            bytes += 1;
        }

        let needed = METADATA_IDENTIFIER.len() + 1 + bytes;
        if needed > metadata_max_len {
            return Err(EncodeError::Capacity {
                needed,
                max_len: metadata_max_len,
            });
        }

        let mut metadata = Vec::with_capacity(needed);
        metadata.extend_from_slice(METADATA_IDENTIFIER);
        metadata.push(PAYMENTREF_PREFIX);
        metadata.extend_from_slice(&write_unsigned(self.reference, bytes)?);

        Ok(metadata)
    }

    /// Parse a payment reference out of a metadata blob (locating its
    /// segment within any chain).
    pub fn decode(metadata: &[u8]) -> DecodeResult<PaymentRef> {
        let payload = locate_metadata_range(metadata, Some(PAYMENTREF_PREFIX))?;

        if payload.len() > PAYMENT_REF_MAX_LEN {
            return Err(DecodeError::OutOfRange {
                field: "payment reference",
            });
        }

        let payment_ref = PaymentRef {
            reference: read_unsigned(payload, payload.len())?,
        };
        payment_ref.validate().map_err(EncodeError::into_decode)?;

        Ok(payment_ref)
    }

    pub fn matches(&self, other: &PaymentRef) -> bool {
        self.reference == other.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_bytes() {
        let payment_ref = PaymentRef::new(4801);
        assert_eq!(hex::encode(payment_ref.encode(10).unwrap()), "53504b72c112");
    }

    #[test]
    fn test_zero_reference_encodes_without_value_bytes() {
        let payment_ref = PaymentRef::new(0);
        let encoded = payment_ref.encode(10).unwrap();
        assert_eq!(hex::encode(&encoded), "53504b72");
        assert_eq!(PaymentRef::decode(&encoded).unwrap(), payment_ref);
    }

    #[test]
    fn test_decode_round_trip_extremes() {
        for reference in [1u64, 255, 256, PAYMENT_REF_MAX] {
            let encoded = PaymentRef::new(reference).encode(12).unwrap();
            assert_eq!(PaymentRef::decode(&encoded).unwrap().reference, reference);
        }
    }

    #[test]
    fn test_validate_rejects_above_52_bits() {
        assert!(PaymentRef::new(PAYMENT_REF_MAX).validate().is_ok());
        assert!(PaymentRef::new(PAYMENT_REF_MAX + 1).validate().is_err());
    }

    #[test]
    fn test_decode_rejects_overlong_payload() {
        // 8 value bytes is more than any valid reference needs
        let metadata = hex::decode("53504b720101010101010101").unwrap();
        assert_eq!(
            PaymentRef::decode(&metadata),
            Err(DecodeError::OutOfRange {
                field: "payment reference"
            })
        );
    }

    #[test]
    fn test_random_is_in_range() {
        for _ in 0..50 {
            assert!(PaymentRef::random().validate().is_ok());
        }
    }

    #[test]
    fn test_capacity_check() {
        assert!(matches!(
            PaymentRef::new(4801).encode(5),
            Err(EncodeError::Capacity { .. })
        ));
    }
}
