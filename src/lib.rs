//! Encoder, decoder and balance engine for CoinSpark asset metadata.
//!
//! CoinSpark embeds asset activity in bitcoin transactions as compact binary
//! metadata: a genesis record issues an asset, transfer lists move units
//! between transaction inputs and outputs, and payment references link
//! transactions back to payment requests. This crate implements the wire
//! format (including the segment chaining that lets several records share
//! one metadata blob) and the deterministic rules for turning per-input
//! asset balances into per-output balances.
//!
//! ```
//! use coinspark_codec::PaymentRef;
//!
//! let payment_ref = PaymentRef::new(4801);
//! let metadata = payment_ref.encode(40).unwrap();
//! assert_eq!(PaymentRef::decode(&metadata).unwrap(), payment_ref);
//! ```

pub mod asset_ref;
pub mod constants;
pub mod domain;
pub mod errors;
pub mod genesis;
pub mod metadata;
pub mod payment_ref;
pub mod quantity;
pub mod transfer;
pub mod transfer_list;
pub mod utils;

pub use asset_ref::AssetRef;
pub use errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use genesis::Genesis;
pub use metadata::{locate_metadata_range, metadata_append, metadata_max_append_len};
pub use payment_ref::PaymentRef;
pub use quantity::Rounding;
pub use transfer::{InOutRange, Transfer};
pub use transfer_list::TransferList;
