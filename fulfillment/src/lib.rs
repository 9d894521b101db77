//! Verification and fulfillment engine for signed exchange orders.
//!
//! An offerer signs the canonical digest of an order (see the `model`
//! crate); this crate verifies submitted orders against that digest and the
//! offerer's current nonce, and executes the asset swap atomically against
//! a ledger.

pub mod engine;
pub mod ledger;
pub mod nonces;

pub use engine::{FulfillmentEngine, FulfillmentError, FulfillmentRecord, ValidatedFulfillment};
pub use ledger::{Ledger, TransferError};
pub use nonces::Nonces;
