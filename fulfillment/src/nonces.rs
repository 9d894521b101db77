//! Per-offerer nonce bookkeeping.
//!
//! Nonce-based invalidation is the single anti-replay mechanism of the
//! protocol: the nonce is part of the signed order components, so one
//! increment invalidates every outstanding order signed against the old
//! value. There is no per-order cancellation flag.

use primitive_types::{H160, U256};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Nonces(HashMap<H160, U256>);

impl Nonces {
    /// The nonce new orders of this offerer must be signed against.
    /// Starts at zero.
    pub fn current(&self, offerer: H160) -> U256 {
        self.0.get(&offerer).copied().unwrap_or_default()
    }

    /// Advances the offerer's nonce by one and returns the new value.
    /// Nonces are never decremented.
    pub fn increment(&mut self, offerer: H160) -> U256 {
        let nonce = self.0.entry(offerer).or_default();
        *nonce += U256::one();
        *nonce
    }
}
