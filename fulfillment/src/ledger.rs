//! The asset-transfer collaborator the engine executes against.

pub mod memory;

use model::asset::Asset;
use primitive_types::{H160, U256};
use thiserror::Error;

pub use memory::MemoryLedger;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum TransferError {
    #[error("{owner:?} holds {held} of the asset but the transfer needs {needed}")]
    InsufficientBalance {
        owner: H160,
        held: U256,
        needed: U256,
    },
    #[error("token {token:?} id {identifier} is not owned by {from:?}")]
    NotOwner {
        token: H160,
        identifier: U256,
        from: H160,
    },
}

/// Ledger of asset balances and ownership.
///
/// Contract the engine relies on: a `transfer` either fully succeeds or has
/// no effect, and a succeeded transfer can always be reversed by
/// transferring the same asset back. The engine's fulfillment atomicity is
/// built on both guarantees.
pub trait Ledger {
    fn transfer(&mut self, asset: &Asset, from: H160, to: H160) -> Result<(), TransferError>;

    /// The amount of the asset `owner` holds. For unique tokens this is 1
    /// or 0 depending on ownership.
    fn balance_of(&self, asset: &Asset, owner: H160) -> U256;

    fn owner_of(&self, token: H160, identifier: U256) -> Option<H160>;
}
