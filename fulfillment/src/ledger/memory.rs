//! In-memory ledger backend for tests and local runs.

use super::{Ledger, TransferError};
use model::asset::{Asset, AssetKind};
use primitive_types::{H160, U256};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    native: HashMap<H160, U256>,
    /// Keyed by (token, owner).
    fungible: HashMap<(H160, H160), U256>,
    /// Keyed by (token, identifier).
    unique: HashMap<(H160, U256), H160>,
    /// Keyed by (token, identifier, owner).
    semi_fungible: HashMap<(H160, U256, H160), U256>,
}

impl MemoryLedger {
    pub fn mint_native(&mut self, owner: H160, amount: U256) {
        *self.native.entry(owner).or_default() += amount;
    }

    pub fn mint_fungible(&mut self, token: H160, owner: H160, amount: U256) {
        *self.fungible.entry((token, owner)).or_default() += amount;
    }

    pub fn mint_unique(&mut self, token: H160, identifier: U256, owner: H160) {
        self.unique.insert((token, identifier), owner);
    }

    pub fn mint_semi_fungible(
        &mut self,
        token: H160,
        identifier: U256,
        owner: H160,
        amount: U256,
    ) {
        *self.semi_fungible.entry((token, identifier, owner)).or_default() += amount;
    }
}

/// Moves `amount` between two balance slots of the same map. Debits before
/// crediting so a failed debit leaves the map untouched.
fn move_balance<K: Copy + Eq + Hash>(
    balances: &mut HashMap<K, U256>,
    from_key: K,
    to_key: K,
    owner: H160,
    amount: U256,
) -> Result<(), TransferError> {
    let held = balances.get(&from_key).copied().unwrap_or_default();
    let remaining = held
        .checked_sub(amount)
        .ok_or(TransferError::InsufficientBalance {
            owner,
            held,
            needed: amount,
        })?;
    if remaining.is_zero() {
        balances.remove(&from_key);
    } else {
        balances.insert(from_key, remaining);
    }
    *balances.entry(to_key).or_default() += amount;
    Ok(())
}

impl Ledger for MemoryLedger {
    fn transfer(&mut self, asset: &Asset, from: H160, to: H160) -> Result<(), TransferError> {
        match asset.kind {
            AssetKind::Native => move_balance(&mut self.native, from, to, from, asset.amount),
            AssetKind::Fungible => move_balance(
                &mut self.fungible,
                (asset.token, from),
                (asset.token, to),
                from,
                asset.amount,
            ),
            AssetKind::NonFungibleUnique => {
                let key = (asset.token, asset.identifier);
                match self.unique.get(&key) {
                    Some(owner) if *owner == from => {
                        self.unique.insert(key, to);
                        Ok(())
                    }
                    _ => Err(TransferError::NotOwner {
                        token: asset.token,
                        identifier: asset.identifier,
                        from,
                    }),
                }
            }
            AssetKind::NonFungibleSemiFungible => move_balance(
                &mut self.semi_fungible,
                (asset.token, asset.identifier, from),
                (asset.token, asset.identifier, to),
                from,
                asset.amount,
            ),
        }
    }

    fn balance_of(&self, asset: &Asset, owner: H160) -> U256 {
        match asset.kind {
            AssetKind::Native => self.native.get(&owner).copied().unwrap_or_default(),
            AssetKind::Fungible => self
                .fungible
                .get(&(asset.token, owner))
                .copied()
                .unwrap_or_default(),
            AssetKind::NonFungibleUnique => {
                match self.unique.get(&(asset.token, asset.identifier)) {
                    Some(current) if *current == owner => U256::one(),
                    _ => U256::zero(),
                }
            }
            AssetKind::NonFungibleSemiFungible => self
                .semi_fungible
                .get(&(asset.token, asset.identifier, owner))
                .copied()
                .unwrap_or_default(),
        }
    }

    fn owner_of(&self, token: H160, identifier: U256) -> Option<H160> {
        self.unique.get(&(token, identifier)).copied()
    }
}
