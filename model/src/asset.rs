//! Typed descriptors for the assets an order moves. Pure data; transfer
//! logic lives behind the ledger trait of the fulfillment crate.

use crate::{h160_hexadecimal, u256_decimal};
use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The transfer semantics of an asset.
///
/// The discriminants are part of the canonical order encoding and must
/// never be reordered.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum AssetKind {
    /// The chain's native currency. No token contract is involved.
    Native = 0,
    /// A fungible token balance identified by its contract address.
    Fungible = 1,
    /// A unique token; `identifier` selects the token, the amount is always 1.
    NonFungibleUnique = 2,
    /// A semi-fungible token; `identifier` selects the class, `amount` the
    /// balance moved within it.
    NonFungibleSemiFungible = 3,
}

impl Default for AssetKind {
    fn default() -> Self {
        Self::Native
    }
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum InvalidAsset {
    #[error("native asset must use the zero token address")]
    NativeWithTokenAddress,
    #[error("unique token amount must be exactly 1, got {0}")]
    UniqueAmount(U256),
}

/// One entry of an order's offer side.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub kind: AssetKind,
    /// Token contract. The zero address for native assets.
    #[serde(with = "h160_hexadecimal")]
    pub token: H160,
    /// Token id within the contract. Ignored for native and fungible assets.
    #[serde(with = "u256_decimal")]
    pub identifier: U256,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
}

impl Asset {
    pub fn native(amount: U256) -> Self {
        Self {
            kind: AssetKind::Native,
            token: H160::zero(),
            identifier: U256::zero(),
            amount,
        }
    }

    pub fn fungible(token: H160, amount: U256) -> Self {
        Self {
            kind: AssetKind::Fungible,
            token,
            identifier: U256::zero(),
            amount,
        }
    }

    pub fn unique(token: H160, identifier: U256) -> Self {
        Self {
            kind: AssetKind::NonFungibleUnique,
            token,
            identifier,
            amount: U256::one(),
        }
    }

    pub fn semi_fungible(token: H160, identifier: U256, amount: U256) -> Self {
        Self {
            kind: AssetKind::NonFungibleSemiFungible,
            token,
            identifier,
            amount,
        }
    }

    /// Enforces the structural invariants of the asset descriptor.
    pub fn validate(&self) -> Result<(), InvalidAsset> {
        match self.kind {
            AssetKind::Native if !self.token.is_zero() => {
                Err(InvalidAsset::NativeWithTokenAddress)
            }
            AssetKind::NonFungibleUnique if self.amount != U256::one() => {
                Err(InvalidAsset::UniqueAmount(self.amount))
            }
            _ => Ok(()),
        }
    }
}

/// One entry of an order's consideration side: an asset plus the party that
/// must receive it. The recipient may differ from the order's counterparty
/// to support fee splits.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ConsiderationAsset {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(with = "h160_hexadecimal")]
    pub recipient: H160,
}

impl ConsiderationAsset {
    pub fn validate(&self) -> Result<(), InvalidAsset> {
        self.asset.validate()
    }
}
