//! Data model of the exchange protocol: assets, orders, their canonical
//! EIP-712 encoding and the signatures over it.
//!
//! This is in its own crate because the fulfillment engine and any future
//! order-submission service share these types.

pub mod asset;
pub mod h160_hexadecimal;
pub mod order;
pub mod signature;
pub mod u256_decimal;

pub use asset::{Asset, AssetKind, ConsiderationAsset, InvalidAsset};
pub use order::{Order, OrderBuilder, OrderComponents, OrderHash, OrderParameters, OrderType};
pub use signature::{hashed_eip712_message, EcdsaSignature};

use ethabi::Token;
use hex::{FromHex, FromHexError};
use lazy_static::lazy_static;
use primitive_types::{H160, U256};
use std::fmt;
use web3::signing;

/// The identity of one deployment of the protocol, mixed into every signing
/// digest so that signatures cannot be replayed against another chain or
/// another contract.
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainSeparator(pub [u8; 32]);

impl DomainSeparator {
    pub fn new(chain_id: u64, verifying_contract: H160) -> Self {
        lazy_static! {
            /// The EIP-712 domain name used for computing the domain separator.
            static ref DOMAIN_NAME: [u8; 32] = signing::keccak256(b"Barter Protocol");

            /// The EIP-712 domain version used for computing the domain separator.
            static ref DOMAIN_VERSION: [u8; 32] = signing::keccak256(b"v1");

            /// The EIP-712 domain type used for computing the domain separator.
            static ref DOMAIN_TYPE_HASH: [u8; 32] = signing::keccak256(
                b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
            );
        }
        let abi_encoded = ethabi::encode(&[
            Token::Uint(U256::from_big_endian(&*DOMAIN_TYPE_HASH)),
            Token::Uint(U256::from_big_endian(&*DOMAIN_NAME)),
            Token::Uint(U256::from_big_endian(&*DOMAIN_VERSION)),
            Token::Uint(chain_id.into()),
            Token::Address(verifying_contract),
        ]);
        DomainSeparator(signing::keccak256(abi_encoded.as_slice()))
    }
}

impl std::str::FromStr for DomainSeparator {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(FromHex::from_hex(s)?))
    }
}

impl fmt::Debug for DomainSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = [0u8; 64];
        // Unwrap because we know the length is correct.
        hex::encode_to_slice(self.0, &mut hex).unwrap();
        // Unwrap because we know it is valid utf8.
        f.write_str(std::str::from_utf8(&hex).unwrap())
    }
}
