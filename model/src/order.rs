//! Order types and their canonical, versioned EIP-712 encoding.
//!
//! Every structural type has a fixed type descriptor whose keccak256 hash
//! prefixes its encoding, so structurally different messages can never
//! collide. Array fields embed the hash of the concatenated element hashes,
//! which keeps the top-level encoding fixed-size while preserving element
//! order in the preimage.

use crate::{
    asset::{Asset, ConsiderationAsset},
    h160_hexadecimal,
    signature::{hashed_eip712_message, EcdsaSignature},
    u256_decimal, DomainSeparator,
};
use lazy_static::lazy_static;
use primitive_types::{H160, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{self, Display},
    str::FromStr,
};
use web3::signing::{self, Key, SecretKeyRef};

/// Protocol v1 type descriptors. Enum fields are typed `uint8`; the value
/// still occupies a full 32 byte slot in the encoded data. Changing any of
/// these strings changes every digest of the protocol.
const OFFER_ASSET_TYPE: &[u8] =
    b"OfferAsset(uint8 kind,address token,uint256 identifier,uint256 amount)";
const CONSIDERATION_ASSET_TYPE: &[u8] =
    b"ConsiderationAsset(uint8 kind,address token,uint256 identifier,uint256 amount,address recipient)";
// Referenced struct types are appended in alphabetical order.
const ORDER_COMPONENTS_TYPE: &[u8] =
    b"OrderComponents(address offerer,address facilitator,OfferAsset[] offer,ConsiderationAsset[] consideration,uint8 orderType,uint256 startTime,uint256 endTime,uint256 salt,uint256 nonce)ConsiderationAsset(uint8 kind,address token,uint256 identifier,uint256 amount,address recipient)OfferAsset(uint8 kind,address token,uint256 identifier,uint256 amount)";

lazy_static! {
    static ref OFFER_ASSET_TYPE_HASH: [u8; 32] = signing::keccak256(OFFER_ASSET_TYPE);
    static ref CONSIDERATION_ASSET_TYPE_HASH: [u8; 32] =
        signing::keccak256(CONSIDERATION_ASSET_TYPE);
    static ref ORDER_COMPONENTS_TYPE_HASH: [u8; 32] = signing::keccak256(ORDER_COMPONENTS_TYPE);
}

/// How an order may be consumed.
///
/// Only `FullOpen` is executable today; the remaining variants are reserved
/// extension points. The discriminants are part of the canonical encoding.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum OrderType {
    /// Anyone may fulfill the order, only in full.
    FullOpen = 0,
    /// Reserved: partial fills.
    PartialOpen = 1,
    /// Reserved: fulfillment restricted to the facilitator.
    FullRestricted = 2,
    /// Reserved: partial fills restricted to the facilitator.
    PartialRestricted = 3,
}

impl Default for OrderType {
    fn default() -> Self {
        Self::FullOpen
    }
}

/// The immutable content of an order as authored by the offerer. Never
/// mutated after signing; the ordering of `offer` and `consideration` is
/// part of the hash preimage and must be preserved exactly as authored.
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OrderParameters {
    #[serde(with = "h160_hexadecimal")]
    pub offerer: H160,
    /// Optional intermediary. The zero address if none.
    #[serde(with = "h160_hexadecimal")]
    pub facilitator: H160,
    pub offer: Vec<Asset>,
    pub consideration: Vec<ConsiderationAsset>,
    pub order_type: OrderType,
    /// First second at which the order may be fulfilled. Zero means
    /// immediately valid.
    #[serde(with = "u256_decimal")]
    pub start_time: U256,
    /// Exclusive upper bound; an order at exactly `end_time` is expired.
    #[serde(with = "u256_decimal")]
    pub end_time: U256,
    /// Disambiguates otherwise identical orders.
    #[serde(with = "u256_decimal")]
    pub salt: U256,
}

impl Default for OrderParameters {
    // Custom implementation to make sure the default order is valid.
    fn default() -> Self {
        Self {
            offerer: Default::default(),
            facilitator: Default::default(),
            offer: Default::default(),
            consideration: Default::default(),
            order_type: Default::default(),
            start_time: U256::zero(),
            end_time: U256::MAX,
            salt: U256::zero(),
        }
    }
}

/// Order parameters bound to the offerer's nonce current at signing time.
/// Ephemeral: rebuilt at verification time from the stored parameters and
/// the tracker's current nonce to recompute the digest the signer signed.
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OrderComponents {
    #[serde(flatten)]
    pub parameters: OrderParameters,
    #[serde(with = "u256_decimal")]
    pub nonce: U256,
}

// EIP-712
impl Asset {
    pub fn hash_struct(&self) -> [u8; 32] {
        let mut hash_data = [0u8; 160];
        hash_data[0..32].copy_from_slice(&*OFFER_ASSET_TYPE_HASH);
        // Some slots are only partially assigned (stay 0) because all values
        // are extended to 256 bits.
        hash_data[63] = self.kind as u8;
        hash_data[76..96].copy_from_slice(self.token.as_fixed_bytes());
        self.identifier.to_big_endian(&mut hash_data[96..128]);
        self.amount.to_big_endian(&mut hash_data[128..160]);
        signing::keccak256(&hash_data)
    }
}

// EIP-712
impl ConsiderationAsset {
    pub fn hash_struct(&self) -> [u8; 32] {
        let mut hash_data = [0u8; 192];
        hash_data[0..32].copy_from_slice(&*CONSIDERATION_ASSET_TYPE_HASH);
        hash_data[63] = self.asset.kind as u8;
        hash_data[76..96].copy_from_slice(self.asset.token.as_fixed_bytes());
        self.asset.identifier.to_big_endian(&mut hash_data[96..128]);
        self.asset.amount.to_big_endian(&mut hash_data[128..160]);
        hash_data[172..192].copy_from_slice(self.recipient.as_fixed_bytes());
        signing::keccak256(&hash_data)
    }
}

/// An empty sequence hashes to the digest of the empty byte string, which
/// is well defined, not an error.
fn hash_sequence(hashes: impl Iterator<Item = [u8; 32]>) -> [u8; 32] {
    let mut concatenated = Vec::new();
    for hash in hashes {
        concatenated.extend_from_slice(&hash);
    }
    signing::keccak256(&concatenated)
}

// EIP-712
impl OrderComponents {
    pub fn hash_struct(&self) -> [u8; 32] {
        let parameters = &self.parameters;
        let offer_hash = hash_sequence(parameters.offer.iter().map(Asset::hash_struct));
        let consideration_hash = hash_sequence(
            parameters
                .consideration
                .iter()
                .map(ConsiderationAsset::hash_struct),
        );
        let mut hash_data = [0u8; 320];
        hash_data[0..32].copy_from_slice(&*ORDER_COMPONENTS_TYPE_HASH);
        hash_data[44..64].copy_from_slice(parameters.offerer.as_fixed_bytes());
        hash_data[76..96].copy_from_slice(parameters.facilitator.as_fixed_bytes());
        hash_data[96..128].copy_from_slice(&offer_hash);
        hash_data[128..160].copy_from_slice(&consideration_hash);
        hash_data[191] = parameters.order_type as u8;
        parameters.start_time.to_big_endian(&mut hash_data[192..224]);
        parameters.end_time.to_big_endian(&mut hash_data[224..256]);
        parameters.salt.to_big_endian(&mut hash_data[256..288]);
        self.nonce.to_big_endian(&mut hash_data[288..320]);
        signing::keccak256(&hash_data)
    }

    pub fn order_hash(&self) -> OrderHash {
        OrderHash(self.hash_struct())
    }

    /// The digest the offerer actually signs, see
    /// [`crate::signature::hashed_eip712_message`].
    pub fn signing_digest(&self, domain_separator: &DomainSeparator) -> [u8; 32] {
        hashed_eip712_message(domain_separator, &self.hash_struct())
    }
}

/// The wire object submitted for fulfillment. The nonce is not carried
/// explicitly; it is reconstructed from the state tracker's current value
/// for the offerer at verification time.
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub parameters: OrderParameters,
    pub signature: EcdsaSignature,
}

impl Order {
    pub fn components(&self, nonce: U256) -> OrderComponents {
        OrderComponents {
            parameters: self.parameters.clone(),
            nonce,
        }
    }
}

/// The struct hash of an order's components, displayed as 0x-prefixed hex.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct OrderHash(pub [u8; 32]);

impl Default for OrderHash {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

impl FromStr for OrderHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<OrderHash, hex::FromHexError> {
        let mut value = [0u8; 32];
        let s_without_prefix = s.strip_prefix("0x").unwrap_or(s);
        hex::decode_to_slice(s_without_prefix, value.as_mut())?;
        Ok(OrderHash(value))
    }
}

impl Display for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 2 + 32 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Unwrap because the length is always correct.
        hex::encode_to_slice(self.0, &mut bytes[2..]).unwrap();
        // Unwrap because the string is always valid utf8.
        let str = std::str::from_utf8(&bytes).unwrap();
        f.write_str(str)
    }
}

impl fmt::Debug for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Serialize for OrderHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for OrderHash {
    fn deserialize<D>(deserializer: D) -> Result<OrderHash, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor {}
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = OrderHash;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an order hash as a 0x prefixed hex string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                OrderHash::from_str(s).map_err(|err| {
                    de::Error::custom(format!(
                        "failed to decode {:?} as hex order hash: {}",
                        s, err
                    ))
                })
            }
        }

        deserializer.deserialize_str(Visitor {})
    }
}

#[derive(Default)]
pub struct OrderBuilder(OrderParameters);

impl OrderBuilder {
    pub fn with_facilitator(mut self, facilitator: H160) -> Self {
        self.0.facilitator = facilitator;
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.0.order_type = order_type;
        self
    }

    pub fn with_start_time(mut self, start_time: U256) -> Self {
        self.0.start_time = start_time;
        self
    }

    pub fn with_end_time(mut self, end_time: U256) -> Self {
        self.0.end_time = end_time;
        self
    }

    pub fn with_salt(mut self, salt: U256) -> Self {
        self.0.salt = salt;
        self
    }

    /// Appends one asset to the offer side.
    pub fn offering(mut self, asset: Asset) -> Self {
        self.0.offer.push(asset);
        self
    }

    /// Appends one asset to the consideration side, to be received by
    /// `recipient`.
    pub fn considering(mut self, asset: Asset, recipient: H160) -> Self {
        self.0.consideration.push(ConsiderationAsset { asset, recipient });
        self
    }

    /// Sets the offerer from the key and signs the components against the
    /// given nonce.
    pub fn sign_with(
        mut self,
        domain_separator: &DomainSeparator,
        nonce: U256,
        key: SecretKeyRef,
    ) -> Order {
        self.0.offerer = Key::address(&key);
        let components = OrderComponents {
            parameters: self.0,
            nonce,
        };
        let signature =
            EcdsaSignature::sign(domain_separator, &components.hash_struct(), key);
        Order {
            parameters: components.parameters,
            signature,
        }
    }

    pub fn build(self) -> OrderParameters {
        self.0
    }
}
