//! Order verification and execution.
//!
//! A fulfillment attempt moves through `Received -> Validated -> Executing
//! -> Completed`, or is rejected with a typed reason before any asset
//! moves. The states are expressed as types: the submitted `(order,
//! fulfiller, now)` inputs are Received, [`ValidatedFulfillment`] (only
//! produced by [`FulfillmentEngine::validate`]) is Validated, and
//! [`FulfillmentEngine::execute`] drives Executing into Completed,
//! returning the [`FulfillmentRecord`].

use crate::{
    ledger::{Ledger, TransferError},
    nonces::Nonces,
};
use model::{
    asset::{Asset, InvalidAsset},
    order::{Order, OrderComponents, OrderHash, OrderParameters, OrderType},
    signature::hashed_eip712_message,
    DomainSeparator,
};
use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Eq, PartialEq)]
pub enum FulfillmentError {
    #[error(transparent)]
    InvalidAsset(#[from] InvalidAsset),
    #[error("signature does not recover to the offerer")]
    InvalidSignature,
    #[error("order expired at {end_time}, now is {now}")]
    ExpiredOrder { end_time: U256, now: U256 },
    #[error("order starts at {start_time}, now is {now}")]
    NotYetStarted { start_time: U256, now: U256 },
    #[error("order type {0:?} is not supported")]
    UnsupportedOrderType(OrderType),
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),
    #[error("expected nonce {expected} but the offerer's current nonce is {current}")]
    NonceMismatch { expected: U256, current: U256 },
}

/// Emitted once per completed fulfillment.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRecord {
    pub order_hash: OrderHash,
    #[serde(with = "model::h160_hexadecimal")]
    pub offerer: H160,
    #[serde(with = "model::h160_hexadecimal")]
    pub fulfiller: H160,
}

#[derive(Clone, Copy, Debug)]
struct PlannedTransfer {
    asset: Asset,
    from: H160,
    to: H160,
}

/// A fulfillment attempt that has passed validation and may be executed.
/// Carries the nonce it was validated against so execution can detect the
/// state moving underneath it.
#[derive(Debug)]
pub struct ValidatedFulfillment {
    order_hash: OrderHash,
    offerer: H160,
    fulfiller: H160,
    nonce: U256,
    transfers: Vec<PlannedTransfer>,
}

impl ValidatedFulfillment {
    pub fn order_hash(&self) -> OrderHash {
        self.order_hash
    }
}

pub struct FulfillmentEngine<L> {
    domain_separator: DomainSeparator,
    nonces: Nonces,
    ledger: L,
}

impl<L> FulfillmentEngine<L> {
    pub fn new(domain_separator: DomainSeparator, ledger: L) -> Self {
        Self {
            domain_separator,
            nonces: Nonces::default(),
            ledger,
        }
    }

    pub fn domain_separator(&self) -> &DomainSeparator {
        &self.domain_separator
    }

    pub fn current_nonce(&self, offerer: H160) -> U256 {
        self.nonces.current(offerer)
    }

    /// The hash the given parameters would have if signed against the
    /// offerer's current nonce.
    pub fn order_hash(&self, parameters: &OrderParameters) -> OrderHash {
        OrderComponents {
            parameters: parameters.clone(),
            nonce: self.nonces.current(parameters.offerer),
        }
        .order_hash()
    }

    /// The digest a signer commits to for the given order hash.
    pub fn signing_digest(&self, order_hash: &OrderHash) -> [u8; 32] {
        hashed_eip712_message(&self.domain_separator, &order_hash.0)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Invalidates every outstanding order of the offerer in one step by
    /// advancing the nonce their digests were signed against. Does not
    /// affect a fulfillment that is already executing. Returns the new
    /// nonce.
    pub fn cancel_all(&mut self, offerer: H160) -> U256 {
        let nonce = self.nonces.increment(offerer);
        info!("cancelled all orders of {:?}, nonce is now {}", offerer, nonce);
        nonce
    }
}

impl<L: Ledger> FulfillmentEngine<L> {
    pub fn fulfill_order(
        &mut self,
        order: &Order,
        fulfiller: H160,
        now: U256,
    ) -> Result<FulfillmentRecord, FulfillmentError> {
        let validated = self.validate(order, fulfiller, now)?;
        self.execute(validated)
    }

    /// Defensive variant for callers that track the offerer's nonce
    /// themselves: rejects with `NonceMismatch` instead of an opaque
    /// signature failure when their view is stale.
    pub fn fulfill_order_at_nonce(
        &mut self,
        order: &Order,
        fulfiller: H160,
        now: U256,
        nonce: U256,
    ) -> Result<FulfillmentRecord, FulfillmentError> {
        let current = self.nonces.current(order.parameters.offerer);
        if nonce != current {
            return Err(FulfillmentError::NonceMismatch {
                expected: nonce,
                current,
            });
        }
        self.fulfill_order(order, fulfiller, now)
    }

    /// Received -> Validated. Checks everything that can be checked without
    /// touching the ledger; no transfer happens before every check passed.
    pub fn validate(
        &self,
        order: &Order,
        fulfiller: H160,
        now: U256,
    ) -> Result<ValidatedFulfillment, FulfillmentError> {
        let parameters = &order.parameters;
        if parameters.order_type != OrderType::FullOpen {
            return Err(FulfillmentError::UnsupportedOrderType(parameters.order_type));
        }
        if now < parameters.start_time {
            return Err(FulfillmentError::NotYetStarted {
                start_time: parameters.start_time,
                now,
            });
        }
        // `end_time` is an exclusive bound: an order at exactly `end_time`
        // is expired.
        if now >= parameters.end_time {
            return Err(FulfillmentError::ExpiredOrder {
                end_time: parameters.end_time,
                now,
            });
        }
        for asset in &parameters.offer {
            asset.validate()?;
        }
        for consideration in &parameters.consideration {
            consideration.validate()?;
        }

        // The signature must have been made against the offerer's current
        // nonce; an order signed against an older nonce recovers a
        // different signer and fails here. This is the anti-replay check.
        let components = order.components(self.nonces.current(parameters.offerer));
        let digest = components.signing_digest(&self.domain_separator);
        let signer = order
            .signature
            .recover(&digest)
            .ok_or(FulfillmentError::InvalidSignature)?;
        if signer != parameters.offerer {
            return Err(FulfillmentError::InvalidSignature);
        }

        let transfers = parameters
            .offer
            .iter()
            .map(|asset| PlannedTransfer {
                asset: *asset,
                from: parameters.offerer,
                to: fulfiller,
            })
            .chain(parameters.consideration.iter().map(|consideration| {
                PlannedTransfer {
                    asset: consideration.asset,
                    from: fulfiller,
                    to: consideration.recipient,
                }
            }))
            .collect();
        let order_hash = components.order_hash();
        debug!("order {} validated for fulfillment by {:?}", order_hash, fulfiller);
        Ok(ValidatedFulfillment {
            order_hash,
            offerer: parameters.offerer,
            fulfiller,
            nonce: components.nonce,
            transfers,
        })
    }

    /// Validated -> Executing -> Completed. All transfers of the
    /// fulfillment are one atomic unit: if any fails, every transfer that
    /// already went through is reversed and the nonce stays untouched, so
    /// no partial swap is ever observable.
    pub fn execute(
        &mut self,
        validated: ValidatedFulfillment,
    ) -> Result<FulfillmentRecord, FulfillmentError> {
        let current = self.nonces.current(validated.offerer);
        if current != validated.nonce {
            return Err(FulfillmentError::NonceMismatch {
                expected: validated.nonce,
                current,
            });
        }
        self.apply_transfers(&validated.transfers)?;
        let nonce = self.nonces.increment(validated.offerer);
        info!(
            "order {} fulfilled by {:?}, offerer nonce is now {}",
            validated.order_hash, validated.fulfiller, nonce
        );
        Ok(FulfillmentRecord {
            order_hash: validated.order_hash,
            offerer: validated.offerer,
            fulfiller: validated.fulfiller,
        })
    }

    fn apply_transfers(&mut self, transfers: &[PlannedTransfer]) -> Result<(), TransferError> {
        for (index, transfer) in transfers.iter().enumerate() {
            if let Err(err) = self
                .ledger
                .transfer(&transfer.asset, transfer.from, transfer.to)
            {
                // Reverse the transfers that already went through, most
                // recent first.
                for undone in transfers[..index].iter().rev() {
                    self.ledger
                        .transfer(&undone.asset, undone.to, undone.from)
                        .expect("ledger transfer is reversible");
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use model::order::OrderBuilder;
    use secp256k1::SecretKey;
    use web3::signing::{Key, SecretKeyRef};

    fn addr(n: u64) -> H160 {
        H160::from_low_u64_be(n)
    }

    fn test_engine() -> FulfillmentEngine<MemoryLedger> {
        let domain_separator = DomainSeparator::new(1, addr(0x4242));
        FulfillmentEngine::new(domain_separator, MemoryLedger::default())
    }

    fn offerer_key() -> SecretKey {
        SecretKey::from_slice(&[2u8; 32]).unwrap()
    }

    fn offerer_address() -> H160 {
        let key = offerer_key();
        Key::address(&SecretKeyRef::new(&key))
    }

    const NFT_TOKEN: u64 = 10;
    const FULFILLER: u64 = 0xf;

    /// offer: 1 unique NFT id 0, consideration: 10 native units back to the
    /// offerer.
    fn nft_for_native(engine: &FulfillmentEngine<MemoryLedger>, end_time: u64) -> Order {
        let key = offerer_key();
        OrderBuilder::default()
            .offering(Asset::unique(addr(NFT_TOKEN), 0.into()))
            .considering(Asset::native(10.into()), offerer_address())
            .with_end_time(end_time.into())
            .sign_with(
                engine.domain_separator(),
                engine.current_nonce(offerer_address()),
                SecretKeyRef::new(&key),
            )
    }

    fn fund_swap(engine: &mut FulfillmentEngine<MemoryLedger>) {
        engine
            .ledger_mut()
            .mint_unique(addr(NFT_TOKEN), 0.into(), offerer_address());
        engine.ledger_mut().mint_native(addr(FULFILLER), 10.into());
    }

    #[test]
    fn fulfills_nft_for_native_swap() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        let expected_hash = engine.order_hash(&order.parameters);

        let record = engine
            .fulfill_order(&order, addr(FULFILLER), 500.into())
            .unwrap();
        assert_eq!(
            record,
            FulfillmentRecord {
                order_hash: expected_hash,
                offerer: offerer_address(),
                fulfiller: addr(FULFILLER),
            }
        );
        let ledger = engine.ledger();
        assert_eq!(ledger.owner_of(addr(NFT_TOKEN), 0.into()), Some(addr(FULFILLER)));
        assert_eq!(
            ledger.balance_of(&Asset::native(0.into()), offerer_address()),
            10.into()
        );
        assert_eq!(
            ledger.balance_of(&Asset::native(0.into()), addr(FULFILLER)),
            0.into()
        );
        assert_eq!(engine.current_nonce(offerer_address()), 1.into());
    }

    #[test]
    fn replayed_order_is_rejected_without_effects() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        engine
            .fulfill_order(&order, addr(FULFILLER), 500.into())
            .unwrap();

        // The recomputed digest now embeds the incremented nonce, so the
        // original signature no longer matches.
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 500.into()),
            Err(FulfillmentError::InvalidSignature)
        );
        assert_eq!(
            engine.ledger().owner_of(addr(NFT_TOKEN), 0.into()),
            Some(addr(FULFILLER))
        );
        assert_eq!(engine.current_nonce(offerer_address()), 1.into());
    }

    #[test]
    fn end_time_is_an_exclusive_bound() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 1000.into()),
            Err(FulfillmentError::ExpiredOrder {
                end_time: 1000.into(),
                now: 1000.into(),
            })
        );
        // One second earlier it is still valid.
        assert!(engine
            .fulfill_order(&order, addr(FULFILLER), 999.into())
            .is_ok());
    }

    #[test]
    fn order_is_valid_at_exactly_start_time() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let key = offerer_key();
        let order = OrderBuilder::default()
            .offering(Asset::unique(addr(NFT_TOKEN), 0.into()))
            .considering(Asset::native(10.into()), offerer_address())
            .with_start_time(100.into())
            .with_end_time(1000.into())
            .sign_with(
                engine.domain_separator(),
                U256::zero(),
                SecretKeyRef::new(&key),
            );
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 99.into()),
            Err(FulfillmentError::NotYetStarted {
                start_time: 100.into(),
                now: 99.into(),
            })
        );
        assert!(engine
            .fulfill_order(&order, addr(FULFILLER), 100.into())
            .is_ok());
    }

    #[test]
    fn reserved_order_types_are_rejected() {
        let mut engine = test_engine();
        let key = offerer_key();
        let order = OrderBuilder::default()
            .with_order_type(OrderType::PartialOpen)
            .sign_with(
                engine.domain_separator(),
                U256::zero(),
                SecretKeyRef::new(&key),
            );
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 0.into()),
            Err(FulfillmentError::UnsupportedOrderType(OrderType::PartialOpen))
        );
    }

    #[test]
    fn malformed_assets_are_rejected_before_transfers() {
        let mut engine = test_engine();
        let key = offerer_key();
        let mut native_with_token = Asset::native(10.into());
        native_with_token.token = addr(1);
        let order = OrderBuilder::default()
            .offering(native_with_token)
            .sign_with(
                engine.domain_separator(),
                U256::zero(),
                SecretKeyRef::new(&key),
            );
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 0.into()),
            Err(FulfillmentError::InvalidAsset(
                InvalidAsset::NativeWithTokenAddress
            ))
        );
    }

    #[test]
    fn tampered_offerer_fails_signature_check() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let mut order = nft_for_native(&engine, 1000);
        order.parameters.offerer = addr(0xbad);
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 500.into()),
            Err(FulfillmentError::InvalidSignature)
        );
    }

    #[test]
    fn cancel_all_invalidates_unused_orders() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        assert_eq!(engine.cancel_all(offerer_address()), 1.into());
        assert_eq!(
            engine.fulfill_order(&order, addr(FULFILLER), 500.into()),
            Err(FulfillmentError::InvalidSignature)
        );
        // Exactly one increment, from the cancellation alone.
        assert_eq!(engine.current_nonce(offerer_address()), 1.into());
        assert_eq!(
            engine.ledger().owner_of(addr(NFT_TOKEN), 0.into()),
            Some(offerer_address())
        );
    }

    #[test]
    fn failed_transfer_rolls_back_the_whole_fulfillment() {
        let mut engine = test_engine();
        let token = addr(20);
        engine
            .ledger_mut()
            .mint_fungible(token, offerer_address(), 100.into());
        // The fulfiller holds less native currency than the consideration
        // needs, so the second transfer of the plan fails after the first
        // already moved the fungible tokens.
        engine.ledger_mut().mint_native(addr(FULFILLER), 5.into());
        let key = offerer_key();
        let order = OrderBuilder::default()
            .offering(Asset::fungible(token, 100.into()))
            .considering(Asset::native(10.into()), offerer_address())
            .with_end_time(1000.into())
            .sign_with(
                engine.domain_separator(),
                U256::zero(),
                SecretKeyRef::new(&key),
            );

        let result = engine.fulfill_order(&order, addr(FULFILLER), 500.into());
        assert_eq!(
            result,
            Err(FulfillmentError::TransferFailed(
                TransferError::InsufficientBalance {
                    owner: addr(FULFILLER),
                    held: 5.into(),
                    needed: 10.into(),
                }
            ))
        );
        // The already performed offer transfer was reversed and the nonce
        // is untouched, so the order stays fulfillable.
        assert_eq!(
            engine
                .ledger()
                .balance_of(&Asset::fungible(token, 0.into()), offerer_address()),
            100.into()
        );
        assert_eq!(engine.current_nonce(offerer_address()), 0.into());

        engine.ledger_mut().mint_native(addr(FULFILLER), 5.into());
        assert!(engine
            .fulfill_order(&order, addr(FULFILLER), 500.into())
            .is_ok());
    }

    #[test]
    fn empty_offer_and_consideration_are_permitted() {
        let mut engine = test_engine();
        let key = offerer_key();
        let order = OrderBuilder::default().sign_with(
            engine.domain_separator(),
            U256::zero(),
            SecretKeyRef::new(&key),
        );
        let record = engine
            .fulfill_order(&order, addr(FULFILLER), 0.into())
            .unwrap();
        assert_eq!(record.offerer, offerer_address());
        assert_eq!(engine.current_nonce(offerer_address()), 1.into());
    }

    #[test]
    fn stale_explicit_nonce_is_a_nonce_mismatch() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        assert_eq!(
            engine.fulfill_order_at_nonce(&order, addr(FULFILLER), 500.into(), 1.into()),
            Err(FulfillmentError::NonceMismatch {
                expected: 1.into(),
                current: 0.into(),
            })
        );
        assert!(engine
            .fulfill_order_at_nonce(&order, addr(FULFILLER), 500.into(), 0.into())
            .is_ok());
    }

    #[test]
    fn execution_detects_state_moving_after_validation() {
        let mut engine = test_engine();
        fund_swap(&mut engine);
        let order = nft_for_native(&engine, 1000);
        let validated = engine.validate(&order, addr(FULFILLER), 500.into()).unwrap();
        engine.cancel_all(offerer_address());
        assert_eq!(
            engine.execute(validated),
            Err(FulfillmentError::NonceMismatch {
                expected: 0.into(),
                current: 1.into(),
            })
        );
    }

    #[test]
    fn signing_digest_matches_component_digest() {
        let engine = test_engine();
        let order = nft_for_native(&engine, 1000);
        let hash = engine.order_hash(&order.parameters);
        assert_eq!(
            engine.signing_digest(&hash),
            order
                .components(U256::zero())
                .signing_digest(engine.domain_separator())
        );
    }

    #[test]
    fn fulfillment_record_serialization() {
        let record = FulfillmentRecord {
            order_hash: OrderHash([0x11; 32]),
            offerer: addr(1),
            fulfiller: addr(2),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "orderHash": format!("0x{}", "11".repeat(32)),
                "offerer": "0x0000000000000000000000000000000000000001",
                "fulfiller": "0x0000000000000000000000000000000000000002",
            })
        );
    }
}
