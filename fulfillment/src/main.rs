//! End-to-end demo run: mints assets into an in-memory ledger, signs an
//! order offering an NFT against ten native units, and fulfills it.

use anyhow::Result;
use fulfillment::{engine::FulfillmentEngine, ledger::MemoryLedger, Ledger};
use model::{asset::Asset, order::OrderBuilder, DomainSeparator};
use primitive_types::{H160, U256};
use secp256k1::SecretKey;
use tracing::info;
use web3::signing::{Key, SecretKeyRef};

fn main() -> Result<()> {
    tracing_setup::initialize("info,fulfillment=debug");

    let domain_separator = DomainSeparator::new(1, H160::from_low_u64_be(0x4242));
    let mut engine = FulfillmentEngine::new(domain_separator, MemoryLedger::default());

    let offerer_key = SecretKey::from_slice(&[2u8; 32])?;
    let offerer = Key::address(&SecretKeyRef::new(&offerer_key));
    let fulfiller = H160::from_low_u64_be(0xf);
    let nft_token = H160::from_low_u64_be(0x10);

    engine.ledger_mut().mint_unique(nft_token, 0.into(), offerer);
    engine.ledger_mut().mint_native(fulfiller, 10.into());

    let now = U256::from(chrono::Utc::now().timestamp() as u64);
    let order = OrderBuilder::default()
        .offering(Asset::unique(nft_token, 0.into()))
        .considering(Asset::native(10.into()), offerer)
        .with_end_time(now + U256::from(3600))
        .sign_with(
            engine.domain_separator(),
            engine.current_nonce(offerer),
            SecretKeyRef::new(&offerer_key),
        );

    let record = engine.fulfill_order(&order, fulfiller, now)?;
    info!("fulfilled order {}", record.order_hash);
    info!(
        "nft owner is now {:?}, offerer native balance is {}",
        engine.ledger().owner_of(nft_token, 0.into()),
        engine.ledger().balance_of(&Asset::native(0.into()), offerer),
    );
    Ok(())
}
