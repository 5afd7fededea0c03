// Copyright 2025 Shade Labs
// Licensed under the Apache License, Version 2.0

use anyhow::Context;
use log::{info, warn};
use rand::RngCore;
use std::{env, time::Duration};

use shade_config::ShadeConfig;
use shade_core::{PrivacyApi, spawn_settlement_driver};
use shade_privacy::{BundleTransaction, PrivacyError, serialize_transaction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    if env::args().any(|arg| arg == "--sample-config") {
        println!("{}", ShadeConfig::generate_sample());
        return Ok(());
    }

    let mut config = ShadeConfig::load().context("Failed to load Shade config")?;
    if config.privacy.encryption_key.is_none() {
        warn!("No encryption key configured, using a random key for this session");
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        config.privacy.encryption_key = Some(hex::encode(key));
    }

    let api = PrivacyApi::from_config(&config).context("Failed to initialise privacy API")?;
    info!("Shade privacy layer starting (proof backend: {})", api.backend().name());

    let driver = spawn_settlement_driver(
        api.bundles(),
        Duration::from_millis(config.bundle.settlement_poll_ms),
    );

    // Recipient publishes keys, sender pays to a fresh one-time address
    let recipient = api.generate_account()?;
    let derived = api.derive_address(
        &recipient.keys.viewing_public,
        &recipient.keys.spending_public,
    )?;
    info!("Derived address {}", derived.address.public_address);

    let mut sender_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut sender_key);

    let payment = api.create_payment(
        &sender_key,
        &derived.address.public_address,
        2.5,
        Some("demo"),
    )?;
    let confirmed = api.submit_payment(payment.clone())?;
    info!(
        "Payment {} confirmed (leaf {:?}, root {:?})",
        confirmed.id, confirmed.merkle_index, confirmed.merkle_root
    );

    match api.submit_payment(payment) {
        Err(PrivacyError::DoubleSpend(hash)) => info!("Resubmission rejected, nullifier {}", hash),
        other => warn!("Unexpected resubmission result: {:?}", other.map(|p| p.id)),
    }

    // Recipient recovers the one-time key and spends onwards
    let one_time = api.recover_keypair(&recipient.sealed, &derived.stealth.ephemeral_public)?;
    let onward = api.spend_payment(
        &confirmed.id,
        one_time.secret_bytes(),
        &recipient.address.public_address,
        1.0,
    )?;
    info!("Spent into payment {}", onward.id);

    // Bundle a batch of trades and let the driver settle it
    let trades: Vec<BundleTransaction> = (0..8)
        .map(|i| {
            let amount = 0.25 * (i + 1) as f64;
            BundleTransaction::new(format!("trade-{}", i), "desk-a", "desk-b", amount)
                .with_token("SOL")
        })
        .collect();
    let bundle = api.create_bundle(trades)?;
    api.submit_bundle(&bundle.bundle_id)?;

    if let Some(proof) = api.transaction_proof(&bundle.bundle_id, 3)? {
        let leaf = serialize_transaction(&bundle.transactions[3])?;
        let included = api.verify_transaction_inclusion(&bundle.bundle_id, &leaf, &proof)?;
        info!("Trade 3 inclusion verified: {}", included);
    }

    let deadline = config.bundle.settlement_delay_ms + 4 * config.bundle.settlement_poll_ms + 1_000;
    tokio::time::sleep(Duration::from_millis(deadline)).await;
    driver.abort();

    println!("{}", serde_json::to_string_pretty(&api.payment_stats()?)?);
    println!("{}", serde_json::to_string_pretty(&api.bundle_stats()?)?);
    Ok(())
}
