use std::sync::Arc;

use shade_config::ShadeConfig;
use shade_core::{ManualClock, PrivacyApi};
use shade_privacy::{PaymentStatus, PrivacyError};

fn api() -> PrivacyApi {
    let mut config = ShadeConfig::default();
    config.privacy.encryption_key = Some(hex::encode([21u8; 32]));
    PrivacyApi::with_clock(&config, Arc::new(ManualClock::new(1_700_000_000_000))).unwrap()
}

#[test]
fn end_to_end_payment_and_double_spend() {
    let api = api();

    // key pair -> ephemeral -> address
    let recipient = api.generate_account().unwrap();
    let derived = api
        .derive_address(
            &recipient.keys.viewing_public,
            &recipient.keys.spending_public,
        )
        .unwrap();
    let address = derived.address.public_address.clone();
    assert!(address.starts_with("zs1"));
    assert_eq!(address.len(), 67);

    // payment of 2.5 -> submit -> confirmed
    let sender_key = [0x5au8; 32];
    let payment = api.create_payment(&sender_key, &address, 2.5, None).unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let confirmed = api.submit_payment(payment.clone()).unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert!(confirmed.merkle_root.is_some());
    assert!(api.verify_payment_inclusion(&confirmed.id).unwrap());
    let nullifiers = api.payment_stats().unwrap().nullifiers;

    // equivalent resubmission is rejected and the set does not grow
    let again = api.submit_payment(payment);
    assert!(matches!(again, Err(PrivacyError::DoubleSpend(_))));
    assert_eq!(api.payment_stats().unwrap().nullifiers, nullifiers);

    // recipient recovers the one-time key and spends
    let one_time = api
        .recover_keypair(&recipient.sealed, &derived.stealth.ephemeral_public)
        .unwrap();
    assert_eq!(one_time.public_bytes(), &derived.stealth.address);

    let onward = api
        .spend_payment(&confirmed.id, one_time.secret_bytes(), &address, 1.25)
        .unwrap();
    assert_eq!(onward.status, PaymentStatus::Confirmed);
    assert_eq!(onward.merkle_index, Some(1));

    let stats = api.payment_stats().unwrap();
    assert_eq!(stats.spent, 1);
    assert_eq!(stats.confirmed, 1);
}

#[test]
fn double_spend_grows_set_by_exactly_one() {
    let api = api();
    let address = api.generate_account().unwrap().address.public_address;
    let key = [0x11u8; 32];

    let before = api.payment_stats().unwrap().nullifiers;
    let payment = api.create_payment(&key, &address, 0.75, Some("fees")).unwrap();
    api.submit_payment(payment.clone()).unwrap();
    assert!(api.submit_payment(payment.clone()).is_err());
    assert!(api.submit_payment(payment).is_err());

    assert_eq!(api.payment_stats().unwrap().nullifiers, before + 1);
}

#[test]
fn independently_built_equivalent_payment_is_rejected() {
    let api = api();
    let address = api.generate_account().unwrap().address.public_address;
    let key = [0x42u8; 32];

    let first = api.create_payment(&key, &address, 1.5, None).unwrap();
    let first = api.submit_payment(first).unwrap();

    // same sender key, recipient and commitment, built from scratch
    let factory = api.payments().factory();
    let opening = factory.open_amount(&first).unwrap();
    let second = factory
        .create_private_payment_with_blinding(
            &key,
            &address,
            1.5,
            None,
            &opening.blinding,
            1_700_000_000_500,
        )
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.commitment, first.commitment);
    assert_eq!(second.nullifier_hash, first.nullifier_hash);

    assert!(matches!(
        api.submit_payment(second.clone()),
        Err(PrivacyError::DoubleSpend(_))
    ));

    let stats = api.payment_stats().unwrap();
    assert_eq!(stats.nullifiers, 1);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.total, 1);
    assert!(api.payments().get_payment(&second.id).unwrap().is_none());
}

#[test]
fn concurrent_submissions_have_one_winner() {
    let api = Arc::new(api());
    let address = api.generate_account().unwrap().address.public_address;
    let payment = api.create_payment(&[0x33u8; 32], &address, 5.0, None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let api = api.clone();
            let payment = payment.clone();
            std::thread::spawn(move || api.submit_payment(payment))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let double_spends = results
        .iter()
        .filter(|r| matches!(r, Err(PrivacyError::DoubleSpend(_))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(double_spends, 7);
    assert_eq!(api.payment_stats().unwrap().nullifiers, 1);
}

#[test]
fn invalid_inputs_are_rejected_before_anything_is_stored() {
    let api = api();
    let address = api.generate_account().unwrap().address.public_address;

    assert!(matches!(
        api.create_payment(&[1u8; 32], "zs1short", 1.0, None),
        Err(PrivacyError::InvalidAddress(_))
    ));
    assert!(matches!(
        api.create_payment(&[1u8; 32], &address, -3.0, None),
        Err(PrivacyError::InvalidAmount(_))
    ));
    assert!(matches!(
        api.create_payment(&[1u8; 32], &address, f64::NAN, None),
        Err(PrivacyError::InvalidAmount(_))
    ));
    assert!(matches!(
        api.create_payment(&[1u8; 8], &address, 1.0, None),
        Err(PrivacyError::InvalidKeyMaterial(_))
    ));
    assert_eq!(api.payment_stats().unwrap().total, 0);
}
