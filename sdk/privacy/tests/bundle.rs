use shade_privacy::{
    BundleTransaction, CombineMode, GasModel, MAX_BUNDLE_TRANSACTIONS, PrivacyError,
    StructuralBackend, create_transaction_bundle, get_transaction_proof, serialize_transaction,
    verify_bundle, verify_transaction_inclusion,
};

fn trades(n: usize) -> Vec<BundleTransaction> {
    (0..n)
        .map(|i| {
            BundleTransaction::new(format!("trade-{}", i), "maker", "taker", 0.1 * (i + 1) as f64)
                .with_token("SOL")
                .with_timestamp(1_700_000_000 + i as u64)
        })
        .collect()
}

fn bundle(n: usize, mode: CombineMode) -> shade_privacy::BundledTransaction {
    create_transaction_bundle(
        trades(n),
        MAX_BUNDLE_TRANSACTIONS,
        &GasModel::default(),
        mode,
        &StructuralBackend,
        0,
    )
    .unwrap()
}

#[test]
fn size_boundary_zero_hundred_hundred_one() {
    let gas = GasModel::default();
    let run = |n| {
        create_transaction_bundle(
            trades(n),
            MAX_BUNDLE_TRANSACTIONS,
            &gas,
            CombineMode::Positional,
            &StructuralBackend,
            0,
        )
    };

    assert_eq!(run(0).unwrap_err(), PrivacyError::EmptyBundle);
    assert_eq!(run(100).unwrap().transactions.len(), 100);
    assert!(matches!(
        run(101),
        Err(PrivacyError::BundleTooLarge { got: 101, max: 100 })
    ));
}

#[test]
fn every_transaction_round_trips_in_both_modes() {
    for mode in [CombineMode::Positional, CombineMode::Sorted] {
        for n in [1, 2, 3, 7, 16, 33] {
            let b = bundle(n, mode);
            for (i, tx) in b.transactions.iter().enumerate() {
                let proof = get_transaction_proof(&b, i).unwrap();
                let leaf = serialize_transaction(tx).unwrap();
                assert!(verify_transaction_inclusion(&leaf, &proof, mode));
            }
        }
    }
}

#[test]
fn tampered_leaf_or_path_fails() {
    let b = bundle(9, CombineMode::Positional);
    let proof = get_transaction_proof(&b, 4).unwrap();
    let leaf = serialize_transaction(&b.transactions[4]).unwrap();

    let mut tx = b.transactions[4].clone();
    tx.to = "mallory".into();
    let forged = serialize_transaction(&tx).unwrap();
    assert!(!verify_transaction_inclusion(&forged, &proof, b.combine_mode));

    let mut bad_path = proof.clone();
    bad_path.path[1][0] ^= 0x01;
    assert!(!verify_transaction_inclusion(&leaf, &bad_path, b.combine_mode));

    let mut bad_root = proof;
    bad_root.root[31] ^= 0x80;
    assert!(!verify_transaction_inclusion(&leaf, &bad_root, b.combine_mode));
}

#[test]
fn verification_reports_all_issues() {
    let mut b = bundle(4, CombineMode::Positional);
    b.merkle_root = [9u8; 32];
    b.transactions[2].amount = 0.0;
    b.transactions[3].from = String::new();
    b.aggregated_proof.curve = "bls12-381".into();

    let result = verify_bundle(&b, &StructuralBackend);
    assert!(!result.valid);
    assert!(result.errors.len() >= 2, "{:?}", result.errors);

    let err = result.into_result().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("merkle root mismatch"));
    assert!(msg.contains("transaction 2"));
}

#[test]
fn bundle_serializes_with_recorded_mode() {
    let b = bundle(3, CombineMode::Sorted);
    let json = serde_json::to_value(&b).unwrap();
    assert_eq!(json["combine_mode"], "sorted");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["aggregated_proof"]["protocol"], "groth16-aggregate");
    assert_eq!(json["aggregated_proof"]["curve"], "bn128");
}
