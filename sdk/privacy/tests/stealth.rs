use shade_privacy::keys::SealedKeyMaterial;
use shade_privacy::stealth::decode_shielded_address;
use shade_privacy::{
    ChaChaCipher, KeyPair, PrivacyError, ShieldedAddress, StealthKeyPair, derive_shared_secret,
    derive_stealth_address, recover_stealth_keypair,
};

fn cipher() -> ChaChaCipher {
    ChaChaCipher::new([11u8; 32])
}

fn secret_key_64(pair: &KeyPair) -> Vec<u8> {
    let mut bytes = pair.secret_bytes().to_vec();
    bytes.extend_from_slice(pair.public_bytes());
    bytes
}

#[test]
fn ecdh_is_symmetric_for_random_pairs() {
    for _ in 0..16 {
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let ab = derive_shared_secret(a.secret_bytes(), b.public_bytes()).unwrap();
        let ba = derive_shared_secret(&secret_key_64(&b), a.public_bytes()).unwrap();

        assert_eq!(ab.as_bytes(), ba.as_bytes());
        assert_ne!(ab.as_bytes(), &[0u8; 32]);
    }
}

#[test]
fn ecdh_rejects_bad_lengths() {
    let a = KeyPair::generate();
    assert!(matches!(
        derive_shared_secret(&[1u8; 16], a.public_bytes()),
        Err(PrivacyError::InvalidKeyMaterial(_))
    ));
    assert!(matches!(
        derive_shared_secret(a.secret_bytes(), &[1u8; 33]),
        Err(PrivacyError::InvalidKeyMaterial(_))
    ));
    assert!(matches!(
        derive_shared_secret(&[0u8; 32], a.public_bytes()),
        Err(PrivacyError::InvalidKeyMaterial(_))
    ));
}

#[test]
fn recipient_recovers_from_sealed_keys() {
    let cipher = cipher();
    let keys = StealthKeyPair::generate();
    let sealed = keys.seal(&cipher).unwrap();

    // Sealed material travels as JSON
    let json = serde_json::to_string(&sealed).unwrap();
    let sealed: SealedKeyMaterial = serde_json::from_str(&json).unwrap();

    let stealth = derive_stealth_address(
        &sealed.viewing_public,
        &sealed.spending_public,
        &KeyPair::generate(),
        &cipher,
    )
    .unwrap();
    let record = ShieldedAddress::from_stealth(
        &stealth,
        &sealed.viewing_public,
        &sealed.spending_public,
        42,
    );

    let opened = sealed.open(&cipher).unwrap();
    let one_time = recover_stealth_keypair(
        opened.viewing().secret_bytes(),
        opened.spending().secret_bytes(),
        &record.stealth_meta.ephemeral_public,
    )
    .unwrap();

    assert_eq!(
        &decode_shielded_address(&record.public_address).unwrap(),
        one_time.public_bytes()
    );
    assert_eq!(one_time.public_base58(), stealth.base58());
}

#[test]
fn sealed_keys_need_the_right_cipher() {
    let keys = StealthKeyPair::generate();
    let sealed = keys.seal(&cipher()).unwrap();

    assert_eq!(
        sealed.open(&ChaChaCipher::new([12u8; 32])).unwrap_err(),
        PrivacyError::DecryptionFailed
    );
    assert_eq!(
        sealed.open(&ChaChaCipher::unconfigured()).unwrap_err(),
        PrivacyError::EncryptionKeyMissing
    );
}
