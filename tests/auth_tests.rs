//! Authentication determinism
//!
//! The verifier computation must be a pure function of the password and the
//! server-supplied salt material. Golden vectors were captured against the
//! reference thin driver.

use oranet::crypto::{
    combo_key_11g, combo_key_12c, decrypt_cbc_256, encrypt_cbc_256_pkcs7, password_hash_11g,
    password_hash_12c, password_key_12c, pbkdf2_derive,
};

const PASSWORD: &[u8] = b"testpass";

fn verifier_data() -> Vec<u8> {
    hex::decode("274824CFDDD22AF0B06FD1C86B3D4814").unwrap()
}

#[test]
fn test_12c_verifier_is_deterministic() {
    let first = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    let second = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    assert_eq!(first, second);
}

#[test]
fn test_12c_verifier_matches_golden_vector() {
    let hash = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    assert_eq!(
        hex::encode(&hash),
        "37eb93ac57f243a39a460ec61e898cba2fda3986cc76191778fdecdfac5ba7e3"
    );

    let key = password_key_12c(PASSWORD, &verifier_data(), 4096);
    assert_eq!(
        hex::encode(&key),
        "12d8f06f9723d37947d1091a42adb4ad76dbac6e61d5decd8ed75df2380e81c1\
         e6af08c27ea59957d9fd15a781916f597e74dc08a23bc6bbf4d3f7526c016b4d"
    );
}

#[test]
fn test_12c_session_key_decryption_matches_golden_vector() {
    let hash = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    let encrypted =
        hex::decode("0C2E56F553EE1AFD5D2D7BCF925518400C8751FD000000000000000000000000").unwrap();
    let server_key = decrypt_cbc_256(&hash, &encrypted).unwrap();
    assert_eq!(
        hex::encode(&server_key),
        "f7f30a3a89d0923291d81d61866d52f7ef7a249eac630365836910c2862d10ef"
    );
}

#[test]
fn test_12c_combo_key_matches_golden_vector() {
    let hash = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    let encrypted =
        hex::decode("0C2E56F553EE1AFD5D2D7BCF925518400C8751FD000000000000000000000000").unwrap();
    let server_key = decrypt_cbc_256(&hash, &encrypted).unwrap();
    let client_key =
        hex::decode("0102030405060708091011121314151601020304050607080910111213141516").unwrap();
    let salt = hex::decode("F82C7BE30741A8C60699AFB6A9F3FE59").unwrap();

    let combo = combo_key_12c(&server_key, &client_key, &salt, 3).unwrap();
    assert_eq!(
        hex::encode(&combo),
        "3a3cea52f478c52695fa13f2ff2d2b7aa8fa278aebf40dfdfe5393daa011b56d"
    );
}

#[test]
fn test_password_encryption_under_combo_key() {
    let hash = password_hash_12c(PASSWORD, &verifier_data(), 4096);
    let encrypted =
        hex::decode("0C2E56F553EE1AFD5D2D7BCF925518400C8751FD000000000000000000000000").unwrap();
    let server_key = decrypt_cbc_256(&hash, &encrypted).unwrap();
    let client_key =
        hex::decode("0102030405060708091011121314151601020304050607080910111213141516").unwrap();
    let salt = hex::decode("F82C7BE30741A8C60699AFB6A9F3FE59").unwrap();
    let combo = combo_key_12c(&server_key, &client_key, &salt, 3).unwrap();

    let mut salted = hex::decode("00112233445566778899aabbccddeeff").unwrap();
    salted.extend_from_slice(PASSWORD);
    let encrypted_password = encrypt_cbc_256_pkcs7(&combo, &salted).unwrap();
    assert_eq!(
        hex::encode_upper(&encrypted_password),
        "B19B797CA88CB893E908FD0F7A48B930136E236E3FC32C2D3502D18652BD779B"
    );
}

#[test]
fn test_11g_hash_shape_and_determinism() {
    let first = password_hash_11g(PASSWORD, &verifier_data());
    let second = password_hash_11g(PASSWORD, &verifier_data());
    assert_eq!(first, second);
    assert_eq!(first.len(), 24);
}

#[test]
fn test_11g_combo_key_symmetric_inputs() {
    let a = [0x11u8; 48];
    let b = [0x22u8; 48];
    let combo = combo_key_11g(&a, &b).unwrap();
    assert_eq!(combo.len(), 24);
    // the derivation XORs both halves, so swapping them is symmetric
    assert_eq!(combo, combo_key_11g(&b, &a).unwrap());
}

#[test]
fn test_different_salts_produce_different_verifiers() {
    let other_salt = hex::decode("00000000000000000000000000000001").unwrap();
    assert_ne!(
        password_hash_12c(PASSWORD, &verifier_data(), 4096),
        password_hash_12c(PASSWORD, &other_salt, 4096)
    );
}

#[test]
fn test_different_passwords_produce_different_verifiers() {
    assert_ne!(
        password_hash_12c(b"testpass", &verifier_data(), 4096),
        password_hash_12c(b"testpasS", &verifier_data(), 4096)
    );
}

#[test]
fn test_pbkdf2_iteration_count_matters() {
    assert_ne!(
        pbkdf2_derive(PASSWORD, b"salt", 1000, 32),
        pbkdf2_derive(PASSWORD, b"salt", 1001, 32)
    );
}
