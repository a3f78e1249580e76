//! Certificate fixtures for unit tests
//!
//! RSA generation is expensive, so one 2048-bit key is shared by every test
//! in the binary.

use std::path::PathBuf;
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rcgen::{CertificateParams, KeyPair};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tempfile::TempDir;

static RSA_KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

pub(crate) fn rsa_key() -> &'static RsaPrivateKey {
    RSA_KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("rsa key generation"))
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Validity {
    Current,
    Expired,
    NotYetValid,
}

/// Bundle files written for one key pair
pub(crate) struct Bundles {
    // keeps the files alive
    pub _dir: TempDir,
    pub cert_only: PathBuf,
    pub with_key: PathBuf,
    pub key_only: PathBuf,
}

pub(crate) fn rsa_bundles(validity: Validity) -> Bundles {
    let key_pem = rsa_key()
        .to_pkcs8_pem(LineEnding::LF)
        .expect("pkcs8 pem")
        .to_string();
    let key_pair = KeyPair::from_pem(&key_pem).expect("rcgen rsa key pair");
    write_bundles(&key_pair, &key_pem, validity)
}

pub(crate) fn ecdsa_bundles(validity: Validity) -> Bundles {
    let key_pair = KeyPair::generate().expect("p256 key pair");
    let key_pem = key_pair.serialize_pem();
    write_bundles(&key_pair, &key_pem, validity)
}

/// RSA certificate plus the shared key as an `ENCRYPTED PRIVATE KEY` block
pub(crate) fn encrypted_rsa_bundle(password: &str) -> (TempDir, PathBuf) {
    use pkcs8::pkcs5::pbes2;

    let key_pem = rsa_key()
        .to_pkcs8_pem(LineEnding::LF)
        .expect("pkcs8 pem")
        .to_string();
    let key_pair = KeyPair::from_pem(&key_pem).expect("rcgen rsa key pair");
    let cert_pem = self_signed(&key_pair, Validity::Current);

    let der = rsa_key().to_pkcs8_der().expect("pkcs8 der");
    let info = pkcs8::PrivateKeyInfo::try_from(der.as_bytes()).expect("private key info");
    let salt = [7u8; 16];
    let iv = [9u8; 16];
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(1_000, &salt, &iv).expect("pbes2");
    let encrypted = info
        .encrypt_with_params(params, password)
        .expect("encrypt key")
        .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .expect("encrypted pem")
        .to_string();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("encrypted.pem");
    std::fs::write(&path, format!("{}{}", cert_pem, encrypted)).expect("write bundle");
    (dir, path)
}

fn write_bundles(key_pair: &KeyPair, key_pem: &str, validity: Validity) -> Bundles {
    let cert_pem = self_signed(key_pair, validity);
    let dir = tempfile::tempdir().expect("tempdir");

    let cert_only = dir.path().join("public.pem");
    let with_key = dir.path().join("private.pem");
    let key_only = dir.path().join("key.pem");
    std::fs::write(&cert_only, &cert_pem).expect("write cert");
    std::fs::write(&with_key, format!("{}{}", cert_pem, key_pem)).expect("write bundle");
    std::fs::write(&key_only, key_pem).expect("write key");

    Bundles {
        _dir: dir,
        cert_only,
        with_key,
        key_only,
    }
}

fn self_signed(key_pair: &KeyPair, validity: Validity) -> String {
    let mut params =
        CertificateParams::new(vec!["audit-collector.local".to_string()]).expect("params");
    match validity {
        Validity::Current => {}
        Validity::Expired => {
            params.not_before = rcgen::date_time_ymd(2001, 1, 1);
            params.not_after = rcgen::date_time_ymd(2002, 1, 1);
        }
        Validity::NotYetValid => {
            params.not_before = rcgen::date_time_ymd(2990, 1, 1);
            params.not_after = rcgen::date_time_ymd(2991, 1, 1);
        }
    }
    params.self_signed(key_pair).expect("self-signed").pem()
}
