use std::ops::Range;

use macaroons::{
    constant_time_eq, chain, Crypto, CryptoError, DefaultCrypto, DischargePolicy, Macaroon,
    ParseError, ParseErrorKind, Verifier, VerifierConfig, VerifyError,
};


/// A deterministic, dependency free and entirely insecure backend.
struct ToyCrypto;

fn fnv(parts: &[&[u8]]) -> [u8; 8] {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for &byte in (part.len() as u64).to_le_bytes().iter().chain(part.iter()) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    hash.to_le_bytes()
}

impl ToyCrypto {
    fn keystream(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, byte)| byte ^ fnv(&[b"stream", key, &(i as u64).to_le_bytes()])[0])
            .collect()
    }
}

impl Crypto for ToyCrypto {
    const BLOCK_SIZE: usize = 8;
    const KEY_SIZE: usize = 8;

    fn hmac(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        fnv(&[b"hmac", key, message]).to_vec()
    }

    fn hash(&self, message: &[u8]) -> Vec<u8> {
        fnv(&[b"hash", message]).to_vec()
    }

    fn encrypt(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut result = self.keystream(key, message);
        let tag = self.hmac(key, &result);
        result.extend_from_slice(&tag);
        result
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < 8 {
            return Err(CryptoError::CiphertextTooShort(ciphertext.len()));
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - 8);
        if !constant_time_eq(&self.hmac(key, body), tag) {
            return Err(CryptoError::AuthenticationFailed);
        }
        Ok(self.keystream(key, body))
    }
}


fn first_party_scenario<C: Crypto>(crypto: &C) {
    let macaroon = Macaroon::create(crypto, "auth", b"root-key", "id-1")
        .add_first_party_caveat(crypto, "user = alice");

    assert!(macaroon.verify(crypto, b"root-key", |cid| cid == b"user = alice", &[]));
    assert!(!macaroon.verify(crypto, b"root-key", |cid| cid != b"user = alice", &[]));
    assert!(!macaroon.verify(crypto, b"other-key", |_| true, &[]));
}

fn third_party_scenario<C: Crypto>(crypto: &C) {
    let macaroon = Macaroon::create(crypto, "auth", b"root-key", "id-1")
        .add_first_party_caveat(crypto, "user = alice")
        .add_third_party_caveat(crypto, b"3p-key", Some("http://third-party"), "discharge-id");

    let discharge = Macaroon::create(crypto, "http://third-party", b"3p-key", "discharge-id");
    let bound = macaroon.prepare_for_request(crypto, &discharge);

    assert!(macaroon.verify(crypto, b"root-key", |_| true, &[bound]));
    assert!(!macaroon.verify(crypto, b"root-key", |_| true, &[discharge]));

    let elsewhere = Macaroon::create(crypto, "http://third-party", b"3p-key", "other-id");
    let bound = macaroon.prepare_for_request(crypto, &elsewhere);
    assert!(!macaroon.verify(crypto, b"root-key", |_| true, &[bound]));
}

#[test]
fn first_party_caveat() {
    first_party_scenario(&DefaultCrypto);
}

#[test]
fn third_party_caveat() {
    third_party_scenario(&DefaultCrypto);
}

#[test]
fn pluggable_backend() {
    first_party_scenario(&ToyCrypto);
    third_party_scenario(&ToyCrypto);

    let macaroon = Macaroon::create(&ToyCrypto, "auth", b"root-key", "id-1");
    assert_eq!(macaroon.signature().len(), 8);

    // A macaroon minted under one backend means nothing to another.
    assert!(!macaroon.verify(&DefaultCrypto, b"root-key", |_| true, &[]));
}

#[test]
fn binding_is_exclusive() {
    let a = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "a")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", None, "discharge-id");
    let b = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "b")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", None, "discharge-id");

    let discharge = Macaroon::create(&DefaultCrypto, "", b"3p-key", "discharge-id");
    let for_a = a.prepare_for_request(&DefaultCrypto, &discharge);
    let for_b = b.prepare_for_request(&DefaultCrypto, &discharge);

    assert_ne!(for_a.signature(), for_b.signature());
    assert_ne!(
        chain::bind(&DefaultCrypto, a.signature(), discharge.signature()),
        chain::bind(&DefaultCrypto, b.signature(), discharge.signature())
    );

    assert!(a.verify(&DefaultCrypto, b"root-key", |_| true, &[for_a.clone()]));
    assert!(b.verify(&DefaultCrypto, b"root-key", |_| true, &[for_b]));
    assert!(!b.verify(&DefaultCrypto, b"root-key", |_| true, &[for_a]));
}

#[test]
fn discharge_reuse_policy() {
    let macaroon = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "id-1")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", None, "discharge-id")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", None, "discharge-id");

    let discharge = Macaroon::create(&DefaultCrypto, "", b"3p-key", "discharge-id");
    let bound = macaroon.prepare_for_request(&DefaultCrypto, &discharge);

    let strict = Verifier::new(&DefaultCrypto);
    assert_eq!(
        strict.verify_detailed(&macaroon, b"root-key", &[bound.clone()]),
        Err(VerifyError::DischargeReused(b"discharge-id".to_vec()))
    );
    assert!(strict.verify(&macaroon, b"root-key", &[bound.clone(), bound.clone()]));

    let config = VerifierConfig {
        discharge_policy: DischargePolicy::Permissive,
        ..VerifierConfig::default()
    };
    let permissive = Verifier::with_config(&DefaultCrypto, config);
    assert!(permissive.verify(&macaroon, b"root-key", &[bound]));

    // The functional form uses the strict default.
    let bound = macaroon.prepare_for_request(&DefaultCrypto, &discharge);
    assert!(!macaroon.verify(&DefaultCrypto, b"root-key", |_| true, &[bound]));
}


/// The key and value byte ranges of every packet in a serialized macaroon.
fn packets(bytes: &[u8]) -> Vec<(String, Range<usize>)> {
    let mut result = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let header = std::str::from_utf8(&bytes[pos..pos + 4]).unwrap();
        let size = usize::from_str_radix(header, 16).unwrap();
        let body = &bytes[pos + 4..pos + size];
        let space = body.iter().position(|&c| c == b' ').unwrap();
        let key = String::from_utf8(body[..space].to_vec()).unwrap();
        result.push((key, pos + 4 + space + 1..pos + size - 1));
        pos += size;
    }
    result
}

#[test]
fn tampering_is_detected() {
    let macaroon = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "id-1")
        .add_first_party_caveat(&DefaultCrypto, "user = alice")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", Some("http://third-party"), "discharge-id");
    let discharge = Macaroon::create(&DefaultCrypto, "http://third-party", b"3p-key", "discharge-id");
    let bound = macaroon.prepare_for_request(&DefaultCrypto, &discharge);
    let discharges = [bound];

    assert!(macaroon.verify(&DefaultCrypto, b"root-key", |_| true, &discharges));

    let bytes = macaroon.serialize_binary().unwrap();
    let mut checked = 0;

    for (key, range) in packets(&bytes) {
        if key == "location" || key == "cl" {
            continue;
        }
        for i in range {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;

            let parsed = Macaroon::deserialize_binary(&tampered).unwrap();
            assert!(
                !parsed.verify(&DefaultCrypto, b"root-key", |_| true, &discharges),
                "flipping byte {} of {} went unnoticed", i, key,
            );
            checked += 1;
        }
    }

    // identifier, signature, both cids and the vid.
    assert_eq!(checked, 4 + 32 + 12 + 12 + 30);
}

#[test]
fn location_is_advisory() {
    let macaroon = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "id-1");
    let mut bytes = macaroon.serialize_binary().unwrap();
    bytes[13] = b'b';

    let moved = Macaroon::deserialize_binary(&bytes).unwrap();
    assert_eq!(moved.location(), "buth");
    assert!(moved.verify(&DefaultCrypto, b"root-key", |_| true, &[]));
}

#[test]
fn truncated_macaroon() {
    let macaroon = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "id-1")
        .add_first_party_caveat(&DefaultCrypto, "user = alice");
    let bytes = macaroon.serialize_binary().unwrap();

    let truncated = &bytes[..bytes.len() - 3];
    assert_eq!(
        Macaroon::deserialize_binary(truncated),
        Err(ParseError::new(truncated.len(), ParseErrorKind::NotEnoughData(3)))
    );
}

#[test]
fn round_trip_through_base64() {
    let macaroon = Macaroon::create(&DefaultCrypto, "auth", b"root-key", "id-1")
        .add_first_party_caveat(&DefaultCrypto, "user = alice")
        .add_third_party_caveat(&DefaultCrypto, b"3p-key", Some("http://third-party"), "discharge-id");

    let token = macaroon.serialize().unwrap();
    assert!(!token.contains('='));
    assert!(!token.contains('+'));
    assert!(!token.contains('/'));

    assert_eq!(Macaroon::deserialize(&token).unwrap(), macaroon);
}
