//! The signature chain.
//!
//! A macaroon's signature starts as `HMAC(root_key, identifier)` and every
//! caveat is folded in by using the current signature as the key for the
//! next HMAC. Knowing a signature lets you extend the chain but never walk
//! it backwards.

use crate::primitives::{Crypto, CryptoError};


/// The signature of a macaroon with no caveats.
pub fn initial<C: Crypto>(crypto: &C, root_key: &[u8], identifier: &[u8]) -> Vec<u8> {
    crypto.hmac(root_key, identifier)
}

/// Fold a first-party caveat into the chain.
pub fn fold_first_party<C: Crypto>(crypto: &C, signature: &[u8], cid: &[u8]) -> Vec<u8> {
    crypto.hmac(signature, cid)
}

/// Fold a third-party caveat into the chain.
///
/// Both the verification id and the caveat id go into the HMAC, so neither
/// can be swapped without invalidating every later signature.
pub fn fold_third_party<C: Crypto>(
    crypto: &C,
    signature: &[u8],
    vid: &[u8],
    cid: &[u8],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(vid.len() + cid.len());
    message.extend_from_slice(vid);
    message.extend_from_slice(cid);
    crypto.hmac(signature, &message)
}

/// Bind a discharge macaroon's signature to the authorizing macaroon's.
pub fn bind<C: Crypto>(crypto: &C, authorizing: &[u8], discharge: &[u8]) -> Vec<u8> {
    let zero = vec![0; C::BLOCK_SIZE];
    let key = crypto.hmac(&zero, authorizing);
    crypto.hmac(&key, discharge)
}

/// The key a third-party caveat's discharge root key is encrypted under,
/// derived from the chain signature at the point the caveat is added.
pub fn encryption_key<C: Crypto>(crypto: &C, signature: &[u8]) -> Vec<u8> {
    let mut key = crypto.hash(signature);
    key.resize(C::KEY_SIZE, 0);
    key
}

/// Encrypt a discharge root key into a verification id.
pub fn encrypt_vid<C: Crypto>(crypto: &C, signature: &[u8], root_key: &[u8]) -> Vec<u8> {
    crypto.encrypt(&encryption_key(crypto, signature), root_key)
}

/// Recover the discharge root key from a verification id.
pub fn decrypt_vid<C: Crypto>(
    crypto: &C,
    signature: &[u8],
    vid: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    crypto.decrypt(&encryption_key(crypto, signature), vid)
}
