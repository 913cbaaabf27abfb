use crypto::aead::{AeadDecryptor, AeadEncryptor};
use crypto::chacha20poly1305::ChaCha20Poly1305;
use crypto::digest::Digest;
use crypto::hmac::Hmac;
use crypto::mac::{Mac, MacResult};
use crypto::sha2::Sha256;


/// The cryptographic operations a macaroon implementation is built on.
///
/// The chain, binding and discharge protocols only ever call these four
/// functions, so any backend satisfying the contracts below can be plugged
/// in:
///
/// - `hmac` and `hash` must be deterministic and return a fixed-length
///   output.
/// - `encrypt` / `decrypt` must form an authenticated pair: `decrypt` has to
///   fail when the ciphertext was not produced by `encrypt` under the same
///   key.
/// - All four must return equal outputs for equal inputs.
pub trait Crypto {
    /// Length of the all-zero key used when binding discharge macaroons.
    /// This is the block size of the underlying hash.
    const BLOCK_SIZE: usize;

    /// Length of the keys accepted by `encrypt` and `decrypt`.
    const KEY_SIZE: usize;

    fn hmac(&self, key: &[u8], message: &[u8]) -> Vec<u8>;

    fn hash(&self, message: &[u8]) -> Vec<u8>;

    fn encrypt(&self, key: &[u8], message: &[u8]) -> Vec<u8>;

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}


/// Length of the synthetic nonce prepended to ciphertexts.
const NONCE_LEN: usize = 8;

/// Length of the Poly1305 tag appended to ciphertexts.
const TAG_LEN: usize = 16;


/// HMAC-SHA256, SHA-256 and ChaCha20-Poly1305.
///
/// Encryption is deterministic: the nonce is the first eight bytes of
/// `HMAC(key, plaintext)`, and is checked again after decryption. The output
/// layout is `nonce || ciphertext || tag`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCrypto;

impl Crypto for DefaultCrypto {
    const BLOCK_SIZE: usize = 64;
    const KEY_SIZE: usize = 32;

    fn hmac(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::new(Sha256::new(), key);
        mac.input(message);
        mac.result().code().to_vec()
    }

    fn hash(&self, message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.input(message);
        let mut out = vec![0; hasher.output_bytes()];
        hasher.result(&mut out);
        out
    }

    fn encrypt(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let nonce = self.synthetic_nonce(key, message);

        let mut cipher = ChaCha20Poly1305::new(&self.sized_key(key), &nonce, &[]);
        let mut body = vec![0; message.len()];
        let mut tag = [0; TAG_LEN];
        cipher.encrypt(message, &mut body, &mut tag);

        let mut result = Vec::with_capacity(NONCE_LEN + body.len() + TAG_LEN);
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&body);
        result.extend_from_slice(&tag);
        result
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::CiphertextTooShort(ciphertext.len()));
        }

        let (nonce, rest) = ciphertext.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut cipher = ChaCha20Poly1305::new(&self.sized_key(key), nonce, &[]);
        let mut plaintext = vec![0; body.len()];
        if !cipher.decrypt(body, &mut plaintext, tag) {
            return Err(CryptoError::AuthenticationFailed);
        }

        // The nonce is derived from the plaintext, so it has to match too.
        let expected = self.synthetic_nonce(key, &plaintext);
        if MacResult::new(&expected) != MacResult::new(nonce) {
            return Err(CryptoError::AuthenticationFailed);
        }

        Ok(plaintext)
    }
}

impl DefaultCrypto {
    fn synthetic_nonce(&self, key: &[u8], message: &[u8]) -> [u8; NONCE_LEN] {
        let mut nonce = [0; NONCE_LEN];
        nonce.copy_from_slice(&self.hmac(key, message)[..NONCE_LEN]);
        nonce
    }

    /// ChaCha20 panics on a key of the wrong length, so anything else gets
    /// hashed down to 32 bytes first.
    fn sized_key(&self, key: &[u8]) -> Vec<u8> {
        if key.len() == Self::KEY_SIZE {
            key.to_vec()
        } else {
            self.hash(key)
        }
    }
}


/// Compare two MACs in constant time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    MacResult::new(a) == MacResult::new(b)
}


quick_error! {
    /// An error returned by a backend's `decrypt`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CryptoError {
        /// The ciphertext cannot even hold a nonce and a tag.
        CiphertextTooShort(len: usize) {
            display("ciphertext of {} bytes is too short", len)
        }

        /// The ciphertext was tampered with or encrypted under another key.
        AuthenticationFailed {
            display("ciphertext failed authentication")
        }
    }
}
