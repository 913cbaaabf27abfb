//! Macaroons: bearer credentials that can be attenuated by anyone holding
//! them, and that can delegate parts of an authorization decision to third
//! parties.
//!
//! A macaroon is minted from a secret root key and an identifier. Holders
//! add caveats to narrow what it grants; each caveat is folded into an HMAC
//! chain so it cannot be removed again. First-party caveats are checked by
//! the verifying service. Third-party caveats name a *discharge macaroon*
//! that some other service has to mint, and which the holder binds to the
//! authorizing macaroon before presenting both.
//!
//! ```
//! use macaroons::{DefaultCrypto, Macaroon, Verifier};
//!
//! let crypto = DefaultCrypto;
//!
//! let macaroon = Macaroon::create(&crypto, "auth", b"root-key", "id-1")
//!     .add_first_party_caveat(&crypto, "user = alice")
//!     .add_third_party_caveat(&crypto, b"3p-key", Some("http://third-party"), "discharge-id");
//!
//! // The third party mints the discharge with the key it was given.
//! let discharge = Macaroon::create(&crypto, "http://third-party", b"3p-key", "discharge-id");
//! let bound = macaroon.prepare_for_request(&crypto, &discharge);
//!
//! let token = macaroon.serialize().unwrap();
//! let received = Macaroon::deserialize(&token).unwrap();
//!
//! let mut verifier = Verifier::new(&crypto);
//! verifier.satisfy_exact("user = alice");
//! assert!(verifier.verify(&received, b"root-key", &[bound]));
//! ```

extern crate crypto;
extern crate rustc_serialize;
#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;

mod caveat;
pub mod chain;
mod codec;
mod macaroon;
mod primitives;
mod verifier;

pub use crate::caveat::Caveat;
pub use crate::codec::{
    DeserializeError, Expected, ParseError, ParseErrorKind, SerializeError, HEADER_LEN,
    MAX_PACKET_LEN,
};
pub use crate::macaroon::Macaroon;
pub use crate::primitives::{constant_time_eq, Crypto, CryptoError, DefaultCrypto};
pub use crate::verifier::{
    DischargePolicy, Verifier, VerifierConfig, VerifyError, DEFAULT_MAX_DEPTH,
};
