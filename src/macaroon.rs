use std::fmt;

use rustc_serialize::base64::{self, FromBase64, ToBase64};
use rustc_serialize::hex::ToHex;

use crate::caveat::Caveat;
use crate::chain;
use crate::codec::{self, DeserializeError, ParseError, SerializeError};
use crate::primitives::{constant_time_eq, Crypto};
use crate::verifier::{self, VerifierConfig};


/// A macaroon: a bearer credential whose signature chains over an
/// identifier and an ordered list of caveats.
///
/// Every Macaroon consists of:
///
/// - A `location`, an advisory hint of where the macaroon should be used.
///   It is not covered by the signature.
/// - An `identifier`, which lets the minting service find the root key.
/// - A list of caveats that each *decrease* the level of authorization the
///   macaroon allows. Order matters: the caveats are folded into the
///   signature one after the other.
/// - A `signature`, which is `HMAC(root_key, identifier)` with every caveat
///   folded in.
///
/// Macaroons are immutable. Adding a caveat or binding a discharge returns a
/// new macaroon and leaves the original untouched, so a macaroon can be
/// shared freely across threads.
#[derive(Debug, Clone)]
pub struct Macaroon {
    location: String,
    identifier: Vec<u8>,
    signature: Vec<u8>,
    caveats: Vec<Caveat>,
}

impl Macaroon {
    /// Mint a new macaroon with the given root key.
    pub fn create<C: Crypto>(
        crypto: &C,
        location: impl Into<String>,
        key: &[u8],
        identifier: impl Into<Vec<u8>>,
    ) -> Macaroon {
        let identifier = identifier.into();
        let signature = chain::initial(crypto, key, &identifier);

        Macaroon {
            location: location.into(),
            identifier,
            signature,
            caveats: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        location: String,
        identifier: Vec<u8>,
        signature: Vec<u8>,
        caveats: Vec<Caveat>,
    ) -> Macaroon {
        Macaroon {
            location,
            identifier,
            signature,
            caveats,
        }
    }

    /// Add a caveat checked by the verifying service itself.
    ///
    /// The meaning of `cid` is entirely up to the application; the verifier
    /// hands it to the predicate it was given.
    pub fn add_first_party_caveat<C: Crypto>(&self, crypto: &C, cid: impl Into<Vec<u8>>) -> Macaroon {
        let cid = cid.into();
        let signature = chain::fold_first_party(crypto, &self.signature, &cid);
        self.with_caveat(signature, Caveat::FirstParty { cid })
    }

    /// Add a caveat that must be discharged by a third party.
    ///
    /// `key` is the root key the third party will mint the discharge
    /// macaroon with, and `cid` is the identifier that discharge macaroon
    /// will carry. How the third party learns the key is up to the caller,
    /// typically by encrypting it into `cid` under a key the two share.
    pub fn add_third_party_caveat<C: Crypto>(
        &self,
        crypto: &C,
        key: &[u8],
        location: Option<&str>,
        cid: impl Into<Vec<u8>>,
    ) -> Macaroon {
        let cid = cid.into();
        let vid = chain::encrypt_vid(crypto, &self.signature, key);
        let signature = chain::fold_third_party(crypto, &self.signature, &vid, &cid);

        self.with_caveat(signature, Caveat::ThirdParty {
            cid,
            vid,
            location: location.map(str::to_owned),
        })
    }

    fn with_caveat(&self, signature: Vec<u8>, caveat: Caveat) -> Macaroon {
        let mut caveats = Vec::with_capacity(self.caveats.len() + 1);
        caveats.extend_from_slice(&self.caveats);
        caveats.push(caveat);

        Macaroon {
            location: self.location.clone(),
            identifier: self.identifier.clone(),
            signature,
            caveats,
        }
    }

    /// Bind a discharge macaroon to this (authorizing) macaroon.
    ///
    /// This must be done by the holder before sending the discharge along
    /// with `self`. A bound discharge only verifies against this exact
    /// macaroon, so it cannot be replayed to satisfy another macaroon's
    /// caveat.
    pub fn prepare_for_request<C: Crypto>(&self, crypto: &C, discharge: &Macaroon) -> Macaroon {
        Macaroon {
            location: discharge.location.clone(),
            identifier: discharge.identifier.clone(),
            signature: chain::bind(crypto, &self.signature, &discharge.signature),
            caveats: discharge.caveats.clone(),
        }
    }

    /// Check the signature chain under `key`, every first-party caveat
    /// against `check`, and every third-party caveat against `discharges`.
    ///
    /// The discharges must already have been bound to `self` with
    /// `prepare_for_request`. Uses the default `VerifierConfig`; see
    /// `Verifier` for more control and for the reason a macaroon was
    /// rejected.
    pub fn verify<C, F>(&self, crypto: &C, key: &[u8], check: F, discharges: &[Macaroon]) -> bool
        where C: Crypto,
              F: Fn(&[u8]) -> bool
    {
        let config = VerifierConfig::default();
        verifier::verify_chain(crypto, &config, &check, self, key, discharges).is_ok()
    }

    /// Get the location hint of the macaroon.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Get the identifier of the macaroon.
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    /// Get the *current* signature of the macaroon.
    ///
    /// # Safety
    /// Do not compare this directly with other signatures. Always use a
    /// specially designed constant time comparison function.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Get the *current* caveats of the macaroon.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// The ids of the first-party caveats, in order.
    pub fn first_party_caveats(&self) -> impl Iterator<Item = &[u8]> {
        self.caveats
            .iter()
            .filter(|caveat| caveat.is_first_party())
            .map(Caveat::cid)
    }

    /// The `(location, cid)` of every third-party caveat: the discharge
    /// macaroons that have to be fetched before this macaroon can be used.
    pub fn third_party_caveats(&self) -> impl Iterator<Item = (Option<&str>, &[u8])> {
        self.caveats
            .iter()
            .filter(|caveat| caveat.is_third_party())
            .map(|caveat| (caveat.location(), caveat.cid()))
    }

    /// Serialize into the binary packet format.
    pub fn serialize_binary(&self) -> Result<Vec<u8>, SerializeError> {
        codec::serialize(self)
    }

    /// Serialize into Base64.
    ///
    /// This is the URL safe, unpadded, Base64 encoding of the binary
    /// serialization.
    pub fn serialize(&self) -> Result<String, SerializeError> {
        Ok(self.serialize_binary()?.to_base64(base64::URL_SAFE))
    }

    /// Parse a binary serialized macaroon.
    ///
    /// *Note: This expects a binary serialization rather than base64.*
    pub fn deserialize_binary(input: &[u8]) -> Result<Macaroon, ParseError> {
        codec::deserialize(input).map_err(|err| {
            debug!("Failed to parse macaroon: {}", err);
            err
        })
    }

    /// Parse a Base64 serialized macaroon. Both the standard and the URL
    /// safe alphabets are accepted, with or without padding.
    pub fn deserialize(input: &str) -> Result<Macaroon, DeserializeError> {
        let bytes = input.from_base64()?;
        Ok(Macaroon::deserialize_binary(&bytes)?)
    }

    /// A human readable rendering, one field per line in wire order.
    pub fn inspect(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Macaroon {
    fn eq(&self, other: &Macaroon) -> bool {
        self.location == other.location
            && self.identifier == other.identifier
            && self.caveats == other.caveats
            && constant_time_eq(&self.signature, &other.signature)
    }
}

impl Eq for Macaroon {}

impl fmt::Display for Macaroon {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "location {}", self.location)?;
        writeln!(f, "identifier {}", Printable(&self.identifier))?;
        for caveat in &self.caveats {
            writeln!(f, "cid {}", Printable(caveat.cid()))?;
            if let Caveat::ThirdParty { ref vid, ref location, .. } = *caveat {
                writeln!(f, "vid {}", vid.to_base64(base64::URL_SAFE))?;
                if let Some(ref location) = *location {
                    writeln!(f, "cl {}", location)?;
                }
            }
        }
        write!(f, "signature {}", self.signature.to_hex())
    }
}

/// Shows bytes as text when they are UTF-8 and as hex otherwise.
struct Printable<'a>(&'a [u8]);

impl<'a> fmt::Display for Printable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match ::std::str::from_utf8(self.0) {
            Ok(text) => f.write_str(text),
            Err(_) => write!(f, "0x{}", self.0.to_hex()),
        }
    }
}
