use crate::caveat::Caveat;
use crate::chain;
use crate::macaroon::Macaroon;
use crate::primitives::{constant_time_eq, Crypto};


/// How deeply discharge macaroons may nest by default.
pub const DEFAULT_MAX_DEPTH: usize = 16;


/// Whether a discharge macaroon may satisfy more than one third-party
/// caveat within a single verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DischargePolicy {
    /// Every supplied discharge satisfies at most one caveat. Two caveats
    /// with the same id need two discharges.
    Strict,
    /// A discharge may satisfy any number of caveats with its id, but is
    /// never used inside its own verification.
    Permissive,
}

impl Default for DischargePolicy {
    fn default() -> DischargePolicy {
        DischargePolicy::Strict
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierConfig {
    /// The deepest chain of discharges-of-discharges that is accepted. The
    /// authorizing macaroon is at depth zero, so zero forbids third-party
    /// caveats altogether.
    pub max_depth: usize,
    pub discharge_policy: DischargePolicy,
}

impl Default for VerifierConfig {
    fn default() -> VerifierConfig {
        VerifierConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            discharge_policy: DischargePolicy::default(),
        }
    }
}


/// Checks macaroons against a set of accepted first-party caveats.
///
/// A first-party caveat holds if it was registered with `satisfy_exact`, or
/// if any predicate registered with `satisfy_general` accepts it. The same
/// rules apply to the caveats of discharge macaroons.
pub struct Verifier<'a, C: Crypto> {
    crypto: &'a C,
    config: VerifierConfig,
    exact: Vec<Vec<u8>>,
    general: Vec<Box<dyn Fn(&[u8]) -> bool + 'a>>,
}

impl<'a, C: Crypto> Verifier<'a, C> {
    pub fn new(crypto: &'a C) -> Verifier<'a, C> {
        Verifier::with_config(crypto, VerifierConfig::default())
    }

    pub fn with_config(crypto: &'a C, config: VerifierConfig) -> Verifier<'a, C> {
        Verifier {
            crypto,
            config,
            exact: Vec::new(),
            general: Vec::new(),
        }
    }

    /// Accept a first-party caveat whose id is exactly `cid`.
    pub fn satisfy_exact(&mut self, cid: impl Into<Vec<u8>>) -> &mut Self {
        self.exact.push(cid.into());
        self
    }

    /// Accept every first-party caveat for which `predicate` returns true.
    pub fn satisfy_general<F>(&mut self, predicate: F) -> &mut Self
        where F: Fn(&[u8]) -> bool + 'a
    {
        self.general.push(Box::new(predicate));
        self
    }

    fn check(&self, cid: &[u8]) -> bool {
        self.exact.iter().any(|exact| exact.as_slice() == cid)
            || self.general.iter().any(|predicate| predicate(cid))
    }

    pub fn verify(&self, macaroon: &Macaroon, key: &[u8], discharges: &[Macaroon]) -> bool {
        self.verify_detailed(macaroon, key, discharges).is_ok()
    }

    /// Like `verify`, but says why the macaroon was rejected.
    ///
    /// The reason is meant for the verifying service's own logs. Handing it
    /// back to the presenter of the macaroon tells them which part of a
    /// forgery to work on.
    pub fn verify_detailed(
        &self,
        macaroon: &Macaroon,
        key: &[u8],
        discharges: &[Macaroon],
    ) -> Result<(), VerifyError> {
        let check = |cid: &[u8]| self.check(cid);
        verify_chain(self.crypto, &self.config, &check, macaroon, key, discharges)
    }
}


/// Verify `macaroon` and, recursively, the discharges its third-party
/// caveats need. The reuse and depth bookkeeping lives for this one call.
pub(crate) fn verify_chain<C: Crypto>(
    crypto: &C,
    config: &VerifierConfig,
    check: &dyn Fn(&[u8]) -> bool,
    macaroon: &Macaroon,
    key: &[u8],
    discharges: &[Macaroon],
) -> Result<(), VerifyError> {
    let mut session = Session {
        crypto,
        config,
        check,
        discharges,
        authorizing: macaroon.signature(),
        used: vec![false; discharges.len()],
        active: Vec::new(),
        attempts: attempt_budget(macaroon, discharges),
    };

    let result = session.verify(macaroon, key, 0);
    if let Err(ref err) = result {
        debug!("Rejected macaroon: {}", err);
    }
    result
}


/// How many discharge verifications one call may start: one per
/// third-party caveat in sight, for every supplied discharge. Retrying
/// candidates that share an id would otherwise grow with the number of ways
/// to order them.
fn attempt_budget(macaroon: &Macaroon, discharges: &[Macaroon]) -> usize {
    let caveats: usize = std::iter::once(macaroon)
        .chain(discharges)
        .map(|m| m.third_party_caveats().count())
        .sum();
    caveats.saturating_add(1).saturating_mul(discharges.len().max(1))
}


struct Session<'a, C: Crypto> {
    crypto: &'a C,
    config: &'a VerifierConfig,
    check: &'a dyn Fn(&[u8]) -> bool,
    discharges: &'a [Macaroon],
    /// The declared signature of the top level macaroon, which every
    /// discharge, however deeply nested, is bound to.
    authorizing: &'a [u8],
    /// Discharges consumed so far, by index into `discharges`.
    used: Vec<bool>,
    /// Discharges whose verification is in progress.
    active: Vec<usize>,
    /// Discharge verifications left before giving up.
    attempts: usize,
}

impl<'a, C: Crypto> Session<'a, C> {
    fn verify(&mut self, macaroon: &Macaroon, key: &[u8], depth: usize) -> Result<(), VerifyError> {
        let crypto = self.crypto;
        let mut signature = chain::initial(crypto, key, macaroon.identifier());

        for caveat in macaroon.caveats() {
            signature = match *caveat {
                Caveat::FirstParty { ref cid } => {
                    if !(self.check)(cid.as_slice()) {
                        return Err(VerifyError::CaveatNotSatisfied(cid.clone()));
                    }
                    chain::fold_first_party(crypto, &signature, cid)
                }
                Caveat::ThirdParty { ref cid, ref vid, .. } => {
                    self.discharge(cid, vid, &signature, depth)?;
                    chain::fold_third_party(crypto, &signature, vid, cid)
                }
            };
        }

        let expected = if depth == 0 {
            signature
        } else {
            chain::bind(crypto, self.authorizing, &signature)
        };

        if constant_time_eq(&expected, macaroon.signature()) {
            Ok(())
        } else {
            Err(VerifyError::SignatureMismatch)
        }
    }

    /// Find and verify a discharge for the third-party caveat `cid` met at
    /// `signature`.
    fn discharge(&mut self, cid: &[u8], vid: &[u8], signature: &[u8], depth: usize) -> Result<(), VerifyError> {
        let depth = depth + 1;
        if depth > self.config.max_depth {
            return Err(VerifyError::TooDeep(depth));
        }

        let key = chain::decrypt_vid(self.crypto, signature, vid)
            .map_err(|_| VerifyError::DecryptionFailed)?;

        let discharges = self.discharges;
        let mut failure = VerifyError::DischargeNotFound(cid.to_vec());

        for (index, discharge) in discharges.iter().enumerate() {
            if discharge.identifier() != cid {
                continue;
            }
            if self.active.contains(&index) {
                failure = VerifyError::DischargeCycle(cid.to_vec());
                continue;
            }
            if self.used[index] && self.config.discharge_policy == DischargePolicy::Strict {
                failure = VerifyError::DischargeReused(cid.to_vec());
                continue;
            }

            if self.attempts == 0 {
                return Err(VerifyError::TooManyAttempts);
            }
            self.attempts -= 1;

            trace!("Trying discharge {} for depth {}", index, depth);

            // A candidate that fails must not keep anything it consumed.
            let used = self.used.clone();
            self.used[index] = true;
            self.active.push(index);

            let result = self.verify(discharge, &key, depth);
            self.active.pop();

            match result {
                Ok(()) => return Ok(()),
                Err(VerifyError::TooManyAttempts) => return Err(VerifyError::TooManyAttempts),
                Err(err) => {
                    trace!("Discharge {} rejected: {}", index, err);
                    self.used = used;
                    failure = err;
                }
            }
        }

        Err(failure)
    }
}


quick_error! {
    /// Why a macaroon failed verification.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum VerifyError {
        /// The recomputed signature chain does not match.
        SignatureMismatch {
            display("signature mismatch")
        }

        /// The check rejected a first-party caveat.
        CaveatNotSatisfied(cid: Vec<u8>) {
            display("caveat {:?} not satisfied", String::from_utf8_lossy(cid))
        }

        /// No discharge macaroon has the third-party caveat's id.
        DischargeNotFound(cid: Vec<u8>) {
            display("no discharge for caveat {:?}", String::from_utf8_lossy(cid))
        }

        /// The verification id could not be decrypted.
        DecryptionFailed {
            display("verification id could not be decrypted")
        }

        /// The only matching discharges were already used.
        DischargeReused(cid: Vec<u8>) {
            display("discharge for caveat {:?} already used", String::from_utf8_lossy(cid))
        }

        /// The only matching discharges are being verified further up.
        DischargeCycle(cid: Vec<u8>) {
            display("discharge for caveat {:?} discharges itself", String::from_utf8_lossy(cid))
        }

        /// Discharges are nested deeper than `max_depth`.
        TooDeep(depth: usize) {
            display("discharges nested {} deep", depth)
        }

        /// Too many candidate discharges were tried and rejected.
        TooManyAttempts {
            display("gave up trying discharges")
        }
    }
}
