/// A restriction attached to a macaroon.
///
/// A first-party caveat is a predicate the verifying service checks itself.
/// A third-party caveat can only be satisfied by a discharge macaroon whose
/// identifier is the caveat's `cid`, minted by the party at `location` with
/// the root key encrypted in `vid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caveat {
    FirstParty {
        cid: Vec<u8>,
    },
    ThirdParty {
        cid: Vec<u8>,
        vid: Vec<u8>,
        location: Option<String>,
    },
}

impl Caveat {
    /// The caveat identifier.
    pub fn cid(&self) -> &[u8] {
        match *self {
            Caveat::FirstParty { ref cid } => cid,
            Caveat::ThirdParty { ref cid, .. } => cid,
        }
    }

    /// The encrypted verification id, for third-party caveats.
    pub fn vid(&self) -> Option<&[u8]> {
        match *self {
            Caveat::FirstParty { .. } => None,
            Caveat::ThirdParty { ref vid, .. } => Some(vid),
        }
    }

    /// The advisory location of the discharging party, if any.
    pub fn location(&self) -> Option<&str> {
        match *self {
            Caveat::ThirdParty { location: Some(ref location), .. } => Some(location),
            _ => None,
        }
    }

    pub fn is_first_party(&self) -> bool {
        match *self {
            Caveat::FirstParty { .. } => true,
            Caveat::ThirdParty { .. } => false,
        }
    }

    pub fn is_third_party(&self) -> bool {
        !self.is_first_party()
    }
}
