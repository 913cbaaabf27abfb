//! The v1 packet encoding.
//!
//! A serialized macaroon is a sequence of packets. Each packet is four
//! lowercase hex digits giving the packet's total size (header included),
//! then `<key> <value>\n`. Values are raw bytes and are never escaped; the
//! size header is the only framing.
//!
//! Packets come in a fixed order: `location`, `identifier`, `signature`,
//! then for every caveat a `cid`, followed by `vid` and optionally `cl` for
//! third-party caveats.

use std::cmp;
use std::error::Error;
use std::fmt;
use std::str;

use rustc_serialize::base64::FromBase64Error;

use crate::caveat::Caveat;
use crate::macaroon::Macaroon;


/// Length of the hex size header.
pub const HEADER_LEN: usize = 4;

/// The largest packet the size header can describe.
pub const MAX_PACKET_LEN: usize = 0xffff;

const LOCATION: &str = "location";
const IDENTIFIER: &str = "identifier";
const SIGNATURE: &str = "signature";
const CID: &str = "cid";
const VID: &str = "vid";
const CL: &str = "cl";


/// Serialize into the binary packet stream.
pub fn serialize(macaroon: &Macaroon) -> Result<Vec<u8>, SerializeError> {
    let mut result = Vec::new();

    write_packet(&mut result, LOCATION, macaroon.location().as_bytes())?;
    write_packet(&mut result, IDENTIFIER, macaroon.identifier())?;
    write_packet(&mut result, SIGNATURE, macaroon.signature())?;

    for caveat in macaroon.caveats() {
        match *caveat {
            Caveat::FirstParty { ref cid } => {
                write_packet(&mut result, CID, cid)?;
            }
            Caveat::ThirdParty { ref cid, ref vid, ref location } => {
                write_packet(&mut result, CID, cid)?;
                write_packet(&mut result, VID, vid)?;
                if let Some(ref location) = *location {
                    write_packet(&mut result, CL, location.as_bytes())?;
                }
            }
        }
    }

    Ok(result)
}

fn write_packet(out: &mut Vec<u8>, key: &'static str, value: &[u8]) -> Result<(), SerializeError> {
    let size = HEADER_LEN + key.len() + 1 + value.len() + 1;
    if size > MAX_PACKET_LEN {
        return Err(SerializeError::PacketTooLarge(key, size));
    }

    out.extend_from_slice(format!("{:04x}", size).as_bytes());
    out.extend_from_slice(key.as_bytes());
    out.push(b' ');
    out.extend_from_slice(value);
    out.push(b'\n');

    Ok(())
}


/// Parse a binary packet stream.
///
/// Nothing is returned unless the whole input is a well formed macaroon.
/// The signature is *not* checked; that is the verifier's job.
pub fn deserialize(input: &[u8]) -> Result<Macaroon, ParseError> {
    let mut parser = Parser::new(input);

    let mut packet = parser.expect_packet()?;

    let location = if packet.key == LOCATION.as_bytes() {
        let location = packet.utf8_value()?;
        packet = parser.expect_packet()?;
        location
    } else {
        String::new()
    };

    if packet.key != IDENTIFIER.as_bytes() {
        return Err(packet.unexpected());
    }
    let identifier = packet.value.to_vec();

    let packet = parser.expect_packet()?;
    if packet.key != SIGNATURE.as_bytes() {
        return Err(packet.unexpected());
    }
    let signature = packet.value.to_vec();

    let mut caveats = Vec::new();
    while let Some(packet) = parser.next_packet()? {
        if packet.key != CID.as_bytes() {
            return Err(packet.unexpected());
        }
        let cid = packet.value.to_vec();

        match parser.next_packet()? {
            Some(ref packet) if packet.key == VID.as_bytes() => {
                let vid = packet.value.to_vec();

                let location = match parser.next_packet()? {
                    Some(ref packet) if packet.key == CL.as_bytes() => {
                        Some(packet.utf8_value()?)
                    }
                    other => {
                        parser.push_back(other);
                        None
                    }
                };

                caveats.push(Caveat::ThirdParty { cid, vid, location });
            }
            other => {
                parser.push_back(other);
                caveats.push(Caveat::FirstParty { cid });
            }
        }
    }

    Ok(Macaroon::from_parts(location, identifier, signature, caveats))
}


struct Packet<'a> {
    key: &'a [u8],
    value: &'a [u8],
    key_pos: usize,
    value_pos: usize,
}

impl<'a> Packet<'a> {
    fn unexpected(&self) -> ParseError {
        ParseError::new(
            self.key_pos,
            ParseErrorKind::UnexpectedPacketId(String::from_utf8_lossy(self.key).into_owned()),
        )
    }

    fn utf8_value(&self) -> Result<String, ParseError> {
        str::from_utf8(self.value)
            .map(str::to_owned)
            .map_err(|_| ParseError::new(self.value_pos, ParseErrorKind::InvalidUtf8))
    }
}


struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    pushed_back: Option<Packet<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Parser<'a> {
        Parser {
            input,
            pos: 0,
            pushed_back: None,
        }
    }

    fn push_back(&mut self, packet: Option<Packet<'a>>) {
        self.pushed_back = packet;
    }

    /// Like `next_packet`, but running out of input is an error.
    fn expect_packet(&mut self) -> Result<Packet<'a>, ParseError> {
        match self.next_packet()? {
            Some(packet) => Ok(packet),
            None => Err(ParseError::new(
                self.input.len(),
                ParseErrorKind::NotEnoughData(HEADER_LEN),
            )),
        }
    }

    fn next_packet(&mut self) -> Result<Option<Packet<'a>>, ParseError> {
        if let Some(packet) = self.pushed_back.take() {
            return Ok(Some(packet));
        }

        let input = self.input;
        let start = self.pos;
        if start == input.len() {
            return Ok(None);
        }

        let remaining = input.len() - start;
        if remaining < HEADER_LEN {
            return Err(ParseError::new(
                input.len(),
                ParseErrorKind::NotEnoughData(HEADER_LEN - remaining),
            ));
        }

        let mut size = 0;
        for (i, &c) in input[start..start + HEADER_LEN].iter().enumerate() {
            let digit = match (c as char).to_digit(16) {
                Some(digit) => digit as usize,
                None => {
                    return Err(ParseError::new(
                        start + i,
                        ParseErrorKind::UnexpectedChar(c, Expected::HexDigit),
                    ))
                }
            };
            size = size * 16 + digit;
        }

        // A declared size smaller than the header leaves an empty body,
        // which then fails the search for the key delimiter.
        let end = start + cmp::max(size, HEADER_LEN);
        if end > input.len() {
            return Err(ParseError::new(
                input.len(),
                ParseErrorKind::NotEnoughData(end - input.len()),
            ));
        }

        let key_pos = start + HEADER_LEN;
        let body = &input[key_pos..end];

        let space = match body.iter().position(|&c| c == b' ') {
            Some(space) => space,
            None => return Err(ParseError::new(end, ParseErrorKind::CharacterNotFound(b' '))),
        };

        let value_pos = key_pos + space + 1;
        if value_pos == end || input[end - 1] != b'\n' {
            return Err(ParseError::new(end, ParseErrorKind::CharacterNotFound(b'\n')));
        }

        self.pos = end;

        Ok(Some(Packet {
            key: &body[..space],
            value: &input[value_pos..end - 1],
            key_pos,
            value_pos,
        }))
    }
}


/// What the parser wanted to see instead of an unexpected character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    HexDigit,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Expected::HexDigit => write!(f, "a hex digit"),
        }
    }
}


quick_error! {
    /// The reason a packet stream failed to parse.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ParseErrorKind {
        /// A size digit was not hexadecimal.
        UnexpectedChar(got: u8, expected: Expected) {
            display("unexpected character {:?}, expected {}", *got as char, expected)
        }

        /// The input ended this many bytes before the current packet did.
        NotEnoughData(needed: usize) {
            display("not enough data, {} more bytes needed", needed)
        }

        /// A packet key that is unknown or not allowed at this point.
        UnexpectedPacketId(key: String) {
            display("unexpected packet {:?}", key)
        }

        /// A delimiter was missing before the end of the packet.
        CharacterNotFound(c: u8) {
            display("character {:?} not found", *c as char)
        }

        /// A location was not valid UTF-8.
        InvalidUtf8 {
            display("location is not valid UTF-8")
        }
    }
}


/// A parse failure and the byte offset into the input it was detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(position: usize, kind: ParseErrorKind) -> ParseError {
        ParseError { position, kind }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at byte {}", self.kind, self.position)
    }
}

impl Error for ParseError {}


quick_error! {
    /// An error returned when a macaroon cannot be represented in packets.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SerializeError {
        /// A field is too large for the four digit size header.
        PacketTooLarge(key: &'static str, size: usize) {
            display("{} packet of {} bytes exceeds the maximum packet size", key, size)
        }
    }
}


quick_error! {
    /// An error returned when we failed to decode a base64 macaroon.
    #[derive(Debug)]
    pub enum DeserializeError {
        /// The input was not base64.
        Base64(err: FromBase64Error) {
            from()
            source(err)
            display("invalid base64: {}", err)
        }

        /// The decoded bytes were not a valid packet stream.
        Parse(err: ParseError) {
            from()
            source(err)
            display("invalid macaroon: {}", err)
        }
    }
}
