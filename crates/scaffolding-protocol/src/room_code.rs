//! Room codes: the user-facing session identifier.
//!
//! A room code looks like `U/7K2M-QX4P-0RZA-HN3D`: a `U/` prefix followed
//! by 16 symbols from a 34-character alphabet (digits and uppercase
//! letters without `I` and `O`), in four groups of four.
//!
//! Read as a base-34 number (most significant symbol first), the 16
//! symbols are always divisible by 7. That single checksum catches most
//! typos before a code reaches the network.
//!
//! The code also carries the overlay credentials: the first 9 characters
//! after the prefix (`7K2M-QX4P`) name the mesh network and the last 9
//! (`0RZA-HN3D`) are its secret. Because of that, a [`RoomCode`] value can
//! only be obtained through validation.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::ProtocolError;

/// The 34 symbols, in digit order.
pub const ALPHABET: &[u8; 34] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

const BASE: u32 = 34;
const MODULUS: u32 = 7;
const SYMBOLS: usize = 16;
const PREFIX: &str = "U/";
/// `U/` + 16 symbols + 3 hyphens.
const CODE_LEN: usize = 21;
const NETWORK_NAME_PREFIX: &str = "scaffolding-mc-";

/// A validated room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Generates a fresh random room code.
    ///
    /// The first 15 symbols are uniform. The last one is drawn uniformly
    /// from the 4–5 symbols that make the checksum come out to zero, so
    /// it is not biased toward small digits.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut digits = [0u8; SYMBOLS];

        let mut partial = 0;
        for d in digits.iter_mut().take(SYMBOLS - 1) {
            *d = rng.random_range(0..BASE) as u8;
            partial = (partial * BASE + u32::from(*d)) % MODULUS;
        }

        // (partial * 34 + last) % 7 == 0  =>  last ≡ -(partial * 34) (mod 7)
        let residue = (MODULUS - (partial * BASE) % MODULUS) % MODULUS;
        let candidates = (residue..BASE).step_by(MODULUS as usize).count() as u32;
        let last = residue + MODULUS * rng.random_range(0..candidates);
        digits[SYMBOLS - 1] = last as u8;

        Self(render(&digits))
    }

    /// Returns `true` if `code` has the exact `U/XXXX-XXXX-XXXX-XXXX`
    /// shape, uses only alphabet symbols, and passes the checksum.
    pub fn is_valid(code: &str) -> bool {
        parse_digits(code).is_some_and(|digits| checksum(&digits) == 0)
    }

    /// Validates `code` and wraps it.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidRoomCode`] if [`is_valid`](Self::is_valid)
    /// rejects it.
    pub fn parse(code: &str) -> Result<Self, ProtocolError> {
        if Self::is_valid(code) {
            Ok(Self(code.to_owned()))
        } else {
            Err(ProtocolError::InvalidRoomCode(code.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The mesh network name: `scaffolding-mc-` + first 9 body characters.
    pub fn network_name(&self) -> String {
        format!("{NETWORK_NAME_PREFIX}{}", &self.body()[..9])
    }

    /// The mesh network secret: last 9 body characters.
    pub fn network_secret(&self) -> &str {
        let body = self.body();
        &body[body.len() - 9..]
    }

    /// The code without its `U/` prefix.
    fn body(&self) -> &str {
        &self.0[PREFIX.len()..]
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn digit_of(symbol: u8) -> Option<u8> {
    ALPHABET.iter().position(|&s| s == symbol).map(|i| i as u8)
}

/// Checks the shape and maps the 16 symbols to digits.
fn parse_digits(code: &str) -> Option<[u8; SYMBOLS]> {
    let bytes = code.as_bytes();
    if bytes.len() != CODE_LEN || !code.starts_with(PREFIX) {
        return None;
    }

    let mut digits = [0u8; SYMBOLS];
    let mut next = 0;
    for (i, &b) in bytes[PREFIX.len()..].iter().enumerate() {
        // Hyphens sit at body offsets 4, 9 and 14.
        if i % 5 == 4 {
            if b != b'-' {
                return None;
            }
            continue;
        }
        digits[next] = digit_of(b)?;
        next += 1;
    }
    Some(digits)
}

/// Base-34 value of `digits` modulo 7, most significant first.
fn checksum(digits: &[u8]) -> u32 {
    digits
        .iter()
        .fold(0, |acc, &d| (acc * BASE + u32::from(d)) % MODULUS)
}

fn render(digits: &[u8; SYMBOLS]) -> String {
    let mut code = String::with_capacity(CODE_LEN);
    code.push_str(PREFIX);
    for (i, &d) in digits.iter().enumerate() {
        if i > 0 && i % 4 == 0 {
            code.push('-');
        }
        code.push(char::from(ALPHABET[usize::from(d)]));
    }
    code
}
