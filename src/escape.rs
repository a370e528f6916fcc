//! String escaping.
//!
//! Although filenames in Linux are commonly represented as UTF-8
//! sequences, there is no system requirement that this be the case.  As a
//! consequence, this means that it is possible for filenames in Linux to
//! not be valid UTF-8, and therefore not representable as strings.
//!
//! To prevent encoding problems, as well as to allow certain characters,
//! such as space, to separate tokens in the sure file format, we escape
//! some bytes in strings by replacing them with "=xx" where "xx" is the
//! lower-cased hex version of the byte.  The range of valid characters is
//! fairly straightforward, including all of the printable characters from
//! '!' to '~' except for the '=', which is always escaped.  This means,
//! for example, that a 2-byte encoded UTF-8 sequence will expand to take
//! up to 6 bytes.

use std::fmt;
use std::io::Write;

pub trait Escape {
    fn escaped(&self) -> String;
}

pub trait Unescape {
    fn unescape(&self) -> Result<Vec<u8>, EscapeError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeError {
    /// The input contained a '=' escape with an invalid hex character.
    InvalidHexCharacter,
    /// The input contained a '=' escape with insufficient following
    /// characters.
    InvalidHexLength,
}

impl std::error::Error for EscapeError {}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            EscapeError::InvalidHexCharacter => "invalid hex character",
            EscapeError::InvalidHexLength => "invalid length following '='",
        };
        f.write_str(msg)
    }
}

/// A byte is emitted literally iff it is a printable, non-space graphic
/// character other than `=`.
fn needs_escape(ch: u8) -> bool {
    !(b'!'..=b'~').contains(&ch) || ch == b'='
}

impl Escape for [u8] {
    fn escaped(&self) -> String {
        let mut result = Vec::with_capacity(self.len());
        for &ch in self.iter() {
            if needs_escape(ch) {
                write!(&mut result, "={:02x}", ch).unwrap();
            } else {
                result.push(ch);
            }
        }

        String::from_utf8(result).expect("escaped output is always ASCII")
    }
}

impl Unescape for str {
    fn unescape(&self) -> Result<Vec<u8>, EscapeError> {
        // Will overestimate.
        let mut buf = Vec::with_capacity(self.len());
        let mut phase = 0;
        let mut tmp = 0u8;

        for byte in self.bytes() {
            if phase == 0 {
                if byte == b'=' {
                    phase = 1;
                } else {
                    buf.push(byte);
                }
            } else {
                tmp <<= 4;
                match byte {
                    b'0'..=b'9' => tmp |= byte - b'0',
                    b'a'..=b'f' => tmp |= byte - b'a' + 10,
                    _ => return Err(EscapeError::InvalidHexCharacter),
                }
                phase += 1;
                if phase == 3 {
                    buf.push(tmp);
                    phase = 0;
                    tmp = 0;
                }
            }
        }

        if phase != 0 {
            return Err(EscapeError::InvalidHexLength);
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!("=00".unescape(), Ok(vec![0]));
        assert_eq!("=00=0".unescape(), Err(EscapeError::InvalidHexLength));
        assert_eq!("=00=".unescape(), Err(EscapeError::InvalidHexLength));
        assert_eq!("=4g".unescape(), Err(EscapeError::InvalidHexCharacter));
    }

    #[test]
    fn test_uppercase_hex_rejected() {
        // Only lowercase escapes are produced (and accepted); surefiles are
        // byte-exact across implementations, so uppercase input is foreign.
        assert_eq!("=4A".unescape(), Err(EscapeError::InvalidHexCharacter));
    }

    #[test]
    fn test_escape() {
        let buf: Vec<u8> = (0u32..256).map(|i| i as u8).collect();
        let text = (&buf[..]).escaped();
        assert_eq!(text.unescape().unwrap(), buf);
    }

    #[test]
    fn test_space_and_equals_always_escaped() {
        assert_eq!(b" ".escaped(), "=20");
        assert_eq!(b"=".escaped(), "=3d");
    }

    #[test]
    fn test_round_trip_no_unescaped_delimiters() {
        let buf: Vec<u8> = b"hello world=value\n\t".to_vec();
        let text = buf.escaped();
        assert!(!text.contains(' '));
        assert!(!text.contains('='));
        assert_eq!(text.unescape().unwrap(), buf);
    }
}
