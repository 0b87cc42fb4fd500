//! Advertisement frame codec.
//!
//! Sensors put a two byte header at the start of their manufacturer data,
//! followed by a payload whose meaning depends on the header. Data frames
//! carry a temperature as a 16-bit sign/magnitude fixed-point value.

use std::fmt;

use thiserror::Error;

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 2;

/// Size of an encoded temperature reading in bytes.
pub const READING_SIZE: usize = 2;

const SIGN_BIT: u8 = 0b1000_0000;
const FRACTION_SCALE: f32 = 256.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("frame too short: need {} header bytes, got {len}", HEADER_SIZE)]
    TooShort { len: usize },

    #[error("unknown frame header 0x{0:04x}")]
    UnknownHeader(u16),

    #[error("reading payload too short: need {} bytes, got {len}", READING_SIZE)]
    TruncatedReading { len: usize },

    #[error("reading {0} cannot be represented in 1/256 fixed point")]
    ReadingOutOfRange(f32),
}

/// What a sensor is asking for with its advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Header {
    Registration = 0x0001,
    Deletion = 0x0002,
    Data = 0x0003,
}

impl Header {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Header::Registration),
            0x0002 => Some(Header::Deletion),
            0x0003 => Some(Header::Data),
            _ => None,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        (self as u16).to_le_bytes()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Header::Registration => write!(f, "REGISTRATION"),
            Header::Deletion => write!(f, "DELETION"),
            Header::Data => write!(f, "DATA"),
        }
    }
}

/// A decoded frame borrowing its payload from the advertisement buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Interprets the payload of a data frame as a temperature reading.
    pub fn reading(&self) -> Result<f32, ProtocolError> {
        match self.payload {
            [msb, lsb, ..] => Ok(decode_reading(*msb, *lsb)),
            short => Err(ProtocolError::TruncatedReading { len: short.len() }),
        }
    }
}

/// Splits `buffer` into its header and the trailing payload view.
pub fn decode(buffer: &[u8]) -> Result<Frame<'_>, ProtocolError> {
    let (header, payload) = match buffer {
        [lo, hi, payload @ ..] => (u16::from_le_bytes([*lo, *hi]), payload),
        _ => return Err(ProtocolError::TooShort { len: buffer.len() }),
    };
    let header = Header::from_u16(header).ok_or(ProtocolError::UnknownHeader(header))?;
    Ok(Frame { header, payload })
}

pub fn encode(header: Header, payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(payload);
    buffer
}

/// Decodes a sign bit + 7-bit integer magnitude (`msb`) and a fractional
/// byte (`lsb`) into a temperature.
pub fn decode_reading(msb: u8, lsb: u8) -> f32 {
    let magnitude = f32::from(msb & !SIGN_BIT) + f32::from(lsb) / FRACTION_SCALE;
    if msb & SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Inverse of [`decode_reading`], truncating to 1/256 resolution.
pub fn encode_reading(value: f32) -> Result<[u8; READING_SIZE], ProtocolError> {
    let magnitude = value.abs();
    if !magnitude.is_finite() || magnitude >= 128.0 {
        return Err(ProtocolError::ReadingOutOfRange(value));
    }

    let integer = magnitude.trunc();
    let fraction = ((magnitude - integer) * FRACTION_SCALE).floor();
    let mut msb = integer as u8;
    if value < 0.0 {
        msb |= SIGN_BIT;
    }
    Ok([msb, fraction as u8])
}
