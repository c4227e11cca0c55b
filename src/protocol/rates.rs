//! Sample-rate table
//!
//! The header carries a 5-bit index into this table. The order is part of
//! the wire format and must not change.

use crate::error::ProtocolError;

/// Supported sample rates in Hz, indexed by rate code
pub const SAMPLE_RATES: [u32; 21] = [
    6000, 12000, 24000, 48000, 96000, 192000, 384000, //
    8000, 16000, 32000, 64000, 128000, 256000, 512000, //
    11025, 22050, 44100, 88200, 176400, 352800, 705600,
];

/// Mask selecting the rate code in the packed rate/sub-protocol byte
pub const RATE_CODE_MASK: u8 = 0x1f;

/// Look up the code for an exact sample rate
pub fn rate_code(rate_hz: u32) -> Result<u8, ProtocolError> {
    SAMPLE_RATES
        .iter()
        .position(|&r| r == rate_hz)
        .map(|i| i as u8)
        .ok_or(ProtocolError::UnsupportedRate(rate_hz))
}

/// Look up the sample rate for a code
pub fn rate_value(code: u8) -> Result<u32, ProtocolError> {
    SAMPLE_RATES
        .get(code as usize)
        .copied()
        .ok_or(ProtocolError::UnsupportedRateCode(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(rate_code(48000), Ok(3));
        assert_eq!(rate_code(44100), Ok(16));
        assert_eq!(rate_code(705600), Ok(20));
        assert_eq!(rate_value(3), Ok(48000));
        assert_eq!(rate_value(9), Ok(32000));
    }

    #[test]
    fn test_exact_match_required() {
        assert_eq!(rate_code(48001), Err(ProtocolError::UnsupportedRate(48001)));
        assert_eq!(rate_code(0), Err(ProtocolError::UnsupportedRate(0)));
    }

    #[test]
    fn test_code_out_of_table() {
        assert_eq!(rate_value(21), Err(ProtocolError::UnsupportedRateCode(21)));
        assert_eq!(rate_value(31), Err(ProtocolError::UnsupportedRateCode(31)));
    }

    #[test]
    fn test_table_is_bijective() {
        for (code, &rate) in SAMPLE_RATES.iter().enumerate() {
            assert_eq!(rate_code(rate), Ok(code as u8));
            assert_eq!(rate_value(code as u8), Ok(rate));
        }
    }
}
