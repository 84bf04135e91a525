//! Base64 transport encoding of request and response payloads.
//!
//! Encoding is standard padded Base64. Decoding is lenient: characters
//! outside the Base64 alphabet (line breaks, spaces, stray markup) are
//! skipped and the trailing `=` padding is optional.
//!
//! # Example
//!
//! ```
//! use tame_ads::payload::{decode_base64, encode_base64};
//!
//! assert_eq!(encode_base64(&[0x01, 0x02, 0x03, 0x04]), "AQIDBA==");
//! assert_eq!(decode_base64("AQID\r\nBA==").unwrap(), vec![1, 2, 3, 4]);
//! assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
//! ```

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::{Result, TameError};

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encodes bytes as padded Base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 text, skipping characters outside the alphabet.
///
/// # Errors
///
/// Returns `TameError::Decode` if the remaining characters do not form a
/// valid Base64 sequence.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/'))
        .collect();
    LENIENT
        .decode(cleaned)
        .map_err(|e| TameError::decode(format!("invalid Base64 payload: {e}")))
}
