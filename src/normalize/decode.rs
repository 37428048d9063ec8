// src/normalize/decode.rs

use encoding_rs::{Encoding, UTF_8};
use std::{borrow::Cow, path::Path};

use crate::error::EtlError;

/// Decode a whole file honoring its byte-order marker (UTF-8 or UTF-16),
/// UTF-8 otherwise. Malformed sequences are fatal for the file rather than
/// silently replaced.
pub fn decode_text(bytes: &[u8], path: &Path) -> Result<String, EtlError> {
    let (encoding, bom_len) = Encoding::for_bom(bytes).unwrap_or((UTF_8, 0));
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .map(Cow::into_owned)
        .ok_or_else(|| EtlError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        })
}
