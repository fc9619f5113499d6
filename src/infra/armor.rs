//! PEM armor for exported signatures and imported signature files.

use pem::{EncodeConfig, LineEnding, Pem};

use crate::infra::error::{PesignError, PesignResult};

pub const PKCS7_LABEL: &str = "PKCS7";

/// Armor `der` as a PEM block with Unix line endings.
#[must_use]
pub fn encode(label: &str, der: &[u8]) -> String {
    let block = Pem {
        tag: label.to_string(),
        contents: der.to_vec(),
    };
    pem::encode_config(
        &block,
        EncodeConfig {
            line_ending: LineEnding::LF,
        },
    )
}

/// Strip armor if present. Returns `None` for input that is not armored.
pub fn decode(bytes: &[u8]) -> PesignResult<Option<Vec<u8>>> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Ok(None);
    };
    if !text.trim_start().starts_with("-----BEGIN ") {
        return Ok(None);
    }
    pem::parse(text)
        .map(|block| Some(block.contents))
        .map_err(|e| PesignError::MalformedSignature(format!("invalid PEM armor: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_64_columns() {
        let der = vec![0x42u8; 100];
        let text = encode(PKCS7_LABEL, &der);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "-----BEGIN PKCS7-----");
        assert_eq!(lines[1].len(), 64);
        assert_eq!(*lines.last().unwrap(), "-----END PKCS7-----");
        assert!(!text.contains('\r'));
        assert_eq!(decode(text.as_bytes()).unwrap(), Some(der));
    }

    #[test]
    fn binary_input_is_not_armor() {
        assert_eq!(decode(&[0x30, 0x82, 0x01]).unwrap(), None);
    }

    #[test]
    fn corrupt_armor_is_an_error() {
        let text = "-----BEGIN PKCS7-----\n@@@@\n-----END PKCS7-----\n";
        assert!(decode(text.as_bytes()).is_err());
    }
}
