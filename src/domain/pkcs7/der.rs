//! Minimal DER reader and writer for the PKCS#7 structures assembled by hand.
//!
//! Only single-byte tags and definite lengths are supported, which covers
//! everything an Authenticode `SignedData` uses.

use crate::domain::constants::ASN1_OID_TAG;
use crate::infra::error::{PesignError, PesignResult};

/// One decoded tag-length-value element.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Complete encoding including tag and length.
    pub raw: &'a [u8],
    pub contents: &'a [u8],
}

fn malformed(msg: &str) -> PesignError {
    PesignError::MalformedSignature(format!("malformed DER: {msg}"))
}

/// Decode the element at the start of `data`; trailing bytes are ignored.
pub fn read_tlv(data: &[u8]) -> PesignResult<Tlv<'_>> {
    let (&tag, rest) = data.split_first().ok_or_else(|| malformed("empty input"))?;
    if tag & 0x1f == 0x1f {
        return Err(malformed("high tag numbers are not supported"));
    }
    let (&first, rest) = rest.split_first().ok_or_else(|| malformed("missing length"))?;
    let (len, len_octets) = match first {
        n if n < 0x80 => (usize::from(n), 0),
        0x80 => return Err(malformed("indefinite length")),
        n => {
            let count = usize::from(n & 0x7f);
            if count > 4 {
                return Err(malformed("length too large"));
            }
            let octets = rest.get(..count).ok_or_else(|| malformed("truncated length"))?;
            let len = octets.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            (len, count)
        }
    };
    let header_len = 2 + len_octets;
    let end = header_len
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| malformed("element runs past the end of its container"))?;
    Ok(Tlv {
        tag,
        raw: &data[..end],
        contents: &data[header_len..end],
    })
}

/// Iterate the elements concatenated in `contents`.
pub fn children(contents: &[u8]) -> Children<'_> {
    Children { rest: contents }
}

pub struct Children<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Children<'a> {
    type Item = PesignResult<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match read_tlv(self.rest) {
            Ok(tlv) => {
                self.rest = &self.rest[tlv.raw.len()..];
                Some(Ok(tlv))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

/// Encode a DER length.
#[must_use]
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = Vec::with_capacity(1 + bytes.len() - skip);
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Encode a complete element.
#[must_use]
pub fn tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contents.len() + 6);
    out.push(tag);
    out.extend_from_slice(&encode_len(contents.len()));
    out.extend_from_slice(contents);
    out
}

/// Encode an element whose contents are the concatenation of `parts`.
#[must_use]
pub fn tlv_concat(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    tlv(tag, &parts.concat())
}

#[must_use]
pub fn oid(content_octets: &[u8]) -> Vec<u8> {
    tlv(ASN1_OID_TAG, content_octets)
}
