//! `ByteArrayRLE` escape encoding.
//!
//! Runs of two or more `0x00` or `0xFF` bytes are replaced by a two-character
//! escape instead of their hex representation: the first character is `?`
//! for a `0x00` run or `!` for a `0xFF` run; the second character's ASCII
//! value, minus `!` plus one, is the run length. A single escape can
//! describe a run at most `'~' - '!'` = 93 bytes long (second character up
//! to `'}'`, never `'~'`); longer runs are split into consecutive escapes.

use crate::error::{decode_failed, PluginError};

const STREAM_START: u8 = b'!';
const MAX_RUN: usize = (b'~' - b'!') as usize; // 93
const ZERO_MARKER: u8 = b'?';
const FF_MARKER: u8 = b'!';

/// Encodes `data` as lowercase hex, replacing runs of `0x00`/`0xFF` of
/// length >= 2 with run-length escapes.
pub fn rle_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == 0x00 || b == 0xff {
            let mut run = 1;
            while i + run < data.len() && data[i + run] == b {
                run += 1;
            }
            if run >= 2 {
                let marker = if b == 0x00 { ZERO_MARKER } else { FF_MARKER };
                let mut remaining = run;
                while remaining > 0 {
                    let chunk = remaining.min(MAX_RUN);
                    out.push(marker as char);
                    out.push((STREAM_START + (chunk - 1) as u8) as char);
                    remaining -= chunk;
                }
                i += run;
                continue;
            }
        }
        out.push_str(&format!("{:02x}", b));
        i += 1;
    }
    out
}

/// Decodes the form produced by [`rle_encode`].
pub fn rle_decode(s: &str) -> Result<Vec<u8>, PluginError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == ZERO_MARKER || c == FF_MARKER {
            if i + 1 >= bytes.len() {
                return Err(decode_failed("truncated RLE escape"));
            }
            let len_byte = bytes[i + 1];
            if len_byte < STREAM_START || len_byte > STREAM_START + (MAX_RUN as u8 - 1) {
                return Err(decode_failed("invalid RLE run length byte"));
            }
            let run = (len_byte - STREAM_START) as usize + 1;
            let fill = if c == ZERO_MARKER { 0x00 } else { 0xff };
            out.extend(std::iter::repeat(fill).take(run));
            i += 2;
        } else {
            if i + 1 >= bytes.len() {
                return Err(decode_failed("truncated hex byte in RLE data"));
            }
            let hex = std::str::from_utf8(&bytes[i..i + 2])
                .map_err(|e| decode_failed(format!("invalid hex in RLE data: {}", e)))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|e| decode_failed(format!("invalid hex byte '{}': {}", hex, e)))?;
            out.push(byte);
            i += 2;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_bytes() {
        let data = vec![0x01, 0x02, 0xab, 0xcd];
        let encoded = rle_encode(&data);
        assert_eq!(encoded, "0102abcd");
        assert_eq!(rle_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn encodes_short_zero_run_as_escape() {
        let data = vec![0x00, 0x00];
        assert_eq!(rle_encode(&data), "?\"");
        assert_eq!(rle_decode("?\"").unwrap(), data);
    }

    #[test]
    fn leaves_single_zero_unescaped() {
        let data = vec![0x00];
        assert_eq!(rle_encode(&data), "00");
    }

    #[test]
    fn splits_run_over_93_bytes() {
        let data = vec![0xffu8; 94];
        let encoded = rle_encode(&data);
        // 93 + 1: two escapes, chunk lengths 93 ('}') then 1 ('!')
        assert_eq!(encoded, "!}!!");
        assert_eq!(rle_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn run_of_exactly_93_is_one_escape() {
        let data = vec![0x00u8; 93];
        let encoded = rle_encode(&data);
        assert_eq!(encoded.len(), 2);
        assert_eq!(rle_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn run_of_185_splits_into_two_escapes() {
        let data = vec![0xffu8; 185];
        let encoded = rle_encode(&data);
        // ceil(185 / 93) == 2
        assert_eq!(encoded.len(), 4);
        assert_eq!(rle_decode(&encoded).unwrap(), data);
    }
}
