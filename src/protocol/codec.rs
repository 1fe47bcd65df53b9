//! Text <-> byte conversion for the terminal streams.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until the rest
/// arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut pos = 0;
        while pos < self.pending.len() {
            match std::str::from_utf8(&self.pending[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = self.pending.len();
                }
                Err(err) => {
                    let valid_end = pos + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[pos..valid_end]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos = valid_end + bad;
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            pos = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..pos);
        out
    }

    /// Flush whatever is still buffered; an incomplete tail becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Terminator appended to every outgoing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
    Cr,
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
            LineEnding::None => "",
        }
    }
}

pub fn encode_line(text: &str, ending: LineEnding) -> Bytes {
    let terminator = ending.as_str();
    let mut buf = BytesMut::with_capacity(text.len() + terminator.len());
    buf.put_slice(text.as_bytes());
    buf.put_slice(terminator.as_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut decoder = TextDecoder::new();
        assert_eq!(decoder.decode(b"temp=21.5\r\n"), "temp=21.5\r\n");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn split_multibyte_character_is_carried_over() {
        // "Привет" split in the middle of "и"
        let bytes = "Привет".as_bytes();
        let mut decoder = TextDecoder::new();
        let first = decoder.decode(&bytes[..5]);
        let second = decoder.decode(&bytes[5..]);
        assert_eq!(first, "Пр");
        assert_eq!(second, "ивет");
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = TextDecoder::new();
        assert_eq!(decoder.decode(&[b'o', 0xff, b'k']), "o\u{FFFD}k");
    }

    #[test]
    fn dangling_tail_is_flushed_on_finish() {
        let mut decoder = TextDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xd0]), "a");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn line_endings() {
        assert_eq!(&encode_line("led on", LineEnding::Lf)[..], b"led on\n");
        assert_eq!(&encode_line("led on", LineEnding::CrLf)[..], b"led on\r\n");
        assert_eq!(&encode_line("led on", LineEnding::None)[..], b"led on");
    }
}
