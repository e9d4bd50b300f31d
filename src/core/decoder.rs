//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! Network chunks do not respect character boundaries, so a multi-byte
//! character may arrive split across two (or more) reads. [`TextDecoder`]
//! keeps the incomplete tail of each chunk and prepends it to the next one,
//! which means every fragment it emits is complete, displayable text.

/// Stateful byte-to-text decoder.
///
/// Concatenating every fragment returned by [`TextDecoder::decode`] followed
/// by [`TextDecoder::flush`] yields the same text as decoding the whole byte
/// sequence at once. Invalid sequences become U+FFFD, exactly as a lossy
/// one-shot decode would render them.
#[derive(Debug, Default, Clone)]
pub struct TextDecoder {
    carry: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back from the previous chunk because they form the start of
    /// a character that has not fully arrived yet. Never longer than three.
    pub fn carried(&self) -> &[u8] {
        &self.carry
    }

    /// Decode the next chunk, returning every complete character available.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(chunk);

        let mut decoded = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    decoded.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + invalid_len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the input.
                            self.carry = rest[valid_up_to..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        decoded
    }

    /// Decode whatever is still carried once the body has ended.
    ///
    /// A truncated trailing character is rendered as U+FFFD rather than
    /// waiting for bytes that will never arrive. Returns an empty string when
    /// nothing is carried.
    pub fn flush(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let carry = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&carry).into_owned()
    }
}
