//! REG_SZ payloads: little-endian UTF-16 with one terminating NUL.

/// Decodes string data only when [`encode_utf16`] reproduces it byte for byte.
///
/// Odd lengths, a missing terminator and unpaired surrogates all yield `None`.
pub(crate) fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    let (&0, text) = units.split_last()? else {
        return None;
    };
    String::from_utf16(text).ok()
}

pub(crate) fn encode_utf16(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
