/// Credential codec for the `n`/`p` query parameters.
///
/// The client hex-encodes the plaintext, then masks each byte of that hex
/// text with XOR + shift and hex-encodes the result again. Decoding
/// reverses both layers. Anything malformed (odd length, non-hex) decodes
/// to the empty string, which callers reject as a missing field.
const XOR_KEY: u8 = 0x5A;
const SHIFT_VALUE: u8 = 42;

pub fn decode_credential(input: &str) -> String {
    let Ok(masked) = hex::decode(input) else {
        return String::new();
    };
    let inner_hex: Vec<u8> = masked
        .iter()
        .map(|b| b.wrapping_sub(SHIFT_VALUE) ^ XOR_KEY)
        .collect();
    let Ok(plain) = hex::decode(&inner_hex) else {
        return String::new();
    };
    String::from_utf8_lossy(&plain).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// What the client does: hex, mask, hex again.
    fn encode_credential(plain: &str) -> String {
        let inner_hex = hex::encode(plain.as_bytes());
        let masked: Vec<u8> = inner_hex
            .bytes()
            .map(|b| (b ^ XOR_KEY).wrapping_add(SHIFT_VALUE))
            .collect();
        hex::encode(masked)
    }

    #[test]
    fn round_trips_client_encoding() {
        for plain in ["alice", "hunter2", "Ümläut名", ""] {
            assert_eq!(decode_credential(&encode_credential(plain)), plain);
        }
    }

    #[test]
    fn malformed_input_decodes_to_empty() {
        assert_eq!(decode_credential("abc"), ""); // odd length
        assert_eq!(decode_credential("zz"), ""); // not hex
        assert_eq!(decode_credential(""), "");
    }
}
