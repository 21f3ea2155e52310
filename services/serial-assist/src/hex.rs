//! Hex text helpers for the console
//!
//! The session core only ever sees final byte sequences; converting typed
//! hex text happens here, before a send request is issued.

/// Parse whitespace-separated hex text into bytes.
///
/// All whitespace, Unicode included, is ignored. The remaining text must be
/// an even number of hex digits, otherwise nothing is returned.
pub fn parse_hex(input: &str) -> Vec<u8> {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.len() % 2 != 0 {
        return Vec::new();
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(high), Some(low)) => bytes.push((high << 4) | low),
            _ => return Vec::new(),
        }
    }
    bytes
}

/// Render bytes as uppercase hex pairs separated by single spaces
pub fn to_hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

fn hex_value(digit: char) -> Option<u8> {
    digit.to_digit(16).and_then(|value| u8::try_from(value).ok())
}
