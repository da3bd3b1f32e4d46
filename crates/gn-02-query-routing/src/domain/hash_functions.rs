//! Keyword tokenisation and slot hashing.
//!
//! Both ends of a connection must hash identically, so these functions are
//! fixed by the protocol:
//!
//! 1. lower-case each character and keep its low byte
//! 2. XOR the bytes into a 32-bit word, little-endian, cycling every 4 bytes
//! 3. multiply by `0x4F1BBCDC` and keep the top `bits` bits of the low word

/// Characters that separate keywords in file names and query text.
pub const DELIMITERS: &[char] = &[' ', '-', '.', '_', '+', '/', '*', '(', ')', '\\', ','];

/// Words longer than this also contribute their shortened prefixes.
const PREFIX_MIN_LEN: usize = 4;

const HASH_MULTIPLIER: u32 = 0x4F1B_BCDC;

/// Hash `text` as a single unit into a table of `2^bits` slots.
pub fn hash(text: &str, bits: u8) -> usize {
    hash_fast(fold(text), bits)
}

/// Multiply-shift step of the hash.
pub fn hash_fast(x: u32, bits: u8) -> usize {
    if bits == 0 {
        return 0;
    }
    (x.wrapping_mul(HASH_MULTIPLIER) >> (32 - u32::from(bits.min(32)))) as usize
}

fn fold(text: &str) -> u32 {
    let mut xor = 0u32;
    for (j, c) in text.chars().enumerate() {
        let lower = c.to_lowercase().next().unwrap_or(c);
        let b = (lower as u32) & 0xFF;
        xor ^= b << ((j % 4) * 8);
    }
    xor
}

/// Split `text` into keywords.
pub fn keywords(text: &str) -> Vec<&str> {
    text.split(DELIMITERS).filter(|w| !w.is_empty()).collect()
}

/// Each word, plus for words longer than four characters the word with its
/// last one and last two characters removed.
pub fn with_prefixes(words: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(words.len() * 3);
    for word in words {
        out.push((*word).to_string());
        let len = word.chars().count();
        if len > PREFIX_MIN_LEN {
            out.push(word.chars().take(len - 1).collect());
            out.push(word.chars().take(len - 2).collect());
        }
    }
    out
}
