//! 4-bit patch entry packing.

/// Pack pairs of signed deltas into one byte each, high nibble first.
///
/// An odd trailing entry is dropped; table sizes are powers of two.
pub(crate) fn halve(entries: &[i8]) -> Vec<u8> {
    entries
        .chunks_exact(2)
        .map(|pair| ((pair[0] as u8) << 4) | (pair[1] as u8 & 0x0F))
        .collect()
}

/// Expand packed nibbles back into signed deltas.
pub(crate) fn unhalve(packed: &[u8]) -> Vec<i8> {
    let mut out = Vec::with_capacity(packed.len() * 2);
    for &byte in packed {
        out.push((byte as i8) >> 4);
        out.push(extend_nibble(byte & 0x0F));
    }
    out
}

fn extend_nibble(nibble: u8) -> i8 {
    if nibble & 0x08 != 0 {
        (nibble | 0xF0) as i8
    } else {
        nibble as i8
    }
}
