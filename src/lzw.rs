//! Decoder for Unix `compress` (`.Z`) streams.
//!
//! Layout: magic `1f 9d`, a flags byte (low five bits = maximum code width,
//! `0x80` = block mode with CLEAR code 256), then LZW codes packed LSB-first.
//! Codes are written in groups of eight; whenever the width changes (growth or
//! CLEAR) the rest of the current group is padding and must be skipped.

use std::io::{self, Read, Write};

const MAGIC: [u8; 2] = [0x1f, 0x9d];
const BLOCK_MODE: u8 = 0x80;
const BITS_MASK: u8 = 0x1f;
const INIT_BITS: u32 = 9;
const MAX_BITS: u32 = 16;
const CLEAR: u32 = 256;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Rounds `pos` up to the next group boundary of the segment starting at `start`.
fn align(pos: usize, start: usize, n_bits: u32) -> usize {
    let group = (n_bits as usize) * 8;
    let rel = pos - start;
    start + rel.div_ceil(group) * group
}

fn read_code(data: &[u8], pos: usize, n_bits: u32) -> u32 {
    let byte = pos / 8;
    let mut window: u32 = 0;
    for i in 0..3 {
        if let Some(b) = data.get(byte + i) {
            window |= (*b as u32) << (8 * i);
        }
    }
    (window >> (pos % 8)) & ((1 << n_bits) - 1)
}

/// Decodes a whole `.Z` stream from `input` into `out`, returning bytes written.
pub fn decompress<R: Read, W: Write>(mut input: R, mut out: W) -> io::Result<u64> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;

    if raw.len() < 3 {
        return Err(invalid("truncated .Z header"));
    }
    if raw[..2] != MAGIC {
        return Err(invalid("not a .Z stream (bad magic)"));
    }
    let max_bits = (raw[2] & BITS_MASK) as u32;
    let block_mode = raw[2] & BLOCK_MODE != 0;
    if !(INIT_BITS..=MAX_BITS).contains(&max_bits) {
        return Err(invalid(format!("unsupported maximum code width {}", max_bits)));
    }

    let data = &raw[3..];
    let total_bits = data.len() * 8;
    let max_max_code: u32 = 1 << max_bits;

    let mut prefix = vec![0u16; max_max_code as usize];
    let mut suffix = vec![0u8; max_max_code as usize];
    for (i, s) in suffix.iter_mut().enumerate().take(256) {
        *s = i as u8;
    }

    let mut n_bits = INIT_BITS;
    let mut max_code = (1u32 << n_bits) - 1;
    let mut free_ent: u32 = if block_mode { CLEAR + 1 } else { 256 };
    let mut old_code: Option<u32> = None;
    let mut fin_char: u8 = 0;
    let mut pos = 0usize;
    let mut seg_start = 0usize;
    let mut stack: Vec<u8> = Vec::with_capacity(1 << 12);
    let mut written: u64 = 0;

    loop {
        if free_ent > max_code {
            pos = align(pos, seg_start, n_bits);
            seg_start = pos;
            n_bits += 1;
            max_code = if n_bits == max_bits {
                max_max_code
            } else {
                (1 << n_bits) - 1
            };
            continue;
        }
        if pos + n_bits as usize > total_bits {
            break;
        }

        let mut code = read_code(data, pos, n_bits);
        pos += n_bits as usize;

        let Some(prev) = old_code else {
            if code >= 256 {
                return Err(invalid(format!("first code {} is not a literal", code)));
            }
            fin_char = code as u8;
            out.write_all(&[fin_char])?;
            written += 1;
            old_code = Some(code);
            continue;
        };

        if code == CLEAR && block_mode {
            free_ent = CLEAR;
            pos = align(pos, seg_start, n_bits);
            seg_start = pos;
            n_bits = INIT_BITS;
            max_code = (1 << n_bits) - 1;
            continue;
        }

        let in_code = code;
        stack.clear();
        if code >= free_ent {
            if code > free_ent {
                return Err(invalid(format!(
                    "corrupt .Z data: code {} beyond table end {}",
                    code, free_ent
                )));
            }
            stack.push(fin_char);
            code = prev;
        }
        while code >= 256 {
            stack.push(suffix[code as usize]);
            code = prefix[code as usize] as u32;
        }
        fin_char = code as u8;
        stack.push(fin_char);
        stack.reverse();
        out.write_all(&stack)?;
        written += stack.len() as u64;

        if free_ent < max_max_code {
            prefix[free_ent as usize] = prev as u16;
            suffix[free_ent as usize] = fin_char;
            free_ent += 1;
        }
        old_code = Some(in_code);
    }

    // A complete stream ends with less than a byte of padding.
    if total_bits.saturating_sub(pos) >= 8 {
        return Err(invalid(format!(
            "truncated .Z stream: {} bits left after the last code",
            total_bits - pos
        )));
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal `compress -b16` equivalent: block-mode header, no CLEAR codes.
    pub(crate) fn compress(input: &[u8]) -> Vec<u8> {
        let max_bits = MAX_BITS;
        let mut out = vec![MAGIC[0], MAGIC[1], BLOCK_MODE | max_bits as u8];
        let mut bits: Vec<bool> = Vec::new();
        let mut seg_start = 0usize;
        let mut n_bits = INIT_BITS;
        let mut max_code = (1u32 << n_bits) - 1;
        let mut next: u32 = CLEAR + 1;
        let mut dict: HashMap<(u32, u8), u32> = HashMap::new();

        let mut emit = |code: u32, next: u32, bits: &mut Vec<bool>| {
            if next > max_code + 1 && n_bits < max_bits {
                let target = align(bits.len(), seg_start, n_bits);
                bits.resize(target, false);
                seg_start = target;
                n_bits += 1;
                max_code = if n_bits == max_bits { 1 << max_bits } else { (1 << n_bits) - 1 };
            }
            for i in 0..n_bits {
                bits.push((code >> i) & 1 == 1);
            }
        };

        let Some((&first, rest)) = input.split_first() else {
            return out;
        };
        let mut w = first as u32;
        for &c in rest {
            if let Some(&code) = dict.get(&(w, c)) {
                w = code;
                continue;
            }
            emit(w, next, &mut bits);
            if next < 1 << max_bits {
                dict.insert((w, c), next);
                next += 1;
            }
            w = c as u32;
        }
        emit(w, next, &mut bits);

        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (i, b) in chunk.iter().enumerate() {
                if *b {
                    byte |= 1 << i;
                }
            }
            out.push(byte);
        }
        out
    }

    fn roundtrip(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let n = decompress(compress(input).as_slice(), &mut out).unwrap();
        assert_eq!(n as usize, out.len());
        out
    }

    #[test]
    fn short_text() {
        let text = b"TOBEORNOTTOBEORTOBEORNOT#";
        assert_eq!(roundtrip(text), text);
    }

    #[test]
    fn repetitive_input_uses_kwkwk_case() {
        let text = vec![b'a'; 300];
        assert_eq!(roundtrip(&text), text);
    }

    #[test]
    fn code_width_grows_past_nine_bits() {
        // Pseudo-random bytes defeat the dictionary, forcing >256 codes.
        let mut state: u32 = 12345;
        let data: Vec<u8> = (0..6000)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8 % 17 + b'A'
            })
            .collect();
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn hand_packed_stream() {
        // "ab" as two 9-bit literals: 0x61, 0x62.
        let codes: u32 = 0x61 | (0x62 << 9);
        let stream = [0x1f, 0x9d, 0x90, codes as u8, (codes >> 8) as u8, (codes >> 16) as u8];
        let mut out = Vec::new();
        decompress(&stream[..], &mut out).unwrap();
        assert_eq!(out, b"ab");
    }

    #[test]
    fn header_only_is_empty_output() {
        let mut out = Vec::new();
        assert_eq!(decompress(&[0x1f, 0x9d, 0x90][..], &mut out).unwrap(), 0);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut out = Vec::new();
        assert!(decompress(&[0x1f][..], &mut out).is_err());
        assert!(decompress(&[0x1f, 0x8b, 0x08, 0x00][..], &mut out).is_err());
        assert!(decompress(&[0x1f, 0x9d, 0x9f, 0x00][..], &mut out).is_err());
    }

    #[test]
    fn rejects_truncated_stream() {
        let full = compress(b"TOBEORNOTTOBEORTOBEORNOT#");
        assert!(full.len() > 13);
        // 80 data bits: eight 9-bit codes and a dangling byte.
        let mut out = Vec::new();
        let err = decompress(&full[..13], &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("truncated"), "{err}");
    }

    #[test]
    fn rejects_code_beyond_table() {
        // Literal 'a' followed by code 300 while the table ends at 257.
        let codes: u32 = 0x61 | (300 << 9);
        let stream = [0x1f, 0x9d, 0x90, codes as u8, (codes >> 8) as u8, (codes >> 16) as u8];
        let mut out = Vec::new();
        let err = decompress(&stream[..], &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
