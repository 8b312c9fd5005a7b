//! Delta-encoded VLQ source map: maps code offsets to source byte ranges.
//!
//! Each entry is 3 VLQ values:
//! - `delta_pc` (unsigned VLQ)
//! - `delta_start` (signed, zigzag + VLQ)
//! - `len` (unsigned VLQ)

/// Accumulates source map entries during compilation.
///
/// Entries may arrive in any order (function bodies are emitted into their
/// own blocks and only receive final offsets at layout time); they are
/// sorted by code offset in [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    entries: Vec<(u32, u32, u32)>, // (pc, start, len)
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that code from `pc` onward comes from `start..start + len`.
    pub fn add(&mut self, pc: u32, start: u32, len: u32) {
        self.entries.push((pc, start, len));
    }

    pub fn finish(mut self) -> SourceMap {
        // stable: among entries for one pc the innermost (last marked) wins
        self.entries.sort_by_key(|&(pc, _, _)| pc);

        let mut encoded = Vec::with_capacity(self.entries.len() * 3);
        let mut prev_pc: u32 = 0;
        let mut prev_start: i64 = 0;

        for &(pc, start, len) in &self.entries {
            encode_unsigned_vlq(pc - prev_pc, &mut encoded);
            encode_unsigned_vlq(zigzag_encode(start as i64 - prev_start), &mut encoded);
            encode_unsigned_vlq(len, &mut encoded);

            prev_pc = pc;
            prev_start = start as i64;
        }

        SourceMap { encoded }
    }
}

/// Finished, compact source map of one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    encoded: Vec<u8>,
}

impl SourceMap {
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// The `(start, len)` source range of the last entry with
    /// `pc <= target_pc`.
    pub fn lookup(&self, target_pc: u32) -> Option<(u32, u32)> {
        let encoded = &self.encoded;
        let mut pos = 0;
        let mut pc: u32 = 0;
        let mut start: i64 = 0;
        let mut best = None;

        while pos < encoded.len() {
            let delta_pc = decode_unsigned_vlq(encoded, &mut pos)?;
            let delta_start =
                zigzag_decode(decode_unsigned_vlq(encoded, &mut pos)?);
            let len = decode_unsigned_vlq(encoded, &mut pos)?;

            pc += delta_pc;
            start += delta_start;

            if pc > target_pc {
                break;
            }
            best = Some((start as u32, len));
        }

        best
    }
}

// ── VLQ helpers ─────────────────────────────────────────────────────

/// 7 data bits per byte, MSB set on every byte but the last.
fn encode_unsigned_vlq(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn decode_unsigned_vlq(encoded: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *encoded.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
}

fn zigzag_encode(value: i64) -> u32 {
    ((value << 1) ^ (value >> 63)) as u32
}

fn zigzag_decode(value: u32) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_has_no_entries() {
        let map = SourceMapBuilder::new().finish();
        assert!(map.is_empty());
        assert_eq!(map.lookup(0), None);
    }

    #[test]
    fn lookup_picks_last_entry_before_pc() {
        let mut builder = SourceMapBuilder::new();
        builder.add(0, 0, 5);
        builder.add(12, 10, 5);
        builder.add(28, 20, 10);
        let map = builder.finish();

        assert_eq!(map.lookup(0), Some((0, 5)));
        assert_eq!(map.lookup(11), Some((0, 5)));
        assert_eq!(map.lookup(12), Some((10, 5)));
        assert_eq!(map.lookup(27), Some((10, 5)));
        assert_eq!(map.lookup(1000), Some((20, 10)));
    }

    #[test]
    fn unsorted_entries_are_ordered_by_pc() {
        // function bodies are laid out after the top level but marked first
        let mut builder = SourceMapBuilder::new();
        builder.add(40, 100, 3);
        builder.add(0, 0, 4);
        builder.add(8, 6, 2);
        let map = builder.finish();

        assert_eq!(map.lookup(4), Some((0, 4)));
        assert_eq!(map.lookup(9), Some((6, 2)));
        assert_eq!(map.lookup(44), Some((100, 3)));
    }

    #[test]
    fn innermost_mark_at_same_pc_wins() {
        let mut builder = SourceMapBuilder::new();
        builder.add(4, 0, 20);
        builder.add(4, 7, 3);
        let map = builder.finish();
        assert_eq!(map.lookup(4), Some((7, 3)));
    }

    #[test]
    fn zigzag_handles_backwards_starts() {
        for v in [-1000, -1, 0, 1, 1000, i32::MAX as i64, i32::MIN as i64] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}
