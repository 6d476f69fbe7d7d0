//! Safepoint table appended after a function's machine code.
//!
//! Layout (little endian): `u32` frame slot count, `u32` entry count, then per
//! entry a `u32` code offset followed by a bitmap with one bit per frame slot
//! holding a reference. The table starts 8-byte aligned.

use thiserror::Error;

const HEADER_SIZE: usize = 8;
const TABLE_ALIGN: usize = 8;
/// `int3`, so stray jumps into the padding trap.
const PADDING_BYTE: u8 = 0xcc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafepointEntry {
    pub pc_offset: u32,
    /// Frame slots holding references at this safepoint.
    pub tagged_slots: Vec<u32>,
}

#[derive(Debug)]
pub struct SafepointTableBuilder {
    frame_slot_count: u32,
    entries: Vec<SafepointEntry>,
}

impl SafepointTableBuilder {
    pub fn new(frame_slot_count: u32) -> Self {
        Self {
            frame_slot_count,
            entries: Vec::new(),
        }
    }

    pub fn define_safepoint(&mut self, pc_offset: u32, tagged_slots: &[u32]) {
        debug_assert!(tagged_slots.iter().all(|&s| s < self.frame_slot_count));
        self.entries.push(SafepointEntry {
            pc_offset,
            tagged_slots: tagged_slots.to_vec(),
        });
    }

    fn bitmap_size(&self) -> usize {
        (self.frame_slot_count as usize).div_ceil(8)
    }

    /// Append the table to `code`, returning its offset.
    pub fn emit(&self, code: &mut Vec<u8>) -> usize {
        let offset = code.len().next_multiple_of(TABLE_ALIGN);
        code.resize(offset, PADDING_BYTE);

        code.extend_from_slice(&self.frame_slot_count.to_le_bytes());
        code.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            code.extend_from_slice(&entry.pc_offset.to_le_bytes());
            let mut bitmap = vec![0u8; self.bitmap_size()];
            for &slot in &entry.tagged_slots {
                bitmap[slot as usize / 8] |= 1 << (slot % 8);
            }
            code.extend_from_slice(&bitmap);
        }
        offset
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("safepoint table truncated at byte {0}")]
pub struct TruncatedTable(pub usize);

/// A decoded safepoint table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafepointTable {
    pub frame_slot_count: u32,
    pub entries: Vec<SafepointEntry>,
}

impl SafepointTable {
    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self, TruncatedTable> {
        let mut pos = offset;
        let read_u32 = |pos: &mut usize| -> Result<u32, TruncatedTable> {
            let chunk = bytes.get(*pos..*pos + 4).ok_or(TruncatedTable(*pos))?;
            *pos += 4;
            Ok(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        };

        let frame_slot_count = read_u32(&mut pos)?;
        let entry_count = read_u32(&mut pos)?;
        let bitmap_size = (frame_slot_count as usize).div_ceil(8);
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let pc_offset = read_u32(&mut pos)?;
            let bitmap = bytes
                .get(pos..pos + bitmap_size)
                .ok_or(TruncatedTable(pos))?;
            pos += bitmap_size;
            let tagged_slots = (0..frame_slot_count)
                .filter(|&slot| bitmap[slot as usize / 8] & (1 << (slot % 8)) != 0)
                .collect();
            entries.push(SafepointEntry {
                pc_offset,
                tagged_slots,
            });
        }
        Ok(Self {
            frame_slot_count,
            entries,
        })
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE + self.entries.len() * (4 + (self.frame_slot_count as usize).div_ceil(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_is_aligned() {
        let mut code = vec![0x90; 13];
        let offset = SafepointTableBuilder::new(10).emit(&mut code);
        assert_eq!(offset, 16);
        assert_eq!(code.len(), 24);
        assert!(code[13..16].iter().all(|&b| b == PADDING_BYTE));

        let table = SafepointTable::parse(&code, offset).unwrap();
        assert_eq!(table.frame_slot_count, 10);
        assert!(table.entries.is_empty());
        assert_eq!(table.size(), HEADER_SIZE);
    }

    #[test]
    fn test_entries_carry_slot_bitmaps() {
        let mut builder = SafepointTableBuilder::new(12);
        builder.define_safepoint(0x20, &[1, 9]);
        builder.define_safepoint(0x40, &[]);
        let mut code = Vec::new();
        let offset = builder.emit(&mut code);
        assert_eq!(offset, 0);

        let table = SafepointTable::parse(&code, offset).unwrap();
        assert_eq!(table.entries[0].tagged_slots, vec![1, 9]);
        assert_eq!(table.entries[1].pc_offset, 0x40);
        assert_eq!(table.size(), code.len());
    }

    #[test]
    fn test_truncated_table() {
        let mut code = Vec::new();
        SafepointTableBuilder::new(4).emit(&mut code);
        assert_eq!(SafepointTable::parse(&code[..6], 0), Err(TruncatedTable(4)));
    }
}
