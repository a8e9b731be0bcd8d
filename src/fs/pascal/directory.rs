//! ### Pascal directory structures
//!
//! The directory is one packed run of 26-byte records beginning in block 2.
//! Record 0 is the volume header, the rest are file entries.  Records are
//! allowed to straddle a block boundary, so the whole span is handled as a
//! single buffer rather than block by block.

use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;
use super::types::{ENTRY_SIZE,BLOCK_SIZE};

#[derive(DiskStruct)]
pub struct VolHeader {
    pub begin_block: [u8;2],
    pub end_block: [u8;2],
    pub file_type: [u8;2], // always 0
    pub name_len: u8, // max 7
    pub name: [u8;7],
    pub total_blocks: [u8;2],
    pub num_files: [u8;2],
    pub last_access_date: [u8;2],
    pub last_set_date: [u8;2],
    pub pad: [u8;4]
}

#[derive(DiskStruct,Copy,Clone)]
pub struct FileEntry {
    pub begin_block: [u8;2],
    pub end_block: [u8;2],
    pub file_type: [u8;2],
    pub name_len: u8, // max 15
    pub name: [u8;15],
    pub bytes_remaining: [u8;2],
    pub mod_date: [u8;2]
}

impl FileEntry {
    /// Block span as (begin,end), end exclusive.
    pub fn span(&self) -> (usize,usize) {
        (u16::from_le_bytes(self.begin_block) as usize,
            u16::from_le_bytes(self.end_block) as usize)
    }
    /// Does this slot describe a file, i.e., is the span sane.
    pub fn is_live(&self,total_blocks: usize) -> bool {
        let (beg,end) = self.span();
        beg > 0 && end > beg && end <= total_blocks
    }
    pub fn blocks(&self) -> usize {
        let (beg,end) = self.span();
        end - beg
    }
    /// Byte count, the last block is only partly used.
    pub fn eof(&self) -> usize {
        self.blocks()*BLOCK_SIZE - u16::from_le_bytes(self.bytes_remaining) as usize
    }
}

pub struct Directory {
    pub header: VolHeader,
    pub entries: Vec<FileEntry>
}

impl Directory {
    /// Parse the full directory span.  The slot count follows from the
    /// buffer length, whether or not the slots are in use.
    pub fn from_span(buf: &[u8]) -> Result<Self,DiskStructError> {
        if buf.len() < ENTRY_SIZE {
            return Err(DiskStructError::OutOfData);
        }
        let header = VolHeader::from_bytes(&buf[0..ENTRY_SIZE])?;
        let slots = buf.len()/ENTRY_SIZE - 1;
        let mut entries = Vec::new();
        for slot in 1..slots+1 {
            entries.push(FileEntry::from_bytes(&buf[slot*ENTRY_SIZE..(slot+1)*ENTRY_SIZE])?);
        }
        Ok(Self { header, entries })
    }
    /// Flatten for writing, trailing bytes of the span are not included.
    pub fn to_span(&self) -> Vec<u8> {
        let mut ans = self.header.to_bytes();
        for entry in &self.entries {
            ans.append(&mut entry.to_bytes());
        }
        ans
    }
    pub fn total_blocks(&self) -> usize {
        u16::from_le_bytes(self.header.total_blocks) as usize
    }
    /// First block beyond the directory itself.
    pub fn end_block(&self) -> usize {
        u16::from_le_bytes(self.header.end_block) as usize
    }
    pub fn file_count(&self) -> usize {
        u16::from_le_bytes(self.header.num_files) as usize
    }
    pub fn set_file_count(&mut self,count: usize) {
        self.header.num_files = u16::to_le_bytes(count as u16);
    }
    /// Block usage map, true means free.  There is no bitmap on disk; free
    /// space is whatever no file span claims, beyond the directory span.
    pub fn allocation(&self) -> Vec<bool> {
        let total = self.total_blocks();
        let mut free = vec![true;total];
        for block in 0..self.end_block().min(total) {
            free[block] = false;
        }
        for slot in 0..self.file_count().min(self.entries.len()) {
            let (beg,end) = self.entries[slot].span();
            for block in beg..end.min(total) {
                free[block] = false;
            }
        }
        free
    }
    /// First fit search for `num` contiguous free blocks.
    pub fn find_free_span(&self,num: usize) -> Option<usize> {
        let mut run = 0;
        for (block,is_free) in self.allocation().iter().enumerate() {
            match is_free {
                true => {
                    run += 1;
                    if run==num {
                        return Some(block+1-num);
                    }
                },
                false => run = 0
            }
        }
        None
    }
}
