//! ### CP/M directory structures
//!
//! The directory is a packed run of 32-byte slots starting in block 0 of the
//! user area.  On a CP/M 2.2 disk every live slot is a file extent, which
//! carries a piece of the file's block list.  There is no separate index or
//! bitmap; everything follows from scanning the extents.

use super::types::*;
use crate::bios::dpb::DiskParameterBlock;

use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;

use log::warn;

/// One slot's worth of a file.  A file bigger than the extent capacity,
/// 16384 * (EXM+1) bytes, takes several extents.  The 16K subdivisions are
/// "logical extents," and extents are indexed by counting them.
#[derive(DiskStruct,Copy,Clone,PartialEq)]
pub struct Extent {
    /// 0-15 marks a file extent, 0xe5 an unused or deleted slot
    pub user: u8,
    /// positive ASCII, high bits are attribute flags
    pub name: [u8;8],
    /// positive ASCII, high bits are read-only, system, unused
    pub typ: [u8;3],
    /// bits 0-4 of the index, which counts logical extents
    idx_low: u8,
    /// bytes in the last record, 0 means full; always 0 until CP/M v3
    last_bytes: u8,
    /// bits 5-10 of the index
    idx_high: u8,
    /// 128-byte records used in the last logical extent
    last_records: u8,
    /// block pointers, 8-bit when DSM < 256, 16-bit otherwise
    pub block_list: [u8;16]
}

impl Extent {
    /// Set the low 7 bits from `base` and `typ`, keeping the flag bits.
    pub fn set_name(&mut self,base: [u8;8],typ: [u8;3]) {
        for i in 0..8 {
            self.name[i] = (base[i] & 0x7f) | (self.name[i] & 0x80);
        }
        for i in 0..3 {
            self.typ[i] = (typ[i] & 0x7f) | (self.typ[i] & 0x80);
        }
    }
    /// Set the flag bits, keeping the name bits.
    pub fn set_flags(&mut self,flags: &[u8;11]) {
        for i in 0..8 {
            self.name[i] = (flags[i] & 0x80) | (self.name[i] & 0x7f);
        }
        for i in 0..3 {
            self.typ[i] = (flags[i+8] & 0x80) | (self.typ[i] & 0x7f);
        }
    }
    /// The 11 flag bits, each either 0x80 or 0.
    pub fn flags(&self) -> [u8;11] {
        let mut ans = [0;11];
        for i in 0..8 {
            ans[i] = self.name[i] & 0x80;
        }
        for i in 0..3 {
            ans[i+8] = self.typ[i] & 0x80;
        }
        ans
    }
    /// All 11 name bytes with flag bits included.
    pub fn raw_name(&self) -> [u8;11] {
        let mut ans = [0;11];
        ans[0..8].copy_from_slice(&self.name);
        ans[8..11].copy_from_slice(&self.typ);
        ans
    }
    /// Does the low-bit name match.
    pub fn named(&self,base: [u8;8],typ: [u8;3]) -> bool {
        (0..8).all(|i| self.name[i] & 0x7f == base[i]) &&
        (0..3).all(|i| self.typ[i] & 0x7f == typ[i])
    }
    /// Extent index: logical extents through this extent, minus 1.
    /// For the last extent only used logical extents count.
    pub fn index(&self) -> usize {
        (self.idx_low & 0b11111) as usize | ((self.idx_high as usize) << 5)
    }
    pub fn set_index(&mut self,idx: usize) {
        self.idx_low = (idx & 0b11111) as u8;
        self.idx_high = ((idx >> 5) & 0b111111) as u8;
    }
    /// Bytes in the file through this extent, *assuming* it is the last one.
    /// Resolution is one record on a CP/M 2.2 disk, where `last_bytes` is 0.
    pub fn eof(&self) -> usize {
        let bytes = match self.last_bytes {
            0 => RECORD_SIZE,
            b => b as usize
        };
        self.index()*LOGICAL_EXTENT_SIZE + match self.last_records as usize {
            0 => 0,
            rc if rc < 0x80 => (rc-1)*RECORD_SIZE + bytes,
            _ => 0x7f*RECORD_SIZE + bytes
        }
    }
    /// Store the record count for `x_bytes` of data in this extent alone.
    /// Must be run for every extent of the file.
    pub fn set_eof(&mut self,x_bytes: usize) {
        let records = (x_bytes + RECORD_SIZE - 1)/RECORD_SIZE;
        let recs_per_lx = LOGICAL_EXTENT_SIZE/RECORD_SIZE;
        self.last_records = match records % recs_per_lx {
            0 if records > 0 => recs_per_lx as u8,
            rc => rc as u8
        };
        self.last_bytes = 0;
    }
    /// Store a block pointer at `slot` within logical extent `lx`.
    /// Both counts restart at 0 with each new (logical) extent.
    pub fn set_block(&mut self,slot: usize,lx: usize,iblock: u16,dpb: &DiskParameterBlock) {
        let lx_per_x = dpb.exm as usize + 1;
        match dpb.ptr_size() {
            1 => self.block_list[lx*16/lx_per_x + slot] = iblock as u8,
            2 => self.block_list[2*(lx*8/lx_per_x + slot)..2*(lx*8/lx_per_x + slot)+2]
                .copy_from_slice(&u16::to_le_bytes(iblock)),
            _ => panic!("invalid block pointer size")
        }
    }
    /// The block pointers widened to u16.  Pointers are relative to the
    /// reserved track offset in the DPB.
    pub fn block_list(&self,dpb: &DiskParameterBlock) -> Vec<u16> {
        match dpb.ptr_size() {
            1 => self.block_list.iter().map(|b| *b as u16).collect(),
            2 => self.block_list.chunks_exact(2).map(|b| u16::from_le_bytes([b[0],b[1]])).collect(),
            _ => panic!("invalid block pointer size")
        }
    }
}

/// Classification of a 32-byte directory slot.  CP/M 2.2 has only file
/// extents; labels and date stamps from later versions read as foreign.
#[derive(PartialEq)]
pub enum SlotStatus {
    File,
    Free,
    Foreign
}

/// A packed sequence of 32-byte slots, in memory as raw bytes.
pub struct Directory {
    slots: Vec<[u8;DIR_ENTRY_SIZE]>
}

impl Directory {
    pub fn parse(buf: &[u8]) -> Result<Self,DiskStructError> {
        if buf.len() % DIR_ENTRY_SIZE != 0 {
            warn!("directory buffer wrong size");
        }
        let mut slots = Vec::new();
        for raw in buf.chunks_exact(DIR_ENTRY_SIZE) {
            match raw.try_into() {
                Ok(slot) => slots.push(slot),
                Err(_) => return Err(DiskStructError::OutOfData)
            }
        }
        Ok(Self { slots })
    }
    pub fn flatten(&self) -> Vec<u8> {
        self.slots.concat()
    }
    /// number of slots, used or not
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }
    pub fn status(&self,slot: usize) -> SlotStatus {
        match self.slots[slot][0] {
            u if u < USER_END => SlotStatus::File,
            u if u == DELETED => SlotStatus::Free,
            _ => SlotStatus::Foreign
        }
    }
    /// the extent in `slot`, or None if the slot holds no file
    pub fn extent(&self,slot: usize) -> Option<Extent> {
        match self.status(slot) {
            SlotStatus::File => Extent::from_bytes(&self.slots[slot]).ok(),
            _ => None
        }
    }
    pub fn put_extent(&mut self,slot: usize,fx: &Extent) {
        self.slots[slot] = fx.to_bytes().try_into().expect("unexpected size");
    }
    pub fn free_slot(&self) -> Option<usize> {
        (0..self.num_slots()).find(|s| self.status(*s)==SlotStatus::Free)
    }
    pub fn free_slot_count(&self) -> usize {
        (0..self.num_slots()).filter(|s| self.status(*s)==SlotStatus::Free).count()
    }
    /// All slots holding extents of the named file, sorted by extent index.
    /// None if there is no live extent at all.
    pub fn find(&self,user: u8,base: [u8;8],typ: [u8;3]) -> Option<Vec<usize>> {
        let mut hits: Vec<(usize,usize)> = Vec::new();
        for slot in 0..self.num_slots() {
            if let Some(fx) = self.extent(slot) {
                if fx.user==user && fx.named(base,typ) {
                    hits.push((fx.index(),slot));
                }
            }
        }
        match hits.len() {
            0 => None,
            _ => {
                hits.sort();
                Some(hits.iter().map(|h| h.1).collect())
            }
        }
    }
    /// count of nonzero block pointers over all live extents
    pub fn used_blocks(&self,dpb: &DiskParameterBlock) -> usize {
        let mut ans = 0;
        for slot in 0..self.num_slots() {
            if let Some(fx) = self.extent(slot) {
                ans += fx.block_list(dpb).iter().filter(|b| **b > 0).count();
            }
        }
        ans
    }
    pub fn block_in_use(&self,iblock: usize,dpb: &DiskParameterBlock) -> bool {
        for slot in 0..self.num_slots() {
            if let Some(fx) = self.extent(slot) {
                if fx.block_list(dpb).contains(&(iblock as u16)) {
                    return true;
                }
            }
        }
        false
    }
}
