//! ### ProDOS directory blocks
//!
//! A directory is a doubly linked chain of 512 byte blocks.  The key block
//! carries a header (volume or subdirectory) in its first entry slot, the
//! remaining blocks are nothing but entry slots.  `DirBlock` models any of
//! the three, with the header as an enum rather than a generic parameter.

use chrono::{Datelike,Timelike};
use log::{warn,error};
use num_traits::FromPrimitive;
use std::collections::HashMap;
use regex::Regex;
use super::types::*;
use super::super::FileImage;
use crate::DYNERR;

use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;

const ENTRY_LEN: u8 = 0x27;
const ENTRIES_PER_BLOCK: u8 = 13;

/// Date words: day, month<<5, (year mod 100)<<9.  Time words: minute, hour<<8.
pub fn pack_time(time: Option<chrono::NaiveDateTime>) -> [u8;4] {
    let stamp = match time {
        Some(t) => t,
        None => chrono::Local::now().naive_local()
    };
    let (_ce,year) = stamp.year_ce();
    let date = u16::to_le_bytes((stamp.day() + (stamp.month() << 5) + (year%100 << 9)) as u16);
    let time = u16::to_le_bytes((stamp.minute() + (stamp.hour() << 8)) as u16);
    [date[0],date[1],time[0],time[1]]
}

/// Inverse of `pack_time`.  The two digit year is pivoted at 79, the year
/// before SOS shipped, so stamps read correctly through 2078.
pub fn unpack_time(packed: [u8;4]) -> Option<chrono::NaiveDateTime> {
    let date = u16::from_le_bytes([packed[0],packed[1]]);
    let time = u16::from_le_bytes([packed[2],packed[3]]);
    let yy = date >> 9;
    let year = match yy < 79 {
        true => 2000 + yy,
        false => 1900 + yy
    };
    let maybe_date = chrono::NaiveDate::from_ymd_opt(year as i32,((date >> 5) & 15) as u32,(date & 31) as u32);
    maybe_date.and_then(|d| d.and_hms_opt(((time >> 8) & 255) as u32,(time & 255) as u32,0))
}

/// Letter followed by up to 14 letters, digits, or periods.
pub fn is_name_valid(s: &str) -> bool {
    let patt = Regex::new(r"^[A-Z][A-Z0-9.]{0,14}$").expect("valid regex");
    patt.is_match(&s.to_uppercase())
}

/// Decode name bytes, length is in the low nibble of `nibs`.
/// Bad bytes are escaped rather than panicking.
fn name_to_string(nibs: u8,raw: [u8;15]) -> String {
    let len = (nibs & 0x0f) as usize;
    match String::from_utf8(raw[0..len].to_vec()) {
        Ok(s) => s,
        Err(_) => {
            warn!("continuing with invalid filename");
            crate::escaped_ascii_from_bytes(&raw[0..len],true,false)
        }
    }
}

/// Encode a name, returning (stor_len_nibs,raw).
/// Panics if the name is invalid; validate first with `is_name_valid`.
fn pack_name(stype: StorageType,s: &str) -> (u8,[u8;15]) {
    if !is_name_valid(s) {
        panic!("attempt to create a bad file name {}",s);
    }
    let mut raw: [u8;15] = [0;15];
    for (i,c) in s.to_uppercase().chars().enumerate() {
        c.encode_utf8(&mut raw[i..]);
    }
    (((stype as u8) << 4) + s.len() as u8,raw)
}

// Block   | Contents
// -----------------------------
// 0       | Loader
// 1       | Loader
// 2       | Volume Directory Key
// 3 - n   | Volume Directory
// n+1 - p | Volume Bitmap

#[derive(DiskStruct,Clone,Copy)]
pub struct VolHeader {
    stor_len_nibs: u8,
    name: [u8;15],
    pad1: [u8;8],
    create_time: [u8;4],
    vers: u8,
    min_vers: u8,
    access: u8,
    entry_len: u8,
    entries_per_block: u8,
    file_count: [u8;2],
    bitmap_ptr: [u8;2],
    total_blocks: [u8;2]
}

#[derive(DiskStruct,Clone,Copy)]
pub struct SubHeader {
    stor_len_nibs: u8,
    name: [u8;15],
    pad1: [u8;8],
    create_time: [u8;4],
    vers: u8,
    min_vers: u8,
    access: u8,
    entry_len: u8,
    entries_per_block: u8,
    file_count: [u8;2],
    parent_ptr: [u8;2],
    parent_entry_num: u8,
    parent_entry_len: u8
}

#[derive(DiskStruct,Clone,Copy)]
pub struct Entry {
    stor_len_nibs: u8,
    name: [u8;15],
    file_type: u8,
    key_ptr: [u8;2],
    blocks_used: [u8;2],
    eof: [u8;3],
    create_time: [u8;4],
    vers: u8,
    min_vers: u8,
    access: u8,
    aux_type: [u8;2],
    last_mod: [u8;4],
    header_ptr: [u8;2]
}

impl VolHeader {
    pub fn create(blocks: u16,vol_name: &str,time: Option<chrono::NaiveDateTime>) -> Self {
        let (nibs,name) = pack_name(StorageType::VolDirHeader,vol_name);
        Self {
            stor_len_nibs: nibs,
            name,
            pad1: [0;8],
            create_time: pack_time(time),
            vers: 0,
            min_vers: 0,
            access: STD_ACCESS,
            entry_len: ENTRY_LEN,
            entries_per_block: ENTRIES_PER_BLOCK,
            file_count: [0,0],
            bitmap_ptr: [6,0],
            total_blocks: u16::to_le_bytes(blocks)
        }
    }
    pub fn name(&self) -> String {
        name_to_string(self.stor_len_nibs,self.name)
    }
    pub fn bitmap_ptr(&self) -> u16 {
        u16::from_le_bytes(self.bitmap_ptr)
    }
    pub fn total_blocks(&self) -> u16 {
        u16::from_le_bytes(self.total_blocks)
    }
}

impl SubHeader {
    fn create(name: &str,parent: &EntryLocation,time: Option<chrono::NaiveDateTime>) -> Self {
        let (nibs,raw) = pack_name(StorageType::SubDirHeader,name);
        Self {
            stor_len_nibs: nibs,
            name: raw,
            pad1: [0x75,0,0,0,0,0,0,0],
            create_time: pack_time(time),
            vers: 0,
            min_vers: 0,
            access: STD_ACCESS,
            entry_len: ENTRY_LEN,
            entries_per_block: ENTRIES_PER_BLOCK,
            file_count: [0,0],
            parent_ptr: u16::to_le_bytes(parent.block),
            parent_entry_num: parent.idx as u8,
            parent_entry_len: ENTRY_LEN
        }
    }
}

/// First entry slot of a key block, or nothing for a plain entry block
#[derive(Clone,Copy)]
pub enum DirHeader {
    None,
    Volume(VolHeader),
    Subdir(SubHeader)
}

/// Any block in a directory chain: links, maybe a header, and entry slots.
/// Entry indices are 1-based counting the header slot, so the first real
/// entry of a key block is index 2.
#[derive(Clone)]
pub struct DirBlock {
    pub prev: u16,
    pub next: u16,
    pub header: DirHeader,
    entries: Vec<Entry>
}

impl DirBlock {
    pub fn volume_key(blocks: u16,vol_name: &str,time: Option<chrono::NaiveDateTime>) -> Self {
        Self {
            prev: 0,
            next: VOL_KEY_BLOCK + 1,
            header: DirHeader::Volume(VolHeader::create(blocks,vol_name,time)),
            entries: vec![Entry::new();12]
        }
    }
    pub fn subdir_key(name: &str,parent: &EntryLocation,time: Option<chrono::NaiveDateTime>) -> Self {
        Self {
            prev: 0,
            next: 0,
            header: DirHeader::Subdir(SubHeader::create(name,parent,time)),
            entries: vec![Entry::new();12]
        }
    }
    pub fn entry_block(prev: u16,next: u16) -> Self {
        Self {
            prev,
            next,
            header: DirHeader::None,
            entries: vec![Entry::new();13]
        }
    }
    /// Parse a directory block.  The caller must say whether this is the
    /// volume key block; a subdirectory key is then recognized by its null
    /// back link, anything else is a plain entry block.
    pub fn from_bytes(buf: &[u8],at_volume_key: bool) -> Result<Self,DiskStructError> {
        if buf.len()<BLOCK_SIZE-1 {
            return Err(DiskStructError::OutOfData);
        }
        let prev = u16::from_le_bytes([buf[0],buf[1]]);
        let next = u16::from_le_bytes([buf[2],buf[3]]);
        let header = match (at_volume_key,prev) {
            (true,_) => DirHeader::Volume(VolHeader::from_bytes(&buf[4..4+ENTRY_LEN as usize])?),
            (false,0) => DirHeader::Subdir(SubHeader::from_bytes(&buf[4..4+ENTRY_LEN as usize])?),
            (false,_) => DirHeader::None
        };
        let count = match header {
            DirHeader::None => 13,
            _ => 12
        };
        let mut entries = Vec::new();
        let mut offset = 4 + (ENTRY_LEN as usize)*(13-count);
        for _slot in 0..count {
            entries.push(Entry::from_bytes(&buf[offset..offset+ENTRY_LEN as usize])?);
            offset += ENTRY_LEN as usize;
        }
        Ok(Self { prev, next, header, entries })
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ans = Vec::new();
        ans.extend_from_slice(&u16::to_le_bytes(self.prev));
        ans.extend_from_slice(&u16::to_le_bytes(self.next));
        match &self.header {
            DirHeader::Volume(h) => ans.append(&mut h.to_bytes()),
            DirHeader::Subdir(h) => ans.append(&mut h.to_bytes()),
            DirHeader::None => {}
        }
        for entry in &self.entries {
            ans.append(&mut entry.to_bytes());
        }
        ans.resize(BLOCK_SIZE,0);
        ans
    }
    fn first_idx(&self) -> usize {
        match self.header {
            DirHeader::None => 1,
            _ => 2
        }
    }
    pub fn entry_locations(&self,iblock: u16) -> Vec<EntryLocation> {
        let first = self.first_idx();
        (first..first+self.entries.len()).map(|idx| EntryLocation { block: iblock, idx }).collect()
    }
    pub fn entry(&self,loc: &EntryLocation) -> Entry {
        self.entries[loc.idx - self.first_idx()]
    }
    pub fn put_entry(&mut self,loc: &EntryLocation,entry: Entry) {
        let first = self.first_idx();
        self.entries[loc.idx - first] = entry;
    }
    pub fn erase_entry(&mut self,loc: &EntryLocation) {
        let first = self.first_idx();
        self.entries[loc.idx - first].stor_len_nibs = 0;
    }
    /// name of the directory; only a key block has one
    pub fn name(&self) -> Option<String> {
        match &self.header {
            DirHeader::Volume(h) => Some(h.name()),
            DirHeader::Subdir(h) => Some(name_to_string(h.stor_len_nibs,h.name)),
            DirHeader::None => None
        }
    }
    pub fn file_count(&self) -> u16 {
        match &self.header {
            DirHeader::Volume(h) => u16::from_le_bytes(h.file_count),
            DirHeader::Subdir(h) => u16::from_le_bytes(h.file_count),
            DirHeader::None => 0
        }
    }
    /// adjust the key block's file count; panics on a plain entry block
    pub fn bump_file_count(&mut self,delta: i32) {
        let count = match &mut self.header {
            DirHeader::Volume(h) => &mut h.file_count,
            DirHeader::Subdir(h) => &mut h.file_count,
            DirHeader::None => panic!("entry block has no file count")
        };
        *count = u16::to_le_bytes((u16::from_le_bytes(*count) as i32 + delta) as u16);
    }
    /// location of the entry naming this subdirectory in its parent
    pub fn parent_entry_loc(&self) -> Option<EntryLocation> {
        match &self.header {
            DirHeader::Subdir(h) => Some(EntryLocation {
                block: u16::from_le_bytes(h.parent_ptr),
                idx: h.parent_entry_num as usize
            }),
            _ => None
        }
    }
    /// mark a subdirectory header inactive; panics on other block types
    pub fn erase_header(&mut self) {
        match &mut self.header {
            DirHeader::Subdir(h) => h.stor_len_nibs = 0,
            _ => panic!("only a subdirectory key can be erased")
        }
    }
}

impl Entry {
    pub fn is_active(&self) -> bool {
        self.stor_len_nibs > 0
    }
    pub fn name(&self) -> String {
        name_to_string(self.stor_len_nibs,self.name)
    }
    pub fn storage(&self) -> StorageType {
        match StorageType::from_u8(self.stor_len_nibs >> 4) {
            Some(t) => t,
            None => panic!("encountered unknown storage type")
        }
    }
    pub fn set_storage(&mut self,stype: StorageType) {
        self.stor_len_nibs = (self.stor_len_nibs & 0x0f) | ((stype as u8) << 4);
    }
    /// does this active entry have one of the given storage types and the given name
    pub fn matches(&self,kinds: &[StorageType],name: &str) -> bool {
        self.is_active() && kinds.contains(&self.storage()) && self.name().eq_ignore_ascii_case(name)
    }
    pub fn key_ptr(&self) -> u16 {
        u16::from_le_bytes(self.key_ptr)
    }
    pub fn set_key_ptr(&mut self,ptr: u16) {
        self.key_ptr = u16::to_le_bytes(ptr);
    }
    pub fn blocks(&self) -> u16 {
        u16::from_le_bytes(self.blocks_used)
    }
    pub fn add_blocks(&mut self,delta: i32) {
        self.blocks_used = u16::to_le_bytes((u16::from_le_bytes(self.blocks_used) as i32 + delta) as u16);
    }
    pub fn eof(&self) -> usize {
        u32::from_le_bytes([self.eof[0],self.eof[1],self.eof[2],0]) as usize
    }
    pub fn set_eof(&mut self,bytes: usize) {
        let le = u32::to_le_bytes(bytes as u32);
        self.eof = [le[0],le[1],le[2]];
    }
    pub fn aux(&self) -> u16 {
        u16::from_le_bytes(self.aux_type)
    }
    pub fn set_aux(&mut self,aux: u16) {
        self.aux_type = u16::to_le_bytes(aux);
    }
    pub fn ftype(&self) -> u8 {
        self.file_type
    }
    pub fn set_ftype(&mut self,typ: u8) {
        self.file_type = typ;
    }
    pub fn get_access(&self,what: Access) -> bool {
        self.access & what as u8 > 0
    }
    pub fn set_access(&mut self,what: Access,enabled: bool) {
        if enabled {
            self.access |= what as u8;
        } else {
            self.access &= !(what as u8);
        }
    }
    pub fn set_all_access(&mut self,bits: u8) {
        self.access = bits;
    }
    /// Panics if `name` is invalid
    pub fn rename(&mut self,name: &str) {
        let (nibs,raw) = pack_name(self.storage(),name);
        self.stor_len_nibs = nibs;
        self.name = raw;
    }
    /// copy the entry metadata into the file image fields
    pub fn stamp_fimg(&self,fimg: &mut FileImage) {
        fimg.eof = FileImage::fix_le_vec(self.eof(),3);
        fimg.access = vec![self.access];
        fimg.fs_type = vec![self.file_type];
        fimg.aux = self.aux_type.to_vec();
        fimg.created = self.create_time.to_vec();
        fimg.modified = self.last_mod.to_vec();
        fimg.version = vec![self.vers];
        fimg.min_version = vec![self.min_vers];
    }
    /// Entry for a new subdirectory.  Panics if `name` is invalid.
    pub fn new_subdir(name: &str,key_ptr: u16,header_ptr: u16,time: Option<chrono::NaiveDateTime>) -> Self {
        let (nibs,raw) = pack_name(StorageType::SubDirEntry,name);
        let mut ans = Self::new();
        ans.stor_len_nibs = nibs;
        ans.name = raw;
        ans.file_type = FileType::Directory as u8;
        ans.key_ptr = u16::to_le_bytes(key_ptr);
        ans.create_time = pack_time(time);
        ans.access = STD_ACCESS | DIDCHANGE;
        ans.last_mod = pack_time(time);
        ans.header_ptr = u16::to_le_bytes(header_ptr);
        ans
    }
    /// Seedling entry for a new file, metadata from the file image.
    /// Panics if `name` is invalid.
    pub fn new_file(name: &str,fimg: &FileImage,key_ptr: u16,header_ptr: u16,time: Option<chrono::NaiveDateTime>) -> Result<Self,DYNERR> {
        if fimg.fs_type.len()<1 || fimg.version.len()<1 || fimg.min_version.len()<1 || fimg.aux.len()<2 || fimg.access.len()<1 {
            error!("one or more ProDOS file image fields were too short");
            return Err(Box::new(Error::Range));
        }
        let (nibs,raw) = pack_name(StorageType::Seedling,name);
        let mut ans = Self::new();
        ans.stor_len_nibs = nibs;
        ans.name = raw;
        ans.file_type = fimg.fs_type[0];
        ans.key_ptr = u16::to_le_bytes(key_ptr);
        ans.create_time = pack_time(time);
        ans.vers = fimg.version[0];
        ans.min_vers = fimg.min_version[0];
        ans.access = fimg.access[0];
        ans.aux_type = [fimg.aux[0],fimg.aux[1]];
        ans.last_mod = pack_time(time);
        ans.header_ptr = u16::to_le_bytes(header_ptr);
        Ok(ans)
    }
    /// Display string for the type code, unknown codes are shown as hex
    pub fn type_string(&self) -> String {
        let typ_map: HashMap<u8,&str> = HashMap::from(TYPE_MAP_DISP);
        match typ_map.get(&self.file_type) {
            Some(s) => s.to_string(),
            None => "$".to_string() + &hex::encode_upper(vec![self.file_type])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_stamps() {
        let stamp = chrono::NaiveDate::from_ymd_opt(1986,9,20).unwrap().and_hms_opt(14,45,0).unwrap();
        let packed = pack_time(Some(stamp));
        // day 20, month 9<<5, year 86<<9
        assert_eq!(u16::from_le_bytes([packed[0],packed[1]]),20 + (9<<5) + (86<<9));
        assert_eq!(u16::from_le_bytes([packed[2],packed[3]]),45 + (14<<8));
        assert_eq!(unpack_time(packed),Some(stamp));
        // year 05 lands in the 2000s
        let recent = chrono::NaiveDate::from_ymd_opt(2005,1,2).unwrap().and_hms_opt(0,1,0).unwrap();
        assert_eq!(unpack_time(pack_time(Some(recent))),Some(recent));
    }

    #[test]
    fn name_rules() {
        assert!(is_name_valid("A"));
        assert!(is_name_valid("my.file2"));
        assert!(!is_name_valid("2ND"));
        assert!(!is_name_valid("TOO.LONG.BY.JUST.A.BIT"));
        assert!(!is_name_valid("BAD NAME"));
    }

    #[test]
    fn key_block_layout() {
        let key = DirBlock::volume_key(280,"DISK",None);
        let buf = key.to_bytes();
        assert_eq!(buf.len(),BLOCK_SIZE);
        assert_eq!(buf[0x23],0x27);
        assert_eq!(buf[0x24],13);
        assert_eq!(u16::from_le_bytes([buf[0x29],buf[0x2a]]),280);
        let back = DirBlock::from_bytes(&buf,true).expect("parse failed");
        assert_eq!(back.name(),Some("DISK".to_string()));
        assert_eq!(back.entry_locations(2).first().map(|l| l.idx),Some(2));
        let plain = DirBlock::entry_block(3,5);
        assert_eq!(plain.entry_locations(4).first().map(|l| l.idx),Some(1));
        assert_eq!(plain.entry_locations(4).len(),13);
    }
}
