//! # RDOS file system module
//!
//! This reads disk images containing an SSI RDOS volume.  RDOS came in a
//! 13-sector variant, and two 16-sector variants, one of which merely wraps
//! the 13-sector layout in a 16-sector disk while using only the first 13
//! sectors of each track.  The catalog does not announce which variant is in
//! play, so we have to work it out, see `test_img`.
//!
//! Files are stored contiguously and the catalog has no lock bits or bitmaps.
//! Writing would require relocating files to close gaps, which RDOS itself
//! never did; this module is accordingly read-only.

pub mod types;

use std::collections::HashMap;
use std::str::FromStr;
use a2kit_macro::DiskStruct;
use log::{debug,error};

use types::*;
use super::dos3x::types::SequentialText;
use super::{Block,FileImage,FileInfo};
use super::ItemType;
use crate::img;
use crate::{STDRESULT,DYNERR};

pub use types::FS_NAME;

/// tracks are fixed for every variant
const TRACKS: usize = 35;

/// The two sector counts RDOS was released with.  `Rdos32` is the 13-sector
/// layout riding inside a 16-sector image.
#[derive(PartialEq,Eq,Clone,Copy)]
pub enum Variant {
    Rdos21,
    Rdos32,
    Rdos33
}

impl Variant {
    /// sectors per track in the catalog's own geometry
    fn secs(&self) -> usize {
        match self {
            Self::Rdos33 => 16,
            _ => 13
        }
    }
    fn total_blocks(&self) -> usize {
        TRACKS * self.secs()
    }
    pub fn fs_name(&self) -> String {
        match self {
            Self::Rdos21 => String::from("rdos 2.1"),
            Self::Rdos32 => String::from("rdos 3.2"),
            Self::Rdos33 => String::from("rdos 3.3")
        }
    }
}

fn file_name_to_string(fname: [u8;24]) -> String {
    // fname is negative ASCII padded to the end with spaces
    // non-ASCII will go as hex escapes
    String::from(crate::escaped_ascii_from_bytes(&fname,true,true).trim_end())
}

fn string_to_file_name(s: &str) -> [u8;24] {
    let mut ans: [u8;24] = [0xa0;24]; // fill with negative spaces
    let unescaped = crate::escaped_ascii_to_bytes(s, true);
    for i in 0..24 {
        if i<unescaped.len() {
            ans[i] = unescaped[i];
        }
    }
    return ans;
}

fn is_deleted(entry: &Entry) -> bool {
    file_name_to_string(entry.name).starts_with(DELETED_NAME)
}

/// Search a sector buffer for any of the negative ASCII strings that the
/// catalog program carries.
fn has_catalog_strings(buf: &[u8]) -> bool {
    for pat in SIG_STRINGS {
        let bytes: Vec<u8> = pat.bytes().map(|b| b | 0x80).collect();
        if buf.windows(bytes.len()).any(|w| w==bytes) {
            return true;
        }
    }
    false
}

/// Create an empty file image appropriate for RDOS.
/// The aux field holds the load address for binary files.
pub fn new_fimg(chunk_len: usize) -> FileImage {
    FileImage {
        fimg_version: FileImage::fimg_version(),
        file_system: String::from(FS_NAME),
        chunk_len,
        eof: vec![0,0],
        fs_type: vec![b'T' | 0x80],
        aux: vec![0,0],
        access: vec![],
        created: vec![],
        modified: vec![],
        version: vec![],
        min_version: vec![],
        chunks: HashMap::new()
    }
}

/// The primary interface for disk operations.
pub struct Disk {
    variant: Variant,
    img: Box<dyn img::DiskImage>
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    /// The DiskFS takes ownership of the image.
    pub fn from_img(mut img: Box<dyn img::DiskImage>) -> Result<Self,DYNERR> {
        match Self::test_img(&mut img) {
            Some(variant) => Ok(Self { variant, img }),
            None => Err(Box::new(Error::IOError))
        }
    }
    fn block_addr(variant: &Variant,block: usize) -> Block {
        let secs = variant.secs();
        match variant {
            Variant::Rdos21 => Block::D13([block/secs,block%secs]),
            _ => Block::DO([block/secs,block%secs])
        }
    }
    fn sector_addr(variant: &Variant,ts: [usize;2]) -> Block {
        match variant {
            Variant::Rdos21 => Block::D13(ts),
            _ => Block::DO(ts)
        }
    }
    /// Scan the catalog sectors assuming the given variant, testing every
    /// non-empty entry for structural sanity.  At least one live entry with a
    /// valid type byte, a negative ASCII name, and in-range block extents is
    /// required.
    fn plausible_catalog(img: &mut Box<dyn img::DiskImage>,variant: &Variant) -> bool {
        let mut live = 0;
        for s in 0..CAT_SECTORS {
            let buf = match img.read_block(Self::sector_addr(variant,[CAT_TRACK,s])) {
                Ok(buf) => buf,
                Err(_) => {
                    debug!("catalog sector {} was not readable",s);
                    return false;
                }
            };
            for e in 0..ENTRIES_PER_SECTOR {
                let entry = match Entry::from_bytes(&buf[e*ENTRY_SIZE..(e+1)*ENTRY_SIZE]) {
                    Ok(entry) => entry,
                    Err(_) => return false
                };
                if entry.is_empty() || is_deleted(&entry) {
                    continue;
                }
                if !is_valid_type(entry.typ) {
                    debug!("entry {} has type {}, not a catalog",e,entry.typ);
                    return false;
                }
                if entry.name.iter().any(|b| *b < 0xa0) {
                    debug!("entry {} name is not negative ASCII",e);
                    return false;
                }
                if entry.blocks==0 || entry.end() > variant.total_blocks() {
                    debug!("entry {} blocks are out of range",e);
                    return false;
                }
                if entry.eof() > entry.blocks as usize * 256 {
                    debug!("entry {} eof exceeds its blocks",e);
                    return false;
                }
                live += 1;
            }
        }
        live > 0
    }
    /// Look for the catalog program's text strings in the last sector of the
    /// catalog track.  The location depends on the skew variant, so this is
    /// the authoritative disambiguator; the structural scan alone cannot tell
    /// the 13-sector layouts from the 16-sector one.
    fn find_signature(img: &mut Box<dyn img::DiskImage>,variant: &Variant) -> bool {
        let addr = Self::sector_addr(variant,[CAT_TRACK,variant.secs()-1]);
        match img.read_block(addr) {
            Ok(buf) => has_catalog_strings(&buf),
            Err(_) => false
        }
    }
    /// Test an image for RDOS and return the variant if it is found.
    /// A 16-sector image may contain either 16-sector RDOS or "truncated"
    /// 13-sector RDOS; both candidates are tried in a fixed order.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> Option<Variant> {
        let candidates = match img.byte_capacity() {
            x if x==img::names::A2_DOS32_SIZE => vec![Variant::Rdos21],
            x if x==img::names::A2_DOS33_SIZE => vec![Variant::Rdos33,Variant::Rdos32],
            x => {
                debug!("byte capacity {} is unexpected for RDOS",x);
                return None;
            }
        };
        for variant in candidates {
            if Self::plausible_catalog(img,&variant) && Self::find_signature(img,&variant) {
                return Some(variant);
            }
        }
        None
    }
    /// Gather all the non-empty catalog entries, deleted ones included.
    fn get_catalog(&mut self) -> Result<Vec<Entry>,DYNERR> {
        let mut ans = Vec::new();
        for s in 0..CAT_SECTORS {
            let buf = self.img.read_block(Self::sector_addr(&self.variant,[CAT_TRACK,s]))?;
            for e in 0..ENTRIES_PER_SECTOR {
                let entry = Entry::from_bytes(&buf[e*ENTRY_SIZE..(e+1)*ENTRY_SIZE])?;
                if !entry.is_empty() {
                    ans.push(entry);
                }
            }
        }
        Ok(ans)
    }
    fn get_entry(&mut self,name: &str) -> Result<Entry,DYNERR> {
        let fname = string_to_file_name(name);
        for entry in self.get_catalog()? {
            if entry.name==fname && !is_deleted(&entry) {
                return Ok(entry);
            }
        }
        Err(Box::new(Error::FileNotFound))
    }
    /// Read a file into the sparse file format.  RDOS files are contiguous,
    /// so the chunks are dense; `FileImage::sequence_limited` recovers the data.
    fn read_file(&mut self,name: &str) -> Result<FileImage,DYNERR> {
        let entry = self.get_entry(name)?;
        if entry.end() > self.variant.total_blocks() {
            error!("file blocks out of range, image may be damaged");
            return Err(Box::new(Error::Range));
        }
        let mut ans = new_fimg(256);
        ans.fs_type = vec![entry.typ];
        ans.aux = entry.load_addr.to_vec();
        ans.set_eof(entry.eof());
        for i in 0..entry.blocks as usize {
            let buf = self.img.read_block(Self::block_addr(&self.variant,entry.start()+i))?;
            ans.chunks.insert(i,buf);
        }
        Ok(ans)
    }
    /// Free blocks are whatever no live entry claims; there is no bitmap to
    /// consult, so this is recomputed from the catalog on every call.
    fn num_free_blocks(&mut self) -> Result<usize,DYNERR> {
        let mut used = 0;
        for entry in self.get_catalog()? {
            if !is_deleted(&entry) {
                used += entry.blocks as usize;
            }
        }
        Ok(self.variant.total_blocks() - used)
    }
    fn write_protect(&self) -> DYNERR {
        error!("RDOS files cannot be changed in place, treating disk as read-only");
        Box::new(super::Error::ReadOnly)
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> FileImage {
        new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        self.variant.fs_name()
    }
    fn catalog(&mut self, _path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        let mut ans = Vec::new();
        for entry in self.get_catalog()? {
            if is_deleted(&entry) {
                continue;
            }
            ans.push(FileInfo {
                name: file_name_to_string(entry.name),
                typ: String::from(type_to_display(entry.typ)),
                locked: false,
                blocks: entry.blocks as usize,
                eof: entry.eof(),
                aux: entry.load_addr(),
                is_dir: false
            });
        }
        Ok(ans)
    }
    fn create(&mut self,_path: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn delete(&mut self,_name: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn lock(&mut self,_name: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn unlock(&mut self,_name: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn rename(&mut self,_old_name: &str,_new_name: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn retype(&mut self,_name: &str,_new_type: &str,_sub_type: &str) -> STDRESULT {
        Err(self.write_protect())
    }
    fn bload(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        let eof = fimg.get_eof();
        Ok((u16::from_le_bytes([fimg.aux[0],fimg.aux[1]]),fimg.sequence_limited(eof)))
    }
    fn bsave(&mut self,_name: &str, _dat: &[u8],_start_addr: u16,_trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn load(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        let eof = fimg.get_eof();
        Ok((0,fimg.sequence_limited(eof)))
    }
    fn save(&mut self,_name: &str, _dat: &[u8], _typ: ItemType, _trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn read_raw(&mut self,name: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        let addr = u16::from_le_bytes([fimg.aux[0],fimg.aux[1]]);
        match trunc {
            true => {
                let eof = fimg.get_eof();
                Ok((addr,fimg.sequence_limited(eof)))
            },
            false => Ok((addr,fimg.sequence()))
        }
    }
    fn write_raw(&mut self,_name: &str, _dat: &[u8]) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn read_text(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(name,true)
    }
    fn write_text(&mut self,_name: &str, _dat: &[u8]) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn read_any(&mut self,name: &str) -> Result<FileImage,DYNERR> {
        self.read_file(name)
    }
    fn write_any(&mut self,_name: &str,_fimg: &FileImage) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let block = usize::from_str(num)?;
        if block >= self.variant.total_blocks() {
            return Err(Box::new(Error::Range));
        }
        Ok((0,self.img.read_block(Self::block_addr(&self.variant,block))?))
    }
    fn write_block(&mut self,_num: &str,_dat: &[u8]) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
        let file = SequentialText::from_bytes(dat)?;
        Ok(file.to_string())
    }
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR> {
        let file = SequentialText::from_str(s)?;
        Ok(file.to_bytes())
    }
    fn free_units(&mut self) -> Result<usize,DYNERR> {
        self.num_free_blocks()
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.variant.total_blocks())
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        let mut ans = vec![true;self.variant.total_blocks()];
        for entry in self.get_catalog()? {
            if !is_deleted(&entry) {
                for b in entry.start()..entry.end() {
                    if b < ans.len() {
                        ans[b] = false;
                    }
                }
            }
        }
        Ok(ans)
    }
    fn suggest_name(&self,host_name: &str) -> String {
        let mut ans = String::new();
        for c in super::host_stem(host_name).to_uppercase().chars() {
            if ans.len()>=24 {
                break;
            }
            if c.is_ascii_graphic() || c==' ' {
                ans.push(c);
            }
        }
        ans.trim().to_string()
    }
    fn suggest_type(&self,host_name: &str) -> String {
        match super::host_extension(host_name).as_deref() {
            Some("txt") | Some("text") => "T".to_string(),
            Some("bas") => "A".to_string(),
            _ => "B".to_string()
        }
    }
    fn needs_address(&self) -> bool {
        true
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        &mut self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Vec<u8> {
        let mut raw = string_to_file_name("HELLO").to_vec();
        raw.push(b'B' | 0x80);
        raw.push(3); // blocks
        raw.append(&mut u16::to_le_bytes(0x300).to_vec());
        raw.append(&mut u16::to_le_bytes(600).to_vec());
        raw.append(&mut u16::to_le_bytes(26).to_vec());
        raw
    }

    #[test]
    fn entry_parsing() {
        let entry = Entry::from_bytes(&sample_entry()).expect("bad entry");
        assert_eq!(file_name_to_string(entry.name),"HELLO");
        assert!(is_valid_type(entry.typ));
        assert_eq!(entry.start(),26);
        assert_eq!(entry.end(),29);
        assert_eq!(entry.eof(),600);
        assert_eq!(entry.load_addr(),0x300);
        assert!(!is_deleted(&entry));
    }

    #[test]
    fn deleted_entry() {
        let mut raw = sample_entry();
        raw[0..24].copy_from_slice(&string_to_file_name(DELETED_NAME));
        let entry = Entry::from_bytes(&raw).expect("bad entry");
        assert!(is_deleted(&entry));
    }

    #[test]
    fn geometry() {
        assert!(Disk::block_addr(&Variant::Rdos21,27)==Block::D13([2,1]));
        assert!(Disk::block_addr(&Variant::Rdos32,27)==Block::DO([2,1]));
        assert!(Disk::block_addr(&Variant::Rdos33,27)==Block::DO([1,11]));
        assert_eq!(Variant::Rdos32.total_blocks(),455);
        assert_eq!(Variant::Rdos33.total_blocks(),560);
    }

    #[test]
    fn signature_strings() {
        let mut buf = vec![0;256];
        let sig: Vec<u8> = "FILE <NOT IN USE>".bytes().map(|b| b | 0x80).collect();
        buf[100..100+sig.len()].copy_from_slice(&sig);
        assert!(has_catalog_strings(&buf));
        assert!(!has_catalog_strings(&vec![0;256]));
        // positive ASCII must not match
        let pos: Vec<u8> = "FILE <NOT IN USE>".bytes().collect();
        let mut buf2 = vec![0;256];
        buf2[100..100+pos.len()].copy_from_slice(&pos);
        assert!(!has_catalog_strings(&buf2));
    }
}
