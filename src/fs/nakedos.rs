//! # NakedOS file system module
//!
//! NakedOS has no catalog in the usual sense.  A sector map on track 0
//! assigns every sector on the disk a one byte owner: 0xFE marks sectors
//! reserved by the system (the boot tracks and the map itself), 0xFF marks
//! free sectors, and any other value is a file number.  Files carry no name,
//! type, or length; by convention file `n` is referred to as `DFnn` and its
//! data is the concatenation of its sectors in ascending order.
//!
//! Since there is no length or type metadata to maintain, and the system
//! sectors must never move, this module is read-only.

use std::collections::HashMap;
use std::str::FromStr;
use a2kit_macro::DiskStruct;
use log::{debug,error};

use super::dos3x::types::SequentialText;
use super::{Block,FileImage,FileInfo};
use super::ItemType;
use crate::img;
use crate::{STDRESULT,DYNERR};

pub const FS_NAME: &str = "nakedos";

const TRACKS: usize = 35;
const SECTORS: usize = 16;
/// the sector map starts here and runs for `MAP_SECTORS` sectors
const MAP_TS: [usize;2] = [0,3];
const MAP_SECTORS: usize = 3;
/// owner byte for system sectors
const RESERVED: u8 = 0xfe;
/// owner byte for free sectors
const FREE: u8 = 0xff;

/// Enumerates NakedOS errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("range error")]
    Range,
    #[error("file not found")]
    FileNotFound,
    #[error("i/o error")]
    IOError
}

/// Display form of a file number, e.g. `DF2A`.
fn file_num_to_string(num: u8) -> String {
    format!("DF{:02X}",num)
}

/// Accept a file number with or without the customary DF prefix.
fn string_to_file_num(name: &str) -> Option<u8> {
    let stripped = match name.to_uppercase() {
        s if s.starts_with("DF") => s[2..].to_string(),
        s => s
    };
    match u8::from_str_radix(&stripped,16) {
        Ok(num) if num!=RESERVED && num!=FREE => Some(num),
        _ => None
    }
}

/// Sectors owned by a file, in ascending order, as indices into the map.
fn file_sectors(map: &[u8],num: u8) -> Vec<usize> {
    let mut ans = Vec::new();
    for i in 0..TRACKS*SECTORS {
        if map[i]==num {
            ans.push(i);
        }
    }
    ans
}

/// Create an empty file image appropriate for NakedOS.
/// There is no metadata at all beyond the owner byte.
pub fn new_fimg(chunk_len: usize) -> FileImage {
    FileImage {
        fimg_version: FileImage::fimg_version(),
        file_system: String::from(FS_NAME),
        chunk_len,
        eof: vec![],
        fs_type: vec![],
        aux: vec![],
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
    img: Box<dyn img::DiskImage>
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    /// The DiskFS takes ownership of the image.
    pub fn from_img(mut img: Box<dyn img::DiskImage>) -> Result<Self,DYNERR> {
        match Self::test_img(&mut img) {
            true => Ok(Self { img }),
            false => Err(Box::new(Error::IOError))
        }
    }
    /// Test an image for NakedOS.  The system reserves track 0 sectors 0
    /// through 11 for itself, so the map must open with a run of exactly 12
    /// reserved markers.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> bool {
        if img.byte_capacity()!=img::names::A2_DOS33_SIZE {
            debug!("byte capacity {} is unexpected for NakedOS",img.byte_capacity());
            return false;
        }
        match img.read_block(Block::DO(MAP_TS)) {
            Ok(buf) => buf[0..12].iter().all(|b| *b==RESERVED) && buf[12]!=RESERVED,
            Err(_) => false
        }
    }
    /// Read the whole sector map into one buffer, one byte per sector.
    fn get_map(&mut self) -> Result<Vec<u8>,DYNERR> {
        let mut ans = Vec::new();
        for s in 0..MAP_SECTORS {
            let mut buf = self.img.read_block(Block::DO([MAP_TS[0],MAP_TS[1]+s]))?;
            ans.append(&mut buf);
        }
        ans.truncate(TRACKS*SECTORS);
        Ok(ans)
    }
    fn read_file(&mut self,name: &str) -> Result<FileImage,DYNERR> {
        let num = match string_to_file_num(name) {
            Some(num) => num,
            None => {
                error!("NakedOS file names are hex numbers such as DF2A");
                return Err(Box::new(Error::FileNotFound));
            }
        };
        let map = self.get_map()?;
        let secs = file_sectors(&map,num);
        if secs.len()==0 {
            return Err(Box::new(Error::FileNotFound));
        }
        let mut ans = new_fimg(256);
        for (chunk,i) in secs.iter().enumerate() {
            let buf = self.img.read_block(Block::DO([i/SECTORS,i%SECTORS]))?;
            ans.chunks.insert(chunk,buf);
        }
        Ok(ans)
    }
    fn write_protect(&self) -> DYNERR {
        error!("NakedOS files carry no metadata that would let us write them safely, treating disk as read-only");
        Box::new(super::Error::ReadOnly)
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> FileImage {
        new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        String::from(FS_NAME)
    }
    fn catalog(&mut self, _path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        let map = self.get_map()?;
        let mut found: Vec<u8> = Vec::new();
        for owner in &map {
            if *owner!=RESERVED && *owner!=FREE && !found.contains(owner) {
                found.push(*owner);
            }
        }
        found.sort();
        let mut ans = Vec::new();
        for num in found {
            let blocks = file_sectors(&map,num).len();
            ans.push(FileInfo {
                name: file_num_to_string(num),
                typ: String::from(""),
                locked: false,
                blocks,
                eof: blocks*256,
                aux: 0,
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
        Ok((0,fimg.sequence()))
    }
    fn bsave(&mut self,_name: &str, _dat: &[u8],_start_addr: u16,_trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn load(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        Ok((0,fimg.sequence()))
    }
    fn save(&mut self,_name: &str, _dat: &[u8], _typ: ItemType, _trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        Err(self.write_protect())
    }
    fn read_raw(&mut self,name: &str,_trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        // eof is unknown to the file system, data extends to the sector boundary
        let fimg = self.read_file(name)?;
        Ok((0,fimg.sequence()))
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
        let sector = usize::from_str(num)?;
        if sector >= TRACKS*SECTORS {
            return Err(Box::new(Error::Range));
        }
        Ok((0,self.img.read_block(Block::DO([sector/SECTORS,sector%SECTORS]))?))
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
        let map = self.get_map()?;
        Ok(map.iter().filter(|b| **b==FREE).count())
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(TRACKS*SECTORS)
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        let map = self.get_map()?;
        Ok(map.iter().map(|b| *b==FREE).collect())
    }
    fn suggest_name(&self,host_name: &str) -> String {
        // canonicalize to DFxx when the name already looks like a file number
        match string_to_file_num(&super::host_stem(host_name)) {
            Some(num) => file_num_to_string(num),
            None => String::from("DF01")
        }
    }
    fn suggest_type(&self,_host_name: &str) -> String {
        String::new()
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        &mut self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_numbers() {
        assert_eq!(file_num_to_string(0x2a),"DF2A");
        assert_eq!(string_to_file_num("DF2A"),Some(0x2a));
        assert_eq!(string_to_file_num("2a"),Some(0x2a));
        assert_eq!(string_to_file_num("FE"),None);
        assert_eq!(string_to_file_num("FF"),None);
        assert_eq!(string_to_file_num("WHAT"),None);
    }

    #[test]
    fn map_scan() {
        let mut map = vec![FREE;TRACKS*SECTORS];
        for i in 0..12 {
            map[i] = RESERVED;
        }
        map[20] = 0x03;
        map[100] = 0x03;
        map[21] = 0x04;
        assert_eq!(file_sectors(&map,0x03),vec![20,100]);
        assert_eq!(file_sectors(&map,0x04),vec![21]);
        assert_eq!(file_sectors(&map,0x05),Vec::<usize>::new());
    }
}
