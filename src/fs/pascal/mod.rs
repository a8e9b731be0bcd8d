//! ## Pascal file system module
//!
//! Driver for the Apple flavor of the UCSD Pascal volume format.
//! Every file occupies one contiguous run of blocks recorded in a flat
//! directory; there is no free map, free space is whatever no run claims.
//! Tested only with UCSD Pascal version 1.2.

pub mod types;
mod directory;

use chrono::Datelike;
use std::collections::HashMap;
use std::str::FromStr;
use a2kit_macro::DiskStruct;
use log::{debug,error};
use num_traits::FromPrimitive;
use types::*;
use directory::*;
use super::{Block,ItemType,FileInfo};
use crate::img;
use crate::{STDRESULT,DYNERR};

pub use types::FS_NAME;

/// first block beyond the directory on a freshly formatted volume
const DIR_END_BLOCK: usize = 6;

fn pack_date(time: Option<chrono::NaiveDateTime>) -> [u8;2] {
    let now = match time {
        Some(t) => t,
        _ => chrono::Local::now().naive_local()
    };
    let (_ce,year) = now.year_ce();
    u16::to_le_bytes((now.month() + (now.day() << 4) + ((year%100) << 9)) as u16)
}

fn unpack_date(pascal_date: [u8;2]) -> Option<chrono::NaiveDateTime> {
    let date = u16::from_le_bytes(pascal_date);
    // two digit years are pinned to the 20th century
    let year = 1900 + (date >> 9);
    let month = date & 15;
    let day = (date >> 4) & 31;
    match chrono::NaiveDate::from_ymd_opt(year as i32,month as u32,day as u32) {
        Some(d) => d.and_hms_opt(0,0,0),
        None => None
    }
}

/// Validate, upcase, and pack a name, `N` is 7 for volumes, 15 for files.
/// Returns the stored length along with the padded bytes.
fn pack_name<const N: usize>(s: &str) -> Result<(u8,[u8;N]),Error> {
    let err = match N {
        7 => Error::BadTitle,
        _ => Error::BadFormat
    };
    if s.len() > N {
        debug!("name `{}` is too long, limit {}",s,N);
        return Err(err);
    }
    let mut packed = [0u8;N];
    for (i,b) in s.to_uppercase().bytes().enumerate() {
        if b < 0x20 || b > 0x7e || INVALID_CHARS.contains(b as char) {
            debug!("bad name character (codepoint {})",b);
            return Err(err);
        }
        if i >= N {
            return Err(err);
        }
        packed[i] = b;
    }
    Ok((s.len() as u8,packed))
}

fn unpack_name(raw: &[u8],len: u8) -> String {
    let trimmed = &raw[0..(len as usize).min(raw.len())];
    match String::from_utf8(trimmed.to_vec()) {
        Ok(s) => s.trim_end().to_string(),
        Err(_) => crate::escaped_ascii_from_bytes(trimmed,true,false)
    }
}

fn name_bytes_ok(raw: &[u8]) -> bool {
    raw.iter().all(|b| *b>=32 && *b<=126)
}

/// Read and validate the directory span from a borrowed image.
/// Used both to test images and to serve FS operations.
fn fetch_directory(img: &mut Box<dyn img::DiskImage>) -> Result<Directory,DYNERR> {
    let first = img.read_block(Block::PO(VOL_HEADER_BLOCK))?;
    let header = VolHeader::from_bytes(&first[0..ENTRY_SIZE])?;
    let end = u16::from_le_bytes(header.end_block) as usize;
    let total = u16::from_le_bytes(header.total_blocks) as usize;
    if header.begin_block != [0,0] || end <= VOL_HEADER_BLOCK || end > total {
        debug!("bad volume header: end block {}, total {}",end,total);
        return Err(Box::new(Error::BadFormat));
    }
    let mut span = first;
    for iblock in VOL_HEADER_BLOCK+1..end {
        span.append(&mut img.read_block(Block::PO(iblock))?);
    }
    Ok(Directory::from_span(&span)?)
}

/// The primary interface for disk operations.
pub struct Disk {
    img: Box<dyn img::DiskImage>
}

impl Disk {
    fn new_fimg(chunk_len: usize) -> super::FileImage {
        super::FileImage {
            fimg_version: super::FileImage::fimg_version(),
            file_system: String::from(FS_NAME),
            fs_type: vec![0;2],
            aux: vec![],
            eof: vec![0;4],
            created: vec![],
            modified: vec![0;2],
            access: vec![],
            version: vec![],
            min_version: vec![],
            chunk_len,
            chunks: HashMap::new()
        }
    }
    /// Create a disk file system using the given image as storage.
    /// The DiskFS takes ownership of the image.
    pub fn from_img(img: Box<dyn img::DiskImage>) -> Self {
        Self {
            img
        }
    }
    /// Test an image for the Pascal file system.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> bool {
        let dir = match fetch_directory(img) {
            Ok(d) => d,
            Err(e) => {
                debug!("pascal directory was not readable; {}",e);
                return false;
            }
        };
        let end = dir.end_block();
        let total = dir.total_blocks();
        if end > 20 {
            debug!("directory span ends at {}",end);
            return false;
        }
        if dir.header.file_type != [0,0] {
            debug!("volume header type {:?}",dir.header.file_type);
            return false;
        }
        if dir.header.name_len==0 || dir.header.name_len>7 || !name_bytes_ok(&dir.header.name[0..dir.header.name_len as usize]) {
            debug!("bad volume name");
            return false;
        }
        for slot in 0..dir.file_count().min(dir.entries.len()) {
            let entry = &dir.entries[slot];
            let (beg,end_entry) = entry.span();
            if beg==0 {
                continue;
            }
            // file runs must live wholly beyond the directory
            if beg < end || end_entry <= beg || end_entry > total {
                debug!("entry {} begin {} end {}",slot,beg,end_entry);
                return false;
            }
            if entry.name_len==0 || entry.name_len>15 || !name_bytes_ok(&entry.name[0..entry.name_len as usize]) {
                debug!("bad name in entry {}",slot);
                return false;
            }
        }
        true
    }
    fn get_directory(&mut self) -> Result<Directory,DYNERR> {
        fetch_directory(&mut self.img)
    }
    fn save_directory(&mut self,dir: &Directory) -> STDRESULT {
        let end = dir.end_block();
        let mut buf = dir.to_span();
        buf.resize((end-VOL_HEADER_BLOCK)*BLOCK_SIZE,0);
        for iblock in VOL_HEADER_BLOCK..end {
            let offset = (iblock-VOL_HEADER_BLOCK)*BLOCK_SIZE;
            self.img.write_block(Block::PO(iblock),&buf[offset..offset+BLOCK_SIZE])?;
        }
        Ok(())
    }
    /// Return tuple with (free blocks,largest contiguous run)
    fn free_report(&mut self) -> Result<(usize,usize),DYNERR> {
        let mut free = 0;
        let mut run = 0;
        let mut largest = 0;
        for is_free in self.get_directory()?.allocation() {
            match is_free {
                true => {
                    free += 1;
                    run += 1;
                    largest = largest.max(run);
                },
                false => run = 0
            }
        }
        Ok((free,largest))
    }
    /// Format disk for the Pascal file system.
    /// The boot blocks are left zeroed, so the volume is not bootable.
    pub fn format(&mut self, vol_name: &str, fill: u8, time: Option<chrono::NaiveDateTime>) -> STDRESULT {
        let (name_len,name) = match pack_name::<7>(vol_name) {
            Ok(packed) => packed,
            Err(e) => {
                error!("invalid pascal volume name");
                return Err(Box::new(e));
            }
        };
        let total = self.img.byte_capacity()/BLOCK_SIZE;
        for iblock in 0..DIR_END_BLOCK {
            self.img.write_block(Block::PO(iblock),&[0;BLOCK_SIZE])?;
        }
        for iblock in DIR_END_BLOCK..total {
            self.img.write_block(Block::PO(iblock),&[fill;BLOCK_SIZE])?;
        }
        let mut header = VolHeader::new();
        // begin block is zero by convention, the span really starts at block 2
        header.begin_block = [0,0];
        header.end_block = u16::to_le_bytes(DIR_END_BLOCK as u16);
        header.name_len = name_len;
        header.name = name;
        header.total_blocks = u16::to_le_bytes(total as u16);
        header.last_set_date = pack_date(time);
        self.img.write_block(Block::PO(VOL_HEADER_BLOCK),&header.to_bytes())
    }
    /// Find the named file, returning (Option<slot>,directory).
    fn lookup(&mut self,name: &str) -> Result<(Option<usize>,Directory),DYNERR> {
        let dir = self.get_directory()?;
        let total = dir.total_blocks();
        let key = name.to_uppercase();
        for slot in 0..dir.file_count().min(dir.entries.len()) {
            let entry = &dir.entries[slot];
            if entry.is_live(total) && unpack_name(&entry.name,entry.name_len)==key {
                return Ok((Some(slot),dir));
            }
        }
        Ok((None,dir))
    }
    /// Read a file into the sparse file format.  Pascal has no sparse files,
    /// so the chunks are simply the blocks of the run in order.
    fn read_file(&mut self,name: &str) -> Result<super::FileImage,DYNERR> {
        match self.lookup(name)? {
            (Some(slot),dir) => {
                let entry = &dir.entries[slot];
                let (beg,end) = entry.span();
                let mut fimg = Disk::new_fimg(BLOCK_SIZE);
                for (count,iblock) in (beg..end).enumerate() {
                    fimg.chunks.insert(count,self.img.read_block(Block::PO(iblock))?);
                }
                fimg.fs_type = entry.file_type.to_vec();
                fimg.set_eof(entry.eof());
                fimg.modified = entry.mod_date.to_vec();
                Ok(fimg)
            },
            _ => Err(Box::new(Error::NoFile))
        }
    }
    /// Write a file from the sparse file format.  The chunks must be
    /// sequential with no holes, `FileImage::desequence` guarantees this.
    /// Overwriting is refused, the file must be deleted first.
    fn write_file(&mut self,name: &str, fimg: &super::FileImage) -> Result<usize,DYNERR> {
        let (name_len,packed) = match pack_name::<15>(name) {
            Ok(p) => p,
            Err(e) => {
                error!("invalid pascal filename");
                return Err(Box::new(e));
            }
        };
        let blocks = fimg.chunks.len();
        if blocks==0 {
            error!("empty file images are not allowed for pascal");
            return Err(Box::new(Error::NoFile));
        }
        let type_code = *fimg.fs_type.first().unwrap_or(&0) as usize;
        let ftype = match FileType::from_usize(type_code) {
            Some(typ) => typ,
            None => {
                error!("file type {} not recognized",type_code);
                return Err(Box::new(Error::BadMode));
            }
        };
        for b in 0..blocks {
            if !fimg.chunks.contains_key(&b) {
                error!("pascal file image had a hole which is not allowed");
                return Err(Box::new(Error::BadFormat));
            }
        }
        let (maybe_slot,mut dir) = self.lookup(name)?;
        if maybe_slot.is_some() {
            error!("overwriting is not allowed");
            return Err(Box::new(Error::DuplicateFilename));
        }
        let slot = dir.file_count();
        if slot >= dir.entries.len() {
            error!("directory is full");
            return Err(Box::new(Error::NoRoom));
        }
        let beg = match dir.find_free_span(blocks) {
            Some(b) => b,
            None => {
                error!("no contiguous run of {} blocks",blocks);
                return Err(Box::new(Error::NoRoom));
            }
        };
        let entry = &mut dir.entries[slot];
        entry.begin_block = u16::to_le_bytes(beg as u16);
        entry.end_block = u16::to_le_bytes((beg+blocks) as u16);
        entry.file_type = u16::to_le_bytes(ftype as u16);
        entry.name_len = name_len;
        entry.name = packed;
        entry.bytes_remaining = u16::to_le_bytes((BLOCK_SIZE*blocks - fimg.get_eof()) as u16);
        entry.mod_date = pack_date(None);
        dir.set_file_count(slot+1);
        dir.header.last_access_date = pack_date(None);
        for b in 0..blocks {
            self.img.write_block(Block::PO(beg+b),&fimg.chunks[&b])?;
        }
        self.save_directory(&dir)?;
        Ok(blocks)
    }
    /// Rewrite a file entry, optionally rename, retype.
    fn modify(&mut self,name: &str,maybe_new_name: Option<&str>,maybe_ftype: Option<&str>) -> STDRESULT {
        let (maybe_slot,mut dir) = self.lookup(name)?;
        let slot = match maybe_slot {
            Some(s) => s,
            None => return Err(Box::new(Error::NoFile))
        };
        if let Some(new_name) = maybe_new_name {
            let (len,packed) = pack_name::<15>(new_name)?;
            dir.entries[slot].name = packed;
            dir.entries[slot].name_len = len;
        }
        if let Some(ftype) = maybe_ftype {
            let typ = FileType::from_str(ftype)?;
            dir.entries[slot].file_type = u16::to_le_bytes(typ as u16);
        }
        self.save_directory(&dir)
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> super::FileImage {
        Disk::new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        FS_NAME.to_string()
    }
    fn catalog(&mut self, _path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        let dir = self.get_directory()?;
        let total = dir.total_blocks();
        let mut ans = Vec::new();
        for entry in &dir.entries {
            if entry.is_live(total) {
                ans.push(FileInfo {
                    name: unpack_name(&entry.name,entry.name_len),
                    typ: type_display(entry.file_type[0]),
                    locked: false,
                    blocks: entry.blocks(),
                    eof: entry.eof(),
                    aux: 0,
                    is_dir: false
                });
            }
        }
        Ok(ans)
    }
    fn create(&mut self,_path: &str) -> STDRESULT {
        error!("pascal implementation does not support operation");
        Err(Box::new(Error::DevErr))
    }
    fn delete(&mut self,name: &str) -> STDRESULT {
        match self.lookup(name)? {
            (Some(slot),mut dir) => {
                // entries stay packed, later files slide down a slot
                dir.entries.remove(slot);
                dir.entries.push(FileEntry::new());
                dir.set_file_count(dir.file_count()-1);
                self.save_directory(&dir)
            },
            _ => Err(Box::new(Error::NoFile))
        }
    }
    fn lock(&mut self,_name: &str) -> STDRESULT {
        error!("pascal implementation does not support operation");
        Err(Box::new(Error::DevErr))
    }
    fn unlock(&mut self,_name: &str) -> STDRESULT {
        error!("pascal implementation does not support operation");
        Err(Box::new(Error::DevErr))
    }
    fn rename(&mut self,old_name: &str,new_name: &str) -> STDRESULT {
        if let (Some(_),_) = self.lookup(new_name)? {
            return Err(Box::new(Error::DuplicateFilename));
        }
        self.modify(old_name,Some(new_name),None)
    }
    fn retype(&mut self,name: &str,new_type: &str,_sub_type: &str) -> STDRESULT {
        self.modify(name,None,Some(new_type))
    }
    fn bload(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(name,true)
    }
    fn bsave(&mut self,name: &str, dat: &[u8],_start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let padded = match trailing {
            Some(v) => [dat,v].concat(),
            None => dat.to_vec()
        };
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(&padded);
        fimg.fs_type = vec![FileType::Data as u8,0];
        self.write_file(name,&fimg)
    }
    fn load(&mut self,_name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        error!("pascal implementation does not support operation");
        Err(Box::new(Error::DevErr))
    }
    fn save(&mut self,_name: &str, _dat: &[u8], _typ: ItemType, _trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        error!("pascal implementation does not support operation");
        Err(Box::new(Error::DevErr))
    }
    fn read_raw(&mut self,name: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        match trunc {
            true => Ok((0,fimg.sequence_limited(fimg.get_eof()))),
            false => Ok((0,fimg.sequence()))
        }
    }
    fn write_raw(&mut self,name: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(dat);
        fimg.fs_type = vec![FileType::Text as u8,0];
        self.write_file(name,&fimg)
    }
    fn read_text(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        // keep everything, let the decoder pass over padding
        self.read_raw(name,false)
    }
    fn write_text(&mut self,name: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(dat);
        fimg.fs_type = vec![FileType::Text as u8,0];
        // the encoder pads to a page boundary; whole blocks of padding
        // do not count against the eof
        let padding = dat.len() - match dat.iter().rposition(|b| *b!=0) {
            Some(last) => last + 1,
            None => 0
        };
        fimg.set_eof(dat.len() - BLOCK_SIZE*(padding/BLOCK_SIZE));
        self.write_file(name,&fimg)
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let block = usize::from_str(num)?;
        Ok((0,self.img.read_block(Block::PO(block))?))
    }
    fn write_block(&mut self, num: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let block = usize::from_str(num)?;
        if dat.len() > BLOCK_SIZE {
            return Err(Box::new(Error::DevErr));
        }
        self.img.write_block(Block::PO(block), dat)?;
        Ok(dat.len())
    }
    fn read_any(&mut self,name: &str) -> Result<super::FileImage,DYNERR> {
        self.read_file(name)
    }
    fn write_any(&mut self,name: &str,fimg: &super::FileImage) -> Result<usize,DYNERR> {
        if fimg.file_system!=FS_NAME {
            error!("cannot write {} file image to a2 pascal",fimg.file_system);
            return Err(Box::new(Error::DevErr));
        }
        if fimg.chunk_len!=BLOCK_SIZE {
            error!("chunk length {} is incompatible with pascal",fimg.chunk_len);
            return Err(Box::new(Error::DevErr));
        }
        self.write_file(name,fimg)
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
        if dat.len() < TEXT_PAGE+1 {
            error!("file too small to be pascal text");
            return Err(Box::new(Error::BadFormat));
        }
        let file = types::SequentialText::from_bytes(dat)?;
        Ok(file.to_string())
    }
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR> {
        match types::SequentialText::from_str(s) {
            Ok(txt) => Ok(txt.to_bytes()),
            Err(_) => {
                error!("cannot encode, perhaps use raw type");
                Err(Box::new(Error::BadFormat))
            }
        }
    }
    fn free_units(&mut self) -> Result<usize,DYNERR> {
        let (free,_largest) = self.free_report()?;
        Ok(free)
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.get_directory()?.total_blocks())
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        Ok(self.get_directory()?.allocation())
    }
    fn suggest_name(&self,host_name: &str) -> String {
        // keep any extension, Pascal types live in the name (.TEXT, .CODE)
        host_name.to_uppercase().chars()
            .filter(|c| matches!(c,'A'..='Z' | '0'..='9' | '.' | '-' | '_'))
            .take(15)
            .collect()
    }
    fn suggest_type(&self,host_name: &str) -> String {
        match super::host_extension(host_name).as_deref() {
            Some("txt") | Some("text") => "txt".to_string(),
            Some("code") | Some("pcode") => "pcode".to_string(),
            _ => "bin".to_string()
        }
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        &mut self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_packing() {
        let t = chrono::NaiveDate::from_ymd_opt(1984,6,15).unwrap().and_hms_opt(0,0,0).unwrap();
        let packed = pack_date(Some(t));
        assert_eq!(u16::from_le_bytes(packed),6 + (15<<4) + (84<<9));
        let back = unpack_date(packed).expect("date did not unpack");
        assert_eq!(back.format("%Y-%m-%d").to_string(),"1984-06-15");
    }

    #[test]
    fn name_packing() {
        let (len,packed) = pack_name::<15>("sysgen.code").expect("name refused");
        assert_eq!(len,11);
        assert_eq!(&packed[0..11],"SYSGEN.CODE".as_bytes());
        assert_eq!(&packed[11..],&[0,0,0,0]);
        assert!(pack_name::<7>("TOOLONGNAME").is_err());
        assert!(pack_name::<15>("WHAT?").is_err());
    }
}
