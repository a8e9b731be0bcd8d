//! ## CP/M file system module
//!
//! This handles the CP/M 2.2 file system as found on Apple II 5.25 inch disks.
//! Every disk layout is described by a Disk Parameter Block (DPB), which a real
//! CP/M kept in the BIOS.  Here the `DiskFS` takes ownership of a
//! `bios::dpb::DiskParameterBlock` alongside the image.
//!
//! Data is quantized three ways: 128 byte records, blocks of 1K up to 16K,
//! and extents whose capacity the DPB sets.  Extents double as the directory
//! entries; scanning them yields the allocation state of every block.

pub mod types;
mod directory;

use std::collections::{BTreeMap,HashMap};
use std::str::FromStr;
use a2kit_macro::DiskStruct;
use log::{debug,error,trace,warn};
use types::*;
use directory::*;
use super::{Block,FileInfo,ItemType};
use crate::bios::dpb::DiskParameterBlock;
use crate::img;
use crate::{STDRESULT,DYNERR};

pub const FS_NAME: &str = "cpm";

/// Split a name like `2:USER2.TXT` into (2,"USER2.TXT").
/// Without the prefix the user is 0.
fn parse_xname(xname: &str) -> Result<(u8,String),DYNERR> {
    match xname.split_once(':') {
        None => Ok((0,xname.to_string())),
        Some((prefix,name)) => match u8::from_str(prefix) {
            Ok(user) if user < USER_END => Ok((user,name.to_string())),
            _ => {
                error!("prefix should be a user number below {}",USER_END);
                Err(Box::new(Error::BadFormat))
            }
        }
    }
}

/// Check an 8.3 name, sans user prefix.  Lower case is accepted,
/// `pack_name` raises it.
fn name_ok(name: &str) -> bool {
    let (base,ext) = match name.split_once('.') {
        Some((b,x)) => (b,x),
        None => (name,"")
    };
    if ext.contains('.') {
        return false;
    }
    if base.len() > 8 || ext.len() > 3 {
        debug!("name `{}` has bad field lengths",name);
        return false;
    }
    base.chars().chain(ext.chars())
        .all(|c| c.is_ascii() && !c.is_ascii_control() && !INVALID_CHARS.contains(c))
}

/// Pack a valid name into space padded base and extension fields.
fn pack_name(s: &str) -> ([u8;8],[u8;3]) {
    let upper = s.to_uppercase();
    let (base,ext) = match upper.split_once('.') {
        Some((b,x)) => (b,x),
        None => (upper.as_str(),"")
    };
    let mut ans = ([0x20u8;8],[0x20u8;3]);
    for (i,b) in base.bytes().take(8).enumerate() {
        ans.0[i] = b;
    }
    for (i,b) in ext.bytes().take(3).enumerate() {
        ans.1[i] = b;
    }
    ans
}

/// Put the name fields back as a string, flag bits dropped.
fn unpack_name(base: [u8;8],typ: [u8;3]) -> String {
    let low: Vec<u8> = base.iter().map(|b| b & 0x7f).collect();
    let high: Vec<u8> = typ.iter().map(|b| b & 0x7f).collect();
    let stem = crate::escaped_ascii_from_bytes(&low,true,false).trim_end().to_string();
    let ext = crate::escaped_ascii_from_bytes(&high,true,false).trim_end().to_string();
    match ext.len() {
        0 => stem,
        _ => [stem,ext].join(".")
    }
}

/// Load the directory from a borrowed disk image.
/// This is used to test images, as well as being called during FS operations.
fn fetch_directory(img: &mut Box<dyn img::DiskImage>,dpb: &DiskParameterBlock) -> Result<Directory,DYNERR> {
    if dpb.disk_capacity() != img.byte_capacity() {
        debug!("size mismatch: DPB has {}, img has {}",dpb.disk_capacity(),img.byte_capacity());
        return Err(Box::new(Error::Select));
    }
    let mut buf: Vec<u8> = Vec::new();
    for iblock in 0..dpb.dir_blocks() {
        buf.append(&mut img.read_block(Block::CPM((iblock,dpb.bsh,dpb.off)))?);
    }
    Ok(Directory::parse(&buf[0..dpb.dir_entries()*DIR_ENTRY_SIZE])?)
}

/// The primary interface for disk operations.
/// The DPB provided upon creation should follow DRI documentation.
pub struct Disk {
    dpb: DiskParameterBlock,
    img: Box<dyn img::DiskImage>
}

impl Disk {
    fn new_fimg(chunk_len: usize) -> super::FileImage {
        super::FileImage {
            fimg_version: super::FileImage::fimg_version(),
            file_system: String::from(FS_NAME),
            // CP/M has no type beyond the name extension, and the access
            // flags ride on the high bits of the 8+3 name.  The extension
            // bytes go in as the type, the 11 high bits as access.
            fs_type: vec![0x20;3],
            aux: vec![],
            eof: vec![0;4],
            created: vec![],
            modified: vec![],
            access: vec![0;11],
            version: vec![],
            min_version: vec![],
            chunk_len,
            chunks: HashMap::new()
        }
    }
    /// Create a disk file system using the given image as storage.
    /// The DiskFS takes ownership of the image and DPB.
    pub fn from_img(img: Box<dyn img::DiskImage>,dpb: DiskParameterBlock) -> Result<Self,DYNERR> {
        if !dpb.verify() {
            return Err(Box::new(Error::BadFormat));
        }
        Ok(Self {
            dpb,
            img
        })
    }
    /// Test an image for the CP/M file system.  A disk holding directory
    /// structures from CP/M v3 or higher (labels, timestamps) is rejected.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>,dpb: &DiskParameterBlock) -> bool {
        let dir = match fetch_directory(img,dpb) {
            Ok(d) => d,
            Err(e) => {
                debug!("CP/M directory was not readable; {}",e);
                return false;
            }
        };
        for slot in 0..dir.num_slots() {
            if dir.status(slot)==SlotStatus::Foreign {
                debug!("foreign slot type in entry {}",slot);
                return false;
            }
            if let Some(fx) = dir.extent(slot) {
                for b in fx.raw_name() {
                    let c = b & 0x7f;
                    if c < 32 || c > 126 {
                        debug!("entry {} name char {}",slot,c);
                        return false;
                    }
                }
                if fx.index() >= MAX_LOGICAL_EXTENTS {
                    debug!("entry {} extent index out of range",slot);
                    return false;
                }
                if fx.block_list(dpb).iter().any(|b| *b as usize > dpb.dsm as usize) {
                    debug!("entry {} block pointer out of range",slot);
                    return false;
                }
            }
        }
        true
    }
    fn addr(&self,iblock: usize) -> Block {
        Block::CPM((iblock,self.dpb.bsh,self.dpb.off))
    }
    fn get_directory(&mut self) -> Result<Directory,DYNERR> {
        fetch_directory(&mut self.img,&self.dpb)
    }
    fn save_directory(&mut self,dir: &Directory) -> STDRESULT {
        let buf = dir.flatten();
        let block_size = self.dpb.block_size();
        for iblock in 0..self.dpb.dir_blocks() {
            let offset = iblock*block_size;
            let end = (offset+block_size).min(buf.len());
            self.img.write_block(self.addr(iblock),&buf[offset..end])?;
        }
        Ok(())
    }
    fn is_block_free(&self,iblock: usize,dir: &Directory) -> bool {
        !self.dpb.is_reserved(iblock)
            && iblock < self.dpb.user_blocks()
            && !dir.block_in_use(iblock,&self.dpb)
    }
    /// Blocks available for file data, by scanning every live extent.
    fn num_free_blocks(&self,dir: &Directory) -> usize {
        self.dpb.user_blocks() - self.dpb.reserved_blocks() - dir.used_blocks(&self.dpb)
    }
    fn get_available_block(&self,dir: &Directory) -> Result<u16,DYNERR> {
        for iblock in 0..self.dpb.user_blocks() {
            if self.is_block_free(iblock,dir) {
                return Ok(iblock as u16);
            }
        }
        error!("disk full");
        Err(Box::new(Error::DiskFull))
    }
    /// Format disk for the CP/M file system.  For CP/M 2.2 this is nothing
    /// more than filling the user blocks with the deleted file mark.  The OS
    /// tracks are left zeroed, so the disk is not bootable.
    pub fn format(&mut self) -> STDRESULT {
        for iblock in 0..self.dpb.user_blocks() {
            self.img.write_block(self.addr(iblock),&vec![DELETED;self.dpb.block_size()])?;
        }
        Ok(())
    }
    /// Read any file into a file image. Use `FileImage::sequence` to make the result sequential.
    fn read_file(&mut self,xname: &str) -> Result<super::FileImage,DYNERR> {
        trace!("attempt to read {}",xname);
        let (user,name) = parse_xname(xname)?;
        let (base,typ) = pack_name(&name);
        let dir = self.get_directory()?;
        let slots = match dir.find(user,base,typ) {
            Some(s) => s,
            None => return Err(Box::new(Error::FileNotFound))
        };
        let mut fimg = Disk::new_fimg(self.dpb.block_size());
        let mut chunk = 0;
        let mut prev_lx = 0;
        for dir_slot in slots {
            let fx = match dir.extent(dir_slot) {
                Some(fx) => fx,
                None => return Err(Box::new(Error::ReadError))
            };
            // metadata comes redundantly from every extent; the eof
            // sticks from the one with the highest index
            fimg.fs_type = fx.raw_name()[8..11].to_vec();
            fimg.access = fx.flags().to_vec();
            fimg.set_eof(fx.eof());
            // holes show up as gaps in the index sequence
            let lx_through = fx.index() + 1;
            if lx_through == prev_lx {
                error!("repeated extent index");
                return Err(Box::new(Error::BadFormat));
            }
            let lx_base = (lx_through - 1) & !(self.dpb.exm as usize);
            if lx_base < prev_lx {
                error!("extents were not sorted");
                return Err(Box::new(Error::BadFormat));
            }
            chunk += (lx_base - prev_lx) * LOGICAL_EXTENT_SIZE / self.dpb.block_size();
            for iblock in fx.block_list(&self.dpb) {
                if iblock as usize >= self.dpb.user_blocks() {
                    error!("block pointer out of range");
                    return Err(Box::new(Error::ReadError));
                }
                if iblock > 0 {
                    trace!("read block {}",iblock);
                    fimg.chunks.insert(chunk,self.img.read_block(self.addr(iblock as usize))?);
                }
                chunk += 1;
            }
            prev_lx = lx_through;
        }
        Ok(fimg)
    }
    /// Write any file from a file image.  Use `FileImage::desequence` to convert sequential data.
    /// Overwriting is refused, the file must be deleted first.
    fn write_file(&mut self,xname: &str,fimg: &super::FileImage) -> Result<usize,DYNERR> {
        let (user,name) = parse_xname(xname)?;
        if !name_ok(&name) {
            error!("invalid CP/M filename");
            return Err(Box::new(Error::BadFormat));
        }
        let mut dir = self.get_directory()?;
        let (base,typ) = pack_name(&name);
        if dir.find(user,base,typ).is_some() {
            error!("overwriting is not allowed");
            return Err(Box::new(Error::FileExists));
        }
        if fimg.fs_type.len()!=3 || (0..3).any(|i| typ[i] != fimg.fs_type[i] & 0x7f) {
            warn!("file image type and name extension disagree");
        }
        let access: [u8;11] = match fimg.access.clone().try_into() {
            Ok(a) => a,
            Err(_) => {
                warn!("file image access field malformed, ignoring");
                [0;11]
            }
        };
        // extent positions that hold at least one chunk; a position that is
        // all holes takes no directory slot, but an empty file still takes one
        let slots_per_x = self.dpb.extent_capacity() / self.dpb.block_size();
        let x_span = (fimg.end() + slots_per_x - 1) / slots_per_x;
        let mut live_x: Vec<usize> = (0..x_span)
            .filter(|x| (x*slots_per_x..(x+1)*slots_per_x).any(|s| fimg.chunks.contains_key(&s)))
            .collect();
        if live_x.is_empty() {
            live_x.push(0);
        }
        debug!("file requires {} data blocks and {} extents",fimg.chunks.len(),live_x.len());
        if self.num_free_blocks(&dir) < fimg.chunks.len() {
            return Err(Box::new(Error::DiskFull));
        }
        if dir.free_slot_count() < live_x.len() {
            return Err(Box::new(Error::DirectoryFull));
        }
        let eof = fimg.get_eof();
        let capacity = self.dpb.extent_capacity();
        let lx_per_x = self.dpb.exm as usize + 1;
        let slots_per_lx = slots_per_x / lx_per_x;
        for (n,x) in live_x.iter().enumerate() {
            let is_last = n+1 == live_x.len();
            let dir_slot = match dir.free_slot() {
                Some(s) => s,
                None => return Err(Box::new(Error::DirectoryFull))
            };
            let mut fx = Extent::new();
            fx.user = user;
            fx.set_name(base,typ);
            fx.set_flags(&access);
            for lx in 0..lx_per_x {
                for slot in 0..slots_per_lx {
                    let chunk = x*slots_per_x + lx*slots_per_lx + slot;
                    if let Some(dat) = fimg.chunks.get(&chunk) {
                        let iblock = self.get_available_block(&dir)?;
                        trace!("map logical extent {} slot {} to block {}",lx,slot,iblock);
                        fx.set_block(slot,lx,iblock,&self.dpb);
                        dir.put_extent(dir_slot,&fx);
                        self.img.write_block(self.addr(iblock as usize),dat)?;
                    }
                }
            }
            // the index counts logical extents through this extent, minus 1
            let lx_through = match is_last {
                false => (x+1)*lx_per_x,
                true => {
                    let lx_used = match eof > x*capacity {
                        true => 1 + (eof - 1 - x*capacity)/LOGICAL_EXTENT_SIZE,
                        false => 1
                    };
                    x*lx_per_x + lx_used.min(lx_per_x)
                }
            };
            fx.set_index(lx_through - 1);
            fx.set_eof(match is_last {
                false => capacity,
                true => match eof % capacity {
                    0 if eof > 0 => capacity,
                    tail => tail
                }
            });
            dir.put_extent(dir_slot,&fx);
        }
        self.save_directory(&dir)?;
        Ok(fimg.chunks.len())
    }
    /// Modify a file, optionally rename, change access flags.
    /// Access code: negative clears the flag, 0 leaves it, positive sets it.
    /// Filenames may include the user, as in `0:fname`, `1:fname`, etc.
    fn modify(&mut self,old_xname: &str,maybe_new_xname: Option<&str>,access: [i8;11]) -> STDRESULT {
        let (user,old_name) = parse_xname(old_xname)?;
        if !name_ok(&old_name) {
            error!("invalid CP/M filename");
            return Err(Box::new(Error::BadFormat));
        }
        let mut dir = self.get_directory()?;
        let (base,typ) = pack_name(&old_name);
        let slots = match dir.find(user,base,typ) {
            Some(s) => s,
            None => return Err(Box::new(Error::FileNotFound))
        };
        if let Some(new_xname) = maybe_new_xname {
            let (new_user,new_name) = parse_xname(new_xname)?;
            if !name_ok(&new_name) {
                error!("invalid CP/M filename");
                return Err(Box::new(Error::BadFormat));
            }
            let (new_base,new_typ) = pack_name(&new_name);
            if dir.find(new_user,new_base,new_typ).is_some() {
                return Err(Box::new(Error::FileExists));
            }
            debug!("renaming to {}, user {}",new_name,new_user);
            for dir_slot in &slots {
                if let Some(mut fx) = dir.extent(*dir_slot) {
                    if fx.flags()[8] > 0 {
                        error!("{} is read only, unlock first",old_name);
                        return Err(Box::new(Error::FileReadOnly));
                    }
                    fx.user = new_user;
                    fx.set_name(new_base,new_typ);
                    dir.put_extent(*dir_slot,&fx);
                }
            }
        }
        for dir_slot in &slots {
            if let Some(mut fx) = dir.extent(*dir_slot) {
                let curr = fx.flags();
                let mut flags = [0u8;11];
                for i in 0..11 {
                    flags[i] = match access[i] {
                        a if a < 0 => 0,
                        a if a > 0 => 0x80,
                        _ => curr[i]
                    };
                }
                fx.set_flags(&flags);
                dir.put_extent(*dir_slot,&fx);
            }
        }
        self.save_directory(&dir)
    }
    /// Gather the catalog as a map from (user,name) to a uniform record.
    /// Extents sharing user, name, and type merge into one record, with the
    /// eof coming from the extent with the highest index.
    fn build_catalog(&mut self) -> Result<BTreeMap<(u8,String),FileInfo>,DYNERR> {
        let dir = self.get_directory()?;
        let mut ans: BTreeMap<(u8,String),FileInfo> = BTreeMap::new();
        let mut high_idx: HashMap<(u8,String),usize> = HashMap::new();
        for slot in 0..dir.num_slots() {
            if let Some(fx) = dir.extent(slot) {
                let name = unpack_name(fx.name,fx.typ);
                let key = (fx.user,name.clone());
                let typ = match name.split_once('.') {
                    Some((_stem,ext)) => ext.to_string(),
                    None => "".to_string()
                };
                let blocks = fx.block_list(&self.dpb).iter().filter(|b| **b > 0).count();
                let idx = fx.index();
                let info = FileInfo {
                    name,
                    typ,
                    locked: fx.flags()[8] > 0,
                    blocks,
                    eof: fx.eof(),
                    aux: fx.user as u16,
                    is_dir: false
                };
                match ans.get_mut(&key) {
                    Some(prev) => {
                        prev.blocks += blocks;
                        if idx >= high_idx[&key] {
                            prev.eof = info.eof;
                            prev.locked = info.locked;
                            high_idx.insert(key,idx);
                        }
                    },
                    None => {
                        ans.insert(key.clone(),info);
                        high_idx.insert(key,idx);
                    }
                }
            }
        }
        Ok(ans)
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> super::FileImage {
        Disk::new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        FS_NAME.to_string()
    }
    fn catalog(&mut self, path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        if path!="/" && path!="" {
            return Err(Box::new(Error::FileNotFound));
        }
        let files = self.build_catalog()?;
        Ok(files.into_values().collect())
    }
    fn create(&mut self,_path: &str) -> STDRESULT {
        error!("cpm implementation does not support operation");
        Err(Box::new(Error::Select))
    }
    fn delete(&mut self,xname: &str) -> STDRESULT {
        let (user,name) = parse_xname(xname)?;
        let (base,typ) = pack_name(&name);
        let mut dir = self.get_directory()?;
        let slots = match dir.find(user,base,typ) {
            Some(s) => s,
            None => return Err(Box::new(Error::FileNotFound))
        };
        for dir_slot in &slots {
            if let Some(mut fx) = dir.extent(*dir_slot) {
                if fx.flags()[8] > 0 {
                    error!("{} is read only, unlock first",xname);
                    return Err(Box::new(Error::FileReadOnly));
                }
                fx.user = DELETED;
                dir.put_extent(*dir_slot,&fx);
            }
        }
        self.save_directory(&dir)
    }
    fn lock(&mut self,xname: &str) -> STDRESULT {
        self.modify(xname,None,[0,0,0,0,0,0,0,0,1,0,0])
    }
    fn unlock(&mut self,xname: &str) -> STDRESULT {
        self.modify(xname,None,[0,0,0,0,0,0,0,0,-1,0,0])
    }
    fn rename(&mut self,old_xname: &str,new_xname: &str) -> STDRESULT {
        self.modify(old_xname,Some(new_xname),[0;11])
    }
    fn retype(&mut self,xname: &str,new_type: &str,_sub_type: &str) -> STDRESULT {
        // CP/M v2 uses bit 7 of typ[1] for system file (hidden file)
        match new_type {
            "sys" => self.modify(xname,None,[0,0,0,0,0,0,0,0,0,1,0]),
            "dir" => self.modify(xname,None,[0,0,0,0,0,0,0,0,0,-1,0]),
            _ => {
                error!("new type must be `dir` or `sys`");
                Err(Box::new(Error::Select))
            }
        }
    }
    fn bload(&mut self,xname: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(xname,true)
    }
    fn bsave(&mut self,xname: &str, dat: &[u8],_start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        // CP/M does not store a load address
        let padded = match trailing {
            Some(v) => [dat,v].concat(),
            None => dat.to_vec()
        };
        self.write_raw(xname,&padded)
    }
    fn load(&mut self,_xname: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        error!("cpm implementation does not support operation");
        Err(Box::new(Error::Select))
    }
    fn save(&mut self,_xname: &str, _dat: &[u8], _typ: ItemType, _trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        error!("cpm implementation does not support operation");
        Err(Box::new(Error::Select))
    }
    fn read_raw(&mut self,xname: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(xname)?;
        match trunc {
            true => Ok((0,fimg.sequence_limited(fimg.get_eof()))),
            false => Ok((0,fimg.sequence()))
        }
    }
    fn write_raw(&mut self,xname: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let (_user,name) = parse_xname(xname)?;
        let (_base,typ) = pack_name(&name);
        let mut fimg = Disk::new_fimg(self.dpb.block_size());
        fimg.desequence(dat);
        fimg.fs_type = typ.to_vec();
        self.write_file(xname,&fimg)
    }
    fn read_text(&mut self,xname: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        // eof is only known to a record boundary, let the decoder stop at 0x1a
        self.read_raw(xname,false)
    }
    fn write_text(&mut self,xname: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        self.write_raw(xname,dat)
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let block = usize::from_str(num)?;
        Ok((0,self.img.read_block(self.addr(block))?))
    }
    fn write_block(&mut self, num: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let block = usize::from_str(num)?;
        if dat.len() > self.dpb.block_size() {
            return Err(Box::new(Error::Select));
        }
        self.img.write_block(self.addr(block), dat)?;
        Ok(dat.len())
    }
    fn read_any(&mut self,xname: &str) -> Result<super::FileImage,DYNERR> {
        self.read_file(xname)
    }
    fn write_any(&mut self,xname: &str,fimg: &super::FileImage) -> Result<usize,DYNERR> {
        if fimg.file_system!=FS_NAME {
            error!("cannot write {} file image to cpm",fimg.file_system);
            return Err(Box::new(Error::Select));
        }
        if fimg.chunk_len!=self.dpb.block_size() {
            error!("chunk length {} is incompatible with the DPB for this CP/M",fimg.chunk_len);
            return Err(Box::new(Error::Select));
        }
        self.write_file(xname,fimg)
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
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
        let dir = self.get_directory()?;
        Ok(self.num_free_blocks(&dir))
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.dpb.user_blocks())
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        let dir = self.get_directory()?;
        Ok((0..self.dpb.user_blocks()).map(|b| self.is_block_free(b,&dir)).collect())
    }
    fn suggest_name(&self,host_name: &str) -> String {
        let clean = |s: &str,max: usize| -> String {
            s.to_uppercase().chars()
                .filter(|c| c.is_ascii_graphic() && !INVALID_CHARS.contains(*c))
                .take(max)
                .collect()
        };
        let stem = clean(&super::host_stem(host_name),8);
        match super::host_extension(host_name) {
            Some(ext) => [stem,clean(&ext,3)].join("."),
            None => stem
        }
    }
    fn suggest_type(&self,host_name: &str) -> String {
        // the type is simply the name extension
        match super::host_extension(host_name) {
            Some(ext) => {
                let mut ans = ext.to_uppercase();
                ans.truncate(3);
                ans
            },
            None => String::new()
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
    fn name_packing() {
        let (base,typ) = pack_name("hello.txt");
        assert_eq!(base,*b"HELLO   ");
        assert_eq!(typ,*b"TXT");
        assert_eq!(unpack_name(base,typ),"HELLO.TXT");
    }

    #[test]
    fn user_prefix() {
        assert_eq!(parse_xname("2:USER2.TXT").unwrap(),(2,"USER2.TXT".to_string()));
        assert_eq!(parse_xname("PLAIN.TXT").unwrap(),(0,"PLAIN.TXT".to_string()));
        assert!(parse_xname("16:TOOBIG.TXT").is_err());
    }

    #[test]
    fn extent_eof() {
        let mut fx = Extent::new();
        fx.set_index(0);
        fx.set_eof(1000);
        assert_eq!(fx.eof(),1024);
        fx.set_index(1);
        fx.set_eof(300);
        assert_eq!(fx.eof(),16384+384);
    }
}
