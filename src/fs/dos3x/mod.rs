//! # DOS 3.x file system module
//! This manipulates disk images containing one standard bootable
//! or non-bootable DOS 3.x volume.  At the level of this module,
//! wide latitude is allowed for track counts, while sector counts
//! are restricted to 13, 16, or 32.  The 32 sector volumes are the
//! UniDOS and OzDOS halves, which are accessed through `img::dual`.
//!
//! * Analogues of BASIC commands like SAVE, BSAVE etc. are exposed through the `DiskFS` trait
//! * The module will try to emulate the order in which DOS would access sectors

pub mod types;
mod directory;

use std::collections::HashMap;
use std::str::FromStr;
use num_traits::FromPrimitive;
use a2kit_macro::DiskStruct;
use log::{debug,error};

use types::*;
use directory::*;
use super::{Block,FileImage,FileInfo};
use super::ItemType;
use crate::img;
use crate::{STDRESULT,DYNERR};

pub use types::FS_NAME;

fn file_name_to_string(fname: [u8;30]) -> String {
    // fname is negative ASCII padded to the end with spaces
    // non-ASCII will go as hex escapes
    String::from(crate::escaped_ascii_from_bytes(&fname,true,true).trim_end())
}

fn string_to_file_name(s: &str) -> [u8;30] {
    let mut ans: [u8;30] = [0xa0;30]; // fill with negative spaces
    let unescaped = crate::escaped_ascii_to_bytes(s,true);
    let n = usize::min(unescaped.len(),30);
    ans[0..n].copy_from_slice(&unescaped[0..n]);
    ans
}

/// an entry slot is in use if the tslist track is neither 0 nor 255
fn entry_is_live(entry: &DirectoryEntry) -> bool {
    entry.tsl_track > 0 && entry.tsl_track < 255
}

/// Create an empty file image appropriate for DOS 3.x.
/// DOS stores only the type with a file, so most metadata is unused.
pub fn new_fimg(chunk_len: usize) -> FileImage {
    FileImage {
        fimg_version: FileImage::fimg_version(),
        file_system: String::from(FS_NAME),
        chunk_len,
        eof: vec![],
        fs_type: vec![FileType::Text as u8],
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
pub struct Disk
{
    // VTOC works for any DOS 3.x
    vtoc: VTOC,
    img: Box<dyn img::DiskImage>
}

impl Disk
{
    /// Create a disk file system using the given image as storage.
    /// The DiskFS takes ownership of the image.
    pub fn from_img(mut img: Box<dyn img::DiskImage>) -> Result<Self,DYNERR> {
        // only 13 sector images will accept D13 addresses, so this is not ambiguous
        for addr in [Block::D13([17,0]),Block::DO([17,0])] {
            if let Ok(dat) = img.read_block(addr) {
                let vtoc = VTOC::from_bytes(&dat)?;
                return Ok(Self { vtoc, img });
            }
        }
        Err(Box::new(Error::IOError))
    }
    fn test_vtoc(vtoc: &VTOC,tlen: u8,slen: u8) -> bool {
        let vers_ok = match slen {
            13 => vtoc.version <= 2,
            _ => vtoc.version >= 3
        };
        if !vers_ok {
            debug!("VTOC wrong version {}",vtoc.version);
            return false;
        }
        if vtoc.vol < 1 || vtoc.vol > 254 {
            debug!("volume {} out of range",vtoc.vol);
            return false;
        }
        if vtoc.track1 != VTOC_TRACK || vtoc.sector1 != slen-1 {
            debug!("VTOC wrong track1 {}, sector1 {}",vtoc.track1,vtoc.sector1);
            return false;
        }
        if vtoc.bytes != [0,1] || vtoc.sectors != slen || vtoc.tracks != tlen {
            debug!("VTOC wrong bytes {:?}, sectors {}, tracks {}",vtoc.bytes,vtoc.sectors,vtoc.tracks);
            return false;
        }
        true
    }
    fn test_img_with(img: &mut Box<dyn img::DiskImage>,addr: Block,tlen: u8,slen: u8) -> bool {
        if let Ok(dat) = img.read_block(addr) {
            if let Ok(vtoc) = VTOC::from_bytes(&dat) {
                return Self::test_vtoc(&vtoc,tlen,slen);
            }
        }
        debug!("VTOC sector was not readable at {}",addr);
        false
    }
    /// Test an image to see if it already contains DOS 3.x.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> bool {
        match img.track_count() {
            35 => Self::test_img_with(img,Block::D13([17,0]),35,13) || Self::test_img_with(img,Block::DO([17,0]),35,16),
            50 => Self::test_img_with(img,Block::DO([17,0]),50,32),
            _ => {
                debug!("track count {} is unexpected",img.track_count());
                false
            }
        }
    }
    fn addr(&self,ts: [u8;2]) -> Block {
        match self.vtoc.sectors {
            13 => Block::D13([ts[0] as usize,ts[1] as usize]),
            _ => Block::DO([ts[0] as usize,ts[1] as usize])
        }
    }
    fn verify_ts(&self,track: u8,sector: u8) -> STDRESULT {
        if track >= self.vtoc.tracks || sector >= self.vtoc.sectors {
            error!("track {} sector {} out of bounds, image may be damaged",track,sector);
            return Err(Box::new(Error::Range));
        }
        Ok(())
    }
    fn get_track_map(&self,track: u8) -> u32 {
        let i = (track as usize)*4;
        u32::from_be_bytes(self.vtoc.bitmap[i..i+4].try_into().expect("unreachable"))
    }
    fn save_track_map(&mut self,track: u8,map: u32) -> STDRESULT {
        // keep the copy in this object and the copy on disk in step
        let i = (track as usize)*4;
        self.vtoc.bitmap[i..i+4].copy_from_slice(&u32::to_be_bytes(map));
        self.img.write_block(self.addr([VTOC_TRACK,0]),&self.vtoc.to_bytes())
    }
    fn update_last_track(&mut self,track: u8) -> STDRESULT {
        // The last_direction and last_track fields are not discussed in the DOS manual.
        // This way of setting them is a guess based on emulator outputs.
        if track != VTOC_TRACK {
            self.vtoc.last_direction = match track < VTOC_TRACK {
                true => 255,
                false => 1
            };
            self.vtoc.last_track = track;
        }
        self.img.write_block(self.addr([VTOC_TRACK,0]),&self.vtoc.to_bytes())
    }
    /// bit position within the track map; bit 31 is sector 0
    fn sector_bit(&self,sector: u8) -> u32 {
        (sector + 32 - self.vtoc.sectors) as u32
    }
    fn allocate_sector(&mut self,track: u8,sector: u8) -> STDRESULT {
        let map = self.get_track_map(track) & !(1 << self.sector_bit(sector));
        self.save_track_map(track,map)
    }
    fn deallocate_sector(&mut self,track: u8,sector: u8) -> STDRESULT {
        let map = self.get_track_map(track) | 1 << self.sector_bit(sector);
        self.save_track_map(track,map)
    }
    fn is_sector_free(&self,track: u8,sector: u8) -> bool {
        self.get_track_map(track) & (1 << self.sector_bit(sector)) > 0
    }
    /// Read a sector of data into buffer `data`, starting at `offset` within the buffer.
    /// If `data` is shorter than the sector, the partial sector is copied.
    fn read_sector(&mut self,data: &mut [u8],ts: [u8;2],offset: usize) -> STDRESULT {
        if offset > data.len() {
            error!("invalid offset in read sector");
            return Err(Box::new(Error::Range));
        }
        let bytes = u16::from_le_bytes(self.vtoc.bytes) as usize;
        let actual_len = usize::min(data.len()-offset,bytes);
        let buf = self.img.read_block(self.addr(ts))?;
        data[offset..offset+actual_len].copy_from_slice(&buf[0..actual_len]);
        Ok(())
    }
    /// Zap and allocate the sector in one step.
    fn write_sector(&mut self,data: &[u8],ts: [u8;2],offset: usize) -> STDRESULT {
        self.zap_sector(data,ts,offset)?;
        self.allocate_sector(ts[0],ts[1])
    }
    /// Writes a sector of data from buffer `data`, starting at `offset` within the buffer.
    /// If `data` is shorter than the sector, trailing bytes are unaffected.
    fn zap_sector(&mut self,data: &[u8],ts: [u8;2],offset: usize) -> STDRESULT {
        if offset > data.len() {
            error!("invalid offset in write sector");
            return Err(Box::new(Error::Range));
        }
        let bytes = u16::from_le_bytes(self.vtoc.bytes) as usize;
        let actual_len = usize::min(data.len()-offset,bytes);
        self.img.write_block(self.addr(ts),&data[offset..offset+actual_len])
    }
    /// Create any DOS 3.x volume
    pub fn init(&mut self,vol: u8,last_track_written: u8,tracks: u8,sectors: u8) -> STDRESULT {
        assert!(vol>0 && vol<255);
        assert!(tracks>VTOC_TRACK && tracks<=50);
        assert!(sectors==13 || sectors==16 || sectors==32);
        assert!(last_track_written>0 && last_track_written<tracks);

        // build the Volume Table of Contents
        self.vtoc.pad1 = match sectors {
            13 => 2,
            _ => 4
        };
        self.vtoc.vol = vol;
        self.vtoc.last_track = last_track_written;
        self.vtoc.last_direction = 1;
        self.vtoc.max_pairs = 0x7a;
        self.vtoc.track1 = VTOC_TRACK;
        self.vtoc.sector1 = sectors-1;
        self.vtoc.version = match sectors {
            13 => 2,
            _ => 3
        };
        self.vtoc.bytes = [0,1];
        self.vtoc.sectors = sectors;
        self.vtoc.tracks = tracks;
        // all tracks free except 0, unused sector bits stay low
        let all_free: [u8;4] = match sectors {
            13 => u32::to_be_bytes(0xfff80000),
            16 => u32::to_be_bytes(0xffff0000),
            _ => u32::to_be_bytes(0xffffffff)
        };
        for track in 1..tracks as usize {
            self.vtoc.bitmap[track*4..track*4+4].copy_from_slice(&all_free);
        }
        // the VTOC track is wholly given to the VTOC and directory
        self.vtoc.bitmap[VTOC_TRACK as usize*4..VTOC_TRACK as usize*4+4].copy_from_slice(&[0;4]);
        self.write_sector(&self.vtoc.to_bytes(),[VTOC_TRACK,0],0)?;
        // chain the directory sectors in descending order
        let mut dir = DirectorySector::new();
        self.write_sector(&dir.to_bytes(),[VTOC_TRACK,1],0)?;
        for sec in 2..sectors {
            dir.next_track = VTOC_TRACK;
            dir.next_sector = sec - 1;
            self.write_sector(&dir.to_bytes(),[VTOC_TRACK,sec],0)?;
        }
        Ok(())
    }
    /// Create a standard DOS 3.2 volume (113K)
    pub fn init32(&mut self,vol: u8) -> STDRESULT {
        self.init(vol,17,35,13)
    }
    /// Create a standard DOS 3.3 small volume (140K)
    pub fn init33(&mut self,vol: u8) -> STDRESULT {
        self.init(vol,17,35,16)
    }
    fn num_free_sectors(&self) -> usize {
        let mut ans: usize = 0;
        for track in 0..self.vtoc.tracks {
            for sector in 0..self.vtoc.sectors {
                if self.is_sector_free(track,sector) {
                    ans += 1;
                }
            }
        }
        ans
    }
    fn get_next_free_sector(&self,prefer_jump: bool) -> [u8;2] {
        // Search algorithm outlined in the DOS manual seems inconsistent with actual results from emulators.
        // This algorithm is a guess at how DOS is doing it, based on emulator outputs.
        // Fortunately we don't have to emulate this exactly for the disk to work.
        let tvtoc: u8 = self.vtoc.track1;
        let tstart = match self.vtoc.last_track {
            x if x>=self.vtoc.tracks => tvtoc-1,
            x if x>tvtoc && prefer_jump => x+1,
            x if x<tvtoc && prefer_jump => x-1,
            x => x
        };
        let tend = self.vtoc.tracks;
        // build search order
        let search_tracks: Vec<u8> = if tstart<tvtoc {
            [
                (1..tstart+1).rev().collect::<Vec<u8>>(),
                (tvtoc+1..tend).collect(),
                (tstart+1..tvtoc).rev().collect()
            ].concat()
        } else {
            [
                (tstart..tend).collect::<Vec<u8>>(),
                (1..tvtoc).rev().collect(),
                (tvtoc+1..tstart).collect()
            ].concat()
        };
        // search
        for track in search_tracks {
            for sector in (0..self.vtoc.sectors).rev() {
                if self.is_sector_free(track,sector) {
                    return [track,sector];
                }
            }
        }
        [0,0]
    }
    /// Gather the whole directory chain in order, with the address of each sector.
    /// Every directory operation goes through this.
    fn get_directory(&mut self) -> Result<Vec<([u8;2],DirectorySector)>,DYNERR> {
        let mut ans = Vec::new();
        let mut ts = [self.vtoc.track1,self.vtoc.sector1];
        let mut buf = vec![0;256];
        for _try in 0..types::MAX_DIRECTORY_REPS {
            self.verify_ts(ts[0],ts[1])?;
            self.read_sector(&mut buf,ts,0)?;
            let dir = DirectorySector::from_bytes(&buf)?;
            let next = [dir.next_track,dir.next_sector];
            ans.push((ts,dir));
            if next == [0,0] {
                return Ok(ans);
            }
            ts = next;
        }
        error!("the disk image directory seems to be damaged");
        Err(Box::new(Error::IOError))
    }
    /// Return a tuple with ([track,sector],entry index), or an error if the directory is full
    fn get_next_directory_slot(&mut self) -> Result<([u8;2],u8),DYNERR> {
        for (ts,dir) in self.get_directory()? {
            for (e,entry) in dir.entries.iter().enumerate() {
                if !entry_is_live(entry) {
                    return Ok((ts,e as u8));
                }
            }
        }
        Err(Box::new(Error::DiskFull))
    }
    /// Scan the directory sectors to find the tslist of the named file and the file type.
    /// If the file does not exist the tslist will come back as [0,0].
    fn get_tslist_sector(&mut self,name: &str) -> Result<([u8;2],u8),DYNERR> {
        let fname = string_to_file_name(name);
        for (_ts,dir) in self.get_directory()? {
            for entry in dir.entries.as_ref() {
                if fname==entry.name && entry_is_live(entry) {
                    return Ok(([entry.tsl_track,entry.tsl_sector],entry.file_type));
                }
            }
        }
        Ok(([0,0],0))
    }
    /// Read any file into the sparse file format.  Use `FileImage::sequence` to flatten the result
    /// when it is expected to be sequential.
    fn read_file(&mut self,name: &str) -> Result<FileImage,DYNERR> {
        let (mut next_tslist,ftype) = self.get_tslist_sector(name)?;
        if next_tslist==[0,0] {
            return Err(Box::new(Error::FileNotFound));
        }
        let mut ans = new_fimg(256);
        ans.version = vec![self.vtoc.version];
        let mut buf = vec![0;256];
        let mut count: usize = 0;
        for _try in 0..types::MAX_TSLIST_REPS {
            self.read_sector(&mut buf,next_tslist,0)?;
            let tslist = TrackSectorList::from_bytes(&buf)?;
            for p in 0..self.vtoc.max_pairs as usize {
                let next = [tslist.pairs[p*2],tslist.pairs[p*2+1]];
                if next[0]>0 {
                    let mut full_buf: Vec<u8> = vec![0;256];
                    self.read_sector(&mut full_buf,next,0)?;
                    ans.chunks.insert(count,full_buf);
                }
                count += 1;
            }
            if tslist.next_track==0 {
                ans.fs_type = vec![ftype];
                return Ok(ans);
            }
            next_tslist = [tslist.next_track,tslist.next_sector];
        }
        error!("the disk image track sector list seems to be damaged");
        Err(Box::new(Error::IOError))
    }
    /// Write any sparse or sequential file.  Use `FileImage::desequence` to put sequential data
    /// into the sparse file format, with no loss of generality.
    /// Unlike DOS, nothing is written unless there is enough space for all the data.
    fn write_file(&mut self,name: &str,fimg: &FileImage) -> Result<usize,DYNERR> {
        if fimg.chunks.len()==0 {
            error!("empty data is not allowed for DOS 3.x file images");
            return Err(Box::new(Error::EndOfData));
        }
        let (named_ts,_ftype) = self.get_tslist_sector(name)?;
        if named_ts!=[0,0] {
            error!("overwriting is not allowed");
            return Err(Box::new(Error::WriteProtected));
        }
        // this is a new file
        // unlike DOS, we do not write anything unless there is room
        let data_sectors = fimg.chunks.len();
        let tslist_sectors = 1 + (fimg.end()-1)/self.vtoc.max_pairs as usize;
        if data_sectors + tslist_sectors > self.num_free_sectors() {
            return Err(Box::new(Error::DiskFull));
        }

        let mut sec_base = 0; // in units of pairs
        let mut p = 0; // pairs written in current tslist sector
        let mut tslist = TrackSectorList::new();
        let mut tslist_ts = self.get_next_free_sector(true);
        self.allocate_sector(tslist_ts[0],tslist_ts[1])?; // reserve this sector
        self.update_last_track(tslist_ts[0])?;

        // write the directory entry
        let (ts,e) = self.get_next_directory_slot()?;
        let mut dir_buf = vec![0;256];
        self.read_sector(&mut dir_buf,ts,0)?;
        let mut dir = DirectorySector::from_bytes(&dir_buf)?;
        let entry = &mut dir.entries[e as usize];
        entry.tsl_track = tslist_ts[0];
        entry.tsl_sector = tslist_ts[1];
        match fimg.fs_type.first().map(|b| FileType::from_u8(*b & 0x7f)) {
            Some(Some(_)) => entry.file_type = fimg.fs_type[0],
            _ => return Err(Box::new(Error::Range))
        }
        entry.name = string_to_file_name(name);
        entry.sectors = u16::to_le_bytes(tslist_sectors as u16 + data_sectors as u16);
        self.write_sector(&dir.to_bytes(),ts,0)?;

        // write the data and TS list as we go
        for s in 0..fimg.end() {
            if let Some(chunk) = fimg.chunks.get(&s) {
                let data_ts = self.get_next_free_sector(false);
                tslist.pairs[p*2] = data_ts[0];
                tslist.pairs[p*2+1] = data_ts[1];
                self.write_sector(&tslist.to_bytes(),tslist_ts,0)?;
                self.write_sector(chunk,data_ts,0)?;
                self.update_last_track(data_ts[0])?;
            } else {
                tslist.pairs[p*2] = 0;
                tslist.pairs[p*2+1] = 0;
                self.write_sector(&tslist.to_bytes(),tslist_ts,0)?;
            }
            p += 1;
            if p==self.vtoc.max_pairs as usize && s+1!=fimg.end() {
                // tslist spilled over to another sector
                let next_tslist_ts = self.get_next_free_sector(false);
                tslist.next_track = next_tslist_ts[0];
                tslist.next_sector = next_tslist_ts[1];
                self.write_sector(&tslist.to_bytes(),tslist_ts,0)?;
                self.update_last_track(tslist_ts[0])?;
                tslist_ts = next_tslist_ts;
                sec_base += self.vtoc.max_pairs as usize;
                tslist = TrackSectorList::new();
                tslist.sector_base = u16::to_le_bytes(sec_base as u16);
                p = 0;
            }
        }

        Ok(data_sectors + tslist_sectors)
    }
    /// modify a file entry, optionally lock, unlock, rename, retype; attempt to rename a locked file will fail.
    fn modify(&mut self,name: &str,maybe_lock: Option<bool>,maybe_new_name: Option<&str>,maybe_ftype: Option<&str>) -> STDRESULT {
        let fname = string_to_file_name(name);
        for (dir_ts,mut dir) in self.get_directory()? {
            for entry in dir.entries.as_mut() {
                if fname==entry.name && entry_is_live(entry) {
                    if entry.file_type > 127 && maybe_new_name.is_some() {
                        return Err(Box::new(Error::FileLocked));
                    }
                    entry.file_type = match maybe_lock {
                        Some(true) => entry.file_type | 0x80,
                        Some(false) => entry.file_type & 0x7f,
                        None => entry.file_type
                    };
                    if let Some(new_name) = maybe_new_name {
                        entry.name = string_to_file_name(new_name);
                    }
                    if let Some(ftype) = maybe_ftype {
                        entry.file_type = FileType::from_str(ftype)? as u8;
                    }
                    let dat = dir.to_bytes();
                    return self.write_sector(&dat,dir_ts,0);
                }
            }
        }
        Err(Box::new(Error::FileNotFound))
    }
    /// Compute the stated length and load address of a file, which requires
    /// looking inside the file for all types except raw text.
    fn eof_and_aux(&mut self,name: &str,typ: u8) -> (usize,u16) {
        let seq = match self.read_file(name) {
            Ok(fimg) => fimg.sequence(),
            Err(_) => return (0,0)
        };
        match FileType::from_u8(typ & 0x7f) {
            Some(FileType::Binary) => match BinaryData::from_bytes(&seq) {
                Ok(bin) => (bin.data.len(),u16::from_le_bytes(bin.start)),
                Err(_) => (seq.len(),0)
            },
            Some(FileType::Applesoft) | Some(FileType::Integer) => match TokenizedProgram::from_bytes(&seq) {
                Ok(prog) => (prog.program.len(),0),
                Err(_) => (seq.len(),0)
            },
            _ => match SequentialText::from_bytes(&seq) {
                Ok(txt) => (txt.text.len(),0),
                Err(_) => (seq.len(),0)
            }
        }
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> FileImage {
        new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        String::from(FS_NAME)
    }
    fn catalog(&mut self,_path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        let mut listed: Vec<(String,u8,u16)> = Vec::new();
        for (_ts,dir) in self.get_directory()? {
            for entry in dir.entries.as_ref() {
                if entry_is_live(entry) {
                    listed.push((
                        file_name_to_string(entry.name),
                        entry.file_type,
                        u16::from_le_bytes(entry.sectors)
                    ));
                }
            }
        }
        let mut ans = Vec::new();
        for (name,typ,sectors) in listed {
            let (eof,aux) = self.eof_and_aux(&name,typ);
            ans.push(FileInfo {
                name,
                typ: String::from(type_to_display(typ).trim_start_matches(['*',' '])),
                locked: typ>127,
                blocks: sectors as usize,
                eof,
                aux,
                is_dir: false
            });
        }
        Ok(ans)
    }
    fn create(&mut self,_path: &str) -> STDRESULT {
        error!("DOS 3.x does not support directories");
        Err(Box::new(Error::SyntaxError))
    }
    fn delete(&mut self,name: &str) -> STDRESULT {
        let fname = string_to_file_name(name);
        for (dir_ts,mut dir) in self.get_directory()? {
            for entry in dir.entries.as_mut() {
                if fname!=entry.name || !entry_is_live(entry) {
                    continue;
                }
                if entry.file_type > 127 {
                    return Err(Box::new(Error::FileLocked));
                }
                // free the data and tslist sectors, then flag the entry,
                // saving the tslist track in the last name byte as DOS does
                let mut tslist_ts = [entry.tsl_track,entry.tsl_sector];
                let mut tsbuf: Vec<u8> = vec![0;256];
                for _try in 0..types::MAX_TSLIST_REPS {
                    self.read_sector(&mut tsbuf,tslist_ts,0)?;
                    let tslist = TrackSectorList::from_bytes(&tsbuf)?;
                    for p in 0..self.vtoc.max_pairs as usize {
                        if tslist.pairs[p*2]>0 && tslist.pairs[p*2]<255 {
                            self.deallocate_sector(tslist.pairs[p*2],tslist.pairs[p*2+1])?;
                        }
                    }
                    self.deallocate_sector(tslist_ts[0],tslist_ts[1])?;
                    tslist_ts = [tslist.next_track,tslist.next_sector];
                    if tslist_ts==[0,0] {
                        entry.name[entry.name.len()-1] = entry.tsl_track;
                        entry.tsl_track = 255;
                        let dat = dir.to_bytes();
                        return self.write_sector(&dat,dir_ts,0);
                    }
                }
                error!("the disk image track sector list seems to be damaged");
                return Err(Box::new(Error::IOError));
            }
        }
        Err(Box::new(Error::FileNotFound))
    }
    fn lock(&mut self,name: &str) -> STDRESULT {
        self.modify(name,Some(true),None,None)
    }
    fn unlock(&mut self,name: &str) -> STDRESULT {
        self.modify(name,Some(false),None,None)
    }
    fn rename(&mut self,old_name: &str,new_name: &str) -> STDRESULT {
        self.modify(old_name,None,Some(new_name),None)
    }
    fn retype(&mut self,name: &str,new_type: &str,_sub_type: &str) -> STDRESULT {
        self.modify(name,None,None,Some(new_type))
    }
    fn bload(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        let ans = types::BinaryData::from_bytes(&fimg.sequence())?;
        Ok((u16::from_le_bytes(ans.start),ans.data))
    }
    fn bsave(&mut self,name: &str,dat: &[u8],start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let file = types::BinaryData::pack(dat,start_addr);
        let padded = match trailing {
            Some(v) => [file.to_bytes(),v.to_vec()].concat(),
            None => file.to_bytes()
        };
        let mut fimg = new_fimg(256);
        fimg.desequence(&padded);
        fimg.fs_type = vec![FileType::Binary as u8];
        self.write_file(name,&fimg)
    }
    fn load(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        Ok((0,types::TokenizedProgram::from_bytes(&fimg.sequence())?.program))
    }
    fn save(&mut self,name: &str,dat: &[u8],typ: ItemType,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let padded = types::TokenizedProgram::pack(dat,trailing).to_bytes();
        let fs_type = match typ {
            ItemType::ApplesoftTokens => FileType::Applesoft,
            ItemType::IntegerTokens => FileType::Integer,
            _ => return Err(Box::new(Error::FileTypeMismatch))
        };
        let mut fimg = new_fimg(256);
        fimg.desequence(&padded);
        fimg.fs_type = vec![fs_type as u8];
        self.write_file(name,&fimg)
    }
    fn read_raw(&mut self,name: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        let seq = fimg.sequence();
        if !trunc {
            return Ok((0,seq));
        }
        // DOS does not store an EOF, the best we can do is parse the file header
        match fimg.fs_type.first().map(|b| FileType::from_u8(*b & 0x7f)) {
            Some(Some(FileType::Binary)) => {
                let bin = types::BinaryData::from_bytes(&seq)?;
                Ok((u16::from_le_bytes(bin.start),bin.data))
            },
            Some(Some(FileType::Applesoft)) | Some(Some(FileType::Integer)) => {
                Ok((0,types::TokenizedProgram::from_bytes(&seq)?.program))
            },
            _ => Ok((0,types::SequentialText::from_bytes(&seq)?.text))
        }
    }
    fn write_raw(&mut self,name: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = new_fimg(256);
        fimg.desequence(dat);
        fimg.fs_type = vec![FileType::Text as u8];
        self.write_file(name,&fimg)
    }
    fn read_text(&mut self,name: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let fimg = self.read_file(name)?;
        Ok((0,fimg.sequence()))
    }
    fn write_text(&mut self,name: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        self.write_raw(name,dat)
    }
    fn read_any(&mut self,name: &str) -> Result<FileImage,DYNERR> {
        self.read_file(name)
    }
    fn write_any(&mut self,name: &str,fimg: &FileImage) -> Result<usize,DYNERR> {
        if fimg.chunk_len!=256 {
            error!("chunk length {} is incompatible with DOS 3.x",fimg.chunk_len);
            return Err(Box::new(Error::Range));
        }
        self.write_file(name,fimg)
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let sector = usize::from_str(num)?;
        let secs = self.vtoc.sectors as usize;
        if sector >= self.vtoc.tracks as usize*secs {
            return Err(Box::new(Error::Range));
        }
        let mut buf: Vec<u8> = vec![0;256];
        self.read_sector(&mut buf,[(sector/secs) as u8,(sector%secs) as u8],0)?;
        Ok((0,buf))
    }
    fn write_block(&mut self,num: &str,dat: &[u8]) -> Result<usize,DYNERR> {
        let sector = usize::from_str(num)?;
        let secs = self.vtoc.sectors as usize;
        if dat.len()>256 || sector >= self.vtoc.tracks as usize*secs {
            return Err(Box::new(Error::Range));
        }
        self.zap_sector(dat,[(sector/secs) as u8,(sector%secs) as u8],0)?;
        Ok(dat.len())
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
        let file = types::SequentialText::from_bytes(dat)?;
        Ok(file.to_string())
    }
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR> {
        let file = types::SequentialText::from_str(s)?;
        Ok(file.to_bytes())
    }
    fn free_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.num_free_sectors())
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.vtoc.tracks as usize * self.vtoc.sectors as usize)
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        let mut ans = Vec::new();
        for track in 0..self.vtoc.tracks {
            for sector in 0..self.vtoc.sectors {
                ans.push(self.is_sector_free(track,sector));
            }
        }
        Ok(ans)
    }
    fn suggest_name(&self,host_name: &str) -> String {
        let mut ans = String::new();
        for c in super::host_stem(host_name).to_uppercase().chars() {
            if ans.len()>=30 {
                break;
            }
            // DOS allows almost anything except commas
            if (c.is_ascii_graphic() && c!=',') || c==' ' {
                ans.push(c);
            }
        }
        ans.trim().to_string()
    }
    fn suggest_type(&self,host_name: &str) -> String {
        match super::host_extension(host_name).as_deref() {
            Some("txt") | Some("text") => "txt".to_string(),
            Some("bas") => "atok".to_string(),
            Some("int") => "itok".to_string(),
            _ => "bin".to_string()
        }
    }
    fn needs_address(&self) -> bool {
        true
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        &mut self.img
    }
}
