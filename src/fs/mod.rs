//! # File system layer
//!
//! Each sub-module is a driver for one on-disk file system.  A driver owns a
//! boxed `DiskImage` and exposes the `DiskFS` trait, which is the only surface
//! external tooling needs: catalogs, file operations, and free space queries.
//!
//! Files move between drivers as `FileImage` values, a sparse chunk map plus
//! raw metadata fields.  No driver has to understand another driver's layout.
//!
//! The `Block` enumeration names an allocation scheme together with one unit
//! of it.  A driver hands a `Block` to the image layer, which resolves it to
//! physical sectors.  Skew tables themselves live in `bios::skew`.

pub mod dos3x;
pub mod prodos;
pub mod pascal;
pub mod cpm;
pub mod rdos;
pub mod nakedos;

use std::fmt;
use std::collections::HashMap;
use crate::img;
use crate::{STDRESULT,DYNERR};

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file system not compatible with request")]
    FileSystemMismatch,
    #[error("file image format is wrong")]
    FileImageFormat,
    #[error("high level file format is wrong")]
    FileFormat,
    #[error("file system is read-only")]
    ReadOnly
}

/// Language file categories accepted by `DiskFS::save`
#[derive(PartialEq,Eq,Clone,Copy)]
pub enum ItemType {
    ApplesoftTokens,
    IntegerTokens,
    Binary,
    Text
}

/// One allocation unit, tagged with the addressing scheme it belongs to.
/// The image layer makes the final translation to physical sectors, and may
/// refuse schemes it cannot serve.  A DO image should still accept `PO`
/// blocks, since ProDOS volumes are often stored in DOS order.
#[derive(PartialEq,Eq,Clone,Copy,Hash)]
pub enum Block {
    /// [track,sector] on a 13 sector disk
    D13([usize;2]),
    /// [track,sector] in DOS logical order
    DO([usize;2]),
    /// ProDOS block number
    PO(usize),
    /// (absolute block, BSH, OFF) per the CP/M parameter block
    CPM((usize,u8,u16))
}

impl Block {
    /// Expand a block into the logical sectors it spans, assuming sectors
    /// ascend monotonically within the block.  Skew is the caller's problem.
    /// CP/M sectors count from 1 and honor the reserved track offset.
    pub fn get_lsecs(&self,secs_per_track: usize) -> Vec<[usize;2]> {
        match self {
            Self::D13([t,s]) | Self::DO([t,s]) => vec![[*t,*s]],
            Self::PO(_) => panic!("PO blocks are not expanded this way"),
            Self::CPM((block,bsh,off)) => {
                let per_block = 1 << bsh;
                (block*per_block..(block+1)*per_block).map(|n|
                    [*off as usize + n/secs_per_track, 1 + n%secs_per_track]
                ).collect()
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::D13([t,s]) => write!(f,"D13 track {} sector {}",t,s),
            Self::DO([t,s]) => write!(f,"DOS track {} sector {}",t,s),
            Self::PO(b) => write!(f,"ProDOS block {}",b),
            Self::CPM((b,s,o)) => write!(f,"CPM block {} shift {} offset {}",b,s,o)
        }
    }
}

/// Converts between UTF8 text and a file system's native text encoding
pub trait TextEncoder {
    fn new(line_terminator: Vec<u8>) -> Self where Self: Sized;
    fn encode(&self,txt: &str) -> Option<Vec<u8>>;
    fn decode(&self,raw: &[u8]) -> Option<String>;
    fn is_terminated(bytes: &[u8],term: &[u8]) -> bool {
        match term.len() {
            0 => true,
            n if n > bytes.len() => false,
            n => bytes[bytes.len()-n..] == *term
        }
    }
}

/// Cross-driver representation of a file: a sparse map of chunks plus the
/// metadata fields as raw on-disk bytes.  The owning driver decides how each
/// metadata field is interpreted; unused fields are empty vectors.  Chunk keys
/// are logical ordinals starting at 0 with no tie to any disk location.
pub struct FileImage {
    /// file image format version, e.g. "2.0.0"
    pub fimg_version: String,
    /// name of the file system this image belongs to
    pub file_system: String,
    pub chunk_len: usize,
    pub eof: Vec<u8>,
    pub fs_type: Vec<u8>,
    pub aux: Vec<u8>,
    pub access: Vec<u8>,
    pub created: Vec<u8>,
    pub modified: Vec<u8>,
    pub version: Vec<u8>,
    pub min_version: Vec<u8>,
    pub chunks: HashMap<usize,Vec<u8>>
}

impl FileImage {
    pub fn fimg_version() -> String {
        "2.0.0".to_string()
    }
    pub fn ordered_indices(&self) -> Vec<usize> {
        let mut sorted: Vec<usize> = self.chunks.keys().copied().collect();
        sorted.sort_unstable();
        sorted
    }
    /// logical chunk count, counting holes, i.e., 1 + the highest key
    pub fn end(&self) -> usize {
        match self.chunks.keys().max() {
            Some(idx) => idx+1,
            None => 0
        }
    }
    pub fn get_eof(&self) -> usize {
        let mut ans = 0;
        for (i,byte) in self.eof.iter().enumerate() {
            if i >= usize::BITS as usize/8 {
                break;
            }
            ans |= (*byte as usize) << (i*8);
        }
        ans
    }
    pub fn set_eof(&mut self,eof: usize) {
        self.eof = Self::fix_le_vec(eof,self.eof.len());
    }
    /// flatten the chunks in order, losing all hole structure
    pub fn sequence(&self) -> Vec<u8> {
        let mut ans = Vec::new();
        for key in self.ordered_indices() {
            ans.extend_from_slice(&self.chunks[&key]);
        }
        ans
    }
    /// flatten and cut back to `max_len` bytes
    pub fn sequence_limited(&self,max_len: usize) -> Vec<u8> {
        let mut ans = self.sequence();
        ans.truncate(max_len);
        ans
    }
    /// chop a byte stream into chunks and set the eof to match
    pub fn desequence(&mut self,dat: &[u8]) {
        for (idx,piece) in dat.chunks(self.chunk_len).enumerate() {
            self.chunks.insert(idx,piece.to_vec());
        }
        self.eof = Self::fix_le_vec(dat.len(),self.eof.len());
    }
    /// little endian bytes with trailing zeros dropped, padded back out to `min_len`
    pub(crate) fn fix_le_vec(val: usize,min_len: usize) -> Vec<u8> {
        let mut ans = usize::to_le_bytes(val).to_vec();
        while ans.len()>min_len && ans.last()==Some(&0) {
            ans.pop();
        }
        while ans.len()<min_len {
            ans.push(0);
        }
        ans
    }
}

/// Host file name without its last extension, used to build name suggestions.
pub(crate) fn host_stem(host_name: &str) -> String {
    match host_name.rsplit_once('.') {
        Some((stem,_ext)) if stem.len()>0 => stem.to_string(),
        _ => host_name.to_string()
    }
}

/// Lower case extension of a host file name, if any.
pub(crate) fn host_extension(host_name: &str) -> Option<String> {
    match host_name.rsplit_once('.') {
        Some((stem,ext)) if stem.len()>0 => Some(ext.to_lowercase()),
        _ => None
    }
}

/// Uniform catalog record returned by `DiskFS::catalog`.
/// The `typ` string uses the file system's native mnemonic.
#[derive(Clone,PartialEq,Eq,Debug)]
pub struct FileInfo {
    pub name: String,
    pub typ: String,
    pub locked: bool,
    pub blocks: usize,
    pub eof: usize,
    pub aux: u16,
    pub is_dir: bool
}

/// The uniform file system interface.  A `DiskFS` owns its disk image and is
/// the single writer to it; callers hold one mutable handle per volume.
pub trait DiskFS {
    /// Create an empty file image sized for this file system
    fn new_fimg(&self,chunk_len: usize) -> FileImage;
    /// UTF8 string naming the file system
    fn fs_name(&self) -> String;
    /// Get the catalog as a vector of uniform records
    fn catalog(&mut self,path: &str) -> Result<Vec<FileInfo>,DYNERR>;
    /// Create a new directory
    fn create(&mut self,path: &str) -> STDRESULT;
    /// Delete a file or directory
    fn delete(&mut self,path: &str) -> STDRESULT;
    /// Rename a file or directory
    fn rename(&mut self,path: &str,name: &str) -> STDRESULT;
    /// write protect a file
    fn lock(&mut self,path: &str) -> STDRESULT;
    /// remove write protection from a file
    fn unlock(&mut self,path: &str) -> STDRESULT;
    /// Change the type and subtype of a file, strings may contain numbers as appropriate.
    fn retype(&mut self,path: &str,new_type: &str,sub_type: &str) -> STDRESULT;
    /// Read a binary file from the disk.  Returns (aux,data), aux = load address if applicable.
    fn bload(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR>;
    /// Write a binary file to the disk.
    fn bsave(&mut self,path: &str,dat: &[u8],start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR>;
    /// Read a BASIC program file from the disk, program is in tokenized form.
    /// Returns (aux,data), aux = load address if applicable.
    fn load(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR>;
    /// Write a BASIC program to the disk, program must already be tokenized.
    fn save(&mut self,path: &str,dat: &[u8],typ: ItemType,trailing: Option<&[u8]>) -> Result<usize,DYNERR>;
    /// Read sequential data from the disk, Returns (aux,data), aux is implementation dependent.
    /// If `trunc=true` the data stops at the metadata EOF where available,
    /// otherwise it runs to the last block boundary.
    fn read_raw(&mut self,path: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR>;
    /// Write sequential data to the disk.
    fn write_raw(&mut self,path: &str,dat: &[u8]) -> Result<usize,DYNERR>;
    /// Usually same as `read_raw` with `trunc=true`. Use `decode_text` on the result to get a UTF8 string.
    fn read_text(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR>;
    /// Usually same as `write_raw`. Use `encode_text` to generate `dat` from a UTF8 string.
    fn write_text(&mut self,path: &str,dat: &[u8]) -> Result<usize,DYNERR>;
    /// Read a file into a generalized representation
    fn read_any(&mut self,path: &str) -> Result<FileImage,DYNERR>;
    /// Write a file from a generalized representation
    fn write_any(&mut self,path: &str,fimg: &FileImage) -> Result<usize,DYNERR>;
    /// Get a native file system allocation unit
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR>;
    /// Put a native file system allocation unit.
    /// N.b. this simply zaps the block and can break the file system.
    fn write_block(&mut self,num: &str,dat: &[u8]) -> Result<usize,DYNERR>;
    /// Convert file system text to a UTF8 string
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR>;
    /// Convert UTF8 string to file system text
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR>;
    /// Number of unallocated allocation units
    fn free_units(&mut self) -> Result<usize,DYNERR>;
    /// Total allocation units on the volume
    fn total_units(&mut self) -> Result<usize,DYNERR>;
    /// Free flag for every allocation unit on the volume, in unit order;
    /// `true` means the unit is free
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR>;
    /// Map a host file name into a name legal for this file system
    fn suggest_name(&self,host_name: &str) -> String;
    /// Guess a native file type string from a host file name
    fn suggest_type(&self,host_name: &str) -> String;
    /// Can this file system create subdirectories
    fn can_create_directories(&self) -> bool {
        false
    }
    /// Do binary files require a load address
    fn needs_address(&self) -> bool {
        false
    }
    /// Mutably borrow the underlying disk image
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_vectors() {
        assert_eq!(FileImage::fix_le_vec(0x012345,3),vec![0x45,0x23,0x01]);
        assert_eq!(FileImage::fix_le_vec(0x45,3),vec![0x45,0,0]);
        assert_eq!(FileImage::fix_le_vec(0x0145,1),vec![0x45,0x01]);
    }

    #[test]
    fn chunk_accounting() {
        let mut fimg = FileImage {
            fimg_version: FileImage::fimg_version(),
            file_system: "test".to_string(),
            chunk_len: 4,
            eof: vec![0;2],
            fs_type: vec![],
            aux: vec![],
            access: vec![],
            created: vec![],
            modified: vec![],
            version: vec![],
            min_version: vec![],
            chunks: HashMap::new()
        };
        fimg.desequence(&[1,2,3,4,5,6]);
        assert_eq!(fimg.end(),2);
        assert_eq!(fimg.get_eof(),6);
        assert_eq!(fimg.sequence(),vec![1,2,3,4,5,6]);
        assert_eq!(fimg.sequence_limited(5),vec![1,2,3,4,5]);
        // a hole is counted by `end` but not flattened
        fimg.chunks.remove(&0);
        assert_eq!(fimg.end(),2);
        assert_eq!(fimg.sequence(),vec![5,6]);
    }
}
