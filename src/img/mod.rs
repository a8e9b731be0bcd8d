//! # Disk Image Module
//!
//! Every container format gets an object implementing the `DiskImage` trait,
//! usually named after the format it handles, e.g. `Woz2`.  Think of the
//! object as the disk together with the drive that spins it.
//!
//! The trait reads and writes tracks, sectors, and blocks, while staying
//! agnostic about how the image stores its tracks.  An image is allowed to
//! refuse a request as out of scope; a PO image, for instance, only speaks
//! ProDOS blocks, since the physical geometry behind it may not even exist.
//!
//! A `DiskImage` trait object is the storage under every `fs` module.  The
//! file systems deal strictly in blocks; turning blocks into sectors is the
//! business of the `img` submodules with help from `bios::skew`.  When a
//! file system is first attached it examines a few key blocks, and refuses
//! the image if they do not check out.

pub mod dsk_d13;
pub mod dsk_do;
pub mod dsk_po;
pub mod dot2mg;
pub mod diskcopy;
pub mod dual;
pub mod nib;
pub mod nibbles;
pub mod woz;
pub mod woz1;
pub mod woz2;
pub mod names;

use std::str::FromStr;
use std::fmt;
use log::debug;
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};
use a2kit_macro::DiskStructError;

/// Enumerates disk image errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("unknown kind of disk")]
    UnknownDiskKind,
    #[error("unknown image type")]
    UnknownImageType,
    #[error("image size did not match the request")]
    ImageSizeMismatch,
    #[error("image type not compatible with request")]
    ImageTypeMismatch,
    #[error("unable to access sector")]
    SectorAccess,
    #[error("unable to access track")]
    TrackAccess,
    #[error("disk is write protected")]
    WriteProtected
}

/// Errors pertaining to nibble encoding
#[derive(thiserror::Error,Debug)]
pub enum NibbleError {
    #[error("could not interpret track data")]
    BadTrack,
    #[error("invalid byte while decoding")]
    InvalidByte,
    #[error("bad checksum found in a sector")]
    BadChecksum,
    #[error("could not find bit pattern")]
    BitPatternNotFound,
    #[error("sector not found")]
    SectorNotFound,
    #[error("nibble type appeared in wrong context")]
    NibbleType
}

/// This enumeration is often used in a match arm to take different
/// actions depending on the kind of disk.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum DiskKind {
    Unknown,
    /// 5.25 inch 13 sector
    A2_525_13,
    /// 5.25 inch 16 sector
    A2_525_16,
    /// 3.5 inch 800K treated as a block device
    A2_35_800,
    /// block device of any other size, e.g. a ProDOS hard drive volume
    LogicalBlocks(usize)
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum DiskImageType {
    D13,
    DO,
    PO,
    WOZ1,
    WOZ2,
    DOT2MG,
    NIB,
    DC42
}

impl fmt::Display for DiskKind {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DiskKind::A2_525_13 => write!(f,"Apple 5.25 inch 13 sector"),
            DiskKind::A2_525_16 => write!(f,"Apple 5.25 inch 16 sector"),
            DiskKind::A2_35_800 => write!(f,"Apple 3.5 inch 800K"),
            DiskKind::LogicalBlocks(n) => write!(f,"Logical disk, {} blocks",n),
            DiskKind::Unknown => write!(f,"unknown")
        }
    }
}

impl FromStr for DiskKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "5.25in-apple-13" => Ok(Self::A2_525_13),
            "5.25in-apple-16" => Ok(Self::A2_525_16),
            "3.5in-apple-800" => Ok(Self::A2_35_800),
            "hd5" => Ok(Self::LogicalBlocks(names::A2_HD_5MB_SIZE/names::BLOCK_SIZE)),
            "hd10" => Ok(Self::LogicalBlocks(names::A2_HD_10MB_SIZE/names::BLOCK_SIZE)),
            "hd20" => Ok(Self::LogicalBlocks(names::A2_HD_20MB_SIZE/names::BLOCK_SIZE)),
            "hdmax" => Ok(Self::LogicalBlocks(names::A2_HD_MAX_BLOCKS)),
            _ => Err(Error::UnknownDiskKind)
        }
    }
}

impl FromStr for DiskImageType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "d13" => Ok(Self::D13),
            "do" => Ok(Self::DO),
            "po" => Ok(Self::PO),
            "woz1" => Ok(Self::WOZ1),
            "woz2" => Ok(Self::WOZ2),
            "2mg" => Ok(Self::DOT2MG),
            "2img" => Ok(Self::DOT2MG),
            "nib" => Ok(Self::NIB),
            "dc42" => Ok(Self::DC42),
            _ => Err(Error::UnknownImageType)
        }
    }
}

impl fmt::Display for DiskImageType {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::D13 => write!(f,"d13"),
            Self::DO => write!(f,"do"),
            Self::PO => write!(f,"po"),
            Self::WOZ1 => write!(f,"woz1"),
            Self::WOZ2 => write!(f,"woz2"),
            Self::DOT2MG => write!(f,"2mg"),
            Self::NIB => write!(f,"nib"),
            Self::DC42 => write!(f,"dc42")
        }
    }
}

/// The main trait for working with any kind of disk image.
/// The corresponding trait object serves as storage for `DiskFS`.
/// Reading can mutate the object because the image may be keeping
/// track of the head position or other status indicators.
pub trait DiskImage {
    /// Count of formatted tracks
    fn track_count(&self) -> usize;
    /// Total storage held by the formatted tracks
    fn byte_capacity(&self) -> usize;
    fn what_am_i(&self) -> DiskImageType;
    fn file_extensions(&self) -> Vec<String>;
    fn kind(&self) -> DiskKind;
    /// Change the kind of disk, but do not change the format
    fn change_kind(&mut self,kind: DiskKind);
    fn from_bytes(buf: &[u8]) -> Result<Self,DiskStructError> where Self: Sized;
    fn to_bytes(&mut self) -> Vec<u8>;
    /// Read a block from the image; can affect disk state
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR>;
    /// Write a block to the image
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT;
    /// Read a physical sector from the image; can affect disk state
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR>;
    /// Write a physical sector to the image
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT;
    /// Get the track buffer exactly in the form the image stores it
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR>;
    /// Set the track buffer using another track buffer, the sizes must match
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT;
    /// Get the track bytes as aligned nibbles; for user inspection
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR>;
    /// Write the track to a string suitable for display, input should be
    /// pre-aligned nibbles, e.g. from `get_track_nibbles`
    fn display_track(&self,bytes: &[u8]) -> String {
        hex_dump(bytes)
    }
}

/// Test a buffer for a size match to DOS-oriented geometry.
/// Returns (tracks,sectors) or None.
pub fn is_dos_size(buf: &[u8]) -> Option<(usize,usize)> {
    let track_bytes = 16*names::SECTOR_SIZE;
    match buf.len() {
        l if l==names::A2_DOS32_SIZE => Some((35,13)),
        l if l==names::A2_DOS33_SIZE => Some((35,16)),
        l if l==2*names::A2_DOS33_SIZE => Some((35,32)),
        l if l%track_bytes==0 && (35..=50).contains(&(l/track_bytes)) => Some((l/track_bytes,16)),
        _ => {
            debug!("image size {} does not match a DOS geometry",buf.len());
            None
        }
    }
}

/// Copy the source into a buffer of exactly `quantum` bytes,
/// padding with zeros or dropping the excess as needed.
pub fn quantize_block(src: &[u8],quantum: usize) -> Vec<u8> {
    let mut padded = src.to_vec();
    padded.resize(quantum,0);
    padded
}

/// Hex dump suitable for console display of track or sector data
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut ans = String::new();
    for (row,slice) in bytes.chunks(16).enumerate() {
        let mut hex_part = String::new();
        let mut asc_part = String::new();
        for byte in slice {
            hex_part += &format!("{:02X} ",byte);
            asc_part.push(match byte {
                b if (0xa0..0xff).contains(b) => (b & 0x7f) as char,
                b if (0x20..0x7f).contains(b) => *b as char,
                _ => '.'
            });
        }
        ans += &format!("{:04X} : {:48} |{:16}|\n",row*16,hex_part,asc_part);
    }
    ans
}
