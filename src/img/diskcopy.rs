//! ## Support for DiskCopy 4.2 disk images
//!
//! This is an 84 byte header followed by the data fork and an optional tag fork.
//! All header numbers are big-endian.  The payload is in ProDOS block order,
//! so we use the strategy of wrapping a PO image.  The checksum is verified
//! on entry, but a mismatch only draws a warning; we always write a correct
//! checksum on the way out.

use log::{debug,info,error,warn};
use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;
use crate::img;
use crate::img::names::BLOCK_SIZE;
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const HEADER_LEN: usize = 84;

pub fn file_extensions() -> Vec<String> {
    vec!["dc".to_string(),"dc42".to_string(),"image".to_string()]
}

#[derive(DiskStruct)]
pub struct Header {
    name: [u8;64], // Pascal string
    data_size: [u8;4],
    tag_size: [u8;4],
    data_checksum: [u8;4],
    tag_checksum: [u8;4],
    disk_format: u8, // 0=400K, 1=800K, 2=720K, 3=1440K
    format_byte: u8, // 0x12=400K Mac, 0x22=Mac other, 0x24=800K ProDOS
    magic: [u8;2] // always 0x0100
}

pub struct Dc42 {
    kind: img::DiskKind,
    header: Header,
    raw_img: Box<dyn img::DiskImage>,
    tags: Vec<u8>
}

/// DiskCopy checksum: accumulate big-endian words, rotating right after each
fn checksum(buf: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for chunk in buf.chunks_exact(2) {
        let word = u16::from_be_bytes([chunk[0],chunk[1]]) as u32;
        sum = sum.wrapping_add(word);
        sum = sum.rotate_right(1);
    }
    sum
}

impl Dc42 {
    /// Create an 800K ProDOS ordered image, the only kind we format
    pub fn create(kind: img::DiskKind) -> Result<Self,DYNERR> {
        if kind!=img::DiskKind::A2_35_800 {
            error!("DiskCopy can only create 800K disks");
            return Err(Box::new(img::Error::UnknownDiskKind));
        }
        let raw_img = Box::new(img::dsk_po::PO::create(1600));
        let name_str = "-not a Macintosh disk";
        let mut name: [u8;64] = [0;64];
        name[0] = name_str.len() as u8;
        name[1..1+name_str.len()].copy_from_slice(name_str.as_bytes());
        Ok(Self {
            kind,
            header: Header {
                name,
                data_size: u32::to_be_bytes(1600*BLOCK_SIZE as u32),
                tag_size: [0,0,0,0],
                data_checksum: [0,0,0,0],
                tag_checksum: [0,0,0,0],
                disk_format: 1,
                format_byte: 0x24,
                magic: [1,0]
            },
            raw_img,
            tags: Vec::new()
        })
    }
}

impl img::DiskImage for Dc42 {
    fn track_count(&self) -> usize {
        self.raw_img.track_count()
    }
    fn byte_capacity(&self) -> usize {
        self.raw_img.byte_capacity()
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.read_block(addr)
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        self.raw_img.write_block(addr,dat)
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.read_sector(track,sector)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        self.raw_img.write_sector(track,sector,dat)
    }
    fn from_bytes(data: &[u8]) -> Result<Self,DiskStructError> {
        if data.len()<HEADER_LEN {
            return Err(DiskStructError::UnexpectedSize);
        }
        let header = Header::from_bytes(&data[0..HEADER_LEN])?;
        if header.magic!=[1,0] {
            debug!("DiskCopy magic not found");
            return Err(DiskStructError::IllegalValue);
        }
        if header.name[0]>63 {
            debug!("DiskCopy name length is invalid");
            return Err(DiskStructError::IllegalValue);
        }
        info!("identified DiskCopy header");
        let data_size = u32::from_be_bytes(header.data_size) as usize;
        let tag_size = u32::from_be_bytes(header.tag_size) as usize;
        if data.len() < HEADER_LEN + data_size + tag_size {
            error!("end of data {} runs past EOF",HEADER_LEN+data_size+tag_size);
            return Err(DiskStructError::UnexpectedSize);
        }
        let chk = checksum(&data[HEADER_LEN..HEADER_LEN+data_size]);
        if chk != u32::from_be_bytes(header.data_checksum) {
            warn!("DiskCopy checksum mismatch (expected {:08X}, got {:08X})",u32::from_be_bytes(header.data_checksum),chk);
        }
        let raw_img = Box::new(img::dsk_po::PO::from_bytes(&data[HEADER_LEN..HEADER_LEN+data_size])?);
        let tags = data[HEADER_LEN+data_size..HEADER_LEN+data_size+tag_size].to_vec();
        Ok(Self {
            kind: raw_img.kind(),
            header,
            raw_img,
            tags
        })
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::DC42
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        self.kind
    }
    fn change_kind(&mut self,kind: img::DiskKind) {
        self.kind = kind;
        self.raw_img.change_kind(kind);
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        let mut data = self.raw_img.to_bytes();
        self.header.data_size = u32::to_be_bytes(data.len() as u32);
        self.header.data_checksum = u32::to_be_bytes(checksum(&data));
        self.header.tag_size = u32::to_be_bytes(self.tags.len() as u32);
        self.header.tag_checksum = u32::to_be_bytes(checksum(&self.tags));
        let mut ans = self.header.to_bytes();
        ans.append(&mut data);
        ans.append(&mut self.tags.clone());
        ans
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.get_track_buf(track)
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        self.raw_img.set_track_buf(track,dat)
    }
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.get_track_nibbles(track)
    }
    fn display_track(&self,bytes: &[u8]) -> String {
        self.raw_img.display_track(bytes)
    }
}

#[test]
fn rotating_checksum() {
    // hand-computed: words 0x0102, 0x0304
    // sum1 = 0x0102 -> ror = 0x00000081
    // sum2 = 0x0081+0x0304 = 0x0385 -> ror = 0x800001C2
    assert_eq!(checksum(&[1,2,3,4]),0x800001C2);
}
