//! ## Support for 2MG disk images
//!
//! A 2MG file is a 64 byte header wrapped around an ordinary DO, PO, or NIB
//! image, with optional comment and creator strings trailing the data.  The
//! implementation simply owns the underlying image object and defers to it,
//! adding only the write protection flag and the text fields.

use chrono;
use log::{warn,info,error};
use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;
use crate::img;
use crate::img::names::{A2_NIB_SIZE,BLOCK_SIZE};
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const HEADER_LEN: usize = 64;

pub fn file_extensions() -> Vec<String> {
    vec!["2mg".to_string(),"2img".to_string()]
}

// all header entries are LE numbers unless noted
#[derive(DiskStruct)]
pub struct Header {
    magic: [u8;4], // always '2IMG'
    creator_id: [u8;4],
    header_len: [u8;2],
    version: [u8;2], // 1
    img_fmt: [u8;4], // 0=DO, 1=PO, 2=nib
    flags: [u8;4], // bits 0-7=volume if bit 8 (otherwise 254), disk write protected if bit 31
    blocks: [u8;4], // should be 0 unless fmt=1, but see below
    data_offset: [u8;4], // from start of file
    data_len: [u8;4],
    comment_offset: [u8;4],
    comment_len: [u8;4],
    creator_offset: [u8;4],
    creator_len: [u8;4],
    pad: [u8;16]
}

pub struct Dot2mg {
    kind: img::DiskKind,
    header: Header,
    raw_img: Box<dyn img::DiskImage>,
    comment: String,
    creator_info: String
}

/// Pull a trailing text field out of the file, logging but tolerating
/// whatever is wrong with it.
fn trailing_text(data: &[u8],offset: [u8;4],len: [u8;4],label: &str) -> String {
    let beg = u32::from_le_bytes(offset) as usize;
    let end = beg + u32::from_le_bytes(len) as usize;
    if data.len() < end {
        warn!("end of {} {} runs past EOF, ignoring",label,end);
        return String::new();
    }
    match String::from_utf8(data[beg..end].to_vec()) {
        Ok(s) => {
            info!("2MG {}: {}",label,s);
            s
        },
        Err(_) => {
            warn!("{} field could not be read as UTF8 string",label);
            String::new()
        }
    }
}

impl Dot2mg {
    pub fn create(vol: u8,kind: img::DiskKind,maybe_wrap: Option<img::DiskImageType>) -> Result<Self,DYNERR> {
        let now = chrono::Local::now().naive_local();
        let creator_info = img::names::creator_string() + " " + &now.format("%d-%m-%Y %H:%M:%S").to_string();
        let raw_img: Box<dyn img::DiskImage> = match (kind,maybe_wrap) {
            (img::DiskKind::A2_525_16,Some(img::DiskImageType::DO) | None) => Box::new(img::dsk_do::DO::create(35,16)),
            (img::DiskKind::A2_525_16,Some(img::DiskImageType::NIB)) => Box::new(img::nib::Nib::create(vol,kind)?),
            (img::DiskKind::A2_35_800,Some(img::DiskImageType::PO) | None) => Box::new(img::dsk_po::PO::create(1600)),
            (img::DiskKind::LogicalBlocks(b),Some(img::DiskImageType::PO) | None) => Box::new(img::dsk_po::PO::create(b)),
            _ => {
                error!("the disk kind could not be paired with the wrapped image");
                return Err(Box::new(img::Error::ImageTypeMismatch));
            }
        };
        // only a 5.25 inch disk carries a volume number
        let flags = match kind {
            img::DiskKind::A2_525_16 => [vol,1,0,0],
            _ => [0,0,0,0]
        };
        let (fmt,buf_len) = match raw_img.what_am_i() {
            img::DiskImageType::DO => (0,raw_img.byte_capacity() as u32),
            img::DiskImageType::PO => (1,raw_img.byte_capacity() as u32),
            img::DiskImageType::NIB => (2,A2_NIB_SIZE as u32),
            _ => {
                error!("attempt to wrap unsupported image type in 2MG");
                return Err(Box::new(img::Error::ImageTypeMismatch));
            }
        };
        // The 2MG definition has blocks=0 unless fmt=1, but some tools reject a DO
        // image with blocks=0, so write the count unconditionally.  On
        // reading, blocks is checked only when fmt=1.
        let actual_blocks = (raw_img.byte_capacity()/BLOCK_SIZE) as u32;
        Ok(Self {
            kind,
            header: Header {
                magic: u32::to_be_bytes(0x32494D47), // '2IMG'
                creator_id: u32::to_be_bytes(0x3244534B), // '2DSK'
                header_len: [HEADER_LEN as u8,0],
                version: [1,0],
                img_fmt: [fmt,0,0,0],
                flags,
                blocks: u32::to_le_bytes(actual_blocks),
                data_offset: [HEADER_LEN as u8,0,0,0],
                data_len: u32::to_le_bytes(buf_len),
                comment_offset: [0,0,0,0],
                comment_len: [0,0,0,0],
                creator_offset: u32::to_le_bytes(HEADER_LEN as u32 + buf_len),
                creator_len: u32::to_le_bytes(creator_info.len() as u32),
                pad: [0;16]
            },
            raw_img,
            comment: String::new(),
            creator_info
        })
    }
    fn check_writable(&self) -> STDRESULT {
        match self.header.flags[3] > 127 {
            true => {
                error!("2MG disk is write protected");
                Err(Box::new(img::Error::WriteProtected))
            },
            false => Ok(())
        }
    }
}

impl img::DiskImage for Dot2mg {
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
        self.check_writable()?;
        self.raw_img.write_block(addr,dat)
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.read_sector(track,sector)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        self.check_writable()?;
        self.raw_img.write_sector(track,sector,dat)
    }
    fn from_bytes(data: &[u8]) -> Result<Self,DiskStructError> {
        if data.len() < HEADER_LEN {
            return Err(DiskStructError::UnexpectedSize);
        }
        let header = Header::from_bytes(&data[0..HEADER_LEN])?;
        if &header.magic != b"2IMG" {
            return Err(DiskStructError::IllegalValue);
        }
        info!("identified 2MG header");
        if u16::from_le_bytes(header.header_len) as usize != HEADER_LEN {
            warn!("unexpected 2MG header length {}",u16::from_le_bytes(header.header_len));
        }
        if u16::from_le_bytes(header.version) != 1 {
            warn!("unexpected 2MG version {}",u16::from_le_bytes(header.version));
        }
        let offset = u32::from_le_bytes(header.data_offset) as usize;
        let len = u32::from_le_bytes(header.data_len) as usize;
        if data.len() < offset+len {
            error!("end of data {} runs past EOF",offset+len);
            return Err(DiskStructError::UnexpectedSize);
        }
        let buf = &data[offset..offset+len];
        let fmt = u32::from_le_bytes(header.img_fmt);
        let raw_img: Box<dyn img::DiskImage> = match fmt {
            0 => {
                info!("2MG flagged as DOS ordered");
                Box::new(img::dsk_do::DO::from_bytes(buf)?)
            },
            1 => {
                info!("2MG flagged as ProDOS ordered");
                Box::new(img::dsk_po::PO::from_bytes(buf)?)
            },
            2 => {
                info!("2MG flagged as nibbles");
                Box::new(img::nib::Nib::from_bytes(buf)?)
            },
            _ => {
                error!("illegal 2MG format {}",fmt);
                return Err(DiskStructError::IllegalValue);
            }
        };
        if fmt==1 && u32::from_le_bytes(header.blocks) as usize * BLOCK_SIZE != raw_img.byte_capacity() {
            error!("2MG block count does not match data size");
            return Err(DiskStructError::IllegalValue);
        }
        let comment = trailing_text(data,header.comment_offset,header.comment_len,"comment");
        let creator_info = trailing_text(data,header.creator_offset,header.creator_len,"creator info");
        Ok(Self {
            kind: raw_img.kind(),
            header,
            raw_img,
            comment,
            creator_info
        })
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::DOT2MG
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
        let buf_len = u32::from_le_bytes(self.header.data_len);
        let rem_len = self.comment.len() as u32;
        let cre_len = self.creator_info.len() as u32;
        self.header.data_offset = u32::to_le_bytes(HEADER_LEN as u32);
        self.header.comment_offset = u32::to_le_bytes(match rem_len { 0 => 0, _ => HEADER_LEN as u32 + buf_len });
        self.header.comment_len = u32::to_le_bytes(rem_len);
        self.header.creator_offset = u32::to_le_bytes(match cre_len { 0 => 0, _ => HEADER_LEN as u32 + buf_len + rem_len });
        self.header.creator_len = u32::to_le_bytes(cre_len);
        for s in [&self.comment,&self.creator_info] {
            if !s.is_ascii() {
                warn!("2MG text field is not ASCII");
            }
        }
        let mut ans = self.header.to_bytes();
        ans.append(&mut self.raw_img.to_bytes());
        ans.extend_from_slice(self.comment.as_bytes());
        ans.extend_from_slice(self.creator_info.as_bytes());
        ans
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.get_track_buf(track)
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        self.check_writable()?;
        self.raw_img.set_track_buf(track,dat)
    }
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        self.raw_img.get_track_nibbles(track)
    }
    fn display_track(&self,bytes: &[u8]) -> String {
        self.raw_img.display_track(bytes)
    }
}
