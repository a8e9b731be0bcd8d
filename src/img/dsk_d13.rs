//! ## Support for 13 sector disk images (D13)
//!
//! A D13 image is the decoded sector data from a 13 sector 5.25 inch
//! disk laid out end to end.  Sectors appear in physical order, DOS 3.2
//! having no software skew.

use a2kit_macro::DiskStructError;
use log::{trace,error};
use crate::img;
use crate::img::names::{SECTOR_SIZE,A2_DOS32_SIZE};
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

pub fn file_extensions() -> Vec<String> {
    vec!["d13".to_string()]
}

/// Wrapper for D13 data
pub struct D13 {
    tracks: u16,
    data: Vec<u8>
}

impl D13 {
    pub fn create(tracks: u16) -> Self {
        Self {
            tracks,
            data: vec![0;tracks as usize*13*SECTOR_SIZE]
        }
    }
    fn sector_offset(&self,t: usize,s: usize) -> Result<usize,DYNERR> {
        match t < self.tracks as usize && s < 13 {
            true => Ok((t*13 + s)*SECTOR_SIZE),
            false => {
                error!("exceeded bounds: maxima are track {}, sector 12",self.tracks-1);
                Err(Box::new(img::Error::SectorAccess))
            }
        }
    }
}

impl img::DiskImage for D13 {
    fn track_count(&self) -> usize {
        self.tracks as usize
    }
    fn byte_capacity(&self) -> usize {
        self.data.len()
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        // only the 13 sector address form makes sense here
        match addr {
            Block::D13([t,s]) => self.read_sector(t,s),
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        match addr {
            Block::D13([t,s]) => self.write_sector(t,s,dat),
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        let beg = self.sector_offset(track,sector)?;
        Ok(self.data[beg..beg+SECTOR_SIZE].to_vec())
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        let beg = self.sector_offset(track,sector)?;
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        self.data[beg..beg+SECTOR_SIZE].copy_from_slice(&padded);
        Ok(())
    }
    fn from_bytes(data: &[u8]) -> Result<Self,DiskStructError> {
        match data.len() {
            A2_DOS32_SIZE => Ok(Self { tracks: 35, data: data.to_vec() }),
            _ => Err(DiskStructError::UnexpectedSize)
        }
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::D13
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        img::DiskKind::A2_525_13
    }
    fn change_kind(&mut self,_kind: img::DiskKind) {
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        self.data.clone()
    }
    fn get_track_buf(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("D13 images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn set_track_buf(&mut self,_track: usize,_dat: &[u8]) -> STDRESULT {
        error!("D13 images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn get_track_nibbles(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("D13 images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn display_track(&self,_bytes: &[u8]) -> String {
        String::from("D13 images have no track bits to display")
    }
}
