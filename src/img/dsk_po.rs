//! ## Support for ProDOS ordered disk images (PO,DSK,HDV)
//!
//! PO images are a simple sequential dump of blocks in ProDOS order.
//! They can represent 5.25 inch floppies, 3.5 inch floppies, or hard drive
//! volumes up to the ProDOS limit of 65535 blocks.

use a2kit_macro::DiskStructError;
use log::{trace,error};
use crate::img;
use crate::img::names::{SECTOR_SIZE,BLOCK_SIZE};
use crate::bios::skew;
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const MAX_BLOCKS: usize = 65535;
const MIN_BLOCKS: usize = 280;

pub fn file_extensions() -> Vec<String> {
    vec!["po".to_string(),"dsk".to_string(),"hdv".to_string()]
}

/// Wrapper for PO data
pub struct PO {
    kind: img::DiskKind,
    blocks: usize,
    data: Vec<u8>
}

impl PO {
    pub fn create(blocks: usize) -> Self {
        Self {
            kind: match blocks {
                280 => img::DiskKind::A2_525_16,
                1600 => img::DiskKind::A2_35_800,
                b => img::DiskKind::LogicalBlocks(b)
            },
            blocks,
            data: vec![0;blocks*BLOCK_SIZE]
        }
    }
    /// 5.25 inch geometry is required to address by track and sector
    fn check_5_25(&self) -> STDRESULT {
        if self.blocks != 280 {
            error!("{} blocks cannot be addressed by track and sector",self.blocks);
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        Ok(())
    }
}

impl img::DiskImage for PO {
    fn track_count(&self) -> usize {
        self.blocks/8
    }
    fn byte_capacity(&self) -> usize {
        self.data.len()
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        match addr {
            Block::PO(block) => {
                if block>=self.blocks {
                    error!("block {} exceeds image limit {}",block,self.blocks);
                    return Err(Box::new(img::Error::SectorAccess));
                }
                Ok(self.data[block*BLOCK_SIZE..(block+1)*BLOCK_SIZE].to_vec())
            },
            Block::DO([t,s]) => {
                self.check_5_25()?;
                let (block,offset) = skew::prodos_block_from_ts(t,s);
                if block>=self.blocks {
                    error!("block {} exceeds image limit {}",block,self.blocks);
                    return Err(Box::new(img::Error::SectorAccess));
                }
                let beg = block*BLOCK_SIZE + offset;
                Ok(self.data[beg..beg+SECTOR_SIZE].to_vec())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        match addr {
            Block::PO(block) => {
                if block>=self.blocks {
                    error!("block {} exceeds image limit {}",block,self.blocks);
                    return Err(Box::new(img::Error::SectorAccess));
                }
                let padded = super::quantize_block(dat,BLOCK_SIZE);
                self.data[block*BLOCK_SIZE..(block+1)*BLOCK_SIZE].copy_from_slice(&padded);
                Ok(())
            },
            Block::DO([t,s]) => {
                self.check_5_25()?;
                let (block,offset) = skew::prodos_block_from_ts(t,s);
                if block>=self.blocks {
                    error!("block {} exceeds image limit {}",block,self.blocks);
                    return Err(Box::new(img::Error::SectorAccess));
                }
                let padded = super::quantize_block(dat,SECTOR_SIZE);
                let beg = block*BLOCK_SIZE + offset;
                self.data[beg..beg+SECTOR_SIZE].copy_from_slice(&padded);
                Ok(())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        self.check_5_25()?;
        if track>=self.track_count() || sector>=16 {
            error!("exceeded bounds: maxima are track {}, sector 15",self.track_count()-1);
            return Err(Box::new(img::Error::SectorAccess));
        }
        self.read_block(Block::DO([track,skew::DOS_PSEC_TO_DOS_LSEC[sector]]))
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        self.check_5_25()?;
        if track>=self.track_count() || sector>=16 {
            error!("exceeded bounds: maxima are track {}, sector 15",self.track_count()-1);
            return Err(Box::new(img::Error::SectorAccess));
        }
        self.write_block(Block::DO([track,skew::DOS_PSEC_TO_DOS_LSEC[sector]]),dat)
    }
    fn from_bytes(data: &[u8]) -> Result<Self,DiskStructError> {
        if data.len()%BLOCK_SIZE > 0 || data.len()/BLOCK_SIZE > MAX_BLOCKS || data.len()/BLOCK_SIZE < MIN_BLOCKS {
            return Err(DiskStructError::UnexpectedSize);
        }
        let blocks = data.len()/BLOCK_SIZE;
        Ok(Self {
            kind: match blocks {
                280 => img::DiskKind::A2_525_16,
                1600 => img::DiskKind::A2_35_800,
                b => img::DiskKind::LogicalBlocks(b)
            },
            blocks,
            data: data.to_vec()
        })
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::PO
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        self.kind
    }
    fn change_kind(&mut self,kind: img::DiskKind) {
        self.kind = kind;
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        self.data.clone()
    }
    fn get_track_buf(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("PO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn set_track_buf(&mut self,_track: usize,_dat: &[u8]) -> STDRESULT {
        error!("PO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn get_track_nibbles(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("PO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn display_track(&self,_bytes: &[u8]) -> String {
        String::from("PO images have no track bits to display")
    }
}
