//! ## Support for dual-volume 800K disk images (UniDOS, OzDOS)
//!
//! These systems put two 400K DOS volumes on one 800K disk, each with
//! 50 tracks of 32 sectors.  UniDOS stacks the volumes by track, i.e.,
//! volume 2 begins at track 50.  OzDOS splits every 512 byte block down
//! the middle, volume 1 in the first half, volume 2 in the second.
//!
//! Both volumes view the same backing store, so the two image objects
//! returned by `create_pair` or `pair_from_bytes` share it through an
//! `Rc<RefCell<..>>`.  Saving either volume emits the whole 800K image.

use std::rc::Rc;
use std::cell::RefCell;
use a2kit_macro::DiskStructError;
use log::{trace,error};
use crate::img;
use crate::img::names::{SECTOR_SIZE,BLOCK_SIZE,A2_800K_SIZE,UNIDOS_TRACKS,UNIDOS_SECTORS,UNIDOS_TRACK_OFFSET};
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

pub fn file_extensions() -> Vec<String> {
    vec!["do".to_string(),"dsk".to_string(),"po".to_string()]
}

/// One UniDOS volume; volume 2 is the same store with a track offset
pub struct Unidos {
    vol: usize,
    store: Rc<RefCell<Vec<u8>>>
}

/// One OzDOS volume; volume 2 is the same store with a byte offset in each block
pub struct Ozdos {
    vol: usize,
    store: Rc<RefCell<Vec<u8>>>
}

impl Unidos {
    pub fn create_pair() -> (Self,Self) {
        let store = Rc::new(RefCell::new(vec![0;A2_800K_SIZE]));
        (
            Self { vol: 0, store: Rc::clone(&store) },
            Self { vol: 1, store }
        )
    }
    /// Structure an 800K buffer as two shared-store volumes
    pub fn pair_from_bytes(buf: &[u8]) -> Result<(Self,Self),DiskStructError> {
        if buf.len()!=A2_800K_SIZE {
            return Err(DiskStructError::UnexpectedSize);
        }
        let store = Rc::new(RefCell::new(buf.to_vec()));
        Ok((
            Self { vol: 0, store: Rc::clone(&store) },
            Self { vol: 1, store }
        ))
    }
    fn sector_offset(&self,t: usize,s: usize) -> Result<usize,DYNERR> {
        if t>=UNIDOS_TRACKS || s>=UNIDOS_SECTORS {
            error!("exceeded bounds: maxima are track {}, sector {}",UNIDOS_TRACKS-1,UNIDOS_SECTORS-1);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let abs_track = t + self.vol*UNIDOS_TRACK_OFFSET;
        Ok(abs_track*UNIDOS_SECTORS*SECTOR_SIZE + s*SECTOR_SIZE)
    }
}

impl Ozdos {
    pub fn create_pair() -> (Self,Self) {
        let store = Rc::new(RefCell::new(vec![0;A2_800K_SIZE]));
        (
            Self { vol: 0, store: Rc::clone(&store) },
            Self { vol: 1, store }
        )
    }
    /// Structure an 800K buffer as two shared-store volumes
    pub fn pair_from_bytes(buf: &[u8]) -> Result<(Self,Self),DiskStructError> {
        if buf.len()!=A2_800K_SIZE {
            return Err(DiskStructError::UnexpectedSize);
        }
        let store = Rc::new(RefCell::new(buf.to_vec()));
        Ok((
            Self { vol: 0, store: Rc::clone(&store) },
            Self { vol: 1, store }
        ))
    }
    fn sector_offset(&self,t: usize,s: usize) -> Result<usize,DYNERR> {
        if t>=UNIDOS_TRACKS || s>=UNIDOS_SECTORS {
            error!("exceeded bounds: maxima are track {}, sector {}",UNIDOS_TRACKS-1,UNIDOS_SECTORS-1);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let block = t*UNIDOS_SECTORS + s;
        Ok(block*BLOCK_SIZE + self.vol*SECTOR_SIZE)
    }
}

impl img::DiskImage for Unidos {
    fn track_count(&self) -> usize {
        UNIDOS_TRACKS
    }
    fn byte_capacity(&self) -> usize {
        UNIDOS_TRACKS*UNIDOS_SECTORS*SECTOR_SIZE
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        match addr {
            Block::DO([t,s]) => {
                let offset = self.sector_offset(t,s)?;
                Ok(self.store.borrow()[offset..offset+SECTOR_SIZE].to_vec())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        match addr {
            Block::DO([t,s]) => {
                let padded = super::quantize_block(dat,SECTOR_SIZE);
                let offset = self.sector_offset(t,s)?;
                self.store.borrow_mut()[offset..offset+SECTOR_SIZE].copy_from_slice(&padded);
                Ok(())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        // no physical skew on these volumes
        let offset = self.sector_offset(track,sector)?;
        Ok(self.store.borrow()[offset..offset+SECTOR_SIZE].to_vec())
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        let offset = self.sector_offset(track,sector)?;
        self.store.borrow_mut()[offset..offset+SECTOR_SIZE].copy_from_slice(&padded);
        Ok(())
    }
    fn from_bytes(buf: &[u8]) -> Result<Self,DiskStructError> {
        let (vol1,_vol2) = Self::pair_from_bytes(buf)?;
        Ok(vol1)
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::DO
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        img::DiskKind::A2_35_800
    }
    fn change_kind(&mut self,_kind: img::DiskKind) {
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        self.store.borrow().clone()
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let beg = self.sector_offset(track,0)?;
        Ok(self.store.borrow()[beg..beg+UNIDOS_SECTORS*SECTOR_SIZE].to_vec())
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        if dat.len()!=UNIDOS_SECTORS*SECTOR_SIZE {
            error!("source track buffer is {} bytes, destination is {} bytes",dat.len(),UNIDOS_SECTORS*SECTOR_SIZE);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let beg = self.sector_offset(track,0)?;
        self.store.borrow_mut()[beg..beg+UNIDOS_SECTORS*SECTOR_SIZE].copy_from_slice(dat);
        Ok(())
    }
    fn get_track_nibbles(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("UniDOS images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn display_track(&self,_bytes: &[u8]) -> String {
        String::from("UniDOS images have no track bits to display")
    }
}

impl img::DiskImage for Ozdos {
    fn track_count(&self) -> usize {
        UNIDOS_TRACKS
    }
    fn byte_capacity(&self) -> usize {
        UNIDOS_TRACKS*UNIDOS_SECTORS*SECTOR_SIZE
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        match addr {
            Block::DO([t,s]) => {
                let offset = self.sector_offset(t,s)?;
                Ok(self.store.borrow()[offset..offset+SECTOR_SIZE].to_vec())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        match addr {
            Block::DO([t,s]) => {
                let padded = super::quantize_block(dat,SECTOR_SIZE);
                let offset = self.sector_offset(t,s)?;
                self.store.borrow_mut()[offset..offset+SECTOR_SIZE].copy_from_slice(&padded);
                Ok(())
            },
            _ => Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        // no physical skew on these volumes
        let offset = self.sector_offset(track,sector)?;
        Ok(self.store.borrow()[offset..offset+SECTOR_SIZE].to_vec())
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        let offset = self.sector_offset(track,sector)?;
        self.store.borrow_mut()[offset..offset+SECTOR_SIZE].copy_from_slice(&padded);
        Ok(())
    }
    fn from_bytes(buf: &[u8]) -> Result<Self,DiskStructError> {
        let (vol1,_vol2) = Self::pair_from_bytes(buf)?;
        Ok(vol1)
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::PO
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        img::DiskKind::A2_35_800
    }
    fn change_kind(&mut self,_kind: img::DiskKind) {
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        self.store.borrow().clone()
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let mut ans: Vec<u8> = Vec::new();
        for s in 0..UNIDOS_SECTORS {
            let beg = self.sector_offset(track,s)?;
            ans.append(&mut self.store.borrow()[beg..beg+SECTOR_SIZE].to_vec());
        }
        Ok(ans)
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        if dat.len()!=UNIDOS_SECTORS*SECTOR_SIZE {
            error!("source track buffer is {} bytes, destination is {} bytes",dat.len(),UNIDOS_SECTORS*SECTOR_SIZE);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        for s in 0..UNIDOS_SECTORS {
            let beg = self.sector_offset(track,s)?;
            self.store.borrow_mut()[beg..beg+SECTOR_SIZE].copy_from_slice(&dat[s*SECTOR_SIZE..(s+1)*SECTOR_SIZE]);
        }
        Ok(())
    }
    fn get_track_nibbles(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("OzDOS images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn display_track(&self,_bytes: &[u8]) -> String {
        String::from("OzDOS images have no track bits to display")
    }
}

#[test]
fn volumes_share_the_store() {
    use img::DiskImage;
    let (mut vol1,mut vol2) = Unidos::create_pair();
    vol1.write_sector(0,0,&[1;256]).expect("write failed");
    vol2.write_sector(0,0,&[2;256]).expect("write failed");
    let whole = vol1.to_bytes();
    assert_eq!(whole[0],1);
    assert_eq!(whole[UNIDOS_TRACK_OFFSET*UNIDOS_SECTORS*SECTOR_SIZE],2);
}
