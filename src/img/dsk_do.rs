//! ## Support for Apple DOS ordered disk images (DO,DSK)
//!
//! A DO image is the decoded sector data laid out end to end, with the
//! sectors of each track appearing in DOS 3.3 logical order.  Nothing in
//! the file itself proves the ordering; that judgement waits for the
//! file system layer.

use a2kit_macro::DiskStructError;
use log::{trace,error};
use crate::img;
use crate::img::names::{SECTOR_SIZE,BLOCK_SIZE};
use crate::bios::skew;
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const CPM_RECORD: usize = 128;
const MAX_BLOCKS: usize = 65535;
const MIN_BLOCKS: usize = 280;

pub fn file_extensions() -> Vec<String> {
    vec!["do".to_string(),"dsk".to_string()]
}

/// Wrapper for DO data
pub struct DO {
    kind: img::DiskKind,
    tracks: u16,
    sectors: u16,
    data: Vec<u8>
}

impl DO {
    pub fn create(tracks: u16,sectors: u16) -> Self {
        let kind = match (tracks,sectors) {
            (35,13) => panic!("DO refusing to create a D13"),
            (35,16) => img::DiskKind::A2_525_16,
            _ => img::DiskKind::Unknown
        };
        Self {
            kind,
            tracks,
            sectors,
            data: vec![0;tracks as usize*sectors as usize*SECTOR_SIZE]
        }
    }
    fn sector_offset(&self,t: usize,s: usize) -> Result<usize,DYNERR> {
        if t >= self.tracks as usize || s >= self.sectors as usize {
            error!("exceeded bounds: maxima are track {}, sector {}",self.tracks-1,self.sectors-1);
            return Err(Box::new(img::Error::SectorAccess));
        }
        Ok((t*self.sectors as usize + s)*SECTOR_SIZE)
    }
    /// Resolve a block address to the byte ranges it touches, in order.
    /// Both block operations run off this list.
    fn locate(&self,addr: Block) -> Result<Vec<(usize,usize)>,DYNERR> {
        match addr {
            Block::D13(_) => Err(Box::new(img::Error::ImageTypeMismatch)),
            Block::DO([t,s]) => Ok(vec![(self.sector_offset(t,s)?,SECTOR_SIZE)]),
            Block::PO(block) => {
                let mut ans = Vec::new();
                for [t,s] in skew::ts_from_prodos_block(block) {
                    ans.push((self.sector_offset(t,s)?,SECTOR_SIZE));
                }
                Ok(ans)
            },
            Block::CPM((_block,_bsh,_off)) => {
                // CP/M records are half a sector, hence the extra offset table
                let mut ans = Vec::new();
                for [t,lsec] in addr.get_lsecs(32) {
                    trace!("track {} lsec {}",t,lsec);
                    let dsec = skew::CPM_LSEC_TO_DOS_LSEC[lsec-1];
                    let beg = self.sector_offset(t,dsec)? + skew::CPM_LSEC_TO_DOS_OFFSET[lsec-1];
                    ans.push((beg,CPM_RECORD));
                }
                Ok(ans)
            }
        }
    }
}

impl img::DiskImage for DO {
    fn track_count(&self) -> usize {
        self.tracks as usize
    }
    fn byte_capacity(&self) -> usize {
        self.data.len()
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        let mut ans = Vec::new();
        for (beg,len) in self.locate(addr)? {
            ans.extend_from_slice(&self.data[beg..beg+len]);
        }
        Ok(ans)
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        let spans = self.locate(addr)?;
        let total: usize = spans.iter().map(|(_,len)| len).sum();
        let padded = super::quantize_block(dat,total);
        let mut src = 0;
        for (beg,len) in spans {
            self.data[beg..beg+len].copy_from_slice(&padded[src..src+len]);
            src += len;
        }
        Ok(())
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        if sector >= 16 {
            error!("physical sector {} out of range",sector);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let beg = self.sector_offset(track,skew::DOS_PSEC_TO_DOS_LSEC[sector])?;
        Ok(self.data[beg..beg+SECTOR_SIZE].to_vec())
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        if sector >= 16 {
            error!("physical sector {} out of range",sector);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let beg = self.sector_offset(track,skew::DOS_PSEC_TO_DOS_LSEC[sector])?;
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        self.data[beg..beg+SECTOR_SIZE].copy_from_slice(&padded);
        Ok(())
    }
    fn from_bytes(data: &[u8]) -> Result<Self,DiskStructError> {
        // must be able to hold either a DOS 3.3 or a ProDOS volume,
        // with a whole number of 16 sector tracks
        let blocks = data.len()/BLOCK_SIZE;
        if data.len()%BLOCK_SIZE > 0 || blocks > MAX_BLOCKS || blocks < MIN_BLOCKS || blocks%8 > 0 {
            return Err(DiskStructError::UnexpectedSize);
        }
        let tracks = (blocks/8) as u16;
        Ok(Self {
            kind: match tracks {
                35 => img::DiskKind::A2_525_16,
                _ => img::DiskKind::Unknown
            },
            tracks,
            sectors: 16,
            data: data.to_vec()
        })
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::DO
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
        error!("DO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn set_track_buf(&mut self,_track: usize,_dat: &[u8]) -> STDRESULT {
        error!("DO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn get_track_nibbles(&mut self,_track: usize) -> Result<Vec<u8>,DYNERR> {
        error!("DO images have no track bits");
        Err(Box::new(img::Error::ImageTypeMismatch))
    }
    fn display_track(&self,_bytes: &[u8]) -> String {
        String::from("DO images have no track bits to display")
    }
}
