//! ## Disk Parameter Block
//!
//! A real CP/M never wrote its Disk Parameter Block (DPB) to disk; the BIOS
//! conjured one for each drive.  So the caller who wants a CP/M file system
//! has to supply a DPB along with the image.  The one layout seen on Apple II
//! 5.25 inch disks is provided as a constant.

use crate::fs::cpm::types::{DIR_ENTRY_SIZE,LOGICAL_EXTENT_SIZE,RECORD_SIZE};
use log::debug;

/// DPB as defined for CP/M v2.  The fields constrain one another in several
/// ways, so after hand-editing run `verify`.
pub struct DiskParameterBlock {
    /// 128-byte records per track
    pub spt: u16,
    /// block shift, block bytes = 128 << bsh
    pub bsh: u8,
    /// block mask, must equal 2^bsh - 1
    pub blm: u8,
    /// extent mask, logical extents per extent minus 1, one of 0,1,3,7,15.
    /// An extent holds 16 one-byte block pointers when DSM < 256,
    /// 8 two-byte pointers otherwise.
    pub exm: u8,
    /// highest block number in the user area
    pub dsm: u16,
    /// highest directory entry number
    pub drm: u16,
    /// allocation bitmap for blocks 0-7, high bit is block 0
    pub al0: u8,
    /// allocation bitmap for blocks 8-15
    pub al1: u8,
    /// directory check vector size
    pub cks: u16,
    /// reserved tracks preceding the user area
    pub off: u16,
    /// physical record shift, log2(sector_bytes/128), 0 when BDOS need not translate
    pub psh: u8,
    /// physical record mask, sector_bytes/128 - 1, 0 when BDOS need not translate
    pub phm: u8
}

/// Parameters for the 5.25 inch Apple II CP/M disk
pub const A2_525: DiskParameterBlock = DiskParameterBlock {
    spt: 32,
    bsh: 3,
    blm: 7,
    exm: 0,
    dsm: 127,
    drm: 63,
    al0: 0b11000000,
    al1: 0b00000000,
    cks: 0x8000,
    off: 3,
    psh: 0,
    phm: 0
};

impl DiskParameterBlock {
    /// Check every interdependency among the fields.
    pub fn verify(&self) -> bool {
        if self.bsh < 3 || self.bsh > 7 {
            debug!("block shift {} out of range",self.bsh);
            return false;
        }
        let bls = self.block_size();
        if self.blm as usize + 1 != bls/RECORD_SIZE {
            debug!("block mask does not match block shift");
            return false;
        }
        if self.dsm > 0x7fff {
            debug!("too many blocks");
            return false;
        }
        if self.bsh == 3 && self.dsm > 0xff {
            debug!("too many blocks for 1K block size");
            return false;
        }
        let ptrs_per_x = 16 / self.ptr_size();
        if !matches!(self.exm,0 | 1 | 3 | 7 | 15) {
            debug!("extent mask {} is not a mask",self.exm);
            return false;
        }
        if (self.exm as usize + 1) * LOGICAL_EXTENT_SIZE > ptrs_per_x * bls {
            debug!("extent mask {} overruns the block list",self.exm);
            return false;
        }
        if self.dir_entries() > 16*bls/DIR_ENTRY_SIZE {
            debug!("too many directory entries");
            return false;
        }
        let dir_bits = self.al0.count_ones() + self.al1.count_ones();
        if dir_bits as usize != self.dir_entries()*DIR_ENTRY_SIZE/bls {
            debug!("allocation bitmap does not cover the directory");
            return false;
        }
        if self.dir_blocks() > self.user_blocks() {
            debug!("directory spills past the user area");
            return false;
        }
        true
    }
    /// bytes per block
    pub fn block_size(&self) -> usize {
        RECORD_SIZE << self.bsh as usize
    }
    /// bytes per block pointer in the extent block list
    pub fn ptr_size(&self) -> usize {
        match self.dsm < 256 {
            true => 1,
            false => 2
        }
    }
    /// bytes a single extent can map
    pub fn extent_capacity(&self) -> usize {
        (self.exm as usize + 1) * LOGICAL_EXTENT_SIZE
    }
    /// blocks in the user area, directory included
    pub fn user_blocks(&self) -> usize {
        self.dsm as usize + 1
    }
    /// directory slots available
    pub fn dir_entries(&self) -> usize {
        self.drm as usize + 1
    }
    /// blocks the directory occupies
    pub fn dir_blocks(&self) -> usize {
        self.dir_entries()*DIR_ENTRY_SIZE/self.block_size()
    }
    /// Is the block held by the directory?  AL0 covers blocks 0-7 starting
    /// from the high bit, AL1 covers 8-15.
    pub fn is_reserved(&self,iblock: usize) -> bool {
        match iblock {
            b if b < 8 => self.al0 & (0x80 >> b) > 0,
            b if b < 16 => self.al1 & (0x80 >> (b-8)) > 0,
            _ => false
        }
    }
    /// blocks held by the directory per the allocation bitmaps
    pub fn reserved_blocks(&self) -> usize {
        (self.al0.count_ones() + self.al1.count_ones()) as usize
    }
    /// Byte capacity of the whole disk: reserved tracks, user area, and any
    /// tail of the last track the user area does not fill.  The DPB cannot
    /// express per-track variations, every track is taken as `spt` records.
    pub fn disk_capacity(&self) -> usize {
        let track_bytes = self.spt as usize * RECORD_SIZE;
        let user = self.user_blocks() * self.block_size();
        let full = self.off as usize * track_bytes + user;
        match user % track_bytes {
            0 => full,
            tail => full + track_bytes - tail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_dpb() {
        assert!(A2_525.verify());
        assert_eq!(A2_525.block_size(),1024);
        assert_eq!(A2_525.ptr_size(),1);
        assert_eq!(A2_525.user_blocks(),128);
        assert_eq!(A2_525.dir_blocks(),2);
        assert_eq!(A2_525.reserved_blocks(),2);
        assert!(A2_525.is_reserved(0) && A2_525.is_reserved(1) && !A2_525.is_reserved(2));
        // 3 OS tracks + 128 K user area, 4096 bytes per track
        assert_eq!(A2_525.disk_capacity(),3*4096 + 128*1024);
    }
}
