//! ## Sector skewing module
//!
//! All the sector skew tables, plus the non-trivial transformations between
//! blocks and sectors.  These are facts about the hardware and firmware, not
//! about any particular file system, so they live here where both the image
//! and file system layers can reach them.

use log::trace;

/// Physical sector skew used by DOS 3.2 on 13 sector disks
pub const DOS32_PHYSICAL: [usize;13] = [0,10,7,4,1,11,8,5,2,12,9,6,3];
/// Translate DOS 3.3 logical sector to physical sector
pub const DOS_LSEC_TO_DOS_PSEC: [usize;16] = [0,13,11,9,7,5,3,1,14,12,10,8,6,4,2,15];
/// Translate DOS 3.3 physical sector to logical sector
pub const DOS_PSEC_TO_DOS_LSEC: [usize;16] = [0,7,14,6,13,5,12,4,11,3,10,2,9,1,8,15];

/// Take CP/M logical sector to DOS logical sector; the offset within the DOS sector is obtained by another table.
pub const CPM_LSEC_TO_DOS_LSEC: [usize;32] = [0,0,6,6,12,12,3,3,9,9,15,15,14,14,5,5,11,11,2,2,8,8,7,7,13,13,4,4,10,10,1,1];
/// Take CP/M logical sector to offset within DOS logical sector
pub const CPM_LSEC_TO_DOS_OFFSET: [usize;32] = [0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128,0,128];

/// Get block number and byte offset into block corresponding to
/// track and logical sector.  Returned in tuple (block,offset)
pub fn prodos_block_from_ts(track: usize,sector: usize) -> (usize,usize) {
    let block_offset: [usize;16] = [0,7,6,6,5,5,4,4,3,3,2,2,1,1,0,7];
    let byte_offset: [usize;16] = [0,0,256,0,256,0,256,0,256,0,256,0,256,0,256,256];
    (8*track + block_offset[sector], byte_offset[sector])
}

/// Get the two track and logical sector pairs corresponding to a ProDOS
/// block on a 16 sector 5.25 inch disk, in order of block halves.
pub fn ts_from_prodos_block(block: usize) -> [[usize;2];2] {
    let sector1: [usize;8] = [0,13,11,9,7,5,3,1];
    let sector2: [usize;8] = [14,12,10,8,6,4,2,15];
    let [track,sec1,sec2] = [block/8,sector1[block%8],sector2[block%8]];
    trace!("locate block {}: track {}, sectors {},{}",block,track,sec1,sec2);
    [[track,sec1],[track,sec2]]
}
