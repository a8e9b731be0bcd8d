//! Convenient constants for standard disk geometries and sizes

/// Bytes in a 13 sector 5.25 inch sector dump
pub const A2_DOS32_SIZE: usize = 35*13*256;
/// Bytes in a 16 sector 5.25 inch sector dump
pub const A2_DOS33_SIZE: usize = 35*16*256;
/// Bytes in a track of a standard nibble image
pub const A2_NIB_TRACK_SIZE: usize = 6656;
/// Bytes in a standard 35 track nibble image
pub const A2_NIB_SIZE: usize = 35*A2_NIB_TRACK_SIZE;
/// Bytes in a 3.5 inch 400K dump
pub const A2_400K_SIZE: usize = 409600;
/// Bytes in a 3.5 inch 800K dump
pub const A2_800K_SIZE: usize = 819200;
/// Maximum block count of a ProDOS volume
pub const A2_HD_MAX_BLOCKS: usize = 65535;
/// Bytes in a 5MB hard drive dump
pub const A2_HD_5MB_SIZE: usize = 5*1024*1024;
/// Bytes in a 10MB hard drive dump
pub const A2_HD_10MB_SIZE: usize = 10*1024*1024;
/// Bytes in a 20MB hard drive dump
pub const A2_HD_20MB_SIZE: usize = 20*1024*1024;
/// Bytes in the largest possible ProDOS volume, just short of 32MB
pub const A2_HD_MAX_SIZE: usize = A2_HD_MAX_BLOCKS*BLOCK_SIZE;
/// Bytes in a block
pub const BLOCK_SIZE: usize = 512;
/// Bytes in a 5.25 inch sector
pub const SECTOR_SIZE: usize = 256;
/// Tracks added to reach the second volume of a UniDOS disk
pub const UNIDOS_TRACK_OFFSET: usize = 50;
/// Tracks and sectors of one UniDOS or OzDOS volume
pub const UNIDOS_TRACKS: usize = 50;
pub const UNIDOS_SECTORS: usize = 32;

pub fn creator_string() -> String {
    "a2disk v".to_string() + env!("CARGO_PKG_VERSION")
}
