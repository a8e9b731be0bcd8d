//! # BIOS-level address maps
//!
//! Tables and transformations that are properties of the firmware rather than
//! of any file system or image format.  Kept separate because several image
//! and file system modules use the same tables.

pub mod skew;
pub mod dpb;
