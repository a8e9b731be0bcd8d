//! # `a2disk` main library
//!
//! This library manipulates Apple II disk images at a level as low as track bits,
//! or as high as files within a file system.
//!
//! ## Architecture
//!
//! Disk image operations are built around three trait objects:
//! * `img::DiskImage` encodes/decodes disk tracks, does not try to interpret a file system
//! * `fs::DiskFS` imposes a file system on the already decoded track data
//! * `fs::FileImage` provides a representation of a file that can be restored to a disk image
//!
//! When a `DiskFS` object is created it takes ownership of some `DiskImage`.
//! It then uses this owned image as storage.  Any changes are not permanent until the
//! image is saved to whatever file system is hosting a2disk.
//!
//! ## File Systems
//!
//! In order to manipulate files, `a2disk` must understand the file system it finds on the
//! disk image.  As of this writing `a2disk` supports
//! * DOS 3.x, including the UniDOS and OzDOS dual volumes
//! * ProDOS
//! * Pascal File System
//! * CP/M 2.2
//! * RDOS and NakedOS (read-only)
//!
//! ## Disk Images
//!
//! In order to manipulate tracks and sectors, `a2disk` must understand the way the track
//! data is packed into a disk image.  As of this writing `a2disk` supports
//! * DSK, D13, DO, PO, HDV
//! * NIB
//! * WOZ (1 and 2)
//! * 2MG and DiskCopy 4.2
//! * gzip compressed copies of any of the above
//!
//! The `Source` struct wraps the image bytes during load and save, gathering hints
//! from the file name and headers that guide the search for an interpretation.
//! Some physical bytes legitimately support more than one interpretation, so the
//! `inspect` function returns every file system that validates.

pub mod fs;
pub mod bios;
pub mod img;

use img::DiskImage;
use fs::DiskFS;
use std::io::Read;
use std::fmt::Write;
use log::{warn,info};
use regex::Regex;
use flate2::Compression;
use hex;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const KNOWN_FILE_EXTENSIONS: &str = "2mg,2img,dsk,d13,do,nib,po,hdv,woz,dc42,gz";
const GZIP_MAGIC: [u8;2] = [0x1f,0x8b];

/// Clues about the structure of a `Source`, gathered from the file name and
/// the outermost headers.  Hints narrow the search, they are never trusted
/// on their own; e.g. many ProDOS disks ship in DOS ordered DSK files.
#[derive(Clone,Copy,PartialEq,Eq)]
pub struct Hints {
    pub dos_order: bool,
    pub prodos_order: bool,
    pub nibble: bool,
    pub from_2mg: bool,
    pub from_diskcopy: bool,
    pub gzip: bool
}

impl Hints {
    pub fn none() -> Self {
        Self {
            dos_order: false,
            prodos_order: false,
            nibble: false,
            from_2mg: false,
            from_diskcopy: false,
            gzip: false
        }
    }
    /// Gather hints from a file name, working outward in, e.g.,
    /// `disk.do.gz` hints at a gzipped DOS ordered image.
    pub fn from_path(path: &str) -> Self {
        let mut ans = Self::none();
        let mut stem = path.to_lowercase();
        if stem.ends_with(".gz") {
            ans.gzip = true;
            stem = stem[0..stem.len()-3].to_string();
        }
        match stem.split('.').last() {
            Some("do") | Some("dsk") | Some("d13") => ans.dos_order = true,
            Some("po") | Some("hdv") => ans.prodos_order = true,
            Some("nib") => ans.nibble = true,
            Some("2mg") | Some("2img") => ans.from_2mg = true,
            Some("dc42") => ans.from_diskcopy = true,
            _ => {}
        }
        ans
    }
}

/// Owner of the image bytes during load and save.  The stored bytes are
/// always the underlying image; compression is undone on the way in and
/// redone on the way out.
pub struct Source {
    pub bytes: Vec<u8>,
    pub origin: Option<String>,
    pub hints: Hints
}

impl Source {
    /// Wrap a raw byte buffer, inflating it if it is gzipped.
    /// The optional origin path contributes hints but is not read.
    pub fn from_bytes(raw: &[u8],origin: Option<&str>) -> Result<Self,DYNERR> {
        let mut hints = match origin {
            Some(path) => Hints::from_path(path),
            None => Hints::none()
        };
        let bytes = match raw.len()>2 && raw[0..2]==GZIP_MAGIC {
            true => {
                info!("inflating gzip stream");
                hints.gzip = true;
                let mut ans = Vec::new();
                let mut decoder = flate2::read::GzDecoder::new(raw);
                decoder.read_to_end(&mut ans)?;
                ans
            },
            false => raw.to_vec()
        };
        if bytes.len()>=4 && &bytes[0..4]==b"2IMG" {
            hints.from_2mg = true;
        }
        if bytes.len()>=0x54 && bytes[0x52..0x54]==[0x01,0x00] {
            hints.from_diskcopy = true;
        }
        Ok(Self {
            bytes,
            origin: origin.map(|s| s.to_string()),
            hints
        })
    }
    /// Slurp a file, inflating it if it is gzipped.
    pub fn open(path: &str) -> Result<Self,DYNERR> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(&raw,Some(path))
    }
    /// Write the bytes back out, deflating them again if they came in gzipped.
    pub fn save(&self,path: &str) -> STDRESULT {
        match self.hints.gzip || path.to_lowercase().ends_with(".gz") {
            true => {
                let mut ans = Vec::new();
                let mut encoder = flate2::read::GzEncoder::new(&self.bytes[..],Compression::default());
                encoder.read_to_end(&mut ans)?;
                std::fs::write(path,&ans)?;
            },
            false => std::fs::write(path,&self.bytes)?
        }
        Ok(())
    }
}

/// Save the image file (make changes permanent).
/// A path ending in `.gz` produces a gzipped image.
pub fn save_img(disk: &mut Box<dyn DiskFS>,img_path: &str) -> STDRESULT {
    let bytes = disk.get_img().to_bytes();
    let src = Source {
        bytes,
        origin: Some(img_path.to_string()),
        hints: Hints::from_path(img_path)
    };
    src.save(img_path)
}

/// Containers worth trying given the hints, most specific first.
/// Hints only reorder the search; every container is still tried, since a
/// hint can be a coincidence, e.g. a boot sector that happens to carry the
/// DiskCopy version bytes at offset 0x52.
fn candidate_containers(hints: &Hints) -> Vec<img::DiskImageType> {
    use img::DiskImageType::*;
    let mut ans = Vec::new();
    if hints.from_2mg {
        ans.push(DOT2MG);
    }
    if hints.from_diskcopy {
        ans.push(DC42);
    }
    if hints.nibble {
        ans.push(NIB);
    }
    if hints.dos_order {
        ans.push(D13);
        ans.push(DO);
    }
    if hints.prodos_order {
        ans.push(PO);
    }
    for typ in [WOZ1,WOZ2,DOT2MG,DC42,NIB,D13,DO,PO] {
        if !ans.contains(&typ) {
            ans.push(typ);
        }
    }
    ans
}

/// Parse the bytes as the given container, or None if they do not fit it.
fn make_img(typ: &img::DiskImageType,dat: &[u8]) -> Option<Box<dyn DiskImage>> {
    match typ {
        img::DiskImageType::WOZ1 => img::woz1::Woz1::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::WOZ2 => img::woz2::Woz2::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::DOT2MG => img::dot2mg::Dot2mg::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::DC42 => img::diskcopy::Dc42::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::NIB => img::nib::Nib::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::D13 => img::dsk_d13::D13::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::DO => img::dsk_do::DO::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>),
        img::DiskImageType::PO => img::dsk_po::PO::from_bytes(dat).ok().map(|x| Box::new(x) as Box<dyn DiskImage>)
    }
}

/// Find every file system interpretation of a source.  Each result takes
/// ownership of its own disk image object, all of them parsed from the same
/// bytes.  An empty vector means the format was not recognized; this is a
/// report, not an error.  A file system claims at most one container, but
/// several file systems can validate against the same bytes, e.g. RDOS can
/// ride on what is otherwise a valid DOS image.
pub fn inspect(src: &Source) -> Vec<Box<dyn DiskFS>> {
    let mut ans: Vec<Box<dyn DiskFS>> = Vec::new();
    let mut claimed: Vec<String> = Vec::new();

    // dual-volume systems have a distinctive size, try them first
    if let Ok((vol1,vol2)) = img::dual::Unidos::pair_from_bytes(&src.bytes) {
        let mut test: Box<dyn DiskImage> = Box::new(img::dual::Unidos::from_bytes(&src.bytes).expect("unreachable"));
        if fs::dos3x::Disk::test_img(&mut test) {
            info!("identified UniDOS volume pair");
            if let (Ok(d1),Ok(d2)) = (fs::dos3x::Disk::from_img(Box::new(vol1)),fs::dos3x::Disk::from_img(Box::new(vol2))) {
                ans.push(Box::new(d1));
                ans.push(Box::new(d2));
                claimed.push(String::from(fs::dos3x::FS_NAME));
            }
        }
    }
    if claimed.len()==0 {
        if let Ok((vol1,vol2)) = img::dual::Ozdos::pair_from_bytes(&src.bytes) {
            let mut test: Box<dyn DiskImage> = Box::new(img::dual::Ozdos::from_bytes(&src.bytes).expect("unreachable"));
            if fs::dos3x::Disk::test_img(&mut test) {
                info!("identified OzDOS volume pair");
                if let (Ok(d1),Ok(d2)) = (fs::dos3x::Disk::from_img(Box::new(vol1)),fs::dos3x::Disk::from_img(Box::new(vol2))) {
                    ans.push(Box::new(d1));
                    ans.push(Box::new(d2));
                    claimed.push(String::from(fs::dos3x::FS_NAME));
                }
            }
        }
    }

    for typ in candidate_containers(&src.hints) {
        if !claimed.contains(&String::from(fs::dos3x::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::dos3x::Disk::test_img(&mut img) {
                    if let Ok(disk) = fs::dos3x::Disk::from_img(img) {
                        info!("identified DOS 3.x file system in {}",typ);
                        claimed.push(String::from(fs::dos3x::FS_NAME));
                        ans.push(Box::new(disk));
                    }
                }
            }
        }
        if !claimed.contains(&String::from(fs::prodos::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::prodos::Disk::test_img(&mut img) {
                    info!("identified ProDOS file system in {}",typ);
                    claimed.push(String::from(fs::prodos::FS_NAME));
                    ans.push(Box::new(fs::prodos::Disk::from_img(img)));
                }
            }
        }
        if !claimed.contains(&String::from(fs::pascal::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::pascal::Disk::test_img(&mut img) {
                    info!("identified Pascal file system in {}",typ);
                    claimed.push(String::from(fs::pascal::FS_NAME));
                    ans.push(Box::new(fs::pascal::Disk::from_img(img)));
                }
            }
        }
        if !claimed.contains(&String::from(fs::cpm::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::cpm::Disk::test_img(&mut img,&bios::dpb::A2_525) {
                    if let Ok(disk) = fs::cpm::Disk::from_img(img,bios::dpb::A2_525) {
                        info!("identified CP/M file system in {}",typ);
                        claimed.push(String::from(fs::cpm::FS_NAME));
                        ans.push(Box::new(disk));
                    }
                }
            }
        }
        if !claimed.contains(&String::from(fs::rdos::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::rdos::Disk::test_img(&mut img).is_some() {
                    if let Ok(disk) = fs::rdos::Disk::from_img(img) {
                        info!("identified {} file system in {}",disk.fs_name(),typ);
                        claimed.push(String::from(fs::rdos::FS_NAME));
                        ans.push(Box::new(disk));
                    }
                }
            }
        }
        if !claimed.contains(&String::from(fs::nakedos::FS_NAME)) {
            if let Some(mut img) = make_img(&typ,&src.bytes) {
                if fs::nakedos::Disk::test_img(&mut img) {
                    if let Ok(disk) = fs::nakedos::Disk::from_img(img) {
                        info!("identified NakedOS file system in {}",typ);
                        claimed.push(String::from(fs::nakedos::FS_NAME));
                        ans.push(Box::new(disk));
                    }
                }
            }
        }
    }
    if ans.len()==0 {
        warn!("cannot match any file system");
    }
    ans
}

/// Given a bytestream return a disk image without any file system.
/// N.b. the ordering for DSK types cannot always be determined without the file system.
pub fn create_img_from_bytestream(disk_img_data: &[u8],hints: &Hints) -> Result<Box<dyn DiskImage>,DYNERR> {
    for typ in candidate_containers(hints) {
        if let Some(img) = make_img(&typ,disk_img_data) {
            info!("identified {} image",typ);
            return Ok(img);
        }
    }
    warn!("cannot match any image format");
    Err(Box::new(img::Error::ImageTypeMismatch))
}

/// Calls `create_img_from_bytestream` getting the bytes from a file.
/// The file name will be used to gather hints, unless the extension is
/// unknown, in which case everything is tried.
pub fn create_img_from_file(img_path: &str) -> Result<Box<dyn DiskImage>,DYNERR> {
    let src = source_with_known_ext(img_path)?;
    create_img_from_bytestream(&src.bytes,&src.hints)
}

/// Given a bytestream return the preferred file system, or Err if the
/// bytestream cannot be interpreted.  Use `inspect` to get every
/// interpretation of an ambiguous image.
pub fn create_fs_from_bytestream(disk_img_data: &[u8],maybe_path: Option<&str>) -> Result<Box<dyn DiskFS>,DYNERR> {
    let src = Source::from_bytes(disk_img_data,maybe_path)?;
    let mut all = inspect(&src);
    match all.len() {
        0 => Err(Box::new(fs::Error::FileSystemMismatch)),
        n => {
            if n>1 {
                info!("image supports {} interpretations, taking the first",n);
            }
            Ok(all.remove(0))
        }
    }
}

/// Calls `create_fs_from_bytestream` getting the bytes from a file.
/// The file name will be used to gather hints, unless the extension is
/// unknown, in which case everything is tried.
pub fn create_fs_from_file(img_path: &str) -> Result<Box<dyn DiskFS>,DYNERR> {
    let src = source_with_known_ext(img_path)?;
    let mut all = inspect(&src);
    match all.len() {
        0 => Err(Box::new(fs::Error::FileSystemMismatch)),
        _ => Ok(all.remove(0))
    }
}

/// Open a source, dropping the path hints if the extension is unknown.
fn source_with_known_ext(img_path: &str) -> Result<Source,DYNERR> {
    let mut src = Source::open(img_path)?;
    if let Some(ext) = img_path.split('.').last() {
        if !KNOWN_FILE_EXTENSIONS.contains(&ext.to_lowercase()) {
            let gzip = src.hints.gzip;
            src.hints = Hints::none();
            src.hints.gzip = gzip;
        }
    }
    Ok(src)
}

/// This takes any bytes and makes an ascii friendly string
/// by using hex escapes, e.g., `\xFF`.
/// if `escape_cc` is true, ascii control characters are also escaped.
/// if `inverted` is true, assume we have negative ascii bytes.
pub fn escaped_ascii_from_bytes(bytes: &[u8],escape_cc: bool,inverted: bool) -> String {
    let mut result = String::new();
    let (lb,ub) = match (escape_cc,inverted) {
        (true,false) => (0x20,0x7e),
        (false,false) => (0x00,0x7f),
        (true,true) => (0xa0,0xfe),
        (false,true) => (0x80,0xff)
    };
    for i in 0..bytes.len() {
        if bytes[i]>=lb && bytes[i]<=ub {
            if inverted {
                result += std::str::from_utf8(&[bytes[i]-0x80]).expect("unreachable");
            } else {
                result += std::str::from_utf8(&[bytes[i]]).expect("unreachable");
            }
        } else {
            let mut temp = String::new();
            write!(&mut temp,"\\x{:02X}",bytes[i]).expect("unreachable");
            result += &temp;
        }
    }
    return result;
}

/// Interpret a UTF8 string as pure ascii and put into bytes.
/// Non-ascii characters are omitted from the result, but arbitrary
/// bytes can be introduced using escapes, e.g., `\xFF`.
/// Literal hex escapes are created by coding the backslash, e.g., `\x5CxFF`.
/// if `inverted` is true the sign of the non-escaped bytes is flipped.
/// if `caps` is true the ascii is put in upper case.
pub fn parse_escaped_ascii(s: &str,inverted: bool,caps: bool) -> Vec<u8> {
    let mut ans: Vec<u8> = Vec::new();
    let hex_patt = Regex::new(r"\\x[0-9A-Fa-f][0-9A-Fa-f]").expect("unreachable");
    let mut hexes = hex_patt.find_iter(s);
    let mut maybe_hex = hexes.next();
    let mut curs = 0;
    let mut skip = 0;
    for c in s.chars() {
        if skip>0 {
            skip -= 1;
            continue;
        }
        if let Some(hex) = maybe_hex {
            if curs==hex.start() {
                ans.append(&mut hex::decode(s.get(curs+2..curs+4).unwrap()).expect("unreachable"));
                curs += 4;
                maybe_hex = hexes.next();
                skip = 3;
                continue;
            }
        }
        if c.is_ascii() {
            let mut buf: [u8;1] = [0;1];
            if caps {
                c.to_uppercase().next().unwrap().encode_utf8(&mut buf);
            } else {
                c.encode_utf8(&mut buf);
            }
            ans.push(buf[0] + match inverted { true => 128, false => 0 });
        }
        curs += 1;
    }
    return ans;
}

/// Calls `parse_escaped_ascii` with `caps=true`
pub fn escaped_ascii_to_bytes(s: &str,inverted: bool) -> Vec<u8> {
    parse_escaped_ascii(s,inverted,true)
}

#[test]
fn test_escaped_ascii() {
    assert_eq!(escaped_ascii_from_bytes(&[0xc8,0xc5,0xcc,0xcc,0xcf],true,true),"HELLO");
    assert_eq!(escaped_ascii_from_bytes(&[0x48,0x05],true,false),"H\\x05");
    assert_eq!(escaped_ascii_to_bytes("hello",true),vec![0xc8,0xc5,0xcc,0xcc,0xcf]);
    assert_eq!(escaped_ascii_to_bytes("a\\xFF",false),vec![0x41,0xff]);
}

#[test]
fn test_hints_from_path() {
    let hints = Hints::from_path("games.dsk");
    assert!(hints.dos_order && !hints.prodos_order && !hints.gzip);
    let hints = Hints::from_path("hard.hdv");
    assert!(hints.prodos_order);
    let hints = Hints::from_path("flux.woz.gz");
    assert!(hints.gzip && !hints.dos_order && !hints.nibble);
    let hints = Hints::from_path("raw.nib");
    assert!(hints.nibble);
}
