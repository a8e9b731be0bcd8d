// test of the disk image containers
use std::io::Read;
use a2disk::img::{DiskImage,DiskImageType,DiskKind};
use a2disk::img::{dsk_do,nib,woz2,dot2mg,diskcopy};
use a2disk::fs::{Block,DiskFS};
use a2disk::{Source,Hints};

#[test]
fn nib_matches_dsk() {
    let mut dsk = dsk_do::DO::create(35,16);
    let mut nibbly = nib::Nib::create(254,DiskKind::A2_525_16).expect("could not create NIB");
    let pattern: Vec<u8> = (0..256).map(|i| (i*3 % 256) as u8).collect();
    for ts in [[0,0],[14,5],[34,15]] {
        dsk.write_block(Block::DO(ts),&pattern).expect("write failed");
        nibbly.write_block(Block::DO(ts),&pattern).expect("write failed");
    }
    for ts in [[0,0],[14,5],[34,15]] {
        let d = dsk.read_block(Block::DO(ts)).expect("read failed");
        let n = nibbly.read_block(Block::DO(ts)).expect("read failed");
        assert_eq!(d,n);
    }
    // ProDOS addressing goes through the same physical sectors
    let d = dsk.read_block(Block::PO(14*8)).expect("read failed");
    let n = nibbly.read_block(Block::PO(14*8)).expect("read failed");
    assert_eq!(d,n);
}

#[test]
fn woz2_round_trip() {
    let mut woz = woz2::Woz2::create(254,DiskKind::A2_525_16).expect("could not create WOZ");
    woz.put_meta("language","English").expect("put_meta failed");
    let pattern: Vec<u8> = (0..256).map(|i| i as u8).collect();
    woz.write_block(Block::DO([3,4]),&pattern).expect("write failed");
    let bytes = woz.to_bytes();
    let mut back = woz2::Woz2::from_bytes(&bytes).expect("could not parse WOZ");
    assert!(back.what_am_i()==DiskImageType::WOZ2);
    assert_eq!(back.track_count(),35);
    assert_eq!(back.get_meta("language"),Some("English".to_string()));
    assert_eq!(back.read_block(Block::DO([3,4])).expect("read failed"),pattern);
}

#[test]
fn two_mg_detection() {
    let mut disk = dot2mg::Dot2mg::create(254,DiskKind::A2_525_16,Some(DiskImageType::DO))
        .expect("could not create 2MG");
    let bytes = disk.to_bytes();
    let src = Source::from_bytes(&bytes,None).expect("could not wrap bytes");
    assert!(src.hints.from_2mg);
    let img = a2disk::create_img_from_bytestream(&bytes,&Hints::none()).expect("no image");
    assert!(img.what_am_i()==DiskImageType::DOT2MG);
}

#[test]
fn diskcopy_detection() {
    let mut disk = diskcopy::Dc42::create(DiskKind::A2_35_800).expect("could not create DC42");
    let bytes = disk.to_bytes();
    let src = Source::from_bytes(&bytes,None).expect("could not wrap bytes");
    assert!(src.hints.from_diskcopy);
    let img = a2disk::create_img_from_bytestream(&bytes,&Hints::none()).expect("no image");
    assert!(img.what_am_i()==DiskImageType::DC42);
}

#[test]
fn boot_sector_coincidence_is_not_diskcopy() {
    // a plain DOS disk whose boot code happens to carry the DiskCopy
    // version bytes at offset 0x52 must still be recognized
    let img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut disk = a2disk::fs::dos3x::Disk::from_img(img).expect("bad image");
    disk.init33(254).expect("init failed");
    let mut bytes = disk.get_img().to_bytes();
    bytes[0x52] = 0x01;
    bytes[0x53] = 0x00;
    let src = Source::from_bytes(&bytes,None).expect("could not wrap bytes");
    assert!(src.hints.from_diskcopy);
    let fs = a2disk::create_fs_from_bytestream(&bytes,None).expect("no file system");
    assert_eq!(fs.fs_name(),"a2 dos");
}

#[test]
fn hard_disk_kinds() {
    use std::str::FromStr;
    use a2disk::img::names;
    assert_eq!(DiskKind::from_str("hd5").expect("bad kind"),DiskKind::LogicalBlocks(10240));
    assert_eq!(DiskKind::from_str("hd10").expect("bad kind"),DiskKind::LogicalBlocks(20480));
    assert_eq!(DiskKind::from_str("hd20").expect("bad kind"),DiskKind::LogicalBlocks(40960));
    assert_eq!(DiskKind::from_str("hdmax").expect("bad kind"),DiskKind::LogicalBlocks(names::A2_HD_MAX_BLOCKS));
    // largest volume falls one block short of 32MB
    assert_eq!(names::A2_HD_MAX_SIZE,32*1024*1024 - names::BLOCK_SIZE);
    if let DiskKind::LogicalBlocks(blocks) = DiskKind::from_str("hd20").expect("bad kind") {
        let img = a2disk::img::dsk_po::PO::create(blocks);
        assert_eq!(img.byte_capacity(),names::A2_HD_20MB_SIZE);
    }
}

#[test]
fn gzip_and_file_round_trip() {
    let img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut disk = a2disk::fs::dos3x::Disk::from_img(img).expect("bad image");
    disk.init33(254).expect("init failed");
    let mut boxed: Box<dyn DiskFS> = Box::new(disk);
    let bytes = boxed.get_img().to_bytes();
    // identify the file system through the gzip wrapper
    let mut gz: Vec<u8> = Vec::new();
    let mut encoder = flate2::read::GzEncoder::new(&bytes[..],flate2::Compression::default());
    encoder.read_to_end(&mut gz).expect("deflate failed");
    let fs = a2disk::create_fs_from_bytestream(&gz,Some("disk.do.gz")).expect("no file system");
    assert_eq!(fs.fs_name(),"a2 dos");
    // save keeps the compression, open undoes it
    let dir = tempfile::tempdir().expect("no temp dir");
    let path = dir.path().join("disk.do.gz");
    let path_str = path.to_str().expect("bad path");
    a2disk::save_img(&mut boxed,path_str).expect("save failed");
    let on_disk = std::fs::read(path_str).expect("read failed");
    assert_eq!(&on_disk[0..2],&[0x1f,0x8b]);
    let src = Source::open(path_str).expect("open failed");
    assert!(src.hints.gzip);
    assert!(src.hints.dos_order);
    assert_eq!(src.bytes,bytes);
}
