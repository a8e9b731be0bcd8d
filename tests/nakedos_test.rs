// test of the NakedOS file system module
use a2disk::img::{DiskImage,dsk_do};
use a2disk::fs::{Block,DiskFS,nakedos};

/// sector map claiming [2,0] and [2,5] for file DF2A
fn build_img() -> Box<dyn DiskImage> {
    let mut img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut map = vec![0xff;256];
    for i in 0..12 {
        map[i] = 0xfe;
    }
    map[32] = 0x2a;
    map[37] = 0x2a;
    img.write_block(Block::DO([0,3]),&map).expect("write failed");
    img.write_block(Block::DO([0,4]),&vec![0xff;256]).expect("write failed");
    img.write_block(Block::DO([0,5]),&vec![0xff;256]).expect("write failed");
    img.write_block(Block::DO([2,0]),&vec![0x11;256]).expect("write failed");
    img.write_block(Block::DO([2,5]),&vec![0x22;256]).expect("write failed");
    img
}

#[test]
fn detection() {
    let mut img = build_img();
    assert!(nakedos::Disk::test_img(&mut img));
    // a blank disk has no reserved run in the map area
    let mut blank: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    assert!(!nakedos::Disk::test_img(&mut blank));
    // a fresh DOS 3.3 disk is not NakedOS
    let dos_img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut dos = a2disk::fs::dos3x::Disk::from_img(dos_img).expect("bad image");
    dos.init33(254).expect("init failed");
    assert!(!nakedos::Disk::test_img(dos.get_img()));
}

#[test]
fn catalog_and_read() {
    let mut disk = nakedos::Disk::from_img(build_img()).expect("not recognized");
    assert_eq!(disk.fs_name(),"nakedos");
    let cat = disk.catalog("").expect("catalog failed");
    assert_eq!(cat.len(),1);
    assert_eq!(cat[0].name,"DF2A");
    assert_eq!(cat[0].blocks,2);
    // data comes back in ascending sector order
    let (_a,dat) = disk.bload("DF2A").expect("bload failed");
    assert_eq!(dat.len(),512);
    assert_eq!(dat[0..256],[0x11;256]);
    assert_eq!(dat[256..512],[0x22;256]);
    // the DF prefix is optional
    let (_a,dat2) = disk.bload("2A").expect("bload failed");
    assert_eq!(dat,dat2);
    assert!(disk.bload("DF99").is_err());
}

#[test]
fn unit_accounting() {
    let mut disk = nakedos::Disk::from_img(build_img()).expect("not recognized");
    assert_eq!(disk.total_units().expect("no total"),560);
    // 12 reserved sectors and 2 file sectors are not free
    assert_eq!(disk.free_units().expect("no free count"),546);
}

#[test]
fn mutations_are_refused() {
    let mut disk = nakedos::Disk::from_img(build_img()).expect("not recognized");
    assert!(disk.bsave("DF30",&vec![0;100],0,None).is_err());
    assert!(disk.delete("DF2A").is_err());
    assert!(disk.rename("DF2A","DF2B").is_err());
    assert_eq!(disk.catalog("").expect("catalog failed").len(),1);
}

#[test]
fn identified_from_bytestream() {
    let mut img = build_img();
    let bytes = img.to_bytes();
    let fs = a2disk::create_fs_from_bytestream(&bytes,None).expect("no file system");
    assert_eq!(fs.fs_name(),"nakedos");
}
