// test of the ProDOS file system module
use a2disk::img::{DiskImage,dsk_po};
use a2disk::fs::{DiskFS,prodos};

fn blank() -> prodos::Disk {
    let img: Box<dyn DiskImage> = Box::new(dsk_po::PO::create(280));
    let mut disk = prodos::Disk::from_img(img);
    disk.format("NEWDISK",None).expect("format failed");
    disk
}

#[test]
fn format_and_free_blocks() {
    let mut disk = blank();
    assert_eq!(disk.fs_name(),"prodos");
    assert_eq!(disk.total_units().expect("no total"),280);
    // boot blocks, volume directory, and bitmap are spoken for
    let free = disk.free_units().expect("no free count");
    assert!(free<280 && free>270);
}

#[test]
fn tree_file_round_trip() {
    let mut disk = blank();
    // over 128K so the file must go to tree form
    let dat: Vec<u8> = (0..135000).map(|i| (i % 256) as u8).collect();
    // a relative path is referred to the volume directory
    disk.bsave("BIG",&dat,0x2000,None).expect("bsave failed");
    let (addr,back) = disk.bload("BIG").expect("bload failed");
    assert_eq!(addr,0x2000);
    assert_eq!(back,dat);
}

#[test]
fn sapling_on_800k() {
    let img: Box<dyn DiskImage> = Box::new(dsk_po::PO::create(1600));
    let mut disk = prodos::Disk::from_img(img);
    disk.format("BIGDISK",None).expect("format failed");
    let dat: Vec<u8> = (0..54321).map(|i| (i*7 % 255 + 1) as u8).collect();
    disk.bsave("MIDDLING",&dat,0x2000,None).expect("bsave failed");
    let (_a,back) = disk.bload("MIDDLING").expect("bload failed");
    assert_eq!(back,dat);
    // 107 data blocks plus the sapling index block
    let cat = disk.catalog("").expect("catalog failed");
    let info = cat.iter().find(|f| f.name=="MIDDLING").expect("file not listed");
    assert_eq!(info.blocks,108);
    assert_eq!(info.eof,54321);
}

#[test]
fn delete_restores_free_blocks() {
    let mut disk = blank();
    let free0 = disk.free_units().expect("no free count");
    disk.bsave("DOOMED",&vec![0x20;54321],0x2000,None).expect("bsave failed");
    assert!(disk.free_units().expect("no free count") < free0);
    disk.delete("DOOMED").expect("delete failed");
    assert_eq!(disk.free_units().expect("no free count"),free0);
    assert!(disk.bload("DOOMED").is_err());
}

#[test]
fn directories() {
    let mut disk = blank();
    assert!(disk.can_create_directories());
    disk.create("SUB").expect("mkdir failed");
    disk.bsave("SUB/PART",&vec![1,2,3],0x300,None).expect("bsave failed");
    let cat = disk.catalog("SUB").expect("catalog failed");
    assert!(cat.iter().any(|f| f.name=="PART"));
    // absolute paths work the same
    let (_a,back) = disk.bload("/NEWDISK/SUB/PART").expect("bload failed");
    assert_eq!(back,vec![1,2,3]);
}

#[test]
fn rename_file() {
    let mut disk = blank();
    disk.bsave("OLD",&vec![9,9,9],0x300,None).expect("bsave failed");
    disk.rename("OLD","NEW").expect("rename failed");
    assert!(disk.bload("OLD").is_err());
    let (_a,back) = disk.bload("NEW").expect("bload failed");
    assert_eq!(back,vec![9,9,9]);
}
