// test of the CP/M file system module
use a2disk::img::{DiskImage,dsk_do};
use a2disk::bios::dpb;
use a2disk::fs::{DiskFS,cpm};

fn blank() -> cpm::Disk {
    let img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut disk = cpm::Disk::from_img(img,dpb::A2_525).expect("bad dpb");
    disk.format().expect("format failed");
    disk
}

#[test]
fn format_and_free_blocks() {
    let mut disk = blank();
    assert_eq!(disk.fs_name(),"cpm");
    assert_eq!(disk.total_units().expect("no total"),128);
    // two blocks hold the directory
    assert_eq!(disk.free_units().expect("no free count"),126);
}

#[test]
fn file_round_trip() {
    let mut disk = blank();
    // CP/M eof has record resolution, keep the length a multiple of 128
    let dat: Vec<u8> = (0..2048).map(|i| (i*11 % 256) as u8).collect();
    disk.bsave("HELLO.TXT",&dat,0,None).expect("bsave failed");
    let (_a,back) = disk.bload("HELLO.TXT").expect("bload failed");
    assert_eq!(back,dat);
    let cat = disk.catalog("").expect("catalog failed");
    assert!(cat.iter().any(|f| f.name.starts_with("HELLO")));
}

#[test]
fn multiple_extents() {
    let mut disk = blank();
    // 20K exceeds the 16K extent capacity of this DPB
    let dat: Vec<u8> = (0..20480).map(|i| (i % 256) as u8).collect();
    disk.bsave("BIGGER.BIN",&dat,0,None).expect("bsave failed");
    let (_a,back) = disk.bload("BIGGER.BIN").expect("bload failed");
    assert_eq!(back,dat);
    // the extents present as a single file
    let cat = disk.catalog("").expect("catalog failed");
    assert_eq!(cat.iter().filter(|f| f.name.starts_with("BIGGER")).count(),1);
}

#[test]
fn delete_restores_free_blocks() {
    let mut disk = blank();
    disk.bsave("DOOMED.BIN",&vec![0xe5;8192],0,None).expect("bsave failed");
    assert!(disk.free_units().expect("no free count") < 126);
    disk.delete("DOOMED.BIN").expect("delete failed");
    assert_eq!(disk.free_units().expect("no free count"),126);
    assert!(disk.bload("DOOMED.BIN").is_err());
}

#[test]
fn read_only_flag() {
    let mut disk = blank();
    disk.bsave("KEEPER.BIN",&vec![1;128],0,None).expect("bsave failed");
    disk.lock("KEEPER.BIN").expect("lock failed");
    assert!(disk.delete("KEEPER.BIN").is_err());
    disk.unlock("KEEPER.BIN").expect("unlock failed");
    disk.delete("KEEPER.BIN").expect("delete failed");
}

#[test]
fn rename_file() {
    let mut disk = blank();
    disk.bsave("OLD.BIN",&vec![9;128],0,None).expect("bsave failed");
    disk.rename("OLD.BIN","NEW.BIN").expect("rename failed");
    assert!(disk.bload("OLD.BIN").is_err());
    let (_a,back) = disk.bload("NEW.BIN").expect("bload failed");
    assert_eq!(back,vec![9;128]);
}
