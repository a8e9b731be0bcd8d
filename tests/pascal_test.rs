// test of the Pascal file system module
use a2disk::img::{DiskImage,dsk_po};
use a2disk::fs::{DiskFS,pascal};

fn blank() -> pascal::Disk {
    let img: Box<dyn DiskImage> = Box::new(dsk_po::PO::create(280));
    let mut disk = pascal::Disk::from_img(img);
    disk.format("BLANK",0,None).expect("format failed");
    disk
}

#[test]
fn format_and_free_blocks() {
    let mut disk = blank();
    assert_eq!(disk.fs_name(),"a2 pascal");
    assert_eq!(disk.total_units().expect("no total"),280);
    let free = disk.free_units().expect("no free count");
    assert!(free<280 && free>270);
}

#[test]
fn data_file_round_trip() {
    let mut disk = blank();
    let dat: Vec<u8> = (0..3000).map(|i| (i*7 % 256) as u8).collect();
    disk.bsave("SOMEDATA",&dat,0,None).expect("bsave failed");
    let (_a,back) = disk.bload("SOMEDATA").expect("bload failed");
    assert_eq!(back,dat);
    let cat = disk.catalog("").expect("catalog failed");
    assert!(cat.iter().any(|f| f.name=="SOMEDATA"));
}

#[test]
fn delete_restores_free_blocks() {
    let mut disk = blank();
    let free0 = disk.free_units().expect("no free count");
    disk.bsave("DOOMED",&vec![0x7f;4000],0,None).expect("bsave failed");
    assert!(disk.free_units().expect("no free count") < free0);
    disk.delete("DOOMED").expect("delete failed");
    assert_eq!(disk.free_units().expect("no free count"),free0);
    assert!(disk.bload("DOOMED").is_err());
}

#[test]
fn contiguous_allocation() {
    // files pack one after another, so freeing the first leaves a gap
    // that a larger file cannot use
    let mut disk = blank();
    disk.bsave("FIRST",&vec![1;2048],0,None).expect("bsave failed");
    disk.bsave("SECOND",&vec![2;2048],0,None).expect("bsave failed");
    disk.delete("FIRST").expect("delete failed");
    // a file bigger than any remaining gap is refused even though the
    // total free count would cover it
    let free = disk.free_units().expect("no free count");
    assert!(disk.bsave("HUGE",&vec![3;free*512],0,None).is_err());
    // while a small one drops into the gap
    disk.bsave("LITTLE",&vec![4;512],0,None).expect("bsave failed");
    let (_a,back) = disk.bload("SECOND").expect("bload failed");
    assert_eq!(back,vec![2;2048]);
}

#[test]
fn rename_file() {
    let mut disk = blank();
    disk.bsave("OLD",&vec![9;100],0,None).expect("bsave failed");
    disk.rename("OLD","NEW").expect("rename failed");
    assert!(disk.bload("OLD").is_err());
    let (_a,back) = disk.bload("NEW").expect("bload failed");
    assert_eq!(back,vec![9;100]);
}
