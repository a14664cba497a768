extern crate lodestone;
extern crate tempfile;

mod common;

use std::fs;
use std::io::SeekFrom;
use std::sync::Arc;

use lodestone::errors::Error;
use lodestone::package;
use lodestone::prelude::*;

fn testbed(root: &std::path::Path) -> (ResourceManager, Arc<HeadlessFactory>) {
    common::setup();
    let factory = Arc::new(HeadlessFactory::new());
    let params = ResourceParams {
        root: Some(root.to_path_buf()),
        ..Default::default()
    };

    let manager = ResourceManager::with_services(params, factory.clone(), Arc::new(SystemAllocator));
    (manager, factory)
}

#[test]
fn load_from_host() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());

    let abs = common::write(dir.path(), "abs.bin", &common::pattern(1000));
    common::write(dir.path(), "textures/a.bin", b"relative");

    let a = manager.load_data(&common::host(&abs), 32, AllocFlags::default()).unwrap();
    let b = manager.load_data(abs.to_str().unwrap(), 1, AllocFlags::default()).unwrap();
    let c = manager.load_data("textures/a.bin", 1, AllocFlags::default()).unwrap();
    assert_eq!(manager.state(a), Some(ResourceState::Loading));

    let mark = manager.mark();
    manager.wait(mark);
    assert!(manager.sync(mark));

    let data = manager.get_data(a).unwrap();
    assert_eq!(&data[..], &common::pattern(1000)[..]);
    assert_eq!(data.as_ptr() as usize % 32, 0);
    assert_eq!(&manager.get_data(b).unwrap()[..], &data[..]);
    assert_eq!(&manager.get_data(c).unwrap()[..], b"relative");
}

#[test]
fn not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());

    match manager.load_data("missing.bin", 1, AllocFlags::default()) {
        Err(Error::NotFound(name)) => assert_eq!(name, "missing.bin"),
        other => panic!("unexpected {:?}", other),
    }

    // Directories are not files.
    fs::create_dir(dir.path().join("dir")).unwrap();
    assert!(manager.load_data("dir", 1, AllocFlags::default()).is_err());
    assert!(manager.is_empty());
}

#[test]
fn marks() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());

    // Nothing pending.
    let m0 = manager.mark();
    assert!(manager.sync(m0));
    manager.wait(m0);
    manager.wait(m0 + 1000);

    let mut ids = Vec::new();
    for i in 0..32 {
        let name = format!("{}.bin", i);
        common::write(dir.path(), &name, &vec![i as u8; 100 + i]);
        ids.push(manager.load_data(&name, 1, AllocFlags::default()).unwrap());
    }

    let m1 = manager.mark();
    assert!(m1 > m0);

    while !manager.sync(m1) {
        std::thread::yield_now();
    }

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(manager.state(*id), Some(ResourceState::Loaded));
        let data = manager.get_data(*id).unwrap();
        assert_eq!(data.len(), 100 + i);
        assert!(data.iter().all(|&v| v == i as u8));
    }

    // Loads issued after a mark are not covered by it.
    let late = manager.load_data("0.bin", 1, AllocFlags::default()).unwrap();
    assert!(manager.sync(m1));
    manager.wait(manager.mark());
    assert!(manager.get_data(late).is_some());
}

#[test]
fn not_ready_until_synced() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());
    common::write(dir.path(), "a.bin", b"abc");

    let id = manager.load_data("a.bin", 1, AllocFlags::default()).unwrap();
    match manager.try_get_data(id) {
        Err(Error::NotReady(v)) => assert_eq!(v, id),
        other => panic!("unexpected {:?}", other),
    }

    manager.wait(manager.mark());
    assert!(manager.try_get_data(id).is_ok());
}

#[test]
fn typed_loads() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, factory) = testbed(dir.path());

    common::write(dir.path(), "crate.bmp", &[0xff; 64]);
    common::write(dir.path(), "font.fnt", b"info face=mono");
    common::write(dir.path(), "font.ttf", &[1; 128]);
    common::write(dir.path(), "empty.wav", b"");

    let texture = manager.load_texture("crate.bmp", TextureParams::default()).unwrap();
    let bitmap = manager.load_bitmap_font("font.fnt").unwrap();
    let freetype = manager.load_freetype_font("font.ttf", 16).unwrap();
    let sound = manager.load_sound("empty.wav").unwrap();
    manager.wait(manager.mark());

    let handle = manager.get_texture(texture).unwrap();
    assert_eq!(factory.texture(handle).unwrap().len, 64);
    assert!(manager.get_font(bitmap).is_some());
    let handle = manager.get_font(freetype).unwrap();
    assert_eq!(
        factory.font(handle),
        Some(FontDesc::FreeType { len: 128, size: 16 })
    );

    // The factory rejects empty sounds.
    assert_eq!(manager.state(sound), Some(ResourceState::Failed));
    assert!(manager.get_sound(sound).is_none());
    match manager.try_get_sound(sound) {
        Err(Error::LoadFailed(v)) => assert_eq!(v, sound),
        other => panic!("unexpected {:?}", other),
    }

    manager.free_all();
    assert_eq!(factory.textures(), 0);
    assert_eq!(factory.fonts(), 0);
}

#[test]
fn free_while_loading() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, factory) = testbed(dir.path());
    common::write(dir.path(), "crate.bmp", &[0xff; 4096]);

    for _ in 0..16 {
        let id = manager.load_texture("crate.bmp", TextureParams::default()).unwrap();
        let weak = manager.link_weak(&manager, id).unwrap();
        manager.free(id);
        assert!(manager.is_stale(weak));
        manager.free(weak);
    }

    manager.wait(manager.mark());
    assert!(manager.is_empty());
    assert_eq!(factory.textures(), 0);
}

#[test]
fn resolution_priority() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());
    let prefix = common::unique_prefix("pkg");
    let name = format!("{}file.dat", prefix);

    let archive = dir.path().join("data.ldst");
    let mut builder = ArchiveBuilder::new();
    builder.add("file.dat", b"from package", false).unwrap();
    builder.save(&archive).unwrap();

    // A host file which "pkgN:file.dat" would name without the package.
    let host = common::write(dir.path(), &name, b"from host");

    let pkg = Arc::new(ArchivePackage::new(prefix.clone(), &archive));
    package::register(pkg.clone()).unwrap();
    assert!(package::register(pkg.clone()).is_err());

    let id = manager.load_data(&name, 1, AllocFlags::default()).unwrap();
    manager.wait(manager.mark());
    assert_eq!(&manager.get_data(id).unwrap()[..], b"from package");

    // Names the package does not have are not looked up anywhere else.
    assert!(manager.load_data(&format!("{}other.dat", prefix), 1, AllocFlags::default()).is_err());

    assert!(package::unregister(&pkg));
    assert!(!package::unregister(&pkg));

    let id = manager.load_data(&name, 1, AllocFlags::default()).unwrap();
    manager.wait(manager.mark());
    assert_eq!(&manager.get_data(id).unwrap()[..], b"from host");

    fs::remove_file(&host).unwrap();
    match manager.load_data(&name, 1, AllocFlags::default()) {
        Err(Error::NotFound(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn compressed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, factory) = testbed(dir.path());
    let prefix = common::unique_prefix("zip");

    let archive = dir.path().join("data.ldst");
    let mut builder = ArchiveBuilder::new();
    builder.add("big.bin", &common::pattern(100_000), true).unwrap();
    builder.add("crate.bmp", &[0x7f; 300], true).unwrap();
    builder.save(&archive).unwrap();

    let pkg = Arc::new(ArchivePackage::new(prefix.clone(), &archive));
    package::register(pkg.clone()).unwrap();

    let data = manager
        .load_data(&format!("{}big.bin", prefix), 16, AllocFlags::default())
        .unwrap();
    let texture = manager
        .load_texture(&format!("{}crate.bmp", prefix), TextureParams::default())
        .unwrap();
    manager.wait(manager.mark());

    let bytes = manager.get_data(data).unwrap();
    assert_eq!(bytes.len(), 100_000);
    assert_eq!(&bytes[..], &common::pattern(100_000)[..]);
    assert_eq!(bytes.align(), 16);

    let handle = manager.get_texture(texture).unwrap();
    assert_eq!(factory.texture(handle).unwrap().len, 300);

    package::unregister(&pkg);
}

#[test]
fn raw_files() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());
    common::write(dir.path(), "digits.txt", b"0123456789");

    let id = manager.open_file("digits.txt").unwrap();
    assert_eq!(manager.file_size(id).unwrap(), 10);

    let mut buf = [0; 4];
    assert_eq!(manager.read(id, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(manager.tell(id).unwrap(), 4);

    assert_eq!(manager.seek(id, SeekFrom::Current(2)).unwrap(), 6);
    let mut buf = [0; 8];
    assert_eq!(manager.read(id, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"6789");
    assert_eq!(manager.read(id, &mut buf).unwrap(), 0);

    assert_eq!(manager.read_at(id, &mut buf, 1).unwrap(), 8);
    assert_eq!(&buf, b"12345678");
    assert_eq!(manager.tell(id).unwrap(), 10);

    assert_eq!(manager.seek(id, SeekFrom::End(-3)).unwrap(), 7);
    assert_eq!(manager.seek(id, SeekFrom::Start(100)).unwrap(), 100);
    assert_eq!(manager.read(id, &mut buf).unwrap(), 0);
    assert!(manager.seek(id, SeekFrom::Current(-200)).is_err());

    // Raw files are not data.
    assert!(manager.get_data(id).is_none());
    let data = manager.strdup("data").unwrap();
    assert!(manager.file_size(data).is_err());

    // Links share the read position.
    let link = manager.link(&manager, id).unwrap();
    manager.seek(link, SeekFrom::Start(0)).unwrap();
    assert_eq!(manager.tell(id).unwrap(), 0);
}

#[test]
fn raw_package_files() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());
    let prefix = common::unique_prefix("raw");

    let archive = dir.path().join("data.ldst");
    let mut builder = ArchiveBuilder::new();
    builder.add("first.txt", b"first", false).unwrap();
    builder.add("second.txt", b"second entry", false).unwrap();
    builder.add("packed.txt", b"packed", true).unwrap();
    builder.save(&archive).unwrap();

    let pkg = Arc::new(ArchivePackage::new(prefix.clone(), &archive));
    package::register(pkg.clone()).unwrap();

    let id = manager.open_file(&format!("{}second.txt", prefix)).unwrap();
    assert_eq!(manager.file_size(id).unwrap(), 12);

    let mut buf = [0; 32];
    assert_eq!(manager.read(id, &mut buf).unwrap(), 12);
    assert_eq!(&buf[..12], b"second entry");

    match manager.open_file(&format!("{}packed.txt", prefix)) {
        Err(Error::Compressed(_)) => {}
        other => panic!("unexpected {:?}", other),
    }

    package::unregister(&pkg);
}

#[test]
fn listing() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = testbed(dir.path());
    let prefix = common::unique_prefix("list");

    common::write(dir.path(), "a/1.txt", b"1");
    common::write(dir.path(), "a/b/2.txt", b"2");
    common::write(dir.path(), "c.txt", b"3");

    assert_eq!(
        manager.list_files("a").unwrap(),
        vec!["a/1.txt".to_owned(), "a/b/2.txt".to_owned()]
    );

    for name in manager.list_files("a/").unwrap() {
        assert!(manager.exists(&name));
    }

    assert!(manager.exists("c.txt"));
    assert!(!manager.exists("d.txt"));
    assert!(manager.list_files("c.txt").is_err());

    let archive = dir.path().join("data.ldst");
    let mut builder = ArchiveBuilder::new();
    builder.add("maps/1.map", b"1", false).unwrap();
    builder.add("maps/2.map", b"2", true).unwrap();
    builder.add("readme", b"3", false).unwrap();
    builder.save(&archive).unwrap();

    let pkg = Arc::new(ArchivePackage::new(prefix.clone(), &archive));
    package::register(pkg.clone()).unwrap();

    let maps = manager.list_files(&format!("{}maps", prefix)).unwrap();
    assert_eq!(
        maps,
        vec![format!("{}maps/1.map", prefix), format!("{}maps/2.map", prefix)]
    );

    assert_eq!(manager.list_files(&prefix).unwrap().len(), 3);
    assert!(manager.exists(&format!("{}readme", prefix)));

    package::unregister(&pkg);
    assert!(!manager.exists(&format!("{}readme", prefix)));
}

#[test]
fn exhaustion() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let prefix = common::unique_prefix("oom");
    common::write(dir.path(), "a.bin", &[1; 256]);

    let archive = dir.path().join("data.ldst");
    let mut builder = ArchiveBuilder::new();
    builder.add("packed.bin", &common::pattern(4096), true).unwrap();
    builder.save(&archive).unwrap();

    let pkg = Arc::new(ArchivePackage::new(prefix.clone(), &archive));
    package::register(pkg.clone()).unwrap();

    let allocator = TrackingAllocator::new();
    let params = ResourceParams {
        root: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let manager = ResourceManager::with_services(
        params,
        Arc::new(HeadlessFactory::new()),
        Arc::new(allocator.clone()),
    );

    let ok = manager.load_data("a.bin", 1, AllocFlags::default()).unwrap();

    // The destination buffer can not be allocated.
    allocator.fail_after(1);
    match manager.load_data("a.bin", 1, AllocFlags::default()) {
        Err(Error::OutOfMemory(256)) => {}
        other => panic!("unexpected {:?}", other),
    }

    match manager.new_data(8, 8, AllocFlags::default()) {
        Ok(_) => {}
        other => panic!("unexpected {:?}", other),
    }

    // The compressed bytes are read, but inflating them runs out of memory.
    allocator.fail_after(2);
    let packed = manager
        .load_data(&format!("{}packed.bin", prefix), 1, AllocFlags::default())
        .unwrap();

    manager.wait(manager.mark());
    assert!(manager.get_data(ok).is_some());
    assert_eq!(manager.state(packed), Some(ResourceState::Failed));
    assert!(manager.get_data(packed).is_none());

    manager.free_all();
    assert_eq!(allocator.live_buffers(), 0);

    manager.strdup("after").unwrap();
    manager.destroy();
    assert_eq!(allocator.live_buffers(), 0);

    package::unregister(&pkg);
}
