extern crate lodestone;
extern crate rand;

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use lodestone::errors::Error;
use lodestone::prelude::*;

fn testbed() -> (ResourceManager, Arc<HeadlessFactory>) {
    common::setup();
    let factory = Arc::new(HeadlessFactory::new());
    let manager = ResourceManager::with_services(
        ResourceParams::default(),
        factory.clone(),
        Arc::new(SystemAllocator),
    );

    (manager, factory)
}

#[test]
fn ids_are_unique() {
    let (manager, _) = testbed();
    let mut alive = Vec::new();
    let mut seen = HashSet::new();

    for _ in 0..2000 {
        if alive.is_empty() || rand::random::<u8>() % 3 != 0 {
            let id = manager.new_data(8, 8, AllocFlags::default()).unwrap();
            assert_ne!(id.to_raw(), 0);
            // Reused slots must never reproduce an id which was handed out.
            assert!(seen.insert(id));
            alive.push(id);
        } else {
            let len = alive.len();
            manager.free(alive.swap_remove(rand::random::<usize>() % len));
        }

        assert_eq!(manager.len(), alive.len());
    }

    for id in alive.drain(..) {
        assert!(manager.get_data(id).is_some());
        manager.free(id);
    }

    assert!(manager.is_empty());
}

#[test]
fn copy_and_strdup() {
    let (manager, _) = testbed();

    let bytes: Vec<u8> = (0..255).collect();
    let id = manager.copy_data(&bytes, 64, AllocFlags::default()).unwrap();
    let data = manager.get_data(id).unwrap();
    assert_eq!(&data[..], &bytes[..]);
    assert_eq!(data.align(), 64);
    assert_eq!(data.as_ptr() as usize % 64, 0);
    assert_eq!(manager.state(id), Some(ResourceState::Loaded));

    let id = manager.strdup("hello").unwrap();
    assert_eq!(&manager.get_data(id).unwrap()[..], b"hello");

    let id = manager.take_data(vec![1, 2, 3]).unwrap();
    assert_eq!(&manager.get_data(id).unwrap()[..], &[1, 2, 3]);

    let id = manager.new_data(16, 4, AllocFlags::zeroed()).unwrap();
    assert!(manager.get_data(id).unwrap().iter().all(|&v| v == 0));
}

#[test]
fn new_data_starts_zeroed() {
    let (manager, _) = testbed();

    // Recycled memory must not leak through, whatever the flags say.
    for _ in 0..8 {
        let dirty = manager.copy_data(&[0xAA; 4096], 16, AllocFlags::default()).unwrap();
        manager.free(dirty);

        let id = manager.new_data(4096, 16, AllocFlags::default()).unwrap();
        assert!(manager.get_data(id).unwrap().iter().all(|&v| v == 0));
        manager.free(id);
    }

    let id = manager.new_data(64, 1, AllocFlags::temporary()).unwrap();
    assert!(manager.get_data(id).unwrap().iter().all(|&v| v == 0));
}

#[test]
fn empty_data() {
    let (manager, _) = testbed();

    let id = manager.new_data(0, 16, AllocFlags::default()).unwrap();
    assert!(id.is_valid());

    let data = manager.get_data(id).unwrap();
    assert!(data.is_empty());
    assert!(!data.as_ptr().is_null());
}

#[test]
fn update_data() {
    let (manager, _) = testbed();
    let id = manager.new_data(4, 1, AllocFlags::zeroed()).unwrap();

    manager
        .update_data(id, |bytes| bytes.copy_from_slice(b"abcd"))
        .unwrap();
    assert_eq!(&manager.get_data(id).unwrap()[..], b"abcd");

    let reader = manager.get_data(id).unwrap();
    match manager.update_data(id, |bytes| bytes[0] = 0) {
        Err(Error::Busy(v)) => assert_eq!(v, id),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }

    drop(reader);
    assert_eq!(manager.update_data(id, |bytes| bytes[0]).unwrap(), b'a');
}

#[test]
fn typed_access() {
    let (manager, factory) = testbed();

    let texture = manager.new_texture(4, 4, TextureParams::default()).unwrap();
    let handle = manager.get_texture(texture).unwrap();
    assert_eq!(factory.texture(handle).unwrap().width, 4);
    assert!(manager.get_data(texture).is_none());
    assert!(manager.get_sound(texture).is_none());

    match manager.try_get_font(texture) {
        Err(Error::KindMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, ResourceKind::Font);
            assert_eq!(found, ResourceKind::Texture);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(manager.new_texture(0, 4, TextureParams::default()).is_err());

    let sound = factory.create_sound(&[0; 32]).unwrap();
    let id = manager.take_sound(sound).unwrap();
    assert_eq!(manager.get_sound(id), Some(sound));

    manager.free(texture);
    manager.free(id);
    assert_eq!(factory.textures(), 0);
    assert_eq!(factory.sounds(), 0);
}

#[test]
fn invalid_ids() {
    let (manager, _) = testbed();

    let nil = ResourceId::nil();
    assert!(manager.get_data(nil).is_none());
    assert_eq!(manager.state(nil), None);
    assert!(!manager.is_stale(nil));
    manager.free(nil);

    match manager.try_get_data(ResourceId::from_raw(0xdead_0000_0001)) {
        Err(Error::InvalidHandle(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn idempotent_free() {
    let (manager, _) = testbed();

    let id = manager.new_data(8, 8, AllocFlags::default()).unwrap();
    manager.free(id);
    manager.free(id);
    assert_eq!(manager.state(id), None);

    // A new resource reusing the slot is not affected by the old id.
    let other = manager.new_data(8, 8, AllocFlags::default()).unwrap();
    manager.free(id);
    assert!(manager.get_data(other).is_some());
}

#[test]
fn refcount() {
    let (manager, factory) = testbed();

    let texture = manager.new_texture(2, 2, TextureParams::default()).unwrap();
    let l1 = manager.link(&manager, texture).unwrap();
    let l2 = manager.link(&manager, l1).unwrap();

    manager.free(texture);
    assert_eq!(factory.textures(), 1);
    assert!(manager.get_texture(l1).is_some());

    manager.free(l2);
    assert_eq!(factory.textures(), 1);

    manager.free(l1);
    assert_eq!(factory.textures(), 0);
    assert!(manager.get_texture(l1).is_none());
}

#[test]
fn weak_links_turn_stale() {
    let (manager, _) = testbed();

    let id = manager.copy_data(b"payload", 1, AllocFlags::default()).unwrap();
    let w1 = manager.link_weak(&manager, id).unwrap();
    let w2 = manager.link_weak(&manager, w1).unwrap();
    assert!(!manager.is_stale(w1));
    assert_eq!(&manager.get_data(w2).unwrap()[..], b"payload");

    // Weak links do not keep anything alive.
    manager.free(id);
    assert!(manager.is_stale(w1));
    assert!(manager.is_stale(w2));
    assert_eq!(manager.state(w1), Some(ResourceState::Stale));
    assert!(manager.get_data(w1).is_none());

    match manager.try_get_data(w1) {
        Err(Error::Stale(v)) => assert_eq!(v, w1),
        other => panic!("unexpected {:?}", other),
    }

    // Stale links can not be strongly linked, but can be weakly linked.
    assert!(manager.link(&manager, w1).is_err());
    let w3 = manager.link_weak(&manager, w1).unwrap();
    assert!(manager.is_stale(w3));

    manager.free(w1);
    manager.free(w1);
    manager.free(w2);
    manager.free(w3);
    assert!(manager.is_empty());
}

#[test]
fn weak_free_keeps_strong() {
    let (manager, _) = testbed();

    let id = manager.strdup("alive").unwrap();
    let weak = manager.link_weak(&manager, id).unwrap();
    manager.free(weak);
    assert!(manager.get_data(id).is_some());
    assert_eq!(manager.len(), 1);
}

#[test]
fn link_across_managers() {
    let (a, factory) = testbed();
    let b = ResourceManager::new(ResourceParams::default());

    let x = a.new_texture(8, 8, TextureParams::default()).unwrap();
    let weak = b.link_weak(&a, x).unwrap();
    let y = b.link(&a, x).unwrap();
    assert_eq!(b.get_texture(y), a.get_texture(x));

    a.free(x);
    assert!(a.get_texture(x).is_none());
    assert!(b.get_texture(y).is_some());
    assert!(!b.is_stale(weak));
    assert_eq!(factory.textures(), 1);

    b.free(y);
    assert_eq!(factory.textures(), 0);
    assert!(b.is_stale(weak));
}

#[test]
fn links_outlive_their_manager() {
    let (a, factory) = testbed();
    let b = ResourceManager::new(ResourceParams::default());

    let x = a.new_texture(8, 8, TextureParams::default()).unwrap();
    let y = b.link(&a, x).unwrap();

    a.destroy();
    assert!(b.get_texture(y).is_some());
    assert_eq!(factory.textures(), 1);

    b.free(y);
    assert_eq!(factory.textures(), 0);
}

#[test]
fn guards() {
    let (manager, factory) = testbed();

    let id = manager.new_texture(1, 1, TextureParams::default()).unwrap();
    let strong = manager.guard(id).unwrap();
    let weak = strong.downgrade().unwrap();
    assert!(manager.guard(weak.id()).is_err());

    let other = ResourceManager::new(ResourceParams::default());
    let linked = strong.link_into(&other).unwrap();

    let clone = strong.clone();
    drop(strong);
    assert!(clone.get_texture().is_some());
    drop(clone);

    // Only the link in the other manager keeps the texture.
    assert!(!weak.is_stale());
    assert_eq!(factory.textures(), 1);
    let upgraded = weak.upgrade().unwrap();

    drop(linked);
    assert_eq!(factory.textures(), 1);
    drop(upgraded);
    assert_eq!(factory.textures(), 0);

    assert!(weak.is_stale());
    assert!(weak.upgrade().is_err());
    drop(weak);
    assert!(manager.is_empty());
}

#[test]
fn free_all_and_destroy() {
    let allocator = TrackingAllocator::new();
    let factory = Arc::new(HeadlessFactory::new());
    let manager = ResourceManager::with_services(
        ResourceParams {
            capacity: 4,
            ..Default::default()
        },
        factory.clone(),
        Arc::new(allocator.clone()),
    );

    let mut ids = Vec::new();
    for i in 0..64 {
        ids.push(manager.new_data(i, 8, AllocFlags::default()).unwrap());
    }

    let t = manager.new_texture(1, 1, TextureParams::default()).unwrap();
    manager.link_weak(&manager, t).unwrap();
    assert_eq!(allocator.live_buffers(), 64);

    manager.free_all();
    assert!(manager.is_empty());
    assert_eq!(allocator.live_buffers(), 0);
    assert_eq!(factory.textures(), 0);

    // Still usable after free_all.
    let id = manager.strdup("again").unwrap();
    assert!(manager.get_data(id).is_some());

    manager.destroy();
    assert_eq!(allocator.live_buffers(), 0);
}
