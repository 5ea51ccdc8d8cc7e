//! Multi-recipient access through the stream path: one file key, many
//! readers, re-wrapped (never regenerated) as the access list changes.

mod common;

use std::io::{Read, Write};

use common::{pattern, SharedBuf, World};
use veilfs_core::AccessList;

const BS: usize = 64;

fn write_shared_file(world: &World, path: &str, data: &[u8]) -> SharedBuf {
    let buf = SharedBuf::new();
    let mut stream = world.open(buf.clone(), world.write_params(path, "alice"));
    stream.write_all(data).unwrap();
    stream.close().unwrap();
    world.storage.register(path, buf.clone());
    buf
}

fn read_as(world: &World, buf: &SharedBuf, path: &str, user: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = world.open(buf.clone(), world.read_params(path, user));
    let mut plain = Vec::new();
    stream.read_to_end(&mut plain)?;
    Ok(plain)
}

#[test]
fn test_shared_recipient_can_read() {
    let world = World::new(AccessList::for_users(["bob"]), BS);
    let path = "/shared/doc.bin";
    let data = pattern(BS * 2 + 9);
    let buf = write_shared_file(&world, path, &data);

    // The owner is always wrapped in alongside the shared users
    let envelope = world.keys.envelope(path).unwrap();
    assert_eq!(envelope.keys.len(), 2);
    assert!(envelope.wrapped_key_for("alice").is_some());
    assert!(envelope.wrapped_key_for("bob").is_some());

    assert_eq!(read_as(&world, &buf, path, "alice").unwrap(), data);
    assert_eq!(read_as(&world, &buf, path, "bob").unwrap(), data);
}

#[test]
fn test_unlisted_user_cannot_read() {
    let world = World::new(AccessList::for_users(["bob"]), BS);
    let path = "/shared/secret.bin";
    let buf = write_shared_file(&world, path, &pattern(BS));

    let err = read_as(&world, &buf, path, "carol").unwrap_err();
    assert!(err.to_string().contains("no wrapped key slice"));
}

#[test]
fn test_update_grants_access_without_reencrypting() {
    let world = World::new(AccessList::for_users(["bob"]), BS);
    let path = "/shared/grant.bin";
    let data = pattern(BS * 2);
    let buf = write_shared_file(&world, path, &data);
    let raw_before = buf.snapshot();

    let updated = world
        .module()
        .update(path, &AccessList::for_users(["alice", "bob", "carol"]))
        .unwrap();
    assert!(updated);

    // Content untouched; only the envelope changed
    assert_eq!(buf.snapshot(), raw_before);
    let envelope = world.keys.envelope(path).unwrap();
    assert_eq!(envelope.keys.len(), 3);

    assert_eq!(read_as(&world, &buf, path, "carol").unwrap(), data);
}

#[test]
fn test_update_revokes_access() {
    let world = World::new(AccessList::for_users(["bob"]), BS);
    let path = "/shared/revoke.bin";
    let data = pattern(BS + 30);
    let buf = write_shared_file(&world, path, &data);

    let updated = world
        .module()
        .update(path, &AccessList::for_users(["alice"]))
        .unwrap();
    assert!(updated);

    assert!(read_as(&world, &buf, path, "bob").is_err());
    assert_eq!(read_as(&world, &buf, path, "alice").unwrap(), data);
}

#[test]
fn test_update_on_unencrypted_path_reports_false() {
    let world = World::new(AccessList::default(), BS);
    let updated = world
        .module()
        .update("/plain/readme.txt", &AccessList::for_users(["alice"]))
        .unwrap();
    assert!(!updated);
}

#[test]
fn test_rewrite_keeps_file_key() {
    let world = World::new(AccessList::for_users(["bob"]), BS);
    let path = "/shared/rewrite.bin";
    let buf = write_shared_file(&world, path, &pattern(BS * 2));

    // Overwrite through a second stream; the key must be reused, so bytes
    // encrypted before the rewrite stay readable afterwards.
    let data = pattern(BS);
    let mut params = world.read_params(path, "alice");
    params.mode = veilfs_stream::StreamMode::Write;
    let mut stream = world.open(buf.clone(), params);
    stream.write_all(&data).unwrap();
    stream.close().unwrap();

    let plain = read_as(&world, &buf, path, "bob").unwrap();
    assert_eq!(&plain[..BS], &data[..]);
}
