use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use pipekv::pipe::create_fifo;
use pipekv::protocol::{Notification, NOTIFICATION_LEN};
use pipekv::{backup_path, Dispatcher, Kvs, KvStore, KvsEngine, Result, DELETE_MISSING, READ_MISSING};
use tempfile::TempDir;

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

fn notifications(path: &Path) -> Result<Vec<Notification>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    assert_eq!(bytes.len() % NOTIFICATION_LEN, 0);
    bytes
        .chunks(NOTIFICATION_LEN)
        .map(|mut frame| Notification::read_from(&mut frame))
        .collect()
}

fn output<F>(f: F) -> Result<String>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut out = Vec::new();
    f(&mut out)?;
    Ok(String::from_utf8(out).expect("output is utf-8"))
}

#[test]
fn read_prints_every_key() -> Result<()> {
    let kvs = Kvs::new(KvStore::new(), 1)?;
    kvs.write(&pairs(&[("a", "1"), ("b", "2")]))?;

    let printed = output(|out| kvs.read(&keys(&["b", "x", "a"]), out))?;
    assert_eq!(printed, format!("[(b,2)(x,{})(a,1)]\n", READ_MISSING));
    Ok(())
}

#[test]
fn delete_prints_only_missing_keys() -> Result<()> {
    let kvs = Kvs::new(KvStore::new(), 1)?;
    kvs.write(&pairs(&[("a", "1"), ("b", "2")]))?;

    assert_eq!(output(|out| kvs.delete(&keys(&["a"]), out))?, "");
    let printed = output(|out| kvs.delete(&keys(&["a", "b", "c"]), out))?;
    assert_eq!(printed, format!("[(a,{0})(c,{0})]\n", DELETE_MISSING));
    assert!(kvs.engine().snapshot()?.is_empty());
    Ok(())
}

#[test]
fn show_prints_the_whole_store() -> Result<()> {
    let kvs = Kvs::new(KvStore::with_buckets(1)?, 1)?;
    assert_eq!(output(|out| kvs.show(out))?, "[]\n");

    kvs.write(&pairs(&[("a", "1"), ("b", "2"), ("c", "3")]))?;
    // a single bucket keeps insertion order
    assert_eq!(output(|out| kvs.show(out))?, "[(a,1)(b,2)(c,3)]\n");
    Ok(())
}

#[test]
fn write_skips_invalid_pairs() -> Result<()> {
    let kvs = Kvs::new(KvStore::new(), 1)?;
    let long = "x".repeat(41);
    let written = kvs.write(&[
        ("a".to_owned(), "1".to_owned()),
        (long.clone(), "2".to_owned()),
        ("b".to_owned(), long),
        ("c".to_owned(), "3".to_owned()),
    ])?;
    assert_eq!(written, 2);
    assert_eq!(kvs.engine().snapshot()?.len(), 2);
    Ok(())
}

#[test]
fn subscribers_are_notified_of_changes_only() -> Result<()> {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let endpoint = dir.path().join("notif1");
    File::create(&endpoint)?;
    let endpoint_name = endpoint.to_string_lossy().into_owned();

    let kvs = Kvs::new(KvStore::new(), 1)?;
    kvs.write(&pairs(&[("a", "1"), ("b", "1")]))?;
    kvs.engine().subscribe("a", &endpoint_name)?;

    assert_eq!(kvs.write(&pairs(&[("a", "2"), ("b", "2")]))?, 2);
    // same value, no notification
    assert_eq!(kvs.write(&pairs(&[("a", "2")]))?, 0);
    kvs.write(&pairs(&[("a", "3")]))?;

    assert_eq!(
        notifications(&endpoint)?,
        vec![Notification::new("a", "2"), Notification::new("a", "3")]
    );
    Ok(())
}

#[test]
fn dispatcher_skips_unreachable_endpoints() -> Result<()> {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let reachable = dir.path().join("notif1");
    File::create(&reachable)?;
    // a fifo nobody reads from
    let no_reader = dir.path().join("notif2");
    create_fifo(&no_reader)?;
    let missing = dir.path().join("notif3");

    let subscribers: Vec<String> = [&missing, &no_reader, &reachable]
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    let delivered = Dispatcher::new().notify("key", "value", &subscribers)?;
    assert_eq!(delivered, 1);
    assert_eq!(notifications(&reachable)?, vec![Notification::new("key", "value")]);
    assert!(!missing.exists());
    Ok(())
}

#[test]
fn backup_writes_a_snapshot() -> Result<()> {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let kvs = Kvs::new(KvStore::with_buckets(1)?, 2)?;
    kvs.write(&pairs(&[("a", "1"), ("b", "2")]))?;

    let handle = kvs.backup("job", 1, dir.path())?;
    assert_eq!(handle.path(), backup_path(dir.path(), "job", 1));
    // writes after the snapshot are not part of the backup
    kvs.write(&pairs(&[("c", "3"), ("a", "changed")]))?;

    let path = handle.wait()?;
    assert_eq!(path, dir.path().join("job-1.bck"));
    assert_eq!(fs::read_to_string(path)?, "(a, 1)\n(b, 2)\n");
    Ok(())
}

#[test]
fn concurrent_backups() -> Result<()> {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let kvs = Kvs::new(KvStore::new(), 2)?;
    kvs.write(&pairs(&[("a", "1")]))?;

    let handles = (1..=5)
        .map(|seq| kvs.backup("many", seq, dir.path()))
        .collect::<Result<Vec<_>>>()?;
    for handle in handles {
        assert_eq!(fs::read_to_string(handle.wait()?)?, "(a, 1)\n");
    }
    Ok(())
}

#[test]
fn backup_into_missing_directory_fails() -> Result<()> {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let kvs = Kvs::new(KvStore::new(), 1)?;
    let handle = kvs.backup("job", 1, &dir.path().join("missing"))?;
    assert!(handle.wait().is_err());

    // the failed backup released its slot
    let handle = kvs.backup("job", 2, dir.path())?;
    assert!(handle.wait().is_ok());
    Ok(())
}
