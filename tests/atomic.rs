use wallwright::atomic::write_atomic;

#[test]
fn write_atomic_creates_parent_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("colors.json");
    write_atomic(&target, b"{}").unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"{}");
}

#[test]
fn write_atomic_overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("colors.json");
    write_atomic(&target, b"first").unwrap();
    write_atomic(&target, b"second").unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"second");
}
