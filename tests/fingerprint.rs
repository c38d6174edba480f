use wallwright::fingerprint::{ConfigHash, ContentHash, Fingerprint};

#[test]
fn content_hash_is_deterministic() {
    let a = ContentHash::of_bytes(b"hello wallpaper");
    let b = ContentHash::of_bytes(b"hello wallpaper");
    assert_eq!(a, b);
}

#[test]
fn content_hash_differs_on_different_bytes() {
    let a = ContentHash::of_bytes(b"a");
    let b = ContentHash::of_bytes(b"b");
    assert_ne!(a, b);
}

#[test]
fn fingerprint_is_stable_for_same_inputs() {
    let img = ContentHash::of_bytes(b"image-bytes");
    let pal = ConfigHash::of_value(&serde_json::json!({"backend": "in-process"})).unwrap();
    let var = ConfigHash::of_value(&serde_json::json!({"variants": []})).unwrap();
    let fp1 = Fingerprint::compute(&img, &pal, &var, 1);
    let fp2 = Fingerprint::compute(&img, &pal, &var, 1);
    assert_eq!(fp1, fp2);
}

#[test]
fn fingerprint_changes_with_schema_version() {
    let img = ContentHash::of_bytes(b"image-bytes");
    let pal = ConfigHash::of_value(&serde_json::json!({})).unwrap();
    let var = ConfigHash::of_value(&serde_json::json!({})).unwrap();
    let fp1 = Fingerprint::compute(&img, &pal, &var, 1);
    let fp2 = Fingerprint::compute(&img, &pal, &var, 2);
    assert_ne!(fp1, fp2);
}

#[test]
fn config_hash_ignores_key_order() {
    let a = ConfigHash::of_value(&serde_json::json!({"a": 1, "b": 2})).unwrap();
    let b = ConfigHash::of_value(&serde_json::json!({"b": 2, "a": 1})).unwrap();
    assert_eq!(a, b);
}
