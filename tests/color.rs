use wallwright::color::Color;

#[test]
fn round_trips_hex() {
    let c = Color::from_hex("#1A2b3C").unwrap();
    assert_eq!(c, Color::new(0x1a, 0x2b, 0x3c));
    assert_eq!(c.to_hex(), "#1a2b3c");
}

#[test]
fn rejects_malformed_hex() {
    assert!(Color::from_hex("1a2b3c").is_err());
    assert!(Color::from_hex("#1a2b3").is_err());
    assert!(Color::from_hex("#1a2b3g").is_err());
}

#[test]
fn lightness_extremes() {
    assert_eq!(Color::new(0, 0, 0).lightness(), 0.0);
    assert_eq!(Color::new(255, 255, 255).lightness(), 1.0);
}
