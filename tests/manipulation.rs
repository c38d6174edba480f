use wallwright::color::Color;
use wallwright::manipulation::blend;

#[test]
fn lighten_moves_toward_white() {
    let base = Color::new(0x40, 0x40, 0x40);
    let lighter = base.lighten(0.2);
    assert!(lighter.lightness() > base.lightness());
}

#[test]
fn darken_is_deterministic() {
    let base = Color::new(0x80, 0x60, 0x20);
    let a = base.darken(0.1);
    let b = base.darken(0.1);
    assert_eq!(a, b);
}

#[test]
fn blend_at_zero_alpha_is_background() {
    let fg = Color::new(255, 0, 0);
    let bg = Color::new(0, 0, 255);
    assert_eq!(blend(fg, bg, 0.0), bg);
}

#[test]
fn blend_at_full_alpha_is_foreground() {
    let fg = Color::new(255, 0, 0);
    let bg = Color::new(0, 0, 255);
    assert_eq!(blend(fg, bg, 1.0), fg);
}

#[test]
fn scale_brightness_identity_at_factor_one() {
    let c = Color::new(100, 150, 200);
    assert_eq!(c.scale_brightness(1.0), c);
}

#[test]
fn scale_brightness_zero_is_black() {
    let c = Color::new(100, 150, 200);
    assert_eq!(c.scale_brightness(0.0), Color::new(0, 0, 0));
}

#[test]
fn scale_saturation_zero_is_grayscale() {
    let c = Color::new(200, 20, 20).scale_saturation(0.0);
    assert_eq!(c.r, c.g);
    assert_eq!(c.g, c.b);
}

#[test]
fn negate_is_involutive() {
    let c = Color::new(10, 20, 30);
    assert_eq!(c.negate().negate(), c);
}
