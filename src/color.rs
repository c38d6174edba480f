use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHex {
    pub value: Arc<str>,
}

impl fmt::Display for InvalidHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hex color: {}", self.value)
    }
}

impl std::error::Error for InvalidHex {}

/// A 24-bit RGB color, with no alpha channel.
///
/// Canonical textual form is lowercase `#rrggbb` (see [`Color::to_hex`]);
/// [`Color::from_hex`] accepts either case on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self, InvalidHex> {
        let digits = match hex.strip_prefix('#') {
            Some(d) if d.len() == 6 && d.is_ascii() => d,
            _ => return Err(InvalidHex { value: Arc::from(hex) }),
        };

        let r = u8::from_str_radix(&digits[0..2], 16);
        let g = u8::from_str_radix(&digits[2..4], 16);
        let b = u8::from_str_radix(&digits[4..6], 16);

        match (r, g, b) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Self { r, g, b }),
            _ => Err(InvalidHex { value: Arc::from(hex) }),
        }
    }

    /// Canonical lowercase `#rrggbb` form.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub const fn to_rgb_tuple(&self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    /// WCAG 2.1 relative luminance. Returns a value in `[0.0, 1.0]`.
    pub fn relative_luminance(&self) -> f64 {
        let linearize = |channel: u8| {
            let s = f64::from(channel) / 255.0;
            match s <= 0.04045 {
                true => s / 12.92,
                false => ((s + 0.055) / 1.055).powf(2.4),
            }
        };
        0.2126 * linearize(self.r) + 0.7152 * linearize(self.g) + 0.0722 * linearize(self.b)
    }

    /// Perceptual lightness in `[0, 1]`. The in-process backend uses this to
    /// pick the background (darkest) and foreground (lightest) clusters.
    pub fn lightness(&self) -> f64 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        (f64::from(max) + f64::from(min)) / (2.0 * 255.0)
    }

    /// HSL saturation in `[0, 1]`. The in-process backend uses this to pick
    /// the most-saturated cluster for the cursor color.
    pub fn saturation(&self) -> f64 {
        let max = f64::from(self.r.max(self.g).max(self.b)) / 255.0;
        let min = f64::from(self.r.min(self.g).min(self.b)) / 255.0;
        let l = (max + min) / 2.0;
        let delta = max - min;
        if delta == 0.0 {
            return 0.0;
        }
        match l > 0.5 {
            true => delta / (2.0 - 2.0 * l),
            false => delta / (2.0 * l),
        }
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl TryFrom<String> for Color {
    type Error = InvalidHex;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
