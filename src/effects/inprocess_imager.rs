//! In-process imager engine (spec §4.4): applies each effect directly over
//! an `image::RgbaImage` buffer — per-pixel operations for brightness,
//! saturation, negate, color-overlay; convolution for blur; a radial
//! falloff mask for vignette; a luminance map for grayscale — generalizing
//! `trovato`'s `image_style` service's direct `DynamicImage` manipulation
//! from resize/crop/desaturate to the seven kinds spec §4.4 names.

use std::path::Path;
use std::sync::Arc;

use image::{ImageBuffer, Rgba};

use crate::color::Color;
use crate::config::EffectSpec;
use crate::error::{ErrorKind, StructuredError};

use super::EffectEngine;

#[derive(Default)]
pub struct InProcessImagerEngine;

type RgbaBuffer = ImageBuffer<Rgba<u8>, Vec<u8>>;

fn internal_error(reason: impl std::fmt::Display) -> StructuredError {
    StructuredError::new("effects:in-process", ErrorKind::Internal { reason: Arc::from(reason.to_string()) })
}

fn map_pixels(img: &mut RgbaBuffer, f: impl Fn(Color) -> Color) {
    for pixel in img.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let out = f(Color::new(r, g, b));
        *pixel = Rgba([out.r, out.g, out.b, a]);
    }
}

fn apply_vignette(img: &mut RgbaBuffer, strength: f64, falloff: f64) {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let dist = (dx * dx + dy * dy).sqrt() / max_dist;
        let mask = (1.0 - strength * dist.powf(falloff)).clamp(0.0, 1.0);
        let Rgba([r, g, b, a]) = *pixel;
        let color = Color::new(r, g, b).scale_brightness(mask);
        *pixel = Rgba([color.r, color.g, color.b, a]);
    }
}

fn apply_effect(img: &mut RgbaBuffer, spec: &EffectSpec) -> Result<(), StructuredError> {
    match spec {
        EffectSpec::Blur { radius } => {
            *img = image::imageops::blur(img, *radius as f32);
            Ok(())
        }
        EffectSpec::Brightness { factor } => {
            map_pixels(img, |c| c.scale_brightness(*factor));
            Ok(())
        }
        EffectSpec::Saturation { factor } => {
            map_pixels(img, |c| c.scale_saturation(*factor));
            Ok(())
        }
        EffectSpec::Grayscale => {
            map_pixels(img, |c| {
                let l = (0.2126 * f64::from(c.r) + 0.7152 * f64::from(c.g) + 0.0722 * f64::from(c.b)).round() as u8;
                Color::new(l, l, l)
            });
            Ok(())
        }
        EffectSpec::Vignette { strength, falloff } => {
            apply_vignette(img, *strength, *falloff);
            Ok(())
        }
        EffectSpec::ColorOverlay { color, opacity } => {
            map_pixels(img, |c| color.blend(c, *opacity));
            Ok(())
        }
        EffectSpec::Negate => {
            map_pixels(img, Color::negate);
            Ok(())
        }
    }
}

impl EffectEngine for InProcessImagerEngine {
    fn engine_id(&self) -> &str {
        "in-process"
    }

    fn supports(&self, effect_kind: &str) -> bool {
        matches!(
            effect_kind,
            "blur" | "brightness" | "saturation" | "grayscale" | "vignette" | "color_overlay" | "negate"
        )
    }

    fn is_available(&self) -> bool {
        true
    }

    fn apply(&self, spec: &EffectSpec, input_path: &Path, output_path: &Path) -> Result<(), StructuredError> {
        let decoded = image::open(input_path).map_err(internal_error)?;
        let mut buffer = decoded.to_rgba8();

        apply_effect(&mut buffer, spec)?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(internal_error)?;
        }
        buffer.save(output_path).map_err(internal_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: Color) -> RgbaBuffer {
        ImageBuffer::from_fn(w, h, |_, _| Rgba([color.r, color.g, color.b, 255]))
    }

    #[test]
    fn negate_inverts_every_pixel() {
        let mut img = solid(4, 4, Color::new(10, 20, 30));
        apply_effect(&mut img, &EffectSpec::Negate).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([245, 235, 225, 255]));
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut img = solid(4, 4, Color::new(200, 50, 10));
        apply_effect(&mut img, &EffectSpec::Grayscale).unwrap();
        let Rgba([r, g, b, _]) = *img.get_pixel(0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn blur_preserves_dimensions() {
        let mut img = solid(8, 8, Color::new(100, 100, 100));
        apply_effect(&mut img, &EffectSpec::Blur { radius: 2.0 }).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn vignette_darkens_corners_more_than_center() {
        let mut img = solid(32, 32, Color::new(200, 200, 200));
        apply_effect(&mut img, &EffectSpec::Vignette { strength: 0.8, falloff: 2.0 }).unwrap();
        let center = img.get_pixel(16, 16).0[0];
        let corner = img.get_pixel(0, 0).0[0];
        assert!(corner < center);
    }

    #[test]
    fn color_overlay_at_full_opacity_replaces_color() {
        let mut img = solid(4, 4, Color::new(0, 0, 0));
        apply_effect(&mut img, &EffectSpec::ColorOverlay { color: Color::new(255, 0, 0), opacity: 1.0 }).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }
}
