//! In-process color extraction backend (spec §4.2).
//!
//! Decodes the image with the `image` crate, downsamples oversized inputs,
//! then quantizes pixels into 16 clusters with one of three deterministic
//! (or seeded-stochastic) algorithms, the way `trovato`'s `image_style`
//! service builds derivatives directly over `image::DynamicImage` buffers
//! rather than shelling out.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use image::{DynamicImage, GenericImageView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::Color;
use crate::config::{BackendOptions, PaletteStyle, QuantizeAlgorithm};
use crate::error::{ErrorKind, StructuredError};
use crate::palette::{Palette, Provenance};

use super::ColorBackend;

/// Images wider or taller than this are downsampled before quantization.
const DOWNSAMPLE_THRESHOLD: u32 = 256;
const KMEANS_MAX_ITERATIONS: usize = 20;

pub struct InProcessBackend;

impl ColorBackend for InProcessBackend {
    fn id(&self) -> &str {
        "in-process"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, image_path: &Path, options: &BackendOptions) -> Result<Palette, StructuredError> {
        let bytes = std::fs::read(image_path)
            .map_err(|_| StructuredError::new("palette:extract", ErrorKind::ImageInvalid))?;
        if bytes.is_empty() {
            return Err(StructuredError::new("palette:extract", ErrorKind::ImageInvalid));
        }

        let img = image::load_from_memory(&bytes)
            .map_err(|_| StructuredError::new("palette:extract", ErrorKind::ImageInvalid))?;

        let pixels = sample_pixels(&img);
        if pixels.is_empty() {
            return Err(StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from("image has no pixels") },
            ));
        }

        let clusters = match options.algorithm {
            QuantizeAlgorithm::Kmeans => kmeans(&pixels, 16, options.seed),
            QuantizeAlgorithm::MedianCut => median_cut(&pixels, 16),
            QuantizeAlgorithm::Octree => octree(&pixels, 16),
        };

        let colors = expand_to_16(clusters);
        let (background, foreground, cursor) = derive_special(&colors, options.style);

        let palette = Palette {
            colors,
            background,
            foreground,
            cursor,
            provenance: Provenance {
                source_image_absolute_path: image_path.to_path_buf(),
                backend_id: Arc::from(self.id()),
                generated_at_utc: Utc::now(),
                seed: matches!(options.algorithm, QuantizeAlgorithm::Kmeans).then_some(options.seed),
            },
        };
        palette.validate().map_err(|reason| {
            StructuredError::new("palette:extract", ErrorKind::ExtractionFailed { reason: Arc::from(reason) })
        })?;
        Ok(palette)
    }
}

/// Downsample if over [`DOWNSAMPLE_THRESHOLD`] on either axis, then collect
/// every remaining pixel as a [`Color`].
fn sample_pixels(img: &DynamicImage) -> Vec<Color> {
    let (w, h) = img.dimensions();
    let resized = if w > DOWNSAMPLE_THRESHOLD || h > DOWNSAMPLE_THRESHOLD {
        img.resize(DOWNSAMPLE_THRESHOLD, DOWNSAMPLE_THRESHOLD, image::imageops::FilterType::Triangle)
    } else {
        img.clone()
    };

    let rgb = resized.to_rgb8();
    rgb.pixels().map(|p| Color::new(p[0], p[1], p[2])).collect()
}

/// Seeded k-means with a fixed iteration cap, per spec §4.2 "k=16, fixed
/// iteration cap" and "deterministic seed where the algorithm is stochastic".
fn kmeans(pixels: &[Color], k: usize, seed: u64) -> Vec<Color> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids: Vec<(f64, f64, f64)> = (0..k)
        .map(|_| {
            let p = pixels[rng.gen_range(0..pixels.len())];
            (f64::from(p.r), f64::from(p.g), f64::from(p.b))
        })
        .collect();

    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut sums = vec![(0.0_f64, 0.0_f64, 0.0_f64, 0_u64); k];
        for pixel in pixels {
            let (r, g, b) = (f64::from(pixel.r), f64::from(pixel.g), f64::from(pixel.b));
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b2)| dist2(*a, (r, g, b)).total_cmp(&dist2(*b2, (r, g, b))))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let entry = &mut sums[nearest];
            entry.0 += r;
            entry.1 += g;
            entry.2 += b;
            entry.3 += 1;
        }

        let mut changed = false;
        for (i, (sr, sg, sb, count)) in sums.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            let new_centroid = (sr / count as f64, sg / count as f64, sb / count as f64);
            if dist2(new_centroid, centroids[i]) > 0.01 {
                changed = true;
            }
            centroids[i] = new_centroid;
        }
        if !changed {
            break;
        }
    }

    centroids
        .into_iter()
        .map(|(r, g, b)| Color::new(r.round().clamp(0.0, 255.0) as u8, g.round().clamp(0.0, 255.0) as u8, b.round().clamp(0.0, 255.0) as u8))
        .collect()
}

fn dist2(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let dr = a.0 - b.0;
    let dg = a.1 - b.1;
    let db = a.2 - b.2;
    dr * dr + dg * dg + db * db
}

/// Median-cut quantization: recursively split the largest-range color box
/// along its widest channel until there are `target` boxes, then average
/// each box. Deterministic (no RNG involved).
fn median_cut(pixels: &[Color], target: usize) -> Vec<Color> {
    struct Box_ {
        pixels: Vec<Color>,
    }

    fn channel_range(pixels: &[Color], channel: usize) -> u8 {
        let get = |c: &Color| match channel {
            0 => c.r,
            1 => c.g,
            _ => c.b,
        };
        let min = pixels.iter().map(get).min().unwrap_or(0);
        let max = pixels.iter().map(get).max().unwrap_or(0);
        max - min
    }

    fn widest_channel(pixels: &[Color]) -> usize {
        (0..3).max_by_key(|&c| channel_range(pixels, c)).unwrap_or(0)
    }

    let mut boxes = vec![Box_ { pixels: pixels.to_vec() }];

    while boxes.len() < target {
        let Some(idx) = (0..boxes.len()).filter(|&i| boxes[i].pixels.len() > 1).max_by_key(|&i| boxes[i].pixels.len()) else {
            break;
        };

        let channel = widest_channel(&boxes[idx].pixels);
        let mut sorted = boxes[idx].pixels.clone();
        sorted.sort_by_key(|c| match channel {
            0 => c.r,
            1 => c.g,
            _ => c.b,
        });
        let mid = sorted.len() / 2;
        let (lo, hi) = sorted.split_at(mid);

        boxes[idx] = Box_ { pixels: lo.to_vec() };
        boxes.push(Box_ { pixels: hi.to_vec() });
    }

    boxes
        .into_iter()
        .filter(|b| !b.pixels.is_empty())
        .map(|b| average(&b.pixels))
        .collect()
}

fn average(pixels: &[Color]) -> Color {
    let (mut r, mut g, mut b) = (0_u64, 0_u64, 0_u64);
    for p in pixels {
        r += u64::from(p.r);
        g += u64::from(p.g);
        b += u64::from(p.b);
    }
    let n = pixels.len().max(1) as u64;
    Color::new((r / n) as u8, (g / n) as u8, (b / n) as u8)
}

/// Octree quantization: bucket pixels by the top 4 bits of each channel
/// (a 12-bit octree depth), average within bucket, then keep the `target`
/// most populous buckets.
fn octree(pixels: &[Color], target: usize) -> Vec<Color> {
    use std::collections::HashMap;

    let mut buckets: HashMap<(u8, u8, u8), Vec<Color>> = HashMap::new();
    for &p in pixels {
        let key = (p.r >> 4, p.g >> 4, p.b >> 4);
        buckets.entry(key).or_default().push(p);
    }

    let mut ranked: Vec<(usize, Color)> = buckets
        .into_values()
        .map(|members| (members.len(), average(&members)))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked.into_iter().take(target).map(|(_, c)| c).collect()
}

/// Expand fewer than 16 clusters to exactly 16 using the deterministic rule
/// from spec §4.2: repeat/shift lightness by fixed steps. Monochrome inputs
/// (all clusters equal) synthesize grayscale slots instead.
fn expand_to_16(mut clusters: Vec<Color>) -> [Color; 16] {
    if clusters.is_empty() {
        clusters.push(Color::new(0, 0, 0));
    }

    let all_equal = clusters.iter().all(|c| *c == clusters[0]);
    if all_equal {
        let mut out = [Color::new(0, 0, 0); 16];
        for (i, slot) in out.iter_mut().enumerate() {
            let v = ((i as f64 / 15.0) * 255.0).round() as u8;
            *slot = Color::new(v, v, v);
        }
        return out;
    }

    let mut out = [Color::new(0, 0, 0); 16];
    let base_len = clusters.len();
    for (i, slot) in out.iter_mut().enumerate() {
        let base = clusters[i % base_len];
        let cycle = i / base_len;
        *slot = if cycle == 0 {
            base
        } else {
            let shift = 0.08 * cycle as f64;
            base.lighten(shift)
        };
    }
    out
}

/// background = darkest cluster below a lightness threshold (or synthesized
/// black if none qualify), foreground = lightest, cursor = most-saturated.
fn derive_special(colors: &[Color; 16], style: PaletteStyle) -> (Color, Color, Color) {
    const DARK_THRESHOLD: f64 = 0.35;
    const LIGHT_THRESHOLD: f64 = 0.65;

    let lightness_threshold = match style {
        PaletteStyle::Dark => DARK_THRESHOLD,
        PaletteStyle::Light => LIGHT_THRESHOLD,
    };

    let background = match style {
        PaletteStyle::Dark => colors
            .iter()
            .filter(|c| c.lightness() < lightness_threshold)
            .min_by(|a, b| a.lightness().total_cmp(&b.lightness()))
            .copied()
            .unwrap_or(Color::new(0, 0, 0)),
        PaletteStyle::Light => colors
            .iter()
            .filter(|c| c.lightness() > lightness_threshold)
            .max_by(|a, b| a.lightness().total_cmp(&b.lightness()))
            .copied()
            .unwrap_or(Color::new(255, 255, 255)),
    };

    let foreground = colors
        .iter()
        .filter(|c| **c != background)
        .max_by(|a, b| a.lightness().total_cmp(&b.lightness()))
        .copied()
        .unwrap_or_else(|| if background.lightness() < 0.5 { Color::new(255, 255, 255) } else { Color::new(0, 0, 0) });

    let cursor = colors
        .iter()
        .max_by(|a, b| a.saturation().total_cmp(&b.saturation()))
        .copied()
        .unwrap_or(foreground);

    (background, foreground, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_to_16_synthesizes_grayscale_for_monochrome_input() {
        let out = expand_to_16(vec![Color::new(50, 50, 50)]);
        let distinct: std::collections::HashSet<_> = out.iter().collect();
        assert_eq!(distinct.len(), 16);
    }

    #[test]
    fn expand_to_16_preserves_fewer_than_16_by_repetition() {
        let out = expand_to_16(vec![Color::new(10, 20, 30), Color::new(200, 100, 50)]);
        assert_eq!(out[0], Color::new(10, 20, 30));
        assert_eq!(out[1], Color::new(200, 100, 50));
    }

    #[test]
    fn derive_special_picks_darkest_as_background_for_dark_style() {
        let mut colors = [Color::new(128, 128, 128); 16];
        colors[0] = Color::new(5, 5, 5);
        colors[1] = Color::new(250, 250, 250);
        colors[2] = Color::new(200, 20, 20);
        let (bg, fg, cursor) = derive_special(&colors, PaletteStyle::Dark);
        assert_eq!(bg, Color::new(5, 5, 5));
        assert_eq!(fg, Color::new(250, 250, 250));
        assert_eq!(cursor, Color::new(200, 20, 20));
    }

    #[test]
    fn kmeans_is_deterministic_for_a_fixed_seed() {
        let pixels: Vec<Color> = (0..64).map(|i| Color::new(i as u8 * 3, i as u8 * 2, i as u8)).collect();
        let a = kmeans(&pixels, 4, 7);
        let b = kmeans(&pixels, 4, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn median_cut_returns_requested_cluster_count_when_enough_pixels() {
        let pixels: Vec<Color> = (0..200).map(|i| Color::new(i as u8, (255 - i) as u8, (i * 2) as u8)).collect();
        let clusters = median_cut(&pixels, 16);
        assert_eq!(clusters.len(), 16);
    }

    #[test]
    fn octree_groups_nearby_colors_into_one_bucket() {
        let pixels = vec![Color::new(10, 10, 10), Color::new(12, 11, 9), Color::new(200, 200, 200)];
        let clusters = octree(&pixels, 16);
        assert_eq!(clusters.len(), 2);
    }
}
