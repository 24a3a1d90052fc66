//! Multi-scale template matching.
//!
//! Every template is searched across the whole scale ladder with a zero-mean
//! normalized cross-correlation (the `TM_CCOEFF_NORMED` score). The numerator
//! is a circular cross-correlation computed in the frequency domain: the frame
//! spectrum is taken once per frame, each scaled template's spectrum once per
//! search, and the product inverted back. Window sums for the denominator come
//! from integral images of the frame.
//!
//! Scaled templates don't depend on the frame, so they are resized and
//! zero-meaned once when the bank is prepared. Templates are independent, so
//! the search fans out over rayon and joins before ranking and suppression.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use fast_image_resize::images::{Image as ResizeImage, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::bbox::{self, BBox, DetectedMatch};
use crate::template::{Template, TemplateBank};
use crate::{Frame, MatchConfig};

/// Below this the template or the window is considered flat and scores 0.
const MIN_VARIANCE: f64 = 1e-6;

/// Result of one detection pass over a frame.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Surviving keywords, highest score first.
    pub keywords: Vec<String>,
    /// Surviving detections, same order as `keywords`.
    pub kept: Vec<DetectedMatch>,
    /// Every accepted candidate before suppression, highest score first.
    pub ranked: Vec<DetectedMatch>,
}

impl Detection {
    /// The `n` best candidates before suppression (diagnostics).
    pub fn top(&self, n: usize) -> &[DetectedMatch] {
        &self.ranked[..n.min(self.ranked.len())]
    }
}

/// One step of a template's scale ladder, zero-meaned.
#[derive(Debug, Clone)]
struct ScaledTemplate {
    width: u32,
    height: u32,
    /// Row-major pixels minus their mean.
    coeffs: Vec<f64>,
    /// Sum of squared deviations.
    var: f64,
}

impl ScaledTemplate {
    /// `None` for a flat image, which can't correlate with anything.
    fn new(image: &GrayImage) -> Option<Self> {
        let (width, height) = image.dimensions();
        let n = image.as_raw().len() as f64;
        let mean = image.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
        let coeffs: Vec<f64> = image.as_raw().iter().map(|&v| v as f64 - mean).collect();
        let var = coeffs.iter().map(|c| c * c).sum::<f64>();
        (var > MIN_VARIANCE).then_some(Self {
            width,
            height,
            coeffs,
            var,
        })
    }
}

/// A template's keyword and its usable scale steps, in ladder order.
#[derive(Debug, Clone)]
struct Ladder {
    keyword: String,
    steps: Vec<ScaledTemplate>,
}

/// A template bank resized to every step of the scale ladder.
#[derive(Debug, Clone, Default)]
pub struct ScaledBank {
    ladders: Vec<Ladder>,
}

impl ScaledBank {
    pub fn len(&self) -> usize {
        self.ladders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladders.is_empty()
    }
}

/// Frame spectrum, FFT plans for its size, and integral images.
struct FramePlan {
    width: usize,
    height: usize,
    row_fft: Arc<dyn Fft<f64>>,
    col_fft: Arc<dyn Fft<f64>>,
    row_ifft: Arc<dyn Fft<f64>>,
    col_ifft: Arc<dyn Fft<f64>>,
    /// Column-major (`x * height + y`).
    spectrum: Vec<Complex<f64>>,
    sum: Image<Luma<u64>>,
    sum_sq: Image<Luma<u64>>,
}

impl FramePlan {
    fn new(frame: &Frame) -> Self {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let mut planner = FftPlanner::<f64>::new();
        let row_fft = planner.plan_fft_forward(width);
        let col_fft = planner.plan_fft_forward(height);
        let row_ifft = planner.plan_fft_inverse(width);
        let col_ifft = planner.plan_fft_inverse(height);

        // The template is zero-mean, so removing the frame mean leaves the
        // correlation unchanged and keeps the magnitudes small.
        let pixels = frame.as_gray().as_raw();
        let mean = pixels.iter().map(|&v| v as f64).sum::<f64>() / pixels.len() as f64;
        let mut rows: Vec<Complex<f64>> = pixels.iter().map(|&v| Complex::new(v as f64 - mean, 0.0)).collect();
        row_fft.process(&mut rows);
        let mut spectrum = transpose(&rows, height, width);
        col_fft.process(&mut spectrum);

        Self {
            width,
            height,
            row_fft,
            col_fft,
            row_ifft,
            col_ifft,
            spectrum,
            sum: integral_image::<_, u64>(frame.as_gray()),
            sum_sq: integral_squared_image::<_, u64>(frame.as_gray()),
        }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        (
            window_sum(&self.sum, x, y, w, h) as f64,
            window_sum(&self.sum_sq, x, y, w, h) as f64,
        )
    }

    /// Cross-correlation of the frame with `template` at every position where
    /// the template fits, column-major (`x * height + y`), already scaled.
    ///
    /// Positions past `width - tw` or `height - th` wrap around and are
    /// meaningless.
    fn correlate(&self, template: &ScaledTemplate) -> Vec<Complex<f64>> {
        let (w, h) = (self.width, self.height);
        let (tw, th) = (template.width as usize, template.height as usize);

        // Only the first `th` rows of the padded template are non-zero.
        let mut rows = vec![Complex::new(0.0, 0.0); th * w];
        for (row, src) in rows.chunks_exact_mut(w).zip(template.coeffs.chunks_exact(tw)) {
            for (dst, &c) in row.iter_mut().zip(src) {
                *dst = Complex::new(c, 0.0);
            }
        }
        self.row_fft.process(&mut rows);

        let mut spectrum = vec![Complex::new(0.0, 0.0); w * h];
        for (y, row) in rows.chunks_exact(w).enumerate() {
            for (x, &v) in row.iter().enumerate() {
                spectrum[x * h + y] = v;
            }
        }
        self.col_fft.process(&mut spectrum);

        for (t, &f) in spectrum.iter_mut().zip(&self.spectrum) {
            *t = f * t.conj();
        }

        // Rows first, then only the columns a template can start in.
        let mut rows = transpose(&spectrum, w, h);
        self.row_ifft.process(&mut rows);
        let mut cols = transpose(&rows, h, w);
        let valid = (w - tw + 1) * h;
        self.col_ifft.process(&mut cols[..valid]);

        let norm = 1.0 / (w * h) as f64;
        cols.truncate(valid);
        for v in &mut cols {
            *v *= norm;
        }
        cols
    }
}

/// `src` is `rows` x `cols` row-major; the result is `cols` x `rows` row-major.
fn transpose(src: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); src.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = src[r * cols + c];
        }
    }
    out
}

/// Sum of the `w`x`h` window at (`x`, `y`) from an integral image
/// (which is one pixel larger than the source in both directions).
#[inline]
fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let a = integral.get_pixel(x, y).0[0];
    let b = integral.get_pixel(x + w, y).0[0];
    let c = integral.get_pixel(x, y + h).0[0];
    let d = integral.get_pixel(x + w, y + h).0[0];
    (a + d) - b - c
}

/// Score threshold check shared by every acceptance decision: inclusive.
#[inline]
pub fn accepts(score: f64, threshold: f64) -> bool {
    score >= threshold
}

pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Resize every template of `bank` to each step of the scale ladder.
    ///
    /// Flat steps and steps that fail to resize are dropped.
    pub fn prepare(&self, bank: &TemplateBank) -> ScaledBank {
        let ladders = bank
            .templates()
            .par_iter()
            .map(|template| self.ladder(template))
            .collect();
        ScaledBank { ladders }
    }

    fn ladder(&self, template: &Template) -> Ladder {
        let mut steps = Vec::with_capacity(self.config.scales.len());
        for &scale in &self.config.scales {
            let (tw, th) = scaled_size(template.width(), template.height(), scale);
            let step = if (tw, th) == (template.width(), template.height()) {
                ScaledTemplate::new(&template.image)
            } else {
                match resize_gray(&template.image, tw, th) {
                    Ok(image) => ScaledTemplate::new(&image),
                    Err(err) => {
                        log::debug!("skipping scale {scale} of {:?}: {err:#}", template.keyword);
                        continue;
                    }
                }
            };
            match step {
                Some(step) => steps.push(step),
                None => log::debug!("scale {scale} of {:?} is flat", template.keyword),
            }
        }
        Ladder {
            keyword: template.keyword.clone(),
            steps,
        }
    }

    /// Search every prepared template in `frame`, then rank and suppress.
    pub fn detect(&self, frame: &Frame, bank: &ScaledBank) -> Detection {
        if bank.is_empty() || frame.is_empty() {
            return Detection::default();
        }

        let plan = FramePlan::new(frame);
        let mut ranked: Vec<DetectedMatch> = bank
            .ladders
            .par_iter()
            .filter_map(|ladder| self.best_match(&plan, ladder))
            .collect();

        bbox::rank(&mut ranked);
        let kept = bbox::suppress(&ranked, self.config.nms_overlap);
        let keywords = kept.iter().map(|m| m.keyword.clone()).collect();

        Detection {
            keywords,
            kept,
            ranked,
        }
    }

    /// Best match of one template over the scale ladder, if it clears the threshold.
    fn best_match(&self, plan: &FramePlan, ladder: &Ladder) -> Option<DetectedMatch> {
        let mut best: Option<DetectedMatch> = None;

        for step in &ladder.steps {
            if step.width as usize > plan.width || step.height as usize > plan.height {
                continue;
            }
            let (score, x, y) = ccoeff_normed_peak(plan, step);

            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(DetectedMatch {
                    keyword: ladder.keyword.clone(),
                    score,
                    bbox: BBox::new(x, y, step.width, step.height),
                });
            }
            if score >= self.config.early_exit_score {
                break;
            }
        }

        best.filter(|m| accepts(m.score, self.config.template_threshold))
    }
}

/// Template size at `scale`, truncated and never below 1x1.
pub fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}

/// Peak of the `TM_CCOEFF_NORMED` map and its top-left location.
///
/// Ties resolve to the first position in row-major order. The template must
/// fit inside the frame.
fn ccoeff_normed_peak(plan: &FramePlan, template: &ScaledTemplate) -> (f64, u32, u32) {
    let (tw, th) = (template.width, template.height);
    let n = (tw as f64) * (th as f64);
    let correlation = plan.correlate(template);

    let mut best = (f64::NEG_INFINITY, 0, 0);
    for y in 0..=(plan.height as u32 - th) {
        for x in 0..=(plan.width as u32 - tw) {
            let (w_sum, w_sum_sq) = plan.window(x, y, tw, th);
            let w_var = w_sum_sq - w_sum * w_sum / n;
            let denom = (template.var * w_var).sqrt();

            let score = if w_var <= MIN_VARIANCE || denom <= MIN_VARIANCE {
                0.0
            } else {
                let numerator = correlation[x as usize * plan.height + y as usize].re;
                (numerator / denom).clamp(-1.0, 1.0)
            };

            if score > best.0 {
                best = (score, x, y);
            }
        }
    }
    best
}

fn resize_gray(image: &GrayImage, width: u32, height: u32) -> Result<GrayImage> {
    let src = ImageRef::new(image.width(), image.height(), image.as_raw(), PixelType::U8)
        .map_err(|err| anyhow!("fast_image_resize: ImageRef::new failed: {err:?}"))?;
    let mut dst = ResizeImage::new(width, height, PixelType::U8);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear));
    Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|err| anyhow!("fast_image_resize: resize failed: {err:?}"))?;

    GrayImage::from_raw(width, height, dst.into_vec()).context("resized buffer has the wrong length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SCALES;

    /// Deterministic noise, so no shifted window resembles another.
    fn texture(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
            h ^= h >> 13;
            h = h.wrapping_mul(0x5bd1_e995);
            h ^= h >> 15;
            Luma([(h & 0xff) as u8])
        })
    }

    fn crop(image: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        image::imageops::crop_imm(image, x, y, w, h).to_image()
    }

    fn peak(frame: &Frame, template: &GrayImage) -> Option<(f64, u32, u32)> {
        let step = ScaledTemplate::new(template)?;
        Some(ccoeff_normed_peak(&FramePlan::new(frame), &step))
    }

    fn detect(config: MatchConfig, frame: &Frame, bank: &TemplateBank) -> Detection {
        let matcher = Matcher::new(config);
        matcher.detect(frame, &matcher.prepare(bank))
    }

    /// Straight from the definition, for one position.
    fn ccoeff_normed_at(frame: &GrayImage, template: &GrayImage, x: u32, y: u32) -> f64 {
        let (tw, th) = template.dimensions();
        let n = (tw * th) as f64;
        let window = crop(frame, x, y, tw, th);
        let t_mean = template.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
        let w_mean = window.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
        let (mut num, mut t_var, mut w_var) = (0.0, 0.0, 0.0);
        for (&t, &w) in template.as_raw().iter().zip(window.as_raw()) {
            let (t, w) = (t as f64 - t_mean, w as f64 - w_mean);
            num += t * w;
            t_var += t * t;
            w_var += w * w;
        }
        num / (t_var * w_var).sqrt()
    }

    fn unit_scale() -> MatchConfig {
        MatchConfig {
            scales: vec![1.0],
            ..MatchConfig::default()
        }
    }

    #[test]
    fn exact_crop_scores_one_at_its_location() {
        let frame = Frame::new(texture(120, 80));
        let template = crop(frame.as_gray(), 30, 20, 24, 12);

        let (score, x, y) = peak(&frame, &template).unwrap();
        assert!((score - 1.0).abs() < 1e-4, "score {score}");
        assert_eq!((x, y), (30, 20));
    }

    #[test]
    fn score_is_invariant_to_brightness_and_contrast() {
        let frame = Frame::new(texture(80, 60));
        let template = crop(frame.as_gray(), 10, 15, 20, 10);
        let brighter = GrayImage::from_fn(20, 10, |x, y| Luma([template.get_pixel(x, y).0[0] / 2 + 60]));

        let (score, x, y) = peak(&frame, &brighter).unwrap();
        assert!(score > 0.99, "score {score}");
        assert_eq!((x, y), (10, 15));
    }

    #[test]
    fn flat_template_never_matches() {
        let frame = Frame::new(texture(40, 40));
        let flat = GrayImage::from_pixel(8, 8, Luma([128]));
        assert!(peak(&frame, &flat).is_none());

        let bank = TemplateBank::new(vec![Template::new("flat", flat)]);
        assert!(detect(MatchConfig::default(), &frame, &bank).ranked.is_empty());
    }

    #[test]
    fn frequency_domain_scores_match_the_definition() {
        // Odd sizes on purpose; neither dimension is a power of two.
        let frame = Frame::new(texture(97, 61));
        let template = GrayImage::from_fn(13, 7, |x, y| Luma([((x * 37 + y * 91) % 251) as u8]));
        let plan = FramePlan::new(&frame);
        let step = ScaledTemplate::new(&template).unwrap();
        let correlation = plan.correlate(&step);

        for (x, y) in [(0, 0), (84, 54), (40, 3), (7, 50), (84, 0), (0, 54)] {
            let (w_sum, w_sum_sq) = plan.window(x, y, 13, 7);
            let w_var = w_sum_sq - w_sum * w_sum / 91.0;
            let got = correlation[x as usize * 61 + y as usize].re / (step.var * w_var).sqrt();
            let want = ccoeff_normed_at(frame.as_gray(), &template, x, y);
            assert!((got - want).abs() < 1e-9, "({x}, {y}): {got} vs {want}");
        }
    }

    #[test]
    fn template_in_the_bottom_right_corner_is_found() {
        let frame = Frame::new(texture(75, 45));
        let template = crop(frame.as_gray(), 55, 33, 20, 12);
        let (score, x, y) = peak(&frame, &template).unwrap();
        assert!((score - 1.0).abs() < 1e-6, "score {score}");
        assert_eq!((x, y), (55, 33));
    }

    #[test]
    fn prepare_keeps_only_usable_steps() {
        let bank = TemplateBank::new(vec![
            Template::new("a", texture(30, 10)),
            Template::new("flat", GrayImage::from_pixel(30, 10, Luma([9]))),
        ]);
        let matcher = Matcher::new(MatchConfig::default());
        let scaled = matcher.prepare(&bank);
        assert_eq!(scaled.len(), 2);
        assert_eq!(scaled.ladders[0].steps.len(), DEFAULT_SCALES.len());
        assert!(scaled.ladders[1].steps.is_empty());
    }

    #[test]
    fn detect_finds_keyword_and_reports_box() {
        let frame = Frame::new(texture(160, 90));
        let bank = TemplateBank::new(vec![Template::new("힘 증가", crop(frame.as_gray(), 40, 30, 32, 14))]);

        let detection = detect(unit_scale(), &frame, &bank);
        assert_eq!(detection.keywords, vec!["힘 증가".to_string()]);
        assert_eq!(detection.kept[0].bbox, BBox::new(40, 30, 32, 14));
        assert_eq!(detection.ranked.len(), 1);
    }

    #[test]
    fn template_larger_than_frame_is_skipped() {
        let frame = Frame::new(texture(20, 20));
        let bank = TemplateBank::new(vec![Template::new("big", texture(30, 10))]);
        let detection = detect(MatchConfig::default(), &frame, &bank);
        assert!(detection.keywords.is_empty());
    }

    #[test]
    fn empty_bank_detects_nothing() {
        let frame = Frame::new(texture(20, 20));
        let detection = detect(MatchConfig::default(), &frame, &TemplateBank::default());
        assert!(detection.keywords.is_empty());
        assert!(detection.ranked.is_empty());
    }

    #[test]
    fn template_threshold_is_inclusive() {
        assert!(accepts(0.70, 0.70));
        assert!(!accepts(0.69, 0.70));

        // A perfect match is rejected once the threshold is out of reach.
        let frame = Frame::new(texture(100, 60));
        let bank = TemplateBank::new(vec![Template::new("k", crop(frame.as_gray(), 5, 5, 20, 10))]);
        let config = MatchConfig {
            template_threshold: 1.01,
            ..unit_scale()
        };
        assert!(detect(config, &frame, &bank).keywords.is_empty());
    }

    #[test]
    fn overlapping_keywords_collapse_to_the_best() {
        let frame = Frame::new(texture(160, 90));
        let exact = crop(frame.as_gray(), 50, 40, 30, 12);
        // Same spot, slightly perturbed: still accepted, but scores lower.
        let noisy = GrayImage::from_fn(30, 12, |x, y| {
            let v = exact.get_pixel(x, y).0[0];
            Luma([if (x + y) % 5 == 0 { 255 - v } else { v }])
        });
        let bank = TemplateBank::new(vec![
            Template::new("noisy", noisy),
            Template::new("exact", exact),
        ]);

        let config = MatchConfig {
            template_threshold: 0.3,
            ..unit_scale()
        };
        let detection = detect(config, &frame, &bank);
        assert_eq!(detection.ranked.len(), 2);
        assert_eq!(detection.ranked[0].keyword, "exact");
        assert_eq!(detection.keywords, vec!["exact".to_string()]);
    }

    #[test]
    fn detection_is_deterministic() {
        let frame = Frame::new(texture(140, 70));
        let bank = TemplateBank::new(vec![
            Template::new("a", crop(frame.as_gray(), 0, 0, 20, 10)),
            Template::new("b", crop(frame.as_gray(), 60, 30, 24, 12)),
            Template::new("c", crop(frame.as_gray(), 100, 50, 30, 14)),
        ]);
        let matcher = Matcher::new(unit_scale());
        let scaled = matcher.prepare(&bank);

        let first = matcher.detect(&frame, &scaled);
        for _ in 0..5 {
            let again = matcher.detect(&frame, &scaled);
            let mut a = first.keywords.clone();
            let mut b = again.keywords.clone();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
        assert_eq!(first.keywords.len(), 3);
    }

    #[test]
    fn scaled_size_truncates_and_clamps() {
        assert_eq!(scaled_size(100, 20, 0.45), (45, 9));
        assert_eq!(scaled_size(1, 1, 0.40), (1, 1));
        assert_eq!(scaled_size(30, 10, 2.0), (60, 20));
    }

    #[test]
    fn resize_produces_requested_size() -> Result<()> {
        let resized = resize_gray(&texture(40, 20), 18, 9)?;
        assert_eq!(resized.dimensions(), (18, 9));
        Ok(())
    }

    #[test]
    fn top_is_bounded_by_candidate_count() {
        let detection = Detection::default();
        assert!(detection.top(3).is_empty());
    }
}
