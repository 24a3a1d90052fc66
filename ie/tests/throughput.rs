use std::time::{Duration, Instant};

use ie::{Frame, Ie, MatchConfig, Template, TemplateBank};
use image::{GrayImage, Luma};

fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let mut h = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed.wrapping_mul(83_492_791);
        h ^= h >> 13;
        h = h.wrapping_mul(0x5bd1_e995);
        h ^= h >> 15;
        Luma([(h & 0xff) as u8])
    })
}

/// Full ladder for a typical bank on a default-sized region, with nothing to
/// find so no template exits early.
#[test]
#[cfg_attr(debug_assertions, ignore = "timing is only meaningful in release builds")]
fn full_ladder_on_default_region_fits_the_rescan_interval() {
    let templates = (0..17)
        .map(|i| Template::new(format!("keyword {i}"), noise(120, 24, i + 1)))
        .collect();
    let config = MatchConfig {
        early_exit_score: 2.0,
        ..MatchConfig::default()
    };
    let ie = Ie::new(config, TemplateBank::new(templates));
    let frame = Frame::new(noise(400, 300, 99));

    let start = Instant::now();
    let detection = ie.detect(&frame);
    let elapsed = start.elapsed();

    assert!(detection.keywords.is_empty());
    assert!(elapsed < Duration::from_secs(10), "one cycle took {elapsed:?}");
}

#[test]
fn prepared_bank_is_reused_across_frames() {
    let stamp = noise(40, 12, 7);
    let ie = Ie::new(
        MatchConfig::default(),
        TemplateBank::new(vec![Template::new("치명타 피해 증가", stamp.clone())]),
    );

    // Different frame sizes share the same prepared templates.
    for (w, h, x, y) in [(200, 80, 10, 20), (131, 57, 90, 45), (64, 64, 0, 0)] {
        let mut canvas = noise(w, h, 3);
        image::imageops::replace(&mut canvas, &stamp, x, y);
        let detection = ie.detect(&Frame::new(canvas));
        assert_eq!(detection.keywords, vec!["치명타 피해 증가".to_string()], "{w}x{h}");
        let found = &detection.kept[0].bbox;
        assert_eq!((found.x, found.y, found.w, found.h), (x as u32, y as u32, 40, 12));
    }
}
