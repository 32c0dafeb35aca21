//! Text layout: wrapping, sizing and band placement for overlay text.
//!
//! Everything is derived from the text and the canvas size. Glyph widths
//! are approximated as `0.6 * font_size`; no shaping is performed.

mod svg;
mod text;

pub use svg::escape_markup;
pub use text::{
    cap_lines, char_len, expand_shortcodes, normalize_text, split_attribution, wrap_text, ELLIPSIS,
};

use serde::Serialize;

use kinetic_models::{Canvas, LayoutStyle};

use crate::error::{MediaError, MediaResult};

/// Maximum rendered lines.
pub const MAX_LINES: usize = 5;
/// Extra pixels between consecutive baselines.
pub const LINE_GAP: u32 = 10;
/// Average glyph advance as a share of the font size.
pub const GLYPH_WIDTH_RATIO: f64 = 0.6;
/// Band height ceiling as a share of the canvas height.
pub const MAX_BAND_RATIO: f64 = 0.32;

/// Design height the bold baseline is specified against.
const BOLD_DESIGN_HEIGHT: f64 = 1920.0;
/// First baseline of bold text on the design height.
const BOLD_DESIGN_BASELINE: f64 = 1200.0;
/// Gap below the last line before the attribution, as a share of the font size.
const ATTRIBUTION_GAP_RATIO: f64 = 0.8;
const ATTRIBUTION_FONT_RATIO: f64 = 0.7;
const BOLD_PADDING_RATIO: f64 = 0.6;
const REFERENCE_TOP_RATIO: f64 = 0.10;
const REFERENCE_BOTTOM_MARGIN_RATIO: f64 = 0.75;
/// Clearance kept under a clamped attribution baseline.
const ATTRIBUTION_DESCENT_RATIO: f64 = 0.3;

struct StyleMetrics {
    margin_ratio: f64,
    font_divisor: f64,
}

fn metrics(style: LayoutStyle) -> StyleMetrics {
    match style {
        LayoutStyle::Bold => StyleMetrics {
            margin_ratio: 0.15,
            font_divisor: 20.0,
        },
        LayoutStyle::Reference => StyleMetrics {
            margin_ratio: 0.08,
            font_divisor: 19.0,
        },
    }
}

/// Positioned, sized description of an overlay text block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub style: LayoutStyle,
    pub canvas: Canvas,
    /// At most [`MAX_LINES`] lines; the last ends with an ellipsis when truncated
    pub lines: Vec<String>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    pub side_margin: f64,
    pub text_area_width: f64,
    pub font_size: u32,
    pub attribution_font_size: u32,
    pub max_chars_per_line: usize,
    /// Baseline-to-baseline distance
    pub line_spacing: u32,
    /// Top of the first line's em box
    pub main_text_top: u32,
    pub first_baseline: u32,
    /// Baseline of the attribution line
    pub attribution_y: u32,
    pub header_band_y: u32,
    /// Always even and at most `0.32 * canvas.height`
    pub header_band_height: u32,
    pub center_x: f64,
}

impl TextBlock {
    /// Baseline of line `index`.
    pub fn baseline(&self, index: usize) -> u32 {
        self.first_baseline + index as u32 * self.line_spacing
    }

    pub fn last_baseline(&self) -> u32 {
        self.baseline(self.lines.len().saturating_sub(1))
    }

    /// Vertical offset for video content placed under an opaque band.
    pub fn content_offset(&self) -> u32 {
        if self.style.has_header_band() {
            self.header_band_y + self.header_band_height
        } else {
            0
        }
    }

    /// Render as standalone SVG markup covering the whole canvas.
    pub fn to_svg(&self) -> String {
        svg::render(self)
    }
}

/// Lay out `text` (and optional `attribution`) for a canvas.
///
/// Fails only when the text is empty after normalization.
pub fn layout(
    text: &str,
    attribution: Option<&str>,
    style: LayoutStyle,
    canvas_width: u32,
    canvas_height: u32,
) -> MediaResult<TextBlock> {
    if canvas_width == 0 || canvas_height == 0 {
        return Err(MediaError::render_failed(format!(
            "cannot lay out text on a {}x{} canvas",
            canvas_width, canvas_height
        )));
    }

    let text = normalize_text(text)?;
    let attribution = attribution.and_then(|a| normalize_text(a).ok());

    let width = f64::from(canvas_width);
    let height = f64::from(canvas_height);
    let m = metrics(style);

    let side_margin = width * m.margin_ratio;
    let text_area_width = width - 2.0 * side_margin;
    let font_size = ((text_area_width / m.font_divisor).round() as u32).max(1);
    let max_chars_per_line =
        ((text_area_width / (f64::from(font_size) * GLYPH_WIDTH_RATIO)).floor() as usize).max(1);

    let mut lines = wrap_text(&text, max_chars_per_line);
    let truncated = cap_lines(&mut lines, MAX_LINES);

    let fs = f64::from(font_size);
    let line_spacing = font_size + LINE_GAP;
    let attribution_font_size = ((fs * ATTRIBUTION_FONT_RATIO).round() as u32).max(1);

    let (main_text_top, first_baseline) = match style {
        LayoutStyle::Reference => {
            let top = (height * REFERENCE_TOP_RATIO).round() as u32;
            (top, top + font_size)
        }
        LayoutStyle::Bold => {
            let baseline = (BOLD_DESIGN_BASELINE * height / BOLD_DESIGN_HEIGHT).round() as u32;
            (baseline.saturating_sub(font_size), baseline)
        }
    };

    let last_baseline = first_baseline + (lines.len() as u32 - 1) * line_spacing;
    let mut attribution_y =
        last_baseline + font_size + (fs * ATTRIBUTION_GAP_RATIO).round() as u32;

    let band_cap = even_floor((height * MAX_BAND_RATIO).floor() as u32);

    let (header_band_y, natural_height) = match style {
        LayoutStyle::Reference => {
            let bottom_margin = (fs * REFERENCE_BOTTOM_MARGIN_RATIO).round() as u32;
            (0, attribution_y + bottom_margin)
        }
        LayoutStyle::Bold => {
            let padding = (fs * BOLD_PADDING_RATIO).round() as u32;
            let block_bottom = if attribution.is_some() {
                attribution_y
            } else {
                last_baseline
            };
            let y = main_text_top.saturating_sub(padding);
            (y, block_bottom - y + padding)
        }
    };

    let mut header_band_height = natural_height.min(band_cap);
    header_band_height += header_band_height % 2;

    if natural_height > band_cap {
        let descent = (f64::from(attribution_font_size) * ATTRIBUTION_DESCENT_RATIO).round() as u32;
        let limit = (header_band_y + header_band_height).saturating_sub(descent);
        attribution_y = attribution_y.min(limit);
    }

    Ok(TextBlock {
        style,
        canvas: Canvas::new(canvas_width, canvas_height),
        lines,
        truncated,
        attribution,
        side_margin,
        text_area_width,
        font_size,
        attribution_font_size,
        max_chars_per_line,
        line_spacing,
        main_text_top,
        first_baseline,
        attribution_y,
        header_band_y,
        header_band_height,
        center_x: side_margin + text_area_width / 2.0,
    })
}

fn even_floor(v: u32) -> u32 {
    v - v % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "The quick brown fox jumps over the lazy dog and keeps running through \
        the forest until the sun goes down behind the distant mountains far away from home \
        where nobody has ever been before and nobody will ever go again";

    #[test]
    fn test_reference_font_size() {
        let block = layout("Hello world", None, LayoutStyle::Reference, 1080, 1920).unwrap();
        assert!((block.side_margin - 86.4).abs() < 1e-9);
        assert!((block.text_area_width - 907.2).abs() < 1e-9);
        assert_eq!(block.font_size, 48);
        assert_eq!(block.max_chars_per_line, 31);
        assert_eq!(block.main_text_top, 192);
        assert_eq!(block.first_baseline, 240);
        assert_eq!(block.line_spacing, 58);
    }

    #[test]
    fn test_bold_geometry() {
        let block = layout("Hello world", Some("Someone"), LayoutStyle::Bold, 1080, 1920).unwrap();
        assert_eq!(block.font_size, 38);
        assert_eq!(block.first_baseline, 1200);
        assert_eq!(block.main_text_top, 1162);
        // One line: attribution sits fs + 30 below the baseline
        assert_eq!(block.attribution_y, 1268);
        assert_eq!(block.attribution_font_size, 27);
        assert!((block.center_x - 540.0).abs() < 1e-9);
        assert_eq!(block.header_band_y, 1162 - 23);
        assert_eq!(block.content_offset(), 0);
    }

    #[test]
    fn test_bold_scales_with_canvas_height() {
        let block = layout("Hello", None, LayoutStyle::Bold, 2160, 3840).unwrap();
        assert_eq!(block.first_baseline, 2400);
    }

    #[test]
    fn test_empty_text_fails() {
        assert!(matches!(
            layout("   ", None, LayoutStyle::Bold, 1080, 1920),
            Err(MediaError::EmptyText)
        ));
    }

    #[test]
    fn test_line_cap_with_ellipsis() {
        for &(w, h) in &[(1080u32, 1920u32), (720, 1280), (1920, 1080), (400, 700)] {
            for style in LayoutStyle::ALL {
                let block = layout(LONG, Some("Anon"), *style, w, h).unwrap();
                assert!(block.lines.len() <= MAX_LINES);
                let raw = wrap_text(&normalize_text(LONG).unwrap(), block.max_chars_per_line);
                if raw.len() > MAX_LINES {
                    assert!(block.truncated);
                    assert!(block.lines[MAX_LINES - 1].ends_with(ELLIPSIS));
                }
            }
        }
    }

    #[test]
    fn test_band_is_even_and_capped() {
        let texts = ["Hi", "Two words", LONG];
        for &(w, h) in &[(1080u32, 1920u32), (1081, 1919), (3840, 2160), (2160, 3840), (333, 777)] {
            for text in texts {
                for style in LayoutStyle::ALL {
                    let block = layout(text, Some("Source"), *style, w, h).unwrap();
                    assert_eq!(block.header_band_height % 2, 0);
                    assert!(f64::from(block.header_band_height) <= 0.32 * f64::from(h));
                }
            }
        }
    }

    #[test]
    fn test_reference_band_starts_at_top() {
        let block = layout("Hello world", Some("Me"), LayoutStyle::Reference, 1080, 1920).unwrap();
        assert_eq!(block.header_band_y, 0);
        assert_eq!(block.content_offset(), block.header_band_height);
        assert!(block.attribution_y < block.header_band_height);
    }

    #[test]
    fn test_attribution_clamped_inside_capped_band() {
        // Landscape 4K overflows the cap with five lines
        let block = layout(LONG, Some("Anon"), LayoutStyle::Reference, 3840, 2160).unwrap();
        assert_eq!(block.font_size, 170);
        assert_eq!(block.lines.len(), MAX_LINES);
        assert_eq!(block.header_band_height, 690);
        assert_eq!(block.attribution_font_size, 119);
        // 690 minus a 36 px descent
        assert_eq!(block.attribution_y, 654);
        // The clamped attribution lands between body lines 2 and 3, over the text
        assert_eq!(block.baseline(1), 566);
        assert_eq!(block.baseline(2), 746);
        assert!(block.baseline(1) < block.attribution_y);
        assert!(block.attribution_y < block.baseline(2));
        assert!(block.last_baseline() > block.header_band_height);
    }

    #[test]
    fn test_attribution_is_normalized() {
        let block = layout("x", Some("  "), LayoutStyle::Bold, 1080, 1920).unwrap();
        assert!(block.attribution.is_none());
        let block = layout("x", Some(" a  :rocket: "), LayoutStyle::Bold, 1080, 1920).unwrap();
        assert_eq!(block.attribution.as_deref(), Some("a \u{1f680}"));
    }
}
