//! Markup rasterization.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Largest bitmap edge accepted, in pixels.
pub const MAX_RASTER_DIM: u32 = 16_384;

/// Renders declarative markup to PNG bytes.
pub trait Rasterizer: Send + Sync {
    /// Deterministic for identical input. Fails with
    /// [`MediaError::RenderFailed`] on malformed markup.
    fn rasterize(&self, markup: &str, width: u32, height: u32) -> MediaResult<Vec<u8>>;
}

/// SVG rasterizer backed by resvg, with fonts loaded once.
#[derive(Clone)]
pub struct SvgRasterizer {
    fontdb: Arc<fontdb::Database>,
}

impl SvgRasterizer {
    /// Rasterizer using system fonts.
    pub fn new() -> Self {
        Self::with_font_dirs(&[])
    }

    /// Rasterizer using system fonts plus fonts found in `dirs`.
    pub fn with_font_dirs(dirs: &[&Path]) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        for dir in dirs {
            db.load_fonts_dir(dir);
        }
        debug!(faces = db.len(), "Loaded font database");
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn font_count(&self) -> usize {
        self.fontdb.len()
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(&self, markup: &str, width: u32, height: u32) -> MediaResult<Vec<u8>> {
        if width == 0 || height == 0 || width > MAX_RASTER_DIM || height > MAX_RASTER_DIM {
            return Err(MediaError::render_failed(format!(
                "raster size out of range: {}x{}",
                width, height
            )));
        }

        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(markup, &opts)
            .map_err(|e| MediaError::render_failed(format!("parse svg: {}", e)))?;

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| MediaError::render_failed("failed to allocate pixmap"))?;

        let size = tree.size();
        let transform = Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        encode_png(&pixmap)
    }
}

/// Encode a premultiplied pixmap as straight-alpha PNG.
fn encode_png(pixmap: &Pixmap) -> MediaResult<Vec<u8>> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let img = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), rgba)
        .ok_or_else(|| MediaError::render_failed("pixel buffer size mismatch"))?;

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageOutputFormat::Png)
        .map_err(|e| MediaError::render_failed(format!("encode png: {}", e)))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout;
    use kinetic_models::LayoutStyle;

    fn rasterizer() -> SvgRasterizer {
        SvgRasterizer::new()
    }

    #[test]
    fn test_rasterize_shapes() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"><rect x="0" y="0" width="4" height="2" fill="#FF0000"/></svg>"##;
        let png = rasterizer().rasterize(svg, 4, 4).unwrap();

        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 3).0[3], 0);
    }

    #[test]
    fn test_translucent_band_is_demultiplied() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="2" height="2"><rect width="2" height="2" fill="#000000" fill-opacity="0.4"/></svg>"##;
        let png = rasterizer().rasterize(svg, 2, 2).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        let px = img.get_pixel(0, 0).0;
        assert_eq!(&px[..3], &[0, 0, 0]);
        assert!((100..=104).contains(&px[3]));
    }

    #[test]
    fn test_deterministic() {
        let block = layout("Same input", Some("Same"), LayoutStyle::Bold, 108, 192).unwrap();
        let svg = block.to_svg();
        let r = rasterizer();
        assert_eq!(r.rasterize(&svg, 108, 192).unwrap(), r.rasterize(&svg, 108, 192).unwrap());
    }

    #[test]
    fn test_malformed_markup() {
        let err = rasterizer().rasterize("<svg", 10, 10).unwrap_err();
        assert!(matches!(err, MediaError::RenderFailed(_)));
        assert!(rasterizer().rasterize("not markup at all", 10, 10).is_err());
    }

    #[test]
    fn test_rejects_empty_size() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"/>"#;
        assert!(rasterizer().rasterize(svg, 0, 10).is_err());
    }
}
