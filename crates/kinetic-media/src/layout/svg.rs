//! SVG markup for a laid-out text block.

use std::fmt::Write;

use kinetic_models::LayoutStyle;

use super::TextBlock;
use crate::expr::format_number;

const SANS_FAMILY: &str = "Roboto, 'DejaVu Sans', 'Noto Color Emoji', sans-serif";
const SERIF_FAMILY: &str = "Georgia, 'DejaVu Serif', 'Noto Color Emoji', serif";
const ATTRIBUTION_FILL: &str = "#FFA500";

/// Escape `& < > " '` for embedding in markup.
pub fn escape_markup(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub(super) fn render(block: &TextBlock) -> String {
    let w = block.canvas.width;
    let h = block.canvas.height;
    let cx = format_number(block.center_x);
    let mut svg = String::new();

    // Writing into a String cannot fail.
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );

    match block.style {
        LayoutStyle::Bold => {
            svg.push_str(
                r##"<defs><filter id="shadow" x="-10%" y="-10%" width="120%" height="140%"><feDropShadow dx="2" dy="2" stdDeviation="2" flood-color="#000000" flood-opacity="0.8"/></filter></defs>"##,
            );
            let _ = write!(
                svg,
                r##"<rect x="0" y="{}" width="{w}" height="{}" fill="#000000" fill-opacity="0.4"/>"##,
                block.header_band_y, block.header_band_height
            );
            let _ = write!(
                svg,
                r##"<text font-family="{SANS_FAMILY}" font-size="{}" font-weight="bold" fill="#FFFFFF" stroke="#000000" stroke-width="2" paint-order="stroke" text-anchor="middle" filter="url(#shadow)">"##,
                block.font_size
            );
        }
        LayoutStyle::Reference => {
            let _ = write!(
                svg,
                r##"<rect x="0" y="{}" width="{w}" height="{}" fill="#FFFFFF"/>"##,
                block.header_band_y, block.header_band_height
            );
            let _ = write!(
                svg,
                r##"<text font-family="{SERIF_FAMILY}" font-size="{}" fill="#000000" text-anchor="middle">"##,
                block.font_size
            );
        }
    }

    for (i, line) in block.lines.iter().enumerate() {
        let _ = write!(
            svg,
            r#"<tspan x="{cx}" y="{}">{}</tspan>"#,
            block.baseline(i),
            escape_markup(line)
        );
    }
    svg.push_str("</text>");

    if let Some(attribution) = &block.attribution {
        let (content, extra) = match block.style {
            LayoutStyle::Bold => (
                format!("-{}-", escape_markup(attribution)),
                r##" stroke="#000000" stroke-width="1.5" paint-order="stroke" filter="url(#shadow)""##,
            ),
            LayoutStyle::Reference => (escape_markup(attribution), ""),
        };
        let _ = write!(
            svg,
            r#"<text x="{cx}" y="{}" font-family="{SANS_FAMILY}" font-size="{}" font-weight="bold" fill="{ATTRIBUTION_FILL}" text-anchor="middle"{extra}>{content}</text>"#,
            block.attribution_y, block.attribution_font_size
        );
    }

    svg.push_str("</svg>");
    svg
}
