//! Motion synthesis: still image to slow-zoom letterboxed clip.
//!
//! [`synthesize`] produces a [`MotionPlan`], a list of named stages with
//! parameters. Binding the stages to a concrete encoder happens in
//! [`crate::compose`].

use serde::Serialize;
use std::f64::consts::PI;
use std::fmt;

use kinetic_models::encoding::DEFAULT_FRAME_RATE;
use kinetic_models::request::DEFAULT_STILL_DURATION_SECS;
use kinetic_models::Canvas;

use crate::expr::{Expr, Var};

/// Zoom at the first frame.
pub const ZOOM_START: f64 = 1.05;
/// Amplitude of the eased cosine ramp.
pub const ZOOM_EASE_RANGE: f64 = 0.20;
/// Extra linear zoom gained over the second half.
pub const ZOOM_SECOND_HALF_BOOST: f64 = 0.10;
/// Hard ceiling on the zoom factor.
pub const ZOOM_CEILING: f64 = 1.35;

/// Share of the canvas height covered by moving content.
const CONTENT_HEIGHT_RATIO: f64 = 0.60;
/// Pre-zoom upscale factor, leaves headroom so zooming never exposes edges.
const PRESCALE_RATIO: f64 = 1.5;

/// Sepia colour matrix, row-major RGB.
pub const SEPIA_MATRIX: [f64; 9] = [
    0.393, 0.769, 0.189, //
    0.349, 0.686, 0.168, //
    0.272, 0.534, 0.131,
];

/// Named motion looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPreset {
    /// Gentle grade with light grain
    #[default]
    Soft,
    /// Punchy contrast and saturation
    Cinematic,
    /// Sepia, heavy grain and projector flicker
    Vintage,
    /// Saturated, no vignette
    Vivid,
    /// Monochrome with grain
    Noir,
}

/// Effect parameters of a preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresetParams {
    pub contrast: f64,
    pub saturation: f64,
    pub vignette: bool,
    pub blur_sigma: f64,
    pub sepia: bool,
    pub noise_level: Option<u32>,
    pub flicker_amplitude: Option<f64>,
}

impl MotionPreset {
    pub const ALL: &'static [MotionPreset] = &[
        MotionPreset::Soft,
        MotionPreset::Cinematic,
        MotionPreset::Vintage,
        MotionPreset::Vivid,
        MotionPreset::Noir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionPreset::Soft => "soft",
            MotionPreset::Cinematic => "cinematic",
            MotionPreset::Vintage => "vintage",
            MotionPreset::Vivid => "vivid",
            MotionPreset::Noir => "noir",
        }
    }

    /// Look up a preset by name. Unknown names select the default preset.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }

    pub fn params(&self) -> PresetParams {
        match self {
            MotionPreset::Soft => PresetParams {
                contrast: 1.05,
                saturation: 0.95,
                vignette: true,
                blur_sigma: 8.0,
                sepia: false,
                noise_level: Some(8),
                flicker_amplitude: None,
            },
            MotionPreset::Cinematic => PresetParams {
                contrast: 1.2,
                saturation: 1.3,
                vignette: true,
                blur_sigma: 6.0,
                sepia: false,
                noise_level: None,
                flicker_amplitude: None,
            },
            MotionPreset::Vintage => PresetParams {
                contrast: 1.1,
                saturation: 0.8,
                vignette: true,
                blur_sigma: 8.0,
                sepia: true,
                noise_level: Some(14),
                flicker_amplitude: Some(0.06),
            },
            MotionPreset::Vivid => PresetParams {
                contrast: 1.1,
                saturation: 1.4,
                vignette: false,
                blur_sigma: 4.0,
                sepia: false,
                noise_level: None,
                flicker_amplitude: None,
            },
            MotionPreset::Noir => PresetParams {
                contrast: 1.3,
                saturation: 0.0,
                vignette: true,
                blur_sigma: 8.0,
                sepia: false,
                noise_level: Some(10),
                flicker_amplitude: Some(0.03),
            },
        }
    }
}

impl fmt::Display for MotionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionStage {
    /// Centered crop to the zoom output's aspect ratio
    Crop { width: Expr, height: Expr },
    /// Upscale the still before zooming
    Prescale { width: u32 },
    /// Centered zoom rendered into the content region
    ZoomPan {
        zoom: Expr,
        x: Expr,
        y: Expr,
        width: u32,
        height: u32,
        fps: u32,
    },
    /// Solid bars above and below the content region
    Letterbox {
        width: u32,
        height: u32,
        y: u32,
        color: &'static str,
    },
    /// Blur enabled only while `t` is within `[0, until_secs]`
    Blur { sigma: f64, until_secs: f64 },
    /// Fade from black
    FadeIn { duration_secs: f64 },
    /// Temporal grain
    Grain { strength: u32 },
    ColorGrade { contrast: f64, saturation: f64 },
    Sepia,
    /// Per-frame random gamma in `[1 - amplitude, 1 + amplitude]`
    Flicker { amplitude: f64 },
    Vignette { angle: Expr },
}

impl MotionStage {
    pub fn name(&self) -> &'static str {
        match self {
            MotionStage::Crop { .. } => "crop",
            MotionStage::Prescale { .. } => "prescale",
            MotionStage::ZoomPan { .. } => "zoompan",
            MotionStage::Letterbox { .. } => "letterbox",
            MotionStage::Blur { .. } => "blur",
            MotionStage::FadeIn { .. } => "fade_in",
            MotionStage::Grain { .. } => "grain",
            MotionStage::ColorGrade { .. } => "color_grade",
            MotionStage::Sepia => "sepia",
            MotionStage::Flicker { .. } => "flicker",
            MotionStage::Vignette { .. } => "vignette",
        }
    }
}

/// Declarative description of the motion clip.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlan {
    pub preset: MotionPreset,
    pub duration_secs: f64,
    pub fps: u32,
    pub total_frames: u64,
    pub canvas: Canvas,
    pub content_height: u32,
    pub stages: Vec<MotionStage>,
}

impl MotionPlan {
    pub fn zoom_at(&self, frame: u64) -> f64 {
        zoom_at(frame, self.total_frames)
    }

    pub fn stage(&self, name: &str) -> Option<&MotionStage> {
        self.stages.iter().find(|s| s.name() == name)
    }
}

/// Synthesize a plan for the default canvas and frame rate.
pub fn synthesize(duration_secs: f64, preset_name: &str) -> MotionPlan {
    synthesize_for(
        duration_secs,
        MotionPreset::from_name(preset_name),
        Canvas::default(),
        DEFAULT_FRAME_RATE,
    )
}

/// Synthesize a plan for an explicit canvas and frame rate.
///
/// Non-positive or non-finite durations fall back to the still default.
pub fn synthesize_for(duration_secs: f64, preset: MotionPreset, canvas: Canvas, fps: u32) -> MotionPlan {
    let duration_secs = if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs
    } else {
        DEFAULT_STILL_DURATION_SECS
    };
    let fps = fps.max(1);
    let canvas = canvas.even();
    let total_frames = ((duration_secs * f64::from(fps)).round() as u64).max(1);
    let half_secs = duration_secs / 2.0;

    let content_height = even((f64::from(canvas.height) * CONTENT_HEIGHT_RATIO).round() as u32);
    let bar = (canvas.height - content_height) / 2;
    let params = preset.params();

    let iw = || Expr::var(Var::InputWidth);
    let ih = || Expr::var(Var::InputHeight);
    let zoom = || Expr::var(Var::Zoom);

    // Stills of any shape reach zoompan already at its output aspect
    let (aw, ah) = (f64::from(canvas.width), f64::from(content_height));
    let mut stages = vec![
        MotionStage::Crop {
            width: iw().min(ih() * aw / ah),
            height: ih().min(iw() * ah / aw),
        },
        MotionStage::Prescale {
            width: even((f64::from(canvas.width) * PRESCALE_RATIO).round() as u32),
        },
        MotionStage::ZoomPan {
            zoom: zoom_expr(total_frames),
            x: iw() / 2.0 - iw() / zoom() / 2.0,
            y: ih() / 2.0 - ih() / zoom() / 2.0,
            width: canvas.width,
            height: content_height,
            fps,
        },
        MotionStage::Letterbox {
            width: canvas.width,
            height: canvas.height,
            y: bar,
            color: "black",
        },
        MotionStage::Blur {
            sigma: params.blur_sigma,
            until_secs: half_secs,
        },
        MotionStage::FadeIn {
            duration_secs: half_secs,
        },
    ];

    if let Some(strength) = params.noise_level {
        stages.push(MotionStage::Grain { strength });
    }
    stages.push(MotionStage::ColorGrade {
        contrast: params.contrast,
        saturation: params.saturation,
    });
    if params.sepia {
        stages.push(MotionStage::Sepia);
    }
    if let Some(amplitude) = params.flicker_amplitude {
        stages.push(MotionStage::Flicker { amplitude });
    }
    if params.vignette {
        stages.push(MotionStage::Vignette {
            angle: Expr::var(Var::Pi) / 5.0,
        });
    }

    MotionPlan {
        preset,
        duration_secs,
        fps,
        total_frames,
        canvas,
        content_height,
        stages,
    }
}

fn even(v: u32) -> u32 {
    v + v % 2
}

fn half_frames(total_frames: u64) -> u64 {
    (total_frames / 2).max(1)
}

/// Zoom factor at `frame` of `total_frames`.
///
/// Eased cosine ramp from 1.05 toward 1.25, plus a linear boost of up to
/// 0.10 past the midpoint, clamped to 1.35. Frames past the end hold the
/// final value.
pub fn zoom_at(frame: u64, total_frames: u64) -> f64 {
    let n = total_frames.max(1) as f64;
    let f = (frame as f64).min(n);
    let half = half_frames(total_frames) as f64;

    let eased = ZOOM_START + ZOOM_EASE_RANGE * (0.5 - 0.5 * (PI * f / n).cos());
    let boost = if f > half {
        ZOOM_SECOND_HALF_BOOST * (f - half) / half
    } else {
        0.0
    };
    (eased + boost).min(ZOOM_CEILING)
}

/// The same curve as [`zoom_at`], over the output frame counter.
pub fn zoom_expr(total_frames: u64) -> Expr {
    let n = total_frames.max(1) as f64;
    let half = half_frames(total_frames) as f64;
    let on = || Expr::var(Var::OutputFrame).min(Expr::c(n));

    let eased = Expr::c(ZOOM_START)
        + Expr::c(ZOOM_EASE_RANGE) * (Expr::c(0.5) - Expr::c(0.5) * (Expr::var(Var::Pi) * on() / n).cos());
    let boost = Expr::c(ZOOM_SECOND_HALF_BOOST)
        * Expr::if_else(on().gt(Expr::c(half)), (on() - half) / half, Expr::c(0.0));

    Expr::c(ZOOM_CEILING).min(eased + boost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalContext;

    #[test]
    fn test_unknown_preset_falls_back() {
        assert_eq!(MotionPreset::from_name("does-not-exist"), MotionPreset::Soft);
        assert_eq!(MotionPreset::from_name(" Vintage "), MotionPreset::Vintage);
        assert_eq!(synthesize(8.0, "bogus").preset, MotionPreset::default());
    }

    #[test]
    fn test_zoom_is_monotonic_and_bounded() {
        for &total in &[1u64, 2, 3, 31, 240, 241, 900] {
            let mut prev = 0.0;
            for frame in 0..=total + 10 {
                let z = zoom_at(frame, total);
                assert!(z >= prev, "zoom decreased at frame {} of {}", frame, total);
                assert!(z <= ZOOM_CEILING + 1e-12);
                prev = z;
            }
        }
    }

    #[test]
    fn test_zoom_endpoints() {
        assert!((zoom_at(0, 240) - ZOOM_START).abs() < 1e-12);
        // No jump at the midpoint
        let mid = zoom_at(120, 240);
        assert!((mid - 1.15).abs() < 1e-9);
        assert!((zoom_at(121, 240) - mid).abs() < 0.01);
        assert!((zoom_at(240, 240) - ZOOM_CEILING).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_expr_matches_curve() {
        let expr = zoom_expr(240);
        for frame in [0u64, 1, 60, 119, 120, 121, 200, 239, 240, 300] {
            let ctx = EvalContext::at_frame(frame as f64, 30.0);
            assert!((expr.eval(&ctx) - zoom_at(frame, 240)).abs() < 1e-9);
        }
        assert!(expr.render().starts_with("min(1.35,"));
    }

    #[test]
    fn test_plan_geometry() {
        let plan = synthesize(8.0, "soft");
        assert_eq!(plan.total_frames, 240);
        assert_eq!(plan.content_height, 1152);

        match plan.stage("letterbox") {
            Some(MotionStage::Letterbox { y, height, .. }) => {
                assert_eq!(*y, 384);
                assert_eq!(*height, 1920);
            }
            other => panic!("unexpected stage {:?}", other),
        }
        match plan.stage("prescale") {
            Some(MotionStage::Prescale { width }) => assert_eq!(*width, 1620),
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_crop_matches_zoom_aspect() {
        let plan = synthesize(8.0, "soft");
        assert_eq!(plan.stages[0].name(), "crop");
        assert_eq!(plan.stages[1].name(), "prescale");
        let Some(MotionStage::Crop { width, height }) = plan.stage("crop") else {
            panic!("no crop stage");
        };
        assert_eq!(width.render(), "min(iw,ih*1080/1152)");

        for &(iw, ih) in &[(4000.0, 3000.0), (1000.0, 3000.0), (1080.0, 1152.0)] {
            let ctx = EvalContext {
                input_width: iw,
                input_height: ih,
                ..Default::default()
            };
            let (w, h) = (width.eval(&ctx), height.eval(&ctx));
            assert!(w <= iw + 1e-9 && h <= ih + 1e-9);
            assert!((w / h - 1080.0 / 1152.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_blur_and_fade_cover_first_half() {
        let plan = synthesize(10.0, "cinematic");
        assert!(matches!(
            plan.stage("blur"),
            Some(MotionStage::Blur { until_secs, .. }) if (*until_secs - 5.0).abs() < 1e-9
        ));
        assert!(matches!(
            plan.stage("fade_in"),
            Some(MotionStage::FadeIn { duration_secs }) if (*duration_secs - 5.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_optional_effects_follow_preset() {
        let vintage = synthesize(8.0, "vintage");
        assert!(vintage.stage("sepia").is_some());
        assert!(vintage.stage("flicker").is_some());

        let vivid = synthesize(8.0, "vivid");
        assert!(vivid.stage("vignette").is_none());
        assert!(vivid.stage("grain").is_none());
        assert!(vivid.stage("sepia").is_none());
    }

    #[test]
    fn test_invalid_duration_uses_default() {
        let plan = synthesize(-3.0, "soft");
        assert!((plan.duration_secs - DEFAULT_STILL_DURATION_SECS).abs() < 1e-9);
    }
}
