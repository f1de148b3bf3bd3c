//! Blend mode definitions for compositing.
//!
//! Modes expressible as a fixed (source factor, destination factor) pair run
//! on the fixed-function blender. Every other mode needs the destination
//! color inside the fragment shader and goes through the dst-read path of
//! [`crate::compositor`]. All formulas operate on premultiplied colors.

use serde::{Deserialize, Serialize};

/// Blend mode for compositing layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum BlendMode {
    // ── Porter-Duff ─────────────────────────────
    Clear = 0,
    Src = 1,
    Dst = 2,
    #[default]
    SrcOver = 3,
    DstOver = 4,
    SrcIn = 5,
    DstIn = 6,
    SrcOut = 7,
    DstOut = 8,
    SrcATop = 9,
    DstATop = 10,
    Xor = 11,
    Plus = 12,
    Modulate = 13,

    // ── Separable ───────────────────────────────
    Screen = 14,
    Overlay = 15,
    Darken = 16,
    Lighten = 17,
    ColorDodge = 18,
    ColorBurn = 19,
    HardLight = 20,
    SoftLight = 21,
    Difference = 22,
    Exclusion = 23,
    Multiply = 24,

    // ── Non-separable ───────────────────────────
    Hue = 25,
    Saturation = 26,
    Color = 27,
    Luminosity = 28,
}

impl BlendMode {
    /// All blend modes in display order.
    pub const ALL: [BlendMode; 29] = [
        Self::Clear,
        Self::Src,
        Self::Dst,
        Self::SrcOver,
        Self::DstOver,
        Self::SrcIn,
        Self::DstIn,
        Self::SrcOut,
        Self::DstOut,
        Self::SrcATop,
        Self::DstATop,
        Self::Xor,
        Self::Plus,
        Self::Modulate,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Multiply,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Src => "Source",
            Self::Dst => "Destination",
            Self::SrcOver => "Source Over",
            Self::DstOver => "Destination Over",
            Self::SrcIn => "Source In",
            Self::DstIn => "Destination In",
            Self::SrcOut => "Source Out",
            Self::DstOut => "Destination Out",
            Self::SrcATop => "Source Atop",
            Self::DstATop => "Destination Atop",
            Self::Xor => "Xor",
            Self::Plus => "Plus",
            Self::Modulate => "Modulate",
            Self::Screen => "Screen",
            Self::Overlay => "Overlay",
            Self::Darken => "Darken",
            Self::Lighten => "Lighten",
            Self::ColorDodge => "Color Dodge",
            Self::ColorBurn => "Color Burn",
            Self::HardLight => "Hard Light",
            Self::SoftLight => "Soft Light",
            Self::Difference => "Difference",
            Self::Exclusion => "Exclusion",
            Self::Multiply => "Multiply",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Color => "Color",
            Self::Luminosity => "Luminosity",
        }
    }

    /// Category for grouping.
    pub fn category(self) -> &'static str {
        match self {
            Self::Hue | Self::Saturation | Self::Color | Self::Luminosity => "Non-separable",
            mode if mode.coefficients().is_some() => "Porter-Duff",
            _ => "Separable",
        }
    }

    /// Fixed-function factors, or `None` when the mode reads the destination
    /// in the shader.
    pub fn coefficients(self) -> Option<BlendCoefficients> {
        use BlendFactor::*;
        let (src, dst) = match self {
            Self::Clear => (Zero, Zero),
            Self::Src => (One, Zero),
            Self::Dst => (Zero, One),
            Self::SrcOver => (One, OneMinusSrcAlpha),
            Self::DstOver => (OneMinusDstAlpha, One),
            Self::SrcIn => (DstAlpha, Zero),
            Self::DstIn => (Zero, SrcAlpha),
            Self::SrcOut => (OneMinusDstAlpha, Zero),
            Self::DstOut => (Zero, OneMinusSrcAlpha),
            Self::SrcATop => (DstAlpha, OneMinusSrcAlpha),
            Self::DstATop => (OneMinusDstAlpha, SrcAlpha),
            Self::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
            Self::Plus => (One, One),
            Self::Modulate => (Zero, SrcColor),
            _ => return None,
        };
        Some(BlendCoefficients { src, dst })
    }

    /// Whether scaling the source by fractional coverage gives the same
    /// result as interpolating between the blend and the untouched
    /// destination. Holds when the destination factor is `One` or
    /// `1 - src.a` and the source factor does not read the source.
    pub fn supports_coverage_as_alpha(self) -> bool {
        matches!(
            self.coefficients(),
            Some(BlendCoefficients {
                dst: BlendFactor::One | BlendFactor::OneMinusSrcAlpha,
                ..
            })
        )
    }

    /// Identifier used in generated shader code.
    pub(crate) fn shader_name(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Src => "src",
            Self::Dst => "dst",
            Self::SrcOver => "src_over",
            Self::DstOver => "dst_over",
            Self::SrcIn => "src_in",
            Self::DstIn => "dst_in",
            Self::SrcOut => "src_out",
            Self::DstOut => "dst_out",
            Self::SrcATop => "src_atop",
            Self::DstATop => "dst_atop",
            Self::Xor => "xor",
            Self::Plus => "plus",
            Self::Modulate => "modulate",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color_dodge",
            Self::ColorBurn => "color_burn",
            Self::HardLight => "hard_light",
            Self::SoftLight => "soft_light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Multiply => "multiply",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Luminosity => "luminosity",
        }
    }
}

/// Fixed-function blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    fn eval(self, s: &[f32; 4], d: &[f32; 4], channel: usize) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::SrcColor => s[channel],
            Self::OneMinusSrcColor => 1.0 - s[channel],
            Self::SrcAlpha => s[3],
            Self::OneMinusSrcAlpha => 1.0 - s[3],
            Self::DstAlpha => d[3],
            Self::OneMinusDstAlpha => 1.0 - d[3],
        }
    }

    fn wgsl(self) -> &'static str {
        match self {
            Self::Zero => "0.0",
            Self::One => "1.0",
            Self::SrcColor => "s",
            Self::OneMinusSrcColor => "(1.0 - s)",
            Self::SrcAlpha => "s.a",
            Self::OneMinusSrcAlpha => "(1.0 - s.a)",
            Self::DstAlpha => "d.a",
            Self::OneMinusDstAlpha => "(1.0 - d.a)",
        }
    }
}

/// `out = src * src_factor + dst * dst_factor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendCoefficients {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendCoefficients {
    pub fn apply(&self, s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
        std::array::from_fn(|c| s[c] * self.src.eval(&s, &d, c) + d[c] * self.dst.eval(&s, &d, c))
    }
}

/// A requested blend plus its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendDescriptor {
    pub mode: BlendMode,
    pub requires_dst_read: bool,
}

impl BlendDescriptor {
    pub fn new(mode: BlendMode) -> Self {
        Self {
            mode,
            requires_dst_read: mode.coefficients().is_none(),
        }
    }

    /// Classify `mode` for geometry whose coverage may be fractional. Modes
    /// that cannot fold coverage into the source read the destination and
    /// interpolate in the shader instead.
    pub fn with_coverage(mode: BlendMode, fractional: bool) -> Self {
        let mut desc = Self::new(mode);
        desc.requires_dst_read |= fractional && !mode.supports_coverage_as_alpha();
        desc
    }
}

/// Reference evaluation of `mode` on premultiplied colors.
pub fn blend(mode: BlendMode, s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
    if let Some(coeffs) = mode.coefficients() {
        return coeffs.apply(s, d);
    }
    let (sa, da) = (s[3], d[3]);
    let a = sa + da - sa * da;
    let sep = |f: fn(f32, f32, f32, f32) -> f32| -> [f32; 4] {
        [f(s[0], sa, d[0], da), f(s[1], sa, d[1], da), f(s[2], sa, d[2], da), a]
    };
    match mode {
        BlendMode::Multiply => sep(|s, sa, d, da| s * (1.0 - da) + d * (1.0 - sa) + s * d),
        BlendMode::Screen => std::array::from_fn(|c| s[c] + d[c] - s[c] * d[c]),
        BlendMode::Overlay => sep(overlay_component),
        BlendMode::HardLight => sep(|s, sa, d, da| overlay_component(d, da, s, sa)),
        BlendMode::Darken => sep(|s, sa, d, da| s + d - (s * da).max(d * sa)),
        BlendMode::Lighten => sep(|s, sa, d, da| s + d - (s * da).min(d * sa)),
        BlendMode::Difference => sep(|s, sa, d, da| s + d - 2.0 * (s * da).min(d * sa)),
        BlendMode::Exclusion => sep(|s, _, d, _| d + s - 2.0 * s * d),
        BlendMode::ColorDodge => sep(color_dodge_component),
        BlendMode::ColorBurn => sep(color_burn_component),
        BlendMode::SoftLight => {
            if da == 0.0 {
                s
            } else {
                sep(soft_light_component)
            }
        }
        BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => {
            non_separable(mode, s, d)
        }
        _ => s,
    }
}

fn overlay_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    let core = if 2.0 * d <= da {
        2.0 * s * d
    } else {
        sa * da - 2.0 * (da - d) * (sa - s)
    };
    core + s * (1.0 - da) + d * (1.0 - sa)
}

fn color_dodge_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if d == 0.0 {
        return s * (1.0 - da);
    }
    let delta = sa - s;
    if delta == 0.0 {
        return sa * da + s * (1.0 - da) + d * (1.0 - sa);
    }
    let delta = da.min(d * sa / delta);
    delta * sa + s * (1.0 - da) + d * (1.0 - sa)
}

fn color_burn_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if da == d {
        return sa * da + s * (1.0 - da) + d * (1.0 - sa);
    }
    if s == 0.0 {
        return d * (1.0 - sa);
    }
    let delta = (da - (da - d) * sa / s).max(0.0);
    delta * sa + s * (1.0 - da) + d * (1.0 - sa)
}

fn soft_light_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if 2.0 * s <= sa {
        d * d * (sa - 2.0 * s) / da + (1.0 - da) * s + d * (-sa + 2.0 * s + 1.0)
    } else if 4.0 * d <= da {
        let dsq = d * d;
        let dcub = dsq * d;
        let dasq = da * da;
        let dacub = dasq * da;
        (dasq * (s - d * (3.0 * sa - 6.0 * s - 1.0)) + 12.0 * da * dsq * (sa - 2.0 * s)
            - 16.0 * dcub * (sa - 2.0 * s)
            - dacub * s)
            / dasq
    } else {
        d * (sa - 2.0 * s + 1.0) + s - (da * d).sqrt() * (sa - 2.0 * s) - da * s
    }
}

type Rgb = [f32; 3];

fn luminance(c: Rgb) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn max3(c: Rgb) -> f32 {
    c[0].max(c[1]).max(c[2])
}

fn min3(c: Rgb) -> f32 {
    c[0].min(c[1]).min(c[2])
}

fn set_saturation(hue_lum: Rgb, sat: Rgb) -> Rgb {
    let (mn, mx) = (min3(hue_lum), max3(hue_lum));
    let s = max3(sat) - min3(sat);
    if mx > mn {
        hue_lum.map(|c| (c - mn) * s / (mx - mn))
    } else {
        [0.0; 3]
    }
}

fn set_luminance(hue_sat: Rgb, alpha: f32, lum_color: Rgb) -> Rgb {
    let lum = luminance(lum_color);
    let diff = lum - luminance(hue_sat);
    let mut out = hue_sat.map(|c| c + diff);
    let (mn, mx) = (min3(out), max3(out));
    if mn < 0.0 && lum != mn {
        out = out.map(|c| lum + (c - lum) * (lum / (lum - mn)));
    }
    if mx > alpha && mx != lum {
        out = out.map(|c| lum + (c - lum) * ((alpha - lum) / (mx - lum)));
    }
    out
}

fn non_separable(mode: BlendMode, s: [f32; 4], d: [f32; 4]) -> [f32; 4] {
    let (sa, da) = (s[3], d[3]);
    let alpha = sa * da;
    let sda: Rgb = [s[0] * da, s[1] * da, s[2] * da];
    let dsa: Rgb = [d[0] * sa, d[1] * sa, d[2] * sa];
    let mixed = match mode {
        BlendMode::Hue => set_luminance(set_saturation(sda, dsa), alpha, dsa),
        BlendMode::Saturation => set_luminance(set_saturation(dsa, sda), alpha, dsa),
        BlendMode::Color => set_luminance(sda, alpha, dsa),
        _ => set_luminance(dsa, alpha, sda),
    };
    let mut out = [0.0; 4];
    for c in 0..3 {
        out[c] = mixed[c] + d[c] - dsa[c] + s[c] - sda[c];
    }
    out[3] = sa + da - sa * da;
    out
}

const SEPARABLE_HELPERS: &str = r#"
fn src_over_alpha(s: vec4<f32>, d: vec4<f32>) -> f32 {
    return s.a + d.a - s.a * d.a;
}
"#;

const OVERLAY_HELPERS: &str = r#"
fn overlay_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    var core: f32;
    if (2.0 * d <= da) {
        core = 2.0 * s * d;
    } else {
        core = sa * da - 2.0 * (da - d) * (sa - s);
    }
    return core + s * (1.0 - da) + d * (1.0 - sa);
}
"#;

const NON_SEPARABLE_HELPERS: &str = r#"
fn luminance(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.3, 0.59, 0.11));
}

fn set_saturation(hue_lum: vec3<f32>, sat: vec3<f32>) -> vec3<f32> {
    let mn = min(min(hue_lum.r, hue_lum.g), hue_lum.b);
    let mx = max(max(hue_lum.r, hue_lum.g), hue_lum.b);
    let s = max(max(sat.r, sat.g), sat.b) - min(min(sat.r, sat.g), sat.b);
    if (mx > mn) {
        return (hue_lum - mn) * s / (mx - mn);
    }
    return vec3<f32>(0.0);
}

fn set_luminance(hue_sat: vec3<f32>, alpha: f32, lum_color: vec3<f32>) -> vec3<f32> {
    let lum = luminance(lum_color);
    var out = hue_sat + (lum - luminance(hue_sat));
    let mn = min(min(out.r, out.g), out.b);
    let mx = max(max(out.r, out.g), out.b);
    if (mn < 0.0 && lum != mn) {
        out = lum + (out - lum) * (lum / (lum - mn));
    }
    if (mx > alpha && mx != lum) {
        out = lum + (out - lum) * ((alpha - lum) / (mx - lum));
    }
    return out;
}
"#;

/// WGSL defining `blend_<name>(s, d) -> vec4<f32>` for a dst-read mode,
/// together with the helpers it calls.
pub(crate) fn wgsl_blend_function(mode: BlendMode) -> String {
    let name = mode.shader_name();
    if let Some(c) = mode.coefficients() {
        return format!(
            "\nfn blend_{name}(s: vec4<f32>, d: vec4<f32>) -> vec4<f32> {{\n    \
             return s * {} + d * {};\n}}\n",
            c.src.wgsl(),
            c.dst.wgsl()
        );
    }
    let body = match mode {
        BlendMode::Multiply => {
            "let rgb = s.rgb * (1.0 - d.a) + d.rgb * (1.0 - s.a) + s.rgb * d.rgb;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Screen => "return s + d - s * d;",
        BlendMode::Overlay => {
            "return vec4<f32>(overlay_component(s.r, s.a, d.r, d.a), \
             overlay_component(s.g, s.a, d.g, d.a), overlay_component(s.b, s.a, d.b, d.a), \
             src_over_alpha(s, d));"
        }
        BlendMode::HardLight => {
            "return vec4<f32>(overlay_component(d.r, d.a, s.r, s.a), \
             overlay_component(d.g, d.a, s.g, s.a), overlay_component(d.b, d.a, s.b, s.a), \
             src_over_alpha(s, d));"
        }
        BlendMode::Darken => {
            "let rgb = s.rgb + d.rgb - max(s.rgb * d.a, d.rgb * s.a);\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Lighten => {
            "let rgb = s.rgb + d.rgb - min(s.rgb * d.a, d.rgb * s.a);\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Difference => {
            "let rgb = s.rgb + d.rgb - 2.0 * min(s.rgb * d.a, d.rgb * s.a);\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Exclusion => {
            "let rgb = d.rgb + s.rgb - 2.0 * s.rgb * d.rgb;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::ColorDodge => {
            "return vec4<f32>(color_dodge_component(s.r, s.a, d.r, d.a), \
             color_dodge_component(s.g, s.a, d.g, d.a), color_dodge_component(s.b, s.a, d.b, d.a), \
             src_over_alpha(s, d));"
        }
        BlendMode::ColorBurn => {
            "return vec4<f32>(color_burn_component(s.r, s.a, d.r, d.a), \
             color_burn_component(s.g, s.a, d.g, d.a), color_burn_component(s.b, s.a, d.b, d.a), \
             src_over_alpha(s, d));"
        }
        BlendMode::SoftLight => {
            "if (d.a == 0.0) {\n        return s;\n    }\n    \
             return vec4<f32>(soft_light_component(s.r, s.a, d.r, d.a), \
             soft_light_component(s.g, s.a, d.g, d.a), soft_light_component(s.b, s.a, d.b, d.a), \
             src_over_alpha(s, d));"
        }
        BlendMode::Hue => {
            "let sda = s.rgb * d.a;\n    let dsa = d.rgb * s.a;\n    \
             let rgb = set_luminance(set_saturation(sda, dsa), s.a * d.a, dsa) \
             + d.rgb - dsa + s.rgb - sda;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Saturation => {
            "let sda = s.rgb * d.a;\n    let dsa = d.rgb * s.a;\n    \
             let rgb = set_luminance(set_saturation(dsa, sda), s.a * d.a, dsa) \
             + d.rgb - dsa + s.rgb - sda;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Color => {
            "let sda = s.rgb * d.a;\n    let dsa = d.rgb * s.a;\n    \
             let rgb = set_luminance(sda, s.a * d.a, dsa) + d.rgb - dsa + s.rgb - sda;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        BlendMode::Luminosity => {
            "let sda = s.rgb * d.a;\n    let dsa = d.rgb * s.a;\n    \
             let rgb = set_luminance(dsa, s.a * d.a, sda) + d.rgb - dsa + s.rgb - sda;\n    \
             return vec4<f32>(rgb, src_over_alpha(s, d));"
        }
        _ => "return s;",
    };

    let mut out = String::from(SEPARABLE_HELPERS);
    match mode {
        BlendMode::Overlay | BlendMode::HardLight => out.push_str(OVERLAY_HELPERS),
        BlendMode::ColorDodge => out.push_str(COLOR_DODGE_HELPER),
        BlendMode::ColorBurn => out.push_str(COLOR_BURN_HELPER),
        BlendMode::SoftLight => out.push_str(SOFT_LIGHT_HELPER),
        BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => {
            out.push_str(NON_SEPARABLE_HELPERS)
        }
        _ => {}
    }
    out.push_str(&format!(
        "\nfn blend_{name}(s: vec4<f32>, d: vec4<f32>) -> vec4<f32> {{\n    {body}\n}}\n"
    ));
    out
}

const COLOR_DODGE_HELPER: &str = r#"
fn color_dodge_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if (d == 0.0) {
        return s * (1.0 - da);
    }
    let delta = sa - s;
    if (delta == 0.0) {
        return sa * da + s * (1.0 - da) + d * (1.0 - sa);
    }
    let clamped = min(da, d * sa / delta);
    return clamped * sa + s * (1.0 - da) + d * (1.0 - sa);
}
"#;

const COLOR_BURN_HELPER: &str = r#"
fn color_burn_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if (da == d) {
        return sa * da + s * (1.0 - da) + d * (1.0 - sa);
    }
    if (s == 0.0) {
        return d * (1.0 - sa);
    }
    let delta = max(0.0, da - (da - d) * sa / s);
    return delta * sa + s * (1.0 - da) + d * (1.0 - sa);
}
"#;

const SOFT_LIGHT_HELPER: &str = r#"
fn soft_light_component(s: f32, sa: f32, d: f32, da: f32) -> f32 {
    if (2.0 * s <= sa) {
        return d * d * (sa - 2.0 * s) / da + (1.0 - da) * s + d * (-sa + 2.0 * s + 1.0);
    }
    if (4.0 * d <= da) {
        let dsq = d * d;
        let dcub = dsq * d;
        let dasq = da * da;
        let dacub = dasq * da;
        return (dasq * (s - d * (3.0 * sa - 6.0 * s - 1.0)) + 12.0 * da * dsq * (sa - 2.0 * s)
            - 16.0 * dcub * (sa - 2.0 * s) - dacub * s) / dasq;
    }
    return d * (sa - 2.0 * s + 1.0) + s - sqrt(da * d) * (sa - 2.0 * s) - da * s;
}
"#;
