//! Multi-panel SVG figures.
//!
//! A [`Figure`] stacks [`Panel`]s vertically or side by side. Each panel owns
//! its data bounds, axes, series, station markers and an optional colour bar.

use super::colormap::{Colormap, Rgb};
use crate::error::{Result, WorkflowError};
use chrono::{DateTime, NaiveDateTime};
use std::{fs, path::Path};

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 70.0;
const COLOR_BAR_SPACE: f64 = 100.0;
const HEADER_HEIGHT: f64 = 70.0;
const TARGET_TICKS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Linear,
    /// Values are days since the Unix epoch, ticks print as `YYYY-MM-DD`.
    Date,
}

/// Days since the Unix epoch, the x coordinate used on date axes.
pub fn date_to_axis(date: NaiveDateTime) -> f64 {
    date.and_utc().timestamp() as f64 / 86_400.0
}

fn axis_to_date_label(value: f64) -> String {
    DateTime::from_timestamp((value * 86_400.0).round() as i64, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum Series {
    Points {
        xs: Vec<f64>,
        ys: Vec<f64>,
        color: Rgb,
        label: Option<String>,
        radius: f64,
    },
    Line {
        xs: Vec<f64>,
        ys: Vec<f64>,
        color: Rgb,
        label: Option<String>,
        width: f64,
    },
    ColorMapped {
        xs: Vec<f64>,
        ys: Vec<f64>,
        values: Vec<f64>,
        colormap: Colormap,
        range: (f64, f64),
        radius: f64,
        opacity: f64,
    },
}

impl Series {
    fn coordinates(&self) -> (&[f64], &[f64]) {
        match self {
            Series::Points { xs, ys, .. }
            | Series::Line { xs, ys, .. }
            | Series::ColorMapped { xs, ys, .. } => (xs.as_slice(), ys.as_slice()),
        }
    }

    fn legend(&self) -> Option<(&str, Rgb, bool)> {
        match self {
            Series::Points {
                label: Some(l),
                color,
                ..
            } => Some((l.as_str(), *color, false)),
            Series::Line {
                label: Some(l),
                color,
                ..
            } => Some((l.as_str(), *color, true)),
            _ => None,
        }
    }
}

/// Triangle marker with a haloed text label.
#[derive(Debug, Clone)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ColorBar {
    pub colormap: Colormap,
    pub range: (f64, f64),
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_axis: AxisKind,
    pub equal_aspect: bool,
    pub series: Vec<Series>,
    pub markers: Vec<Marker>,
    pub color_bar: Option<ColorBar>,
}

impl Panel {
    pub fn new(title: impl Into<String>) -> Self {
        Panel {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            x_axis: AxisKind::Linear,
            equal_aspect: false,
            series: Vec::new(),
            markers: Vec::new(),
            color_bar: None,
        }
    }

    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn date_axis(mut self) -> Self {
        self.x_axis = AxisKind::Date;
        self
    }

    pub fn equal_aspect(mut self) -> Self {
        self.equal_aspect = true;
        self
    }

    pub fn push(&mut self, series: Series) {
        self.series.push(series);
    }

    fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        let mut include = |x: f64, y: f64| {
            if !x.is_finite() || !y.is_finite() {
                return;
            }
            bounds = Some(match bounds {
                None => Bounds {
                    x_min: x,
                    x_max: x,
                    y_min: y,
                    y_max: y,
                },
                Some(b) => Bounds {
                    x_min: b.x_min.min(x),
                    x_max: b.x_max.max(x),
                    y_min: b.y_min.min(y),
                    y_max: b.y_max.max(y),
                },
            });
        };
        for series in &self.series {
            let (xs, ys) = series.coordinates();
            for (x, y) in xs.iter().zip(ys.iter()) {
                include(*x, *y);
            }
        }
        for marker in &self.markers {
            include(marker.x, marker.y);
        }
        bounds.map(Bounds::padded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Bounds {
    fn padded(self) -> Bounds {
        let pad = |lo: f64, hi: f64| {
            let span = hi - lo;
            if span <= 0.0 {
                let delta = if lo == 0.0 { 1.0 } else { lo.abs() * 0.05 };
                (lo - delta, hi + delta)
            } else {
                (lo - span * 0.05, hi + span * 0.05)
            }
        };
        let (x_min, x_max) = pad(self.x_min, self.x_max);
        let (y_min, y_max) = pad(self.y_min, self.y_max);
        Bounds {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Widens one axis so both use the same units per pixel.
    fn with_equal_aspect(self, width: f64, height: f64) -> Bounds {
        let x_scale = (self.x_max - self.x_min) / width;
        let y_scale = (self.y_max - self.y_min) / height;
        let mut b = self;
        if x_scale > y_scale {
            let extra = (x_scale * height - (b.y_max - b.y_min)) / 2.0;
            b.y_min -= extra;
            b.y_max += extra;
        } else {
            let extra = (y_scale * width - (b.x_max - b.x_min)) / 2.0;
            b.x_min -= extra;
            b.x_max += extra;
        }
        b
    }
}

/// Evenly spaced "nice" tick values (1, 2 or 5 times a power of ten).
pub fn nice_ticks(min: f64, max: f64, target: usize) -> Vec<f64> {
    if !(min.is_finite() && max.is_finite()) || max <= min || target == 0 {
        return Vec::new();
    }
    let raw = (max - min) / target as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);

    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last).map(|i| i as f64 * step).collect()
}

fn format_tick(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if magnitude >= 1e5 || magnitude < 1e-3 {
        format!("{value:.1e}")
    } else if magnitude >= 100.0 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.3}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A complete figure with an optional title and subtitle.
#[derive(Debug, Clone)]
pub struct Figure {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub layout: Layout,
    pub panel_width: f64,
    pub panel_height: f64,
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn new(layout: Layout, panel_width: f64, panel_height: f64) -> Self {
        Figure {
            title: None,
            subtitle: None,
            layout,
            panel_width,
            panel_height,
            panels: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn add_panel(&mut self, panel: Panel) {
        self.panels.push(panel);
    }

    fn header_height(&self) -> f64 {
        if self.title.is_some() || self.subtitle.is_some() {
            HEADER_HEIGHT
        } else {
            0.0
        }
    }

    fn size(&self) -> (f64, f64) {
        let n = self.panels.len().max(1) as f64;
        match self.layout {
            Layout::Vertical => (self.panel_width, self.panel_height * n + self.header_height()),
            Layout::Horizontal => (self.panel_width * n, self.panel_height + self.header_height()),
        }
    }

    /// Renders the figure as an SVG document.
    pub fn render(&self) -> String {
        let (width, height) = self.size();
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}" font-family="sans-serif">"#
        );
        svg.push('\n');
        svg.push_str(&format!(
            r#"<rect width="{width:.0}" height="{height:.0}" fill="white"/>"#
        ));
        svg.push('\n');

        if let Some(title) = &self.title {
            svg.push_str(&format!(
                r#"<text x="{:.1}" y="30" font-size="20" text-anchor="middle">{}</text>"#,
                width / 2.0,
                escape(title)
            ));
            svg.push('\n');
        }
        if let Some(subtitle) = &self.subtitle {
            svg.push_str(&format!(
                r#"<text x="{:.1}" y="55" font-size="12" text-anchor="middle">{}</text>"#,
                width / 2.0,
                escape(subtitle)
            ));
            svg.push('\n');
        }

        let header = self.header_height();
        for (i, panel) in self.panels.iter().enumerate() {
            let (ox, oy) = match self.layout {
                Layout::Vertical => (0.0, header + i as f64 * self.panel_height),
                Layout::Horizontal => (i as f64 * self.panel_width, header),
            };
            render_panel(&mut svg, panel, ox, oy, self.panel_width, self.panel_height);
        }

        svg.push_str("</svg>\n");
        svg
    }

    /// Writes the figure to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
        }
        fs::write(path, self.render()).map_err(|e| WorkflowError::io(path, e))
    }
}

struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    bounds: Bounds,
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        self.left + (x - self.bounds.x_min) / (self.bounds.x_max - self.bounds.x_min) * self.width
    }

    fn py(&self, y: f64) -> f64 {
        self.top + self.height
            - (y - self.bounds.y_min) / (self.bounds.y_max - self.bounds.y_min) * self.height
    }
}

fn render_panel(svg: &mut String, panel: &Panel, ox: f64, oy: f64, width: f64, height: f64) {
    let right = MARGIN_RIGHT + if panel.color_bar.is_some() { COLOR_BAR_SPACE } else { 0.0 };
    let plot_width = (width - MARGIN_LEFT - right).max(10.0);
    let plot_height = (height - MARGIN_TOP - MARGIN_BOTTOM).max(10.0);

    let mut bounds = panel.bounds().unwrap_or(Bounds {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
    });
    if panel.equal_aspect {
        bounds = bounds.with_equal_aspect(plot_width, plot_height);
    }
    let frame = Frame {
        left: ox + MARGIN_LEFT,
        top: oy + MARGIN_TOP,
        width: plot_width,
        height: plot_height,
        bounds,
    };

    svg.push_str(&format!(
        r#"<text x="{:.1}" y="{:.1}" font-size="15" text-anchor="middle">{}</text>"#,
        frame.left + plot_width / 2.0,
        oy + MARGIN_TOP - 12.0,
        escape(&panel.title)
    ));
    svg.push('\n');

    render_axes(svg, panel, &frame);

    svg.push_str(&format!(
        r#"<clipPath id="clip-{ox:.0}-{oy:.0}"><rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}"/></clipPath>"#,
        frame.left, frame.top, plot_width, plot_height
    ));
    svg.push_str(&format!(r#"<g clip-path="url(#clip-{ox:.0}-{oy:.0})">"#));
    svg.push('\n');
    for series in &panel.series {
        render_series(svg, series, &frame);
    }
    for marker in &panel.markers {
        render_marker(svg, marker, &frame);
    }
    svg.push_str("</g>\n");

    render_legend(svg, panel, &frame);
    if let Some(bar) = &panel.color_bar {
        render_color_bar(svg, bar, &frame);
    }
}

fn render_axes(svg: &mut String, panel: &Panel, frame: &Frame) {
    let bottom = frame.top + frame.height;
    let b = frame.bounds;

    for x in nice_ticks(b.x_min, b.x_max, TARGET_TICKS) {
        let px = frame.px(x);
        let label = match panel.x_axis {
            AxisKind::Linear => format_tick(x),
            AxisKind::Date => axis_to_date_label(x),
        };
        svg.push_str(&format!(
            r#"<line x1="{px:.1}" y1="{:.1}" x2="{px:.1}" y2="{bottom:.1}" stroke="{}" stroke-width="0.5"/>"#,
            frame.top,
            Rgb::GRID.hex()
        ));
        let text = match panel.x_axis {
            AxisKind::Linear => format!(
                r#"<text x="{px:.1}" y="{:.1}" font-size="11" text-anchor="middle">{label}</text>"#,
                bottom + 16.0
            ),
            AxisKind::Date => format!(
                r#"<text x="{px:.1}" y="{:.1}" font-size="11" text-anchor="end" transform="rotate(-45 {px:.1} {:.1})">{label}</text>"#,
                bottom + 14.0,
                bottom + 14.0
            ),
        };
        svg.push_str(&text);
        svg.push('\n');
    }

    for y in nice_ticks(b.y_min, b.y_max, TARGET_TICKS) {
        let py = frame.py(y);
        svg.push_str(&format!(
            r#"<line x1="{:.1}" y1="{py:.1}" x2="{:.1}" y2="{py:.1}" stroke="{}" stroke-width="0.5"/>"#,
            frame.left,
            frame.left + frame.width,
            Rgb::GRID.hex()
        ));
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{}</text>"#,
            frame.left - 6.0,
            py + 4.0,
            format_tick(y)
        ));
        svg.push('\n');
    }

    svg.push_str(&format!(
        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black"/>"#,
        frame.left, frame.top, frame.width, frame.height
    ));
    svg.push('\n');

    if !panel.x_label.is_empty() {
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="13" text-anchor="middle">{}</text>"#,
            frame.left + frame.width / 2.0,
            bottom + MARGIN_BOTTOM - 8.0,
            escape(&panel.x_label)
        ));
        svg.push('\n');
    }
    if !panel.y_label.is_empty() {
        let x = frame.left - MARGIN_LEFT + 18.0;
        let y = frame.top + frame.height / 2.0;
        svg.push_str(&format!(
            r#"<text x="{x:.1}" y="{y:.1}" font-size="13" text-anchor="middle" transform="rotate(-90 {x:.1} {y:.1})">{}</text>"#,
            escape(&panel.y_label)
        ));
        svg.push('\n');
    }
}

fn render_series(svg: &mut String, series: &Series, frame: &Frame) {
    match series {
        Series::Points {
            xs,
            ys,
            color,
            radius,
            ..
        } => {
            let fill = color.hex();
            for (x, y) in xs.iter().zip(ys.iter()) {
                if x.is_finite() && y.is_finite() {
                    svg.push_str(&format!(
                        r#"<circle cx="{:.1}" cy="{:.1}" r="{radius}" fill="{fill}"/>"#,
                        frame.px(*x),
                        frame.py(*y)
                    ));
                }
            }
            svg.push('\n');
        }
        Series::Line {
            xs,
            ys,
            color,
            width,
            ..
        } => {
            let points: Vec<String> = xs
                .iter()
                .zip(ys.iter())
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(x, y)| format!("{:.1},{:.1}", frame.px(*x), frame.py(*y)))
                .collect();
            if points.len() >= 2 {
                svg.push_str(&format!(
                    r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{width}"/>"#,
                    points.join(" "),
                    color.hex()
                ));
                svg.push('\n');
            }
        }
        Series::ColorMapped {
            xs,
            ys,
            values,
            colormap,
            range,
            radius,
            opacity,
        } => {
            for ((x, y), v) in xs.iter().zip(ys.iter()).zip(values.iter()) {
                if x.is_finite() && y.is_finite() && v.is_finite() {
                    svg.push_str(&format!(
                        r#"<circle cx="{:.1}" cy="{:.1}" r="{radius}" fill="{}" fill-opacity="{opacity}"/>"#,
                        frame.px(*x),
                        frame.py(*y),
                        colormap.map(*v, range.0, range.1).hex()
                    ));
                }
            }
            svg.push('\n');
        }
    }
}

fn render_marker(svg: &mut String, marker: &Marker, frame: &Frame) {
    let x = frame.px(marker.x);
    let y = frame.py(marker.y);
    svg.push_str(&format!(
        r#"<polygon points="{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}" fill="black" stroke="white" stroke-width="1"/>"#,
        x,
        y - 7.0,
        x - 6.0,
        y + 5.0,
        x + 6.0,
        y + 5.0
    ));
    // Label with a white halo.
    svg.push_str(&format!(
        r#"<text x="{:.1}" y="{:.1}" font-size="10" stroke="white" stroke-width="2" paint-order="stroke" fill="black">{}</text>"#,
        x + 7.0,
        y - 7.0,
        escape(&marker.label)
    ));
    svg.push('\n');
}

fn render_legend(svg: &mut String, panel: &Panel, frame: &Frame) {
    let entries: Vec<(&str, Rgb, bool)> = panel.series.iter().filter_map(Series::legend).collect();
    if entries.is_empty() {
        return;
    }
    let longest = entries.iter().map(|(l, _, _)| l.len()).max().unwrap_or(0);
    let box_width = 40.0 + longest as f64 * 6.5;
    let box_height = 8.0 + entries.len() as f64 * 18.0;
    let left = frame.left + 8.0;
    let top = frame.top + 8.0;
    svg.push_str(&format!(
        r#"<rect x="{left:.1}" y="{top:.1}" width="{box_width:.1}" height="{box_height:.1}" fill="white" fill-opacity="0.8" stroke="{}"/>"#,
        Rgb::GRID.hex()
    ));
    for (i, (label, color, is_line)) in entries.iter().enumerate() {
        let y = top + 16.0 + i as f64 * 18.0;
        if *is_line {
            svg.push_str(&format!(
                r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{}" stroke-width="2.5"/>"#,
                left + 6.0,
                left + 26.0,
                color.hex()
            ));
        } else {
            svg.push_str(&format!(
                r#"<circle cx="{:.1}" cy="{y:.1}" r="3" fill="{}"/>"#,
                left + 16.0,
                color.hex()
            ));
        }
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="11">{}</text>"#,
            left + 32.0,
            y + 4.0,
            escape(label)
        ));
    }
    svg.push('\n');
}

fn render_color_bar(svg: &mut String, bar: &ColorBar, frame: &Frame) {
    const STEPS: usize = 50;
    let left = frame.left + frame.width + 20.0;
    let bar_width = 16.0;
    let step_height = frame.height / STEPS as f64;
    for i in 0..STEPS {
        // Top of the bar holds the maximum.
        let t = 1.0 - (i as f64 + 0.5) / STEPS as f64;
        svg.push_str(&format!(
            r#"<rect x="{left:.1}" y="{:.2}" width="{bar_width}" height="{:.2}" fill="{}"/>"#,
            frame.top + i as f64 * step_height,
            step_height + 0.5,
            bar.colormap.at(t).hex()
        ));
    }
    svg.push_str(&format!(
        r#"<rect x="{left:.1}" y="{:.1}" width="{bar_width}" height="{:.1}" fill="none" stroke="black"/>"#,
        frame.top, frame.height
    ));

    let (min, max) = bar.range;
    for value in nice_ticks(min, max, 5) {
        let y = frame.top + frame.height - (value - min) / (max - min) * frame.height;
        svg.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="10">{}</text>"#,
            left + bar_width + 4.0,
            y + 3.0,
            format_tick(value)
        ));
    }

    let x = left + bar_width + 60.0;
    let y = frame.top + frame.height / 2.0;
    svg.push_str(&format!(
        r#"<text x="{x:.1}" y="{y:.1}" font-size="12" text-anchor="middle" transform="rotate(-90 {x:.1} {y:.1})">{}</text>"#,
        escape(&bar.label)
    ));
    svg.push('\n');
}
