/*!
 * PNG rendering for forecasts.
 *
 * Charts are drawn straight onto an RGB raster: a light grid, the interval
 * band, the forecast line and optionally the recent training history. There
 * is no text rendering; axes are implied by the grid.
 */

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use super::ModelError;
use crate::models::{ForecastPoint, Observation};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([228, 228, 228]);
const FRAME: Rgb<u8> = Rgb([120, 120, 120]);
const BAND: Rgb<u8> = Rgb([198, 219, 239]);
const FORECAST: Rgb<u8> = Rgb([31, 119, 180]);
const HISTORY: Rgb<u8> = Rgb([20, 20, 20]);
const BOUNDARY: Rgb<u8> = Rgb([214, 39, 40]);

const MARGIN: u32 = 40;
const GRID_LINES: u32 = 5;

/// Output raster dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSize {
    pub width: u32,
    pub height: u32,
}

impl PlotSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for PlotSize {
    fn default() -> Self {
        Self::new(1000, 600)
    }
}

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !min.is_finite() {
            return Range { min: 0.0, max: 1.0 };
        }
        let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
        Range {
            min: min - pad,
            max: max + pad,
        }
    }

    fn fraction(&self, v: f64) -> f64 {
        if self.max > self.min {
            (v - self.min) / (self.max - self.min)
        } else {
            0.5
        }
    }
}

/// A rectangular panel of the image with data ranges attached
struct Panel {
    left: i64,
    top: i64,
    width: i64,
    height: i64,
    x: Range,
    y: Range,
}

impl Panel {
    fn px(&self, x: f64) -> i64 {
        self.left + (self.x.fraction(x) * (self.width - 1) as f64).round() as i64
    }

    fn py(&self, y: f64) -> i64 {
        self.top + self.height - 1 - (self.y.fraction(y) * (self.height - 1) as f64).round() as i64
    }
}

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    fn new(size: PlotSize) -> Self {
        Self {
            image: RgbImage::from_pixel(size.width.max(1), size.height.max(1), BACKGROUND),
        }
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height()
        {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line, two pixels thick
    fn line(&mut self, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x0, y0, color);
            self.put(x0, y0 + 1, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn vline(&mut self, x: i64, y0: i64, y1: i64, color: Rgb<u8>) {
        for y in y0.min(y1)..=y0.max(y1) {
            self.put(x, y, color);
        }
    }

    fn hline(&mut self, y: i64, x0: i64, x1: i64, color: Rgb<u8>) {
        for x in x0.min(x1)..=x0.max(x1) {
            self.put(x, y, color);
        }
    }

    fn frame(&mut self, panel: &Panel) {
        let right = panel.left + panel.width - 1;
        let bottom = panel.top + panel.height - 1;
        for i in 1..GRID_LINES {
            let gx = panel.left + panel.width * i as i64 / GRID_LINES as i64;
            let gy = panel.top + panel.height * i as i64 / GRID_LINES as i64;
            self.vline(gx, panel.top, bottom, GRID);
            self.hline(gy, panel.left, right, GRID);
        }
        self.hline(panel.top, panel.left, right, FRAME);
        self.hline(bottom, panel.left, right, FRAME);
        self.vline(panel.left, panel.top, bottom, FRAME);
        self.vline(right, panel.top, bottom, FRAME);
    }

    fn polyline(&mut self, panel: &Panel, points: &[(f64, f64)], color: Rgb<u8>) {
        let pixels: Vec<(i64, i64)> = points
            .iter()
            .filter(|(_, y)| y.is_finite())
            .map(|&(x, y)| (panel.px(x), panel.py(y)))
            .collect();
        match pixels.as_slice() {
            [] => {}
            [single] => self.line(*single, *single, color),
            _ => {
                for pair in pixels.windows(2) {
                    self.line(pair[0], pair[1], color);
                }
            }
        }
    }

    /// Fills between `lower` and `upper`, interpolating between samples
    fn band(&mut self, panel: &Panel, samples: &[(f64, f64, f64)], color: Rgb<u8>) {
        for pair in samples.windows(2) {
            let (xa, la, ua) = pair[0];
            let (xb, lb, ub) = pair[1];
            let (pa, pb) = (panel.px(xa), panel.px(xb));
            for px in pa..=pb {
                let t = if pb > pa {
                    (px - pa) as f64 / (pb - pa) as f64
                } else {
                    0.0
                };
                let lo = la + (lb - la) * t;
                let hi = ua + (ub - ua) * t;
                self.vline(px, panel.py(lo), panel.py(hi), color);
            }
        }
        if let [(x, lo, hi)] = samples {
            self.vline(panel.px(*x), panel.py(*lo), panel.py(*hi), color);
        }
    }

    fn encode(self) -> Result<Vec<u8>, ModelError> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(self.image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| ModelError::Render(e.to_string()))?;
        Ok(bytes)
    }
}

fn seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64
}

fn full_panel(size: PlotSize, x: Range, y: Range) -> Panel {
    let margin = MARGIN.min(size.width / 4).min(size.height / 4) as i64;
    Panel {
        left: margin,
        top: margin,
        width: (size.width as i64 - 2 * margin).max(1),
        height: (size.height as i64 - 2 * margin).max(1),
        x,
        y,
    }
}

/// Renders the forecast with its interval band and, when given, the history tail.
pub fn render_forecast(
    history: Option<&[Observation]>,
    forecast: &[ForecastPoint],
    size: PlotSize,
) -> Result<Vec<u8>, ModelError> {
    let history = history.unwrap_or(&[]);

    let x = Range::from_values(
        history
            .iter()
            .map(|o| seconds(o.ds))
            .chain(forecast.iter().map(|p| seconds(p.ds))),
    );
    let y = Range::from_values(
        history.iter().map(|o| o.y).chain(
            forecast
                .iter()
                .flat_map(|p| [p.yhat_lower, p.yhat_upper, p.yhat]),
        ),
    );
    let panel = full_panel(size, x, y);

    let mut canvas = Canvas::new(size);
    canvas.frame(&panel);

    let band: Vec<(f64, f64, f64)> = forecast
        .iter()
        .map(|p| (seconds(p.ds), p.yhat_lower, p.yhat_upper))
        .collect();
    canvas.band(&panel, &band, BAND);

    if !history.is_empty() {
        let actual: Vec<(f64, f64)> = history.iter().map(|o| (seconds(o.ds), o.y)).collect();
        canvas.polyline(&panel, &actual, HISTORY);
        if let Some(first) = forecast.first() {
            let edge = panel.px(seconds(first.ds));
            canvas.vline(edge, panel.top, panel.top + panel.height - 1, BOUNDARY);
        }
    }

    let line: Vec<(f64, f64)> = forecast.iter().map(|p| (seconds(p.ds), p.yhat)).collect();
    canvas.polyline(&panel, &line, FORECAST);

    canvas.encode()
}

/// Renders one stacked panel per additive component: trend, daily, weekly, yearly.
pub fn render_components(points: &[ForecastPoint], size: PlotSize) -> Result<Vec<u8>, ModelError> {
    let extractors: [fn(&ForecastPoint) -> f64; 4] = [
        |p| p.trend,
        |p| p.season_daily,
        |p| p.season_weekly,
        |p| p.season_yearly,
    ];

    let x = Range::from_values(points.iter().map(|p| seconds(p.ds)));
    let margin = MARGIN.min(size.width / 4).min(size.height / 8) as i64;
    let panel_count = extractors.len() as i64;
    let usable = (size.height as i64 - margin * (panel_count + 1)).max(panel_count);
    let panel_height = (usable / panel_count).max(1);

    let mut canvas = Canvas::new(size);
    for (i, extract) in extractors.iter().enumerate() {
        let panel = Panel {
            left: margin,
            top: margin + i as i64 * (panel_height + margin),
            width: (size.width as i64 - 2 * margin).max(1),
            height: panel_height,
            x,
            y: Range::from_values(points.iter().map(extract)),
        };
        canvas.frame(&panel);
        let series: Vec<(f64, f64)> = points.iter().map(|p| (seconds(p.ds), extract(p))).collect();
        canvas.polyline(&panel, &series, FORECAST);
    }

    canvas.encode()
}
