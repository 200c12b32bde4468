//! Latency bar-chart geometry, plus a minimal SVG rendering of it.

use crate::ReportRow;
use pulse_core::{mean_ms, Outcome};
use serde::Serialize;
use std::fmt::Write as _;

const BASE_WIDTH: i64 = 720;
const HEIGHT: i64 = 220;
const MARGIN_LEFT: i64 = 48;
const MARGIN_RIGHT: i64 = 12;
const MARGIN_TOP: i64 = 12;
const MARGIN_BOTTOM: i64 = 28;
const GAP: i64 = 8;
const MIN_BAR_WIDTH: i64 = 3;

const GREEN: &str = "#198754";
const RED: &str = "#dc3545";
const GRAY: &str = "#6c757d";

/// One bar's worth of input: a report row or a single round's sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartEntry {
    pub label: Option<String>,
    /// `None` when nothing was measured (skipped or missing result).
    pub elapsed_ms: Option<u64>,
    pub outcome: Outcome,
}

impl From<&ReportRow> for ChartEntry {
    fn from(row: &ReportRow) -> Self {
        ChartEntry {
            label: Some(row.name.clone()).filter(|n| !n.is_empty()),
            elapsed_ms: row.probe.as_ref().map(|p| p.elapsed_ms),
            outcome: row.outcome(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub color: &'static str,
    pub label: String,
    pub ms: u64,
    pub xlabel: String,
    pub show_xlabel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YTick {
    pub y: i64,
    pub ms: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartModel {
    pub count_total: usize,
    pub count_measured: usize,
    pub avg_ms: Option<u64>,
    pub width: i64,
    pub height: i64,
    pub series: Vec<Bar>,
    pub y_ticks: Vec<YTick>,
    /// Axis maximum; a multiple of the tick step, never 0.
    pub max_ms: u64,
    pub margin_left: i64,
    pub margin_right: i64,
    pub margin_top: i64,
    pub margin_bottom: i64,
    pub plot_w: i64,
    pub plot_h: i64,
    pub baseline_y: i64,
    pub avg_y: Option<i64>,
    pub x_step: usize,
}

/// Step from the 1-2-5 progression that covers `raw`.
fn nice_step(raw: f64) -> u64 {
    if raw <= 0.0 {
        return 1;
    }
    let exp = raw.log10().floor() as i32;
    let magnitude = 10f64.powi(exp);
    let base = raw / magnitude;
    let nice = if base <= 1.0 {
        1.0
    } else if base <= 2.0 {
        2.0
    } else if base <= 5.0 {
        5.0
    } else {
        10.0
    };
    ((nice * magnitude) as u64).max(1)
}

fn x_label_step(bars: usize) -> usize {
    match bars {
        0..=20 => 1,
        21..=100 => 10,
        101..=250 => 25,
        251..=500 => 50,
        _ => 100,
    }
}

fn color_for(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => GREEN,
        Outcome::Failure => RED,
        Outcome::Skipped | Outcome::Unknown => GRAY,
    }
}

/// Lay out one bar per entry. Pure; an empty input still yields a usable axis.
pub fn build_chart(entries: &[ChartEntry]) -> ChartModel {
    let measured: Vec<u64> = entries.iter().filter_map(|e| e.elapsed_ms).collect();
    let total: u128 = measured.iter().map(|&ms| u128::from(ms)).sum();
    let avg_ms = mean_ms(total, measured.len() as u64);
    let dmax = measured.iter().copied().max().unwrap_or(0).max(1);

    let rough_max = dmax.div_ceil(10) * 10;
    let step = nice_step(rough_max as f64 / 5.0);
    let max_ms = dmax.div_ceil(step) * step;

    let n = entries.len().max(1) as i64;
    let required_plot_w = (n + 1) * GAP + n * MIN_BAR_WIDTH;
    let width = BASE_WIDTH.max(MARGIN_LEFT + required_plot_w + MARGIN_RIGHT);
    let plot_w = (width - MARGIN_LEFT - MARGIN_RIGHT).max(1);
    let plot_h = (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM).max(1);
    let bar_width = MIN_BAR_WIDTH.max((plot_w - (n + 1) * GAP) / n);
    let baseline_y = MARGIN_TOP + plot_h;

    let y_for = |ms: u64| -> i64 {
        let frac = (ms as f64 / max_ms as f64).clamp(0.0, 1.0);
        MARGIN_TOP + ((1.0 - frac) * plot_h as f64).round() as i64
    };

    let x_step = x_label_step(n as usize);
    let series = entries
        .iter()
        .enumerate()
        .map(|(idx, e)| {
            let ms = e.elapsed_ms.unwrap_or(0);
            let y = y_for(ms);
            let index1 = idx + 1;
            Bar {
                x: MARGIN_LEFT + GAP + idx as i64 * (bar_width + GAP),
                y,
                width: bar_width,
                height: baseline_y - y,
                color: color_for(e.outcome),
                label: e.label.clone().unwrap_or_else(|| index1.to_string()),
                ms,
                xlabel: index1.to_string(),
                show_xlabel: index1 == 1 || index1 as i64 == n || index1 % x_step == 0,
            }
        })
        .collect();

    let y_ticks = (0..=max_ms)
        .step_by(step as usize)
        .map(|tick| YTick { y: y_for(tick), ms: tick, label: format!("{} ms", tick) })
        .collect();

    ChartModel {
        count_total: entries.len(),
        count_measured: measured.len(),
        avg_ms,
        width,
        height: HEIGHT,
        series,
        y_ticks,
        max_ms,
        margin_left: MARGIN_LEFT,
        margin_right: MARGIN_RIGHT,
        margin_top: MARGIN_TOP,
        margin_bottom: MARGIN_BOTTOM,
        plot_w,
        plot_h,
        baseline_y,
        avg_y: avg_ms.map(y_for),
        x_step,
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

impl ChartModel {
    /// Standalone SVG document for the chart.
    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        let right = self.margin_left + self.plot_w;
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="10">"#,
            w = self.width,
            h = self.height
        );
        for t in &self.y_ticks {
            let _ = writeln!(
                out,
                r##"<line x1="{l}" y1="{y}" x2="{r}" y2="{y}" stroke="#dee2e6"/><text x="{tx}" y="{ty}" text-anchor="end">{label}</text>"##,
                l = self.margin_left,
                r = right,
                y = t.y,
                tx = self.margin_left - 4,
                ty = t.y + 3,
                label = escape(&t.label)
            );
        }
        for b in &self.series {
            let _ = writeln!(
                out,
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"><title>{}: {} ms</title></rect>"#,
                b.x,
                b.y,
                b.width,
                b.height,
                b.color,
                escape(&b.label),
                b.ms
            );
            if b.show_xlabel {
                let _ = writeln!(
                    out,
                    r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
                    b.x + b.width / 2,
                    self.baseline_y + 14,
                    b.xlabel
                );
            }
        }
        let _ = writeln!(
            out,
            r##"<line x1="{l}" y1="{y}" x2="{r}" y2="{y}" stroke="#212529"/>"##,
            l = self.margin_left,
            r = right,
            y = self.baseline_y
        );
        if let Some(avg_y) = self.avg_y {
            let _ = writeln!(
                out,
                r##"<line x1="{l}" y1="{y}" x2="{r}" y2="{y}" stroke="#0d6efd" stroke-dasharray="4 3"/>"##,
                l = self.margin_left,
                r = right,
                y = avg_y
            );
        }
        out.push_str("</svg>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ms: Option<u64>, outcome: Outcome) -> ChartEntry {
        ChartEntry { label: None, elapsed_ms: ms, outcome }
    }

    #[test]
    fn mixed_rows() {
        let chart = build_chart(&[
            entry(Some(100), Outcome::Success),
            entry(Some(200), Outcome::Failure),
            entry(Some(300), Outcome::Success),
            entry(None, Outcome::Skipped),
        ]);
        assert_eq!(chart.count_total, 4);
        assert_eq!(chart.count_measured, 3);
        assert_eq!(chart.avg_ms, Some(200));
        assert_eq!(chart.max_ms, 300);
        assert_eq!(chart.plot_h, 180);
        assert_eq!(chart.baseline_y, 192);
        assert_eq!(chart.avg_y, Some(72));

        let ticks: Vec<u64> = chart.y_ticks.iter().map(|t| t.ms).collect();
        assert_eq!(ticks, vec![0, 100, 200, 300]);
        assert_eq!(chart.y_ticks[3].label, "300 ms");
        assert_eq!(chart.y_ticks[3].y, 12);

        let first = &chart.series[0];
        assert_eq!((first.x, first.y, first.width, first.height), (56, 132, 155, 60));
        assert_eq!(first.color, "#198754");
        assert_eq!(first.label, "1");
        assert_eq!(chart.series[1].color, "#dc3545");
        assert_eq!(chart.series[1].x, 56 + 163);
        let skipped = &chart.series[3];
        assert_eq!((skipped.ms, skipped.height, skipped.color), (0, 0, "#6c757d"));
    }

    #[test]
    fn average_ties_round_to_even() {
        let chart = build_chart(&[entry(Some(1), Outcome::Success), entry(Some(4), Outcome::Success)]);
        assert_eq!(chart.avg_ms, Some(2));
        let chart = build_chart(&[entry(Some(3), Outcome::Success), entry(Some(4), Outcome::Failure)]);
        assert_eq!(chart.avg_ms, Some(4));
    }

    #[test]
    fn empty_input_has_nonzero_axis() {
        let chart = build_chart(&[]);
        assert_eq!(chart.count_total, 0);
        assert_eq!(chart.count_measured, 0);
        assert_eq!(chart.avg_ms, None);
        assert_eq!(chart.avg_y, None);
        assert!(chart.max_ms > 0);
        assert_eq!(chart.width, 720);
        assert!(chart.series.is_empty());
        assert_eq!(chart.y_ticks.first().map(|t| t.ms), Some(0));
    }

    #[test]
    fn all_unmeasured_is_safe() {
        let chart = build_chart(&[entry(None, Outcome::Skipped), entry(None, Outcome::Unknown)]);
        assert_eq!(chart.count_measured, 0);
        assert!(chart.max_ms > 0);
        assert!(chart.series.iter().all(|b| b.height == 0));
    }

    #[test]
    fn nice_steps() {
        assert_eq!(nice_step(2.0), 2);
        assert_eq!(nice_step(60.0), 100);
        assert_eq!(nice_step(4.0), 5);
        assert_eq!(nice_step(10.0), 10);
        assert_eq!(nice_step(0.0), 1);
        let chart = build_chart(&[entry(Some(37), Outcome::Success)]);
        assert_eq!(chart.max_ms, 40);
        assert_eq!(chart.y_ticks.len(), 5);
    }

    #[test]
    fn wide_series_grows_width() {
        let many: Vec<ChartEntry> = (0..200).map(|_| entry(Some(1), Outcome::Success)).collect();
        let chart = build_chart(&many);
        assert_eq!(chart.width, 48 + 201 * 8 + 200 * 3 + 12);
        assert!(chart.series.iter().all(|b| b.width >= 3));
        assert_eq!(chart.x_step, 25);
    }

    #[test]
    fn x_labels_follow_step() {
        let many: Vec<ChartEntry> = (0..55).map(|i| entry(Some(i % 50 + 1), Outcome::Success)).collect();
        let chart = build_chart(&many);
        assert_eq!(chart.x_step, 10);
        let shown: Vec<&str> = chart.series.iter().filter(|b| b.show_xlabel).map(|b| b.xlabel.as_str()).collect();
        assert_eq!(shown, vec!["1", "10", "20", "30", "40", "50", "55"]);
        assert_eq!(x_label_step(20), 1);
        assert_eq!(x_label_step(300), 50);
        assert_eq!(x_label_step(600), 100);
    }

    #[test]
    fn svg_escapes_labels() {
        let chart = build_chart(&[ChartEntry { label: Some("a<b>&".into()), elapsed_ms: Some(5), outcome: Outcome::Success }]);
        let svg = chart.to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("a&lt;b&gt;&amp;: 5 ms"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
