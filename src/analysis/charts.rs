//! SVG charts drawn from the analysis tables.
//!
//! Each chart has a generic draw function over any plotters backend and is
//! written to disk through [`SVGBackend`]. Charts with nothing to plot are
//! skipped rather than drawn empty.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::coord::{CoordTranslate, Shift};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::{debug, info};

use super::tables::{
    dispersion, filtered_times, heatmap, success_rate_by_nlq, success_rate_comparison,
    time_summaries, DispersionPoint, Heatmap, RateComparison, TimeSample, TimeSummary,
};
use super::BenchmarkRow;
use crate::config::AnalysisConfig;
use crate::error::{BenchError, Result};

pub const SUCCESS_RATE_CHART: &str = "success_rate_nlq.svg";
pub const COMPARISON_CHART: &str = "success_rate_comparison.svg";
pub const HEATMAP_CHART: &str = "heatmap_performance.svg";
pub const DISPERSION_CHART: &str = "performance_dispersion.svg";
pub const TIMES_CHART: &str = "times_per_nlq.svg";

pub(crate) const FONT: &str = "sans-serif";
pub(crate) const CHART_SIZE: (u32, u32) = (1400, 800);

/// Result of drawing onto a backend.
pub type DrawResult<DB> =
    std::result::Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Result of drawing onto an SVG backend.
pub(crate) type SvgResult = std::result::Result<(), DrawingAreaErrorKind<std::io::Error>>;

const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

const YELLOW_GREEN_BLUE: [(u8, u8, u8); 4] = [
    (255, 255, 204),
    (161, 218, 180),
    (65, 182, 196),
    (37, 52, 148),
];

const EXECUTION_BLUE: RGBColor = RGBColor(52, 101, 164);
const VALIDATED_GREEN: RGBColor = RGBColor(78, 154, 6);
const BOX_ORANGE: RGBColor = RGBColor(255, 165, 0);
const STRIP_SLATE: RGBColor = RGBColor(44, 62, 80);
const REFERENCE_RED: RGBColor = RGBColor(231, 76, 60);

/// Renders every chart with data into `output_dir` and returns the files written.
pub fn render_charts(
    output_dir: &Path,
    rows: &[BenchmarkRow],
    validation: Option<&BTreeMap<u32, f64>>,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        BenchError::output(format!("Cannot create {}: {e}", output_dir.display()))
    })?;
    let mut written = Vec::new();

    let rates = success_rate_by_nlq(rows);
    if !rates.is_empty() {
        written.push(render_svg(output_dir, SUCCESS_RATE_CHART, |area| {
            draw_success_rates(area, &rates)
        })?);
    }

    if let Some(validation) = validation {
        let comparison = success_rate_comparison(rows, validation);
        if comparison.is_empty() {
            debug!("No NLQ is both in the results and the validation table");
        } else {
            written.push(render_svg(output_dir, COMPARISON_CHART, |area| {
                draw_comparison(area, &comparison)
            })?);
        }
    }

    let map = heatmap(rows);
    if !map.rows.is_empty() && !map.columns.is_empty() {
        written.push(render_svg(output_dir, HEATMAP_CHART, |area| {
            draw_heatmap(area, &map)
        })?);
    }

    let points = dispersion(rows);
    if points.iter().any(is_log_plottable) {
        written.push(render_svg(output_dir, DISPERSION_CHART, |area| {
            draw_dispersion(area, &points)
        })?);
    }

    let samples = filtered_times(rows, config);
    let summaries = time_summaries(&samples);
    if !summaries.is_empty() {
        written.push(render_svg(output_dir, TIMES_CHART, |area| {
            draw_time_distribution(area, &samples, &summaries)
        })?);
    }

    info!("Rendered {} charts to {}", written.len(), output_dir.display());
    Ok(written)
}

/// Draws one chart into `dir/name`.
pub(crate) fn render_svg<F>(dir: &Path, name: &str, draw: F) -> Result<PathBuf>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> SvgResult,
{
    let path = dir.join(name);
    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    draw(&root)
        .and_then(|()| root.present())
        .map_err(|e| BenchError::output(format!("Cannot draw {}: {e}", path.display())))?;
    drop(root);
    Ok(path)
}

/// Bars of the mean success rate per NLQ, each labelled with its percentage.
pub fn draw_success_rates<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    rates: &[(u32, f64)],
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let ids: Vec<u32> = rates.iter().map(|&(id, _)| id).collect();

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d((0..ids.len()).into_segmented(), 0f64..1.1f64)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(ids.len())
        .x_label_formatter(&|v| segment_label(v, &ids, |id| id.to_string()))
        .y_label_formatter(&|v| format!("{:.0}%", v * 100.0))
        .x_desc("Natural Language Query ID")
        .y_desc("Success Rate")
        .axis_desc_style((FONT, 24))
        .draw()?;

    let margin = segment_margin(chart.plotting_area(), ids.len(), 10);
    chart.draw_series(rates.iter().enumerate().map(|(i, &(_, rate))| {
        let color = gradient(&VIRIDIS, i as f64 / ids.len().max(2).saturating_sub(1) as f64);
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), rate)],
            color.filled(),
        );
        bar.set_margin(0, 0, margin, margin);
        bar
    }))?;
    chart.draw_series(rates.iter().enumerate().map(|(i, &(_, rate))| {
        Text::new(
            format!("{:.0}%", rate * 100.0),
            (SegmentValue::CenterOf(i), rate),
            label_style(14).pos(Pos::new(HPos::Center, VPos::Bottom)),
        )
    }))?;

    Ok(())
}

/// Execution and validated success rate side by side for each NLQ.
pub fn draw_comparison<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    comparison: &[RateComparison],
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let ids: Vec<u32> = comparison.iter().map(|c| c.nlq_id).collect();

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d((0..ids.len()).into_segmented(), 0f64..1.1f64)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(ids.len())
        .x_label_formatter(&|v| segment_label(v, &ids, |id| id.to_string()))
        .y_label_formatter(&|v| format!("{:.0}%", v * 100.0))
        .x_desc("Natural Language Query ID")
        .y_desc("Success Rate")
        .axis_desc_style((FONT, 24))
        .draw()?;

    let segment = segment_width(chart.plotting_area(), ids.len());
    let (outer, inner) = (segment / 10, segment / 2);
    let bars = |rate: fn(&RateComparison) -> f64, left: u32, right: u32, color: RGBColor| {
        comparison.iter().enumerate().map(move |(i, c)| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), rate(c))],
                color.filled(),
            );
            bar.set_margin(0, 0, left, right);
            bar
        })
    };

    chart
        .draw_series(bars(|c| c.execution_rate, outer, inner, EXECUTION_BLUE))?
        .label("Execution")
        .legend(|(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], EXECUTION_BLUE.filled()));
    chart
        .draw_series(bars(|c| c.validated_rate, inner, outer, VALIDATED_GREEN))?
        .label("Validated")
        .legend(|(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], VALIDATED_GREEN.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.9))
        .border_style(BLACK)
        .label_font((FONT, 16))
        .draw()?;

    Ok(())
}

/// Mean time per NLQ and query version, annotated; missing cells stay blank.
///
/// The first NLQ is drawn at the top.
pub fn draw_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    map: &Heatmap,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let ids: Vec<u32> = map.rows.iter().rev().map(|(id, _)| *id).collect();
    let (lowest, highest) = map
        .rows
        .iter()
        .flat_map(|(_, values)| values.iter().flatten().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let spread = if highest > lowest { highest - lowest } else { 1.0 };

    let mut chart = ChartBuilder::on(area)
        .caption("Average Time (seconds)", (FONT, 20))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (0..map.columns.len()).into_segmented(),
            (0..ids.len()).into_segmented(),
        )?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(map.columns.len())
        .y_labels(ids.len())
        .x_label_formatter(&|v| segment_label(v, &map.columns, String::clone))
        .y_label_formatter(&|v| segment_label(v, &ids, |id| id.to_string()))
        .x_desc("Query Version (Q)")
        .y_desc("Natural Language Query (NLQ ID)")
        .axis_desc_style((FONT, 24))
        .draw()?;

    let cells: Vec<(usize, usize, f64)> = map
        .rows
        .iter()
        .enumerate()
        .flat_map(|(r, (_, values))| {
            let y = ids.len() - 1 - r;
            values
                .iter()
                .enumerate()
                .filter_map(move |(x, v)| v.map(|v| (x, y, v)))
        })
        .collect();
    let shade = |v: f64| (v - lowest) / spread;

    chart.draw_series(cells.iter().map(|&(x, y, v)| {
        Rectangle::new(
            [
                (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
            ],
            gradient(&YELLOW_GREEN_BLUE, shade(v)).filled(),
        )
    }))?;
    chart.draw_series(cells.iter().map(|&(x, y, v)| {
        let ink = if shade(v) > 0.6 { &WHITE } else { &BLACK };
        Text::new(
            format!("{v:.2}"),
            (SegmentValue::CenterOf(x), SegmentValue::CenterOf(y)),
            label_style(13)
                .color(ink)
                .pos(Pos::new(HPos::Center, VPos::Center)),
        )
    }))?;

    Ok(())
}

/// Mean against standard deviation on log axes, one colour per NLQ and
/// point size by success rate. Points without a positive mean and
/// deviation cannot sit on a log axis and are left out.
pub fn draw_dispersion<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    points: &[DispersionPoint],
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let plotted: Vec<&DispersionPoint> = points.iter().filter(|p| is_log_plottable(p)).collect();
    let (Some(x_range), Some(y_range)) = (
        log_range(plotted.iter().map(|p| p.mean)),
        log_range(plotted.iter().map(|p| p.std_dev)),
    ) else {
        return Ok(());
    };

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range.log_scale(), y_range.log_scale())?;
    chart
        .configure_mesh()
        .x_label_formatter(&|v| format_seconds(*v))
        .y_label_formatter(&|v| format_seconds(*v))
        .x_desc("Average Time (seconds)")
        .y_desc("Standard Deviation")
        .axis_desc_style((FONT, 24))
        .draw()?;

    let mut by_nlq: BTreeMap<u32, Vec<&DispersionPoint>> = BTreeMap::new();
    for point in plotted {
        by_nlq.entry(point.nlq_id).or_default().push(point);
    }

    for (i, (nlq_id, group)) in by_nlq.into_iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(group.into_iter().map(|p| {
                let radius = 4 + (p.success_rate.clamp(0.0, 1.0) * 4.0).round() as u32;
                Circle::new((p.mean, p.std_dev), radius, color.mix(0.8).filled())
            }))?
            .label(format!("NLQ {nlq_id}"))
            .legend(move |(x, y)| Circle::new((x + 6, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.9))
        .border_style(BLACK)
        .label_font((FONT, 14))
        .draw()?;

    Ok(())
}

/// Box plot of the filtered times per NLQ on a log axis, with every run
/// drawn over it and a reference line at one second.
pub fn draw_time_distribution<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    samples: &[TimeSample],
    summaries: &[TimeSummary],
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let ids: Vec<u32> = summaries.iter().map(|s| s.nlq_id).collect();
    let Some(y_range) = log_range(summaries.iter().flat_map(|s| [s.min, s.max])) else {
        return Ok(());
    };

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d((0..ids.len()).into_segmented(), y_range.clone().log_scale())?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(ids.len())
        .x_label_formatter(&|v| segment_label(v, &ids, |id| format!("NLQ {id}")))
        .y_label_formatter(&|v| format_seconds(*v))
        .x_desc("Natural Language Query (NLQ ID)")
        .y_desc("Execution Time (seconds)")
        .axis_desc_style((FONT, 24))
        .draw()?;

    let whisker = |i: usize, from: f64, to: f64| {
        PathElement::new(
            vec![(SegmentValue::CenterOf(i), from), (SegmentValue::CenterOf(i), to)],
            BLACK.stroke_width(2),
        )
    };
    chart.draw_series(
        summaries
            .iter()
            .enumerate()
            .flat_map(|(i, s)| [whisker(i, s.min, s.q1), whisker(i, s.q3, s.max)]),
    )?;

    let margin = segment_margin(chart.plotting_area(), ids.len(), 15);
    let box_corners = |i: usize, low: f64, high: f64| {
        [(SegmentValue::Exact(i), low), (SegmentValue::Exact(i + 1), high)]
    };
    chart.draw_series(summaries.iter().enumerate().flat_map(|(i, s)| {
        let mut fill = Rectangle::new(box_corners(i, s.q1, s.q3), BOX_ORANGE.filled());
        let mut outline = Rectangle::new(box_corners(i, s.q1, s.q3), BLACK.stroke_width(2));
        let mut median = Rectangle::new(box_corners(i, s.median, s.median), BLACK.stroke_width(3));
        for rect in [&mut fill, &mut outline, &mut median] {
            rect.set_margin(0, 0, margin, margin);
        }
        [fill, outline, median]
    }))?;

    chart.draw_series(samples.iter().enumerate().filter_map(|(k, sample)| {
        let i = ids.iter().position(|&id| id == sample.nlq_id)?;
        Some(
            EmptyElement::at((SegmentValue::CenterOf(i), sample.time))
                + Circle::new((jitter(k), 0), 3, STRIP_SLATE.mix(0.4).filled()),
        )
    }))?;

    if y_range.contains(&1.0) {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(SegmentValue::Exact(0), 1.0), (SegmentValue::Last, 1.0)],
            REFERENCE_RED.mix(0.7).stroke_width(2),
        )))?;
    }

    Ok(())
}

fn is_log_plottable(point: &DispersionPoint) -> bool {
    point.mean > 0.0 && point.std_dev > 0.0
}

/// Log axis range covering the positive values, padded on both ends.
pub(crate) fn log_range(values: impl IntoIterator<Item = f64>) -> Option<Range<f64>> {
    let (low, high) = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;
    Some(low / 1.5..high * 1.5)
}

/// Label of a category axis position; blank between categories.
pub(crate) fn segment_label<T>(
    value: &SegmentValue<usize>,
    categories: &[T],
    label: impl Fn(&T) -> String,
) -> String {
    match value {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
            categories.get(*i).map(label).unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    }
}

/// Pixel width of one category on an axis of `count` categories.
fn segment_width<DB: DrawingBackend, CT: CoordTranslate>(
    plot: &DrawingArea<DB, CT>,
    count: usize,
) -> u32 {
    let (width, _) = plot.dim_in_pixel();
    width / count.max(1) as u32
}

/// Margin leaving `percent` of a category blank on each side of a bar.
fn segment_margin<DB: DrawingBackend, CT: CoordTranslate>(
    plot: &DrawingArea<DB, CT>,
    count: usize,
    percent: u32,
) -> u32 {
    segment_width(plot, count) * percent / 100
}

/// Horizontal offset in pixels spreading a strip of points.
fn jitter(index: usize) -> i32 {
    (index * 7 % 11) as i32 * 3 - 15
}

fn format_seconds(value: f64) -> String {
    if value >= 10.0 {
        format!("{value:.0} s")
    } else if value >= 1.0 {
        format!("{value:.1} s")
    } else {
        format!("{value:.2} s")
    }
}

pub(crate) fn label_style(size: u32) -> TextStyle<'static> {
    TextStyle::from((FONT, size).into_font())
}

/// Colour at `t` in 0..=1 along evenly spaced stops.
pub(crate) fn gradient(stops: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let Some(&last) = stops.last() else {
        return BLACK;
    };
    if stops.len() == 1 || !t.is_finite() {
        return RGBColor(last.0, last.1, last.2);
    }
    let scaled = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let index = (scaled.floor() as usize).min(stops.len() - 2);
    let fraction = scaled - index as f64;
    let (from, to) = (stops[index], stops[index + 1]);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * fraction).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}
