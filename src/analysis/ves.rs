//! Valid Efficiency Score (VES) per model across NLQs.
//!
//! The VES table has the NLQ id in its first column and one score column
//! per model, usually exported as `VES.xlsx` with a title row above the
//! header. It is drawn as one line per model.

use std::io;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::{info, warn};

use super::charts::{label_style, render_svg, segment_label, DrawResult, FONT};
use super::parse_id;
use crate::config::FormatConfig;
use crate::error::{BenchError, Result};
use crate::locale::NumberFormat;
use crate::sheet::{self, HeaderRow, Table};

pub const VES_CHART: &str = "ves_compact_visualization.svg";

const FOOTNOTE: &str = "VES: Valid Efficiency Score | LLM: Large Language Model";

/// Scores per NLQ, one column per model; a blank cell is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct VesTable {
    pub models: Vec<String>,
    pub rows: Vec<(u32, Vec<Option<f64>>)>,
}

impl VesTable {
    /// Scores of model `index` with their row position.
    fn series(&self, index: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(move |(i, (_, scores))| Some((i, (*scores.get(index)?)?)))
    }
}

/// Loads a VES table; the header sits below the title rows.
pub fn load_ves(path: &Path, format: &FormatConfig) -> Result<VesTable> {
    let table = sheet::load_table(path, format, HeaderRow::AfterTitles)?;
    ves_from_table(&table, format, &path.display().to_string())
}

/// Reads a delimited VES table; `source` names it in messages.
pub fn read_ves<R: io::Read>(reader: R, format: &FormatConfig, source: &str) -> Result<VesTable> {
    let table = sheet::read_delimited(reader, format.delimiter_byte(), format.skip_rows, source)?;
    ves_from_table(&table, format, source)
}

fn ves_from_table(table: &Table, format: &FormatConfig, source: &str) -> Result<VesTable> {
    let models: Vec<String> = table.header.iter().skip(1).cloned().collect();
    if models.is_empty() {
        return Err(BenchError::input(format!(
            "{source}: no model columns after the NLQ column"
        )));
    }

    let numbers = NumberFormat::new(format.decimal_separator);
    let mut rows = Vec::new();
    for (line, row) in table.rows.iter().enumerate() {
        let id_cell = sheet::cell(row, 0);
        let Some(id) = parse_id(id_cell) else {
            warn!("{source}: row {} has no numeric NLQ id ({id_cell:?}), skipping", line + 1);
            continue;
        };
        let scores = (1..=models.len())
            .map(|col| numbers.parse(sheet::cell(row, col)))
            .collect();
        rows.push((id, scores));
    }

    Ok(VesTable { models, rows })
}

/// Legend name of a model column: underscores become spaces and each word
/// starts with a capital, the rest lowercase.
pub fn model_label(column: &str) -> String {
    let mut label = String::with_capacity(column.len());
    let mut in_word = false;
    for c in column.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if in_word {
                label.extend(c.to_lowercase());
            } else {
                label.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            label.push(c);
            in_word = false;
        }
    }
    label
}

/// Draws the VES chart into `output_dir`.
pub fn render_ves_chart(output_dir: &Path, table: &VesTable) -> Result<PathBuf> {
    if table.rows.is_empty() {
        return Err(BenchError::input("VES table has no NLQ rows"));
    }
    std::fs::create_dir_all(output_dir).map_err(|e| {
        BenchError::output(format!("Cannot create {}: {e}", output_dir.display()))
    })?;

    let path = render_svg(output_dir, VES_CHART, |area| draw_ves(area, table))?;
    info!("Rendered VES chart to {}", path.display());
    Ok(path)
}

/// One line per model across NLQs, circles and squares alternating.
pub fn draw_ves<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    table: &VesTable,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;
    let (_, height) = area.dim_in_pixel();
    let (plot, footer) = area.split_vertically(height.saturating_sub(40));
    let ids: Vec<u32> = table.rows.iter().map(|(id, _)| *id).collect();

    let mut chart = ChartBuilder::on(&plot)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((0..ids.len()).into_segmented(), 0f64..1.05f64)?;
    chart
        .configure_mesh()
        .x_labels(ids.len())
        .y_labels(6)
        .x_label_formatter(&|v| segment_label(v, &ids, |id| format!("NLQ {id}")))
        .y_label_formatter(&|v| format!("{v:.1}"))
        .x_desc("NLQ Identifier")
        .y_desc("VES Score")
        .axis_desc_style((FONT, 18))
        .draw()?;

    for (index, model) in table.models.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        let points = || {
            table
                .series(index)
                .map(|(i, score)| (SegmentValue::CenterOf(i), score))
        };

        chart.draw_series(LineSeries::new(points(), color.stroke_width(2)))?;
        let markers = if index % 2 == 1 {
            chart.draw_series(points().map(|point| {
                EmptyElement::at(point) + Rectangle::new([(-5, -5), (5, 5)], color.filled())
            }))?
        } else {
            chart.draw_series(
                points().map(|point| EmptyElement::at(point) + Circle::new((0, 0), 5, color.filled())),
            )?
        };
        markers
            .label(model_label(model))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE)
        .border_style(RGBColor(204, 204, 204))
        .label_font((FONT, 14))
        .draw()?;

    let (width, _) = footer.dim_in_pixel();
    footer.draw(&Text::new(
        FOOTNOTE,
        (width as i32 / 2, 10),
        label_style(13)
            .color(&RGBColor(102, 102, 102))
            .pos(Pos::new(HPos::Center, VPos::Top)),
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn semicolon() -> FormatConfig {
        FormatConfig {
            delimiter: ';',
            decimal_separator: ',',
            skip_rows: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_ves_with_title_row() {
        let text = "VES per model\n\
                    NLQ; GPT_4o ;DeepSeek\n\
                    1;0,95;0,5\n\
                    2;;1\n\
                    total;0,4;0,4\n";
        let table = read_ves(text.as_bytes(), &semicolon(), "VES.csv").unwrap();

        assert_eq!(table.models, vec!["GPT_4o", "DeepSeek"]);
        assert_eq!(
            table.rows,
            vec![
                (1, vec![Some(0.95), Some(0.5)]),
                (2, vec![None, Some(1.0)]),
            ]
        );
        assert_eq!(table.series(0).collect::<Vec<_>>(), vec![(0, 0.95)]);
    }

    #[test]
    fn test_read_ves_without_models() {
        let err = read_ves("title\nNLQ\n1\n".as_bytes(), &semicolon(), "VES.csv").unwrap_err();
        assert!(err.to_string().contains("no model columns"));
    }

    #[test]
    fn test_load_ves_workbook() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VES.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Valid Efficiency Score").unwrap();
        sheet.write_string(1, 0, "NLQ").unwrap();
        sheet.write_string(1, 1, "claude_3_5_sonnet").unwrap();
        sheet.write_number(2, 0, 1).unwrap();
        sheet.write_number(2, 1, 0.75).unwrap();
        sheet.write_number(3, 0, 2).unwrap();
        sheet.write_number(3, 1, 1).unwrap();
        workbook.save(&path).unwrap();

        let table = load_ves(&path, &FormatConfig::default()).unwrap();

        assert_eq!(table.models, vec!["claude_3_5_sonnet"]);
        assert_eq!(
            table.rows,
            vec![(1, vec![Some(0.75)]), (2, vec![Some(1.0)])]
        );
    }

    #[test]
    fn test_model_label() {
        assert_eq!(model_label("claude_3_5_sonnet"), "Claude 3 5 Sonnet");
        assert_eq!(model_label("DEEPSEEK_r1"), "Deepseek R1");
        assert_eq!(model_label("gpt-4o"), "Gpt-4O");
    }

    #[test]
    fn test_render_ves_chart() {
        let dir = tempfile::tempdir().unwrap();
        let table = VesTable {
            models: vec!["gpt_4o".to_string(), "deepseek".to_string()],
            rows: vec![
                (1, vec![Some(0.9), Some(0.4)]),
                (2, vec![None, Some(0.8)]),
                (3, vec![Some(1.0), Some(1.0)]),
            ],
        };

        let path = render_ves_chart(dir.path(), &table).unwrap();

        assert_eq!(path, dir.path().join(VES_CHART));
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("Gpt 4O"));
        assert!(svg.contains("Deepseek"));
        assert!(svg.contains("NLQ 3"));
        assert!(svg.contains("Valid Efficiency Score"));
    }

    #[test]
    fn test_render_ves_chart_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = VesTable {
            models: vec!["gpt_4o".to_string()],
            rows: Vec::new(),
        };
        assert!(render_ves_chart(dir.path(), &table).is_err());
    }
}
