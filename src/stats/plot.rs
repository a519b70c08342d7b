use super::aggregate::{aggregate_with_population, PopulationStats, Sentiment};
use super::independence::PopulationWeights;
use crate::error::{AnalyzerError, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

const HATCH_LINES: usize = 6;

#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub alpha_level: f64,
    /// Width of each sentiment class group, in class units (0, 1].
    pub bar_width: f64,
    pub filled: bool,
    pub hatched: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            alpha_level: 0.05,
            bar_width: 0.5,
            filled: false,
            hatched: false,
            width: 1024,
            height: 768,
        }
    }
}

/// Render one grouped bar per sentiment class and prediction file, with
/// whiskers spanning the margin of error. The chart is SVG and is written to
/// `output` as given; a path without an extension is fine, any extension
/// other than `.svg` is rejected.
///
/// With `population_weights`, each file's margins use the finite-population
/// correction for its subpopulation.
pub fn render(
    prediction_files: &[PathBuf],
    output: &Path,
    options: &PlotOptions,
    population_weights: Option<&PopulationWeights>,
) -> Result<()> {
    if prediction_files.is_empty() {
        return Err(AnalyzerError::invalid("no prediction files to plot"));
    }
    if !(options.bar_width > 0.0 && options.bar_width <= 1.0) {
        return Err(AnalyzerError::invalid(format!(
            "bar width must be in (0, 1], got {}",
            options.bar_width
        )));
    }
    if let Some(ext) = output.extension() {
        if !ext.eq_ignore_ascii_case("svg") {
            return Err(AnalyzerError::invalid(format!(
                "plots are written as SVG, cannot write {}",
                output.display()
            )));
        }
    }

    let series = prediction_files
        .iter()
        .map(|path| {
            let population = match population_weights {
                Some(weights) => weights.for_file(path)?,
                None => f64::INFINITY,
            };
            aggregate_with_population(path, options.alpha_level, population)
        })
        .collect::<Result<Vec<_>>>()?;

    let root = SVGBackend::new(output, (options.width, options.height)).into_drawing_area();
    draw_chart(root, &series, options)
}

fn draw_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    series: &[PopulationStats],
    options: &PlotOptions,
) -> Result<()> {
    root.fill(&WHITE).map_err(plot_error)?;

    let y_max = series
        .iter()
        .flat_map(|s| s.labels().iter().map(|l| l.upper()))
        .fold(0.1_f64, f64::max)
        .min(1.0)
        * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Sentiment ({:.0}% confidence)", (1.0 - options.alpha_level) * 100.0),
            ("sans-serif", 28),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5_f64..2.5_f64, 0_f64..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(3)
        .x_label_formatter(&|x| class_name(*x))
        .y_desc("Probability")
        .draw()
        .map_err(plot_error)?;

    let bar = options.bar_width / series.len() as f64;
    for (k, stats) in series.iter().enumerate() {
        let color = Palette99::pick(k).to_rgba();
        let style = if options.filled {
            color.filled()
        } else {
            color.stroke_width(2)
        };

        let rects: Vec<(f64, f64, f64)> = Sentiment::iter()
            .enumerate()
            .map(|(i, sentiment)| {
                let x0 = i as f64 - options.bar_width / 2.0 + k as f64 * bar;
                (x0, x0 + bar, stats.get(sentiment).probability)
            })
            .collect();

        chart
            .draw_series(
                rects
                    .iter()
                    .map(|&(x0, x1, p)| Rectangle::new([(x0, 0.0), (x1, p)], style)),
            )
            .map_err(plot_error)?
            .label(stats.name.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

        if options.hatched {
            let hatch = BLACK.mix(0.6).stroke_width(1);
            chart
                .draw_series(
                    rects
                        .iter()
                        .flat_map(|&(x0, x1, p)| hatch_lines(k, x0, x1, p))
                        .map(|points| PathElement::new(points, hatch)),
                )
                .map_err(plot_error)?;
        }

        chart
            .draw_series(Sentiment::iter().zip(&rects).map(|(sentiment, &(x0, x1, p))| {
                let label = stats.get(sentiment);
                ErrorBar::new_vertical(
                    (x0 + x1) / 2.0,
                    label.lower().max(0.0),
                    p,
                    label.upper().min(1.0),
                    BLACK.stroke_width(1),
                    8,
                )
            }))
            .map_err(plot_error)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

fn class_name(x: f64) -> String {
    match x.round() as i64 {
        0 => Sentiment::Negative.to_string(),
        1 => Sentiment::Neutral.to_string(),
        2 => Sentiment::Positive.to_string(),
        _ => String::new(),
    }
}

/// Fill pattern of series `k`: horizontal, vertical or crossed lines.
fn hatch_lines(k: usize, x0: f64, x1: f64, height: f64) -> Vec<Vec<(f64, f64)>> {
    if height <= 0.0 {
        return Vec::new();
    }
    let horizontal = (1..HATCH_LINES).map(|i| {
        let y = height * i as f64 / HATCH_LINES as f64;
        vec![(x0, y), (x1, y)]
    });
    let vertical = (1..HATCH_LINES).map(|i| {
        let x = x0 + (x1 - x0) * i as f64 / HATCH_LINES as f64;
        vec![(x, 0.0), (x, height)]
    });
    match k % 3 {
        0 => horizontal.collect(),
        1 => vertical.collect(),
        _ => horizontal.chain(vertical).collect(),
    }
}

fn plot_error(e: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::Plot(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregate::tests::{sample_predictions, write_predictions};
    use tempfile::TempDir;

    #[test]
    fn test_render_writes_svg() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            sample_predictions(&dir),
            write_predictions(&dir, "python_predictions.csv", 30, 60, 10),
        ];
        let output = dir.path().join("plot.svg");
        let options = PlotOptions {
            filled: true,
            hatched: true,
            ..Default::default()
        };

        render(&files, &output, &options, None).unwrap();

        let svg = std::fs::read_to_string(&output).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("sanitized"));
        assert!(svg.contains("python"));
    }

    #[test]
    fn test_render_with_weights_requires_every_key() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_predictions(&dir, "java_predictions.csv", 3, 3, 3)];
        let weights: PopulationWeights = [("python".to_string(), 10.0)].into_iter().collect();
        let result = render(&files, &dir.path().join("plot.svg"), &PlotOptions::default(), Some(&weights));
        assert!(matches!(result, Err(AnalyzerError::MissingWeight(_))));
    }

    #[test]
    fn test_render_rejects_bad_bar_width() {
        let dir = TempDir::new().unwrap();
        let files = vec![sample_predictions(&dir)];
        let options = PlotOptions {
            bar_width: 1.5,
            ..Default::default()
        };
        let result = render(&files, &dir.path().join("plot.svg"), &options, None);
        assert!(matches!(result, Err(AnalyzerError::InvalidParameter(_))));
    }

    #[test]
    fn test_render_rejects_bitmap_outputs() {
        let dir = TempDir::new().unwrap();
        let files = vec![sample_predictions(&dir)];
        let output = dir.path().join("plot.png");
        let result = render(&files, &output, &PlotOptions::default(), None);
        assert!(matches!(result, Err(AnalyzerError::InvalidParameter(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_render_keeps_output_path_without_extension() {
        let dir = TempDir::new().unwrap();
        let files = vec![sample_predictions(&dir)];
        let output = dir.path().join("plot");

        render(&files, &output, &PlotOptions::default(), None).unwrap();

        let svg = std::fs::read_to_string(&output).unwrap();
        assert!(svg.contains("<svg"));
        assert!(!dir.path().join("plot.svg").exists());
    }

    #[test]
    fn test_hatch_patterns_stay_inside_bar() {
        for k in 0..3 {
            for line in hatch_lines(k, 1.0, 2.0, 0.4) {
                for (x, y) in line {
                    assert!((1.0..=2.0).contains(&x));
                    assert!((0.0..=0.4).contains(&y));
                }
            }
        }
        assert!(hatch_lines(0, 0.0, 1.0, 0.0).is_empty());
    }
}
