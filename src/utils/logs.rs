use console::{measure_text_width, Style};
use std::path::Path;

use crate::classify::Classifier;
use crate::db::{Model, PostType};
use crate::migrate::FillReport;
use crate::stats::{ChiSquaredOutcome, PopulationStats};

pub const TREE_BRANCH: char = '\u{251C}';
pub const TREE_END: char = '\u{2514}';
pub const TREE_HORIZ: char = '\u{2500}';

const TREE_PREFIX_WIDTH: usize = 4;
const VALUE_COLUMN: usize = 22;

fn tree_branch() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_BRANCH, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

fn tree_end() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_END, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

fn branch(last: bool) -> String {
    if last {
        tree_end()
    } else {
        tree_branch()
    }
}

pub fn dim() -> Style {
    Style::new().dim()
}

fn blue() -> Style {
    Style::new().blue()
}

fn magenta() -> Style {
    Style::new().magenta()
}

fn cyan() -> Style {
    Style::new().cyan()
}

fn green() -> Style {
    Style::new().green()
}

fn red() -> Style {
    Style::new().red()
}

fn yellow() -> Style {
    Style::new().yellow()
}

fn bold() -> Style {
    Style::new().bold()
}

fn init_prefix() -> String {
    blue().apply_to("[INIT]").to_string()
}

fn fill_prefix() -> String {
    magenta().apply_to("[FILL]").to_string()
}

fn sample_prefix() -> String {
    cyan().apply_to("[SAMPLE]").to_string()
}

fn classify_prefix() -> String {
    yellow().apply_to("[CLASSIFY]").to_string()
}

fn stats_prefix() -> String {
    green().apply_to("[STATS]").to_string()
}

pub fn pad_label(label: &str, depth: usize) -> String {
    let prefix_width = depth * TREE_PREFIX_WIDTH;
    let target_width = VALUE_COLUMN.saturating_sub(prefix_width);
    let current_width = measure_text_width(label);
    if current_width < target_width {
        format!("{}{}", label, " ".repeat(target_width - current_width))
    } else {
        format!("{} ", label)
    }
}

pub fn log_init(database_url: &str) {
    println!(
        "{} using database {}",
        init_prefix(),
        cyan().apply_to(database_url)
    );
}

pub fn log_db_ready() {
    println!("{} database ready.", init_prefix());
}

pub fn log_teardown_done() {
    println!("{} database torn down.", init_prefix());
}

pub fn log_fill_start(kind: &str, path: &Path) {
    println!(
        "{} migrating {} from {}...",
        fill_prefix(),
        bold().apply_to(kind),
        dim().apply_to(path.display())
    );
}

pub fn log_fill_known_ids(kind: &str, count: usize) {
    println!(
        "{} found {} {} ids",
        fill_prefix(),
        bold().apply_to(count),
        kind
    );
}

pub fn log_fill_progress(added: usize) {
    println!("{}added: {}", tree_branch(), bold().apply_to(added));
}

pub fn log_fill_done(report: &FillReport) {
    println!("{} done.", fill_prefix());
    let rows = [
        ("questions", report.questions),
        ("answers", report.answers),
        ("comments", report.comments),
    ];
    for (i, (label, count)) in rows.iter().enumerate() {
        println!(
            "{}{} {}",
            branch(i == rows.len() - 1),
            pad_label(label, 1),
            bold().apply_to(count)
        );
    }
}

pub fn log_sample_query(model: Model, post_type: Option<PostType>, tag: Option<&str>) {
    let mut what = model.to_string().to_lowercase();
    if let (Model::Post, Some(post_type)) = (model, post_type) {
        what = post_type.to_string().to_lowercase();
    }
    match tag {
        Some(tag) => println!(
            "{} querying {} tagged {}",
            sample_prefix(),
            bold().apply_to(what),
            cyan().apply_to(format!("<{tag}>"))
        ),
        None => println!("{} querying {}", sample_prefix(), bold().apply_to(what)),
    }
}

pub fn log_sample_matches(population: usize) {
    println!("{}found {} matches", tree_branch(), bold().apply_to(population));
}

pub fn log_sample_estimated(size: usize) {
    println!(
        "{}no sample size given, estimated {}",
        tree_branch(),
        bold().apply_to(size)
    );
}

pub fn log_sample_written(outpath: &Path, index_path: &Path, count: usize) {
    println!(
        "{}{} documents written to {} {}",
        tree_end(),
        bold().apply_to(count),
        cyan().apply_to(outpath.display()),
        dim().apply_to(format!("(index: {})", index_path.display()))
    );
}

pub fn log_classifiers_found(classifiers: &[Classifier]) {
    println!(
        "{} found {} classifiers",
        classify_prefix(),
        bold().apply_to(classifiers.len())
    );
    for (i, classifier) in classifiers.iter().enumerate() {
        println!(
            "{}{}",
            branch(i == classifiers.len() - 1),
            dim().apply_to(classifier.script.display())
        );
    }
}

pub fn log_classify_progress(classified: usize, total: usize) {
    println!(
        "{} subfiles classified: {}{}",
        classify_prefix(),
        bold().apply_to(classified),
        dim().apply_to(format!("/{total}"))
    );
}

pub fn log_classify_failed(reason: &str) {
    println!(
        "{} {} {}",
        classify_prefix(),
        red().apply_to("failed:"),
        dim().apply_to(reason)
    );
}

pub fn log_concatenating(parts: usize, output: &Path) {
    println!(
        "{} concatenating {} partial files into {}",
        classify_prefix(),
        bold().apply_to(parts),
        cyan().apply_to(output.display())
    );
}

pub fn log_population_stats(stats: &PopulationStats) {
    println!(
        "{} {} {}",
        stats_prefix(),
        bold().apply_to(&stats.name),
        dim().apply_to(format!("(n={})", stats.total))
    );
    let labels = stats.labels();
    for (i, label) in labels.iter().enumerate() {
        println!(
            "{}{} {:.4} {}",
            branch(i == labels.len() - 1),
            pad_label(&label.sentiment.to_string(), 1),
            label.probability,
            dim().apply_to(format!("\u{b1} {:.4}", label.margin_of_error))
        );
    }
}

pub fn log_plot_written(output: &Path) {
    println!(
        "{} plot written to {}",
        stats_prefix(),
        cyan().apply_to(output.display())
    );
}

pub fn log_comparison(outcome: &ChiSquaredOutcome, confidence_level: f64) {
    println!(
        "{} chi-squared test at {:.0}% confidence",
        stats_prefix(),
        confidence_level * 100.0
    );
    println!(
        "{}{} {:.4}",
        tree_branch(),
        pad_label("statistic", 1),
        outcome.statistic
    );
    println!(
        "{}{} {}",
        tree_branch(),
        pad_label("degrees of freedom", 1),
        outcome.degrees_of_freedom
    );
    println!(
        "{}{} {:.6}",
        tree_branch(),
        pad_label("p-value", 1),
        outcome.p_value
    );
    let verdict = if outcome.not_rejected {
        green().bold().apply_to("indistinguishable")
    } else {
        red().bold().apply_to("different")
    };
    println!("{}{} {}", tree_end(), pad_label("distributions", 1), verdict);
}
