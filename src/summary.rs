use colored::{Color, Colorize};
use indicatif::HumanBytes;
use prettytable::format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR;
use prettytable::{row, Table};

use crate::batch::BatchReport;

fn paint(text: &str, color: Color, use_color: bool) -> String {
    if use_color {
        text.color(color).bold().to_string()
    } else {
        text.to_owned()
    }
}

/// End-of-run summary of a [`BatchReport`].
pub struct Summary<'a> {
    report: &'a BatchReport,
    use_color: bool,
}

impl<'a> Summary<'a> {
    #[must_use]
    pub const fn new(report: &'a BatchReport, use_color: bool) -> Self {
        Self { report, use_color }
    }
}

impl std::fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = self.report;
        let use_color = self.use_color;

        let headline = if report.cancelled {
            paint("Transcoding cancelled.", Color::Yellow, use_color)
        } else if report.failed > 0 {
            paint("Transcoding completed with errors.", Color::Yellow, use_color)
        } else {
            paint("Transcoding completed.", Color::Green, use_color)
        };

        let failed_color = if report.failed > 0 {
            Color::Red
        } else {
            Color::Green
        };

        writeln!(f, "{headline}")?;
        writeln!(
            f,
            "Total: {}  Succeeded: {}  Failed: {}  Threads: {}",
            report.total,
            paint(&report.succeeded.to_string(), Color::Green, use_color),
            paint(&report.failed.to_string(), failed_color, use_color),
            report.workers
        )?;

        if report.succeeded > 0 {
            writeln!(
                f,
                "Size: {} -> {}",
                HumanBytes(report.input_bytes),
                HumanBytes(report.output_bytes)
            )?;
        }

        if !report.skipped.is_empty() {
            let note = format!(
                "{} files were not started and are left unchanged.",
                report.skipped.len()
            );

            writeln!(f, "{}", paint(&note, Color::Yellow, use_color))?;
        }

        if !report.failures.is_empty() {
            let mut table = Table::new();
            table.set_format(*FORMAT_NO_BORDER_LINE_SEPARATOR);
            table.set_titles(row!["File", "Reason"]);

            for failure in &report.failures {
                table.add_row(row![failure.path.display(), failure.reason]);
            }

            writeln!(f)?;
            writeln!(f, "{}", paint("Failed files:", Color::Red, use_color))?;
            write!(f, "{table}")?;
        }

        Ok(())
    }
}

/// Renders the summary; the result depends on nothing but the arguments.
#[must_use]
pub fn render(report: &BatchReport, use_color: bool) -> String {
    Summary::new(report, use_color).to_string()
}
