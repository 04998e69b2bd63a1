//! Fancy diagnostics support using `ariadne`.
//!
//! Warnings of the BMS compiler carry the byte range of their line, which `ariadne` turns into rows and columns on
//! its own. Warnings of the bmson compiler have no position and are reported against the start of the document.
//!
//! ```rust
//! use bms_timeline::{
//!     chart_process::{CancelFlag, ChartSource, CompileOptions, compile},
//!     diagnostics::collect_compile_reports,
//! };
//!
//! let source = "#TITLE Test\n#BPM fast\n#00111:01\n";
//! let output = compile(ChartSource::Bms(source), &CompileOptions::default(), &CancelFlag::new()).unwrap();
//! let reports = collect_compile_reports("test.bms", source, &output.warnings);
//! assert_eq!(reports.len(), 1);
//! ```

use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::{
    bms::{BmsWarning, BmsWarningWithRange},
    chart_process::CompileWarning,
};

/// Simple source container that holds the filename and source text.
pub struct SimpleSource<'a> {
    name: &'a str,
    text: &'a str,
}

impl<'a> SimpleSource<'a> {
    /// Create a new source container instance.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// Get source text content.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Get source file name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }
}

/// Trait for converting positioned warnings to `ariadne::Report`.
pub trait ToAriadne {
    /// Convert the warning to an ariadne Report.
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)>;
}

/// Helper to build a styled ariadne `Report` consistently.
#[must_use]
pub fn build_report<'a>(
    src: &SimpleSource<'a>,
    kind: ReportKind<'a>,
    range: Range<usize>,
    title: &str,
    label_message: impl ToString,
    color: Color,
) -> Report<'a, (String, Range<usize>)> {
    let filename = src.name().to_string();
    Report::build(kind, (filename.clone(), range.clone()))
        .with_message(title)
        .with_label(
            Label::new((filename, range))
                .with_message(label_message.to_string())
                .with_color(color),
        )
        .finish()
}

const fn title_of(warning: &BmsWarning) -> (&'static str, Color) {
    match warning {
        BmsWarning::MalformedCell { .. }
        | BmsWarning::MalformedMeasureLength { .. }
        | BmsWarning::MalformedResource { .. }
        | BmsWarning::MalformedHeader { .. }
        | BmsWarning::MalformedControl { .. } => ("malformed line", Color::Red),
        BmsWarning::UnknownChannel(_) => ("unknown channel", Color::Yellow),
        BmsWarning::UndefinedTempo(_) | BmsWarning::UndefinedStop(_) => {
            ("undefined reference", Color::Yellow)
        }
        BmsWarning::UnbalancedControlFlow(_) => ("unbalanced control flow", Color::Magenta),
        BmsWarning::UnpairedLongNote { .. } => ("unpaired long note", Color::Blue),
    }
}

impl ToAriadne for BmsWarningWithRange {
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)> {
        let (title, color) = title_of(self.content());
        build_report(
            src,
            ReportKind::Warning,
            self.as_range(),
            title,
            self.content(),
            color,
        )
    }
}

impl ToAriadne for CompileWarning {
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)> {
        match self {
            Self::Bms(warning) => warning.to_report(src),
            #[cfg(feature = "bmson")]
            Self::Bmson(warning) => build_report(
                src,
                ReportKind::Warning,
                0..0,
                "bmson warning",
                warning,
                Color::Yellow,
            ),
        }
    }
}

/// Prints every warning of a compilation to stderr.
pub fn emit_compile_warnings<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a CompileWarning>,
) {
    let simple = SimpleSource::new(name, source);
    let ariadne_source = Source::from(source);
    for warning in warnings {
        let report = warning.to_report(&simple);
        let _ = report.eprint((name.to_string(), ariadne_source.clone()));
    }
}

/// Collects the reports of a compilation without printing them.
#[must_use]
pub fn collect_compile_reports<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a CompileWarning>,
) -> Vec<Report<'a, (String, Range<usize>)>> {
    let simple = SimpleSource::new(name, source);
    warnings
        .into_iter()
        .map(|warning| warning.to_report(&simple))
        .collect()
}
