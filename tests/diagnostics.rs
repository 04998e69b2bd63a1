#![cfg(feature = "diagnostics")]

use bms_timeline::{
    diagnostics::{SimpleSource, ToAriadne, collect_compile_reports},
    prelude::*,
};

#[test]
fn every_warning_becomes_a_report() {
    let source = "#TITLE Test\n#BPM fast\n#ENDIF\n#00151:01\n#00108:05\n";
    let output = compile(
        ChartSource::Bms(source),
        &CompileOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(output.warnings.len(), 4);
    let reports = collect_compile_reports("test.bms", source, &output.warnings);
    assert_eq!(reports.len(), output.warnings.len());
}

#[test]
fn report_renders_the_offending_line() {
    let source = "#TITLE Test\n#BPM fast\n";
    let output = compile_bms(source, &CompileOptions::default(), &CancelFlag::new()).unwrap();
    let warning = &output.warnings[0];
    assert_eq!(&source[warning.as_range()], "#BPM fast");

    let report = warning.to_report(&SimpleSource::new("test.bms", source));
    let mut rendered = Vec::new();
    report
        .write(
            ("test.bms".to_string(), ariadne::Source::from(source)),
            &mut rendered,
        )
        .unwrap();
    let rendered = String::from_utf8(rendered).unwrap();
    assert!(rendered.contains("malformed line"));
    assert!(rendered.contains("test.bms"));
}

#[cfg(feature = "bmson")]
#[test]
fn bmson_warnings_are_reported_too() {
    let source = r#"{ "info": { "title": "x", "init_bpm": 120 } }"#;
    let output = compile(
        ChartSource::Bmson(source),
        &CompileOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();
    let reports = collect_compile_reports("test.bmson", source, &output.warnings);
    assert_eq!(reports.len(), 1);
}
