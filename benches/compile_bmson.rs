//! Benchmark for compiling `bmson` documents into timelines.

use bms_timeline::{
    bmson::compile_bmson,
    chart_process::{CancelFlag, CompileOptions},
};
use criterion::{Criterion, Throughput};

/// Builds a document with `notes` notes spread over seven lanes and a tempo change every 64 notes.
fn synthetic_document(notes: u64) -> String {
    let resolution = 240u64;
    let note_list: Vec<String> = (0..notes)
        .map(|index| {
            let x = index % 7 + 1;
            let y = index * resolution / 2;
            let l = if index % 16 == 0 { resolution } else { 0 };
            format!(r#"{{ "x": {x}, "y": {y}, "l": {l}, "c": false }}"#)
        })
        .collect();
    let tempo_list: Vec<String> = (0..notes / 64)
        .map(|index| {
            let y = index * 32 * resolution;
            let bpm = 120 + index % 60;
            format!(r#"{{ "y": {y}, "bpm": {bpm} }}"#)
        })
        .collect();
    format!(
        r#"{{
            "version": "1.0.0",
            "info": {{ "title": "Bench", "init_bpm": 150, "resolution": {resolution} }},
            "bpm_events": [{}],
            "sound_channels": [ {{ "name": "piano.wav", "notes": [{}] }} ]
        }}"#,
        tempo_list.join(","),
        note_list.join(",")
    )
}

fn bench_compile_bmson(c: &mut Criterion) {
    let options = CompileOptions::default();
    let documents = [
        ("notes_1000", synthetic_document(1_000)),
        ("notes_20000", synthetic_document(20_000)),
    ];
    let mut group = c.benchmark_group("compile_bmson");

    for (name, source) in &documents {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(*name, |b| {
            b.iter(|| {
                compile_bmson(
                    std::hint::black_box(source),
                    std::hint::black_box(&options),
                    &CancelFlag::new(),
                )
            });
        });
    }

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default();
    bench_compile_bmson(&mut criterion);
}
