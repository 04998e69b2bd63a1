//! Benchmark for compiling `BMS` sources into timelines.

use bms_timeline::{
    bms::compile_bms,
    chart_process::{CancelFlag, CompileOptions},
};
use std::fmt::Write;

use criterion::{Criterion, Throughput};

/// Builds a chart of `measures` measures with eight notes per lane and a tempo change every eighth measure.
fn synthetic_chart(measures: u32) -> String {
    let mut source = String::from("#TITLE Bench\n#BPM 150\n#BPM01 180\n#STOP01 48\n");
    for id in 1..=36 {
        let _ = writeln!(source, "#WAV{id:02} sound{id}.wav");
    }
    for measure in 0..measures {
        for lane in 1..=7 {
            let _ = writeln!(source, "#{measure:03}1{lane}:0{lane}000{lane}000{lane}000{lane}00");
        }
        let _ = writeln!(source, "#{measure:03}01:0102030405060708");
        if measure % 8 == 7 {
            let _ = writeln!(source, "#{measure:03}08:01\n#{measure:03}09:0001");
        }
    }
    source
}

fn synthetic_random_chart(blocks: u32) -> String {
    let mut source = String::from("#BPM 150\n");
    for block in 0..blocks {
        source.push_str("#RANDOM 3\n");
        for branch in 1..=3 {
            let _ = writeln!(source, "#IF {branch}\n#{block:03}1{branch}:01010101\n#ENDIF");
        }
        source.push_str("#ENDRANDOM\n");
    }
    source
}

fn bench_compile_bms(c: &mut Criterion) {
    let options = CompileOptions {
        seed: Some(1),
        ..CompileOptions::default()
    };
    let charts = [
        ("dense_100", synthetic_chart(100)),
        ("dense_999", synthetic_chart(999)),
        ("random_500", synthetic_random_chart(500)),
    ];
    let mut group = c.benchmark_group("compile_bms");

    for (name, source) in &charts {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(*name, |b| {
            b.iter(|| {
                compile_bms(
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
    bench_compile_bms(&mut criterion);
}
