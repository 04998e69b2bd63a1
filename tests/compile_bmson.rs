#![cfg(feature = "bmson")]

use bms_timeline::{
    bmson::BmsonWarning,
    command::channel::ChannelMap,
    prelude::*,
    time::span_nanos,
};
use gametime::TimeSpan;
use pretty_assertions::assert_eq;

fn assert_time_close(actual: TimeSpan, expected_secs: f64) {
    let actual = span_nanos(actual) as f64 / 1e9;
    assert!(
        (actual - expected_secs).abs() < 1e-6,
        "expected {expected_secs}s, got {actual}s"
    );
}

const CHART: &str = r#"{
    "version": "1.0.0",
    "info": {
        "title": "Pulse",
        "artist": "Someone",
        "init_bpm": 120,
        "judge_rank": 100,
        "back_image": "back.png",
        "eyecatch_image": "eye.png"
    },
    "lines": [ { "y": 0 }, { "y": 960 } ],
    "bpm_events": [ { "y": 480, "bpm": 240 } ],
    "stop_events": [ { "y": 240, "duration": 240 } ],
    "sound_channels": [
        { "name": "a.wav", "notes": [
            { "x": 1, "y": 0, "l": 0, "c": false },
            { "x": 2, "y": 480, "l": 0, "c": false },
            { "x": 3, "y": 960, "l": 0, "c": false }
        ] },
        { "name": "b.wav", "notes": [] }
    ],
    "bga": {
        "bga_header": [ { "id": 1, "name": "clip.mp4" }, { "id": 2, "name": "still.png" } ],
        "bga_events": [ { "y": 0, "id": 1 } ],
        "layer_events": [ { "y": 480, "id": 2 } ]
    }
}"#;

fn compile_chart(options: &CompileOptions) -> CompileOutput {
    compile(ChartSource::Bmson(CHART), options, &CancelFlag::new()).unwrap()
}

#[test]
fn header_and_resources() {
    let output = compile_chart(&CompileOptions::default());
    assert_eq!(output.warnings, vec![]);
    let timeline = &output.timeline;
    let header = timeline.header();
    assert_eq!(header.title.as_deref(), Some("Pulse"));
    assert_eq!(header.tempo, Some(120.0));
    assert_eq!(header.rank, Some(100));
    assert_eq!(header.back_bmp.as_deref(), Some("back.png"));
    assert_eq!(header.mode_hint.as_deref(), Some("beat-7k"));

    let resources = timeline.resources();
    assert_eq!(resources.of_kind(ResourceKind::Sound).count(), 2);
    assert_eq!(
        resources.get(ResourceKind::Sound, 2).map(|e| e.path.as_str()),
        Some("b.wav")
    );
    assert_eq!(
        resources
            .get(ResourceKind::VideoBgaClip, 1)
            .map(|e| e.path.as_str()),
        Some("clip.mp4")
    );
    assert_eq!(resources.image(2).map(|e| e.path.as_str()), Some("still.png"));
    assert_eq!(
        resources
            .image(bms_timeline::timeline::reserved::STAGE_FILE)
            .map(|e| e.path.as_str()),
        Some("eye.png")
    );
}

#[test]
fn stops_and_tempo_changes_shift_notes() {
    let output = compile_chart(&CompileOptions::default());
    let notes: Vec<_> = output
        .timeline
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::Note)
        .collect();
    assert_eq!(notes.len(), 3);
    assert_time_close(notes[0].time, 0.0);
    // Two beats at 120 plus a one beat stop.
    assert_time_close(notes[1].time, 1.0 + 0.5);
    // Two more beats at 240.
    assert_time_close(notes[2].time, 1.5 + 0.5);

    let pause = output
        .timeline
        .events()
        .iter()
        .find(|event| event.kind == EventKind::Pause)
        .unwrap();
    assert_eq!(pause.channel, 9);
    assert_eq!(pause.payload, 240);
    assert!((pause.scalar - 0.5).abs() < 1e-9);

    let tempo = output
        .timeline
        .events()
        .iter()
        .find(|event| event.kind == EventKind::TempoChange)
        .unwrap();
    assert_eq!(tempo.channel, 3);
    assert_eq!(tempo.scalar, 240.0);
    assert_eq!(output.timeline.max_tempo(), Some(240.0));
}

#[test]
fn explicit_bar_lines() {
    let output = compile_chart(&CompileOptions::default());
    let bars = output.timeline.bar_lines();
    assert_eq!(bars.len(), 2);
    assert_time_close(bars[0], 0.0);
    assert_time_close(bars[1], 2.0);
}

#[test]
fn image_layers() {
    let output = compile_chart(&CompileOptions::default());
    let swaps: Vec<_> = output
        .timeline
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::ImageSwap)
        .map(|event| (event.channel, event.payload))
        .collect();
    assert_eq!(swaps, vec![(4, 1), (7, 2)]);
}

#[test]
fn channel_overrides_apply() {
    let options = CompileOptions {
        channel_map: ChannelMap::new().with_override(12, 19),
        ..CompileOptions::default()
    };
    let output = compile_chart(&options);
    let channels: Vec<_> = output
        .timeline
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::Note)
        .map(|event| event.channel)
        .collect();
    assert_eq!(channels, vec![11, 19, 13]);
}

#[test]
fn pop_n_lanes() {
    let source = r#"{
        "version": "1.0.0",
        "info": { "title": "p", "init_bpm": 150, "mode_hint": "popn-9k" },
        "sound_channels": [ { "name": "a.wav", "notes": [
            { "x": 5, "y": 0 }, { "x": 6, "y": 240 }, { "x": 10, "y": 480 }
        ] } ]
    }"#;
    let output = compile(ChartSource::Bmson(source), &CompileOptions::default(), &CancelFlag::new())
        .unwrap();
    let channels: Vec<_> = output
        .timeline
        .events()
        .iter()
        .map(|event| (event.kind, event.channel))
        .collect();
    assert_eq!(
        channels,
        vec![
            (EventKind::Note, 15),
            (EventKind::Note, 22),
            (EventKind::SoundTrigger, 1),
        ]
    );
    assert_eq!(
        output.warnings,
        vec![CompileWarning::Bmson(BmsonWarning::UnknownLane {
            x: 10,
            mode_hint: "popn-9k".to_string(),
        })]
    );
}

#[test]
fn broken_documents_report_their_path() {
    let err = compile(
        ChartSource::Bmson(r#"{ "info": { "title": "x", "init_bpm": 120 }, "sound_channels": [ { "name": "a", "notes": [ { "y": -1 } ] } ] }"#),
        &CompileOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap_err();
    let CompileError::Json { path, .. } = err else {
        panic!("expected a json error");
    };
    assert_eq!(path, "sound_channels[0].notes[0].y");
}

#[test]
fn cancelled_bmson_compile() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert_eq!(
        compile(ChartSource::Bmson(CHART), &CompileOptions::default(), &cancel),
        Err(CompileError::Cancelled)
    );
}

#[test]
fn a_gap_restarts_the_sound() {
    let source = r#"{
        "version": "1.0.0",
        "info": { "title": "gap", "init_bpm": 120 },
        "sound_channels": [ { "name": "voice.wav", "notes": [
            { "x": 1, "y": 0, "l": 240 },
            { "x": 2, "y": 960, "l": 240, "c": true },
            { "x": 3, "y": 1200, "c": false }
        ] } ]
    }"#;
    let output = compile(ChartSource::Bmson(source), &CompileOptions::default(), &CancelFlag::new())
        .unwrap();
    let slices: Vec<_> = output
        .timeline
        .events()
        .iter()
        .filter(|event| matches!(event.kind, EventKind::Note | EventKind::LongNoteStart))
        .map(|event| event.slice.unwrap())
        .collect();
    assert_eq!(slices.len(), 3);
    assert_time_close(slices[0].start, 0.0);
    assert_time_close(slices[0].end.unwrap(), 2.0);
    // The second note starts after the first one ended, so it plays from the top.
    assert_time_close(slices[1].start, 0.0);
    assert_time_close(slices[1].end.unwrap(), 0.5);
    // The third note starts right where the second one ends.
    assert_time_close(slices[2].start, 0.5);
    assert_eq!(slices[2].end, None);
}

#[test]
fn lane_count_comes_from_the_mode_hint() {
    let source = r#"{
        "version": "1.0.0",
        "info": { "title": "five", "init_bpm": 120, "mode_hint": "beat-5k" },
        "sound_channels": [ { "name": "a.wav", "notes": [
            { "x": 5, "y": 0 }, { "x": 6, "y": 240 }, { "x": 8, "y": 480 }
        ] } ]
    }"#;
    let output = compile(ChartSource::Bmson(source), &CompileOptions::default(), &CancelFlag::new())
        .unwrap();
    let channels: Vec<_> = output
        .timeline
        .events()
        .iter()
        .map(|event| (event.kind, event.channel))
        .collect();
    assert_eq!(
        channels,
        vec![
            (EventKind::Note, 15),
            (EventKind::SoundTrigger, 1),
            (EventKind::Note, 16),
        ]
    );
    assert_eq!(
        output.warnings,
        vec![CompileWarning::Bmson(BmsonWarning::UnknownLane {
            x: 6,
            mode_hint: "beat-5k".to_string(),
        })]
    );
}
