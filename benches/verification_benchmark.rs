use criterion::{Criterion, black_box, criterion_group, criterion_main};
use replay_verify::evidence::EvidenceGatherer;
use replay_verify::plan::TestStep;
use replay_verify::report::{DeviationReport, StepStatus, VerificationResult, result_from_evidence};
use replay_verify::timeline::{TimelineEvent, VideoTimeline};
use replay_verify::triage::{TriageClassifier, VerifyRoute};

fn synthetic_timeline() -> VideoTimeline {
    let events = (0..100)
        .map(|i| TimelineEvent {
            timestamp: i as f64 * 1.2,
            frame_number: i as u32 * 2,
            event_type: if i % 3 == 0 { "click" } else { "ui_change" }.to_string(),
            description: format!("panel {} opened after toolbar click", i / 5),
            ui_elements: vec!["toolbar".to_string(), format!("panel-{}", i / 5)],
            text_visible: Vec::new(),
            confidence: 0.6 + (i % 4) as f64 * 0.1,
        })
        .collect();
    VideoTimeline::new(
        120.0,
        240,
        events,
        "A long recorded session across twenty panels.".to_string(),
        Vec::new(),
    )
}

fn synthetic_steps() -> Vec<TestStep> {
    (1..=20)
        .map(|n| TestStep {
            step_number: n,
            description: format!("Open panel {}", n - 1),
            action: format!("click the toolbar entry for panel {}", n - 1),
            expected_outcome: None,
        })
        .collect()
}

fn benchmark_evidence_gathering(c: &mut Criterion) {
    let timeline = synthetic_timeline();
    let steps = synthetic_steps();

    c.bench_function("evidence_gathering", |b| {
        b.iter(|| {
            let gatherer = EvidenceGatherer::new(black_box(&timeline));
            black_box(gatherer.gather(black_box(&steps)))
        })
    });
}

fn benchmark_triage_classification(c: &mut Criterion) {
    let timeline = synthetic_timeline();
    let steps = synthetic_steps();
    let evidence = EvidenceGatherer::new(&timeline).gather(&steps);
    let classifier = TriageClassifier::default();

    c.bench_function("triage_classification", |b| {
        b.iter(|| {
            for (step, item) in steps.iter().zip(&evidence) {
                black_box(classifier.classify(black_box(step), black_box(item)));
            }
        })
    });
}

fn benchmark_report_assembly(c: &mut Criterion) {
    let timeline = synthetic_timeline();
    let steps = synthetic_steps();
    let evidence = EvidenceGatherer::new(&timeline).gather(&steps);
    let results: Vec<VerificationResult> = steps
        .iter()
        .zip(&evidence)
        .map(|(step, item)| {
            result_from_evidence(
                step,
                item,
                StepStatus::Observed,
                item.confidence,
                item.reasoning.clone(),
                VerifyRoute::CodeBased,
            )
        })
        .collect();

    c.bench_function("report_assembly", |b| {
        b.iter(|| {
            black_box(DeviationReport::from_results(
                "bench-test",
                black_box(results.clone()),
            ))
        })
    });
}

criterion_group!(
    benches,
    benchmark_evidence_gathering,
    benchmark_triage_classification,
    benchmark_report_assembly
);
criterion_main!(benches);
