mod common;

use common::{page_count, taxonomy, test_config, write_pdf, StubOracle};
use estate_organizer::{
    config::{Config, ConfigError},
    ocr::NoOcr,
    organize::{ActionKind, ActionStatus},
    pipeline::Pipeline,
    report::Manifest,
};
use std::path::{Path, PathBuf};

const LABELS: [&str; 6] = ["Will", "Will", "Trust", "Trust", "Recipe", "Recipe"];

fn config(window_size: i64) -> Config {
    let mut cfg = test_config();
    cfg.windowing.window_size = window_size;
    cfg
}

fn estate_inputs(dir: &Path) {
    write_pdf(
        &dir.join("a.pdf"),
        &["will p1", "will p2", "trust p1", "trust p2", "misc p1", "misc p2"],
    );
    write_pdf(&dir.join("b.pdf"), &["codicil p1", "codicil p2"]);
}

fn destinations(report: &estate_organizer::report::RunReport) -> Vec<PathBuf> {
    report
        .pdfs
        .iter()
        .flat_map(|p| p.outcomes.iter())
        .map(|o| o.action.destination.clone())
        .collect()
}

#[test]
fn organizes_a_directory_of_pdfs() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    estate_inputs(input.path());

    let oracle = StubOracle::new(&[0, 2, 4], &LABELS);
    let pipeline = Pipeline::new(&config(3), taxonomy(&["Will", "Trust", "Other"]), oracle, NoOcr).unwrap();
    let report = pipeline.run(input.path(), out.path()).unwrap();

    assert!(report.is_success());
    assert_eq!(report.pdfs.len(), 2);

    let a = &report.pdfs[0];
    assert_eq!(a.page_count, 6);
    assert_eq!(a.windows, 3);
    assert_eq!(a.undetermined_windows, 0);
    assert_eq!(a.fallback_labels, 3);
    let cats: Vec<&str> = a
        .outcomes
        .iter()
        .map(|o| o.action.document.category.as_str())
        .collect();
    assert_eq!(cats, vec!["Will", "Trust", "Other"]);

    assert_eq!(page_count(&out.path().join("Will").join("a_pages_1-2.pdf")), 2);
    assert_eq!(page_count(&out.path().join("Trust").join("a_pages_3-4.pdf")), 2);
    assert_eq!(page_count(&out.path().join("Other").join("a_pages_5-6.pdf")), 2);

    let b = &report.pdfs[1];
    assert_eq!(b.outcomes.len(), 1);
    assert_eq!(b.outcomes[0].action.kind, ActionKind::Copy);
    assert_eq!(
        std::fs::read(out.path().join("Will").join("b.pdf")).unwrap(),
        std::fs::read(input.path().join("b.pdf")).unwrap()
    );

    let raw = std::fs::read_to_string(out.path().join("organizer-manifest.yaml")).unwrap();
    let manifest: Manifest = serde_yaml::from_str(&raw).unwrap();
    assert_eq!(manifest.run_id, report.run_id);
    assert_eq!(manifest.documents.len(), 4);
    assert_eq!(manifest.documents[2].document_type, "Other");
    assert!(manifest.documents[2].fallback);
    assert_eq!(manifest.documents[2].start_page, 5);
    assert!(manifest.failures.is_empty());
}

#[test]
fn dry_run_plans_what_a_real_run_writes() {
    let input = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("organized");
    estate_inputs(input.path());
    let tax = taxonomy(&["Will", "Trust", "Other"]);

    let mut dry_cfg = config(3);
    dry_cfg.output.dry_run = true;
    let dry = Pipeline::new(&dry_cfg, tax.clone(), StubOracle::new(&[0, 2, 4], &LABELS), NoOcr)
        .unwrap()
        .run(input.path(), &out)
        .unwrap();
    assert!(dry.dry_run);
    assert!(!out.exists());
    assert!(dry
        .pdfs
        .iter()
        .flat_map(|p| p.outcomes.iter())
        .all(|o| o.status == ActionStatus::Planned));

    let real = Pipeline::new(&config(3), tax, StubOracle::new(&[0, 2, 4], &LABELS), NoOcr)
        .unwrap()
        .run(input.path(), &out)
        .unwrap();
    assert_eq!(destinations(&dry), destinations(&real));
    assert!(destinations(&real).iter().all(|p| p.is_file()));
}

#[test]
fn second_run_does_not_clobber_the_first() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    estate_inputs(input.path());
    let tax = taxonomy(&["Will", "Trust", "Other"]);

    for _ in 0..2 {
        Pipeline::new(&config(3), tax.clone(), StubOracle::new(&[0, 2, 4], &LABELS), NoOcr)
            .unwrap()
            .run(input.path(), out.path())
            .unwrap();
    }
    assert!(out.path().join("Will").join("a_pages_1-2.pdf").is_file());
    assert!(out.path().join("Will").join("a_pages_1-2_1.pdf").is_file());
    assert!(out.path().join("Will").join("b_1.pdf").is_file());
}

#[test]
fn failed_windows_abstain_and_the_pdf_still_lands() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    estate_inputs(input.path());

    let mut oracle = StubOracle::new(&[0, 2, 4], &LABELS);
    oracle.fail_windows.insert(1);
    let pipeline = Pipeline::new(&config(3), taxonomy(&["Will", "Trust", "Other"]), oracle, NoOcr).unwrap();
    let report = pipeline.run(input.path(), out.path()).unwrap();

    assert!(report.is_success());
    let a = &report.pdfs[0];
    assert_eq!(a.undetermined_windows, 1);
    let ranges: Vec<(usize, usize)> = a
        .outcomes
        .iter()
        .map(|o| (o.action.document.start, o.action.document.end))
        .collect();
    assert_eq!(ranges, vec![(0, 2), (2, 4), (4, 6)]);
}

#[test]
fn unreadable_pdf_is_reported_and_skipped() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    estate_inputs(input.path());
    std::fs::write(input.path().join("broken.pdf"), b"not a pdf at all").unwrap();
    std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

    let pipeline = Pipeline::new(
        &config(3),
        taxonomy(&["Will", "Trust", "Other"]),
        StubOracle::new(&[0, 2, 4], &LABELS),
        NoOcr,
    )
    .unwrap();
    let report = pipeline.run(input.path(), out.path()).unwrap();

    assert_eq!(report.pdfs.len(), 3);
    assert_eq!(report.failed_pdfs(), 1);
    assert!(!report.is_success());
    assert!(report.pdfs[2].source.ends_with("broken.pdf"));
    assert!(report.pdfs[2].error.is_some());
    assert!(out.path().join("Trust").join("a_pages_3-4.pdf").is_file());

    let manifest: Manifest =
        serde_yaml::from_str(&std::fs::read_to_string(out.path().join("organizer-manifest.yaml")).unwrap())
            .unwrap();
    assert_eq!(manifest.failures.len(), 1);
}

#[test]
fn single_window_covers_short_pdf() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_pdf(&input.path().join("short.pdf"), &["one", "two"]);

    let pipeline = Pipeline::new(
        &config(5),
        taxonomy(&["Will", "Other"]),
        StubOracle::new(&[0], &["Will", "Will"]),
        NoOcr,
    )
    .unwrap();
    let report = pipeline.run(input.path(), out.path()).unwrap();
    assert_eq!(report.pdfs[0].windows, 1);
    assert!(out.path().join("Will").join("short.pdf").is_file());
}

#[test]
fn bad_inputs_are_configuration_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let tax = taxonomy(&["Other"]);

    assert!(matches!(
        Pipeline::new(&config(0), tax.clone(), StubOracle::new(&[], &[]), NoOcr),
        Err(ConfigError::InvalidWindowSize(0))
    ));

    let pipeline = Pipeline::new(&config(3), tax, StubOracle::new(&[], &[]), NoOcr).unwrap();
    let err = pipeline
        .run(&tmp.path().join("missing"), &tmp.path().join("out"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidInput { .. })
    ));
}
