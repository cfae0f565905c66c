//! Integration tests for highrate-cddis
//!
//! Drive the orchestrator against an in-memory archive and a fake
//! converter. Nothing here touches the network.

mod common;

use std::collections::BTreeSet;
use std::fs;

use common::{FOUR_SLOTS, FakeConverter, archive, config, gzip, local, remote_path, request};
use highrate_cddis::{RunError, Stage, run_with};
use highrate_core::ProgressContext;
use tempfile::TempDir;

#[test]
fn end_to_end_extract() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);

    let summary = run_with(
        &request("BRST00FRA", true, false),
        &config,
        archive.clone(),
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(summary.counts.succeeded, 4);
    assert_eq!(summary.counts.failed, 0);
    assert_eq!(summary.counts.skipped, 0);
    assert_eq!(summary.retrievals, 4);
    assert!(!summary.interrupted);
    for (day, hour) in FOUR_SLOTS {
        let crx = local(&config, "BRST00FRA", day, hour, ".crx");
        let body = fs::read_to_string(&crx).unwrap();
        assert_eq!(body, format!("BRST00FRA {day} {hour} observations\n"));
    }
    assert!(summary.outcomes.iter().all(|o| o.stage == Some(Stage::Decompressed)));
}

#[test]
fn second_run_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    let req = request("BRST00FRA", true, false);
    let progress = ProgressContext::hidden();

    run_with(&req, &config, archive.clone(), None, &progress).unwrap();
    let before = archive.retrievals();

    let summary = run_with(&req, &config, archive.clone(), None, &progress).unwrap();
    assert_eq!(summary.counts.skipped, 4);
    assert_eq!(summary.counts.succeeded, 0);
    assert_eq!(summary.retrievals, 0);
    assert_eq!(archive.retrievals(), before);
}

#[test]
fn missing_hour_fails_alone() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &[("300", "00"), ("300", "01"), ("301", "00")]);

    let summary = run_with(
        &request("BRST00FRA", true, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(summary.counts.succeeded, 3);
    assert_eq!(summary.counts.failed, 1);
    let failures: Vec<_> = summary.failures().collect();
    assert_eq!((failures[0].day.as_str(), failures[0].hour.as_str()), ("301", "01"));
    assert_eq!(failures[0].error.as_ref().unwrap().kind, "remote-not-found");
    assert!(summary.has_failures());
}

#[test]
fn station_absent_from_hour_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["ABMF00GLP"], &FOUR_SLOTS);

    let summary = run_with(
        &request("BRST00FRA", false, false),
        &config,
        archive.clone(),
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(summary.counts.failed, 4);
    assert_eq!(archive.retrievals(), 0);
    assert!(summary
        .failures()
        .all(|o| o.error.as_ref().unwrap().kind == "remote-not-found"));
}

#[test]
fn wildcard_resolves_stations() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["ABMF00GLP", "BRST00FRA"], &FOUR_SLOTS);

    let summary = run_with(
        &request("all", false, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(summary.counts.succeeded, 8);
    let stations: BTreeSet<_> = summary.outcomes.iter().map(|o| o.station.as_str()).collect();
    assert_eq!(stations, BTreeSet::from(["ABMF00GLP", "BRST00FRA"]));
    assert!(local(&config, "ABMF00GLP", "301", "01", ".crx.gz").exists());
    assert!(local(&config, "BRST00FRA", "300", "00", ".crx.gz").exists());
    // Download only: nothing extracted
    assert!(!local(&config, "BRST00FRA", "300", "00", ".crx").exists());
}

#[test]
fn transient_resets_are_retried() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    archive.0.borrow_mut().resets = 3;

    let summary = run_with(
        &request("BRST00FRA", true, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(summary.counts.succeeded, 4);
    assert_eq!(summary.retries, 3);
    assert_eq!(summary.retrievals, 7);
}

#[test]
fn corrupt_archive_is_refetched_next_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    archive.put(remote_path("BRST00FRA", "300", "00"), b"not a gzip stream".to_vec());
    let req = request("BRST00FRA", true, false);
    let progress = ProgressContext::hidden();

    let summary = run_with(&req, &config, archive.clone(), None, &progress).unwrap();
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.counts.succeeded, 3);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.error.as_ref().unwrap().kind, "corrupt-archive");
    assert!(!local(&config, "BRST00FRA", "300", "00", ".crx.gz").exists());

    // Archive repaired: only the corrupt file is fetched again
    archive.put(remote_path("BRST00FRA", "300", "00"), gzip(b"fixed\n"));
    let before = archive.retrievals();
    let summary = run_with(&req, &config, archive.clone(), None, &progress).unwrap();
    assert_eq!(summary.counts.succeeded, 1);
    assert_eq!(summary.counts.skipped, 3);
    assert_eq!(archive.retrievals() - before, 1);
    assert_eq!(
        fs::read(local(&config, "BRST00FRA", "300", "00", ".crx")).unwrap(),
        b"fixed\n"
    );
}

#[test]
fn convert_with_cleanup() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.keep_intermediates = false;
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    let converter = FakeConverter::default();
    let req = request("BRST00FRA", false, true);
    let progress = ProgressContext::hidden();

    let summary = run_with(&req, &config, archive.clone(), Some(&converter), &progress).unwrap();
    assert_eq!(summary.counts.succeeded, 4);
    assert_eq!(*converter.calls.borrow(), 4);

    let rnx = local(&config, "BRST00FRA", "300", "01", ".rnx");
    assert!(fs::read_to_string(&rnx).unwrap().starts_with("RINEX 3.04\n"));
    assert!(!local(&config, "BRST00FRA", "300", "01", ".crx").exists());
    assert!(!local(&config, "BRST00FRA", "300", "01", ".crx.gz").exists());

    // Converted files satisfy the request on their own
    let summary = run_with(&req, &config, archive, Some(&converter), &progress).unwrap();
    assert_eq!(summary.counts.skipped, 4);
    assert_eq!(*converter.calls.borrow(), 4);
}

#[test]
fn convert_resumes_from_decompressed() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    let progress = ProgressContext::hidden();

    run_with(&request("BRST00FRA", true, false), &config, archive.clone(), None, &progress).unwrap();
    let before = archive.retrievals();

    let converter = FakeConverter::default();
    let summary = run_with(
        &request("BRST00FRA", true, true),
        &config,
        archive.clone(),
        Some(&converter),
        &progress,
    )
    .unwrap();
    assert_eq!(summary.counts.succeeded, 4);
    assert_eq!(archive.retrievals(), before);
    assert!(summary.outcomes.iter().all(|o| o.stage == Some(Stage::Converted)));
    // Intermediates kept by default
    assert!(local(&config, "BRST00FRA", "301", "00", ".crx.gz").exists());
}

#[test]
fn failed_conversion_is_refetched_next_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    let req = request("BRST00FRA", false, true);
    let progress = ProgressContext::hidden();

    let broken = FakeConverter::failing();
    let summary = run_with(&req, &config, archive.clone(), Some(&broken), &progress).unwrap();
    assert_eq!(summary.counts.failed, 4);
    assert!(summary
        .failures()
        .all(|o| o.error.as_ref().unwrap().kind == "conversion" && o.stage.is_none()));
    assert!(!local(&config, "BRST00FRA", "300", "00", ".crx").exists());
    assert!(!local(&config, "BRST00FRA", "300", "00", ".crx.gz").exists());

    let before = archive.retrievals();
    let converter = FakeConverter::default();
    let summary = run_with(&req, &config, archive.clone(), Some(&converter), &progress).unwrap();
    assert_eq!(summary.counts.succeeded, 4);
    assert_eq!(archive.retrievals() - before, 4);
    assert_eq!(*converter.calls.borrow(), 4);
}

#[test]
fn convert_without_converter_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);

    let err = run_with(
        &request("BRST00FRA", true, true),
        &config,
        archive.clone(),
        None,
        &ProgressContext::hidden(),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::ConverterUnavailable { .. }));
    assert_eq!(archive.retrievals(), 0);
}

#[test]
fn unreachable_archive_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);
    archive.0.borrow_mut().refuse_connections = true;

    let err = run_with(
        &request("BRST00FRA", true, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Connection(_)));
}

#[test]
fn stale_partials_are_cleaned() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let stale = local(&config, "BRST00FRA", "300", "00", ".crx.gz.part");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, b"half a download").unwrap();
    let archive = archive(&["BRST00FRA"], &FOUR_SLOTS);

    let summary = run_with(
        &request("BRST00FRA", false, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();
    assert_eq!(summary.counts.succeeded, 4);
    assert!(!stale.exists());
    assert!(local(&config, "BRST00FRA", "300", "00", ".crx.gz").exists());
}

#[test]
fn missing_day_directory() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let archive = archive(&["BRST00FRA"], &[("300", "00"), ("300", "01")]);

    let summary = run_with(
        &request("BRST00FRA", false, false),
        &config,
        archive,
        None,
        &ProgressContext::hidden(),
    )
    .unwrap();
    assert_eq!(summary.counts.succeeded, 2);
    assert_eq!(summary.counts.failed, 2);
    assert!(summary.failures().all(|o| o.day == "301"));
}
