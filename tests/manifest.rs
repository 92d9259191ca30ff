use std::fs;
use std::path::PathBuf;

use clip_dataset::config::DatasetConfig;
use clip_dataset::error::DatasetError;
use clip_dataset::manifest::Manifest;
use clip_dataset::sampling::Mode;
use tempfile::tempdir;

fn config_for(dir: &std::path::Path) -> DatasetConfig {
    let mut cfg = DatasetConfig::default();
    cfg.data.path_to_data_dir = dir.to_path_buf();
    cfg
}

#[test]
fn parses_all_three_line_shapes() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("train.csv"),
        "clips/a.mp4,3\nclips/b.mp4,ignored,7\nclips/c.mp4\n",
    )
    .unwrap();
    let manifest = Manifest::load(&config_for(temp.path()), Mode::Train).unwrap();

    assert_eq!(manifest.len(), 3);
    let entries = manifest.entries();
    assert!(entries[0].path.ends_with("a.mp4"));
    assert_eq!(entries[0].label, 3);
    assert_eq!(entries[0].spatial_temporal_index, 0);
    assert_eq!(entries[1].label, 7);
    assert_eq!(entries[2].label, 0);
    assert!(entries.iter().all(|e| e.spatial_temporal_index == 0));
}

#[test]
fn custom_separator_and_prefix() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("val.csv"), "a.mp4 12\nb.mp4 4\n").unwrap();
    let mut cfg = config_for(temp.path());
    cfg.data.path_label_separator = " ".into();
    cfg.data.path_prefix = PathBuf::from("/datasets/kinetics");

    let manifest = Manifest::load(&cfg, Mode::Val).unwrap();
    assert_eq!(
        manifest.get(1).map(|e| e.path.clone()),
        Some(PathBuf::from("/datasets/kinetics/b.mp4"))
    );
    assert_eq!(manifest.get(0).map(|e| e.label), Some(12));
}

#[test]
fn missing_manifest_is_fatal() {
    let temp = tempdir().unwrap();
    let err = Manifest::load(&config_for(temp.path()), Mode::Test).unwrap_err();
    match err {
        DatasetError::ManifestMissing(path) => assert!(path.ends_with("test.csv")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn four_field_line_is_rejected() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("train.csv"), "a.mp4,1\nb.mp4,x,y,2\n").unwrap();
    let err = Manifest::load(&config_for(temp.path()), Mode::Train).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::ManifestLine {
            line: 2,
            fields: 4,
            ..
        }
    ));
}

#[test]
fn non_numeric_label_is_rejected() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("train.csv"), "a.mp4,dance\n").unwrap();
    let err = Manifest::load(&config_for(temp.path()), Mode::Train).unwrap_err();
    assert!(matches!(err, DatasetError::ManifestLabel { line: 1, .. }));
}

#[test]
fn empty_manifest_is_fatal() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("val.csv"), "\n\n").unwrap();
    let err = Manifest::load(&config_for(temp.path()), Mode::Val).unwrap_err();
    assert!(matches!(err, DatasetError::EmptyManifest { .. }));
}

#[test]
fn chunked_manifest_walks_windows_and_rewinds() {
    let temp = tempdir().unwrap();
    let rows: String = (0..5).map(|i| format!("v{i}.mp4,{i}\n")).collect();
    fs::write(temp.path().join("train.csv"), rows).unwrap();
    let mut cfg = config_for(temp.path());
    cfg.data.loader_chunk_size = 2;

    let mut manifest = Manifest::load(&cfg, Mode::Train).unwrap();
    let labels = |m: &Manifest| m.entries().iter().map(|e| e.label).collect::<Vec<_>>();
    assert_eq!(labels(&manifest), vec![0, 1]);

    assert!(manifest.advance_chunk(&cfg, Mode::Train).unwrap());
    assert_eq!(labels(&manifest), vec![2, 3]);
    assert!(manifest.advance_chunk(&cfg, Mode::Train).unwrap());
    assert_eq!(labels(&manifest), vec![4]);

    // Offset 6 is past the end: the cursor rewinds to the first row.
    assert!(manifest.advance_chunk(&cfg, Mode::Train).unwrap());
    assert_eq!(manifest.skip_rows(), 0);
    assert_eq!(labels(&manifest), vec![0, 1]);
}

#[test]
fn blank_only_window_rewinds_instead_of_failing() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("train.csv"), "a.mp4,1\nb.mp4,2\n\n").unwrap();
    let mut cfg = config_for(temp.path());
    cfg.data.loader_chunk_size = 2;

    let mut manifest = Manifest::load(&cfg, Mode::Train).unwrap();
    assert!(manifest.advance_chunk(&cfg, Mode::Train).unwrap());
    assert_eq!(manifest.skip_rows(), 0);
    let labels: Vec<i64> = manifest.entries().iter().map(|e| e.label).collect();
    assert_eq!(labels, vec![1, 2]);
}

#[test]
fn failed_advance_keeps_current_window() {
    let temp = tempdir().unwrap();
    let rows: String = (0..4).map(|i| format!("v{i}.mp4,{i}\n")).collect();
    let manifest_path = temp.path().join("train.csv");
    fs::write(&manifest_path, rows).unwrap();
    let mut cfg = config_for(temp.path());
    cfg.data.loader_chunk_size = 2;

    let mut manifest = Manifest::load(&cfg, Mode::Train).unwrap();
    fs::remove_file(&manifest_path).unwrap();
    assert!(matches!(
        manifest.advance_chunk(&cfg, Mode::Train),
        Err(DatasetError::ManifestMissing(_))
    ));
    assert_eq!(manifest.skip_rows(), 0);
    let labels: Vec<i64> = manifest.entries().iter().map(|e| e.label).collect();
    assert_eq!(labels, vec![0, 1]);
}

#[test]
fn chunking_only_applies_to_train() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("val.csv"), "a.mp4,1\nb.mp4,2\nc.mp4,3\n").unwrap();
    let mut cfg = config_for(temp.path());
    cfg.data.loader_chunk_size = 1;

    let mut manifest = Manifest::load(&cfg, Mode::Val).unwrap();
    assert_eq!(manifest.len(), 3);
    assert!(!manifest.advance_chunk(&cfg, Mode::Val).unwrap());
}
