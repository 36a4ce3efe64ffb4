use std::sync::Arc;

use casfs::cas::{Cas, CasOptions};
use casfs::cli::{Command, OutputMode, run_with_format};
use casfs::extent::{ExtentPacker, ExtentPackerConfig};
use casfs::path_map::PathMapperOptions;
use casfs::storage::{FsBlobStorage, FsMetadataStore};
use casfs::vfs::Vfs;

fn harness() -> (Cas, Vfs, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let blob_backend = Arc::new(FsBlobStorage::new(dir.path().to_path_buf()));
    let metadata = Arc::new(FsMetadataStore::new(dir.path().join("metadata")));

    let cas = Cas::new(
        blob_backend.clone(),
        CasOptions {
            path_mapper: PathMapperOptions { base_dir: "objects".to_string(), prefix_len: 2 },
            ..Default::default()
        },
    );
    let packer = Arc::new(ExtentPacker::new(
        blob_backend,
        metadata,
        ExtentPackerConfig { extents_base_dir: "extents".to_string(), ..Default::default() },
    ));
    let vfs = Vfs::new(packer);
    (cas, vfs, dir)
}

#[tokio::test]
async fn mkdir_then_ls_and_stat_round_trip_through_the_cli() {
    let (cas, vfs, _dir) = harness();

    run_with_format(
        &cas,
        &vfs,
        Command::Mkdir { path: "/notes".to_string(), recursive: true, mode: 0o755 },
        OutputMode::Plain,
    )
    .await
    .unwrap();

    run_with_format(&cas, &vfs, Command::Ls { path: "/".to_string() }, OutputMode::Json)
        .await
        .unwrap();
    run_with_format(&cas, &vfs, Command::Stat { path: "/notes".to_string() }, OutputMode::Plain)
        .await
        .unwrap();

    assert!(vfs.exists("/notes"));
}

#[tokio::test]
async fn feature_list_and_toggle_round_trip() {
    let (cas, vfs, _dir) = harness();

    run_with_format(&cas, &vfs, Command::FeatureList, OutputMode::Json).await.unwrap();
    run_with_format(
        &cas,
        &vfs,
        Command::FeatureEnable { name: "branch-overlay".to_string() },
        OutputMode::Plain,
    )
    .await
    .unwrap();
    assert!(casfs::feature_flags::is_enabled("branch-overlay"));

    run_with_format(
        &cas,
        &vfs,
        Command::FeatureDisable { name: "branch-overlay".to_string() },
        OutputMode::Plain,
    )
    .await
    .unwrap();
    assert!(!casfs::feature_flags::is_enabled("branch-overlay"));
}

#[tokio::test]
async fn stats_command_runs_without_error() {
    let (cas, vfs, _dir) = harness();
    run_with_format(&cas, &vfs, Command::Stats, OutputMode::Human).await.unwrap();
}
