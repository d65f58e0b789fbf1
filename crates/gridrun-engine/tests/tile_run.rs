//! End-to-end tile runs over a 2x2 point grid.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridrun_core::{ArchiveDocument, CellIndex, Params, PointState};
use gridrun_engine::{
    CombineError, EngineConfig, EngineError, JsonArchiver, PipelineSpec, PointExecutor,
    TileReport, TileRequest, TileRun,
};
use gridrun_stages::{PointContext, Slot, Stage, StageError, StageRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;

/// 1 degree points in a 2 degree tile: four points per tile.
fn base_params() -> Value {
    json!({
        "delta": "60",
        "tdelta": "120",
        "pool_size": 4,
        "outtypes": ".txt",
        "model": {"class": "command", "command": "echo {lat} {lon}", "stdout": "result.txt"},
        "output_writer": {"class": "archive_output", "files": ["result.txt"]},
        "fallback": "archive_placeholder"
    })
}

fn grid() -> Vec<CellIndex> {
    vec![
        CellIndex::new(1, 1),
        CellIndex::new(1, 2),
        CellIndex::new(2, 1),
        CellIndex::new(2, 2),
    ]
}

async fn run_tile(
    root: &Path,
    params: Value,
    registry: &StageRegistry,
) -> Result<TileReport, EngineError> {
    let params = Arc::new(Params::from_value(params).unwrap());
    let config = EngineConfig::from_params(&params).unwrap();
    std::fs::create_dir_all(root).unwrap();
    TileRun::new(
        registry,
        params,
        config,
        TileRequest::whole(CellIndex::new(1, 1)),
        root,
    )
    .unwrap()
    .run()
    .await
}

async fn tile_document(report: &TileReport) -> ArchiveDocument {
    assert_eq!(report.archives.len(), 1);
    JsonArchiver::read(&report.archives[0].path).await.unwrap()
}

fn points_of(doc: &ArchiveDocument) -> Vec<CellIndex> {
    doc.cells.iter().map(|c| c.point).collect()
}

/// Counts invocations; optionally declines every point.
struct Counting {
    calls: Arc<AtomicUsize>,
    decline: bool,
}

#[async_trait]
impl Stage for Counting {
    fn class_name(&self) -> &'static str {
        "counting"
    }

    async fn run(&self, _ctx: &PointContext) -> Result<bool, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.decline)
    }
}

fn register_counting(registry: &mut StageRegistry, class: &str, decline: bool) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let shared = calls.clone();
    registry.register(class, move |_| {
        Ok(Arc::new(Counting {
            calls: shared.clone(),
            decline,
        }))
    });
    calls
}

/// Sleeps before writing `result.txt`, so points finish in a chosen order.
struct Delayed {
    reverse: bool,
}

#[async_trait]
impl Stage for Delayed {
    fn class_name(&self) -> &'static str {
        "delayed"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        let p = ctx.coordinate.point;
        let rank = u64::from((p.lat - 1) * 2 + (p.lon - 1));
        let rank = if self.reverse { 3 - rank } else { rank };
        tokio::time::sleep(Duration::from_millis(40 * rank)).await;
        tokio::fs::write(ctx.work_dir.join("result.txt"), p.to_string()).await?;
        Ok(true)
    }
}

#[tokio::test]
async fn test_all_points_succeed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("work");
    let report = run_tile(&root, base_params(), &StageRegistry::new())
        .await
        .unwrap();

    assert_eq!(report.manifest.len(), 4);
    assert_eq!(report.manifest.fallback_count(), 0);

    let doc = tile_document(&report).await;
    assert_eq!(doc.entry_count(), 4);
    assert_eq!(doc.fallback_count(), 0);
    assert_eq!(points_of(&doc), grid());
    assert_eq!(doc.cells[1].payload["result.txt"], "0001 0002\n");

    assert_eq!(
        report.archives[0].path,
        root.join("parts/0001/output_0001_0001.psims.json")
    );
    assert!(report.provenance.exists());
    // Point directories are removed after a successful run
    assert!(!root.join("0001").exists());
}

#[tokio::test]
async fn test_model_failure_falls_back() {
    let tmp = TempDir::new().unwrap();
    let mut params = base_params();
    params["model"] = json!({"class": "command", "command": "test {lat}_{lon} != 0001_0002"});
    params["output_writer"] = json!({"class": "archive_output", "files": ["RESULT.OUT"]});

    let report = run_tile(&tmp.path().join("work"), params, &StageRegistry::new())
        .await
        .unwrap();

    let fallen: Vec<_> = report
        .manifest
        .outcomes()
        .iter()
        .filter(|o| o.state() == PointState::FallenBack)
        .map(|o| o.coordinate.point)
        .collect();
    assert_eq!(fallen, vec![CellIndex::new(1, 2)]);

    let doc = tile_document(&report).await;
    assert_eq!(doc.entry_count(), 4);
    assert_eq!(doc.fallback_count(), 1);
    assert!(doc.cells[1].fallback);
    assert_eq!(doc.cells[1].point, CellIndex::new(1, 2));
}

#[tokio::test]
async fn test_noop_slots_are_transparent() {
    let tmp = TempDir::new().unwrap();
    let mut registry = StageRegistry::new();
    let full_calls = register_counting(&mut registry, "counting", false);

    // Unconfigured slots resolve to the no-op stage, which always succeeds
    let params = Arc::new(Params::from_value(json!({"model": "counting"})).unwrap());
    let weather = registry.resolve(&params, Slot::Weather).unwrap();
    assert_eq!(weather.class_name(), "noop");

    let full = Arc::new(PipelineSpec::build(&registry, &params).unwrap());
    let model_only = Arc::new(PipelineSpec::from_stages(
        vec![(Slot::Model, registry.resolve(&params, Slot::Model).unwrap())],
        registry.resolve(&params, Slot::Fallback).unwrap(),
    ));

    let layout = gridrun_core::WorkLayout::new(tmp.path());
    for point in grid() {
        let coordinate = gridrun_core::GridCoordinate {
            tile: CellIndex::new(1, 1),
            subtile: CellIndex::new(1, 1),
            point,
        };
        let ctx = PointContext::new(coordinate, layout.clone());
        std::fs::create_dir_all(&ctx.work_dir).unwrap();
        assert!(weather.run(&ctx).await.unwrap());

        let a = PointExecutor::new(full.clone()).execute(&ctx).await.unwrap();
        let b = PointExecutor::new(model_only.clone()).execute(&ctx).await.unwrap();
        assert_eq!(a.state(), b.state());
        assert_eq!(a.output_paths, b.output_paths);
    }
    assert_eq!(full_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_completion_order_does_not_change_output() {
    let mut documents = Vec::new();
    let mut first_finished = Vec::new();

    for reverse in [false, true] {
        let tmp = TempDir::new().unwrap();
        let mut registry = StageRegistry::new();
        registry.register("delayed", move |_| Ok(Arc::new(Delayed { reverse })));
        let mut params = base_params();
        params["model"] = json!("delayed");

        let report = run_tile(&tmp.path().join("work"), params, &registry)
            .await
            .unwrap();
        first_finished.push(report.manifest.outcomes()[0].coordinate.point);
        documents.push(tile_document(&report).await);
    }

    assert_ne!(first_finished[0], first_finished[1]);
    assert_eq!(points_of(&documents[0]), grid());
    assert_eq!(documents[0], documents[1]);
}

#[tokio::test]
async fn test_declined_points_still_produce_entries() {
    let tmp = TempDir::new().unwrap();
    let mut params = base_params();
    // Only the northern row (centre 89.5N) passes
    params["checker"] = json!({"class": "bbox_checker", "lat_min": 89, "lat_max": 90});

    let report = run_tile(&tmp.path().join("work"), params, &StageRegistry::new())
        .await
        .unwrap();

    let doc = tile_document(&report).await;
    assert_eq!(doc.entry_count(), 4);
    assert_eq!(doc.fallback_count(), 2);
    let flagged: Vec<_> = doc.cells.iter().filter(|c| c.fallback).map(|c| c.point.lat).collect();
    assert_eq!(flagged, vec![2, 2]);
}

#[tokio::test]
async fn test_later_stages_skipped_after_decline() {
    let tmp = TempDir::new().unwrap();
    let mut registry = StageRegistry::new();
    let weather_calls = register_counting(&mut registry, "declining", true);
    let writer_calls = register_counting(&mut registry, "counting_writer", false);

    let mut params = base_params();
    params["weather_stage"] = json!("declining");
    params["input_writer"] = json!("counting_writer");

    let report = run_tile(&tmp.path().join("work"), params, &registry)
        .await
        .unwrap();

    assert_eq!(weather_calls.load(Ordering::SeqCst), 4);
    assert_eq!(writer_calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.manifest.fallback_count(), 4);
    assert!(report
        .manifest
        .outcomes()
        .iter()
        .all(|o| o.state().is_terminal()));

    let doc = tile_document(&report).await;
    assert_eq!(doc.entry_count(), 4);
    assert_eq!(doc.fallback_count(), 4);
}

#[tokio::test]
async fn test_missing_fallback_output_fails_combine() {
    let tmp = TempDir::new().unwrap();
    let mut params = base_params();
    params["model"] = json!({"class": "command", "command": "false"});
    // A no-op fallback leaves nothing behind
    params["fallback"] = json!("noop");

    let err = run_tile(&tmp.path().join("work"), params, &StageRegistry::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Combine(CombineError::MissingPoint { .. })
    ));
}

#[tokio::test]
async fn test_rerun_in_same_workdir_ignores_earlier_archives() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("work");
    let first = run_tile(&root, base_params(), &StageRegistry::new())
        .await
        .unwrap();
    assert_eq!(tile_document(&first).await.fallback_count(), 0);

    // Every point now falls back to a stage that writes nothing
    let mut params = base_params();
    params["model"] = json!({"class": "command", "command": "false"});
    params["fallback"] = json!("noop");
    let err = run_tile(&root, params.clone(), &StageRegistry::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Combine(CombineError::MissingPoint { .. })
    ));
    assert!(!root.join("outputs/output_0001_0001.psims.json").exists());

    // With a placeholder fallback the tile reflects this run only
    params["fallback"] = json!("archive_placeholder");
    let third = run_tile(&root, params, &StageRegistry::new())
        .await
        .unwrap();
    assert_eq!(third.manifest.fallback_count(), 4);
    let doc = tile_document(&third).await;
    assert_eq!(doc.entry_count(), 4);
    assert_eq!(doc.fallback_count(), 4);
}

#[tokio::test]
async fn test_unknown_class_aborts_before_any_point() {
    let tmp = TempDir::new().unwrap();
    let mut params = base_params();
    params["pre_stage"] = json!({"class": "camp2json"});

    let params = Arc::new(Params::from_value(params).unwrap());
    let err = TileRun::new(
        &StageRegistry::new(),
        params.clone(),
        EngineConfig::from_params(&params).unwrap(),
        TileRequest::whole(CellIndex::new(1, 1)),
        tmp.path(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert!(err.to_string().contains("camp2json"));
    assert!(!tmp.path().join("0001").exists());
}

#[tokio::test]
async fn test_stage_out_and_keep_point_dirs() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("work");
    let rundir = tmp.path().join("run");
    let mut params = base_params();
    params["rundir"] = json!(rundir.to_str().unwrap());
    params["keep_point_dirs"] = json!(true);

    run_tile(&root, params, &StageRegistry::new()).await.unwrap();

    assert!(rundir.join("parts/0001/output_0001_0001.psims.json").exists());
    assert!(rundir.join("outputs/outputs_0001_0001.tar").exists());
    assert!(root.join("0002/0002/result.txt").exists());
    assert!(root.join("0002/0002/output.tar.gz").exists());
}

#[tokio::test]
async fn test_single_point_debug_run() {
    let tmp = TempDir::new().unwrap();
    let params = Arc::new(Params::from_value(base_params()).unwrap());
    let run = TileRun::new(
        &StageRegistry::new(),
        params.clone(),
        EngineConfig::from_params(&params).unwrap(),
        TileRequest::whole(CellIndex::new(1, 1)),
        tmp.path(),
    )
    .unwrap();

    let outcome = run.run_point(CellIndex::new(2, 1)).await.unwrap();
    assert_eq!(outcome.state(), PointState::Succeeded);
    let archive = tmp.path().join("outputs/output_0002_0001.psims.json");
    assert!(archive.exists());
    assert!(outcome.output_paths.contains(&archive));
    assert!(outcome
        .output_paths
        .contains(&tmp.path().join("0002/0001/result.txt")));
    assert!(!tmp.path().join("parts").exists());
    assert!(!tmp.path().join("0001").exists());
}
