use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec2;

use viewscape_core::config::ViewConfig;
use viewscape_core::enums::{BackendPreference, Visibility};
use viewscape_core::types::GridCell;
use viewscape_metrics::{Metric, MetricError, MetricTable};
use viewscape_terrain::{synth, ScaleData, TileStack};

use crate::accel::{select_on, AccelEngine, Device};
use crate::artifacts::{write_artifact, Artifact, DirectorySink, MemorySink};
use crate::batch::{CancelToken, CumulativeRaster, ExecutionMode, MultiViewshedTask, ObserverFeature};
use crate::cpu::CpuEngine;
use crate::error::EngineError;
use crate::multi::MultiResolutionEngine;
use crate::query::{ShedPlan, ShedQuery, TanPlan, TanQuery};
use crate::sweep::TanColumn;
use crate::view::ViewEngine;

fn config() -> ViewConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ViewConfig {
        angular_resolution: std::f64::consts::TAU / 64.0,
        ..Default::default()
    }
}

fn device() -> Device {
    Device {
        name: "test".to_string(),
        compute_units: 2,
    }
}

fn flat10() -> Arc<ScaleData> {
    Arc::new(synth::flat(10, 10, 1.0).unwrap())
}

// ---- Multi-resolution ----

#[test]
fn test_single_tile_multi_matches_cpu() {
    let tile = Arc::new(synth::random_tile(3, 14, 14, 1.0, 4).unwrap());
    let cpu = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let multi = MultiResolutionEngine::new(Arc::new(TileStack::single(Arc::clone(&tile))), &config()).unwrap();
    for (col, row) in [(0, 0), (6, 7), (13, 2)] {
        let q = ShedQuery::new(tile.cell_center(col, row)).with_observer_height(2.0);
        let a = cpu.calc_view_shed(&q).unwrap();
        let b = multi.calc_view_shed(&q).unwrap();
        assert_eq!(a.samples(), b.samples());

        let tq = TanQuery::new(tile.cell_center(col, row)).with_observer_height(2.0);
        let ra = cpu.calc_view_tan_raw(&tq).unwrap();
        let rb = multi.calc_view_tan_raw(&tq).unwrap();
        assert!(ra.bits_eq(&rb));
    }
}

/// Fine 21x21 tile at 1 m centered inside a coarse 21x21 tile at 10 m
/// whose ground sits at 50 m. With `wall`, a 100 m ring surrounds the
/// observer between 3 and 7.5 m on the fine tile only.
fn nested_stack(wall: bool) -> Arc<TileStack> {
    let n = 21;
    let observer = DVec2::new(105.0, -105.0);
    let origin = DVec2::new(94.5, -94.5);
    let mut fine = vec![0.0; n * n];
    if wall {
        for row in 0..n {
            for col in 0..n {
                let center = origin + DVec2::new(col as f64 + 0.5, -(row as f64 + 0.5));
                let d = center.distance(observer);
                if (3.0..=7.5).contains(&d) {
                    fine[row * n + col] = 100.0;
                }
            }
        }
    }
    let fine = ScaleData::with_origin(n, n, origin, 1.0, fine).unwrap();
    let coarse = ScaleData::with_origin(n, n, DVec2::ZERO, 10.0, vec![50.0; n * n]).unwrap();
    Arc::new(TileStack::new([Arc::new(coarse), Arc::new(fine)], 8.0).unwrap())
}

#[test]
fn test_near_occluder_hides_coarse_terrain() {
    let observer = DVec2::new(105.0, -105.0);
    let fine_len = 21 * 21;
    for wall in [true, false] {
        let engine = MultiResolutionEngine::new(nested_stack(wall), &config()).unwrap();
        assert_eq!(engine.stack().primary().resolution(), 1.0);

        let tan = engine
            .calc_view_tan(&TanQuery::new(observer).with_observer_height(1.6))
            .unwrap();
        let coarse_seen = tan.cells().iter().any(|&c| c >= fine_len as i64);
        assert_eq!(coarse_seen, !wall, "tangential, wall = {wall}");
        if !wall {
            let (az, v) = (0..tan.n_azimuth())
                .flat_map(|az| (0..tan.n_vertical()).map(move |v| (az, v)))
                .find(|&(az, v)| tan.cell(az, v) >= fine_len as i64)
                .unwrap();
            assert_eq!(tan.look_back(az, v).map(|(tile, _)| tile), Some(1));
        }

        let shed = engine
            .calc_view_shed(&ShedQuery::new(observer).with_observer_height(1.6))
            .unwrap();
        assert_eq!(shed.resolution(), 1.0);
        assert_eq!((shed.window().cols, shed.window().rows), (21, 21));
        // Eight cells east: past the hand-off, the fine wall still occludes.
        let far = shed.sample(18, 10);
        assert_eq!(far == Visibility::Visible, !wall, "planimetric, wall = {wall}");
    }
}

fn flat_pair(n: usize, factor: usize) -> Vec<Arc<ScaleData>> {
    let fine = synth::flat(n, n, 1.0).unwrap();
    let coarse = fine.downsample(factor).unwrap();
    vec![Arc::new(fine), Arc::new(coarse)]
}

fn switch_at(cells: f64) -> ViewConfig {
    ViewConfig {
        near_switch_cells: cells,
        ..config()
    }
}

#[test]
fn test_multi_resolution_result_is_one_raster() {
    let engine = MultiResolutionEngine::from_tiles(flat_pair(40, 4), &switch_at(6.0)).unwrap();
    let observer = engine.stack().primary().cell_center(20, 20);
    let q = ShedQuery::new(observer).with_observer_height(1.6);
    let metrics: Vec<Metric> = ["A", "NP", "P"].iter().map(|t| Metric::parse(t).unwrap()).collect();
    let values = engine.aggr_view_shed(&q, &metrics).unwrap();
    assert_eq!(values, vec![vec![1600.0], vec![1.0], vec![160.0]]);

    let shed = engine.calc_view_shed(&q).unwrap();
    assert_eq!(shed.samples().len(), 1600);
    assert_eq!(shed.visible_count(), 1600);
    assert_eq!(shed.area(), 1600.0);
    assert_eq!(shed.patch_count(None), 1);
    assert_eq!(shed.perimeter(), 160.0);
}

#[test]
fn test_hills_multi_matches_cpu_inside_near_band() {
    let fine = Arc::new(synth::hills(32, 32, 1.0).unwrap());
    let coarse = Arc::new(fine.downsample(4).unwrap());
    let cpu = CpuEngine::new(Arc::clone(&fine), &config()).unwrap();
    let wide = MultiResolutionEngine::from_tiles([Arc::clone(&fine), Arc::clone(&coarse)], &switch_at(64.0)).unwrap();
    let narrow = MultiResolutionEngine::from_tiles([Arc::clone(&fine), coarse], &switch_at(4.0)).unwrap();
    for (col, row) in [(4, 28), (16, 16), (30, 3)] {
        let q = ShedQuery::new(fine.cell_center(col, row)).with_observer_height(1.6);
        let reference = cpu.calc_view_shed(&q).unwrap();
        // The whole tile lies inside the fine band.
        assert_eq!(wide.calc_view_shed(&q).unwrap().samples(), reference.samples());

        let shed = narrow.calc_view_shed(&q).unwrap();
        assert_eq!(shed.samples().len(), 32 * 32);
        assert!(shed.samples().iter().all(|&s| s != Visibility::Outside.as_i8()));
        for r in 0..32 {
            for c in 0..32 {
                let d = (c as f64 - col as f64).hypot(r as f64 - row as f64);
                if d < 4.0 {
                    assert_eq!(shed.sample(c, r), reference.sample(c, r), "cell ({c}, {r})");
                }
            }
        }
        let area = narrow.aggr_view_shed(&q, &[Metric::parse("A").unwrap()]).unwrap();
        assert_eq!(area, vec![vec![shed.area()]]);
    }
}

#[test]
fn test_multi_from_tiles_uses_config_switch() {
    let fine = Arc::new(synth::flat(20, 20, 1.0).unwrap());
    let coarse = Arc::new(fine.downsample(4).unwrap());
    let config = ViewConfig {
        near_switch_cells: 6.0,
        ..config()
    };
    let engine = MultiResolutionEngine::from_tiles([coarse, fine], &config).unwrap();
    assert_eq!(engine.stack().band(0), (0.0, 6.0));
    assert_eq!(engine.backend(), "multi-resolution");
}

// ---- Batch ----

#[test]
fn test_batch_counts_are_deterministic() {
    let tile = Arc::new(synth::random_tile(8, 12, 12, 1.0, 3).unwrap());
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let position = tile.cell_center(4, 5);
    let template = ShedQuery::new(position).with_observer_height(3.0);
    let single = engine.calc_view_shed(&template).unwrap();
    let mut expected = CumulativeRaster::new(12, 12);
    expected.add(&single);

    let features = vec![ObserverFeature::at(position); 5];
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let task = MultiViewshedTask::new(features.clone(), template).with_mode(mode);
        let report = task.run(&engine).unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(report.skipped, 0);
        for row in 0..12 {
            for col in 0..12 {
                assert_eq!(report.raster.get(col, row), 5 * expected.get(col, row), "{mode:?}");
            }
        }
        assert_eq!(task.progress().fraction(), 1.0);
    }
}

#[test]
fn test_batch_parallel_equals_sequential() {
    let tile = Arc::new(synth::random_tile(12, 16, 16, 1.0, 3).unwrap());
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let features: Vec<ObserverFeature> = (0..16)
        .map(|i| ObserverFeature {
            position: tile.cell_center(i, (i * 7) % 16),
            height: (i % 2 == 0).then_some(6.0),
        })
        .collect();
    let template = ShedQuery::new(DVec2::ZERO).with_observer_height(2.0);
    let seq = MultiViewshedTask::new(features.clone(), template).run(&engine).unwrap();
    let par = MultiViewshedTask::new(features, template)
        .with_mode(ExecutionMode::Parallel)
        .run(&engine)
        .unwrap();
    assert_eq!(seq, par);
    assert!(seq.raster.max() <= 16);
}

#[test]
fn test_batch_skips_observers_outside_grid() {
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let features = vec![
        ObserverFeature::at(tile.cell_center(2, 2)),
        ObserverFeature::at(DVec2::new(-50.0, 50.0)),
        ObserverFeature::at(DVec2::new(500.0, -5.0)),
    ];
    let task = MultiViewshedTask::new(features, ShedQuery::new(DVec2::ZERO));
    let report = task.run(&engine).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.raster.max(), 1);
    assert_eq!(task.progress().done(), 3);
    assert_eq!(task.progress().total(), 3);
}

#[test]
fn test_batch_cancelled_before_start() {
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let token = CancelToken::default();
    token.cancel();
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let task = MultiViewshedTask::new(vec![ObserverFeature::at(tile.cell_center(1, 1)); 4], ShedQuery::new(DVec2::ZERO))
            .with_mode(mode)
            .with_cancel(token.clone());
        assert!(task.cancel_token().is_cancelled());
        assert!(matches!(task.run(&engine), Err(EngineError::Cancelled)));
        assert_eq!(task.progress().done(), 0);
    }
}

#[test]
fn test_batch_on_multi_resolution_stack() {
    let engine = MultiResolutionEngine::from_tiles(flat_pair(40, 4), &switch_at(6.0)).unwrap();
    let primary = Arc::clone(engine.stack().primary());
    let cpu = CpuEngine::new(Arc::clone(&primary), &config()).unwrap();
    let features = vec![ObserverFeature::at(primary.cell_center(20, 20))];
    let template = ShedQuery::new(DVec2::ZERO).with_observer_height(1.6);
    let multi = MultiViewshedTask::new(features.clone(), template).run(&engine).unwrap();
    let single = MultiViewshedTask::new(features, template).run(&cpu).unwrap();
    assert_eq!(multi.raster.counts().iter().map(|&c| c as usize).sum::<usize>(), 1600);
    assert_eq!(multi.raster, single.raster);
    // Far corner, well past the hand-off distance.
    assert_eq!(multi.raster.get(0, 39), 1);
}

/// Delegates to a CPU engine and cancels `token` once `after` observers
/// have been classified.
struct CancelAfter {
    inner: CpuEngine,
    token: CancelToken,
    after: usize,
    calls: AtomicUsize,
}

impl ViewEngine for CancelAfter {
    fn backend(&self) -> &'static str {
        "cancel-after"
    }

    fn stack(&self) -> &Arc<TileStack> {
        self.inner.stack()
    }

    fn angular_resolution(&self) -> f64 {
        self.inner.angular_resolution()
    }

    fn set_angular_resolution(&mut self, a: f64) -> Result<(), EngineError> {
        self.inner.set_angular_resolution(a)
    }

    fn rows_per_chunk(&self) -> usize {
        self.inner.rows_per_chunk()
    }

    fn shed_rows(&self, plan: &ShedPlan, row0: usize, rows: usize) -> Result<Vec<i8>, EngineError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.token.cancel();
        }
        self.inner.shed_rows(plan, row0, rows)
    }

    fn tan_columns(&self, plan: &TanPlan) -> Result<Vec<TanColumn>, EngineError> {
        self.inner.tan_columns(plan)
    }
}

#[test]
fn test_batch_cancelled_mid_run_discards_partial_counts() {
    let tile = flat10();
    let token = CancelToken::default();
    let engine = CancelAfter {
        inner: CpuEngine::new(Arc::clone(&tile), &config()).unwrap(),
        token: token.clone(),
        after: 2,
        calls: AtomicUsize::new(0),
    };
    let features = vec![ObserverFeature::at(tile.cell_center(5, 5)); 6];
    let task = MultiViewshedTask::new(features, ShedQuery::new(DVec2::ZERO)).with_cancel(token);
    assert!(matches!(task.run(&engine), Err(EngineError::Cancelled)));
    assert!(task.cancel_token().is_cancelled());
    // The second observer finished; the third saw the cancel.
    assert_eq!(task.progress().done(), 2);
    assert_eq!(task.progress().total(), 6);
    assert!(task.progress().fraction() < 1.0);
}

// ---- Accelerator lifecycle ----

#[test]
fn test_dispose_and_upload() {
    let tile = flat10();
    let mut engine = AccelEngine::with_device(Arc::clone(&tile), &config(), device()).unwrap();
    let q = ShedQuery::new(tile.cell_center(3, 3));
    let before = engine.calc_view_shed(&q).unwrap();
    assert!(engine.is_resident());

    engine.dispose();
    assert!(!engine.is_resident());
    assert!(matches!(engine.calc_view_shed(&q), Err(EngineError::Disposed)));
    assert!(matches!(
        engine.aggr_view_shed(&q, &[Metric::parse("A").unwrap()]),
        Err(EngineError::Disposed)
    ));
    assert!(matches!(
        engine.calc_view_tan(&TanQuery::new(tile.cell_center(3, 3))),
        Err(EngineError::Disposed)
    ));

    engine.upload();
    let after = engine.calc_view_shed(&q).unwrap();
    assert_eq!(before.samples(), after.samples());
    assert_eq!(engine.device().name, "test");
}

#[test]
fn test_engine_selection_falls_back_to_cpu() {
    let tile = flat10();
    let auto = ViewConfig {
        backend: BackendPreference::Auto,
        ..config()
    };
    let engine = select_on(&auto, Arc::clone(&tile), None).unwrap();
    assert_eq!(engine.backend(), "cpu");
    let engine = select_on(&auto, Arc::clone(&tile), Some(device())).unwrap();
    assert_eq!(engine.backend(), "accelerator");

    let cpu = ViewConfig::from_json_str(r#"{ "backend": "Cpu", "rows_per_chunk": 4 }"#).unwrap();
    let engine = select_on(&cpu, Arc::clone(&tile), Some(device())).unwrap();
    assert_eq!(engine.backend(), "cpu");
    assert_eq!(engine.rows_per_chunk(), 4);
}

#[test]
fn test_set_angular_resolution() {
    let mut engine = CpuEngine::new(flat10(), &config()).unwrap();
    engine.set_angular_resolution(std::f64::consts::TAU / 32.0).unwrap();
    let tan = engine.calc_view_tan(&TanQuery::new(DVec2::new(5.5, -5.5))).unwrap();
    assert_eq!(tan.n_azimuth(), 32);
    assert!(engine.set_angular_resolution(0.0).is_err());
    assert!(engine.set_angular_resolution(f64::NAN).is_err());
}

// ---- Tangential queries ----

#[test]
fn test_look_back_on_flat_ground() {
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let tan = engine
        .calc_view_tan(&TanQuery::new(tile.cell_center(5, 5)).with_observer_height(1.6))
        .unwrap();
    for az in 0..tan.n_azimuth() {
        // Nothing above the horizon of flat ground.
        assert_eq!(tan.look_back(az, 0), None);
        assert!(tan.distance_at(az, 0).is_nan());
        let d = tan.max_distance(az);
        assert!((4.0..=7.5).contains(&d), "azimuth {az}: {d}");
        let bottom = tan.n_vertical() - 1;
        if let Some((t, cell)) = tan.look_back(az, bottom) {
            assert_eq!(t, 0);
            assert_eq!(tan.cell(az, bottom), tile.index(cell.col, cell.row) as i64);
            assert_eq!(tan.elevation_at(az, bottom), 0.0);
        }
    }
    assert_eq!(tan.look_back(tan.n_azimuth(), 0), None);
}

#[test]
fn test_tangential_distance_bounds_restrict_buckets() {
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let bounds = viewscape_core::Bounds::default().with_distance(2.0, 3.5).unwrap();
    let tan = engine
        .calc_view_tan(&TanQuery::new(tile.cell_center(5, 5)).with_bounds(bounds))
        .unwrap();
    for d in tan.distance_raster().iter().filter(|d| !d.is_nan()) {
        assert!((2.0..=3.5).contains(d), "{d}");
    }
}

// ---- Metrics on results ----

#[test]
fn test_result_table_names() {
    let tile = Arc::new(synth::flat_striped(10, 10, 1.0, 2).unwrap());
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let metrics = [
        Metric::parse("A[1,2]").unwrap(),
        Metric::parse("SHDI").unwrap(),
    ];
    let result = engine.calc_view_shed(&ShedQuery::new(tile.cell_center(5, 5))).unwrap();
    let table = MetricTable::evaluate(&metrics, &result).unwrap();
    let a1 = table.get("A1").unwrap();
    let a2 = table.get("A2").unwrap();
    assert_eq!(a1 + a2, 100.0);
    assert_eq!(a1, result.code_area(1));
    assert!(table.get("SHDI").unwrap() > 0.0);
}

#[test]
fn test_tangential_only_metric_rejected_on_planimetric() {
    let engine = CpuEngine::new(flat10(), &config()).unwrap();
    let err = engine
        .aggr_view_shed(&ShedQuery::new(DVec2::new(5.5, -5.5)), &[Metric::parse("DEPTH").unwrap()])
        .unwrap_err();
    assert!(matches!(err, EngineError::Metric(MetricError::UnsupportedView { .. })));
}

#[test]
fn test_observer_outside_grid_is_an_error() {
    let engine = CpuEngine::new(flat10(), &config()).unwrap();
    let q = ShedQuery::new(DVec2::new(-1.0, 1.0));
    assert!(matches!(
        engine.calc_view_shed(&q),
        Err(EngineError::View(viewscape_core::ViewError::ObserverOutsideGrid { .. }))
    ));
}

// ---- Artifacts ----

#[test]
fn test_memory_sink_keeps_order() {
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let shed = engine.calc_view_shed(&ShedQuery::new(tile.cell_center(1, 1))).unwrap();
    let tan = engine.calc_view_tan(&TanQuery::new(tile.cell_center(1, 1))).unwrap();

    let sink = MemorySink::new();
    assert!(sink.is_empty());
    assert!(write_artifact(&sink, "shed", &Artifact::classification(&shed)));
    assert!(write_artifact(&sink, "pano", &Artifact::panorama(&tan)));
    assert_eq!(sink.names(), vec!["shed".to_string(), "pano".to_string()]);
    match sink.get("shed") {
        Some(Artifact::Classification { cols, rows, samples, .. }) => {
            assert_eq!((cols, rows), (10, 10));
            assert_eq!(samples.len(), 100);
        }
        other => panic!("unexpected artifact {other:?}"),
    }
}

#[test]
fn test_directory_sink_writes_json() {
    let dir = std::env::temp_dir().join(format!("viewscape-artifacts-{}", std::process::id()));
    let sink = DirectorySink::new(&dir);
    let tile = flat10();
    let engine = CpuEngine::new(Arc::clone(&tile), &config()).unwrap();
    let shed = engine.calc_view_shed(&ShedQuery::new(tile.cell_center(4, 4))).unwrap();
    assert!(write_artifact(&sink, "view", &Artifact::classification(&shed)));
    let text = std::fs::read_to_string(sink.path_for("view")).unwrap();
    assert!(text.contains(r#""kind":"classification""#));

    let mut raster = CumulativeRaster::new(10, 10);
    raster.add(&shed);
    assert!(write_artifact(&sink, "cumulative", &Artifact::Cumulative(raster)));
    assert!(sink.path_for("cumulative").exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_failed_write_is_reported_not_raised() {
    let file = std::env::temp_dir().join(format!("viewscape-not-a-dir-{}", std::process::id()));
    std::fs::write(&file, b"x").unwrap();
    let sink = DirectorySink::new(&file);
    let raster = CumulativeRaster::new(2, 2);
    assert!(!write_artifact(&sink, "x", &Artifact::Cumulative(raster)));
    std::fs::remove_file(&file).ok();
}

#[test]
fn test_cumulative_counts_every_cell_of_multi_result() {
    let engine = MultiResolutionEngine::new(nested_stack(false), &config()).unwrap();
    let shed = engine
        .calc_view_shed(&ShedQuery::new(DVec2::new(105.0, -105.0)))
        .unwrap();
    let mut raster = CumulativeRaster::new(21, 21);
    raster.add(&shed);
    assert_eq!(raster.counts().iter().map(|&c| c as usize).sum::<usize>(), shed.visible_count());
    assert_eq!(shed.sample(10, 10), Visibility::Visible);
    assert_eq!(shed.observer_cell(), GridCell::new(10, 10));
}
