//! Backend conformance: every check here runs against the CPU and the
//! accelerator engine, and the two must agree bit for bit.

use std::f64::consts::TAU;
use std::sync::Arc;

use glam::DVec2;

use viewscape_core::bounds::Bounds;
use viewscape_core::config::ViewConfig;
use viewscape_core::enums::{TargetHeight, Visibility};
use viewscape_metrics::{Metric, MetricTable};
use viewscape_terrain::{synth, ScaleData};

use crate::accel::{AccelEngine, Device};
use crate::cpu::CpuEngine;
use crate::query::{ShedQuery, TanQuery};
use crate::view::ViewEngine;

fn config() -> ViewConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ViewConfig {
        angular_resolution: TAU / 64.0,
        rows_per_chunk: 3,
        ..Default::default()
    }
}

fn device() -> Device {
    Device {
        name: "test".to_string(),
        compute_units: 2,
    }
}

fn backends(tile: &Arc<ScaleData>) -> Vec<Box<dyn ViewEngine>> {
    let config = config();
    vec![
        Box::new(CpuEngine::new(Arc::clone(tile), &config).unwrap()),
        Box::new(AccelEngine::with_device(Arc::clone(tile), &config, device()).unwrap()),
    ]
}

fn bits(values: &[Vec<f64>]) -> Vec<Vec<u64>> {
    values
        .iter()
        .map(|v| v.iter().map(|x| x.to_bits()).collect())
        .collect()
}

fn center(tile: &ScaleData, col: usize, row: usize) -> DVec2 {
    tile.cell_center(col, row)
}

/// Query variants exercised by the parity checks.
fn shed_variants(observer: DVec2, height: f64) -> Vec<ShedQuery> {
    let base = ShedQuery::new(observer).with_observer_height(height);
    vec![
        base,
        base.with_direct(false),
        base.with_target_height(TargetHeight::AboveGround),
        base.with_target_height(TargetHeight::Fixed(1.5)).with_direct(false),
        base.with_bounds(Bounds::default().with_distance(1.5, 5.0).unwrap()),
        base.with_bounds(
            Bounds::default()
                .with_azimuth(5.5, 1.0)
                .unwrap()
                .with_vertical(-0.4, 0.3)
                .unwrap(),
        ),
    ]
}

// ---- Basic geometry ----

#[test]
fn test_flat_full_circle() {
    let tile = Arc::new(synth::flat(10, 10, 1.0).unwrap());
    for engine in backends(&tile) {
        let q = ShedQuery::new(center(&tile, 5, 5));
        let result = engine.calc_view_shed(&q).unwrap();
        assert!(
            result.samples().iter().all(|&s| s == 1),
            "{}: flat terrain must be fully visible",
            engine.backend()
        );
        assert_eq!(result.visible_count(), 100);
        assert_eq!(result.area(), 100.0);
        assert_eq!(result.sample(5, 5), Visibility::Visible);

        let tan = engine.calc_view_tan(&TanQuery::new(center(&tile, 5, 5))).unwrap();
        assert_eq!(tan.n_azimuth(), 64);
        assert!(tan.is_cylinder());
        for az in 0..tan.n_azimuth() {
            assert!(tan.max_distance(az) >= 4.0, "{}: azimuth {az}", engine.backend());
        }
    }
}

#[test]
fn test_direct_indirect_asymmetry() {
    // One-row corridor with a 5 m wall two cells from the observer.
    let mut elevation = vec![0.0; 10];
    elevation[2] = 5.0;
    let tile = Arc::new(ScaleData::with_origin(10, 1, DVec2::ZERO, 1.0, elevation).unwrap());
    for engine in backends(&tile) {
        let q = ShedQuery::new(center(&tile, 0, 0))
            .with_observer_height(10.0)
            .with_target_height(TargetHeight::Fixed(0.0));
        let direct = engine.calc_view_shed(&q).unwrap();
        let indirect = engine.calc_view_shed(&q.with_direct(false)).unwrap();
        assert_eq!(direct.sample(9, 0), Visibility::Visible, "{}", engine.backend());
        assert_eq!(indirect.sample(9, 0), Visibility::Occluded, "{}", engine.backend());
    }
}

#[test]
fn test_distance_banding() {
    let tile = Arc::new(synth::flat(10, 10, 1.0).unwrap());
    let metrics = [Metric::parse("A_0,2,4").unwrap()];
    for engine in backends(&tile) {
        let q = ShedQuery::new(center(&tile, 5, 5));
        let values = engine.aggr_view_shed(&q, &metrics).unwrap();
        assert_eq!(values, vec![vec![9.0, 36.0]], "{}", engine.backend());
        let result = engine.calc_view_shed(&q).unwrap();
        assert_eq!(result.area_in(0.0, 2.0), 9.0);
        assert_eq!(result.area_in(2.0, 4.0), 36.0);
        let table = MetricTable::evaluate(&metrics, &result).unwrap();
        assert_eq!(table.get("A_0-2"), Some(9.0));
        assert_eq!(table.get("A_2-4"), Some(36.0));
    }
}

#[test]
fn test_shannon_bounds() {
    let tile = Arc::new(synth::random_tile(11, 20, 20, 1.0, 5).unwrap());
    let metrics = [Metric::parse("SHDI").unwrap(), Metric::parse("SHE").unwrap()];
    for engine in backends(&tile) {
        for (col, row) in [(3, 3), (10, 12), (17, 5)] {
            let q = ShedQuery::new(center(&tile, col, row)).with_observer_height(5.0);
            let v = engine.aggr_view_shed(&q, &metrics).unwrap();
            let (shdi, she) = (v[0][0], v[1][0]);
            assert!(shdi >= 0.0 && shdi <= 5f64.ln() + 1e-12, "SHDI {shdi}");
            assert!((0.0..=1.0 + 1e-12).contains(&she), "SHE {she}");
        }
    }
}

// ---- Parity ----

#[test]
fn test_backend_parity_every_observer() {
    let tile = Arc::new(synth::random_tile(42, 12, 12, 1.0, 4).unwrap());
    let engines = backends(&tile);
    let metrics = [Metric::parse("A").unwrap(), Metric::parse("SHE").unwrap()];
    for row in 0..tile.height() {
        for col in 0..tile.width() {
            let observer = center(&tile, col, row);
            for height in [0.0, 1.6, 10.0] {
                for q in shed_variants(observer, height) {
                    let a = engines[0].calc_view_shed(&q).unwrap();
                    let b = engines[1].calc_view_shed(&q).unwrap();
                    assert_eq!(a.samples(), b.samples(), "observer ({col}, {row}) h={height} {q:?}");
                    let aggr_a = engines[0].aggr_view_shed(&q, &metrics).unwrap();
                    let aggr_b = engines[1].aggr_view_shed(&q, &metrics).unwrap();
                    assert_eq!(bits(&aggr_a), bits(&aggr_b));
                }
                let tq = TanQuery::new(observer).with_observer_height(height);
                let ra = engines[0].calc_view_tan_raw(&tq).unwrap();
                let rb = engines[1].calc_view_tan_raw(&tq).unwrap();
                assert!(ra.bits_eq(&rb), "tangential raster differs at ({col}, {row}) h={height}");
            }
        }
    }
}

#[test]
fn test_backend_parity_bounded_tangential() {
    let tile = Arc::new(synth::random_tile(9, 16, 16, 2.0, 3).unwrap());
    let engines = backends(&tile);
    let bounds = Bounds::default()
        .with_azimuth(5.0, 2.0)
        .unwrap()
        .with_vertical(-0.6, 0.4)
        .unwrap()
        .with_distance(3.0, 20.0)
        .unwrap();
    let q = TanQuery::new(center(&tile, 7, 9))
        .with_observer_height(2.0)
        .with_bounds(bounds);
    let a = engines[0].calc_view_tan(&q).unwrap();
    let b = engines[1].calc_view_tan(&q).unwrap();
    assert!(!a.is_cylinder());
    assert_eq!(a.cells(), b.cells());
    assert!(a.to_raster().bits_eq(&b.to_raster()));
}

// ---- Aggregated path ----

#[test]
fn test_aggregated_equals_raster_planimetric() {
    let tile = Arc::new(synth::random_tile(5, 18, 14, 1.0, 4).unwrap());
    let metrics: Vec<Metric> = [
        "A",
        "P",
        "COMPACT",
        "NP",
        "PD",
        "MAXD",
        "SHDI",
        "SHE",
        "CONTAG",
        "IJI",
        "ED",
        "A[1-2,3]_0,3,6",
        "NP[1+3]",
        "MAXD[4]",
        "SHE[1-2,3-4]_0,4,100",
        "CONTAG[1,2,3]",
    ]
    .iter()
    .map(|t| Metric::parse(t).unwrap())
    .collect();
    for engine in backends(&tile) {
        for (col, row) in [(0, 0), (9, 7), (17, 13), (4, 10)] {
            for q in shed_variants(center(&tile, col, row), 3.0) {
                let aggregated = engine.aggr_view_shed(&q, &metrics).unwrap();
                let result = engine.calc_view_shed(&q).unwrap();
                let stored: Vec<Vec<f64>> = metrics.iter().map(|m| m.evaluate(&result).unwrap()).collect();
                assert_eq!(bits(&aggregated), bits(&stored), "{} at ({col}, {row})", engine.backend());
            }
        }
    }
}

#[test]
fn test_aggregated_equals_raster_tangential() {
    let tile = Arc::new(synth::random_tile(6, 16, 16, 1.0, 4).unwrap());
    let metrics: Vec<Metric> = ["A", "P", "NP", "MAXD", "SHE", "CONTAG", "IJI", "ED", "SL", "DEPTH", "A[2]_0,5,50"]
        .iter()
        .map(|t| Metric::parse(t).unwrap())
        .collect();
    for engine in backends(&tile) {
        for (col, row) in [(8, 8), (1, 14), (15, 2)] {
            let q = TanQuery::new(center(&tile, col, row)).with_observer_height(2.0);
            let aggregated = engine.aggr_view_tan(&q, &metrics).unwrap();
            let result = engine.calc_view_tan(&q).unwrap();
            let stored: Vec<Vec<f64>> = metrics.iter().map(|m| m.evaluate(&result).unwrap()).collect();
            assert_eq!(bits(&aggregated), bits(&stored), "{}", engine.backend());
        }
    }
}

#[test]
fn test_columns_without_elevations_keep_cells() {
    let tile = Arc::new(synth::random_tile(9, 14, 14, 1.0, 4).unwrap());
    let q = TanQuery::new(center(&tile, 6, 7)).with_observer_height(2.0);
    for engine in backends(&tile) {
        let mut plan = engine.plan_tan(&q).unwrap();
        let full = engine.tan_columns(&plan).unwrap();
        plan.elevations = false;
        let lean = engine.tan_columns(&plan).unwrap();
        assert_eq!(full.len(), lean.len());
        for (f, l) in full.iter().zip(&lean) {
            assert_eq!(f.elevations.len(), f.cells.len());
            assert!(l.elevations.is_empty(), "{}", engine.backend());
            assert_eq!(f.cells, l.cells);
            assert_eq!(f.horizon.to_bits(), l.horizon.to_bits());
            let fd: Vec<u64> = f.distances.iter().map(|d| d.to_bits()).collect();
            let ld: Vec<u64> = l.distances.iter().map(|d| d.to_bits()).collect();
            assert_eq!(fd, ld);
        }
    }
}

#[test]
fn test_category_aggregation_invariance() {
    // Grouping codes {1,2},{3,4},{5,6} equals relabelling them 1, 2, 3.
    let tile = synth::random_tile(21, 16, 16, 1.0, 6).unwrap();
    let merged = tile.map_codes(|c| (c + 1) / 2);
    let grouped: Vec<Metric> = ["SHDI[1-2,3-4,5-6]", "SHE[1-2,3-4,5-6]", "CONTAG[1-2,3-4,5-6]", "IJI[1-2,3-4,5-6]", "ED[1-2,3-4,5-6]"]
        .iter()
        .map(|t| Metric::parse(t).unwrap())
        .collect();
    let plain: Vec<Metric> = ["SHDI", "SHE", "CONTAG", "IJI", "ED"]
        .iter()
        .map(|t| Metric::parse(t).unwrap())
        .collect();
    let original = Arc::new(tile);
    let merged = Arc::new(merged);
    for (e_orig, e_merged) in backends(&original).into_iter().zip(backends(&merged)) {
        let q = ShedQuery::new(center(&original, 8, 8)).with_observer_height(4.0);
        let a = e_orig.aggr_view_shed(&q, &grouped).unwrap();
        let b = e_merged.aggr_view_shed(&q, &plain).unwrap();
        for (x, y) in a.iter().flatten().zip(b.iter().flatten()) {
            assert!((x - y).abs() < 1e-9 || (x.is_nan() && y.is_nan()), "{x} vs {y}");
        }
    }
}

#[test]
fn test_view_mismatch_rejected_before_work() {
    let tile = Arc::new(synth::flat(6, 6, 1.0).unwrap());
    for engine in backends(&tile) {
        let q = ShedQuery::new(center(&tile, 3, 3));
        let err = engine
            .aggr_view_shed(&q, &[Metric::parse("SL").unwrap()])
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::Metric(_)), "{err}");
        let tan = TanQuery::new(center(&tile, 3, 3));
        assert!(engine
            .aggr_view_tan(&tan, &[Metric::parse("SL").unwrap()])
            .is_ok());
    }
}
