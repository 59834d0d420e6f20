use approx::assert_relative_eq;
use block_positioning::api::pipeline::SkipReason;
use block_positioning::processing::parser::parse_batch;
use block_positioning::{
    AnchorId, BlockConfig, BlockSolver, PathLossModel, PositioningError, PositioningService, ScanEntry,
    SystemConfig, TopologyRegistry,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

const BLOCK_A: [AnchorId; 4] = [1001, 1002, 1003, 1004];

fn service() -> PositioningService {
    PositioningService::from_config(&SystemConfig::default()).unwrap()
}

/// Report `device_id` from each anchor with a signal strength that maps back to `distance`
fn report(service: &PositioningService, device_id: &str, anchors_and_distances: &[(AnchorId, f64)]) {
    let model = *service.aggregator().model();
    for &(anchor_id, distance) in anchors_and_distances {
        service.ingest(anchor_id, &[ScanEntry::new(device_id, model.signal_strength_at(distance))]);
    }
}

#[test]
fn test_block_a_centre_scenario() {
    let service = service();
    let d = 50f64.sqrt();
    report(&service, "centre", &BLOCK_A.map(|anchor_id| (anchor_id, d)));

    let positions = service.compute_positions();
    assert_eq!(positions.len(), 1);
    let estimate = &positions[0];
    assert_eq!(estimate.device_id, "centre");
    assert_eq!(estimate.block_name, "A");
    assert_relative_eq!(estimate.x, 5.0, epsilon = 1e-3);
    assert_relative_eq!(estimate.y, 5.0, epsilon = 1e-3);
    assert!(estimate.residual < 1e-6);
}

#[test]
fn test_asymmetric_centre_distances_still_resolve_to_centre() {
    // Distances 5, 7.07, 7.07, 5 admit no exact fit; by symmetry the
    // minimiser stays at the block centre with a large residual
    let solution = BlockSolver::default().solve(10.0, [5.0, 7.07, 7.07, 5.0]).unwrap();
    assert_relative_eq!(solution.x, 5.0, epsilon = 1e-3);
    assert_relative_eq!(solution.y, 5.0, epsilon = 1e-3);
    assert!(solution.residual > 0.0);
}

#[test]
fn test_three_of_four_corners_not_located() {
    let service = service();
    report(&service, "partial", &[(1001, 5.0), (1002, 6.0), (1003, 7.0)]);

    assert!(service.compute_positions().is_empty());
    let pass = service.run_pass();
    assert_eq!(
        pass.skipped[0].reason,
        SkipReason::AnchorMismatch { anchors: vec![1001, 1002, 1003] }
    );
}

#[test]
fn test_four_corners_plus_extra_anchor_not_located() {
    let service = service();
    report(
        &service,
        "straddling",
        &[(1001, 5.0), (1002, 6.0), (1003, 7.0), (1004, 7.0), (1005, 9.0)],
    );
    assert!(service.compute_positions().is_empty());
}

#[test]
fn test_malformed_entry_among_three_valid() {
    let service = service();
    let entries = parse_batch(
        r#"[
            {"mac": "aa:01", "rssi": -60},
            {"mac": "aa:02", "rssi": "very strong"},
            {"mac": "aa:03", "rssi": -65},
            {"mac": "aa:04", "rssi": -70}
        ]"#,
    )
    .unwrap();

    let ingest = service.ingest(1001, &entries);
    assert_eq!(ingest.accepted, 3);
    assert_eq!(ingest.skipped_count(), 1);
    assert_eq!(
        service.aggregator().known_devices(),
        BTreeSet::from(["aa:01".to_string(), "aa:03".to_string(), "aa:04".to_string()])
    );
}

#[test]
fn test_replacement_drops_device_from_one_anchor() {
    let service = service();
    let d = 50f64.sqrt();
    report(&service, "walker", &BLOCK_A.map(|anchor_id| (anchor_id, d)));
    assert_eq!(service.compute_positions().len(), 1);

    // Anchor 1003 reports again without the device
    service.ingest(1003, &[ScanEntry::new("someone-else", -60.0)]);

    let aggregator = service.aggregator();
    assert_eq!(aggregator.anchors_reporting("walker"), BTreeSet::from([1001, 1002, 1004]));
    assert!(matches!(
        aggregator.distance_for("walker", 1003),
        Err(PositioningError::NotFound { anchor_id: 1003, .. })
    ));
    assert!(service.compute_positions().is_empty());
}

#[test]
fn test_repeat_batch_is_idempotent() {
    let service = service();
    let batch = vec![ScanEntry::new("a", -61.0), ScanEntry::new("b", -72.5)];
    service.ingest(1001, &batch);
    service.ingest(1002, &[ScanEntry::new("a", -64.0)]);

    let devices = service.aggregator().known_devices();
    let reporting = service.aggregator().anchors_reporting("a");
    let distance = service.aggregator().distance_for("b", 1001).unwrap();

    service.ingest(1001, &batch);
    assert_eq!(service.aggregator().known_devices(), devices);
    assert_eq!(service.aggregator().anchors_reporting("a"), reporting);
    assert_eq!(service.aggregator().distance_for("b", 1001).unwrap(), distance);
}

#[test]
fn test_devices_in_both_blocks() {
    let service = service();
    let corner_distances = |x: f64, y: f64| -> [f64; 4] {
        [(0.0, 10.0), (10.0, 10.0), (0.0, 0.0), (10.0, 0.0)].map(|(cx, cy): (f64, f64)| {
            ((x - cx).powi(2) + (y - cy).powi(2)).sqrt()
        })
    };

    let a = corner_distances(2.0, 3.0);
    let b = corner_distances(9.0, 6.5);
    let model = *service.aggregator().model();
    for (i, anchor_id) in BLOCK_A.iter().enumerate() {
        service.ingest(*anchor_id, &[ScanEntry::new("in-a", model.signal_strength_at(a[i]))]);
    }
    for (i, anchor_id) in [1005, 1006, 1007, 1008].iter().enumerate() {
        service.ingest(*anchor_id, &[ScanEntry::new("in-b", model.signal_strength_at(b[i]))]);
    }

    let positions = service.compute_positions();
    assert_eq!(positions.len(), 2);
    assert_eq!((positions[0].device_id.as_str(), positions[0].block_name.as_str()), ("in-a", "A"));
    assert_eq!((positions[1].device_id.as_str(), positions[1].block_name.as_str()), ("in-b", "B"));
    assert_relative_eq!(positions[1].x, 9.0, epsilon = 1e-3);
    assert_relative_eq!(positions[1].y, 6.5, epsilon = 1e-3);
    assert_relative_eq!(positions[1].world_x, 19.0, epsilon = 1e-3);
    assert_relative_eq!(positions[1].world_y, 16.5, epsilon = 1e-3);
}

#[test]
fn test_overlapping_topology_rejected() {
    let blocks = vec![
        BlockConfig {
            name: "A".to_string(),
            side_length: 10.0,
            origin_x: 0.0,
            origin_y: 0.0,
            anchors: vec![1, 2, 3, 4],
        },
        BlockConfig {
            name: "B".to_string(),
            side_length: 10.0,
            origin_x: 10.0,
            origin_y: 0.0,
            anchors: vec![3, 5, 6, 7],
        },
    ];
    assert!(TopologyRegistry::new(&blocks).is_err());
    assert!(PositioningError::from(TopologyRegistry::new(&blocks).unwrap_err()).is_fatal());
}

#[test]
fn test_concurrent_ingest_and_positioning() {
    let service = Arc::new(service());
    let model = PathLossModel::default();
    let d = 50f64.sqrt();
    report(&service, "steady", &BLOCK_A.map(|anchor_id| (anchor_id, d)));

    let writers: Vec<_> = BLOCK_A
        .iter()
        .map(|&anchor_id| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for round in 0..100 {
                    let mut batch = vec![ScanEntry::new("steady", model.signal_strength_at(d))];
                    if round % 2 == 0 {
                        batch.push(ScanEntry::new(format!("visitor-{round}"), -70.0));
                    }
                    service.ingest(anchor_id, &batch);
                }
            })
        })
        .collect();

    for _ in 0..50 {
        let pass = service.run_pass();
        assert!(pass.estimates.iter().any(|e| e.device_id == "steady"));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    let steady = service
        .compute_positions()
        .into_iter()
        .find(|e| e.device_id == "steady")
        .unwrap();
    assert_relative_eq!(steady.x, 5.0, epsilon = 1e-3);
    assert_relative_eq!(steady.y, 5.0, epsilon = 1e-3);
}
