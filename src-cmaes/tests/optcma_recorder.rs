use cmaes::{
    CallbackAction, CmaesConfigBuilder, CmaesIntermediate, OptimizationRecord,
    OptimizationRecorder, run_recorded_cmaes,
};
use cmaes_testfunctions::sphere;
use ndarray::Array1;
use tempfile::tempdir;

#[test]
fn test_recorder_writes_csv_trace() {
    let dir = tempdir().unwrap();
    let out = dir.path().to_str().unwrap().to_string();

    let config = CmaesConfigBuilder::new(Array1::from_elem(3, 1.0), Array1::from_elem(3, 0.5))
        .seed(12)
        .stop_max_iter(60)
        .build();
    let (report, csv_path) = run_recorded_cmaes("sphere_3d", sphere, config, &out).unwrap();

    assert!(std::path::Path::new(&csv_path).exists());
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.trim().split('\n').collect();
    assert!(lines.len() > 1, "trace has no data rows");
    assert!(
        lines[0].starts_with("generation,x0,x1,x2,best_result,sigma,axis_ratio,is_improvement"),
        "unexpected header: {}",
        lines[0]
    );
    // one record per generation
    assert_eq!(lines.len() as u64 - 1, report.nit);
}

#[test]
fn test_records_serialize_roundtrip() {
    let recorder = OptimizationRecorder::new("roundtrip".to_string());
    let mut callback = recorder.create_callback();
    let action = callback(&CmaesIntermediate {
        x: Array1::from_vec(vec![1.0, 2.0]),
        fun: 3.0,
        sigma: 0.5,
        axis_ratio: 1.2,
        iter: 1,
    });
    assert!(matches!(action, CallbackAction::Continue));

    let records = recorder.get_records();
    let json = serde_json::to_string(&records).unwrap();
    let back: Vec<OptimizationRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].x, records[0].x);
    assert_eq!(back[0].best_result, 3.0);
    assert!(back[0].is_improvement);
}
