// End-to-end: DBC file and candump log on disk, JSON store, queries
use can_metrics::{
    CandumpRecordingSource, Category, ErrorKind, FileDbcSource, MetricsService, PipelineConfig,
    SnapshotFilter, StoreConfig, VehicleProfile, VehicleRegistry,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_
    SIG_VALTYPE_

BS_:

BU_: BMS VCU

BO_ 291 BatteryStatus: 8 BMS
 SG_ BatterySOC : 0|8@1+ (0.5,0) [0|100] "%" VCU
 SG_ BatteryVoltage : 8|16@1+ (0.1,0) [0|800] "V" VCU
 SG_ BatteryCurrent : 24|16@1- (0.1,0) [-3276.8|3276.7] "A" VCU
 SG_ BatteryTemp : 40|8@1+ (1,-40) [-40|215] "degC" VCU

BO_ 512 MotorStatus: 8 VCU
 SG_ MotorRpm : 7|16@0+ (1,0) [0|20000] "rpm" BMS
 SG_ MotorTorque : 23|16@0- (0.1,0) [-3276.8|3276.7] "Nm" BMS

BO_ 1024 DiagMux: 8 VCU
 SG_ Page M : 0|8@1+ (1,0) [0|3] "" BMS
 SG_ CellVoltageMin m0 : 8|16@1+ (0.001,0) [0|5] "V" BMS
 SG_ CellTempMax m1 : 8|8@1+ (1,-40) [-40|215] "degC" BMS
"#;

const TRIP_1: &str = "\
(1700000000.000000) can0 123#A0A00F0000410000
(1700000000.010000) can0 200#0C80FF9C00000000
(1700000000.020000) can0 400#00B80B0000000000
(1700000000.030000) can0 400#0141000000000000
(1700000000.040000) can0 7DF#0201
(1700000000.050000) can0 123#9E
(1700000000.060000) can0 123#A2A00F0000410000
";

const TRIP_2: &str = "\
(1700003600.000000) can0 123#64A00F0000410000
";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn service(dir: &Path) -> MetricsService {
    let mut registry = VehicleRegistry::new();
    registry.register(VehicleProfile {
        id: "ioniq5".to_string(),
        protocol: "hyundai-kia".to_string(),
        recording: "trip".to_string(),
        make: Some("Hyundai".to_string()),
        model: Some("Ioniq 5".to_string()),
        year: Some(2022),
    });

    let store = StoreConfig::json_file(dir.join("metrics.json"))
        .with_retained_series(true)
        .open()
        .unwrap();

    MetricsService::new(
        registry,
        FileDbcSource::new().with_protocol("hyundai-kia", dir.join("ev.dbc")),
        CandumpRecordingSource::new().with_recording("trip", dir.join("trip.log")),
        Arc::new(store),
    )
    .with_config(PipelineConfig::new())
}

#[test]
fn test_process_and_query_candump_log() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ev.dbc"), DBC).unwrap();
    fs::write(dir.path().join("trip.log"), TRIP_1).unwrap();

    let service = service(dir.path());
    let summary = service.process("ioniq5").unwrap();
    assert_eq!(summary.metrics_processed, 9);
    assert_eq!(summary.warnings.unknown_frames, 1);
    assert_eq!(summary.warnings.short_frames, 1);
    assert_eq!(
        summary.recording_started_at.unwrap().timestamp(),
        1_700_000_000
    );

    let snapshot = service.snapshot("ioniq5", &SnapshotFilter::new()).unwrap();
    let soc = &snapshot.metrics["BatterySOC"];
    assert_eq!(soc.value, 81.0);
    assert_eq!(soc.sample_count, 2);
    assert_eq!(soc.min, 80.0);
    assert_eq!(soc.max, 81.0);
    assert_eq!(soc.series.len(), 2);
    assert_eq!(snapshot.metrics["MotorRpm"].value, 3200.0);
    assert!((snapshot.metrics["MotorTorque"].value + 10.0).abs() < 1e-9);
    assert!((snapshot.metrics["CellVoltageMin"].value - 3.0).abs() < 1e-9);
    assert_eq!(snapshot.metrics["CellTempMax"].value, 25.0);
    assert_eq!(snapshot.metrics["Page"].value, 1.0);

    let catalog = service.catalog("ioniq5").unwrap();
    assert_eq!(catalog.metrics_count, 9);
    let battery: Vec<&str> = catalog.metrics_by_category[&Category::Battery]
        .iter()
        .map(|item| item.name.as_str())
        .collect();
    assert!(battery.contains(&"BatterySOC"));
    assert!(catalog.metrics_by_category[&Category::Drivetrain]
        .iter()
        .any(|item| item.name == "MotorRpm"));
}

#[test]
fn test_history_survives_reopen() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ev.dbc"), DBC).unwrap();

    fs::write(dir.path().join("trip.log"), TRIP_1).unwrap();
    service(dir.path()).process("ioniq5").unwrap();
    fs::write(dir.path().join("trip.log"), TRIP_2).unwrap();
    service(dir.path()).process("ioniq5").unwrap();

    let service = service(dir.path());
    let view = service
        .history("ioniq5", &["BatterySOC".to_string(), "MotorRpm".to_string()], 10)
        .unwrap();
    assert_eq!(view.history.len(), 2);
    assert_eq!(view.history[0].metrics["BatterySOC"].value, 50.0);
    assert!(!view.history[0].metrics.contains_key("MotorRpm"));
    assert_eq!(view.history[1].metrics["BatterySOC"].value, 81.0);
    assert!(view.history[0].timestamp >= view.history[1].timestamp);

    // The catalog keeps signals missing from the newest session
    let catalog = service.catalog("ioniq5").unwrap();
    assert!(catalog.all_metrics.iter().any(|e| e.name == "MotorRpm"));
    assert_eq!(catalog.metrics_count, 9);
}

#[test]
fn test_failures_carry_error_kinds() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    let err = service.process("kona").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownVehicle);
    assert_eq!(err.kind().status_class(), 400);

    // DBC file missing on disk
    let err = service.process("ioniq5").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceError);

    fs::write(dir.path().join("ev.dbc"), DBC).unwrap();
    fs::write(dir.path().join("trip.log"), "(1.0) can0 7DF#0201\n").unwrap();
    let err = service.process("ioniq5").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoData);

    let err = service
        .snapshot("ioniq5", &SnapshotFilter::new())
        .unwrap_err();
    assert_eq!(err.kind().status_class(), 404);
}
