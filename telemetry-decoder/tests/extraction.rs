// End-to-end tests through the public API with on-disk fixtures
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use telemetry_decoder::{
    extract, extract_gps_points, extract_topic_to_file, parse_dbc_file, write_topic_files, ExtractConfig,
    JsonLinesPublisher, JsonlRecording, LayoutDocument, RecordSource, ReplayConfig, Replayer, TelemetryError,
    TopicStatus,
};
use tempfile::TempDir;

const BASE_SECS: i64 = 1_700_000_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn line(topic: &str, offset_ms: i64, message: Value) -> String {
    let secs = BASE_SECS + offset_ms / 1000;
    let nsecs = (offset_ms % 1000) * 1_000_000;
    json!({
        "topic": topic,
        "stamp": {"secs": secs, "nsecs": nsecs},
        "message": message,
    })
    .to_string()
}

/// Twenty navigation records every 100 ms, a fix every 500 ms, one binary
/// status record and one corrupt line
fn write_recording(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("drive.jsonl");
    let mut file = fs::File::create(&path).unwrap();

    for i in 0..20 {
        let nav = json!({
            "latitude": 31.0 + i as f64 * 1e-5,
            "longitude": 121.0,
            "altitude": 4.0,
            "roll": 0.0, "pitch": 0.0, "yaw": 0.1 * i as f64,
            "enu_velocity": {"x": 1.0, "y": 0.0, "z": 0.0},
        });
        writeln!(file, "{}", line("/chcnav/devpvt", i * 100, nav)).unwrap();

        if i % 5 == 0 {
            let fix = json!({
                "header": {"frame_id": "gnss"},
                "latitude": 31.0, "longitude": 121.0, "altitude": 4.0,
                "status": {"status": 1, "service": 1},
            });
            writeln!(file, "{}", line("/chcnav_fix_demo/fix", i * 100 + 50, fix)).unwrap();
        }
    }

    let status = json!({"raw": {"_type": "bytes", "_data": "AQID"}, "ok": true});
    writeln!(file, "{}", line("/diagnostics", 1_950, status)).unwrap();
    writeln!(file, "{{\"topic\": \"/chcnav/devpvt\", \"stamp\": ").unwrap();
    file.flush().unwrap();
    path
}

#[test]
fn test_recording_info() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();
    let info = recording.info();

    assert_eq!(info.message_count, 25);
    assert_eq!(info.start_ms, Some(BASE_SECS * 1000));
    assert_eq!(info.end_ms, Some(BASE_SECS * 1000 + 1_950));
    assert_eq!(
        info.topic_names(),
        vec!["/chcnav/devpvt", "/chcnav_fix_demo/fix", "/diagnostics"]
    );
    assert_eq!(info.topics["/chcnav_fix_demo/fix"].message_count, 4);
    assert!(info.start_datetime().is_some());
}

#[test]
fn test_missing_recording() {
    let result = JsonlRecording::open(Path::new("/nonexistent/drive.jsonl"));
    assert!(matches!(result, Err(TelemetryError::SourceNotFound(_))));
}

#[test]
fn test_window_filter_correctness() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();
    let base = BASE_SECS * 1000;

    let everything: Vec<_> = extract(&recording, &ExtractConfig::new())
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();
    assert_eq!(everything.len(), 25);

    for (start, end) in [(0, 0), (0, 450), (100, 100), (550, 1_550), (1_900, 5_000), (2_000, 3_000)] {
        let config = ExtractConfig::new()
            .with_topics(["/chcnav/devpvt", "/chcnav_fix_demo/fix"])
            .with_start_ms(base + start)
            .with_end_ms(base + end);

        let got: Vec<_> = extract(&recording, &config).unwrap().filter_map(|r| r.ok()).collect();
        assert!(got.iter().all(|r| r.timestamp >= base + start && r.timestamp <= base + end));

        let expected = everything
            .iter()
            .filter(|r| r.topic != "/diagnostics")
            .filter(|r| r.timestamp >= base + start && r.timestamp <= base + end)
            .count();
        assert_eq!(got.len(), expected, "window [{}, {}]", start, end);
    }
}

#[test]
fn test_write_topic_files() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();
    let out = dir.path().join("extracted");

    let config = ExtractConfig::new()
        .with_topics(["/chcnav_fix_demo/fix", "/diagnostics", "/lidar_points"]);
    let summary = write_topic_files(&recording, &config, &out).unwrap();

    assert_eq!(summary.failed_records, 1);
    assert_eq!(summary.written_count(), 5);
    assert!(!summary.is_empty());
    assert_eq!(summary.topics[2].status, TopicStatus::Empty);
    assert!(!out.join("_lidar_points.json").exists());

    let fixes: Value = serde_json::from_str(&fs::read_to_string(out.join("_chcnav_fix_demo_fix.json")).unwrap()).unwrap();
    let fixes = fixes.as_array().unwrap();
    assert_eq!(fixes.len(), 4);
    assert_eq!(fixes[0]["timestamp"], json!(BASE_SECS * 1000 + 50));
    assert_eq!(fixes[0]["message"]["status"], json!({"status": 1, "service": 1}));

    let diag: Value = serde_json::from_str(&fs::read_to_string(out.join("_diagnostics.json")).unwrap()).unwrap();
    assert_eq!(
        diag[0]["message"],
        json!({"raw": {"_type": "bytes", "_data": "AQID"}, "ok": true})
    );
}

#[test]
fn test_empty_single_topic_writes_nothing() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();
    let output = dir.path().join("lidar.json");

    let count = extract_topic_to_file(&recording, "/lidar_points", &ExtractConfig::new(), &output).unwrap();
    assert_eq!(count, 0);
    assert!(!output.exists());

    let output = dir.path().join("nav.json");
    let count = extract_topic_to_file(&recording, "/chcnav/devpvt", &ExtractConfig::new(), &output).unwrap();
    assert_eq!(count, 20);
    let entries: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(entries[0]["topic"], "/chcnav/devpvt");
}

#[test]
fn test_gps_points() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();
    let points = extract_gps_points(&recording, "/chcnav_fix_demo/fix").unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[0].altitude, 4.0);
    assert_eq!(points[0].status.service, Some(1));
}

#[test]
fn test_replay_pipeline() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let recording = JsonlRecording::open(&write_recording(dir.path())).unwrap();

    let mut replayer = Replayer::new(ReplayConfig::new()).unwrap();
    let mut publisher = JsonLinesPublisher::new(Vec::new());
    let stats = replayer
        .replay_source(&recording, &ExtractConfig::new(), &mut publisher)
        .unwrap();

    assert_eq!(stats.poses, 20);
    assert_eq!(stats.paths, 2);
    assert_eq!(stats.fixes, 4);
    assert_eq!(stats.failed, 1);

    let text = String::from_utf8(publisher.into_inner()).unwrap();
    let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 26);

    for entry in lines.iter().filter(|l| l["channel"] == "/state_estimation") {
        let q = &entry["message"]["pose"]["orientation"];
        let norm: f64 = ["x", "y", "z", "w"]
            .iter()
            .map(|k| q[*k].as_f64().unwrap().powi(2))
            .sum();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(entry["message"]["pose"]["position"]["z"], json!(4.0));
        assert_eq!(entry["message"]["twist"]["linear"]["x"], json!(1.0));
    }

    let fix = lines.iter().find(|l| l["channel"] == "/chcnav_fix_demo/fix").unwrap();
    assert_eq!(fix["message"]["header"]["frame_id"], "gnss");

    let path = lines.iter().rev().find(|l| l["channel"] == "/path").unwrap();
    assert_eq!(path["message"]["poses"].as_array().unwrap().len(), 20);
    assert_eq!(path["message"]["header"]["frame_id"], "map");
}

const DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: ECU1 ECU2

BO_ 291 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2
 SG_ GearState : 24|2@1+ (1,0) [0|0] "" ECU2

BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_ "GenMsgCycleTime" BO_ 291 100;
VAL_ 291 GearState 0 "Park" 1 "Reverse" 2 "Drive" ;
"#;

#[test]
fn test_dbc_to_json_document() {
    let dir = TempDir::new().unwrap();
    let dbc_path = dir.path().join("vehicle.dbc");
    fs::write(&dbc_path, DBC).unwrap();

    let document = LayoutDocument::from_layouts(parse_dbc_file(&dbc_path).unwrap());
    let json_path = dir.path().join("vehicle.json");
    document.save(&json_path).unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(raw["messages"][0]["cycleTime"], json!(100));
    assert_eq!(raw["messages"][0]["signals"][0]["startBit"], json!(0));
    assert_eq!(raw["valTables"]["GearState"]["2"], "Drive");

    let loaded = LayoutDocument::load(&json_path).unwrap();
    assert_eq!(loaded, document);

    let frame = loaded.messages[0].decode().unwrap();
    let signals = frame.decode_payload(&[0xE8, 0x03, 0x64, 0x02, 0, 0, 0, 0]);
    assert_eq!(signals.len(), 3);
    assert_eq!(signals[0].value.as_f64(), 1000.0);
    assert_eq!(signals[1].value.as_f64(), 60.0);
    assert_eq!(signals[2].value_description.as_deref(), Some("Drive"));
}
