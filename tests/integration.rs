use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn framefind_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("framefind");
    path
}

/// Config whose primary store is unreachable, so every text and object
/// query is answered from the backup snapshots written here.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let backup_dir = root.join("backup");
    let catalog_dir = root.join("catalog");
    let metadata_dir = root.join("metadata");
    for dir in [&backup_dir, &catalog_dir, &metadata_dir, &root.join("config")] {
        fs::create_dir_all(dir).unwrap();
    }

    fs::write(
        backup_dir.join("ocr.json"),
        r#"[
            {"video_id": "L01_V001", "frame_id": 10, "text": ["BREAKING NEWS", "flood in the north"]},
            {"video_id": "L01_V002", "frame_id": 7, "text": "weather forecast"}
        ]"#,
    )
    .unwrap();
    fs::write(
        backup_dir.join("asr.json"),
        r#"[
            {"video_name": "L01_V001", "text": "good evening and welcome", "start": 1.0, "end": 3.0},
            {"video_name": "L01_V001", "text": "good evening once more", "start": 9.0, "end": 10.0}
        ]"#,
    )
    .unwrap();
    fs::write(
        backup_dir.join("object.json"),
        r#"[
            {"video_id": "L01_V001", "frame_id": 10, "labels": ["car", "person"], "label_counts": {"car": 3, "person": 1}},
            {"video_id": "L01_V002", "frame_id": 7, "labels": ["car"], "label_counts": {"car": 1}}
        ]"#,
    )
    .unwrap();

    fs::write(
        catalog_dir.join("images.json"),
        r#"[{"title": "L01_V001_10.jpg", "id": "img10"}]"#,
    )
    .unwrap();
    fs::write(
        catalog_dir.join("videos.json"),
        r#"[{"title": "L01_V001.mp4", "id": "vid1"}, {"title": "L01_V002.mp4", "id": "vid2"}]"#,
    )
    .unwrap();
    fs::write(
        catalog_dir.join("fps.json"),
        r#"[{"title": "L01_V001.mp4", "fps": 10.0}]"#,
    )
    .unwrap();
    fs::write(
        catalog_dir.join("id_map.json"),
        r#"[
            {"video_id": "L01_V001", "frame_id": 10},
            {"video_id": "L01_V001", "frame_id": 25},
            {"video_id": "L01_V002", "frame_id": 7}
        ]"#,
    )
    .unwrap();
    fs::write(
        metadata_dir.join("L01_V001.json"),
        r#"{"publish_date": "15/03/2022", "title": "Evening news"}"#,
    )
    .unwrap();
    fs::write(
        metadata_dir.join("L01_V002.json"),
        r#"{"publish_date": "02/11/2023"}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[primary]
url = "http://127.0.0.1:1"
timeout_secs = 2

[backup]
ocr = "{root}/backup/ocr.json"
asr = "{root}/backup/asr.json"
object = "{root}/backup/object.json"

[catalog]
images = "{root}/catalog/images.json"
videos = "{root}/catalog/videos.json"
fps = "{root}/catalog/fps.json"
id_map = "{root}/catalog/id_map.json"
metadata_dir = "{root}/metadata"
image_url_template = "https://media.test/img/{{id}}"
video_url_template = "https://media.test/vid/{{id}}"

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = root.join("config").join("framefind.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_framefind(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = framefind_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run framefind binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn search(config_path: &Path, args: &[&str]) -> Value {
    let mut full = vec!["search"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run_framefind(config_path, &full);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

#[test]
fn test_ocr_falls_back_to_backup_when_primary_unreachable() {
    let (_tmp, config_path) = setup_test_env();
    let out = search(&config_path, &["--ocr", "flood"]);

    let ocr = out["ocr"].as_array().unwrap();
    assert_eq!(ocr.len(), 1);
    assert_eq!(ocr[0]["video_id"], "L01_V001");
    assert_eq!(ocr[0]["frame_id"], 10);
    assert_eq!(ocr[0]["image_path"], "https://media.test/img/img10");
    assert_eq!(ocr[0]["video_path"], "https://media.test/vid/vid1");
    assert_eq!(ocr[0]["fps"], 10.0);
}

#[test]
fn test_all_keys_present_even_when_unqueried() {
    let (_tmp, config_path) = setup_test_env();
    let out = search(&config_path, &["--ocr", "flood"]);
    for key in ["clip", "object", "asr", "image"] {
        assert_eq!(out[key], serde_json::json!([]), "key {} should be an empty array", key);
    }
}

#[test]
fn test_unresolvable_paths_are_null_not_dropped() {
    let (_tmp, config_path) = setup_test_env();
    let out = search(&config_path, &["--ocr", "weather"]);
    let ocr = out["ocr"].as_array().unwrap();
    assert_eq!(ocr.len(), 1);
    assert!(ocr[0]["image_path"].is_null());
    assert_eq!(ocr[0]["video_path"], "https://media.test/vid/vid2");
    assert!(ocr[0]["fps"].is_null());
}

#[test]
fn test_speech_hits_are_bound_to_frames() {
    let (_tmp, config_path) = setup_test_env();
    let out = search(&config_path, &["--asr", "good evening"]);

    // start=1.0s at 10 fps → position 10 → first frame after is 25.
    // start=9.0s → position 90 → no later frame, so the segment is dropped.
    let asr = out["asr"].as_array().unwrap();
    assert_eq!(asr.len(), 1);
    assert_eq!(asr[0]["video_id"], "L01_V001");
    assert_eq!(asr[0]["frame_id"], 25);
    assert_eq!(asr[0]["text"], "good evening and welcome");
}

#[test]
fn test_object_operator_and_date_filter() {
    let (_tmp, config_path) = setup_test_env();

    let out = search(&config_path, &["--object", "car", "--operator", "gte", "--value", "1"]);
    assert_eq!(out["object"].as_array().unwrap().len(), 2);

    let out = search(&config_path, &["--object", "car", "--operator", "eq", "--value", "3"]);
    let object = out["object"].as_array().unwrap();
    assert_eq!(object.len(), 1);
    assert_eq!(object[0]["frame_id"], 10);

    let out = search(&config_path, &["--object", "car", "--year", "2023"]);
    let object = out["object"].as_array().unwrap();
    assert_eq!(object.len(), 1);
    assert_eq!(object[0]["video_id"], "L01_V002");
}

#[test]
fn test_backup_only_uses_stricter_threshold() {
    let (_tmp, config_path) = setup_test_env();

    let out = search(&config_path, &["--ocr", "wether"]);
    let videos: Vec<&str> = out["ocr"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|h| h["video_id"].as_str())
        .collect();
    assert!(videos.contains(&"L01_V002"), "ocr={}", out["ocr"]);

    let out = search(&config_path, &["--ocr", "wether", "--backup-only"]);
    assert!(out["ocr"].as_array().unwrap().is_empty());

    let out = search(&config_path, &["--ocr", "weather", "--backup-only"]);
    let ocr = out["ocr"].as_array().unwrap();
    assert_eq!(ocr.len(), 1);
    assert_eq!(ocr[0]["video_id"], "L01_V002");
}

#[test]
fn test_unknown_operator_matches_nothing() {
    let (_tmp, config_path) = setup_test_env();
    let out = search(&config_path, &["--object", "car", "--operator", "between"]);
    assert!(out["object"].as_array().unwrap().is_empty());
}

#[test]
fn test_invalid_date_fails_request() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_framefind(
        &config_path,
        &["search", "--ocr", "flood", "--day", "31", "--month", "2"],
    );
    assert!(!success, "expected failure, got stdout={}", stdout);
    assert!(stderr.contains("invalid date"), "stderr={}", stderr);
}

#[test]
fn test_visual_search_fails_when_backend_disabled() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_framefind(&config_path, &["search", "--clip", "a red car"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);

    let (_, _, success) = run_framefind(&config_path, &["similar", "https://media.test/q.jpg"]);
    assert!(!success);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) =
        run_framefind(&tmp.path().join("nope.toml"), &["search", "--ocr", "x"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}
