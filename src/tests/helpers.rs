//! Shared test utilities for configuration and registry tests

use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::registry::device::IDENTIFIERS_HEADER;

/// Initialize logging for tests
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn fixture(content: &str) -> Value {
    serde_json::from_str(content).unwrap()
}

/// Legacy (extended JSON) encoding of the reference study.
pub fn legacy_document() -> Value {
    fixture(include_str!("../../tests/fixtures/configs/legacy.json"))
}

/// The reference study: one audio, one tracking and one deleted dummy survey.
pub fn current_v1_document() -> Value {
    fixture(include_str!("../../tests/fixtures/configs/current_v1.json"))
}

pub fn current_v2_document() -> Value {
    fixture(include_str!("../../tests/fixtures/configs/current_v2.json"))
}

/// A second study whose only survey also defaults to `Survey 1`.
pub fn other_study_document() -> Value {
    fixture(include_str!("../../tests/fixtures/configs/other_study.json"))
}

pub fn write_document(dir: &Path, file_name: &str, document: &Value) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

/// Write `size_bytes` bytes to `<user_dir>/<stream>/<file_name>`. `stream` may hold a survey
/// subfolder, e.g. `survey_answers/<survey id>`.
pub fn write_stream_file(user_dir: &Path, stream: &str, file_name: &str, size_bytes: usize) -> PathBuf {
    let dir = user_dir.join(stream);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, vec![b'x'; size_bytes]).unwrap();
    path
}

/// Write an identifiers file reporting one device.
pub fn write_identifiers(user_dir: &Path, file_name: &str, device_id: &str, os: &str) -> PathBuf {
    let dir = user_dir.join("identifiers");
    fs::create_dir_all(&dir).unwrap();
    let row = format!(
        "1583056800000,2020-03-01T10:00:00.000,user,,,{device_id},{os},13.3,product,brand,,maker,model,2.4.1"
    );
    let path = dir.join(file_name);
    fs::write(&path, format!("{}\n{row}\n", IDENTIFIERS_HEADER.join(","))).unwrap();
    path
}
