//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times. Subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn legacy_document() -> Value {
    serde_json::from_str(include_str!("../fixtures/configs/legacy.json")).unwrap()
}

#[allow(dead_code)]
pub fn current_v1_document() -> Value {
    serde_json::from_str(include_str!("../fixtures/configs/current_v1.json")).unwrap()
}

#[allow(dead_code)]
pub fn current_v2_document() -> Value {
    serde_json::from_str(include_str!("../fixtures/configs/current_v2.json")).unwrap()
}

#[allow(dead_code)]
pub fn other_study_document() -> Value {
    serde_json::from_str(include_str!("../fixtures/configs/other_study.json")).unwrap()
}

/// Write `document` as `<dir>/<file_name>` and return its path.
#[allow(dead_code)]
pub fn write_document(dir: &Path, file_name: &str, document: &Value) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

/// Write a raw stream file of `size_bytes` bytes at `<root>/<user>/<stream>/<file_name>`.
#[allow(dead_code)]
pub fn write_raw(root: &Path, user: &str, stream: &str, file_name: &str, size_bytes: usize) -> PathBuf {
    let dir = root.join(user).join(stream);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, vec![b'x'; size_bytes]).unwrap();
    path
}

/// Write an identifiers file for `user` reporting one device.
#[allow(dead_code)]
pub fn write_identifiers(root: &Path, user: &str, file_name: &str, device_id: &str, os: &str) -> PathBuf {
    let header = "timestamp,UTC time,patient_id,MAC,phone_number,device_id,device_os,os_version,product,brand,hardware_id,manufacturer,model,beiwe_version";
    let row = format!("1583056800000,2020-03-01T10:00:00.000,{user},,,{device_id},{os},10,product,brand,,maker,model,2.4.1");
    let dir = root.join(user).join("identifiers");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, format!("{header}\n{row}\n")).unwrap();
    path
}

/// Two raw roots sharing user `u1`, whose `accelerometer` bucket `2020-03-01 10_00_00` is 100
/// bytes in the first root and 150 in the second, and whose `survey_answers` bucket
/// `2020-03-02 19_00_00` is 45 bytes in the first and 40 in the second.
#[allow(dead_code)]
pub fn create_split_roots(base: &Path) -> (PathBuf, PathBuf) {
    let a = base.join("raw_a");
    let b = base.join("raw_b");
    write_raw(&a, "u1", "accelerometer", "2020-03-01 10_00_00.csv", 100);
    write_raw(&a, "u1", "gps", "2020-03-01 10_00_00.csv", 30);
    write_identifiers(&a, "u1", "2020-03-01 09_00_00.csv", "DEV-1", "Android");
    write_raw(&a, "u1", "survey_answers/5873fe38644ad7557b168e45", "2020-03-02 19_00_00.csv", 45);
    write_raw(&b, "u1", "accelerometer", "2020-03-01 10_00_00.csv", 150);
    write_raw(&b, "u1", "accelerometer", "2020-03-01 12_00_00.csv", 80);
    write_raw(&b, "u1", "survey_answers/5873fe38644ad7557b168e45", "2020-03-02 19_00_00.csv", 40);
    write_identifiers(&b, "u1", "2020-03-03 09_00_00.csv", "DEV-2", "iPhone OS");
    write_raw(&b, "u2", "gps", "2020-02-20 08_00_00.csv", 25);
    write_identifiers(&b, "u2", "2020-02-20 07_00_00.csv", "DEV-3", "iOS");
    fs::create_dir_all(b.join("u2").join("bogus_stream")).unwrap();
    (a, b)
}
