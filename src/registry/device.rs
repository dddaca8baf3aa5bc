//! Device facts read from `identifiers` files.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    fs,
    path::Path,
};

use crate::{error::RegistryError, time::HourBucket};

/// Expected columns of an identifiers file. iPhone files carry one extra unlabeled column.
pub const IDENTIFIERS_HEADER: [&str; 14] = [
    "timestamp",
    "UTC time",
    "patient_id",
    "MAC",
    "phone_number",
    "device_id",
    "device_os",
    "os_version",
    "product",
    "brand",
    "hardware_id",
    "manufacturer",
    "model",
    "beiwe_version",
];

/// One observation of a user's device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Bucket of the identifiers file this record came from.
    pub observed: HourBucket,
    pub device_id: Option<String>,
    pub device_os: Option<String>,
    pub os_version: Option<String>,
    pub beiwe_version: Option<String>,
    /// Every column, keyed by the observed header.
    pub fields: BTreeMap<String, String>,
}

impl DeviceRecord {
    pub fn read(path: &Path, observed: HourBucket) -> Result<DeviceRecord, RegistryError> {
        let content = fs::read_to_string(path)?;
        DeviceRecord::parse(&content, observed).map_err(|e| match e {
            RegistryError::MalformedDocument { message, .. } => {
                RegistryError::malformed(path.display().to_string(), message)
            }
            other => other,
        })
    }

    /// Parse the two-line CSV body of an identifiers file.
    pub fn parse(content: &str, observed: HourBucket) -> Result<DeviceRecord, RegistryError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let (Some(header), Some(row)) = (lines.next(), lines.next()) else {
            return Err(RegistryError::malformed(
                "identifiers",
                "expected a header and one row",
            ));
        };
        let keys: Vec<&str> = header.split(',').map(str::trim).collect();
        let mut values: Vec<String> = row.split(',').map(|v| v.trim().to_string()).collect();
        if values.len() > keys.len() && values.len() >= 2 {
            let tail = values.split_off(values.len() - 2).join("_");
            values.push(tail);
        }
        if keys != IDENTIFIERS_HEADER {
            tracing::warn!("Unknown identifiers header observed at {observed}: {header}");
        }
        let fields: BTreeMap<String, String> = keys
            .iter()
            .map(|k| k.to_string())
            .zip(values)
            .collect();
        let field = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();
        let device_id = field("device_id");
        let device_os = field("device_os").map(|os| normalize_os(&os));
        let os_version = field("os_version");
        let beiwe_version = field("beiwe_version");
        Ok(DeviceRecord {
            observed,
            device_id,
            device_os,
            os_version,
            beiwe_version,
            fields,
        })
    }
}

fn normalize_os(os: &str) -> String {
    match os {
        "iPhone OS" => "iOS".to_string(),
        other => other.to_string(),
    }
}

/// Operating system summary over a user's device records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneOs {
    Ios,
    Android,
    Multiple,
    Unknown,
}

impl PhoneOs {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DeviceRecord>) -> PhoneOs {
        let distinct: BTreeSet<&str> = records
            .into_iter()
            .filter_map(|r| r.device_os.as_deref())
            .collect();
        let mut iter = distinct.iter();
        match (iter.next(), iter.next()) {
            (None, _) => PhoneOs::Unknown,
            (Some(_), Some(_)) => PhoneOs::Multiple,
            (Some(&"iOS"), None) => PhoneOs::Ios,
            (Some(&"Android"), None) => PhoneOs::Android,
            (Some(_), None) => PhoneOs::Unknown,
        }
    }
}

impl Display for PhoneOs {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let label = match self {
            PhoneOs::Ios => "iOS",
            PhoneOs::Android => "Android",
            PhoneOs::Multiple => "multiple",
            PhoneOs::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Distinct device identifiers among `records`.
pub fn distinct_devices<'a>(records: impl IntoIterator<Item = &'a DeviceRecord>) -> usize {
    records
        .into_iter()
        .filter_map(|r| r.device_id.as_deref())
        .collect::<BTreeSet<_>>()
        .len()
}
