use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
};

use super::{device::PhoneOs, UserRegistry};

/// Named, non-fatal anomalies recorded against users during registry construction.
#[derive(EnumSetType, Debug, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[enumset(serialize_repr = "list")]
pub enum Flag {
    /// Present in a raw root but excluded by the user selection.
    IgnoredUsers,
    /// Selected but absent from every raw root.
    NoRegistry,
    /// Registry built, but no stream other than `identifiers` holds data.
    WithoutData,
    NoIdentifiers,
    IrregularDirectories,
    UnregisteredFiles,
    MultipleDevices,
    MultipleOs,
    UnknownOs,
    /// Same stream and hour bucket observed with different byte sizes.
    MergeConflicts,
    /// Attached configurations could not be given unique names.
    UnnamedObjects,
}

impl Flag {
    /// Flags derivable from one user's registry alone.
    pub fn of_user(user: &UserRegistry) -> EnumSet<Flag> {
        let mut flags = EnumSet::empty();
        if !user.has_data() {
            flags |= Flag::WithoutData;
        }
        if user.devices.is_empty() {
            flags |= Flag::NoIdentifiers;
        }
        if !user.irregular_directories.is_empty() {
            flags |= Flag::IrregularDirectories;
        }
        if !user.unregistered_files.is_empty() {
            flags |= Flag::UnregisteredFiles;
        }
        if user.device_count() > 1 {
            flags |= Flag::MultipleDevices;
        }
        match user.phone_os() {
            PhoneOs::Multiple => flags |= Flag::MultipleOs,
            PhoneOs::Unknown => flags |= Flag::UnknownOs,
            PhoneOs::Ios | PhoneOs::Android => {}
        }
        if user.conflicts().next().is_some() {
            flags |= Flag::MergeConflicts;
        }
        flags
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let label = match self {
            Flag::IgnoredUsers => "ignored_users",
            Flag::NoRegistry => "no_registry",
            Flag::WithoutData => "without_data",
            Flag::NoIdentifiers => "no_identifiers",
            Flag::IrregularDirectories => "irregular_directories",
            Flag::UnregisteredFiles => "unregistered_files",
            Flag::MultipleDevices => "multiple_devices",
            Flag::MultipleOs => "multiple_os",
            Flag::UnknownOs => "unknown_os",
            Flag::MergeConflicts => "merge_conflicts",
            Flag::UnnamedObjects => "unnamed_objects",
        };
        write!(f, "{label}")
    }
}

/// Project flags, each mapped to the users it applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet(BTreeMap<Flag, BTreeSet<String>>);

impl FlagSet {
    pub fn insert(&mut self, flag: Flag, user_id: &str) {
        tracing::warn!("Flagged {user_id}: {flag}");
        self.0.entry(flag).or_default().insert(user_id.to_string());
    }

    pub fn users(&self, flag: Flag) -> impl Iterator<Item = &str> {
        self.0
            .get(&flag)
            .into_iter()
            .flat_map(|users| users.iter().map(String::as_str))
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.get(&flag).is_some_and(|users| !users.is_empty())
    }

    pub fn is_flagged(&self, flag: Flag, user_id: &str) -> bool {
        self.0.get(&flag).is_some_and(|users| users.contains(user_id))
    }

    /// Flags raised for one user.
    pub fn of(&self, user_id: &str) -> EnumSet<Flag> {
        self.0
            .iter()
            .filter(|(_, users)| users.contains(user_id))
            .map(|(flag, _)| *flag)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Flag, &BTreeSet<String>)> {
        self.0.iter().map(|(flag, users)| (*flag, users))
    }
}
