//! Raw-data inventories.
//!
//! A [UserRegistryBuilder] scans one `<root>/<user>` directory into a [UserRegistry]. A
//! [ProjectRegistry] merges users found under several roots, attaches study configurations and
//! records [Flag]s for every structural anomaly it finds. Merging is a union of observations, so
//! the order in which roots are scanned never changes the result.

pub mod device;
pub mod flags;
pub mod project;
pub mod record;
pub mod stream;
pub mod user;

pub use device::{DeviceRecord, PhoneOs};
pub use flags::{Flag, FlagSet};
pub use project::{
    ConfigurationAssignment, OverviewRow, ProjectOverview, ProjectRegistry, UserSelection,
};
pub use stream::{BucketEntry, Coverage, StreamInventory};
pub use user::{MergeConflict, UserRegistry, UserRegistryBuilder};
