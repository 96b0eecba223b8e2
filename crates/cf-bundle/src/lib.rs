//! cf-bundle: the bulk packager.
//!
//! Decides when owed outputs are bundled ([`DeliveryPolicy`]), assembles
//! bundle archives with nested-archive flattening and collision-free naming
//! ([`ArchiveBuilder`], [`build_delivery`]), and hands the result to a
//! [`DeliverySink`].

pub mod archive;
pub mod naming;
pub mod policy;
pub mod sink;

pub use archive::{build_delivery, read_entries, ArchiveBuilder, BundleItem};
pub use naming::UniqueNames;
pub use policy::{BundleTrigger, DeliveryPolicy};
pub use sink::{Delivery, DeliverySink, DirectorySink, MemorySink};
