//! Repository traits for index operations.

pub mod instances;
pub mod partitions;
pub mod tag_errors;
pub mod tags;

pub use instances::InstanceRepo;
pub use partitions::PartitionRepo;
pub use tag_errors::TagErrorRepo;
pub use tags::ExtendedQueryTagRepo;
