pub mod bulk;
pub mod engine;
pub mod fields;
pub mod links;
pub mod mapper;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{BulkDriver, BulkProgress, CancelFlag};
pub use engine::{
    AmbiguityPolicy, IssueFieldListing, LinkCheck, LinkLookup, MappingReport, ReferenceCheck, SyncEngine,
};
pub use fields::{FieldValue, MilestoneField};
pub use links::{LinkResolution, LinkResolver};
pub use mapper::FieldMapper;
pub use report::{BulkSyncReport, SyncResult, SyncStatus};
