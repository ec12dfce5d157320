pub mod document;
pub mod job;
pub mod loaders;
pub mod request;

pub use document::{DocStatus, DocTypeMeta, Document};
pub use job::{BulkJob, BulkOutcome, EnqueueOptions, ProgressEvent};
pub use loaders::{load_fixture, SiteFixture};
pub use request::{BulkAction, BulkActionRequest, BulkUpdateRequest, UpdatePayload};
