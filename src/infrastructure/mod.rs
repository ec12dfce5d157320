//! 基础设施层：宿主框架接口及其实现
//!
//! 只暴露能力，不认识批量流程。

pub mod job_queue;
pub mod memory_site;
pub mod site;

pub use job_queue::{ChannelJobQueue, JobQueue, WorkItem, WorkReceiver};
pub use memory_site::MemorySite;
pub use site::{DocumentStore, Permissions, Realtime, Site, SiteError, Transactions};
