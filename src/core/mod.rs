pub mod error;
pub mod types;
pub mod value;

pub use error::{JobError, PersistenceError, RemapError, Result, SchedulerError};
pub use types::{ColumnDescriptor, DataType, EntityId, NamespaceId};
pub use value::Value;
