pub mod model;
pub mod registry;
pub mod service;
pub mod worker_pool;

pub use registry::{RegistryError, TaskRegistry};
pub use service::{TaskService, TaskServiceError};
pub use worker_pool::{PoolError, WorkerPool};
