pub mod backends;
pub mod config;
pub mod pipeline;
pub mod routes;
pub mod storage;
pub mod tasks;
