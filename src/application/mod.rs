//! Application layer wiring DTOs and services for finrag.

pub mod dtos;
pub mod services;

pub use dtos::{HealthStatusResponse, QueryRequest, QueryResponse};
pub use services::QueryService;
