pub mod client;

pub use client::{BackendClient, DetectResponse, ProcedureResponse, DEFAULT_TIMEOUT};
