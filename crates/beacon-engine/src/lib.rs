//! # beacon-engine
//!
//! Row operations run off the async runtime.
//!
//! - [`ProcessingEngine`]: bounded worker pool; responses are matched to
//!   requests by id and may complete out of order
//! - [`ops`]: `aggregate`, `filter`, `sort`, `transform`, `analyze`
//! - [`expr`]: the restricted expression language used by `transform`
//! - [`execute`]: run one request synchronously, turning failures and panics
//!   into an unsuccessful [`WorkResponse`]

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod expr;
pub mod ops;
pub mod types;
pub mod value;
pub mod worker;

pub use engine::{EngineConfig, ProcessingEngine};
pub use errors::{EngineError, ProcessingError};
pub use expr::{BinaryOp, Expr};
pub use types::{Operation, Row, WorkRequest, WorkResponse};
pub use worker::execute;
