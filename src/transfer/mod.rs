pub mod error;
pub mod service;

pub use error::{Error, ErrorKind};
pub use service::{NewService, Service, TransferRequest, TransferResponse, DEFAULT_HISTORY_LIMIT};
