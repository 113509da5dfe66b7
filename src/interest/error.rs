use std::fmt;

use diesel::r2d2::PoolError;

use crate::db;
use crate::types::Id;

/// An error that can occur while applying interest.
#[derive(Debug, PartialEq)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	/// Status code an HTTP adapter should answer with for this error.
	pub fn http_status(&self) -> u16 {
		match &self.kind {
			ErrorKind::InvalidAmount(_) => 400,
			ErrorKind::AccountNotFound(_) => 404,
			ErrorKind::Internal(_) | ErrorKind::Database(_) => 500,
		}
	}
}

/// The kind of an error that can occur.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
	AccountNotFound(Id),
	InvalidAmount(String),
	Internal(String),
	Database(db::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		self.kind.fmt(f)
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ErrorKind::AccountNotFound(id) => write!(f, "account {} does not exist", id),
			ErrorKind::InvalidAmount(msg) => write!(f, "invalid amount: {}", msg),
			ErrorKind::Internal(msg) => write!(f, "internal inconsistency: {}", msg),
			ErrorKind::Database(e) => write!(f, "db error: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::new(ErrorKind::Database(e))
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}
