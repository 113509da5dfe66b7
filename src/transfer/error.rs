use std::fmt;

use bigdecimal::BigDecimal;
use diesel::r2d2::PoolError;

use crate::db;
use crate::money;
use crate::types::Id;

/// An error that can occur while executing a transfer command.
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
			ErrorKind::InvalidTransfer(_)
			| ErrorKind::MissingIdempotencyKey
			| ErrorKind::InsufficientFunds { .. } => 400,
			ErrorKind::WalletNotFound(_) => 404,
			ErrorKind::Internal(_) | ErrorKind::Database(_) => 500,
		}
	}
}

/// The kind of an error that can occur.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
	InvalidTransfer(String),
	MissingIdempotencyKey,
	WalletNotFound(Id),
	InsufficientFunds {
		available: BigDecimal,
		required: BigDecimal,
	},
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
			ErrorKind::InvalidTransfer(msg) => write!(f, "invalid transfer: {}", msg),
			ErrorKind::MissingIdempotencyKey => write!(f, "idempotency key is required"),
			ErrorKind::WalletNotFound(id) => write!(f, "wallet {} does not exist", id),
			ErrorKind::InsufficientFunds { available, required } => write!(
				f,
				"insufficient funds: available {}, required {}",
				money::to_fixed(available, money::SCALE_CENTS),
				money::to_fixed(required, money::SCALE_CENTS),
			),
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
