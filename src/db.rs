use std::env;
use std::fmt;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel::result::DatabaseErrorKind::{ForeignKeyViolation, SerializationFailure, UniqueViolation};
use diesel::result::Error::{DatabaseError, NotFound};
use dotenv::dotenv;

pub type Result<T> = std::result::Result<T, Error>;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Connect to PostgreSQL database
pub fn get_db_connection() -> PgPool {
	dotenv().ok();

	let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

	let manager = ConnectionManager::<PgConnection>::new(&database_url);
	let pool = Pool::builder().build(manager)
		.expect("Failed to create pool.");

	pool
}

#[derive(Debug)]
pub enum Error {
	RecordAlreadyExists,
	RecordNotFound,
	ReferencedRecordAbsent,
	Serialization,
	DatabaseError(diesel::result::Error),
	Connection(PoolError),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordAlreadyExists => write!(f, "a record with this key already exists"),
			Error::RecordNotFound => write!(f, "no such record"),
			Error::ReferencedRecordAbsent => write!(f, "record references a row that does not exist"),
			Error::Serialization => write!(f, "transaction aborted by serialization failure"),
			Error::Connection(e) => write!(f, "could not obtain a database connection: {}", e),
			Error::DatabaseError(e) => write!(f, "unexpected database error: {:?}", e),
		}
	}
}

impl std::error::Error for Error {}

impl PartialEq for Error {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Error::RecordAlreadyExists, Error::RecordAlreadyExists) => true,
			(Error::RecordNotFound, Error::RecordNotFound) => true,
			(Error::ReferencedRecordAbsent, Error::ReferencedRecordAbsent) => true,
			(Error::Serialization, Error::Serialization) => true,
			(Error::DatabaseError(a), Error::DatabaseError(b)) => a == b,
			(Error::Connection(_), Error::Connection(_)) => true,
			_ => false,
		}
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		match e {
			DatabaseError(UniqueViolation, _) => Error::RecordAlreadyExists,
			DatabaseError(ForeignKeyViolation, _) => Error::ReferencedRecordAbsent,
			DatabaseError(SerializationFailure, _) => Error::Serialization,
			NotFound => Error::RecordNotFound,

			_ => Error::DatabaseError(e),
		}
	}
}

impl From<PoolError> for Error {
	fn from(e: PoolError) -> Self {
		Error::Connection(e)
	}
}
