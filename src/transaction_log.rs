use std::io::Write;

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use serde::Serialize;

use crate::db::{self, PgPool};
use crate::schema::transaction_logs;
use crate::types::{Id, Time};

/// Record of one transfer command, unique per idempotency key.
///
/// A row is inserted as `Pending` before any balance mutation and transitions
/// exactly once to `Completed` or `Failed`. Rows are never deleted.
#[derive(Queryable, Identifiable, Serialize, PartialEq, Clone, Debug)]
#[diesel(table_name = transaction_logs)]
pub struct TransactionLog {
	pub id: Id,
	pub idempotency_key: String,
	pub from_wallet_id: Id,
	pub to_wallet_id: Id,
	pub amount: BigDecimal,
	pub status: TransactionStatus,
	pub error_message: Option<String>,
	pub created_at: Time,
	pub updated_at: Time,
}

#[derive(AsExpression, FromSqlRow, Serialize, PartialEq, Eq, Clone, Copy, Debug)]
#[diesel(sql_type = Varchar)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
	Pending,
	Completed,
	Failed,
}

impl TransactionStatus {
	pub fn as_str(&self) -> &str {
		match self {
			TransactionStatus::Pending => "PENDING",
			TransactionStatus::Completed => "COMPLETED",
			TransactionStatus::Failed => "FAILED",
		}
	}
}

impl ToSql<Varchar, Pg> for TransactionStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.as_str().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for TransactionStatus {
	fn from_sql(value: PgValue) -> deserialize::Result<Self> {
		match std::str::from_utf8(value.as_bytes())? {
			"PENDING" => Ok(TransactionStatus::Pending),
			"COMPLETED" => Ok(TransactionStatus::Completed),
			"FAILED" => Ok(TransactionStatus::Failed),
			other => Err(format!("invalid transaction status: {}", other).into()),
		}
	}
}

#[derive(Insertable)]
#[diesel(table_name = transaction_logs)]
pub struct NewTransactionLog<'a> {
	pub idempotency_key: &'a str,
	pub from_wallet_id: &'a Id,
	pub to_wallet_id: &'a Id,
	pub amount: &'a BigDecimal,
	pub status: TransactionStatus,
}

pub struct Repo {
	db: PgPool,
}

impl Repo {
	pub fn new(db: PgPool) -> Self {
		Repo { db }
	}

	/// Insert a new log row. Surfaces `db::Error::RecordAlreadyExists` when
	/// the idempotency key collides with a concurrent caller's insert.
	pub fn create(&self, conn: &mut PgConnection, new_log: NewTransactionLog) -> db::Result<TransactionLog> {
		diesel::insert_into(transaction_logs::table)
			.values(&new_log)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<TransactionLog> {
		let conn = &mut self.db.get()?;
		transaction_logs::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	/// Lock-free lookup used by the replay paths.
	pub fn find_by_idempotency_key(&self, key: &str) -> db::Result<Option<TransactionLog>> {
		let conn = &mut self.db.get()?;
		transaction_logs::table
			.filter(transaction_logs::idempotency_key.eq(key))
			.first(conn)
			.optional()
			.map_err(Into::into)
	}

	pub fn set_status(&self, conn: &mut PgConnection, id: &Id, status: TransactionStatus) -> db::Result<TransactionLog> {
		diesel::update(transaction_logs::table.find(id))
			.set((
				transaction_logs::status.eq(status),
				transaction_logs::updated_at.eq(Utc::now()),
			))
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn set_failed(&self, conn: &mut PgConnection, id: &Id, message: &str) -> db::Result<TransactionLog> {
		diesel::update(transaction_logs::table.find(id))
			.set((
				transaction_logs::status.eq(TransactionStatus::Failed),
				transaction_logs::error_message.eq(message),
				transaction_logs::updated_at.eq(Utc::now()),
			))
			.get_result(conn)
			.map_err(Into::into)
	}

	/// Best-effort failure marker running on its own connection, outside any
	/// caller transaction. Only touches rows still `Pending`.
	pub fn mark_failed_by_key(&self, key: &str, message: &str) -> db::Result<usize> {
		let conn = &mut self.db.get()?;
		diesel::update(
			transaction_logs::table
				.filter(transaction_logs::idempotency_key.eq(key))
				.filter(transaction_logs::status.eq(TransactionStatus::Pending)),
		)
		.set((
			transaction_logs::status.eq(TransactionStatus::Failed),
			transaction_logs::error_message.eq(message),
			transaction_logs::updated_at.eq(Utc::now()),
		))
		.execute(conn)
		.map_err(Into::into)
	}

	/// Transfers where the wallet is either the source or the destination,
	/// newest first.
	pub fn history_for_wallet(&self, wallet_id: &Id, limit: i64) -> db::Result<Vec<TransactionLog>> {
		let conn = &mut self.db.get()?;
		transaction_logs::table
			.filter(
				transaction_logs::from_wallet_id
					.eq(wallet_id)
					.or(transaction_logs::to_wallet_id.eq(wallet_id)),
			)
			.order(transaction_logs::created_at.desc())
			.limit(limit)
			.load(conn)
			.map_err(Into::into)
	}
}
