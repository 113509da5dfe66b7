use std::io::Write;

use bigdecimal::BigDecimal;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Varchar;
use serde::Serialize;

use crate::db::{self, PgPool};
use crate::schema::{ledgers, transaction_logs};
use crate::transaction_log::TransactionLog;
use crate::types::{Id, Time};

/// One side of a double-entry pair. Append-only and immutable; every
/// completed transfer owns exactly one debit and one credit row.
#[derive(Queryable, Identifiable, Serialize, PartialEq, Clone, Debug)]
#[diesel(table_name = ledgers)]
pub struct Ledger {
	pub id: Id,
	pub wallet_id: Id,
	pub transaction_log_id: Id,
	pub entry_type: EntryType,
	pub amount: BigDecimal,
	pub balance_before: BigDecimal,
	pub balance_after: BigDecimal,
	pub description: Option<String>,
	pub created_at: Time,
}

#[derive(AsExpression, FromSqlRow, Serialize, PartialEq, Eq, Clone, Copy, Debug)]
#[diesel(sql_type = Varchar)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
	Debit,
	Credit,
}

impl EntryType {
	pub fn as_str(&self) -> &str {
		match self {
			EntryType::Debit => "DEBIT",
			EntryType::Credit => "CREDIT",
		}
	}
}

impl ToSql<Varchar, Pg> for EntryType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
		out.write_all(self.as_str().as_bytes())?;
		Ok(IsNull::No)
	}
}

impl FromSql<Varchar, Pg> for EntryType {
	fn from_sql(value: PgValue) -> deserialize::Result<Self> {
		match std::str::from_utf8(value.as_bytes())? {
			"DEBIT" => Ok(EntryType::Debit),
			"CREDIT" => Ok(EntryType::Credit),
			other => Err(format!("invalid ledger entry type: {}", other).into()),
		}
	}
}

#[derive(Insertable)]
#[diesel(table_name = ledgers)]
pub struct NewLedger<'a> {
	pub wallet_id: &'a Id,
	pub transaction_log_id: &'a Id,
	pub entry_type: EntryType,
	pub amount: &'a BigDecimal,
	pub balance_before: &'a BigDecimal,
	pub balance_after: &'a BigDecimal,
	pub description: Option<&'a str>,
}

pub struct Repo {
	db: PgPool,
}

impl Repo {
	pub fn new(db: PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, conn: &mut PgConnection, new_ledger: NewLedger) -> db::Result<Ledger> {
		diesel::insert_into(ledgers::table)
			.values(&new_ledger)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_transaction_log(&self, transaction_log_id: &Id) -> db::Result<Vec<Ledger>> {
		let conn = &mut self.db.get()?;
		ledgers::table
			.filter(ledgers::transaction_log_id.eq(transaction_log_id))
			.load(conn)
			.map_err(Into::into)
	}

	/// A wallet's entries, newest first, joined with their transaction log
	/// for caller-visible context.
	pub fn find_by_wallet(&self, wallet_id: &Id, limit: i64) -> db::Result<Vec<(Ledger, TransactionLog)>> {
		let conn = &mut self.db.get()?;
		ledgers::table
			.inner_join(transaction_logs::table)
			.filter(ledgers::wallet_id.eq(wallet_id))
			.order(ledgers::created_at.desc())
			.limit(limit)
			.load(conn)
			.map_err(Into::into)
	}
}
