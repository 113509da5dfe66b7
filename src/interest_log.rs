use bigdecimal::BigDecimal;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::{self, PgPool};
use crate::schema::interest_logs;
use crate::types::{Date, Id, Time};

/// Immutable record of one day's interest application. The database enforces
/// uniqueness of `(account_id, calculation_date)`.
#[derive(Queryable, Identifiable, Serialize, PartialEq, Clone, Debug)]
#[diesel(table_name = interest_logs)]
pub struct InterestLog {
	pub id: Id,
	pub account_id: Id,
	pub calculation_date: Date,
	pub principal_balance: BigDecimal,
	pub interest_amount: BigDecimal,
	pub new_balance: BigDecimal,
	pub annual_rate: BigDecimal,
	pub days_in_year: i32,
	pub created_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = interest_logs)]
pub struct NewInterestLog<'a> {
	pub account_id: &'a Id,
	pub calculation_date: Date,
	pub principal_balance: &'a BigDecimal,
	pub interest_amount: &'a BigDecimal,
	pub new_balance: &'a BigDecimal,
	pub annual_rate: &'a BigDecimal,
	pub days_in_year: i32,
}

pub struct Repo {
	db: PgPool,
}

impl Repo {
	pub fn new(db: PgPool) -> Self {
		Repo { db }
	}

	/// Insert a day's log. Surfaces `db::Error::RecordAlreadyExists` when a
	/// concurrent caller already applied interest for the same day.
	pub fn create(&self, conn: &mut PgConnection, new_log: NewInterestLog) -> db::Result<InterestLog> {
		diesel::insert_into(interest_logs::table)
			.values(&new_log)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_account_and_date(&self, account_id: &Id, date: Date) -> db::Result<Option<InterestLog>> {
		let conn = &mut self.db.get()?;
		interest_logs::table
			.filter(interest_logs::account_id.eq(account_id))
			.filter(interest_logs::calculation_date.eq(date))
			.first(conn)
			.optional()
			.map_err(Into::into)
	}

	pub fn history(&self, account_id: &Id, limit: i64) -> db::Result<Vec<InterestLog>> {
		let conn = &mut self.db.get()?;
		interest_logs::table
			.filter(interest_logs::account_id.eq(account_id))
			.order(interest_logs::calculation_date.desc())
			.limit(limit)
			.load(conn)
			.map_err(Into::into)
	}
}
