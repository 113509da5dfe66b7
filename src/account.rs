use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::{self, PgPool};
use crate::schema::accounts;
use crate::types::{Id, Time};

/// An interest-bearing savings account. The balance carries eight fractional
/// digits and is mutated only by interest application.
#[derive(Queryable, Identifiable, Serialize, PartialEq, Clone, Debug)]
#[diesel(table_name = accounts)]
pub struct Account {
	pub id: Id,
	pub balance: BigDecimal,
	pub created_at: Time,
	pub updated_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount {
	pub balance: BigDecimal,
}

pub struct Repo {
	db: PgPool,
}

impl Repo {
	pub fn new(db: PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_account: NewAccount) -> db::Result<Account> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(accounts::table)
			.values(&new_account)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<Account> {
		let conn = &mut self.db.get()?;
		accounts::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	pub fn lock_for_update(&self, conn: &mut PgConnection, id: &Id) -> db::Result<Option<Account>> {
		accounts::table
			.find(id)
			.for_update()
			.first(conn)
			.optional()
			.map_err(Into::into)
	}

	pub fn set_balance(&self, conn: &mut PgConnection, id: &Id, balance: &BigDecimal) -> db::Result<Account> {
		diesel::update(accounts::table.find(id))
			.set((
				accounts::balance.eq(balance),
				accounts::updated_at.eq(Utc::now()),
			))
			.get_result(conn)
			.map_err(Into::into)
	}
}
