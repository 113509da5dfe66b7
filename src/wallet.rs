use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::{self, PgPool};
use crate::schema::wallets;
use crate::types::{Id, Time};

/// A funds-holding wallet. The balance is mutated only inside a transfer
/// transaction that holds the wallet's row lock.
#[derive(Queryable, Identifiable, Serialize, PartialEq, Clone, Debug)]
#[diesel(table_name = wallets)]
pub struct Wallet {
	pub id: Id,
	pub balance: BigDecimal,
	pub created_at: Time,
	pub updated_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = wallets)]
pub struct NewWallet {
	pub balance: BigDecimal,
}

pub struct Repo {
	db: PgPool,
}

impl Repo {
	pub fn new(db: PgPool) -> Self {
		Repo { db }
	}

	pub fn create(&self, new_wallet: NewWallet) -> db::Result<Wallet> {
		let conn = &mut self.db.get()?;
		diesel::insert_into(wallets::table)
			.values(&new_wallet)
			.get_result(conn)
			.map_err(Into::into)
	}

	pub fn find_by_id(&self, id: &Id) -> db::Result<Wallet> {
		let conn = &mut self.db.get()?;
		wallets::table
			.find(id)
			.first(conn)
			.map_err(Into::into)
	}

	/// Acquire the exclusive row lock, blocking concurrent lockers until the
	/// surrounding transaction commits or rolls back.
	pub fn lock_for_update(&self, conn: &mut PgConnection, id: &Id) -> db::Result<Option<Wallet>> {
		wallets::table
			.find(id)
			.for_update()
			.first(conn)
			.optional()
			.map_err(Into::into)
	}

	pub fn set_balance(&self, conn: &mut PgConnection, id: &Id, balance: &BigDecimal) -> db::Result<Wallet> {
		diesel::update(wallets::table.find(id))
			.set((
				wallets::balance.eq(balance),
				wallets::updated_at.eq(Utc::now()),
			))
			.get_result(conn)
			.map_err(Into::into)
	}
}
