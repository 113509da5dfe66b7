#![allow(dead_code)]

use std::sync::OnceLock;

pub use bigdecimal::BigDecimal;
pub use diesel::prelude::*;

pub use ledger_api::*;
use ledger_api::{account, interest, interest_log, ledger, transaction_log, transfer, wallet};

/// One pool per test binary; a fresh pool per test would hold far more
/// connections than the database allows under parallel test runs.
fn test_pool() -> PgPool {
	static POOL: OnceLock<PgPool> = OnceLock::new();
	POOL.get_or_init(get_db_connection).clone()
}

pub fn dec(raw: &str) -> BigDecimal {
	raw.parse().unwrap()
}

/// Keys must be fresh per test run: the logs table is append-only, so a
/// fixed literal would replay a previous run's transfer.
pub fn unique_key(label: &str) -> String {
	format!("{}-{}", label, uuid::Uuid::new_v4())
}

pub struct Fixture {
	pub pool: PgPool,
}

impl Fixture {
	pub fn new() -> Self {
		Fixture { pool: test_pool() }
	}

	pub fn pool(&self) -> PgPool {
		self.pool.clone()
	}

	pub fn conn(&self) -> PgPooledConnection {
		self.pool.get().unwrap()
	}

	pub fn insert_wallet(&self, balance: &str) -> Wallet {
		diesel::insert_into(schema::wallets::table)
			.values(NewWallet { balance: dec(balance) })
			.get_result(&mut self.conn())
			.unwrap()
	}

	pub fn insert_account(&self, balance: &str) -> Account {
		diesel::insert_into(schema::accounts::table)
			.values(NewAccount { balance: dec(balance) })
			.get_result(&mut self.conn())
			.unwrap()
	}
}

pub struct Suite {
	pub pool: PgPool,
	pub wallet_repo: wallet::Repo,
	pub transaction_log_repo: transaction_log::Repo,
	pub ledger_repo: ledger::Repo,
	pub account_repo: account::Repo,
	pub interest_log_repo: interest_log::Repo,
}

impl Suite {
	pub fn setup() -> Self {
		let pool = test_pool();

		Suite {
			wallet_repo: wallet::Repo::new(pool.clone()),
			transaction_log_repo: transaction_log::Repo::new(pool.clone()),
			ledger_repo: ledger::Repo::new(pool.clone()),
			account_repo: account::Repo::new(pool.clone()),
			interest_log_repo: interest_log::Repo::new(pool.clone()),
			pool,
		}
	}

	pub fn transfer_service(&self) -> transfer::Service {
		transfer::Service::new(transfer::NewService {
			db: self.pool.clone(),
			wallet_repo: &self.wallet_repo,
			transaction_log_repo: &self.transaction_log_repo,
			ledger_repo: &self.ledger_repo,
			cache: None,
		})
	}

	pub fn interest_service(&self) -> interest::Service {
		interest::Service::new(interest::NewService {
			db: self.pool.clone(),
			account_repo: &self.account_repo,
			interest_log_repo: &self.interest_log_repo,
		})
	}

	pub fn wallet_balance(&self, id: &Id) -> BigDecimal {
		self.wallet_repo.find_by_id(id).unwrap().balance
	}

	pub fn account_balance(&self, id: &Id) -> BigDecimal {
		self.account_repo.find_by_id(id).unwrap().balance
	}
}

#[test]
fn test_suite_setup() {
	let _suite = Suite::setup();
}
