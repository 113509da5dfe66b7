use bigdecimal::BigDecimal;
use chrono::{Datelike, Utc};
use diesel::Connection;
use log::{debug, info};
use serde::Serialize;

use crate::account::{self, Account, NewAccount};
use crate::db;
use crate::interest_log::{self, InterestLog, NewInterestLog};
use crate::money;
use crate::types::{Date, Id};

use super::error::{Error, ErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

/// Annual interest rate applied to savings accounts.
pub const ANNUAL_RATE: &str = "0.275";

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;

pub fn is_leap_year(year: i32) -> bool {
	(year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_year(year: i32) -> i32 {
	if is_leap_year(year) {
		366
	} else {
		365
	}
}

pub fn annual_rate() -> BigDecimal {
	money::parse(ANNUAL_RATE).expect("annual rate literal parses")
}

/// Daily rate for the year, at 20 significant digits, half-up.
pub fn daily_rate(year: i32) -> BigDecimal {
	money::div(&annual_rate(), &BigDecimal::from(days_in_year(year)))
}

/// The UTC calendar day interest defaults to.
pub fn today() -> Date {
	Utc::now().date_naive()
}

fn compound_once(principal: &BigDecimal, year: i32) -> (BigDecimal, BigDecimal) {
	let interest = money::round(&(principal * daily_rate(year)), money::SCALE_MICRO);
	let new_balance = money::round(&(principal + &interest), money::SCALE_MICRO);
	(interest, new_balance)
}

/// Outcome of one day's interest application, fresh or replayed.
#[derive(Serialize, PartialEq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InterestResult {
	pub account_id: Id,
	pub calculation_date: Date,
	pub principal_balance: BigDecimal,
	pub daily_rate: BigDecimal,
	pub interest_amount: BigDecimal,
	pub new_balance: BigDecimal,
	pub annual_rate: BigDecimal,
	pub days_in_year: i32,
	pub is_new: bool,
}

impl InterestResult {
	fn from_log(log: InterestLog, is_new: bool) -> Self {
		InterestResult {
			daily_rate: money::div(&log.annual_rate, &BigDecimal::from(log.days_in_year)),
			account_id: log.account_id,
			calculation_date: log.calculation_date,
			principal_balance: log.principal_balance,
			interest_amount: log.interest_amount,
			new_balance: log.new_balance,
			annual_rate: log.annual_rate,
			days_in_year: log.days_in_year,
			is_new,
		}
	}
}

/// Service applying daily compounding interest to savings accounts
pub struct Service<'a> {
	db: db::PgPool,
	account_repo: &'a account::Repo,
	interest_log_repo: &'a interest_log::Repo,
}

/// Parameter object for creating a new Service
pub struct NewService<'a> {
	pub db: db::PgPool,
	pub account_repo: &'a account::Repo,
	pub interest_log_repo: &'a interest_log::Repo,
}

impl<'a> Service<'a> {
	pub fn new(v: NewService<'a>) -> Self {
		Service {
			db: v.db,
			account_repo: v.account_repo,
			interest_log_repo: v.interest_log_repo,
		}
	}

	/// Apply one day of interest to the account, exactly once per
	/// `(account, date)`.
	///
	/// A second application for the same day replays the stored log without
	/// touching the balance, whether it finds the row up front or loses the
	/// unique-key race to a concurrent caller.
	pub fn calculate_daily_interest(&self, account_id: &Id, date: Date) -> Result<InterestResult> {
		if let Some(existing) = self
			.interest_log_repo
			.find_by_account_and_date(account_id, date)?
		{
			debug!("interest for {} on {}: replaying log {}", account_id, date, existing.id);
			return Ok(InterestResult::from_log(existing, false));
		}

		// Fail fast on unknown accounts before opening a transaction.
		self.get_account(account_id)?;

		let year = date.year();
		let conn = &mut self.db.get()?;
		// Runs at the database's default READ COMMITTED level; the account
		// row lock and the (account_id, calculation_date) unique constraint
		// carry the correctness.
		let inserted = conn.transaction::<InterestLog, Error, _>(|conn| {
			let account = self
				.account_repo
				.lock_for_update(conn, account_id)?
				.ok_or_else(|| Error::new(ErrorKind::AccountNotFound(*account_id)))?;

			let principal = money::round(&account.balance, money::SCALE_MICRO);
			let (interest, new_balance) = compound_once(&principal, year);

			let log = self.interest_log_repo.create(conn, NewInterestLog {
				account_id,
				calculation_date: date,
				principal_balance: &principal,
				interest_amount: &interest,
				new_balance: &new_balance,
				annual_rate: &money::round(&annual_rate(), money::RATE_SCALE),
				days_in_year: days_in_year(year),
			})?;

			self.account_repo.set_balance(conn, account_id, &new_balance)?;
			Ok(log)
		});

		match inserted {
			Ok(log) => {
				info!(
					"interest for {} on {}: accrued {}",
					account_id,
					date,
					money::to_fixed(&log.interest_amount, money::SCALE_MICRO),
				);
				Ok(InterestResult::from_log(log, true))
			}
			Err(e) if e.kind() == &ErrorKind::Database(db::Error::RecordAlreadyExists) => {
				// A concurrent caller won the day; its log is authoritative
				// and the balance update must not be re-applied.
				let existing = self
					.interest_log_repo
					.find_by_account_and_date(account_id, date)?
					.ok_or_else(|| {
						Error::new(ErrorKind::Internal(format!(
							"interest log for {} on {} vanished after unique violation",
							account_id, date
						)))
					})?;
				Ok(InterestResult::from_log(existing, false))
			}
			Err(e) => Err(e),
		}
	}

	/// Apply interest for every day in `[start, end]`, one transaction per
	/// day. Progress already committed survives a mid-range error, and each
	/// day compounds on the balance the previous day left behind.
	pub fn calculate_interest_for_date_range(
		&self,
		account_id: &Id,
		start: Date,
		end: Date,
	) -> Result<Vec<InterestResult>> {
		let mut results = Vec::new();
		let mut day = start;
		while day <= end {
			results.push(self.calculate_daily_interest(account_id, day)?);
			day = day
				.succ_opt()
				.ok_or_else(|| Error::new(ErrorKind::Internal("calendar overflow".to_string())))?;
		}
		Ok(results)
	}

	pub fn create_account(&self, initial_balance: &str) -> Result<Account> {
		let balance = money::parse(initial_balance).map_err(|e| {
			Error::new(ErrorKind::InvalidAmount(format!(
				"initial balance {:?} does not parse: {}",
				initial_balance, e
			)))
		})?;
		if balance < BigDecimal::from(0) {
			return Err(Error::new(ErrorKind::InvalidAmount(
				"initial balance cannot be negative".to_string(),
			)));
		}
		let balance = money::round(&balance, money::SCALE_MICRO);
		self.account_repo.create(NewAccount { balance }).map_err(Into::into)
	}

	pub fn get_account(&self, id: &Id) -> Result<Account> {
		self.account_repo.find_by_id(id).map_err(|e| match e {
			db::Error::RecordNotFound => Error::new(ErrorKind::AccountNotFound(*id)),
			other => other.into(),
		})
	}

	/// Applied days for the account, most recent calculation date first.
	pub fn get_interest_history(&self, account_id: &Id, limit: Option<i64>) -> Result<Vec<InterestLog>> {
		self.interest_log_repo
			.history(account_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
			.map_err(Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn leap_years_follow_the_gregorian_rule() {
		for year in 1600..=2400 {
			// A February 29th exists exactly in leap years.
			let want = Date::from_ymd_opt(year, 2, 29).is_some();
			assert_eq!(is_leap_year(year), want, "year {}", year);
		}
	}

	#[test]
	fn days_in_year_matches_leapness() {
		assert_eq!(days_in_year(2023), 365);
		assert_eq!(days_in_year(2024), 366);
		assert_eq!(days_in_year(1900), 365);
		assert_eq!(days_in_year(2000), 366);
	}

	#[test]
	fn daily_rate_carries_twenty_significant_digits() {
		assert_eq!(daily_rate(2023).to_string(), "0.00075342465753424657534");
		assert_eq!(daily_rate(2024).to_string(), "0.00075136612021857923497");
	}

	#[test]
	fn one_day_of_interest_on_ten_thousand() {
		let principal = money::parse("10000.00000000").unwrap();
		let (interest, new_balance) = compound_once(&principal, 2023);
		assert_eq!(money::to_fixed(&interest, money::SCALE_MICRO), "7.53424658");
		assert_eq!(money::to_fixed(&new_balance, money::SCALE_MICRO), "10007.53424658");
	}

	#[test]
	fn a_leap_year_of_daily_compounding() {
		let mut balance = money::parse("10000.00000000").unwrap();
		for _ in 0..days_in_year(2024) {
			let (_, next) = compound_once(&balance, 2024);
			balance = next;
		}
		assert_eq!(money::to_fixed(&balance, money::SCALE_MICRO), "13163.94735458");
		assert_eq!(money::to_fixed(&balance, money::SCALE_CENTS), "13163.95");
	}
}
