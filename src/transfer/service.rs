use bigdecimal::{BigDecimal, Zero};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::cache::ResponseCache;
use crate::db;
use crate::ledger::{self, EntryType, Ledger, NewLedger};
use crate::money;
use crate::transaction_log::{self, NewTransactionLog, TransactionLog, TransactionStatus};
use crate::types::Id;
use crate::wallet::{self, NewWallet, Wallet};

use super::error::{Error, ErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Serialization aborts are retried this many times, and only while the
/// attempt has no externally visible side effect.
const MAX_SERIALIZATION_ATTEMPTS: u32 = 3;

/// A transfer command as delivered by the request surface.
#[derive(Clone, Debug)]
pub struct TransferRequest {
	pub idempotency_key: String,
	pub from_wallet_id: Id,
	pub to_wallet_id: Id,
	pub amount: BigDecimal,
}

#[derive(Serialize, PartialEq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub transaction: TransactionLog,
	pub is_idempotent: bool,
}

/// How one pass through the state machine ended. `Failed` commits the
/// failure record before surfacing the error to the caller.
enum Outcome {
	Completed(TransactionLog),
	Failed { log: TransactionLog, error: Error },
}

/// Service executing the wallet transfer state machine
pub struct Service<'a> {
	db: db::PgPool,
	wallet_repo: &'a wallet::Repo,
	transaction_log_repo: &'a transaction_log::Repo,
	ledger_repo: &'a ledger::Repo,
	cache: Option<&'a ResponseCache>,
}

/// Parameter object for creating a new Service
pub struct NewService<'a> {
	pub db: db::PgPool,
	pub wallet_repo: &'a wallet::Repo,
	pub transaction_log_repo: &'a transaction_log::Repo,
	pub ledger_repo: &'a ledger::Repo,
	pub cache: Option<&'a ResponseCache>,
}

impl<'a> Service<'a> {
	pub fn new(v: NewService<'a>) -> Self {
		Service {
			db: v.db,
			wallet_repo: v.wallet_repo,
			transaction_log_repo: v.transaction_log_repo,
			ledger_repo: v.ledger_repo,
			cache: v.cache,
		}
	}

	/// Move funds between two wallets, exactly once per idempotency key.
	///
	/// Duplicate submissions replay the persisted outcome: either the key's
	/// log already exists (fast path, no transaction) or the `PENDING` insert
	/// loses the unique-key race and the winner's row is fetched instead.
	/// Both wallet rows are locked in lexicographic id order, so opposing
	/// transfers over the same pair cannot deadlock.
	pub fn execute_transfer(&self, req: &TransferRequest) -> Result<TransferResponse> {
		let amount = validate(req)?;

		if let Some(cache) = self.cache {
			if let Some(hit) = cache.get(&req.idempotency_key) {
				debug!("transfer {}: served from response cache", req.idempotency_key);
				return Ok(hit);
			}
		}

		if let Some(existing) = self
			.transaction_log_repo
			.find_by_idempotency_key(&req.idempotency_key)?
		{
			return Ok(self.replay(existing));
		}

		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.run_state_machine(req, &amount) {
				Ok(Outcome::Completed(log)) => {
					info!(
						"transfer {}: moved {} from {} to {}",
						req.idempotency_key,
						money::to_fixed(&amount, money::SCALE_CENTS),
						req.from_wallet_id,
						req.to_wallet_id,
					);
					let response = TransferResponse {
						success: true,
						message: None,
						transaction: log,
						is_idempotent: false,
					};
					if let Some(cache) = self.cache {
						// a cache hit is by definition a replay
						let mut memo = response.clone();
						memo.is_idempotent = true;
						cache.store(&req.idempotency_key, memo);
					}
					return Ok(response);
				}
				Ok(Outcome::Failed { log, error }) => {
					warn!("transfer {}: failed as log {}: {}", req.idempotency_key, log.id, error);
					return Err(error);
				}
				Err(e) => {
					if matches!(e.kind(), ErrorKind::Database(db::Error::RecordAlreadyExists)) {
						// Lost the insert race; the winner's row is the
						// source of truth for this key.
						let existing = self
							.transaction_log_repo
							.find_by_idempotency_key(&req.idempotency_key)?
							.ok_or_else(|| {
								Error::new(ErrorKind::Internal(format!(
									"log for key {} vanished after unique violation",
									req.idempotency_key
								)))
							})?;
						return Ok(self.replay(existing));
					}
					if matches!(e.kind(), ErrorKind::Database(db::Error::ReferencedRecordAbsent)) {
						// The log row cannot reference a wallet that does not
						// exist, so the insert itself names the culprit.
						let missing = match self.wallet_repo.find_by_id(&req.from_wallet_id) {
							Err(db::Error::RecordNotFound) => req.from_wallet_id,
							Ok(_) => req.to_wallet_id,
							Err(other) => return Err(other.into()),
						};
						return Err(Error::new(ErrorKind::WalletNotFound(missing)));
					}
					if matches!(e.kind(), ErrorKind::Database(db::Error::Serialization))
						&& attempt < MAX_SERIALIZATION_ATTEMPTS
					{
						warn!(
							"transfer {}: serialization abort, retrying (attempt {})",
							req.idempotency_key, attempt
						);
						continue;
					}

					error!("transfer {}: aborted: {}", req.idempotency_key, e);
					// The Pending row rolls back with its transaction, so
					// this usually matches nothing. Best effort only.
					let _ = self
						.transaction_log_repo
						.mark_failed_by_key(&req.idempotency_key, &e.to_string());
					return Err(e);
				}
			}
		}
	}

	fn run_state_machine(&self, req: &TransferRequest, amount: &BigDecimal) -> Result<Outcome> {
		let conn = &mut self.db.get()?;
		conn.build_transaction().serializable().run(|conn| {
			let log = self.transaction_log_repo.create(conn, NewTransactionLog {
				idempotency_key: &req.idempotency_key,
				from_wallet_id: &req.from_wallet_id,
				to_wallet_id: &req.to_wallet_id,
				amount,
				status: TransactionStatus::Pending,
			})?;

			let (first, second) = ordered_pair(&req.from_wallet_id, &req.to_wallet_id);
			let first_row = self.wallet_repo.lock_for_update(conn, first)?;
			let second_row = self.wallet_repo.lock_for_update(conn, second)?;

			let (from_row, to_row) = if *first == req.from_wallet_id {
				(first_row, second_row)
			} else {
				(second_row, first_row)
			};

			let from_wallet = match from_row {
				Some(w) => w,
				None => return self.fail(conn, &log, ErrorKind::WalletNotFound(req.from_wallet_id)),
			};
			let to_wallet = match to_row {
				Some(w) => w,
				None => return self.fail(conn, &log, ErrorKind::WalletNotFound(req.to_wallet_id)),
			};

			if from_wallet.balance < *amount {
				return self.fail(conn, &log, ErrorKind::InsufficientFunds {
					available: from_wallet.balance.clone(),
					required: amount.clone(),
				});
			}

			let from_after = money::round(&(&from_wallet.balance - amount), money::SCALE_CENTS);
			let to_after = money::round(&(&to_wallet.balance + amount), money::SCALE_CENTS);

			self.wallet_repo.set_balance(conn, &from_wallet.id, &from_after)?;
			self.wallet_repo.set_balance(conn, &to_wallet.id, &to_after)?;

			self.ledger_repo.create(conn, NewLedger {
				wallet_id: &from_wallet.id,
				transaction_log_id: &log.id,
				entry_type: EntryType::Debit,
				amount,
				balance_before: &from_wallet.balance,
				balance_after: &from_after,
				description: Some("wallet transfer"),
			})?;
			self.ledger_repo.create(conn, NewLedger {
				wallet_id: &to_wallet.id,
				transaction_log_id: &log.id,
				entry_type: EntryType::Credit,
				amount,
				balance_before: &to_wallet.balance,
				balance_after: &to_after,
				description: Some("wallet transfer"),
			})?;

			let log = self
				.transaction_log_repo
				.set_status(conn, &log.id, TransactionStatus::Completed)?;
			Ok(Outcome::Completed(log))
		})
	}

	/// Record the failure on the Pending log and let the transaction commit,
	/// so retries of the same key replay the failure instead of re-running.
	fn fail(
		&self,
		conn: &mut diesel::PgConnection,
		log: &TransactionLog,
		kind: ErrorKind,
	) -> Result<Outcome> {
		let error = Error::new(kind);
		let log = self
			.transaction_log_repo
			.set_failed(conn, &log.id, &error.to_string())?;
		Ok(Outcome::Failed { log, error })
	}

	/// Build the idempotent response for an already-persisted log. The caller
	/// sees the original row's fields, never a freshly generated copy.
	fn replay(&self, log: TransactionLog) -> TransferResponse {
		debug!("transfer {}: replaying log {} ({})", log.idempotency_key, log.id, log.status.as_str());
		let (success, message) = match log.status {
			TransactionStatus::Completed => (true, None),
			TransactionStatus::Pending => (false, Some("previously pending".to_string())),
			TransactionStatus::Failed => (false, log.error_message.clone()),
		};
		let response = TransferResponse {
			success,
			message,
			transaction: log,
			is_idempotent: true,
		};
		if let Some(cache) = self.cache {
			if response.transaction.status != TransactionStatus::Pending {
				cache.store(&response.transaction.idempotency_key, response.clone());
			}
		}
		response
	}

	pub fn create_wallet(&self, initial_balance: Option<BigDecimal>) -> Result<Wallet> {
		let balance = initial_balance.unwrap_or_else(BigDecimal::zero);
		if balance < BigDecimal::zero() {
			return Err(Error::new(ErrorKind::InvalidTransfer(
				"initial balance cannot be negative".to_string(),
			)));
		}
		let balance = money::round(&balance, money::SCALE_CENTS);
		self.wallet_repo.create(NewWallet { balance }).map_err(Into::into)
	}

	pub fn get_wallet(&self, id: &Id) -> Result<Wallet> {
		self.wallet_repo.find_by_id(id).map_err(|e| match e {
			db::Error::RecordNotFound => Error::new(ErrorKind::WalletNotFound(*id)),
			other => other.into(),
		})
	}

	/// Transfers where the wallet is source or destination, newest first.
	pub fn get_transaction_history(
		&self,
		wallet_id: &Id,
		limit: Option<i64>,
	) -> Result<Vec<TransactionLog>> {
		self.transaction_log_repo
			.history_for_wallet(wallet_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
			.map_err(Into::into)
	}

	/// Ledger entries for the wallet with their transaction-log context.
	pub fn get_ledger(
		&self,
		wallet_id: &Id,
		limit: Option<i64>,
	) -> Result<Vec<(Ledger, TransactionLog)>> {
		self.ledger_repo
			.find_by_wallet(wallet_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
			.map_err(Into::into)
	}
}

/// Check the command before any I/O and return the canonical scale-2 amount.
fn validate(req: &TransferRequest) -> Result<BigDecimal> {
	if req.idempotency_key.trim().is_empty() {
		return Err(Error::new(ErrorKind::MissingIdempotencyKey));
	}
	if req.from_wallet_id == req.to_wallet_id {
		return Err(Error::new(ErrorKind::InvalidTransfer(
			"source and destination wallets must differ".to_string(),
		)));
	}
	let amount = money::round(&req.amount, money::SCALE_CENTS);
	if amount <= BigDecimal::zero() {
		return Err(Error::new(ErrorKind::InvalidTransfer(
			"amount must be positive".to_string(),
		)));
	}
	Ok(amount)
}

/// Lock order for a wallet pair. Every transfer touching the same two
/// wallets locks them in the same order, whichever direction it moves funds.
fn ordered_pair<'b>(a: &'b Id, b: &'b Id) -> (&'b Id, &'b Id) {
	if a <= b {
		(a, b)
	} else {
		(b, a)
	}
}
