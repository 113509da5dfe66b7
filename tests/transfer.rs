use std::thread;

use ledger_api::schema::transaction_logs;
use ledger_api::transfer::{self, ErrorKind, TransferRequest, TransferResponse};
use ledger_api::{ledger, transaction_log, wallet};

use crate::common::*;

mod common;

fn request(key: String, from: &Wallet, to: &Wallet, amount: &str) -> TransferRequest {
	TransferRequest {
		idempotency_key: key,
		from_wallet_id: from.id,
		to_wallet_id: to.id,
		amount: dec(amount),
	}
}

/// Run a transfer on its own connection-pool handle and service instance,
/// the way concurrent requests reach the engine.
fn spawn_transfer(
	pool: PgPool,
	req: TransferRequest,
) -> thread::JoinHandle<Result<TransferResponse, transfer::Error>> {
	thread::spawn(move || {
		let wallet_repo = wallet::Repo::new(pool.clone());
		let transaction_log_repo = transaction_log::Repo::new(pool.clone());
		let ledger_repo = ledger::Repo::new(pool.clone());
		let service = transfer::Service::new(transfer::NewService {
			db: pool.clone(),
			wallet_repo: &wallet_repo,
			transaction_log_repo: &transaction_log_repo,
			ledger_repo: &ledger_repo,
			cache: None,
		});
		service.execute_transfer(&req)
	})
}

fn logs_for_key(f: &Fixture, key: &str) -> Vec<TransactionLog> {
	transaction_logs::table
		.filter(transaction_logs::idempotency_key.eq(key))
		.load(&mut f.conn())
		.unwrap()
}

#[test]
fn transfer_moves_funds_and_writes_ledger_pair() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("500.00");

	let response = s
		.transfer_service()
		.execute_transfer(&request(unique_key("s1"), &a, &b, "100.00"))
		.unwrap();

	assert!(response.success);
	assert!(!response.is_idempotent);
	assert_eq!(response.transaction.status, TransactionStatus::Completed);
	assert_eq!(response.transaction.amount, dec("100.00"));

	assert_eq!(s.wallet_balance(&a.id), dec("900.00"));
	assert_eq!(s.wallet_balance(&b.id), dec("600.00"));

	let mut entries = s
		.ledger_repo
		.find_by_transaction_log(&response.transaction.id)
		.unwrap();
	entries.sort_by_key(|e| e.entry_type != EntryType::Debit);
	assert_eq!(entries.len(), 2);

	let debit = &entries[0];
	assert_eq!(debit.entry_type, EntryType::Debit);
	assert_eq!(debit.wallet_id, a.id);
	assert_eq!(debit.amount, dec("100.00"));
	assert_eq!(debit.balance_before, dec("1000.00"));
	assert_eq!(debit.balance_after, dec("900.00"));

	let credit = &entries[1];
	assert_eq!(credit.entry_type, EntryType::Credit);
	assert_eq!(credit.wallet_id, b.id);
	assert_eq!(credit.amount, dec("100.00"));
	assert_eq!(credit.balance_before, dec("500.00"));
	assert_eq!(credit.balance_after, dec("600.00"));
}

#[test]
fn replaying_a_completed_transfer_returns_the_original() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("500.00");
	let req = request(unique_key("replay"), &a, &b, "100.00");

	let first = s.transfer_service().execute_transfer(&req).unwrap();
	assert!(!first.is_idempotent);

	for _ in 0..5 {
		let replay = s.transfer_service().execute_transfer(&req).unwrap();
		assert!(replay.success);
		assert!(replay.is_idempotent);
		assert_eq!(replay.transaction.id, first.transaction.id);
		assert_eq!(replay.transaction.amount, first.transaction.amount);
		assert_eq!(replay.transaction.status, first.transaction.status);
		assert_eq!(replay.transaction.created_at, first.transaction.created_at);
	}

	// effects applied exactly once
	assert_eq!(logs_for_key(&f, &req.idempotency_key).len(), 1);
	assert_eq!(s.ledger_repo.find_by_transaction_log(&first.transaction.id).unwrap().len(), 2);
	assert_eq!(s.wallet_balance(&a.id), dec("900.00"));
	assert_eq!(s.wallet_balance(&b.id), dec("600.00"));
}

#[test]
fn concurrent_duplicate_submissions_transfer_once() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("500.00");
	let req = request(unique_key("dup"), &a, &b, "100.00");

	let handles: Vec<_> = (0..5)
		.map(|_| spawn_transfer(f.pool(), req.clone()))
		.collect();
	let responses: Vec<TransferResponse> = handles
		.into_iter()
		.map(|h| h.join().unwrap().unwrap())
		.collect();

	assert!(responses.iter().all(|r| r.success));
	// exactly one submission ran the state machine
	assert_eq!(responses.iter().filter(|r| !r.is_idempotent).count(), 1);

	let logs = logs_for_key(&f, &req.idempotency_key);
	assert_eq!(logs.len(), 1);
	assert_eq!(s.ledger_repo.find_by_transaction_log(&logs[0].id).unwrap().len(), 2);
	assert_eq!(s.wallet_balance(&a.id), dec("900.00"));
	assert_eq!(s.wallet_balance(&b.id), dec("600.00"));
}

#[test]
fn insufficient_funds_commits_a_failed_log() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("10.00");
	let b = f.insert_wallet("0.00");
	let req = request(unique_key("overdraw"), &a, &b, "50.00");

	let err = s.transfer_service().execute_transfer(&req).unwrap_err();
	match err.kind() {
		ErrorKind::InsufficientFunds { available, required } => {
			assert_eq!(available, &dec("10.00"));
			assert_eq!(required, &dec("50.00"));
		}
		other => panic!("expected InsufficientFunds, got {:?}", other),
	}

	let logs = logs_for_key(&f, &req.idempotency_key);
	assert_eq!(logs.len(), 1);
	assert_eq!(logs[0].status, TransactionStatus::Failed);
	let message = logs[0].error_message.as_deref().unwrap();
	assert!(message.contains("insufficient funds"), "message: {}", message);

	assert!(s.ledger_repo.find_by_transaction_log(&logs[0].id).unwrap().is_empty());
	assert_eq!(s.wallet_balance(&a.id), dec("10.00"));
	assert_eq!(s.wallet_balance(&b.id), dec("0.00"));

	// a retry with the same key replays the failure instead of re-running
	let replay = s.transfer_service().execute_transfer(&req).unwrap();
	assert!(!replay.success);
	assert!(replay.is_idempotent);
	assert_eq!(replay.transaction.id, logs[0].id);
	assert!(replay.message.unwrap().contains("insufficient funds"));
}

#[test]
fn opposing_transfers_do_not_deadlock() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("1000.00");

	let t1 = spawn_transfer(f.pool(), request(unique_key("ab"), &a, &b, "50.00"));
	let t2 = spawn_transfer(f.pool(), request(unique_key("ba"), &b, &a, "30.00"));

	let r1 = t1.join().unwrap().unwrap();
	let r2 = t2.join().unwrap().unwrap();
	assert!(r1.success && r2.success);

	assert_eq!(s.wallet_balance(&a.id), dec("980.00"));
	assert_eq!(s.wallet_balance(&b.id), dec("1020.00"));

	for response in [&r1, &r2] {
		assert_eq!(
			s.ledger_repo.find_by_transaction_log(&response.transaction.id).unwrap().len(),
			2
		);
	}
}

#[test]
fn transfer_to_unknown_wallet_is_not_found() {
	let f = Fixture::new();
	let s = Suite::setup();

	let a = f.insert_wallet("100.00");
	let ghost = uuid::Uuid::new_v4();
	let req = TransferRequest {
		idempotency_key: unique_key("ghost"),
		from_wallet_id: a.id,
		to_wallet_id: ghost,
		amount: dec("10.00"),
	};

	let err = s.transfer_service().execute_transfer(&req).unwrap_err();
	assert_eq!(err.kind(), &ErrorKind::WalletNotFound(ghost));
	assert_eq!(err.http_status(), 404);
	assert_eq!(s.wallet_balance(&a.id), dec("100.00"));
}

#[test]
fn funds_are_conserved_across_concurrent_transfers() {
	let f = Fixture::new();
	let s = Suite::setup();

	let wallets = [
		f.insert_wallet("1000.00"),
		f.insert_wallet("1000.00"),
		f.insert_wallet("1000.00"),
	];

	let moves = [
		(0, 1, "37.50"),
		(1, 2, "12.25"),
		(2, 0, "86.00"),
		(0, 2, "5.75"),
		(1, 0, "40.00"),
		(2, 1, "99.99"),
	];

	let handles: Vec<_> = moves
		.iter()
		.map(|(from, to, amount)| {
			spawn_transfer(
				f.pool(),
				request(unique_key("mix"), &wallets[*from], &wallets[*to], amount),
			)
		})
		.collect();

	for handle in handles {
		// insufficient funds is an acceptable outcome; lost money is not
		match handle.join().unwrap() {
			Ok(response) => assert!(response.success),
			Err(e) => assert!(matches!(e.kind(), ErrorKind::InsufficientFunds { .. })),
		}
	}

	let total: BigDecimal = wallets
		.iter()
		.map(|w| s.wallet_balance(&w.id))
		.sum();
	assert_eq!(total, dec("3000.00"));
}

#[test]
fn create_wallet_applies_and_validates_initial_balance() {
	let s = Suite::setup();
	let service = s.transfer_service();

	let blank = service.create_wallet(None).unwrap();
	assert_eq!(blank.balance, dec("0.00"));

	let funded = service.create_wallet(Some(dec("250.75"))).unwrap();
	assert_eq!(funded.balance, dec("250.75"));

	let err = service.create_wallet(Some(dec("-1.00"))).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::InvalidTransfer(_)));
	assert_eq!(err.http_status(), 400);
}

#[test]
fn get_wallet_for_unknown_id_is_not_found() {
	let s = Suite::setup();
	let ghost = uuid::Uuid::new_v4();
	let err = s.transfer_service().get_wallet(&ghost).unwrap_err();
	assert_eq!(err.kind(), &ErrorKind::WalletNotFound(ghost));
}

#[test]
fn history_and_ledger_views_are_scoped_and_ordered() {
	let f = Fixture::new();
	let s = Suite::setup();
	let service = s.transfer_service();

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("1000.00");
	let c = f.insert_wallet("1000.00");

	service.execute_transfer(&request(unique_key("h1"), &a, &b, "10.00")).unwrap();
	service.execute_transfer(&request(unique_key("h2"), &a, &b, "20.00")).unwrap();
	let last = service
		.execute_transfer(&request(unique_key("h3"), &c, &a, "30.00"))
		.unwrap();
	// unrelated to wallet a
	service.execute_transfer(&request(unique_key("h4"), &b, &c, "1.00")).unwrap();

	let history = service.get_transaction_history(&a.id, None).unwrap();
	assert_eq!(history.len(), 3);
	assert_eq!(history[0].id, last.transaction.id);
	assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));

	let capped = service.get_transaction_history(&a.id, Some(2)).unwrap();
	assert_eq!(capped.len(), 2);
	assert_eq!(capped[0].id, last.transaction.id);

	let entries = service.get_ledger(&a.id, None).unwrap();
	assert_eq!(entries.len(), 3);
	for (entry, log) in &entries {
		assert_eq!(entry.wallet_id, a.id);
		assert_eq!(entry.transaction_log_id, log.id);
	}
	assert_eq!(entries[0].0.entry_type, EntryType::Credit);
	assert_eq!(entries[0].1.id, last.transaction.id);
}

#[test]
fn cached_responses_replay_as_idempotent() {
	let f = Fixture::new();
	let s = Suite::setup();
	let cache = ResponseCache::new();
	let service = transfer::Service::new(transfer::NewService {
		db: s.pool.clone(),
		wallet_repo: &s.wallet_repo,
		transaction_log_repo: &s.transaction_log_repo,
		ledger_repo: &s.ledger_repo,
		cache: Some(&cache),
	});

	let a = f.insert_wallet("1000.00");
	let b = f.insert_wallet("500.00");
	let req = request(unique_key("memo"), &a, &b, "100.00");

	let first = service.execute_transfer(&req).unwrap();
	assert!(!first.is_idempotent);

	let replay = service.execute_transfer(&req).unwrap();
	assert!(replay.success);
	assert!(replay.is_idempotent);
	assert_eq!(replay.transaction.id, first.transaction.id);
}
