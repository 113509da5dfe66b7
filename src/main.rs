use log::info;

use ledger_api::{account, get_db_connection, interest, interest_log, ledger, transaction_log, transfer, wallet, ResponseCache};

fn main() {
	dotenv::dotenv().ok();
	pretty_env_logger::init();

	let pool = get_db_connection();
	pool.get().expect("database must be reachable at startup");

	let wallet_repo = wallet::Repo::new(pool.clone());
	let transaction_log_repo = transaction_log::Repo::new(pool.clone());
	let ledger_repo = ledger::Repo::new(pool.clone());
	let account_repo = account::Repo::new(pool.clone());
	let interest_log_repo = interest_log::Repo::new(pool.clone());
	let cache = ResponseCache::new();

	let _transfer_service = transfer::Service::new(transfer::NewService {
		db: pool.clone(),
		wallet_repo: &wallet_repo,
		transaction_log_repo: &transaction_log_repo,
		ledger_repo: &ledger_repo,
		cache: Some(&cache),
	});

	let _interest_service = interest::Service::new(interest::NewService {
		db: pool,
		account_repo: &account_repo,
		interest_log_repo: &interest_log_repo,
	});

	info!("transfer and interest engines ready (annual rate {})", interest::ANNUAL_RATE);
	// todo: mount the HTTP adapter over the two services
}
