pub mod account;
pub mod cache;
pub mod db;
pub mod interest;
pub mod interest_log;
pub mod ledger;
pub mod money;
pub mod schema;
pub mod transaction_log;
pub mod transfer;
pub mod types;
pub mod wallet;

pub use crate::account::{Account, NewAccount};
pub use crate::cache::ResponseCache;
pub use crate::db::{get_db_connection, PgPool, PgPooledConnection};
pub use crate::interest_log::{InterestLog, NewInterestLog};
pub use crate::ledger::{EntryType, Ledger, NewLedger};
pub use crate::transaction_log::{NewTransactionLog, TransactionLog, TransactionStatus};
pub use crate::types::{Date, Id, Time};
pub use crate::wallet::{NewWallet, Wallet};
