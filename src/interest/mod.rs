pub mod error;
pub mod service;

pub use error::{Error, ErrorKind};
pub use service::{
	annual_rate, daily_rate, days_in_year, is_leap_year, today, InterestResult, NewService,
	Service, ANNUAL_RATE, DEFAULT_HISTORY_LIMIT,
};
