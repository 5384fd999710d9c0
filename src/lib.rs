//! Double-entry journal posting engine: validation, idempotent
//! persistence on SQLite, a hash-linked audit chain, and the period
//! closures workflow (trial balance, income closing, year finalize,
//! opening balances).

pub mod amount;
pub mod config;
pub mod error;
pub mod hash;
pub mod model;
pub mod repos;
pub mod services;
pub mod storage;
pub mod validation;

pub use config::{Config, ConfigError};
pub use error::{ErrorKind, LedgerError, StorageError};
pub use model::{
    Account, Entry, Line, Period, PeriodStatus, PostResult, PostedEntry, StatementType, StoredLine,
};
pub use storage::{SeedAccount, Storage};

pub use services::audit::verify_chain;
pub use services::closures::{close_period, finalize_year, open_new_period, AccrualItem, AmortizationItem, DeferralItem};
pub use services::posting::post;
pub use services::reversal::reverse_entry;
