//! Accounting module: the owner's cash book (income / expense records).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Other
//! modules append records here; production completion books its cost as an
//! expense.

pub mod transaction;

pub use transaction::{
    CashTransaction, RecordTransaction, TransactionCommand, TransactionEvent, TransactionId,
    TransactionKind, TransactionRecorded,
};
