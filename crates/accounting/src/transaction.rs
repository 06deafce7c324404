use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use kasaku_events::Event;

/// Income or expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        })
    }
}

/// Cash book entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub AggregateId);

impl TransactionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: CashTransaction.
///
/// Append-only: once recorded an entry is never edited. Balances and reports
/// are derived from `TransactionRecorded` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashTransaction {
    id: TransactionId,
    tenant_id: Option<TenantId>,
    date: Option<NaiveDate>,
    description: String,
    amount: Decimal,
    kind: Option<TransactionKind>,
    category: String,
    notes: String,
    version: u64,
}

impl CashTransaction {
    /// Empty aggregate for rehydration.
    pub fn empty(id: TransactionId) -> Self {
        Self {
            id,
            tenant_id: None,
            date: None,
            description: String::new(),
            amount: Decimal::ZERO,
            kind: None,
            category: String::new(),
            notes: String::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> TransactionId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn kind(&self) -> Option<TransactionKind> {
        self.kind
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn is_recorded(&self) -> bool {
        self.kind.is_some()
    }
}

impl AggregateRoot for CashTransaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: String,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionCommand {
    RecordTransaction(RecordTransaction),
}

/// Event: TransactionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: String,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEvent {
    TransactionRecorded(TransactionRecorded),
}

impl TransactionEvent {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            TransactionEvent::TransactionRecorded(e) => e.transaction_id,
        }
    }
}

impl Event for TransactionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::TransactionRecorded(_) => "accounting.cash.transaction_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            TransactionEvent::TransactionRecorded(e) => e.tenant_id,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            TransactionEvent::TransactionRecorded(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransactionEvent::TransactionRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CashTransaction {
    type Command = TransactionCommand;
    type Event = TransactionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransactionEvent::TransactionRecorded(e) => {
                self.id = e.transaction_id;
                self.tenant_id = Some(e.tenant_id);
                self.date = Some(e.date);
                self.description = e.description.clone();
                self.amount = e.amount;
                self.kind = Some(e.kind);
                self.category = e.category.clone();
                self.notes = e.notes.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransactionCommand::RecordTransaction(cmd) => self.handle_record(cmd),
        }
    }
}

impl CashTransaction {
    fn handle_record(&self, cmd: &RecordTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        if self.is_recorded() {
            return Err(DomainError::conflict("transaction already recorded"));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }

        Ok(vec![TransactionEvent::TransactionRecorded(TransactionRecorded {
            tenant_id: cmd.tenant_id,
            transaction_id: cmd.transaction_id,
            actor: cmd.actor,
            date: cmd.date,
            description: cmd.description.trim().to_string(),
            amount: cmd.amount,
            kind: cmd.kind,
            category: cmd.category.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasaku_events::execute;
    use rust_decimal_macros::dec;

    fn record(id: TransactionId, amount: Decimal) -> TransactionCommand {
        TransactionCommand::RecordTransaction(RecordTransaction {
            tenant_id: TenantId::new(),
            transaction_id: id,
            actor: UserId::new(),
            date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            description: "Production of Bread - 10 units".to_string(),
            amount,
            kind: TransactionKind::Expense,
            category: "Production Cost".to_string(),
            notes: String::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn records_expense() {
        let id = TransactionId::generate();
        let mut tx = CashTransaction::empty(id);
        execute(&mut tx, &record(id, dec!(2000))).unwrap();
        assert_eq!(tx.amount(), dec!(2000));
        assert_eq!(tx.kind(), Some(TransactionKind::Expense));
        assert_eq!(tx.version(), 1);
    }

    #[test]
    fn rejects_non_positive_amount() {
        let id = TransactionId::generate();
        let err = CashTransaction::empty(id)
            .handle(&record(id, Decimal::ZERO))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn entries_are_append_only() {
        let id = TransactionId::generate();
        let mut tx = CashTransaction::empty(id);
        execute(&mut tx, &record(id, dec!(1))).unwrap();
        let err = execute(&mut tx, &record(id, dec!(5))).unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert_eq!(tx.amount(), dec!(1));
    }
}
