use std::fmt;

use chrono::{DateTime, Utc};

pub type TransactionId = i64;

/// Which side of the trade the logged-in account was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Sale,
    Purchase,
}

impl Direction {
    /// Value of the `transactionType` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            Direction::Sale => "Sale",
            Direction::Purchase => "Purchase",
        }
    }

    /// Sales count towards the balance, purchases against it.
    pub fn signed_amount(self, amount: i64) -> i64 {
        match self {
            Direction::Sale => amount.saturating_abs(),
            Direction::Purchase => -amount.saturating_abs(),
        }
    }
}

/// Counterpart of a transaction (a user or a group).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: i64,
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub id: i64,
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    /// Positive for sales, negative for purchases.
    pub amount: i64,
    pub kind: String,
}

impl Currency {
    pub fn for_direction(direction: Direction, amount: i64, kind: impl Into<String>) -> Self {
        Self {
            amount: direction.signed_amount(amount),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub created: DateTime<Utc>,
    pub agent: Party,
    pub item: ItemRef,
    pub currency: Currency,
    pub pending: bool,
    pub direction: Direction,
}

/// Anything carrying the server-issued, strictly increasing id used as a
/// high-water-mark key.
pub trait Sequenced {
    fn sequence_id(&self) -> TransactionId;
}

impl Sequenced for Transaction {
    fn sequence_id(&self) -> TransactionId {
        self.id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, preposition) = match self.direction {
            Direction::Sale => ("Sold", "to"),
            Direction::Purchase => ("Purchased", "from"),
        };
        write!(
            f,
            "[{}] {} item {} ({}) {} {} ({}) for {} {} @ {}",
            self.id,
            verb,
            self.item.name,
            self.item.id,
            preposition,
            self.agent.name,
            self.agent.id,
            self.currency.amount,
            self.currency.kind,
            self.created.format("%Y-%m-%d"),
        )?;
        if self.pending {
            write!(f, " (pending)")?;
        }
        Ok(())
    }
}
