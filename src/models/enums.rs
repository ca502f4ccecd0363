//! Status enumerations persisted as small integers
//!
//! The numeric ids are part of the stored data. Meetup and return statuses
//! use different numbering and must not be mixed.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

macro_rules! id_enum {
    ($name:ident, $label:literal { $($variant:ident = $id:literal => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stored numeric id
            pub fn id(self) -> i16 {
                self as i16
            }
        }

        impl TryFrom<i16> for $name {
            type Error = AppError;

            fn try_from(v: i16) -> Result<Self, Self::Error> {
                match v {
                    $($id => Ok($name::$variant),)+
                    other => Err(AppError::Internal(format!(
                        "Unknown {} id {}",
                        $label, other
                    ))),
                }
            }
        }

        impl From<$name> for i16 {
            fn from(v: $name) -> Self {
                v as i16
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let label = match self {
                    $($name::$variant => $text,)+
                };
                write!(f, "{}", label)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// BorrowStatus
// ---------------------------------------------------------------------------

/// Current status of a borrow event (single cell, overwritten in place)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum BorrowStatus {
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    InProgress = 4,
    Completed = 5,
    Cancelled = 6,
    ReadyForReturn = 7,
    Deposit = 8,
}

id_enum!(BorrowStatus, "borrow status" {
    Pending = 1 => "Pending",
    Accepted = 2 => "Accepted",
    Rejected = 3 => "Rejected",
    InProgress = 4 => "In progress",
    Completed = 5 => "Completed",
    Cancelled = 6 => "Cancelled",
    ReadyForReturn = 7 => "Ready for return",
    Deposit = 8 => "Deposit",
});

impl BorrowStatus {
    /// Statuses counted against the per-borrower cap
    pub const ACTIVE: [BorrowStatus; 5] = [
        BorrowStatus::Pending,
        BorrowStatus::Accepted,
        BorrowStatus::InProgress,
        BorrowStatus::ReadyForReturn,
        BorrowStatus::Deposit,
    ];

    /// Statuses in which the book is out of the lender's hands
    pub const HOLDING: [BorrowStatus; 4] = [
        BorrowStatus::Accepted,
        BorrowStatus::InProgress,
        BorrowStatus::ReadyForReturn,
        BorrowStatus::Deposit,
    ];

    pub const TERMINAL: [BorrowStatus; 3] = [
        BorrowStatus::Rejected,
        BorrowStatus::Completed,
        BorrowStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn holds_book(self) -> bool {
        Self::HOLDING.contains(&self)
    }

    /// Numeric ids of a status set, for SQL `= ANY($n)` binds
    pub fn ids(statuses: &[BorrowStatus]) -> Vec<i16> {
        statuses.iter().map(|s| s.id()).collect()
    }
}

// ---------------------------------------------------------------------------
// MeetupStatus
// ---------------------------------------------------------------------------

/// Status of the loan-start handoff negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum MeetupStatus {
    Pending = 1,
    Confirmed = 2,
    Rejected = 3,
}

id_enum!(MeetupStatus, "meetup status" {
    Pending = 1 => "Pending",
    Confirmed = 2 => "Confirmed",
    Rejected = 3 => "Rejected",
});

// ---------------------------------------------------------------------------
// ReturnStatus
// ---------------------------------------------------------------------------

/// Status of the return handoff negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum ReturnStatus {
    Pending = 1,
    PendingAccepted = 2,
    /// Return handoff agreed, waiting for the lender to confirm receipt
    AwaitingConfirmation = 3,
    Rejected = 4,
}

id_enum!(ReturnStatus, "return status" {
    Pending = 1 => "Pending",
    PendingAccepted = 2 => "Pending accepted",
    AwaitingConfirmation = 3 => "Awaiting confirmation",
    Rejected = 4 => "Rejected",
});

// ---------------------------------------------------------------------------
// SuggestionStatus
// ---------------------------------------------------------------------------

/// Status row of a meetup or return counter-proposal (append-only history)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum SuggestionStatus {
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
}

id_enum!(SuggestionStatus, "suggestion status" {
    Pending = 1 => "Pending",
    Accepted = 2 => "Accepted",
    Rejected = 3 => "Rejected",
});

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// Per-book availability flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[repr(i16)]
pub enum Availability {
    Available = 1,
    Unavailable = 2,
}

id_enum!(Availability, "availability" {
    Available = 1 => "Available",
    Unavailable = 2 => "Unavailable",
});
