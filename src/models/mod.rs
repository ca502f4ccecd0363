//! Data models for ShelfShare

pub mod book;
pub mod borrow_event;
pub mod enums;
pub mod meetup;
pub mod return_detail;
pub mod sweep;
pub mod user;

// Re-export commonly used types
pub use book::BookRef;
pub use borrow_event::{
    BorrowEvent, BorrowEventDetails, BorrowRequest, CancelReason, EventListing, NewBorrowEvent,
    Party, RejectReason, Report,
};
pub use enums::{Availability, BorrowStatus, MeetupStatus, ReturnStatus, SuggestionStatus};
pub use meetup::{MeetupDetail, MeetupDetails, MeetupSuggestion, NewMeetupSuggestion};
pub use return_detail::{NewReturnSuggestion, ReturnDetail, ReturnDetails, ReturnSuggestion};
pub use sweep::{Sweep, SweepAction, SweepReport};
pub use user::UserClaims;
