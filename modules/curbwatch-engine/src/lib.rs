pub mod callback;
pub mod lifecycle;
pub mod matcher;
pub mod traits;

pub use callback::{
    validate_payload, CallbackHandler, CallbackOutcome, CallbackPayload, FieldError, ImageStatus,
    ValidatedCallback,
};
pub use lifecycle::{transition_issue, TransitionOutcome};
pub use matcher::{IssueMatcher, IssueRef};
pub use traits::{Store, StoreTxn};
