pub mod publisher;
pub mod subscribers;

pub use publisher::EventPublisher;
pub use subscribers::{ActivityLog, EventSubscriber};
