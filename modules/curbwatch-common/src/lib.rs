pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod types;

pub use config::Config;
pub use error::CurbwatchError;
pub use events::DomainEvent;
pub use types::{
    Category, GeoPoint, Issue, IssueStatus, Locality, Report, ReportStatus, Severity,
};
