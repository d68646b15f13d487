use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are inside the WGS84 value range.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

// --- Enums ---

/// Defect classification. Fixed on an issue at creation; a report's category
/// may be corrected by the classifier before the report attaches anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pothole,
    BrokenSignal,
    StreetLightOut,
    DamagedSign,
    RoadCrack,
    Flooding,
    BlockedDrain,
    Garbage,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Pothole,
        Category::BrokenSignal,
        Category::StreetLightOut,
        Category::DamagedSign,
        Category::RoadCrack,
        Category::Flooding,
        Category::BlockedDrain,
        Category::Garbage,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pothole => "pothole",
            Category::BrokenSignal => "broken_signal",
            Category::StreetLightOut => "street_light_out",
            Category::DamagedSign => "damaged_sign",
            Category::RoadCrack => "road_crack",
            Category::Flooding => "flooding",
            Category::BlockedDrain => "blocked_drain",
            Category::Garbage => "garbage",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    /// Default severity for a freshly created issue of this category.
    /// Safety-critical defects start higher; cosmetic ones start low.
    pub fn default_severity(&self) -> Severity {
        match self {
            Category::BrokenSignal | Category::Flooding => Severity::High,
            Category::Pothole | Category::BlockedDrain => Severity::Medium,
            Category::StreetLightOut | Category::DamagedSign | Category::RoadCrack => {
                Severity::Medium
            }
            Category::Garbage | Category::Other => Severity::Low,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation state of a single report. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Declined,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
            ReportStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<ReportStatus> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "approved" => Some(ReportStatus::Approved),
            "declined" => Some(ReportStatus::Declined),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a tracked issue. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    Completed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<IssueStatus> {
        match s {
            "pending" => Some(IssueStatus::Pending),
            "in_progress" => Some(IssueStatus::InProgress),
            "completed" => Some(IssueStatus::Completed),
            _ => None,
        }
    }

    /// Position in the forward-only lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            IssueStatus::Pending => 0,
            IssueStatus::InProgress => 1,
            IssueStatus::Completed => 2,
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Locality ---

/// Free-text locality fields, denormalized from the anchoring report onto the
/// issue for query convenience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Locality {
    pub road: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

// --- Report ---

/// A single citizen-submitted, geotagged observation of a defect, pending
/// external image classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub location: GeoPoint,
    pub category: Category,
    /// Key into external image storage. Upload handling is out of scope.
    pub image_ref: String,
    pub status: ReportStatus,
    /// Classifier confidence, populated on approval. 0..=1.
    pub threshold: Option<f64>,
    /// Correlation key for the outstanding classification job.
    pub task_id: Option<String>,
    /// The issue this report attached to. Null until approved and matched.
    pub issue_id: Option<Uuid>,
    /// Submitting identity, opaque to this system.
    pub reporter_id: Option<Uuid>,
    pub locality: Locality,
    pub created_at: DateTime<Utc>,
}

// --- Issue ---

/// The aggregated, de-duplicated tracked defect one or more reports describe.
/// Category and anchor location are fixed at creation and never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub category: Category,
    /// Anchor point used for proximity matching. Never moves.
    pub location: GeoPoint,
    pub status: IssueStatus,
    pub severity: Severity,
    pub locality: Locality,
    pub report_count: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_valid_range() {
        assert!(GeoPoint::new(30.0444, 31.2357).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.01, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(Category::parse(c.as_str()), Some(c));
        }
    }

    #[test]
    fn category_parse_rejects_unknown() {
        assert_eq!(Category::parse("sinkhole"), None);
        assert_eq!(Category::parse(""), None);
        assert_eq!(Category::parse("Pothole"), None, "parse is case-sensitive");
    }

    #[test]
    fn issue_status_rank_is_forward_ordered() {
        assert!(IssueStatus::Pending.rank() < IssueStatus::InProgress.rank());
        assert!(IssueStatus::InProgress.rank() < IssueStatus::Completed.rank());
    }

    #[test]
    fn report_status_round_trips_through_str() {
        for s in [ReportStatus::Pending, ReportStatus::Approved, ReportStatus::Declined] {
            assert_eq!(ReportStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn category_wire_form_is_snake_case() {
        let json = serde_json::to_string(&Category::StreetLightOut).unwrap();
        assert_eq!(json, "\"street_light_out\"");
    }
}
