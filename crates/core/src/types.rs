use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use uuid::Uuid;

static REFERENCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"^(EP|US|AC|REQ|PROMPT|STD)-(\d+)$") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

/// Kinds of artifact in the Epic → User Story → Acceptance Criteria → Requirement hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Epic,
    UserStory,
    AcceptanceCriteria,
    Requirement,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Epic,
        EntityKind::UserStory,
        EntityKind::AcceptanceCriteria,
        EntityKind::Requirement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::UserStory => "user_story",
            Self::AcceptanceCriteria => "acceptance_criteria",
            Self::Requirement => "requirement",
        }
    }

    /// Human-readable label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::UserStory => "User story",
            Self::AcceptanceCriteria => "Acceptance criteria",
            Self::Requirement => "Requirement",
        }
    }

    pub fn prefix(&self) -> RefPrefix {
        match self {
            Self::Epic => RefPrefix::Ep,
            Self::UserStory => RefPrefix::Us,
            Self::AcceptanceCriteria => RefPrefix::Ac,
            Self::Requirement => RefPrefix::Req,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epic" => Ok(Self::Epic),
            "user_story" => Ok(Self::UserStory),
            "acceptance_criteria" => Ok(Self::AcceptanceCriteria),
            "requirement" => Ok(Self::Requirement),
            other => Err(DomainError::InvalidArguments(format!(
                "unknown entity type '{}' (expected epic, user_story, acceptance_criteria or requirement)",
                other
            ))),
        }
    }
}

/// Anything that can be the subject of a NotFound error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Entity(EntityKind),
    Relationship,
    RequirementType,
    RelationshipType,
    Prompt,
    SteeringDocument,
    StatusModel,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Entity(kind) => kind.label(),
            Self::Relationship => "Relationship",
            Self::RequirementType => "Requirement type",
            Self::RelationshipType => "Relationship type",
            Self::Prompt => "Prompt",
            Self::SteeringDocument => "Steering document",
            Self::StatusModel => "Status model",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity(kind) => kind.as_str(),
            Self::Relationship => "relationship",
            Self::RequirementType => "requirement_type",
            Self::RelationshipType => "relationship_type",
            Self::Prompt => "prompt",
            Self::SteeringDocument => "steering_document",
            Self::StatusModel => "status_model",
        }
    }
}

impl From<EntityKind> for ResourceKind {
    fn from(kind: EntityKind) -> Self {
        Self::Entity(kind)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference id prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefPrefix {
    Ep,
    Us,
    Ac,
    Req,
    Prompt,
    Std,
}

impl RefPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ep => "EP",
            Self::Us => "US",
            Self::Ac => "AC",
            Self::Req => "REQ",
            Self::Prompt => "PROMPT",
            Self::Std => "STD",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "EP" => Some(Self::Ep),
            "US" => Some(Self::Us),
            "AC" => Some(Self::Ac),
            "REQ" => Some(Self::Req),
            "PROMPT" => Some(Self::Prompt),
            "STD" => Some(Self::Std),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable identifier shaped `<PREFIX>-<digits>`.
///
/// Digits are kept verbatim, so `EP-1` and `EP-001` are distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceId {
    prefix: RefPrefix,
    digits: String,
}

impl ReferenceId {
    pub fn parse(s: &str) -> DomainResult<Self> {
        let caps = REFERENCE_ID_RE.captures(s).ok_or_else(|| {
            DomainError::InvalidArguments(format!("'{}' is not a valid reference id", s))
        })?;
        let prefix = RefPrefix::from_str(&caps[1]).ok_or_else(|| {
            DomainError::InvalidArguments(format!("'{}' has an unknown reference prefix", s))
        })?;
        Ok(Self {
            prefix,
            digits: caps[2].to_string(),
        })
    }

    /// Format the `number`th id for a prefix (`EP-001`, `EP-1234`)
    pub fn numbered(prefix: RefPrefix, number: u64) -> Self {
        Self {
            prefix,
            digits: format!("{:03}", number),
        }
    }

    pub fn prefix(&self) -> RefPrefix {
        self.prefix
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }
}

impl std::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.prefix, self.digits)
    }
}

impl TryFrom<String> for ReferenceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferenceId> for String {
    fn from(value: ReferenceId) -> Self {
        value.to_string()
    }
}

/// Priority 1 (critical) .. 4 (low)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const MEDIUM: Priority = Priority(3);
    pub const LOW: Priority = Priority(4);

    pub fn new(value: i64) -> DomainResult<Self> {
        if (1..=4).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DomainError::ValidationFailed(format!(
                "priority must be between 1 and 4, got {}",
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl TryFrom<u8> for Priority {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as i64)
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

/// Top-level artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Priority,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStory {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub epic_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Priority,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriteria {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub user_story_id: Uuid,
    pub description: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub user_story_id: Uuid,
    pub acceptance_criteria_id: Option<Uuid>,
    pub type_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Priority,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directed association between two requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRelationship {
    pub id: Uuid,
    pub source_requirement_id: Uuid,
    pub target_requirement_id: Uuid,
    pub relationship_type_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Stored prompt template; at most one is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub name: String,
    pub title: String,
    pub content: String,
    pub description: Option<String>,
    pub active: bool,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Guidance document that can be linked to any number of epics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringDocument {
    pub id: Uuid,
    pub reference_id: ReferenceId,
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Common accessors for stored records keyed by UUID and reference id
pub trait Identified {
    fn id(&self) -> Uuid;
    fn reference(&self) -> &ReferenceId;
}

macro_rules! identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn id(&self) -> Uuid {
                self.id
            }

            fn reference(&self) -> &ReferenceId {
                &self.reference_id
            }
        })*
    };
}

identified!(Epic, UserStory, AcceptanceCriteria, Requirement, Prompt, SteeringDocument);

/// Find a record by UUID or by reference id.
///
/// Reference ids match as exact strings, so `EP-1` does not find `EP-001`.
pub fn lookup<'a, T: Identified>(records: &'a BTreeMap<Uuid, T>, key: &str) -> Option<&'a T> {
    match Uuid::parse_str(key) {
        Ok(id) => records.get(&id),
        Err(_) => records
            .values()
            .find(|record| record.reference().to_string() == key),
    }
}

/// Offset pagination shared by every list operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_parse() {
        let id = ReferenceId::parse("US-042").unwrap();
        assert_eq!(id.prefix(), RefPrefix::Us);
        assert_eq!(id.digits(), "042");
        assert_eq!(id.to_string(), "US-042");

        assert!(ReferenceId::parse("us-042").is_err());
        assert!(ReferenceId::parse("US-").is_err());
        assert!(ReferenceId::parse("XX-1").is_err());
        assert!(ReferenceId::parse(" US-1").is_err());
    }

    struct Record {
        id: Uuid,
        reference_id: ReferenceId,
    }

    impl Identified for Record {
        fn id(&self) -> Uuid {
            self.id
        }
        fn reference(&self) -> &ReferenceId {
            &self.reference_id
        }
    }

    #[test]
    fn test_lookup_matches_reference_exactly() {
        let record = Record {
            id: Uuid::new_v4(),
            reference_id: ReferenceId::numbered(RefPrefix::Ep, 1),
        };
        let id = record.id;
        let records = BTreeMap::from([(id, record)]);

        assert_eq!(lookup(&records, "EP-001").map(|r| r.id()), Some(id));
        assert_eq!(lookup(&records, &id.to_string()).map(|r| r.id()), Some(id));
        assert!(lookup(&records, "EP-1").is_none());
        assert!(lookup(&records, "ep-001").is_none());
    }

    #[test]
    fn test_reference_id_numbering() {
        assert_eq!(ReferenceId::numbered(RefPrefix::Ep, 7).to_string(), "EP-007");
        assert_eq!(ReferenceId::numbered(RefPrefix::Req, 1234).to_string(), "REQ-1234");
    }

    #[test]
    fn test_priority_bounds() {
        assert!(Priority::new(1).is_ok());
        assert!(Priority::new(4).is_ok());
        assert!(matches!(Priority::new(0), Err(DomainError::ValidationFailed(_))));
        assert!(matches!(Priority::new(5), Err(DomainError::ValidationFailed(_))));
    }

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("user_story".parse::<EntityKind>().unwrap(), EntityKind::UserStory);
        assert!(matches!(
            "story".parse::<EntityKind>(),
            Err(DomainError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_reference_id_serde() {
        let id = ReferenceId::parse("REQ-9").unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("REQ-9"));
        let back: ReferenceId = serde_json::from_value(serde_json::json!("REQ-9")).unwrap();
        assert_eq!(back, id);
    }
}
