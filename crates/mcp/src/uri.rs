//! Typed resource URIs.
//!
//! Entity URIs have the shape `scheme://REF-ID[/sub-path][?k=v&...]`. The
//! navigation scheme `requirements://` names collections and is split off at
//! parse time into [`ResourceUri::Collection`], [`ResourceUri::CollectionItem`]
//! or [`ResourceUri::ActivePrompt`]; item handles addressed by reference id
//! are rewritten to the entity form.

use crate::error::{McpError, McpResult};
use regex::Regex;
use reqhub_core::types::{EntityKind, RefPrefix, ReferenceId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use url::form_urlencoded;
use uuid::Uuid;

static RESOURCE_REF: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"^(EP|US|REQ|AC|PROMPT)-\d+$") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

const NAVIGATION_SCHEME: &str = "requirements";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriScheme {
    Epic,
    UserStory,
    Requirement,
    AcceptanceCriteria,
    Prompt,
}

impl UriScheme {
    pub const ALL: [UriScheme; 5] = [
        UriScheme::Epic,
        UriScheme::UserStory,
        UriScheme::Requirement,
        UriScheme::AcceptanceCriteria,
        UriScheme::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::UserStory => "user-story",
            Self::Requirement => "requirement",
            Self::AcceptanceCriteria => "acceptance-criteria",
            Self::Prompt => "prompt",
        }
    }

    pub fn prefix(&self) -> RefPrefix {
        match self {
            Self::Epic => RefPrefix::Ep,
            Self::UserStory => RefPrefix::Us,
            Self::Requirement => RefPrefix::Req,
            Self::AcceptanceCriteria => RefPrefix::Ac,
            Self::Prompt => RefPrefix::Prompt,
        }
    }

    /// Closed sub-path whitelist
    pub fn sub_paths(&self) -> &'static [SubPath] {
        match self {
            Self::Epic => &[SubPath::Hierarchy, SubPath::UserStories],
            Self::UserStory => &[SubPath::Requirements, SubPath::AcceptanceCriteria],
            Self::Requirement => &[SubPath::Relationships],
            Self::AcceptanceCriteria | Self::Prompt => &[],
        }
    }

    /// Exact, case-sensitive match on the canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Epic => Some(EntityKind::Epic),
            Self::UserStory => Some(EntityKind::UserStory),
            Self::Requirement => Some(EntityKind::Requirement),
            Self::AcceptanceCriteria => Some(EntityKind::AcceptanceCriteria),
            Self::Prompt => None,
        }
    }
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubPath {
    Hierarchy,
    UserStories,
    Requirements,
    AcceptanceCriteria,
    Relationships,
}

impl SubPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hierarchy => "hierarchy",
            Self::UserStories => "user-stories",
            Self::Requirements => "requirements",
            Self::AcceptanceCriteria => "acceptance-criteria",
            Self::Relationships => "relationships",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            Self::Hierarchy,
            Self::UserStories,
            Self::Requirements,
            Self::AcceptanceCriteria,
            Self::Relationships,
        ]
        .into_iter()
        .find(|s| s.as_str() == name)
    }
}

/// Parsed `scheme://REF[/sub][?params]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUri {
    pub scheme: UriScheme,
    pub reference_id: ReferenceId,
    pub sub_path: Option<SubPath>,
    pub parameters: BTreeMap<String, String>,
}

impl EntityUri {
    pub fn parse(input: &str) -> McpResult<Self> {
        check_surroundings(input)?;
        let without_fragment = strip_fragment(input);
        let (scheme_name, rest) = split_scheme(without_fragment)?;

        let scheme = UriScheme::from_name(scheme_name).ok_or_else(|| {
            if UriScheme::from_name(&scheme_name.to_lowercase()).is_some() {
                McpError::InvalidUri(format!("scheme '{}' must be lowercase", scheme_name))
            } else {
                McpError::InvalidUri(format!("unknown scheme '{}'", scheme_name))
            }
        })?;

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let (reference, sub) = match path.split_once('/') {
            Some((reference, sub)) => (reference, Some(sub)),
            None => (path, None),
        };

        let reference_id = validate_reference(scheme, reference)?;

        let sub_path = match sub.filter(|s| !s.is_empty()) {
            Some(raw) => {
                let decoded = urlencoding::decode(raw)
                    .map_err(|_| McpError::InvalidUri(format!("sub-path '{}' is not valid UTF-8", raw)))?;
                Some(validate_sub_path(scheme, &decoded)?)
            }
            None => None,
        };

        let mut parameters = BTreeMap::new();
        if let Some(query) = query {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                parameters
                    .entry(key.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }

        Ok(Self {
            scheme,
            reference_id,
            sub_path,
            parameters,
        })
    }

    /// Validate the parts and return the canonical string form
    pub fn build(
        scheme: UriScheme,
        reference_id: &str,
        sub_path: Option<&str>,
        parameters: &BTreeMap<String, String>,
    ) -> McpResult<String> {
        let reference_id = validate_reference(scheme, reference_id)?;
        let sub_path = sub_path
            .filter(|s| !s.is_empty())
            .map(|s| validate_sub_path(scheme, s))
            .transpose()?;
        Ok(Self {
            scheme,
            reference_id,
            sub_path,
            parameters: parameters.clone(),
        }
        .to_string())
    }

    /// Item URI without sub-path or parameters
    pub fn item(scheme: UriScheme, reference_id: ReferenceId) -> Self {
        Self {
            scheme,
            reference_id,
            sub_path: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

impl fmt::Display for EntityUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.reference_id)?;
        if let Some(sub) = self.sub_path {
            write!(f, "/{}", sub.as_str())?;
        }
        if !self.parameters.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.parameters.iter())
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Collections reachable under `requirements://`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Epics,
    UserStories,
    Requirements,
    AcceptanceCriteria,
    Prompts,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Epics,
        CollectionKind::UserStories,
        CollectionKind::Requirements,
        CollectionKind::AcceptanceCriteria,
        CollectionKind::Prompts,
    ];

    /// Path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epics => "epics",
            Self::UserStories => "user-stories",
            Self::Requirements => "requirements",
            Self::AcceptanceCriteria => "acceptance-criteria",
            Self::Prompts => "prompts",
        }
    }

    /// Field name of the item array in a collection payload
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Epics => "epics",
            Self::UserStories => "user_stories",
            Self::Requirements => "requirements",
            Self::AcceptanceCriteria => "acceptance_criteria",
            Self::Prompts => "prompts",
        }
    }

    pub fn scheme(&self) -> UriScheme {
        match self {
            Self::Epics => UriScheme::Epic,
            Self::UserStories => UriScheme::UserStory,
            Self::Requirements => UriScheme::Requirement,
            Self::AcceptanceCriteria => UriScheme::AcceptanceCriteria,
            Self::Prompts => UriScheme::Prompt,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn uri(&self) -> String {
        format!("{}://{}", NAVIGATION_SCHEME, self.as_str())
    }
}

/// Any URI the resource reader accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Entity(EntityUri),
    Collection(CollectionKind),
    /// Item addressed by UUID; resolved to its reference id when read
    CollectionItem { kind: CollectionKind, id: Uuid },
    ActivePrompt,
}

impl ResourceUri {
    pub const ACTIVE_PROMPT: &'static str = "requirements://prompts/active";

    pub fn parse(input: &str) -> McpResult<Self> {
        check_surroundings(input)?;
        let (scheme_name, rest) = split_scheme(strip_fragment(input))?;
        if scheme_name != NAVIGATION_SCHEME {
            return EntityUri::parse(input).map(Self::Entity);
        }

        let path = rest.split_once('?').map_or(rest, |(path, _)| path);
        let mut segments = path.split('/');
        let kind_name = segments.next().unwrap_or_default();
        let kind = CollectionKind::from_name(kind_name).ok_or_else(|| {
            McpError::InvalidUri(format!("unknown collection '{}'", kind_name))
        })?;
        let item = segments.next().filter(|s| !s.is_empty());
        if segments.next().is_some() {
            return Err(McpError::InvalidUri(format!(
                "'{}' has too many path segments",
                input
            )));
        }

        let Some(item) = item else {
            return Ok(Self::Collection(kind));
        };
        if kind == CollectionKind::Prompts && item == "active" {
            return Ok(Self::ActivePrompt);
        }
        if RESOURCE_REF.is_match(item) {
            let reference_id = validate_reference(kind.scheme(), item)?;
            return Ok(Self::Entity(EntityUri::item(kind.scheme(), reference_id)));
        }
        match Uuid::parse_str(item) {
            Ok(id) => Ok(Self::CollectionItem { kind, id }),
            Err(_) => Err(McpError::InvalidUri(format!(
                "'{}' is neither a reference id nor a UUID",
                item
            ))),
        }
    }
}

fn check_surroundings(input: &str) -> McpResult<()> {
    if input.is_empty() {
        return Err(McpError::InvalidUri("URI must not be empty".into()));
    }
    if input.trim() != input {
        return Err(McpError::InvalidUri(
            "URI must not have leading or trailing whitespace".into(),
        ));
    }
    Ok(())
}

fn strip_fragment(input: &str) -> &str {
    input.split_once('#').map_or(input, |(before, _)| before)
}

fn split_scheme(input: &str) -> McpResult<(&str, &str)> {
    match input.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() => Ok((scheme, rest)),
        _ => Err(McpError::InvalidUri(format!("'{}' has no scheme", input))),
    }
}

fn validate_reference(scheme: UriScheme, reference: &str) -> McpResult<ReferenceId> {
    if reference.is_empty() {
        return Err(McpError::InvalidUri(format!(
            "{}:// URI is missing a reference id",
            scheme
        )));
    }
    if !RESOURCE_REF.is_match(reference) {
        return Err(McpError::InvalidUri(format!(
            "'{}' is not a valid reference id",
            reference
        )));
    }
    let reference_id = ReferenceId::parse(reference)
        .map_err(|_| McpError::InvalidUri(format!("'{}' is not a valid reference id", reference)))?;
    if reference_id.prefix() != scheme.prefix() {
        return Err(McpError::InvalidUri(format!(
            "scheme '{}' expects {}-<n> reference ids, got '{}'",
            scheme,
            scheme.prefix().as_str(),
            reference
        )));
    }
    Ok(reference_id)
}

fn validate_sub_path(scheme: UriScheme, name: &str) -> McpResult<SubPath> {
    SubPath::from_name(name)
        .filter(|sub| scheme.sub_paths().contains(sub))
        .ok_or_else(|| {
            McpError::InvalidUri(format!("'{}' is not a sub-path of {}://", name, scheme))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_sub_path_and_params() {
        let uri = EntityUri::parse("user-story://US-042/requirements?status=active").unwrap();
        assert_eq!(uri.scheme, UriScheme::UserStory);
        assert_eq!(uri.reference_id.to_string(), "US-042");
        assert_eq!(uri.sub_path, Some(SubPath::Requirements));
        assert_eq!(uri.parameter("status"), Some("active"));
    }

    #[test]
    fn test_scheme_prefix_mismatch_names_both() {
        let err = EntityUri::parse("epic://US-001").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("epic"));
        assert!(message.contains("US-001"));
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn test_rejections() {
        for input in [
            "",
            " epic://EP-1",
            "epic://EP-1 ",
            "EPIC://EP-1",
            "Epic://EP-1",
            "epic://",
            "EP-1",
            "://EP-1",
            "story://US-1",
            "epic://ep-1",
            "epic://EP-x",
            "epic://EP-1/relationships",
            "acceptance-criteria://AC-1/hierarchy",
        ] {
            assert!(
                matches!(EntityUri::parse(input), Err(McpError::InvalidUri(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_scheme_accepts_only_its_prefix() {
        for scheme in UriScheme::ALL {
            for prefix in ["EP", "US", "REQ", "AC", "PROMPT"] {
                let input = format!("{}://{}-007", scheme, prefix);
                let ok = EntityUri::parse(&input).is_ok();
                assert_eq!(ok, scheme.prefix().as_str() == prefix, "{}", input);
            }
        }
    }

    #[test]
    fn test_query_fragment_and_encoding() {
        let uri = EntityUri::parse("epic://EP-001/user%2Dstories?b=2&a=x%20y&a=ignored&z=#frag").unwrap();
        assert_eq!(uri.sub_path, Some(SubPath::UserStories));
        assert_eq!(uri.parameter("a"), Some("x y"));
        assert_eq!(uri.parameter("b"), Some("2"));
        assert_eq!(uri.parameter("z"), Some(""));
        assert_eq!(uri.to_string(), "epic://EP-001/user-stories?a=x+y&b=2&z=");
    }

    #[test]
    fn test_build_is_canonical() {
        let mut params = BTreeMap::new();
        params.insert("status".to_string(), "In Progress".to_string());
        params.insert("limit".to_string(), "5".to_string());

        let built =
            EntityUri::build(UriScheme::UserStory, "US-007", Some("requirements"), &params).unwrap();
        assert_eq!(built, "user-story://US-007/requirements?limit=5&status=In+Progress");

        let reparsed = EntityUri::parse(&built).unwrap();
        assert_eq!(reparsed.to_string(), built);
        assert_eq!(reparsed.parameter("status"), Some("In Progress"));

        assert!(EntityUri::build(UriScheme::Prompt, "PROMPT-1", Some("hierarchy"), &params).is_err());
    }

    #[test]
    fn test_navigation_uris() {
        assert_eq!(
            ResourceUri::parse("requirements://epics").unwrap(),
            ResourceUri::Collection(CollectionKind::Epics)
        );
        assert_eq!(
            ResourceUri::parse("requirements://prompts/active").unwrap(),
            ResourceUri::ActivePrompt
        );

        let rewritten = ResourceUri::parse("requirements://user-stories/US-003").unwrap();
        match rewritten {
            ResourceUri::Entity(uri) => assert_eq!(uri.to_string(), "user-story://US-003"),
            other => panic!("unexpected {:?}", other),
        }

        let id = Uuid::new_v4();
        assert_eq!(
            ResourceUri::parse(&format!("requirements://requirements/{}", id)).unwrap(),
            ResourceUri::CollectionItem {
                kind: CollectionKind::Requirements,
                id
            }
        );

        assert!(ResourceUri::parse("requirements://epics/US-001").is_err());
        assert!(ResourceUri::parse("requirements://widgets").is_err());
        assert!(ResourceUri::parse("requirements://epics/EP-1/extra").is_err());
    }
}
