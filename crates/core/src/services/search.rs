use crate::error::DomainResult;
use crate::storage::{Store, StoreState};
use crate::types::{EntityKind, ReferenceId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 50;
const SNIPPET_CHARS: usize = 160;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict to these kinds; every hierarchy kind when empty
    #[serde(default)]
    pub kinds: Vec<EntityKind>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub reference_id: ReferenceId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub items: Vec<SearchHit>,
    pub total: usize,
}

/// Case-insensitive substring search across the hierarchy
#[derive(Clone)]
pub struct SearchService {
    store: Store,
}

impl SearchService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn search(&self, query: &str, filters: &SearchFilters) -> DomainResult<SearchResults> {
        let needle = super::required_text("query", query)?.to_lowercase();
        let state = self.store.read().await;

        let mut hits: Vec<SearchHit> = collect(&state)
            .into_iter()
            .filter(|c| filters.kinds.is_empty() || filters.kinds.contains(&c.kind))
            .filter(|c| match (&filters.status, &c.status) {
                (Some(wanted), Some(status)) => wanted == status,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|c| c.haystack.iter().any(|text| text.to_lowercase().contains(&needle)))
            .map(|c| c.into_hit())
            .collect();
        hits.sort_by(|a, b| {
            a.entity_kind
                .cmp(&b.entity_kind)
                .then_with(|| a.reference_id.to_string().cmp(&b.reference_id.to_string()))
        });

        let total = hits.len();
        hits.truncate(filters.limit.unwrap_or(DEFAULT_LIMIT));
        tracing::debug!(query = %query, total, "Search completed");

        Ok(SearchResults {
            query: query.to_string(),
            items: hits,
            total,
        })
    }

    pub async fn search_requirements(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> DomainResult<SearchResults> {
        let filters = SearchFilters {
            kinds: vec![EntityKind::Requirement],
            ..filters.clone()
        };
        self.search(query, &filters).await
    }

    /// Titles starting with or containing `query`, prefix matches first
    pub async fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let state = self.store.read().await;
        let mut titles: Vec<(bool, String)> = collect(&state)
            .into_iter()
            .filter_map(|c| {
                let lower = c.title.to_lowercase();
                lower
                    .contains(&needle)
                    .then(|| (!lower.starts_with(&needle), c.title))
            })
            .collect();
        titles.sort();
        titles.dedup();
        titles.into_iter().take(limit).map(|(_, title)| title).collect()
    }
}

struct Candidate {
    kind: EntityKind,
    id: Uuid,
    reference_id: ReferenceId,
    title: String,
    status: Option<String>,
    haystack: Vec<String>,
}

impl Candidate {
    fn into_hit(self) -> SearchHit {
        let body = self.haystack.get(1).cloned().unwrap_or_default();
        SearchHit {
            entity_kind: self.kind,
            entity_id: self.id,
            reference_id: self.reference_id,
            title: self.title,
            status: self.status,
            snippet: body.chars().take(SNIPPET_CHARS).collect(),
        }
    }
}

fn collect(state: &StoreState) -> Vec<Candidate> {
    let epics = state.epics.values().map(|e| Candidate {
        kind: EntityKind::Epic,
        id: e.id,
        reference_id: e.reference_id.clone(),
        title: e.title.clone(),
        status: Some(e.status.clone()),
        haystack: vec![e.title.clone(), e.description.clone().unwrap_or_default()],
    });
    let stories = state.user_stories.values().map(|s| Candidate {
        kind: EntityKind::UserStory,
        id: s.id,
        reference_id: s.reference_id.clone(),
        title: s.title.clone(),
        status: Some(s.status.clone()),
        haystack: vec![s.title.clone(), s.description.clone().unwrap_or_default()],
    });
    let criteria = state.acceptance_criteria.values().map(|c| Candidate {
        kind: EntityKind::AcceptanceCriteria,
        id: c.id,
        reference_id: c.reference_id.clone(),
        title: c.description.clone(),
        status: None,
        haystack: vec![c.description.clone(), c.description.clone()],
    });
    let requirements = state.requirements.values().map(|r| Candidate {
        kind: EntityKind::Requirement,
        id: r.id,
        reference_id: r.reference_id.clone(),
        title: r.title.clone(),
        status: Some(r.status.clone()),
        haystack: vec![r.title.clone(), r.description.clone().unwrap_or_default()],
    });

    epics.chain(stories).chain(criteria).chain(requirements).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Actor, UserRole};
    use crate::services::{NewEpic, NewRequirement, NewUserStory, Services};

    async fn services() -> Services {
        let services = Services::new(Store::in_memory());
        let actor = Actor::new(Uuid::new_v4(), "dev", UserRole::User);
        let mut epic = NewEpic::titled("Password reset");
        epic.description = Some("Self-service account recovery".into());
        services.epics.create(epic, &actor).await.unwrap();
        services
            .user_stories
            .create(NewUserStory::titled("EP-001", "Reset via email"), &actor)
            .await
            .unwrap();
        services
            .requirements
            .create(NewRequirement::titled("US-001", "Reset token expires"), &actor)
            .await
            .unwrap();
        services
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let services = services().await;
        let results = services
            .search
            .search("RESET", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(results.items[0].entity_kind, EntityKind::Epic);

        let recovery = services
            .search
            .search("recovery", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(recovery.items[0].reference_id.to_string(), "EP-001");
    }

    #[tokio::test]
    async fn test_search_requirements_and_status_filter() {
        let services = services().await;
        let results = services
            .search
            .search_requirements("reset", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.items[0].reference_id.to_string(), "REQ-001");

        let filtered = services
            .search
            .search(
                "reset",
                &SearchFilters {
                    status: Some("Backlog".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.total, 2);

        assert!(services.search.search("  ", &SearchFilters::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_suggest_prefers_prefix_matches() {
        let services = services().await;
        let titles = services.search.suggest("reset", 5).await;
        assert_eq!(titles, vec!["Reset token expires", "Reset via email", "Password reset"]);
    }
}
