//! Entity registry: resolution, aliases, and audited merges.
//!
//! Resolution is deliberately strict. Exact matches (after normalization)
//! win outright; fuzzy matching uses Levenshtein similarity with a high
//! default threshold, so "Jon" does not silently collapse into "John".
//! When two distinct entities tie as best candidates the registry refuses
//! to guess and reports the ambiguity instead.

use crate::models::{CreationSource, Entity, EntityId, EntityMerge, EntityType, slug::fold_diacritics};
use crate::storage::Store;
use crate::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Minimum Levenshtein similarity for a fuzzy match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

const RESOLUTION_CACHE_SIZE: usize = 512;

/// Normalizes a name for comparison: diacritics fold, case drops,
/// whitespace collapses.
#[must_use]
pub fn normalize(name: &str) -> String {
    fold_diacritics(name)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plain DP Levenshtein distance with a length-difference early exit.
fn levenshtein(a: &str, b: &str, cutoff: usize) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > cutoff {
        return cutoff + 1;
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > cutoff {
            return cutoff + 1;
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity in `[0, 1]`: `1 - distance / max_len`.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    // Distances beyond half the longer string can never clear the default
    // threshold, so cut the DP off there.
    let cutoff = max_len.div_ceil(2);
    let distance = levenshtein(a, b, cutoff);
    if distance > max_len {
        return 0.0;
    }
    1.0 - (distance as f64 / max_len as f64)
}

/// Service resolving names to durable entity identities.
pub struct EntityRegistry<S: Store> {
    store: Arc<S>,
    threshold: f64,
    cache: Mutex<LruCache<(String, Option<EntityType>), EntityId>>,
}

impl<S: Store> EntityRegistry<S> {
    /// Creates a registry over a shared store with the default threshold.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_threshold(store, DEFAULT_SIMILARITY_THRESHOLD)
    }

    /// Creates a registry with a custom fuzzy threshold.
    ///
    /// # Panics
    ///
    /// Never panics; the cache size is a nonzero constant.
    #[must_use]
    pub fn with_threshold(store: Arc<S>, threshold: f64) -> Self {
        let size = NonZeroUsize::new(RESOLUTION_CACHE_SIZE)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            threshold,
            cache: Mutex::new(LruCache::new(size)),
        }
    }

    fn cache_get(&self, key: &(String, Option<EntityType>)) -> Option<EntityId> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(key).copied(),
            Err(poisoned) => poisoned.into_inner().get(key).copied(),
        }
    }

    fn cache_put(&self, key: (String, Option<EntityType>), id: EntityId) {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.put(key, id);
            },
            Err(poisoned) => {
                poisoned.into_inner().put(key, id);
            },
        }
    }

    fn cache_clear(&self) {
        match self.cache.lock() {
            Ok(mut cache) => cache.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Follows the merge chain from an id to the entity currently live.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub fn resolve_id(&self, id: EntityId) -> Result<Option<Entity>> {
        let mut current = id;
        loop {
            if let Some(entity) = self.store.get_entity(current)? {
                return Ok(Some(entity));
            }
            match self.store.merge_target(current)? {
                Some(winner) => current = winner,
                None => return Ok(None),
            }
        }
    }

    /// Resolves a name to at most one entity.
    ///
    /// Exact name or alias matches (after normalization) take precedence;
    /// otherwise the best fuzzy candidate at or above the threshold wins.
    /// A type hint restricts candidates to entities of that type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResolutionAmbiguity`] when several distinct
    /// entities tie, [`Error::InvalidInput`] for an empty name, or any
    /// store error.
    #[instrument(skip(self), fields(name = %name))]
    pub fn resolve(&self, name: &str, hint: Option<EntityType>) -> Result<Option<Entity>> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return Err(Error::InvalidInput(
                "entity name must not be empty".to_string(),
            ));
        }

        let key = (wanted.clone(), hint);
        if let Some(cached) = self.cache_get(&key) {
            if let Some(entity) = self.resolve_id(cached)? {
                return Ok(Some(entity));
            }
        }

        let candidates: Vec<Entity> = self
            .store
            .list_entities()?
            .into_iter()
            .filter(|e| {
                hint.is_none_or(|h| {
                    e.entity_type == h || e.additional_types.contains(&h)
                })
            })
            .collect();

        let exact: Vec<&Entity> = candidates
            .iter()
            .filter(|e| {
                normalize(&e.name) == wanted
                    || e.aliases.iter().any(|a| normalize(a) == wanted)
            })
            .collect();
        match exact.len() {
            1 => {
                let entity = exact[0].clone();
                self.cache_put(key, entity.id());
                return Ok(Some(entity));
            },
            0 => {},
            _ => {
                return Err(Error::ResolutionAmbiguity {
                    name: name.to_string(),
                    candidates: exact.iter().map(|e| e.id().to_string()).collect(),
                });
            },
        }

        let mut best_score = self.threshold;
        let mut best: Vec<&Entity> = Vec::new();
        for entity in &candidates {
            let score = std::iter::once(entity.name.as_str())
                .chain(entity.aliases.iter().map(String::as_str))
                .map(|candidate| similarity(&normalize(candidate), &wanted))
                .fold(0.0f64, f64::max);
            if score > best_score {
                best_score = score;
                best = vec![entity];
            } else if (score - best_score).abs() < f64::EPSILON && score >= self.threshold {
                best.push(entity);
            }
        }

        match best.len() {
            0 => Ok(None),
            1 => {
                let entity = best[0].clone();
                debug!(entity = %entity.id(), score = best_score, "fuzzy resolution");
                self.cache_put(key, entity.id());
                Ok(Some(entity))
            },
            _ => Err(Error::ResolutionAmbiguity {
                name: name.to_string(),
                candidates: best.iter().map(|e| e.id().to_string()).collect(),
            }),
        }
    }

    /// Resolves a name, creating a new entity when nothing matches.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors; creation itself only fails on store
    /// errors.
    pub fn resolve_or_create(
        &self,
        name: &str,
        entity_type: EntityType,
        source: CreationSource,
    ) -> Result<Entity> {
        if let Some(existing) = self.resolve(name, Some(entity_type))? {
            return Ok(existing);
        }
        let entity = Entity::new(name.trim(), entity_type, source);
        self.store.store_entity(&entity)?;
        metrics::counter!("fabula_entities_created_total").increment(1);
        self.cache_put((normalize(name), Some(entity_type)), entity.id());
        Ok(entity)
    }

    /// Adds aliases to an entity, skipping ones it already answers to.
    ///
    /// Idempotent: registering the same alias list twice is a no-op the
    /// second time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing entity, or any store
    /// error.
    pub fn register_aliases(&self, id: EntityId, aliases: &[String]) -> Result<Entity> {
        let mut entity = self
            .store
            .get_entity(id)?
            .ok_or_else(|| Error::not_found("entity", id))?;

        let mut changed = false;
        for alias in aliases {
            let normalized = normalize(alias);
            if normalized.is_empty() || normalized == normalize(&entity.name) {
                continue;
            }
            if entity.aliases.iter().any(|a| normalize(a) == normalized) {
                continue;
            }
            entity.aliases.push(alias.trim().to_string());
            changed = true;
        }
        if changed {
            entity.header.touch();
            self.store.store_entity(&entity)?;
        }
        Ok(entity)
    }

    /// Merges `loser` into `winner`, keeping every state version.
    ///
    /// States and relationships re-point to the winner, the loser's names
    /// become aliases of the winner, and an [`EntityMerge`] audit record is
    /// written before the loser leaves the live set. The loser's id stays
    /// resolvable through [`EntityRegistry::resolve_id`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when winner and loser are the same
    /// entity, [`Error::NotFound`] when either is missing, or any store
    /// error.
    #[instrument(skip(self))]
    pub fn merge_entities(&self, winner: EntityId, loser: EntityId) -> Result<Entity> {
        if winner == loser {
            return Err(Error::InvalidInput(
                "an entity cannot be merged into itself".to_string(),
            ));
        }
        self.store
            .get_entity(winner)?
            .ok_or_else(|| Error::not_found("entity", winner))?;
        let loser_entity = self
            .store
            .get_entity(loser)?
            .ok_or_else(|| Error::not_found("entity", loser))?;

        let moved = self.store.repoint_entity_states(loser, winner)?;

        for relationship in self.store.relationships_for_entity(loser)? {
            let other = if relationship.source_id == loser {
                relationship.target_id
            } else {
                relationship.source_id
            };
            if other == winner {
                // The pair collapses onto one entity; a relationship may
                // not be self-referential, so the record goes.
                self.store.remove_relationship(relationship.id())?;
                continue;
            }
            if let Some(existing) =
                self.store
                    .find_relationship(winner, other, relationship.relationship_type)?
            {
                if existing.id() != relationship.id() {
                    self.store
                        .repoint_relationship_states(relationship.id(), existing.id())?;
                    self.store.remove_relationship(relationship.id())?;
                    continue;
                }
            }
            let mut moved_rel = relationship;
            if moved_rel.source_id == loser {
                moved_rel.source_id = winner;
            }
            if moved_rel.target_id == loser {
                moved_rel.target_id = winner;
            }
            moved_rel.header.touch();
            self.store.store_relationship(&moved_rel)?;
        }

        let mut carried = vec![loser_entity.name.clone()];
        carried.extend(loser_entity.aliases.iter().cloned());
        let merged = self.register_aliases(winner, &carried)?;

        self.store
            .record_merge(&EntityMerge::new(winner, loser, carried))?;
        self.store.remove_entity(loser)?;
        self.cache_clear();

        debug!(%winner, %loser, states_moved = moved, "entities merged");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RelationDirection, Relationship, RelationshipType, StateDraft};
    use crate::services::StateVersioningEngine;
    use crate::storage::{KnowledgeStore, MemoryStore};

    fn registry() -> EntityRegistry<MemoryStore> {
        EntityRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_normalize_folds_and_collapses() {
        assert_eq!(normalize("  Chloë   BRONTË "), "chloe bronte");
    }

    #[test]
    fn test_normalize_closed_under_case_folding() {
        // Ligatures and non-Latin scripts must compare case-insensitively;
        // "ﬀ" uppercases to "FF" before any folding happens.
        for name in ["ﬀoulkes", "Ελένη", "Москва"] {
            assert_eq!(normalize(&name.to_uppercase()), normalize(name), "{name}");
            assert_eq!(normalize(name), normalize(&normalize(name)), "{name}");
        }
    }

    #[test]
    fn test_exact_alias_match_beats_fuzzy() {
        let reg = registry();
        let entity = reg
            .resolve_or_create("Mira Kessler", EntityType::Character, CreationSource::Human)
            .unwrap();
        reg.register_aliases(entity.id(), &["The Archivist".to_string()])
            .unwrap();

        let hit = reg.resolve("the archivist", None).unwrap();
        assert_eq!(hit.map(|e| e.id()), Some(entity.id()));
    }

    #[test]
    fn test_jon_does_not_match_john() {
        let reg = registry();
        reg.resolve_or_create("John", EntityType::Character, CreationSource::Human)
            .unwrap();
        assert!(reg.resolve("Jon", None).unwrap().is_none());
    }

    #[test]
    fn test_near_identical_name_matches_fuzzily() {
        let reg = registry();
        let entity = reg
            .resolve_or_create("Mira Kessler", EntityType::Character, CreationSource::Human)
            .unwrap();
        let hit = reg.resolve("Mira Kesler", None).unwrap();
        assert_eq!(hit.map(|e| e.id()), Some(entity.id()));
    }

    #[test]
    fn test_type_hint_scopes_candidates() {
        let reg = registry();
        reg.resolve_or_create("Raven", EntityType::Character, CreationSource::Human)
            .unwrap();
        let faction = reg
            .resolve_or_create("Raven", EntityType::Organization, CreationSource::Human)
            .unwrap();

        let hit = reg.resolve("Raven", Some(EntityType::Organization)).unwrap();
        assert_eq!(hit.map(|e| e.id()), Some(faction.id()));
        assert!(matches!(
            reg.resolve("Raven", None),
            Err(Error::ResolutionAmbiguity { .. })
        ));
    }

    #[test]
    fn test_register_aliases_is_idempotent() {
        let reg = registry();
        let entity = reg
            .resolve_or_create("Mira", EntityType::Character, CreationSource::Human)
            .unwrap();
        let aliases = vec!["The Archivist".to_string(), "mira".to_string()];
        let first = reg.register_aliases(entity.id(), &aliases).unwrap();
        let second = reg.register_aliases(entity.id(), &aliases).unwrap();
        assert_eq!(first.aliases, vec!["The Archivist"]);
        assert_eq!(second.aliases, first.aliases);
    }

    #[test]
    fn test_merge_repoints_history_and_resolves_stale_id() {
        let store = Arc::new(MemoryStore::new());
        let reg = EntityRegistry::new(Arc::clone(&store));
        let versioning = StateVersioningEngine::new(Arc::clone(&store));

        let winner = reg
            .resolve_or_create("Mira Kessler", EntityType::Character, CreationSource::Human)
            .unwrap();
        let loser = reg
            .resolve_or_create("The Gray Warden", EntityType::Character, CreationSource::Human)
            .unwrap();
        versioning
            .append_state(
                loser.id(),
                StateDraft::new(CreationSource::Human).with_summary("a masked stranger"),
            )
            .unwrap();

        let other = reg
            .resolve_or_create("Brasshollow", EntityType::Location, CreationSource::Human)
            .unwrap();
        store
            .store_relationship(&Relationship::new(
                loser.id(),
                other.id(),
                RelationshipType::Location,
                RelationDirection::Outbound,
                CreationSource::Human,
            ))
            .unwrap();

        let merged = reg.merge_entities(winner.id(), loser.id()).unwrap();
        assert!(merged.aliases.contains(&"The Gray Warden".to_string()));
        assert_eq!(store.entity_states(winner.id()).unwrap().len(), 1);
        assert!(store.get_entity(loser.id()).unwrap().is_none());

        let moved = store
            .find_relationship(winner.id(), other.id(), RelationshipType::Location)
            .unwrap();
        assert!(moved.is_some());

        // The old id still leads home through the merge record.
        let resolved = reg.resolve_id(loser.id()).unwrap();
        assert_eq!(resolved.map(|e| e.id()), Some(winner.id()));
    }

    #[test]
    fn test_merge_into_self_rejected() {
        let reg = registry();
        let entity = reg
            .resolve_or_create("Mira", EntityType::Character, CreationSource::Human)
            .unwrap();
        assert!(matches!(
            reg.merge_entities(entity.id(), entity.id()),
            Err(Error::InvalidInput(_))
        ));
    }
}
