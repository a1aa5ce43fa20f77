//! In-memory implementation of every repository trait.
//!
//! Backs unit tests of the pipeline, search and job layers without a
//! PostgreSQL instance. Graph writes are staged per transaction and applied
//! under a single lock at commit, so readers never observe a partial run.
//! [`FailPoint`]s inject storage failures at chosen steps.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use atomic_core::{
    defaults, new_v7, Annotation, AnnotationRepository, CascadeDeleteSummary, CreateNoteRequest,
    CreateTopicRequest, EmbeddingBackfillRepository, Entity, EntityMatch, Error, Graph, GraphRepository, GraphTransaction, Job,
    JobRepository, JobStatus, JobType, NewEntity, NewRelationship, Note, NoteMatch,
    NoteRepository, NoteSummary, Relationship, Result, Topic, TopicRepository, Vector,
    VectorSearchRepository,
};

/// Step at which a [`MemoryStore`] transaction fails on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SetNoteEmbedding,
    SaveEntities,
    SaveRelationships,
    Commit,
}

#[derive(Default)]
struct MemoryState {
    notes: BTreeMap<Uuid, Note>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    topics: Vec<Topic>,
    annotations: Vec<Annotation>,
    jobs: Vec<Job>,
}

impl MemoryState {
    /// Remove a note's entities plus every relationship and annotation
    /// touching them. Returns (entities, relationships) removed.
    fn clear_note_graph(&mut self, note_id: Uuid) -> (u64, u64) {
        let owned: HashSet<Uuid> = self
            .entities
            .iter()
            .filter(|e| e.note_id == note_id)
            .map(|e| e.id)
            .collect();
        self.annotations.retain(|a| !owned.contains(&a.entity_id));
        let rels_before = self.relationships.len();
        self.relationships.retain(|r| {
            !owned.contains(&r.source_entity_id) && !owned.contains(&r.target_entity_id)
        });
        let rels_removed = rels_before - self.relationships.len();
        self.entities.retain(|e| e.note_id != note_id);
        (owned.len() as u64, rels_removed as u64)
    }

    fn graph_for(&self, note_ids: &HashSet<Uuid>) -> Graph {
        let entities: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| note_ids.contains(&e.note_id))
            .collect();
        let ids: HashSet<Uuid> = entities.iter().map(|e| e.id).collect();
        Graph {
            entities: entities.into_iter().cloned().map(Into::into).collect(),
            relationships: self
                .relationships
                .iter()
                .filter(|r| ids.contains(&r.source_entity_id) && ids.contains(&r.target_entity_id))
                .cloned()
                .map(Into::into)
                .collect(),
        }
    }
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<Mutex<HashSet<FailPoint>>>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next transactions fail at `point` until cleared.
    pub fn fail_at(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(point);
    }

    pub fn clear_failures(&self) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if self
            .fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&point)
        {
            return Err(Error::Internal(format!("injected storage failure at {point:?}")));
        }
        Ok(())
    }

    /// Committed entities of a note, in insertion order.
    pub fn entities_for_note(&self, note_id: Uuid) -> Vec<Entity> {
        self.state()
            .entities
            .iter()
            .filter(|e| e.note_id == note_id)
            .cloned()
            .collect()
    }

    /// All committed relationships.
    pub fn relationships(&self) -> Vec<Relationship> {
        self.state().relationships.clone()
    }

    pub fn entity_count(&self) -> usize {
        self.state().entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state().relationships.len()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

fn rank<T>(mut scored: Vec<(f64, T)>, limit: i64) -> Vec<(f64, T)> {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit.max(0) as usize);
    scored
}

// =============================================================================
// NOTES
// =============================================================================

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn insert(&self, req: CreateNoteRequest) -> Result<Uuid> {
        let mut state = self.state();
        if let Some(topic_id) = req.topic_id {
            if !state.topics.iter().any(|t| t.id == topic_id) {
                return Err(Error::TopicNotFound(topic_id));
            }
        }
        let id = new_v7();
        let now = Utc::now();
        state.notes.insert(
            id,
            Note {
                id,
                title: req.title,
                content: req.content,
                source_file: req.source_file,
                note_metadata: req
                    .metadata
                    .unwrap_or_else(|| JsonValue::Object(Default::default())),
                topic_id: req.topic_id,
                created_at: now,
                updated_at: now,
                embedding: None,
            },
        );
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Note>> {
        Ok(self.state().notes.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<NoteSummary>> {
        let state = self.state();
        let mut out: Vec<NoteSummary> = state
            .notes
            .values()
            .map(|n| NoteSummary {
                id: n.id,
                title: n.title.clone(),
                created_at: n.created_at,
                entity_count: state.entities.iter().filter(|e| e.note_id == n.id).count() as i64,
                note_metadata: n.note_metadata.clone(),
                topic_id: n.topic_id,
            })
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<()> {
        let mut state = self.state();
        let note = state.notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        note.content = content.to_string();
        note.updated_at = Utc::now();
        Ok(())
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<()> {
        let mut state = self.state();
        let note = state.notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        note.title = title.to_string();
        note.updated_at = Utc::now();
        Ok(())
    }

    async fn merge_metadata(&self, id: Uuid, patch: JsonValue) -> Result<()> {
        let JsonValue::Object(patch) = patch else {
            return Err(Error::InvalidInput(
                "metadata patch must be a JSON object".to_string(),
            ));
        };
        let mut state = self.state();
        let note = state.notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        if !note.note_metadata.is_object() {
            note.note_metadata = JsonValue::Object(Default::default());
        }
        if let JsonValue::Object(existing) = &mut note.note_metadata {
            existing.extend(patch);
        }
        note.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// GRAPH
// =============================================================================

#[async_trait]
impl GraphRepository for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        Ok(Box::new(MemoryGraphTransaction {
            store: self.clone(),
            cleared: Vec::new(),
            note_embeddings: Vec::new(),
            entities: Vec::new(),
            relationships: Vec::new(),
        }))
    }

    async fn note_graph(&self, note_id: Uuid) -> Result<Graph> {
        let state = self.state();
        if !state.notes.contains_key(&note_id) {
            return Err(Error::NoteNotFound(note_id));
        }
        Ok(state.graph_for(&HashSet::from([note_id])))
    }

    async fn topic_graph(&self, topic_id: Uuid) -> Result<Graph> {
        let state = self.state();
        if !state.topics.iter().any(|t| t.id == topic_id) {
            return Err(Error::TopicNotFound(topic_id));
        }
        let note_ids: HashSet<Uuid> = state
            .notes
            .values()
            .filter(|n| n.topic_id == Some(topic_id))
            .map(|n| n.id)
            .collect();
        Ok(state.graph_for(&note_ids))
    }

    async fn delete_note_cascade(&self, note_id: Uuid) -> Result<CascadeDeleteSummary> {
        let mut state = self.state();
        let title = state
            .notes
            .get(&note_id)
            .map(|n| n.title.clone())
            .ok_or(Error::NoteNotFound(note_id))?;
        let (entities_deleted, relationships_deleted) = state.clear_note_graph(note_id);
        state.notes.remove(&note_id);
        state.jobs.iter_mut().filter(|j| j.note_id == Some(note_id)).for_each(|j| j.note_id = None);
        Ok(CascadeDeleteSummary {
            note_id,
            title,
            entities_deleted,
            relationships_deleted,
        })
    }

    async fn fetch_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
        Ok(self
            .state()
            .entities
            .iter()
            .find(|e| e.id == entity_id)
            .cloned())
    }
}

/// Staged writes of one in-memory pipeline run.
pub struct MemoryGraphTransaction {
    store: MemoryStore,
    cleared: Vec<Uuid>,
    note_embeddings: Vec<(Uuid, Vector)>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

impl MemoryGraphTransaction {
    fn note_exists(&self, note_id: Uuid) -> bool {
        self.store.state().notes.contains_key(&note_id)
    }

    /// Whether `id` names a staged entity or a committed one this
    /// transaction has not cleared.
    fn entity_visible(&self, id: Uuid) -> bool {
        self.entities.iter().any(|e| e.id == id)
            || self
                .store
                .state()
                .entities
                .iter()
                .any(|e| e.id == id && !self.cleared.contains(&e.note_id))
    }
}

#[async_trait]
impl GraphTransaction for MemoryGraphTransaction {
    async fn clear_note_graph(&mut self, note_id: Uuid) -> Result<()> {
        self.entities.retain(|e| e.note_id != note_id);
        self.cleared.push(note_id);
        Ok(())
    }

    async fn set_note_embedding(&mut self, note_id: Uuid, embedding: &Vector) -> Result<()> {
        self.store.check(FailPoint::SetNoteEmbedding)?;
        if !self.note_exists(note_id) {
            return Err(Error::NoteNotFound(note_id));
        }
        self.note_embeddings.push((note_id, embedding.clone()));
        Ok(())
    }

    async fn save_entities(&mut self, note_id: Uuid, entities: &[NewEntity]) -> Result<Vec<Uuid>> {
        self.store.check(FailPoint::SaveEntities)?;
        if !self.note_exists(note_id) {
            return Err(Error::NoteNotFound(note_id));
        }
        let mut ids = Vec::with_capacity(entities.len());
        for e in entities {
            if e.name.is_empty() {
                return Err(Error::InvalidInput("entity name must not be empty".to_string()));
            }
            let id = new_v7();
            self.entities.push(Entity {
                id,
                note_id,
                name: e.name.clone(),
                entity_type: e.entity_type.clone(),
                description: Some(e.description.clone()),
                color: e.color.clone(),
                timestamp: e.timestamp,
                embedding: e.embedding.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn save_relationships(
        &mut self,
        relationships: &[NewRelationship],
    ) -> Result<Vec<Uuid>> {
        self.store.check(FailPoint::SaveRelationships)?;
        let mut ids = Vec::with_capacity(relationships.len());
        for r in relationships {
            for endpoint in [r.source_entity_id, r.target_entity_id] {
                if !self.entity_visible(endpoint) {
                    return Err(Error::Internal(format!(
                        "relationship endpoint {endpoint} does not exist"
                    )));
                }
            }
            if !(0.0..=1.0).contains(&r.strength) {
                return Err(Error::InvalidInput(format!(
                    "relationship strength {} outside [0, 1]",
                    r.strength
                )));
            }
            let id = new_v7();
            self.relationships.push(Relationship {
                id,
                source_entity_id: r.source_entity_id,
                target_entity_id: r.target_entity_id,
                relationship_type: r.relationship_type.clone(),
                strength: r.strength,
                ai_explanation: r.explanation.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.check(FailPoint::Commit)?;
        let this = *self;
        {
            let mut state = this.store.state();
            for note_id in &this.cleared {
                state.clear_note_graph(*note_id);
            }
            for (note_id, embedding) in this.note_embeddings {
                if let Some(note) = state.notes.get_mut(&note_id) {
                    note.embedding = Some(embedding);
                    note.updated_at = Utc::now();
                }
            }
            state.entities.extend(this.entities);
            state.relationships.extend(this.relationships);
        }
        this.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// TOPICS & ANNOTATIONS
// =============================================================================

#[async_trait]
impl TopicRepository for MemoryStore {
    async fn create(&self, req: CreateTopicRequest) -> Result<Topic> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("topic name must not be empty".to_string()));
        }
        let now = Utc::now();
        let topic = Topic {
            id: new_v7(),
            name: name.to_string(),
            description: req.description,
            emoji: req
                .emoji
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| defaults::TOPIC_EMOJI.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.state().topics.push(topic.clone());
        Ok(topic)
    }

    async fn list(&self) -> Result<Vec<Topic>> {
        let mut topics = self.state().topics.clone();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(topics)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Topic>> {
        Ok(self.state().topics.iter().find(|t| t.id == id).cloned())
    }
}

#[async_trait]
impl AnnotationRepository for MemoryStore {
    async fn create(&self, entity_id: Uuid, user_note: &str) -> Result<Annotation> {
        let mut state = self.state();
        if !state.entities.iter().any(|e| e.id == entity_id) {
            return Err(Error::EntityNotFound(entity_id));
        }
        let annotation = Annotation {
            id: new_v7(),
            entity_id,
            user_note: user_note.to_string(),
            created_at: Utc::now(),
        };
        state.annotations.push(annotation.clone());
        Ok(annotation)
    }

    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<Annotation>> {
        let mut out: Vec<Annotation> = self
            .state()
            .annotations
            .iter()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Annotation>> {
        Ok(self.state().annotations.iter().find(|a| a.id == id).cloned())
    }

    async fn update(&self, id: Uuid, user_note: &str) -> Result<Option<Annotation>> {
        let mut state = self.state();
        Ok(state.annotations.iter_mut().find(|a| a.id == id).map(|a| {
            a.user_note = user_note.to_string();
            a.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        let before = state.annotations.len();
        state.annotations.retain(|a| a.id != id);
        Ok(state.annotations.len() < before)
    }
}

// =============================================================================
// SEARCH
// =============================================================================

#[async_trait]
impl VectorSearchRepository for MemoryStore {
    async fn search_entities(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>> {
        let state = self.state();
        let scored = state
            .entities
            .iter()
            .filter_map(|e| {
                let sim = cosine_similarity(e.embedding.as_ref()?.as_slice(), query.as_slice());
                (sim >= min_similarity).then(|| (sim, e.clone()))
            })
            .collect();
        Ok(rank(scored, limit)
            .into_iter()
            .map(|(sim, entity)| EntityMatch {
                entity,
                similarity: Some(sim),
            })
            .collect())
    }

    async fn search_notes(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<NoteMatch>> {
        let state = self.state();
        let scored = state
            .notes
            .values()
            .filter_map(|n| {
                let sim = cosine_similarity(n.embedding.as_ref()?.as_slice(), query.as_slice());
                (sim >= min_similarity).then(|| (sim, n))
            })
            .collect();
        Ok(rank(scored, limit)
            .into_iter()
            .map(|(sim, n)| NoteMatch {
                id: n.id,
                title: n.title.clone(),
                created_at: n.created_at,
                topic_id: n.topic_id,
                similarity: Some(sim),
            })
            .collect())
    }

    async fn related_entities(
        &self,
        entity_id: Uuid,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>> {
        let source = self
            .state()
            .entities
            .iter()
            .find(|e| e.id == entity_id)
            .and_then(|e| e.embedding.clone());
        let Some(source) = source else {
            return Ok(Vec::new());
        };
        let mut hits = self
            .search_entities(&source, limit.saturating_add(1), min_similarity)
            .await?;
        hits.retain(|m| m.entity.id != entity_id);
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn text_search_entities(&self, query: &str, limit: i64) -> Result<Vec<EntityMatch>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Entity> = self
            .state()
            .entities
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits.truncate(limit.max(0) as usize);
        Ok(hits
            .into_iter()
            .map(|entity| EntityMatch {
                entity,
                similarity: None,
            })
            .collect())
    }

    async fn text_search_notes(&self, query: &str, limit: i64) -> Result<Vec<NoteMatch>> {
        let needle = query.to_lowercase();
        let state = self.state();
        let mut hits: Vec<&Note> = state
            .notes
            .values()
            .filter(|n| {
                n.title.to_lowercase().contains(&needle)
                    || n.content.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit.max(0) as usize);
        Ok(hits
            .into_iter()
            .map(|n| NoteMatch {
                id: n.id,
                title: n.title.clone(),
                created_at: n.created_at,
                topic_id: n.topic_id,
                similarity: None,
            })
            .collect())
    }
}

#[async_trait]
impl EmbeddingBackfillRepository for MemoryStore {
    async fn entities_missing_embedding(&self, limit: i64) -> Result<Vec<Entity>> {
        Ok(self
            .state()
            .entities
            .iter()
            .filter(|e| e.embedding.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn notes_missing_embedding(&self, limit: i64) -> Result<Vec<Note>> {
        let state = self.state();
        let mut pending: Vec<&Note> = state
            .notes
            .values()
            .filter(|n| n.embedding.is_none())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn set_entity_embedding(&self, entity_id: Uuid, embedding: &Vector) -> Result<()> {
        let mut state = self.state();
        let entity = state
            .entities
            .iter_mut()
            .find(|e| e.id == entity_id)
            .ok_or(Error::EntityNotFound(entity_id))?;
        entity.embedding = Some(embedding.clone());
        Ok(())
    }

    async fn set_note_embedding(&self, note_id: Uuid, embedding: &Vector) -> Result<()> {
        let mut state = self.state();
        let note = state
            .notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.embedding = Some(embedding.clone());
        note.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// JOBS
// =============================================================================

#[async_trait]
impl JobRepository for MemoryStore {
    async fn queue(
        &self,
        note_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let id = new_v7();
        self.state().jobs.push(Job {
            id,
            note_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_stage: None,
            progress_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut state = self.state();
        let next = state
            .jobs
            .iter_mut()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && (job_types.is_empty() || job_types.contains(&j.job_type))
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        percent: i32,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.progress_percent = percent.clamp(0, 100);
            job.progress_stage = stage.map(str::to_string);
            job.progress_message = message.map(str::to_string);
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.result = result;
            job.progress_percent = 100;
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut state = self.state();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        job.error_message = Some(error.to_string());
        if job.retry_count < job.max_retries {
            job.status = JobStatus::Pending;
            job.retry_count += 1;
            job.started_at = None;
            job.progress_percent = 0;
            job.progress_stage = None;
            job.progress_message = None;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .state()
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}
