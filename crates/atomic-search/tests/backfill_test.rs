//! Embedding backfill against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use atomic_db::MemoryStore;
use atomic_inference::{mock_embedding, MockEmbedding};
use atomic_search::{
    BackfillReport, BackfillScope, CreateNoteRequest, EmbeddingBackend,
    EmbeddingBackfill, EmbeddingBackfillRepository, Entity, Error, GraphRepository, NewEntity,
    Note, NoteRepository, Result, SearchRequest, SearchResults, SemanticSearch, Vector,
};

fn entity(name: &str, description: &str, embedding: Option<Vector>) -> NewEntity {
    NewEntity {
        name: name.to_string(),
        entity_type: "concept".to_string(),
        description: description.to_string(),
        color: "#FF70A6".to_string(),
        embedding,
        timestamp: None,
    }
}

async fn note(store: &MemoryStore, title: &str, content: &str) -> Uuid {
    NoteRepository::insert(
        store,
        CreateNoteRequest {
            title: title.to_string(),
            content: content.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn save(store: &MemoryStore, note_id: Uuid, entities: &[NewEntity]) -> Vec<Uuid> {
    let mut tx = GraphRepository::begin(store).await.unwrap();
    let ids = tx.save_entities(note_id, entities).await.unwrap();
    tx.commit().await.unwrap();
    ids
}

fn backfill(store: &MemoryStore) -> EmbeddingBackfill {
    EmbeddingBackfill::new(
        Arc::new(store.clone()),
        Arc::new(MockEmbedding::deterministic()),
    )
}

async fn stored_entity(store: &MemoryStore, id: Uuid) -> Entity {
    store.fetch_entity(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_fills_missing_embeddings_with_pipeline_text() {
    let store = MemoryStore::new();
    let note_id = note(&store, "Languages", "Rust and Zig compete with C").await;
    let kept = mock_embedding("already here");
    let ids = save(
        &store,
        note_id,
        &[
            entity("Rust", "memory-safe systems language", None),
            entity("Zig", "simple systems language", None),
            entity("C", "portable assembly", Some(kept.clone())),
        ],
    )
    .await;

    let report = backfill(&store)
        .with_batch_size(1)
        .run(BackfillScope::All)
        .await
        .unwrap();

    assert_eq!(
        report,
        BackfillReport {
            entities: 2,
            notes: 1,
            skipped: 0
        }
    );
    assert_eq!(
        stored_entity(&store, ids[0]).await.embedding,
        Some(mock_embedding("Rust - memory-safe systems language"))
    );
    assert_eq!(
        stored_entity(&store, ids[1]).await.embedding,
        Some(mock_embedding("Zig - simple systems language"))
    );
    assert_eq!(stored_entity(&store, ids[2]).await.embedding, Some(kept));

    let stored_note = NoteRepository::fetch(&store, note_id).await.unwrap().unwrap();
    assert_eq!(
        stored_note.embedding,
        Some(mock_embedding("Rust and Zig compete with C"))
    );

    let again = backfill(&store).run(BackfillScope::All).await.unwrap();
    assert_eq!(again, BackfillReport::default());
}

#[tokio::test]
async fn test_backfilled_entities_become_searchable() {
    let store = MemoryStore::new();
    let note_id = note(&store, "Languages", "Rust and Zig").await;
    save(&store, note_id, &[entity("Zig", "simple systems language", None)]).await;

    let search = SemanticSearch::new(
        Arc::new(store.clone()),
        Arc::new(MockEmbedding::deterministic()),
    );
    let request = SearchRequest::new("Zig - simple systems language").with_min_similarity(0.99);
    let before = search.search(&request).await.unwrap();
    assert_eq!(before.count, 0);

    backfill(&store).run(BackfillScope::Entities).await.unwrap();

    let after = search.search(&request).await.unwrap();
    match after.results {
        SearchResults::Entities(hits) => {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].entity.name, "Zig");
        }
        other => panic!("expected entity results, got {other:?}"),
    }
}

#[tokio::test]
async fn test_scope_limits_tables() {
    let store = MemoryStore::new();
    let note_id = note(&store, "n", "body").await;
    let ids = save(&store, note_id, &[entity("A", "first", None)]).await;

    let report = backfill(&store).run(BackfillScope::Notes).await.unwrap();
    assert_eq!(report.notes, 1);
    assert_eq!(report.entities, 0);
    assert!(stored_entity(&store, ids[0]).await.embedding.is_none());
}

/// Returns one vector short of what was asked for.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingBackend for ShortEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().skip(1).map(|t| mock_embedding(t)).collect())
    }

    fn dimension(&self) -> usize {
        1536
    }

    fn model_name(&self) -> &str {
        "short"
    }
}

#[tokio::test]
async fn test_vector_count_mismatch_writes_nothing() {
    let store = MemoryStore::new();
    let note_id = note(&store, "n", "body").await;
    let ids = save(
        &store,
        note_id,
        &[entity("A", "first", None), entity("B", "second", None)],
    )
    .await;

    let err = EmbeddingBackfill::new(Arc::new(store.clone()), Arc::new(ShortEmbedder))
        .run(BackfillScope::Entities)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Embedding(ref m) if m.contains("1 vectors for 2 texts")));
    for id in ids {
        assert!(stored_entity(&store, id).await.embedding.is_none());
    }
}

/// Deletes `doomed_note` just before the first entity write, as a concurrent
/// user delete would.
struct DeletedMidway {
    inner: MemoryStore,
    doomed_note: Uuid,
}

#[async_trait]
impl EmbeddingBackfillRepository for DeletedMidway {
    async fn entities_missing_embedding(&self, limit: i64) -> Result<Vec<Entity>> {
        self.inner.entities_missing_embedding(limit).await
    }

    async fn notes_missing_embedding(&self, limit: i64) -> Result<Vec<Note>> {
        self.inner.notes_missing_embedding(limit).await
    }

    async fn set_entity_embedding(&self, entity_id: Uuid, embedding: &Vector) -> Result<()> {
        if NoteRepository::fetch(&self.inner, self.doomed_note).await?.is_some() {
            self.inner.delete_note_cascade(self.doomed_note).await?;
        }
        self.inner.set_entity_embedding(entity_id, embedding).await
    }

    async fn set_note_embedding(&self, note_id: Uuid, embedding: &Vector) -> Result<()> {
        self.inner.set_note_embedding(note_id, embedding).await
    }
}

#[tokio::test]
async fn test_rows_deleted_during_backfill_are_skipped() {
    let store = MemoryStore::new();
    let doomed = note(&store, "doomed", "gone soon").await;
    let survivor = note(&store, "survivor", "stays").await;
    save(&store, doomed, &[entity("Lost", "deleted", None)]).await;
    let kept = save(&store, survivor, &[entity("Kept", "stays", None)]).await;

    let repo = DeletedMidway {
        inner: store.clone(),
        doomed_note: doomed,
    };
    let report = EmbeddingBackfill::new(Arc::new(repo), Arc::new(MockEmbedding::deterministic()))
        .run(BackfillScope::Entities)
        .await
        .unwrap();

    assert_eq!(report.entities, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        stored_entity(&store, kept[0]).await.embedding,
        Some(mock_embedding("Kept - stays"))
    );
}
