use std::sync::Arc;

use collect_core::model::{AnswerRecord, CollectionProgress, PersonalityCode, SessionId};
use collect_core::time::fixed_now;
use storage::repository::{KeyValueSlot, Storage};
use storage::sqlite::SqliteRepository;
use storage::{PROGRESS_SLOT_KEY, ProgressStore};

fn record(phase: u32, question_number: u32, answer: &str) -> AnswerRecord {
    AnswerRecord {
        participant_name: "Mio".into(),
        phase,
        element_type: "Energy (I/E)".into(),
        cycle_number: 1,
        question_number_in_phase: question_number,
        question: format!("Q{question_number}"),
        answer: answer.into(),
        timestamp: fixed_now(),
        session_id: Some(SessionId::new("session-1")),
    }
}

#[tokio::test]
async fn sqlite_slot_overwrites_and_removes() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_slots?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // migrations are idempotent
    repo.migrate().await.expect("migrate twice");

    assert_eq!(repo.get("missing").await.unwrap(), None);

    repo.set("k", "first").await.unwrap();
    repo.set("k", "second").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("second"));

    repo.remove("k").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn progress_store_round_trips_through_sqlite() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    let store = ProgressStore::new(Arc::clone(&storage.slots));

    assert!(store.restore().await.is_none());

    let mut progress = CollectionProgress::new("Mio", Some(PersonalityCode::new("ENFP")));
    progress.current_phase = 2;
    progress.collected_data = (1..=10).map(|n| record(1, n, &format!("a{n}"))).collect();
    store.save(&progress).await.unwrap();

    let restored = store.restore().await.expect("restored");
    assert_eq!(restored, progress);
    let answers: Vec<_> = restored
        .collected_data
        .iter()
        .map(|r| r.answer.as_str())
        .collect();
    assert_eq!(answers.first(), Some(&"a1"));
    assert_eq!(answers.last(), Some(&"a10"));
}

#[tokio::test]
async fn corrupt_sqlite_blob_degrades_to_fresh_start() {
    let storage = Storage::sqlite("sqlite:file:memdb_corrupt?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    storage
        .slots
        .set(PROGRESS_SLOT_KEY, "[1, 2, 3]")
        .await
        .unwrap();

    let store = ProgressStore::new(Arc::clone(&storage.slots));
    assert!(store.restore().await.is_none());

    store.clear().await.unwrap();
    assert_eq!(storage.slots.get(PROGRESS_SLOT_KEY).await.unwrap(), None);
}
