use chrono::{DateTime, Duration, TimeZone, Utc};
use jm_common::db::{MemoryStore, PostingStore};
use jm_common::ingest::{UpsertConfig, deactivate_stale, ingest_raw_postings, reclassify_pool};
use jm_common::taxonomy::{Category, FilteredReason};
use jm_common::{Posting, PostingStatus};
use serde_json::{Value, json};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn raw(title: &str, company: &str, location: &str, source: &str) -> Value {
    json!({
        "title": title,
        "company": company,
        "location": location,
        "description": format!("{title} role at {company}. Work with our analytics team on reporting."),
        "url": format!("https://{source}.example.com/jobs/{}", title.to_lowercase().replace(' ', "-")),
        "source": source,
    })
}

async fn only_posting(store: &MemoryStore) -> Posting {
    let postings = store.all_postings().await;
    assert_eq!(postings.len(), 1, "{postings:#?}");
    postings.into_iter().next().unwrap()
}

#[tokio::test]
async fn same_opening_from_two_sources_is_one_row_with_advanced_last_seen() {
    let store = MemoryStore::new();
    let config = UpsertConfig::default();
    let later = t0() + Duration::hours(8);

    let first = ingest_raw_postings(
        vec![raw("Graduate Analyst", "Acme", "London, GB", "board-a")],
        &store,
        &config,
        t0(),
    )
    .await;
    let second = ingest_raw_postings(
        vec![raw("Graduate Analyst", "Acme", "London, GB", "board-b")],
        &store,
        &config,
        later,
    )
    .await;

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    let stored = only_posting(&store).await;
    assert_eq!(stored.last_seen_at, later);
    assert_eq!(stored.created_at, t0());
    assert_eq!(stored.origin_source, "board-b");
}

#[tokio::test]
async fn equal_text_after_canonicalization_hashes_equal() {
    let store = MemoryStore::new();

    let report = ingest_raw_postings(
        vec![
            raw("Graduate Analyst", "Acme", "London, GB", "board-a"),
            raw("  graduate   ANALYST ", "ACME", "london", "board-b"),
        ],
        &store,
        &UpsertConfig::default(),
        t0(),
    )
    .await;

    assert_eq!(report.accepted, 2);
    assert_eq!(report.collapsed, 1);
    assert_eq!(store.count_postings().await.unwrap(), 1);
}

#[tokio::test]
async fn job_board_employer_is_deactivated_with_display_cleared() {
    let store = MemoryStore::new();

    let report = ingest_raw_postings(
        vec![raw("Graduate Analyst", "Reed Recruitment", "London, GB", "board-a")],
        &store,
        &UpsertConfig::default(),
        t0(),
    )
    .await;

    assert_eq!(report.filtered.get("job_board_as_company"), Some(&1));
    let stored = only_posting(&store).await;
    assert!(!stored.active);
    assert_eq!(stored.status(), PostingStatus::Inactive);
    assert_eq!(stored.filtered_reason, Some(FilteredReason::JobBoardAsCompany));
    assert_eq!(stored.employer_display, None);
    assert_eq!(stored.employer_raw, "Reed Recruitment");
}

#[tokio::test]
async fn profession_rules_respect_negative_terms() {
    let store = MemoryStore::new();

    ingest_raw_postings(
        vec![
            raw("Senior Construction Project Manager", "BuildCo", "Leeds", "board-a"),
            raw("Legal Counsel", "Lexcorp", "Dublin", "board-a"),
        ],
        &store,
        &UpsertConfig::default(),
        t0(),
    )
    .await;

    let postings = store.all_postings().await;
    let by_title = |title: &str| postings.iter().find(|p| p.title == title).unwrap();
    assert_eq!(by_title("Senior Construction Project Manager").filtered_reason, None);
    assert!(by_title("Senior Construction Project Manager").active);
    assert_eq!(by_title("Legal Counsel").filtered_reason, Some(FilteredReason::LegalRole));
}

#[tokio::test]
async fn invalid_records_are_reported_without_aborting() {
    let store = MemoryStore::new();
    let mut broken = raw("Data Analyst", "Acme", "Paris", "board-a");
    broken.as_object_mut().unwrap().remove("url");

    let report = ingest_raw_postings(
        vec![
            broken,
            json!("not an object"),
            raw("Data Analyst", "Acme", "Paris", "board-a"),
        ],
        &store,
        &UpsertConfig::default(),
        t0(),
    )
    .await;

    assert_eq!(report.received, 3);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].index, 0);
    assert_eq!(report.rejected[0].error.missing_fields(), &["url"]);
    assert_eq!(report.rejected[1].index, 1);
    assert_eq!(store.count_postings().await.unwrap(), 1);
}

#[tokio::test]
async fn submitting_a_batch_twice_keeps_the_row_count() {
    let store = MemoryStore::new();
    let batch: Vec<Value> = (0..12)
        .map(|i| raw(&format!("Analyst {i}"), "Acme", "Berlin", "board-a"))
        .collect();
    let config = UpsertConfig {
        chunk_size: 5,
        concurrency: 3,
        ..UpsertConfig::default()
    };

    ingest_raw_postings(batch.clone(), &store, &config, t0()).await;
    let count = store.count_postings().await.unwrap();
    let again = ingest_raw_postings(batch, &store, &config, t0() + Duration::hours(1)).await;

    assert_eq!(count, 12);
    assert_eq!(again.updated, 12);
    assert_eq!(store.count_postings().await.unwrap(), count);
}

#[tokio::test]
async fn reclassification_is_idempotent_and_monotonic() {
    let mut untagged = raw("Junior Financial Analyst", "Acme", "Madrid", "board-a");
    untagged["description"] =
        json!("Support budgeting, forecasting and financial reporting for the FP&A team.");
    let mut tagged = raw("Graduate Programme", "Globex", "Milan", "board-a");
    tagged["categories"] = json!(["Operations & Supply Chain"]);

    let store = MemoryStore::new();
    ingest_raw_postings(vec![untagged, tagged], &store, &UpsertConfig::default(), t0()).await;
    let before: Vec<Posting> = store.all_postings().await;

    let first = reclassify_pool(&store).await.unwrap();
    let second = reclassify_pool(&store).await.unwrap();
    let after: Vec<Posting> = store.all_postings().await;

    assert!(first.write_errors.is_empty());
    assert!(second.classification.is_empty(), "{:?}", second.classification);
    assert_eq!(second.saved, 0);
    for (old, new) in before.iter().zip(&after) {
        assert!(new.categories.is_superset(&old.categories));
        assert_eq!(new.last_seen_at, old.last_seen_at);
    }
    let globex = after.iter().find(|p| p.employer_raw == "Globex").unwrap();
    assert!(globex.categories.contains(&Category::OperationsSupplyChain));
}

#[tokio::test]
async fn stale_postings_are_deactivated_without_reason() {
    let store = MemoryStore::new();
    ingest_raw_postings(
        vec![raw("Old Analyst", "Acme", "Vienna", "board-a")],
        &store,
        &UpsertConfig::default(),
        t0(),
    )
    .await;
    ingest_raw_postings(
        vec![raw("New Analyst", "Acme", "Vienna", "board-a")],
        &store,
        &UpsertConfig::default(),
        t0() + Duration::days(40),
    )
    .await;

    let affected = deactivate_stale(&store, Duration::days(30), t0() + Duration::days(41))
        .await
        .unwrap();

    assert_eq!(affected, 1);
    let pool = store.load_active_pool().await.unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].title, "New Analyst");
    let old = store
        .all_postings()
        .await
        .into_iter()
        .find(|p| p.title == "Old Analyst")
        .unwrap();
    assert!(!old.active);
    assert_eq!(old.filtered_reason, None);
}
