use std::sync::Arc;

use serde_json::json;
use tgfin_core::{Category, GroupId, Transaction, TxType};
use tgfin_ledger::{LoadOutcome, TransactionStore, summary};

fn tx(id: &str, tx_type: TxType, amount: f64) -> Transaction {
    Transaction {
        id: id.to_string(),
        timestamp: "2026-02-18T10:00:00+00:00".to_string(),
        group_id: GroupId::parse("-4884869527"),
        group_title: "Доходы".to_string(),
        amount,
        currency: "RUB".to_string(),
        tx_type,
        category: Category::Other,
        description: format!("запись {id}"),
        raw_text: Some(format!("Запись {id}")),
    }
}

#[tokio::test]
async fn test_merging_same_record_twice_keeps_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = TransactionStore::open(dir.path().join("transactions.json")).await;

    let first = store.merge(vec![tx("1", TxType::Income, 1000.0)]).await.unwrap();
    let second = store.merge(vec![tx("1", TxType::Income, 1000.0)]).await.unwrap();

    assert_eq!(first.added_income, 1);
    assert_eq!(second.added_income, 0);
    assert_eq!(second.skipped_duplicates, 1);

    let snap = store.snapshot().await;
    assert_eq!(snap.income.len(), 1);
    assert_eq!(snap.income[0].id, "1");
}

#[tokio::test]
async fn test_merge_is_idempotent_on_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = TransactionStore::open(dir.path().join("transactions.json")).await;
    let batch = vec![
        tx("1", TxType::Income, 1000.0),
        tx("2", TxType::Expense, 500.0),
        tx("3", TxType::Expense, 250.0),
    ];

    store.merge(batch.clone()).await.unwrap();
    let once = store.snapshot().await;
    store.merge(batch).await.unwrap();
    let twice = store.snapshot().await;

    assert_eq!(once.income, twice.income);
    assert_eq!(once.expense, twice.expense);
}

#[tokio::test]
async fn test_legacy_file_upgraded_to_canonical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    std::fs::write(
        &path,
        serde_json::to_vec(&json!([
            {"id": "1", "type": "income", "amount": 1000},
            {"id": "2", "type": "expense", "amount": 500}
        ]))
        .unwrap(),
    )
    .unwrap();

    let loaded = TransactionStore::load(&path).await;
    assert_eq!(loaded.outcome, LoadOutcome::UpgradedLegacy { dropped: 0 });

    let store = TransactionStore::open(&path).await;
    let snap = store.snapshot().await;
    assert_eq!(snap.income.len(), 1);
    assert_eq!(snap.income[0].id, "1");
    assert_eq!(snap.income[0].amount, 1000.0);
    assert_eq!(snap.expense.len(), 1);
    assert_eq!(snap.expense[0].id, "2");
    assert_eq!(snap.expense[0].amount, 500.0);

    // rewritten in canonical shape on first open
    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(on_disk.is_object());
    assert_eq!(on_disk["income"][0]["id"], "1");
    assert_eq!(on_disk["expense"][0]["id"], "2");
    assert!(on_disk["last_updated"].is_string());
    assert_eq!(TransactionStore::load(&path).await.outcome, LoadOutcome::Canonical);
}

#[tokio::test]
async fn test_persisted_state_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    let store = TransactionStore::open(&path).await;
    store
        .merge(vec![tx("10", TxType::Income, 50000.0), tx("11", TxType::Expense, 1500.0)])
        .await
        .unwrap();

    let written = store.snapshot().await;
    let reloaded = TransactionStore::load(&path).await;
    assert_eq!(reloaded.outcome, LoadOutcome::Canonical);
    assert!(!reloaded.needs_save);
    assert_eq!(&reloaded.state, written.as_ref());
}

#[tokio::test]
async fn test_corrupt_file_falls_back_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    std::fs::write(&path, b"{\"income\": [{\"id\": \"1\", \"amou").unwrap();

    let store = TransactionStore::open(&path).await;
    assert!(store.snapshot().await.is_empty());
    assert!(matches!(
        TransactionStore::load(&path).await.outcome,
        LoadOutcome::Recovered { .. }
    ));

    // the next write replaces the corrupt file
    store.merge(vec![tx("1", TxType::Expense, 5.0)]).await.unwrap();
    assert_eq!(TransactionStore::load(&path).await.outcome, LoadOutcome::Canonical);
}

#[tokio::test]
async fn test_concurrent_merges_never_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TransactionStore::open(dir.path().join("transactions.json")).await);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            // every worker tries the same ids plus one of its own
            let batch = vec![
                tx("shared-1", TxType::Expense, 1.0),
                tx("shared-2", TxType::Expense, 2.0),
                tx(&format!("own-{worker}"), TxType::Income, 3.0),
            ];
            store.merge(batch).await.unwrap()
        }));
    }
    let mut added = 0;
    for h in handles {
        added += h.await.unwrap().added();
    }

    let snap = store.snapshot().await;
    assert_eq!(added, 10);
    assert_eq!(snap.expense.len(), 2);
    assert_eq!(snap.income.len(), 8);
}

#[tokio::test]
async fn test_summary_matches_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let store = TransactionStore::open(dir.path().join("transactions.json")).await;
    store
        .merge(vec![
            tx("1", TxType::Income, 50000.0),
            tx("2", TxType::Income, 10000.0),
            tx("3", TxType::Expense, 1500.0),
        ])
        .await
        .unwrap();

    let snap = store.snapshot().await;
    let s = summary(&snap, None);
    assert_eq!(s.total_income, 60000.0);
    assert_eq!(s.total_expense, 1500.0);
    assert_eq!(s.balance, 58500.0);
    assert_eq!((s.income_count, s.expense_count, s.total_count), (2, 1, 3));
}
