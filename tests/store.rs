use std::sync::Arc;
use std::thread;

use biokb_loader::engine::MergeEngine;
use biokb_loader::row::{KeyValue, RowKey, TableRow, Value};
use biokb_loader::schema::TABLE_UNIPROT;
use biokb_loader::store::{MemoryStore, RelationalStore, RowWrite, SqliteStore};

fn uniprot_row(accession: &str, locus_tag: &str) -> TableRow {
    let mut row = TableRow::new();
    row.insert("uniprot_accession".to_string(), Value::text(accession));
    row.insert(
        "locus_tag".to_string(),
        Value::Array(vec![locus_tag.to_string()]),
    );
    row
}

fn locus_tags<S: RelationalStore>(store: &S, accession: &str) -> Vec<String> {
    let key = RowKey(vec![KeyValue::Text(accession.to_string())]);
    let mut stored = None;
    store
        .with_row(&TABLE_UNIPROT, &key, &mut |existing| {
            stored = existing.cloned();
            RowWrite::Keep
        })
        .unwrap();
    match stored.unwrap().remove("locus_tag") {
        Some(Value::Array(items)) => items,
        other => panic!("expected array column, found {other:?}"),
    }
}

/// Two concurrent upserts to the same key, each contributing a disjoint
/// array element, must both survive regardless of interleaving.
fn assert_no_lost_update<S: RelationalStore + 'static>(store: Arc<S>) {
    store.ensure_table(&TABLE_UNIPROT).unwrap();

    let workers: Vec<_> = ["Smlt0001", "Smlt0002"]
        .into_iter()
        .map(|tag| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let engine = MergeEngine::new(store.as_ref());
                engine
                    .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", tag)])
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut tags = locus_tags(store.as_ref(), "P69905");
    tags.sort();
    assert_eq!(tags, vec!["Smlt0001".to_string(), "Smlt0002".to_string()]);
}

#[test]
fn concurrent_same_key_upserts_memory() {
    assert_no_lost_update(Arc::new(MemoryStore::new()));
}

#[test]
fn concurrent_same_key_upserts_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("kb.sqlite")).unwrap();
    assert_no_lost_update(Arc::new(SqliteStore::open(&path).unwrap()));
}

#[test]
fn clear_table_empties_the_table() {
    let store = MemoryStore::new();
    store.ensure_table(&TABLE_UNIPROT).unwrap();
    let engine = MergeEngine::new(&store);
    engine
        .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", "Smlt0001")])
        .unwrap();
    assert_eq!(store.row_count(&TABLE_UNIPROT), 1);

    store.clear_table(&TABLE_UNIPROT).unwrap();
    assert_eq!(store.row_count(&TABLE_UNIPROT), 0);
}

#[test]
fn open_failure_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory is not a database file.
    let err = SqliteStore::open(
        &camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        biokb_loader::error::BiokbError::StoreConnection { .. }
    ));
}
