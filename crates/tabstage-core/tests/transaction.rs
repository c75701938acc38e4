//! End-to-end read, stage and apply cycles through `TableSession`

use std::sync::Arc;

use tabstage_core::{
    ErrorKind, Field, ImportClass, MemoryStore, StoredTable, TableKey, TableSession, TableStore,
};

fn load_patterns() -> StoredTable {
    StoredTable::new(
        "Load Patterns",
        ImportClass::ImportableMerge,
        vec![
            Field::new("Name").key_field(),
            Field::new("Type"),
            Field::new("SelfWeightMultiplier").with_unit("unitless"),
        ],
    )
    .with_data_version(7)
    .with_rows([["DEAD", "Dead", "1.0"]])
}

fn frame_sections() -> StoredTable {
    StoredTable::new(
        "Frame Sections",
        ImportClass::ImportableClearAllFirst,
        vec![
            Field::new("Name").key_field(),
            Field::new("Material"),
            Field::new("Area").with_unit("in2").read_only(),
        ],
    )
    .with_rows([["W12X26", "A992", "7.65"], ["W14X30", "A992", "8.85"]])
}

fn setup() -> (Arc<MemoryStore>, TableSession<Arc<MemoryStore>>) {
    let store = Arc::new(
        MemoryStore::new()
            .with_table(load_patterns())
            .with_table(frame_sections())
            .with_table(
                StoredTable::new("Story Drifts", ImportClass::NotImportable, vec![Field::new("Story").read_only()])
                    .with_rows([["Roof"]]),
            ),
    );
    (store.clone(), TableSession::new(store))
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

#[test]
fn load_pattern_example_commits() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    let snapshot = session.get_for_editing(&key, None).unwrap();
    assert_eq!(snapshot.version, 7);
    assert_eq!(snapshot.field_keys, strings(&["Name", "Type", "SelfWeightMultiplier"]));
    assert_eq!(snapshot.rows, strings(&["DEAD", "Dead", "1.0"]));

    session
        .stage_edit(&key, 7, snapshot.field_keys.clone(), strings(&["DEAD", "Dead", "1.2"]))
        .unwrap();
    let outcomes = session.apply(false).unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].table_key, key);
    assert!(outcomes[0].committed);
    assert_eq!(outcomes[0].error_count, 0);

    // Re-read to confirm
    let after = session.get_for_editing(&key, None).unwrap();
    assert_eq!(after.cell(0, "SelfWeightMultiplier"), Some("1.2"));
    assert_eq!(Some(after.version), outcomes[0].version);
    assert_eq!(store.write_count(), 1);
}

#[test]
fn unchanged_round_trip_commits_cleanly_for_every_importable_table() {
    let (_, session) = setup();

    let importable: Vec<TableKey> = session
        .list_all_tables()
        .unwrap()
        .into_iter()
        .filter(|t| t.import_class.is_importable())
        .map(|t| t.key)
        .collect();
    assert_eq!(importable.len(), 2);

    for key in &importable {
        let snapshot = session.get_for_editing(key, None).unwrap();
        session
            .stage_edit(key, snapshot.version, snapshot.field_keys, snapshot.rows)
            .unwrap();
    }

    let outcomes = session.apply(true).unwrap();
    assert_eq!(outcomes.len(), importable.len());
    for outcome in &outcomes {
        assert!(outcome.committed, "{} was rejected", outcome.table_key);
        assert!(outcome.import_log.is_empty());
    }
}

#[test]
fn unchanged_round_trip_leaves_stored_rows_intact() {
    let (store, session) = setup();
    let tables = [TableKey::new("Load Patterns"), TableKey::new("Frame Sections")];
    let before: Vec<_> = tables.iter().map(|k| store.rows(k).unwrap()).collect();

    for key in &tables {
        let snapshot = session.get_for_editing(key, None).unwrap();
        session
            .stage_edit(key, snapshot.version, snapshot.field_keys, snapshot.rows)
            .unwrap();
    }
    let outcomes = session.apply(false).unwrap();
    assert!(outcomes.iter().all(|o| o.committed));

    let after: Vec<_> = tables.iter().map(|k| store.rows(k).unwrap()).collect();
    assert_eq!(after, before);
}

#[test]
fn read_only_key_field_still_round_trips() {
    let store = Arc::new(
        MemoryStore::new().with_table(
            StoredTable::new(
                "Load Cases",
                ImportClass::ImportableMerge,
                vec![
                    Field {
                        is_importable: false,
                        ..Field::new("Name").key_field()
                    },
                    Field::new("Type"),
                ],
            )
            .with_rows([["DEAD", "Linear Static"]]),
        ),
    );
    let session = TableSession::new(store.clone());
    let key = TableKey::new("Load Cases");

    let snapshot = session.get_for_editing(&key, None).unwrap();
    assert_eq!(snapshot.field_keys, strings(&["Name", "Type"]));

    session
        .stage_edit(&key, snapshot.version, snapshot.field_keys, strings(&["DEAD", "Modal"]))
        .unwrap();
    let outcomes = session.apply(false).unwrap();
    assert!(outcomes[0].committed);
    assert_eq!(store.rows(&key).unwrap()[0], strings(&["DEAD", "Modal"]));
}

#[test]
fn concurrent_change_is_a_version_conflict() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    let snapshot = session.get_for_editing(&key, None).unwrap();
    session
        .stage_edit(&key, snapshot.version, snapshot.field_keys, strings(&["DEAD", "Dead", "2.0"]))
        .unwrap();

    store.bump(&key).unwrap();
    let before = store.rows(&key).unwrap();

    let outcomes = session.apply(false).unwrap();
    assert!(!outcomes[0].committed);
    assert_eq!(outcomes[0].reason(), Some(ErrorKind::VersionConflict));
    assert_eq!(store.rows(&key).unwrap(), before);
    assert_eq!(store.write_count(), 0);
    assert!(session.pending().is_empty());
}

#[test]
fn cancel_discards_pending_edits() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    session
        .stage_edit(&key, 7, strings(&["Name", "Type"]), strings(&["DEAD", "Dead"]))
        .unwrap();
    session.cancel().unwrap();

    assert!(session.apply(false).unwrap().is_empty());
    assert_eq!(store.write_count(), 0);
}

#[test]
fn read_only_field_is_refused_at_stage_time() {
    let (_, session) = setup();
    let key = TableKey::new("Frame Sections");

    let importable = session.get_fields(&key).unwrap().importable_keys().len();
    assert_eq!(importable, 2);

    let err = session
        .stage_edit(&key, 1, strings(&["Name", "Area"]), strings(&["W12X26", "9.0"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FieldNotImportable);
    assert!(session.pending().is_empty());
}

#[test]
fn ragged_rows_are_refused_at_stage_time() {
    let (_, session) = setup();
    let err = session
        .stage_edit(
            &"Load Patterns".into(),
            7,
            strings(&["Name", "Type"]),
            strings(&["DEAD", "Dead", "LIVE"]),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedRows);
    assert!(session.pending().is_empty());
}

#[test]
fn read_only_table_cannot_be_read_for_editing() {
    let (_, session) = setup();
    let key = TableKey::new("Story Drifts");

    let err = session.get_for_editing(&key, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImportable);
    assert_eq!(session.get_for_display(&key, None, None).unwrap().row_count, 1);
}

#[test]
fn tables_commit_independently() {
    let (store, session) = setup();
    let a = TableKey::new("Frame Sections");
    let b = TableKey::new("Load Patterns");

    let snap_a = session.get_for_editing(&a, None).unwrap();
    let snap_b = session.get_for_editing(&b, None).unwrap();

    session
        .stage_edit(&a, snap_a.version, snap_a.field_keys, strings(&["W12X26", "A36", "W14X30", "A992"]))
        .unwrap();
    session
        .stage_edit(&b, snap_b.version, snap_b.field_keys, strings(&["DEAD", "Dead", "1.1"]))
        .unwrap();
    store.bump(&b).unwrap();

    let outcomes = session.apply(false).unwrap();
    assert_eq!(outcomes.len(), 2);

    let outcome_a = outcomes.iter().find(|o| o.table_key == a).unwrap();
    let outcome_b = outcomes.iter().find(|o| o.table_key == b).unwrap();
    assert!(outcome_a.committed);
    assert!(!outcome_b.committed);
    assert_eq!(outcome_b.reason(), Some(ErrorKind::VersionConflict));

    // Rows matched by key keep the read-only column the edit did not include
    let rows = store.rows(&a).unwrap();
    assert_eq!(rows[0], strings(&["W12X26", "A36", "7.65"]));
    assert!(session.pending().is_empty());
}

#[test]
fn schema_change_after_staging_rejects_the_edit() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    let snapshot = session.get_for_editing(&key, None).unwrap();
    session
        .stage_edit(&key, snapshot.version, snapshot.field_keys, snapshot.rows)
        .unwrap();

    store
        .alter_schema(&key, |fields| fields.push(Field::new("Notes")))
        .unwrap();

    let outcomes = session.apply(false).unwrap();
    assert!(!outcomes[0].committed);
    assert_eq!(outcomes[0].reason(), Some(ErrorKind::SchemaChanged));
    assert_eq!(store.data_version(&key).unwrap(), 7);
}

#[test]
fn field_losing_importability_is_caught_at_apply() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    session
        .stage_edit(&key, 7, strings(&["Name", "Type"]), strings(&["DEAD", "Live"]))
        .unwrap();
    store
        .alter_schema(&key, |fields| fields[1].is_importable = false)
        .unwrap();

    let outcomes = session.apply(false).unwrap();
    let kinds: Vec<ErrorKind> = outcomes[0].import_log.iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&ErrorKind::SchemaChanged));
    assert!(kinds.contains(&ErrorKind::FieldNotImportable));
    assert_eq!(outcomes[0].error_count, kinds.len());
}

#[test]
fn unreachable_store_fails_whole_catalog_read() {
    let (store, session) = setup();
    store.set_available(false);

    let err = session.list_available_tables().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(
        session.get_for_display(&"Load Patterns".into(), None, None).unwrap_err().kind(),
        ErrorKind::BackendUnavailable
    );
}

#[test]
fn unreachable_store_keeps_edits_for_a_later_apply() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");
    session
        .stage_edit(&key, 7, strings(&["Name", "Type"]), strings(&["DEAD", "Live"]))
        .unwrap();

    store.set_available(false);
    let err = session.apply(false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(session.pending(), vec![key.clone()]);

    store.set_available(true);
    assert!(session.apply(false).unwrap()[0].committed);
}

#[test]
fn restaging_replaces_the_prior_edit() {
    let (store, session) = setup();
    let key = TableKey::new("Load Patterns");

    session
        .stage_edit(&key, 7, strings(&["Name", "Type"]), strings(&["DEAD", "Wrong"]))
        .unwrap();
    session
        .stage_edit(&"LOAD PATTERNS".into(), 7, strings(&["Name", "Type"]), strings(&["DEAD", "Superdead"]))
        .unwrap();
    assert_eq!(session.pending().len(), 1);

    let outcomes = session.apply(false).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].committed);
    assert_eq!(store.rows(&key).unwrap()[0][1], "Superdead");
}
