mod common;

use std::collections::HashSet;
use std::sync::Arc;

use db_swapper::core::{ColumnInfo, Record, TableSchema, Value};
use db_swapper::sync::{RecordTransform, SyncJob};
use db_swapper::SyncError;

use common::*;

#[tokio::test]
async fn test_batches_of_300_over_1000_rows() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(1000)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let config = job_config(table_endpoint("people"), table_endpoint("people_copy"), 300);
    let job = bootstrap(config, &source, &target).await;
    let report = job.run_cycle().await.unwrap();

    assert_eq!(target.insert_sizes(), vec![300, 300, 300, 100]);
    assert_eq!(report.rows_extracted, 1000);
    assert_eq!(report.rows_inserted, 1000);
    assert_eq!(report.batches, 4);

    let rows = target.table("people_copy").unwrap().rows;
    assert_eq!(rows.len(), 1000);
    let ids: HashSet<i64> = rows
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, (1..=1000).collect::<HashSet<_>>());

    // First cycle: nothing to back up, temp name vacated.
    assert!(!target.has_table("people_copy_backup"));
    assert!(!target.has_table("people_copy_temp"));
}

#[tokio::test]
async fn test_exact_multiple_stops_on_total() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(600)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 300);
    let job = bootstrap(config, &source, &target).await;
    job.run_cycle().await.unwrap();

    assert_eq!(target.insert_sizes(), vec![300, 300]);
    assert_eq!(source.count_calls("get_batch"), 2);
}

#[tokio::test]
async fn test_consecutive_cycles_are_idempotent() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(250)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 100);
    let job = bootstrap(config, &source, &target).await;

    job.run_cycle().await.unwrap();
    let first = sorted_by_id(target.table("people").unwrap().rows);
    job.run_cycle().await.unwrap();
    let second = sorted_by_id(target.table("people").unwrap().rows);

    assert_eq!(first.len(), 250);
    assert_eq!(first, second);

    // The previous generation is kept as the backup.
    let backup = sorted_by_id(target.table("people_backup").unwrap().rows);
    assert_eq!(backup, first);
}

#[tokio::test]
async fn test_insert_failure_leaves_live_table_untouched() {
    let old = people(3);
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(1000)));
    let target = Arc::new(MemoryConnector::new("dst").with_table("people", people_schema(), old.clone()));
    target.fail_insert_on(2);

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 300);
    let job = bootstrap(config, &source, &target).await;
    let err = job.run_cycle().await.unwrap_err();

    assert!(matches!(err, SyncError::Insertion { .. }), "got {:?}", err);
    assert_eq!(target.table("people").unwrap().rows, old);
    assert!(!target.has_table("people_temp"));
    assert_eq!(target.count_calls("swap_tables"), 0);
}

#[tokio::test]
async fn test_extraction_failure_drops_temp_table() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(10)));
    let target = Arc::new(MemoryConnector::new("dst"));
    source.fail_get_batch();

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 5);
    let job = bootstrap(config, &source, &target).await;
    let err = job.run_cycle().await.unwrap_err();

    assert!(matches!(err, SyncError::Extraction { .. }), "got {:?}", err);
    assert!(!target.has_table("people_temp"));
    assert!(!target.has_table("people"));
}

#[tokio::test]
async fn test_swap_failure_keeps_temp_table() {
    let old = people(2);
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(5)));
    let target = Arc::new(MemoryConnector::new("dst").with_table("people", people_schema(), old.clone()));
    target.fail_swap();

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 10);
    let job = bootstrap(config, &source, &target).await;
    let err = job.run_cycle().await.unwrap_err();

    assert!(matches!(err, SyncError::Swap { .. }), "got {:?}", err);
    assert_eq!(target.table("people_temp").unwrap().rows.len(), 5);
    assert_eq!(target.table("people").unwrap().rows, old);
    assert_eq!(target.count_calls("drop_table"), 0);
}

#[tokio::test]
async fn test_cleanup_and_procedure_failures_are_not_fatal() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(5)));
    let target = Arc::new(MemoryConnector::new("dst"));
    target.fail_drop();
    target.fail_procedure("refresh_stats");

    let mut config = job_config(table_endpoint("people"), table_endpoint("people"), 10);
    config.post_procedures = vec![procedure("refresh_stats"), procedure("notify")];
    let job = bootstrap(config, &source, &target).await;
    let report = job.run_cycle().await.unwrap();

    assert_eq!(report.procedures_failed, 1);
    assert_eq!(target.table("people").unwrap().rows.len(), 5);

    let calls: Vec<String> = target
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("execute_procedure"))
        .collect();
    assert_eq!(
        calls,
        vec![
            "execute_procedure(refresh_stats,1)".to_string(),
            "execute_procedure(notify,1)".to_string()
        ]
    );
}

fn phones_source() -> TableSchema {
    TableSchema::new(vec![
        ColumnInfo::new("VENDOR_NAME", "varchar(64)"),
        ColumnInfo::new("MODEL_NAME", "varchar(64)"),
        ColumnInfo::new("TAC", "varchar(8)"),
    ])
    .with_primary_key("TAC")
}

fn phones_target() -> TableSchema {
    TableSchema::new(vec![
        ColumnInfo::new("vendorName", "text"),
        ColumnInfo::new("modelName", "text"),
        ColumnInfo::new("tac", "text"),
    ])
    .with_primary_key("tac")
}

#[tokio::test]
async fn test_model_phones_columns_match_by_normalization() {
    let rows = vec![record([
        ("VENDOR_NAME", "Acme"),
        ("MODEL_NAME", "X1"),
        ("TAC", "35123456"),
    ])];
    let source = Arc::new(MemoryConnector::new("src").with_table("phones", phones_source(), rows));
    let target = Arc::new(MemoryConnector::new("dst").with_table("phones", phones_target(), vec![]));

    let config = job_config(table_endpoint("phones"), table_endpoint("phones"), 100);
    let job = bootstrap(config, &source, &target).await;
    job.run_cycle().await.unwrap();

    let live = target.table("phones").unwrap().rows;
    assert_eq!(live.len(), 1);
    let row = &live[0];
    let keys: HashSet<&str> = row.keys().map(String::as_str).collect();
    assert_eq!(keys, HashSet::from(["vendorName", "modelName", "tac"]));
    assert_eq!(row["vendorName"], Value::from("Acme"));
    assert_eq!(row["modelName"], Value::from("X1"));
    assert_eq!(row["tac"], Value::from("35123456"));
}

#[tokio::test]
async fn test_transform_runs_after_mapping() {
    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(3)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let transform: Arc<dyn RecordTransform> = Arc::new(|mut r: Record| {
        if let Some(Value::Text(name)) = r.get_mut("name") {
            *name = name.to_uppercase();
        }
        r
    });
    let config = job_config(table_endpoint("people"), table_endpoint("people"), 100);
    let job = SyncJob::bootstrap(config, source.clone(), target.clone(), transform)
        .await
        .unwrap();
    job.run_cycle().await.unwrap();

    let live = sorted_by_id(target.table("people").unwrap().rows);
    assert_eq!(live[0]["name"], Value::from("PERSON 1"));
    assert_eq!(live[2]["name"], Value::from("PERSON 3"));
}

#[tokio::test]
async fn test_query_source_is_preloaded_once() {
    let query = "SELECT id, name FROM people WHERE active = ?";
    let source = Arc::new(MemoryConnector::new("src").with_query(query, people_schema(), people(7)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let source_endpoint = db_swapper::EndpointConfig {
        query: Some(query.to_string()),
        params: vec![Value::Bool(true)],
        ..Default::default()
    };
    let config = job_config(source_endpoint, table_endpoint("active_people"), 3);
    let job = bootstrap(config, &source, &target).await;
    assert_eq!(job.processor().preloaded_len(), Some(7));

    job.run_cycle().await.unwrap();
    job.run_cycle().await.unwrap();

    assert_eq!(source.count_calls("execute_select_with_schema"), 1);
    let preloads = source.calls().iter().filter(|c| *c == "execute_select").count();
    assert_eq!(preloads, 1);
    assert_eq!(source.count_calls("get_batch"), 0);
    assert_eq!(target.insert_sizes(), vec![3, 3, 1, 3, 3, 1]);
    assert_eq!(target.table("active_people").unwrap().rows.len(), 7);
}

#[tokio::test]
async fn test_source_table_without_primary_key_fails_bootstrap() {
    let schema = TableSchema::new(vec![ColumnInfo::new("name", "text")]);
    let source = Arc::new(MemoryConnector::new("src").with_table("logs", schema, vec![]));
    let target = Arc::new(MemoryConnector::new("dst"));

    let config = job_config(table_endpoint("logs"), table_endpoint("logs"), 10);
    let err = SyncJob::bootstrap(config, source, target, Arc::new(db_swapper::sync::Identity))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaResolution(_)));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_configured_primary_key_overrides_introspection() {
    let schema = TableSchema::new(vec![ColumnInfo::new("id", "int"), ColumnInfo::new("name", "text")]);
    let source = Arc::new(MemoryConnector::new("src").with_table("logs", schema, people(4)));
    let target = Arc::new(MemoryConnector::new("dst"));

    let mut source_endpoint = table_endpoint("logs");
    source_endpoint.primary_key = Some("id".to_string());
    let config = job_config(source_endpoint, table_endpoint("logs"), 10);
    let job = bootstrap(config, &source, &target).await;

    assert_eq!(job.source_schema().primary_key, "id");
    job.run_cycle().await.unwrap();
    assert_eq!(target.table("logs").unwrap().rows.len(), 4);
}

#[tokio::test]
async fn test_autoincrement_target_columns_are_not_inserted() {
    let mut id = ColumnInfo::new("id", "bigint");
    id.auto_increment = true;
    let target_schema =
        TableSchema::new(vec![id, ColumnInfo::new("name", "text")]).with_primary_key("id");

    let source = Arc::new(MemoryConnector::new("src").with_table("people", people_schema(), people(2)));
    let target = Arc::new(MemoryConnector::new("dst").with_table("people", target_schema, vec![]));

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 10);
    let job = bootstrap(config, &source, &target).await;
    assert_eq!(job.processor().target_columns(), &["name".to_string()]);

    job.run_cycle().await.unwrap();
    let rows = target.table("people").unwrap().rows;
    assert!(rows.iter().all(|r| !r.contains_key("id")));
}

#[tokio::test]
async fn test_missing_target_across_engines_needs_columns() {
    let source = Arc::new(
        MemoryConnector::new("src")
            .with_db_type("mariadb")
            .with_table("people", people_schema(), people(3)),
    );
    let target = Arc::new(MemoryConnector::new("dst").with_db_type("postgres"));

    let config = job_config(table_endpoint("people"), table_endpoint("people"), 10);
    let err = SyncJob::bootstrap(config, source, target.clone(), Arc::new(db_swapper::sync::Identity))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SchemaResolution(_)), "got {:?}", err);
    assert!(err.to_string().contains("target.columns"));
    assert_eq!(target.count_calls("create_temp_table"), 0);
}

#[tokio::test]
async fn test_configured_target_columns_work_across_engines() {
    let source = Arc::new(
        MemoryConnector::new("src")
            .with_db_type("mariadb")
            .with_table("people", people_schema(), people(3)),
    );
    let target = Arc::new(MemoryConnector::new("dst").with_db_type("postgres"));

    let mut target_endpoint = table_endpoint("people");
    target_endpoint.columns = vec![ColumnInfo::new("id", "bigint"), ColumnInfo::new("name", "text")];
    let config = job_config(table_endpoint("people"), target_endpoint, 10);
    let job = bootstrap(config, &source, &target).await;
    job.run_cycle().await.unwrap();

    let live = target.table("people").unwrap();
    assert_eq!(live.rows.len(), 3);
    assert_eq!(live.schema.columns[1].data_type, "text");
}
