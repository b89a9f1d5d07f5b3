#[cfg(feature = "mcp")]
#[tokio::test]
#[ignore]
async fn show_and_describe_live() {
    use scylla_sql_metadata::config::EngineConfig;
    use scylla_sql_metadata::db::{connect, ScyllaCatalog, ScyllaConfig};
    use scylla_sql_metadata::engine::MetadataQueryEngine;
    use std::sync::Arc;

    if std::env::var("SCYLLA_URI").is_err() {
        eprintln!("SCYLLA_URI not set; skipping");
        return;
    }
    if std::env::var("SCYLLA_KEYSPACE").is_err() {
        std::env::set_var("SCYLLA_KEYSPACE", "system_schema");
    }
    let config = ScyllaConfig::from_env().expect("scylla config");
    let session = connect(&config).await.expect("connect failed");
    let catalog = ScyllaCatalog::new(session, config.keyspace.clone());
    assert_eq!(catalog.keyspace(), config.keyspace);
    let engine = MetadataQueryEngine::new(Arc::new(catalog), EngineConfig::default());

    let shown = engine.execute("SHOW TABLES LIKE %").await.expect("show failed");
    assert!(shown.size > 0);
    let first = shown.datarows[0].get(2).and_then(|c| c.as_str()).unwrap().to_string();

    let described = engine
        .execute(&format!("DESCRIBE TABLES LIKE '{}'", first))
        .await
        .expect("describe failed");
    assert!(described.size > 0);
    for row in &described.datarows {
        assert_eq!(row.get(1).and_then(|c| c.as_str()), Some(config.keyspace.as_str()));
        assert_eq!(row.get(2).and_then(|c| c.as_str()), Some(first.as_str()));
    }
}
