//! Postgres round trip. Skipped unless `GROVEKEEPER_TEST_PG_URL` points at a
//! disposable database; the tests drop and recreate the nursery tables.

use grovekeeper::{
    Dialect, Gateway, Job, LifecycleUpdateJob, NewTree, RemapRequest, Remapper, TreeRepository,
    ensure_schema,
};

async fn fresh_gateway() -> Option<Gateway> {
    let url = std::env::var("GROVEKEEPER_TEST_PG_URL").ok()?;
    let gateway = Gateway::from_url(&url).unwrap();
    assert_eq!(gateway.dialect(), Dialect::Postgres);

    let mut conn = gateway.connect().await.unwrap();
    conn.execute(
        "DROP TABLE IF EXISTS tree, dome, grid_settings, schedule_run CASCADE",
        &[],
    )
    .await
    .unwrap();
    ensure_schema(&mut conn).await.unwrap();
    assert!(ensure_schema(&mut conn).await.unwrap().is_unchanged());
    Some(gateway)
}

#[tokio::test]
async fn test_postgres_job_and_remap() {
    let Some(gateway) = fresh_gateway().await else {
        eprintln!("GROVEKEEPER_TEST_PG_URL not set, skipping");
        return;
    };
    let trees = TreeRepository::new(gateway.clone());
    let source = trees.create_dome("Source", 5, 5, None).await.unwrap();
    let target = trees.create_dome("Target", 5, 5, Some(1)).await.unwrap();

    let mother = trees
        .insert(&NewTree::new(source.id, "Mother", 0, 0).life_days(None))
        .await
        .unwrap();
    let cutting = trees
        .insert(
            &NewTree::new(source.id, "Cutting", 0, 1)
                .life_days(Some(5))
                .cutting_of(mother.id),
        )
        .await
        .unwrap();

    let rows = LifecycleUpdateJob::new(gateway.clone()).run().await.unwrap();
    assert_eq!(rows, 2);
    assert_eq!(
        trees.counters().await.unwrap(),
        vec![(mother.id, Some(1)), (cutting.id, Some(6))]
    );

    let sources = trees.list_in_dome(source.id).await.unwrap();
    let outcome = Remapper::new(gateway)
        .remap(&RemapRequest::new(sources, target.id))
        .await
        .unwrap();
    assert_eq!(outcome.created_count, 2);
    assert_eq!(outcome.preserved_relationships, 1);
    assert!(outcome.broken_relationships.is_empty());
}
