//! Cloning trees between domes against a real SQLite database.


use grovekeeper::remap::PasteMetadata;
use grovekeeper::{
    BrokenRelationship, ControlSurface, NewTree, PlantType, RemapError, RemapRequest, Remapper,
    Scheduler, Trigger,
};
use std::time::Duration;
use test_utils::{FakeJob, TestDb};

#[tokio::test]
async fn test_links_preserved_and_broken() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;

    let outside = db.plant(NewTree::new(source.id, "Old mother", 4, 4)).await;
    let mother = db
        .plant(NewTree::new(source.id, "Mother", 0, 0).life_days(Some(40)))
        .await;
    let cutting = db
        .plant(NewTree::new(source.id, "Cutting", 0, 1).cutting_of(mother.id))
        .await;
    let orphan = db
        .plant(NewTree::new(source.id, "Orphan", 1, 0).cutting_of(outside.id))
        .await;

    // Child listed before its mother on purpose.
    let request = RemapRequest::new(
        vec![cutting.clone(), mother.clone(), orphan.clone()],
        target.id,
    );
    let outcome = Remapper::new(db.gateway.clone())
        .remap(&request)
        .await
        .unwrap();

    assert_eq!(outcome.created_count, 3);
    assert_eq!(outcome.preserved_relationships, 1);

    let [new_cutting, new_mother, new_orphan] = &outcome.created[..] else {
        panic!("expected three clones");
    };
    assert_eq!(
        outcome.broken_relationships,
        vec![BrokenRelationship {
            new_id: new_orphan.id,
            missing_original_parent_id: outside.id,
        }]
    );

    let stored = db.trees().list_in_dome(target.id).await.unwrap();
    assert_eq!(stored.len(), 3);

    let stored_cutting = db.trees().get(new_cutting.id).await.unwrap().unwrap();
    assert_eq!(stored_cutting.mother_plant_id, Some(new_mother.id));
    assert_eq!(stored_cutting.plant_type, PlantType::Cutting);

    let stored_orphan = db.trees().get(new_orphan.id).await.unwrap().unwrap();
    assert_eq!(stored_orphan.mother_plant_id, None);
    assert_eq!(stored_orphan.plant_type, PlantType::Cutting);

    let stored_mother = db.trees().get(new_mother.id).await.unwrap().unwrap();
    assert_eq!(stored_mother.life_days, Some(40));
    assert_eq!(stored_mother.name, "Mother");

    let metadata = PasteMetadata::from_tree(&stored_cutting).unwrap();
    assert_eq!(metadata.paste_id, outcome.paste_id);
    assert_eq!(metadata.original_tree_id, cutting.id);
    assert_eq!(metadata.original_mother_id, Some(mother.id));
    assert!(metadata.relationship_preserved);

    // Sources are untouched.
    assert_eq!(db.trees().get(cutting.id).await.unwrap().unwrap(), cutting);
    assert_eq!(db.trees().list_in_dome(source.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_occupied_cell_rolls_back_everything() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;

    let mother = db.plant(NewTree::new(source.id, "Mother", 0, 0)).await;
    let cutting = db
        .plant(NewTree::new(source.id, "Cutting", 0, 1).cutting_of(mother.id))
        .await;
    db.plant(NewTree::new(target.id, "Squatter", 0, 1)).await;

    let err = Remapper::new(db.gateway.clone())
        .remap(&RemapRequest::new(vec![mother, cutting], target.id))
        .await
        .unwrap_err();

    assert!(matches!(err, RemapError::Constraint(_)), "{err:?}");
    let remaining = db.trees().list_in_dome(target.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Squatter");
}

#[tokio::test]
async fn test_missing_destination_dome() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let tree = db.plant(NewTree::new(source.id, "Fig", 0, 0)).await;

    let err = Remapper::new(db.gateway.clone())
        .remap(&RemapRequest::new(vec![tree], 9999))
        .await
        .unwrap_err();

    assert!(matches!(err, RemapError::Constraint(_)), "{err:?}");
    assert_eq!(db.trees().counters().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_offset_paste() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;
    let tree = db.plant(NewTree::new(source.id, "Fig", 1, 1)).await;

    let outcome = Remapper::new(db.gateway.clone())
        .remap(&RemapRequest::new(vec![tree], target.id).offset(2, 3))
        .await
        .unwrap();

    let clone = &outcome.created[0];
    assert_eq!((clone.internal_row, clone.internal_col), (3, 4));
    assert_eq!(clone.dome_id, target.id);
}

#[tokio::test]
async fn test_offset_outside_grid_rolls_back() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;
    let inside = db.plant(NewTree::new(source.id, "Inside", 0, 0)).await;
    let corner = db.plant(NewTree::new(source.id, "Corner", 4, 4)).await;

    let remapper = Remapper::new(db.gateway.clone());
    for (rows, cols) in [(10, -20), (0, 1), (-1, 0)] {
        let request =
            RemapRequest::new(vec![inside.clone(), corner.clone()], target.id).offset(rows, cols);
        let err = remapper.remap(&request).await.unwrap_err();

        assert!(matches!(err, RemapError::Constraint(_)), "{err:?}");
        assert!(err.to_string().contains("(5x5)"), "{err}");
    }

    assert!(db.trees().list_in_dome(target.id).await.unwrap().is_empty());
    assert_eq!(db.trees().list_in_dome(source.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_null_counter_cloned_as_zero() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;
    let legacy = db
        .plant(NewTree::new(source.id, "Legacy", 0, 0).life_days(None))
        .await;

    let outcome = Remapper::new(db.gateway.clone())
        .remap(&RemapRequest::new(vec![legacy], target.id))
        .await
        .unwrap();

    let stored = db.trees().get(outcome.created[0].id).await.unwrap().unwrap();
    assert_eq!(stored.life_days, Some(0));
}

#[tokio::test]
async fn test_remap_through_control_surface() {
    let db = TestDb::new().await;
    let source = db.dome("Source").await;
    let target = db.dome("Target").await;
    let tree = db.plant(NewTree::new(source.id, "Fig", 0, 0)).await;

    let scheduler = Scheduler::new(
        FakeJob::new(),
        Trigger::every(Duration::from_secs(3600)).unwrap(),
    );
    let control =
        ControlSurface::new(scheduler.clone()).with_remapper(Remapper::new(db.gateway.clone()));

    let response = control
        .remap(&RemapRequest::new(vec![tree.clone()], target.id))
        .await
        .to_json();
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["created_count"], 1);
    assert_eq!(response["data"]["preserved_relationships"], 0);

    let response = control
        .remap(&RemapRequest::new(vec![tree.clone(), tree], target.id))
        .await
        .to_json();
    assert_eq!(response["success"], false);
    assert!(
        response["error"]
            .as_str()
            .unwrap()
            .contains("more than once")
    );

    let unconfigured = ControlSurface::new(scheduler)
        .remap(&RemapRequest::new(Vec::new(), target.id))
        .await;
    assert!(!unconfigured.success);
}
