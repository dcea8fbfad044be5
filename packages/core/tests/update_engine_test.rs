//! Integration tests for the two-tier versioning update engine: edge-only
//! in-place patches, full version snapshots, edge monotonicity, and actor
//! lost-update protection.

use anyhow::Result;
use labtrace_core::db::{DocumentStore, MemoryStore};
use labtrace_core::{
    Action, ActionView, Actor, ActorView, CoreConfig, GraphNode, Material, MaterialView,
    Measurement, MeasurementView, NodeRef, NodeType, OnConflict, ViewError,
};
use serde_json::json;
use std::sync::Arc;

struct TestEnv {
    actors: ActorView,
    materials: MaterialView,
    actions: ActionView,
    measurements: MeasurementView,
}

fn test_env() -> TestEnv {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = CoreConfig::default();
    TestEnv {
        actors: ActorView::new(Arc::clone(&store), config.clone()),
        materials: MaterialView::new(Arc::clone(&store), config.clone()),
        actions: ActionView::new(Arc::clone(&store), config.clone()),
        measurements: MeasurementView::new(Arc::clone(&store), config),
    }
}

/// A persisted material generated by a procurement action.
async fn seed_material(env: &TestEnv) -> Result<(Actor, Material)> {
    let mut operator = Actor::new("Operator", "A human operator");
    env.actors.add(&mut operator, OnConflict::Raise).await?;

    let mut tio2 = Material::new("TiO2");
    let mut procure = Action::new("procurement", &operator);
    procure.add_generated_material(&mut tio2);
    env.materials.add(&mut tio2, OnConflict::Raise).await?;
    env.actions.add(&mut procure, OnConflict::Raise).await?;
    Ok((operator, tio2))
}

#[tokio::test]
async fn update_without_changes_writes_nothing() -> Result<()> {
    let env = test_env();
    let (_, mut tio2) = seed_material(&env).await?;

    env.materials.update(&mut tio2).await?;
    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert!(fetched.core().version_history.is_empty());
    Ok(())
}

#[tokio::test]
async fn edge_growth_patches_in_place_without_snapshot() -> Result<()> {
    let env = test_env();
    let (operator, mut tio2) = seed_material(&env).await?;

    // new downstream work arrives: a measurement on the stored material
    let mut xrd = Measurement::new("XRD", &mut tio2, &operator);
    env.materials.update(&mut tio2).await?;
    env.measurements.add(&mut xrd, OnConflict::Raise).await?;

    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert!(
        fetched.core().version_history.is_empty(),
        "pure edge growth must not create a version snapshot"
    );
    assert!(fetched.core().downstream.contains(&xrd.node_ref()));
    Ok(())
}

#[tokio::test]
async fn content_change_snapshots_the_prior_document() -> Result<()> {
    let env = test_env();
    let (_, mut tio2) = seed_material(&env).await?;

    tio2.insert_content("formula", json!("TiO2"));
    env.materials.update(&mut tio2).await?;

    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert_eq!(fetched.core().version_history.len(), 1);

    let snapshot = &fetched.core().version_history[0];
    assert_eq!(snapshot["name"], json!("TiO2"));
    // the prior state had no formula and no nested history
    assert_eq!(snapshot["contents"], json!({}));
    assert!(snapshot.get("version_history").is_none());

    // a second change appends exactly one more entry
    tio2.insert_content("supplier", json!("Sigma"));
    env.materials.update(&mut tio2).await?;
    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert_eq!(fetched.core().version_history.len(), 2);
    Ok(())
}

#[tokio::test]
async fn dropping_a_stored_edge_is_rejected_and_store_unchanged() -> Result<()> {
    let env = test_env();
    let (_, tio2) = seed_material(&env).await?;

    // a candidate that lost its upstream procurement edge
    let mut truncated = Material::new("TiO2");
    truncated.core_mut().id = tio2.id().to_string();

    let err = env.materials.update(&mut truncated).await.unwrap_err();
    assert!(matches!(err, ViewError::EdgeRemoval { .. }));

    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert_eq!(fetched.core().upstream.len(), 1);
    assert!(fetched.core().version_history.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_of_unsaved_node_is_not_found() -> Result<()> {
    let env = test_env();
    let mut stray = Material::new("stray");
    let err = env.materials.update(&mut stray).await.unwrap_err();
    assert!(err.is_not_found(), "no upsert-on-update");
    Ok(())
}

#[tokio::test]
async fn update_validates_edges_before_touching_the_store() -> Result<()> {
    let env = test_env();
    let (_, mut tio2) = seed_material(&env).await?;

    // a Material may not point at another Material
    tio2.core_mut()
        .downstream
        .append(NodeRef::new(NodeType::Material, "other"));
    let err = env.materials.update(&mut tio2).await.unwrap_err();
    assert!(matches!(err, ViewError::InvalidNode(_)));

    let fetched = env.materials.get_by_id(tio2.id()).await?;
    assert!(fetched.core().downstream.is_empty());
    Ok(())
}

#[tokio::test]
async fn stale_actor_update_is_rejected() -> Result<()> {
    let env = test_env();
    let mut furnace = Actor::new("TubeFurnace1", "tube furnace");
    env.actors.add(&mut furnace, OnConflict::Raise).await?;

    let mut stale = env.actors.get_by_id(furnace.id()).await?;

    furnace.new_version("Replaced heating element");
    env.actors.update(&mut furnace).await?;

    let err = env.actors.update(&mut stale).await.unwrap_err();
    assert!(matches!(err, ViewError::VersionConflict { .. }));

    // catching up makes the write acceptable again
    stale.new_version("Recalibrated");
    stale.new_version("Cleaned");
    env.actors.update(&mut stale).await?;
    let fetched = env.actors.get_by_id(furnace.id()).await?;
    assert_eq!(fetched.version(), 3);
    Ok(())
}
