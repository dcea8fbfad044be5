//! Integration tests for the graph-integrity engine: downstream closures,
//! confirmation gating, sample pruning versus deletion, and the store-wide
//! reference scrub.

use anyhow::Result;
use labtrace_core::db::{DocumentStore, MemoryStore};
use labtrace_core::{
    Action, ActionView, Actor, ActorView, Analysis, AnalysisMethod, AnalysisMethodView,
    AnalysisView, CoreConfig, GraphNode, Material, MaterialView, Measurement, MeasurementView,
    OnConflict, Quantity, Sample, SampleView, ViewError,
};
use std::sync::Arc;

struct TestEnv {
    store: Arc<dyn DocumentStore>,
    actors: ActorView,
    methods: AnalysisMethodView,
    materials: MaterialView,
    actions: ActionView,
    measurements: MeasurementView,
    analyses: AnalysisView,
    samples: SampleView,
}

fn test_env() -> TestEnv {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = CoreConfig::default();
    TestEnv {
        actors: ActorView::new(Arc::clone(&store), config.clone()),
        methods: AnalysisMethodView::new(Arc::clone(&store), config.clone()),
        materials: MaterialView::new(Arc::clone(&store), config.clone()),
        actions: ActionView::new(Arc::clone(&store), config.clone()),
        measurements: MeasurementView::new(Arc::clone(&store), config.clone()),
        analyses: AnalysisView::new(Arc::clone(&store), config.clone()),
        samples: SampleView::new(Arc::clone(&store), config),
        store,
    }
}

struct Chain {
    m0: Material,
    grind: Action,
    m1: Material,
    xrd: Measurement,
    phases: Analysis,
    sample: Sample,
}

/// Persist the linear chain Material -> Action -> Material -> Measurement
/// -> Analysis, grouped into one sample.
async fn seed_chain(env: &TestEnv) -> Result<Chain> {
    let mut operator = Actor::new("Operator", "A human operator");
    env.actors.add(&mut operator, OnConflict::Raise).await?;
    let mut method = AnalysisMethod::new("Phase Identification", "XRD phase matching");
    env.methods.add(&mut method, OnConflict::Raise).await?;

    let mut m0 = Material::new("TiO2");
    let mut grind = Action::new("grind", &operator);
    grind.add_ingredient(&mut m0, Some(Quantity::new(1.0, "g")), None);
    let mut m1 = grind.make_generic_generated_material(None)?;
    let mut xrd = Measurement::new("XRD", &mut m1, &operator);
    let mut phases = Analysis::new("phases", &method);
    phases.add_measurement(&mut xrd);

    let mut sample = Sample::new("chain");
    sample.add_node(m0.clone());
    sample.add_node(grind.clone());
    sample.add_node(m1.clone());
    sample.add_node(xrd.clone());
    sample.add_node(phases.clone());
    env.samples.add(&mut sample, None, OnConflict::Raise).await?;

    Ok(Chain {
        m0,
        grind,
        m1,
        xrd,
        phases,
        sample,
    })
}

#[tokio::test]
async fn removal_plan_covers_the_downstream_closure() -> Result<()> {
    let env = test_env();
    let chain = seed_chain(&env).await?;

    let plan = env.materials.removal_plan(chain.m0.id()).await?;
    assert_eq!(plan.affected_nodes.len(), 4);
    let affected_ids: Vec<&str> = plan
        .affected_nodes
        .iter()
        .map(|r| r.node_id.as_str())
        .collect();
    for node_id in [
        chain.grind.id(),
        chain.m1.id(),
        chain.xrd.id(),
        chain.phases.id(),
    ] {
        assert!(affected_ids.contains(&node_id));
    }
    assert_eq!(plan.affected_samples, vec![chain.sample.id.clone()]);
    assert_eq!(plan.invalidated_samples, vec![chain.sample.id.clone()]);
    Ok(())
}

#[tokio::test]
async fn cascading_removal_requires_force() -> Result<()> {
    let env = test_env();
    let chain = seed_chain(&env).await?;

    let err = env
        .materials
        .remove(chain.m0.id(), false)
        .await
        .unwrap_err();
    let ViewError::ConfirmationRequired {
        affected_nodes,
        affected_samples,
        invalidated_samples,
    } = err
    else {
        panic!("expected confirmation gate, got {err}");
    };
    assert_eq!(affected_nodes, 4);
    assert_eq!(affected_samples, 1);
    assert_eq!(invalidated_samples, 1);

    // nothing was deleted
    assert!(env.materials.exists(chain.m0.id()).await?);
    assert!(env.samples.exists(&chain.sample.id).await?);
    Ok(())
}

#[tokio::test]
async fn forced_removal_deletes_the_whole_chain() -> Result<()> {
    let env = test_env();
    let chain = seed_chain(&env).await?;

    env.materials.remove(chain.m0.id(), true).await?;

    assert!(!env.materials.exists(chain.m0.id()).await?);
    assert!(!env.actions.exists(chain.grind.id()).await?);
    assert!(!env.materials.exists(chain.m1.id()).await?);
    assert!(!env.measurements.exists(chain.xrd.id()).await?);
    assert!(!env.analyses.exists(chain.phases.id()).await?);
    // the sample lost every node and was deleted with the chain
    assert!(!env.samples.exists(&chain.sample.id).await?);
    Ok(())
}

#[tokio::test]
async fn leaf_removal_prunes_surviving_sample_and_edges() -> Result<()> {
    let env = test_env();
    let chain = seed_chain(&env).await?;

    // the analysis is a leaf: no downstream closure, but the sample and
    // the measurement still reference it
    env.analyses.remove(chain.phases.id(), true).await?;

    assert!(!env.analyses.exists(chain.phases.id()).await?);
    let sample = env.samples.get_by_id(&chain.sample.id).await?;
    assert_eq!(sample.nodes().len(), 4);
    assert!(sample
        .nodes()
        .iter()
        .all(|node| node.id() != chain.phases.id()));

    // the measurement's dangling downstream edge was scrubbed store-wide
    let xrd = env.measurements.get_by_id(chain.xrd.id()).await?;
    assert!(xrd.core().downstream.is_empty());
    Ok(())
}

#[tokio::test]
async fn node_without_dependents_deletes_without_confirmation() -> Result<()> {
    let env = test_env();
    let mut operator = Actor::new("Operator", "A human operator");
    env.actors.add(&mut operator, OnConflict::Raise).await?;

    let mut lonely = Material::new("shelf stock");
    env.materials.add(&mut lonely, OnConflict::Raise).await?;

    env.materials.remove(lonely.id(), false).await?;
    assert!(!env.materials.exists(lonely.id()).await?);
    Ok(())
}

#[tokio::test]
async fn missing_target_is_noop_only_under_force() -> Result<()> {
    let env = test_env();
    env.materials.remove("no-such-id", true).await?;

    let err = env.materials.remove("no-such-id", false).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn resolution_of_a_deleted_neighbor_is_a_dangling_reference() -> Result<()> {
    let env = test_env();
    let chain = seed_chain(&env).await?;

    // delete the analysis document out from under the graph engine
    env.store
        .delete_one("analyses", chain.phases.id())
        .await?;

    let xrd = env.measurements.get_by_id(chain.xrd.id()).await?;
    let resolver = env.measurements.resolver();
    let err = xrd
        .core()
        .downstream
        .resolve(&resolver)
        .await
        .unwrap_err();
    assert!(matches!(err, ViewError::DanglingReference { .. }));
    Ok(())
}
