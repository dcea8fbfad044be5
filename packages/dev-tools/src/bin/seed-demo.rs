//! Seed a demonstration provenance graph into an in-memory store.
//!
//! Builds the classic grind → sinter → grind process chain with an XRD
//! measurement and a phase-identification analysis on top, then prints a
//! JSON summary of what was persisted. Useful as an executable tour of the
//! core API; run with `RUST_LOG=debug` to watch the view layer work.

use std::sync::Arc;

use anyhow::Result;
use labtrace_core::db::{DocumentStore, Filter, MemoryStore};
use labtrace_core::{
    Action, Actor, Analysis, AnalysisMethod, CoreConfig, GraphNode, Material, Measurement,
    OnConflict, Quantity, Sample,
};
use labtrace_core::{ActorView, AnalysisMethodView, MaterialView, SampleView};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = CoreConfig::from_env();

    let actors = ActorView::new(Arc::clone(&store), config.clone());
    let methods = AnalysisMethodView::new(Arc::clone(&store), config.clone());
    let materials = MaterialView::new(Arc::clone(&store), config.clone());
    let samples = SampleView::new(Arc::clone(&store), config.clone());

    // actors and analysis methods must exist before any node references them
    let mut labman = Actor::new(
        "LabMan",
        "A robotic system that weighs and mixes powders in crucibles.",
    )
    .with_tags(vec!["hardware".into()]);
    let mut furnace = Actor::new("TubeFurnace1", "A tube furnace in building 30-105.")
        .with_tags(vec!["hardware".into()]);
    let mut aeris = Actor::new("Aeris", "An x-ray diffractometer.").with_tags(vec![
        "hardware".into(),
    ]);
    let mut operator = Actor::new(
        "Operator",
        "A generic actor for any operation performed by a human.",
    );
    let mut phase_id = AnalysisMethod::new(
        "Phase Identification",
        "X-ray diffraction phase matching against reference patterns.",
    )
    .with_tags(vec!["x-ray".into(), "diffraction".into()]);

    for actor in [&mut labman, &mut furnace, &mut aeris, &mut operator] {
        actors.add(actor, OnConflict::Raise).await?;
    }
    methods.add(&mut phase_id, OnConflict::Raise).await?;

    // procurement: a material that exists because someone bought it
    let mut tio2 = Material::new("Titanium Dioxide");
    tio2.insert_content("formula", json!("TiO2"));
    let mut procure = Action::new("procurement", &operator);
    procure.add_generated_material(&mut tio2);

    let mut procurement_sample = Sample::new("procurement");
    procurement_sample.add_node(procure.clone());
    procurement_sample.add_node(tio2.clone());
    samples
        .add(&mut procurement_sample, None, OnConflict::Raise)
        .await?;

    // process chain: grind -> sinter -> grind, generic intermediates
    let mut grind = Action::new("grind", &operator);
    grind.add_ingredient(&mut tio2, Some(Quantity::new(0.3, "g")), None);
    let mut m1 = grind.make_generic_generated_material(None)?;

    let mut sinter = Action::new("sinter", &furnace);
    sinter.add_whole_ingredient(&mut m1, None);
    let mut m2 = sinter.make_generic_generated_material(None)?;

    let mut regrind = Action::new("grind", &operator);
    regrind.add_whole_ingredient(&mut m2, None);
    let mut m3 = regrind.make_generic_generated_material(None)?;

    let mut xrd = Measurement::new("XRD", &mut m3, &aeris);
    xrd.insert_content(
        "result",
        json!({"twotheta": [10, 20, 30, 40, 50], "intensity": [1, 2, 5, 2, 1]}),
    );
    let mut phases = Analysis::new("Phase Identification", &phase_id);
    phases.add_measurement(&mut xrd);
    phases.insert_content("result", json!({"phase": "anatase TiO2"}));

    let mut demo_sample = Sample::new("TiO2 demo")
        .with_description("grind, sinter and regrind a procured TiO2 powder");
    for node in [
        labtrace_core::AnyNode::from(grind),
        sinter.into(),
        regrind.into(),
        m1.into(),
        m2.into(),
        m3.clone().into(),
        xrd.into(),
        phases.into(),
    ] {
        demo_sample.add_node(node);
    }
    samples.add(&mut demo_sample, None, OnConflict::Raise).await?;

    // the procured material gained a downstream edge; write it back
    // (edge-only change, patched in place without a version snapshot)
    materials.add(&mut tio2, OnConflict::Update).await?;

    // read side: fetch the final material back and lazily resolve its
    // producing action through the edge list
    let fetched = materials
        .get_by_name(m3.name())
        .await?
        .into_iter()
        .next()
        .expect("final material was just persisted");
    let resolver = materials.resolver();
    let produced_by = fetched
        .core()
        .upstream
        .resolve_one(0, &resolver)
        .await?
        .name()
        .to_string();

    let plan = materials.removal_plan(tio2.id()).await?;
    let empty = Filter::new();
    let summary = json!({
        "actors": store.count("actors", &empty).await?,
        "analysis_methods": store.count("analysis_methods", &empty).await?,
        "materials": store.count("materials", &empty).await?,
        "actions": store.count("actions", &empty).await?,
        "measurements": store.count("measurements", &empty).await?,
        "analyses": store.count("analyses", &empty).await?,
        "samples": store.count("samples", &empty).await?,
        "final_material": fetched.name(),
        "final_material_produced_by": produced_by,
        "removing_tio2_would_affect": {
            "nodes": plan.affected_nodes.len(),
            "samples": plan.affected_samples.len(),
            "invalidated_samples": plan.invalidated_samples.len(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
