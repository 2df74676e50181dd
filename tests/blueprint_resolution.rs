//! End-to-end blueprint resolution against candidate universes.

use covenant::{Blueprint, Contract, SequenceOptions, StructuralFilter};
use serde_json::{Value, json};

fn universe_with(raws: Vec<Value>) -> Contract {
    let mut universe = Contract::new(json!({ "type": "meta.universe" })).unwrap();
    let children = raws
        .into_iter()
        .map(|raw| Contract::new(raw).unwrap())
        .collect();
    universe.add_children(children).unwrap();
    universe
}

fn slugs_of(context: &Contract, contract_type: &str) -> Vec<String> {
    let mut slugs: Vec<String> = context
        .get_children_by_type(contract_type)
        .iter()
        .filter_map(|child| child.slug())
        .map(str::to_string)
        .collect();
    slugs.sort();
    slugs
}

#[test]
fn device_type_resolution_picks_only_the_required_architecture() {
    let universe = universe_with(vec![
        json!({
            "type": "hw.device-type",
            "slug": "raspberry-pi",
            "requires": [{ "type": "arch.sw", "slug": "armv7hf" }]
        }),
        json!({ "type": "arch.sw", "slug": "armv7hf" }),
        json!({ "type": "arch.sw", "slug": "amd64" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1, "arch.sw": "1+" }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    let context = &contexts[0];
    assert_eq!(context.contract_type(), "meta.context");
    assert_eq!(slugs_of(context, "hw.device-type"), vec!["raspberry-pi"]);
    assert_eq!(slugs_of(context, "arch.sw"), vec!["armv7hf"]);
}

#[test]
fn unconstrained_infinite_types_admit_every_candidate() {
    let universe = universe_with(vec![
        json!({ "type": "hw.device-type", "slug": "generic" }),
        json!({ "type": "arch.sw", "slug": "armv7hf" }),
        json!({ "type": "arch.sw", "slug": "amd64" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1, "arch.sw": "1+" }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(slugs_of(&contexts[0], "arch.sw"), vec!["amd64", "armv7hf"]);
}

#[test]
fn an_unsatisfiable_layout_yields_no_contexts() {
    let universe = universe_with(vec![json!({ "type": "arch.sw", "slug": "amd64" })]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1, "arch.sw": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();
    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert!(contexts.is_empty());
}

#[test]
fn optional_selectors_tolerate_an_empty_universe() {
    let universe = universe_with(vec![json!({ "type": "arch.sw", "slug": "amd64" })]);
    let blueprint = Blueprint::new(
        json!({ "arch.sw": 1, "hw.device-type": "?" }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();
    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert!(contexts[0].get_children_by_type("hw.device-type").is_empty());
    assert_eq!(slugs_of(&contexts[0], "arch.sw"), vec!["amd64"]);
}

#[test]
fn backtracking_recovers_where_the_greedy_walk_commits() {
    // a.os picks conflict with b.stack and c.ui picks so that the first
    // dimension increment is valid but leads to a dead end; only the
    // backtracking walk reaches the maximal pointer.
    let universe = universe_with(vec![
        json!({ "type": "a.os", "slug": "a0", "version": "1.0.0" }),
        json!({ "type": "a.os", "slug": "a1", "version": "2.0.0" }),
        json!({
            "type": "b.stack",
            "slug": "b0",
            "version": "1.0.0",
            "requires": [{ "not": [{ "type": "c.ui", "slug": "c1" }] }]
        }),
        json!({
            "type": "b.stack",
            "slug": "b1",
            "version": "2.0.0",
            "requires": [{
                "or": [
                    { "type": "a.os", "slug": "a0" },
                    { "type": "c.ui", "slug": "c1" }
                ]
            }]
        }),
        json!({ "type": "c.ui", "slug": "c0", "version": "1.0.0" }),
        json!({ "type": "c.ui", "slug": "c1", "version": "2.0.0" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "a.os": 1, "b.stack": 1, "c.ui": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();
    let strict = SequenceOptions {
        allow_requirements: false,
        ..SequenceOptions::default()
    };

    let full = blueprint.sequence(&universe, strict).unwrap();
    let maximal = full.last().expect("backtracking reaches the maximal pointer");
    assert_eq!(slugs_of(maximal, "a.os"), vec!["a1"]);
    assert_eq!(slugs_of(maximal, "b.stack"), vec!["b1"]);
    assert_eq!(slugs_of(maximal, "c.ui"), vec!["c1"]);

    let greedy = blueprint
        .sequence(
            &universe,
            SequenceOptions {
                compat_greedy: true,
                ..strict
            },
        )
        .unwrap();
    assert!(greedy.iter().all(|context| {
        slugs_of(context, "a.os") != vec!["a1"] || slugs_of(context, "b.stack") != vec!["b1"]
    }));
    assert!(greedy.len() < full.len());
}

#[test]
fn best_partial_path_is_retained_when_the_maximum_is_unreachable() {
    let universe = universe_with(vec![
        json!({ "type": "sw.os", "slug": "debian", "version": "1.0.0" }),
        json!({
            "type": "sw.os",
            "slug": "debian",
            "version": "2.0.0",
            "requires": [{ "type": "hw.feature", "slug": "tpm" }]
        }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "sw.os": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(
            &universe,
            SequenceOptions {
                allow_requirements: false,
                ..SequenceOptions::default()
            },
        )
        .unwrap();
    assert_eq!(contexts.len(), 1);
    let os = contexts[0].get_children_by_type("sw.os");
    assert_eq!(os[0].version(), Some("1.0.0"));
}

#[test]
fn open_requirements_are_attached_when_allowed() {
    let universe = universe_with(vec![json!({
        "type": "hw.device-type",
        "slug": "raspberry-pi",
        "requires": [{ "type": "sw.os", "slug": "debian" }]
    })]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    let requires = contexts[0].raw()["requires"].as_array().unwrap();
    assert_eq!(requires.len(), 1);
    assert_eq!(requires[0]["slug"], "debian");
}

#[test]
fn context_capabilities_are_the_union_of_child_capabilities() {
    let universe = universe_with(vec![
        json!({
            "type": "hw.device-type",
            "slug": "jetson",
            "capabilities": [
                { "type": "hw.feature", "slug": "gpu" },
                { "type": "hw.feature", "slug": "wifi" }
            ]
        }),
        json!({
            "type": "sw.os",
            "slug": "debian",
            "capabilities": [{ "type": "hw.feature", "slug": "wifi" }]
        }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1, "sw.os": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    let mut slugs: Vec<&str> = contexts[0]
        .capabilities()
        .iter()
        .filter_map(|capability| capability["slug"].as_str())
        .collect();
    slugs.sort();
    assert_eq!(slugs, vec!["gpu", "wifi"]);
}

#[test]
fn skeleton_templates_resolve_against_the_finished_context() {
    let universe = universe_with(vec![json!({ "type": "sw.os", "slug": "debian" })]);
    let blueprint = Blueprint::new(
        json!({ "sw.os": 1 }),
        json!({
            "type": "meta.context",
            "slug": "ctx",
            "name": "context for {{children.sw.os.slug}}"
        }),
    )
    .unwrap();

    let contexts = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].raw()["name"], "context for debian");
}

#[test]
fn version_constrained_selectors_narrow_the_candidates() {
    let universe = universe_with(vec![
        json!({ "type": "sw.os", "slug": "debian", "version": "9.0.0" }),
        json!({ "type": "sw.os", "slug": "debian", "version": "10.2.0" }),
        json!({ "type": "sw.os", "slug": "debian", "version": "11.0.0" }),
    ]);

    let ranged = Blueprint::new(
        json!({ "sw.os": { "cardinality": 1, "version": ">=10, <11" } }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();
    let contexts = ranged
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(
        contexts[0].get_children_by_type("sw.os")[0].version(),
        Some("10.2.0")
    );

    let latest = Blueprint::new(
        json!({ "sw.os": { "cardinality": 1, "version": "latest" } }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();
    let contexts = latest
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(
        contexts[0].get_children_by_type("sw.os")[0].version(),
        Some("11.0.0")
    );
}

#[test]
fn reproduce_enumerates_the_valid_cartesian_product() {
    let universe = universe_with(vec![
        json!({
            "type": "hw.device-type",
            "slug": "raspberry-pi",
            "requires": [{ "type": "arch.sw", "slug": "armv7hf" }]
        }),
        json!({ "type": "hw.device-type", "slug": "intel-nuc",
                "requires": [{ "type": "arch.sw", "slug": "amd64" }] }),
        json!({ "type": "arch.sw", "slug": "armv7hf" }),
        json!({ "type": "arch.sw", "slug": "amd64" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "hw.device-type": 1, "arch.sw": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .reproduce(&universe, SequenceOptions::default())
        .unwrap();
    // Cross-architecture pairings are pruned while the product is built.
    assert_eq!(contexts.len(), 2);
    for context in &contexts {
        let device = slugs_of(context, "hw.device-type");
        let arch = slugs_of(context, "arch.sw");
        if device == vec!["raspberry-pi"] {
            assert_eq!(arch, vec!["armv7hf"]);
        } else {
            assert_eq!(device, vec!["intel-nuc"]);
            assert_eq!(arch, vec!["amd64"]);
        }
    }
}

#[test]
fn reproduce_iteration_is_lazy() {
    let universe = universe_with(vec![
        json!({ "type": "sw.os", "slug": "debian" }),
        json!({ "type": "sw.os", "slug": "fedora" }),
        json!({ "type": "sw.os", "slug": "alpine" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "sw.os": 1 }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let mut iterator = blueprint
        .reproduce_iter(&universe, SequenceOptions::default())
        .unwrap();
    assert!(iterator.next().is_some());
    assert!(iterator.next().is_some());
    assert!(iterator.next().is_some());
    assert!(iterator.next().is_none());
}

#[test]
fn reproduce_with_cardinality_ranges_dedups_combinations_by_leading_member() {
    let universe = universe_with(vec![
        json!({ "type": "sw.service", "slug": "nginx" }),
        json!({ "type": "sw.service", "slug": "redis" }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "sw.service": [1, 2] }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let contexts = blueprint
        .reproduce(&universe, SequenceOptions::default())
        .unwrap();
    // {nginx} and {nginx, redis} share their leading member after the
    // version sort, so only the first survives; {redis} is distinct.
    let mut sizes: Vec<usize> = contexts
        .iter()
        .map(|context| context.get_children_by_type("sw.service").len())
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 1]);

    let mut leads: Vec<String> = contexts
        .iter()
        .map(|context| {
            context.get_children_by_type("sw.service")[0]
                .slug()
                .unwrap()
                .to_string()
        })
        .collect();
    leads.sort();
    assert_eq!(leads, vec!["nginx", "redis"]);
}

#[test]
fn structural_filters_delegate_to_the_collaborator() {
    struct DataFlagFilter;
    impl StructuralFilter for DataFlagFilter {
        fn matches(&self, schema: &Value, value: &Value) -> bool {
            value["data"]["flag"] == schema["const"]
        }
    }

    let universe = universe_with(vec![
        json!({ "type": "sw.os", "slug": "debian", "data": { "flag": true } }),
        json!({ "type": "sw.os", "slug": "fedora", "data": { "flag": false } }),
    ]);
    let blueprint = Blueprint::new(
        json!({ "sw.os": { "cardinality": 1, "filter": { "const": true } } }),
        json!({ "type": "meta.context" }),
    )
    .unwrap();

    let unfiltered = blueprint
        .sequence(&universe, SequenceOptions::default())
        .unwrap();
    assert!(unfiltered.is_empty());

    let contexts = blueprint
        .sequence(
            &universe,
            SequenceOptions {
                filter: Some(&DataFlagFilter),
                ..SequenceOptions::default()
            },
        )
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(slugs_of(&contexts[0], "sw.os"), vec!["debian"]);
}
