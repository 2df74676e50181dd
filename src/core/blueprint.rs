//! Blueprint: combinatorial layout resolution over a contract universe.
//!
//! A blueprint declares, per contract type, how many candidates a composite
//! context must pick (a `Cardinality`), optionally narrowed by a structural
//! filter and a version constraint, plus a `skeleton` raw document that
//! seeds every produced context. Selectors with a concrete upper bound form
//! the *finite* group and become dimensions of the combination search;
//! unbounded selectors form the *infinite* group and are resolved by
//! cross-referencing the requirements of already-chosen finite candidates
//! back into the universe.
//!
//! `sequence` walks the finite dimension space depth-first towards the
//! maximal pointer and retains the best path of valid contexts; `reproduce`
//! exhaustively (and lazily) enumerates the whole cartesian product.

use crate::core::cardinality::Cardinality;
use crate::core::contract::{Contract, combinations_of, version_constraint_matches};
use crate::core::error::{CovenantError, Result};
use crate::core::hash::hash_object;
use crate::core::version;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use tracing::{debug, trace};

/// The schema-validation collaborator applied when a layout selector
/// declares a `filter`. The engine never interprets filter schemas itself.
pub trait StructuralFilter {
    fn matches(&self, schema: &Value, value: &Value) -> bool;
}

/// One layout entry: pick `cardinality` contracts of `contract_type`,
/// narrowed by an optional structural filter and version constraint
/// (`latest`, a semver range, or an exact version).
#[derive(Debug, Clone)]
pub struct Selector {
    pub contract_type: String,
    pub cardinality: Cardinality,
    pub filter: Option<Value>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct LayoutGroup {
    /// Distinct selector types, in declaration order.
    types: Vec<String>,
    selectors: Vec<Selector>,
}

impl LayoutGroup {
    fn push(&mut self, selector: Selector) {
        if !self.types.contains(&selector.contract_type) {
            self.types.push(selector.contract_type.clone());
        }
        self.selectors.push(selector);
    }
}

/// Per-type classification of selectors into finite and infinite groups.
#[derive(Debug, Clone, Default)]
struct Layout {
    finite: LayoutGroup,
    infinite: LayoutGroup,
}

/// Resolution options shared by `sequence` and `reproduce`.
#[derive(Clone, Copy)]
pub struct SequenceOptions<'a> {
    /// When a built context still has unmet requirements, attach them to the
    /// context's `requires` instead of rejecting it.
    pub allow_requirements: bool,
    /// Reproduce the legacy greedy walk: commit to the first valid dimension
    /// increment at each depth and never reconsider siblings. The default is
    /// a true backtracking search.
    pub compat_greedy: bool,
    /// Structural-filter collaborator; a selector with a `filter` matches
    /// nothing without one.
    pub filter: Option<&'a dyn StructuralFilter>,
}

impl Default for SequenceOptions<'_> {
    fn default() -> Self {
        Self {
            allow_requirements: true,
            compat_greedy: false,
            filter: None,
        }
    }
}

/// A contract subtype owning a parsed cardinality layout and a skeleton raw
/// document for seeding contexts.
#[derive(Debug, Clone)]
pub struct Blueprint {
    contract: Contract,
    layout: Layout,
    skeleton: Value,
}

impl Blueprint {
    /// Builds a blueprint from a layout document and a context skeleton.
    pub fn new(layout: Value, skeleton: Value) -> Result<Self> {
        Self::from_raw(json!({
            "type": "meta.blueprint",
            "layout": layout,
            "skeleton": skeleton,
        }))
    }

    /// Builds a blueprint from a full raw document holding `layout` and
    /// `skeleton` fields.
    pub fn from_raw(raw: Value) -> Result<Self> {
        let layout_value = raw.get("layout").cloned().ok_or_else(|| {
            CovenantError::InvalidContract("blueprint requires a `layout`".to_string())
        })?;
        let layout = Self::parse_layout(&layout_value)?;

        let mut skeleton = raw
            .get("skeleton")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if !skeleton.is_object() {
            return Err(CovenantError::InvalidContract(
                "blueprint skeleton must be an object".to_string(),
            ));
        }
        let skeleton_map = skeleton
            .as_object_mut()
            .expect("skeleton is checked to be an object");
        if !skeleton_map.contains_key("type") {
            skeleton_map.insert("type".to_string(), json!("meta.context"));
        }

        // The blueprint's own raw is not interpolated: skeleton templates
        // must survive verbatim until a context resolves them.
        let contract = Contract::new_uninterpolated(raw)?;
        Ok(Self {
            contract,
            layout,
            skeleton,
        })
    }

    fn parse_layout(layout: &Value) -> Result<Layout> {
        let Some(entries) = layout.as_object() else {
            return Err(CovenantError::InvalidContract(format!(
                "blueprint layout must be an object, got {layout}"
            )));
        };
        let mut parsed = Layout::default();
        for (contract_type, spec) in entries {
            let specs: Vec<&Value> = match spec.as_array() {
                // A two-element cardinality pair is itself a valid spec;
                // an array of objects lists several selectors per type.
                Some(list) if list.iter().all(Value::is_object) && !list.is_empty() => {
                    list.iter().collect()
                }
                _ => vec![spec],
            };
            for spec in specs {
                let selector = Self::parse_selector(contract_type, spec)?;
                if selector.cardinality.is_finite() {
                    parsed.finite.push(selector);
                } else {
                    parsed.infinite.push(selector);
                }
            }
        }
        Ok(parsed)
    }

    fn parse_selector(contract_type: &str, spec: &Value) -> Result<Selector> {
        if let Some(fields) = spec.as_object() {
            let cardinality = Cardinality::parse(
                fields.get("cardinality").unwrap_or(&json!(1)),
            )?;
            Ok(Selector {
                contract_type: fields
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or(contract_type)
                    .to_string(),
                cardinality,
                filter: fields.get("filter").cloned(),
                version: fields
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        } else {
            Ok(Selector {
                contract_type: contract_type.to_string(),
                cardinality: Cardinality::parse(spec)?,
                filter: None,
                version: None,
            })
        }
    }

    /// The underlying blueprint contract.
    pub fn as_contract(&self) -> &Contract {
        &self.contract
    }

    fn layout_types(&self) -> Vec<&str> {
        self.layout
            .finite
            .types
            .iter()
            .chain(self.layout.infinite.types.iter())
            .map(String::as_str)
            .unique()
            .collect()
    }

    // ------------------------------------------------------------------
    // Candidate selection
    // ------------------------------------------------------------------

    fn selector_candidates<'u>(
        &self,
        universe: &'u Contract,
        selector: &Selector,
        filter: Option<&dyn StructuralFilter>,
    ) -> Vec<&'u Contract> {
        let mut candidates = universe.get_children(Some(&[selector.contract_type.as_str()]));

        if let Some(schema) = &selector.filter {
            match filter {
                Some(collaborator) => {
                    candidates.retain(|candidate| collaborator.matches(schema, candidate.raw()));
                }
                None => candidates.clear(),
            }
        }

        if let Some(constraint) = &selector.version {
            if constraint == "latest" {
                let latest = candidates
                    .iter()
                    .filter_map(|candidate| candidate.version())
                    .max_by(|a, b| version::compare(a, b))
                    .map(str::to_string);
                candidates.retain(|candidate| {
                    candidate.version().map(str::to_string) == latest
                });
            } else {
                candidates.retain(|candidate| {
                    candidate
                        .version()
                        .is_some_and(|v| version_constraint_matches(v, constraint))
                });
            }
        }
        candidates
    }

    /// All cardinality-bounded combinations for one finite selector, sorted
    /// ascending by the first element's version and deduplicated by their
    /// leading element: after the sort, only the first combination headed by
    /// a given contract survives.
    fn selector_combinations<'u>(
        &self,
        universe: &'u Contract,
        selector: &Selector,
        filter: Option<&dyn StructuralFilter>,
    ) -> Result<Vec<Vec<&'u Contract>>> {
        let candidates = self.selector_candidates(universe, selector, filter);
        let to = selector
            .cardinality
            .to
            .expect("finite selectors always carry an upper bound");
        let mut combinations = combinations_of(
            &selector.contract_type,
            candidates,
            selector.cardinality.from,
            to,
        )?;

        combinations.sort_by(|a, b| {
            let left = a.first().and_then(|c| c.version()).unwrap_or_default();
            let right = b.first().and_then(|c| c.version()).unwrap_or_default();
            version::compare(left, right)
        });
        let mut seen = FxHashSet::default();
        combinations.retain(|combination| {
            let representative = combination
                .first()
                .map(|c| c.identity_key())
                .unwrap_or_default();
            seen.insert(representative)
        });
        trace!(
            contract_type = %selector.contract_type,
            count = combinations.len(),
            "selector combinations"
        );
        Ok(combinations)
    }

    fn finite_dimensions<'u>(
        &self,
        universe: &'u Contract,
        options: SequenceOptions,
    ) -> Result<Option<Vec<Vec<Vec<&'u Contract>>>>> {
        let mut dimensions = Vec::new();
        for selector in &self.layout.finite.selectors {
            match self.selector_combinations(universe, selector, options.filter) {
                Ok(combinations) if combinations.is_empty() => return Ok(None),
                Ok(combinations) => dimensions.push(combinations),
                Err(CovenantError::InvalidCombination(reason)) => {
                    debug!(%reason, "selector is unsatisfiable in this universe");
                    return Ok(None);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(Some(dimensions))
    }

    // ------------------------------------------------------------------
    // Context construction
    // ------------------------------------------------------------------

    fn build_context(
        &self,
        universe: &Contract,
        pointer: &[usize],
        dimensions: &[Vec<Vec<&Contract>>],
        options: SequenceOptions,
    ) -> Option<Contract> {
        let mut context = Contract::new_unhashed(self.skeleton.clone()).ok()?;
        let mut picks = Vec::new();
        for (dimension, &index) in pointer.iter().enumerate() {
            for contract in &dimensions[dimension][index] {
                picks.push((*contract).clone());
            }
        }
        context.add_children(picks).ok()?;
        self.finalize_context(context, universe, options)
    }

    /// Steps shared by `sequence` and `reproduce` after the finite picks are
    /// in place: infinite-type cross-referencing, interpolation, unmet
    /// requirement handling, and capability union.
    fn finalize_context(
        &self,
        mut context: Contract,
        universe: &Contract,
        options: SequenceOptions,
    ) -> Option<Contract> {
        for infinite_type in &self.layout.infinite.types {
            let matchers: Vec<Contract> = context
                .get_children(None)
                .iter()
                .flat_map(|child| child.requirement_matchers(infinite_type))
                .map(|matcher| (*matcher).clone())
                .collect();

            let mut additions: Vec<Contract> = Vec::new();
            let mut seen = FxHashSet::default();
            if matchers.is_empty() {
                // No cross-reference from the chosen children: every
                // universe candidate of this type is in play.
                for candidate in universe.get_children(Some(&[infinite_type.as_str()])) {
                    if seen.insert(candidate.identity_key()) {
                        additions.push(candidate.clone());
                    }
                }
            } else {
                for matcher in &matchers {
                    for candidate in universe.find_children(matcher) {
                        if seen.insert(candidate.identity_key()) {
                            additions.push(candidate.clone());
                        }
                    }
                }
            }

            additions.retain(|candidate| context.satisfies_child_contract(candidate, None));
            if !additions.is_empty() {
                context.add_children(additions).ok()?;
            }
        }

        context.interpolate().ok()?;

        let unmet = context.get_all_not_satisfied_child_requirements(None);
        if !unmet.is_empty() {
            if !options.allow_requirements {
                trace!(unmet = unmet.len(), "rejecting context with open requirements");
                return None;
            }
            context.append_requires(unmet).ok()?;
            context.interpolate().ok()?;
        }

        let mut capabilities = Vec::new();
        let mut seen = FxHashSet::default();
        for child in context.get_children(None) {
            for capability in child.capabilities() {
                if seen.insert(hash_object(capability)) {
                    capabilities.push(capability.clone());
                }
            }
        }
        if !capabilities.is_empty() {
            context.set_capabilities(capabilities).ok()?;
            context.interpolate().ok()?;
        }

        Some(context)
    }

    // ------------------------------------------------------------------
    // sequence
    // ------------------------------------------------------------------

    /// Produces the best sequence of composite contexts reachable in the
    /// finite dimension space, resolving infinite-type references along the
    /// way. An unsatisfiable blueprint yields an empty result.
    pub fn sequence(&self, universe: &Contract, options: SequenceOptions) -> Result<Vec<Contract>> {
        let Some(dimensions) = self.finite_dimensions(universe, options)? else {
            return Ok(Vec::new());
        };

        let layout_types = self.layout_types();
        let max_pointer: Vec<usize> = dimensions.iter().map(|d| d.len() - 1).collect();
        let mut search = SequenceSearch {
            blueprint: self,
            universe,
            options,
            dimensions: &dimensions,
            layout_types: &layout_types,
            max_pointer: max_pointer.clone(),
            visited: FxHashSet::default(),
            contexts: FxHashMap::default(),
            best_path: Vec::new(),
            best_score: None,
        };

        let zero = vec![0; dimensions.len()];
        let mut path = Vec::new();
        search.visited.insert(pointer_key(&zero));
        let mut found = false;
        if search.validate(&zero) {
            path.push(zero.clone());
            search.note_best(&path);
            found = zero == max_pointer;
        }
        if !found {
            found = search.walk(&zero, &mut path);
        }
        let retained = if found { path } else { search.best_path.clone() };
        debug!(
            pointers = retained.len(),
            reached_maximal = found,
            "sequence search finished"
        );

        let infinite_types: Vec<&str> = self
            .layout
            .infinite
            .types
            .iter()
            .map(String::as_str)
            .collect();
        let mut contexts = Vec::new();
        for pointer in &retained {
            let Some(mut context) = search.context_for(pointer) else {
                continue;
            };
            if !context.are_children_satisfied(Some(&infinite_types)) {
                continue;
            }
            context.interpolate()?;
            contexts.push(context);
        }
        Ok(contexts)
    }

    // ------------------------------------------------------------------
    // reproduce
    // ------------------------------------------------------------------

    /// Eagerly collects the exhaustive enumeration of valid contexts.
    pub fn reproduce(&self, universe: &Contract, options: SequenceOptions) -> Result<Vec<Contract>> {
        Ok(self.reproduce_iter(universe, options)?.collect())
    }

    /// Lazily enumerates every valid context in the cartesian product of
    /// the finite selector combinations. Finite-type satisfaction is
    /// checked eagerly while the product is constructed, so invalid
    /// branches short-circuit before deeper dimensions materialize;
    /// infinite-type resolution happens just before yielding. Re-iterating
    /// re-runs generation.
    pub fn reproduce_iter<'a>(
        &'a self,
        universe: &'a Contract,
        options: SequenceOptions<'a>,
    ) -> Result<ReproduceIter<'a>> {
        let dimensions = self.finite_dimensions(universe, options)?;
        let exhausted = dimensions.is_none();
        let dimensions = dimensions.unwrap_or_default();

        // prefix_types[d] holds the selector types of dimensions 0..=d;
        // partial products are validated against exactly those types.
        let mut prefix_types: Vec<Vec<String>> = Vec::new();
        for selector in &self.layout.finite.selectors {
            let mut types = prefix_types.last().cloned().unwrap_or_default();
            if !types.contains(&selector.contract_type) {
                types.push(selector.contract_type.clone());
            }
            prefix_types.push(types);
        }

        let depth = dimensions.len();
        Ok(ReproduceIter {
            blueprint: self,
            universe,
            options,
            dimensions,
            prefix_types,
            indices: vec![0; depth],
            partials: Vec::new(),
            exhausted,
        })
    }
}

fn pointer_key(pointer: &[usize]) -> String {
    pointer.iter().map(ToString::to_string).join(",")
}

/// Depth-first walk state for `sequence`.
struct SequenceSearch<'a> {
    blueprint: &'a Blueprint,
    universe: &'a Contract,
    options: SequenceOptions<'a>,
    dimensions: &'a [Vec<Vec<&'a Contract>>],
    layout_types: &'a [&'a str],
    max_pointer: Vec<usize>,
    visited: FxHashSet<String>,
    /// Pointer -> built context (None caches invalidity).
    contexts: FxHashMap<String, Option<Contract>>,
    best_path: Vec<Vec<usize>>,
    best_score: Option<usize>,
}

impl SequenceSearch<'_> {
    fn context_for(&mut self, pointer: &[usize]) -> Option<Contract> {
        let key = pointer_key(pointer);
        if let Some(cached) = self.contexts.get(&key) {
            return cached.clone();
        }
        let built = self
            .blueprint
            .build_context(self.universe, pointer, self.dimensions, self.options)
            .filter(|context| context.are_children_satisfied(Some(self.layout_types)));
        self.contexts.insert(key, built.clone());
        built
    }

    fn validate(&mut self, pointer: &[usize]) -> bool {
        self.context_for(pointer).is_some()
    }

    fn note_best(&mut self, path: &[Vec<usize>]) {
        let Some(last) = path.last() else {
            return;
        };
        let score: usize = last.iter().sum();
        if self.best_score.is_none_or(|best| score > best) {
            self.best_score = Some(score);
            self.best_path = path.to_vec();
        }
    }

    /// Tries every dimension increment at the current pointer. Greedy
    /// compatibility mode gives up after the first valid branch fails
    /// instead of trying siblings.
    fn walk(&mut self, pointer: &[usize], path: &mut Vec<Vec<usize>>) -> bool {
        for dimension in 0..self.dimensions.len() {
            if pointer[dimension] == self.max_pointer[dimension] {
                continue;
            }
            let mut next = pointer.to_vec();
            next[dimension] += 1;
            if !self.visited.insert(pointer_key(&next)) {
                continue;
            }
            if !self.validate(&next) {
                continue;
            }

            path.push(next.clone());
            self.note_best(path);
            if next == self.max_pointer || self.walk(&next, path) {
                return true;
            }
            path.pop();
            if self.options.compat_greedy {
                return false;
            }
        }
        false
    }
}

/// Lazy exhaustive enumeration over the finite combination product.
pub struct ReproduceIter<'a> {
    blueprint: &'a Blueprint,
    universe: &'a Contract,
    options: SequenceOptions<'a>,
    dimensions: Vec<Vec<Vec<&'a Contract>>>,
    prefix_types: Vec<Vec<String>>,
    indices: Vec<usize>,
    /// partials[d] is the context holding the picks of dimensions 0..=d.
    partials: Vec<Contract>,
    exhausted: bool,
}

impl ReproduceIter<'_> {
    fn seed(&self) -> Option<Contract> {
        Contract::new_unhashed(self.blueprint.skeleton.clone()).ok()
    }

    fn finalize(&self, candidate: Contract) -> Option<Contract> {
        let context = self
            .blueprint
            .finalize_context(candidate, self.universe, self.options)?;
        let infinite: Vec<&str> = self
            .blueprint
            .layout
            .infinite
            .types
            .iter()
            .map(String::as_str)
            .collect();
        if !context.are_children_satisfied(Some(&infinite)) {
            return None;
        }
        Some(context)
    }
}

impl Iterator for ReproduceIter<'_> {
    type Item = Contract;

    fn next(&mut self) -> Option<Contract> {
        while !self.exhausted {
            let depth = self.partials.len();

            if depth == self.dimensions.len() {
                // Full assignment with every finite prefix satisfied.
                let candidate = match self.partials.last() {
                    Some(partial) => {
                        let candidate = partial.clone();
                        self.partials.pop();
                        self.indices[depth - 1] += 1;
                        candidate
                    }
                    None => {
                        // Zero finite dimensions: the skeleton alone.
                        self.exhausted = true;
                        self.seed()?
                    }
                };
                if let Some(context) = self.finalize(candidate) {
                    return Some(context);
                }
                continue;
            }

            let index = self.indices[depth];
            if index >= self.dimensions[depth].len() {
                // This dimension is exhausted under the current prefix.
                self.indices[depth] = 0;
                if depth == 0 {
                    self.exhausted = true;
                    break;
                }
                self.partials.pop();
                self.indices[depth - 1] += 1;
                continue;
            }

            let base = match depth {
                0 => match self.seed() {
                    Some(seed) => seed,
                    None => {
                        self.exhausted = true;
                        break;
                    }
                },
                _ => self.partials[depth - 1].clone(),
            };
            let mut extended = base;
            let picks: Vec<Contract> = self.dimensions[depth][index]
                .iter()
                .map(|contract| (*contract).clone())
                .collect();
            if extended.add_children(picks).is_err() {
                self.indices[depth] += 1;
                continue;
            }
            let types: Vec<&str> = self.prefix_types[depth]
                .iter()
                .map(String::as_str)
                .collect();
            if extended.are_children_satisfied(Some(&types)) {
                self.partials.push(extended);
            } else {
                // Invalid branch: skip it without materializing deeper
                // dimensions.
                self.indices[depth] += 1;
            }
        }
        None
    }
}
