//! The contract model: identity, children indexing, requirement matching.
//!
//! A contract is a typed node built from a raw JSON document. Its identity is
//! a structural content hash of that document; its children live in a
//! hash-keyed arena with type and slug secondary indices (the slug index
//! covers every alias); its `requires` declarations compile into an
//! AND-of-(atomic | OR | NOT) conjunct set evaluated by
//! `satisfies_child_contract`.
//!
//! Mutation discipline: `add_child`/`remove_child` are the only sanctioned
//! mutators of the children index, and both re-serialize `raw.children` and
//! recompile requirements afterwards (unless suppressed for batching via
//! `add_children`). The content hash is a pure function of `raw` at the
//! moment `rehash` was last called; it is stale after any raw mutation until
//! re-hashed. Batched callers that suppress rebuild/rehash must flush before
//! relying on indices or equality.

use crate::core::children_tree;
use crate::core::error::{CovenantError, Result};
use crate::core::hash::hash_object;
use crate::core::matcher_cache::MatcherCache;
use crate::core::object_set::ObjectSet;
use crate::core::template;
use crate::core::variants;
use crate::core::version;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::cmp::Ordering;

/// Reserved type of matcher contracts.
pub const MATCHER_TYPE: &str = "meta.matcher";

/// Operand tag of a group matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOperation {
    Or,
    Not,
}

impl GroupOperation {
    fn as_str(self) -> &'static str {
        match self {
            GroupOperation::Or => "or",
            GroupOperation::Not => "not",
        }
    }
}

/// One compiled top-level requirement conjunct. The top-level conjunct set
/// is an implicit logical AND; groups nest exactly one level deep.
#[derive(Debug, Clone)]
pub enum RequirementConjunct {
    Atomic(Contract),
    Group {
        operation: GroupOperation,
        matchers: ObjectSet<Contract>,
    },
}

/// Compiled view of `raw.requires`.
#[derive(Debug, Clone, Default)]
struct Requirements {
    /// Distinct types referenced by any conjunct, group members included.
    types: FxHashSet<String>,
    /// Atomic matchers per referenced type.
    matchers: FxHashMap<String, ObjectSet<Contract>>,
    /// Ordered top-level conjuncts, keyed by descriptor hash.
    compiled: ObjectSet<RequirementConjunct>,
}

/// Hash-keyed arena of immediate children plus secondary indices.
#[derive(Debug, Clone, Default)]
struct ChildrenIndex {
    map: FxHashMap<String, Contract>,
    /// Child hashes in insertion order; the authoritative iteration order.
    order: Vec<String>,
    by_type: FxHashMap<String, FxHashSet<String>>,
    /// type -> slug -> hashes; covers aliases as well as canonical slugs.
    by_slug: FxHashMap<String, FxHashMap<String, FxHashSet<String>>>,
    types: FxHashSet<String>,
    search_cache: RefCell<MatcherCache>,
    type_matchers: RefCell<FxHashMap<String, Contract>>,
}

/// Rebuild/rehash suppression for batched mutation.
#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    pub rebuild: bool,
    pub rehash: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            rebuild: true,
            rehash: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Contract {
    raw: Value,
    hash: Option<String>,
    children: ChildrenIndex,
    requirements: Requirements,
}

impl Contract {
    /// Builds a contract from a raw document. Children declared inline under
    /// `raw.children` are instantiated recursively, templates interpolated,
    /// and the result hashed.
    pub fn new(raw: Value) -> Result<Self> {
        Self::with_options(raw, true)
    }

    /// Same as [`Contract::new`] but leaves the contract unhashed, for
    /// callers that will keep mutating before identity matters.
    pub fn new_unhashed(raw: Value) -> Result<Self> {
        Self::with_options(raw, false)
    }

    /// Expands a raw document's `variants` declaration and builds one
    /// contract per expanded document.
    pub fn build(raw: &Value) -> Result<Vec<Self>> {
        variants::expand(raw)?
            .into_iter()
            .map(Self::new)
            .collect()
    }

    fn with_options(raw: Value, hash: bool) -> Result<Self> {
        let Some(map) = raw.as_object() else {
            return Err(CovenantError::InvalidContract(format!(
                "raw document must be an object, got {raw}"
            )));
        };
        if !map.get("type").is_some_and(Value::is_string) {
            return Err(CovenantError::InvalidContract(
                "raw document requires a string `type`".to_string(),
            ));
        }

        let mut contract = Self {
            raw,
            hash: None,
            children: ChildrenIndex::default(),
            requirements: Requirements::default(),
        };

        let inline = contract.raw.get("children").cloned();
        if let Some(tree) = inline {
            for child_raw in children_tree::parse(&tree)? {
                let child = Self::with_options(child_raw, true)?;
                contract.add_child_with(
                    child,
                    AddOptions {
                        rebuild: false,
                        rehash: false,
                    },
                )?;
            }
        }

        // Interpolation rebuilds indices; hashing is deferred to the end so
        // the hash covers the interpolated document.
        contract.interpolate_with(false, &[])?;
        if hash {
            contract.rehash();
        }
        Ok(contract)
    }

    /// Constructor for reserved carrier contracts (blueprints) whose raw
    /// documents embed templates that must survive verbatim: skips child
    /// instantiation and interpolation.
    pub(crate) fn new_uninterpolated(raw: Value) -> Result<Self> {
        let Some(map) = raw.as_object() else {
            return Err(CovenantError::InvalidContract(format!(
                "raw document must be an object, got {raw}"
            )));
        };
        if !map.get("type").is_some_and(Value::is_string) {
            return Err(CovenantError::InvalidContract(
                "raw document requires a string `type`".to_string(),
            ));
        }
        let mut contract = Self {
            raw,
            hash: None,
            children: ChildrenIndex::default(),
            requirements: Requirements::default(),
        };
        contract.compile_requirements()?;
        contract.rehash();
        Ok(contract)
    }

    /// Wraps atomic match criteria (or group data) in a matcher contract.
    pub fn create_matcher(data: Value) -> Self {
        let mut matcher = Self {
            raw: json!({ "type": MATCHER_TYPE, "data": data }),
            hash: None,
            children: ChildrenIndex::default(),
            requirements: Requirements::default(),
        };
        matcher.rehash();
        matcher
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn contract_type(&self) -> &str {
        self.raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn slug(&self) -> Option<&str> {
        self.raw.get("slug").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.raw.get("version").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    pub fn canonical_slug(&self) -> Option<&str> {
        self.raw
            .get("canonicalSlug")
            .and_then(Value::as_str)
            .or_else(|| self.slug())
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.raw
            .get("aliases")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Every slug this contract can be referenced by: aliases plus the
    /// canonical slug.
    pub fn reference_slugs(&self) -> Vec<&str> {
        let mut slugs = self.aliases();
        if let Some(slug) = self.slug() {
            if !slugs.contains(&slug) {
                slugs.push(slug);
            }
        }
        slugs
    }

    pub fn capabilities(&self) -> &[Value] {
        self.raw
            .get("capabilities")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `slug` or `slug@version`, the key external renderers combine with `+`.
    pub fn reference_string(&self) -> Option<String> {
        let slug = self.slug()?;
        Some(match self.version() {
            Some(version) => format!("{slug}@{version}"),
            None => slug.to_string(),
        })
    }

    /// The current content hash, if the contract has been hashed since its
    /// last raw mutation.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    fn identity(&self) -> String {
        self.hash
            .clone()
            .unwrap_or_else(|| hash_object(&self.raw))
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Recomputes the content hash from `raw`. Never called implicitly by
    /// readers; mutators call it unless suppressed.
    pub fn rehash(&mut self) {
        self.hash = Some(hash_object(&self.raw));
    }

    /// Deep, mutation-safe copy of the raw document with `raw.children`
    /// freshly re-serialized from the children index.
    pub fn to_json(&self) -> Value {
        let mut copy = self.raw.clone();
        if self.children.map.is_empty() {
            if let Some(map) = copy.as_object_mut() {
                map.remove("children");
            }
        } else if let Ok(tree) = children_tree::build(self) {
            copy["children"] = tree;
        }
        copy
    }

    // ------------------------------------------------------------------
    // Interpolation
    // ------------------------------------------------------------------

    /// Interpolates `{{path}}` placeholders against this contract's own raw
    /// document, then rebuilds and rehashes.
    pub fn interpolate(&mut self) -> Result<()> {
        self.interpolate_with(true, &[])
    }

    /// Interpolation with optional rehash suppression and a path blacklist.
    /// The index rebuild always happens.
    pub fn interpolate_with(&mut self, rehash: bool, blacklist: &[String]) -> Result<()> {
        template::interpolate_raw(&mut self.raw, blacklist);
        self.rebuild()?;
        if rehash {
            self.rehash();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Children mutation
    // ------------------------------------------------------------------

    /// Adds an owned child. A child whose hash is already present is a
    /// no-op. Returns whether the index changed.
    pub fn add_child(&mut self, child: Contract) -> Result<bool> {
        self.add_child_with(child, AddOptions::default())
    }

    pub fn add_child_with(&mut self, mut child: Contract, options: AddOptions) -> Result<bool> {
        if child.hash.is_none() {
            child.rehash();
        }
        let child_hash = child.identity();
        if self.children.map.contains_key(&child_hash) {
            return Ok(false);
        }

        let child_type = child.contract_type().to_string();
        self.children.types.insert(child_type.clone());
        self.children
            .by_type
            .entry(child_type.clone())
            .or_default()
            .insert(child_hash.clone());
        for slug in child.reference_slugs() {
            self.children
                .by_slug
                .entry(child_type.clone())
                .or_default()
                .entry(slug.to_string())
                .or_default()
                .insert(child_hash.clone());
        }
        self.children.search_cache.borrow_mut().reset_type(&child_type);
        self.children.order.push(child_hash.clone());
        self.children.map.insert(child_hash, child);

        if options.rebuild {
            self.rebuild()?;
        }
        if options.rehash {
            self.rehash();
        }
        Ok(true)
    }

    /// Removes an owned child, pruning now-empty type/slug index entries.
    /// Always rebuilds; rehash can be suppressed.
    pub fn remove_child(&mut self, child: &Contract) -> Result<bool> {
        self.remove_child_with(child, true)
    }

    pub fn remove_child_with(&mut self, child: &Contract, rehash: bool) -> Result<bool> {
        let child_hash = child.identity();
        let Some(owned) = self.children.map.remove(&child_hash) else {
            return Ok(false);
        };
        self.children.order.retain(|hash| hash != &child_hash);

        let child_type = owned.contract_type().to_string();
        if let Some(bucket) = self.children.by_type.get_mut(&child_type) {
            bucket.remove(&child_hash);
            if bucket.is_empty() {
                self.children.by_type.remove(&child_type);
                self.children.types.remove(&child_type);
            }
        }
        if let Some(slug_map) = self.children.by_slug.get_mut(&child_type) {
            for slug in owned.reference_slugs() {
                if let Some(bucket) = slug_map.get_mut(slug) {
                    bucket.remove(&child_hash);
                    if bucket.is_empty() {
                        slug_map.remove(slug);
                    }
                }
            }
            if slug_map.is_empty() {
                self.children.by_slug.remove(&child_type);
            }
        }
        self.children.search_cache.borrow_mut().reset_type(&child_type);

        self.rebuild()?;
        if rehash {
            self.rehash();
        }
        Ok(true)
    }

    /// Batched `add_child` with exactly one rebuild/rehash at the end.
    pub fn add_children(&mut self, children: Vec<Contract>) -> Result<()> {
        for child in children {
            self.add_child_with(
                child,
                AddOptions {
                    rebuild: false,
                    rehash: false,
                },
            )?;
        }
        self.rebuild()?;
        self.rehash();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Children access
    // ------------------------------------------------------------------

    /// Immediate child by content hash.
    pub fn get_child_by_hash(&self, hash: &str) -> Option<&Contract> {
        self.children.map.get(hash)
    }

    fn resolve_hash(&self, hash: &str) -> Option<&Contract> {
        if self.identity() == hash {
            return Some(self);
        }
        if let Some(child) = self.children.map.get(hash) {
            return Some(child);
        }
        self.children
            .order
            .iter()
            .filter_map(|key| self.children.map.get(key))
            .find_map(|child| child.resolve_hash(hash))
    }

    /// Every transitively owned descendant, optionally filtered by type,
    /// without duplication, in index order.
    pub fn get_children(&self, types: Option<&[&str]>) -> Vec<&Contract> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_children(types, &mut out, &mut seen);
        out
    }

    fn collect_children<'a>(
        &'a self,
        types: Option<&[&str]>,
        out: &mut Vec<&'a Contract>,
        seen: &mut FxHashSet<String>,
    ) {
        for hash in &self.children.order {
            let Some(child) = self.children.map.get(hash) else {
                continue;
            };
            if types.is_none_or(|wanted| wanted.contains(&child.contract_type()))
                && seen.insert(child.identity())
            {
                out.push(child);
            }
            child.collect_children(types, out, seen);
        }
    }

    /// Transitive children of one type, via the cached type-only matcher.
    pub fn get_children_by_type(&self, contract_type: &str) -> Vec<&Contract> {
        let matcher = self.type_matcher(contract_type);
        self.find_children(&matcher)
    }

    /// Transitive union of all descendant types.
    pub fn get_children_types(&self) -> FxHashSet<String> {
        let mut types = FxHashSet::default();
        for child in self.get_children(None) {
            types.insert(child.contract_type().to_string());
        }
        types
    }

    /// Immediate child types, sorted for deterministic serialization.
    pub fn child_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.children.types.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub(crate) fn immediate_children_of_type(&self, contract_type: &str) -> Vec<&Contract> {
        let Some(bucket) = self.children.by_type.get(contract_type) else {
            return Vec::new();
        };
        self.children
            .order
            .iter()
            .filter(|hash| bucket.contains(*hash))
            .filter_map(|hash| self.children.map.get(hash))
            .collect()
    }

    pub(crate) fn type_bucket_len(&self, contract_type: &str) -> usize {
        self.children
            .by_type
            .get(contract_type)
            .map_or(0, FxHashSet::len)
    }

    /// The hash if present, else a hash computed on the fly.
    pub(crate) fn identity_key(&self) -> String {
        self.identity()
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    /// The cached "type-only" matcher for a type.
    pub fn type_matcher(&self, contract_type: &str) -> Contract {
        if let Some(matcher) = self.children.type_matchers.borrow().get(contract_type) {
            return matcher.clone();
        }
        let matcher = Contract::create_matcher(json!({ "type": contract_type }));
        self.children
            .type_matchers
            .borrow_mut()
            .insert(contract_type.to_string(), matcher.clone());
        matcher
    }

    /// Finds, among `self` and its transitive children, every contract
    /// matching the given matcher. A type-only matcher returns the whole
    /// type bucket; richer matchers go through the alias-aware slug index
    /// and structural field comparison, with semver range satisfaction on
    /// `version`. Results are cached per matcher hash inside the matcher's
    /// type bucket.
    pub fn find_children(&self, matcher: &Contract) -> Vec<&Contract> {
        let Some(data) = matcher.raw.get("data").and_then(Value::as_object) else {
            return Vec::new();
        };
        let Some(target_type) = data.get("type").and_then(Value::as_str) else {
            return Vec::new();
        };

        let matcher_key = matcher.identity();
        let cached: Option<Vec<String>> = self
            .children
            .search_cache
            .borrow()
            .get(target_type, &matcher_key)
            .cloned();
        if let Some(hashes) = cached {
            tracing::trace!(target_type, "matcher cache hit");
            return hashes
                .iter()
                .filter_map(|hash| self.resolve_hash(hash))
                .collect();
        }

        let results: Vec<&Contract> = if data.len() == 1 {
            self.get_children(Some(&[target_type]))
        } else {
            let mut out = Vec::new();
            let mut seen = FxHashSet::default();
            if self.matches_criteria(data) && seen.insert(self.identity()) {
                out.push(self);
            }
            self.collect_index_matches(target_type, data, &mut out, &mut seen);
            out
        };

        let hashes = results.iter().map(|found| found.identity()).collect();
        self.children
            .search_cache
            .borrow_mut()
            .add(target_type, &matcher_key, hashes);
        results
    }

    fn collect_index_matches<'a>(
        &'a self,
        target_type: &str,
        data: &serde_json::Map<String, Value>,
        out: &mut Vec<&'a Contract>,
        seen: &mut FxHashSet<String>,
    ) {
        let bucket: Option<&FxHashSet<String>> = match data.get("slug").and_then(Value::as_str) {
            Some(slug) => self
                .children
                .by_slug
                .get(target_type)
                .and_then(|slugs| slugs.get(slug)),
            None => self.children.by_type.get(target_type),
        };
        if let Some(bucket) = bucket {
            for hash in &self.children.order {
                if !bucket.contains(hash) {
                    continue;
                }
                if let Some(child) = self.children.map.get(hash) {
                    if child.matches_criteria(data) && seen.insert(child.identity()) {
                        out.push(child);
                    }
                }
            }
        }
        for hash in &self.children.order {
            if let Some(child) = self.children.map.get(hash) {
                child.collect_index_matches(target_type, data, out, seen);
            }
        }
    }

    /// Structural match of matcher criteria against this contract's own
    /// fields. `slug` matches any reference slug, `version` goes through the
    /// semver collaborator, every other field requires deep equality.
    fn matches_criteria(&self, data: &serde_json::Map<String, Value>) -> bool {
        if data.get("type").and_then(Value::as_str) != Some(self.contract_type()) {
            return false;
        }
        if let Some(slug) = data.get("slug").and_then(Value::as_str) {
            if !self.reference_slugs().contains(&slug) {
                return false;
            }
        }
        if let Some(constraint) = data.get("version").and_then(Value::as_str) {
            let Some(candidate) = self.version() else {
                return false;
            };
            if !version_constraint_matches(candidate, constraint) {
                return false;
            }
        }
        for (key, expected) in data {
            if matches!(key.as_str(), "type" | "slug" | "version") {
                continue;
            }
            if self.raw.get(key) != Some(expected) {
                return false;
            }
        }
        true
    }

    /// Matches criteria against each candidate's declared `capabilities`
    /// entries rather than its own fields. Secondary match path, used when
    /// field matching misses.
    pub fn find_children_with_capabilities(&self, matcher: &Contract) -> Vec<&Contract> {
        let Some(data) = matcher.raw.get("data").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        if self.capability_matches(data) && seen.insert(self.identity()) {
            out.push(self);
        }
        for child in self.get_children(None) {
            if child.capability_matches(data) && seen.insert(child.identity()) {
                out.push(child);
            }
        }
        out
    }

    fn capability_matches(&self, data: &serde_json::Map<String, Value>) -> bool {
        self.capabilities()
            .iter()
            .any(|capability| capability_entry_matches(capability, data))
    }

    // ------------------------------------------------------------------
    // Requirements
    // ------------------------------------------------------------------

    /// Recompiles `raw.requires` and re-serializes `raw.children` from the
    /// children index.
    pub fn rebuild(&mut self) -> Result<()> {
        if self.children.map.is_empty() {
            if let Some(map) = self.raw.as_object_mut() {
                map.remove("children");
            }
        } else {
            let tree = children_tree::build(self)?;
            self.raw["children"] = tree;
        }
        self.compile_requirements()
    }

    fn compile_requirements(&mut self) -> Result<()> {
        let mut requirements = Requirements::default();
        let requires = self
            .raw
            .get("requires")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for entry in &requires {
            let Some(obj) = entry.as_object() else {
                return Err(CovenantError::InvalidContract(format!(
                    "requirement must be an object, got {entry}"
                )));
            };
            let group = [("or", GroupOperation::Or), ("not", GroupOperation::Not)]
                .into_iter()
                .find_map(|(key, op)| obj.get(key).map(|members| (op, members)));

            if let Some((operation, members)) = group {
                let Some(member_list) = members.as_array() else {
                    return Err(CovenantError::InvalidContract(format!(
                        "`{}` group must hold an array",
                        operation.as_str()
                    )));
                };
                let mut matchers = ObjectSet::new();
                for member in member_list {
                    let matcher =
                        Self::compile_atomic(member, &mut requirements)?;
                    matchers.add(&matcher.identity(), matcher);
                }
                let descriptor = json!({
                    "operation": operation.as_str(),
                    "matchers": member_list,
                });
                requirements.compiled.add(
                    &hash_object(&descriptor),
                    RequirementConjunct::Group {
                        operation,
                        matchers,
                    },
                );
            } else {
                let matcher = Self::compile_atomic(entry, &mut requirements)?;
                let key = matcher.identity();
                requirements
                    .compiled
                    .add(&key, RequirementConjunct::Atomic(matcher));
            }
        }

        self.requirements = requirements;
        Ok(())
    }

    fn compile_atomic(entry: &Value, requirements: &mut Requirements) -> Result<Contract> {
        let entry_type = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CovenantError::InvalidContract(format!(
                    "requirement missing a string `type`: {entry}"
                ))
            })?
            .to_string();
        let matcher = Contract::create_matcher(entry.clone());
        requirements.types.insert(entry_type.clone());
        requirements
            .matchers
            .entry(entry_type)
            .or_default()
            .add(&matcher.identity(), matcher.clone());
        Ok(matcher)
    }

    /// Distinct types referenced by this contract's own requirements.
    pub fn requirement_types(&self) -> &FxHashSet<String> {
        &self.requirements.types
    }

    /// Atomic requirement matchers of one type, in declaration order.
    pub fn requirement_matchers(&self, contract_type: &str) -> Vec<&Contract> {
        self.requirements
            .matchers
            .get(contract_type)
            .map(|set| set.get_all())
            .unwrap_or_default()
    }

    /// Requirement types of this contract and every transitive child.
    pub fn all_requirement_types(&self) -> FxHashSet<String> {
        let mut types = self.requirements.types.clone();
        for child in self.get_children(None) {
            types.extend(child.requirements.types.iter().cloned());
        }
        types
    }

    fn gathered_conjuncts<'a>(target: &'a Contract) -> Vec<&'a RequirementConjunct> {
        let mut conjuncts: Vec<&RequirementConjunct> = target.requirements.compiled.get_all();
        for child in target.get_children(None) {
            conjuncts.extend(child.requirements.compiled.get_all());
        }
        conjuncts
    }

    fn has_match(&self, matcher: &Contract) -> bool {
        !self.find_children(matcher).is_empty()
            || !self.find_children_with_capabilities(matcher).is_empty()
    }

    /// Evaluates `target`'s compiled conjuncts (plus those of its transitive
    /// children) against `self` as the candidate universe, optionally
    /// restricted to a set of requirement types. Conjuncts whose type falls
    /// outside the restriction are vacuously satisfied.
    pub fn satisfies_child_contract(&self, target: &Contract, types: Option<&[&str]>) -> bool {
        let passes = |matcher: &Contract| -> bool {
            types.is_none_or(|wanted| {
                matcher
                    .matcher_type()
                    .is_some_and(|matcher_type| wanted.contains(&matcher_type))
            })
        };

        for conjunct in Self::gathered_conjuncts(target) {
            match conjunct {
                RequirementConjunct::Group {
                    operation: GroupOperation::Or,
                    matchers,
                } => {
                    let restricted: Vec<&Contract> =
                        matchers.iter().filter(|m| passes(m)).collect();
                    if restricted.is_empty() {
                        continue;
                    }
                    if !restricted.iter().any(|matcher| self.has_match(matcher)) {
                        return false;
                    }
                }
                RequirementConjunct::Group {
                    operation: GroupOperation::Not,
                    matchers,
                } => {
                    let restricted: Vec<&Contract> =
                        matchers.iter().filter(|m| passes(m)).collect();
                    if !restricted.is_empty()
                        && restricted.iter().any(|matcher| self.has_match(matcher))
                    {
                        return false;
                    }
                }
                RequirementConjunct::Atomic(matcher) => {
                    if passes(matcher) && !self.has_match(matcher) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Applies `satisfies_child_contract` to every owned child,
    /// short-circuiting children whose requirement types are disjoint from
    /// the filter.
    pub fn are_children_satisfied(&self, types: Option<&[&str]>) -> bool {
        for hash in &self.children.order {
            let Some(child) = self.children.map.get(hash) else {
                continue;
            };
            if let Some(wanted) = types {
                let required = child.all_requirement_types();
                if !wanted.iter().any(|t| required.contains(*t)) {
                    continue;
                }
            }
            if !self.satisfies_child_contract(child, types) {
                return false;
            }
        }
        true
    }

    /// Diagnostic mirror of `satisfies_child_contract`: instead of a
    /// boolean, returns the raw descriptors of every unmet conjunct, with
    /// group conjuncts labelled by their operand.
    pub fn get_not_satisfied_child_requirements(
        &self,
        target: &Contract,
        types: Option<&[&str]>,
    ) -> Vec<Value> {
        let passes = |matcher: &Contract| -> bool {
            types.is_none_or(|wanted| {
                matcher
                    .matcher_type()
                    .is_some_and(|matcher_type| wanted.contains(&matcher_type))
            })
        };

        let mut unmet = Vec::new();
        for conjunct in Self::gathered_conjuncts(target) {
            match conjunct {
                RequirementConjunct::Group {
                    operation: GroupOperation::Or,
                    matchers,
                } => {
                    let restricted: Vec<&Contract> =
                        matchers.iter().filter(|m| passes(m)).collect();
                    if restricted.is_empty() {
                        continue;
                    }
                    if !restricted.iter().any(|matcher| self.has_match(matcher)) {
                        let members: Vec<Value> = restricted
                            .iter()
                            .filter_map(|m| m.matcher_data().cloned())
                            .collect();
                        unmet.push(json!({ "or": members }));
                    }
                }
                RequirementConjunct::Group {
                    operation: GroupOperation::Not,
                    matchers,
                } => {
                    let violated: Vec<Value> = matchers
                        .iter()
                        .filter(|m| passes(m) && self.has_match(m))
                        .filter_map(|m| m.matcher_data().cloned())
                        .collect();
                    if !violated.is_empty() {
                        unmet.push(json!({ "not": violated }));
                    }
                }
                RequirementConjunct::Atomic(matcher) => {
                    if passes(matcher) && !self.has_match(matcher) {
                        if let Some(data) = matcher.matcher_data() {
                            unmet.push(data.clone());
                        }
                    }
                }
            }
        }
        unmet
    }

    /// Unmet requirement descriptors across every owned child, deduplicated.
    pub fn get_all_not_satisfied_child_requirements(&self, types: Option<&[&str]>) -> Vec<Value> {
        let mut unmet = Vec::new();
        let mut seen = FxHashSet::default();
        for hash in &self.children.order {
            let Some(child) = self.children.map.get(hash) else {
                continue;
            };
            for descriptor in self.get_not_satisfied_child_requirements(child, types) {
                if seen.insert(hash_object(&descriptor)) {
                    unmet.push(descriptor);
                }
            }
        }
        unmet
    }

    fn matcher_type(&self) -> Option<&str> {
        self.raw
            .get("data")
            .and_then(|data| data.get("type"))
            .and_then(Value::as_str)
    }

    pub(crate) fn matcher_data(&self) -> Option<&Value> {
        self.raw.get("data")
    }

    // ------------------------------------------------------------------
    // Combinatorics
    // ------------------------------------------------------------------

    /// All size-`from..=to` subsets of this contract's children of one type,
    /// in index order. Fails fast on an inverted range or when fewer than
    /// `from` children match.
    pub fn get_children_combinations(
        &self,
        contract_type: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<Vec<&Contract>>> {
        let children = self.get_children_by_type(contract_type);
        combinations_of(contract_type, children, from, to)
    }

    // ------------------------------------------------------------------
    // Blueprint support
    // ------------------------------------------------------------------

    pub(crate) fn append_requires(&mut self, descriptors: Vec<Value>) -> Result<()> {
        if descriptors.is_empty() {
            return Ok(());
        }
        let requires = self
            .raw
            .as_object_mut()
            .expect("contract raw is always an object")
            .entry("requires")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(list) = requires.as_array_mut() {
            list.extend(descriptors);
        }
        self.rebuild()
    }

    pub(crate) fn set_capabilities(&mut self, capabilities: Vec<Value>) -> Result<()> {
        if capabilities.is_empty() {
            return Ok(());
        }
        self.raw["capabilities"] = Value::Array(capabilities);
        self.rebuild()
    }
}

/// Subset enumeration shared by contracts and blueprint selectors.
pub(crate) fn combinations_of<'a>(
    label: &str,
    items: Vec<&'a Contract>,
    from: u64,
    to: u64,
) -> Result<Vec<Vec<&'a Contract>>> {
    if from > to {
        return Err(CovenantError::InvalidCombination(format!(
            "inverted range [{from}, {to}] for type {label}"
        )));
    }
    let available = items.len() as u64;
    if available < from {
        return Err(CovenantError::InvalidCombination(format!(
            "type {label} has {available} matching children, at least {from} required"
        )));
    }
    let mut combinations = Vec::new();
    for size in from..=to.min(available) {
        if size == 0 {
            combinations.push(Vec::new());
        } else {
            combinations.extend(items.iter().copied().combinations(size as usize));
        }
    }
    Ok(combinations)
}

/// Structural match of matcher criteria against a single declared
/// `capabilities` entry: every matcher-data key other than `type` must be
/// present in the entry with a deeply equal value.
fn capability_entry_matches(capability: &Value, data: &serde_json::Map<String, Value>) -> bool {
    data.iter()
        .filter(|(key, _)| key.as_str() != "type")
        .all(|(key, expected)| capability.get(key) == Some(expected))
}

/// Semver range satisfaction when the constraint is a valid range, exact
/// (coerced) equality otherwise.
pub(crate) fn version_constraint_matches(candidate: &str, constraint: &str) -> bool {
    if version::valid_range(constraint) {
        version::satisfies(candidate, constraint)
    } else {
        version::compare(candidate, constraint) == Ordering::Equal
    }
}

impl PartialEq for Contract {
    /// Hash equality when both sides are hashed; deep structural equality of
    /// the raw documents otherwise.
    fn eq(&self, other: &Self) -> bool {
        match (&self.hash, &other.hash) {
            (Some(left), Some(right)) => left == right,
            _ => crate::core::hash::deep_equal(&self.to_json(), &other.to_json()),
        }
    }
}

impl Serialize for Contract {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
