//! Breadth-first synthetic sampling over discretized tables
//!
//! The sampler walks attribute combinations level by level. Level `d` holds
//! combinations of `d` attributes with assigned codes; every combination is
//! weighted once against the original table (the "real" branch) and once
//! against the randomized table. Records are emitted from both branches in
//! proportions set by `interleave` and decoded back to values before they
//! leave the iterator.
//!
//! ```text
//! root (forced codes) ──expand──> level d+1 ──cap──> plan ──emit──> records
//!                          ^                            │
//!                          └────────────────────────────┘
//! ```
//!
//! Interleave rule: the k-th record emitted at a level (1-based) comes from
//! the randomized ordering iff `floor(k·i) > floor((k-1)·i)`, otherwise from
//! the real ordering. An exhausted ordering yields to the other and no
//! combination is emitted twice.

mod frontier;

use crate::config::SamplerConfig;
use crate::dataset::{Dataset, Value};
use crate::discretize::{discretize, Code, DiscretizedTable, Mapping, ReverseMapping};
use crate::privacy::{randomize, PrivacyParameters, RandomizationMethod};
use crate::topk::{order_by_key, top_k_by_key};
use crate::{Error, Result};
use frontier::{Combination, Expander};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default cap on the number of combinations kept per level
pub const DEFAULT_MAX_FRONTIER: usize = 10_000;

/// Codec and tables consumed by one sampling call
#[derive(Debug, Clone)]
pub struct SampleTables {
    mapping: Mapping,
    reverse_mapping: ReverseMapping,
    randomized: DiscretizedTable,
    original: DiscretizedTable,
}

impl SampleTables {
    /// Bundle the codec with the randomized and original tables
    ///
    /// # Errors
    /// Returns `InvalidInput` unless all four agree on attributes and domain
    /// sizes and both tables have the same number of rows
    pub fn new(
        mapping: Mapping,
        reverse_mapping: ReverseMapping,
        randomized: DiscretizedTable,
        original: DiscretizedTable,
    ) -> Result<Self> {
        let attributes = original.attributes();
        if randomized.attributes() != attributes
            || mapping.attributes() != attributes
            || reverse_mapping.attributes() != attributes
        {
            return Err(Error::InvalidInput(
                "mapping and tables disagree on attributes".to_string(),
            ));
        }
        if randomized.domain_sizes() != original.domain_sizes() {
            return Err(Error::InvalidInput(
                "randomized and original tables disagree on domain sizes".to_string(),
            ));
        }
        for (index, &size) in original.domain_sizes().iter().enumerate() {
            if mapping.domain_size(index) != Some(size)
                || reverse_mapping.domain_size(index) != Some(size)
            {
                return Err(Error::InvalidInput(format!(
                    "mapping domain of '{}' does not match the tables",
                    attributes[index]
                )));
            }
        }
        if randomized.num_rows() != original.num_rows() {
            return Err(Error::InvalidInput(format!(
                "randomized table has {} rows, original has {}",
                randomized.num_rows(),
                original.num_rows()
            )));
        }
        if u32::try_from(original.num_rows()).is_err() {
            return Err(Error::InvalidInput(format!(
                "{} rows exceed the sampler's row index space",
                original.num_rows()
            )));
        }

        Ok(Self {
            mapping,
            reverse_mapping,
            randomized,
            original,
        })
    }

    /// Forward codec
    #[must_use]
    pub const fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Reverse codec
    #[must_use]
    pub const fn reverse_mapping(&self) -> &ReverseMapping {
        &self.reverse_mapping
    }

    /// Randomized table
    #[must_use]
    pub const fn randomized(&self) -> &DiscretizedTable {
        &self.randomized
    }

    /// Original table
    #[must_use]
    pub const fn original(&self) -> &DiscretizedTable {
        &self.original
    }
}

/// Branch a record was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Real-branch ordering
    Real,
    /// Randomized-branch ordering
    Randomized,
    /// Mixture ordering (depth-first traversal)
    Mixed,
}

/// A decoded synthetic record
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRecord {
    values: Vec<(String, Value)>,
    depth: usize,
    weight_real: f64,
    weight_randomized: f64,
    source: Source,
}

impl SyntheticRecord {
    /// Attribute values in schema order
    #[must_use]
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// Value of a named attribute, if the record carries it
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, value)| value)
    }

    /// Number of attributes in the record
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Weight in the real branch (0 when that branch is inactive)
    #[must_use]
    pub const fn weight_real(&self) -> f64 {
        self.weight_real
    }

    /// Weight in the randomized branch (0 when that branch is inactive)
    #[must_use]
    pub const fn weight_randomized(&self) -> f64 {
        self.weight_randomized
    }

    /// Ordering the record was drawn from
    #[must_use]
    pub const fn source(&self) -> Source {
        self.source
    }

    /// Consume the record into its values
    #[must_use]
    pub fn into_values(self) -> Vec<(String, Value)> {
        self.values
    }
}

/// Validated traversal options
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    breadth_first: bool,
    flip: bool,
    forced: BTreeMap<String, Value>,
    min_depth: usize,
    max_depth: usize,
    limit: Option<usize>,
    interleave: f64,
    max_frontier: usize,
}

impl SamplerOptions {
    /// Start an options builder
    #[must_use]
    pub fn builder() -> SamplerOptionsBuilder {
        SamplerOptionsBuilder::default()
    }

    /// Level-by-level traversal (otherwise depth-first)
    #[must_use]
    pub const fn breadth_first(&self) -> bool {
        self.breadth_first
    }

    /// Flip-mode debiasing (otherwise resample)
    #[must_use]
    pub const fn flip(&self) -> bool {
        self.flip
    }

    /// Forced attribute values
    #[must_use]
    pub const fn forced(&self) -> &BTreeMap<String, Value> {
        &self.forced
    }

    /// Smallest emitted depth
    #[must_use]
    pub const fn min_depth(&self) -> usize {
        self.min_depth
    }

    /// Largest explored depth
    ///
    /// A running `Sampler` reports this capped at the attribute count.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Cap on emitted records
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Fraction of records drawn from the randomized branch
    #[must_use]
    pub const fn interleave(&self) -> f64 {
        self.interleave
    }

    /// Cap on combinations kept per level
    #[must_use]
    pub const fn max_frontier(&self) -> usize {
        self.max_frontier
    }
}

/// Builder for [`SamplerOptions`]
#[derive(Debug, Clone)]
pub struct SamplerOptionsBuilder {
    options: SamplerOptions,
}

impl Default for SamplerOptionsBuilder {
    fn default() -> Self {
        Self {
            options: SamplerOptions {
                breadth_first: true,
                flip: true,
                forced: BTreeMap::new(),
                min_depth: 1,
                max_depth: 3,
                limit: None,
                interleave: 0.0,
                max_frontier: DEFAULT_MAX_FRONTIER,
            },
        }
    }
}

impl SamplerOptionsBuilder {
    /// Level-by-level (`true`) or depth-first (`false`) traversal
    #[must_use]
    pub const fn breadth_first(mut self, breadth_first: bool) -> Self {
        self.options.breadth_first = breadth_first;
        self
    }

    /// Flip (`true`) or resample (`false`) debiasing
    #[must_use]
    pub const fn flip(mut self, flip: bool) -> Self {
        self.options.flip = flip;
        self
    }

    /// Debiasing matching a randomization method
    #[must_use]
    pub const fn method(self, method: RandomizationMethod) -> Self {
        self.flip(method.flips())
    }

    /// Force an attribute to a value in every record
    #[must_use]
    pub fn target(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.forced.insert(attribute.into(), value.into());
        self
    }

    /// Replace all forced attributes
    #[must_use]
    pub fn forced(mut self, forced: BTreeMap<String, Value>) -> Self {
        self.options.forced = forced;
        self
    }

    /// Smallest emitted depth
    #[must_use]
    pub const fn min_depth(mut self, min_depth: usize) -> Self {
        self.options.min_depth = min_depth;
        self
    }

    /// Largest explored depth
    #[must_use]
    pub const fn max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    /// Cap on emitted records (`None` for no cap)
    #[must_use]
    pub fn limit(mut self, limit: impl Into<Option<usize>>) -> Self {
        self.options.limit = limit.into();
        self
    }

    /// Fraction of records drawn from the randomized branch
    #[must_use]
    pub const fn interleave(mut self, interleave: f64) -> Self {
        self.options.interleave = interleave;
        self
    }

    /// Cap on combinations kept per level
    #[must_use]
    pub const fn max_frontier(mut self, max_frontier: usize) -> Self {
        self.options.max_frontier = max_frontier;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// - `InvalidDepthRange` unless `1 <= min_depth <= max_depth` and at most
    ///   `max_depth` attributes are forced
    /// - `InvalidInput` if `interleave` is outside `[0, 1]` or `max_frontier` is 0
    pub fn build(self) -> Result<SamplerOptions> {
        let options = self.options;
        if options.min_depth == 0
            || options.min_depth > options.max_depth
            || options.forced.len() > options.max_depth
        {
            return Err(Error::InvalidDepthRange {
                min_depth: options.min_depth,
                max_depth: options.max_depth,
            });
        }
        if !(0.0..=1.0).contains(&options.interleave) {
            return Err(Error::InvalidInput(format!(
                "interleave must lie in [0, 1], got {}",
                options.interleave
            )));
        }
        if options.max_frontier == 0 {
            return Err(Error::InvalidInput(
                "max_frontier must be at least 1".to_string(),
            ));
        }
        Ok(options)
    }
}

struct BreadthState {
    depth: usize,
    level: Vec<Combination>,
    plan: VecDeque<(usize, Source)>,
}

struct DepthState {
    stack: Vec<Combination>,
    /// Combinations generated so far per depth, for stream ids
    generated: Vec<usize>,
}

enum Traversal {
    Breadth(BreadthState),
    Depth(DepthState),
}

/// Lazy, finite sequence of synthetic records
///
/// Errors end the sequence: after yielding an `Err` the iterator returns
/// `None`.
pub struct Sampler {
    tables: SampleTables,
    params: PrivacyParameters,
    options: SamplerOptions,
    forced_mask: Vec<bool>,
    base_rng: ChaCha8Rng,
    traversal: Traversal,
    emitted: usize,
    cancel: Option<Arc<AtomicBool>>,
    done: bool,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("params", &self.params)
            .field("options", &self.options)
            .field("emitted", &self.emitted)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

fn expander<'a>(
    tables: &'a SampleTables,
    forced_mask: &'a [bool],
    params: &PrivacyParameters,
    options: &SamplerOptions,
) -> Expander<'a> {
    Expander {
        original: &tables.original,
        randomized: &tables.randomized,
        forced: forced_mask,
        pr: params.pr(),
        pf: params.pf(),
        flip: options.flip,
        interleave: options.interleave,
        max_depth: options.max_depth,
    }
}

/// Start sampling
///
/// Draws one seed from `rng`; every later random choice derives from it, so
/// the same `rng` state reproduces the same records.
///
/// # Errors
/// - `UnknownAttribute` if a forced attribute is not in the mapping
/// - `UnknownValue` if a forced value was never observed
#[tracing::instrument(skip_all, fields(
    rows = tables.original().num_rows(),
    interleave = options.interleave(),
    max_depth = options.max_depth(),
))]
pub fn sample<R: Rng>(
    tables: SampleTables,
    params: PrivacyParameters,
    options: SamplerOptions,
    rng: &mut R,
) -> Result<Sampler> {
    let width = tables.original.num_attributes();
    let mut options = options;
    // No combination is deeper than the attribute count
    options.max_depth = options.max_depth.min(width);
    let mut forced_mask = vec![false; width];
    let mut forced_codes: Vec<(usize, Code)> = Vec::with_capacity(options.forced.len());
    for (name, value) in &options.forced {
        let code = tables.mapping.discretize(value, name)?;
        let index = tables
            .mapping
            .attribute_index(name)
            .ok_or_else(|| Error::UnknownAttribute(name.clone()))?;
        forced_mask[index] = true;
        forced_codes.push((index, code));
    }
    forced_codes.sort_unstable();

    let base_rng = ChaCha8Rng::seed_from_u64(rng.gen());
    let root_depth = forced_codes.len();
    let traversal = {
        let ex = expander(&tables, &forced_mask, &params, &options);
        let root = ex.root(&forced_codes);
        if options.breadth_first {
            let mut level = vec![root];
            let plan = plan_level(&ex, &base_rng, root_depth, &mut level, &options);
            Traversal::Breadth(BreadthState {
                depth: root_depth,
                level,
                plan,
            })
        } else {
            Traversal::Depth(DepthState {
                stack: vec![root],
                generated: vec![0; options.max_depth + 1],
            })
        }
    };

    tracing::info!(
        attributes = width,
        forced = root_depth,
        min_depth = options.min_depth,
        limit = ?options.limit,
        breadth_first = options.breadth_first,
        "sampling started"
    );

    Ok(Sampler {
        tables,
        params,
        options,
        forced_mask,
        base_rng,
        traversal,
        emitted: 0,
        cancel: None,
        done: false,
    })
}

/// Discretize, randomize and start sampling a dataset
///
/// # Errors
/// - `UnsupportedMechanism` for an unknown `config.method`
/// - `InvalidDepthRange` / `InvalidInput` for invalid options
/// - `EmptyDomain` if `config.exclude` removes every attribute
/// - `UnknownAttribute` / `UnknownValue` for unusable targets
#[tracing::instrument(skip_all, fields(rows = dataset.num_rows(), epsilon = config.epsilon))]
pub fn randomized_sample<R: Rng>(
    dataset: &Dataset,
    config: &SamplerConfig,
    rng: &mut R,
) -> Result<Sampler> {
    let method = config.method()?;
    let params = PrivacyParameters::from_epsilon(config.epsilon)?;
    let options = config.to_options(dataset.schema())?;

    let (original, mapping, reverse_mapping) = discretize(dataset, config.exclude.as_slice())?;
    let randomized = randomize(&original, params.pf(), method.flips(), rng)?;
    let tables = SampleTables::new(mapping, reverse_mapping, randomized, original)?;
    sample(tables, params, options, rng)
}

impl Sampler {
    /// Stop at the next level transition once `flag` is set
    #[must_use]
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Records emitted so far
    #[must_use]
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// Privacy parameters of this call
    #[must_use]
    pub const fn params(&self) -> &PrivacyParameters {
        &self.params
    }

    /// Options of this call
    #[must_use]
    pub const fn options(&self) -> &SamplerOptions {
        &self.options
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            tracing::info!(emitted = self.emitted, "sampling finished");
        }
    }

    fn limit_reached(&self) -> bool {
        self.options.limit.is_some_and(|limit| self.emitted >= limit)
    }

    fn next_breadth_first(&mut self) -> Option<Result<SyntheticRecord>> {
        loop {
            if self.limit_reached() {
                self.finish();
                return None;
            }
            let cancelled = self.cancelled();
            let Self {
                tables,
                params,
                options,
                forced_mask,
                base_rng,
                traversal,
                emitted,
                ..
            } = &mut *self;
            let Traversal::Breadth(state) = traversal else {
                return None;
            };

            if let Some((index, source)) = state.plan.pop_front() {
                let record = decode(tables, &state.level[index], source);
                *emitted += 1;
                return Some(record);
            }
            if state.depth >= options.max_depth {
                self.finish();
                return None;
            }
            if cancelled {
                tracing::debug!(depth = state.depth, "sampling cancelled");
                self.finish();
                return Some(Err(Error::Cancelled));
            }

            let ex = expander(tables, forced_mask, params, options);
            let mut next = ex.expand_level(&state.level);
            let depth = state.depth + 1;
            let plan = plan_level(&ex, base_rng, depth, &mut next, options);
            ex.attach_rows(&state.level, &mut next);
            tracing::debug!(
                depth,
                parents = state.level.len(),
                combinations = next.len(),
                planned = plan.len(),
                "expanded level"
            );
            *state = BreadthState {
                depth,
                level: next,
                plan,
            };
            if state.level.is_empty() {
                self.finish();
                return None;
            }
        }
    }

    fn next_depth_first(&mut self) -> Option<Result<SyntheticRecord>> {
        loop {
            if self.limit_reached() {
                self.finish();
                return None;
            }
            let cancelled = self.cancelled();
            let Self {
                tables,
                params,
                options,
                forced_mask,
                base_rng,
                traversal,
                emitted,
                ..
            } = &mut *self;
            let Traversal::Depth(state) = traversal else {
                return None;
            };

            let Some(node) = state.stack.pop() else {
                self.finish();
                return None;
            };
            let depth = node.assignment.len();

            if depth < options.max_depth {
                if cancelled {
                    tracing::debug!(depth, "sampling cancelled");
                    self.finish();
                    return Some(Err(Error::Cancelled));
                }
                let ex = expander(tables, forced_mask, params, options);
                let children = ex.expand(&node, 0);
                let child_depth = depth + 1;
                let first_index = state.generated[child_depth];
                state.generated[child_depth] += children.len();

                let keys: Vec<f64> = children
                    .iter()
                    .enumerate()
                    .map(|(i, c)| ex.keys(base_rng, child_depth, first_index + i, c).mixed)
                    .collect();
                let order = top_k_by_key(&keys, options.max_frontier);
                let mut keep = order.clone();
                keep.sort_unstable();
                let mut slots: Vec<Option<Combination>> = children.into_iter().map(Some).collect();
                let mut kept: Vec<Combination> =
                    keep.iter().filter_map(|&i| slots[i].take()).collect();
                ex.attach_rows(std::slice::from_ref(&node), &mut kept);
                for (&i, child) in keep.iter().zip(kept) {
                    slots[i] = Some(child);
                }
                // Highest key on top of the stack
                for &i in order.iter().rev() {
                    if let Some(child) = slots[i].take() {
                        state.stack.push(child);
                    }
                }
            }

            if depth >= options.min_depth {
                let record = decode(tables, &node, Source::Mixed);
                *emitted += 1;
                return Some(record);
            }
        }
    }
}

impl Iterator for Sampler {
    type Item = Result<SyntheticRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.traversal {
            Traversal::Breadth(_) => self.next_breadth_first(),
            Traversal::Depth(_) => self.next_depth_first(),
        };
        if matches!(item, Some(Err(_))) {
            self.finish();
        }
        item
    }
}

impl FusedIterator for Sampler {}

/// Cap a freshly expanded level and plan its emission order
fn plan_level(
    ex: &Expander<'_>,
    base_rng: &ChaCha8Rng,
    depth: usize,
    level: &mut Vec<Combination>,
    options: &SamplerOptions,
) -> VecDeque<(usize, Source)> {
    let mut keys: Vec<_> = level
        .iter()
        .enumerate()
        .map(|(i, c)| ex.keys(base_rng, depth, i, c))
        .collect();

    if level.len() > options.max_frontier {
        let mixed: Vec<f64> = keys.iter().map(|k| k.mixed).collect();
        let mut keep = top_k_by_key(&mixed, options.max_frontier);
        keep.sort_unstable();
        tracing::warn!(
            depth,
            combinations = level.len(),
            max_frontier = options.max_frontier,
            "frontier capped"
        );

        let mut slots: Vec<Option<Combination>> =
            std::mem::take(level).into_iter().map(Some).collect();
        *level = keep.iter().filter_map(|&i| slots[i].take()).collect();
        keys = keep.iter().map(|&i| keys[i]).collect();
    }

    if depth < options.min_depth {
        return VecDeque::new();
    }

    let real: Vec<f64> = keys.iter().map(|k| k.real).collect();
    let randomized: Vec<f64> = keys.iter().map(|k| k.randomized).collect();
    interleave_order(
        &order_by_key(&real),
        &order_by_key(&randomized),
        options.interleave,
        level.len(),
    )
}

/// Merge the two branch orderings by the interleave rule
#[allow(clippy::cast_precision_loss)]
fn interleave_order(
    real: &[usize],
    randomized: &[usize],
    interleave: f64,
    len: usize,
) -> VecDeque<(usize, Source)> {
    let mut seen = vec![false; len];
    let (mut r, mut f) = (0, 0);
    let mut plan = VecDeque::new();

    for k in 1usize.. {
        while r < real.len() && seen[real[r]] {
            r += 1;
        }
        while f < randomized.len() && seen[randomized[f]] {
            f += 1;
        }
        let prefer_randomized =
            (k as f64 * interleave).floor() > ((k - 1) as f64 * interleave).floor();
        let pick = match (prefer_randomized, real.get(r), randomized.get(f)) {
            (true, _, Some(&i)) | (false, None, Some(&i)) => (i, Source::Randomized),
            (false, Some(&i), _) | (true, Some(&i), None) => (i, Source::Real),
            (_, None, None) => break,
        };
        seen[pick.0] = true;
        plan.push_back(pick);
    }
    plan
}

fn decode(
    tables: &SampleTables,
    combination: &Combination,
    source: Source,
) -> Result<SyntheticRecord> {
    let names = tables.reverse_mapping.attributes();
    let values = combination
        .assignment
        .iter()
        .map(|&(attr, code)| {
            let value = tables.reverse_mapping.decode_at(attr, code)?;
            Ok((names[attr].clone(), value.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SyntheticRecord {
        depth: values.len(),
        values,
        weight_real: combination.weight_real,
        weight_randomized: combination.weight_randomized,
        source,
    })
}
