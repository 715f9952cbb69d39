//! Frontier arena: partial attribute combinations and their expansion
//!
//! A level is a plain `Vec<Combination>`; a combination is addressed by
//! `(depth, index)` and records the index of its parent in the previous
//! level. A level can be dropped as soon as the next one has its rows.
//!
//! Expansion runs in two phases. `expand_level` computes children with
//! weights only; after the caller ranks and caps them, `attach_rows` fills
//! the matching rows of the survivors. Row lists therefore never exceed two
//! branches times `max_frontier` combinations times the table height, per
//! level, whatever the number of candidate combinations.

use crate::backend::{Backend, BackendDispatcher};
use crate::discretize::{Code, DiscretizedTable};
use crate::privacy::debias;
use crate::topk::weighted_key;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Row index into a discretized table
pub(crate) type RowId = u32;

/// One partial assignment with its branch weights
#[derive(Debug, Clone)]
pub(crate) struct Combination {
    /// `(attribute index, code)` pairs sorted by attribute index
    pub assignment: Vec<(usize, Code)>,
    /// Largest non-forced attribute index present
    pub last_free: Option<usize>,
    /// Index of the parent in the previous level
    parent: usize,
    pub weight_real: f64,
    pub weight_randomized: f64,
    /// Matching rows of the original table (empty until attached)
    real_rows: Vec<RowId>,
    /// Matching rows of the randomized table
    random_rows: Vec<RowId>,
}

impl Combination {
    fn code_of(&self, attr: usize) -> Option<Code> {
        self.assignment
            .iter()
            .find(|&&(a, _)| a == attr)
            .map(|&(_, code)| code)
    }
}

/// Sampling keys of one combination
#[derive(Debug, Clone, Copy)]
pub(crate) struct Keys {
    pub real: f64,
    pub randomized: f64,
    pub mixed: f64,
}

/// Read-only context shared by every expansion of one sampling call
#[derive(Debug)]
pub(crate) struct Expander<'a> {
    pub original: &'a DiscretizedTable,
    pub randomized: &'a DiscretizedTable,
    pub forced: &'a [bool],
    pub pr: f64,
    pub pf: f64,
    pub flip: bool,
    pub interleave: f64,
    pub max_depth: usize,
}

impl Expander<'_> {
    fn real_active(&self) -> bool {
        self.interleave < 1.0
    }

    fn random_active(&self) -> bool {
        self.interleave > 0.0
    }

    /// Mixture weight used for frontier capping and depth-first ordering
    pub fn mixture(&self, combination: &Combination) -> f64 {
        (1.0 - self.interleave)
            .mul_add(combination.weight_real, self.interleave * combination.weight_randomized)
    }

    /// Root combination holding the forced codes
    pub fn root(&self, forced_codes: &[(usize, Code)]) -> Combination {
        let keep_rows = forced_codes.len() < self.max_depth;
        let matching = |table: &DiscretizedTable, active: bool| -> Vec<RowId> {
            if !(active && keep_rows) {
                return Vec::new();
            }
            (0..table.num_rows())
                .filter(|&row| forced_codes.iter().all(|&(a, c)| table.code(row, a) == c))
                .map(to_row_id)
                .collect()
        };

        Combination {
            assignment: forced_codes.to_vec(),
            last_free: None,
            parent: 0,
            weight_real: if self.real_active() { 1.0 } else { 0.0 },
            weight_randomized: if self.random_active() { 1.0 } else { 0.0 },
            real_rows: matching(self.original, self.real_active()),
            random_rows: matching(self.randomized, self.random_active()),
        }
    }

    /// Children of `parent`, one per candidate attribute and code
    ///
    /// Candidates are the non-forced attributes after `parent.last_free`, so
    /// every attribute subset is reached along exactly one path. Children
    /// carry no rows; see [`Expander::attach_rows`].
    pub fn expand(&self, parent: &Combination, parent_index: usize) -> Vec<Combination> {
        let start = parent.last_free.map_or(0, |a| a + 1);
        let mut children = Vec::new();

        for attr in (start..self.forced.len()).filter(|&a| !self.forced[a]) {
            let domain = self.original.domain_sizes()[attr];
            let real = conditional(
                self.original,
                &parent.real_rows,
                attr,
                domain,
                self.real_active() && parent.weight_real > 0.0,
                self.pr,
                self.flip,
            );
            let random = conditional(
                self.randomized,
                &parent.random_rows,
                attr,
                domain,
                self.random_active() && parent.weight_randomized > 0.0,
                self.pf,
                self.flip,
            );

            for code in 0..domain {
                let weight_real = parent.weight_real * real[code];
                let weight_randomized = parent.weight_randomized * random[code];
                if weight_real <= 0.0 && weight_randomized <= 0.0 {
                    continue;
                }

                let mut assignment = parent.assignment.clone();
                #[allow(clippy::cast_possible_truncation)]
                let entry = (attr, code as Code);
                let position = assignment.partition_point(|&(a, _)| a < attr);
                assignment.insert(position, entry);

                children.push(Combination {
                    assignment,
                    last_free: Some(attr),
                    parent: parent_index,
                    weight_real,
                    weight_randomized,
                    real_rows: Vec::new(),
                    random_rows: Vec::new(),
                });
            }
        }
        children
    }

    /// Expand a whole level, preserving parent order
    pub fn expand_level(&self, level: &[Combination]) -> Vec<Combination> {
        match BackendDispatcher::select(level.len(), matched_rows(level)) {
            #[cfg(feature = "rayon")]
            Backend::Parallel => level
                .par_iter()
                .enumerate()
                .map(|(index, parent)| self.expand(parent, index))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect(),
            _ => level
                .iter()
                .enumerate()
                .flat_map(|(index, parent)| self.expand(parent, index))
                .collect(),
        }
    }

    /// Fill the matching rows of `children` from their parents in `parents`
    ///
    /// `children` must keep the relative order `expand_level` produced them
    /// in (a capped subset is fine). Children at `max_depth` are never
    /// expanded again and stay without rows.
    pub fn attach_rows(&self, parents: &[Combination], children: &mut [Combination]) {
        let Some(first) = children.first() else {
            return;
        };
        if first.assignment.len() >= self.max_depth {
            return;
        }

        // Siblings from one (parent, attribute) pair are contiguous
        let mut groups = Vec::new();
        let mut rest = children;
        while !rest.is_empty() {
            let key = (rest[0].parent, rest[0].last_free);
            let len = rest
                .iter()
                .take_while(|c| (c.parent, c.last_free) == key)
                .count();
            let (group, tail) = std::mem::take(&mut rest).split_at_mut(len);
            groups.push(group);
            rest = tail;
        }

        match BackendDispatcher::select(groups.len(), matched_rows(parents)) {
            #[cfg(feature = "rayon")]
            Backend::Parallel => groups
                .into_par_iter()
                .for_each(|group| self.attach_group(parents, group)),
            _ => groups
                .into_iter()
                .for_each(|group| self.attach_group(parents, group)),
        }
    }

    fn attach_group(&self, parents: &[Combination], group: &mut [Combination]) {
        let Some((parent_index, Some(attr))) = group.first().map(|c| (c.parent, c.last_free)) else {
            return;
        };
        let Some(parent) = parents.get(parent_index) else {
            return;
        };
        let domain = self.original.domain_sizes()[attr];
        let needs_real = group.iter().any(|c| c.weight_real > 0.0);
        let needs_random = group.iter().any(|c| c.weight_randomized > 0.0);
        let mut real = bucket_rows(self.original, &parent.real_rows, attr, domain, needs_real);
        let mut random = bucket_rows(self.randomized, &parent.random_rows, attr, domain, needs_random);

        for child in group {
            let Some(code) = child.code_of(attr) else {
                continue;
            };
            let code = code as usize;
            if child.weight_real > 0.0 {
                child.real_rows = real.get_mut(code).map(std::mem::take).unwrap_or_default();
            }
            if child.weight_randomized > 0.0 {
                child.random_rows = random.get_mut(code).map(std::mem::take).unwrap_or_default();
            }
        }
    }

    /// Draw the three sampling keys of the combination at `(depth, index)`
    ///
    /// Every combination reads its own ChaCha stream, so keys do not depend
    /// on the order in which combinations are visited.
    pub fn keys(&self, base: &ChaCha8Rng, depth: usize, index: usize, c: &Combination) -> Keys {
        let mut rng = base.clone();
        rng.set_stream(stream_id(depth, index));
        Keys {
            real: weighted_key(c.weight_real, rng.gen()),
            randomized: weighted_key(c.weight_randomized, rng.gen()),
            mixed: weighted_key(self.mixture(c), rng.gen()),
        }
    }
}

fn matched_rows(level: &[Combination]) -> usize {
    level
        .iter()
        .map(|c| c.real_rows.len() + c.random_rows.len())
        .sum()
}

/// Debiased conditional code distribution of `attr` over `rows`
#[allow(clippy::cast_precision_loss)]
fn conditional(
    table: &DiscretizedTable,
    rows: &[RowId],
    attr: usize,
    domain: usize,
    active: bool,
    flip_probability: f64,
    flip: bool,
) -> Vec<f64> {
    if !active || rows.is_empty() {
        return vec![0.0; domain];
    }

    let mut counts = vec![0usize; domain];
    for &row in rows {
        counts[table.code(row as usize, attr) as usize] += 1;
    }
    let total = rows.len() as f64;
    let observed: Vec<f64> = counts.iter().map(|&n| n as f64 / total).collect();
    debias(&observed, flip_probability, flip)
}

/// Split `rows` by their code of `attr`
fn bucket_rows(
    table: &DiscretizedTable,
    rows: &[RowId],
    attr: usize,
    domain: usize,
    needed: bool,
) -> Vec<Vec<RowId>> {
    if !needed {
        return Vec::new();
    }
    let mut buckets = vec![Vec::new(); domain];
    for &row in rows {
        buckets[table.code(row as usize, attr) as usize].push(row);
    }
    buckets
}

#[allow(clippy::cast_possible_truncation)]
const fn to_row_id(row: usize) -> RowId {
    row as RowId
}

/// Stream id of `(depth, index)`: depth in the high bits
pub(crate) const fn stream_id(depth: usize, index: usize) -> u64 {
    ((depth as u64) << 40) | (index as u64 & ((1 << 40) - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn tables() -> (DiscretizedTable, DiscretizedTable) {
        // a ∈ {0, 1}, b ∈ {0, 1, 2}
        let rows = vec![
            vec![0, 0],
            vec![0, 1],
            vec![1, 1],
            vec![1, 2],
            vec![1, 2],
            vec![0, 0],
        ];
        let names = vec!["a".to_string(), "b".to_string()];
        let original = DiscretizedTable::from_rows(names.clone(), vec![2, 3], &rows).unwrap();
        let mut flipped = rows;
        flipped[0] = vec![1, 0];
        let randomized = DiscretizedTable::from_rows(names, vec![2, 3], &flipped).unwrap();
        (original, randomized)
    }

    fn expander<'a>(
        original: &'a DiscretizedTable,
        randomized: &'a DiscretizedTable,
        forced: &'a [bool],
        interleave: f64,
    ) -> Expander<'a> {
        Expander {
            original,
            randomized,
            forced,
            pr: 0.0,
            pf: 0.0,
            flip: true,
            interleave,
            max_depth: 2,
        }
    }

    #[test]
    fn test_root_without_forced_matches_all_rows() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = expander(&original, &randomized, &forced, 0.5);
        let root = ex.root(&[]);
        assert!(root.assignment.is_empty());
        assert_eq!(root.real_rows.len(), 6);
        assert_eq!(root.random_rows.len(), 6);
    }

    #[test]
    fn test_expand_weights_are_conditional_frequencies() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = expander(&original, &randomized, &forced, 0.0);
        let children = ex.expand(&ex.root(&[]), 0);

        // a=0 (3/6), a=1 (3/6), b=0 (2/6), b=1 (2/6), b=2 (2/6)
        assert_eq!(children.len(), 5);
        assert_eq!(children[0].assignment, vec![(0, 0)]);
        assert!((children[0].weight_real - 0.5).abs() < 1e-12);
        assert!((children[2].weight_real - 2.0 / 6.0).abs() < 1e-12);
        assert!(children.iter().all(|c| c.weight_randomized == 0.0));
    }

    #[test]
    fn test_expand_is_canonical() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = expander(&original, &randomized, &forced, 0.0);
        let root = vec![ex.root(&[])];
        let mut level1 = ex.expand_level(&root);
        ex.attach_rows(&root, &mut level1);
        let level2 = ex.expand_level(&level1);

        // Only {a, b} pairs; never {b, a}
        assert!(level2.iter().all(|c| c.assignment.len() == 2));
        assert!(level2.iter().all(|c| c.assignment[0].0 == 0 && c.assignment[1].0 == 1));
        // Observed pairs: (0,0) (0,1) (1,1) (1,2)
        assert_eq!(level2.len(), 4);
        let total: f64 = level2.iter().map(|c| c.weight_real).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_forced_attribute_is_skipped_and_kept() {
        let (original, randomized) = tables();
        let forced = [true, false];
        let ex = expander(&original, &randomized, &forced, 1.0);
        let root = ex.root(&[(0, 1)]);
        assert_eq!(root.random_rows, vec![0, 2, 3, 4]);

        let children = ex.expand(&root, 0);
        assert!(children.iter().all(|c| c.assignment[0] == (0, 1)));
        assert!(children.iter().all(|c| c.assignment[1].0 == 1));
        assert!(children.iter().all(|c| c.weight_real == 0.0));
    }

    #[test]
    fn test_children_carry_no_rows_until_attached() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = expander(&original, &randomized, &forced, 0.5);
        let root = vec![ex.root(&[])];
        let level1 = ex.expand_level(&root);
        assert!(level1.iter().all(|c| c.real_rows.is_empty() && c.random_rows.is_empty()));

        // Keep only b=1 and b=2, as a capped level would
        let mut kept: Vec<Combination> = level1
            .into_iter()
            .filter(|c| c.assignment == vec![(1, 1)] || c.assignment == vec![(1, 2)])
            .collect();
        ex.attach_rows(&root, &mut kept);
        assert_eq!(kept[0].real_rows, vec![1, 2]);
        assert_eq!(kept[1].real_rows, vec![3, 4]);
        assert_eq!(kept[1].random_rows, vec![3, 4]);
    }

    #[test]
    fn test_rows_not_attached_at_max_depth() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = Expander {
            max_depth: 1,
            ..expander(&original, &randomized, &forced, 0.0)
        };
        let root = vec![ex.root(&[])];
        let mut level1 = ex.expand_level(&root);
        ex.attach_rows(&root, &mut level1);
        assert!(level1.iter().all(|c| c.real_rows.is_empty()));
    }

    #[test]
    fn test_keys_reproducible_per_position() {
        let (original, randomized) = tables();
        let forced = [false, false];
        let ex = expander(&original, &randomized, &forced, 0.5);
        let children = ex.expand(&ex.root(&[]), 0);
        let base = ChaCha8Rng::seed_from_u64(9);

        let a = ex.keys(&base, 1, 3, &children[3]);
        let b = ex.keys(&base, 1, 3, &children[3]);
        let c = ex.keys(&base, 1, 4, &children[3]);
        assert_eq!(a.mixed.to_bits(), b.mixed.to_bits());
        assert_ne!(a.mixed.to_bits(), c.mixed.to_bits());
    }

    #[test]
    fn test_stream_ids_distinct() {
        assert_ne!(stream_id(1, 0), stream_id(0, 1));
        assert_ne!(stream_id(2, 5), stream_id(3, 5));
    }
}
