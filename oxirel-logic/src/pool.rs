//! Rule Interning.
//!
//! Structurally identical rules share one [`RuleId`]. Rules are interned in
//! canonical form, so `r(7,4) -> r(4,7)` and `r(1,2) -> r(2,1)` collapse to
//! the same entry. Each [`Logic`](crate::Logic) owns its pool.

use crate::rule::Rule;
use rustc_hash::FxHashMap;

/// Index of an interned rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

impl RuleId {
    /// Position in the pool.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Statistics for the rule pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Interning calls answered by an existing entry.
    pub hits: u64,
    /// Interning calls that created an entry.
    pub misses: u64,
}

/// Content-addressed arena of canonical rules.
#[derive(Debug, Clone, Default)]
pub struct RulePool {
    rules: Vec<Rule>,
    index: FxHashMap<Rule, RuleId>,
    stats: PoolStats,
}

impl RulePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern the canonical form of `rule`.
    pub fn intern(&mut self, rule: &Rule) -> RuleId {
        let canonical = rule.canonical();
        if let Some(&id) = self.index.get(&canonical) {
            self.stats.hits += 1;
            return id;
        }
        self.stats.misses += 1;
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(canonical.clone());
        self.index.insert(canonical, id);
        id
    }

    /// Id of the canonical form of `rule`, if interned.
    pub fn lookup(&self, rule: &Rule) -> Option<RuleId> {
        self.index.get(&rule.canonical()).copied()
    }

    /// Interned rule.
    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index())
    }

    /// Number of distinct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in interning order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(k, r)| (RuleId(k as u32), r))
    }

    /// Get statistics.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Literal;

    #[test]
    fn test_intern_dedup() {
        let mut pool = RulePool::new();
        let a = pool.intern(&Rule::new([Literal::positive(0, 7, 4)], [Literal::positive(0, 4, 7)]));
        let b = pool.intern(&Rule::new([Literal::positive(0, 1, 2)], [Literal::positive(0, 2, 1)]));
        let c = pool.intern(&Rule::new([Literal::positive(0, 1, 2)], [Literal::positive(1, 2, 1)]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 2);
        assert_eq!(pool.get(a).map(|r| r.vars()), Some(vec![1, 2]));
        assert_eq!(
            pool.lookup(&Rule::new([Literal::positive(0, 5, 6)], [Literal::positive(1, 6, 5)])),
            Some(c)
        );
    }
}
