//src/lineage.rs

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::taxonomy::{TaxonomyError, TaxonomyIndex};
use crate::types::{Lineage, LineageEntry, ProjectedLineage, CANONICAL_RANKS};

/// Upper bound on parent hops before a lineage walk is declared cyclic.
/// Real taxonomies stay far below this depth.
pub const MAX_LINEAGE_HOPS: usize = 128;

/// Builds ancestor chains by walking parent pointers and memoizes the
/// canonical-rank projection per taxon id.
///
/// The cache may be filled from multiple threads; a lost race recomputes an
/// identical entry, which is harmless. Readers only ever see fully built
/// entries because insertion happens under the write lock.
pub struct LineageResolver {
    index: Arc<TaxonomyIndex>,
    projected: RwLock<AHashMap<u32, Arc<ProjectedLineage>>>,
}

impl LineageResolver {
    pub fn new(index: Arc<TaxonomyIndex>) -> Self {
        Self {
            index,
            projected: RwLock::new(AHashMap::new()),
        }
    }

    /// Full ancestor chain from `tax_id` up to and including the root.
    /// Exceeding the hop bound or running off the node table is fatal: the
    /// taxonomy itself is broken, not the query.
    pub fn lineage(&self, tax_id: u32) -> Result<Lineage, TaxonomyError> {
        let mut chain = Vec::new();
        let mut id = tax_id;
        for _ in 0..MAX_LINEAGE_HOPS {
            let node = self.index.node(id).ok_or(if id == tax_id {
                TaxonomyError::UnknownTaxon(id)
            } else {
                TaxonomyError::MissingParent(tax_id, id)
            })?;
            chain.push(LineageEntry {
                rank: node.rank.clone(),
                tax_id: id,
                name: node.name.clone(),
            });
            if node.parent_id == id {
                return Ok(chain);
            }
            id = node.parent_id;
        }
        Err(TaxonomyError::CycleDetected(tax_id, MAX_LINEAGE_HOPS))
    }

    /// Memoized canonical-rank projection of `tax_id`'s lineage.
    pub fn projected(&self, tax_id: u32) -> Result<Arc<ProjectedLineage>, TaxonomyError> {
        if let Some(hit) = self.projected.read().get(&tax_id) {
            return Ok(hit.clone());
        }
        let lineage = self.lineage(tax_id)?;
        let entry = Arc::new(project(&lineage));
        self.projected
            .write()
            .entry(tax_id)
            .or_insert_with(|| entry.clone());
        Ok(entry)
    }

    pub fn index(&self) -> &TaxonomyIndex {
        &self.index
    }
}

/// Restricts a lineage to the canonical rank schema. For each canonical rank
/// the first matching entry fills the slot; ranks absent from the lineage
/// (or extra ranks like subspecies and "no rank") leave it `None`. A taxon
/// without a scientific-name record carries an empty name and leaves its
/// slot unfilled as well, so it still renders as the NA sentinel.
pub fn project(lineage: &Lineage) -> ProjectedLineage {
    let mut out = ProjectedLineage::default();
    for (i, rank) in CANONICAL_RANKS.iter().enumerate() {
        out.slots[i] = lineage
            .iter()
            .find(|entry| entry.rank == *rank && !entry.name.is_empty())
            .map(|entry| entry.name.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::NameRecord;

    fn test_index() -> Arc<TaxonomyIndex> {
        let nodes = vec![
            (1, 1, "no rank".to_string()),
            (2, 1, "phylum".to_string()),
            (3, 2, "class".to_string()),
            (4, 3, "genus".to_string()),
            // parent id that no node record defines
            (5, 99, "genus".to_string()),
            // canonical rank but no scientific-name record
            (6, 3, "order".to_string()),
            (7, 6, "genus".to_string()),
            // disconnected two-node cycle
            (10, 11, "no rank".to_string()),
            (11, 10, "no rank".to_string()),
        ];
        let names: Vec<NameRecord> = vec![
            (1, "root".to_string()),
            (2, "Chordata".to_string()),
            (3, "Mammalia".to_string()),
            (4, "Homo".to_string()),
            (7, "Felis".to_string()),
        ];
        Arc::new(TaxonomyIndex::from_records(nodes, names).unwrap())
    }

    #[test]
    fn lineage_runs_to_the_root_inclusive() {
        let resolver = LineageResolver::new(test_index());
        let chain = resolver.lineage(4).unwrap();

        let ids: Vec<u32> = chain.iter().map(|e| e.tax_id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);

        let last = chain.last().unwrap();
        assert_eq!(last.tax_id, 1);
        assert_eq!(last.name, "root");
    }

    #[test]
    fn lineage_is_idempotent() {
        let resolver = LineageResolver::new(test_index());
        assert_eq!(resolver.lineage(4).unwrap(), resolver.lineage(4).unwrap());
    }

    #[test]
    fn cycle_is_detected_as_fatal() {
        let resolver = LineageResolver::new(test_index());
        let err = resolver.lineage(10).unwrap_err();
        assert!(matches!(err, TaxonomyError::CycleDetected(10, _)));
    }

    #[test]
    fn unknown_taxon_is_fatal() {
        let resolver = LineageResolver::new(test_index());
        let err = resolver.lineage(999).unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownTaxon(999)));
    }

    #[test]
    fn dangling_parent_is_fatal() {
        let resolver = LineageResolver::new(test_index());
        let err = resolver.lineage(5).unwrap_err();
        assert!(matches!(err, TaxonomyError::MissingParent(5, 99)));
    }

    #[test]
    fn projection_is_fixed_width() {
        let resolver = LineageResolver::new(test_index());
        let chain = resolver.lineage(4).unwrap();
        let projected = project(&chain);

        assert_eq!(projected.slots.len(), CANONICAL_RANKS.len());
        assert_eq!(projected.name_at("phylum"), Some("Chordata"));
        assert_eq!(projected.name_at("class"), Some("Mammalia"));
        assert_eq!(projected.name_at("genus"), Some("Homo"));
        // ranks missing from the source stay empty
        assert_eq!(projected.name_at("order"), None);
        assert_eq!(projected.name_at("family"), None);
        assert_eq!(projected.name_at("superkingdom"), None);
    }

    #[test]
    fn unnamed_taxon_leaves_its_slot_empty() {
        let resolver = LineageResolver::new(test_index());
        // node 6 holds the order rank but never got a scientific name
        let projected = project(&resolver.lineage(7).unwrap());

        assert_eq!(projected.name_at("order"), None);
        assert_eq!(projected.name_at("genus"), Some("Felis"));
        assert_eq!(projected.name_at("class"), Some("Mammalia"));
    }

    #[test]
    fn projected_is_memoized() {
        let resolver = LineageResolver::new(test_index());
        let first = resolver.projected(4).unwrap();
        let second = resolver.projected(4).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
