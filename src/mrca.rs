//src/mrca.rs

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::lineage::LineageResolver;
use crate::taxonomy::{TaxonomyError, TaxonomyIndex};
use crate::types::{MrcaRecord, CANONICAL_RANKS, SPECIES_RANK, UNRESOLVED_RANK};

type RankSlots = [Option<String>; CANONICAL_RANKS.len()];

/// How the per-query consensus is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsensusMode {
    /// Compare projected rank names across candidates, shallow to deep,
    /// stopping at the first disagreement. Matches the reference tool; two
    /// unrelated taxa sharing a rank label will (wrongly) agree.
    #[default]
    RankNames,
    /// Fold candidate taxon ids through a true lowest-common-ancestor walk
    /// over the parent tree and report the LCA node's projection.
    TaxonLca,
}

/// Resolves candidate species sets to one MRCA consensus record per query.
///
/// Holds the species-name resolution cache and the lineage cache; both are
/// safe to hit from parallel query workers.
pub struct MrcaResolver {
    index: Arc<TaxonomyIndex>,
    lineages: LineageResolver,
    mode: ConsensusMode,
    /// Species name -> taxon id; `None` marks names absent from the taxonomy
    /// so misses are only looked up once and can be reported at the end.
    resolved: RwLock<AHashMap<String, Option<u32>>>,
}

impl MrcaResolver {
    pub fn new(index: Arc<TaxonomyIndex>, mode: ConsensusMode) -> Self {
        let lineages = LineageResolver::new(index.clone());
        Self {
            index,
            lineages,
            mode,
            resolved: RwLock::new(AHashMap::new()),
        }
    }

    /// Exact name lookup after normalizing whitespace to the underscore
    /// convention of the taxonomy dump. A miss is not fatal; it is cached
    /// and the name is excluded from consensus.
    pub fn resolve_species(&self, name: &str) -> Option<u32> {
        if let Some(cached) = self.resolved.read().get(name) {
            return *cached;
        }
        let id = self.index.lookup(&name.replace(' ', "_"));
        if id.is_none() {
            log::debug!("species {:?} not in taxonomy", name);
        }
        *self
            .resolved
            .write()
            .entry(name.to_string())
            .or_insert(id)
    }

    /// Names that failed resolution so far, sorted, for end-of-run reporting.
    pub fn unresolved_species(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resolved
            .read()
            .iter()
            .filter(|(_, id)| id.is_none())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Reduces one query's candidate set to its consensus record. Unresolved
    /// candidates are excluded; taxonomy-level failures (cycles, dangling
    /// parents) abort the run.
    pub fn resolve_query(
        &self,
        query_id: &str,
        candidates: &[String],
        pident: Option<f64>,
        qcov: Option<u32>,
    ) -> Result<MrcaRecord, TaxonomyError> {
        let ids: Vec<u32> = candidates
            .iter()
            .filter_map(|name| self.resolve_species(name))
            .collect();

        if ids.is_empty() {
            return Ok(MrcaRecord {
                query_id: query_id.to_string(),
                ranks: Default::default(),
                species: None,
                consensus_rank: UNRESOLVED_RANK,
                consensus_name: None,
                pident,
                qcov,
                candidates: candidates.to_vec(),
            });
        }

        if ids.len() == 1 {
            // a single resolvable candidate keeps its full identity
            let projected = self.lineages.projected(ids[0])?;
            let name = self.taxon_name(ids[0]);
            return Ok(MrcaRecord {
                query_id: query_id.to_string(),
                ranks: projected.slots.clone(),
                species: Some(name.clone()),
                consensus_rank: SPECIES_RANK,
                consensus_name: Some(name),
                pident,
                qcov,
                candidates: candidates.to_vec(),
            });
        }

        let (ranks, species) = match self.mode {
            ConsensusMode::RankNames => self.rank_name_consensus(&ids)?,
            ConsensusMode::TaxonLca => self.lca_consensus(&ids)?,
        };

        let (consensus_rank, consensus_name) = if let Some(name) = &species {
            (SPECIES_RANK, Some(name.clone()))
        } else if let Some(i) = ranks.iter().rposition(|slot| slot.is_some()) {
            (CANONICAL_RANKS[i], ranks[i].clone())
        } else {
            (UNRESOLVED_RANK, None)
        };

        Ok(MrcaRecord {
            query_id: query_id.to_string(),
            ranks,
            species,
            consensus_rank,
            consensus_name,
            pident,
            qcov,
            candidates: candidates.to_vec(),
        })
    }

    fn taxon_name(&self, id: u32) -> String {
        self.index
            .node(id)
            .map(|node| node.name.clone())
            .unwrap_or_default()
    }

    /// Rank-name consensus, the reference behavior: accept a rank only while
    /// every candidate agrees exactly there and at every shallower accepted
    /// rank. A rank missing from every candidate is skipped; a rank missing
    /// from only some candidates, or carrying different names, stops the scan.
    fn rank_name_consensus(
        &self,
        ids: &[u32],
    ) -> Result<(RankSlots, Option<String>), TaxonomyError> {
        let mut projections = Vec::with_capacity(ids.len());
        for &id in ids {
            projections.push(self.lineages.projected(id)?);
        }

        let mut ranks = RankSlots::default();
        for i in 0..CANONICAL_RANKS.len() {
            let slots: Vec<Option<&String>> =
                projections.iter().map(|p| p.slots[i].as_ref()).collect();
            if slots.iter().all(|slot| slot.is_none()) {
                // rank absent from every candidate, nothing to disagree on
                continue;
            }
            let first = match slots[0] {
                Some(name) => name,
                None => break,
            };
            if slots[1..].iter().any(|slot| *slot != Some(first)) {
                break;
            }
            ranks[i] = Some(first.clone());
        }

        // distinct candidate names can still resolve to one taxon
        let species = if ids.iter().all(|&id| id == ids[0]) {
            Some(self.taxon_name(ids[0]))
        } else {
            None
        };
        Ok((ranks, species))
    }

    /// Strict mode: fold the candidates through a true LCA over taxon ids and
    /// report the LCA node's projected lineage.
    fn lca_consensus(&self, ids: &[u32]) -> Result<(RankSlots, Option<String>), TaxonomyError> {
        let mut lca_id = ids[0];
        for &id in &ids[1..] {
            lca_id = self.lca(lca_id, id)?;
        }
        let projected = self.lineages.projected(lca_id)?;
        let species = match self.index.node(lca_id) {
            Some(node) if node.rank == SPECIES_RANK => Some(node.name.clone()),
            _ => None,
        };
        Ok((projected.slots.clone(), species))
    }

    /// Lowest common ancestor of `a` and `b` in the parent tree: collect
    /// `a`'s ancestor set, then walk `b` upward until the chains meet.
    fn lca(&self, a: u32, b: u32) -> Result<u32, TaxonomyError> {
        if a == b {
            return Ok(a);
        }
        let a_chain: AHashSet<u32> = self
            .lineages
            .lineage(a)?
            .iter()
            .map(|entry| entry.tax_id)
            .collect();
        for entry in self.lineages.lineage(b)? {
            if a_chain.contains(&entry.tax_id) {
                return Ok(entry.tax_id);
            }
        }
        // both chains end at the root, so the walks always meet
        Ok(self.index.root_id())
    }
}
