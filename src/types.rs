//src/types.rs

/// Canonical ranks used for lineage projection and output, shallowest first.
pub const CANONICAL_RANKS: [&str; 6] = [
    "superkingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
];

/// Rank label reported when consensus reaches the species level.
pub const SPECIES_RANK: &str = "species";

/// Rank label reported when no rank reaches consensus.
pub const UNRESOLVED_RANK: &str = "unresolved";

/// Sentinel printed for any missing value in the output table.
pub const NA: &str = "NA";

/// One node of the reference taxonomy. The root is the single node with
/// `id == parent_id`.
#[derive(Debug, Clone)]
pub struct TaxonNode {
    pub id: u32,
    pub parent_id: u32,
    pub rank: String,
    pub name: String,
}

/// One step of an ancestor chain: the rank, id, and scientific name of a
/// taxon on the way up to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEntry {
    pub rank: String,
    pub tax_id: u32,
    pub name: String,
}

/// Full ancestor chain of a taxon: the taxon itself first, the root last.
pub type Lineage = Vec<LineageEntry>;

/// A lineage restricted to the canonical rank schema: one slot per entry of
/// `CANONICAL_RANKS`, `None` where the source lineage has no such rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectedLineage {
    pub slots: [Option<String>; CANONICAL_RANKS.len()],
}

impl ProjectedLineage {
    /// Name projected at `rank` (an entry of `CANONICAL_RANKS`), if any.
    pub fn name_at(&self, rank: &str) -> Option<&str> {
        CANONICAL_RANKS
            .iter()
            .position(|r| *r == rank)
            .and_then(|i| self.slots[i].as_deref())
    }

    /// Index of the deepest filled slot, if any slot is filled.
    pub fn deepest_filled(&self) -> Option<usize> {
        self.slots.iter().rposition(|s| s.is_some())
    }
}

/// The per-query consensus record handed off for output.
#[derive(Debug, Clone)]
pub struct MrcaRecord {
    pub query_id: String,
    /// Consensus names per canonical rank, same order as `CANONICAL_RANKS`.
    pub ranks: [Option<String>; CANONICAL_RANKS.len()],
    /// Species-level consensus, present only when every resolvable candidate
    /// is the same taxon (or the set had exactly one resolvable candidate).
    pub species: Option<String>,
    /// Deepest accepted rank: a canonical rank name, "species", or
    /// "unresolved".
    pub consensus_rank: &'static str,
    /// Name at the deepest accepted rank, `None` when unresolved.
    pub consensus_name: Option<String>,
    /// Best-hit scores carried through from ingestion; `None` for queries
    /// without any similarity hit.
    pub pident: Option<f64>,
    pub qcov: Option<u32>,
    /// Candidate species that entered the consensus, in hit order.
    pub candidates: Vec<String>,
}
