// src/lib.rs
pub mod blast;
pub mod lineage;
pub mod mrca;
pub mod taxonomy;
pub mod types;

use std::fmt::Write as FmtWrite;
use std::path::Path;
use std::sync::Arc;

use ahash::AHashSet;
use rayon::prelude::*;

use crate::mrca::{ConsensusMode, MrcaResolver};
use crate::taxonomy::TaxonomyIndex;
use crate::types::{MrcaRecord, CANONICAL_RANKS, NA};

/// A struct to hold one batch's consensus results. Only structured data is
/// stored; the output table text is generated on demand.
pub struct ResolutionResults {
    /// One consensus record per query, in output order.
    pub records: Vec<MrcaRecord>,

    /// Candidate species names that never resolved to a taxon id, sorted.
    pub unresolved_species: Vec<String>,
}

impl ResolutionResults {
    /// Generate the consensus table text on demand: one tab-separated row
    /// per query with the canonical rank columns, species, scores, and the
    /// contributing candidate list. Missing values print as `NA`.
    pub fn get_output(&self) -> String {
        let mut output = String::new();
        output.push_str("#OTU ID");
        for rank in CANONICAL_RANKS {
            output.push('\t');
            output.push_str(rank);
        }
        output.push_str("\tspecies\tpident\tqcov\tmatching species IDs\n");

        for record in &self.records {
            output.push_str(&record.query_id);
            for slot in &record.ranks {
                output.push('\t');
                output.push_str(slot.as_deref().unwrap_or(NA));
            }
            output.push('\t');
            output.push_str(record.species.as_deref().unwrap_or(NA));
            match record.pident {
                // whole values print as 100.0, the reference layout
                Some(pident) if pident.fract() == 0.0 => {
                    write!(output, "\t{:.1}", pident).unwrap()
                }
                Some(pident) => write!(output, "\t{}", pident).unwrap(),
                None => write!(output, "\t{}", NA).unwrap(),
            }
            match record.qcov {
                Some(qcov) => write!(output, "\t{}", qcov).unwrap(),
                None => write!(output, "\t{}", NA).unwrap(),
            }
            output.push('\t');
            if record.candidates.is_empty() {
                output.push_str(NA);
            } else {
                output.push_str(&record.candidates.join(", "));
            }
            output.push('\n');
        }
        output
    }
}

/// Unified batch entry point: ingest the hit table and optional query-id
/// table, load the taxonomy once, then resolve every query's MRCA in
/// parallel.
///
/// Output order follows the query table when one is given (hit-only queries
/// appended in first-seen order), otherwise the hit table's first-seen
/// order. Queries without any hit get an all-NA record.
pub fn resolve_queries(
    nodes_path: &Path,
    names_path: &Path,
    hits_path: &Path,
    table_path: Option<&Path>,
    mode: ConsensusMode,
) -> Result<ResolutionResults, Box<dyn std::error::Error>> {
    // 1. Ingest similarity hits and the query universe
    let hit_table = blast::read_hit_table(hits_path)?;
    let order: Vec<String> = match table_path {
        Some(table_path) => {
            let mut order = blast::read_query_table(table_path)?;
            let known: AHashSet<String> = order.iter().cloned().collect();
            for id in &hit_table.queries {
                if !known.contains(id) {
                    order.push(id.clone());
                }
            }
            order
        }
        None => hit_table.queries.clone(),
    };

    // 2. Build the shared taxonomy index
    let index = Arc::new(TaxonomyIndex::load(nodes_path, names_path)?);

    // 3. Resolve each query independently
    let resolver = MrcaResolver::new(index, mode);
    let records = order
        .par_iter()
        .map(|query_id| match hit_table.hits.get(query_id) {
            Some(hits) => resolver.resolve_query(
                query_id,
                &hits.species,
                Some(hits.pident),
                Some(hits.qcov),
            ),
            None => resolver.resolve_query(query_id, &[], None, None),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let unresolved_species = resolver.unresolved_species();
    if !unresolved_species.is_empty() {
        log::info!(
            "{} candidate species not found in the taxonomy",
            unresolved_species.len()
        );
    }

    Ok(ResolutionResults {
        records,
        unresolved_species,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const NODES: &str = "1\t|\t1\t|\tno rank\t|\n\
                         2\t|\t1\t|\tsuperkingdom\t|\n\
                         3\t|\t2\t|\tphylum\t|\n\
                         4\t|\t3\t|\tclass\t|\n\
                         5\t|\t4\t|\torder\t|\n\
                         6\t|\t5\t|\tfamily\t|\n\
                         7\t|\t6\t|\tgenus\t|\n\
                         8\t|\t6\t|\tgenus\t|\n\
                         9\t|\t7\t|\tspecies\t|\n\
                         10\t|\t8\t|\tspecies\t|\n";

    const NAMES: &str = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
                         2\t|\tEukaryota\t|\t\t|\tscientific name\t|\n\
                         3\t|\tChordata\t|\t\t|\tscientific name\t|\n\
                         4\t|\tMammalia\t|\t\t|\tscientific name\t|\n\
                         5\t|\tPrimates\t|\t\t|\tscientific name\t|\n\
                         6\t|\tHominidae\t|\t\t|\tscientific name\t|\n\
                         7\t|\tHomo\t|\t\t|\tscientific name\t|\n\
                         8\t|\tPan\t|\t\t|\tscientific name\t|\n\
                         9\t|\tHomo sapiens\t|\t\t|\tscientific name\t|\n\
                         10\t|\tPan troglodytes\t|\t\t|\tscientific name\t|\n";

    const HITS: &str = "Zotu1\tacc1\t1200\tHomo sapiens\t9\t99.5\t500\t100\n\
                        Zotu1\tacc2\t1200\tPan troglodytes\t10\t99.5\t500\t100\n\
                        Zotu2\tacc3\t1200\tHomo sapiens\t9\t100\t500\t100\n";

    const TABLE: &str = "#OTU ID\tsample1\nZotu1\t40\nZotu3\t7\n";

    #[test]
    fn batch_resolves_in_query_universe_order() {
        let nodes = write_tmp(NODES);
        let names = write_tmp(NAMES);
        let hits = write_tmp(HITS);
        let table = write_tmp(TABLE);

        let results = resolve_queries(
            nodes.path(),
            names.path(),
            hits.path(),
            Some(table.path()),
            ConsensusMode::RankNames,
        )
        .unwrap();

        let ids: Vec<&str> = results
            .records
            .iter()
            .map(|r| r.query_id.as_str())
            .collect();
        // table order first, then hit-only queries
        assert_eq!(ids, vec!["Zotu1", "Zotu3", "Zotu2"]);

        let output = results.get_output();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "#OTU ID\tsuperkingdom\tphylum\tclass\torder\tfamily\tgenus\
             \tspecies\tpident\tqcov\tmatching species IDs"
        );
        assert_eq!(
            lines[1],
            "Zotu1\tEukaryota\tChordata\tMammalia\tPrimates\tHominidae\tNA\
             \tNA\t99.5\t100\tHomo sapiens, Pan troglodytes"
        );
        // a table-only query still gets its all-NA row
        assert_eq!(lines[2], "Zotu3\tNA\tNA\tNA\tNA\tNA\tNA\tNA\tNA\tNA\tNA");
        assert_eq!(
            lines[3],
            "Zotu2\tEukaryota\tChordata\tMammalia\tPrimates\tHominidae\tHomo\
             \tHomo_sapiens\t100.0\t100\tHomo sapiens"
        );
    }

    #[test]
    fn batch_without_table_follows_hit_order() {
        let nodes = write_tmp(NODES);
        let names = write_tmp(NAMES);
        let hits = write_tmp(HITS);

        let results = resolve_queries(
            nodes.path(),
            names.path(),
            hits.path(),
            None,
            ConsensusMode::RankNames,
        )
        .unwrap();

        let ids: Vec<&str> = results
            .records
            .iter()
            .map(|r| r.query_id.as_str())
            .collect();
        assert_eq!(ids, vec!["Zotu1", "Zotu2"]);
        assert!(results.unresolved_species.is_empty());
    }
}
