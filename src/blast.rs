//src/blast.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

// Field layout of the expected hit table (a custom BLAST tabular format).
const QUERY_FIELD: usize = 0;
const SPECIES_FIELD: usize = 3;
const PIDENT_FIELD: usize = 5;
const QCOV_FIELD: usize = 7;

/// Best-scoring hits for one query: the score pair that set the tie and the
/// ordered set of distinct species names matching it.
#[derive(Debug, Clone)]
pub struct QueryHits {
    pub pident: f64,
    pub qcov: u32,
    pub species: Vec<String>,
}

/// All per-query hit groups plus the query ids in first-seen order.
#[derive(Debug, Default)]
pub struct HitTable {
    pub queries: Vec<String>,
    pub hits: AHashMap<String, QueryHits>,
}

/// Opens a hit or table file, transparently decompressing `.gz`.
fn open_maybe_gz(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);
    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    })
}

/// Reads a BLAST-style hit table and groups hits per query.
///
/// The first hit seen for a query fixes its best `(pident, qcov)` pair;
/// later hits join the candidate set only when they match or beat both
/// scores, name a species not already in the set, and are not the `N/A`
/// placeholder. Lines reading `not assigned` are skipped outright, and
/// lines that do not tokenize are logged and dropped rather than aborting
/// the batch.
pub fn read_hit_table(path: &Path) -> io::Result<HitTable> {
    let reader = open_maybe_gz(path)?;
    let mut table = HitTable::default();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() || line == "not assigned" {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= QCOV_FIELD {
            log::warn!("skipping short hit line: {:?}", line);
            continue;
        }
        let pident: f64 = match fields[PIDENT_FIELD].trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("skipping hit with bad pident: {:?}", line);
                continue;
            }
        };
        let qcov: u32 = match fields[QCOV_FIELD].trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("skipping hit with bad qcov: {:?}", line);
                continue;
            }
        };

        let query = fields[QUERY_FIELD];
        let species = fields[SPECIES_FIELD];
        match table.hits.get_mut(query) {
            None => {
                table.queries.push(query.to_string());
                table.hits.insert(
                    query.to_string(),
                    QueryHits {
                        pident,
                        qcov,
                        species: vec![species.to_string()],
                    },
                );
            }
            Some(best) => {
                if pident >= best.pident
                    && qcov >= best.qcov
                    && species != "N/A"
                    && !best.species.iter().any(|s| s == species)
                {
                    best.species.push(species.to_string());
                }
            }
        }
    }

    log::info!(
        "hit table: {} queries with at least one hit",
        table.queries.len()
    );
    Ok(table)
}

/// Reads the OTU/ASV table that defines the full query universe; the first
/// column of every row past the header is a query id.
pub fn read_query_table(path: &Path) -> io::Result<Vec<String>> {
    let reader = open_maybe_gz(path)?;
    let mut ids = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line_no == 0 || line.is_empty() {
            continue;
        }
        if let Some(id) = line.split('\t').next() {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}
