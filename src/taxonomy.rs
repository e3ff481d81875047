//src/taxonomy.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use thiserror::Error;

use crate::types::TaxonNode;

/// Name class retained from the names source; synonyms, common names and the
/// like are dropped.
const SCIENTIFIC_NAME_CLASS: &str = "scientific name";

/// Fatal taxonomy errors. A taxonomy that cannot be trusted must not produce
/// lineages, so none of these are recoverable: the whole run aborts.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed record: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("taxonomy has no root node (id == parent id)")]
    MissingRoot,
    #[error("taxonomy has multiple root nodes: {0} and {1}")]
    MultipleRoots(u32, u32),
    #[error("taxon {0} is not in the taxonomy")]
    UnknownTaxon(u32),
    #[error("taxon {0} has parent {1} which is not in the taxonomy")]
    MissingParent(u32, u32),
    #[error("parent chain of taxon {0} exceeds {1} hops, cycle suspected")]
    CycleDetected(u32, usize),
}

/// A parsed nodes record: (tax id, parent id, rank).
pub type NodeRecord = (u32, u32, String);

/// A parsed names record: (tax id, scientific name).
pub type NameRecord = (u32, String);

/// Immutable index over the reference taxonomy: id -> node plus
/// scientific name -> id. Built once per run, then shared read-only.
///
/// Names are stored in underscore form (`Homo_sapiens`), the convention of
/// the hit tables this feeds; lookups must use the same form.
#[derive(Debug)]
pub struct TaxonomyIndex {
    nodes: AHashMap<u32, TaxonNode>,
    name_to_id: AHashMap<String, u32>,
    root_id: u32,
}

impl TaxonomyIndex {
    /// Builds the index from pre-parsed records. Exactly one root (a node
    /// that is its own parent) must be present. When two ids carry the same
    /// scientific name, the first one seen wins the name lookup.
    pub fn from_records<N, M>(node_records: N, name_records: M) -> Result<Self, TaxonomyError>
    where
        N: IntoIterator<Item = NodeRecord>,
        M: IntoIterator<Item = NameRecord>,
    {
        let mut nodes: AHashMap<u32, TaxonNode> = AHashMap::new();
        let mut root_id: Option<u32> = None;

        for (id, parent_id, rank) in node_records {
            if id == parent_id {
                match root_id {
                    None => root_id = Some(id),
                    Some(first) if first != id => {
                        return Err(TaxonomyError::MultipleRoots(first, id));
                    }
                    Some(_) => {}
                }
            }
            nodes.insert(
                id,
                TaxonNode {
                    id,
                    parent_id,
                    rank,
                    name: String::new(),
                },
            );
        }

        let root_id = root_id.ok_or(TaxonomyError::MissingRoot)?;

        let mut name_to_id: AHashMap<String, u32> = AHashMap::new();
        for (id, name) in name_records {
            let name = name.replace(' ', "_");
            if let Some(node) = nodes.get_mut(&id) {
                if node.name.is_empty() {
                    node.name = name.clone();
                }
            }
            name_to_id.entry(name).or_insert(id);
        }

        log::info!(
            "taxonomy index ready: {} taxa, {} scientific names, root {}",
            nodes.len(),
            name_to_id.len(),
            root_id
        );

        Ok(Self {
            nodes,
            name_to_id,
            root_id,
        })
    }

    /// Parses `nodes.dmp` and `names.dmp` in the NCBI dump layout and builds
    /// the index. Any malformed record aborts the load.
    pub fn load<P: AsRef<Path>>(nodes_path: P, names_path: P) -> Result<Self, TaxonomyError> {
        let node_records = parse_nodes_file(nodes_path.as_ref())?;
        let name_records = parse_names_file(names_path.as_ref())?;
        Self::from_records(node_records, name_records)
    }

    pub fn node(&self, id: u32) -> Option<&TaxonNode> {
        self.nodes.get(&id)
    }

    /// Exact lookup of a scientific name in underscore form.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    pub fn root_id(&self) -> u32 {
        self.root_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Splits one dump line into its `\t|\t`-delimited fields, dropping the
/// trailing `\t|` terminator if present.
fn split_dmp_line(line: &str) -> Vec<&str> {
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split("\t|\t").collect()
}

fn open_lines(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>, TaxonomyError> {
    let file = File::open(path).map_err(|source| TaxonomyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file).lines())
}

fn parse_id(
    field: &str,
    path: &Path,
    line_no: usize,
) -> Result<u32, TaxonomyError> {
    field.trim().parse().map_err(|_| TaxonomyError::Malformed {
        path: path.display().to_string(),
        line: line_no,
        reason: format!("non-numeric tax id {:?}", field),
    })
}

/// Reads a `nodes.dmp` source: tax id, parent id, rank, plus ignored trailing
/// fields. Wrong field counts and non-numeric ids are fatal.
pub fn parse_nodes_file(path: &Path) -> Result<Vec<NodeRecord>, TaxonomyError> {
    let mut records = Vec::new();
    for (idx, line) in open_lines(path)?.enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| TaxonomyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.is_empty() {
            continue;
        }
        let fields = split_dmp_line(&line);
        if fields.len() < 3 {
            return Err(TaxonomyError::Malformed {
                path: path.display().to_string(),
                line: line_no,
                reason: format!("expected at least 3 fields, got {}", fields.len()),
            });
        }
        let id = parse_id(fields[0], path, line_no)?;
        let parent_id = parse_id(fields[1], path, line_no)?;
        records.push((id, parent_id, fields[2].trim().to_string()));
    }
    Ok(records)
}

/// Reads a `names.dmp` source: tax id, name, unique name, name class.
/// Only `scientific name` entries are emitted.
pub fn parse_names_file(path: &Path) -> Result<Vec<NameRecord>, TaxonomyError> {
    let mut records = Vec::new();
    for (idx, line) in open_lines(path)?.enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| TaxonomyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.is_empty() {
            continue;
        }
        let fields = split_dmp_line(&line);
        if fields.len() < 4 {
            return Err(TaxonomyError::Malformed {
                path: path.display().to_string(),
                line: line_no,
                reason: format!("expected at least 4 fields, got {}", fields.len()),
            });
        }
        if fields[3].trim() != SCIENTIFIC_NAME_CLASS {
            continue;
        }
        let id = parse_id(fields[0], path, line_no)?;
        records.push((id, fields[1].trim().to_string()));
    }
    Ok(records)
}
