use crate::open;
use anyhow::{anyhow, bail, Result};
use kseq::parse_reader;
use log::debug;
use regex::Regex;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

/// Matches the `TaxID=<id>` annotation written by MMseqs2 into a3m headers
pub const DEFAULT_TAG_PATTERN: &str = r"TaxID=(\w+)";

/// Which organism a record belongs to.
/// The query of an alignment is never an organism.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrganismTag {
    Query,
    Organism(String),
}

impl fmt::Display for OrganismTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrganismTag::Query => write!(f, "query"),
            OrganismTag::Organism(tag) => write!(f, "{tag}"),
        }
    }
}

/// Global alignment score of a record against its own query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Similarity {
    NotApplicable,
    Score(f64),
}

impl Similarity {
    pub fn score(&self) -> Option<f64> {
        match self {
            Similarity::Score(val) => Some(*val),
            Similarity::NotApplicable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    pub id: String,
    pub description: String,
    pub residues: String,
    pub tag: OrganismTag,
    pub similarity: Similarity,
    pub coverage: Option<f64>,
}

impl SequenceRecord {
    pub fn new(id: &str, description: &str, residues: &str) -> Self {
        SequenceRecord {
            id: id.to_string(),
            description: description.trim().to_string(),
            residues: residues.to_string(),
            tag: OrganismTag::Query,
            similarity: Similarity::NotApplicable,
            coverage: None,
        }
    }

    /// The full header line without the leading ">"
    pub fn header(&self) -> String {
        if self.description.is_empty() {
            self.id.clone()
        } else {
            format!("{} {}", self.id, self.description)
        }
    }

    /// Number of alignment columns the row occupies
    pub fn columns(&self) -> usize {
        columns(&self.residues)
    }

    pub fn ungapped(&self) -> String {
        ungap(&self.residues)
    }
}

// --------------------------------------------------
/// Count the match/gap columns of an a3m row.
/// Lowercase insertions and "." do not occupy columns.
pub fn columns(residues: &str) -> usize {
    residues
        .bytes()
        .filter(|c| !c.is_ascii_lowercase() && *c != b'.')
        .count()
}

// --------------------------------------------------
/// Strip gap characters and normalize case for alignment
pub fn ungap(residues: &str) -> String {
    residues
        .chars()
        .filter(|&c| c != '-' && c != '.')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// All records of one a3m file in file order; the first is the query
#[derive(Debug, Clone)]
pub struct Msa {
    pub path: PathBuf,
    pub records: Vec<SequenceRecord>,
}

impl Msa {
    pub fn query(&self) -> &SequenceRecord {
        &self.records[0]
    }

    pub fn homologs(&self) -> &[SequenceRecord] {
        &self.records[1..]
    }
}

// --------------------------------------------------
pub fn read_msa(path: &Path) -> Result<Msa> {
    // kseq cannot sniff the format of an (almost) empty file
    let mut reader = parse_reader(open(path)?).map_err(|e| {
        anyhow!("{}: no sequences found ({e})", path.display())
    })?;
    let mut records = vec![];
    while let Some(rec) = reader.iter_record()? {
        records.push(SequenceRecord::new(rec.head(), rec.des(), rec.seq()));
    }

    if records.is_empty() {
        bail!("{}: no sequences found", path.display());
    }

    if records[0].ungapped().is_empty() {
        bail!(
            r#"{}: query "{}" has no residues"#,
            path.display(),
            records[0].id
        );
    }

    // Every row must fit the query's columns
    let width = records[0].columns();
    if let Some(rec) = records.iter().find(|rec| rec.columns() != width) {
        bail!(
            r#"{}: "{}" spans {} columns, query spans {width}"#,
            path.display(),
            rec.id,
            rec.columns()
        );
    }

    Ok(Msa {
        path: path.to_path_buf(),
        records,
    })
}

/// Pulls the organism identifier out of a record header
#[derive(Debug, Clone)]
pub struct TagExtractor {
    pattern: Regex,
}

impl TagExtractor {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| anyhow!(r#"Invalid tag pattern "{pattern}": {e}"#))?;
        Ok(TagExtractor { pattern })
    }

    /// Uses the first capture group when there is one, else the whole match
    pub fn extract(&self, header: &str) -> Option<String> {
        self.pattern.captures(header).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        })
    }
}

impl Default for TagExtractor {
    fn default() -> Self {
        TagExtractor {
            pattern: Regex::new(DEFAULT_TAG_PATTERN).unwrap(),
        }
    }
}

/// The records of one input alignment keyed by organism
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentInput {
    pub name: String,
    pub query: SequenceRecord,
    pub groups: BTreeMap<String, Vec<SequenceRecord>>,
    pub untagged: usize,
}

impl AlignmentInput {
    pub fn width(&self) -> usize {
        self.query.columns()
    }

    pub fn num_records(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

// --------------------------------------------------
pub fn group(
    name: &str,
    msa: &Msa,
    extractor: &TagExtractor,
) -> Result<AlignmentInput> {
    let mut query = msa.query().clone();
    query.tag = OrganismTag::Query;
    query.similarity = Similarity::NotApplicable;
    query.coverage = Some(100.);

    let mut groups: BTreeMap<String, Vec<SequenceRecord>> = BTreeMap::new();
    let mut untagged = 0;
    for rec in msa.homologs() {
        match extractor.extract(&rec.header()) {
            Some(tag) => {
                let mut rec = rec.clone();
                rec.tag = OrganismTag::Organism(tag.clone());
                groups.entry(tag).or_default().push(rec);
            }
            _ => {
                debug!("{name}: no organism tag in \"{}\"", rec.header());
                untagged += 1;
            }
        }
    }

    debug!(
        "{name}: {} organisms, {} records, {untagged} untagged",
        groups.len(),
        groups.values().map(Vec::len).sum::<usize>()
    );
    for (tag, recs) in &groups {
        debug!("{name}: {tag} = {}", recs.len());
    }

    Ok(AlignmentInput {
        name: name.to_string(),
        query,
        groups,
        untagged,
    })
}
