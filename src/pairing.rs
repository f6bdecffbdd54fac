use crate::{
    align::GlobalAligner,
    msa::{columns, ungap, AlignmentInput, OrganismTag, SequenceRecord},
};
use anyhow::{anyhow, bail, Result};
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;
use std::{collections::BTreeSet, fmt, str::FromStr};

/// An organism must occur in at least this many inputs to be paired
pub const MIN_PAIRED_INPUTS: usize = 2;

/// One chain's slot in a paired row
#[derive(Debug, Clone, PartialEq)]
pub enum RowEntry {
    Record { id: String, residues: String },
    Placeholder { rank: usize, width: usize },
}

impl RowEntry {
    fn from_record(rec: &SequenceRecord) -> Self {
        RowEntry::Record {
            id: rec.id.clone(),
            residues: rec.residues.clone(),
        }
    }

    pub fn id(&self) -> String {
        match self {
            RowEntry::Record { id, .. } => id.clone(),
            RowEntry::Placeholder { rank, .. } => format!("no_rank_{rank}"),
        }
    }

    pub fn residues(&self) -> String {
        match self {
            RowEntry::Record { residues, .. } => residues.clone(),
            RowEntry::Placeholder { width, .. } => "-".repeat(*width),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, RowEntry::Placeholder { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairedRow {
    pub tag: OrganismTag,
    pub rank: usize,
    pub entries: Vec<RowEntry>,
}

impl PairedRow {
    pub fn header(&self) -> String {
        self.entries.iter().map(RowEntry::id).join("\t")
    }

    pub fn sequence(&self) -> String {
        self.entries.iter().map(RowEntry::residues).collect()
    }
}

/// First line of a paired a3m, e.g. "#192,125\t1,1"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityHeader {
    pub lengths: Vec<usize>,
    pub multiplicities: Vec<usize>,
}

impl CardinalityHeader {
    pub fn new(lengths: Vec<usize>) -> Self {
        let multiplicities = vec![1; lengths.len()];
        CardinalityHeader {
            lengths,
            multiplicities,
        }
    }

    pub fn width(&self) -> usize {
        self.lengths.iter().sum()
    }
}

impl fmt::Display for CardinalityHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{}\t{}",
            self.lengths.iter().join(","),
            self.multiplicities.iter().join(",")
        )
    }
}

impl FromStr for CardinalityHeader {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parse = |field: &str| -> Result<Vec<usize>> {
            field
                .split(',')
                .map(|val| {
                    val.trim().parse::<usize>().map_err(|e| {
                        anyhow!(r#"Bad cardinality value "{val}": {e}"#)
                    })
                })
                .collect()
        };

        let body = line
            .trim_end()
            .strip_prefix('#')
            .ok_or_else(|| {
                anyhow!(r##"Cardinality line "{line}" must start with "#""##)
            })?;
        match body.split('\t').collect::<Vec<_>>()[..] {
            [lengths, multiplicities] => {
                let lengths = parse(lengths)?;
                let multiplicities = parse(multiplicities)?;
                if lengths.len() != multiplicities.len() {
                    bail!(
                        r#"Cardinality line "{line}" has {} lengths and {} multiplicities"#,
                        lengths.len(),
                        multiplicities.len()
                    );
                }
                Ok(CardinalityHeader {
                    lengths,
                    multiplicities,
                })
            }
            _ => bail!(r#"Cannot parse cardinality line "{line}""#),
        }
    }
}

/// The combined query row, the paired rows and their cardinality
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub query_row: PairedRow,
    pub rows: Vec<PairedRow>,
    pub cardinality: CardinalityHeader,
}

// --------------------------------------------------
/// Put records of the same organism and the same similarity rank on one
/// row. Inputs must be annotated and ranked.
pub fn pair(inputs: &[AlignmentInput]) -> Result<Pairing> {
    if inputs.is_empty() {
        bail!("Nothing to pair");
    }

    let widths: Vec<usize> = inputs.iter().map(AlignmentInput::width).collect();
    let query_row = PairedRow {
        tag: OrganismTag::Query,
        rank: 0,
        entries: inputs
            .iter()
            .map(|input| RowEntry::from_record(&input.query))
            .collect(),
    };

    let all_tags: BTreeSet<&str> = inputs
        .iter()
        .flat_map(|input| input.groups.keys().map(String::as_str))
        .collect();

    let mut rows = vec![];
    for tag in all_tags {
        let groups: Vec<&[SequenceRecord]> = inputs
            .iter()
            .map(|input| input.groups.get(tag).map_or(&[][..], Vec::as_slice))
            .collect();

        let support = groups.iter().filter(|g| !g.is_empty()).count();
        if support < MIN_PAIRED_INPUTS {
            debug!("{tag} found in {support} input(s), not paired");
            continue;
        }

        let max_rank = groups.iter().map(|g| g.len()).max().unwrap_or(0);
        for rank in 0..max_rank {
            let present = groups.iter().filter(|g| g.len() > rank).count();
            if present < MIN_PAIRED_INPUTS {
                continue;
            }

            let entries = groups
                .iter()
                .zip(&widths)
                .map(|(g, &width)| match g.get(rank) {
                    Some(rec) => RowEntry::from_record(rec),
                    _ => RowEntry::Placeholder { rank, width },
                })
                .collect();

            rows.push(PairedRow {
                tag: OrganismTag::Organism(tag.to_string()),
                rank,
                entries,
            });
        }
    }

    info!("Paired {} rows across {} inputs", rows.len(), inputs.len());
    Ok(Pairing {
        query_row,
        rows,
        cardinality: CardinalityHeader::new(widths),
    })
}

// --------------------------------------------------
/// Order the paired rows from most to least similar to the combined query.
/// The score is normalized by the longer of the two rows.
pub fn sort_by_similarity<A: GlobalAligner>(
    pairing: &mut Pairing,
    aligner: &A,
) -> Result<()> {
    let reference = pairing.query_row.sequence();
    let reference_ungapped = ungap(&reference);

    let scores: Vec<f64> = pairing
        .rows
        .par_iter()
        .map(|row| -> Result<f64> {
            let seq = row.sequence();
            let subject = ungap(&seq);
            let alignment = aligner.align(&reference_ungapped, &subject)?;
            alignment.check(&reference_ungapped, &subject)?;
            let len = reference.len().max(seq.len()).max(1);
            Ok(alignment.score / len as f64)
        })
        .collect::<Result<_>>()?;

    let mut scored: Vec<(f64, PairedRow)> = scores
        .into_iter()
        .zip(std::mem::take(&mut pairing.rows))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    pairing.rows = scored.into_iter().map(|(_, row)| row).collect();

    Ok(())
}

// --------------------------------------------------
/// Every row of the pairing spans the same number of columns
pub fn check_widths(pairing: &Pairing) -> Result<()> {
    let width = pairing.cardinality.width();
    for row in std::iter::once(&pairing.query_row).chain(&pairing.rows) {
        let cols = columns(&row.sequence());
        if cols != width {
            bail!(
                r#"Paired row "{}" spans {cols} columns, expected {width}"#,
                row.header()
            );
        }
    }
    Ok(())
}
