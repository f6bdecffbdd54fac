use anyhow::{anyhow, bail, Result};
use bio::alignment::{pairwise::Aligner, AlignmentOperation};
use serde::Deserialize;

/// Scores for the global aligner.
/// The defaults count identical residues and leave gaps free.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring {
            match_score: 1,
            mismatch_score: 0,
            gap_open: 0,
            gap_extend: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseAlignment {
    pub aligned_a: String,
    pub aligned_b: String,
    pub score: f64,
}

impl PairwiseAlignment {
    /// Columns where both sequences have a residue
    pub fn matched_columns(&self) -> usize {
        self.aligned_a
            .bytes()
            .zip(self.aligned_b.bytes())
            .filter(|&(a, b)| a != b'-' && b != b'-')
            .count()
    }

    /// Both rows of a global alignment must have the same length
    pub fn check(&self, seq_a: &str, seq_b: &str) -> Result<()> {
        if self.aligned_a.len() != self.aligned_b.len() {
            bail!(
                "Global alignment returned rows of different length \
                ({} != {})\nSEQUENCE_1: {seq_a}\nSEQUENCE_2: {seq_b}",
                self.aligned_a.len(),
                self.aligned_b.len()
            );
        }
        Ok(())
    }
}

/// Needleman-Wunsch style global alignment of two ungapped sequences
pub trait GlobalAligner: Sync {
    fn align(&self, seq_a: &str, seq_b: &str) -> Result<PairwiseAlignment>;
}

#[derive(Debug, Clone, Default)]
pub struct BioAligner {
    scoring: Scoring,
}

impl BioAligner {
    pub fn new(scoring: Scoring) -> Result<Self> {
        if scoring.gap_open > 0 || scoring.gap_extend > 0 {
            bail!(
                "Gap penalties must be zero or negative (open {}, extend {})",
                scoring.gap_open,
                scoring.gap_extend
            );
        }
        Ok(BioAligner { scoring })
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    fn gap_score(&self, len: usize) -> i32 {
        if len == 0 {
            0
        } else {
            self.scoring.gap_open + self.scoring.gap_extend * len as i32
        }
    }
}

impl GlobalAligner for BioAligner {
    fn align(&self, seq_a: &str, seq_b: &str) -> Result<PairwiseAlignment> {
        let (x, y) = (seq_a.as_bytes(), seq_b.as_bytes());

        // One side empty, everything is a single gap
        if x.is_empty() || y.is_empty() {
            return Ok(PairwiseAlignment {
                aligned_a: format!("{seq_a}{}", "-".repeat(y.len())),
                aligned_b: format!("{}{seq_b}", "-".repeat(x.len())),
                score: self.gap_score(x.len().max(y.len())) as f64,
            });
        }

        let Scoring {
            match_score,
            mismatch_score,
            gap_open,
            gap_extend,
        } = self.scoring;
        let score_fn = |a: u8, b: u8| {
            if a.eq_ignore_ascii_case(&b) {
                match_score
            } else {
                mismatch_score
            }
        };
        let mut aligner =
            Aligner::with_capacity(x.len(), y.len(), gap_open, gap_extend, score_fn);
        let alignment = aligner.global(x, y);

        let mut aligned_a = Vec::with_capacity(x.len() + y.len());
        let mut aligned_b = Vec::with_capacity(x.len() + y.len());
        let (mut i, mut j) = (0, 0);
        let out_of_range =
            || anyhow!("Alignment operations run past the end of the input");
        for op in &alignment.operations {
            match *op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    aligned_a.push(*x.get(i).ok_or_else(out_of_range)?);
                    aligned_b.push(*y.get(j).ok_or_else(out_of_range)?);
                    i += 1;
                    j += 1;
                }
                AlignmentOperation::Ins => {
                    aligned_a.push(*x.get(i).ok_or_else(out_of_range)?);
                    aligned_b.push(b'-');
                    i += 1;
                }
                AlignmentOperation::Del => {
                    aligned_a.push(b'-');
                    aligned_b.push(*y.get(j).ok_or_else(out_of_range)?);
                    j += 1;
                }
                AlignmentOperation::Xclip(len) => {
                    aligned_a.extend_from_slice(
                        x.get(i..i + len).ok_or_else(out_of_range)?,
                    );
                    aligned_b.extend(std::iter::repeat(b'-').take(len));
                    i += len;
                }
                AlignmentOperation::Yclip(len) => {
                    aligned_a.extend(std::iter::repeat(b'-').take(len));
                    aligned_b.extend_from_slice(
                        y.get(j..j + len).ok_or_else(out_of_range)?,
                    );
                    j += len;
                }
            }
        }

        Ok(PairwiseAlignment {
            aligned_a: String::from_utf8(aligned_a)?,
            aligned_b: String::from_utf8(aligned_b)?,
            score: alignment.score as f64,
        })
    }
}
