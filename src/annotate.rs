use crate::{
    align::GlobalAligner,
    msa::{AlignmentInput, SequenceRecord, Similarity},
};
use anyhow::Result;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

/// One line of the annotation report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationRow {
    pub chain: String,
    pub id: String,
    pub organism: String,
    pub similarity: Option<f64>,
    pub coverage: Option<f64>,
    pub rank: Option<usize>,
    pub kept: bool,
}

// --------------------------------------------------
/// Align every grouped record to the query of its own input and store
/// the score and the query coverage on the record.
pub fn annotate<A: GlobalAligner>(
    input: &mut AlignmentInput,
    aligner: &A,
) -> Result<()> {
    let query = input.query.ungapped();
    let query_len = query.len() as f64;
    info!(
        "Annotating {} records of {} against {}",
        input.num_records(),
        input.name,
        input.query.id
    );

    let records: Vec<&mut SequenceRecord> =
        input.groups.values_mut().flatten().collect();
    records.into_par_iter().try_for_each(|rec| -> Result<()> {
        let subject = rec.ungapped();
        let alignment = aligner.align(&query, &subject)?;
        alignment.check(&query, &subject)?;
        rec.similarity = Similarity::Score(alignment.score);
        rec.coverage =
            Some(alignment.matched_columns() as f64 / query_len * 100.);
        Ok(())
    })?;

    Ok(())
}

// --------------------------------------------------
/// Drop records whose coverage of the query is below `min_coverage`.
/// Organisms left without records are removed; the dropped records are
/// returned.
pub fn filter_low_coverage(
    input: &mut AlignmentInput,
    min_coverage: f64,
) -> Vec<SequenceRecord> {
    let mut removed = vec![];
    for records in input.groups.values_mut() {
        let (keep, drop): (Vec<_>, Vec<_>) = std::mem::take(records)
            .into_iter()
            .partition(|rec| rec.coverage.map_or(true, |c| c >= min_coverage));
        for rec in &drop {
            info!(
                "Removing {} from {}: coverage {:.2} < {min_coverage}",
                rec.id,
                input.name,
                rec.coverage.unwrap_or_default()
            );
        }
        *records = keep;
        removed.extend(drop);
    }
    input.groups.retain(|_, records| !records.is_empty());
    removed
}

// --------------------------------------------------
/// Scored records come before unscored ones; a score is never compared
/// with `NotApplicable`.
fn by_similarity_desc(a: &SequenceRecord, b: &SequenceRecord) -> Ordering {
    match (a.similarity, b.similarity) {
        (Similarity::Score(x), Similarity::Score(y)) => y.total_cmp(&x),
        (Similarity::Score(_), Similarity::NotApplicable) => Ordering::Less,
        (Similarity::NotApplicable, Similarity::Score(_)) => Ordering::Greater,
        (Similarity::NotApplicable, Similarity::NotApplicable) => {
            Ordering::Equal
        }
    }
}

// --------------------------------------------------
/// Stable sort of each organism group from most to least similar
pub fn rank(input: &mut AlignmentInput) {
    for (tag, records) in input.groups.iter_mut() {
        records.sort_by(by_similarity_desc);
        debug!(
            "{} {tag}: {:?}",
            input.name,
            records.iter().map(|r| &r.id).collect::<Vec<_>>()
        );
    }
}

// --------------------------------------------------
pub fn report_rows(
    input: &AlignmentInput,
    removed: &[SequenceRecord],
) -> Vec<AnnotationRow> {
    let mut rows: Vec<AnnotationRow> = input
        .groups
        .values()
        .flat_map(|records| {
            records.iter().enumerate().map(|(rank, rec)| AnnotationRow {
                chain: input.name.clone(),
                id: rec.id.clone(),
                organism: rec.tag.to_string(),
                similarity: rec.similarity.score(),
                coverage: rec.coverage,
                rank: Some(rank),
                kept: true,
            })
        })
        .collect();

    rows.extend(removed.iter().map(|rec| AnnotationRow {
        chain: input.name.clone(),
        id: rec.id.clone(),
        organism: rec.tag.to_string(),
        similarity: rec.similarity.score(),
        coverage: rec.coverage,
        rank: None,
        kept: false,
    }));

    rows
}
