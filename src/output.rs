use crate::{
    annotate::AnnotationRow,
    msa::Msa,
    pairing::{CardinalityHeader, Pairing},
};
use anyhow::{anyhow, bail, Result};
use csv::WriterBuilder;
use itertools::Itertools;
use log::info;
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// A header/sequence pair ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub header: String,
    pub sequence: String,
}

// --------------------------------------------------
/// Write into a temporary file next to `path` and move it into place
/// only once everything was written.
pub fn publish<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| anyhow!("Cannot write {}: {e}", dir.display()))?;

    {
        let mut output = BufWriter::new(&mut tmp);
        write(&mut output)?;
        output.flush()?;
    }

    // Temp files are owner-only; outputs get the usual 0644
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| anyhow!("Cannot write {}: {e}", path.display()))?;
    }

    tmp.persist(path)
        .map_err(|e| anyhow!("Cannot write {}: {}", path.display(), e.error))?;
    Ok(())
}

// --------------------------------------------------
fn pad(residues: &str, span: usize, lengths: &[usize]) -> String {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            if i == span {
                residues.to_string()
            } else {
                "-".repeat(len)
            }
        })
        .collect()
}

// --------------------------------------------------
/// Single-chain rows for every declared chain: the query and all of its
/// homologs, each occupying only the columns of its own chain.
/// `positions` maps each declared chain to its alignment in `msas`.
pub fn unpaired_block(
    msas: &[Msa],
    positions: &[usize],
    lengths: &[usize],
) -> Result<Vec<Row>> {
    if msas.len() != lengths.len() {
        bail!(
            "{} alignments for {} chain lengths",
            msas.len(),
            lengths.len()
        );
    }

    let mut rows = vec![];
    for &span in positions {
        let msa = msas
            .get(span)
            .ok_or_else(|| anyhow!("No alignment for chain {span}"))?;
        let query = msa.query();
        if query.columns() != lengths[span] {
            bail!(
                "{}: query spans {} columns, expected {}",
                msa.path.display(),
                query.columns(),
                lengths[span]
            );
        }

        rows.push(Row {
            header: query.id.clone(),
            sequence: pad(&query.residues, span, lengths),
        });
        rows.extend(msa.homologs().iter().map(|rec| Row {
            header: rec.id.clone(),
            sequence: pad(&rec.residues, span, lengths),
        }));
    }

    Ok(rows)
}

// --------------------------------------------------
/// Cardinality line, combined query, paired rows and then `unpaired`
pub fn write_msa(path: &Path, pairing: &Pairing, unpaired: &[Row]) -> Result<()> {
    publish(path, |output| {
        writeln!(output, "{}", pairing.cardinality)?;
        writeln!(
            output,
            ">{}\n{}",
            pairing.query_row.header(),
            pairing.query_row.sequence()
        )?;
        for row in &pairing.rows {
            writeln!(output, ">{}\n{}", row.header(), row.sequence())?;
        }
        for row in unpaired {
            writeln!(output, ">{}\n{}", row.header, row.sequence)?;
        }
        Ok(())
    })?;

    info!(
        r#"Wrote {} paired and {} unpaired rows to "{}""#,
        pairing.rows.len(),
        unpaired.len(),
        path.display()
    );
    Ok(())
}

// --------------------------------------------------
/// Replace the multiplicities of the cardinality line, leaving the rest
/// of the file untouched
pub fn rewrite_multiplicities(path: &Path, multiplicities: &[usize]) -> Result<()> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;
    let (first, rest) = contents.split_once('\n').unwrap_or((contents.as_str(), ""));

    let mut cardinality: CardinalityHeader = first.parse()?;
    if cardinality.lengths.len() != multiplicities.len() {
        bail!(
            "{}: {} chain lengths but {} multiplicities",
            path.display(),
            cardinality.lengths.len(),
            multiplicities.len()
        );
    }
    cardinality.multiplicities = multiplicities.to_vec();
    info!("Cardinality corrected to {cardinality}");

    publish(path, |output| {
        writeln!(output, "{cardinality}")?;
        output.write_all(rest.as_bytes())?;
        Ok(())
    })
}

// --------------------------------------------------
/// A homo-oligomer of `subunits` copies of one alignment.
/// `split` lays the copies side by side ("#L,L\t1,1"), otherwise the
/// alignment is kept as is under "#L\tN".
pub fn write_homooligomer(
    path: &Path,
    msa: &Msa,
    subunits: usize,
    split: bool,
) -> Result<()> {
    if subunits == 0 {
        bail!("Number of subunits must be at least 1");
    }

    let len = msa.query().columns();
    let cardinality = if split {
        CardinalityHeader::new(vec![len; subunits])
    } else {
        CardinalityHeader {
            lengths: vec![len],
            multiplicities: vec![subunits],
        }
    };

    publish(path, |output| {
        writeln!(output, "{cardinality}")?;
        for rec in &msa.records {
            if split {
                writeln!(
                    output,
                    ">{}\n{}",
                    std::iter::repeat(rec.header()).take(subunits).join("\t"),
                    rec.residues.repeat(subunits)
                )?;
            } else {
                writeln!(output, ">{}\n{}", rec.header(), rec.residues)?;
            }
        }
        Ok(())
    })?;

    info!(
        r#"Wrote homo-oligomer ({subunits} subunits) to "{}""#,
        path.display()
    );
    Ok(())
}

// --------------------------------------------------
pub fn write_report(path: &Path, rows: &[AnnotationRow]) -> Result<()> {
    publish(path, |output| {
        let mut wtr = WriterBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .from_writer(output);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    })
}

// --------------------------------------------------
#[cfg(test)]
mod tests {
    use super::{
        pad, publish, rewrite_multiplicities, unpaired_block,
        write_homooligomer, write_msa, write_report, Row,
    };
    use crate::{
        annotate::AnnotationRow,
        msa::{read_msa, Msa, OrganismTag},
        pairing::{CardinalityHeader, PairedRow, Pairing, RowEntry},
    };
    use anyhow::{bail, Result};
    use pretty_assertions::assert_eq;
    use std::{fs, io::Write, path::PathBuf};
    use tempfile::tempdir;

    fn chain_a() -> Result<Msa> {
        read_msa(&PathBuf::from("tests/inputs/chain_a.a3m"))
    }

    fn chain_b() -> Result<Msa> {
        read_msa(&PathBuf::from("tests/inputs/chain_b.a3m"))
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad("ACD", 0, &[3, 2]), "ACD--");
        assert_eq!(pad("MN", 1, &[3, 2]), "---MN");
        assert_eq!(pad("MN", 1, &[3, 2, 4]), "---MN----");
    }

    #[test]
    fn test_publish_failure_leaves_nothing() -> Result<()> {
        let outdir = tempdir()?;
        let outfile = outdir.path().join("out.a3m");
        let res = publish(&outfile, |output| {
            writeln!(output, "partial")?;
            bail!("failed halfway")
        });
        assert!(res.is_err());
        assert!(!outfile.exists());
        assert_eq!(fs::read_dir(outdir.path())?.count(), 0);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_publish_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let outdir = tempdir()?;
        let outfile = outdir.path().join("out.a3m");
        publish(&outfile, |output| {
            writeln!(output, "#1\t1")?;
            Ok(())
        })?;
        let mode = fs::metadata(&outfile)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        Ok(())
    }

    #[test]
    fn test_unpaired_block() -> Result<()> {
        let msas = vec![chain_a()?, chain_b()?];
        let rows = unpaired_block(&msas, &[0, 1], &[10, 12])?;
        assert_eq!(rows.len(), 11);
        assert_eq!(
            rows[0],
            Row {
                header: "chainA".to_string(),
                sequence: "ACDEFGHIKL------------".to_string()
            }
        );
        assert_eq!(rows[4].header, "a_untagged");
        assert_eq!(rows[4].sequence, "ACDEFGH---------------");
        assert_eq!(rows[5].header, "chainB");
        assert_eq!(rows[5].sequence, "----------MNPQRSTVWYAC");
        assert_eq!(rows[10].header, "b_low");
        assert_eq!(rows[10].sequence, "----------MN----------");
        assert!(rows.iter().all(|r| r.sequence.len() == 22));
        Ok(())
    }

    #[test]
    fn test_unpaired_block_repeated_chain() -> Result<()> {
        let msas = vec![chain_a()?, chain_b()?];
        let rows = unpaired_block(&msas, &[0, 0, 1], &[10, 12])?;
        assert_eq!(rows.len(), 16);
        assert_eq!(rows[0], rows[5]);
        assert_eq!(rows[10].header, "chainB");

        let res = unpaired_block(&msas, &[0, 1], &[10, 11]);
        assert!(res.is_err());
        let res = unpaired_block(&msas, &[0, 1], &[10]);
        assert!(res.is_err());
        Ok(())
    }

    #[test]
    fn test_write_msa_and_rewrite() -> Result<()> {
        let outdir = tempdir()?;
        let outfile = outdir.path().join("paired.a3m");
        let pairing = Pairing {
            query_row: PairedRow {
                tag: OrganismTag::Query,
                rank: 0,
                entries: vec![
                    RowEntry::Record {
                        id: "qa".to_string(),
                        residues: "ACD".to_string(),
                    },
                    RowEntry::Record {
                        id: "qb".to_string(),
                        residues: "MN".to_string(),
                    },
                ],
            },
            rows: vec![PairedRow {
                tag: OrganismTag::Organism("X".to_string()),
                rank: 1,
                entries: vec![
                    RowEntry::Placeholder { rank: 1, width: 3 },
                    RowEntry::Record {
                        id: "bx".to_string(),
                        residues: "M-".to_string(),
                    },
                ],
            }],
            cardinality: CardinalityHeader::new(vec![3, 2]),
        };
        let unpaired = vec![Row {
            header: "qa".to_string(),
            sequence: "ACD--".to_string(),
        }];

        write_msa(&outfile, &pairing, &unpaired)?;
        let expected = "#3,2\t1,1\n>qa\tqb\nACDMN\n>no_rank_1\tbx\n---M-\n>qa\nACD--\n";
        assert_eq!(fs::read_to_string(&outfile)?, expected);

        rewrite_multiplicities(&outfile, &[2, 1])?;
        let expected = "#3,2\t2,1\n>qa\tqb\nACDMN\n>no_rank_1\tbx\n---M-\n>qa\nACD--\n";
        assert_eq!(fs::read_to_string(&outfile)?, expected);

        assert!(rewrite_multiplicities(&outfile, &[3]).is_err());
        Ok(())
    }

    #[test]
    fn test_write_homooligomer() -> Result<()> {
        let outdir = tempdir()?;
        let msa = read_msa(&PathBuf::from("tests/inputs/chain_b.a3m"))?;

        let collapsed = outdir.path().join("collapsed.a3m");
        write_homooligomer(&collapsed, &msa, 2, false)?;
        let contents = fs::read_to_string(&collapsed)?;
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "#12\t2");
        assert_eq!(lines[1], ">chainB");
        assert_eq!(lines[3], ">b_x2 TaxID=X");

        let split = outdir.path().join("split.a3m");
        write_homooligomer(&split, &msa, 3, true)?;
        let contents = fs::read_to_string(&split)?;
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "#12,12,12\t1,1,1");
        assert_eq!(lines[1], ">chainB\tchainB\tchainB");
        assert_eq!(lines[2], "MNPQRSTVWYAC".repeat(3));
        assert_eq!(lines[3], ">b_x2 TaxID=X\tb_x2 TaxID=X\tb_x2 TaxID=X");
        assert_eq!(lines[4], "MNPQRS------".repeat(3));

        assert!(write_homooligomer(&split, &msa, 0, true).is_err());
        Ok(())
    }

    #[test]
    fn test_write_report() -> Result<()> {
        let outdir = tempdir()?;
        let outfile = outdir.path().join("report.tsv");
        let rows = vec![
            AnnotationRow {
                chain: "a3m_1".to_string(),
                id: "a_x1".to_string(),
                organism: "X".to_string(),
                similarity: Some(5.),
                coverage: Some(50.),
                rank: Some(0),
                kept: true,
            },
            AnnotationRow {
                chain: "a3m_2".to_string(),
                id: "b_low".to_string(),
                organism: "Y".to_string(),
                similarity: Some(2.),
                coverage: Some(12.5),
                rank: None,
                kept: false,
            },
        ];
        write_report(&outfile, &rows)?;
        let expected = "chain\tid\torganism\tsimilarity\tcoverage\trank\tkept\n\
            a3m_1\ta_x1\tX\t5.0\t50.0\t0\ttrue\n\
            a3m_2\tb_low\tY\t2.0\t12.5\t\tfalse\n";
        assert_eq!(fs::read_to_string(&outfile)?, expected);
        Ok(())
    }
}
