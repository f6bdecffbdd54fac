use log::info;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// One declared chain of the complex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInput {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduplicated {
    /// Distinct inputs in order of first occurrence
    pub inputs: Vec<ChainInput>,

    /// How many declared chains each distinct input stands for
    pub repeat_counts: Vec<usize>,

    /// Index into `inputs` for every declared chain
    pub positions: Vec<usize>,
}

impl Deduplicated {
    pub fn is_repeated(&self) -> bool {
        self.positions.len() > self.inputs.len()
    }
}

// --------------------------------------------------
/// Name the declared inputs "a3m_1", "a3m_2", ...
pub fn chain_inputs(paths: &[PathBuf]) -> Vec<ChainInput> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| ChainInput {
            name: format!("a3m_{}", i + 1),
            path: path.clone(),
        })
        .collect()
}

// --------------------------------------------------
/// Collapse chains declared with the same alignment file
pub fn dedupe(chains: &[ChainInput]) -> Deduplicated {
    let mut seen: HashMap<&Path, usize> = HashMap::new();
    let mut unique: Vec<&Path> = vec![];
    let mut repeat_counts: Vec<usize> = vec![];
    let mut positions = Vec::with_capacity(chains.len());

    for chain in chains {
        let idx = *seen.entry(chain.path.as_path()).or_insert_with(|| {
            unique.push(&chain.path);
            repeat_counts.push(0);
            unique.len() - 1
        });
        repeat_counts[idx] += 1;
        positions.push(idx);
    }

    if unique.len() == 1 {
        info!("HOMO-oligomer with {} subunits", chains.len());
    } else {
        info!(
            "HETERO-oligomer with {} subunits ({} distinct)",
            chains.len(),
            unique.len()
        );
    }

    let inputs = chain_inputs(
        &unique.into_iter().map(Path::to_path_buf).collect::<Vec<_>>(),
    );

    Deduplicated {
        inputs,
        repeat_counts,
        positions,
    }
}

// --------------------------------------------------
#[cfg(test)]
mod tests {
    use super::{chain_inputs, dedupe};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_chain_inputs() {
        let chains = chain_inputs(&paths(&["a.a3m", "b.a3m"]));
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].name, "a3m_1");
        assert_eq!(chains[1].name, "a3m_2");
        assert_eq!(chains[1].path, PathBuf::from("b.a3m"));
    }

    #[test]
    fn test_no_repeats() {
        let chains = chain_inputs(&paths(&["a.a3m", "b.a3m", "c.a3m"]));
        let dedup = dedupe(&chains);
        assert!(!dedup.is_repeated());
        assert_eq!(dedup.inputs, chains);
        assert_eq!(dedup.repeat_counts, vec![1, 1, 1]);
        assert_eq!(dedup.positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_homotrimer() {
        let chains = chain_inputs(&paths(&["a.a3m", "a.a3m", "a.a3m"]));
        let dedup = dedupe(&chains);
        assert!(dedup.is_repeated());
        assert_eq!(dedup.inputs.len(), 1);
        assert_eq!(dedup.inputs[0].name, "a3m_1");
        assert_eq!(dedup.repeat_counts, vec![3]);
        assert_eq!(dedup.positions, vec![0, 0, 0]);
    }

    #[test]
    fn test_first_occurrence_order() {
        let chains = chain_inputs(&paths(&[
            "b.a3m", "a.a3m", "b.a3m", "c.a3m", "a.a3m", "b.a3m",
        ]));
        let dedup = dedupe(&chains);
        assert_eq!(
            dedup
                .inputs
                .iter()
                .map(|c| (c.name.as_str(), c.path.to_string_lossy().to_string()))
                .collect::<Vec<_>>(),
            vec![
                ("a3m_1", "b.a3m".to_string()),
                ("a3m_2", "a.a3m".to_string()),
                ("a3m_3", "c.a3m".to_string()),
            ]
        );
        assert_eq!(dedup.repeat_counts, vec![3, 2, 1]);
        assert_eq!(dedup.positions, vec![0, 1, 0, 2, 1, 0]);
        assert_eq!(
            dedup.repeat_counts.iter().sum::<usize>(),
            chains.len()
        );
    }
}
