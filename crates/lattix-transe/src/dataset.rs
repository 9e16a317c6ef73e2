//! Triple files and the vocabularies that index them.
//!
//! Each line of a triples file holds one fact: `head relation tail`. Fields are
//! tab-separated when the line contains a tab (so symbols may contain spaces),
//! otherwise whitespace-separated. Blank lines and `#` comments are skipped.
//!
//! The training split builds the vocabularies; validation and test splits are
//! read against a *closed* copy of them, so an unseen symbol is an error rather
//! than a fresh index.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result, SymbolKind};
use crate::sampling::RandomSource;

/// An integer-indexed (head, relation, tail) fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub head: usize,
    pub relation: usize,
    pub tail: usize,
}

impl Triple {
    pub fn new(head: usize, relation: usize, tail: usize) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }
}

/// Bidirectional symbol <-> index mapping. Indices are dense and assigned in
/// order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocab {
    index: HashMap<String, usize>,
    symbols: Vec<String>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `symbol`, if present.
    pub fn get(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Index of `symbol`, inserting it at the end if absent.
    pub fn get_or_insert(&mut self, symbol: &str) -> usize {
        if let Some(&idx) = self.index.get(symbol) {
            return idx;
        }
        let idx = self.symbols.len();
        self.symbols.push(symbol.to_string());
        self.index.insert(symbol.to_string(), idx);
        idx
    }

    /// Symbol stored at `idx`.
    pub fn symbol(&self, idx: usize) -> Option<&str> {
        self.symbols.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in index order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Vocab {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut vocab = Vocab::new();
        for s in iter {
            vocab.get_or_insert(s.as_ref());
        }
        vocab
    }
}

/// Basic counts for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub entities: usize,
    pub relations: usize,
    pub triples: usize,
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entities, {} relations, {} triples",
            self.entities, self.relations, self.triples
        )
    }
}

/// Ordered triples plus the vocabularies used to index them.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    triples: Vec<Triple>,
    entities: Vocab,
    relations: Vocab,
}

impl Dataset {
    /// Build a dataset from already-indexed triples.
    ///
    /// Callers are responsible for keeping every index inside the vocabularies.
    pub fn from_parts(triples: Vec<Triple>, entities: Vocab, relations: Vocab) -> Self {
        Self {
            triples,
            entities,
            relations,
        }
    }

    /// Read a triples file, building fresh vocabularies.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with(path, Vocab::new(), Vocab::new(), true)
    }

    /// Read a triples file against the vocabularies of `reference`, which are
    /// closed: any symbol they lack is an [`Error::UnknownSymbol`].
    pub fn from_file_closed(path: impl AsRef<Path>, reference: &Dataset) -> Result<Self> {
        Self::from_file_with(
            path,
            reference.entities.clone(),
            reference.relations.clone(),
            false,
        )
    }

    /// Read a triples file starting from the given vocabularies, extending them
    /// only when `add_new` is set.
    pub fn from_file_with(
        path: impl AsRef<Path>,
        entities: Vocab,
        relations: Vocab,
        add_new: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file, path, entities, relations, add_new)?;
        info!(path = %path.display(), stats = %dataset.stats(), "loaded triples");
        Ok(dataset)
    }

    /// Parse triples from any reader. `source` only labels error messages.
    pub fn from_reader<R: Read>(
        reader: R,
        source: &Path,
        mut entities: Vocab,
        mut relations: Vocab,
        add_new: bool,
    ) -> Result<Self> {
        let buf = BufReader::new(reader);
        let mut triples = Vec::new();

        for (i, line) in buf.lines().enumerate() {
            let line_no = i + 1;
            let line = line.map_err(|e| Error::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (h, r, t) = split_fields(trimmed).ok_or_else(|| Error::Parse {
                path: source.to_path_buf(),
                line: line_no,
                content: trimmed.to_string(),
            })?;

            let lookup = |vocab: &mut Vocab, kind: SymbolKind, symbol: &str| {
                if add_new {
                    Ok(vocab.get_or_insert(symbol))
                } else {
                    vocab.get(symbol).ok_or_else(|| Error::UnknownSymbol {
                        path: PathBuf::from(source),
                        line: line_no,
                        kind,
                        symbol: symbol.to_string(),
                    })
                }
            };

            let head = lookup(&mut entities, SymbolKind::Entity, h)?;
            let relation = lookup(&mut relations, SymbolKind::Relation, r)?;
            let tail = lookup(&mut entities, SymbolKind::Entity, t)?;
            triples.push(Triple::new(head, relation, tail));
        }

        Ok(Self {
            triples,
            entities,
            relations,
        })
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn entities(&self) -> &Vocab {
        &self.entities
    }

    pub fn relations(&self) -> &Vocab {
        &self.relations
    }

    pub fn n_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn n_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            entities: self.n_entities(),
            relations: self.n_relations(),
            triples: self.triples.len(),
        }
    }

    /// Draw `n` triples without replacement, keeping their file order.
    /// Returns every triple when `n >= len()`.
    pub fn sample_triples<R: RandomSource + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Triple> {
        if n >= self.triples.len() {
            return self.triples.clone();
        }
        // Partial Fisher-Yates over positions, then restore file order.
        let mut positions: Vec<usize> = (0..self.triples.len()).collect();
        for i in 0..n {
            let j = i + rng.gen_index(positions.len() - i);
            positions.swap(i, j);
        }
        let mut chosen = positions[..n].to_vec();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| self.triples[i]).collect()
    }
}

/// Split a non-empty line into exactly three fields.
fn split_fields(line: &str) -> Option<(&str, &str, &str)> {
    let fields: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };
    match fields.as_slice() {
        [h, r, t] if !h.is_empty() && !r.is_empty() && !t.is_empty() => Some((h, r, t)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn parse(text: &str) -> Result<Dataset> {
        Dataset::from_reader(text.as_bytes(), Path::new("mem"), Vocab::new(), Vocab::new(), true)
    }

    #[test]
    fn test_assigns_indices_in_first_appearance_order() {
        let ds = parse("paris\tcapital_of\tfrance\nberlin\tcapital_of\tgermany\n").unwrap();
        assert_eq!(ds.triples(), &[Triple::new(0, 0, 1), Triple::new(2, 0, 3)]);
        assert_eq!(ds.entities().symbol(3), Some("germany"));
        assert_eq!(
            ds.stats(),
            DatasetStats {
                entities: 4,
                relations: 1,
                triples: 2
            }
        );
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let ds = parse("# header\n\n a r b \n").unwrap();
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_tab_fields_may_contain_spaces() {
        let ds = parse("New York\tlocated in\tUnited States\n").unwrap();
        assert_eq!(ds.entities().get("New York"), Some(0));
        assert_eq!(ds.relations().get("located in"), Some(0));
    }

    #[test]
    fn test_malformed_line_is_parse_error() {
        let err = parse("a r b\na r\n").unwrap_err();
        match err {
            Error::Parse { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "a r");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(parse("a r b c\n"), Err(Error::Parse { line: 1, .. })));
        assert!(matches!(parse("a\t\tb\n"), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_closed_vocab_rejects_unknown_symbols() {
        let train = parse("a r b\n").unwrap();

        let err = Dataset::from_reader(
            "a r c\n".as_bytes(),
            Path::new("valid"),
            train.entities().clone(),
            train.relations().clone(),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownSymbol { kind: SymbolKind::Entity, ref symbol, .. } if symbol == "c"
        ));

        let err = Dataset::from_reader(
            "a s b\n".as_bytes(),
            Path::new("valid"),
            train.entities().clone(),
            train.relations().clone(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol { kind: SymbolKind::Relation, .. }));
    }

    #[test]
    fn test_closed_vocab_reuses_indices() {
        let train = parse("a r b\nb r c\n").unwrap();
        let valid = Dataset::from_reader(
            "c r a\n".as_bytes(),
            Path::new("valid"),
            train.entities().clone(),
            train.relations().clone(),
            false,
        )
        .unwrap();
        assert_eq!(valid.triples(), &[Triple::new(2, 0, 0)]);
        assert_eq!(valid.n_entities(), 3);
    }

    #[test]
    fn test_sample_triples_keeps_file_order() {
        let text: String = (0..20).map(|i| format!("e{i} r e{}\n", i + 1)).collect();
        let ds = parse(&text).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(7);

        let sample = ds.sample_triples(8, &mut rng);
        assert_eq!(sample.len(), 8);
        assert!(sample.windows(2).all(|w| w[0].head < w[1].head));

        assert_eq!(ds.sample_triples(100, &mut rng), ds.triples().to_vec());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Dataset::from_file("/nonexistent/triples.txt").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
