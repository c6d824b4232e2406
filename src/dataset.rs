use std::collections::BTreeSet;
use std::io::BufRead;

use crate::error::{Error, Result};

/// A sentence of the training text
///
/// Every row holds the observation columns followed by the gold label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    rows: Vec<Vec<String>>,
}

impl Sentence {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of tokens in the sentence
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Gold label of the token at `pos`
    pub fn label(&self, pos: usize) -> &str {
        self.rows[pos].last().map(String::as_str).unwrap_or("")
    }
}

/// Training sentences together with the label alphabet they use
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: Vec<Sentence>,
    labels: Vec<String>,
    xsize: usize,
}

impl Corpus {
    /// Read training text.
    ///
    /// Tokens are separated by spaces or tabs. An empty line, or a line that
    /// starts with a space or a tab, ends the current sentence. The first row
    /// fixes the column count for the whole input.
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut sentences = Vec::new();
        let mut labels = BTreeSet::new();
        let mut columns = 0;
        let mut rows = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with(' ') || line.starts_with('\t') {
                if !rows.is_empty() {
                    sentences.push(Sentence::new(std::mem::take(&mut rows)));
                }
                continue;
            }

            let row: Vec<String> = line
                .split(|c| c == ' ' || c == '\t')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if columns == 0 {
                columns = row.len();
            }
            if row.len() != columns {
                return Err(Error::format(format!(
                    "inconsistent column size: {} {} at line {}",
                    columns,
                    row.len(),
                    lineno + 1
                )));
            }
            if let Some(label) = row.last() {
                labels.insert(label.clone());
            }
            rows.push(row);
        }
        if !rows.is_empty() {
            sentences.push(Sentence::new(rows));
        }

        Ok(Self {
            sentences,
            labels: labels.into_iter().collect(),
            xsize: columns.saturating_sub(1),
        })
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Sorted, distinct gold labels
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of observation columns per row
    pub fn xsize(&self) -> usize {
        self.xsize
    }

    /// Index of `label` in the label alphabet
    pub fn label_id(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|l| l.as_str().cmp(label))
            .ok()
    }

    pub(crate) fn into_parts(self) -> (Vec<Sentence>, Vec<String>, usize) {
        (self.sentences, self.labels, self.xsize)
    }
}
