use std::io::BufRead;

use crate::error::{Error, Result};

/// Largest relative row a `%x[row,col]` macro may reference
pub const MAX_CONTEXT_SIZE: usize = 8;

const BOS: [&str; MAX_CONTEXT_SIZE] = [
    "_B-1", "_B-2", "_B-3", "_B-4", "_B-5", "_B-6", "_B-7", "_B-8",
];
const EOS: [&str; MAX_CONTEXT_SIZE] = [
    "_B+1", "_B+2", "_B+3", "_B+4", "_B+5", "_B+6", "_B+7", "_B+8",
];

/// Template kind, decided by the leading character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// `U...` templates produce state features attached to lattice nodes
    Unigram,
    /// `B...` templates produce transition features attached to lattice paths
    Bigram,
}

impl TemplateKind {
    /// Kind of a template or of a feature instance generated from it
    pub fn of(s: &str) -> Option<Self> {
        match s.as_bytes().first() {
            Some(b'U') => Some(TemplateKind::Unigram),
            Some(b'B') => Some(TemplateKind::Bigram),
            _ => None,
        }
    }

    /// Number of weight ids one feature of this kind reserves for `num_labels` labels
    pub fn id_range(self, num_labels: usize) -> usize {
        match self {
            TemplateKind::Unigram => num_labels,
            TemplateKind::Bigram => num_labels * num_labels,
        }
    }
}

/// Ordered unigram and bigram feature templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates {
    unigram: Vec<String>,
    bigram: Vec<String>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the contents of a template file
    pub fn parse(text: &str) -> Result<Self> {
        let mut templates = Self::new();
        for line in text.lines() {
            templates.push_line(line)?;
        }
        Ok(templates)
    }

    /// Read a template file
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut templates = Self::new();
        for line in reader.lines() {
            templates.push_line(&line?)?;
        }
        Ok(templates)
    }

    fn push_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            return Ok(());
        }
        self.push(line)
    }

    /// Add a single template
    pub fn push<S: Into<String>>(&mut self, template: S) -> Result<()> {
        let template = template.into();
        match TemplateKind::of(&template) {
            Some(TemplateKind::Unigram) => self.unigram.push(template),
            Some(TemplateKind::Bigram) => self.bigram.push(template),
            None => return Err(Error::format(format!("unknown type: {}", template))),
        }
        Ok(())
    }

    pub fn unigram(&self) -> &[String] {
        &self.unigram
    }

    pub fn bigram(&self) -> &[String] {
        &self.bigram
    }

    /// All templates, unigram first
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.unigram
            .iter()
            .chain(self.bigram.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.unigram.len() + self.bigram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expands `%x[row,col]` macros of a template against a tokenized sentence.
///
/// The engine remembers the widest column any template has referenced so the
/// model writer can drop observation columns no template reads.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    max_xsize: usize,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One past the largest column referenced so far, 0 if none
    pub fn max_xsize(&self) -> usize {
        self.max_xsize
    }

    /// Apply `template` at position `pos` of `rows`, writing the feature
    /// instance into `out`.
    ///
    /// Rows outside the sentence resolve to distance-indexed boundary markers
    /// (`_B-1`, `_B-2`, ... before the start, `_B+1`, ... past the end).
    /// `pos` itself must lie inside the sentence.
    pub fn apply<S: AsRef<str>>(
        &mut self,
        out: &mut String,
        template: &str,
        pos: usize,
        rows: &[Vec<S>],
        xsize: usize,
    ) -> Result<()> {
        out.clear();
        if pos >= rows.len() {
            return Err(Error::Template(format!(
                "{}: position {} is outside a sentence of {} tokens",
                template,
                pos,
                rows.len()
            )));
        }
        let mut rest = template;
        while let Some(i) = rest.find('%') {
            out.push_str(&rest[..i]);
            let reference = rest[i + 1..]
                .strip_prefix('x')
                .ok_or_else(|| Error::Template(template.to_string()))?;
            let (cell, remain) = self
                .cell(reference, pos, rows, xsize)
                .ok_or_else(|| Error::Template(template.to_string()))?;
            out.push_str(cell);
            rest = remain;
        }
        out.push_str(rest);
        Ok(())
    }

    /// Resolve `[row,col]...` and return the cell plus the unparsed remainder
    fn cell<'r, 't, S: AsRef<str>>(
        &mut self,
        reference: &'t str,
        pos: usize,
        rows: &'r [Vec<S>],
        xsize: usize,
    ) -> Option<(&'r str, &'t str)> {
        let body = reference.strip_prefix('[')?;
        let close = body.find(']')?;
        let (row, col) = body[..close].split_once(',')?;
        let remain = &body[close + 1..];

        let (negative, row) = match row.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, row),
        };
        let row = parse_digits(row)?;
        let col = parse_digits(col)?;
        if row > MAX_CONTEXT_SIZE || col >= xsize {
            return None;
        }
        self.max_xsize = self.max_xsize.max(col + 1);

        let idx = if negative {
            pos as isize - row as isize
        } else {
            (pos + row) as isize
        };
        let cell = if idx < 0 {
            BOS[(-idx - 1) as usize]
        } else if idx as usize >= rows.len() {
            EOS[idx as usize - rows.len()]
        } else {
            rows[idx as usize].get(col)?.as_ref()
        };
        Some((cell, remain))
    }
}

fn parse_digits(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<&'static str>> {
        vec![
            vec!["He", "PRP", "B-NP"],
            vec!["reckons", "VBZ", "B-VP"],
            vec!["the", "DT", "B-NP"],
        ]
    }

    fn apply(engine: &mut TemplateEngine, template: &str, pos: usize) -> Result<String> {
        let mut out = String::new();
        engine.apply(&mut out, template, pos, &rows(), 2)?;
        Ok(out)
    }

    #[test]
    fn test_substitution() {
        let mut engine = TemplateEngine::new();
        assert_eq!(apply(&mut engine, "U00:%x[0,0]", 1).unwrap(), "U00:reckons");
        assert_eq!(
            apply(&mut engine, "U05:%x[-1,0]/%x[0,1]", 1).unwrap(),
            "U05:He/VBZ"
        );
        assert_eq!(apply(&mut engine, "B", 2).unwrap(), "B");
        assert_eq!(engine.max_xsize(), 2);
    }

    #[test]
    fn test_boundary_markers() {
        let mut engine = TemplateEngine::new();
        assert_eq!(apply(&mut engine, "U:%x[-2,0]", 0).unwrap(), "U:_B-2");
        assert_eq!(apply(&mut engine, "U:%x[-1,1]", 0).unwrap(), "U:_B-1");
        assert_eq!(apply(&mut engine, "U:%x[1,0]", 2).unwrap(), "U:_B+1");
        assert_eq!(apply(&mut engine, "U:%x[8,0]", 2).unwrap(), "U:_B+8");
    }

    #[test]
    fn test_malformed_templates() {
        let mut engine = TemplateEngine::new();
        for template in &[
            "U:%y[0,0]",
            "U:%x0,0]",
            "U:%x[0,0",
            "U:%x[0]",
            "U:%x[a,0]",
            "U:%x[+1,0]",
            "U:%x[9,0]",
            "U:%x[-9,0]",
            "U:%x[0,2]",
            "U:%",
        ] {
            let err = apply(&mut engine, template, 1).unwrap_err();
            assert!(matches!(err, Error::Template(_)), "{}", template);
        }
    }

    #[test]
    fn test_position_outside_sentence() {
        let mut engine = TemplateEngine::new();
        for template in &["U:%x[0,0]", "U:%x[-1,0]", "B"] {
            let err = apply(&mut engine, template, 3).unwrap_err();
            assert!(matches!(err, Error::Template(_)), "{}", template);
        }
        let mut out = String::new();
        let empty: Vec<Vec<&str>> = Vec::new();
        assert!(engine.apply(&mut out, "U:%x[0,0]", 0, &empty, 1).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_max_xsize_tracks_used_columns() {
        let mut engine = TemplateEngine::new();
        apply(&mut engine, "U:%x[0,0]", 0).unwrap();
        assert_eq!(engine.max_xsize(), 1);
        apply(&mut engine, "U:%x[0,1]", 0).unwrap();
        assert_eq!(engine.max_xsize(), 2);
    }

    #[test]
    fn test_parse_templates() {
        let text = "# Unigram\nU00:%x[0,0]\nU01:%x[1,0]\n\n# Bigram\nB\n";
        let templates = Templates::parse(text).unwrap();
        assert_eq!(templates.unigram(), ["U00:%x[0,0]", "U01:%x[1,0]"]);
        assert_eq!(templates.bigram(), ["B"]);
        assert_eq!(templates.len(), 3);

        let err = Templates::parse("U00:%x[0,0]\nX01:%x[0,0]\n").unwrap_err();
        assert!(err.to_string().contains("unknown type"));
    }

    #[test]
    fn test_id_range() {
        assert_eq!(TemplateKind::Unigram.id_range(3), 3);
        assert_eq!(TemplateKind::Bigram.id_range(3), 9);
        assert_eq!(TemplateKind::of("U01:x"), Some(TemplateKind::Unigram));
        assert_eq!(TemplateKind::of("B"), Some(TemplateKind::Bigram));
        assert_eq!(TemplateKind::of(""), None);
    }
}
