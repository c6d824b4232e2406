use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;

use super::dictionary;
use crate::dictionary::FeatureId;
use crate::error::{Error, Result};
use crate::template::Templates;

/// Major model version; loaders accept any version with the same `/ 100`.
pub const MODEL_VERSION: u32 = 100;

/// Everything a trained model consists of
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    cost_factor: f64,
    xsize: usize,
    labels: Vec<String>,
    templates: Templates,
    /// Feature keys with their base ids, ascending id
    features: Vec<(String, FeatureId)>,
    weights: Vec<f64>,
}

impl ModelData {
    pub fn new(
        cost_factor: f64,
        xsize: usize,
        labels: Vec<String>,
        templates: Templates,
        features: Vec<(String, FeatureId)>,
        weights: Vec<f64>,
    ) -> Self {
        Self {
            cost_factor,
            xsize,
            labels,
            templates,
            features,
            weights,
        }
    }

    pub fn cost_factor(&self) -> f64 {
        self.cost_factor
    }

    /// Length of the weight vector
    pub fn max_id(&self) -> usize {
        self.weights.len()
    }

    pub fn xsize(&self) -> usize {
        self.xsize
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn features(&self) -> &[(String, FeatureId)] {
        &self.features
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Serializes trained models
pub struct ModelWriter;

impl ModelWriter {
    /// Write the binary model to `path`, plus `<path>.txt` when `text` is set.
    pub fn save<P: AsRef<Path>>(model: &ModelData, path: P, text: bool) -> Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(File::create(path)?);
        Self::write_binary(model, &mut file)?;
        file.flush()?;

        if text {
            let mut text_path = path.as_os_str().to_owned();
            text_path.push(".txt");
            let mut file = BufWriter::new(File::create(&text_path)?);
            Self::write_text(model, &mut file)?;
            file.flush()?;
        }
        info!("model written to {}", path.display());
        Ok(())
    }

    /// Write the binary layout.
    ///
    /// All integers are little endian. Label and template sections are
    /// NUL separated; the template section is padded with NULs so that both
    /// sections together end on a 4-byte boundary.
    pub fn write_binary<W: Write>(model: &ModelData, w: &mut W) -> Result<()> {
        let trie = dictionary::freeze(model.features.iter().map(|(k, id)| (k.as_str(), *id)))?;

        let mut labels = Vec::new();
        for label in &model.labels {
            labels.extend_from_slice(label.as_bytes());
            labels.push(0);
        }
        let mut templates = Vec::new();
        for template in model.templates.iter() {
            templates.extend_from_slice(template.as_bytes());
            templates.push(0);
        }
        while (labels.len() + templates.len()) % 4 != 0 {
            templates.push(0);
        }

        w.write_all(&MODEL_VERSION.to_le_bytes())?;
        w.write_all(&0i32.to_le_bytes())?;
        w.write_all(&model.cost_factor.to_le_bytes())?;
        w.write_all(&to_u32(model.max_id(), "maxid")?.to_le_bytes())?;
        w.write_all(&to_u32(model.xsize, "xsize")?.to_le_bytes())?;
        w.write_all(&to_u32(trie.len(), "dictionary size")?.to_le_bytes())?;
        w.write_all(&to_u32(labels.len(), "label section")?.to_le_bytes())?;
        w.write_all(&labels)?;
        w.write_all(&to_u32(templates.len(), "template section")?.to_le_bytes())?;
        w.write_all(&templates)?;
        w.write_all(&trie)?;
        for &weight in &model.weights {
            w.write_all(&(weight as f32).to_le_bytes())?;
        }
        Ok(())
    }

    /// Write the human-readable mirror of the binary model
    pub fn write_text<W: Write>(model: &ModelData, w: &mut W) -> Result<()> {
        writeln!(w, "version: {}", MODEL_VERSION)?;
        writeln!(w, "cost-factor: {}", model.cost_factor)?;
        writeln!(w, "maxid: {}", model.max_id())?;
        writeln!(w, "xsize: {}", model.xsize)?;
        writeln!(w)?;

        for label in &model.labels {
            writeln!(w, "{}", label)?;
        }
        writeln!(w)?;

        for template in model.templates.iter() {
            writeln!(w, "{}", template)?;
        }
        writeln!(w)?;

        for (key, id) in &model.features {
            writeln!(w, "{} {}", id, key)?;
        }
        writeln!(w)?;

        for weight in &model.weights {
            writeln!(w, "{:.16}", weight)?;
        }
        Ok(())
    }

    /// Parse a text model written by [`write_text`](Self::write_text)
    pub fn read_text<R: BufRead>(reader: R) -> Result<ModelData> {
        let mut lines = reader.lines();
        let mut next_line = || -> Result<Option<String>> {
            match lines.next() {
                Some(line) => Ok(Some(line?.trim_end_matches('\r').to_string())),
                None => Ok(None),
            }
        };

        let mut version = None;
        let mut cost_factor = None;
        let mut max_id = None;
        let mut xsize = None;
        while let Some(line) = next_line()? {
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::format(format!("broken header line: {}", line)))?;
            let value = value.trim();
            match key {
                "version" => version = Some(parse_number::<u32>(key, value)?),
                "cost-factor" => cost_factor = Some(parse_number::<f64>(key, value)?),
                "maxid" => max_id = Some(parse_number::<usize>(key, value)?),
                "xsize" => xsize = Some(parse_number::<usize>(key, value)?),
                _ => return Err(Error::format(format!("unknown header field: {}", key))),
            }
        }

        let version = version.ok_or_else(|| Error::format("version is not defined"))?;
        if version / 100 != MODEL_VERSION / 100 {
            return Err(Error::VersionMismatch {
                found: version,
                expected: MODEL_VERSION,
            });
        }
        let cost_factor = cost_factor.unwrap_or(1.0);
        let max_id = max_id
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::format("maxid is not defined"))?;
        let xsize = xsize
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::format("xsize is not defined"))?;

        let mut labels = Vec::new();
        while let Some(line) = next_line()? {
            if line.is_empty() {
                break;
            }
            labels.push(line);
        }

        let mut templates = Templates::new();
        while let Some(line) = next_line()? {
            if line.is_empty() {
                break;
            }
            templates.push(line)?;
        }

        let mut features = Vec::new();
        while let Some(line) = next_line()? {
            if line.is_empty() {
                break;
            }
            let (id, key) = line
                .split_once(' ')
                .ok_or_else(|| Error::format(format!("broken feature line: {}", line)))?;
            features.push((key.to_string(), parse_number::<FeatureId>("feature id", id)?));
        }

        let mut weights = Vec::with_capacity(max_id);
        while let Some(line) = next_line()? {
            if line.is_empty() {
                continue;
            }
            weights.push(parse_number::<f64>("weight", line.trim())?);
        }
        if weights.len() != max_id {
            return Err(Error::format(format!(
                "maxid is not equal to the number of weights: {} vs {}",
                max_id,
                weights.len()
            )));
        }

        Ok(ModelData::new(
            cost_factor,
            xsize,
            labels,
            templates,
            features,
            weights,
        ))
    }

    /// Rebuild a binary model from its text mirror
    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(text_path: P, binary_path: Q) -> Result<()> {
        let reader = BufReader::new(File::open(text_path.as_ref())?);
        let model = Self::read_text(reader)?;
        Self::save(&model, binary_path, false)
    }
}

fn to_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::format(format!("{} exceeds u32::MAX", what)))
}

fn parse_number<T: std::str::FromStr>(what: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::format(format!("invalid {}: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn model() -> ModelData {
        ModelData::new(
            1.0,
            1,
            vec!["X".to_string(), "Y".to_string()],
            Templates::parse("U00:%x[0,0]\nB\n").unwrap(),
            vec![
                ("U00:a".to_string(), 0),
                ("U00:b".to_string(), 2),
                ("B".to_string(), 4),
            ],
            vec![0.5, -0.5, -0.25, 0.25, 0.125, 1.0, -1.0, 0.0],
        )
    }

    #[test]
    fn test_text_layout() {
        let mut buf = Vec::new();
        ModelWriter::write_text(&model(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            &lines[..14],
            [
                "version: 100",
                "cost-factor: 1",
                "maxid: 8",
                "xsize: 1",
                "",
                "X",
                "Y",
                "",
                "U00:%x[0,0]",
                "B",
                "",
                "0 U00:a",
                "2 U00:b",
                "4 B",
            ]
        );
        assert_eq!(lines[15], "0.5000000000000000");
        assert_eq!(lines.len(), 15 + 8);
    }

    #[test]
    fn test_read_text() {
        let mut buf = Vec::new();
        ModelWriter::write_text(&model(), &mut buf).unwrap();
        let parsed = ModelWriter::read_text(Cursor::new(buf)).unwrap();
        assert_eq!(parsed, model());
    }

    #[test]
    fn test_read_text_rejects_weight_count() {
        let mut buf = Vec::new();
        ModelWriter::write_text(&model(), &mut buf).unwrap();
        let mut text = String::from_utf8(buf).unwrap();
        text.push_str("0.1\n");
        let err = ModelWriter::read_text(Cursor::new(text)).unwrap_err();
        assert!(err.to_string().contains("number of weights"));

        let err = ModelWriter::read_text(Cursor::new("version: 100\nmaxid: 0\nxsize: 1\n\n"))
            .unwrap_err();
        assert_eq!(err.to_string(), "format error: maxid is not defined");

        let err = ModelWriter::read_text(Cursor::new("version: 200\n\n")).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { found: 200, .. }));
    }

    #[test]
    fn test_binary_alignment() {
        let mut buf = Vec::new();
        ModelWriter::write_binary(&model(), &mut buf).unwrap();
        assert_eq!(&buf[0..4], &100u32.to_le_bytes());
        // "X\0Y\0" is 4 bytes, "U00:%x[0,0]\0B\0" is 14, padded to 16
        let labels_len = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]) as usize;
        assert_eq!(labels_len, 4);
        let at = 32 + labels_len;
        let templates_len =
            u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]) as usize;
        assert_eq!(templates_len, 16);
        assert_eq!((labels_len + templates_len) % 4, 0);
        let weights = &buf[buf.len() - 8 * 4..];
        assert_eq!(&weights[0..4], &0.5f32.to_le_bytes());
    }
}
