use std::fmt;

use bstr::ByteSlice;

use crate::dictionary::{FeatureId, FrozenDictionary};
use crate::error::{Error, Result};
use crate::template::Templates;
use crate::train::MODEL_VERSION;

/// Bounds-checked little endian cursor over a model image
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::format("model file is broken"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// Split a NUL separated section, skipping padding
fn strings(section: &[u8]) -> Result<Vec<&str>> {
    section
        .split_str(b"\0")
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.to_str()
                .map_err(|_| Error::format("model file contains invalid UTF-8"))
        })
        .collect()
}

/// A binary model loaded from memory
#[derive(Clone)]
pub struct Model<'a> {
    version: u32,
    cost_factor: f64,
    max_id: u32,
    xsize: u32,
    labels: Vec<&'a str>,
    templates: Templates,
    dictionary: FrozenDictionary<'a>,
    weights: Vec<f32>,
}

impl fmt::Debug for Model<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("version", &self.version)
            .field("cost_factor", &self.cost_factor)
            .field("max_id", &self.max_id)
            .field("xsize", &self.xsize)
            .field("labels", &self.labels)
            .field("templates", &self.templates)
            .finish()
    }
}

impl<'a> Model<'a> {
    /// Parse a binary model image
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        let version = r.u32()?;
        if version / 100 != MODEL_VERSION / 100 {
            return Err(Error::VersionMismatch {
                found: version,
                expected: MODEL_VERSION,
            });
        }
        let model_type = r.i32()?;
        if model_type != 0 {
            return Err(Error::format(format!("unknown model type: {}", model_type)));
        }
        let cost_factor = r.f64()?;
        let max_id = r.u32()?;
        let xsize = r.u32()?;
        let dsize = r.u32()? as usize;

        let len = r.u32()? as usize;
        let labels = strings(r.take(len)?)?;
        let len = r.u32()? as usize;
        let mut templates = Templates::new();
        for template in strings(r.take(len)?)? {
            templates.push(template)?;
        }

        let dictionary = FrozenDictionary::new(r.take(dsize)?)?;
        let weights = r
            .take(max_id as usize * 4)?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if !r.is_empty() {
            return Err(Error::format("model file is broken"));
        }

        Ok(Self {
            version,
            cost_factor,
            max_id,
            xsize,
            labels,
            templates,
            dictionary,
            weights,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn cost_factor(&self) -> f64 {
        self.cost_factor
    }

    /// Length of the weight vector
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Observation columns the templates read
    pub fn xsize(&self) -> u32 {
        self.xsize
    }

    pub fn labels(&self) -> &[&'a str] {
        &self.labels
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Base id of a feature instance
    pub fn feature_id(&self, key: &str) -> Option<FeatureId> {
        self.dictionary.get(key)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{ModelData, ModelWriter};

    fn image() -> Vec<u8> {
        let model = ModelData::new(
            1.0,
            2,
            vec!["B-NP".to_string(), "I-NP".to_string(), "O".to_string()],
            Templates::parse("U00:%x[0,0]\nU01:%x[0,1]\nB\n").unwrap(),
            vec![("U00:He".to_string(), 0), ("B".to_string(), 3)],
            (0..12).map(|i| i as f64 * 0.25).collect(),
        );
        let mut buf = Vec::new();
        ModelWriter::write_binary(&model, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_model_new() {
        let buf = image();
        let model = Model::new(&buf).unwrap();
        assert_eq!(model.version(), 100);
        assert_eq!(model.cost_factor(), 1.0);
        assert_eq!(model.max_id(), 12);
        assert_eq!(model.xsize(), 2);
        assert_eq!(model.labels(), ["B-NP", "I-NP", "O"]);
        assert_eq!(model.templates().unigram().len(), 2);
        assert_eq!(model.templates().bigram(), ["B"]);
        assert_eq!(model.feature_id("U00:He"), Some(0));
        assert_eq!(model.feature_id("B"), Some(3));
        assert_eq!(model.feature_id("U00:She"), None);
        assert_eq!(model.weights()[5], 1.25);
    }

    #[test]
    fn test_invalid_model() {
        let buf = image();
        assert!(matches!(
            Model::new(&buf[..buf.len() - 1]),
            Err(Error::Format(_))
        ));

        let mut trailing = buf.clone();
        trailing.push(0);
        assert!(matches!(Model::new(&trailing), Err(Error::Format(_))));

        let mut old = buf;
        old[0..4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            Model::new(&old),
            Err(Error::VersionMismatch { found: 99, expected: 100 })
        ));

        assert!(Model::new(&[]).is_err());
    }
}
