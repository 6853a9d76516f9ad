//! Named matrices in a `safetensors` container.
//!
//! Every matrix becomes one `F64` 2-D tensor named `<field>.<n>` (or
//! `<field>.<n>.<slice>` for tensor slices). The keys each tensor is stored
//! under live in an `index` entry of the header metadata, so no key is ever
//! encoded into a tensor name.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};
use serde::{Deserialize, Serialize};

use crate::{
    ConvertError, Result,
    codec::{Matrix, Tensor},
    keyed::{KeyMap, TwoKeyMap},
    schema::Opaque,
};

const SCHEMA_KEY: &str = "schema";
const INDEX_KEY: &str = "index";
const F64_SIZE: usize = size_of::<f64>();

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexEntry {
    keys: Vec<String>,
    tensors: Vec<String>,
}

type Index = BTreeMap<String, Vec<IndexEntry>>;

fn native_err(msg: impl Into<String>) -> ConvertError {
    ConvertError::Native(msg.into())
}

/// Accumulates the fields of a model and serializes them in one go.
pub struct ArchiveWriter {
    schema: &'static str,
    tensors: Vec<(String, Vec<usize>, Vec<u8>)>,
    index: Index,
    metadata: HashMap<String, String>,
}

impl ArchiveWriter {
    pub fn new(schema: &'static str) -> Self {
        Self {
            schema,
            tensors: Vec::new(),
            index: Index::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn put_key_map(&mut self, field: &str, map: &KeyMap<Matrix>) {
        self.index.entry(field.to_string()).or_default();
        for (key, matrix) in map.iter() {
            self.put(field, vec![key.to_string()], &[matrix]);
        }
    }

    pub fn put_two_key_map(&mut self, field: &str, map: &TwoKeyMap<Matrix>) {
        self.index.entry(field.to_string()).or_default();
        for (outer, inner, matrix) in map.iter() {
            self.put(field, vec![outer.to_string(), inner.to_string()], &[matrix]);
        }
    }

    pub fn put_two_key_tensors(&mut self, field: &str, map: &TwoKeyMap<Tensor>) {
        self.index.entry(field.to_string()).or_default();
        for (outer, inner, tensor) in map.iter() {
            let slices: Vec<_> = tensor.slices().iter().collect();
            self.put(field, vec![outer.to_string(), inner.to_string()], &slices);
        }
    }

    pub fn put_opaque(&mut self, key: &str, value: &Opaque) {
        // SAFETY: A `serde_json::Value` always serializes.
        let json = serde_json::to_string(value).unwrap();
        self.metadata.insert(key.to_string(), json);
    }

    /// Serializes every put field into the bytes of a `safetensors` file.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        // SAFETY: The index only holds strings.
        let index = serde_json::to_string(&self.index).unwrap();
        self.metadata.insert(INDEX_KEY.to_string(), index);
        self.metadata
            .insert(SCHEMA_KEY.to_string(), self.schema.to_string());

        let views = self
            .tensors
            .iter()
            .map(|(name, shape, data)| {
                let view = TensorView::new(Dtype::F64, shape.clone(), data)
                    .map_err(|e| native_err(format!("tensor {name}: {e:?}")))?;
                Ok((name.as_str(), view))
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("serializing {} tensors", views.len());
        let views = views.iter().map(|(name, view)| (*name, view));
        safetensors::serialize(views, &Some(self.metadata))
            .map_err(|e| native_err(format!("cannot serialize: {e:?}")))
    }

    fn put(&mut self, field: &str, keys: Vec<String>, slices: &[&Matrix]) {
        let entries = self.index.entry(field.to_string()).or_default();
        let n = entries.len();

        let tensors = if slices.len() == 1 {
            vec![format!("{field}.{n}")]
        } else {
            (0..slices.len()).map(|i| format!("{field}.{n}.{i}")).collect()
        };

        for (name, matrix) in tensors.iter().zip(slices) {
            let data = matrix.iter().flat_map(f64::to_le_bytes).collect();
            let shape = vec![matrix.nrows(), matrix.ncols()];
            self.tensors.push((name.clone(), shape, data));
        }

        entries.push(IndexEntry { keys, tensors });
    }
}

/// Gives typed access to the fields stored in a `safetensors` file.
pub struct ArchiveReader<'data> {
    tensors: SafeTensors<'data>,
    index: Index,
    metadata: HashMap<String, String>,
}

impl<'data> ArchiveReader<'data> {
    /// Parses `bytes` and checks they hold a model of kind `schema`.
    pub fn open(bytes: &'data [u8], schema: &str) -> Result<Self> {
        let (_, header) = SafeTensors::read_metadata(bytes)
            .map_err(|e| native_err(format!("cannot read header: {e:?}")))?;
        let metadata = header.metadata().clone().unwrap_or_default();

        match metadata.get(SCHEMA_KEY) {
            Some(got) if got == schema => {}
            Some(got) => return Err(native_err(format!("holds a {got} model, expected {schema}"))),
            None => return Err(native_err("no schema in the header metadata")),
        }

        let index = metadata
            .get(INDEX_KEY)
            .ok_or_else(|| native_err("no index in the header metadata"))?;
        let index: Index = serde_json::from_str(index)
            .map_err(|e| native_err(format!("bad index: {e}")))?;

        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| native_err(format!("cannot read tensors: {e:?}")))?;

        Ok(Self {
            tensors,
            index,
            metadata,
        })
    }

    /// Returns whether `field` was stored at all, even if empty.
    pub fn has_field(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn key_map(&self, field: &str) -> Result<KeyMap<Matrix>> {
        let mut map = KeyMap::new();
        for entry in self.entries(field)? {
            let [key] = entry.keys.as_slice() else {
                return Err(bad_keys(field, &entry.keys, 1));
            };
            map.insert(key.clone(), self.single(field, entry)?);
        }
        Ok(map)
    }

    pub fn two_key_map(&self, field: &str) -> Result<TwoKeyMap<Matrix>> {
        let mut map = TwoKeyMap::new();
        for entry in self.entries(field)? {
            let [outer, inner] = entry.keys.as_slice() else {
                return Err(bad_keys(field, &entry.keys, 2));
            };
            map.insert(outer.clone(), inner.clone(), self.single(field, entry)?);
        }
        Ok(map)
    }

    pub fn two_key_tensors(&self, field: &str) -> Result<TwoKeyMap<Tensor>> {
        let mut map = TwoKeyMap::new();
        for entry in self.entries(field)? {
            let [outer, inner] = entry.keys.as_slice() else {
                return Err(bad_keys(field, &entry.keys, 2));
            };
            let slices = entry
                .tensors
                .iter()
                .map(|name| self.matrix(name))
                .collect::<Result<Vec<_>>>()?;
            map.insert(outer.clone(), inner.clone(), Tensor::new(slices)?);
        }
        Ok(map)
    }

    pub fn opaque(&self, key: &str) -> Result<Opaque> {
        let json = self
            .metadata
            .get(key)
            .ok_or_else(|| native_err(format!("no {key} in the header metadata")))?;

        serde_json::from_str(json).map_err(|e| native_err(format!("bad {key}: {e}")))
    }

    fn entries(&self, field: &str) -> Result<&[IndexEntry]> {
        self.index
            .get(field)
            .map(Vec::as_slice)
            .ok_or_else(|| native_err(format!("field {field} is missing")))
    }

    fn single(&self, field: &str, entry: &IndexEntry) -> Result<Matrix> {
        match entry.tensors.as_slice() {
            [name] => self.matrix(name),
            names => Err(native_err(format!(
                "field {field}: expected one tensor per entry, got {}",
                names.len()
            ))),
        }
    }

    fn matrix(&self, name: &str) -> Result<Matrix> {
        let view = self
            .tensors
            .tensor(name)
            .map_err(|e| native_err(format!("tensor {name}: {e:?}")))?;

        if view.dtype() != Dtype::F64 {
            let msg = format!("tensor {name}: expected F64, got {:?}", view.dtype());
            return Err(native_err(msg));
        }

        let &[rows, cols] = view.shape() else {
            let msg = format!("tensor {name}: expected 2 dimensions, got {:?}", view.shape());
            return Err(native_err(msg));
        };

        let values = view
            .data()
            .chunks_exact(F64_SIZE)
            .map(|chunk| {
                let mut bytes = [0; F64_SIZE];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect();

        let array = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| native_err(format!("tensor {name}: {e}")))?;

        Ok(Matrix::try_from(array)?)
    }
}

fn bad_keys(field: &str, keys: &[String], expected: usize) -> ConvertError {
    native_err(format!(
        "field {field}: expected {expected} key(s), got {keys:?}"
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{codec::matrix, keyed::KeyedMap};

    fn m(rows: Vec<Vec<f64>>) -> Matrix {
        matrix::from_portable(&rows).unwrap()
    }

    #[test]
    fn fields_survive_the_archive() {
        let words: KeyMap<Matrix> = [("b", m(vec![vec![1.5, -2.0]])), ("a", m(vec![vec![0.1]]))]
            .into_iter()
            .collect();
        let pairs: TwoKeyMap<Matrix> = [("x", "y", m(vec![vec![1.0], vec![2.0]]))]
            .into_iter()
            .collect();
        let tensors: TwoKeyMap<Tensor> = [(
            "x",
            "y",
            Tensor::new(vec![m(vec![vec![3.0]]), m(vec![vec![4.0, 5.0]])]).unwrap(),
        )]
        .into_iter()
        .collect();
        let options = Opaque::new(json!({ "dim": 2 }));

        let mut out = ArchiveWriter::new("test");
        out.put_key_map("words", &words);
        out.put_two_key_map("pairs", &pairs);
        out.put_two_key_tensors("tensors", &tensors);
        out.put_key_map("empty", &KeyMap::new());
        out.put_opaque("options", &options);
        let bytes = out.finish().unwrap();

        let archive = ArchiveReader::open(&bytes, "test").unwrap();
        assert_eq!(archive.key_map("words").unwrap(), words);
        assert_eq!(archive.two_key_map("pairs").unwrap(), pairs);
        assert_eq!(archive.two_key_tensors("tensors").unwrap(), tensors);
        assert!(archive.has_field("empty"));
        assert!(archive.key_map("empty").unwrap().is_empty());
        assert!(!archive.has_field("other"));
        assert_eq!(archive.opaque("options").unwrap(), options);
    }

    #[test]
    fn wrong_schema_is_refused() {
        let bytes = ArchiveWriter::new("test").finish().unwrap();

        assert!(matches!(
            ArchiveReader::open(&bytes, "other"),
            Err(ConvertError::Native(_))
        ));
    }

    #[test]
    fn garbage_is_refused() {
        assert!(matches!(
            ArchiveReader::open(b"not a model", "test"),
            Err(ConvertError::Native(_))
        ));
    }

    #[test]
    fn key_shape_is_checked() {
        let words: KeyMap<Matrix> = [("a", m(vec![vec![1.0]]))].into_iter().collect();

        let mut out = ArchiveWriter::new("test");
        out.put_key_map("words", &words);
        let bytes = out.finish().unwrap();

        let archive = ArchiveReader::open(&bytes, "test").unwrap();
        assert!(matches!(
            archive.two_key_map("words"),
            Err(ConvertError::Native(_))
        ));
    }
}
