//! Loading and saving models in their native form.

mod archive;

use std::{fs, path::Path};

pub use archive::{ArchiveReader, ArchiveWriter};

use crate::{
    Result,
    schema::{
        DvModel, Parser, ParserModel, ParserSchema, Reranker, Schema, SentimentModel,
        SentimentSchema,
    },
};

const RERANKER_FIELDS: [&str; 5] = [
    "binary_transform",
    "unary_transform",
    "binary_score",
    "unary_score",
    "word_vectors",
];

/// A place where native models of type `M` are kept.
pub trait NativeStore<M> {
    /// Loads the model stored at `path`.
    fn load(&self, path: &Path) -> Result<M>;

    /// Stores `model` at `path`.
    fn save(&self, model: &M, path: &Path) -> Result<()>;
}

/// Keeps native models as `safetensors` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsStore;

impl SafetensorsStore {
    pub fn encode_sentiment(model: &SentimentModel) -> Result<Vec<u8>> {
        let mut out = ArchiveWriter::new(SentimentSchema::NAME);
        out.put_two_key_map("binary_transform", &model.binary_transform);
        out.put_two_key_tensors("binary_tensors", &model.binary_tensors);
        out.put_two_key_map("binary_classification", &model.binary_classification);
        out.put_key_map("unary_classification", &model.unary_classification);
        out.put_key_map("word_vectors", &model.word_vectors);
        out.put_opaque("options", &model.options);
        out.finish()
    }

    pub fn decode_sentiment(bytes: &[u8]) -> Result<SentimentModel> {
        let archive = ArchiveReader::open(bytes, SentimentSchema::NAME)?;

        Ok(SentimentModel::new(
            archive.two_key_map("binary_transform")?,
            archive.two_key_tensors("binary_tensors")?,
            archive.two_key_map("binary_classification")?,
            archive.key_map("unary_classification")?,
            archive.key_map("word_vectors")?,
            archive.opaque("options")?,
        ))
    }

    pub fn encode_parser(model: &ParserModel) -> Result<Vec<u8>> {
        let mut out = ArchiveWriter::new(ParserSchema::NAME);
        out.put_opaque("options", &model.parser.options);
        out.put_opaque("grammar", &model.parser.grammar);

        if let Some(reranker) = &model.reranker {
            let dv = reranker.model();
            out.put_two_key_map("binary_transform", &dv.binary_transform);
            out.put_key_map("unary_transform", &dv.unary_transform);
            out.put_two_key_map("binary_score", &dv.binary_score);
            out.put_key_map("unary_score", &dv.unary_score);
            out.put_key_map("word_vectors", &dv.word_vectors);
            out.put_opaque("reranker_options", &dv.options);
        }

        out.finish()
    }

    pub fn decode_parser(bytes: &[u8]) -> Result<ParserModel> {
        let archive = ArchiveReader::open(bytes, ParserSchema::NAME)?;
        let parser = Parser::new(archive.opaque("options")?, archive.opaque("grammar")?);

        if !RERANKER_FIELDS.iter().any(|f| archive.has_field(f)) {
            return Ok(ParserModel::new(parser, None));
        }

        let dv = DvModel::new(
            archive.two_key_map("binary_transform")?,
            archive.key_map("unary_transform")?,
            archive.two_key_map("binary_score")?,
            archive.key_map("unary_score")?,
            archive.key_map("word_vectors")?,
            archive.opaque("reranker_options")?,
        );

        Ok(parser.attach(Reranker::new(dv)))
    }
}

impl NativeStore<SentimentModel> for SafetensorsStore {
    fn load(&self, path: &Path) -> Result<SentimentModel> {
        let bytes = fs::read(path)?;
        log::info!("loaded {} bytes from {}", bytes.len(), path.display());
        Self::decode_sentiment(&bytes)
    }

    fn save(&self, model: &SentimentModel, path: &Path) -> Result<()> {
        let bytes = Self::encode_sentiment(model)?;
        fs::write(path, &bytes)?;
        log::info!("saved {} bytes into {}", bytes.len(), path.display());
        Ok(())
    }
}

impl NativeStore<ParserModel> for SafetensorsStore {
    fn load(&self, path: &Path) -> Result<ParserModel> {
        let bytes = fs::read(path)?;
        log::info!("loaded {} bytes from {}", bytes.len(), path.display());
        Self::decode_parser(&bytes)
    }

    fn save(&self, model: &ParserModel, path: &Path) -> Result<()> {
        let bytes = Self::encode_parser(model)?;
        fs::write(path, &bytes)?;
        log::info!("saved {} bytes into {}", bytes.len(), path.display());
        Ok(())
    }
}
