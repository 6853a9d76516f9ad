use std::io::{Read, Write};

use super::{Opaque, Schema};
use crate::{
    Result,
    codec::{Matrix, PortableMatrix, PortableTensor, Tensor, matrix, tensor},
    keyed::{KeyMap, KeyedMap, TwoKeyMap},
    stream::{FieldSpec, UnitKind, UnitReader, UnitWriter},
};

const BINARY_TRANSFORM: FieldSpec = FieldSpec::new("binary_transform", UnitKind::TwoKeyMatrices);
const BINARY_TENSORS: FieldSpec = FieldSpec::new("binary_tensors", UnitKind::TwoKeyTensors);
const BINARY_CLASSIFICATION: FieldSpec =
    FieldSpec::new("binary_classification", UnitKind::TwoKeyMatrices);
const UNARY_CLASSIFICATION: FieldSpec =
    FieldSpec::new("unary_classification", UnitKind::Matrices);
const WORD_VECTORS: FieldSpec = FieldSpec::new("word_vectors", UnitKind::Matrices);
const OPTIONS: FieldSpec = FieldSpec::new("options", UnitKind::Opaque);

/// A recursive sentiment model: composition matrices and tensors indexed by
/// pairs of categories, classifiers and word embeddings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SentimentModel {
    pub binary_transform: TwoKeyMap<Matrix>,
    pub binary_tensors: TwoKeyMap<Tensor>,
    pub binary_classification: TwoKeyMap<Matrix>,
    pub unary_classification: KeyMap<Matrix>,
    pub word_vectors: KeyMap<Matrix>,
    pub options: Opaque,
}

impl SentimentModel {
    pub fn new(
        binary_transform: TwoKeyMap<Matrix>,
        binary_tensors: TwoKeyMap<Tensor>,
        binary_classification: TwoKeyMap<Matrix>,
        unary_classification: KeyMap<Matrix>,
        word_vectors: KeyMap<Matrix>,
        options: Opaque,
    ) -> Self {
        Self {
            binary_transform,
            binary_tensors,
            binary_classification,
            unary_classification,
            word_vectors,
            options,
        }
    }
}

/// Field protocol of `SentimentModel`.
pub struct SentimentSchema;

impl Schema for SentimentSchema {
    const NAME: &'static str = "sentiment";
    const FIELDS: &'static [FieldSpec] = &[
        BINARY_TRANSFORM,
        BINARY_TENSORS,
        BINARY_CLASSIFICATION,
        UNARY_CLASSIFICATION,
        WORD_VECTORS,
        OPTIONS,
    ];

    type Source = SentimentModel;
    type Model = SentimentModel;

    fn write_fields<W: Write>(model: &SentimentModel, out: &mut UnitWriter<W>) -> Result<()> {
        out.write(
            BINARY_TRANSFORM,
            &model.binary_transform.transform(matrix::to_portable),
        )?;
        out.write(
            BINARY_TENSORS,
            &model.binary_tensors.transform(tensor::to_portable),
        )?;
        out.write(
            BINARY_CLASSIFICATION,
            &model.binary_classification.transform(matrix::to_portable),
        )?;
        out.write(
            UNARY_CLASSIFICATION,
            &model.unary_classification.transform(matrix::to_portable),
        )?;
        out.write(
            WORD_VECTORS,
            &model.word_vectors.transform(matrix::to_portable),
        )?;
        out.write(OPTIONS, &model.options)
    }

    fn read_fields<R: Read>(units: &mut UnitReader<R>) -> Result<SentimentModel> {
        let binary_transform = units
            .read::<TwoKeyMap<PortableMatrix>>(BINARY_TRANSFORM)?
            .try_transform(matrix::from_portable)?;
        log::debug!("restored {} binary transforms", binary_transform.len());

        let binary_tensors = units
            .read::<TwoKeyMap<PortableTensor>>(BINARY_TENSORS)?
            .try_transform(tensor::from_portable)?;
        log::debug!("restored {} binary tensors", binary_tensors.len());

        let binary_classification = units
            .read::<TwoKeyMap<PortableMatrix>>(BINARY_CLASSIFICATION)?
            .try_transform(matrix::from_portable)?;

        let unary_classification = units
            .read::<KeyMap<PortableMatrix>>(UNARY_CLASSIFICATION)?
            .try_transform(matrix::from_portable)?;

        let word_vectors = units
            .read::<KeyMap<PortableMatrix>>(WORD_VECTORS)?
            .try_transform(matrix::from_portable)?;
        log::debug!("restored {} word vectors", word_vectors.len());

        let options = units.read::<Opaque>(OPTIONS)?;

        Ok(SentimentModel::new(
            binary_transform,
            binary_tensors,
            binary_classification,
            unary_classification,
            word_vectors,
            options,
        ))
    }
}
