use std::io::{Read, Write};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Opaque, Schema};
use crate::{
    Result,
    codec::{Matrix, PortableMatrix, matrix},
    keyed::{KeyMap, KeyedMap, TwoKeyMap},
    stream::{FieldSpec, UnitBody, UnitKind, UnitReader, UnitValue, UnitWriter},
};

const PARSER: FieldSpec = FieldSpec::new("parser", UnitKind::Opaque);
const BINARY_TRANSFORM: FieldSpec = FieldSpec::new("binary_transform", UnitKind::TwoKeyMatrices);
const UNARY_TRANSFORM: FieldSpec = FieldSpec::new("unary_transform", UnitKind::Matrices);
const BINARY_SCORE: FieldSpec = FieldSpec::new("binary_score", UnitKind::TwoKeyMatrices);
const UNARY_SCORE: FieldSpec = FieldSpec::new("unary_score", UnitKind::Matrices);
const WORD_VECTORS: FieldSpec = FieldSpec::new("word_vectors", UnitKind::Matrices);

/// A parser without its reranker: options and grammar, never interpreted here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parser {
    pub options: Opaque,
    pub grammar: Opaque,
}

impl Parser {
    pub fn new(options: Opaque, grammar: Opaque) -> Self {
        Self { options, grammar }
    }

    /// Attaches `reranker` to this parser.
    pub fn attach(self, reranker: Reranker) -> ParserModel {
        ParserModel {
            parser: self,
            reranker: Some(reranker),
        }
    }
}

impl UnitBody for Parser {
    fn encode<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.serialize(s)
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Self::deserialize(d)
    }
}

impl UnitValue for Parser {
    const KIND: UnitKind = UnitKind::Opaque;
}

/// The parameters of a reranking scorer over parse trees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DvModel {
    pub binary_transform: TwoKeyMap<Matrix>,
    pub unary_transform: KeyMap<Matrix>,
    pub binary_score: TwoKeyMap<Matrix>,
    pub unary_score: KeyMap<Matrix>,
    pub word_vectors: KeyMap<Matrix>,
    pub options: Opaque,
}

impl DvModel {
    pub fn new(
        binary_transform: TwoKeyMap<Matrix>,
        unary_transform: KeyMap<Matrix>,
        binary_score: TwoKeyMap<Matrix>,
        unary_score: KeyMap<Matrix>,
        word_vectors: KeyMap<Matrix>,
        options: Opaque,
    ) -> Self {
        Self {
            binary_transform,
            unary_transform,
            binary_score,
            unary_score,
            word_vectors,
            options,
        }
    }
}

/// A detachable reranker wrapping a `DvModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reranker(DvModel);

impl Reranker {
    pub fn new(model: DvModel) -> Self {
        Self(model)
    }

    pub fn model(&self) -> &DvModel {
        &self.0
    }
}

/// A parser together with its optional reranker.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserModel {
    pub parser: Parser,
    pub reranker: Option<Reranker>,
}

impl ParserModel {
    pub fn new(parser: Parser, reranker: Option<Reranker>) -> Self {
        Self { parser, reranker }
    }

    /// Splits the reranker off this model.
    ///
    /// # Returns
    /// The bare parser and the reranker, if one was attached.
    pub fn detach(self) -> (Parser, Option<Reranker>) {
        (self.parser, self.reranker)
    }
}

/// Field protocol of a parser with an attached reranker.
///
/// The parser itself is written first and passes through untouched, then the
/// reranker's parameter maps follow.
pub struct ParserSchema;

impl Schema for ParserSchema {
    const NAME: &'static str = "dvparser";
    const FIELDS: &'static [FieldSpec] = &[
        PARSER,
        BINARY_TRANSFORM,
        UNARY_TRANSFORM,
        BINARY_SCORE,
        UNARY_SCORE,
        WORD_VECTORS,
    ];

    type Source = (Parser, Reranker);
    type Model = ParserModel;

    fn write_fields<W: Write>(
        (parser, reranker): &(Parser, Reranker),
        out: &mut UnitWriter<W>,
    ) -> Result<()> {
        out.write(PARSER, parser)?;

        let dv = reranker.model();
        out.write(
            BINARY_TRANSFORM,
            &dv.binary_transform.transform(matrix::to_portable),
        )?;
        out.write(
            UNARY_TRANSFORM,
            &dv.unary_transform.transform(matrix::to_portable),
        )?;
        out.write(
            BINARY_SCORE,
            &dv.binary_score.transform(matrix::to_portable),
        )?;
        out.write(UNARY_SCORE, &dv.unary_score.transform(matrix::to_portable))?;
        out.write(
            WORD_VECTORS,
            &dv.word_vectors.transform(matrix::to_portable),
        )
    }

    fn read_fields<R: Read>(units: &mut UnitReader<R>) -> Result<ParserModel> {
        let parser = units.read::<Parser>(PARSER)?;

        let binary_transform = units
            .read::<TwoKeyMap<PortableMatrix>>(BINARY_TRANSFORM)?
            .try_transform(matrix::from_portable)?;
        log::debug!("restored {} binary transforms", binary_transform.len());

        let unary_transform = units
            .read::<KeyMap<PortableMatrix>>(UNARY_TRANSFORM)?
            .try_transform(matrix::from_portable)?;

        let binary_score = units
            .read::<TwoKeyMap<PortableMatrix>>(BINARY_SCORE)?
            .try_transform(matrix::from_portable)?;

        let unary_score = units
            .read::<KeyMap<PortableMatrix>>(UNARY_SCORE)?
            .try_transform(matrix::from_portable)?;

        let word_vectors = units
            .read::<KeyMap<PortableMatrix>>(WORD_VECTORS)?
            .try_transform(matrix::from_portable)?;
        log::debug!("restored {} word vectors", word_vectors.len());

        // The reranker shares its options with the parser it scores for.
        let dv = DvModel::new(
            binary_transform,
            unary_transform,
            binary_score,
            unary_score,
            word_vectors,
            parser.options.clone(),
        );

        Ok(parser.attach(Reranker::new(dv)))
    }
}
