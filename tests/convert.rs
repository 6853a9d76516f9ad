use std::{fs, io::Cursor, path::Path};

use serde_json::json;

use convert_models::{
    ConvertConfig, ConvertError, NativeStore, Outcome, ProtocolError, SafetensorsStore, ShapeError,
    codec::{Matrix, PortableMatrix, Tensor, matrix},
    convert,
    keyed::KeyedMap,
    schema::{
        self, DvModel, Opaque, Parser, ParserModel, Reranker, SentimentModel, SentimentSchema,
    },
};

fn m(rows: &[&[f64]]) -> Matrix {
    let rows: PortableMatrix = rows.iter().map(|r| r.to_vec()).collect();
    matrix::from_portable(&rows).unwrap()
}

fn config(stage: &str, model: &str, input: &Path, output: &Path) -> ConvertConfig {
    ConvertConfig::new(
        Some(stage),
        Some(model),
        Some(input.to_path_buf()),
        Some(output.to_path_buf()),
    )
    .unwrap()
}

fn sentiment() -> SentimentModel {
    let mut model = SentimentModel {
        options: Opaque::new(json!({ "numHid": 2, "simplifiedModel": false })),
        ..Default::default()
    };
    model
        .binary_transform
        .insert("NP", "VP", m(&[&[0.1, -0.2, 0.3], &[1e-300, 2.5, -7.0]]));
    model.binary_tensors.insert(
        "NP",
        "VP",
        Tensor::new(vec![m(&[&[1.0, 2.0], &[3.0, 4.0]]), m(&[&[5.0, 6.0], &[7.0, 8.0]])]).unwrap(),
    );
    model
        .binary_classification
        .insert("NP", "VP", m(&[&[0.5, 0.25]]));
    model.unary_classification.insert("S", m(&[&[0.125]]));
    model.word_vectors.insert("the", m(&[&[0.1], &[0.2]]));
    model.word_vectors.insert("cat", m(&[&[-0.3], &[0.4]]));
    model
}

/// Splits a portable stream into `(kind, body)` frames.
fn frames(bytes: &[u8]) -> Vec<(u32, Vec<u8>)> {
    let mut out = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let len = u64::from_be_bytes(rest[..8].try_into().unwrap()) as usize;
        let kind = u32::from_be_bytes(rest[8..12].try_into().unwrap());
        out.push((kind, rest[12..8 + len].to_vec()));
        rest = &rest[8 + len..];
    }
    out
}

fn join(frames: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (kind, body) in frames {
        out.extend_from_slice(&((body.len() + 4) as u64).to_be_bytes());
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(body);
    }
    out
}

#[test]
fn sentiment_old_then_new_reproduces_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let native = dir.path().join("sentiment.safetensors");
    let portable = dir.path().join("sentiment.units");
    let restored = dir.path().join("restored.safetensors");

    let model = sentiment();
    SafetensorsStore.save(&model, &native).unwrap();

    let outcome = convert(
        &config("old", "sentiment", &native, &portable),
        &SafetensorsStore,
    )
    .unwrap();
    assert_eq!(outcome, Outcome::Converted { fields: 6 });

    let outcome = convert(
        &config("new", "sentiment", &portable, &restored),
        &SafetensorsStore,
    )
    .unwrap();
    assert_eq!(outcome, Outcome::Converted { fields: 6 });

    let back: SentimentModel = SafetensorsStore.load(&restored).unwrap();
    assert_eq!(back, model);
}

#[test]
fn parser_with_reranker_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let native = dir.path().join("parser.safetensors");
    let portable = dir.path().join("parser.units");
    let restored = dir.path().join("restored.safetensors");

    let parser = Parser::new(
        Opaque::new(json!({ "trainOptions": { "dvKBest": 200 } })),
        Opaque::new(json!({ "states": ["ROOT", "NP", "VP"] })),
    );
    let mut dv = DvModel {
        options: parser.options.clone(),
        ..Default::default()
    };
    dv.binary_transform.insert("NP", "VP", m(&[&[1.0, 2.0, 3.0]]));
    dv.unary_transform.insert("NP", m(&[&[4.0], &[5.0]]));
    dv.binary_score.insert("NP", "VP", m(&[&[0.5, 0.5]]));
    dv.unary_score.insert("NP", m(&[&[0.75]]));
    dv.word_vectors.insert("*UNK*", m(&[&[0.0, -1.0]]));
    let model = parser.attach(Reranker::new(dv));

    SafetensorsStore.save(&model, &native).unwrap();
    convert(
        &config("old", "dvparser", &native, &portable),
        &SafetensorsStore,
    )
    .unwrap();
    convert(
        &config("new", "dvparser", &portable, &restored),
        &SafetensorsStore,
    )
    .unwrap();

    let back: ParserModel = SafetensorsStore.load(&restored).unwrap();
    assert_eq!(back, model);
}

#[test]
fn parser_without_reranker_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let native = dir.path().join("parser.safetensors");
    let portable = dir.path().join("parser.units");

    let model = ParserModel::new(Parser::default(), None);
    SafetensorsStore.save(&model, &native).unwrap();

    let outcome = convert(
        &config("old", "dvparser", &native, &portable),
        &SafetensorsStore,
    )
    .unwrap();

    assert_eq!(outcome, Outcome::NothingToDo);
    assert!(!portable.exists());
}

#[test]
fn insertion_order_does_not_change_the_output() {
    let mut first = SentimentModel::default();
    first.word_vectors.insert("b", m(&[&[2.0]]));
    first.word_vectors.insert("a", m(&[&[1.0]]));
    first.binary_transform.insert("Y", "x", m(&[&[3.0]]));
    first.binary_transform.insert("X", "y", m(&[&[4.0]]));

    let mut second = SentimentModel::default();
    second.binary_transform.insert("X", "y", m(&[&[4.0]]));
    second.binary_transform.insert("Y", "x", m(&[&[3.0]]));
    second.word_vectors.insert("a", m(&[&[1.0]]));
    second.word_vectors.insert("b", m(&[&[2.0]]));

    let first = schema::write::<SentimentSchema, _>(&first, Vec::new()).unwrap();
    let second = schema::write::<SentimentSchema, _>(&second, Vec::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn empty_fields_keep_their_place() {
    let options = Opaque::new(json!({ "wordVectorFile": null, "lowercaseWordVectors": true }));
    let mut model = SentimentModel {
        options: options.clone(),
        ..Default::default()
    };
    model.unary_classification.insert("a", m(&[&[1.0, 2.0]]));

    let bytes = schema::write::<SentimentSchema, _>(&model, Vec::new()).unwrap();
    let units = frames(&bytes);
    assert_eq!(units.len(), 7);
    assert_eq!(units[1].1, b"{}");
    assert_eq!(units[4].1, br#"{"a":[[1.0,2.0]]}"#);

    let back = schema::read::<SentimentSchema, _>(Cursor::new(bytes)).unwrap();
    assert!(back.binary_transform.is_empty());
    assert!(back.binary_tensors.is_empty());
    assert!(back.word_vectors.is_empty());
    assert_eq!(back.unary_classification, model.unary_classification);
    assert_eq!(back.options, options);
}

#[test]
fn tampered_streams_are_rejected() {
    let bytes = schema::write::<SentimentSchema, _>(&sentiment(), Vec::new()).unwrap();
    let units = frames(&bytes);

    let truncated = join(&units[..units.len() - 1]);
    let err = schema::read::<SentimentSchema, _>(Cursor::new(truncated)).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Protocol(ProtocolError::MissingUnit { field: "options" })
    ));

    let mut extra = units.clone();
    extra.push(units[1].clone());
    let err = schema::read::<SentimentSchema, _>(Cursor::new(join(&extra))).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Protocol(ProtocolError::TrailingData)
    ));

    let mut swapped = units.clone();
    swapped.swap(1, 2);
    let err = schema::read::<SentimentSchema, _>(Cursor::new(join(&swapped))).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Protocol(ProtocolError::UnexpectedKind {
            field: "binary_transform",
            ..
        })
    ));
}

#[test]
fn ragged_matrix_aborts_the_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let portable = dir.path().join("ragged.units");
    let output = dir.path().join("out.safetensors");

    let bytes = schema::write::<SentimentSchema, _>(&sentiment(), Vec::new()).unwrap();
    let mut units = frames(&bytes);
    units[5].1 = br#"{"w":[[1.0,2.0],[3.0]]}"#.to_vec();
    fs::write(&portable, join(&units)).unwrap();

    let err = convert(
        &config("new", "sentiment", &portable, &output),
        &SafetensorsStore,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Shape(ShapeError::UnevenColumns {
            row: 1,
            got: 1,
            expected: 2
        })
    ));
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn wrong_schema_is_caught_at_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let portable = dir.path().join("sentiment.units");
    let output = dir.path().join("out.safetensors");

    let bytes = schema::write::<SentimentSchema, _>(&sentiment(), Vec::new()).unwrap();
    fs::write(&portable, bytes).unwrap();

    let err = convert(
        &config("new", "dvparser", &portable, &output),
        &SafetensorsStore,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Protocol(ProtocolError::SchemaMismatch {
            expected: "dvparser",
            ..
        })
    ));
    assert!(!output.exists());
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("absent.safetensors");
    let output = dir.path().join("out.units");

    let err = convert(
        &config("old", "sentiment", &input, &output),
        &SafetensorsStore,
    )
    .unwrap_err();

    assert!(matches!(err, ConvertError::Io(_)));
    assert!(!output.exists());
}

#[test]
fn non_finite_values_survive_both_stages() {
    let dir = tempfile::tempdir().unwrap();
    let native = dir.path().join("sentiment.safetensors");
    let portable = dir.path().join("sentiment.units");
    let restored = dir.path().join("restored.safetensors");

    let mut model = sentiment();
    model
        .word_vectors
        .insert("w", m(&[&[1.0, f64::INFINITY], &[f64::NAN, f64::NEG_INFINITY]]));
    SafetensorsStore.save(&model, &native).unwrap();

    convert(
        &config("old", "sentiment", &native, &portable),
        &SafetensorsStore,
    )
    .unwrap();
    convert(
        &config("new", "sentiment", &portable, &restored),
        &SafetensorsStore,
    )
    .unwrap();

    let back: SentimentModel = SafetensorsStore.load(&restored).unwrap();
    let w = matrix::to_portable(back.word_vectors.get("w").unwrap());
    assert_eq!(w[0], [1.0, f64::INFINITY]);
    assert!(w[1][0].is_nan());
    assert_eq!(w[1][1], f64::NEG_INFINITY);
    assert_eq!(back.binary_transform, model.binary_transform);
}
