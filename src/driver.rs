//! Top-level orchestration of a single conversion.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use crate::{
    ConvertError, Result,
    config::{ConvertConfig, ModelKind, Stage},
    native::NativeStore,
    schema::{self, ParserModel, ParserSchema, Schema, SentimentModel, SentimentSchema},
};

/// What a finished conversion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The output file was written with this many fields.
    Converted { fields: usize },
    /// The parser had no reranker to convert, no output was written.
    NothingToDo,
}

/// Runs the conversion described by `config` against `store`.
///
/// The output is written next to its final location and moved into place only
/// once complete, so a failed conversion never leaves a partial output behind.
///
/// # Errors
/// Any `ConvertError`; the conversion did not happen.
pub fn convert<S>(config: &ConvertConfig, store: &S) -> Result<Outcome>
where
    S: NativeStore<SentimentModel> + NativeStore<ParserModel>,
{
    let ConvertConfig {
        stage,
        model,
        input,
        output,
    } = config;
    log::info!(
        "converting {model} model at stage {stage}: {} -> {}",
        input.display(),
        output.display()
    );

    match (model, stage) {
        (ModelKind::Sentiment, Stage::Old) => {
            let model = NativeStore::<SentimentModel>::load(store, input)?;
            write_portable::<SentimentSchema>(&model, output)
        }
        (ModelKind::Sentiment, Stage::New) => {
            let model = read_portable::<SentimentSchema>(input)?;
            persist(output, |path| {
                NativeStore::<SentimentModel>::save(store, &model, path)
            })?;
            Ok(Outcome::Converted {
                fields: SentimentSchema::FIELDS.len(),
            })
        }
        (ModelKind::DvParser, Stage::Old) => {
            let model = NativeStore::<ParserModel>::load(store, input)?;
            let (parser, Some(reranker)) = model.detach() else {
                log::info!("nothing to do for {}", input.display());
                return Ok(Outcome::NothingToDo);
            };
            write_portable::<ParserSchema>(&(parser, reranker), output)
        }
        (ModelKind::DvParser, Stage::New) => {
            let model = read_portable::<ParserSchema>(input)?;
            persist(output, |path| NativeStore::<ParserModel>::save(store, &model, path))?;
            Ok(Outcome::Converted {
                fields: ParserSchema::FIELDS.len(),
            })
        }
    }
}

fn write_portable<S: Schema>(source: &S::Source, output: &Path) -> Result<Outcome> {
    persist(output, |path| {
        let sink = BufWriter::new(File::create(path)?);
        let sink = schema::write::<S, _>(source, sink)?;
        let file = sink.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })?;

    Ok(Outcome::Converted {
        fields: S::FIELDS.len(),
    })
}

fn read_portable<S: Schema>(input: &Path) -> Result<S::Model> {
    let src = BufReader::new(File::open(input)?);
    schema::read::<S, _>(src)
}

/// Writes through `write` into a sibling of `output`, then moves it into place.
fn persist<F>(output: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let partial = partial_path(output)?;

    let res = write(&partial).and_then(|()| fs::rename(&partial, output).map_err(Into::into));
    if let Err(e) = res {
        if let Err(rm) = fs::remove_file(&partial) {
            log::debug!("could not remove {}: {rm}", partial.display());
        }
        return Err(e);
    }

    log::info!("wrote {}", output.display());
    Ok(())
}

fn partial_path(output: &Path) -> Result<PathBuf> {
    let name = output.file_name().ok_or_else(|| {
        ConvertError::Config(format!("output {} is not a file path", output.display()))
    })?;

    let mut partial = std::ffi::OsString::from(".");
    partial.push(name);
    partial.push(".partial");
    Ok(output.with_file_name(partial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_is_a_hidden_sibling() {
        let partial = partial_path(Path::new("models/out.bin")).unwrap();
        assert_eq!(partial, PathBuf::from("models/.out.bin.partial"));

        assert!(matches!(
            partial_path(Path::new("..")),
            Err(ConvertError::Config(_))
        ));
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");

        let res = persist(&output, |path| {
            fs::write(path, b"half")?;
            Err(ConvertError::Native("boom".into()))
        });

        assert!(matches!(res, Err(ConvertError::Native(_))));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
