use std::{fmt, path::PathBuf, str::FromStr};

use crate::{ConvertError, Result};

/// The direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Native to portable.
    Old,
    /// Portable to native.
    New,
}

impl FromStr for Stage {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "old" => Ok(Self::Old),
            "new" => Ok(Self::New),
            _ => Err(ConvertError::Config(format!(
                "unknown stage {s:?}, expected old or new"
            ))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => f.write_str("old"),
            Self::New => f.write_str("new"),
        }
    }
}

/// The schema of the model being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Sentiment,
    DvParser,
}

impl FromStr for ModelKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sentiment" => Ok(Self::Sentiment),
            "dvparser" => Ok(Self::DvParser),
            _ => Err(ConvertError::Config(format!(
                "unknown model {s:?}, expected sentiment or dvparser"
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentiment => f.write_str("sentiment"),
            Self::DvParser => f.write_str("dvparser"),
        }
    }
}

/// A fully validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertConfig {
    pub stage: Stage,
    pub model: ModelKind,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ConvertConfig {
    /// Validates a raw selection, before any file is touched.
    ///
    /// # Errors
    /// `ConvertError::Config` naming the first missing or invalid option.
    pub fn new(
        stage: Option<&str>,
        model: Option<&str>,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> Result<Self> {
        let stage = stage
            .ok_or_else(|| ConvertError::Config("please specify --stage, either old or new".into()))?
            .parse::<Stage>()?;

        let model = model
            .ok_or_else(|| {
                ConvertError::Config("please specify --model, either sentiment or dvparser".into())
            })?
            .parse::<ModelKind>()?;

        let input = input
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ConvertError::Config("please specify --input".into()))?;

        let output = output
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ConvertError::Config("please specify --output".into()))?;

        if input == output {
            return Err(ConvertError::Config(format!(
                "input and output are the same file: {}",
                input.display()
            )));
        }

        Ok(Self {
            stage,
            model,
            input,
            output,
        })
    }
}
