//! Pass identifier resolvers: decide whether a bound program belongs to the
//! target pass.
//!
//! Render targets are recycled across unrelated passes within a frame, so the
//! target pass is recognised by its shader instead. How a shader is matched
//! is host-version specific and therefore pluggable.

use serde::{Deserialize, Serialize};

use crate::error::IdentifyError;
use crate::stream::{ShaderStage, StageKind};

/// Tag the default resolver looks for in the composite fragment shader.
pub const DEFAULT_PASS_TAG: &str = "FINAL_COMPOSITE";

/// Which attached shader object carries the identifying tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSelector {
    /// The first fragment stage, wherever it is attached.
    #[default]
    Fragment,
    /// A fixed attachment index (the host links vertex first, fragment second).
    Attachment(usize),
}

impl StageSelector {
    /// Pick the stage this selector names.
    pub fn select<'a>(&self, stages: &'a [ShaderStage]) -> Result<&'a ShaderStage, IdentifyError> {
        match *self {
            Self::Fragment => stages
                .iter()
                .find(|stage| stage.kind == StageKind::Fragment)
                .ok_or(IdentifyError::NoFragmentStage),
            Self::Attachment(index) => stages.get(index).ok_or(IdentifyError::StageMissing {
                index,
                attached: stages.len(),
            }),
        }
    }
}

/// Resolves a program's attached stages to "is the target pass".
pub trait PassIdentifier: Send + Sync {
    fn is_target_pass(&self, stages: &[ShaderStage]) -> Result<bool, IdentifyError>;
}

/// Case-sensitive substring match of a tag in one selected stage's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstringIdentifier {
    pub tag: String,
    #[serde(default)]
    pub stage: StageSelector,
}

impl SubstringIdentifier {
    pub fn new(tag: impl Into<String>, stage: StageSelector) -> Self {
        Self {
            tag: tag.into(),
            stage,
        }
    }
}

impl Default for SubstringIdentifier {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_TAG, StageSelector::Fragment)
    }
}

impl PassIdentifier for SubstringIdentifier {
    fn is_target_pass(&self, stages: &[ShaderStage]) -> Result<bool, IdentifyError> {
        let stage = self.stage.select(stages)?;
        Ok(stage.source.contains(self.tag.as_str()))
    }
}

/// Resolver backed by a closure, for fingerprinting schemes the host knows
/// better than we do.
pub struct FnIdentifier<F>(pub F);

impl<F> PassIdentifier for FnIdentifier<F>
where
    F: Fn(&[ShaderStage]) -> Result<bool, IdentifyError> + Send + Sync,
{
    fn is_target_pass(&self, stages: &[ShaderStage]) -> Result<bool, IdentifyError> {
        (self.0)(stages)
    }
}
