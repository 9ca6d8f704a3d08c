//! Chain construction and execution.

use super::stage::{Payload, Stage, StageContext, StageFailure};
use crate::config::Environment;
use crate::rules::{Concern, MatchRule};
use std::path::PathBuf;
use thiserror::Error;

/// A stage failed; the whole chain is abandoned.
#[derive(Error, Debug)]
#[error("stage '{stage}' failed on {}: {cause}", path.display())]
pub struct TransformError {
    pub stage: &'static str,
    pub path: PathBuf,
    #[source]
    pub cause: StageFailure,
}

/// The stages a rule resolves to in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub rule: String,
    pub concern: Concern,
    pub stages: Vec<Stage>,
}

impl Chain {
    /// Resolve every environment-conditional position of `rule`.
    pub fn build(rule: &MatchRule, environment: Environment) -> Self {
        Self {
            rule: rule.name.clone(),
            concern: rule.concern,
            stages: rule
                .chain
                .iter()
                .filter_map(|spec| spec.select(environment))
                .cloned()
                .collect(),
        }
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::id).collect()
    }

    /// Run the stages left to right over `bytes`.
    pub fn run(&self, bytes: Vec<u8>, ctx: &StageContext<'_>) -> Result<Payload, TransformError> {
        self.stages
            .iter()
            .try_fold(Payload::Source(bytes), |payload, stage| {
                stage.apply(payload, ctx).map_err(|cause| TransformError {
                    stage: stage.id(),
                    path: ctx.asset.path.to_path_buf(),
                    cause,
                })
            })
    }
}
