//! Conditionally-active behavioral guidelines and their matcher.

use crate::condition::{evaluate, Combinator, Condition};
use crate::context::EvaluationContext;

#[derive(Debug, Clone)]
pub struct Guideline {
    pub id: String,
    pub condition: Option<Condition>,
    pub action: String,
    pub enabled: bool,
}

impl Guideline {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            condition: None,
            action: action.into(),
            enabled: true,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GuidelineMatch {
    pub guideline: Guideline,
    pub rationale: String,
}

/// Return the guidelines whose conditions currently hold, in input order.
///
/// Disabled guidelines are dropped before evaluation. Conditions use `All`
/// semantics, so a guideline without one (or with only clauses) always
/// matches. Winners are all returned; merging and deduplication belong to
/// the prompt-construction stage.
pub async fn match_guidelines(
    guidelines: &[Guideline],
    ctx: &EvaluationContext,
) -> Vec<GuidelineMatch> {
    let mut matches = Vec::new();

    for guideline in guidelines.iter().filter(|g| g.enabled) {
        let Some(condition) = &guideline.condition else {
            matches.push(GuidelineMatch {
                guideline: guideline.clone(),
                rationale: "Always active (no conditions)".to_string(),
            });
            continue;
        };

        let evaluation = evaluate(Some(condition), ctx, Combinator::All).await;
        if !evaluation.result {
            continue;
        }
        let rationale = if evaluation.rationale.is_empty() {
            "Programmatic condition evaluated to true".to_string()
        } else {
            format!("Condition met: {}", evaluation.rationale.join("; "))
        };
        matches.push(GuidelineMatch {
            guideline: guideline.clone(),
            rationale,
        });
    }

    matches
}
