//! Condition expressions and their evaluator.
//!
//! A condition is a natural-language clause, a programmatic predicate, or a
//! nested group of either. Clauses only ever contribute rationale text for
//! the response stage; the boolean outcome is decided by predicates alone,
//! combined under the call site's combinator. `when`-style call sites use
//! `All` (an all-clause expression is vacuously true), `skip_if`-style call
//! sites use `Any` (an all-clause expression is false: nothing programmatic
//! asked to skip).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use convoroute_core::Result;

use crate::context::EvaluationContext;

/// Programmatic condition. Errors are swallowed by the evaluator and count
/// as `false` (fail-closed).
#[async_trait]
pub trait Predicate: Send + Sync {
    async fn check(&self, ctx: &EvaluationContext) -> Result<bool>;
}

struct FnPredicate<F>(F);

#[async_trait]
impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&EvaluationContext) -> bool + Send + Sync,
{
    async fn check(&self, ctx: &EvaluationContext) -> Result<bool> {
        Ok((self.0)(ctx))
    }
}

struct TryFnPredicate<F>(F);

#[async_trait]
impl<F> Predicate for TryFnPredicate<F>
where
    F: Fn(&EvaluationContext) -> Result<bool> + Send + Sync,
{
    async fn check(&self, ctx: &EvaluationContext) -> Result<bool> {
        (self.0)(ctx)
    }
}

#[derive(Clone)]
pub enum Condition {
    /// Natural-language clause surfaced to the model; always vacuous for
    /// boolean purposes.
    Clause(String),
    Predicate(Arc<dyn Predicate>),
    Group(Vec<Condition>),
}

impl Condition {
    pub fn clause(text: impl Into<String>) -> Self {
        Condition::Clause(text.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&EvaluationContext) -> bool + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(FnPredicate(f)))
    }

    pub fn try_predicate<F>(f: F) -> Self
    where
        F: Fn(&EvaluationContext) -> Result<bool> + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(TryFnPredicate(f)))
    }

    pub fn group(items: Vec<Condition>) -> Self {
        Condition::Group(items)
    }

    /// True when the expression is or contains a predicate.
    pub fn is_programmatic(&self) -> bool {
        match self {
            Condition::Clause(_) => false,
            Condition::Predicate(_) => true,
            Condition::Group(items) => items.iter().any(Condition::is_programmatic),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Clause(text) => f.debug_tuple("Clause").field(text).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
            Condition::Group(items) => f.debug_tuple("Group").field(items).finish(),
        }
    }
}

impl From<&str> for Condition {
    fn from(text: &str) -> Self {
        Condition::Clause(text.to_string())
    }
}

impl From<String> for Condition {
    fn from(text: String) -> Self {
        Condition::Clause(text)
    }
}

impl From<Vec<Condition>> for Condition {
    fn from(items: Vec<Condition>) -> Self {
        Condition::Group(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    All,
    Any,
}

impl Combinator {
    fn combine(self, results: &[bool]) -> bool {
        match self {
            Combinator::All => results.iter().all(|r| *r),
            Combinator::Any => results.iter().any(|r| *r),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: bool,
    pub rationale: Vec<String>,
    pub has_programmatic: bool,
}

/// Evaluate an optional condition expression under the given combinator.
///
/// An absent expression yields the combinator's vacuous value: `true` under
/// `All`, `false` under `Any`.
pub async fn evaluate(
    condition: Option<&Condition>,
    ctx: &EvaluationContext,
    combinator: Combinator,
) -> Evaluation {
    let Some(condition) = condition else {
        return Evaluation {
            result: combinator.combine(&[]),
            rationale: Vec::new(),
            has_programmatic: false,
        };
    };

    let mut rationale = Vec::new();
    let mut results = Vec::new();
    walk(condition, ctx, combinator, &mut rationale, &mut results).await;

    Evaluation {
        result: combinator.combine(&results),
        has_programmatic: !results.is_empty(),
        rationale,
    }
}

/// Recursive pass: clauses flatten into the shared rationale list in
/// declaration order; each predicate pushes one boolean; a nested group with
/// at least one predicate pushes its own combined boolean as a single entry.
fn walk<'a>(
    condition: &'a Condition,
    ctx: &'a EvaluationContext,
    combinator: Combinator,
    rationale: &'a mut Vec<String>,
    results: &'a mut Vec<bool>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        match condition {
            Condition::Clause(text) => rationale.push(text.clone()),
            Condition::Predicate(predicate) => {
                let outcome = match predicate.check(ctx).await {
                    Ok(value) => value,
                    Err(error) => {
                        tracing::warn!(%error, "condition predicate failed, treating as false");
                        false
                    }
                };
                results.push(outcome);
            }
            Condition::Group(items) => {
                let mut sub_results = Vec::new();
                for item in items {
                    walk(item, ctx, combinator, rationale, &mut sub_results).await;
                }
                if !sub_results.is_empty() {
                    results.push(combinator.combine(&sub_results));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoroute_core::FlowError;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx_with_data(data: HashMap<String, serde_json::Value>) -> EvaluationContext {
        EvaluationContext::new().with_data(data)
    }

    #[tokio::test]
    async fn test_absent_condition_defaults() {
        let ctx = EvaluationContext::new();

        let when = evaluate(None, &ctx, Combinator::All).await;
        assert!(when.result);
        assert!(!when.has_programmatic);
        assert!(when.rationale.is_empty());

        let skip = evaluate(None, &ctx, Combinator::Any).await;
        assert!(!skip.result);
    }

    #[tokio::test]
    async fn test_bare_clause_per_combinator() {
        let ctx = EvaluationContext::new();
        let condition = Condition::clause("user seems confused");

        let all = evaluate(Some(&condition), &ctx, Combinator::All).await;
        assert!(all.result);
        assert_eq!(all.rationale, vec!["user seems confused"]);
        assert!(!all.has_programmatic);

        let any = evaluate(Some(&condition), &ctx, Combinator::Any).await;
        assert!(!any.result);
        assert_eq!(any.rationale, vec!["user seems confused"]);
    }

    #[tokio::test]
    async fn test_all_string_nesting_depth() {
        let ctx = EvaluationContext::new();
        let condition = Condition::group(vec![
            Condition::clause("a"),
            Condition::group(vec![
                Condition::clause("b"),
                Condition::group(vec![Condition::clause("c")]),
            ]),
        ]);

        let all = evaluate(Some(&condition), &ctx, Combinator::All).await;
        assert!(all.result);
        assert_eq!(all.rationale, vec!["a", "b", "c"]);
        assert!(!all.has_programmatic);

        let any = evaluate(Some(&condition), &ctx, Combinator::Any).await;
        assert!(!any.result);
        assert_eq!(any.rationale, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mixed_boolean_depends_on_predicates_only() {
        let ctx = ctx_with_data(HashMap::from([("tier".into(), json!("gold"))]));

        let matching = Condition::group(vec![
            Condition::clause("needs help"),
            Condition::predicate(|ctx| ctx.data.get("tier") == Some(&json!("gold"))),
        ]);
        let evaluation = evaluate(Some(&matching), &ctx, Combinator::All).await;
        assert!(evaluation.result);
        assert!(evaluation.has_programmatic);
        assert_eq!(evaluation.rationale, vec!["needs help"]);

        let failing = Condition::group(vec![
            Condition::clause("needs help"),
            Condition::predicate(|ctx| ctx.data.get("tier") == Some(&json!("silver"))),
        ]);
        let evaluation = evaluate(Some(&failing), &ctx, Combinator::All).await;
        assert!(!evaluation.result);
        // Rationale keeps the clause regardless of the predicate outcome.
        assert_eq!(evaluation.rationale, vec!["needs help"]);
    }

    #[tokio::test]
    async fn test_any_combinator_disjunction() {
        let ctx = EvaluationContext::new();
        let condition = Condition::group(vec![
            Condition::clause("maybe skip"),
            Condition::predicate(|_| false),
            Condition::predicate(|_| true),
        ]);

        let evaluation = evaluate(Some(&condition), &ctx, Combinator::Any).await;
        assert!(evaluation.result);
        assert!(evaluation.has_programmatic);
    }

    #[tokio::test]
    async fn test_failing_predicate_is_false_not_fatal() {
        let ctx = EvaluationContext::new();
        let condition = Condition::try_predicate(|_| {
            Err(FlowError::InvalidDefinition("lookup blew up".into()))
        });

        let evaluation = evaluate(Some(&condition), &ctx, Combinator::All).await;
        assert!(!evaluation.result);
        assert!(evaluation.has_programmatic);
    }

    #[tokio::test]
    async fn test_nested_group_keeps_own_combination() {
        let ctx = EvaluationContext::new();
        // Inner group is all-false; it contributes a single false to the
        // parent disjunction, the outer true predicate still wins.
        let condition = Condition::group(vec![
            Condition::group(vec![
                Condition::predicate(|_| false),
                Condition::predicate(|_| false),
            ]),
            Condition::predicate(|_| true),
        ]);

        let evaluation = evaluate(Some(&condition), &ctx, Combinator::Any).await;
        assert!(evaluation.result);

        // Under All the same shape fails: the inner group is false.
        let evaluation = evaluate(Some(&condition), &ctx, Combinator::All).await;
        assert!(!evaluation.result);
    }

    #[tokio::test]
    async fn test_all_string_subgroup_contributes_nothing_boolean() {
        let ctx = EvaluationContext::new();
        let condition = Condition::group(vec![
            Condition::group(vec![Condition::clause("just words")]),
            Condition::predicate(|_| true),
        ]);

        let any = evaluate(Some(&condition), &ctx, Combinator::Any).await;
        assert!(any.result);
        assert_eq!(any.rationale, vec!["just words"]);
    }

    #[test]
    fn test_is_programmatic() {
        assert!(!Condition::clause("x").is_programmatic());
        assert!(Condition::predicate(|_| true).is_programmatic());
        assert!(Condition::group(vec![
            Condition::clause("x"),
            Condition::group(vec![Condition::predicate(|_| true)]),
        ])
        .is_programmatic());
        assert!(!Condition::group(vec![Condition::clause("x")]).is_programmatic());
    }
}
