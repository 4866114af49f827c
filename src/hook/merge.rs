//! Combining the outputs of several hooks into one.
//!
//! Every field of an output record folds with one [`Strategy`]; [`Combine`] applies
//! the strategies field by field. Folding an empty list yields the identity of each
//! strategy, so zero hooks combine to a permissive no-op.

use super::output::{
    BlockDecision, InjectedContext, PostToolUseOutput, PreToolUseOutput, PreToolUseSpecific,
    PromptSubmitOutput, PromptSubmitSpecific,
};

/// How one field folds across hook outputs.
pub trait Strategy<V> {
    fn fold(&self, values: impl Iterator<Item = V>) -> V;
}

/// Logical AND, identity `true`.
pub struct All;

/// Logical AND over at least one vote. No votes means `false`.
pub struct Unanimous;

/// Logical OR, identity `false`.
pub struct Any;

/// Non-empty texts joined by newlines, identity absent.
pub struct JoinLines;

/// The largest value under `Ord`, identity absent.
pub struct Strictest;

/// Every injected text in order, normalized.
pub struct Concat;

impl Strategy<bool> for All {
    fn fold(&self, mut values: impl Iterator<Item = bool>) -> bool {
        values.all(|v| v)
    }
}

impl Strategy<bool> for Unanimous {
    fn fold(&self, values: impl Iterator<Item = bool>) -> bool {
        let mut voted = false;
        for value in values {
            if !value {
                return false;
            }
            voted = true;
        }
        voted
    }
}

impl Strategy<bool> for Any {
    fn fold(&self, mut values: impl Iterator<Item = bool>) -> bool {
        values.any(|v| v)
    }
}

impl Strategy<Option<String>> for JoinLines {
    fn fold(&self, values: impl Iterator<Item = Option<String>>) -> Option<String> {
        let lines: Vec<String> = values.flatten().filter(|s| !s.is_empty()).collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

impl<P: Ord> Strategy<Option<P>> for Strictest {
    fn fold(&self, values: impl Iterator<Item = Option<P>>) -> Option<P> {
        values.flatten().max()
    }
}

impl Strategy<Option<InjectedContext>> for Concat {
    fn fold(
        &self,
        values: impl Iterator<Item = Option<InjectedContext>>,
    ) -> Option<InjectedContext> {
        let texts = values
            .flatten()
            .flat_map(|c| c.texts().to_vec())
            .collect();
        InjectedContext::from_texts(texts)
    }
}

/// Fold `get(output)` over `outputs` with `strategy`.
pub fn field<T, V, S: Strategy<V>>(outputs: &[T], strategy: S, get: impl Fn(&T) -> V) -> V {
    strategy.fold(outputs.iter().map(get))
}

/// Output records that several hooks can contribute to.
pub trait Combine: Sized {
    fn combine(outputs: &[Self]) -> Self;
}

fn block_flag(blocked: bool) -> Option<BlockDecision> {
    blocked.then_some(BlockDecision::Block)
}

impl Combine for PromptSubmitOutput {
    fn combine(outputs: &[Self]) -> Self {
        Self {
            decision: block_flag(field(outputs, Any, |o| o.decision.is_some())),
            reason: field(outputs, JoinLines, |o| o.reason.clone()),
            continue_: field(outputs, All, |o| o.continue_),
            stop_reason: field(outputs, JoinLines, |o| o.stop_reason.clone()),
            suppress_output: field(outputs, Unanimous, |o| o.suppress_output),
            hook_specific_output: PromptSubmitSpecific {
                additional_context: field(outputs, Concat, |o| {
                    o.hook_specific_output.additional_context.clone()
                }),
                additional_context_pre: field(outputs, Concat, |o| {
                    o.hook_specific_output.additional_context_pre.clone()
                }),
            },
        }
    }
}

impl Combine for PreToolUseOutput {
    fn combine(outputs: &[Self]) -> Self {
        let outputs: Vec<Self> = outputs.iter().cloned().map(Self::normalized).collect();
        let decision = field(&outputs, Strictest, |o| o.permission());
        // Only the hooks that voted for the winner explain it.
        let reason = field(&outputs, JoinLines, |o| {
            if decision.is_some() && o.permission() == decision {
                o.hook_specific_output.permission_decision_reason.clone()
            } else {
                None
            }
        });
        Self {
            continue_: field(&outputs, All, |o| o.continue_),
            stop_reason: field(&outputs, JoinLines, |o| o.stop_reason.clone()),
            suppress_output: field(&outputs, Unanimous, |o| o.suppress_output),
            decision: None,
            reason: None,
            hook_specific_output: PreToolUseSpecific {
                permission_decision: decision,
                permission_decision_reason: reason,
            },
        }
    }
}

impl Combine for PostToolUseOutput {
    fn combine(outputs: &[Self]) -> Self {
        Self {
            continue_: field(outputs, All, |o| o.continue_),
            stop_reason: field(outputs, JoinLines, |o| o.stop_reason.clone()),
            decision: block_flag(field(outputs, Any, |o| o.decision.is_some())),
            reason: field(outputs, JoinLines, |o| o.reason.clone()),
        }
    }
}
