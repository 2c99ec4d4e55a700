//! Rule evaluation and plan building.
//!
//! # Responsibilities
//! - Enrich the evaluation context from the request
//! - Filter rules to candidates, rank them, pick the winner
//! - Run the rewrite pipeline for the winner and build the plan trace
//!
//! # Design Decisions
//! - Stateless; safe to share across threads without locks
//! - Deterministic: same (request, rules, context) always yields the same plan
//! - No match is not an error: it yields a plan without a preferred target

use crate::routing::matcher::{AndMatcher, MatchInput, Matcher};
use crate::routing::plan::{DispatchMode, ExecutionPlan, PlanStep};
use crate::routing::request::{EvaluationContext, InboundRequest};
use crate::routing::rewrite::{RewriteInstruction, RewriteOutcome, RewritePipeline, RewriteStatus};
use crate::rules::{rank, RuleAction, RuleRecord};

/// A rule that matched, with its specificity.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub rule: &'a RuleRecord,
    pub specificity: usize,
}

/// Evaluates rule sets into execution plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine {
    rewrite: RewritePipeline,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching rules in precedence order, winner first.
    pub fn candidates<'a>(
        &self,
        request: &InboundRequest,
        rules: &'a [RuleRecord],
        context: &EvaluationContext,
    ) -> Vec<Candidate<'a>> {
        let context = context.enrich(request);
        let normalized = request.normalized();
        let input = MatchInput {
            request: &normalized,
            context: &context,
        };

        let mut candidates: Vec<Candidate<'a>> = rules
            .iter()
            .filter_map(|rule| {
                let matcher = AndMatcher::for_rule(rule);
                matcher.matches(&input).then(|| Candidate {
                    rule,
                    specificity: matcher.len(),
                })
            })
            .collect();

        candidates.sort_by(|a, b| rank(a.rule, a.specificity, b.rule, b.specificity));
        candidates
    }

    /// Turn a request and rule set into a plan.
    pub fn evaluate(
        &self,
        request: &InboundRequest,
        rules: &[RuleRecord],
        context: &EvaluationContext,
    ) -> ExecutionPlan {
        let candidates = self.candidates(request, rules, context);
        let Some(winner) = candidates.first() else {
            tracing::debug!(rules = rules.len(), "No rule matched");
            return ExecutionPlan::ask(request.clone());
        };

        tracing::debug!(
            rule_id = %winner.rule.rule_id,
            specificity = winner.specificity,
            candidates = candidates.len(),
            "Rule matched"
        );
        self.build_plan(request, winner)
    }

    fn build_plan(&self, request: &InboundRequest, winner: &Candidate<'_>) -> ExecutionPlan {
        let rule = winner.rule;
        let instruction = match &rule.action {
            RuleAction::RunCommand { command, .. } => RewriteInstruction::from_command(command),
            RuleAction::AlwaysOpenIn { .. } | RuleAction::AlwaysAsk => None,
        };
        let outcome = self.rewrite.rewrite(request, instruction.as_ref());

        let steps = vec![
            PlanStep::new("rewrite", rewrite_detail(rule, instruction.as_ref(), &outcome)),
            PlanStep::new("cleanup", "cleanup-tracking"),
            PlanStep::new("targetSelection", target_selection_detail(rule)),
            PlanStep::new("launch", rule.action.target_id().unwrap_or("chooser")),
        ];

        ExecutionPlan {
            request: outcome.request,
            preferred_target: rule.preferred_target().map(str::to_string),
            configured_fallback: None,
            target_reference: rule.target_reference.clone(),
            dispatch_mode: DispatchMode::Single,
            steps,
        }
    }
}

fn rewrite_detail(
    rule: &RuleRecord,
    instruction: Option<&RewriteInstruction>,
    outcome: &RewriteOutcome,
) -> String {
    let Some(instruction) = instruction else {
        return match &rule.action {
            RuleAction::AlwaysOpenIn { target_id } => {
                format!("rule-id={}:alwaysOpenIn:{}", rule.rule_id, target_id)
            }
            RuleAction::RunCommand { target_id, command } => {
                format!("rule-id={}:runCommand:{}:{}", rule.rule_id, target_id, command)
            }
            RuleAction::AlwaysAsk => format!("rule-id={}:alwaysAsk", rule.rule_id),
        };
    };

    let mut parts = vec![
        format!("rule-id={}", rule.rule_id),
        format!("kind={}", instruction.kind()),
        format!("status={}", outcome.status.as_str()),
        format!("reason={}", outcome.reason.as_str()),
        format!("effective_url={}", outcome.request.target()),
    ];
    if outcome.status == RewriteStatus::Failed {
        parts.push(format!("fallback_reason={}", outcome.reason.as_str()));
    }
    parts.join(":")
}

fn target_selection_detail(rule: &RuleRecord) -> String {
    if let Some(reference) = &rule.target_reference {
        return format!(
            "{}:profile={}:workspace={}",
            reference.target_id,
            reference.profile_id.as_deref().unwrap_or("none"),
            reference.workspace_id.as_deref().unwrap_or("none"),
        );
    }
    rule.action.target_id().unwrap_or("chooser").to_string()
}
