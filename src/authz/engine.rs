use crate::authz::types::{AuthorizationContext, Decision, PolicyRule};

/// Decision plus the rule that caused a denial, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict<'r> {
    pub decision: Decision,
    pub rule: Option<&'r PolicyRule>,
}

/// Evaluate `rules` (most specific first) for `ctx`.
///
/// - no applicable rule: `Permit`, whether or not a principal is present
/// - rules apply but no principal: `Unauthenticated`
/// - otherwise every rule's required role must be held; the first missing
///   one yields `Deny`
pub fn evaluate<'r>(ctx: &AuthorizationContext<'_>, rules: &[&'r PolicyRule]) -> Verdict<'r> {
    if rules.is_empty() {
        return Verdict {
            decision: Decision::Permit,
            rule: None,
        };
    }

    let Some(principal) = ctx.principal else {
        return Verdict {
            decision: Decision::Unauthenticated,
            rule: rules.first().copied(),
        };
    };

    for &rule in rules {
        if !principal.has_role(&rule.required_role) {
            return Verdict {
                decision: Decision::Deny,
                rule: Some(rule),
            };
        }
    }

    Verdict {
        decision: Decision::Permit,
        rule: None,
    }
}

pub fn decide(ctx: &AuthorizationContext<'_>, rules: &[&PolicyRule]) -> Decision {
    let verdict = evaluate(ctx, rules);
    let rule = verdict.rule.map(|r| r.to_string());
    tracing::debug!(
        operation = %ctx.operation,
        principal = ctx.principal.map(|p| p.id()).unwrap_or("-"),
        rules = rules.len(),
        decision = ?verdict.decision,
        rule = rule.as_deref().unwrap_or("-"),
        "authorization decision"
    );
    verdict.decision
}
