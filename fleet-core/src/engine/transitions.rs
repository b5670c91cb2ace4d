//! Transition evaluation: picks the `goto` for a task's output by walking
//! `branches` in declaration order, first match wins.

use crate::domain::{TransitionBranch, TransitionOperator, TypedValue};

/// Evaluates `branches` against `output` in order and returns the first
/// matching branch's `goto`, or `None` if nothing matched (the caller routes
/// to `on_failure` or a no-transition error).
pub fn resolve(branches: &[TransitionBranch], output: &TypedValue) -> Option<String> {
    branches.iter().find(|branch| matches(branch, output)).map(|branch| branch.goto.clone())
}

fn matches(branch: &TransitionBranch, output: &TypedValue) -> bool {
    if branch.operator == TransitionOperator::Default {
        return true;
    }
    let Some(when) = branch.when.as_deref() else {
        return false;
    };

    match branch.operator {
        TransitionOperator::Default => unreachable!("handled above"),
        TransitionOperator::Equals => output.render_string() == when,
        TransitionOperator::NotEquals => output.render_string() != when,
        TransitionOperator::Contains => output.render_string().contains(when),
        TransitionOperator::StartsWith => output.render_string().starts_with(when),
        TransitionOperator::EndsWith => output.render_string().ends_with(when),
        TransitionOperator::GreaterThan => numeric_compare(output, when, |a, b| a > b),
        TransitionOperator::LessThan => numeric_compare(output, when, |a, b| a < b),
    }
}

fn numeric_compare(output: &TypedValue, when: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let (Ok(lhs), Ok(rhs)) = (output.as_number(), when.trim().parse::<f64>()) else {
        return false;
    };
    cmp(lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(operator: TransitionOperator, when: Option<&str>, goto: &str) -> TransitionBranch {
        TransitionBranch { operator, when: when.map(String::from), goto: goto.to_string() }
    }

    #[test]
    fn first_matching_branch_wins_in_declaration_order() {
        let branches = vec![
            branch(TransitionOperator::Equals, Some("no"), "wrong"),
            branch(TransitionOperator::Equals, Some("yes"), "right"),
            branch(TransitionOperator::Default, None, "fallback"),
        ];
        let goto = resolve(&branches, &TypedValue::string("yes")).unwrap();
        assert_eq!(goto, "right");
    }

    #[test]
    fn default_matches_unconditionally() {
        let branches = vec![branch(TransitionOperator::Default, None, "end")];
        assert_eq!(resolve(&branches, &TypedValue::string("anything")).unwrap(), "end");
    }

    #[test]
    fn numeric_operators_coerce_both_sides_as_decimal() {
        let branches = vec![branch(TransitionOperator::GreaterThan, Some("10"), "big")];
        assert_eq!(resolve(&branches, &TypedValue::number(42.0)).unwrap(), "big");
        assert!(resolve(&branches, &TypedValue::number(1.0)).is_none());
    }

    #[test]
    fn non_numeric_output_never_matches_a_numeric_operator() {
        let branches = vec![branch(TransitionOperator::LessThan, Some("10"), "small")];
        assert!(resolve(&branches, &TypedValue::string("not a number")).is_none());
    }

    #[test]
    fn no_match_and_no_default_returns_none() {
        let branches = vec![branch(TransitionOperator::Equals, Some("no"), "wrong")];
        assert!(resolve(&branches, &TypedValue::string("yes")).is_none());
    }

    #[test]
    fn contains_starts_with_ends_with() {
        let v = TypedValue::string("hello world");
        assert!(resolve(&[branch(TransitionOperator::Contains, Some("lo wo"), "g")], &v).is_some());
        assert!(resolve(&[branch(TransitionOperator::StartsWith, Some("hello"), "g")], &v).is_some());
        assert!(resolve(&[branch(TransitionOperator::EndsWith, Some("world"), "g")], &v).is_some());
    }
}
