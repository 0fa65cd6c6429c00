use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{Result, SwarmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Spec,
    Bug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    // spec
    Plan,
    Discovery,
    Design,
    Governance,
    Accept,
    Implement,
    Verify,
    Learn,
    // bug
    Analyze,
    Fix,
    Review,
    // both
    Complete,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Spec => "spec",
            WorkflowType::Bug => "bug",
        }
    }

    pub fn initial_phase(&self) -> Phase {
        match self {
            WorkflowType::Spec => Phase::Plan,
            WorkflowType::Bug => Phase::Analyze,
        }
    }
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Complex => "complex",
        }
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Discovery => "discovery",
            Phase::Design => "design",
            Phase::Governance => "governance",
            Phase::Accept => "accept",
            Phase::Implement => "implement",
            Phase::Verify => "verify",
            Phase::Learn => "learn",
            Phase::Analyze => "analyze",
            Phase::Fix => "fix",
            Phase::Review => "review",
            Phase::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete)
    }
}

/// Phases reachable from `from`, or `None` when `from` is not a phase of `workflow_type`.
///
/// Spec (simple):  plan → implement → verify → learn → complete
/// Spec (complex): plan → discovery → design → governance → plan → accept → implement → …
/// `verify → implement` is the fix loop; `design → plan` sends a design back for replanning.
/// Bug:            analyze → fix → review → complete, with `review → fix` for another pass.
pub fn allowed_transitions(workflow_type: WorkflowType, from: Phase) -> Option<&'static [Phase]> {
    use Phase::*;

    let allowed: &'static [Phase] = match (workflow_type, from) {
        (WorkflowType::Spec, Plan) => &[Implement, Discovery, Accept],
        (WorkflowType::Spec, Discovery) => &[Design],
        (WorkflowType::Spec, Design) => &[Governance, Plan],
        (WorkflowType::Spec, Governance) => &[Plan],
        (WorkflowType::Spec, Accept) => &[Implement],
        (WorkflowType::Spec, Implement) => &[Verify],
        (WorkflowType::Spec, Verify) => &[Implement, Learn],
        (WorkflowType::Spec, Learn) => &[Complete],
        (WorkflowType::Bug, Analyze) => &[Fix],
        (WorkflowType::Bug, Fix) => &[Review],
        (WorkflowType::Bug, Review) => &[Fix, Complete],
        (_, Complete) => &[],
        _ => return None,
    };
    Some(allowed)
}

pub fn validate_transition(workflow_type: WorkflowType, from: Phase, to: Phase) -> Result<()> {
    let allowed =
        allowed_transitions(workflow_type, from).ok_or_else(|| SwarmError::UnknownPhase {
            workflow_type: workflow_type.to_string(),
            phase: from.to_string(),
        })?;

    if allowed.contains(&to) {
        Ok(())
    } else {
        Err(SwarmError::InvalidTransition {
            workflow_type: workflow_type.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl FromStr for WorkflowType {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spec" => Ok(WorkflowType::Spec),
            "bug" => Ok(WorkflowType::Bug),
            _ => Err(SwarmError::InvalidStatus {
                kind: "workflow type",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Complexity {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(Complexity::Simple),
            "complex" => Ok(Complexity::Complex),
            _ => Err(SwarmError::InvalidStatus {
                kind: "complexity",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Phase {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plan" => Ok(Phase::Plan),
            "discovery" => Ok(Phase::Discovery),
            "design" => Ok(Phase::Design),
            "governance" => Ok(Phase::Governance),
            "accept" => Ok(Phase::Accept),
            "implement" => Ok(Phase::Implement),
            "verify" => Ok(Phase::Verify),
            "learn" => Ok(Phase::Learn),
            "analyze" => Ok(Phase::Analyze),
            "fix" => Ok(Phase::Fix),
            "review" => Ok(Phase::Review),
            "complete" => Ok(Phase::Complete),
            _ => Err(SwarmError::InvalidStatus {
                kind: "phase",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_initial_phases() {
        assert_eq!(WorkflowType::Spec.initial_phase(), Phase::Plan);
        assert_eq!(WorkflowType::Bug.initial_phase(), Phase::Analyze);
    }

    #[test]
    fn test_simple_spec_path_is_valid() {
        let path = [
            Phase::Plan,
            Phase::Implement,
            Phase::Verify,
            Phase::Learn,
            Phase::Complete,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(WorkflowType::Spec, pair[0], pair[1]).is_ok());
        }
    }

    #[test]
    fn test_complex_spec_path_is_valid() {
        let path = [
            Phase::Plan,
            Phase::Discovery,
            Phase::Design,
            Phase::Governance,
            Phase::Plan,
            Phase::Accept,
            Phase::Implement,
            Phase::Verify,
            Phase::Implement,
            Phase::Verify,
            Phase::Learn,
            Phase::Complete,
        ];
        for pair in path.windows(2) {
            assert!(
                validate_transition(WorkflowType::Spec, pair[0], pair[1]).is_ok(),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_bug_fix_loop() {
        for (from, to) in [
            (Phase::Analyze, Phase::Fix),
            (Phase::Fix, Phase::Review),
            (Phase::Review, Phase::Fix),
            (Phase::Review, Phase::Complete),
        ] {
            assert!(validate_transition(WorkflowType::Bug, from, to).is_ok());
        }
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        assert_matches!(
            validate_transition(WorkflowType::Spec, Phase::Plan, Phase::Complete),
            Err(SwarmError::InvalidTransition { .. })
        );
        assert_matches!(
            validate_transition(WorkflowType::Spec, Phase::Implement, Phase::Learn),
            Err(SwarmError::InvalidTransition { .. })
        );
        assert_matches!(
            validate_transition(WorkflowType::Bug, Phase::Analyze, Phase::Review),
            Err(SwarmError::InvalidTransition { .. })
        );
    }

    #[test]
    fn test_complete_is_terminal() {
        for target in [Phase::Plan, Phase::Implement, Phase::Complete] {
            assert_matches!(
                validate_transition(WorkflowType::Spec, Phase::Complete, target),
                Err(SwarmError::InvalidTransition { .. })
            );
        }
        assert_eq!(
            allowed_transitions(WorkflowType::Bug, Phase::Complete),
            Some(&[][..])
        );
    }

    #[test]
    fn test_phase_from_other_workflow_type_is_unknown() {
        assert_matches!(
            validate_transition(WorkflowType::Bug, Phase::Plan, Phase::Implement),
            Err(SwarmError::UnknownPhase { phase, .. }) if phase == "plan"
        );
        assert_matches!(
            validate_transition(WorkflowType::Spec, Phase::Fix, Phase::Review),
            Err(SwarmError::UnknownPhase { .. })
        );
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!("governance".parse::<Phase>().unwrap(), Phase::Governance);
        assert_eq!("bug".parse::<WorkflowType>().unwrap(), WorkflowType::Bug);
        assert_eq!("complex".parse::<Complexity>().unwrap(), Complexity::Complex);
        assert_matches!(
            "shipping".parse::<Phase>(),
            Err(SwarmError::InvalidStatus { kind: "phase", .. })
        );
    }
}
