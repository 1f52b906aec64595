use super::domain::ApplicationStatus;

/// Administrative action on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} an application that is already {current}", .action.label())]
pub struct TransitionError {
    pub current: ApplicationStatus,
    pub action: ReviewAction,
}

/// Pending -> Approved | Rejected. Approved and Rejected are terminal.
pub fn transition(
    current: ApplicationStatus,
    action: ReviewAction,
) -> Result<ApplicationStatus, TransitionError> {
    match (current, action) {
        (ApplicationStatus::Pending, ReviewAction::Approve) => Ok(ApplicationStatus::Approved),
        (ApplicationStatus::Pending, ReviewAction::Reject) => Ok(ApplicationStatus::Rejected),
        (ApplicationStatus::Approved | ApplicationStatus::Rejected, _) => {
            Err(TransitionError { current, action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_exactly_one_terminal_state() {
        assert_eq!(
            transition(ApplicationStatus::Pending, ReviewAction::Approve),
            Ok(ApplicationStatus::Approved)
        );
        assert_eq!(
            transition(ApplicationStatus::Pending, ReviewAction::Reject),
            Ok(ApplicationStatus::Rejected)
        );
    }

    #[test]
    fn terminal_states_refuse_every_action() {
        for current in [ApplicationStatus::Approved, ApplicationStatus::Rejected] {
            for action in [ReviewAction::Approve, ReviewAction::Reject] {
                let err = transition(current, action).expect_err("terminal");
                assert_eq!(err.current, current);
                assert!(err.to_string().contains(current.label()));
            }
        }
    }
}
