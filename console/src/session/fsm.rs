//! Finite state machine for the deployment lifecycle

use serde::{Deserialize, Serialize};

use crate::models::deployment::StatusInfo;

/// Lifecycle phase of a configuration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// Editing and submitting are allowed; every session starts here
    Idle,

    /// Parameters are being persisted and the deploy trigger issued
    Submitting,

    /// The trigger was accepted; the status poller is live
    Polling,

    /// Terminal: the deployment converged
    Succeeded,

    /// Terminal: the deployment failed, or status polling gave up
    Failed,
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Succeeded | LifecyclePhase::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, LifecyclePhase::Submitting | LifecyclePhase::Polling)
    }
}

/// Lifecycle event
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A submit started
    Submit,

    /// The deploy trigger was accepted
    Accepted,

    /// Persisting or triggering failed; back to editing
    Rejected(String),

    /// A poll saw the deploy still running
    StatusInProcess,

    /// A poll saw terminal success
    StatusSucceeded(Option<StatusInfo>),

    /// A poll saw terminal failure, or polling gave up
    StatusFailed(Option<StatusInfo>),

    /// Re-enter Idle, e.g. for a version switch
    Reset,
}

/// Deployment lifecycle FSM
///
/// Pure state bookkeeping; the session controller decides when events fire.
#[derive(Debug, Clone)]
pub struct LifecycleFsm {
    phase: LifecyclePhase,
    info: Option<StatusInfo>,
    rejection: Option<String>,
}

impl LifecycleFsm {
    /// Create a new FSM in the Idle phase
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Idle,
            info: None,
            rejection: None,
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Terminal details captured from the last status report
    pub fn info(&self) -> Option<&StatusInfo> {
        self.info.as_ref()
    }

    /// Why the last submit bounced, if it did
    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: LifecycleEvent) -> Result<(), String> {
        let next = match (&self.phase, event) {
            // From Idle
            (LifecyclePhase::Idle, LifecycleEvent::Submit) => {
                self.rejection = None;
                LifecyclePhase::Submitting
            }

            // From Submitting
            (LifecyclePhase::Submitting, LifecycleEvent::Accepted) => LifecyclePhase::Polling,
            (LifecyclePhase::Submitting, LifecycleEvent::Rejected(reason)) => {
                self.rejection = Some(reason);
                LifecyclePhase::Idle
            }

            // From Polling
            (LifecyclePhase::Polling, LifecycleEvent::StatusInProcess) => LifecyclePhase::Polling,
            (LifecyclePhase::Polling, LifecycleEvent::StatusSucceeded(info)) => {
                self.info = info;
                LifecyclePhase::Succeeded
            }
            (LifecyclePhase::Polling, LifecycleEvent::StatusFailed(info)) => {
                self.info = info;
                LifecyclePhase::Failed
            }

            // Reset re-arms the session; never valid mid-flight
            (LifecyclePhase::Idle, LifecycleEvent::Reset)
            | (LifecyclePhase::Succeeded, LifecycleEvent::Reset)
            | (LifecyclePhase::Failed, LifecycleEvent::Reset) => {
                self.info = None;
                self.rejection = None;
                LifecyclePhase::Idle
            }

            // Invalid transitions
            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = next;
        Ok(())
    }
}

impl Default for LifecycleFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut fsm = LifecycleFsm::new();
        assert_eq!(fsm.phase(), LifecyclePhase::Idle);

        fsm.process(LifecycleEvent::Submit).unwrap();
        assert_eq!(fsm.phase(), LifecyclePhase::Submitting);

        fsm.process(LifecycleEvent::Accepted).unwrap();
        assert_eq!(fsm.phase(), LifecyclePhase::Polling);

        fsm.process(LifecycleEvent::StatusInProcess).unwrap();
        assert_eq!(fsm.phase(), LifecyclePhase::Polling);

        let info = StatusInfo {
            message: Some("done".to_string()),
            detail: None,
        };
        fsm.process(LifecycleEvent::StatusSucceeded(Some(info)))
            .unwrap();
        assert_eq!(fsm.phase(), LifecyclePhase::Succeeded);
        assert_eq!(fsm.info().unwrap().message.as_deref(), Some("done"));
    }

    #[test]
    fn test_rejected_submit_returns_to_idle() {
        let mut fsm = LifecycleFsm::new();

        fsm.process(LifecycleEvent::Submit).unwrap();
        fsm.process(LifecycleEvent::Rejected("persist failed".to_string()))
            .unwrap();

        assert_eq!(fsm.phase(), LifecyclePhase::Idle);
        assert_eq!(fsm.rejection(), Some("persist failed"));

        // Resubmitting clears the rejection
        fsm.process(LifecycleEvent::Submit).unwrap();
        assert_eq!(fsm.rejection(), None);
    }

    #[test]
    fn test_failure_carries_info() {
        let mut fsm = LifecycleFsm::new();

        fsm.process(LifecycleEvent::Submit).unwrap();
        fsm.process(LifecycleEvent::Accepted).unwrap();
        let info = StatusInfo {
            message: Some("image pull failed".to_string()),
            detail: Some("registry unreachable".to_string()),
        };
        fsm.process(LifecycleEvent::StatusFailed(Some(info))).unwrap();

        assert_eq!(fsm.phase(), LifecyclePhase::Failed);
        assert_eq!(
            fsm.info().unwrap().detail.as_deref(),
            Some("registry unreachable")
        );
    }

    #[test]
    fn test_reset_from_terminal_phases() {
        let mut fsm = LifecycleFsm::new();
        fsm.process(LifecycleEvent::Submit).unwrap();
        fsm.process(LifecycleEvent::Accepted).unwrap();
        fsm.process(LifecycleEvent::StatusSucceeded(None)).unwrap();

        fsm.process(LifecycleEvent::Reset).unwrap();
        assert_eq!(fsm.phase(), LifecyclePhase::Idle);
        assert_eq!(fsm.info(), None);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut fsm = LifecycleFsm::new();

        // Cannot accept or observe status from Idle
        assert!(fsm.process(LifecycleEvent::Accepted).is_err());
        assert!(fsm.process(LifecycleEvent::StatusInProcess).is_err());

        // Cannot submit or reset mid-flight
        fsm.process(LifecycleEvent::Submit).unwrap();
        assert!(fsm.process(LifecycleEvent::Submit).is_err());
        assert!(fsm.process(LifecycleEvent::Reset).is_err());

        fsm.process(LifecycleEvent::Accepted).unwrap();
        assert!(fsm.process(LifecycleEvent::Submit).is_err());
        assert!(fsm.process(LifecycleEvent::Reset).is_err());
    }

    #[test]
    fn test_terminal_phases_ignore_further_status() {
        let mut fsm = LifecycleFsm::new();
        fsm.process(LifecycleEvent::Submit).unwrap();
        fsm.process(LifecycleEvent::Accepted).unwrap();
        fsm.process(LifecycleEvent::StatusFailed(None)).unwrap();

        assert!(fsm.process(LifecycleEvent::StatusSucceeded(None)).is_err());
        assert_eq!(fsm.phase(), LifecyclePhase::Failed);
    }
}
