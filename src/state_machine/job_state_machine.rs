use super::errors::{StateMachineError, StateMachineResult};
use super::events::JobEvent;
use super::states::JobState;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// One recorded transition
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub from: JobState,
    pub to: JobState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// Job lifecycle state machine.
///
/// Transitions are one-directional: a job that fails during creation must be
/// resubmitted as a new job.
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    job_id: Uuid,
    state: JobState,
    transitions: Vec<JobTransition>,
}

impl JobStateMachine {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            state: JobState::Created,
            transitions: Vec::new(),
        }
    }

    pub fn current_state(&self) -> JobState {
        self.state
    }

    pub fn transitions(&self) -> &[JobTransition] {
        &self.transitions
    }

    /// Apply an event, returning the new state
    pub fn transition(&mut self, event: JobEvent) -> StateMachineResult<JobState> {
        let target = Self::determine_target_state(self.state, &event)?;

        debug!(
            job_id = %self.job_id,
            from = %self.state,
            to = %target,
            event = event.event_type(),
            "Job state transition"
        );

        self.transitions.push(JobTransition {
            from: self.state,
            to: target,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
        self.state = target;
        Ok(target)
    }

    /// Determine target state based on current state and event
    pub fn determine_target_state(current: JobState, event: &JobEvent) -> StateMachineResult<JobState> {
        let target = match (current, event) {
            (JobState::Created, JobEvent::Start) => JobState::Started,
            (JobState::Created, JobEvent::FailCreation(_)) => JobState::FailedDuringCreation,
            (JobState::Started, JobEvent::Complete) => JobState::Completed,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from,
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            JobStateMachine::determine_target_state(JobState::Created, &JobEvent::Start).unwrap(),
            JobState::Started
        );
        assert_eq!(
            JobStateMachine::determine_target_state(JobState::Started, &JobEvent::Complete).unwrap(),
            JobState::Completed
        );
        assert_eq!(
            JobStateMachine::determine_target_state(
                JobState::Created,
                &JobEvent::fail_with_error("missing parameter")
            )
            .unwrap(),
            JobState::FailedDuringCreation
        );
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot complete a job that never started
        assert!(JobStateMachine::determine_target_state(JobState::Created, &JobEvent::Complete).is_err());
        // No retry in place after a creation failure
        assert!(JobStateMachine::determine_target_state(JobState::FailedDuringCreation, &JobEvent::Start).is_err());
        // Setup failures cannot happen once objects are being processed
        assert!(JobStateMachine::determine_target_state(
            JobState::Started,
            &JobEvent::fail_with_error("late")
        )
        .is_err());
        assert!(JobStateMachine::determine_target_state(JobState::Completed, &JobEvent::Start).is_err());
    }

    #[test]
    fn test_transition_history_is_recorded() {
        let mut machine = JobStateMachine::new(Uuid::new_v4());
        machine.transition(JobEvent::Start).unwrap();
        machine.transition(JobEvent::Complete).unwrap();
        assert!(machine.is_terminal());
        let events: Vec<_> = machine.transitions().iter().map(|t| t.event.as_str()).collect();
        assert_eq!(events, vec!["start", "complete"]);

        let err = machine.transition(JobEvent::Complete).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::InvalidTransition {
                from: JobState::Completed,
                event: "complete".to_string()
            }
        );
    }
}
