//! FSM unit tests

use berth::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use berth::errors::BerthError;
use berth::models::deployment::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Pending -> Building
    assert_eq!(fsm.process(DeploymentEvent::Build).unwrap(), DeploymentStatus::Building);

    // Building -> Success
    assert_eq!(fsm.process(DeploymentEvent::Succeed).unwrap(), DeploymentStatus::Success);
    assert!(fsm.is_terminal());
}

#[test]
fn test_fsm_failure_keeps_error() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Build).unwrap();
    fsm.process(DeploymentEvent::Fail("Build failed (exit code: 1)".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("Build failed (exit code: 1)"));
}

#[test]
fn test_fsm_cancel_from_pending_and_building() {
    let mut pending = DeploymentFsm::new();
    assert_eq!(pending.process(DeploymentEvent::Cancel).unwrap(), DeploymentStatus::Cancelled);

    let mut building = DeploymentFsm::from_status(DeploymentStatus::Building);
    assert_eq!(building.process(DeploymentEvent::Cancel).unwrap(), DeploymentStatus::Cancelled);
}

#[test]
fn test_fsm_terminal_states_reject_events() {
    for status in [
        DeploymentStatus::Success,
        DeploymentStatus::Failed,
        DeploymentStatus::Cancelled,
    ] {
        let mut fsm = DeploymentFsm::from_status(status);
        for event in [
            DeploymentEvent::Build,
            DeploymentEvent::Succeed,
            DeploymentEvent::Fail("late".to_string()),
            DeploymentEvent::Cancel,
        ] {
            let err = fsm.process(event).unwrap_err();
            assert!(matches!(err, BerthError::InvalidTransition(_)));
            assert_eq!(fsm.state(), status);
        }
    }
}

#[test]
fn test_fsm_cannot_succeed_without_building() {
    let mut fsm = DeploymentFsm::new();
    assert!(fsm.process(DeploymentEvent::Succeed).is_err());
    assert!(fsm.process(DeploymentEvent::Fail("x".to_string())).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
}
