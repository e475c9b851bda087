//! Checks shared by both manager families

use set_assertions::rebalance_interval_elapsed;
use setkit_core::{Error, ProtocolError, RebalanceState, Result, Timestamp};

/// The rebalancing Set must be idle and past its rebalance interval
pub(crate) fn ensure_ready_to_propose(
    state: RebalanceState,
    last_rebalance: Timestamp,
    interval: Timestamp,
    now: Timestamp,
    attempted: &'static str,
) -> Result<()> {
    if state != RebalanceState::Default {
        return Err(ProtocolError::InvalidStateTransition {
            current: state,
            attempted,
        }
        .into());
    }
    rebalance_interval_elapsed(last_rebalance, interval, now)
}

/// Turn a precondition check into a yes/no answer
///
/// Protocol and strategy failures mean "not now"; remote call and
/// configuration errors still propagate.
pub(crate) fn availability(check: Result<()>) -> Result<bool> {
    match check {
        Ok(()) => Ok(true),
        Err(Error::Protocol(_)) | Err(Error::Strategy(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setkit_core::{GatewayError, StrategyError};

    #[test]
    fn test_ready_to_propose() {
        assert!(ensure_ready_to_propose(RebalanceState::Default, 0, 100, 100, "x").is_ok());
        assert_eq!(
            ensure_ready_to_propose(RebalanceState::Rebalance, 0, 100, 100, "x")
                .unwrap_err()
                .error_code(),
            "invalid_state_transition"
        );
        assert_eq!(
            ensure_ready_to_propose(RebalanceState::Default, 50, 100, 100, "x")
                .unwrap_err()
                .error_code(),
            "rebalance_too_soon"
        );
    }

    #[test]
    fn test_availability() {
        assert!(availability(Ok(())).unwrap());
        let not_now: Result<()> = Err(StrategyError::ProposalPending {
            pending_until: 10,
            now: 5,
        }
        .into());
        assert!(!availability(not_now).unwrap());

        let offline: Result<()> = Err(GatewayError::Timeout { secs: 30 }.into());
        assert!(availability(offline).is_err());
    }
}
