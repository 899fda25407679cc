use failsafe::{backoff, failure_policy, Config};
use std::time::Duration;

/// Creates the circuit breaker that guards the poller's CRM scans.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failed ticks trigger OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// While OPEN the poller skips its ticks instead of hammering a CRM that keeps
/// failing (expired install, outage).
pub fn create_poller_circuit_breaker() -> impl failsafe::CircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::{CircuitBreaker, Error};

    #[test]
    fn test_circuit_breaker_opens_after_failed_ticks() {
        let cb = create_poller_circuit_breaker();

        for _ in 0..5 {
            let result: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("crm unavailable"));
            assert!(result.is_err());
        }

        assert!(!cb.is_call_permitted());
        let result: Result<(), Error<&str>> = cb.call(|| Ok::<(), &str>(()));
        assert!(matches!(result, Err(Error::Rejected)));
    }

    #[test]
    fn test_circuit_breaker_stays_closed_on_success() {
        let cb = create_poller_circuit_breaker();

        for _ in 0..4 {
            let _: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("crm unavailable"));
        }
        let result: Result<i32, Error<&str>> = cb.call(|| Ok::<i32, &str>(3));

        assert_eq!(result.unwrap(), 3);
        assert!(cb.is_call_permitted());
    }
}
