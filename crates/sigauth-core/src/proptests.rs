//! Property-based tests for sigauth core
//!
//! These tests verify correctness properties using proptest.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use crate::clock::Clock;
    use crate::controller::SessionController;
    use crate::errors::{AuthError, RemoteStep};
    use crate::gate::SignerGate;
    use crate::harness::{FixedClock, MockIdentityService, SwitchableLock};
    use crate::keys::LocalKeySigner;
    use crate::types::AuthenticationState;

    #[derive(Clone, Debug)]
    enum Op {
        SignIn,
        SignInFailingAt(RemoteStep),
        SignOut,
        GetToken,
        GetProfile,
        AdvanceMinutes(i64),
        Lock,
        Unlock,
    }

    fn step() -> impl Strategy<Value = RemoteStep> {
        prop_oneof![
            Just(RemoteStep::Nonce),
            Just(RemoteStep::Login),
            Just(RemoteStep::Token),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::SignIn),
            step().prop_map(Op::SignInFailingAt),
            Just(Op::SignOut),
            Just(Op::GetToken),
            Just(Op::GetProfile),
            (1i64..90).prop_map(Op::AdvanceMinutes),
            Just(Op::Lock),
            Just(Op::Unlock),
        ]
    }

    /// The serialized flag must always agree with the presence of data.
    fn assert_consistent(state: &AuthenticationState) -> Result<(), TestCaseError> {
        prop_assert_eq!(state.is_signed_in(), state.session_data().is_some());
        let value = serde_json::to_value(state).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(
            value["isSignedIn"].as_bool(),
            Some(!value["sessionData"].is_null())
        );
        Ok(())
    }

    // **Property: signed-in flag and session data never disagree**
    //
    // For any sequence of operations, including failed sign-ins, locks and
    // clock movement, `is_signed_in` holds exactly when session data is
    // present, a failed sign-in leaves the controller signed out and a
    // successful one leaves it signed in.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_state_invariant_holds(ops in prop::collection::vec(op(), 1..24)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let clock = Arc::new(FixedClock::new(
                    Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap(),
                ));
                let service = Arc::new(MockIdentityService::new().with_clock(clock.clone()));
                let lock = Arc::new(SwitchableLock::unlocked());
                let gate = SignerGate::new(lock.clone(), Arc::new(LocalKeySigner::generate()));
                let mut controller = SessionController::new(service.clone(), gate);
                controller.set_clock(clock.clone());

                for op in ops {
                    match op {
                        Op::SignIn => {
                            service.succeed();
                            let result = controller.sign_in().await;
                            prop_assert_eq!(result.is_ok(), controller.is_signed_in());
                        }
                        Op::SignInFailingAt(step) => {
                            service.fail_at(step);
                            let result = controller.sign_in().await;
                            service.succeed();
                            prop_assert!(result.is_err());
                            prop_assert!(!controller.is_signed_in());
                        }
                        Op::SignOut => {
                            let was_signed_in = controller.is_signed_in();
                            let result = controller.sign_out().await;
                            prop_assert_eq!(result.is_ok(), was_signed_in);
                            prop_assert!(!controller.is_signed_in());
                        }
                        Op::GetToken => {
                            let was_signed_in = controller.is_signed_in();
                            match controller.access_token_with_refresh().await {
                                Ok(fetched) => {
                                    prop_assert!(was_signed_in);
                                    let state = controller.state();
                                    let stored = state.session_data().unwrap();
                                    prop_assert_eq!(&stored.access_token, &fetched.value);
                                    prop_assert!(stored.is_valid_at(clock.now()));
                                }
                                Err(AuthError::NotSignedIn) => prop_assert!(!was_signed_in),
                                Err(_) => prop_assert!(!controller.is_signed_in()),
                            }
                        }
                        Op::GetProfile => {
                            if let Ok(profile) = controller.get_profile().await {
                                prop_assert_eq!(profile, service.profile());
                            }
                        }
                        Op::AdvanceMinutes(minutes) => clock.advance(Duration::minutes(minutes)),
                        Op::Lock => lock.lock(),
                        Op::Unlock => lock.unlock(),
                    }
                    assert_consistent(&controller.state())?;
                }
                Ok(())
            })?;
        }
    }
}
