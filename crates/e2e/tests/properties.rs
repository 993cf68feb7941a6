//! Property tests for name matching and listener cleanup

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use campaign_common::{
    matches, Channel, InMemoryBus, InMemoryDom, MatchMode, MatchRule, Notification, PayloadField,
};
use campaign_e2e::{listen, E2eError, RaceCoordinator, WaitSpec, WorkerNamespace};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn fuzzy_match_is_symmetric(a in "[A-Za-z ]{0,12}", b in "[A-Za-z ]{0,12}") {
        prop_assert_eq!(
            matches(&a, &b, MatchMode::ContainsEitherDirection),
            matches(&b, &a, MatchMode::ContainsEitherDirection)
        );
        prop_assert_eq!(matches(&a, &b, MatchMode::Exact), matches(&b, &a, MatchMode::Exact));
    }

    #[test]
    fn exact_match_implies_fuzzy_match(a in "[A-Za-z ]{0,12}", b in "[A-Za-z ]{0,12}") {
        if matches(&a, &b, MatchMode::Exact) {
            prop_assert!(matches(&a, &b, MatchMode::ContainsEitherDirection));
        }
    }

    #[test]
    fn worker_names_match_their_base(base in "[A-Za-z][A-Za-z ]{0,15}[A-Za-z]", worker in 0u32..64) {
        let ns = WorkerNamespace::new(worker);
        let name = ns.unique(&base);
        prop_assert!(matches(&name, &base, MatchMode::ContainsEitherDirection));
        prop_assert_eq!(WorkerNamespace::base_of(&name), base.trim());
    }

    #[test]
    fn timed_out_listener_is_released(timeout_ms in 1u64..5_000, noise in 0usize..4) {
        let rt = paused_runtime();
        let bus = InMemoryBus::new();

        let result = rt.block_on(async {
            let pending = listen(
                &bus,
                Channel::EntitySelected,
                MatchRule::fuzzy(PayloadField::Name, "Campfire Tavern"),
            );
            for i in 0..noise {
                bus.publish(Notification::EntitySelected { name: format!("Other {}", i) });
            }
            pending.wait(Duration::from_millis(timeout_ms)).await
        });

        prop_assert!(matches!(result, Err(E2eError::ChannelTimeout { .. })), "expected ChannelTimeout, got {:?}", result);
        prop_assert_eq!(bus.listener_count(Channel::EntitySelected), 0);
        prop_assert_eq!(
            bus.publish(Notification::EntitySelected { name: "Campfire Tavern".to_string() }),
            0
        );
    }

    #[test]
    fn failed_race_leaves_no_listeners(timeout_ms in 30u64..2_000) {
        let rt = paused_runtime();
        let bus = InMemoryBus::new();
        let dom = InMemoryDom::new();
        let coordinator = RaceCoordinator::new(
            Arc::new(bus.clone()),
            Arc::new(dom),
            Duration::from_millis(25),
        );

        let spec = WaitSpec::new(
            Channel::SubTabChanged,
            MatchRule::fuzzy(PayloadField::Tab, "Story Arcs"),
            Duration::from_millis(timeout_ms),
        );
        let result = rt.block_on(coordinator.await_transition(spec));

        prop_assert!(result.unwrap_err().is_timeout());
        prop_assert_eq!(bus.total_listeners(), 0);
    }
}
