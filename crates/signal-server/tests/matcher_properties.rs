//! Property-based tests for the Matcher's queue/room invariants.
//!
//! `Matcher::find_partner`/`close_room`/etc. are async, but `proptest!`'s
//! generated closures are synchronous, so each case spins up a fresh
//! single-threaded runtime and `block_on`s the scenario. `MemoryStore` keeps
//! every case in-process.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
};

use proptest::prelude::*;
use signal_core::Environment;
use signal_proto::UserId;
use signal_server::{MemoryStore, Matcher, NullAnalytics, PairingOutcome};

#[derive(Clone, Default)]
struct TestEnv {
    millis: std::sync::Arc<AtomicU64>,
    next_id: std::sync::Arc<AtomicU64>,
}

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, _duration: std::time::Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = (u128::from(id) + 1).to_be_bytes();
        buffer.copy_from_slice(&bytes[..buffer.len()]);
    }

    fn wall_clock_millis(&self) -> u64 {
        self.millis.fetch_add(1, Ordering::Relaxed)
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building a current-thread runtime")
        .block_on(fut)
}

fn matcher() -> Matcher<MemoryStore, NullAnalytics> {
    Matcher::new(MemoryStore::new(), NullAnalytics)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// FIFO ordering: for any sequence of distinct user ids enqueued in
    /// order, repeatedly pairing the next arrival against the queue always
    /// dequeues the oldest remaining entry first.
    #[test]
    fn prop_fifo_order_preserved(user_ids in prop::collection::vec(1u64..100_000, 2..20)) {
        let unique: Vec<UserId> = {
            let mut seen = HashSet::new();
            user_ids.into_iter().filter(|id| seen.insert(*id)).map(UserId).collect()
        };
        prop_assume!(unique.len() >= 2);

        block_on(async {
            let m = matcher();
            let env = TestEnv::default();

            // Enqueue everyone but the last arrival.
            for &user in &unique[..unique.len() - 1] {
                let outcome = m.find_partner(user, &env).await.unwrap();
                prop_assert!(matches!(outcome, PairingOutcome::Enqueued { .. }));
            }

            // The next arrival must pair with the *first* enqueued user.
            let last = *unique.last().unwrap();
            let outcome = m.find_partner(last, &env).await.unwrap();
            match outcome {
                PairingOutcome::Matched { partner, .. } => {
                    prop_assert_eq!(partner, unique[0]);
                },
                PairingOutcome::Enqueued { .. } => prop_assert!(false, "expected a match"),
            }
            Ok(())
        })?;
    }

    /// Closing a room twice is idempotent: the first call tears it down and
    /// reports success, every subsequent call reports `false` without error.
    #[test]
    fn prop_close_room_idempotent(a in 1u64..100_000, b in 1u64..100_000, extra_closes in 1usize..5) {
        prop_assume!(a != b);

        block_on(async {
            let m = matcher();
            let env = TestEnv::default();

            m.find_partner(UserId(a), &env).await.unwrap();
            let outcome = m.find_partner(UserId(b), &env).await.unwrap();
            let PairingOutcome::Matched { room_id, .. } = outcome else {
                return Err(TestCaseError::fail("expected an immediate match"));
            };

            prop_assert!(m.close_room(room_id).await.unwrap());
            for _ in 0..extra_closes {
                prop_assert!(!m.close_room(room_id).await.unwrap());
            }
            Ok(())
        })?;
    }

    /// Enqueue then remove-from-queue round-trips: a user who leaves the
    /// queue before being matched is gone from it, and removing them again
    /// is a no-op rather than an error.
    #[test]
    fn prop_enqueue_remove_roundtrip(user in 1u64..100_000) {
        block_on(async {
            let m = matcher();
            let env = TestEnv::default();

            let outcome = m.find_partner(UserId(user), &env).await.unwrap();
            prop_assert!(matches!(outcome, PairingOutcome::Enqueued { .. }));
            prop_assert_eq!(m.stats().await.unwrap().queue_size, 1);

            prop_assert!(m.remove_from_queue(UserId(user)).await.unwrap());
            prop_assert_eq!(m.stats().await.unwrap().queue_size, 0);
            prop_assert!(!m.remove_from_queue(UserId(user)).await.unwrap());
            Ok(())
        })?;
    }

    /// Running `find_partner` for N distinct users, one after another,
    /// always pairs off exactly `floor(N/2)` rooms and leaves at most one
    /// user queued.
    #[test]
    fn prop_n_find_partner_pairs_floor_n_div_2(n in 2u64..40) {
        block_on(async {
            let m = matcher();
            let env = TestEnv::default();

            for user in 0..n {
                m.find_partner(UserId(user + 1), &env).await.unwrap();
            }

            let stats = m.stats().await.unwrap();
            prop_assert_eq!(stats.active_rooms, n / 2);
            prop_assert_eq!(stats.queue_size, n % 2);
            Ok(())
        })?;
    }
}
