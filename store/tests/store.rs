mod common;
use common::{Counter, change_watcher, init_tracing};
use reactive_store::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio_test::{assert_pending, assert_ready_eq, task};

#[test]
fn test_equal_write_does_not_notify() {
    init_tracing();
    let store = Store::new(7);
    let token = CancelToken::new();
    let calls = Counter::new();

    let _wait = {
        let calls = calls.clone();
        store.wait(&token, move |_| {
            calls.hit();
            false
        })
    };
    // evaluated once against the present value
    assert_eq!(calls.get(), 1);

    store.set(7);
    store.set(7);
    assert_eq!(calls.get(), 1);

    store.set(8);
    assert_eq!(calls.get(), 2);
    assert_eq!(store.value(), 8);
}

#[test]
fn test_listeners_notified_once_in_registration_order() {
    let store = Store::new(0);
    let token = CancelToken::new();
    let (record, check) = change_watcher::<(usize, i32)>();
    let record = std::sync::Arc::new(record);

    let waits: Vec<_> = (0..3)
        .map(|id| {
            let record = record.clone();
            store.wait(&token, move |value| {
                record((id, *value));
                false
            })
        })
        .collect();
    assert_eq!(check(), [(0, 0), (1, 0), (2, 0)]);

    store.set(1);
    assert_eq!(check(), [(0, 1), (1, 1), (2, 1)]);

    store.set(2);
    assert_eq!(check(), [(0, 2), (1, 2), (2, 2)]);
    assert_eq!(store.listener_count(), 3);
    drop(waits);
}

#[test]
fn test_satisfied_wait_resolves_immediately() {
    let store = Store::new(5);
    let token = CancelToken::new();

    let wait = store.wait(&token, |value| *value > 3);
    assert!(wait.is_immediate());
    assert_eq!(store.listener_count(), 0);

    let mut wait = task::spawn(wait);
    assert_ready_eq!(wait.poll(), Ok(5));
}

#[test]
fn test_cancelled_token_fails_without_registering() {
    let store = Store::new(0);
    let token = CancelToken::new();
    token.cancel();
    let calls = Counter::new();

    let wait = {
        let calls = calls.clone();
        store.wait(&token, move |value| {
            calls.hit();
            *value == 1
        })
    };
    assert!(wait.is_immediate());
    assert_eq!(store.listener_count(), 0);

    store.set(1);
    store.set(2);
    assert_eq!(calls.get(), 0);

    let mut wait = task::spawn(wait);
    assert_ready_eq!(wait.poll(), Err(Cancelled));
}

#[test]
fn test_pending_wait_resolves_on_first_match() {
    let store = Store::new(0);
    let token = CancelToken::new();
    let mut wait = task::spawn(store.wait(&token, |value| *value % 2 == 1 && *value > 1));

    assert_pending!(wait.poll());
    assert_eq!(store.listener_count(), 1);

    store.set(1);
    store.set(2);
    assert!(!wait.is_woken());
    assert_pending!(wait.poll());

    store.set(3);
    assert!(wait.is_woken());
    store.set(5);
    assert_ready_eq!(wait.poll(), Ok(3));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_cancel_while_pending() {
    let store = Store::new("idle");
    let token = CancelToken::new();
    let mut wait = task::spawn(store.wait(&token, |value| *value == "done"));

    assert_pending!(wait.poll());
    token.cancel();
    assert!(wait.is_woken());
    assert_ready_eq!(wait.poll(), Err(Cancelled));
    assert_eq!(store.listener_count(), 0);

    // satisfying the condition afterwards changes nothing
    store.set("done");
}

#[test]
fn test_cancel_after_resolution_is_ignored() {
    let store = Store::new(0);
    let token = CancelToken::new();
    let mut wait = task::spawn(store.wait(&token, |value| *value == 1));

    store.set(1);
    token.cancel();
    assert_ready_eq!(wait.poll(), Ok(1));
}

#[test]
fn test_concurrent_waits_are_independent() {
    let store = Store::new(0);
    let token_a = CancelToken::new();
    let token_b = CancelToken::new();
    let token_c = CancelToken::new();

    let mut a = task::spawn(store.wait(&token_a, |value| *value == 1));
    let mut b = task::spawn(store.wait(&token_b, |value| *value == 2));
    let mut c = task::spawn(store.wait(&token_c, |value| *value == 2));
    assert_eq!(store.listener_count(), 3);

    store.set(1);
    assert_ready_eq!(a.poll(), Ok(1));
    assert_pending!(b.poll());
    assert_pending!(c.poll());

    token_b.cancel();
    assert_ready_eq!(b.poll(), Err(Cancelled));
    assert_pending!(c.poll());
    assert_eq!(store.listener_count(), 1);

    store.set(2);
    assert_ready_eq!(c.poll(), Ok(2));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_shared_token_cancels_every_wait() {
    let store = Store::new(0);
    let token = CancelToken::new();

    let mut a = task::spawn(store.wait(&token, |value| *value == 1));
    let mut b = task::spawn(store.wait(&token, |value| *value == 2));

    token.cancel();
    assert_ready_eq!(a.poll(), Err(Cancelled));
    assert_ready_eq!(b.poll(), Err(Cancelled));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_child_token_cancellation() {
    let store = Store::new(0);
    let scope = CancelToken::new();

    let mut wait = task::spawn(store.wait(&scope.child(), |value| *value == 1));
    assert_pending!(wait.poll());

    scope.cancel();
    assert_ready_eq!(wait.poll(), Err(Cancelled));
}

#[test]
fn test_dropping_wait_deregisters() {
    let store = Store::new(0);
    let token = CancelToken::new();

    let wait = store.wait(&token, |value| *value == 1);
    assert_eq!(store.listener_count(), 1);

    drop(wait);
    assert_eq!(store.listener_count(), 0);
    store.set(1);
}

#[derive(Clone, Debug, PartialEq)]
enum Status {
    Loading,
    Ready(String),
    Failed,
}

#[test]
fn test_wait_map_narrows() {
    let store = Store::new(Status::Loading);
    let token = CancelToken::new();

    let mut ready = task::spawn(store.wait_map(&token, |status| match status {
        Status::Ready(body) => Some(body.clone()),
        _ => None,
    }));
    assert_pending!(ready.poll());

    store.set(Status::Failed);
    assert_pending!(ready.poll());

    store.set(Status::Ready("hello".to_string()));
    assert_ready_eq!(ready.poll(), Ok("hello".to_string()));
}

#[test]
fn test_nested_set_never_exposes_superseded_value() {
    let store = Store::new(0);
    let token = CancelToken::new();
    let (record, check) = change_watcher::<i32>();

    // bumps 1 to 2 from inside the notification pass
    let mut bump = {
        let store = store.clone();
        task::spawn(store.clone().wait(&token, move |value| {
            if *value == 1 {
                store.set(2);
            }
            *value == 2
        }))
    };
    let _observer = store.wait(&token, move |value| {
        record(*value);
        false
    });
    assert_eq!(check(), [0]);

    store.set(1);
    assert_ready_eq!(bump.poll(), Ok(2));
    assert_eq!(store.value(), 2);
    // after the nested write, the rest of the outer pass sees 2 as well, never the replaced 1
    assert_eq!(check(), [2, 2]);
    assert_eq!(store.listener_count(), 1);
}

#[test]
fn test_reentrant_set_does_not_resolve_with_replaced_value() {
    let store = Store::new(0);
    let token = CancelToken::new();

    let bump = {
        let store = store.clone();
        store.clone().wait(&token, move |value| {
            if *value == 1 {
                store.set(2);
            }
            false
        })
    };
    let mut one = task::spawn(store.wait(&token, |value| *value == 1));

    store.set(1);
    assert_eq!(store.value(), 2);
    assert_pending!(one.poll());

    drop(bump);
    store.set(1);
    assert_ready_eq!(one.poll(), Ok(1));
}

#[test]
fn test_panicking_condition_interrupts_pass() {
    let store = Store::new(0);
    let token = CancelToken::new();
    let (record, check) = change_watcher::<i32>();

    let _fragile = store.wait(&token, |value| {
        if *value == 5 {
            panic!("condition failed on {value}");
        }
        false
    });
    let _observer = store.wait(&token, move |value| {
        record(*value);
        false
    });
    assert_eq!(check(), [0]);

    let result = catch_unwind(AssertUnwindSafe(|| store.set(5)));
    assert!(result.is_err());
    assert_eq!(store.value(), 5);
    assert_eq!(check(), [] as [i32; 0]);
    assert_eq!(store.listener_count(), 2);

    store.set(6);
    assert_eq!(check(), [6]);
}

#[test]
fn test_update_and_read_handle() {
    let store = Store::new(10);
    let reader = store.read();
    let token = CancelToken::new();

    let mut wait = task::spawn(reader.wait(&token, |value| *value == 12));
    store.update(|value| value + 1);
    assert_eq!(reader.value(), 11);
    assert_pending!(wait.poll());

    store.update(|value| value + 1);
    assert_ready_eq!(wait.poll(), Ok(12));
    assert_eq!(reader.listener_count(), 0);
    assert_eq!(format!("{reader}"), "12");

    // an update producing an equal value is ignored like any equal write
    let calls = Counter::new();
    let _wait = {
        let calls = calls.clone();
        reader.wait(&token, move |_| {
            calls.hit();
            false
        })
    };
    store.update(|value| *value);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_wait_across_tasks() {
    init_tracing();
    let store = Store::new(0u32);
    let token = CancelToken::new();

    let waiter = tokio::spawn(store.read().wait(&token, |value| *value >= 3));
    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for n in 1..=5 {
                store.set(n);
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    assert_eq!(waiter.await.unwrap(), Ok(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_with_parallel_writer() {
    let store = Store::new(0u64);
    let token = CancelToken::new();

    let waits: Vec<_> = (1..=10u64).map(|target| tokio::spawn(store.wait(&token, move |value| *value >= target * 10))).collect();

    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for n in 1..=100 {
                store.set(n);
            }
        })
    };
    writer.join().unwrap();

    for (index, wait) in waits.into_iter().enumerate() {
        let target = (index as u64 + 1) * 10;
        let resolved = wait.await.unwrap().unwrap();
        assert!(resolved >= target);
    }
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_cancel_from_another_task() {
    let store = Store::new(0);
    let token = CancelToken::new();

    let wait = store.wait(&token, |value| *value == 1);
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            token.cancel();
        })
    };

    assert_eq!(wait.await, Err(Cancelled));
    canceller.await.unwrap();
    assert_eq!(store.listener_count(), 0);
}
