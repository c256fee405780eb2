//! Thread attachment and monitor synchronization under contention
//!
//! Covers the attachment rules (operations require attach, nesting,
//! scoped attach) and the monitor contract: mutual exclusion between
//! native threads, recursion, and the release/acquire visibility of
//! writes made under the lock.

mod common;

use common::fixture_vm;
use hashi_bridge::{BridgeError, NativeValue, Reference};
use std::sync::mpsc;

#[test]
fn test_operations_require_attachment() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();
    let s = env.new_string("main only").unwrap();
    let global = env.new_global_ref(s).unwrap();

    let vm2 = vm.clone();
    let err = std::thread::spawn(move || {
        // No attach: the env cannot be obtained at all.
        match vm2.env() {
            Err(e) => e,
            Ok(_) => panic!("env on unattached thread"),
        }
    })
    .join()
    .unwrap();
    assert!(matches!(err, BridgeError::Unattached));

    // A handle leaked to an unattached thread is unusable too.
    let vm3 = vm.clone();
    std::thread::spawn(move || {
        let attached = vm3.with_attached(|env| env.get_string(global));
        assert_eq!(attached.unwrap(), "main only");
    })
    .join()
    .unwrap();
    env.delete_global_ref(global).unwrap();
}

#[test]
fn test_scoped_attach_detaches_at_end() {
    let vm = fixture_vm();
    let vm2 = vm.clone();
    std::thread::spawn(move || {
        vm2.with_attached(|env| {
            env.new_string("scoped")?;
            Ok(())
        })
        .unwrap();
        // Scope ended: no longer attached.
        assert!(matches!(vm2.env(), Err(BridgeError::Unattached)));
    })
    .join()
    .unwrap();
}

#[test]
fn test_monitor_excludes_other_threads() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let point = env.find_class("geom/Point").unwrap();
    let ctor = env.get_method_id(point, "<init>", "(II)V").unwrap();
    let p = env
        .new_object(point, ctor, &[NativeValue::Int(100), NativeValue::Int(0)])
        .unwrap();
    let x = env.get_field_id(point, "x", "I").unwrap();
    let shared = env.new_global_ref(p).unwrap();

    // Main thread holds the lock; the worker's increment must wait.
    env.monitor_enter(p).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let vm2 = vm.clone();
    let worker = std::thread::spawn(move || {
        let _attach = vm2.attach().unwrap();
        let env = vm2.env().unwrap();
        let point = env.find_class("geom/Point").unwrap();
        let x = env.get_field_id(point, "x", "I").unwrap();
        started_tx.send(()).unwrap();
        let guard = env.lock(shared).unwrap();
        let v = match env.get_field(shared, x).unwrap() {
            NativeValue::Int(v) => v,
            _ => unreachable!(),
        };
        env.set_field(shared, x, &NativeValue::Int(v + 1)).unwrap();
        guard.unlock().unwrap();
        v
    });

    started_rx.recv().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(30));

    // Increment under the lock; the worker has not run yet.
    match env.get_field(p, x).unwrap() {
        NativeValue::Int(v) => {
            assert_eq!(v, 100);
            env.set_field(p, x, &NativeValue::Int(v + 1)).unwrap();
        }
        _ => unreachable!(),
    }
    env.monitor_exit(p).unwrap();

    // The worker observed our write (101), then added its own.
    let seen = worker.join().unwrap();
    assert_eq!(seen, 101);
    assert_eq!(env.get_field(p, x).unwrap(), NativeValue::Int(102));
    env.delete_global_ref(shared).unwrap();
}

#[test]
fn test_monitor_recursion_and_pairing_errors() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();
    let s = env.new_string("locked").unwrap();
    let obj = s.resolve(&env).unwrap();

    env.monitor_enter(s).unwrap();
    env.monitor_enter(s).unwrap();
    env.monitor_exit(s).unwrap();
    assert!(obj.monitor().is_held_by(env.thread_token()));
    env.monitor_exit(s).unwrap();
    assert!(matches!(env.monitor_exit(s), Err(BridgeError::Monitor(_))));

    // Exit from a thread that never entered.
    let global = env.new_global_ref(s).unwrap();
    env.monitor_enter(s).unwrap();
    let vm2 = vm.clone();
    let err = std::thread::spawn(move || {
        let _attach = vm2.attach().unwrap();
        let env = vm2.env().unwrap();
        env.monitor_exit(global).unwrap_err()
    })
    .join()
    .unwrap();
    assert!(matches!(err, BridgeError::Monitor(_)));
    env.monitor_exit(s).unwrap();
    env.delete_global_ref(global).unwrap();
}

#[test]
fn test_contended_counter_stays_consistent() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let point = env.find_class("geom/Point").unwrap();
    let ctor = env.get_method_id(point, "<init>", "(II)V").unwrap();
    let p = env
        .new_object(point, ctor, &[NativeValue::Int(0), NativeValue::Int(0)])
        .unwrap();
    let shared = env.new_global_ref(p).unwrap();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let vm2 = vm.clone();
        workers.push(std::thread::spawn(move || {
            let _attach = vm2.attach().unwrap();
            let env = vm2.env().unwrap();
            let point = env.find_class("geom/Point").unwrap();
            let x = env.get_field_id(point, "x", "I").unwrap();
            for _ in 0..250 {
                let guard = env.lock(shared).unwrap();
                let v = match env.get_field(shared, x).unwrap() {
                    NativeValue::Int(v) => v,
                    _ => unreachable!(),
                };
                env.set_field(shared, x, &NativeValue::Int(v + 1)).unwrap();
                drop(guard);
            }
        }));
    }
    for w in workers {
        w.join().unwrap();
    }

    let x = env.get_field_id(point, "x", "I").unwrap();
    assert_eq!(env.get_field(p, x).unwrap(), NativeValue::Int(1000));
    env.delete_global_ref(shared).unwrap();
}
