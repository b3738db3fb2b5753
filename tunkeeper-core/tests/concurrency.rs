//! Concurrency tests for ConnectionManager
//!
//! Start and stop are hammered from several OS threads while scripted
//! workers connect, fail and drop on a multi-threaded runtime. Once things
//! settle, every worker still running must be the one a slot tracks.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use tunkeeper_core::testing::{Script, ScriptedWorkerFactory, eventually};
use tunkeeper_core::{
    ConnectionManager, LifecycleStatus, RecordingSink, ReconnectPolicy, SessionParameters,
};

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    Stop,
    Pause(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Start),
        2 => Just(Op::Stop),
        1 => (0u64..300).prop_map(Op::Pause),
    ]
}

/// Scripts consumed by the first workers; later ones use the default
fn script_strategy() -> impl Strategy<Value = Script> {
    prop_oneof![
        Just(Script::Succeed),
        Just(Script::Hang),
        Just(Script::Fail("refused".to_string())),
        Just(Script::SucceedThenDrop(Duration::from_millis(1))),
    ]
}

fn params() -> SessionParameters {
    SessionParameters::parse("10.0.0.1", "8000", "test").unwrap()
}

fn tracked_ids(manager: &ConnectionManager) -> BTreeSet<u64> {
    let snap = manager.snapshot();
    snap.connecting.into_iter().chain(snap.established).collect()
}

fn active_ids(factory: &ScriptedWorkerFactory) -> BTreeSet<u64> {
    factory.active_workers().into_iter().collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn run_interleaving(threads: Vec<Vec<Op>>, scripts: Vec<Script>, default_succeeds: bool) {
    let rt = runtime();
    let default_script = if default_succeeds {
        Script::Succeed
    } else {
        Script::Hang
    };
    let factory = Arc::new(ScriptedWorkerFactory::new(default_script));
    for script in scripts {
        factory.push(script);
    }
    let sink = Arc::new(RecordingSink::new());
    let manager = ConnectionManager::with_runtime(
        rt.handle().clone(),
        factory.clone(),
        sink.clone(),
        ReconnectPolicy::immediate(),
    );

    let joins: Vec<_> = threads
        .into_iter()
        .map(|ops| {
            let manager = manager.clone();
            thread::spawn(move || {
                for op in ops {
                    match op {
                        Op::Start => {
                            manager.start(params());
                        }
                        Op::Stop => manager.stop(),
                        Op::Pause(micros) => thread::sleep(Duration::from_micros(micros)),
                    }
                }
            })
        })
        .collect();
    for join in joins {
        join.join().unwrap();
    }

    // Every running worker is tracked, and every tracked worker is running
    rt.block_on(eventually(|| active_ids(&factory) == tracked_ids(&manager)));

    let snap = manager.snapshot();
    if snap.disconnect_requested {
        assert!(snap.is_idle());
    } else if sink.count(LifecycleStatus::Connecting) > 0 {
        assert!(!snap.is_idle(), "started manager lost its session: {snap:?}");
    }

    manager.shutdown();
    assert!(manager.snapshot().is_idle());
    assert_eq!(sink.last().unwrap().status, LifecycleStatus::Disconnected);
    rt.block_on(eventually(|| factory.active_workers().is_empty()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: no interleaving of start and stop leaves an untracked worker running.
    #[test]
    fn prop_no_orphaned_workers(
        threads in prop::collection::vec(prop::collection::vec(op_strategy(), 1..12), 2..5),
        scripts in prop::collection::vec(script_strategy(), 0..8),
        default_succeeds in any::<bool>(),
    ) {
        run_interleaving(threads, scripts, default_succeeds);
    }
}

#[test]
fn racing_starts_leave_exactly_one_live_worker() {
    let threads = (0..8).map(|_| vec![Op::Start; 20]).collect();
    run_interleaving(threads, Vec::new(), true);
}

#[test]
fn racing_start_and_stop_settle() {
    let threads = vec![
        vec![Op::Start; 50],
        vec![Op::Stop; 50],
        vec![Op::Start, Op::Pause(50), Op::Stop, Op::Start],
    ];
    run_interleaving(threads, vec![Script::Fail("refused".into()); 4], true);
}
