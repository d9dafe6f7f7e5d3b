// Copyright 2021 Datafuse Labs.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use common_base::tokio;
use common_group0_types::KvQuery;
use common_group0_types::KvResult;
use common_group0_types::StateId;
use common_tracing::tracing;
use pretty_assertions::assert_eq;

use crate::testing::new_test_node;
use crate::testing::sample_mutation;
use crate::testing::LoopbackLog;
use crate::testing::LoopbackPeers;
use crate::AbortHandle;
use crate::AbortSignal;
use crate::LogError;

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_single_node_linearization() -> anyhow::Result<()> {
    // - One enabled node.
    // - First operation observes the zero state and commits S1.
    // - A second operation observes S1.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let guard = tc.group0.start_operation(&abort).await?;
    assert_eq!(StateId::zero(), guard.observed_state_id());
    assert!(guard.holds_locks());

    let s1 = guard.new_state_id();
    assert!(s1 > StateId::zero());

    let cmd = tc
        .group0
        .prepare_schema_command(vec![sample_mutation("create table t")], &guard, "create t");
    assert_eq!(Some(StateId::zero()), cmd.prev_state_id);

    tc.group0.add_entry(cmd, guard, &abort).await?;

    // The merge arrived with the proposer's address as origin and the
    // state-id timestamp on the mutation.
    let merges = tc.schema.merges();
    assert_eq!(1, merges.len());
    assert_eq!(tc.config.broadcast_address, merges[0].0);
    assert_eq!(s1.write_timestamp(), merges[0].1[0].timestamp);

    tracing::info!("--- second operation observes S1");

    let guard2 = tc.group0.start_operation(&abort).await?;
    assert_eq!(s1, guard2.observed_state_id());
    assert!(guard2.new_state_id() > s1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_history_is_strictly_increasing() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let mut expected = vec![];
    for i in 0..4 {
        let guard = tc.group0.start_operation(&abort).await?;
        assert!(guard.new_state_id() > guard.observed_state_id());
        expected.push(guard.new_state_id());

        let cmd = tc.group0.prepare_schema_command(
            vec![sample_mutation(format!("alter {}", i))],
            &guard,
            "alter",
        );
        tc.group0.add_entry(cmd, guard, &abort).await?;
    }

    let recorded = tc.group0.inner.sm.history().range_keys()?;
    assert_eq!(expected, recorded, "history equals commit order");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_concurrent_proposers_same_observed_state() -> anyhow::Result<()> {
    // - Two nodes acquire guards at the same history state.
    // - Both submit; the first in log order wins.
    // - The second command is a no-op and its proposer gets
    //   concurrent-modification.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc0 = new_test_node(&log, &peers, 0, true).await?;
    let tc1 = new_test_node(&log, &peers, 1, true).await?;

    let abort = AbortSignal::never();

    let guard_a = tc0.group0.start_operation(&abort).await?;
    let guard_b = tc1.group0.start_operation(&abort).await?;

    assert_eq!(StateId::zero(), guard_a.observed_state_id());
    assert_eq!(StateId::zero(), guard_b.observed_state_id());

    let s_a = guard_a.new_state_id();

    let cmd_a =
        tc0.group0
            .prepare_schema_command(vec![sample_mutation("a wins")], &guard_a, "op a");
    let cmd_b =
        tc1.group0
            .prepare_schema_command(vec![sample_mutation("b loses")], &guard_b, "op b");

    tc0.group0.add_entry(cmd_a, guard_a, &abort).await?;

    let err = tc1
        .group0
        .add_entry(cmd_b, guard_b, &abort)
        .await
        .unwrap_err();
    assert_eq!(7, err.code(), "concurrent modification: {}", err);

    // Both nodes converged on S_a; the losing batch was merged nowhere.
    for tc in [&tc0, &tc1] {
        let guard = tc.group0.start_operation(&abort).await?;
        assert_eq!(s_a, guard.observed_state_id());

        let merges = tc.schema.merges();
        assert_eq!(1, merges.len());
        assert_eq!(b"a wins".to_vec(), merges[0].1[0].payload);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_one_guard_per_node() -> anyhow::Result<()> {
    // A second local proposer blocks on the operation lock until the first
    // guard drops.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let guard = tc.group0.start_operation(&abort).await?;

    let second = tokio::time::timeout(
        Duration::from_millis(100),
        tc.group0.start_operation(&abort),
    )
    .await;
    assert!(second.is_err(), "second guard must wait for the first");

    drop(guard);

    let guard2 = tc.group0.start_operation(&abort).await?;
    assert!(guard2.holds_locks());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_retry_on_dropped_entry() -> anyhow::Result<()> {
    // - The log drops the first attempt without committing.
    // - The submission engine retries and the command applies exactly once.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    log.inject_error(LogError::DroppedEntry);

    let guard = tc.group0.start_operation(&abort).await?;
    let s1 = guard.new_state_id();
    let cmd = tc
        .group0
        .prepare_schema_command(vec![sample_mutation("x")], &guard, "x");
    tc.group0.add_entry(cmd, guard, &abort).await?;

    assert_eq!(1, log.entries_len().await, "dropped attempt never committed");
    assert_eq!(1, tc.schema.merges().len());

    let guard = tc.group0.start_operation(&abort).await?;
    assert_eq!(s1, guard.observed_state_id());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_retry_on_commit_status_unknown() -> anyhow::Result<()> {
    // - The first attempt commits but the reply is lost.
    // - The retry commits a duplicate, which applies as a no-op thanks to
    //   the prev-state-id check; the submission still succeeds.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    log.inject_error(LogError::CommitStatusUnknown);

    let guard = tc.group0.start_operation(&abort).await?;
    let s1 = guard.new_state_id();
    let cmd = tc
        .group0
        .prepare_schema_command(vec![sample_mutation("x")], &guard, "x");
    tc.group0.add_entry(cmd, guard, &abort).await?;

    assert_eq!(2, log.entries_len().await, "the duplicate is in the log");
    assert_eq!(1, tc.schema.merges().len(), "but merged only once");

    let guard = tc.group0.start_operation(&abort).await?;
    assert_eq!(s1, guard.observed_state_id());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_update_then_select() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let cmd = tc.group0.prepare_kv_command(KvQuery::Update {
        key: b"k".to_vec(),
        new_value: b"v".to_vec(),
        value_condition: None,
    })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;
    assert_eq!(
        Some(KvResult::None),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    let cmd = tc.group0.prepare_kv_command(KvQuery::Select { key: b"k".to_vec() })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;
    assert_eq!(
        Some(KvResult::Select {
            value: Some(b"v".to_vec())
        }),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    // A result is taken at most once.
    assert_eq!(None, tc.group0.take_query_result(cmd.new_state_id));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_conditional_update_applies() -> anyhow::Result<()> {
    // Preexisting k -> v0; update to v1 if value = v0 applies.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let cmd = tc.group0.prepare_kv_command(KvQuery::Update {
        key: b"k".to_vec(),
        new_value: b"v0".to_vec(),
        value_condition: None,
    })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;

    let cmd = tc.group0.prepare_kv_command(KvQuery::Update {
        key: b"k".to_vec(),
        new_value: b"v1".to_vec(),
        value_condition: Some(b"v0".to_vec()),
    })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;

    assert_eq!(
        Some(KvResult::ConditionalUpdate {
            applied: true,
            previous_value: Some(b"v0".to_vec())
        }),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    let cmd = tc.group0.prepare_kv_command(KvQuery::Select { key: b"k".to_vec() })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;
    assert_eq!(
        Some(KvResult::Select {
            value: Some(b"v1".to_vec())
        }),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_conditional_update_mismatch() -> anyhow::Result<()> {
    // Preexisting k -> v0; update if value = v2 does not apply and the
    // select still yields v0.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let cmd = tc.group0.prepare_kv_command(KvQuery::Update {
        key: b"k".to_vec(),
        new_value: b"v0".to_vec(),
        value_condition: None,
    })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;

    let cmd = tc.group0.prepare_kv_command(KvQuery::Update {
        key: b"k".to_vec(),
        new_value: b"v1".to_vec(),
        value_condition: Some(b"v2".to_vec()),
    })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;

    assert_eq!(
        Some(KvResult::ConditionalUpdate {
            applied: false,
            previous_value: Some(b"v0".to_vec())
        }),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    let cmd = tc.group0.prepare_kv_command(KvQuery::Select { key: b"k".to_vec() })?;
    tc.group0.add_entry_unguarded(&cmd, &abort).await?;
    assert_eq!(
        Some(KvResult::Select {
            value: Some(b"v0".to_vec())
        }),
        tc.group0.take_query_result(cmd.new_state_id)
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_unguarded_submission_requires_unconditional_command() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    let mut cmd = tc.group0.prepare_kv_command(KvQuery::Select { key: b"k".to_vec() })?;
    cmd.prev_state_id = Some(StateId::zero());

    let err = tc
        .group0
        .add_entry_unguarded(&cmd, &abort)
        .await
        .unwrap_err();
    assert_eq!(12, err.code(), "bad arguments: {}", err);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_legacy_guard_without_group0() -> anyhow::Result<()> {
    // Core disabled: the guard owns no locks, observes the zero state and
    // still carries a fresh state id.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, false).await?;

    let abort = AbortSignal::never();

    let guard = tc.group0.start_operation(&abort).await?;
    assert!(!guard.holds_locks());
    assert_eq!(StateId::zero(), guard.observed_state_id());
    assert!(guard.new_state_id() > StateId::zero());

    // No locks: another guard can be issued while this one is alive.
    let guard2 = tc.group0.start_operation(&abort).await?;
    assert!(!guard2.holds_locks());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_abort_during_read_barrier_releases_operation_lock() -> anyhow::Result<()> {
    // - The node is paused, so the read barrier cannot complete.
    // - Aborting fails the operation and releases the operation lock.

    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    log.pause(tc.node).await;

    let (handle, signal) = AbortHandle::new_pair();

    let g0 = tc.group0.clone();
    let waiting = tokio::spawn(async move { g0.start_operation(&signal).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    let res = waiting.await?;
    let err = res.unwrap_err();
    assert_eq!(5, err.code(), "aborted: {}", err);

    // The operation lock is free again.
    log.resume(tc.node).await?;
    let abort = AbortSignal::never();
    let guard = tc.group0.start_operation(&abort).await?;
    assert!(guard.holds_locks());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_not_a_leader_is_fatal() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let abort = AbortSignal::never();

    log.inject_error(LogError::NotALeader);

    let guard = tc.group0.start_operation(&abort).await?;
    let cmd = tc
        .group0
        .prepare_schema_command(vec![sample_mutation("x")], &guard, "x");
    let err = tc.group0.add_entry(cmd, guard, &abort).await.unwrap_err();
    assert_eq!(11, err.code(), "internal: {}", err);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_second_coordinator_is_refused() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let log = LoopbackLog::new();
    let peers = LoopbackPeers::new();
    let tc = new_test_node(&log, &peers, 0, true).await?;

    let schema = crate::testing::RecordingMerger::new();
    let node = log.reserve().await;
    let handle = std::sync::Arc::new(log.handle(node));

    let err = crate::Group0::try_new(
        tc.config.clone(),
        handle,
        schema,
        peers.clone(),
        true,
    )
    .unwrap_err();
    assert_eq!(8, err.code(), "not coordinator: {}", err);

    Ok(())
}
