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
use common_base::GlobalSequence;
use common_group0_types::KvQuery;
use common_group0_types::KvResult;
use common_group0_types::StateId;
use pretty_assertions::assert_eq;

use crate::config::GroupConfig;
use crate::state_machine::StateMachine;

fn new_state_machine() -> anyhow::Result<StateMachine> {
    let temp_dir = tempfile::tempdir()?;
    common_group0_sled_store::init_temp_sled_db(temp_dir);

    let mut config = GroupConfig::empty();
    config.sled_tree_prefix = format!("ut-sm-{}-", GlobalSequence::next());
    config.no_sync = true;

    let sm = StateMachine::open(&config)?;
    Ok(sm)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_history_append_last_contains() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    assert_eq!(StateId::zero(), sm.history_last()?);

    let s1 = StateId::new_after(StateId::zero());
    let m1 = StateMachine::history_append_mutation(s1, "first", Duration::from_secs(3600));
    sm.apply_history_mutation(&m1).await?;

    assert_eq!(s1, sm.history_last()?);
    assert!(sm.history_contains(&s1)?);

    let s2 = StateId::new_after(s1);
    let m2 = StateMachine::history_append_mutation(s2, "second", Duration::from_secs(3600));
    sm.apply_history_mutation(&m2).await?;

    assert_eq!(s2, sm.history_last()?, "last moves to the newer id");
    assert!(sm.history_contains(&s1)?);
    assert!(sm.history_contains(&s2)?);
    assert!(!sm.history_contains(&StateId::new_after(s2))?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_history_records_increasing_sequence() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    // Appends issued in arbitrary wall order still read back sorted by
    // state-id order.
    let sm = new_state_machine()?;

    let a = StateId::from_parts(100, 7);
    let b = StateId::from_parts(100, 9);
    let c = StateId::from_parts(205, 1);

    for id in [c, a, b] {
        let m = StateMachine::history_append_mutation(id, "x", Duration::from_secs(1));
        sm.apply_history_mutation(&m).await?;
    }

    let ids = sm.history().range_keys()?;
    assert_eq!(vec![a, b, c], ids);
    assert_eq!(c, sm.history_last()?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_history_gc_pins_newest() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    let a = StateId::from_parts(1_000_000, 1);
    let b = StateId::from_parts(2_000_000, 1);
    let c = StateId::from_parts(3_000_000, 1);

    for id in [a, b, c] {
        let m = StateMachine::history_append_mutation(id, "x", Duration::from_secs(1));
        sm.apply_history_mutation(&m).await?;
    }

    // Far in the future: everything is expired, but the newest entry stays.
    let removed = sm.history_gc(1_000_000_000_000).await?;
    assert_eq!(2, removed);

    assert!(!sm.history_contains(&a)?);
    assert!(!sm.history_contains(&b)?);
    assert!(sm.history_contains(&c)?);
    assert_eq!(c, sm.history_last()?);

    // Before anything expires nothing is removed.
    let removed = sm.history_gc(0).await?;
    assert_eq!(0, removed);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_select_and_unconditional_update() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    let s1 = StateId::from_parts(500, 1);

    // Select against an absent partition.
    let res = sm
        .apply_kv_query(&KvQuery::Select { key: b"k".to_vec() }, &s1)
        .await?;
    assert_eq!(KvResult::Select { value: None }, res);

    // Unconditional upsert.
    let res = sm
        .apply_kv_query(
            &KvQuery::Update {
                key: b"k".to_vec(),
                new_value: b"v1".to_vec(),
                value_condition: None,
            },
            &s1,
        )
        .await?;
    assert_eq!(KvResult::None, res);

    let row = sm.kv_get(b"k")?.unwrap();
    assert_eq!(b"v1".to_vec(), row.value);
    assert_eq!(500, row.timestamp, "fresh cell takes the state-id timestamp");

    let res = sm
        .apply_kv_query(&KvQuery::Select { key: b"k".to_vec() }, &s1)
        .await?;
    assert_eq!(
        KvResult::Select {
            value: Some(b"v1".to_vec())
        },
        res
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_update_timestamp_always_advances() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    // A command with an older state-id timestamp than the existing cell
    // still produces a strictly greater cell timestamp.
    let sm = new_state_machine()?;

    let newer = StateId::from_parts(9_000, 1);
    sm.apply_kv_query(
        &KvQuery::Update {
            key: b"k".to_vec(),
            new_value: b"v1".to_vec(),
            value_condition: None,
        },
        &newer,
    )
    .await?;

    let older = StateId::from_parts(100, 1);
    sm.apply_kv_query(
        &KvQuery::Update {
            key: b"k".to_vec(),
            new_value: b"v2".to_vec(),
            value_condition: None,
        },
        &older,
    )
    .await?;

    let row = sm.kv_get(b"k")?.unwrap();
    assert_eq!(b"v2".to_vec(), row.value);
    assert_eq!(9_001, row.timestamp);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_conditional_update_applies() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    let s1 = StateId::from_parts(100, 1);
    sm.apply_kv_query(
        &KvQuery::Update {
            key: b"k".to_vec(),
            new_value: b"v0".to_vec(),
            value_condition: None,
        },
        &s1,
    )
    .await?;

    let s2 = StateId::from_parts(200, 1);
    let res = sm
        .apply_kv_query(
            &KvQuery::Update {
                key: b"k".to_vec(),
                new_value: b"v1".to_vec(),
                value_condition: Some(b"v0".to_vec()),
            },
            &s2,
        )
        .await?;

    assert_eq!(
        KvResult::ConditionalUpdate {
            applied: true,
            previous_value: Some(b"v0".to_vec())
        },
        res
    );

    let row = sm.kv_get(b"k")?.unwrap();
    assert_eq!(b"v1".to_vec(), row.value);
    assert_eq!(200, row.timestamp);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_conditional_update_mismatch_is_skipped() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    let s1 = StateId::from_parts(100, 1);
    sm.apply_kv_query(
        &KvQuery::Update {
            key: b"k".to_vec(),
            new_value: b"v0".to_vec(),
            value_condition: None,
        },
        &s1,
    )
    .await?;

    let s2 = StateId::from_parts(200, 1);
    let res = sm
        .apply_kv_query(
            &KvQuery::Update {
                key: b"k".to_vec(),
                new_value: b"v1".to_vec(),
                value_condition: Some(b"v2".to_vec()),
            },
            &s2,
        )
        .await?;

    assert_eq!(
        KvResult::ConditionalUpdate {
            applied: false,
            previous_value: Some(b"v0".to_vec())
        },
        res
    );

    let row = sm.kv_get(b"k")?.unwrap();
    assert_eq!(b"v0".to_vec(), row.value, "value unchanged");
    assert_eq!(100, row.timestamp, "timestamp unchanged");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kv_conditional_update_on_absent_partition_is_skipped() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let sm = new_state_machine()?;

    let s1 = StateId::from_parts(100, 1);
    let res = sm
        .apply_kv_query(
            &KvQuery::Update {
                key: b"nope".to_vec(),
                new_value: b"v1".to_vec(),
                value_condition: Some(b"v0".to_vec()),
            },
            &s1,
        )
        .await?;

    assert_eq!(
        KvResult::ConditionalUpdate {
            applied: false,
            previous_value: None
        },
        res
    );
    assert_eq!(None, sm.kv_get(b"nope")?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_state_machine_clean() -> anyhow::Result<()> {
    let (_log_guards, ut_span) = init_group0_ut!();
    let _ent = ut_span.enter();

    let temp_dir = tempfile::tempdir()?;
    common_group0_sled_store::init_temp_sled_db(temp_dir);

    let mut config = GroupConfig::empty();
    config.sled_tree_prefix = format!("ut-sm-clean-{}-", GlobalSequence::next());
    config.no_sync = true;

    {
        let sm = StateMachine::open(&config)?;
        let s1 = StateId::from_parts(7, 7);
        let m = StateMachine::history_append_mutation(s1, "x", Duration::from_secs(1));
        sm.apply_history_mutation(&m).await?;
        assert_eq!(s1, sm.history_last()?);
    }

    StateMachine::clean(&config)?;

    let sm = StateMachine::open(&config)?;
    assert_eq!(StateId::zero(), sm.history_last()?, "dropped with the tree");

    Ok(())
}
