//! Property-based tests for session tags and pool accounting.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use oradb_client::{ConnectionDescriptor, Credentials};
use oradb_pool::{GetMode, Pool, PoolConfig, PoolError, Tag};
use oradb_testing::MockConnector;
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

fn tag_pairs() -> impl Strategy<Value = std::collections::BTreeMap<String, String>> {
    btree_map("[A-Z][A-Z_]{0,11}", "[A-Za-z0-9_.+-]{0,12}", 0..6)
}

proptest! {
    #[test]
    fn prop_tag_display_parses_back(pairs in tag_pairs()) {
        let mut tag = Tag::new();
        for (name, value) in &pairs {
            tag.set(name.as_str(), value.as_str());
        }

        let reparsed: Tag = tag.to_string().parse().unwrap();
        prop_assert_eq!(&reparsed, &tag);
        prop_assert_eq!(reparsed.len(), pairs.len());
    }

    #[test]
    fn prop_tag_equality_ignores_order(pairs in tag_pairs()) {
        let forward: Tag = pairs
            .iter()
            .fold(Tag::new(), |tag, (n, v)| tag.with(n.as_str(), v.as_str()));
        let backward: Tag = pairs
            .iter()
            .rev()
            .fold(Tag::new(), |tag, (n, v)| tag.with(n.as_str(), v.as_str()));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_tag_last_value_wins(name in "[A-Z]{1,8}", first in "[a-z]{1,6}", second in "[a-z]{1,6}") {
        let tag: Tag = format!("{name}={first};{name}={second}").parse().unwrap();
        prop_assert_eq!(tag.len(), 1);
        prop_assert_eq!(tag.get(&name), Some(second.as_str()));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release(usize),
    Discard(usize),
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Acquire),
        3 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Discard),
        1 => Just(Op::Sweep),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pool_counts_stay_within_bounds(
        min in 0u32..4,
        extra in 1u32..4,
        increment in 1u32..4,
        ops in vec(op(), 1..40),
    ) {
        let max = min + extra;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async move {
            let connector = MockConnector::new();
            let pool = Pool::builder()
                .descriptor(ConnectionDescriptor::new("mockhost", "orclpdb1"))
                .credentials(Credentials::password("scott", "tiger"))
                .factory(connector.clone())
                .pool_config(
                    PoolConfig::new()
                        .min(min)
                        .max(max)
                        .increment(increment)
                        .get_mode(GetMode::NoWait),
                )
                .build()
                .await
                .unwrap();

            let mut held = Vec::new();
            for op in ops {
                match op {
                    Op::Acquire => match pool.acquire().await {
                        Ok(conn) => held.push(conn),
                        Err(PoolError::PoolExhausted { max: reported }) => {
                            prop_assert_eq!(reported, max);
                            prop_assert_eq!(held.len(), max as usize);
                        }
                        Err(e) => panic!("unexpected acquire error: {e}"),
                    },
                    Op::Release(i) if !held.is_empty() => {
                        let conn = held.swap_remove(i % held.len());
                        conn.release().unwrap();
                    }
                    Op::Discard(i) if !held.is_empty() => {
                        let conn = held.swap_remove(i % held.len());
                        pool.drop_connection(conn).await.unwrap();
                    }
                    Op::Sweep => {
                        pool.sweep().await;
                    }
                    Op::Release(_) | Op::Discard(_) => {}
                }
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }

                let status = pool.status();
                prop_assert_eq!(status.busy as usize, held.len());
                prop_assert!(status.busy <= status.opened);
                prop_assert!(status.opened + status.pending <= max);
                prop_assert_eq!(status.busy + status.idle, status.opened);
                prop_assert_eq!(u64::from(status.opened), connector.live());
            }
            Ok(())
        })?;
    }
}
