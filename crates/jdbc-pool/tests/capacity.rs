//! Property tests for pool capacity accounting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use jdbc_driver_pool::{Pool, PoolConfig, PoolError};
use jdbc_testing::MockRuntime;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Reserve,
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Reserve), any::<usize>().prop_map(Op::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reserve_release_respects_max(
        min in 1u32..4,
        extra in 0u32..4,
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let max = min + extra;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let runtime = MockRuntime::new();
            let pool = Pool::new(
                PoolConfig::new("jdbc:h2:mem:prop").min_pool_size(min).max_pool_size(max),
                Arc::new(runtime.clone()),
            )
            .unwrap();
            pool.initialize().await.unwrap();

            let mut outstanding = Vec::new();
            for op in ops {
                match op {
                    Op::Reserve => match pool.reserve().await {
                        Ok(handle) => outstanding.push(handle),
                        Err(PoolError::Exhausted { .. }) => {
                            prop_assert_eq!(outstanding.len(), max as usize);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {e}"),
                    },
                    Op::Release(i) => {
                        if !outstanding.is_empty() {
                            let handle = outstanding.swap_remove(i % outstanding.len());
                            pool.release(handle).unwrap();
                        }
                    }
                }

                let status = pool.status().await.unwrap();
                prop_assert_eq!(status.reserved, outstanding.len());
                prop_assert!(status.total() <= max as usize);
                prop_assert!(runtime.connections().len() <= max as usize);
            }
            Ok(())
        })?;
    }
}
