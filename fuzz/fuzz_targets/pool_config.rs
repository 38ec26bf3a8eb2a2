//! Fuzz pool configuration loading and validation.
//!
//! Arbitrary JSON must either fail to parse, fail validation with a
//! configuration error, or yield sizes that respect `1 <= min <= max`.

#![no_main]

use jdbc_driver_pool::{PoolConfig, PoolError};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<PoolConfig>(data) else {
        return;
    };

    match config.validate() {
        Ok(()) => {
            assert!(config.min_pool_size >= 1);
            assert!(config.max_pool_size >= config.min_pool_size);
            if config.keepalive.enabled {
                assert!(config.effective_max_idle().is_none());
            }
        }
        Err(PoolError::Config(_)) => {}
        Err(other) => panic!("validation returned a non-config error: {other}"),
    }
});
