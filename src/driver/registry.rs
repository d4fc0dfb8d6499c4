//! Process-wide registry of named drivers.
//!
//! The registry starts empty, entries are added only through
//! [`register_driver`], and nothing is ever removed. Registration is
//! idempotent: the name is checked under the lock before inserting, so
//! opening two clients against the same backend within one process never
//! re-registers (and never invokes the constructor a second time).

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::driver::{DriverConnection, SqlDriver};
use crate::error::{DriverError, SqlGatewayError};

static DRIVERS: LazyLock<Mutex<HashMap<String, Arc<dyn SqlDriver>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn drivers() -> std::sync::MutexGuard<'static, HashMap<String, Arc<dyn SqlDriver>>> {
    DRIVERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register a driver under `name`, constructing it only if the name is not
/// already taken. Returns whether a new entry was added.
pub fn register_driver<F>(name: &str, make: F) -> bool
where
    F: FnOnce() -> Arc<dyn SqlDriver>,
{
    let mut map = drivers();
    if map.contains_key(name) {
        return false;
    }
    map.insert(name.to_string(), make());
    true
}

/// Names of all registered drivers, in no particular order.
#[must_use]
pub fn driver_names() -> Vec<String> {
    drivers().keys().cloned().collect()
}

/// Resolve a registered driver and open a connection through it.
pub async fn open_named(
    name: &str,
    dsn: &str,
) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
    let driver = drivers().get(name).cloned();
    match driver {
        Some(driver) => driver.connect(dsn).await,
        None => Err(SqlGatewayError::Driver(DriverError::NotRegistered(
            name.to_string(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct DeadDriver;

    #[async_trait]
    impl SqlDriver for DeadDriver {
        async fn connect(
            &self,
            _dsn: &str,
        ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
            Err(SqlGatewayError::ConnectionFailed)
        }
    }

    #[test]
    fn registering_twice_is_a_noop() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        let make = || {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Arc::new(DeadDriver) as Arc<dyn SqlDriver>
        };

        assert!(register_driver("registry-test-dead", make));
        assert!(!register_driver("registry-test-dead", make));
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert!(
            driver_names()
                .iter()
                .any(|n| n == "registry-test-dead")
        );
    }

    #[tokio::test]
    async fn opening_an_unregistered_name_fails() {
        let Err(err) = open_named("registry-test-missing", "").await else {
            panic!("open of an unregistered name must fail");
        };
        assert!(matches!(
            err,
            SqlGatewayError::Driver(DriverError::NotRegistered(_))
        ));
    }
}
