//! registry.rs — process-wide Instance lookup
//!
//! A guarded mapping keyed on `(pool_name, parent_device_name)` so that two
//! Instances can never share one backing device. Instances are held weakly:
//! the registry observes, it does not own (ownership stays with whoever
//! constructed the Instance), and a dead entry is reclaimed lazily on the
//! next lookup that finds its `Weak` no longer upgrades.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use crate::error::ErrorKind;
use crate::instance::Instance;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    pool_name: String,
    parent_device_name: String,
}

static REGISTRY: OnceLock<Mutex<HashMap<PoolKey, Weak<Instance>>>> = OnceLock::new();

fn map() -> &'static Mutex<HashMap<PoolKey, Weak<Instance>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a freshly constructed Instance under its pool identity.
/// Fails with `component-busy` if an entry already exists and its Instance
/// is still live.
pub fn insert(pool_name: &str, parent_device_name: &str, instance: &Arc<Instance>) -> Result<(), ErrorKind> {
    let key = PoolKey {
        pool_name: pool_name.to_string(),
        parent_device_name: parent_device_name.to_string(),
    };
    let mut guard = map().lock();
    if let Some(existing) = guard.get(&key) {
        if existing.upgrade().is_some() {
            return Err(ErrorKind::ComponentBusy);
        }
    }
    guard.insert(key, Arc::downgrade(instance));
    Ok(())
}

/// Look up a live Instance by pool identity.
pub fn lookup(pool_name: &str, parent_device_name: &str) -> Option<Arc<Instance>> {
    let key = PoolKey {
        pool_name: pool_name.to_string(),
        parent_device_name: parent_device_name.to_string(),
    };
    map().lock().get(&key).and_then(Weak::upgrade)
}

/// Remove an entry, e.g. once an Instance finishes teardown. No-op if the
/// entry is already gone.
pub fn remove(pool_name: &str, parent_device_name: &str) {
    let key = PoolKey {
        pool_name: pool_name.to_string(),
        parent_device_name: parent_device_name.to_string(),
    };
    map().lock().remove(&key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::engine::{completion_channel, MockEngineFacade};

    fn make_instance(pool: &str, device: &str) -> Arc<Instance> {
        let config = ConfigBuilder::new(pool, device).build();
        let (_tx, rx) = completion_channel();
        Instance::new(config, Arc::new(MockEngineFacade::new()), rx)
    }

    #[test]
    fn second_insert_under_live_instance_is_rejected() {
        let a = make_instance("registry-pool-a", "/dev/regtest-a");
        insert("registry-pool-a", "/dev/regtest-a", &a).unwrap();
        let b = make_instance("registry-pool-a", "/dev/regtest-a");
        let err = insert("registry-pool-a", "/dev/regtest-a", &b).unwrap_err();
        assert!(matches!(err, ErrorKind::ComponentBusy));
        remove("registry-pool-a", "/dev/regtest-a");
    }

    #[test]
    fn insert_succeeds_again_once_prior_instance_is_dropped() {
        {
            let a = make_instance("registry-pool-b", "/dev/regtest-b");
            insert("registry-pool-b", "/dev/regtest-b", &a).unwrap();
        }
        let b = make_instance("registry-pool-b", "/dev/regtest-b");
        insert("registry-pool-b", "/dev/regtest-b", &b).unwrap();
        remove("registry-pool-b", "/dev/regtest-b");
    }

    #[test]
    fn lookup_finds_registered_instance() {
        let a = make_instance("registry-pool-c", "/dev/regtest-c");
        insert("registry-pool-c", "/dev/regtest-c", &a).unwrap();
        assert!(lookup("registry-pool-c", "/dev/regtest-c").is_some());
        remove("registry-pool-c", "/dev/regtest-c");
        assert!(lookup("registry-pool-c", "/dev/regtest-c").is_none());
    }
}
