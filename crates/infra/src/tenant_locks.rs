//! Per-owner write serialization.
//!
//! Every mutating service call of a tenant runs while holding that tenant's
//! lock, so availability checks, stock decrements and read-model updates of
//! one owner never interleave. Different tenants never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kasaku_core::TenantId;

#[derive(Debug, Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock handle for `tenant_id`, created on first use.
    pub fn handle(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(tenant_id).or_default().clone()
    }
}

/// Block until `lock` is held.
///
/// The lock guards no data, so a poisoned lock is logged, cleared and taken.
pub fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("tenant lock was poisoned by a panicking writer; recovering");
        lock.clear_poison();
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tenant_shares_one_lock() {
        let locks = TenantLocks::new();
        let tenant = TenantId::new();
        let a = locks.handle(tenant);
        let b = locks.handle(tenant);
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.handle(TenantId::new());
        assert!(!Arc::ptr_eq(&a, &other));

        let _held = a.lock().unwrap();
        assert!(other.try_lock().is_ok());
        assert!(b.try_lock().is_err());
    }

    #[test]
    fn panicking_holder_does_not_lock_the_tenant_out() {
        let locks = TenantLocks::new();
        let tenant = TenantId::new();
        let lock = locks.handle(tenant);

        let crashed: std::thread::Result<()> = std::panic::catch_unwind(|| {
            let _guard = hold(&lock);
            panic!("writer crashed");
        });
        assert!(crashed.is_err());

        drop(hold(&locks.handle(tenant)));
        assert!(!lock.is_poisoned());
    }
}
