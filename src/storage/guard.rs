use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::storage::{LockManager, LockRef};

/// 进程内命名锁：同一组 key 同时只允许一个持有者。
///
/// `timeout == 0` 表示无限等待。
#[derive(Default)]
pub struct GuardLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
    next_ref: AtomicU64,
}

impl GuardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }
}

impl LockManager for GuardLocks {
    fn acquire(&self, timeout: Duration, keys: &[String]) -> Result<LockRef> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut held = self.held.lock();
        while keys.iter().any(|k| held.contains(k)) {
            match deadline {
                Some(at) => {
                    if self.released.wait_until(&mut held, at).timed_out()
                        && keys.iter().any(|k| held.contains(k))
                    {
                        return Err(Error::LockTimeout {
                            keys: keys.to_vec(),
                            timeout,
                        });
                    }
                }
                None => self.released.wait(&mut held),
            }
        }
        for k in keys {
            held.insert(k.clone());
        }
        Ok(LockRef {
            id: self.next_ref.fetch_add(1, Ordering::Relaxed) + 1,
            keys: keys.to_vec(),
        })
    }

    fn release(&self, lock: LockRef) {
        let mut held = self.held.lock();
        for k in &lock.keys {
            held.remove(k);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// RAII：离开作用域（包括 `?` 提前返回）时无条件释放
pub struct ScopedLock<'a> {
    locks: &'a dyn LockManager,
    lock: Option<LockRef>,
}

impl<'a> ScopedLock<'a> {
    pub fn acquire(locks: &'a dyn LockManager, timeout: Duration, key: String) -> Result<Self> {
        let lock = locks.acquire(timeout, &[key])?;
        Ok(Self {
            locks,
            lock: Some(lock),
        })
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            self.locks.release(lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn scoped_lock_releases_on_drop() {
        let locks = GuardLocks::new();
        {
            let _g = ScopedLock::acquire(&locks, Duration::ZERO, "k1".into()).unwrap();
            assert!(locks.is_held("k1"));
        }
        assert!(!locks.is_held("k1"));
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let locks = GuardLocks::new();
        let _g = ScopedLock::acquire(&locks, Duration::ZERO, "k1".into()).unwrap();
        let err = locks
            .acquire(Duration::from_millis(20), &["k1".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        // 不同 key 互不阻塞
        let other = locks.acquire(Duration::from_millis(20), &["k2".to_string()]).unwrap();
        locks.release(other);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(GuardLocks::new());
        let first = locks.acquire(Duration::ZERO, &["k".to_string()]).unwrap();

        let l2 = locks.clone();
        let waiter = std::thread::spawn(move || {
            let r = l2.acquire(Duration::from_secs(5), &["k".to_string()]).unwrap();
            l2.release(r);
        });

        std::thread::sleep(Duration::from_millis(20));
        locks.release(first);
        waiter.join().unwrap();
        assert!(!locks.is_held("k"));
    }
}
