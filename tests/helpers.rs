use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

fn env_lock() -> MutexGuard<'static, ()> {
    match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(g) => g,
        // A test that panicked while holding the lock must not wedge the rest.
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fresh, empty temp directory unique to this process and call.
#[allow(dead_code)]
pub fn unique_test_temp_dir(prefix: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_SEQ.fetch_add(1, Ordering::SeqCst);
    let dir = env::temp_dir().join(format!(
        "govlink-{prefix}-{}-{nanos}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create unique temp dir");
    dir
}

/// RAII guard for test-only env var mutation.
///
/// All mutations through this guard are serialized with a global lock;
/// mutations made elsewhere are not.
#[must_use]
pub struct EnvVarGuard {
    key: String,
    old: Option<OsString>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    #[allow(dead_code)]
    pub fn set<K: Into<String>, V: AsRef<OsStr>>(key: K, value: V) -> Self {
        let key = key.into();
        let lock = env_lock();
        let old = env::var_os(&key);

        // Env mutation is unsafe on recent toolchains; ENV_LOCK keeps it serialized.
        unsafe {
            env::set_var(&key, value);
        }

        Self {
            key,
            old,
            _lock: lock,
        }
    }

    #[allow(dead_code)]
    pub fn unset<K: Into<String>>(key: K) -> Self {
        let key = key.into();
        let lock = env_lock();
        let old = env::var_os(&key);

        unsafe {
            env::remove_var(&key);
        }

        Self {
            key,
            old,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.old {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }
}
