//! The `nfqlb` control CLI and data-plane loop: turns `nfqlb-common`'s pure
//! classifier into a runnable tool by giving it a persistence layer (shared
//! [`region`]), a packet transport ([`queue`]), and the six commands that
//! tie them together ([`commands`]).

pub mod commands;
pub mod queue;
pub mod region;

/// Shared by `region`'s and `commands`' test modules: both mutate
/// `XDG_RUNTIME_DIR` to sandbox the shared-region directory, so they need a
/// single process-wide lock between them, not one per module.
#[cfg(test)]
pub(crate) mod test_env {
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub fn with_isolated_runtime_dir<T>(f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: serialized by ENV_LOCK across this crate's test modules.
        unsafe {
            env::set_var("XDG_RUNTIME_DIR", dir.path());
        }
        let result = f();
        unsafe {
            env::remove_var("XDG_RUNTIME_DIR");
        }
        result
    }
}
