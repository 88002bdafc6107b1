use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes process environment mutation, which is unsafe under edition 2024.
pub struct EnvAdapter;

impl EnvAdapter {
    pub fn set_var(key: &str, value: &str) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unsafe {
            std::env::set_var(key, value);
        }
    }

    pub fn remove_var(key: &str) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unsafe {
            std::env::remove_var(key);
        }
    }

    /// Sets `key` until the returned guard drops, then restores the previous value.
    pub fn scoped(key: &str, value: &str) -> ScopedEnvVar {
        let previous = std::env::var(key).ok();
        Self::set_var(key, value);
        ScopedEnvVar {
            key: key.to_string(),
            previous,
        }
    }
}

pub struct ScopedEnvVar {
    key: String,
    previous: Option<String>,
}

impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => EnvAdapter::set_var(&self.key, value),
            None => EnvAdapter::remove_var(&self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn scoped_var_is_removed_on_drop() {
        let key = "AGENTDECK_TEST_ENV_ADAPTER";
        {
            let _scoped = EnvAdapter::scoped(key, "test_value");
            assert_eq!(std::env::var(key).unwrap(), "test_value");
        }
        assert!(std::env::var(key).is_err());
    }

    #[test]
    #[serial]
    fn scoped_var_restores_previous_value() {
        let key = "AGENTDECK_TEST_ENV_ADAPTER_RESTORE";
        EnvAdapter::set_var(key, "first");
        {
            let _scoped = EnvAdapter::scoped(key, "second");
            assert_eq!(std::env::var(key).unwrap(), "second");
        }
        assert_eq!(std::env::var(key).unwrap(), "first");
        EnvAdapter::remove_var(key);
    }
}
