use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

const ENV_KEYS: [&str; 5] = [
    "LANSHARE_SERVER__HOST",
    "LANSHARE_SERVER__PORT",
    "LANSHARE_SERVER__MAX_UPLOAD_MB",
    "LANSHARE_RECEIVE__FOLDER",
    "LANSHARE_RECEIVE__COLLISION",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvRestore {
    xdg_config_home: Option<std::ffi::OsString>,
    saved: Vec<(&'static str, Option<std::ffi::OsString>)>,
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        if let Some(value) = self.xdg_config_home.take() {
            std::env::set_var("XDG_CONFIG_HOME", value);
        } else {
            std::env::remove_var("XDG_CONFIG_HOME");
        }

        for (key, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn write_config(temp_dir: &TempDir, contents: &str) {
    let app_config_dir = temp_dir.path().join("lanshare");
    std::fs::create_dir_all(&app_config_dir).expect("create config dir");
    std::fs::write(app_config_dir.join("config.toml"), contents).expect("write config");
}

/// Run `f` with a private config dir holding `config_toml` and no
/// `LANSHARE_*` variables set. Tests may set variables inside `f`.
pub fn with_config_env<T>(config_toml: &str, f: impl FnOnce() -> T) -> T {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().expect("temp dir");

    write_config(&temp_dir, config_toml);

    let restore = EnvRestore {
        xdg_config_home: std::env::var_os("XDG_CONFIG_HOME"),
        saved: ENV_KEYS
            .iter()
            .map(|key| (*key, std::env::var_os(key)))
            .collect(),
    };

    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }

    let result = f();
    drop(restore);
    result
}
