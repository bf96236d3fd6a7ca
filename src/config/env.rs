use super::LandingConfig;

/// Apply `LANDING_*` environment variables on top of a loaded config.
pub fn apply_env_overrides(cfg: &mut LandingConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup. Unparseable values are ignored.
pub fn apply_overrides_from<F>(cfg: &mut LandingConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LANDING_BIND_ADDR") {
        cfg.server.bind_addr = v;
    }
    if let Some(v) = lookup("LANDING_MAX_BODY_BYTES") {
        if let Ok(n) = v.parse::<usize>() {
            cfg.server.max_body_bytes = n;
        }
    }
    if let Some(v) = lookup("LANDING_DATABASE_PATH") {
        cfg.store.database_path = v;
    }
    if let Some(v) = lookup("LANDING_RATE_LIMIT_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            cfg.rate_limit.enabled = b;
        }
    }
    if let Some(v) = lookup("LANDING_RATE_LIMIT_CAPACITY") {
        if let Ok(n) = v.parse::<u64>() {
            cfg.rate_limit.capacity = n;
        }
    }
    if let Some(v) = lookup("LANDING_RATE_LIMIT_WINDOW_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            cfg.rate_limit.window_seconds = n;
        }
    }
    if let Some(v) = lookup("LANDING_RATE_LIMIT_BACKEND") {
        if let Ok(backend) = v.parse() {
            cfg.rate_limit.backend = backend;
        }
    }
    if let Some(v) = lookup("LANDING_COUNTER_DATABASE_PATH") {
        cfg.rate_limit.counter_database_path = v;
    }
    if let Some(v) = lookup("LANDING_RATE_LIMIT_ON_STORE_ERROR") {
        if let Ok(policy) = v.parse() {
            cfg.rate_limit.on_store_error = policy;
        }
    }
}
