// src/docker/host.rs

//! Host-side lookups used while resolving container configuration.

use std::collections::BTreeMap;

/// The host environment as a plain string map.
pub fn host_environment() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Resolve a container's configured environment against the host map.
///
/// Values of the form `"$NAME"` are replaced with the host variable `NAME`;
/// a missing host variable resolves to the empty string. Everything else is
/// passed through literally.
pub fn resolve_environment(
    configured: &BTreeMap<String, String>,
    host: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    configured
        .iter()
        .map(|(key, value)| {
            let resolved = match value.strip_prefix('$') {
                Some(var) => host.get(var).cloned().unwrap_or_default(),
                None => value.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

/// `uid:gid` of the invoking user, for `run_as_current_user` containers.
///
/// Read from `/proc/self`; returns `None` on platforms without procfs.
pub fn current_user_spec() -> Option<String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata("/proc/self").ok()?;
        Some(format!("{}:{}", meta.uid(), meta.gid()))
    }

    #[cfg(not(unix))]
    {
        None
    }
}
