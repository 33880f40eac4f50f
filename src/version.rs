/// This process's own version, surfaced by the `/version` endpoint. Not to
/// be confused with [`crate::version_probe`], which probes a *supervised
/// child* process.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build identifier, normally stamped by CI via the `CLUSTERMIND_BUILD`
/// environment variable at compile time (e.g. a git describe string).
pub const BUILD: &str = match option_env!("CLUSTERMIND_BUILD") {
    Some(build) => build,
    None => "unknown",
};
