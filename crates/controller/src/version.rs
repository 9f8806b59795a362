//! Build version string.

/// Crate version plus git commit and tree state when known at build time.
pub fn version() -> String {
    format_version(
        env!("CARGO_PKG_VERSION"),
        option_env!("CERTWARDEN_GIT_COMMIT"),
        option_env!("CERTWARDEN_GIT_STATE"),
    )
}

pub fn format_version(version: &str, commit: Option<&str>, state: Option<&str>) -> String {
    let mut out = version.to_string();
    if let Some(commit) = commit.filter(|c| !c.is_empty()) {
        out.push('-');
        out.extend(commit.chars().take(8));
    }
    if let Some(state) = state.filter(|s| !s.is_empty() && *s != "clean") {
        out.push('-');
        out.push_str(state);
    }
    out
}
