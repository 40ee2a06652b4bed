//! Build identity: crate version plus the git and build stamps that
//! `build.rs` exports through vergen.

/// Value of a build-time stamp, `"unknown"` when the build had no git or
/// vergen was skipped.
macro_rules! stamp {
    ($var:literal) => {
        match option_env!($var) {
            Some(value) => value,
            None => "unknown",
        }
    };
}

/// Crate version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Branch checked out when the binary was built.
pub const GIT_BRANCH: &str = stamp!("VERGEN_GIT_BRANCH");

/// Commit the binary was built from.
pub const GIT_SHA: &str = stamp!("VERGEN_GIT_SHA");

/// RFC 3339 build time.
pub const BUILD_TIMESTAMP: &str = stamp!("VERGEN_BUILD_TIMESTAMP");

/// True when the build included uncommitted changes.
pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// First seven characters of [`GIT_SHA`].
pub fn short_sha() -> &'static str {
    GIT_SHA.get(..7).unwrap_or(GIT_SHA)
}

/// `PKG_VERSION+branch.sha`, with `.dirty` appended for uncommitted builds,
/// e.g. `0.1.0+main.3f9c2ab`.
pub fn version_string() -> String {
    let mut version = format!("{PKG_VERSION}+{GIT_BRANCH}.{}", short_sha());
    if git_dirty() {
        version.push_str(".dirty");
    }
    version
}

/// Report for `--version`: the version string, then the full commit and
/// the build time on their own lines.
pub fn long_version() -> String {
    format!(
        "{}\ngit commit: {GIT_SHA}\nbuilt:      {BUILD_TIMESTAMP}",
        version_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_layout() {
        let version = version_string();
        let expected = format!("{PKG_VERSION}+{GIT_BRANCH}.{}", short_sha());
        assert!(version.starts_with(&expected), "{version}");
        assert_eq!(version.ends_with(".dirty"), git_dirty(), "{version}");
    }

    #[test]
    fn short_sha_is_a_prefix() {
        assert!(short_sha().len() <= 7);
        assert!(GIT_SHA.starts_with(short_sha()));
    }

    #[test]
    fn long_version_lists_commit_and_build_time() {
        let report = long_version();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 3, "{report}");
        assert_eq!(lines[0], version_string());
        assert!(lines[1].ends_with(GIT_SHA));
        assert!(lines[2].ends_with(BUILD_TIMESTAMP));
    }
}
