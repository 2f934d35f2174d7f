use serde::Serialize;

/// Compile-time build information, reported on start-up
///  and by the `/_status/version` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub version: &'static str,
    pub package_version: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: option_env!("BUILD_PROFILE").unwrap_or("unknown"),
        build_features: option_env!("BUILD_FEATURES").unwrap_or("none"),
        version: option_env!("REPO_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")),
        package_version: env!("CARGO_PKG_VERSION"),
        build_timestamp: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        rust_version: option_env!("RUST_VERSION").unwrap_or("unknown"),
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cidstore {} ({}, profile: {}, features: {}, built {} with {})",
            self.package_version,
            self.version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version
        )
    }
}
