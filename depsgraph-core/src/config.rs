//! Graph Configuration
//!
//! [`DepsgraphConfig`] is stored in each [`Graph`](crate::graph::Graph) and
//! survives rebuilds. It can be loaded from JSON or from the
//! `DEPSGRAPH_DEBUG` environment variable.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the environment variable read by [`DepsgraphConfig::from_env`].
pub const DEBUG_ENV: &str = "DEPSGRAPH_DEBUG";

bitflags! {
    /// Categories of `debug`-level tracing output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DebugFlags: u32 {
        const BUILD = 1 << 0;
        const TAG = 1 << 1;
        const EVAL = 1 << 2;
        const TIME = 1 << 3;
    }
}

impl DebugFlags {
    /// Parse a comma separated list such as `build,tag`. Unknown names are
    /// ignored; `all` enables every category.
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .fold(DebugFlags::empty(), |flags, name| {
                if name.eq_ignore_ascii_case("all") {
                    return DebugFlags::all();
                }
                flags | DebugFlags::from_name(&name.to_ascii_uppercase()).unwrap_or_else(DebugFlags::empty)
            })
    }
}

/// What the relation builder does with a key that does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderPolicy {
    /// Skip the relation.
    Never,
    /// Create placeholder nodes when the key names a data-block of the main
    /// database, skip the relation otherwise.
    #[default]
    KnownDataBlocks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsgraphConfig {
    pub placeholder_policy: PlaceholderPolicy,
    pub debug: DebugFlags,
    /// Order simultaneously ready operations by index rather than by the
    /// order they became ready.
    pub sort_evaluation_order: bool,
}

impl Default for DepsgraphConfig {
    fn default() -> Self {
        Self {
            placeholder_policy: PlaceholderPolicy::default(),
            debug: DebugFlags::empty(),
            sort_evaluation_order: true,
        }
    }
}

impl DepsgraphConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults, with debug categories taken from `DEPSGRAPH_DEBUG`.
    pub fn from_env() -> Self {
        let debug = std::env::var(DEBUG_ENV)
            .map(|value| DebugFlags::parse_list(&value))
            .unwrap_or_default();
        Self {
            debug,
            ..Self::default()
        }
    }

    pub fn debug_enabled(&self, category: DebugFlags) -> bool {
        self.debug.intersects(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_create_placeholders_for_known_ids() {
        let config = DepsgraphConfig::default();
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::KnownDataBlocks);
        assert!(config.sort_evaluation_order);
        assert!(config.debug.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DepsgraphConfig::from_json(r#"{"placeholder_policy": "never"}"#).unwrap();
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Never);
        assert!(config.sort_evaluation_order);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = DepsgraphConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::error::DepsgraphError::Config(_)));
    }

    #[test]
    fn debug_list_parsing() {
        assert_eq!(DebugFlags::parse_list("build, tag"), DebugFlags::BUILD | DebugFlags::TAG);
        assert_eq!(DebugFlags::parse_list("eval,bogus"), DebugFlags::EVAL);
        assert_eq!(DebugFlags::parse_list("all"), DebugFlags::all());
        assert!(DebugFlags::parse_list("").is_empty());
    }
}
