//! Connection profiles: load/save a simple JSON mapping of profile name -> { url }
//! Stored under the XDG config dir: $XDG_CONFIG_HOME/clouddeck/profiles.json
//! (fallback ~/.config/clouddeck/profiles.json)

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProfileEntry {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    pub version: u32,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("clouddeck")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clouddeck")
    }
}

pub fn profiles_path() -> PathBuf {
    config_dir().join("profiles.json")
}

pub fn load_profiles() -> ProfilesFile {
    let path = profiles_path();
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ProfilesFile::default(),
    }
}

pub fn save_profiles(p: &ProfilesFile) -> std::io::Result<()> {
    let path = profiles_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(p)?;
    fs::write(path, data)
}

pub enum ResolveProfile {
    /// Use the provided runtime URL (not yet persisted).
    Direct(String),
    /// Loaded from an existing profile entry.
    Loaded(String),
    /// No URL given: the caller should offer these profile names.
    Select(Vec<String>),
    /// Named profile does not exist yet.
    Missing(String),
    /// Nothing to go on.
    None,
}

pub struct ProfileRequest {
    pub profile_name: Option<String>,
    pub url: Option<String>,
}

impl ProfileRequest {
    pub fn resolve(self, pf: &ProfilesFile) -> ResolveProfile {
        // Only a profile name given: try to load it.
        if self.url.is_none() {
            if let Some(name) = self.profile_name {
                return match pf.profiles.get(&name) {
                    Some(entry) => ResolveProfile::Loaded(entry.url.clone()),
                    None => ResolveProfile::Missing(name),
                };
            }
        }
        if let Some(url) = self.url {
            return ResolveProfile::Direct(url);
        }
        if pf.profiles.is_empty() {
            ResolveProfile::None
        } else {
            ResolveProfile::Select(pf.profiles.keys().cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(names: &[(&str, &str)]) -> ProfilesFile {
        let mut pf = ProfilesFile::default();
        for (name, url) in names {
            pf.profiles.insert(
                name.to_string(),
                ProfileEntry {
                    url: url.to_string(),
                },
            );
        }
        pf
    }

    #[test]
    fn resolve_prefers_explicit_url() {
        let pf = file_with(&[("prod", "ws://prod:4400/ws")]);
        let req = ProfileRequest {
            profile_name: Some("prod".into()),
            url: Some("ws://override:4400/ws".into()),
        };
        assert!(matches!(req.resolve(&pf), ResolveProfile::Direct(u) if u == "ws://override:4400/ws"));
    }

    #[test]
    fn resolve_loads_named_profile() {
        let pf = file_with(&[("prod", "ws://prod:4400/ws")]);
        let req = ProfileRequest {
            profile_name: Some("prod".into()),
            url: None,
        };
        assert!(matches!(req.resolve(&pf), ResolveProfile::Loaded(u) if u == "ws://prod:4400/ws"));

        let req = ProfileRequest {
            profile_name: Some("staging".into()),
            url: None,
        };
        assert!(matches!(req.resolve(&pf), ResolveProfile::Missing(n) if n == "staging"));
    }

    #[test]
    fn resolve_without_inputs_lists_or_gives_up() {
        let req = ProfileRequest {
            profile_name: None,
            url: None,
        };
        assert!(matches!(req.resolve(&ProfilesFile::default()), ResolveProfile::None));

        let pf = file_with(&[("a", "ws://a/ws"), ("b", "ws://b/ws")]);
        let req = ProfileRequest {
            profile_name: None,
            url: None,
        };
        assert!(matches!(req.resolve(&pf), ResolveProfile::Select(names) if names == vec!["a", "b"]));
    }

    #[test]
    fn profiles_file_round_trips_through_json() {
        let pf = file_with(&[("local", "ws://127.0.0.1:4400/ws")]);
        let text = serde_json::to_string(&pf).expect("serialize");
        let back: ProfilesFile = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back.profiles.get("local"), pf.profiles.get("local"));
    }
}
