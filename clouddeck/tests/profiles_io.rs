//! Profile persistence against a real (temporary) config directory.

use clouddeck::profiles::{load_profiles, profiles_path, save_profiles, ProfileEntry, ProfilesFile};

// Single test in this binary: it owns XDG_CONFIG_HOME for its lifetime.
#[test]
fn profiles_survive_a_save_load_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    assert!(
        load_profiles().profiles.is_empty(),
        "fresh config dir starts with no profiles"
    );

    let mut pf = ProfilesFile::default();
    pf.profiles.insert(
        "local".to_string(),
        ProfileEntry {
            url: "ws://127.0.0.1:4400/ws".to_string(),
        },
    );
    save_profiles(&pf).expect("save profiles");
    assert!(profiles_path().exists());

    let back = load_profiles();
    assert_eq!(
        back.profiles.get("local").map(|e| e.url.as_str()),
        Some("ws://127.0.0.1:4400/ws")
    );

    // A corrupt file falls back to empty rather than failing.
    std::fs::write(profiles_path(), b"not json").expect("write garbage");
    assert!(load_profiles().profiles.is_empty());
}
