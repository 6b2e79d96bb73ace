use read_aloud_lib::persistence::{load_settings, save_settings};
use read_aloud_lib::state::Settings;

#[test]
fn first_load_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ReadAloud").join("settings.json");

    let settings = load_settings(&path);
    assert_eq!(settings, Settings::default());
    assert!(path.exists());

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["voice"], "en_US-lessac-medium");
    assert_eq!(stored["output_directory"], "~/Downloads");
    assert_eq!(stored["shortcuts"]["speed_down"], "ctrl+shift+[");
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.voice = "en_GB-alan-medium".into();
    settings.speed = 1.75;
    settings.shortcuts.play_pause = "alt+space".into();
    save_settings(&path, &settings).unwrap();

    assert_eq!(load_settings(&path), settings);
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    assert_eq!(load_settings(&path), Settings::default());
}

#[test]
fn out_of_range_speed_resets_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"voice": "custom", "speed": 3.0}"#).unwrap();

    let settings = load_settings(&path);
    assert_eq!(settings.speed, 1.0);
    assert_eq!(settings.voice, "custom");
    assert_eq!(settings.playback.chunk_samples, 1024);
}
