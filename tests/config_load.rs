use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use ppe_sentinel::{ConfigError, SentinelConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PPE_CONFIG",
        "PPE_INPUT_PATH",
        "PPE_OUTPUT_PATH",
        "PPE_CONFIDENCE_THRESHOLD",
        "PPE_VIOLATION_LABELS",
        "PPE_COOLDOWN_SECS",
        "PPE_TELEGRAM_BOT_TOKEN",
        "PPE_TELEGRAM_CHAT_ID",
    ] {
        std::env::remove_var(key);
    }
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load defaults");
    assert_eq!(cfg.detection.backend, "stub");
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.violation_labels.sorted(), vec!["no-helmet", "no-vest"]);
    assert_eq!(cfg.alerts.cooldown, Duration::from_secs(30));
    assert!(cfg.alerts.save_screenshots);
    assert_eq!(cfg.video.input_path, "stub://demo");
    assert!(cfg.video.save_output_video);
    assert!(!cfg.telegram.enable_alerts);
}

#[test]
fn loads_toml_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = toml_file(
        r#"
        [detection]
        confidence_threshold = 0.35

        [violations]
        violation_labels = ["no-helmet", "no-vest", "no-mask"]

        [alerts]
        cooldown_seconds = 12.5
        save_screenshots = false

        [video]
        input_path = "site/cam1.mp4"
        output_path = "runs"
        fps = 25.0
        max_frames = 500

        [telegram]
        enable_alerts = true
        bot_token = "123:file-token"
        chat_id = "-1001"
        "#,
    );

    std::env::set_var("PPE_CONFIG", file.path());
    std::env::set_var("PPE_COOLDOWN_SECS", "45");
    std::env::set_var("PPE_TELEGRAM_CHAT_ID", "-2002");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.35);
    assert_eq!(cfg.violation_labels.len(), 3);
    assert!(cfg.violation_labels.contains("no-mask"));
    assert_eq!(cfg.alerts.cooldown, Duration::from_secs(45));
    assert!(!cfg.alerts.save_screenshots);
    assert_eq!(cfg.video.input_path, "site/cam1.mp4");
    assert_eq!(cfg.video.output_path, std::path::PathBuf::from("runs"));
    assert_eq!(cfg.video.fps, 25.0);
    assert_eq!(cfg.video.max_frames, Some(500));
    assert_eq!(cfg.telegram.bot_token.as_deref(), Some("123:file-token"));
    assert_eq!(cfg.telegram.chat_id.as_deref(), Some("-2002"));
    assert!(!format!("{:?}", cfg.telegram).contains("file-token"));

    clear_env();
}

#[test]
fn json_files_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    file.write_all(br#"{"violations": {"violation_labels": ["no-gloves"]}}"#)
        .expect("write config");

    let cfg = SentinelConfig::load_from(Some(file.path())).expect("load json");
    assert_eq!(cfg.violation_labels.sorted(), vec!["no-gloves"]);
}

#[test]
fn env_label_list_replaces_file_labels() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PPE_VIOLATION_LABELS", " no-goggles , no-vest ,");
    let cfg = SentinelConfig::load_from(None).expect("load config");
    assert_eq!(cfg.violation_labels.sorted(), vec!["no-goggles", "no-vest"]);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let empty_labels = toml_file("[violations]\nviolation_labels = []\n");
    assert!(matches!(
        SentinelConfig::load_from(Some(empty_labels.path())),
        Err(ConfigError::EmptyViolationLabels)
    ));

    let bad_threshold = toml_file("[detection]\nconfidence_threshold = 1.5\n");
    assert!(matches!(
        SentinelConfig::load_from(Some(bad_threshold.path())),
        Err(ConfigError::Invalid { .. })
    ));

    let telegram_without_token = toml_file("[telegram]\nenable_alerts = true\nchat_id = \"1\"\n");
    assert!(SentinelConfig::load_from(Some(telegram_without_token.path())).is_err());

    let broken = toml_file("[alerts\ncooldown_seconds = 1");
    assert!(matches!(
        SentinelConfig::load_from(Some(broken.path())),
        Err(ConfigError::Parse { .. })
    ));

    std::env::set_var("PPE_CONFIDENCE_THRESHOLD", "high");
    assert!(SentinelConfig::load_from(None).is_err());

    clear_env();
}

#[test]
fn out_of_range_numbers_fail_as_config_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let huge_cooldown = toml_file("[alerts]\ncooldown_seconds = 1e20\n");
    assert!(matches!(
        SentinelConfig::load_from(Some(huge_cooldown.path())),
        Err(ConfigError::Invalid {
            key: "alerts.cooldown_seconds",
            ..
        })
    ));

    let tiny_fps = toml_file("[video]\nfps = 1e-20\n");
    assert!(matches!(
        SentinelConfig::load_from(Some(tiny_fps.path())),
        Err(ConfigError::Invalid { key: "video.fps", .. })
    ));

    std::env::set_var("PPE_COOLDOWN_SECS", "1e300");
    assert!(matches!(
        SentinelConfig::load_from(None),
        Err(ConfigError::Invalid {
            key: "PPE_COOLDOWN_SECS",
            ..
        })
    ));

    clear_env();
}

#[test]
fn missing_file_is_a_read_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        SentinelConfig::load_from(Some(missing.as_path())),
        Err(ConfigError::Read { .. })
    ));
}
