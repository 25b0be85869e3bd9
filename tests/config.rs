use backbeat::config::{Config, Stuffing};

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.latency, 88_200);
    assert_eq!(config.audio_backend_latency_offset, 0);
    assert_eq!(config.audio_backend_buffer_desired_length, 6615);
    assert_eq!(config.tolerance, 88);
    assert_eq!(config.resyncthreshold, 2205);
    assert_eq!(config.packet_stuffing, Stuffing::Basic);
    assert_eq!(config.buffer_start_fill, 220);
    assert_eq!(config.timeout, 120);
    assert!(!config.dont_check_timeout);
    assert!(!config.statistics_requested);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_partial_json() {
    let config: Config = serde_json::from_str(
        r#"{"latency": 99400, "packet_stuffing": "soxr", "tolerance": 50}"#,
    )
    .unwrap();
    assert_eq!(config.latency, 99_400);
    assert_eq!(config.packet_stuffing, Stuffing::Soxr);
    assert_eq!(config.tolerance, 50);
    // Unnamed fields keep their defaults.
    assert_eq!(config.timeout, 120);
    assert_eq!(config.resyncthreshold, 2205);
}

#[test]
fn test_parse_basic_stuffing_value() {
    let config: Config = serde_json::from_str(r#"{"packet_stuffing": "basic"}"#).unwrap();
    assert_eq!(config.packet_stuffing, Stuffing::Basic);
}

#[test]
fn test_validate_rejects_oversized_start_fill() {
    let config = Config {
        buffer_start_fill: 1000,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_negative_values() {
    for config in [
        Config {
            latency: -1,
            ..Config::default()
        },
        Config {
            tolerance: -1,
            ..Config::default()
        },
        Config {
            resyncthreshold: -1,
            ..Config::default()
        },
        Config {
            buffer_start_fill: -1,
            ..Config::default()
        },
    ] {
        assert!(config.validate().is_err());
    }
}
