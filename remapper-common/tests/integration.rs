//! Integration tests for the remapper-common library.

use remapper_common::{
    ConfigFile, EV_KEY, EventKey, Format, InputEvent, KeyExprBuilder, LogFormat, LoggingConfig,
    ZenohConfig, decode, decode_auto, encode,
};
use serde::Deserialize;

#[test]
fn test_event_travels_over_both_formats() {
    let event = InputEvent::key(30, 1);

    let json_bytes = encode(&event, Format::Json).expect("JSON encode failed");
    let decoded: InputEvent = decode(&json_bytes, Format::Json).expect("JSON decode failed");
    assert_eq!(decoded.key_id(), EventKey::new(EV_KEY, 30));
    assert!(decoded.is_press());

    let cbor_bytes = encode(&event, Format::Cbor).expect("CBOR encode failed");
    let auto_decoded: InputEvent = decode_auto(&cbor_bytes).expect("Auto decode failed");
    assert_eq!(auto_decoded, event);
}

#[test]
fn test_capture_and_inject_keys_share_prefix() {
    let keys = KeyExprBuilder::new("lab/remapper").expect("valid prefix");

    let capture = keys.capture_key("AT Translated Set 2 keyboard");
    let inject = keys.inject_key("AT Translated Set 2 keyboard");

    assert_eq!(
        capture,
        "lab/remapper/devices/AT_Translated_Set_2_keyboard/capture"
    );
    assert_eq!(
        inject,
        "lab/remapper/targets/AT_Translated_Set_2_keyboard/inject"
    );
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSection {
    #[serde(default)]
    zenoh: ZenohConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl ConfigFile for ServiceSection {}

#[test]
fn test_config_file_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("service.json5");
    std::fs::write(
        &path,
        r#"{
            // comments are allowed in JSON5
            zenoh: { mode: "client", connect: ["tcp/10.0.0.2:7447"] },
            logging: { level: "warn", format: "json" },
        }"#,
    )
    .unwrap();

    let config = ServiceSection::load(&path).expect("config loads");
    assert_eq!(config.zenoh.mode, "client");
    assert_eq!(config.zenoh.connect, vec!["tcp/10.0.0.2:7447"]);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Json);
}
