use std::io::Write;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["tzquery"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_check_query_arguments() {
    let args = CliArgs::parse_from([
        "tzquery",
        "check-query",
        "transactions",
        "sender=tz1abc&limit=5",
        "--count",
    ]);

    match args.command.expect("check-query command") {
        Command::CheckQuery(check) => {
            assert_eq!(check.resource, "transactions");
            assert_eq!(check.query, "sender=tz1abc&limit=5");
            assert!(check.count);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn cache_settings_use_correct_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enable);
    assert_eq!(settings.cache.response_limit, 4096);
    assert_eq!(settings.cache.max_bytes, 64 * 1024 * 1024);
    assert_eq!(settings.cache.head_ttl_seconds, 1);
    assert!(settings.cache.coalesce_misses);
    assert_eq!(settings.cache.auto_consume_interval_ms, 1000);
    assert_eq!(settings.cache.consume_batch_limit, 100);
    assert_eq!(settings.query, QueryLimits::default());
    assert!(settings.data.fixtures.is_none());
}

#[test]
fn cache_settings_can_be_overridden_via_cli() {
    let args = CliArgs::parse_from([
        "tzquery",
        "serve",
        "--cache-enable=false",
        "--cache-response-limit",
        "10",
        "--cache-head-ttl-seconds",
        "3",
    ]);
    let Some(Command::Serve(serve)) = args.command else {
        panic!("wrong command parsed");
    };

    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&serve.overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enable);
    assert_eq!(settings.cache.response_limit, 10);
    assert_eq!(settings.cache.head_ttl_seconds, 3);
    assert_eq!(settings.cache.max_bytes, 64 * 1024 * 1024);
}

#[test]
fn zero_sized_cache_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_bytes = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "cache.max_bytes", .. }));
}

#[test]
fn default_limit_cannot_exceed_max_limit() {
    let mut raw = RawSettings::default();
    raw.query.default_limit = Some(500);
    raw.query.max_limit = Some(100);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "query.default_limit",
            ..
        }
    ));
}

#[test]
fn small_max_limit_pulls_default_limit_down() {
    let mut raw = RawSettings::default();
    raw.query.max_limit = Some(20);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.query.default_limit, 20);
}

#[test]
fn config_file_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[server]\npublic_port = 6100\n\n[query]\nmax_limit = 250\n\n[data]\nfixtures = \"fixtures/sample.json\""
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "tzquery",
        "--config-file",
        path.as_str(),
        "serve",
        "--server-public-port",
        "6200",
    ]);
    let settings = load(&args).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 6200);
    assert_eq!(settings.query.max_limit, 250);
    assert_eq!(
        settings.data.fixtures.as_deref(),
        Some(std::path::Path::new("fixtures/sample.json"))
    );
}

#[test]
fn invalid_log_level_names_the_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".into());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}
