use crate::{AppConfig, JwtConfig};
use figment::Jail;
use secrecy::{ExposeSecret, Secret};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn write_default(jail: &mut Jail) -> figment::error::Result<()> {
    jail.create_file(
        "default.toml",
        &format!(
            r#"
            app_name = "carelink-test"

            [redis]
            url = "redis://127.0.0.1:6379"

            [jwt]
            secret = "{SECRET}"
            "#
        ),
    )?;
    Ok(())
}

#[test]
fn test_secret_redaction() {
    let jwt = JwtConfig {
        secret: Secret::new(SECRET.to_string()),
        expires_in: 60,
        refresh_expires_in: 600,
        issuer: "iss".into(),
        audience: "aud".into(),
    };
    let debug_output = format!("{:?}", jwt);
    assert!(!debug_output.contains(SECRET));
    assert!(debug_output.contains("REDACTED"));
}

#[test]
fn test_load_applies_defaults() {
    Jail::expect_with(|jail| {
        write_default(jail)?;

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.app_name, "carelink-test");
        assert_eq!(config.jwt.expires_in, 7200);
        assert_eq!(config.jwt.refresh_expires_in, 604800);
        assert_eq!(config.jwt.issuer, "carelink-auth");
        assert_eq!(config.session.user_cache_ttl_secs, 3600);
        assert_eq!(config.session.retry_attempts, 2);
        assert_eq!(config.password.min_length, 6);
        assert_eq!(config.redis.key_prefix, "carelink");
        assert!(config.is_development());
        Ok(())
    });
}

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.set_env("CARELINK_JWT__EXPIRES_IN", "900");
        jail.set_env("CARELINK_SESSION__IO_TIMEOUT_MS", "150");

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.jwt.expires_in, 900);
        assert_eq!(config.session.io_timeout_ms, 150);
        assert_eq!(config.jwt.secret.expose_secret(), SECRET);
        Ok(())
    });
}

#[test]
fn test_environment_file_is_merged() {
    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.create_file("production.toml", "app_env = \"production\"\n[telemetry]\nlog_level = \"warn\"")?;
        jail.set_env("APP_ENV", "production");

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert!(config.is_production());
        assert_eq!(config.telemetry.log_level, "warn");
        Ok(())
    });
}

#[test]
fn test_short_secret_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            "[redis]\nurl = \"redis://127.0.0.1\"\n[jwt]\nsecret = \"short\"",
        )?;

        assert!(AppConfig::load(".").is_err());
        Ok(())
    });
}

#[test]
fn test_access_ttl_must_be_shorter_than_refresh() {
    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.set_env("CARELINK_JWT__EXPIRES_IN", "604800");

        assert!(AppConfig::load(".").is_err());
        Ok(())
    });
}

#[test]
fn test_lifetimes_above_ceiling_rejected() {
    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.set_env("CARELINK_SESSION__EXPIRING_SOON_SECS", u64::MAX.to_string());

        let err = AppConfig::load(".").unwrap_err();
        assert!(err.to_string().contains("session.expiring_soon_secs"));
        Ok(())
    });

    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.set_env("CARELINK_JWT__REFRESH_EXPIRES_IN", "10000000000000");

        let err = AppConfig::load(".").unwrap_err();
        assert!(err.to_string().contains("jwt.refresh_expires_in"));
        Ok(())
    });
}

#[test]
fn test_lifetime_at_ceiling_accepted() {
    Jail::expect_with(|jail| {
        write_default(jail)?;
        jail.set_env("CARELINK_JWT__REFRESH_EXPIRES_IN", crate::MAX_LIFETIME_SECS.to_string());

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.jwt.refresh_expires_in, crate::MAX_LIFETIME_SECS);
        Ok(())
    });
}
