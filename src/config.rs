use once_cell::sync::Lazy;

/// Shared secret used to verify billing webhook signatures. Must be set via
/// the `BILLING_WEBHOOK_SECRET` env variable.
pub static BILLING_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_WEBHOOK_SECRET").expect("BILLING_WEBHOOK_SECRET must be set")
});

/// Bearer token expected from the external cron trigger. Must be set via the
/// `CRON_SECRET` env variable.
pub static CRON_SECRET: Lazy<String> =
    Lazy::new(|| std::env::var("CRON_SECRET").expect("CRON_SECRET must be set"));

/// Bearer token expected from the trusted transcription/chat collaborators on
/// all `/api` routes. Must be set via the `SERVICE_API_TOKEN` env variable.
pub static SERVICE_API_TOKEN: Lazy<String> =
    Lazy::new(|| std::env::var("SERVICE_API_TOKEN").expect("SERVICE_API_TOKEN must be set"));

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// key: digest-config -> sweep cadence. A cadence coarser than 60s can skip an
/// account's exact-minute target for the day; 60s is the operational contract.
pub static DIGEST_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("DIGEST_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(60)
});

/// key: digest-config -> per-item preview bound in the rendered digest.
pub static DIGEST_PREVIEW_CHARS: Lazy<usize> = Lazy::new(|| {
    std::env::var("DIGEST_PREVIEW_CHARS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(100)
});

/// Base URL of the notifier endpoint (message delivery to end users).
pub static NOTIFIER_BASE_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("NOTIFIER_BASE_URL"));

/// Credential presented to the notifier endpoint.
pub static NOTIFIER_TOKEN: Lazy<Option<String>> = Lazy::new(|| read_optional_env("NOTIFIER_TOKEN"));

/// Base URL of the billing provider API. Defaults to the hosted provider.
pub static BILLING_API_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("BILLING_API_BASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "https://api.stripe.com".to_string())
});

/// Secret API key for the billing provider.
pub static BILLING_API_KEY: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_API_KEY"));

/// Hosted checkout link handed to accounts with no provider record yet.
pub static BILLING_PAYMENT_LINK: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_PAYMENT_LINK"));

/// Return URL attached to provider portal sessions.
pub static BILLING_PORTAL_RETURN_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("BILLING_PORTAL_RETURN_URL"));

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
