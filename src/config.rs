use std::collections::HashMap;
use std::env;

/// Built-in product map: LemonSqueezy product id -> internal product code.
/// `PRODUCT_MAP` entries from the environment extend or override these.
const DEFAULT_PRODUCT_MAP: &[(&str, &str)] = &[("738772", "fedDSP-PHAT")];

/// Process configuration, loaded once at startup and immutable afterwards.
///
/// Secrets are optional here on purpose: a missing secret answers 500 at
/// the endpoint that needs it (so the webhook provider keeps retrying and
/// the rest of the service stays up) instead of refusing to boot.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// HMAC secret shared with LemonSqueezy for webhook signatures.
    pub webhook_secret: Option<String>,
    /// Ed25519 license signing key as pasted into the environment.
    /// Parsed once at startup; never logged.
    pub signing_key: Option<String>,
    pub admin_api_key: Option<String>,
    pub clerk_secret_key: Option<String>,
    pub postmark_api_key: Option<String>,
    pub mail_from: Option<String>,
    pub support_email: Option<String>,
    pub product_map: HashMap<String, String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let mut product_map: HashMap<String, String> = DEFAULT_PRODUCT_MAP
            .iter()
            .map(|(id, code)| (id.to_string(), code.to_string()))
            .collect();
        if let Ok(raw) = env::var("PRODUCT_MAP") {
            product_map.extend(parse_product_map(&raw));
        }

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "feddsp.db".to_string()),
            webhook_secret: non_empty(env::var("LEMONSQUEEZY_WEBHOOK_SECRET").ok()),
            signing_key: non_empty(env::var("LIC_ED25519_PRIVATE_KEY").ok()),
            admin_api_key: non_empty(env::var("ADMIN_API_KEY").ok()),
            clerk_secret_key: non_empty(env::var("CLERK_SECRET_KEY").ok()),
            postmark_api_key: non_empty(env::var("POSTMARK_API_KEY").ok()),
            mail_from: non_empty(env::var("MAIL_FROM").ok()),
            support_email: non_empty(env::var("SUPPORT_EMAIL").ok()),
            product_map,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `extId=code` pairs separated by commas, e.g.
/// `636851=fedDSP-PHAT,738772=fedDSP-FIERY`. Malformed entries are
/// skipped with a log line.
fn parse_product_map(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once('=') {
            Some((id, code)) if !id.trim().is_empty() && !code.trim().is_empty() => {
                map.insert(id.trim().to_string(), code.trim().to_string());
            }
            _ => tracing::warn!(entry = %entry, "skipping malformed PRODUCT_MAP entry"),
        }
    }
    map
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_map() {
        let map = parse_product_map("636851=fedDSP-PHAT, 738772=fedDSP-FIERY ,,bogus");
        assert_eq!(map.get("636851").map(String::as_str), Some("fedDSP-PHAT"));
        assert_eq!(map.get("738772").map(String::as_str), Some("fedDSP-FIERY"));
        assert_eq!(map.len(), 2);
    }
}
