//! Relay CLI - mints development tokens for the relay server.
//!
//! Produces the same HS256 tokens as the server's dev token endpoint, for
//! use when the server runs with the endpoint disabled.

use anyhow::{bail, Context, Result};
use clap::Parser;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

/// Relay CLI - development token generator
#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subject identifier to embed in the token (becomes userId)
    sub: String,

    /// Token lifetime, e.g. 90s, 10m, 1h, 7d
    #[arg(short, long, default_value = "1h")]
    expires_in: String,

    /// Signing secret; must match the server's RELAY_JWT_SECRET
    #[arg(short, long, env = "RELAY_JWT_SECRET", default_value = "CHANGE_ME")]
    secret: String,
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(ttl) = parse_ttl(&cli.expires_in) else {
        bail!("invalid --expires-in value: {:?}", cli.expires_in);
    };

    let claims = Claims {
        sub: cli.sub,
        exp: chrono::Utc::now().timestamp() + ttl as i64,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cli.secret.as_bytes()),
    )
    .context("Signing token")?;

    println!("{token}");
    Ok(())
}

/// Parse a lifetime like `90s`, `10m`, `1h` or `7d` into seconds.
///
/// A bare number is taken as seconds.
fn parse_ttl(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value.parse().ok()?;
    match unit {
        "s" => Some(value),
        "m" => Some(value * 60),
        "h" => Some(value * 3600),
        "d" => Some(value * 86_400),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("90s"), Some(90));
        assert_eq!(parse_ttl("10m"), Some(600));
        assert_eq!(parse_ttl("1h"), Some(3600));
        assert_eq!(parse_ttl("7d"), Some(604_800));
        assert_eq!(parse_ttl("45"), Some(45));
        assert_eq!(parse_ttl("1w"), None);
        assert_eq!(parse_ttl(""), None);
    }
}
