use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub source_host: String,
    pub source_port: u16,
    pub dest_host: String,
    pub dest_port: u16,
    pub source_client_id: i32,
    pub dest_client_id: i32,
    pub poll_interval_seconds: u64,
}

impl Config {
    /// Read configuration from the environment. Every option has a compiled
    /// default, so a bare process run copies between two local gateways.
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            source_host: var_or("SOURCE_HOST", "127.0.0.1"),
            source_port: parsed_var("SOURCE_PORT", 7496)?,
            dest_host: var_or("DEST_HOST", "127.0.0.1"),
            dest_port: parsed_var("DEST_PORT", 7497)?,
            source_client_id: parsed_var("SOURCE_CLIENT_ID", 100)?,
            dest_client_id: parsed_var("DEST_CLIENT_ID", 200)?,
            poll_interval_seconds: parsed_var("POLL_INTERVAL_SECONDS", 2)?,
        };
        cfg.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow!("POLL_INTERVAL_SECONDS must be at least 1"));
        }
        // Two sessions on the same endpoint must not share a client id.
        if self.source_host == self.dest_host
            && self.source_port == self.dest_port
            && self.source_client_id == self.dest_client_id
        {
            return Err(anyhow!(
                "source and destination use the same endpoint with the same client id; \
                 client ids must be unique per endpoint"
            ));
        }
        Ok(self)
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
