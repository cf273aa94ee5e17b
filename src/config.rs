use anyhow::{Context, Result};
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_API_KEY_REF: &str = "env:AI_GATEWAY_API_KEY";

/// Persona prepended to every conversation forwarded by the relay.
pub const DEFAULT_PERSONA: &str = "\
Kamu adalah PejuangBot - chatbot AI yang friendly, supportive, dan pinter. Kamu punya karakter Gen Z yang santai tapi tetap helpful.

PERSONALITY:
- Gaya bicara: santai, sopan, tapi tetap pintar dan nyambung
- Kadang pakai emoji biar terasa lebih hidup (tapi jangan berlebihan)
- Gaya bahasa Gen Z yang chill (\"oke bet\", \"gass\", \"siap banget\", \"santai aja bro/sis\")
- Ramah dan supportive
- Kasih penjelasan dengan kalimat yang gampang dimengerti

TUGAS UTAMA:
- Jawab pertanyaan tentang berbagai topik (pendidikan, teknologi, hiburan, motivasi, dll)
- Bantu belajar (jelasin materi sekolah, kasih contoh soal, bantu nulis, dll)
- Bisa diajak ngobrol santai, kasih saran ringan, atau motivasi positif
- Inget konteks obrolan selama sesi berlangsung

Selalu bersikap positif, helpful, dan bikin user merasa nyaman!";

// --- Relay settings ---

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the OpenAI-compatible gateway, without `/chat/completions`.
    pub upstream_url: String,
    pub model: String,
    /// Where to find the upstream key, e.g. `env:AI_GATEWAY_API_KEY`.
    /// Resolved per request so a missing key fails that request only.
    pub api_key_ref: String,
    pub persona: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8787))),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_ref: DEFAULT_API_KEY_REF.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl RelayConfig {
    /// Reads `RELAY_*` environment variables, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let bind_addr = match env_opt("RELAY_BIND_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("Invalid RELAY_BIND_ADDR '{}'", addr))?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            bind_addr,
            upstream_url: env_opt("RELAY_UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            model: env_opt("RELAY_MODEL").unwrap_or(defaults.model),
            api_key_ref: env_opt("RELAY_API_KEY_REF").unwrap_or(defaults.api_key_ref),
            persona: env_opt("RELAY_PERSONA").unwrap_or(defaults.persona),
        })
    }
}

// --- Client settings ---

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base URL of the hosted database project.
    pub base_url: String,
    /// Publishable (anon) key sent with store and relay requests.
    pub public_key: String,
    pub relay_url: String,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>, public_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let relay_url = format!("{}/functions/v1/chat", base_url);
        Self {
            base_url,
            public_key: public_key.into(),
            relay_url,
        }
    }

    /// Reads `STORE_URL`, `STORE_PUBLIC_KEY` and the optional `RELAY_URL`.
    pub fn from_env() -> Result<Self> {
        let base_url = env_opt("STORE_URL").context("STORE_URL is not configured")?;
        let public_key = env_opt("STORE_PUBLIC_KEY").context("STORE_PUBLIC_KEY is not configured")?;
        let mut config = Self::new(base_url, public_key);
        if let Some(relay_url) = env_opt("RELAY_URL") {
            config.relay_url = relay_url;
        }
        Ok(config)
    }
}

// --- API Key Retrieval ---

/// Resolves an API key reference. Only `env:NAME` references are supported;
/// an unset or blank variable is reported as not configured.
pub fn get_api_key(key_ref: &str) -> Result<String> {
    match key_ref.strip_prefix("env:") {
        Some(env_var_name) => {
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            env_opt(env_var_name).with_context(|| format!("{} is not configured", env_var_name))
        }
        None => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", key_ref)),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
