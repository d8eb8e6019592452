use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::{
    error::ConfigError,
    renderer::RendererSettings,
    ticker::DEFAULT_ENVELOPE_WIDTH,
};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8002";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub bind_addr: SocketAddr,
    pub work_dir: PathBuf,
    pub envelope_width: f64,
    pub renderer: RendererSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; unset and blank
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_token = get("API_TOKEN").ok_or(ConfigError::Missing("API_TOKEN"))?;

        let bind_addr = get("RENDERER_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "RENDERER_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let work_dir = get("RENDER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("wordticker-renderer"));

        let envelope_width = match get("ENVELOPE_WIDTH_SECONDS") {
            Some(value) => parse_positive_f64("ENVELOPE_WIDTH_SECONDS", &value)?,
            None => DEFAULT_ENVELOPE_WIDTH,
        };

        let mut renderer = RendererSettings::default();
        if let Some(value) = get("BLENDER_PATH") {
            renderer.blender_path = PathBuf::from(value);
        }
        if let Some(value) = get("RENDER_SCRIPT") {
            renderer.script_path = PathBuf::from(value);
        }
        if renderer.script_path.is_relative() {
            renderer.script_path = std::env::current_dir()?.join(&renderer.script_path);
        }
        if let Some(value) = get("RENDER_USE_XVFB") {
            renderer.use_xvfb = parse_bool(&value).ok_or_else(|| ConfigError::Invalid {
                key: "RENDER_USE_XVFB",
                reason: format!("`{value}` is not a boolean"),
            })?;
        }
        renderer.python_path = get("RENDER_PYTHONPATH").map(PathBuf::from);
        if let Some(value) = get("RENDER_TIMEOUT_SECONDS") {
            let seconds = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "RENDER_TIMEOUT_SECONDS",
                    reason: format!("`{value}` is not a positive integer"),
                })?;
            renderer.timeout = Duration::from_secs(seconds);
        }

        Ok(Self {
            api_token,
            bind_addr,
            work_dir,
            envelope_width,
            renderer,
        })
    }
}

fn parse_positive_f64(key: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ConfigError::Invalid {
            key,
            reason: format!("`{value}` is not a positive number"),
        })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = load(&[("API_TOKEN", "s3cret")]).unwrap();

        assert_eq!(config.api_token, "s3cret");
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.envelope_width, DEFAULT_ENVELOPE_WIDTH);
        assert_eq!(config.renderer.blender_path, PathBuf::from("/usr/bin/blender"));
        assert!(config.renderer.use_xvfb);
        assert!(config.renderer.python_path.is_none());
        assert!(config.renderer.script_path.is_absolute());
        assert!(config.renderer.script_path.ends_with("render/blender_script.py"));
        assert_eq!(config.renderer.timeout, Duration::from_secs(3600));
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("API_TOKEN"))));
        assert!(matches!(
            load(&[("API_TOKEN", "   ")]),
            Err(ConfigError::Missing("API_TOKEN"))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("API_TOKEN", "t"),
            ("RENDERER_BIND_ADDR", "127.0.0.1:9000"),
            ("RENDER_WORK_DIR", "/var/lib/ticker"),
            ("ENVELOPE_WIDTH_SECONDS", "60.5"),
            ("BLENDER_PATH", "/opt/blender/blender"),
            ("RENDER_SCRIPT", "/opt/scene.py"),
            ("RENDER_USE_XVFB", "off"),
            ("RENDER_PYTHONPATH", "/podology_renderer"),
            ("RENDER_TIMEOUT_SECONDS", "90"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.work_dir, PathBuf::from("/var/lib/ticker"));
        assert_eq!(config.envelope_width, 60.5);
        assert_eq!(config.renderer.blender_path, PathBuf::from("/opt/blender/blender"));
        assert_eq!(config.renderer.script_path, PathBuf::from("/opt/scene.py"));
        assert!(!config.renderer.use_xvfb);
        assert_eq!(
            config.renderer.python_path,
            Some(PathBuf::from("/podology_renderer"))
        );
        assert_eq!(config.renderer.timeout, Duration::from_secs(90));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            ("RENDERER_BIND_ADDR", "localhost"),
            ("ENVELOPE_WIDTH_SECONDS", "0"),
            ("ENVELOPE_WIDTH_SECONDS", "wide"),
            ("RENDER_USE_XVFB", "maybe"),
            ("RENDER_TIMEOUT_SECONDS", "0"),
        ];

        for (key, value) in cases {
            let result = load(&[("API_TOKEN", "t"), (key, value)]);
            assert!(
                matches!(result, Err(ConfigError::Invalid { key: k, .. }) if k == key),
                "{key}={value} should be invalid"
            );
        }
    }
}
