use crate::error::{Result, SkylineError};
use crate::layout::{AspectRatio, BaseParams, SkylineParams};
use crate::mesh::DEFAULT_TOOL;
use crate::scad::EmitOptions;
use crate::stats::Granularity;
use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};

pub const ENV_OPENSCAD: &str = "SKYLINE_OPENSCAD";
pub const ENV_TOOL_TIMEOUT: &str = "SKYLINE_TOOL_TIMEOUT";
pub const ENV_USERNAME: &str = "GITHUB_USERNAME";

pub const DEFAULT_FONT: &str = "Liberation Sans:style=Bold";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub aspect_ratio: AspectRatio,
    pub granularity: Granularity,
    /// mm
    pub max_building_height: f64,
    pub building_width: f64,
    pub building_length: f64,
    pub base_margin: f64,
    pub base_height: f64,
    /// Slope of the base walls in degrees
    pub base_angle: f64,
    pub font: String,
    /// Overrides the username of the contributions record
    pub username: Option<String>,
    /// Overrides `@username`
    pub left_label: Option<String>,
    /// Overrides the year range
    pub right_label: Option<String>,
    pub openscad_path: String,
    pub tool_timeout_secs: u64,
    pub allow_empty_model: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            granularity: Granularity::Week,
            max_building_height: 20.0,
            building_width: 2.0,
            building_length: 2.0,
            base_margin: 1.0,
            base_height: 5.0,
            base_angle: 22.5,
            font: DEFAULT_FONT.to_string(),
            username: None,
            left_label: None,
            right_label: None,
            openscad_path: DEFAULT_TOOL.to_string(),
            tool_timeout_secs: 300,
            allow_empty_model: true,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SkylineError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SKYLINE_OPENSCAD`, `SKYLINE_TOOL_TIMEOUT` and `GITHUB_USERNAME`.
    /// Blank values are ignored.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(tool) = env_value(ENV_OPENSCAD) {
            self.openscad_path = tool;
        }

        if let Some(secs) = env_value(ENV_TOOL_TIMEOUT) {
            self.tool_timeout_secs = secs.parse().map_err(|_| {
                SkylineError::InvalidConfiguration(format!(
                    "{ENV_TOOL_TIMEOUT} must be a whole number of seconds, got '{secs}'"
                ))
            })?;
        }

        if let Some(username) = env_value(ENV_USERNAME) {
            self.username = Some(username);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let dimensions = [
            ("max_building_height", self.max_building_height),
            ("building_width", self.building_width),
            ("building_length", self.building_length),
            ("base_height", self.base_height),
        ];
        for (name, value) in dimensions {
            if !value.is_finite() || value <= 0.0 {
                return Err(SkylineError::InvalidConfiguration(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if !self.base_margin.is_finite() || self.base_margin < 0.0 {
            return Err(SkylineError::InvalidConfiguration(format!(
                "base_margin must not be negative, got {}",
                self.base_margin
            )));
        }

        if !(0.0..90.0).contains(&self.base_angle) {
            return Err(SkylineError::InvalidConfiguration(format!(
                "base_angle must be in [0, 90), got {}",
                self.base_angle
            )));
        }

        if self.aspect_ratio.width == 0 || self.aspect_ratio.height == 0 {
            return Err(SkylineError::InvalidAspectRatio(
                self.aspect_ratio.to_string(),
            ));
        }

        if self.tool_timeout_secs == 0 {
            return Err(SkylineError::InvalidConfiguration(
                "tool_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.openscad_path.trim().is_empty() {
            return Err(SkylineError::InvalidConfiguration(
                "openscad_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn skyline_params(&self) -> SkylineParams {
        SkylineParams {
            aspect_ratio: self.aspect_ratio,
            max_building_height: self.max_building_height,
            building_width: self.building_width,
            building_length: self.building_length,
            base: BaseParams {
                margin: self.base_margin,
                height: self.base_height,
                angle: self.base_angle,
            },
            font: self.font.clone(),
        }
    }

    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            allow_empty_model: self.allow_empty_model,
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aspect_ratio, AspectRatio::new(16, 9).unwrap());
        assert_eq!(config.granularity, Granularity::Week);
        assert_eq!(config.openscad_path, "openscad");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_skyline_params() {
        let config = Config {
            base_margin: 2.0,
            ..Default::default()
        };
        let params = config.skyline_params();
        assert_eq!(params.base.margin, 2.0);
        assert_eq!(params.base.angle, 22.5);
        assert_eq!(params.font, DEFAULT_FONT);
    }

    #[test]
    fn test_load_from_file_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("skyline.toml");
        std::fs::write(
            &path,
            r#"
aspect_ratio = "4:3"
granularity = "day"
max_building_height = 30.0
left_label = "@someone"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.aspect_ratio, AspectRatio::new(4, 3).unwrap());
        assert_eq!(config.granularity, Granularity::Day);
        assert_eq!(config.max_building_height, 30.0);
        assert_eq!(config.left_label.as_deref(), Some("@someone"));
        // untouched fields keep their defaults
        assert_eq!(config.building_width, 2.0);
    }

    #[test]
    fn test_load_from_file_rejects_bad_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("skyline.toml");

        std::fs::write(&path, "building_width = -1.0\n").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SkylineError::InvalidConfiguration(_))
        ));

        std::fs::write(&path, "aspect_ratio = \"16-9\"\n").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SkylineError::Toml(_))
        ));

        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn test_shipped_default_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let config = Config::load_from_file(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = Config::load_from_file("/nonexistent/skyline.toml");
        assert!(matches!(result, Err(SkylineError::ReadFile { .. })));
    }

    #[test]
    fn test_validate_base_angle() {
        let config = Config {
            base_angle: 90.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            base_angle: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout() {
        let config = Config {
            tool_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(Config::default().tool_timeout(), Duration::from_secs(300));
    }

    // All env handling lives in one test so parallel tests never race on
    // the process environment.
    #[test]
    fn test_apply_env() {
        let orig: Vec<(&str, Option<String>)> = [ENV_OPENSCAD, ENV_TOOL_TIMEOUT, ENV_USERNAME]
            .into_iter()
            .map(|k| (k, env::var(k).ok()))
            .collect();

        unsafe {
            env::set_var(ENV_OPENSCAD, "/opt/openscad/bin/openscad");
            env::set_var(ENV_TOOL_TIMEOUT, "42");
            env::set_var(ENV_USERNAME, "   ");
        }
        let mut config = Config::default();
        config.apply_env().unwrap();
        assert_eq!(config.openscad_path, "/opt/openscad/bin/openscad");
        assert_eq!(config.tool_timeout_secs, 42);
        // whitespace only is ignored
        assert_eq!(config.username, None);

        unsafe {
            env::set_var(ENV_USERNAME, "octocat");
            env::set_var(ENV_TOOL_TIMEOUT, "soon");
        }
        let mut config = Config::default();
        assert!(config.apply_env().is_err());
        assert_eq!(config.username, None);

        unsafe {
            env::remove_var(ENV_TOOL_TIMEOUT);
        }
        let mut config = Config::default();
        config.apply_env().unwrap();
        assert_eq!(config.username.as_deref(), Some("octocat"));

        // Restore original values
        unsafe {
            for (key, value) in orig {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
