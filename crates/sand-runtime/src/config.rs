//! Loading and saving the process-wide [`SandConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use sand_types::config::SandConfig;
use thiserror::Error;

/// The configuration shared between pipeline stages.
///
/// Camera calibration is only mutated under the write lock, so a
/// transformation never reads a half-written record.
pub type SharedConfig = Arc<RwLock<SandConfig>>;

pub fn shared(config: SandConfig) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse config at {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config at {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<SandConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: SandConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SAND_*` environment variable overrides to `cfg`.
///
/// Unparsable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SAND_FUSION_OUTPUT_WIDTH` | `sensor_fusion.output_width` |
/// | `SAND_FUSION_OUTPUT_HEIGHT` | `sensor_fusion.output_height` |
/// | `SAND_CONFIG_TRANSFORMER_SCALE` | `config_transformer.scale` |
/// | `SAND_ISOLATOR_MAX_WAIT_SECS` | `isolator.max_wait_secs` |
pub fn apply_env_overrides(cfg: &mut SandConfig) {
    if let Ok(v) = std::env::var("SAND_FUSION_OUTPUT_WIDTH")
        && let Ok(width) = v.parse::<u32>()
    {
        cfg.sensor_fusion.output_width = width;
    }
    if let Ok(v) = std::env::var("SAND_FUSION_OUTPUT_HEIGHT")
        && let Ok(height) = v.parse::<u32>()
    {
        cfg.sensor_fusion.output_height = height;
    }
    if let Ok(v) = std::env::var("SAND_CONFIG_TRANSFORMER_SCALE")
        && let Ok(scale) = v.parse::<f64>()
    {
        cfg.config_transformer.scale = scale;
    }
    if let Ok(v) = std::env::var("SAND_ISOLATOR_MAX_WAIT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.isolator.max_wait_secs = secs;
    }
}

/// Write `cfg` to `path` as pretty TOML, creating parent directories.
pub fn save_to(cfg: &SandConfig, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sand_types::config::{CameraConfig, GroupConfig};
    use sand_types::{Dimensions, Point};

    fn sample() -> SandConfig {
        let mut cam = CameraConfig {
            name: "f1_c1".into(),
            group: "crane_a".into(),
            ..CameraConfig::default()
        };
        cam.set_target_points(vec![Point::new(100.0, 200.0); 4]);
        SandConfig {
            cameras: vec![cam],
            groups: vec![GroupConfig::new("crane_a")],
            ..SandConfig::default()
        }
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("sand").join("config.toml");

        save_to(&sample(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        let cam = loaded.camera("f1_c1").expect("camera");
        assert_eq!(cam.group, "crane_a");
        assert_eq!(cam.stream_resolution, Dimensions::new(2560, 1440));
        assert_eq!(cam.transformation.target_points[3], Point::new(100.0, 200.0));
        assert!(loaded.group("crane_a").is_some());
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join("absent.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn malformed_resolution_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[[cameras]]\nstream_resolution = \"wide\"\n").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn apply_env_overrides_changes_fusion_width() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("SAND_FUSION_OUTPUT_WIDTH", "3500") };
        let mut cfg = SandConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sensor_fusion.output_width, 3500);
        unsafe { std::env::remove_var("SAND_FUSION_OUTPUT_WIDTH") };
    }

    #[test]
    fn apply_env_overrides_changes_scale() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("SAND_CONFIG_TRANSFORMER_SCALE", "0.5") };
        let mut cfg = SandConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.config_transformer.scale, 0.5);
        unsafe { std::env::remove_var("SAND_CONFIG_TRANSFORMER_SCALE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_wait() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("SAND_ISOLATOR_MAX_WAIT_SECS", "forever") };
        let mut cfg = SandConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.isolator.max_wait_secs, 30);
        unsafe { std::env::remove_var("SAND_ISOLATOR_MAX_WAIT_SECS") };
    }
}
