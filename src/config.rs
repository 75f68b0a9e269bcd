use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub interpolation: InterpolationConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_sections")]
    pub sections: usize,
    #[serde(default)]
    pub gate_threshold: f32,
    #[serde(default = "default_factor")]
    pub bass_factor: f32,
    #[serde(default = "default_factor")]
    pub mid_factor: f32,
    #[serde(default = "default_factor")]
    pub treble_factor: f32,
    #[serde(default = "default_pulse_perc")]
    pub pulse_perc: bool,
}

#[derive(Debug, Deserialize)]
pub struct InterpolationConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            sections: default_sections(),
            gate_threshold: 0.0,
            bass_factor: default_factor(),
            mid_factor: default_factor(),
            treble_factor: default_factor(),
            pulse_perc: default_pulse_perc(),
        }
    }
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
        }
    }
}

fn default_fps() -> u32 { 25 }
fn default_sections() -> usize { 3 }
fn default_factor() -> f32 { 1.0 }
fn default_pulse_perc() -> bool { true }
fn default_kind() -> String { "cubic".into() }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Explicit path, else `pulsewalk.toml` in the working directory, else the
/// user config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("pulsewalk.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("pulsewalk").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("pulsewalk").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [analysis]
            sections = 5
            gate_threshold = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.analysis.sections, 5);
        assert_eq!(cfg.analysis.gate_threshold, 0.2);
        assert_eq!(cfg.analysis.fps, 25);
        assert!(cfg.analysis.pulse_perc);
        assert_eq!(cfg.interpolation.kind, "cubic");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulsewalk.toml");
        std::fs::write(&path, "[interpolation]\nkind = \"nearest\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.interpolation.kind, "nearest");
        assert_eq!(find_config(Some(&path)), Some(path.clone()));
    }

    #[test]
    fn test_invalid_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[analysis\nfps = ").unwrap();
        assert!(load_config(&path).is_none());
    }
}
