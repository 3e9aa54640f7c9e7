//! Config file loading

use anyhow::{Context, Result};
use loadgen::LoadConfig;
use std::path::Path;

/// Read a JSON config file. Missing fields keep their defaults.
pub fn load_file(path: &Path) -> Result<LoadConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: LoadConfig = serde_json::from_str(&contents)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen::SendMode;
    use std::io::Write;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mode": 3, "workers": 8, "key_file": "/tmp/keys.txt", "cool_down_secs": 60 }}"#
        )
        .unwrap();

        let config = load_file(file.path()).unwrap();
        assert_eq!(config.mode, SendMode::Rotate);
        assert_eq!(config.workers, 8);
        assert_eq!(config.cool_down_secs, 60);
        assert_eq!(config.tps_per_worker, 3);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(load_file(file.path()).is_err());
        assert!(load_file(Path::new("/nonexistent/txload.json")).is_err());
    }
}
