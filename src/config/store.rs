use std::path::Path;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Load configuration from a TOML file, or defaults when no path is given
///
/// Missing keys fall back to their defaults. The result is validated.
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            parse_config(&text)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?
        }
        None => AppConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

fn parse_config(text: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_defaults_without_file() {
        let config = load_config(None).await.unwrap();
        assert_eq!(config.web.http_port, 5050);
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("streamer.toml");
        tokio::fs::write(
            &path,
            r#"
[web]
http_port = 9000

[webrtc]
gathering_timeout_ms = 5000

[encoder]
program = "gst-launch-1.0"
args = ["-q", "videotestsrc"]
"#,
        )
        .await
        .unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.web.http_port, 9000);
        assert_eq!(config.web.bind_address, "::");
        assert_eq!(config.webrtc.gathering_timeout_ms, Some(5000));
        assert_eq!(config.encoder.program, "gst-launch-1.0");
        assert_eq!(config.encoder.args, vec!["-q", "videotestsrc"]);
        assert_eq!(config.media.frame_interval_ms, 33);
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[media]\nframe_interval_ms = 0\n")
            .await
            .unwrap();

        assert!(matches!(
            load_config(Some(&path)).await,
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        assert!(parse_config("[web]\nhttp_port = \"high\"\n").is_err());
    }
}
