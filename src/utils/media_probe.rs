use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// Top-level ffprobe JSON output (`-print_format json -show_format`).
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

/// Format-level metadata from ffprobe. Duration arrives as a decimal
/// string, e.g. "13.508000".
#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Extract the duration in fractional seconds from a video buffer.
///
/// ffprobe reads from a path, so the buffer is spooled to a temp file for
/// the duration of the probe and removed afterwards.
pub async fn probe_duration(data: &[u8]) -> Result<f64, AppError> {
    let path = std::env::temp_dir().join(format!("vsk-probe-{}", Uuid::new_v4()));

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Failed to spool probe file: {}", e)))?;

    let result = run_ffprobe(&path).await;

    if let Err(e) = tokio::fs::remove_file(&path).await {
        eprintln!("Probe | failed to remove temp file {}: {}", path.display(), e);
    }

    result
}

async fn run_ffprobe(path: &std::path::Path) -> Result<f64, AppError> {
    let output = tokio::process::Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await
        .map_err(|e| AppError::InternalServerError(format!("ffprobe not available: {}", e)))?;

    if !output.status.success() {
        return Err(AppError::BadRequest(
            "Unable to extract video duration".to_string(),
        ));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(json: &str) -> Result<f64, AppError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|_| AppError::BadRequest("Unable to extract video duration".to_string()))?;

    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| AppError::BadRequest("Unable to extract video duration".to_string()))
}

#[cfg(test)]
mod tests {
    use super::parse_duration;

    #[test]
    fn parses_fractional_duration() {
        let json = r#"{"format":{"filename":"in.mp4","duration":"13.508000","size":"1048576"}}"#;
        let duration = parse_duration(json).unwrap();
        assert!((duration - 13.508).abs() < 1e-9);
    }

    #[test]
    fn missing_duration_is_an_error() {
        let json = r#"{"format":{"filename":"in.mp4","size":"1048576"}}"#;
        assert!(parse_duration(json).is_err());
    }

    #[test]
    fn non_numeric_duration_is_an_error() {
        let json = r#"{"format":{"duration":"N/A"}}"#;
        assert!(parse_duration(json).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_duration("not json").is_err());
    }
}
