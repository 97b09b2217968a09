use std::borrow::Cow;
use validator::ValidationError;

const STREAM_SCHEMES: &[&str] = &["rtsp://", "http://", "https://", "file://", "sim://"];

pub fn is_device_path(uri: &str) -> bool {
    uri.strip_prefix("/dev/video")
        .map(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

pub fn validate_stream_uri(uri: &str) -> Result<(), ValidationError> {
    if STREAM_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) || is_device_path(uri) {
        Ok(())
    } else {
        let mut error = ValidationError::new("stream_uri");
        error.message = Some(Cow::from(
            "stream URI must be rtsp://, http(s)://, file://, sim:// or a /dev/video device",
        ));
        Err(error)
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{}ms", millis)
    } else {
        let secs = duration.as_secs();
        if secs >= 60 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stream_uri_schemes() {
        assert!(validate_stream_uri("rtsp://cam.local/live").is_ok());
        assert!(validate_stream_uri("sim://dock?fps=10").is_ok());
        assert!(validate_stream_uri("/dev/video0").is_ok());
        assert!(validate_stream_uri("/dev/video").is_err());
        assert!(validate_stream_uri("udp://239.0.0.1:5000").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }
}
