use std::path::Path;

use crate::core::BenchError;

/// Reads the CA bundle used to verify warehouse endpoints. No path means the
/// system roots are used.
pub fn load_root_certificate(
    cert_path: Option<&Path>,
) -> Result<Option<reqwest::Certificate>, BenchError> {
    let Some(path) = cert_path else {
        return Ok(None);
    };

    let pem = read_certificate_pem(path)?;

    let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
        BenchError::TlsError(format!("parsing certificate {}: {}", path.display(), e))
    })?;

    Ok(Some(cert))
}

pub fn read_certificate_pem(path: &Path) -> Result<Vec<u8>, BenchError> {
    std::fs::read(path).map_err(|e| {
        BenchError::TlsError(format!("reading certificate {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_path_uses_system_roots() {
        assert!(load_root_certificate(None).unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_tls_error() {
        let err = load_root_certificate(Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(matches!(err, BenchError::TlsError(msg) if msg.contains("/nonexistent/ca.pem")));
    }
}
