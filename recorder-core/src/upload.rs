//! # Upload Module
//!
//! Posts an exported WAV file to the ingestion service as a multipart form.
//! The request carries the API key and a label as headers:
//!
//! ```text
//! POST <endpoint>
//! x-api-key: <key>
//! x-label:   <label>
//! data=@<file>.wav;type=audio/wav
//! ```
//!
//! The outcome is three-way: `Ok` on HTTP 200, `UploadRejected` with the
//! status and body for any other response, `UploadTransport` when no
//! response arrived at all.

use std::path::Path;

use log::{info, warn};
use reqwest::multipart::{Form, Part};

use crate::config::UploadConfig;
use crate::error::{RecorderError, Result};

/// A successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub file_name: String,
    pub label: String,
    /// Response body as returned by the server.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RecorderError::UploadTransport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `path` with `label`, or the configured default label when `None`.
    pub async fn upload(&self, path: impl AsRef<Path>, label: Option<&str>) -> Result<UploadReceipt> {
        let path = path.as_ref();
        let label = label.unwrap_or(&self.config.label).to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording.wav".to_string());

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RecorderError::ExportIo(format!("{}: {}", path.display(), e)))?;

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("audio/wav")
            .map_err(|e| RecorderError::UploadTransport(e.to_string()))?;
        let form = Form::new().part("data", part);

        info!("[UPLOAD] Uploading {} as '{}' to {}", file_name, label, self.config.endpoint);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("x-label", &label)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("[UPLOAD] Transport error: {}", e);
                RecorderError::UploadTransport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RecorderError::UploadTransport(e.to_string()))?;

        if status == reqwest::StatusCode::OK {
            info!("[UPLOAD] Uploaded {} successfully", file_name);
            Ok(UploadReceipt {
                file_name,
                label,
                body,
            })
        } else {
            warn!("[UPLOAD] Server rejected {}: {} {}", file_name, status.as_u16(), body);
            Err(RecorderError::UploadRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// What the loopback server saw.
    struct Captured {
        headers: Vec<String>,
        body: Vec<u8>,
    }

    /// Serves exactly one request with a canned response on a random port.
    fn serve_once(status_line: &'static str, reply: &'static str) -> (String, mpsc::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut headers = Vec::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                headers.push(line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                reply.len(),
                reply
            )
            .unwrap();
            stream.flush().unwrap();
            tx.send(Captured { headers, body }).unwrap();
        });

        (format!("http://{}/api/testing/files", addr), rx)
    }

    fn has_header(captured: &Captured, name: &str, value: &str) -> bool {
        captured
            .headers
            .iter()
            .any(|h| h.to_ascii_lowercase() == format!("{}: {}", name, value).to_ascii_lowercase())
    }

    fn wav_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("take.wav");
        crate::export::export_wav(&[0.1, -0.2, 0.3], 8000, &path).unwrap();
        path
    }

    fn uploader(endpoint: String) -> Uploader {
        Uploader::new(UploadConfig {
            endpoint,
            api_key: "test-key".to_string(),
            label: "recording".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_success_sends_headers_and_file() {
        let (endpoint, captured) = serve_once("200 OK", "{\"success\":true}");
        let dir = tempfile::tempdir().unwrap();
        let path = wav_file(dir.path());

        let receipt = uploader(endpoint).upload(&path, Some("cough")).await.unwrap();
        assert_eq!(receipt.file_name, "take.wav");
        assert_eq!(receipt.label, "cough");
        assert_eq!(receipt.body, "{\"success\":true}");

        let captured = captured.recv().unwrap();
        assert!(has_header(&captured, "x-api-key", "test-key"));
        assert!(has_header(&captured, "x-label", "cough"));
        let body = String::from_utf8_lossy(&captured.body);
        assert!(body.contains("name=\"data\""));
        assert!(body.contains("filename=\"take.wav\""));
        assert!(body.contains("audio/wav"));
    }

    #[tokio::test]
    async fn test_non_200_is_rejected_with_body() {
        let (endpoint, _captured) = serve_once("401 Unauthorized", "bad api key");
        let dir = tempfile::tempdir().unwrap();
        let path = wav_file(dir.path());

        match uploader(endpoint).upload(&path, None).await {
            Err(RecorderError::UploadRejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad api key");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let path = wav_file(dir.path());
        let result = uploader(format!("http://{}/", addr)).upload(&path, None).await;
        assert!(matches!(result, Err(RecorderError::UploadTransport(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_export_error() {
        let result = uploader("http://127.0.0.1:9/".to_string())
            .upload("/definitely/not/here.wav", None)
            .await;
        assert!(matches!(result, Err(RecorderError::ExportIo(_))));
    }
}
