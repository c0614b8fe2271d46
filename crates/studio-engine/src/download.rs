use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

pub const DEFAULT_OUTPUT_STEM: &str = "studioai-processed-image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub path: PathBuf,
    pub bytes: u64,
    pub mime_type: Option<String>,
}

/// Fetches a generated image and writes it under `out`.
///
/// `out` may be a directory (the default file name is used), a path without
/// extension (one is derived from the response content type), or a full
/// file path written as given.
pub fn download_result(http: &HttpClient, url: &str, out: &Path) -> Result<DownloadedImage> {
    let response = http
        .get(url)
        .send()
        .with_context(|| format!("failed downloading generated image ({url})"))?;
    if !response.status().is_success() {
        let code = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        bail!(
            "generated image download failed ({code}): {}",
            body.chars().take(512).collect::<String>()
        );
    }
    let mime_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .context("failed reading generated image bytes")?
        .to_vec();

    let path = resolve_output_path(out, mime_type.as_deref());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;

    Ok(DownloadedImage {
        path,
        bytes: bytes.len() as u64,
        mime_type,
    })
}

fn resolve_output_path(out: &Path, mime_type: Option<&str>) -> PathBuf {
    let ext = extension_from_mime(mime_type);
    if out.is_dir() {
        return out.join(format!("{DEFAULT_OUTPUT_STEM}.{ext}"));
    }
    if out.extension().is_some() {
        return out.to_path_buf();
    }
    out.with_extension(ext)
}

fn extension_from_mime(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return "png";
    };
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use reqwest::blocking::Client as HttpClient;
    use tiny_http::{Header, Response, Server};

    use super::{download_result, extension_from_mime, resolve_output_path};

    fn serve_bytes(status: u16, content_type: &str, bytes: &[u8]) -> (String, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let addr = server
            .server_addr()
            .to_ip()
            .expect("test server listens on ip");
        let header = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
            .expect("valid header");
        let bytes = bytes.to_vec();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let _ = request.respond(
                    Response::from_data(bytes)
                        .with_status_code(status)
                        .with_header(header),
                );
            }
        });
        (format!("http://{addr}/files/result"), handle)
    }

    #[test]
    fn writes_into_directory_with_default_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (url, handle) = serve_bytes(200, "image/jpeg", b"jpeg-bytes");

        let downloaded = download_result(&HttpClient::new(), &url, temp.path())?;
        handle.join().map_err(|_| anyhow::anyhow!("server panicked"))?;

        assert_eq!(downloaded.path, temp.path().join("studioai-processed-image.jpg"));
        assert_eq!(downloaded.bytes, 10);
        assert_eq!(downloaded.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(fs::read(&downloaded.path)?, b"jpeg-bytes");
        Ok(())
    }

    #[test]
    fn non_success_download_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (url, handle) = serve_bytes(404, "text/plain", b"gone");

        let err = download_result(&HttpClient::new(), &url, &temp.path().join("out.png"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        handle.join().map_err(|_| anyhow::anyhow!("server panicked"))?;

        assert_eq!(err, "generated image download failed (404): gone");
        assert!(!temp.path().join("out.png").exists());
        Ok(())
    }

    #[test]
    fn output_path_rules() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let bare = temp.path().join("result");
        assert_eq!(
            resolve_output_path(&bare, Some("image/webp")),
            temp.path().join("result.webp")
        );
        let explicit = temp.path().join("keep.jpeg");
        assert_eq!(resolve_output_path(&explicit, Some("image/png")), explicit);
        assert_eq!(extension_from_mime(None), "png");
        assert_eq!(extension_from_mime(Some("image/JPEG")), "jpg");
        Ok(())
    }
}
