//! HTTP client for the library server

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tracing::debug;
use url::Url;

use super::error::{ApiError, ChannelError};
use super::models::*;
use super::sse::SseDecoder;
use super::transport::{EventSource, FrameStream, MutationApi, ProgressFn};
use crate::library::{TrackKey, UserTheme};
use crate::upload::UploadFile;

/// Upload body chunk size; progress is reported once per chunk
const UPLOAD_CHUNK: usize = 64 * 1024;

/// HTTP client for the server's REST endpoints and event channel
#[derive(Clone)]
pub struct HttpClient {
    base_url: Url,
    http_client: Client,
}

impl HttpClient {
    /// Create a new client. The session cookie obtained by [`login`] is kept
    /// for every later request.
    ///
    /// [`login`]: HttpClient::login
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).with_context(|| format!("Invalid server URL {}", base_url))?;

        let http_client = Client::builder()
            .user_agent(concat!("tunemirror/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(&format!("api/{}", name))
            .map_err(|e| ApiError::new("invalid_url", Some(e.to_string())))
    }

    /// POST a multipart form and decode the response envelope
    async fn post(&self, name: &str, form: Form) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(name)?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::network)?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ApiError::http(response.status()));
        }

        response.json().await.map_err(ApiError::invalid_response)
    }

    fn tracks_json(tracks: &[TrackKey]) -> Result<String, ApiError> {
        serde_json::to_string(tracks).map_err(ApiError::invalid_response)
    }

    /// Sign in; the server answers with a session cookie
    pub async fn login(&self, login: &str, password: &str) -> Result<(), ApiError> {
        let form = Form::new()
            .text("login", login.to_string())
            .text("password", password.to_string());
        self.post("login", form).await?.into_unit()
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.post("logout", Form::new()).await?.into_unit()
    }

    /// Persist user preferences
    pub async fn update_user(&self, lang: &str, rem_ip: bool, autoplay: bool) -> Result<(), ApiError> {
        let form = Form::new()
            .text("lang", lang.to_string())
            .text("rem_ip", rem_ip.to_string())
            .text("autoplay", autoplay.to_string());
        self.post("updateuser", form).await?.into_unit()
    }

    pub async fn change_nickname(&self, nickname: &str) -> Result<(), ApiError> {
        let form = Form::new().text("newNickname", nickname.to_string());
        self.post("changenickname", form).await?.into_unit()
    }

    pub async fn change_avatar(&self, image: Bytes) -> Result<(), ApiError> {
        let part = Part::stream(Body::from(image)).file_name("newAvatar");
        let form = Form::new().part("newAvatar", part);
        self.post("changeavatar", form).await?.into_unit()
    }

    pub async fn remove_avatar(&self) -> Result<(), ApiError> {
        self.post("removeavatar", Form::new()).await?.into_unit()
    }

    pub async fn change_password(&self, old: &str, new: &str) -> Result<(), ApiError> {
        let form = Form::new()
            .text("old", old.to_string())
            .text("new", new.to_string());
        self.post("changepassword", form).await?.into_unit()
    }

    /// Reset another user's password, returning the generated one
    pub async fn reset_password(&self, user_id: i64) -> Result<String, ApiError> {
        let form = Form::new().text("id", user_id.to_string());
        let data: ResetPasswordData = self.post("resetpassword", form).await?.into_data()?;
        Ok(data.new_password)
    }

    pub async fn add_user(&self, login: &str, password: &str, is_admin: bool) -> Result<UserInTable, ApiError> {
        let form = Form::new()
            .text("login", login.to_string())
            .text("password", password.to_string())
            .text("is_admin", is_admin.to_string());
        self.post("adduser", form).await?.into_data()
    }

    pub async fn remove_user(&self, user_id: i64) -> Result<(), ApiError> {
        let form = Form::new().text("id", user_id.to_string());
        self.post("removeuser", form).await?.into_unit()
    }

    pub async fn set_admin(&self, user_id: i64, state: bool) -> Result<(), ApiError> {
        let form = Form::new()
            .text("id", user_id.to_string())
            .text("state", state.to_string());
        self.post("setadmin", form).await?.into_unit()
    }

    pub async fn server_data(&self) -> Result<ServerData, ApiError> {
        self.post("getserverdata", Form::new()).await?.into_data()
    }

    pub async fn set_server_data(&self, vars: &ServerVars) -> Result<(), ApiError> {
        let form = Form::new()
            .text("default_language", vars.default_language.clone())
            .text("session_time", vars.session_time.to_string())
            .text("custom_app_title", vars.custom_app_title.clone());
        self.post("setserverdata", form).await?.into_unit()
    }
}

#[async_trait]
impl EventSource for HttpClient {
    async fn connect(&self) -> Result<FrameStream, ChannelError> {
        let url = self
            .endpoint("init")
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!("Opening event channel: {}", url);

        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChannelError::Status(response.status().as_u16()));
        }

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(ChannelError::Stream(e.to_string()))],
            })
            .flat_map(stream::iter)
            .boxed();

        Ok(frames)
    }
}

#[async_trait]
impl MutationApi for HttpClient {
    async fn update_playlist(&self, db_id: i64, tracks: &[TrackKey]) -> Result<i64, ApiError> {
        let form = Form::new()
            .text("id", db_id.to_string())
            .text("tracks", Self::tracks_json(tracks)?);
        self.post("updatepl", form).await?.into_data()
    }

    async fn add_playlist(&self, name: &str, tracks: &[TrackKey]) -> Result<i64, ApiError> {
        let form = Form::new()
            .text("name", name.to_string())
            .text("tracks", Self::tracks_json(tracks)?);
        self.post("addpl", form).await?.into_data()
    }

    async fn rename_playlist(&self, db_id: i64, name: &str) -> Result<(), ApiError> {
        let form = Form::new()
            .text("id", db_id.to_string())
            .text("name", name.to_string());
        self.post("renamepl", form).await?.into_unit()
    }

    async fn remove_playlist(&self, db_id: i64) -> Result<(), ApiError> {
        let form = Form::new().text("id", db_id.to_string());
        self.post("removepl", form).await?.into_unit()
    }

    async fn update_track(&self, hash: &str, artist: &str, title: &str) -> Result<(), ApiError> {
        let form = Form::new()
            .text("hash", hash.to_string())
            .text("artist", artist.to_string())
            .text("title", title.to_string());
        self.post("updatetrack", form).await?.into_unit()
    }

    async fn set_lyrics(&self, hash: &str, lyrics: &str) -> Result<(), ApiError> {
        let form = Form::new()
            .text("hash", hash.to_string())
            .text("lyrics", lyrics.to_string());
        self.post("setlyrics", form).await?.into_unit()
    }

    async fn remove_tracks(&self, hashes: &[TrackKey]) -> Result<(), ApiError> {
        let form = hashes
            .iter()
            .fold(Form::new(), |form, hash| form.text("hashes[]", hash.clone()));
        self.post("removetracks", form).await?.into_unit()
    }

    async fn upload_track(&self, file: &UploadFile, progress: ProgressFn) -> Result<(), ApiError> {
        let data = tokio::fs::read(&file.path)
            .await
            .map_err(|e| ApiError::new("file_read", Some(e.to_string())))?;
        let data = Bytes::from(data);
        let total = data.len() as u64;

        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| data.slice(start..(start + UPLOAD_CHUNK).min(data.len())))
            .collect();

        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.name.clone())
            .mime_str("audio/mpeg")
            .map_err(ApiError::invalid_response)?;

        debug!("Uploading {} ({} bytes)", file.name, total);
        self.post("upload", Form::new().part("track", part)).await?.into_unit()
    }

    async fn close_other_session(&self) -> Result<(), ApiError> {
        self.post("closech", Form::new()).await?.into_unit()
    }

    async fn update_theme(&self, theme_id: &str) -> Result<(), ApiError> {
        let form = Form::new().text("theme", theme_id.to_string());
        self.post("updatetheme", form).await?.into_unit()
    }

    async fn update_themes(&self, themes: &[UserTheme]) -> Result<(), ApiError> {
        let mut form = Form::new();
        for theme in themes {
            let encoded = serde_json::to_string(theme).map_err(ApiError::invalid_response)?;
            form = form.text("list[]", encoded);
        }
        self.post("updatethemes", form).await?.into_unit()
    }

    async fn request_ftp_upload(&self) -> Result<(), ApiError> {
        self.post("ftp_upload", Form::new()).await?.into_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a local port
    async fn serve_once(status: &'static str, content_type: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{}", addr)
    }

    /// Consume headers and a Content-Length body
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let Ok(n) = socket.read(&mut buf).await else { return };
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);
            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }

    #[test]
    fn test_base_url_normalized() {
        let client = HttpClient::new("http://localhost:8080/app/").unwrap();
        assert_eq!(
            client.endpoint("updatepl").unwrap().as_str(),
            "http://localhost:8080/app/api/updatepl"
        );
    }

    #[tokio::test]
    async fn test_update_playlist_returns_id() {
        let url = serve_once(
            "200 OK",
            "application/json",
            r#"{"success":true,"key":"","error":"","data":42}"#,
        )
        .await;
        let client = HttpClient::new(&url).unwrap();
        let id = client.update_playlist(-1, &["a".to_string()]).await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_failure_envelope_is_typed() {
        let url = serve_once(
            "200 OK",
            "application/json",
            r#"{"success":false,"key":"playlist_not_found","error":"","data":null}"#,
        )
        .await;
        let client = HttpClient::new(&url).unwrap();
        let err = client.rename_playlist(3, "x").await.unwrap_err();
        assert_eq!(err.key, "playlist_not_found");
    }

    #[tokio::test]
    async fn test_non_200_is_http_error() {
        let url = serve_once("401 Unauthorized", "text/plain", "").await;
        let client = HttpClient::new(&url).unwrap();
        let err = client.close_other_session().await.unwrap_err();
        assert_eq!(err.key, "http");
    }

    #[tokio::test]
    async fn test_reset_password_returns_generated() {
        let url = serve_once(
            "200 OK",
            "application/json",
            r#"{"success":true,"key":"","error":"","data":{"newPassword":"k3y"}}"#,
        )
        .await;
        let client = HttpClient::new(&url).unwrap();
        assert_eq!(client.reset_password(7).await.unwrap(), "k3y");
    }

    #[tokio::test]
    async fn test_server_data_defaults_missing_vars() {
        let url = serve_once(
            "200 OK",
            "application/json",
            r#"{"success":true,"key":"","error":"","data":{"users":[]}}"#,
        )
        .await;
        let client = HttpClient::new(&url).unwrap();
        let data = client.server_data().await.unwrap();
        assert!(data.users.is_empty());
        assert_eq!(data.vars, ServerVars::default());
    }

    #[tokio::test]
    async fn test_event_channel_yields_frames() {
        let url = serve_once(
            "200 OK",
            "text/event-stream",
            "event:message\ndata:{\"type\":\"ftpu_done\",\"data\":null}\n\n",
        )
        .await;
        let client = HttpClient::new(&url).unwrap();
        let mut frames = client.connect().await.unwrap();
        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first, r#"{"type":"ftpu_done","data":null}"#);
    }
}
