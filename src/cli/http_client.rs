use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Timeout for everything except uploads and downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    /// No overall timeout; bundle transfers can be slow.
    transfer_client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSkill {
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVersion {
    pub version: String,
    #[serde(default)]
    pub changelog: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOwner {
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSkillDetail {
    pub skill: RemoteSkill,
    #[serde(default)]
    pub latest_version: Option<RemoteVersion>,
    #[serde(default)]
    pub owner: Option<RemoteOwner>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRef {
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    #[serde(rename = "match", default)]
    pub matched: Option<VersionRef>,
    #[serde(default)]
    pub latest_version: Option<VersionRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    pub score: f32,
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub skill_id: String,
    pub version_id: String,
    pub slug: String,
    pub version: String,
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
pub struct WhoamiResult {
    pub user: RemoteOwner,
}

/// A file staged for multipart upload.
pub struct UploadFile {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let transfer_client = Client::builder().build()?;
        Ok(Self {
            client,
            transfer_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn handle<T: DeserializeOwned>(&self, resp: reqwest::Response) -> anyhow::Result<T> {
        if resp.status().is_success() {
            let api_resp: ApiResponse<T> = resp.json().await?;
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("Server returned an empty response"))
        } else {
            Err(anyhow::anyhow!(self.error_message(resp).await))
        }
    }

    async fn error_message(&self, resp: reqwest::Response) -> String {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("a moment")
                .to_string();
            return format!("Rate limited; retry after {retry} seconds");
        }
        match resp.json::<ApiResponse<()>>().await {
            Ok(api_resp) => api_resp
                .error
                .unwrap_or_else(|| format!("Server error ({status})")),
            Err(_) => format!("Server error ({status})"),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.authorize(self.client.get(self.url(path))).send().await?;
        self.handle(resp).await
    }

    /// GET that maps 404 to None.
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<Option<T>> {
        let resp = self.authorize(self.client.get(self.url(path))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.handle(resp).await.map(Some)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let resp = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        self.handle(resp).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self
            .authorize(self.client.delete(self.url(path)))
            .send()
            .await?;
        self.handle(resp).await
    }

    pub async fn get_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self
            .authorize(self.transfer_client.get(self.url(path)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(self.error_message(resp).await));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    // ── Typed endpoints ─────────────────────────────────────────────────────

    pub async fn get_skill(&self, slug: &str) -> anyhow::Result<Option<RemoteSkillDetail>> {
        self.get_optional(&format!("/skills/{slug}")).await
    }

    pub async fn resolve(&self, slug: &str, hash: &str) -> anyhow::Result<ResolveResult> {
        self.get(&format!("/skill/resolve?slug={slug}&hash={hash}"))
            .await
    }

    pub async fn search(&self, query: &str, limit: usize) -> anyhow::Result<SearchResults> {
        let q = urlencode(query);
        self.get(&format!("/search?q={q}&limit={limit}")).await
    }

    pub async fn explore(&self, limit: usize) -> anyhow::Result<Vec<RemoteSkill>> {
        let resp = self
            .authorize(
                self.client
                    .get(self.url(&format!("/skills?sort=trending&limit={limit}"))),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(self.error_message(resp).await));
        }
        let page: PaginatedResponse<RemoteSkill> = resp.json().await?;
        Ok(page.data)
    }

    pub async fn whoami(&self) -> anyhow::Result<WhoamiResult> {
        self.get("/whoami").await
    }

    pub async fn download_zip(&self, slug: &str, version: &str) -> anyhow::Result<Vec<u8>> {
        self.get_bytes(&format!("/download?slug={slug}&version={version}"))
            .await
    }

    pub async fn publish(
        &self,
        payload: &serde_json::Value,
        files: Vec<UploadFile>,
    ) -> anyhow::Result<PublishResult> {
        let mut form = reqwest::multipart::Form::new().text("payload", payload.to_string());

        for file in files {
            let mut part =
                reqwest::multipart::Part::bytes(file.bytes).file_name(file.path.clone());
            if let Some(ct) = &file.content_type {
                part = part.mime_str(ct)?;
            }
            form = form.part("files", part);
        }

        let resp = self
            .authorize(self.transfer_client.post(self.url("/skills")))
            .multipart(form)
            .send()
            .await?;
        self.handle(resp).await
    }

    pub async fn report_install(
        &self,
        slug: &str,
        version: &str,
        client_id: &str,
        action: &str,
    ) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .post(
                "/installs",
                &serde_json::json!({
                    "slug": slug,
                    "version": version,
                    "clientId": client_id,
                    "action": action,
                }),
            )
            .await?;
        Ok(())
    }
}

/// Minimal percent-encoding for query values.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("gif encoder"), "gif%20encoder");
        assert_eq!(urlencode("simple"), "simple");
        assert_eq!(urlencode("a+b"), "a%2Bb");
    }
}
