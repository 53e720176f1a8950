use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Protocol constant: vector dimension produced by the built-in provider.
/// An HTTP deployment must be configured to match; stored vectors of a
/// different dimension simply score zero in the cosine scan.
pub const EMBEDDING_DIM: usize = 256;

/// The external embeddings collaborator: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: "text-embedding-3-small".to_string(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut req = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "input": [text],
            }));

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("embeddings endpoint returned {}", resp.status());
        }

        let body: EmbeddingsResponse = resp.json().await?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }
}

/// Deterministic local embedder: hashed token buckets, L2-normalized.
/// Texts sharing tokens land near each other, which is enough for dev
/// deployments and tests; production points at an HTTP provider instead.
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dim: EMBEDDING_DIM }
    }
}

impl HashEmbeddingProvider {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dim;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.embed("google workspace cli").await.unwrap();
        let b = provider.embed("google workspace cli").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_shared_tokens_score_higher() {
        let provider = HashEmbeddingProvider::default();
        let gif = provider.embed("animated gif encoder").await.unwrap();
        let gif2 = provider.embed("gif encoder for animations").await.unwrap();
        let other = provider.embed("postgres migration helper").await.unwrap();

        assert!(cosine(&gif, &gif2) > cosine(&gif, &other));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::default();
        let v = provider.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
