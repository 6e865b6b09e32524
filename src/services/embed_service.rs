use anyhow::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbedService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

impl EmbedService {
    pub fn new(api_key: String, base_url: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
            dimensions: None,
        }
    }

    /// Requests vectors of a fixed size and rejects responses of any other size.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// One vector per input, in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let res = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimensions,
            })
            .send()
            .await
            .context("embeddings request failed")?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!("embeddings status {}: {}", status.as_u16(), body).into());
        }

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&body).context("embeddings parse failed")?;
        order_rows(&mut parsed.data, texts.len(), self.dimensions)?;
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("empty embedding returned").into())
    }
}

fn order_rows(rows: &mut [EmbeddingRow], expected: usize, dimensions: Option<usize>) -> Result<()> {
    if rows.len() != expected {
        return Err(anyhow::anyhow!(
            "embeddings returned {} vectors for {} inputs",
            rows.len(),
            expected
        )
        .into());
    }
    rows.sort_by_key(|row| row.index);
    if let Some(dims) = dimensions {
        if let Some(bad) = rows.iter().find(|row| row.embedding.len() != dims) {
            return Err(anyhow::anyhow!(
                "embedding has {} dimensions, expected {}",
                bad.embedding.len(),
                dims
            )
            .into());
        }
    }
    Ok(())
}
