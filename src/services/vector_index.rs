//! Nearest-neighbour index over question embeddings.
//!
//! Production uses a Qdrant collection over its REST API. When no Qdrant URL is
//! configured the service falls back to [`MemoryVectorIndex`], which is exact
//! but forgets everything on restart.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::question::Question;

/// Denormalized question fields stored next to the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub id: Uuid,
    pub text: String,
    pub category: String,
    pub difficulty: f64,
    pub tags: Vec<String>,
}

impl From<&Question> for VectorPayload {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.question_text.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty,
            tags: q.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    /// Cosine similarity, higher is closer.
    pub score: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, point: VectorPoint) -> Result<()>;
    /// Up to `limit` neighbours ordered by descending similarity.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;
    /// Removing an absent point is not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantIndex {
    pub fn new(client: Client, base_url: String, collection: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Creates the cosine collection if it does not exist yet.
    pub async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let existing = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("qdrant collection lookup failed")?;
        if existing.status().is_success() {
            return Ok(());
        }

        let res = self
            .client
            .put(self.collection_url())
            .json(&serde_json::json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await
            .context("qdrant collection create failed")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("qdrant create collection {}: {}", status, text).into());
        }
        tracing::info!(collection = %self.collection, dimensions, "Created Qdrant collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let res = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&serde_json::json!({
                "points": [{
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                }]
            }))
            .send()
            .await
            .context("qdrant upsert failed")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("qdrant upsert {}: {}", status, text).into());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        #[derive(Deserialize)]
        struct Hit {
            id: Uuid,
            score: f64,
        }
        #[derive(Deserialize)]
        struct SearchResp {
            result: Vec<Hit>,
        }

        let res = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&serde_json::json!({
                "vector": vector,
                "limit": limit,
                "with_payload": false,
            }))
            .send()
            .await
            .context("qdrant search failed")?;
        let status = res.status();
        let txt = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!("qdrant search {}: {}", status, txt).into());
        }
        let parsed: SearchResp = serde_json::from_str(&txt).context("qdrant search parse failed")?;
        Ok(parsed
            .result
            .into_iter()
            .map(|h| ScoredPoint {
                id: h.id,
                score: h.score,
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let res = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&serde_json::json!({ "points": [id] }))
            .send()
            .await
            .context("qdrant delete failed")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("qdrant delete {}: {}", status, text).into());
        }
        Ok(())
    }
}

/// Exact brute-force cosine index held in process memory.
#[derive(Default)]
pub struct MemoryVectorIndex {
    points: RwLock<HashMap<Uuid, VectorPoint>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Zero for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let mut points = self
            .points
            .write()
            .map_err(|_| crate::error::Error::Internal("vector index lock poisoned".into()))?;
        points.insert(point.id, point);
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let points = self
            .points
            .read()
            .map_err(|_| crate::error::Error::Internal("vector index lock poisoned".into()))?;
        let mut scored: Vec<ScoredPoint> = points
            .values()
            .map(|p| ScoredPoint {
                id: p.id,
                score: cosine_similarity(vector, &p.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut points = self
            .points
            .write()
            .map_err(|_| crate::error::Error::Internal("vector index lock poisoned".into()))?;
        points.remove(&id);
        Ok(())
    }
}
