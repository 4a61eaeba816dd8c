use std::{fmt::Display, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub mod client;

/// Every stored profile embedding has exactly this many components.
pub const EMBEDDING_DIMENSIONS: usize = 384;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding response did not contain a vector")]
    MalformedResponse,
    #[error("expected a {expected}-dimension embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("embedding has zero norm")]
    ZeroVector,
    #[error("nothing to embed")]
    EmptyInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmbeddingModel {
    #[serde(rename = "gte-small")]
    #[default]
    GteSmall,
}

#[derive(Error, Debug, Clone)]
#[error("Invalid Model: {model}")]
pub struct ModelParsingError {
    pub model: String,
}

impl FromStr for EmbeddingModel {
    type Err = ModelParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gte-small" | "Supabase/gte-small" => Ok(EmbeddingModel::GteSmall),
            m => Err(ModelParsingError {
                model: m.to_string(),
            }),
        }
    }
}

impl Display for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_name())
    }
}

impl EmbeddingModel {
    pub fn model_name(&self) -> &'static str {
        match self {
            EmbeddingModel::GteSmall => "gte-small",
        }
    }

    /// Input window in characters. gte-small reads 512 tokens; four
    /// characters per token keeps us under it for English profile text.
    pub fn max_input_chars(&self) -> usize {
        match self {
            EmbeddingModel::GteSmall => 2048,
        }
    }

    pub fn construct_request_body(&self, text: &str) -> Value {
        json!({
            "input": text,
            "model": self.model_name(),
        })
    }

    pub fn extract_embedding_from_response_body(&self, body: &Value) -> Option<Vec<f32>> {
        body.get("data")?
            .get(0)?
            .get("embedding")?
            .as_array()?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    }
}

/// A validated, L2-normalised embedding of [`EMBEDDING_DIMENSIONS`] components.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Rejects vectors of the wrong size, with NaN/inf components, or with zero
    /// norm (a zero vector has no direction and cannot be ranked by cosine).
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIMENSIONS {
            return Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite);
        }

        let norm = values
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::ZeroVector);
        }

        Ok(Embedding(
            values
                .into_iter()
                .map(|v| (f64::from(v) / norm) as f32)
                .collect(),
        ))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// pgvector text representation, e.g. `[0.1,0.2,0.3]`, for binding as `$1::vector`.
    pub fn to_pgvector(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        format!("[{}]", parts.join(","))
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize) -> Vec<f32> {
        let mut values = vec![0.0; EMBEDDING_DIMENSIONS];
        values[index] = 3.0;
        values
    }

    #[test]
    fn normalises_valid_vectors() {
        let embedding = Embedding::new(unit(7)).unwrap();
        assert_eq!(embedding.dimensions(), EMBEDDING_DIMENSIONS);
        assert_eq!(embedding.as_slice()[7], 1.0);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let err = Embedding::new(vec![1.0; 1536]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 1536
            }
        ));
    }

    #[test]
    fn rejects_zero_and_non_finite_vectors() {
        assert!(matches!(
            Embedding::new(vec![0.0; EMBEDDING_DIMENSIONS]),
            Err(EmbeddingError::ZeroVector)
        ));

        let mut values = unit(0);
        values[3] = f32::NAN;
        assert!(matches!(
            Embedding::new(values),
            Err(EmbeddingError::NonFinite)
        ));
    }

    #[test]
    fn normalises_large_finite_components() {
        let mut values = vec![0.0; EMBEDDING_DIMENSIONS];
        values[0] = 1e20;
        values[1] = 1e20;
        let embedding = Embedding::new(values).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((embedding.as_slice()[0] - expected).abs() < 1e-6);
        assert!((embedding.as_slice()[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn renders_pgvector_literal() {
        let literal = Embedding::new(unit(0)).unwrap().to_pgvector();
        assert!(literal.starts_with("[1,0,0"));
        assert!(literal.ends_with(']'));
        assert_eq!(literal.matches(',').count(), EMBEDDING_DIMENSIONS - 1);
    }

    #[test]
    fn parses_model_names() {
        assert_eq!(
            "gte-small".parse::<EmbeddingModel>().unwrap(),
            EmbeddingModel::GteSmall
        );
        assert!("text-embedding-3-large".parse::<EmbeddingModel>().is_err());
        assert_eq!(EmbeddingModel::GteSmall.to_string(), "gte-small");
    }

    #[test]
    fn extracts_embedding_from_openai_shaped_body() {
        let body = json!({"data": [{"embedding": [0.5, -0.25], "index": 0}]});
        assert_eq!(
            EmbeddingModel::GteSmall.extract_embedding_from_response_body(&body),
            Some(vec![0.5, -0.25])
        );
        assert_eq!(
            EmbeddingModel::GteSmall.extract_embedding_from_response_body(&json!({"data": []})),
            None
        );
    }
}
