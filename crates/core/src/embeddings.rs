use crate::error::EmbedError;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Maps text to a fixed-length vector. Implementations must always return
/// `dimensions()` values.
pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
}

/// Offline embedder: hashes character trigrams of each word into buckets and
/// L2-normalizes the result.
#[derive(Debug, Clone, Copy)]
pub struct TrigramEmbedder {
    pub dimensions: usize,
}

impl Default for TrigramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for TrigramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            // Pad so short words still produce a trigram.
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for window in padded.windows(3) {
                let bucket = (fnv1a(window) % vector.len() as u64) as usize;
                vector[bucket] += 1.0;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash = 1469598103934665603u64;
    let mut buffer = [0u8; 4];
    for ch in chars {
        for byte in ch.encode_utf8(&mut buffer).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
    }
    hash
}

/// Blocking client for an HTTP embedding endpoint. Understands both the
/// `{"embedding": [...]}` and `{"data": [{"embedding": [...]}]}` response
/// shapes.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    endpoint: Url,
    model: String,
    dimensions: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model: impl Into<String>, dimensions: usize) -> Result<Self, EmbedError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.into(),
            dimensions,
            client: Client::new(),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "model": self.model,
                "prompt": text,
                "input": text,
            }))
            .send()?;

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json()?;
        let vector = vector_from_response(&parsed).ok_or_else(|| EmbedError::BackendResponse {
            backend: self.endpoint.to_string(),
            details: "response carries no embedding".to_string(),
        })?;

        if vector.len() != self.dimensions {
            return Err(EmbedError::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }
}

fn vector_from_response(parsed: &Value) -> Option<Vec<f32>> {
    let values = parsed
        .pointer("/embedding")
        .or_else(|| parsed.pointer("/data/0/embedding"))
        .or_else(|| parsed.pointer("/embeddings/0"))
        .and_then(Value::as_array)?;

    values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect()
}
