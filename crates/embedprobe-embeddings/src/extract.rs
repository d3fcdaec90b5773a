//! Embedding extraction from raw model outputs
//!
//! Pooled outputs (`[1, hidden]`) pass through as-is. Per-token hidden
//! states (`[1, seq_len, hidden]`) are reduced to the vector at sequence
//! position 0, the class token, rather than averaged over positions.

use ndarray::{s, ArrayView3};
use tracing::debug;

use embedprobe_core::{Error, Result};

use crate::tensor::{ModelOutputs, RawModelOutput};

/// Output names tried in order before falling back to the first output
pub const OUTPUT_PRIORITY: [&str; 5] = [
    "embeddings",
    "output",
    "last_hidden_state",
    "pooler_output",
    "sentence_embedding",
];

/// Pick the output tensor holding the embedding
pub fn select_output(outputs: &ModelOutputs) -> Result<(&str, &RawModelOutput)> {
    for name in OUTPUT_PRIORITY {
        if let Some(output) = outputs.get(name) {
            debug!("Using model output '{}' with shape {:?}", name, output.shape);
            return Ok((name, output));
        }
    }

    match outputs.first() {
        Some((name, output)) => {
            debug!(
                "No well-known output name, falling back to '{}' with shape {:?}",
                name, output.shape
            );
            Ok((name, output))
        }
        None => Err(Error::MissingOutput(
            "model returned no output tensors".into(),
        )),
    }
}

/// Reduce a raw output tensor to a single embedding vector
pub fn extract(output: &RawModelOutput) -> Result<Vec<f32>> {
    match *output.shape.as_slice() {
        [_, _] => Ok(output.data.clone()),
        [batch, seq_len, hidden] => {
            if batch == 0 || seq_len == 0 {
                return Err(Error::Embedding(format!(
                    "Output tensor with shape {:?} has no positions",
                    output.shape
                )));
            }

            let hidden_states = ArrayView3::from_shape((batch, seq_len, hidden), &output.data)
                .map_err(|e| {
                    Error::Embedding(format!(
                        "Output data ({} values) does not match shape {:?}: {}",
                        output.data.len(),
                        output.shape,
                        e
                    ))
                })?;

            Ok(hidden_states.slice(s![0, 0, ..]).to_vec())
        }
        _ => Err(Error::UnsupportedShape(output.shape.clone())),
    }
}

/// Select the embedding output and reduce it in one step
pub fn extract_from(outputs: &ModelOutputs) -> Result<Vec<f32>> {
    let (_, output) = select_output(outputs)?;
    extract(output)
}
