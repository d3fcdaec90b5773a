//! Named tensors exchanged with an inference engine

use crate::tokenizer::TokenizedInput;

pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";

/// An integer input tensor of shape `[1, seq_len]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTensor {
    pub data: Vec<i64>,
    pub shape: [usize; 2],
}

impl InputTensor {
    /// Wrap a single sequence as a batch of one
    pub fn single(data: Vec<i64>) -> Self {
        let len = data.len();
        Self {
            data,
            shape: [1, len],
        }
    }
}

/// Ordered, named engine inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInputs {
    tensors: Vec<(String, InputTensor)>,
}

impl ModelInputs {
    /// Build `input_ids`, `attention_mask` and, when present, `token_type_ids`
    pub fn from_tokenized(input: &TokenizedInput) -> Self {
        let mut inputs = Self::default();
        inputs.push(INPUT_IDS, InputTensor::single(input.input_ids.clone()));
        inputs.push(ATTENTION_MASK, InputTensor::single(input.attention_mask.clone()));
        if let Some(ref type_ids) = input.token_type_ids {
            inputs.push(TOKEN_TYPE_IDS, InputTensor::single(type_ids.clone()));
        }
        inputs
    }

    pub fn push(&mut self, name: impl Into<String>, tensor: InputTensor) {
        self.tensors.push((name.into(), tensor));
    }

    pub fn get(&self, name: &str) -> Option<&InputTensor> {
        self.tensors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputTensor)> {
        self.tensors.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// A float output tensor: flat row-major data plus its dims
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl RawModelOutput {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Ordered, named engine outputs; insertion order is the engine's order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    tensors: Vec<(String, RawModelOutput)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, output: RawModelOutput) {
        self.tensors.push((name.into(), output));
    }

    pub fn with(mut self, name: impl Into<String>, output: RawModelOutput) -> Self {
        self.push(name, output);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawModelOutput> {
        self.tensors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn first(&self) -> Option<(&str, &RawModelOutput)> {
        self.tensors.first().map(|(n, t)| (n.as_str(), t))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_from_tokenized_without_type_ids() {
        let tokenized = TokenizedInput {
            input_ids: vec![5, 1, 6, 4],
            attention_mask: vec![1, 1, 1, 0],
            token_type_ids: None,
        };
        let inputs = ModelInputs::from_tokenized(&tokenized);

        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs.names().collect::<Vec<_>>(),
            vec!["input_ids", "attention_mask"]
        );
        let ids = inputs.get(INPUT_IDS).unwrap();
        assert_eq!(ids.shape, [1, 4]);
        assert_eq!(ids.data, vec![5, 1, 6, 4]);
        assert_eq!(inputs.get(ATTENTION_MASK).unwrap().data, vec![1, 1, 1, 0]);
        assert!(inputs.get(TOKEN_TYPE_IDS).is_none());
    }

    #[test]
    fn test_inputs_from_tokenized_with_type_ids() {
        let tokenized = TokenizedInput {
            input_ids: vec![5, 6],
            attention_mask: vec![1, 1],
            token_type_ids: Some(vec![0, 0]),
        };
        let inputs = ModelInputs::from_tokenized(&tokenized);
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs.get(TOKEN_TYPE_IDS).unwrap().shape, [1, 2]);
    }

    #[test]
    fn test_outputs_keep_order() {
        let outputs = ModelOutputs::new()
            .with("z_last", RawModelOutput::new(vec![1.0], vec![1, 1]))
            .with("a_first", RawModelOutput::new(vec![2.0], vec![1, 1]));

        assert_eq!(outputs.first().map(|(n, _)| n), Some("z_last"));
        assert_eq!(outputs.names().collect::<Vec<_>>(), vec!["z_last", "a_first"]);
        assert_eq!(outputs.get("a_first").unwrap().data, vec![2.0]);
        assert!(outputs.get("missing").is_none());
    }
}
