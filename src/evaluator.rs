//! The evaluator seam and a small reference implementation.
//!
//! The search and training loop only ever see this trait: batched inference
//! producing a policy distribution and a scalar value in `[-1, 1]`, one
//! gradient step, and opaque weight (de)serialization. The bundled
//! [`LinearEvaluator`] is a single linear layer with a softmax policy head
//! and a tanh value head, trained with SGD plus momentum; it exists so the
//! whole loop runs end to end without an external inference runtime.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reservoir::SampleBatch;

/// Losses reported by one training step.
#[derive(Debug, Clone, Copy)]
pub struct Losses {
    pub total: f32,
    pub policy: f32,
    pub value: f32,
}

/// Batched policy/value inference plus a training step.
pub trait Evaluator: Send {
    /// Runs inference on a batch of encoded positions. Returns one policy
    /// vector per input (non-negative, summing to 1 over the full policy
    /// space) and one scalar value per input in `[-1, 1]` from the side to
    /// move's perspective.
    fn predict(&mut self, inputs: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>);

    /// Performs one gradient step on a sampled mini-batch.
    fn train_step(&mut self, batch: &SampleBatch, learning_rate: f32) -> Losses;

    /// Serializes the current parameters into an opaque blob.
    fn save_weights(&self) -> Vec<u8>;

    /// Replaces the current parameters with a previously saved blob.
    fn load_weights(&mut self, blob: &[u8]) -> Result<()>;
}

/// Parameters of [`LinearEvaluator`], including optionally the optimizer
/// (momentum) state. Whether momentum travels with a checkpoint is a
/// configuration choice, not fixed behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearWeights {
    input_size: usize,
    policy_size: usize,
    policy_w: Vec<f32>,
    policy_b: Vec<f32>,
    value_w: Vec<f32>,
    value_b: f32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    momentum: Option<Vec<f32>>,
}

/// A linear policy/value model.
///
/// Policy logits are `W_p x + b_p` softmaxed over the whole policy space;
/// the value is `tanh(w_v . x + b_v)`.
pub struct LinearEvaluator {
    weights: LinearWeights,
    /// One momentum slot per parameter, laid out as
    /// `[policy_w, policy_b, value_w, value_b]`.
    momentum: Vec<f32>,
    momentum_decay: f32,
    /// Serialize optimizer state alongside the parameters.
    pub include_optimizer: bool,
}

impl LinearEvaluator {
    pub fn new(input_size: usize, policy_size: usize) -> LinearEvaluator {
        let weights = LinearWeights {
            input_size,
            policy_size,
            policy_w: vec![0.0; policy_size * input_size],
            policy_b: vec![0.0; policy_size],
            value_w: vec![0.0; input_size],
            value_b: 0.0,
            momentum: None,
        };
        let slots = policy_size * input_size + policy_size + input_size + 1;
        LinearEvaluator {
            weights,
            momentum: vec![0.0; slots],
            momentum_decay: 0.9,
            include_optimizer: false,
        }
    }

    fn forward(&self, input: &[f32]) -> (Vec<f32>, f32) {
        let w = &self.weights;
        let mut logits = w.policy_b.clone();
        for (i, logit) in logits.iter_mut().enumerate() {
            let row = &w.policy_w[i * w.input_size..(i + 1) * w.input_size];
            *logit += row.iter().zip(input).map(|(a, b)| a * b).sum::<f32>();
        }
        // Stable softmax.
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for logit in logits.iter_mut() {
            *logit = (*logit - max).exp();
            sum += *logit;
        }
        for logit in logits.iter_mut() {
            *logit /= sum;
        }

        let raw = w.value_b + w.value_w.iter().zip(input).map(|(a, b)| a * b).sum::<f32>();
        (logits, raw.tanh())
    }
}

impl Evaluator for LinearEvaluator {
    fn predict(&mut self, inputs: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>) {
        let mut policies = Vec::with_capacity(inputs.len());
        let mut values = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (policy, value) = self.forward(input);
            policies.push(policy);
            values.push(value);
        }
        (policies, values)
    }

    fn train_step(&mut self, batch: &SampleBatch, learning_rate: f32) -> Losses {
        let n = batch.inputs.len();
        let input_size = self.weights.input_size;
        let policy_size = self.weights.policy_size;
        let mut grad = vec![0.0f32; self.momentum.len()];
        let mut policy_loss = 0.0f32;
        let mut value_loss = 0.0f32;

        for b in 0..n {
            let input = &batch.inputs[b];
            let target = &batch.policies[b];
            let z = batch.values[b];
            let (policy, value) = self.forward(input);

            // Cross-entropy over the policy head; softmax gradient is p - t.
            for i in 0..policy_size {
                if target[i] > 0.0 {
                    policy_loss -= target[i] * policy[i].max(1e-10).ln();
                }
                let d = policy[i] - target[i];
                let row = i * input_size;
                for (j, x) in input.iter().enumerate() {
                    grad[row + j] += d * x;
                }
                grad[policy_size * input_size + i] += d;
            }

            // Squared error on the value head through the tanh.
            let diff = value - z;
            value_loss += diff * diff;
            let d = 2.0 * diff * (1.0 - value * value);
            let base = policy_size * input_size + policy_size;
            for (j, x) in input.iter().enumerate() {
                grad[base + j] += d * x;
            }
            grad[base + input_size] += d;
        }

        let scale = 1.0 / n as f32;
        let params = self
            .weights
            .policy_w
            .iter_mut()
            .chain(self.weights.policy_b.iter_mut())
            .chain(self.weights.value_w.iter_mut())
            .chain(std::iter::once(&mut self.weights.value_b));
        for ((param, g), m) in params.zip(&grad).zip(self.momentum.iter_mut()) {
            *m = self.momentum_decay * *m + g * scale;
            *param -= learning_rate * *m;
        }

        let policy = policy_loss * scale;
        let value = value_loss * scale;
        Losses {
            total: policy + value,
            policy,
            value,
        }
    }

    fn save_weights(&self) -> Vec<u8> {
        let mut out = self.weights.clone();
        out.momentum = self.include_optimizer.then(|| self.momentum.clone());
        serde_json::to_vec(&out).expect("weight serialization cannot fail")
    }

    fn load_weights(&mut self, blob: &[u8]) -> Result<()> {
        let loaded: LinearWeights =
            serde_json::from_slice(blob).map_err(|e| Error::MalformedWeights(e.to_string()))?;
        if loaded.input_size != self.weights.input_size
            || loaded.policy_size != self.weights.policy_size
        {
            return Err(Error::MalformedWeights(format!(
                "shape mismatch: got {}x{}, expected {}x{}",
                loaded.input_size,
                loaded.policy_size,
                self.weights.input_size,
                self.weights.policy_size
            )));
        }
        if let Some(momentum) = &loaded.momentum {
            if momentum.len() == self.momentum.len() {
                self.momentum.copy_from_slice(momentum);
            }
        }
        self.weights = LinearWeights {
            momentum: None,
            ..loaded
        };
        Ok(())
    }
}
