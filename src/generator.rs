use anyhow::Result;
use ndarray::{Array4, ArrayD};

/// Whether normalisation layers use batch statistics or the accumulated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Training,
    Inference,
}

/// What a generative model is fed: noise, plus a conditioning label for
/// conditional models.
#[derive(Debug, Clone)]
pub struct GeneratorInput {
    pub noise: ArrayD<f32>,
    pub labels: Option<ArrayD<f32>>,
}

impl GeneratorInput {
    pub fn plain(noise: ArrayD<f32>) -> Self {
        Self { noise, labels: None }
    }

    pub fn conditional(noise: ArrayD<f32>, labels: ArrayD<f32>) -> Self {
        Self {
            noise,
            labels: Some(labels),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.labels.is_some()
    }
}

/// A model that turns an input batch into a batch of images laid out as
/// `(samples, height, width, channels)`.
pub trait Generator {
    fn generate(&self, input: &GeneratorInput, mode: ExecutionMode) -> Result<Array4<f32>>;
}

impl<F> Generator for F
where
    F: Fn(&GeneratorInput, ExecutionMode) -> Result<Array4<f32>>,
{
    fn generate(&self, input: &GeneratorInput, mode: ExecutionMode) -> Result<Array4<f32>> {
        self(input, mode)
    }
}
