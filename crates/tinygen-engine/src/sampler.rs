use anyhow::Error;
use itertools::Itertools;
use web_rwkv::tensor::{TensorCpu, TensorInit, TensorShape};

/// Nucleus sampler: candidate tokens are restricted to the smallest set whose
/// cumulative probability exceeds `top_p`, then drawn with the caller's
/// temperature.
pub struct Sampler {
    pub top_p: f32,
    pub temperature: f32,
}

impl Sampler {
    /// Ban the padding token before softmax.
    pub fn mask_padding(&self, logits: &TensorCpu<f32>) -> Result<TensorCpu<f32>, Error> {
        let shape = logits.shape();
        let mut logits: Vec<_> = logits.iter().cloned().collect();

        logits[0] = f32::NEG_INFINITY;
        let logits = TensorCpu::from_data(shape, logits)?;

        Ok(logits)
    }

    pub fn sample(&self, probabilities: &[f32]) -> u16 {
        // Zero temperature means greedy decoding.
        if self.temperature == 0.0 {
            let token = probabilities
                .iter()
                .enumerate()
                .max_by(|(_, x), (_, y)| x.total_cmp(y))
                .map(|(id, _)| id)
                .unwrap_or_default();
            return token as u16;
        }

        let sorted: Vec<_> = probabilities
            .iter()
            .copied()
            .enumerate()
            .sorted_unstable_by(|(_, x), (_, y)| x.total_cmp(y).reverse())
            .scan((0, 0.0, 0.0), |(_, cum, _), (id, x)| {
                if *cum > self.top_p {
                    None
                } else {
                    *cum += x;
                    Some((id, *cum, x))
                }
            })
            .map(|(id, _, x)| (id, x.powf(1.0 / self.temperature)))
            .collect();

        let sum: f32 = sorted.iter().map(|(_, x)| x).sum();
        let sorted: Vec<_> = sorted
            .into_iter()
            .map(|(id, x)| (id, x / sum))
            .scan((0, 0.0), |(_, cum), (id, x)| {
                *cum += x;
                Some((id, *cum))
            })
            .collect();

        let rand = fastrand::f32();
        let token = sorted
            .into_iter()
            .find_or_first(|&(_, cum)| rand <= cum)
            .map(|(id, _)| id)
            .unwrap_or_default();
        token as u16
    }
}
