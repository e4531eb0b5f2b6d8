use super::network::LstmNetwork;
use ndarray::{ArrayD, Zip};

/// Adam with bias correction
#[derive(Debug, Clone)]
pub(crate) struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(network: &LstmNetwork, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: network.zero_buffers(),
            v: network.zero_buffers(),
        }
    }

    pub fn update(&mut self, network: &mut LstmNetwork, grads: &LstmNetwork) {
        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step);
        let bc2 = 1.0 - self.beta2.powi(self.step);
        let (beta1, beta2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);

        let grads = grads.tensors();
        for (((param, grad), m), v) in network
            .tensors_mut()
            .into_iter()
            .zip(grads.iter())
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bc1;
                    let v_hat = *v / bc2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

/// Rescale `grads` so their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub(crate) fn clip_global_norm(grads: &mut LstmNetwork, max_norm: f64) -> f64 {
    let norm = grads.l2_norm();
    if max_norm > 0.0 && norm > max_norm {
        grads.scale(max_norm / norm);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::network::NetworkShape;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn network() -> LstmNetwork {
        let mut rng = StdRng::seed_from_u64(1);
        LstmNetwork::new(
            NetworkShape {
                hidden_units: 4,
                layers: 1,
                dense_units: None,
                residual: false,
            },
            &mut rng,
        )
    }

    #[test]
    fn test_clip_global_norm() {
        let mut grads = network();
        let before = grads.l2_norm();
        assert!(before > 1.0);

        let reported = clip_global_norm(&mut grads, 1.0);
        assert_eq!(reported, before);
        assert!((grads.l2_norm() - 1.0).abs() < 1e-9);

        let unchanged = clip_global_norm(&mut grads, 10.0);
        assert!((unchanged - 1.0).abs() < 1e-9);
        assert!((grads.l2_norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_adam_step_moves_each_weight_by_learning_rate() {
        let mut net = network();
        let before = net.clone();
        let mut grads = net.zeros_like();
        for mut t in grads.tensors_mut() {
            t.fill(0.5);
        }

        let mut adam = Adam::new(&net, 0.01);
        adam.update(&mut net, &grads);

        for (after, prior) in net.tensors().iter().zip(before.tensors().iter()) {
            for (a, b) in after.iter().zip(prior.iter()) {
                // Bias-corrected first step is lr * g / (|g| + eps)
                assert!((b - a - 0.01).abs() < 1e-6);
            }
        }
    }
}
