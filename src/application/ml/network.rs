//! Stacked LSTM regressor with a dense head.
//!
//! Layout: `layers` LSTM cells over a univariate sequence, inverted dropout
//! after each recurrent layer (training only), an optional linear hidden dense
//! layer and a single-unit linear output. With `residual` enabled the last
//! input value is added to the output, so the network learns the next step as
//! a correction to persistence.
//!
//! Gradients are computed exactly by backpropagation through time.

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::Rng;
use rand::rngs::StdRng;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

fn uniform(rng: &mut StdRng, shape: (usize, usize), limit: f64) -> Array2<f64> {
    Array2::from_shape_simple_fn(shape, || rng.random_range(-limit..limit))
}

/// One LSTM layer. Gate blocks are stacked `[input, forget, cell, output]`.
#[derive(Debug, Clone)]
pub(crate) struct LstmLayer {
    /// Input weights `(4H, input)`
    w: Array2<f64>,
    /// Recurrent weights `(4H, H)`
    u: Array2<f64>,
    b: Array1<f64>,
}

/// Everything the backward pass needs from one time step
#[derive(Debug, Clone)]
pub(crate) struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
    c: Array1<f64>,
    h: Array1<f64>,
}

impl LstmLayer {
    fn new(input_size: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let mut b = Array1::zeros(4 * hidden);
        // Forget gate starts open
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            w: uniform(rng, (4 * hidden, input_size), limit),
            u: uniform(rng, (4 * hidden, hidden), limit),
            b,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    fn hidden_size(&self) -> usize {
        self.u.ncols()
    }

    fn input_size(&self) -> usize {
        self.w.ncols()
    }

    fn step(&self, x: &Array1<f64>, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> StepCache {
        let hs = self.hidden_size();
        let z = self.w.dot(x) + self.u.dot(h_prev) + &self.b;

        let i = z.slice(s![0..hs]).mapv(sigmoid);
        let f = z.slice(s![hs..2 * hs]).mapv(sigmoid);
        let g = z.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
        let o = z.slice(s![3 * hs..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f64::tanh);
        let h = &o * &tanh_c;

        StepCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
            c,
            h,
        }
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> Vec<StepCache> {
        let hs = self.hidden_size();
        let mut h = Array1::zeros(hs);
        let mut c = Array1::zeros(hs);
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let cache = self.step(x, &h, &c);
            h = cache.h.clone();
            c = cache.c.clone();
            steps.push(cache);
        }
        steps
    }

    /// Accumulate parameter gradients into `grads` and return dL/dx per step.
    ///
    /// `dh_ext[t]` is the gradient flowing into `h_t` from above.
    fn backward(
        &self,
        steps: &[StepCache],
        dh_ext: &[Array1<f64>],
        grads: &mut LstmLayer,
    ) -> Vec<Array1<f64>> {
        let hs = self.hidden_size();
        let mut dh_next = Array1::<f64>::zeros(hs);
        let mut dc_next = Array1::<f64>::zeros(hs);
        let mut dxs = vec![Array1::<f64>::zeros(self.input_size()); steps.len()];

        for t in (0..steps.len()).rev() {
            let cache = &steps[t];
            let dh = &dh_ext[t] + &dh_next;

            let d_o = &dh * &cache.tanh_c;
            let dc = &dc_next + &(&dh * &cache.o * &cache.tanh_c.mapv(|v| 1.0 - v * v));
            let di = &dc * &cache.g;
            let dg = &dc * &cache.i;
            let df = &dc * &cache.c_prev;
            dc_next = &dc * &cache.f;

            let mut dz = Array1::<f64>::zeros(4 * hs);
            dz.slice_mut(s![0..hs])
                .assign(&(&di * &cache.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hs..2 * hs])
                .assign(&(&df * &cache.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hs..3 * hs])
                .assign(&(&dg * &cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hs..])
                .assign(&(&d_o * &cache.o.mapv(|v| v * (1.0 - v))));

            grads.w += &outer(&dz, &cache.x);
            grads.u += &outer(&dz, &cache.h_prev);
            grads.b += &dz;

            dxs[t] = self.w.t().dot(&dz);
            dh_next = self.u.t().dot(&dz);
        }

        dxs
    }
}

/// Fully connected linear layer, `w` is `(out, in)`
#[derive(Debug, Clone)]
pub(crate) struct DenseLayer {
    w: Array2<f64>,
    b: Array1<f64>,
}

impl DenseLayer {
    fn glorot(input: usize, output: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        Self {
            w: uniform(rng, (output, input), limit),
            b: Array1::zeros(output),
        }
    }

    fn zeros(input: usize, output: usize) -> Self {
        Self {
            w: Array2::zeros((output, input)),
            b: Array1::zeros(output),
        }
    }

    fn zeros_like(&self) -> Self {
        Self::zeros(self.w.ncols(), self.w.nrows())
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.w.dot(x) + &self.b
    }
}

/// Shape of a [`LstmNetwork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkShape {
    pub hidden_units: usize,
    pub layers: usize,
    pub dense_units: Option<usize>,
    pub residual: bool,
}

/// Source of dropout masks during training
pub(crate) struct Dropout<'a> {
    pub rate: f64,
    pub rng: &'a mut StdRng,
}

impl Dropout<'_> {
    fn mask(&mut self, len: usize) -> Array1<f64> {
        if self.rate <= 0.0 {
            return Array1::ones(len);
        }
        let keep = 1.0 - self.rate;
        Array1::from_shape_simple_fn(len, || {
            if self.rng.random_bool(keep) {
                1.0 / keep
            } else {
                0.0
            }
        })
    }
}

/// Activations of one forward pass, kept for backpropagation
pub(crate) struct ForwardTrace {
    lstm: Vec<Vec<StepCache>>,
    /// Dropout masks per layer: one per step below the top layer, one for
    /// the final step of the top layer
    masks: Vec<Vec<Array1<f64>>>,
    head_inputs: Vec<Array1<f64>>,
    pub output: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct LstmNetwork {
    layers: Vec<LstmLayer>,
    head: Vec<DenseLayer>,
    residual: bool,
}

impl LstmNetwork {
    pub fn new(shape: NetworkShape, rng: &mut StdRng) -> Self {
        let hidden = shape.hidden_units;
        let mut layers = Vec::with_capacity(shape.layers);
        for idx in 0..shape.layers {
            let input_size = if idx == 0 { 1 } else { hidden };
            layers.push(LstmLayer::new(input_size, hidden, rng));
        }

        let mut head = Vec::with_capacity(2);
        let mut width = hidden;
        if let Some(units) = shape.dense_units {
            head.push(DenseLayer::glorot(width, units, rng));
            width = units;
        }
        // A zero output layer makes the untrained residual network predict persistence
        head.push(if shape.residual {
            DenseLayer::zeros(width, 1)
        } else {
            DenseLayer::glorot(width, 1, rng)
        });

        Self {
            layers,
            head,
            residual: shape.residual,
        }
    }

    /// Same shape, every parameter zero (gradient accumulator)
    pub fn zeros_like(&self) -> Self {
        Self {
            layers: self.layers.iter().map(LstmLayer::zeros_like).collect(),
            head: self.head.iter().map(DenseLayer::zeros_like).collect(),
            residual: self.residual,
        }
    }

    pub fn forward_trace(&self, input: &[f64], mut dropout: Option<Dropout<'_>>) -> ForwardTrace {
        let mut sequence: Vec<Array1<f64>> = input.iter().map(|&v| Array1::from_elem(1, v)).collect();
        let mut lstm = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());

        for (idx, layer) in self.layers.iter().enumerate() {
            let steps = layer.forward(&sequence);
            let hidden: Vec<&Array1<f64>> = if idx + 1 == self.layers.len() {
                steps.last().map(|s| &s.h).into_iter().collect()
            } else {
                steps.iter().map(|s| &s.h).collect()
            };

            let layer_masks: Vec<Array1<f64>> = hidden
                .iter()
                .map(|h| match dropout.as_mut() {
                    Some(d) => d.mask(h.len()),
                    None => Array1::ones(h.len()),
                })
                .collect();

            sequence = hidden
                .iter()
                .zip(&layer_masks)
                .map(|(h, m)| *h * m)
                .collect();

            lstm.push(steps);
            masks.push(layer_masks);
        }

        let mut activation = sequence
            .pop()
            .unwrap_or_else(|| Array1::zeros(self.layers[0].hidden_size()));
        let mut head_inputs = Vec::with_capacity(self.head.len());
        for dense in &self.head {
            let next = dense.forward(&activation);
            head_inputs.push(activation);
            activation = next;
        }

        let mut output = activation.first().copied().unwrap_or(0.0);
        if self.residual {
            output += input.last().copied().unwrap_or(0.0);
        }

        ForwardTrace {
            lstm,
            masks,
            head_inputs,
            output,
        }
    }

    /// Deterministic inference, no dropout
    pub fn predict(&self, input: &[f64]) -> f64 {
        self.forward_trace(input, None).output
    }

    /// Accumulate dL/dθ into `grads` given `d_output = dL/d(output)`.
    pub fn backward(&self, trace: &ForwardTrace, d_output: f64, grads: &mut LstmNetwork) {
        let mut delta = Array1::from_elem(1, d_output);
        for k in (0..self.head.len()).rev() {
            grads.head[k].w += &outer(&delta, &trace.head_inputs[k]);
            grads.head[k].b += &delta;
            delta = self.head[k].w.t().dot(&delta);
        }

        let top = self.layers.len() - 1;
        let steps = trace.lstm[top].len();
        let hs = self.layers[top].hidden_size();
        let mut dh_ext = vec![Array1::<f64>::zeros(hs); steps];
        if let (Some(last), Some(mask)) = (dh_ext.last_mut(), trace.masks[top].first()) {
            *last = &delta * mask;
        }

        for l in (0..=top).rev() {
            let dx = self.layers[l].backward(&trace.lstm[l], &dh_ext, &mut grads.layers[l]);
            if l > 0 {
                dh_ext = dx
                    .iter()
                    .zip(&trace.masks[l - 1])
                    .map(|(d, m)| d * m)
                    .collect();
            }
        }
    }

    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + self.head.len() * 2);
        for layer in &self.layers {
            out.push(layer.w.view().into_dyn());
            out.push(layer.u.view().into_dyn());
            out.push(layer.b.view().into_dyn());
        }
        for dense in &self.head {
            out.push(dense.w.view().into_dyn());
            out.push(dense.b.view().into_dyn());
        }
        out
    }

    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + self.head.len() * 2);
        for layer in &mut self.layers {
            out.push(layer.w.view_mut().into_dyn());
            out.push(layer.u.view_mut().into_dyn());
            out.push(layer.b.view_mut().into_dyn());
        }
        for dense in &mut self.head {
            out.push(dense.w.view_mut().into_dyn());
            out.push(dense.b.view_mut().into_dyn());
        }
        out
    }

    /// Owned zero buffers matching every parameter tensor
    pub fn zero_buffers(&self) -> Vec<ArrayD<f64>> {
        self.tensors()
            .iter()
            .map(|t| ArrayD::zeros(t.raw_dim()))
            .collect()
    }

    pub fn l2_norm(&self) -> f64 {
        self.tensors()
            .iter()
            .map(|t| t.iter().map(|v| v * v).sum::<f64>())
            .sum::<f64>()
            .sqrt()
    }

    pub fn scale(&mut self, factor: f64) {
        for mut t in self.tensors_mut() {
            t.mapv_inplace(|v| v * factor);
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn shape(dense_units: Option<usize>, residual: bool) -> NetworkShape {
        NetworkShape {
            hidden_units: 3,
            layers: 2,
            dense_units,
            residual,
        }
    }

    fn set(net: &mut LstmNetwork, tensor: usize, element: usize, value: f64) {
        let mut tensors = net.tensors_mut();
        if let Some(v) = tensors[tensor].iter_mut().nth(element) {
            *v = value;
        }
    }

    fn loss(net: &LstmNetwork, input: &[f64], target: f64) -> f64 {
        let err = net.predict(input) - target;
        err * err
    }

    #[test]
    fn test_untrained_residual_network_predicts_persistence() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = LstmNetwork::new(shape(Some(4), true), &mut rng);
        let input = [0.1, 0.4, 0.35, 0.6];
        assert_eq!(net.predict(&input), 0.6);
    }

    #[test]
    fn test_parameter_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = LstmNetwork::new(shape(Some(4), false), &mut rng);
        // layer 1: 12*1 + 12*3 + 12, layer 2: 12*3 + 12*3 + 12, dense 4*3 + 4, out 1*4 + 1
        assert_eq!(net.parameter_count(), 60 + 84 + 16 + 5);
    }

    #[test]
    fn test_analytic_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let net = LstmNetwork::new(shape(Some(4), false), &mut rng);
        let input = [0.2, 0.7, 0.1, 0.5, 0.9];
        let target = 0.3;

        let trace = net.forward_trace(&input, None);
        let mut grads = net.zeros_like();
        net.backward(&trace, 2.0 * (trace.output - target), &mut grads);

        let analytic: Vec<f64> = grads
            .tensors()
            .iter()
            .flat_map(|t| t.iter().copied().collect::<Vec<_>>())
            .collect();

        let eps = 1e-6;
        let mut probe = net.clone();
        let mut index = 0;
        let tensor_count = probe.tensors().len();
        for t in 0..tensor_count {
            let len = probe.tensors()[t].len();
            for j in 0..len {
                let original = probe.tensors()[t].iter().nth(j).copied().unwrap();

                set(&mut probe, t, j, original + eps);
                let plus = loss(&probe, &input, target);
                set(&mut probe, t, j, original - eps);
                let minus = loss(&probe, &input, target);
                set(&mut probe, t, j, original);

                let numeric = (plus - minus) / (2.0 * eps);
                let a = analytic[index];
                let tolerance = 1e-6 + 1e-4 * a.abs().max(numeric.abs());
                assert!(
                    (a - numeric).abs() < tolerance,
                    "tensor {} element {}: analytic {} vs numeric {}",
                    t,
                    j,
                    a,
                    numeric
                );
                index += 1;
            }
        }
        assert_eq!(index, analytic.len());
    }

    #[test]
    fn test_dropout_masks_only_active_in_training() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = LstmNetwork::new(shape(None, false), &mut rng);
        let input = [0.5, 0.5, 0.5];

        let a = net.predict(&input);
        let b = net.predict(&input);
        assert_eq!(a, b);

        let mut mask_rng = StdRng::seed_from_u64(99);
        let trace = net.forward_trace(
            &input,
            Some(Dropout {
                rate: 0.5,
                rng: &mut mask_rng,
            }),
        );
        for layer_masks in &trace.masks {
            for mask in layer_masks {
                assert!(mask.iter().all(|&m| m == 0.0 || m == 2.0));
            }
        }
    }

    #[test]
    fn test_scale_and_norm() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = LstmNetwork::new(shape(None, false), &mut rng);
        let before = net.l2_norm();
        net.scale(0.5);
        assert!((net.l2_norm() - before * 0.5).abs() < 1e-9);
    }
}
