//! Graph autoencoder for edge plausibility scoring.
//!
//! A two-layer GCN encoder embeds every node; an MLP decoder reads the
//! concatenated embeddings of a node pair and predicts whether the directed
//! edge between them should exist. The model is trained from scratch on one
//! graph with observed edges as positives and uniformly sampled pairs as
//! negatives, then scores the observed edges. Nothing is persisted.

use crate::types::TransactionGraph;
use hashbrown::HashMap;
use ledgerlens_core::config::LearnedConfig;
use ledgerlens_core::error::{EngineError, Result};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Width of the node feature vector.
pub const FEATURE_DIM: usize = 5;

// ============================================================================
// Configuration
// ============================================================================

/// Autoencoder hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// First GCN layer width.
    pub hidden_dim: usize,
    /// Embedding width.
    pub embedding_dim: usize,
    /// Decoder hidden width.
    pub decoder_hidden_dim: usize,
    /// Training iterations.
    pub epochs: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self::from(&LearnedConfig::default())
    }
}

impl From<&LearnedConfig> for AutoencoderConfig {
    fn from(config: &LearnedConfig) -> Self {
        Self {
            hidden_dim: config.hidden_dim,
            embedding_dim: config.embedding_dim,
            decoder_hidden_dim: config.decoder_hidden_dim,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
        }
    }
}

// ============================================================================
// Graph Tensors
// ============================================================================

/// Sparse normalized adjacency with self-loops.
///
/// Each entry `(dst, src, coef)` contributes `coef * x[src]` to `out[dst]`,
/// with `coef = w / sqrt(deg(src) * deg(dst))` and `deg` the weighted
/// in-degree including the self-loop.
#[derive(Debug, Clone)]
pub struct Propagation {
    entries: Vec<(usize, usize, f64)>,
}

impl Propagation {
    fn new(num_nodes: usize, edges: &[(usize, usize)], weights: &[f64]) -> Self {
        let mut degree = vec![1.0; num_nodes];
        for (&(_, dst), &w) in edges.iter().zip(weights) {
            degree[dst] += w;
        }

        let mut entries = Vec::with_capacity(edges.len() + num_nodes);
        for (&(src, dst), &w) in edges.iter().zip(weights) {
            entries.push((dst, src, w / (degree[src] * degree[dst]).sqrt()));
        }
        for (i, d) in degree.iter().enumerate() {
            entries.push((i, i, 1.0 / d));
        }
        Self { entries }
    }

    /// `A_hat * m`
    fn forward(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(m.nrows(), m.ncols());
        for &(dst, src, coef) in &self.entries {
            for c in 0..m.ncols() {
                out[(dst, c)] += coef * m[(src, c)];
            }
        }
        out
    }

    /// `A_hat^T * g`
    fn backward(&self, g: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(g.nrows(), g.ncols());
        for &(dst, src, coef) in &self.entries {
            for c in 0..g.ncols() {
                out[(src, c)] += coef * g[(dst, c)];
            }
        }
        out
    }

    /// Number of non-zero entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Model inputs derived from one graph.
#[derive(Debug, Clone)]
pub struct GraphTensors {
    /// Node names by index (sorted).
    pub nodes: Vec<String>,
    /// Node features, `n x FEATURE_DIM`, each column in [0, 1].
    pub features: DMatrix<f64>,
    /// Observed edges as `(src, dst)` indices, sorted by names.
    pub edges: Vec<(usize, usize)>,
    /// Normalized propagation operator.
    pub propagation: Propagation,
}

impl GraphTensors {
    /// Build features and propagation from a graph.
    ///
    /// Features per node: in-degree, out-degree, inbound amount, outbound
    /// amount and a zero placeholder. The first four are `log1p`-transformed
    /// then min-max scaled per column; constant columns become zero.
    pub fn from_graph(graph: &TransactionGraph) -> Result<Self> {
        let nodes: Vec<String> = graph.nodes().map(String::from).collect();
        let n = nodes.len();
        if n < 2 {
            return Err(EngineError::FeatureConstruction(format!(
                "need at least 2 nodes, got {}",
                n
            )));
        }
        if graph.edge_count() == 0 {
            return Err(EngineError::FeatureConstruction("graph has no edges".into()));
        }

        let mut features = DMatrix::zeros(n, FEATURE_DIM);
        for (i, name) in nodes.iter().enumerate() {
            let raw = [
                graph.in_degree(name) as f64,
                graph.out_degree(name) as f64,
                graph.in_amount(name),
                graph.out_amount(name),
            ];
            for (c, value) in raw.iter().enumerate() {
                features[(i, c)] = value.ln_1p();
            }
        }
        for c in 0..FEATURE_DIM - 1 {
            let column = features.column(c);
            let (min, max) = (column.min(), column.max());
            let span = max - min;
            for i in 0..n {
                features[(i, c)] = if span > 1e-12 {
                    (features[(i, c)] - min) / span
                } else {
                    0.0
                };
            }
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::FeatureConstruction(
                "non-finite node feature".into(),
            ));
        }

        let (edges, weights) = Self::edge_list(graph, &nodes)?;

        let propagation = Propagation::new(n, &edges, &weights);
        Ok(Self {
            nodes,
            features,
            edges,
            propagation,
        })
    }

    /// Index pairs and `log1p` weights of every edge, in graph order.
    fn edge_list(
        graph: &TransactionGraph,
        nodes: &[String],
    ) -> Result<(Vec<(usize, usize)>, Vec<f64>)> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut edges = Vec::with_capacity(graph.edge_count());
        let mut weights = Vec::with_capacity(graph.edge_count());
        for (source, target, edge) in graph.edges() {
            let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) else {
                return Err(EngineError::FeatureConstruction(format!(
                    "edge {} -> {} references an unknown node",
                    source, target
                )));
            };
            edges.push((s, t));
            weights.push(edge.weight().ln_1p());
        }
        Ok((edges, weights))
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

// ============================================================================
// Parameters and Optimizer
// ============================================================================

#[derive(Debug, Clone)]
struct Parameters {
    w1: DMatrix<f64>,
    b1: DMatrix<f64>,
    w2: DMatrix<f64>,
    b2: DMatrix<f64>,
    v1: DMatrix<f64>,
    c1: DMatrix<f64>,
    v2: DMatrix<f64>,
    c2: DMatrix<f64>,
}

impl Parameters {
    /// Xavier-uniform weights, zero biases.
    fn xavier(config: &AutoencoderConfig, rng: &mut StdRng) -> Self {
        let mut glorot = |rows: usize, cols: usize| {
            let limit = (6.0 / (rows + cols) as f64).sqrt();
            DMatrix::from_fn(rows, cols, |_, _| rng.random_range(-limit..limit))
        };
        let (h, e, d) = (
            config.hidden_dim,
            config.embedding_dim,
            config.decoder_hidden_dim,
        );
        Self {
            w1: glorot(FEATURE_DIM, h),
            w2: glorot(h, e),
            v1: glorot(2 * e, d),
            v2: glorot(d, 1),
            b1: DMatrix::zeros(1, h),
            b2: DMatrix::zeros(1, e),
            c1: DMatrix::zeros(1, d),
            c2: DMatrix::zeros(1, 1),
        }
    }

    fn zeros_like(&self) -> Self {
        let z = |m: &DMatrix<f64>| DMatrix::zeros(m.nrows(), m.ncols());
        Self {
            w1: z(&self.w1),
            b1: z(&self.b1),
            w2: z(&self.w2),
            b2: z(&self.b2),
            v1: z(&self.v1),
            c1: z(&self.c1),
            v2: z(&self.v2),
            c2: z(&self.c2),
        }
    }

    fn tensors(&self) -> [&DMatrix<f64>; 8] {
        [
            &self.w1, &self.b1, &self.w2, &self.b2, &self.v1, &self.c1, &self.v2, &self.c2,
        ]
    }

    fn tensors_mut(&mut self) -> [&mut DMatrix<f64>; 8] {
        [
            &mut self.w1,
            &mut self.b1,
            &mut self.w2,
            &mut self.b2,
            &mut self.v1,
            &mut self.c1,
            &mut self.v2,
            &mut self.c2,
        ]
    }
}

#[derive(Debug)]
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    first: Parameters,
    second: Parameters,
}

impl Adam {
    fn new(params: &Parameters, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first: params.zeros_like(),
            second: params.zeros_like(),
        }
    }

    fn update(&mut self, params: &mut Parameters, grads: &Parameters) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);

        let moments = self
            .first
            .tensors_mut()
            .into_iter()
            .zip(self.second.tensors_mut());
        for ((param, grad), (m, v)) in params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(moments)
        {
            for k in 0..param.len() {
                let g = grad[k];
                m[k] = b1 * m[k] + (1.0 - b1) * g;
                v[k] = b2 * v[k] + (1.0 - b2) * g * g;
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                param[k] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
    }
}

// ============================================================================
// Numerics
// ============================================================================

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow.
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn relu(m: &DMatrix<f64>) -> DMatrix<f64> {
    m.map(|x| x.max(0.0))
}

fn relu_mask(m: &DMatrix<f64>) -> DMatrix<f64> {
    m.map(|x| if x > 0.0 { 1.0 } else { 0.0 })
}

fn add_row(m: &mut DMatrix<f64>, row: &DMatrix<f64>) {
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            m[(i, j)] += row[(0, j)];
        }
    }
}

fn column_sums(m: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(1, m.ncols(), |_, j| m.column(j).sum())
}

// ============================================================================
// Model
// ============================================================================

struct Encoded {
    h1_pre: DMatrix<f64>,
    h1: DMatrix<f64>,
    z: DMatrix<f64>,
}

struct Decoded {
    pairs_in: DMatrix<f64>,
    d1_pre: DMatrix<f64>,
    d1: DMatrix<f64>,
    logits: DMatrix<f64>,
}

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Iterations run.
    pub epochs: usize,
    /// Loss at the first iteration.
    pub initial_loss: f64,
    /// Loss at the last iteration.
    pub final_loss: f64,
    /// Positive edges per iteration.
    pub positives: usize,
}

/// GCN encoder with MLP edge decoder.
#[derive(Debug, Clone)]
pub struct EdgeAutoencoder {
    config: AutoencoderConfig,
    params: Parameters,
}

impl EdgeAutoencoder {
    /// Freshly initialized model.
    #[must_use]
    pub fn new(config: AutoencoderConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = Parameters::xavier(&config, &mut rng);
        Self { config, params }
    }

    /// Model configuration.
    #[must_use]
    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    fn encode(&self, t: &GraphTensors) -> Encoded {
        let mut h1_pre = t.propagation.forward(&(&t.features * &self.params.w1));
        add_row(&mut h1_pre, &self.params.b1);
        let h1 = relu(&h1_pre);

        let mut z = t.propagation.forward(&(&h1 * &self.params.w2));
        add_row(&mut z, &self.params.b2);

        Encoded { h1_pre, h1, z }
    }

    fn decode(&self, z: &DMatrix<f64>, pairs: &[(usize, usize)]) -> Decoded {
        let e = z.ncols();
        let pairs_in = DMatrix::from_fn(pairs.len(), 2 * e, |r, c| {
            let (src, dst) = pairs[r];
            if c < e { z[(src, c)] } else { z[(dst, c - e)] }
        });

        let mut d1_pre = &pairs_in * &self.params.v1;
        add_row(&mut d1_pre, &self.params.c1);
        let d1 = relu(&d1_pre);

        let mut logits = &d1 * &self.params.v2;
        add_row(&mut logits, &self.params.c2);

        Decoded {
            pairs_in,
            d1_pre,
            d1,
            logits,
        }
    }

    /// Loss and parameter gradients for one batch of positives and negatives.
    fn loss_and_gradients(
        &self,
        t: &GraphTensors,
        negatives: &[(usize, usize)],
        epoch: usize,
    ) -> Result<(f64, Parameters)> {
        let positives = t.edges.len();
        let pairs: Vec<(usize, usize)> = t.edges.iter().chain(negatives).copied().collect();

        let enc = self.encode(t);
        let dec = self.decode(&enc.z, &pairs);

        // Mean BCE over positives plus mean BCE over negatives.
        let (n_pos, n_neg) = (positives as f64, negatives.len().max(1) as f64);
        let mut loss = 0.0;
        let mut d_logits = DMatrix::zeros(pairs.len(), 1);
        for r in 0..pairs.len() {
            let x = dec.logits[(r, 0)];
            if r < positives {
                loss += softplus(-x) / n_pos;
                d_logits[(r, 0)] = (sigmoid(x) - 1.0) / n_pos;
            } else {
                loss += softplus(x) / n_neg;
                d_logits[(r, 0)] = sigmoid(x) / n_neg;
            }
        }
        if !loss.is_finite() {
            return Err(EngineError::unstable(epoch, format!("loss is {}", loss)));
        }

        let p = &self.params;
        let mut grads = p.zeros_like();

        // Decoder
        grads.v2 = dec.d1.transpose() * &d_logits;
        grads.c2 = column_sums(&d_logits);
        let d_d1 = (&d_logits * p.v2.transpose()).component_mul(&relu_mask(&dec.d1_pre));
        grads.v1 = dec.pairs_in.transpose() * &d_d1;
        grads.c1 = column_sums(&d_d1);
        let d_pairs = &d_d1 * p.v1.transpose();

        let e = enc.z.ncols();
        let mut d_z = DMatrix::zeros(enc.z.nrows(), e);
        for (r, &(src, dst)) in pairs.iter().enumerate() {
            for c in 0..e {
                d_z[(src, c)] += d_pairs[(r, c)];
                d_z[(dst, c)] += d_pairs[(r, e + c)];
            }
        }

        // Encoder layer 2
        grads.b2 = column_sums(&d_z);
        let d_hw2 = t.propagation.backward(&d_z);
        grads.w2 = enc.h1.transpose() * &d_hw2;
        let d_h1 = (&d_hw2 * p.w2.transpose()).component_mul(&relu_mask(&enc.h1_pre));

        // Encoder layer 1
        grads.b1 = column_sums(&d_h1);
        let d_xw1 = t.propagation.backward(&d_h1);
        grads.w1 = t.features.transpose() * &d_xw1;

        Ok((loss, grads))
    }

    /// One Adam step. Returns the loss before the update.
    fn step(
        &mut self,
        t: &GraphTensors,
        negatives: &[(usize, usize)],
        adam: &mut Adam,
        epoch: usize,
    ) -> Result<f64> {
        let (loss, grads) = self.loss_and_gradients(t, negatives, epoch)?;
        adam.update(&mut self.params, &grads);
        Ok(loss)
    }

    /// Train from scratch on one graph.
    pub fn fit(&mut self, t: &GraphTensors, seed: u64) -> Result<TrainingReport> {
        let n = t.num_nodes();
        if n < 2 || t.edges.is_empty() {
            return Err(EngineError::FeatureConstruction(
                "graph too small to train".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let mut adam = Adam::new(&self.params, self.config.learning_rate);
        let mut report = TrainingReport {
            epochs: 0,
            initial_loss: f64::NAN,
            final_loss: f64::NAN,
            positives: t.edges.len(),
        };

        for epoch in 0..self.config.epochs {
            let negatives: Vec<(usize, usize)> = (0..t.edges.len())
                .map(|_| (rng.random_range(0..n), rng.random_range(0..n)))
                .collect();
            let loss = self.step(t, &negatives, &mut adam, epoch)?;
            if epoch == 0 {
                report.initial_loss = loss;
            }
            report.final_loss = loss;
            report.epochs = epoch + 1;
            trace!(epoch, loss, "Autoencoder step");
        }

        Ok(report)
    }

    /// Predicted existence probability for each observed edge, aligned with `t.edges`.
    pub fn edge_probabilities(&self, t: &GraphTensors) -> Result<Vec<f64>> {
        let enc = self.encode(t);
        let dec = self.decode(&enc.z, &t.edges);
        let probabilities: Vec<f64> = dec.logits.iter().map(|&x| sigmoid(x)).collect();
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(EngineError::unstable(
                self.config.epochs,
                "non-finite edge probability",
            ));
        }
        Ok(probabilities)
    }

    /// Anomaly score `1 - p(edge)` for each observed edge, aligned with `t.edges`.
    pub fn edge_scores(&self, t: &GraphTensors) -> Result<Vec<f64>> {
        Ok(self
            .edge_probabilities(t)?
            .into_iter()
            .map(|p| (1.0 - p).clamp(0.0, 1.0))
            .collect())
    }
}
