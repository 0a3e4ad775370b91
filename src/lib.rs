//! feedforward: a from-scratch feed-forward neural network library in Rust.
//!
//! Dense rank-2 tensors, layers, activations, losses, optimizers and a mini-batch
//! trainer, all computing on an explicitly constructed worker pool.
//!
//! # Features
//!
//! - Row-major `f64` matrices whose every operation runs on a shared [`pool::ThreadPool`]
//! - Row/column broadcasting views for per-sample and per-feature statistics
//! - Dense and batch-normalization layers with hand-derived gradients
//! - SGD with momentum, RMSProp and Adam, with per-parameter state keyed by handle
//! - MSE, binary and categorical cross-entropy
//! - A fixed-width binary format for matrices, layers and whole networks
//!
//! # Goals
//!
//! - Fail fast with a typed [`Error`]; a failed operation leaves its operands untouched
//! - Make the forward/backward pairing explicit: forward returns the context backward
//!   consumes
//! - No hidden global state: the program entry point owns the pool
//!
//! # Modules
//!
//! - [`pool`] — worker pool every numerical operation funnels through
//! - [`tensors`] — `Matrix` and `Shape`
//! - [`broadcast`] — `RowWise` / `ColWise` views
//! - [`activations`] — ReLU, Sigmoid, Softmax, identity
//! - [`init`] — He and Xavier initializers
//! - [`layers`] — `Dense`, `BatchNorm` and the gradient protocol
//! - [`optim`] — `Sgd`, `RmsProp`, `Adam`
//! - [`loss`] — training objectives
//! - [`model`] — `Network`, the layer stack
//! - [`train`] — `Network::fit` and friends
//! - [`metrics`] — accuracy and mean absolute error
//! - [`data`] — dataset row helpers
//! - [`modelio`] — persisted binary format
//! - [`approx`] — tolerance comparisons
//!
//! # Example
//!
//! ```rust
//! use feedforward::activations::Activation;
//! use feedforward::init::Initializer;
//! use feedforward::layers::Dense;
//! use feedforward::loss::Loss;
//! use feedforward::model::Network;
//! use feedforward::optim::{Adam, AdamConfig};
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//! use feedforward::train::FitConfig;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let mut net = Network::new(&pool);
//! net.add_layer(Dense::with_seed(&pool, 1, 1, Initializer::XavierUniform, Activation::Identity, 9).unwrap()).unwrap();
//!
//! // y = 2x
//! let x = Matrix::column(&pool, &[0.0, 1.0, 2.0, 3.0]).unwrap();
//! let y = Matrix::column(&pool, &[0.0, 2.0, 4.0, 6.0]).unwrap();
//!
//! let mut adam = Adam::new(AdamConfig::with_learning_rate(0.1)).unwrap();
//! let config = FitConfig { epochs: 500, batch_size: 4, patience: 500, shuffle_seed: Some(1), ..FitConfig::default() };
//! let report = net.fit(&x, &y, &mut adam, Loss::MeanSquaredError, &config).unwrap();
//! assert!(report.final_loss().unwrap() < 0.1);
//! ```

#![deny(unsafe_code)]

pub mod activations;
pub mod approx;
pub mod broadcast;
pub mod data;
pub mod error;
pub mod init;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod modelio;
mod ops;
pub mod optim;
pub mod pool;
pub mod tensors;
pub mod train;

pub use error::{Error, Result};
