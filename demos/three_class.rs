use feedforward::activations::Activation;
use feedforward::data::one_hot;
use feedforward::init::Initializer;
use feedforward::layers::{BatchNorm, BatchNormConfig, Dense};
use feedforward::loss::Loss;
use feedforward::metrics::Metric;
use feedforward::model::Network;
use feedforward::optim::{RmsProp, RmsPropConfig};
use feedforward::pool::ThreadPool;
use feedforward::tensors::Matrix;
use feedforward::train::FitConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing_subscriber::EnvFilter;

const CLASSES: usize = 3;
const PER_CLASS: usize = 100;

/// Three Gaussian blobs in the plane.
fn blobs(pool: &ThreadPool, rng: &mut StdRng) -> feedforward::Result<(Matrix, Matrix)> {
    let centers = [[-2.0, 0.0], [2.0, 0.0], [0.0, 2.5]];
    let noise = Normal::new(0.0, 0.6).map_err(|e| feedforward::Error::InvalidArgument(e.to_string()))?;

    let mut rows = Vec::with_capacity(CLASSES * PER_CLASS);
    let mut labels = Vec::with_capacity(CLASSES * PER_CLASS);
    for (class, [cx, cy]) in centers.into_iter().enumerate() {
        for _ in 0..PER_CLASS {
            rows.push([cx + noise.sample(rng), cy + noise.sample(rng)]);
            labels.push(class);
        }
    }
    Ok((Matrix::from_rows(pool, &rows)?, one_hot(pool, &labels, CLASSES)?))
}

fn main() -> feedforward::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pool = ThreadPool::with_available_parallelism()?;
    let mut rng = StdRng::seed_from_u64(2024);
    let (x, y) = blobs(&pool, &mut rng)?;

    let mut model = Network::new(&pool);
    model.add_layer(Dense::with_rng(&pool, 2, 16, Initializer::HeUniform, Activation::Relu, &mut rng)?)?;
    model.add_layer(BatchNorm::new(&pool, 16, BatchNormConfig::default())?)?;
    model.add_layer(Dense::with_rng(&pool, 16, CLASSES, Initializer::XavierUniform, Activation::Softmax, &mut rng)?)?;

    let mut optimizer = RmsProp::new(RmsPropConfig {
        learning_rate: 0.01,
        ..RmsPropConfig::default()
    })?;
    let config = FitConfig {
        epochs: 60,
        batch_size: 32,
        validation_split: 0.2,
        patience: 10,
        shuffle_seed: Some(7),
        metrics: vec![Metric::Accuracy],
        ..FitConfig::default()
    };
    let report = model.fit(&x, &y, &mut optimizer, Loss::CategoricalCrossEntropy, &config)?;
    if report.stopped_early {
        println!("stopped early after {} epochs", report.epochs.len());
    }

    for (metric, value) in model.evaluate_all(&x, &y, &[Metric::Accuracy, Metric::MeanAbsoluteError])? {
        println!("{metric}: {value:.4}");
    }
    println!("{}", model.predict(&Matrix::from_rows(&pool, &[[-2.0, 0.0], [2.0, 0.0], [0.0, 2.5]])?)?);

    pool.shutdown();
    Ok(())
}
