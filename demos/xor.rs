use feedforward::activations::Activation;
use feedforward::init::Initializer;
use feedforward::layers::Dense;
use feedforward::loss::Loss;
use feedforward::metrics::Metric;
use feedforward::model::Network;
use feedforward::optim::{Adam, AdamConfig};
use feedforward::pool::ThreadPool;
use feedforward::tensors::Matrix;
use feedforward::train::FitConfig;
use tracing_subscriber::EnvFilter;

fn main() -> feedforward::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pool = ThreadPool::with_available_parallelism()?;

    let inputs = Matrix::from_rows(&pool, &[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]])?;
    let targets = Matrix::column(&pool, &[0.0, 1.0, 1.0, 0.0])?;

    let mut model = Network::new(&pool);
    model.add_layer(Dense::new(&pool, 2, 8, Initializer::HeNormal, Activation::Relu)?)?;
    model.add_layer(Dense::new(&pool, 8, 1, Initializer::XavierNormal, Activation::Sigmoid)?)?;

    let mut adam = Adam::new(AdamConfig::with_learning_rate(0.01))?;
    let config = FitConfig {
        epochs: 1000,
        batch_size: 4,
        patience: 1000,
        metrics: vec![Metric::Accuracy],
        ..FitConfig::default()
    };

    println!("Beginning training...");
    let report = model.fit(&inputs, &targets, &mut adam, Loss::BinaryCrossEntropy, &config)?;
    println!("final loss: {:?}", report.final_loss());

    let predictions = model.predict(&inputs)?;
    for (sample, p) in inputs.row_slices().zip(predictions.as_slice()) {
        println!("{sample:?} -> {p:.4}");
    }
    println!("accuracy: {}", model.evaluate(&inputs, &targets, Metric::Accuracy)?);

    let path = std::env::temp_dir().join("feedforward-xor.bin");
    model.save(&path)?;
    let mut restored = Network::load(&pool, &path)?;
    println!("restored model agrees: {}", restored.predict(&inputs)? == predictions);

    pool.shutdown();
    Ok(())
}
