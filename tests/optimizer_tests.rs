use feedforward::Error;
use feedforward::approx::within;
use feedforward::layers::Param;
use feedforward::optim::{Adam, AdamConfig, Optimizer, RmsProp, RmsPropConfig, Sgd, SgdConfig};
use feedforward::pool::ThreadPool;
use feedforward::tensors::Matrix;

struct Fixture {
    weights: Param,
    biases: Param,
    grad_weights: Matrix,
    grad_biases: Matrix,
}

fn fixture(pool: &ThreadPool) -> Fixture {
    Fixture {
        weights: Param::new(Matrix::from_rows(pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap()),
        biases: Param::new(Matrix::column(pool, &[0.5, 0.5]).unwrap()),
        grad_weights: Matrix::from_rows(pool, &[[0.1, 0.2], [0.3, 0.4]]).unwrap(),
        grad_biases: Matrix::column(pool, &[0.05, 0.05]).unwrap(),
    }
}

fn step(optimizer: &mut dyn Optimizer, f: &mut Fixture) {
    optimizer
        .update(&mut f.weights, &mut f.biases, &f.grad_weights, &f.grad_biases)
        .unwrap();
}

#[test]
fn test_adam_single_step() {
    let pool = ThreadPool::new(2).unwrap();
    let mut f = fixture(&pool);
    let mut adam = Adam::new(AdamConfig::with_learning_rate(0.01)).unwrap();
    step(&mut adam, &mut f);

    assert!(within(f.weights.value(), &[0.99, 1.99, 2.99, 3.99][..], 1e-2));
    assert!(within(f.biases.value(), &[0.49, 0.49][..], 1e-2));
    assert_eq!(adam.steps(), 1);
    assert_eq!(adam.tracked_params(), 2);
}

#[test]
fn test_sgd_with_momentum() {
    let pool = ThreadPool::new(2).unwrap();
    let mut f = fixture(&pool);
    let mut sgd = Sgd::new(SgdConfig { learning_rate: 0.01, momentum: 0.9 }).unwrap();

    step(&mut sgd, &mut f);
    assert!(within(f.weights.value(), &[0.999, 1.998, 2.997, 3.996][..], 1e-12));
    assert!(within(f.biases.value(), &[0.4995, 0.4995][..], 1e-12));

    // v = 0.9·0.001 + 0.001
    step(&mut sgd, &mut f);
    assert!(within(f.weights.value(), &[0.9971, 1.9942, 2.9913, 3.9884][..], 1e-12));
}

#[test]
fn test_sgd_without_momentum_is_plain_descent() {
    let pool = ThreadPool::new(1).unwrap();
    let mut f = fixture(&pool);
    let mut sgd = Sgd::new(SgdConfig { learning_rate: 0.1, momentum: 0.0 }).unwrap();
    step(&mut sgd, &mut f);
    step(&mut sgd, &mut f);
    assert!(within(f.weights.value(), &[0.98, 1.96, 2.94, 3.92][..], 1e-12));
}

#[test]
fn test_rmsprop_first_step() {
    let pool = ThreadPool::new(2).unwrap();
    let mut f = fixture(&pool);
    let config = RmsPropConfig { learning_rate: 0.01, gamma: 0.9, epsilon: 1e-8 };
    let mut rms = RmsProp::new(config).unwrap();
    step(&mut rms, &mut f);

    // s = 0.1·g², so every element moves by lr / √0.1
    let delta = 0.01 / 0.1_f64.sqrt();
    let expected = [1.0 - delta, 2.0 - delta, 3.0 - delta, 4.0 - delta];
    assert!(within(f.weights.value(), &expected[..], 1e-6));
    assert!(within(f.biases.value(), &[0.5 - delta, 0.5 - delta][..], 1e-6));
}

#[test]
fn test_state_is_kept_per_parameter() {
    let pool = ThreadPool::new(1).unwrap();
    let mut first = fixture(&pool);
    let mut second = fixture(&pool);
    let mut sgd = Sgd::new(SgdConfig { learning_rate: 0.01, momentum: 0.9 }).unwrap();

    step(&mut sgd, &mut first);
    step(&mut sgd, &mut second);
    assert_eq!(sgd.tracked_params(), 4);
    // the second pair starts from a fresh velocity
    assert_eq!(first.weights.value(), second.weights.value());
}

#[test]
fn test_mismatched_gradient_leaves_parameters_untouched() {
    let pool = ThreadPool::new(1).unwrap();
    let mut f = fixture(&pool);
    let before = f.weights.value().clone();
    let bad = Matrix::zeros(&pool, 3, 2).unwrap();

    let mut adam = Adam::default();
    let result = adam.update(&mut f.weights, &mut f.biases, &bad, &f.grad_biases);
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    assert_eq!(f.weights.value(), &before);
    assert_eq!(adam.steps(), 0);
    assert_eq!(adam.tracked_params(), 0);
}

#[test]
fn test_state_shape_drift_is_invalid_state() {
    let pool = ThreadPool::new(1).unwrap();
    let mut f = fixture(&pool);
    let mut sgd = Sgd::default();
    step(&mut sgd, &mut f);

    *f.weights.value_mut() = Matrix::zeros(&pool, 1, 4).unwrap();
    let grad = Matrix::zeros(&pool, 1, 4).unwrap();
    let result = sgd.update(&mut f.weights, &mut f.biases, &grad, &f.grad_biases);
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_invalid_hyper_parameters() {
    assert!(matches!(
        Sgd::new(SgdConfig { learning_rate: 0.0, momentum: 0.9 }),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Sgd::new(SgdConfig { learning_rate: 0.1, momentum: 1.0 }),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        RmsProp::new(RmsPropConfig { epsilon: 0.0, ..RmsPropConfig::default() }),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Adam::new(AdamConfig { beta1: 1.0, ..AdamConfig::default() }),
        Err(Error::InvalidArgument(_))
    ));
}
