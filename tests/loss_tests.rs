use feedforward::Error;
use feedforward::activations::Activation;
use feedforward::approx::within;
use feedforward::data::one_hot;
use feedforward::loss::Loss;
use feedforward::metrics::Metric;
use feedforward::pool::ThreadPool;
use feedforward::tensors::Matrix;

#[test]
fn test_mse_value_and_gradient() {
    let pool = ThreadPool::new(2).unwrap();
    let p = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let t = Matrix::from_rows(&pool, &[[1.0, 0.0], [3.0, 6.0]]).unwrap();

    assert_eq!(Loss::MeanSquaredError.compute(&p, &t).unwrap(), 2.0);
    let grad = Loss::MeanSquaredError.gradient(&p, &t).unwrap();
    assert!(within(&grad, &[0.0, 1.0, 0.0, -1.0][..], 1e-15));
}

#[test]
fn test_bce_is_small_for_confident_correct_predictions() {
    let pool = ThreadPool::new(1).unwrap();
    let t = Matrix::row(&pool, &[1.0, 0.0, 1.0]).unwrap();
    let good = Matrix::row(&pool, &[0.99, 0.01, 0.98]).unwrap();
    let bad = Matrix::row(&pool, &[0.1, 0.9, 0.2]).unwrap();
    let low = Loss::BinaryCrossEntropy.compute(&good, &t).unwrap();
    let high = Loss::BinaryCrossEntropy.compute(&bad, &t).unwrap();
    assert!(low < 0.05);
    assert!(high > 1.0);
}

#[test]
fn test_bce_survives_saturated_predictions() {
    let pool = ThreadPool::new(1).unwrap();
    let t = Matrix::row(&pool, &[1.0, 0.0]).unwrap();
    let p = Matrix::row(&pool, &[0.0, 1.0]).unwrap();
    let value = Loss::BinaryCrossEntropy.compute(&p, &t).unwrap();
    assert!(value.is_finite());
    let grad = Loss::BinaryCrossEntropy.gradient(&p, &t).unwrap();
    assert!(grad.as_slice().iter().all(|g| g.is_finite()));
}

#[test]
fn test_cce_only_counts_the_true_class() {
    let pool = ThreadPool::new(1).unwrap();
    // two samples, three classes, one sample per column
    let p = Matrix::from_rows(&pool, &[[0.7, 0.2], [0.2, 0.5], [0.1, 0.3]]).unwrap();
    let t = Matrix::from_rows(&pool, &[[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]).unwrap();
    let expected = -(0.7_f64.ln() + 0.5_f64.ln()) / 2.0;
    let value = Loss::CategoricalCrossEntropy.compute(&p, &t).unwrap();
    assert!((value - expected).abs() < 1e-12);
}

#[test]
fn test_softmax_backward_of_cce_gradient_is_p_minus_t() {
    let pool = ThreadPool::new(2).unwrap();
    let logits = Matrix::from_rows(&pool, &[[1.0, -0.5], [2.0, 0.0], [0.5, 3.0]]).unwrap();
    let targets = Matrix::from_rows(&pool, &[[0.0, 1.0], [1.0, 0.0], [0.0, 0.0]]).unwrap();

    let (p, ctx) = Activation::Softmax.forward(&logits).unwrap();
    let grad = Loss::CategoricalCrossEntropy.gradient(&p, &targets).unwrap();
    let dz = Activation::Softmax.backward(&ctx, &grad).unwrap();
    let expected = p.sub(&targets).unwrap();
    assert!(within(&dz, &expected, 1e-9));
}

#[test]
fn test_shape_mismatch_and_empty_batch() {
    let pool = ThreadPool::new(1).unwrap();
    let a = Matrix::zeros(&pool, 2, 3).unwrap();
    let b = Matrix::zeros(&pool, 3, 2).unwrap();
    for loss in [Loss::MeanSquaredError, Loss::BinaryCrossEntropy, Loss::CategoricalCrossEntropy] {
        assert!(matches!(loss.compute(&a, &b), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(loss.gradient(&a, &b), Err(Error::ShapeMismatch { .. })));
    }
    let empty = Matrix::empty(&pool);
    assert!(matches!(
        Loss::MeanSquaredError.compute(&empty, &empty),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_accuracy_with_one_hot_targets() {
    let pool = ThreadPool::new(1).unwrap();
    let targets = one_hot(&pool, &[0, 2, 1, 1], 3).unwrap();
    let predictions = Matrix::from_rows(
        &pool,
        &[[0.8, 0.1, 0.1], [0.2, 0.2, 0.6], [0.5, 0.4, 0.1], [0.1, 0.7, 0.2]],
    )
    .unwrap();
    assert_eq!(Metric::Accuracy.compute(&predictions, &targets).unwrap(), 0.75);
}

#[test]
fn test_accuracy_with_a_single_output_rounds() {
    let pool = ThreadPool::new(1).unwrap();
    let targets = Matrix::column(&pool, &[0.0, 1.0, 1.0, 0.0]).unwrap();
    let predictions = Matrix::column(&pool, &[0.2, 0.7, 0.4, 0.1]).unwrap();
    assert_eq!(Metric::Accuracy.compute(&predictions, &targets).unwrap(), 0.75);
}

#[test]
fn test_mean_absolute_error() {
    let pool = ThreadPool::new(1).unwrap();
    let targets = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let predictions = Matrix::from_rows(&pool, &[[1.5, 2.0], [2.0, 4.5]]).unwrap();
    let mae = Metric::MeanAbsoluteError.compute(&predictions, &targets).unwrap();
    assert!((mae - 1.0).abs() < 1e-12);
}
