use feedforward::Error;
use feedforward::approx::{ApproxEquality, RelativeEq, approx_eq, within};
use feedforward::pool::ThreadPool;
use feedforward::tensors::{Matrix, Shape};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn pool() -> ThreadPool {
    ThreadPool::new(4).unwrap()
}

fn random(pool: &ThreadPool, rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    Matrix::from_generator(pool, rows, cols, || rng.random_range(-1.0..1.0)).unwrap()
}

#[test]
fn test_add_then_sub_is_identity() {
    let pool = pool();
    let a = random(&pool, 7, 5, 1);
    let b = random(&pool, 7, 5, 2);
    let back = a.add(&b).unwrap().sub(&b).unwrap();
    assert!(approx_eq(&back, &a));
}

#[test]
fn test_scale_by_one_is_identity() {
    let pool = pool();
    let a = random(&pool, 3, 9, 3);
    assert_eq!(a.scale(1.0).unwrap(), a);
}

#[test]
fn test_transpose_twice_is_identity() {
    let pool = pool();
    for (rows, cols) in [(1, 1), (1, 6), (6, 1), (5, 3)] {
        let a = random(&pool, rows, cols, 4);
        let t = a.transpose().unwrap();
        assert_eq!(t.shape(), Shape::new(cols, rows));
        assert_eq!(t.transpose().unwrap(), a);
    }
}

#[test]
fn test_matmul_is_associative() {
    let pool = pool();
    let a = random(&pool, 4, 3, 5);
    let b = random(&pool, 3, 6, 6);
    let c = random(&pool, 6, 2, 7);
    let left = a.matmul(&b).unwrap().matmul(&c).unwrap();
    let right = a.matmul(&b.matmul(&c).unwrap()).unwrap();
    assert!(within(&left, &right, 1e-12));
}

#[test]
fn test_approx_grades_on_matrices() {
    let pool = pool();
    let a = random(&pool, 3, 4, 8);
    assert_eq!(a.approx_eq(&a), ApproxEquality::Precise);
    assert_eq!(a.approx_eq(&a.add_scalar(1e-9).unwrap()), ApproxEquality::Partial);
    assert_eq!(a.approx_eq(&a.add_scalar(1e-4).unwrap()), ApproxEquality::Relative);
    assert_eq!(a.approx_eq(&a.transpose().unwrap()), ApproxEquality::Scarce);
}

#[test]
fn test_matmul_shape_mismatch() {
    let pool = pool();
    let a = Matrix::zeros(&pool, 2, 3).unwrap();
    let b = Matrix::zeros(&pool, 2, 3).unwrap();
    match a.matmul(&b) {
        Err(Error::ShapeMismatch { left, right, .. }) => {
            assert_eq!(left, Shape::new(2, 3));
            assert_eq!(right, Shape::new(2, 3));
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
}

#[test]
fn test_elementwise_shape_mismatch() {
    let pool = pool();
    let a = Matrix::zeros(&pool, 2, 3).unwrap();
    let b = Matrix::zeros(&pool, 3, 2).unwrap();
    assert!(matches!(a.add(&b), Err(Error::ShapeMismatch { .. })));
    assert!(matches!(a.cwise_product(&b), Err(Error::ShapeMismatch { .. })));
}

#[test]
fn test_division_by_zero_is_rejected() {
    let pool = pool();
    let a = Matrix::filled(&pool, 2, 2, 3.0).unwrap();
    let mut divisor = Matrix::filled(&pool, 2, 2, 1.0).unwrap();
    divisor[(1, 0)] = 0.0;

    assert!(matches!(a.div(&divisor), Err(Error::DivisionByZero { .. })));
    assert!(matches!(a.div_scalar(0.0), Err(Error::DivisionByZero { .. })));
    assert!(matches!(divisor.rdiv_scalar(1.0), Err(Error::DivisionByZero { .. })));

    let mut target = a.clone();
    assert!(matches!(target.div_scalar_assign(0.0), Err(Error::DivisionByZero { .. })));
    assert_eq!(target, a);
}

#[test]
fn test_matmul_assign_with_itself() {
    let pool = pool();
    let mut a = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let copy = a.clone();
    a.matmul_assign(&copy).unwrap();
    assert_eq!(a.as_slice(), &[7.0, 10.0, 15.0, 22.0]);
}

#[test]
fn test_scalar_forms() {
    let pool = pool();
    let a = Matrix::from_rows(&pool, &[[1.0, 2.0], [4.0, 8.0]]).unwrap();
    assert_eq!(a.add_scalar(1.0).unwrap().as_slice(), &[2.0, 3.0, 5.0, 9.0]);
    assert_eq!(a.rsub_scalar(1.0).unwrap().as_slice(), &[0.0, -1.0, -3.0, -7.0]);
    assert_eq!(a.rdiv_scalar(8.0).unwrap().as_slice(), &[8.0, 4.0, 2.0, 1.0]);

    let mut b = a.clone();
    b.sub_scalar_assign(1.0).unwrap();
    b.scale_assign(2.0).unwrap();
    assert_eq!(b.as_slice(), &[0.0, 2.0, 6.0, 14.0]);
}

#[test]
fn test_reductions() {
    let pool = pool();
    let a = Matrix::from_rows(&pool, &[[1.0, -2.0, 3.0], [-4.0, 5.0, -6.0]]).unwrap();
    assert_eq!(a.sum().unwrap(), -3.0);
    assert_eq!(a.max_coeff().unwrap(), 5.0);
    assert!(matches!(Matrix::empty(&pool).max_coeff(), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_from_fn_and_get() {
    let pool = pool();
    let a = Matrix::from_fn(&pool, 3, 4, |r, c| (r * 10 + c) as f64).unwrap();
    assert_eq!(a.get(2, 3), Some(23.0));
    assert_eq!(a.get(3, 0), None);
    assert_eq!(a[(1, 2)], 12.0);
}

#[test]
fn test_equality_checks_shape_first() {
    let pool = pool();
    let a = Matrix::zeros(&pool, 2, 3).unwrap();
    let b = Matrix::zeros(&pool, 3, 2).unwrap();
    assert_ne!(a, b);
    let mut c = a.clone();
    c[(1, 2)] = 1e-300;
    assert_ne!(a, c);
}

#[test]
fn test_matrix_save_and_load() {
    let pool = pool();
    let a = random(&pool, 3, 4, 8);
    let mut bytes = Vec::new();
    a.save(&mut bytes).unwrap();
    let back = Matrix::load(&pool, &mut bytes.as_slice()).unwrap();
    assert_eq!(a, back);
}

#[test]
fn test_broadcast_softmax_style_normalization() {
    let pool = pool();
    let x = Matrix::from_rows(&pool, &[[1.0, 4.0], [3.0, 2.0]]).unwrap();
    let max = x.col_wise().max_coeff().unwrap();
    assert_eq!(max.as_slice(), &[3.0, 4.0]);
    let shifted = x.row_wise().sub(&max).unwrap();
    assert_eq!(shifted.as_slice(), &[-2.0, 0.0, 0.0, -2.0]);
}
