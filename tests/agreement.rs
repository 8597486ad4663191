//! Forward, reverse and mixed differentiation must agree on every operator.

use approx::assert_relative_eq;
use jacograd::initializers::{uniform, uniform_scalar};
use jacograd::ops;
use jacograd::{Mode, Value, Var};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn input(value: &Value, name: &str, mode: Mode) -> Var {
    Var::builder(value.clone())
        .name(name)
        .mode(mode)
        .build()
        .unwrap()
}

fn check(x: Value, y: Value, expr: impl Fn(&Var, &Var) -> Var) {
    let forward = expr(&input(&x, "x", Mode::Forward), &input(&y, "y", Mode::Forward));
    let expected = forward.derivatives();
    assert!(!expected.is_empty());

    for (mode_x, mode_y) in [
        (Mode::Reverse, Mode::Reverse),
        (Mode::Forward, Mode::Reverse),
        (Mode::Reverse, Mode::Forward),
    ] {
        let f = expr(&input(&x, "x", mode_x), &input(&y, "y", mode_y));
        f.backward().unwrap();
        let actual = f.derivatives();

        assert_eq!(
            actual.keys().collect::<Vec<_>>(),
            expected.keys().collect::<Vec<_>>()
        );
        for (name, block) in &expected {
            let other = &actual[name];
            assert_eq!(other.dim(), block.dim(), "block shape for {name}");
            for (a, b) in other.iter().zip(block.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }
}

fn matrices() -> (Value, Value) {
    (
        uniform(2, 3, 0.5, 1.5).unwrap(),
        uniform(2, 3, 0.5, 1.5).unwrap(),
    )
}

#[test]
fn test_arithmetic_agrees() {
    init();
    let (x, y) = matrices();
    check(x.clone(), y.clone(), |x, y| x + y);
    check(x.clone(), y.clone(), |x, y| x - y);
    check(x.clone(), y.clone(), |x, y| x * y);
    check(x.clone(), y.clone(), |x, y| x / y);
    check(x.clone(), y.clone(), |x, y| -(x * x) + y * 3.0);
    check(x, y, |x, y| x.pow(y).unwrap());
}

#[test]
fn test_elementary_functions_agree() {
    init();
    let (x, y) = matrices();
    check(x.clone(), y.clone(), |x, y| x.exp().unwrap() * y);
    check(x.clone(), y.clone(), |x, y| x.ln().unwrap() + y.sqrt().unwrap());
    check(x.clone(), y.clone(), |x, y| x.sin().unwrap() * y.cos().unwrap());
    check(x.clone(), y.clone(), |x, y| (x * 0.5).tan().unwrap() - y);
    check(x.clone(), y.clone(), |x, y| (x * y).sigmoid().unwrap());
    check(x.clone(), y.clone(), |x, y| (x - y).abs().unwrap() * x);
    check(x, y, |x, y| x.log(y + 2.0).unwrap());
}

#[test]
fn test_matrix_operations_agree() {
    init();
    let x = uniform(3, 2, -1.0, 1.0).unwrap();
    let y = uniform(2, 4, -1.0, 1.0).unwrap();
    check(x.clone(), y.clone(), |x, y| x.matmul(y).unwrap());
    check(x.clone(), y.clone(), |x, y| ops::transpose(x.matmul(y).unwrap()).unwrap());
    check(x.clone(), y.clone(), |x, y| {
        let z = x.matmul(y).unwrap().sin().unwrap();
        x.t().unwrap().matmul(z).unwrap()
    });
    check(x, y.clone(), |x, _| x.t().unwrap().matmul(x).unwrap() * 2.0);
    // A column-vector quadratic form: scalar-shaped (1, 1) result.
    let v = uniform(4, 1, -1.0, 1.0).unwrap();
    check(y, v, |a, v| {
        let av = a.matmul(v).unwrap();
        av.t().unwrap().matmul(&av).unwrap()
    });
}

#[test]
fn test_scalar_matrix_broadcast_agrees() {
    init();
    let s = uniform_scalar(0.5, 1.5).unwrap();
    let m = uniform(2, 2, 0.5, 1.5).unwrap();
    check(s.clone(), m.clone(), |s, m| s * m);
    check(s.clone(), m.clone(), |s, m| (m / s).exp().unwrap() + s);
    check(s, m, |s, m| m.pow(s).unwrap());
}

#[test]
fn test_scalar_chains_agree() {
    init();
    let x = uniform_scalar(0.5, 1.5).unwrap();
    let y = uniform_scalar(0.5, 1.5).unwrap();
    check(x.clone(), y.clone(), |x, y| {
        let n = x * y;
        let p = &n * &n + n.sin().unwrap();
        p / (y + 1.0)
    });
    check(x, y, |x, y| ops::pos(x).unwrap() * ops::neg(y).unwrap());
}
