use approx::assert_relative_eq;
use jacograd::graph::ReversePass;
use jacograd::ops::{add, cos, exp, mul, tan};
use jacograd::{Mode, Var};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn reverse(value: f64, name: &str) -> Var {
    Var::builder(value)
        .name(name)
        .mode(Mode::Reverse)
        .build()
        .unwrap()
}

fn grad(f: &Var, name: &str) -> f64 {
    f.grad(name).unwrap().as_scalar().unwrap()
}

#[test]
fn test_reverse_nodes_defer() {
    init();
    let x = reverse(3.0, "x");
    let y = reverse(4.0, "y");
    let f = mul(&x, &y).unwrap();
    assert_eq!(f.mode(), Mode::Reverse);
    assert!(f.derivatives().is_empty());

    assert_relative_eq!(grad(&f, "x"), 4.0);
    assert_relative_eq!(grad(&f, "y"), 3.0);
    // Memoized: the map is now populated.
    assert_eq!(f.derivatives().len(), 2);
}

#[test]
fn test_diamond_accumulates() {
    init();
    let x = reverse(2.0, "x");
    let f = add(mul(&x, &x).unwrap(), mul(&x, &x).unwrap()).unwrap();
    assert_eq!(f.grad("x").unwrap(), 8.0);
}

#[test]
fn test_repeated_differentiate_is_stable() {
    init();
    let x = reverse(1.5, "x");
    let f = exp(mul(&x, &x).unwrap()).unwrap();
    let first = grad(&f, "x");
    let second = grad(&f, "x");
    assert_eq!(first, second);
    assert_relative_eq!(first, 3.0 * (2.25f64).exp(), epsilon = 1e-12);
}

#[test]
fn test_degree_gating_with_observer() {
    init();
    // g feeds both branches; it must be expanded exactly once.
    let x = reverse(0.5, "x");
    let g = cos(&x).unwrap();
    let f = mul(tan(&g).unwrap(), &g).unwrap();

    let mut seen = Vec::new();
    ReversePass::new(&f)
        .with_observer(|node, _| seen.push(node.id()))
        .run()
        .unwrap();
    assert_eq!(seen.iter().filter(|id| **id == g.id()).count(), 1);

    let c = 0.5f64.cos();
    let dfdg = c / c.cos().powi(2) + c.tan();
    assert_relative_eq!(grad(&f, "x"), dfdg * -(0.5f64.sin()), epsilon = 1e-12);
}

#[test]
fn test_mixed_modes_agree_with_forward() {
    init();
    let build = |mode_x: Mode, mode_y: Mode| {
        let x = Var::builder(1.2).name("x").mode(mode_x).build().unwrap();
        let y = Var::builder(-0.4).name("y").mode(mode_y).build().unwrap();
        (&x * &y + x.sin().unwrap()) * y.exp().unwrap()
    };

    let forward = build(Mode::Forward, Mode::Forward);
    let mixed = build(Mode::Forward, Mode::Reverse);
    let backward = build(Mode::Reverse, Mode::Reverse);

    assert_eq!(mixed.mode(), Mode::Mix);
    for name in ["x", "y"] {
        let expected = grad(&forward, name);
        assert_relative_eq!(grad(&mixed, name), expected, epsilon = 1e-12);
        assert_relative_eq!(grad(&backward, name), expected, epsilon = 1e-12);
    }
}

#[test]
fn test_constant_operands_receive_nothing() {
    init();
    let x = reverse(2.0, "x");
    let c = Var::constant(5.0);
    let f = mul(&x, &c).unwrap();
    assert_relative_eq!(grad(&f, "x"), 5.0);
    assert!(c.derivatives().is_empty());
    assert_eq!(f.derivatives().len(), 1);
}
