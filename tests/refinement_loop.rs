//! 実モデルとリファインメントコールバックを組み合わせた結合テスト。

use burn::backend::{Autodiff, NdArray};
use pinn_r3::equation::{AdvectionEquation, BurgersEquation};
use pinn_r3::model::Model;
use pinn_r3::problem::{Condition, Domain, Problem, SampleMode};
use pinn_r3::refinement::R3Refinement;
use pinn_r3::solver::{PinnSolver, RefinableSolver};

type TrainBackend = Autodiff<Autodiff<NdArray<f32>>>;

fn advection_domain() -> Domain {
    Domain::new()
        .with_variable("t", 0.0, 1.0)
        .with_variable("x", -1.0, 1.0)
}

#[test]
fn residual_has_one_column_per_point() {
    let device = Default::default();
    let mut problem = Problem::<TrainBackend>::new()
        .add_domain("interior", advection_domain())
        .add_condition("physics", Condition::new("interior"));
    problem.discretise(16, SampleMode::Random, &device);

    let model = Model::<TrainBackend>::new(&device, 2, &["u"]);
    let solver =
        PinnSolver::new(model, problem).with_equation("physics", AdvectionEquation { speed: 1.0 });

    let points = solver.points("physics").unwrap().clone();
    let residual = solver.residual("physics", &points).unwrap();
    assert_eq!(residual.dims(), [16, 1]);
}

#[test]
fn refinement_cycle_keeps_population_and_labels() {
    let device = Default::default();
    let mut problem = Problem::<TrainBackend>::new()
        .add_domain("interior", advection_domain())
        .add_condition("physics", Condition::new("interior"));
    problem.discretise(32, SampleMode::Random, &device);

    let model = Model::<TrainBackend>::new(&device, 2, &["u"]);
    let mut solver = PinnSolver::new(model, problem)
        .with_equation("physics", BurgersEquation { nu: 0.05 });

    let mut callback = R3Refinement::new(1).unwrap();
    for epoch in 1..=3 {
        callback.on_epoch_end(epoch, &mut solver).unwrap();

        let points = solver.points("physics").unwrap();
        assert_eq!(points.n_points(), 32);
        assert_eq!(points.labels(), ["t", "x"]);

        // 補充された点もドメイン境界の内側に収まる
        let values = points.tensor().clone().into_data().to_vec::<f32>().unwrap();
        for row in values.chunks(2) {
            assert!((0.0..=1.0).contains(&row[0]));
            assert!((-1.0..=1.0).contains(&row[1]));
        }
    }
}
