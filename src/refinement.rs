//! R3 (Retain-Resample-Release) リファインメントコールバック。
//!
//! 学習中に `sample_every` エポックごとに呼び出され、条件ごとに PDE 残差を
//! 評価し、残差が母集団平均を厳密に上回る点を保持、残りを破棄して、
//! ドメインからの一様ランダムサンプルで補充します。母集団のサイズは条件を
//! 最初に観測した時点の値に固定され、以後のサイクルで不変です。
//!
//! 参考文献: Daw et al., *Mitigating Propagation Failures in
//! Physics-informed Neural Networks using Retain-Resample-Release (R3)
//! Sampling* (2023). DOI: 10.48550/arXiv.2207.02338

use std::collections::HashMap;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::error::{ConfigError, RefinementError};
use crate::label_tensor::LabelTensor;
use crate::loss::{L1Loss, PointwiseLoss};
use crate::solver::RefinableSolver;

/// R3 リファインメントコールバック。
///
/// 状態は条件ごとに固定された初期母集団サイズのみで、最初のリファインメント
/// 時に遅延初期化され、以後は再構築されるまで変化しません。
#[derive(Debug)]
pub struct R3Refinement<L = L1Loss> {
    sample_every: usize,
    conditions: Option<Vec<String>>,
    loss: L,
    initial_population: HashMap<String, usize>,
}

impl R3Refinement<L1Loss> {
    /// 指定した周期で発火するコールバックを構築します。
    ///
    /// 残差損失の既定値は L1 です。`sample_every` が 0 の場合は設定エラー。
    pub fn new(sample_every: usize) -> Result<Self, ConfigError> {
        if sample_every == 0 {
            return Err(ConfigError::ZeroCadence);
        }
        Ok(Self {
            sample_every,
            conditions: None,
            loss: L1Loss,
            initial_population: HashMap::new(),
        })
    }
}

impl<L: PointwiseLoss> R3Refinement<L> {
    /// 残差損失を差し替えます。
    pub fn with_loss<L2: PointwiseLoss>(self, loss: L2) -> R3Refinement<L2> {
        R3Refinement {
            sample_every: self.sample_every,
            conditions: self.conditions,
            loss,
            initial_population: self.initial_population,
        }
    }

    /// 更新対象の条件を限定します。省略時はソルバの全リファインメント可能
    /// 条件が対象です。
    pub fn with_conditions(
        mut self,
        conditions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.conditions = Some(conditions.into_iter().map(Into::into).collect());
        self
    }

    /// 発火周期を返します。
    pub fn sample_every(&self) -> usize {
        self.sample_every
    }

    /// エポック終了時のフック。エポックが周期の正の倍数のときに各条件を
    /// 順にリファインメントします。
    pub fn on_epoch_end<B, S>(&mut self, epoch: usize, solver: &mut S) -> Result<(), RefinementError>
    where
        B: Backend,
        S: RefinableSolver<B>,
    {
        if epoch == 0 || epoch % self.sample_every != 0 {
            return Ok(());
        }
        let names = match &self.conditions {
            Some(names) => names.clone(),
            None => solver.refinable_conditions(),
        };
        for name in names {
            self.refine(&name, solver)?;
        }
        Ok(())
    }

    /// 1 条件に対するリファインメントパス。
    fn refine<B, S>(&mut self, name: &str, solver: &mut S) -> Result<(), RefinementError>
    where
        B: Backend,
        S: RefinableSolver<B>,
    {
        let points = solver
            .points(name)
            .ok_or_else(|| RefinementError::UnknownCondition(name.to_string()))?
            .clone();

        // 初見の条件はこの時点の母集団サイズを目標値として凍結する
        let target = *self
            .initial_population
            .entry(name.to_string())
            .or_insert_with(|| points.n_points());

        // 点ごとのスカラー残差: 要素ごとの損失をゼロ目標に適用し、
        // バッチ以外の軸で平均する
        let residual = solver.residual(name, &points)?;
        let zeros = Tensor::zeros_like(&residual);
        let n = points.n_points();
        let per_point = self
            .loss
            .forward(residual, zeros)
            .mean_dim(1)
            .reshape([n]);

        // 平均を厳密に上回る点だけを保持する
        let mean = per_point.clone().mean().into_scalar();
        let retained_indices = per_point.greater_elem(mean).argwhere();
        let retained = retained_indices.dims()[0];

        let new_points = if retained > 0 {
            let device = points.tensor().device();
            let indices = Tensor::<B, 1, Int>::from_data(
                retained_indices.reshape([retained]).into_data(),
                &device,
            );
            let kept = points.select_rows(indices);
            if retained >= target {
                kept
            } else {
                let fresh = solver.sample_domain(name, target - retained)?;
                LabelTensor::cat_rows(vec![kept, fresh])?
            }
        } else {
            // 退化ケース: どの点も平均を超えない場合は全点を再サンプル
            solver.sample_domain(name, target)?
        };

        solver.replace_points(name, new_points);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Domain, SampleMode};
    use burn::backend::NdArray;
    use std::cell::Cell;

    type B = NdArray<f32>;

    /// 台本通りの残差を返すソルバ。
    struct MockSolver {
        points: HashMap<String, LabelTensor<B>>,
        residuals: HashMap<String, Vec<f32>>,
        domain: Domain,
        sampled: Cell<usize>,
    }

    impl MockSolver {
        fn new(n: usize) -> Self {
            let device = Default::default();
            // 行 i が [i, i] となる点集合
            let flat: Vec<f32> = (0..n).flat_map(|i| [i as f32, i as f32]).collect();
            let tensor = Tensor::<B, 1>::from_floats(flat.as_slice(), &device).reshape([n, 2]);
            let points = LabelTensor::new(tensor, ["t", "x"]).unwrap();
            Self {
                points: HashMap::from([("physics".to_string(), points)]),
                residuals: HashMap::new(),
                domain: Domain::new()
                    .with_variable("t", 0.0, 1.0)
                    .with_variable("x", -1.0, 1.0),
                sampled: Cell::new(0),
            }
        }

        fn script(&mut self, name: &str, residuals: Vec<f32>) {
            self.residuals.insert(name.to_string(), residuals);
        }

        fn values(&self, name: &str) -> Vec<f32> {
            self.points[name]
                .tensor()
                .clone()
                .into_data()
                .to_vec::<f32>()
                .unwrap()
        }
    }

    impl RefinableSolver<B> for MockSolver {
        type ResidualBackend = B;

        fn refinable_conditions(&self) -> Vec<String> {
            let mut names: Vec<String> = self.points.keys().cloned().collect();
            names.sort();
            names
        }

        fn points(&self, name: &str) -> Option<&LabelTensor<B>> {
            self.points.get(name)
        }

        fn replace_points(&mut self, name: &str, points: LabelTensor<B>) {
            self.points.insert(name.to_string(), points);
        }

        fn sample_domain(&self, _name: &str, n: usize) -> Result<LabelTensor<B>, RefinementError> {
            self.sampled.set(self.sampled.get() + n);
            let device = Default::default();
            Ok(self.domain.sample(n, SampleMode::Random, &device))
        }

        fn residual(
            &self,
            name: &str,
            points: &LabelTensor<B>,
        ) -> Result<Tensor<B, 2>, RefinementError> {
            let values = &self.residuals[name];
            assert_eq!(values.len(), points.n_points());
            let device = Default::default();
            Ok(Tensor::<B, 1>::from_floats(values.as_slice(), &device)
                .reshape([values.len(), 1]))
        }
    }

    #[test]
    fn rejects_zero_cadence() {
        assert_eq!(
            R3Refinement::new(0).unwrap_err(),
            crate::error::ConfigError::ZeroCadence
        );
    }

    #[test]
    fn idle_outside_cadence_ticks() {
        let mut solver = MockSolver::new(4);
        solver.script("physics", vec![10.0, 0.0, 0.0, 0.0]);
        let before = solver.values("physics");

        let mut callback = R3Refinement::new(5).unwrap();
        callback.on_epoch_end(0, &mut solver).unwrap();
        callback.on_epoch_end(3, &mut solver).unwrap();
        assert_eq!(solver.values("physics"), before);
        assert_eq!(solver.sampled.get(), 0);

        callback.on_epoch_end(5, &mut solver).unwrap();
        // 行 0 のみ保持され、残り 3 点が補充される
        assert_eq!(solver.points["physics"].n_points(), 4);
        assert_eq!(&solver.values("physics")[0..2], &[0.0, 0.0]);
        assert_eq!(solver.sampled.get(), 3);
    }

    #[test]
    fn retains_high_residual_points_in_order() {
        // 20 点中 6 点が平均を上回るシナリオ
        let mut solver = MockSolver::new(20);
        let mut residuals = vec![0.5; 20];
        for r in residuals.iter_mut().take(6) {
            *r = 10.0;
        }
        solver.script("physics", residuals);

        let mut callback = R3Refinement::new(1).unwrap();
        callback.on_epoch_end(1, &mut solver).unwrap();

        let points = &solver.points["physics"];
        assert_eq!(points.n_points(), 20);
        assert_eq!(points.labels(), ["t", "x"]);

        // 先頭 6 行は元の高残差点が元の順序のまま並ぶ
        let values = solver.values("physics");
        for i in 0..6 {
            assert_eq!(&values[i * 2..i * 2 + 2], &[i as f32, i as f32]);
        }
        assert_eq!(solver.sampled.get(), 14);
    }

    #[test]
    fn uniform_residuals_trigger_full_resample() {
        let mut solver = MockSolver::new(20);
        solver.script("physics", vec![1.0; 20]);

        let mut callback = R3Refinement::new(1).unwrap();
        callback.on_epoch_end(1, &mut solver).unwrap();

        assert_eq!(solver.points["physics"].n_points(), 20);
        assert_eq!(solver.sampled.get(), 20);
    }

    #[test]
    fn population_size_is_frozen_at_first_sight() {
        let mut solver = MockSolver::new(20);
        solver.script("physics", vec![1.0; 20]);
        let mut callback = R3Refinement::new(1).unwrap();
        callback.on_epoch_end(1, &mut solver).unwrap();

        // 外部から母集団が縮んでも、次のサイクルで元のサイズへ戻る
        let device = Default::default();
        let shrunk = LabelTensor::new(Tensor::<B, 2>::ones([8, 2], &device), ["t", "x"]).unwrap();
        solver.replace_points("physics", shrunk);
        let mut residuals = vec![0.1; 8];
        residuals[2] = 5.0;
        solver.script("physics", residuals);

        callback.on_epoch_end(2, &mut solver).unwrap();
        assert_eq!(solver.points["physics"].n_points(), 20);
    }

    #[test]
    fn unknown_condition_is_an_error() {
        let mut solver = MockSolver::new(4);
        solver.script("physics", vec![1.0; 4]);
        let mut callback = R3Refinement::new(1).unwrap().with_conditions(["missing"]);
        assert!(matches!(
            callback.on_epoch_end(1, &mut solver),
            Err(RefinementError::UnknownCondition(name)) if name == "missing"
        ));
    }
}
