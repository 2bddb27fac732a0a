//! PINN ソルバと、リファインメントが要求する細いインターフェース。

use std::collections::HashMap;

use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};

use crate::equation::Equation;
use crate::error::RefinementError;
use crate::label_tensor::LabelTensor;
use crate::operator::{Field, TwiceDifferentiated};
use crate::problem::{Problem, SampleMode};

/// リファインメントコールバックがソルバに要求する能力。
///
/// コールバックはこのインターフェースだけを通してソルバと対話します。
pub trait RefinableSolver<B: Backend> {
    /// 残差が返されるバックエンド。
    type ResidualBackend: Backend;

    /// リファインメント可能な条件名 (決定的な順序)。
    fn refinable_conditions(&self) -> Vec<String>;

    /// 条件の現在の点集合。
    fn points(&self, name: &str) -> Option<&LabelTensor<B>>;

    /// 条件の点集合を新しいものへ置き換えます。
    fn replace_points(&mut self, name: &str, points: LabelTensor<B>);

    /// 条件のドメインから一様ランダムに `n` 点を抽出します。
    fn sample_domain(&self, name: &str, n: usize) -> Result<LabelTensor<B>, RefinementError>;

    /// 条件の方程式残差を点ごとに評価します。
    fn residual(
        &self,
        name: &str,
        points: &LabelTensor<B>,
    ) -> Result<Tensor<Self::ResidualBackend, 2>, RefinementError>;
}

/// 物理情報ニューラルネットワークのソルバ。
///
/// モデル (微分可能な場) と問題定義を束ね、条件ごとに方程式を割り当てます。
pub struct PinnSolver<B: Backend, F, E> {
    pub model: F,
    pub problem: Problem<B>,
    equations: HashMap<String, E>,
}

impl<B, F, E> PinnSolver<B, F, E>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
    E: Equation<B, F>,
{
    pub fn new(model: F, problem: Problem<B>) -> Self {
        Self {
            model,
            problem,
            equations: HashMap::new(),
        }
    }

    /// 条件に方程式を割り当てます。割り当てられた条件のみが
    /// リファインメントの対象になります。
    pub fn with_equation(mut self, condition: impl Into<String>, equation: E) -> Self {
        self.equations.insert(condition.into(), equation);
        self
    }

    /// 点集合に対する方程式残差を計算します。
    pub fn compute_residual(
        &self,
        points: &LabelTensor<B>,
        equation: &E,
    ) -> LabelTensor<TwiceDifferentiated<B>> {
        equation.residual(&self.model, points)
    }
}

impl<B, F, E> RefinableSolver<B> for PinnSolver<B, F, E>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
    E: Equation<B, F>,
{
    type ResidualBackend = TwiceDifferentiated<B>;

    fn refinable_conditions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.equations.keys().cloned().collect();
        names.sort();
        names
    }

    fn points(&self, name: &str) -> Option<&LabelTensor<B>> {
        self.problem.points(name)
    }

    fn replace_points(&mut self, name: &str, points: LabelTensor<B>) {
        self.problem.set_points(name, points);
    }

    fn sample_domain(&self, name: &str, n: usize) -> Result<LabelTensor<B>, RefinementError> {
        let condition = self
            .problem
            .condition(name)
            .ok_or_else(|| RefinementError::UnknownCondition(name.to_string()))?;
        let domain = self
            .problem
            .domain(&condition.domain)
            .ok_or_else(|| RefinementError::UnknownDomain(condition.domain.clone()))?;
        let device = self
            .problem
            .points(name)
            .map(|p| p.tensor().device())
            .unwrap_or_default();
        Ok(domain.sample(n, SampleMode::Random, &device))
    }

    fn residual(
        &self,
        name: &str,
        points: &LabelTensor<B>,
    ) -> Result<Tensor<Self::ResidualBackend, 2>, RefinementError> {
        let equation = self
            .equations
            .get(name)
            .ok_or_else(|| RefinementError::MissingEquation(name.to_string()))?;
        Ok(self.compute_residual(points, equation).into_tensor())
    }
}
