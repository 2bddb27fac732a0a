//! 微分問題の定義: ドメイン・条件・点集合の保管場所。
//!
//! リファインメントコールバックが消費する最小限の協調オブジェクト群です。
//! ドメインは変数名付きの軸範囲の直積として表し、一様ランダムまたは格子で
//! サンプリングできます。

use std::collections::HashMap;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use crate::error::ConfigError;
use crate::label_tensor::LabelTensor;

/// ドメインのサンプリングモード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMode {
    /// 各変数を一様ランダムに抽出
    #[default]
    Random,
    /// 変数ごとに `n` 点の等間隔格子 (合計 `n^次元` 点)
    Grid,
}

impl FromStr for SampleMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "grid" => Ok(Self::Grid),
            other => Err(ConfigError::UnknownSampleMode(other.to_string())),
        }
    }
}

/// 変数名付きの軸範囲の直積で表す矩形ドメイン。
#[derive(Debug, Clone, Default)]
pub struct Domain {
    variables: Vec<(String, [f32; 2])>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 変数とその範囲を追加します。
    pub fn with_variable(mut self, name: impl Into<String>, low: f32, high: f32) -> Self {
        self.variables.push((name.into(), [low, high]));
        self
    }

    /// 変数名の一覧 (サンプルのラベルになる順序)。
    pub fn labels(&self) -> Vec<String> {
        self.variables.iter().map(|(name, _)| name.clone()).collect()
    }

    /// ドメインから点をサンプリングします。
    ///
    /// `Random` は `n` 点、`Grid` は変数ごとに `n` 点の格子 (合計 `n^次元`
    /// 点) を返します。ラベルは変数の定義順です。
    pub fn sample<B: Backend>(&self, n: usize, mode: SampleMode, device: &B::Device) -> LabelTensor<B> {
        let tensor = match mode {
            SampleMode::Random => {
                let columns: Vec<Tensor<B, 2>> = self
                    .variables
                    .iter()
                    .map(|(_, [low, high])| {
                        Tensor::random(
                            [n, 1],
                            Distribution::Uniform(*low as f64, *high as f64),
                            device,
                        )
                    })
                    .collect();
                Tensor::cat(columns, 1)
            }
            SampleMode::Grid => self.grid(n, device),
        };
        LabelTensor::new_unchecked(tensor, self.labels())
    }

    fn grid<B: Backend>(&self, n: usize, device: &B::Device) -> Tensor<B, 2> {
        let dims = self.variables.len();
        let total = n.pow(dims as u32);
        let mut flat = Vec::with_capacity(total * dims);
        for point in 0..total {
            let mut stride = total;
            for (_, [low, high]) in &self.variables {
                stride /= n;
                let index = (point / stride) % n;
                let value = if n > 1 {
                    low + (high - low) * index as f32 / (n - 1) as f32
                } else {
                    (low + high) / 2.0
                };
                flat.push(value);
            }
        }
        Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([total, dims])
    }
}

/// ドメイン上の 1 つの条件。リファインメント対象はドメイン名で結び付きます。
#[derive(Debug, Clone)]
pub struct Condition {
    pub domain: String,
}

impl Condition {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

/// 微分問題: ドメインと条件、および条件ごとの現在の点集合。
///
/// 点集合はリファインメントのたびに丸ごと置き換えられます (追記ではなく
/// 置換)。
#[derive(Debug, Clone)]
pub struct Problem<B: Backend> {
    domains: HashMap<String, Domain>,
    conditions: HashMap<String, Condition>,
    points: HashMap<String, LabelTensor<B>>,
}

impl<B: Backend> Problem<B> {
    pub fn new() -> Self {
        Self {
            domains: HashMap::new(),
            conditions: HashMap::new(),
            points: HashMap::new(),
        }
    }

    pub fn add_domain(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.domains.insert(name.into(), domain);
        self
    }

    pub fn add_condition(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(name.into(), condition);
        self
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    /// 条件名の一覧 (決定的な順序)。
    pub fn condition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.conditions.keys().cloned().collect();
        names.sort();
        names
    }

    /// 全条件のドメインをサンプリングして点集合を初期化します。
    pub fn discretise(&mut self, n: usize, mode: SampleMode, device: &B::Device) {
        let samples: Vec<(String, LabelTensor<B>)> = self
            .conditions
            .iter()
            .filter_map(|(name, condition)| {
                self.domains
                    .get(&condition.domain)
                    .map(|domain| (name.clone(), domain.sample(n, mode, device)))
            })
            .collect();
        self.points.extend(samples);
    }

    pub fn points(&self, name: &str) -> Option<&LabelTensor<B>> {
        self.points.get(name)
    }

    /// 条件の点集合を新しいものへ置き換えます。
    pub fn set_points(&mut self, name: impl Into<String>, points: LabelTensor<B>) {
        self.points.insert(name.into(), points);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn unit_domain() -> Domain {
        Domain::new()
            .with_variable("t", 0.0, 1.0)
            .with_variable("x", -1.0, 1.0)
    }

    #[test]
    fn random_sample_respects_bounds() {
        let device = Default::default();
        let sample = unit_domain().sample::<B>(64, SampleMode::Random, &device);
        assert_eq!(sample.dims(), [64, 2]);
        assert_eq!(sample.labels(), ["t", "x"]);

        let values = sample.into_tensor().into_data().to_vec::<f32>().unwrap();
        for row in values.chunks(2) {
            assert!((0.0..=1.0).contains(&row[0]));
            assert!((-1.0..=1.0).contains(&row[1]));
        }
    }

    #[test]
    fn grid_sample_is_a_lattice() {
        let device = Default::default();
        let sample = unit_domain().sample::<B>(3, SampleMode::Grid, &device);
        assert_eq!(sample.dims(), [9, 2]);

        let values = sample.into_tensor().into_data().to_vec::<f32>().unwrap();
        // 先頭は両軸の下端、末尾は両軸の上端
        assert_eq!(&values[0..2], &[0.0, -1.0]);
        assert_eq!(&values[16..18], &[1.0, 1.0]);
        // 中央の点
        assert_eq!(&values[8..10], &[0.5, 0.0]);
    }

    #[test]
    fn sample_mode_parsing() {
        assert_eq!("random".parse::<SampleMode>(), Ok(SampleMode::Random));
        assert_eq!("grid".parse::<SampleMode>(), Ok(SampleMode::Grid));
        assert_eq!(
            "halton".parse::<SampleMode>().unwrap_err(),
            ConfigError::UnknownSampleMode("halton".into())
        );
    }

    #[test]
    fn discretise_seeds_condition_points() {
        let device = Default::default();
        let mut problem = Problem::<B>::new()
            .add_domain("interior", unit_domain())
            .add_condition("physics", Condition::new("interior"));
        problem.discretise(10, SampleMode::Random, &device);
        assert_eq!(problem.points("physics").unwrap().n_points(), 10);
        assert!(problem.points("absent").is_none());
    }
}
