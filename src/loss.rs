//! 残差評価用の要素ごとの損失。
//!
//! リファインメントは点ごとの残差の大きさだけを必要とするため、損失は
//! 内部で縮約を行わない要素ごとの形でのみ定義します。縮約はコールバック側
//! が明示的に行います。

use std::str::FromStr;

use burn::nn::loss::MseLoss as BurnMseLoss;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::ConfigError;

/// 縮約を行わない要素ごとの損失。
pub trait PointwiseLoss {
    /// 予測と目標から同形状の要素ごとの損失を計算します。
    fn forward<B: Backend>(&self, prediction: Tensor<B, 2>, target: Tensor<B, 2>)
    -> Tensor<B, 2>;
}

/// 絶対誤差 (L1) 損失。リファインメントの既定値です。
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Loss;

impl PointwiseLoss for L1Loss {
    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        (prediction - target).abs()
    }
}

/// 二乗誤差損失。
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl PointwiseLoss for SquaredLoss {
    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        BurnMseLoss::new().forward_no_reduction(prediction, target)
    }
}

/// 文字列から選択可能な残差損失。CLI の設定面で使用します。
#[derive(Debug, Clone, Copy)]
pub enum ResidualLoss {
    L1(L1Loss),
    Squared(SquaredLoss),
}

impl PointwiseLoss for ResidualLoss {
    fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        match self {
            Self::L1(loss) => loss.forward(prediction, target),
            Self::Squared(loss) => loss.forward(prediction, target),
        }
    }
}

impl FromStr for ResidualLoss {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l1" => Ok(Self::L1(L1Loss)),
            "mse" => Ok(Self::Squared(SquaredLoss)),
            other => Err(ConfigError::UnknownLoss(other.to_string())),
        }
    }
}
