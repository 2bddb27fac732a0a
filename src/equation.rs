//! 微分方程式の残差定義。
//!
//! 方程式は微分可能な場と点集合から点ごとの残差 (真の解では 0 になるべき
//! 値) を計算します。残差は最大 2 階の微分を含められるよう、2 段内側の
//! バックエンドで返します。

use burn::tensor::backend::AutodiffBackend;

use crate::label_tensor::LabelTensor;
use crate::operator::{self, Field, LaplacianMethod, TwiceDifferentiated};

/// 場に対する微分方程式。
pub trait Equation<B, F>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    /// 各点における残差を計算します。
    fn residual(&self, field: &F, points: &LabelTensor<B>)
    -> LabelTensor<TwiceDifferentiated<B>>;
}

/// 1 次元の線形移流方程式 `∂u/∂t + c·∂u/∂x = 0`。
///
/// 場の先頭成分を `u` として扱い、入力ラベルに `t` と `x` を仮定します。
#[derive(Debug, Clone, Copy)]
pub struct AdvectionEquation {
    pub speed: f32,
}

impl<B, F> Equation<B, F> for AdvectionEquation
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    fn residual(
        &self,
        field: &F,
        points: &LabelTensor<B>,
    ) -> LabelTensor<TwiceDifferentiated<B>> {
        let labels = field.output_labels();
        let u = labels[0].as_str();
        let grads = operator::fast_grad(field, points, &[u], &["t", "x"]);
        let du_dt = grads
            .extract(&[format!("d{}dt", u)])
            .expect("勾配ラベルは導出済み")
            .into_tensor();
        let du_dx = grads
            .extract(&[format!("d{}dx", u)])
            .expect("勾配ラベルは導出済み")
            .into_tensor();
        let residual = du_dt + du_dx.mul_scalar(self.speed);
        LabelTensor::new_unchecked(residual.inner(), vec!["residual".into()])
    }
}

/// 粘性バーガース方程式 `∂u/∂t + u·∂u/∂x − ν·∂²u/∂x² = 0`。
///
/// 場の先頭成分を `u` として扱い、入力ラベルに `t` と `x` を仮定します。
/// 時間微分は勾配、非線形項は移流、粘性項はラプラシアンとして計算します。
#[derive(Debug, Clone, Copy)]
pub struct BurgersEquation {
    pub nu: f32,
}

impl<B, F> Equation<B, F> for BurgersEquation
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    fn residual(
        &self,
        field: &F,
        points: &LabelTensor<B>,
    ) -> LabelTensor<TwiceDifferentiated<B>> {
        let labels = field.output_labels();
        let u = labels[0].as_str();

        let du_dt = operator::fast_grad(field, points, &[u], &["t"])
            .into_tensor()
            .inner();
        let advection = operator::fast_advection(field, points, &[u], &[u], &["x"])
            .into_tensor()
            .inner();
        let diffusion =
            operator::fast_laplacian(field, points, &[u], &["x"], LaplacianMethod::Std)
                .into_tensor();

        let residual = du_dt + advection - diffusion.mul_scalar(self.nu);
        LabelTensor::new_unchecked(residual, vec!["residual".into()])
    }
}
