//! ベクトル化された微分演算子。
//!
//! ラベル付きテンソル上で勾配・発散・ラプラシアン・移流を逆モード自動微分に
//! より計算します。各演算子は入力を検証する通常版と、検証を行わない高速版
//! (`fast_` 接頭辞) を持ちます。高速版では `components` と `d` を必ず明示し、
//! 不正なラベルを渡した場合の動作は未定義です (テンソル層の panic もしくは
//! 誤った数値)。
//!
//! `burn` の逆伝播は計算グラフを消費し、勾配は 1 段内側のバックエンドに
//! 落ちるため、演算子は出力テンソルではなく微分可能な場 ([`Field`]) を
//! 受け取り、スカラー逆伝播のたびに順伝播をやり直します。2 階微分は
//! 内側で追跡した入力を外側のグラフへ持ち上げた入れ子のグラフを毎回
//! 新しく組み直し、外側・内側の順に 1 回ずつ逆伝播して取り出します。
//! 微分の階数は型に現れます: 1 階微分は [`Differentiated`]、2 階微分は
//! [`TwiceDifferentiated`] のバックエンドに結果を返します。

use std::str::FromStr;

use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};

use crate::error::OperatorError;
use crate::label_tensor::LabelTensor;

/// 1 階微分後のバックエンド。
pub type Differentiated<B> = <B as AutodiffBackend>::InnerBackend;

/// 2 階微分後のバックエンド。
pub type TwiceDifferentiated<B> =
    <<B as AutodiffBackend>::InnerBackend as AutodiffBackend>::InnerBackend;

/// 微分可能な場。入力座標からラベル付きの出力を計算します。
///
/// ニューラルネットワーク ([`crate::model::Model`]) のほか、解析的な場も
/// このトレイトを実装すれば同じ演算子で微分できます。
pub trait Field<B: AutodiffBackend> {
    /// 入力座標における場の値を計算します。
    fn evaluate(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    /// 出力列のラベル。
    fn output_labels(&self) -> Vec<String>;
}

/// ラプラシアンの計算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaplacianMethod {
    /// ヘッセ行列の対角和 (指定した方向の部分集合に対して厳密)
    #[default]
    Std,
    /// 勾配場の発散として計算
    DivGrad,
}

impl FromStr for LaplacianMethod {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "std" => Ok(Self::Std),
            "divgrad" => Ok(Self::DivGrad),
            other => Err(OperatorError::UnknownMethod(other.to_string())),
        }
    }
}

/// スカラー成分 1 つの勾配を 1 回の順伝播と逆伝播で計算します。
///
/// `x` は呼び出し側で `require_grad` 済みであること。出力が単一列の場合は
/// 成分抽出を省略します。出力と接続のない入力には零勾配を返します。
fn scalar_grad_raw<B, F>(
    field: &F,
    x: &Tensor<B, 2>,
    input_labels: &[String],
    component: &str,
    d: &[String],
) -> Tensor<B::InnerBackend, 2>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let n = x.dims()[0];
    let output = field.evaluate(x.clone());
    let scalar = if output.dims()[1] == 1 {
        output
    } else {
        let idx = field
            .output_labels()
            .iter()
            .position(|l| l == component)
            .expect("成分ラベルは呼び出し側で検証済み");
        output.slice([0..n, idx..idx + 1])
    };

    let grads = scalar.sum().backward();
    let grad = match x.grad(&grads) {
        Some(grad) => grad,
        None => Tensor::zeros(x.dims(), &x.device()),
    };

    let indices: Vec<i32> = d
        .iter()
        .map(|i| {
            input_labels
                .iter()
                .position(|l| l == i)
                .expect("微分変数ラベルは呼び出し側で検証済み") as i32
        })
        .collect();
    grad.select(1, Tensor::from_ints(indices.as_slice(), &x.device()))
}

/// 勾配を計算します (検証なし)。
///
/// 成分ごとに順伝播と逆伝播を 1 回ずつ行い、結果をラベル軸方向に連結します。
/// 出力は成分優先・方向次の順で `|components| × |d|` 列、ラベルは
/// `d<成分>d<変数>` です。
pub fn fast_grad<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: &[impl AsRef<str>],
    d: &[impl AsRef<str>],
) -> LabelTensor<Differentiated<B>>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let d: Vec<String> = d.iter().map(|s| s.as_ref().to_string()).collect();
    let x = input.tensor().clone().require_grad();
    let mut cols = Vec::with_capacity(components.len());
    let mut labels = Vec::with_capacity(components.len() * d.len());
    for c in components {
        let c = c.as_ref();
        cols.push(scalar_grad_raw(field, &x, input.labels(), c, &d));
        for i in &d {
            labels.push(format!("d{}d{}", c, i));
        }
    }
    LabelTensor::new_unchecked(Tensor::cat(cols, 1), labels)
}

/// 発散を計算します (検証なし)。
///
/// 成分 `i` と方向 `i` を位置で対にし、対応する対角項 `d<成分_i>d<方向_i>`
/// の総和を単一列として返します。
pub fn fast_div<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: &[impl AsRef<str>],
    d: &[impl AsRef<str>],
) -> LabelTensor<Differentiated<B>>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let grads = fast_grad(field, input, components, d);
    let mut terms = Vec::with_capacity(components.len());
    for (c, i) in components.iter().zip(d) {
        let label = format!("d{}d{}", c.as_ref(), i.as_ref());
        terms.push(grads.extract(&[label]).expect("対角項のラベルは導出済み"));
    }
    LabelTensor::summation(terms).expect("対角項は同形状")
}

/// スカラー成分 1 つ・方向 1 つの対角 2 階微分。
///
/// 呼び出しごとに入れ子のグラフを新しく組み直します: 内側グラフの葉を
/// `from_inner` で外側へ持ち上げてから順伝播し、外側の逆伝播で得た 1 階
/// 微分の対象列を、内側のグラフでもう一度同じ方向に逆伝播します。逆伝播は
/// 消費済みのグラフや葉を再利用せず、常に新しい葉から始めます。
fn scalar_second_derivative<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    component: &str,
    direction: &str,
) -> Tensor<TwiceDifferentiated<B>, 2>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    let n = input.n_points();
    let device = input.tensor().device();
    let idx = input
        .index_of(direction)
        .expect("微分変数ラベルは呼び出し側で検証済み");

    let x_inner = input.tensor().clone().inner().require_grad();
    let x_outer = Tensor::<B, 2>::from_inner(x_inner.clone()).require_grad();
    let output = field.evaluate(x_outer.clone());
    let scalar = if output.dims()[1] == 1 {
        output
    } else {
        let c = field
            .output_labels()
            .iter()
            .position(|l| l == component)
            .expect("成分ラベルは呼び出し側で検証済み");
        output.slice([0..n, c..c + 1])
    };

    // 外側の逆伝播: 1 階微分は内側グラフ上の関数として得られる
    let grads = scalar.sum().backward();
    let first = match x_outer.grad(&grads) {
        Some(grad) => grad,
        None => return Tensor::zeros([n, 1], &device),
    };

    // 内側の逆伝播: 1 階微分の対象列をもう一度同じ方向で微分する
    let grads2 = first.slice([0..n, idx..idx + 1]).sum().backward();
    match x_inner.grad(&grads2) {
        Some(grad) => grad.slice([0..n, idx..idx + 1]),
        None => Tensor::zeros([n, 1], &device),
    }
}

/// スカラー成分 1 つのラプラシアン (対角 2 階微分の総和)。
fn scalar_laplacian<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    component: &str,
    d: &[String],
) -> Tensor<TwiceDifferentiated<B>, 2>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    let n = input.n_points();
    let device = input.tensor().device();
    d.iter()
        .map(|i| scalar_second_derivative(field, input, component, i))
        .reduce(|acc, term| acc + term)
        .unwrap_or_else(|| Tensor::zeros([n, 1], &device))
}

/// ラプラシアンを計算します (検証なし)。
///
/// `Std` は成分ごとに対角 2 階微分を直接合算します。`DivGrad` は勾配の
/// 各列を対応する方向でもう一度微分し、発散として (ラベル付きの総和で)
/// 組み立てます。どちらも成分と方向の対ごとに入れ子のグラフを組み直し、
/// 両者は数値誤差の範囲で一致します。出力ラベルは `dd<成分>`。
pub fn fast_laplacian<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: &[impl AsRef<str>],
    d: &[impl AsRef<str>],
    method: LaplacianMethod,
) -> LabelTensor<TwiceDifferentiated<B>>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    let d: Vec<String> = d.iter().map(|s| s.as_ref().to_string()).collect();
    let labels: Vec<String> = components
        .iter()
        .map(|c| format!("dd{}", c.as_ref()))
        .collect();

    let cols: Vec<Tensor<TwiceDifferentiated<B>, 2>> = match method {
        LaplacianMethod::Std => components
            .iter()
            .map(|c| scalar_laplacian(field, input, c.as_ref(), &d))
            .collect(),
        LaplacianMethod::DivGrad => components
            .iter()
            .map(|c| {
                let terms: Vec<LabelTensor<TwiceDifferentiated<B>>> = d
                    .iter()
                    .map(|i| {
                        let column = scalar_second_derivative(field, input, c.as_ref(), i);
                        let label = format!("dd{}d{}d{}", c.as_ref(), i, i);
                        LabelTensor::new_unchecked(column, vec![label])
                    })
                    .collect();
                LabelTensor::summation(terms)
                    .expect("対角項は同形状")
                    .into_tensor()
            })
            .collect(),
    };

    LabelTensor::new_unchecked(Tensor::cat(cols, 1), labels)
}

/// 移流項を計算します (検証なし)。
///
/// 各成分について `Σ_j v_j · ∂成分/∂x_j` を計算します。速度場は出力から
/// 名前で抽出され、方向軸に沿って成分全体へブロードキャストされます。
/// 出力ラベルは `adv_<成分>`。
pub fn fast_advection<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    velocity_field: &[impl AsRef<str>],
    components: &[impl AsRef<str>],
    d: &[impl AsRef<str>],
) -> LabelTensor<Differentiated<B>>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let n = input.n_points();
    let k = components.len();
    let m = d.len();
    let device = input.tensor().device();

    // 速度場の値を評価して抽出 (勾配追跡は不要)
    let out_labels = field.output_labels();
    let indices: Vec<i32> = velocity_field
        .iter()
        .map(|v| {
            out_labels
                .iter()
                .position(|l| l == v.as_ref())
                .expect("速度場ラベルは呼び出し側で検証済み") as i32
        })
        .collect();
    let velocity = field
        .evaluate(input.tensor().clone())
        .select(1, Tensor::from_ints(indices.as_slice(), &device))
        .inner();

    // [n, 成分, 方向] に整形してから方向軸を前に出す
    let grads = fast_grad(field, input, components, d).into_tensor();
    let grads = grads.reshape([n, k, m]).swap_dims(1, 2);
    let velocity: Tensor<Differentiated<B>, 3> = velocity.unsqueeze_dim(2);
    let adv = (grads * velocity).sum_dim(1).reshape([n, k]);

    let labels = components
        .iter()
        .map(|c| format!("adv_{}", c.as_ref()))
        .collect();
    LabelTensor::new_unchecked(adv, labels)
}

/// 検証付き演算子の共通チェック。
///
/// 省略された `components` は出力の全ラベル、`d` は入力の全ラベルで
/// 補われます。微分変数が入力に、成分が出力に存在しない場合はエラーです。
fn check_values<B: Backend>(
    output_labels: &[String],
    input: &LabelTensor<B>,
    components: Option<&[&str]>,
    d: Option<&[&str]>,
) -> Result<(Vec<String>, Vec<String>), OperatorError> {
    let d: Vec<String> = match d {
        Some(list) => list.iter().map(|s| s.to_string()).collect(),
        None => input.labels().to_vec(),
    };
    let components: Vec<String> = match components {
        Some(list) => list.iter().map(|s| s.to_string()).collect(),
        None => output_labels.to_vec(),
    };

    for di in &d {
        if input.index_of(di).is_none() {
            return Err(OperatorError::MissingDerivative(di.clone()));
        }
    }
    for c in &components {
        if !output_labels.contains(c) {
            return Err(OperatorError::MissingComponent(c.clone()));
        }
    }
    Ok((components, d))
}

/// 勾配を計算します。
///
/// スカラー値・ベクトル値のどちらの場にも対応します。省略された
/// `components` / `d` は全ラベルで補われます。
pub fn grad<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: Option<&[&str]>,
    d: Option<&[&str]>,
) -> Result<LabelTensor<Differentiated<B>>, OperatorError>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let (components, d) = check_values(&field.output_labels(), input, components, d)?;
    Ok(fast_grad(field, input, &components, &d))
}

/// 発散を計算します。`components` と `d` は同じ長さでなければなりません。
pub fn div<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: Option<&[&str]>,
    d: Option<&[&str]>,
) -> Result<LabelTensor<Differentiated<B>>, OperatorError>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let (components, d) = check_values(&field.output_labels(), input, components, d)?;
    if components.len() != d.len() {
        return Err(OperatorError::ComponentDirectionMismatch {
            components: components.len(),
            directions: d.len(),
        });
    }
    Ok(fast_div(field, input, &components, &d))
}

/// ラプラシアンを計算します。
pub fn laplacian<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    components: Option<&[&str]>,
    d: Option<&[&str]>,
    method: LaplacianMethod,
) -> Result<LabelTensor<TwiceDifferentiated<B>>, OperatorError>
where
    B: AutodiffBackend,
    B::InnerBackend: AutodiffBackend,
    F: Field<B>,
{
    let (components, d) = check_values(&field.output_labels(), input, components, d)?;
    Ok(fast_laplacian(field, input, &components, &d, method))
}

/// 移流項を計算します。
///
/// 速度場のラベルは出力に存在し、その数は微分方向数と一致しなければ
/// なりません。
pub fn advection<B, F>(
    field: &F,
    input: &LabelTensor<B>,
    velocity_field: &[&str],
    components: Option<&[&str]>,
    d: Option<&[&str]>,
) -> Result<LabelTensor<Differentiated<B>>, OperatorError>
where
    B: AutodiffBackend,
    F: Field<B>,
{
    let (components, d) = check_values(&field.output_labels(), input, components, d)?;

    let output_labels = field.output_labels();
    for v in velocity_field {
        if !output_labels.iter().any(|l| l == v) {
            return Err(OperatorError::MissingVelocity(v.to_string()));
        }
    }
    if velocity_field.len() != d.len() {
        return Err(OperatorError::VelocityDimensionMismatch {
            velocity: velocity_field.len(),
            directions: d.len(),
        });
    }

    Ok(fast_advection(field, input, velocity_field, &components, &d))
}
