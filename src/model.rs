//! ニューラルサロゲートとなる多層パーセプトロン。

use burn::module::{Ignored, Module};
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;

use crate::operator::Field;

/// PINN の本体となるニューラルネットワークモデル。
///
/// 座標を入力とし、その点における物理量を予測する多層パーセプトロン (MLP)
/// です。出力列には名前が付き、微分演算子はその名前で成分を指定します。
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
    output_labels: Ignored<Vec<String>>,
}

impl<B: Backend> Model<B> {
    /// 新しいモデルを初期化します。
    pub fn new(device: &B::Device, n_input: usize, output_labels: &[&str]) -> Self {
        let n_hidden = 20;
        let n_layers = 4;
        let mut linears = Vec::new();
        linears.push(LinearConfig::new(n_input, n_hidden).init(device));
        for _ in 1..(n_layers - 1) {
            linears.push(LinearConfig::new(n_hidden, n_hidden).init(device));
        }
        linears.push(LinearConfig::new(n_hidden, output_labels.len()).init(device));
        Self {
            linears,
            activation: Tanh::new(),
            output_labels: Ignored(output_labels.iter().map(|l| l.to_string()).collect()),
        }
    }

    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for i in 0..(self.linears.len() - 1) {
            x = self.linears[i].forward(x);
            x = self.activation.forward(x);
        }
        self.linears.last().expect("モデルは最低 1 層を持つ").forward(x)
    }
}

impl<B: AutodiffBackend> Field<B> for Model<B> {
    fn evaluate(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn output_labels(&self) -> Vec<String> {
        self.output_labels.0.clone()
    }
}
