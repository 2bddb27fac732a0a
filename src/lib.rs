//! # ラベル付き微分演算子と R3 リファインメント
//!
//! `burn` フレームワークの逆モード自動微分を使用して、ラベル付きテンソル上の
//! 微分演算子（勾配・発散・ラプラシアン・移流）を計算し、PDE 残差に基づく
//! 適応的な選点更新（R3 リファインメント）とともに物理情報ニューラル
//! ネットワーク（PINN）を学習するための主要なコンポーネントを提供します。

pub mod cli;
pub mod equation;
pub mod error;
pub mod inference;
pub mod label_tensor;
pub mod loss;
pub mod model;
pub mod operator;
pub mod problem;
pub mod refinement;
pub mod solver;
pub mod training;

/// モデルを保存するファイル名
pub const MODEL_FILENAME: &str = "pinn_model.mpk";
