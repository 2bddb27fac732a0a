//! # ラベル付き微分演算子と R3 リファインメントによる PINN 学習
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train --epochs 3000 --sample-every 100
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer
//! ```

use clap::Parser;
use pinn_r3::cli::{Cli, Commands};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`infer`の処理に振り分けます。
fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Train {
            epochs,
            n_collocation,
            sample_every,
            residual_loss,
        } => pinn_r3::training::run(epochs, n_collocation, sample_every, &residual_loss),
        Commands::Infer => pinn_r3::inference::run(),
    };

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}
