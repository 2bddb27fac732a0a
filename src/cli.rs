use clap::{Parser, Subcommand};

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Physics-informed training with labeled differential operators and R3 refinement", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PINN モデルを R3 リファインメント付きで学習し、結果をファイルに保存します
    Train {
        /// 学習エポック数
        #[arg(long, default_value_t = 3000)]
        epochs: usize,

        /// 選点 (コロケーション点) の数
        #[arg(long, default_value_t = 2000)]
        n_collocation: usize,

        /// リファインメントの発火周期 (エポック)
        #[arg(long, default_value_t = 100)]
        sample_every: usize,

        /// 残差損失 (l1 または mse)
        #[arg(long, default_value = "l1")]
        residual_loss: String,
    },
    /// 保存された PINN モデルを使い、推論を実行します
    Infer,
}
