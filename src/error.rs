//! クレート全体で使用するエラー型を定義します。
//!
//! 検証付きの微分演算子・リファインメントコールバックは、契約違反を検出した
//! 時点で即座に対応するエラーを返します。再試行や自動復旧は行いません。

use thiserror::Error;

/// ラベル付きテンソルの構築・操作に関するエラー。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// ラベル数が最終軸の列数と一致しない
    #[error("ラベル数 {labels} がテンソルの列数 {columns} と一致しません")]
    CountMismatch { labels: usize, columns: usize },

    /// ラベルが重複している
    #[error("ラベル '{0}' が重複しています")]
    Duplicate(String),

    /// 指定されたラベルが存在しない
    #[error("ラベル '{0}' が見つかりません")]
    NotFound(String),

    /// 連結対象のテンソル同士で行数が一致しない
    #[error("連結するテンソルの行数が一致しません ({left} と {right})")]
    RowCountMismatch { left: usize, right: usize },

    /// 行方向の連結でラベル列が一致しない
    #[error("行方向に連結するテンソルのラベルが一致しません")]
    IncompatibleLabels,

    /// 総和を取るテンソル同士で形状が一致しない
    #[error("総和を取るテンソルの形状が一致しません")]
    ShapeMismatch,

    /// 空のテンソル列が渡された
    #[error("少なくとも 1 つのテンソルが必要です")]
    Empty,
}

/// 検証付き微分演算子が検出する契約違反。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    /// 微分変数が入力テンソルのラベルに存在しない
    #[error("微分変数 '{0}' が入力テンソルのラベルにありません")]
    MissingDerivative(String),

    /// 成分が出力のラベルに存在しない
    #[error("成分 '{0}' が出力のラベルにありません")]
    MissingComponent(String),

    /// 発散における成分数と微分方向数の不一致
    #[error("発散には成分数と微分方向数の一致が必要です (成分 {components}, 方向 {directions})")]
    ComponentDirectionMismatch { components: usize, directions: usize },

    /// 速度場のラベルが出力のラベルに存在しない
    #[error("速度場 '{0}' が出力のラベルにありません")]
    MissingVelocity(String),

    /// 速度場の次元と微分方向数の不一致
    #[error("速度場の次元 {velocity} が微分方向数 {directions} と一致しません")]
    VelocityDimensionMismatch { velocity: usize, directions: usize },

    /// 不明なラプラシアン計算法
    #[error("不明なラプラシアン計算法 '{0}' です (std または divgrad)")]
    UnknownMethod(String),
}

/// 構築時に検出される設定エラー。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// サンプリング周期が 0
    #[error("sample_every は 1 以上でなければなりません")]
    ZeroCadence,

    /// 不明な残差損失名
    #[error("不明な残差損失 '{0}' です (l1 または mse)")]
    UnknownLoss(String),

    /// 不明なサンプリングモード名
    #[error("不明なサンプリングモード '{0}' です (random または grid)")]
    UnknownSampleMode(String),
}

/// リファインメント実行時のエラー。
#[derive(Error, Debug)]
pub enum RefinementError {
    /// 指定された条件がソルバに存在しない
    #[error("条件 '{0}' が存在しません")]
    UnknownCondition(String),

    /// 条件に方程式が定義されていない
    #[error("条件 '{0}' に方程式が定義されていません")]
    MissingEquation(String),

    /// 条件の参照するドメインが存在しない
    #[error("ドメイン '{0}' が存在しません")]
    UnknownDomain(String),

    /// 新しい点集合の書き戻しに失敗した
    #[error(transparent)]
    Label(#[from] LabelError),
}
