//! `infer` サブコマンド: 保存済みモデルによる推論。

use crate::MODEL_FILENAME;
use crate::model::Model;
use crate::problem::{Domain, SampleMode};
use burn::backend::NdArray;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use std::path::Path;
use std::time::Instant;

type MyBackend = NdArray<f32>;

/// `infer`サブコマンドを実行します。
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let device = Default::default();

    if !Path::new(MODEL_FILENAME).exists() {
        return Err(format!(
            "モデルファイル '{}' が見つかりません。\n最初に 'train' コマンドでモデルを学習・保存してください。",
            MODEL_FILENAME
        ).into());
    }

    println!("\n推論を実行します - バックエンド: NdArray (CPU)");
    let inference_start = Instant::now();

    println!("保存済みモデルを '{}' からロード中...", MODEL_FILENAME);
    let model = match Model::<MyBackend>::new(&device, 2, &["u"]).load_file(
        MODEL_FILENAME,
        &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        &device,
    ) {
        Ok(loaded_model) => loaded_model,
        Err(e) => return Err(Box::new(e)),
    };

    // 学習時と同じドメインを軸あたり 50 点の格子で離散化する
    let n_per_axis = 50;
    let domain = Domain::new()
        .with_variable("t", 0.0, 1.0)
        .with_variable("x", -1.0, 1.0);
    let infer_coords = domain.sample(n_per_axis, SampleMode::Grid, &device);

    let predictions = model.forward(infer_coords.tensor().clone());
    let inference_duration = inference_start.elapsed();

    let u_min = predictions.clone().min().into_scalar();
    let u_max = predictions.clone().max().into_scalar();
    println!(
        "推論が完了しました。入力グリッド数: {}x{}={}, 出力テンソルの形状: {:?}",
        n_per_axis,
        n_per_axis,
        infer_coords.n_points(),
        predictions.dims()
    );
    println!("=> u の範囲: [{:.4}, {:.4}]", u_min, u_max);
    println!("=> 推論時間: {:.2?}", inference_duration);

    Ok(())
}
