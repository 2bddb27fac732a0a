//! `train` サブコマンド: 粘性バーガース方程式の PINN 学習。
//!
//! 物理残差の選点集合は R3 リファインメントにより `sample_every` エポック
//! ごとに更新されます。

use crate::MODEL_FILENAME;
use crate::equation::BurgersEquation;
use crate::loss::ResidualLoss;
use crate::model::Model;
use crate::problem::{Condition, Domain, Problem, SampleMode};
use crate::refinement::R3Refinement;
use crate::solver::{PinnSolver, RefinableSolver};
use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{Distribution, Tensor};
use plotters::prelude::*;
use std::f32::consts::PI;
use std::time::Instant;

// ラプラシアンまで微分できるよう、自動微分バックエンドを二重に重ねる
type MyBackend = Autodiff<Autodiff<NdArray<f32>>>;

/// `train`サブコマンドを実行します。
pub fn run(
    epochs: usize,
    n_collocation: usize,
    sample_every: usize,
    residual_loss: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let device = Default::default();

    // --- 問題定義 ---
    let domain = Domain::new()
        .with_variable("t", 0.0, 1.0)
        .with_variable("x", -1.0, 1.0);
    let mut problem = Problem::<MyBackend>::new()
        .add_domain("interior", domain)
        .add_condition("physics", Condition::new("interior"));
    problem.discretise(n_collocation, SampleMode::Random, &device);

    // --- データセットの準備 (初期条件と境界条件) ---
    let n_ic = 100;
    let n_bc = 100;
    let t_ic = Tensor::<MyBackend, 2>::zeros([n_ic, 1], &device);
    let x_ic = Tensor::<MyBackend, 2>::random([n_ic, 1], Distribution::Uniform(-1.0, 1.0), &device);
    let u_ic = x_ic.clone().mul_scalar(PI).sin().neg();
    let coords_ic = Tensor::cat(vec![t_ic, x_ic], 1);
    let t_bc = Tensor::<MyBackend, 2>::random([n_bc, 1], Distribution::Uniform(0.0, 1.0), &device);
    let x_bc_neg1 = Tensor::ones_like(&t_bc).mul_scalar(-1.0);
    let x_bc_pos1 = Tensor::ones_like(&t_bc);
    let coords_bc_neg1 = Tensor::cat(vec![t_bc.clone(), x_bc_neg1], 1);
    let coords_bc_pos1 = Tensor::cat(vec![t_bc, x_bc_pos1], 1);

    // --- モデル・ソルバ・コールバックの初期化 ---
    let model = Model::<MyBackend>::new(&device, 2, &["u"]);
    let mut solver = PinnSolver::new(model, problem)
        .with_equation("physics", BurgersEquation { nu: 0.01 / PI });
    let loss: ResidualLoss = residual_loss.parse()?;
    let mut refinement = R3Refinement::new(sample_every)?.with_loss(loss);
    let mut optim = AdamConfig::new().init();
    let learning_rate = 1e-3;

    let mut total_loss_history = Vec::new();
    let mut phys_loss_history = Vec::new();
    let training_start = Instant::now();

    println!("学習を開始します (バーガース方程式) - バックエンド: NdArray (CPU)");

    // --- 学習ループ ---
    for epoch in 1..=epochs {
        let pred_ic = solver.model.forward(coords_ic.clone());
        let loss_ic = MseLoss::new().forward(pred_ic, u_ic.clone(), Reduction::Mean);
        let pred_bc_neg1 = solver.model.forward(coords_bc_neg1.clone());
        let pred_bc_pos1 = solver.model.forward(coords_bc_pos1.clone());
        let loss_bc = MseLoss::new().forward(
            pred_bc_neg1,
            Tensor::zeros([n_bc, 1], &device),
            Reduction::Mean,
        ) + MseLoss::new().forward(
            pred_bc_pos1,
            Tensor::zeros([n_bc, 1], &device),
            Reduction::Mean,
        );

        // 物理残差: 現在の選点で評価し、外側のバックエンドへ持ち上げる。
        // 残差は入力座標に対する微分として内側バックエンドに落ちるため、
        // 持ち上げた時点でモデルパラメータからは切り離されている。物理損失は
        // リファインメントの駆動と監視の指標であり、パラメータ勾配には
        // 寄与しない (IC/BC のデータ損失が学習を駆動する)。
        let points = solver
            .points("physics")
            .ok_or("選点が初期化されていません")?
            .clone();
        let residual = solver.residual("physics", &points)?;
        let residual = Tensor::<MyBackend, 2>::from_inner(Tensor::from_inner(residual));
        let loss_phys = MseLoss::new().forward(
            residual.clone(),
            Tensor::zeros_like(&residual),
            Reduction::Mean,
        );
        let total_loss = loss_ic + loss_bc + loss_phys.clone();

        if epoch % 200 == 0 {
            let total_loss_val = total_loss.clone().into_scalar();
            let phys_loss_val = loss_phys.clone().into_scalar();
            total_loss_history.push(total_loss_val);
            phys_loss_history.push(phys_loss_val);
            println!(
                "[Epoch {}] Total Loss: {:.6}, Physics Loss: {:.6}",
                epoch, total_loss_val, phys_loss_val
            );
        }

        let grads = total_loss.backward();
        let grads = GradientsParams::from_grads(grads, &solver.model);
        solver.model = optim.step(learning_rate, solver.model.clone(), grads);

        // 選点集合の適応的な更新
        refinement.on_epoch_end(epoch, &mut solver)?;
    }
    let training_duration = training_start.elapsed();
    println!("学習が完了しました。");
    println!("=> 学習時間: {:.2?}", training_duration);

    // --- 結果の保存と描画 ---
    plot_loss_history(&total_loss_history, &phys_loss_history)?;
    println!("=> 損失グラフを 'loss_graph.png' に保存しました。");

    println!("学習済みモデルを保存中...");
    match solver.model.clone().save_file(
        MODEL_FILENAME,
        &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
    ) {
        Ok(_) => (),
        Err(e) => return Err(Box::new(e)),
    };
    println!("=> モデルを '{}' に保存しました。", MODEL_FILENAME);

    Ok(())
}

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
fn plot_loss_history(
    total_loss_hist: &[f32],
    phys_loss_hist: &[f32],
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new("loss_graph.png", (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let max_log_loss = total_loss_hist.first().unwrap_or(&1.0).log10();
    let min_log_loss = total_loss_hist.last().unwrap_or(&1e-6).log10() - 0.5;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..total_loss_hist.len(), min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epochs (x200)")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            total_loss_hist
                .iter()
                .enumerate()
                .map(|(i, &val)| (i, val.log10())),
            &RED,
        ))?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            phys_loss_hist
                .iter()
                .enumerate()
                .map(|(i, &val)| (i, val.log10())),
            &BLUE,
        ))?
        .label("Physics Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
