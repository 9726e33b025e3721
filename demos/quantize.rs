use ffnet::{ActivationCatalog, Dataset, Dequantize, FitConfig, Mlp, MlpBuilder};
use tracing_subscriber::EnvFilter;

fn main() -> ffnet::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let xs: Vec<Vec<f64>> = (0..64)
        .map(|i| {
            let t = i as f64 / 63.0;
            vec![t, 1.0 - t]
        })
        .collect();
    let ys: Vec<Vec<f64>> = xs.iter().map(|x| vec![x[0] * x[1] * 4.0]).collect();
    let data = Dataset::from_rows(&xs, &ys)?;
    let split = data.split(0.25, 7)?;
    let train = Dataset::new(split.train_features, split.train_labels)?;

    let mut mlp = MlpBuilder::from_sizes(&[2, 8, 1], &["tanh", "sigmoid"])?.build_with_seed(1)?;
    let report = mlp.fit(
        &train,
        FitConfig {
            epochs: 2_000,
            lr: 0.05,
            batch_size: Some(8),
            log_every: Some(500),
        },
    )?;
    println!("train mse={:.5} steps={}", report.final_loss, report.steps);

    let dir = std::env::temp_dir();
    let plain = dir.join("ffnet_demo.bin");
    let quant = dir.join("ffnet_demo_8bit.bin");
    mlp.save_binary(&plain)?;
    mlp.save_quantized(&quant)?;
    println!(
        "plain={} bytes quantized={} bytes exponent={}",
        std::fs::metadata(&plain)?.len(),
        std::fs::metadata(&quant)?.len(),
        mlp.quantization_exponent()
    );

    let mut restored = Mlp::load_quantized(&quant, ActivationCatalog::new(), Dequantize::Scaled)?;
    let test_mse = mlp.evaluate_mse(&split.test_features, &split.test_labels)?;
    let quant_mse = restored.evaluate_mse(&split.test_features, &split.test_labels)?;
    println!("test mse: f64={test_mse:.5} 8-bit={quant_mse:.5}");
    Ok(())
}
