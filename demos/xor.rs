use ffnet::{Matrix, Mlp};
use tracing_subscriber::EnvFilter;

fn main() -> ffnet::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Classic XOR dataset.
    let inputs = Matrix::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ])?;
    let targets = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;

    // 2 -> 10 -> 1, sigmoid everywhere.
    let mut mlp = Mlp::new_with_seed(&[2, 10, 1], 0)?;
    mlp.train(&inputs, &targets, 0.1, 100_000)?;

    for i in 0..inputs.rows() {
        let prediction = mlp.predict_row(&inputs, i)?;
        println!(
            "Input: ({}, {}) => Prediction: {}",
            inputs[(i, 0)],
            inputs[(i, 1)],
            prediction[(0, 0)]
        );
    }

    print!("{mlp}");
    Ok(())
}
