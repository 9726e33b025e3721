use crate::{Dataset, Error, Matrix, Mlp, Result, loss};

#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub epochs: usize,
    pub lr: f64,
    /// Rows per update; `None` trains on the whole dataset at once.
    pub batch_size: Option<usize>,
    /// Log the training loss every `n` epochs at `debug` level.
    pub log_every: Option<usize>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 1_000,
            lr: 0.1,
            batch_size: None,
            log_every: None,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        validate_schedule(self.lr, self.epochs)?;
        if self.batch_size == Some(0) {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if self.log_every == Some(0) {
            return Err(Error::InvalidConfig("log_every must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FitReport {
    /// MSE over the whole dataset after the last epoch.
    pub final_loss: f64,
    /// Number of forward + backpropagate updates performed.
    pub steps: usize,
}

impl Mlp {
    /// Full-batch gradient descent: every epoch is one forward pass and one
    /// backpropagation step over all rows.
    pub fn train(
        &mut self,
        inputs: &Matrix,
        targets: &Matrix,
        learning_rate: f64,
        epochs: usize,
    ) -> Result<()> {
        self.check_training_data(inputs, targets)?;
        validate_schedule(learning_rate, epochs)?;

        for _ in 0..epochs {
            self.forward(inputs)?;
            self.backpropagate(targets, learning_rate)?;
        }
        Ok(())
    }

    /// Mini-batch gradient descent over contiguous row slices of `batch_size`.
    ///
    /// The last slice of an epoch may be shorter. Rows are visited in order every
    /// epoch (no shuffling).
    pub fn train_batched(
        &mut self,
        inputs: &Matrix,
        targets: &Matrix,
        learning_rate: f64,
        epochs: usize,
        batch_size: usize,
    ) -> Result<()> {
        self.check_training_data(inputs, targets)?;
        validate_schedule(learning_rate, epochs)?;
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }

        for _ in 0..epochs {
            self.run_batched_epoch(inputs, targets, learning_rate, batch_size)?;
        }
        Ok(())
    }

    fn run_batched_epoch(
        &mut self,
        inputs: &Matrix,
        targets: &Matrix,
        learning_rate: f64,
        batch_size: usize,
    ) -> Result<usize> {
        let num_samples = inputs.rows();
        let mut steps = 0;
        let mut start = 0;
        while start < num_samples {
            let end = (start + batch_size).min(num_samples);
            let x = inputs.subrange(start, end)?;
            let t = targets.subrange(start, end)?;

            self.forward(&x)?;
            self.backpropagate(&t, learning_rate)?;

            steps += 1;
            start = end;
        }
        Ok(steps)
    }

    /// Train on `data` and report the resulting loss.
    pub fn fit(&mut self, data: &Dataset, cfg: FitConfig) -> Result<FitReport> {
        cfg.validate()?;
        let (inputs, targets) = (data.features(), data.labels());
        self.check_training_data(inputs, targets)?;

        let batch_size = cfg.batch_size.unwrap_or(inputs.rows());
        let mut steps = 0;
        for epoch in 1..=cfg.epochs {
            steps += self.run_batched_epoch(inputs, targets, cfg.lr, batch_size)?;

            if let Some(every) = cfg.log_every {
                if epoch % every == 0 {
                    let loss = self.evaluate_mse(inputs, targets)?;
                    tracing::debug!(epoch, loss, "training progress");
                }
            }
        }

        let final_loss = self.evaluate_mse(inputs, targets)?;
        tracing::info!(
            epochs = cfg.epochs,
            steps,
            final_loss,
            "training finished"
        );
        Ok(FitReport { final_loss, steps })
    }

    /// Mean squared error of the current predictions.
    pub fn evaluate_mse(&mut self, inputs: &Matrix, targets: &Matrix) -> Result<f64> {
        let pred = self.predict(inputs)?;
        loss::mse(&pred, targets)
    }

    fn check_training_data(&self, inputs: &Matrix, targets: &Matrix) -> Result<()> {
        if inputs.rows() == 0 {
            return Err(Error::InvalidData(
                "training data must not be empty".to_owned(),
            ));
        }
        if inputs.rows() != targets.rows() {
            return Err(Error::DimensionMismatch(format!(
                "inputs/targets row count mismatch: {} vs {}",
                inputs.rows(),
                targets.rows()
            )));
        }
        if inputs.cols() != self.input_dim() {
            return Err(Error::DimensionMismatch(format!(
                "inputs have {} columns, model input_dim is {}",
                inputs.cols(),
                self.input_dim()
            )));
        }
        if targets.cols() != self.output_dim() {
            return Err(Error::DimensionMismatch(format!(
                "targets have {} columns, model output_dim is {}",
                targets.cols(),
                self.output_dim()
            )));
        }
        Ok(())
    }
}

fn validate_schedule(lr: f64, epochs: usize) -> Result<()> {
    if epochs == 0 {
        return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
    }
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig("lr must be finite and > 0".to_owned()));
    }
    Ok(())
}
