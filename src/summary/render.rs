use std::fmt;

use serde::Serialize;

use super::{LayerRow, ModelSummary};
use crate::{InspectError, Result};

const RULE: &str = "----------------------------------------------------------------";
const DOUBLE_RULE: &str = "================================================================";

/// How the summary is written to stdout
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl ModelSummary {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.to_string()),
            OutputFormat::Json => serde_json::to_string_pretty(self)
                .map(|mut json| {
                    json.push('\n');
                    json
                })
                .map_err(|e| InspectError::Render(e.to_string())),
            OutputFormat::Csv => self.to_csv(),
        }
    }

    fn to_csv(&self) -> Result<String> {
        #[derive(Serialize)]
        struct CsvRow<'a> {
            layer: &'a str,
            path: &'a str,
            layer_type: &'a str,
            output_shape: String,
            params: i64,
            trainable_params: i64,
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer
                .serialize(CsvRow {
                    layer: &row.name,
                    path: &row.path,
                    layer_type: &row.layer_type,
                    output_shape: format_shape(row),
                    params: row.params,
                    trainable_params: row.trainable_params,
                })
                .map_err(|e| InspectError::Render(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| InspectError::Render(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| InspectError::Render(e.to_string()))
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:>20}  {:>25} {:>15}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{DOUBLE_RULE}")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>20}  {:>25} {:>15}",
                row.name,
                format_shape(row),
                group_thousands(row.params)
            )?;
        }
        writeln!(f, "{DOUBLE_RULE}")?;
        writeln!(f, "Total params: {}", group_thousands(self.total_params))?;
        writeln!(f, "Trainable params: {}", group_thousands(self.trainable_params))?;
        writeln!(
            f,
            "Non-trainable params: {}",
            group_thousands(self.non_trainable_params())
        )?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Input size (MB): {:.2}", self.size.input_mb)?;
        writeln!(
            f,
            "Forward/backward pass size (MB): {:.2}",
            self.size.forward_backward_mb
        )?;
        writeln!(f, "Params size (MB): {:.2}", self.size.params_mb)?;
        writeln!(f, "Estimated Total Size (MB): {:.2}", self.size.total_mb)?;
        writeln!(f, "{RULE}")
    }
}

fn format_shape(row: &LayerRow) -> String {
    match &row.output_shape {
        Some(shape) => format!("{shape:?}"),
        None => "--".to_string(),
    }
}

/// `1234567` -> `1,234,567`
fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
