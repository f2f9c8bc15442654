//! Principal component reduction of the wide table.
//!
//! Gaps are filled with the column mean, columns are standard-scaled, and the
//! leading components come from an SVD of the scaled matrix.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::DMatrix;

use super::pivot::{WideRow, PARAMETERS};

// ---

type Features = [f64; PARAMETERS.len()];

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    // ---
    /// Per wide row, one score per kept component.
    pub scores: Vec<Vec<f64>>,
    /// Per kept component, one weight per entry of [`PARAMETERS`].
    pub loadings: Vec<Features>,
    pub explained_variance_ratio: Vec<f64>,
}

impl Reduction {
    pub fn components(&self) -> usize {
        self.loadings.len()
    }
}

/// Replace each missing value with the mean of its column. A column with no
/// values at all becomes zeros.
pub fn impute_means(rows: &[WideRow]) -> Vec<Features> {
    // ---
    let mut means = [0.0; PARAMETERS.len()];
    for (col, mean) in means.iter_mut().enumerate() {
        let present: Vec<f64> = rows.iter().filter_map(|r| r.values[col]).collect();
        if !present.is_empty() {
            *mean = present.iter().sum::<f64>() / present.len() as f64;
        }
    }

    rows.iter()
        .map(|row| {
            let mut filled = means;
            for (slot, value) in filled.iter_mut().zip(row.values) {
                if let Some(v) = value {
                    *slot = v;
                }
            }
            filled
        })
        .collect()
}

/// Center each column and divide by its population standard deviation.
/// Constant columns are only centered.
pub fn standardize(matrix: &mut [Features]) {
    // ---
    if matrix.is_empty() {
        return;
    }
    let n = matrix.len() as f64;
    for col in 0..PARAMETERS.len() {
        let mean = matrix.iter().map(|r| r[col]).sum::<f64>() / n;
        let var = matrix.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
        for row in matrix.iter_mut() {
            row[col] = (row[col] - mean) / scale;
        }
    }
}

/// Project the wide table onto its first `components` principal axes.
///
/// Returns `None` with fewer than two rows. The component count is capped
/// by the matrix rank bound. Each axis is signed so its largest weight is
/// positive.
pub fn reduce(rows: &[WideRow], components: usize) -> Option<Reduction> {
    // ---
    if rows.len() < 2 {
        return None;
    }

    let mut data = impute_means(rows);
    standardize(&mut data);

    let x = DMatrix::from_fn(data.len(), PARAMETERS.len(), |i, j| data[i][j]);
    let svd = x.svd(false, true);
    let v_t = svd.v_t?;
    let sigma = svd.singular_values;

    let mut order: Vec<usize> = (0..sigma.len()).collect();
    order.sort_by(|a, b| sigma[*b].total_cmp(&sigma[*a]));
    let total: f64 = sigma.iter().map(|s| s * s).sum();

    let mut loadings = Vec::new();
    let mut explained_variance_ratio = Vec::new();
    for &idx in order.iter().take(components) {
        let mut axis = [0.0; PARAMETERS.len()];
        for (j, w) in axis.iter_mut().enumerate() {
            *w = v_t[(idx, j)];
        }
        let dominant = axis.iter().fold(0.0f64, |m, w| if w.abs() > m.abs() { *w } else { m });
        if dominant < 0.0 {
            axis.iter_mut().for_each(|w| *w = -*w);
        }
        loadings.push(axis);
        explained_variance_ratio.push(if total > 0.0 { sigma[idx].powi(2) / total } else { 0.0 });
    }

    let scores: Vec<Vec<f64>> = data
        .iter()
        .map(|row| {
            loadings
                .iter()
                .map(|axis| row.iter().zip(axis).map(|(x, w)| x * w).sum::<f64>())
                .collect()
        })
        .collect();

    Some(Reduction {
        scores,
        loadings,
        explained_variance_ratio,
    })
}

fn component_names(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("PC{i}")).collect()
}

/// Wide rows with their component scores appended.
pub fn write_scores(path: &Path, rows: &[WideRow], reduction: &Reduction) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header: Vec<String> = ["datetime_utc", "location_id", "timezone"]
        .into_iter()
        .chain(PARAMETERS)
        .map(String::from)
        .collect();
    header.extend(component_names(reduction.components()));
    csv.write_record(&header)?;

    for (row, scores) in rows.iter().zip(&reduction.scores) {
        let mut record = vec![
            row.datetime_utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            row.location_id.to_string(),
            row.timezone.clone().unwrap_or_default(),
        ];
        record.extend(row.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        record.extend(scores.iter().map(|s| s.to_string()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// One row per parameter, one column per component.
pub fn write_loadings(path: &Path, reduction: &Reduction) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["parameter".to_string()];
    header.extend(component_names(reduction.components()));
    csv.write_record(&header)?;

    for (j, parameter) in PARAMETERS.iter().enumerate() {
        let mut record = vec![parameter.to_string()];
        record.extend(reduction.loadings.iter().map(|axis| axis[j].to_string()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_explained_variance(path: &Path, reduction: &Reduction) -> Result<()> {
    // ---
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    csv.write_record(["component", "explained_variance_ratio"])?;
    for (name, ratio) in component_names(reduction.components())
        .iter()
        .zip(&reduction.explained_variance_ratio)
    {
        csv.write_record([name.clone(), ratio.to_string()])?;
    }
    csv.flush()?;
    Ok(())
}
