//! Log-frequency spectrogram image for raw-stem output

use crate::audio::AudioBuffer;
use crate::config::PlotConfig;
use crate::error::{LoopError, Result as LoopResult};
use crate::spectral::{magnitude_spectrogram, stft};
use ndarray::Array2;
use plotters::prelude::*;
use std::path::Path;

/// Magnitude grid resampled to `columns x rows` cells
///
/// Rows are log-spaced from `min_freq_hz` to Nyquist; each cell holds the
/// loudest bin/frame that falls inside it, in dB below the loudest cell
/// (0 = loudest, `-top_db` = floor).
#[derive(Debug, Clone)]
pub struct SpectrogramGrid {
    pub db: Array2<f32>,
    /// Row edges in Hz, `rows + 1` values
    pub freq_edges: Vec<f64>,
    pub duration_sec: f64,
}

fn plot_err<E: std::fmt::Debug>(context: &str) -> impl FnOnce(E) -> LoopError + '_ {
    move |e| LoopError::PlotError(format!("{}: {:?}", context, e))
}

/// Compute the display grid for a buffer
pub fn spectrogram_grid(buffer: &AudioBuffer, config: &PlotConfig) -> LoopResult<SpectrogramGrid> {
    if buffer.is_empty() {
        return Err(LoopError::EmptyInput);
    }

    let sr = buffer.sample_rate();
    let data = stft(buffer.samples(), config.n_fft, config.hop_length, "hann", sr);
    let mag = magnitude_spectrogram(&data);
    let (n_bins, n_frames) = (mag.shape()[0], mag.shape()[1]);

    let nyquist = sr as f64 / 2.0;
    let min_freq = (config.min_freq_hz as f64).min(nyquist / 2.0);
    let rows = config.freq_rows;
    let columns = (config.width as usize).min(n_frames).max(1);

    let ratio = (nyquist / min_freq).powf(1.0 / rows as f64);
    let freq_edges: Vec<f64> = (0..=rows).map(|r| min_freq * ratio.powi(r as i32)).collect();

    let mut cells = Array2::<f32>::zeros((columns, rows));
    let bin_hz = sr as f64 / config.n_fft as f64;
    for bin in 1..n_bins {
        let freq = bin as f64 * bin_hz;
        if freq < min_freq {
            continue;
        }
        let row = (((freq / min_freq).ln() / ratio.ln()) as usize).min(rows - 1);
        for frame in 0..n_frames {
            let col = (frame * columns / n_frames).min(columns - 1);
            let m = mag[[bin, frame]];
            if m > cells[[col, row]] {
                cells[[col, row]] = m;
            }
        }
    }

    let peak = cells.iter().copied().fold(0.0f32, f32::max);
    let floor = -config.top_db.abs();
    let db = cells.map(|&m| {
        if peak <= 0.0 || m <= 0.0 {
            floor
        } else {
            (20.0 * (m / peak).log10()).max(floor)
        }
    });

    Ok(SpectrogramGrid {
        db,
        freq_edges,
        duration_sec: buffer.duration_sec() as f64,
    })
}

/// Black to red to yellow to white heat colour for `t` in [0, 1]
fn heat_color(t: f32) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let channel = |x: f32| (x.clamp(0.0, 1.0) * 255.0) as u8;
    RGBColor(channel(t * 3.0), channel(t * 3.0 - 1.0), channel(t * 3.0 - 2.0))
}

/// Render the log-frequency vs. time magnitude image to a PNG
pub fn render_spectrogram(buffer: &AudioBuffer, path: &Path, config: &PlotConfig) -> LoopResult<()> {
    let grid = spectrogram_grid(buffer, config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (columns, rows) = (grid.db.shape()[0], grid.db.shape()[1]);
    let floor = -config.top_db.abs();
    let col_sec = grid.duration_sec / columns as f64;
    let min_freq = grid.freq_edges[0];
    let max_freq = grid.freq_edges[rows];

    let root = BitMapBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&BLACK)
        .map_err(plot_err("Failed to fill plot background"))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(0)
        .build_cartesian_2d(0f64..grid.duration_sec, (min_freq..max_freq).log_scale())
        .map_err(plot_err("Failed to build chart"))?;

    chart
        .draw_series(grid.db.indexed_iter().map(|((col, row), &db)| {
            let x0 = col as f64 * col_sec;
            let x1 = x0 + col_sec;
            let color = heat_color(1.0 - db / floor);
            Rectangle::new(
                [(x0, grid.freq_edges[row]), (x1, grid.freq_edges[row + 1])],
                color.filled(),
            )
        }))
        .map_err(plot_err("Failed to draw spectrogram"))?;

    root.present()
        .map_err(plot_err("Failed to write spectrogram image"))?;

    tracing::info!(path = %path.display(), columns, rows, "Rendered spectrogram");
    Ok(())
}
