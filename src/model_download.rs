use std::{
    ffi::OsString,
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const HANDPOSE_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
const HANDPOSE_MODEL_URL: &str = "https://github.com/opencv/opencv_zoo/raw/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx";
const PARTIAL_EXTENSION: &str = "download";
const CHUNK_SIZE: usize = 16 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn default_handpose_model_path() -> PathBuf {
    PathBuf::from("models").join(HANDPOSE_MODEL_FILENAME)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent,
    Started { total: Option<u64> },
    Progress { downloaded: u64, total: Option<u64> },
    Finished,
}

/// A zero-length file is treated as missing.
fn model_on_disk(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// `model.onnx` downloads into `model.onnx.download`.
fn partial_path(model_path: &Path) -> PathBuf {
    let mut name = model_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(HANDPOSE_MODEL_FILENAME));
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    model_path.with_file_name(name)
}

/// Makes sure the hand-pose model exists at `model_path`, fetching it when missing.
///
/// The download streams into `<name>.download` and is renamed into place only once
/// complete, so an interrupted fetch never leaves a truncated model behind.
pub fn ensure_handpose_model_ready<F>(model_path: &Path, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_on_disk(model_path) {
        log::debug!("handpose model found at {}", model_path.display());
        on_event(ModelDownloadEvent::AlreadyPresent);
        on_event(ModelDownloadEvent::Finished);
        return Ok(());
    }

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let partial = partial_path(model_path);
    if partial.exists() {
        log::warn!("discarding partial model download {}", partial.display());
        fs::remove_file(&partial)
            .with_context(|| format!("failed to remove {}", partial.display()))?;
    }

    log::info!(
        "fetching handpose model from {HANDPOSE_MODEL_URL} into {}",
        model_path.display()
    );
    let mut bar = None;
    let result = fetch(HANDPOSE_MODEL_URL, &partial, &mut |event| {
        report_to_terminal(&mut bar, &event);
        on_event(event);
    });
    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    fs::rename(&partial, model_path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            partial.display(),
            model_path.display()
        )
    })?;
    on_event(ModelDownloadEvent::Finished);
    Ok(())
}

fn fetch(
    url: &str,
    dest: &Path,
    on_event: &mut dyn FnMut(ModelDownloadEvent),
) -> anyhow::Result<()> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build http client")?;
    let response = client
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { total });

    let mut file =
        fs::File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let written = copy_with_progress(response, &mut file, total, on_event)?;
    file.sync_all()
        .context("failed to flush downloaded model to disk")?;

    if let Some(expected) = total {
        if written != expected {
            bail!("model download truncated: got {written} of {expected} bytes");
        }
    }
    Ok(())
}

/// Copies `reader` into `writer`, reporting cumulative progress after every chunk.
fn copy_with_progress<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    total: Option<u64>,
    on_event: &mut dyn FnMut(ModelDownloadEvent),
) -> anyhow::Result<u64> {
    let mut downloaded = 0u64;
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut chunk)
            .context("failed while reading model bytes")?;
        if n == 0 {
            return Ok(downloaded);
        }
        writer
            .write_all(&chunk[..n])
            .context("failed while writing model to disk")?;
        downloaded += n as u64;
        on_event(ModelDownloadEvent::Progress { downloaded, total });
    }
}

fn report_to_terminal(bar: &mut Option<ProgressBar>, event: &ModelDownloadEvent) {
    match event {
        ModelDownloadEvent::Started { total } => *bar = Some(progress_bar(*total)),
        ModelDownloadEvent::Progress { downloaded, .. } => {
            if let Some(bar) = bar.as_ref() {
                bar.set_position(*downloaded);
            }
        }
        ModelDownloadEvent::Finished => {
            if let Some(bar) = bar.take() {
                bar.finish_with_message("handpose model ready");
            }
        }
        ModelDownloadEvent::AlreadyPresent => {}
    }
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    let (bar, template) = match total {
        Some(len) if len > 0 => (
            ProgressBar::new(len),
            "{spinner:.green} handpose model [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ),
        _ => (
            ProgressBar::new_spinner(),
            "{spinner:.green} handpose model {bytes}",
        ),
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=>-"));
    }
    if total.is_none() {
        bar.enable_steady_tick(Duration::from_millis(100));
    }
    bar
}
