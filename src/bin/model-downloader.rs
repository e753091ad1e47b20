// Fetches a Silero VAD model (ggml) for the model segmenter and, optionally, writes a
// session config that points at it.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;

use parley::{SegmenterKind, SessionOpts};

#[derive(Parser, Debug)]
#[command(name = "model-downloader")]
#[command(about = "Fetch a speech-detection model and wire it into a parley config")]
struct Args {
    /// List the models that can be fetched and exit.
    #[arg(long)]
    list: bool,

    /// Model to fetch.
    #[arg(long, default_value = "silero-v6.2.0")]
    name: String,

    /// Directory the model is stored in (created if missing).
    #[arg(long, default_value = "./models")]
    dir: PathBuf,

    /// Fetch again even if the model file is already present.
    #[arg(long)]
    force: bool,

    /// Session config to create or update so it runs the model segmenter with this model.
    #[arg(long = "write-config")]
    config_path: Option<PathBuf>,
}

struct VadModel {
    name: &'static str,
    file: &'static str,
}

const SOURCE: &str = "https://huggingface.co/ggml-org/whisper-vad/resolve/main";

const MODELS: &[VadModel] = &[
    VadModel {
        name: "silero-v5.1.2",
        file: "ggml-silero-v5.1.2.bin",
    },
    VadModel {
        name: "silero-v6.2.0",
        file: "ggml-silero-v6.2.0.bin",
    },
];

impl VadModel {
    fn find(name: &str) -> Option<&'static VadModel> {
        MODELS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    fn url(&self) -> String {
        format!("{SOURCE}/{}", self.file)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        for model in MODELS {
            println!("{}", model.name);
        }
        return Ok(());
    }

    let model = VadModel::find(&args.name).with_context(|| {
        format!("unknown model '{}'; run with --list to see the choices", args.name)
    })?;

    fs::create_dir_all(&args.dir)
        .with_context(|| format!("failed to create {}", args.dir.display()))?;
    let model_path = args.dir.join(model.file);

    if model_path.exists() && !args.force {
        println!("using existing {}", model_path.display());
    } else {
        let bytes = fetch(model, &model_path)?;
        println!("saved {} ({bytes} bytes)", model_path.display());
    }

    check_model(&model_path)?;

    match &args.config_path {
        Some(config_path) => {
            write_config(config_path, &model_path)?;
            println!("updated {}", config_path.display());
            println!("run with: parley-client --config {}", config_path.display());
        }
        None => println!(
            "run with: parley-client --segmenter model --vad-model {}",
            model_path.display()
        ),
    }
    Ok(())
}

fn fetch(model: &VadModel, dest: &Path) -> Result<u64> {
    let url = model.url();
    println!("fetching {url}");

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("parley-model-downloader/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let resp = client
        .get(&url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("failed to fetch {url}"))?;

    let expected = resp.content_length();
    let progress = match expected {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} {bytes}/{total_bytes} {wide_bar} {eta}")
            .context("invalid progress template")?,
    );

    let stored = store(progress.wrap_read(resp), expected, dest);
    progress.finish_and_clear();
    stored
}

/// Stream `reader` into `dest` atomically.
///
/// The bytes land in a temp file next to `dest` that only replaces it once the whole body
/// has arrived and matches the advertised length. Any failure leaves `dest` untouched.
fn store(mut reader: impl Read, expected: Option<u64>, dest: &Path) -> Result<u64> {
    let dir = dest
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temp file in {}", dir.display()))?;

    let written = io::copy(&mut reader, tmp.as_file_mut()).context("download interrupted")?;
    match expected {
        Some(expected) if written != expected => {
            bail!("download truncated: got {written} of {expected} bytes")
        }
        _ => {}
    }
    if written == 0 {
        bail!("server returned an empty model");
    }

    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .with_context(|| format!("failed to move model into {}", dest.display()))?;
    Ok(written)
}

/// Make sure the model can actually drive the segmenter before pointing a config at it.
#[cfg(feature = "whisper-vad")]
fn check_model(path: &Path) -> Result<()> {
    let path_str = path.to_str().context("model path is not valid UTF-8")?;
    parley::segmenter::WhisperVadProbability::new(path_str, &Default::default())
        .with_context(|| format!("{} is not a usable VAD model", path.display()))?;
    Ok(())
}

#[cfg(not(feature = "whisper-vad"))]
fn check_model(path: &Path) -> Result<()> {
    let len = fs::metadata(path)?.len();
    if len == 0 {
        bail!("{} is empty", path.display());
    }
    println!("note: build with the `whisper-vad` feature to run the model segmenter");
    Ok(())
}

/// Point `config_path` at the model, keeping any options already in it.
fn write_config(config_path: &Path, model_path: &Path) -> Result<SessionOpts> {
    let mut opts = if config_path.exists() {
        SessionOpts::from_json_file(config_path)?
    } else {
        SessionOpts::default()
    };

    opts.segmenter.kind = SegmenterKind::Model;
    opts.segmenter.vad_model_path = Some(model_path.display().to_string());
    opts.to_json_file(config_path)?;
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn models_are_found_by_name() {
        let model = VadModel::find("Silero-V6.2.0").expect("known model");
        assert_eq!(model.file, "ggml-silero-v6.2.0.bin");
        assert!(model.url().ends_with("/ggml-silero-v6.2.0.bin"));
        assert!(VadModel::find("tiny.en").is_none());
    }

    #[test]
    fn args_default_to_the_newest_model() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["model-downloader"])?;
        assert_eq!(args.name, "silero-v6.2.0");
        assert!(args.config_path.is_none());
        Ok(())
    }

    #[test]
    fn store_replaces_the_destination_only_when_complete() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("model.bin");

        let written = store(Cursor::new(b"silero".to_vec()), Some(6), &dest)?;
        assert_eq!(written, 6);
        assert_eq!(fs::read(&dest)?, b"silero");

        let err = store(Cursor::new(b"sil".to_vec()), Some(6), &dest).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        assert_eq!(fs::read(&dest)?, b"silero");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1, "temp file left behind");
        Ok(())
    }

    struct Reset;

    impl Read for Reset {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    #[test]
    fn interrupted_download_leaves_nothing_behind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("model.bin");

        let err = store(Reset, None, &dest).unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn config_is_pointed_at_the_model() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("parley.json");
        fs::write(&config, r#"{"segmenter": {"silence_hangover_ms": 500}}"#)?;

        write_config(&config, Path::new("models/ggml-silero-v6.2.0.bin"))?;

        let opts = SessionOpts::from_json_file(&config)?;
        assert_eq!(opts.segmenter.kind, SegmenterKind::Model);
        assert_eq!(
            opts.segmenter.vad_model_path.as_deref(),
            Some("models/ggml-silero-v6.2.0.bin")
        );
        assert_eq!(opts.segmenter.silence_hangover_ms, 500);
        Ok(())
    }
}
