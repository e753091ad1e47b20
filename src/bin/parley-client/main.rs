use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{error, info, warn};

mod transport;

use parley::devices::{CpalCapture, default_devices};
use parley::session::{EventReceiver, channel};
use parley::transport::Outbound;
use parley::{EventSender, SegmenterKind, Session, SessionEvent, SessionOpts};

use transport::WsTransport;

#[derive(Parser, Debug)]
#[command(name = "parley-client")]
#[command(about = "Hands-free voice chat over a WebSocket peer")]
struct Params {
    /// WebSocket URL of the conversational peer (ws:// or wss://).
    #[arg(long = "url", env = "PARLEY_URL", required_unless_present = "list_devices")]
    url: Option<String>,

    /// Opaque API key passed through in the auth handshake.
    #[arg(long = "api-key", env = "PARLEY_API_KEY")]
    api_key: Option<String>,

    /// Opaque caller identity passed through in the auth handshake.
    #[arg(long = "identity", env = "PARLEY_IDENTITY")]
    identity: Option<String>,

    /// JSON config file with session options. Flags override file values.
    #[arg(short = 'c', long = "config")]
    config_path: Option<String>,

    /// Speech segmentation strategy.
    #[arg(short = 's', long = "segmenter", value_enum)]
    segmenter: Option<SegmenterKind>,

    /// Path to a Silero VAD model (ggml) for the model segmenter.
    #[arg(short = 'v', long = "vad-model")]
    vad_model_path: Option<String>,

    /// List input devices and exit.
    #[arg(long = "list-devices", default_value_t = false)]
    list_devices: bool,
}

#[tokio::main]
async fn main() {
    parley::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "parley-client failed");
        eprintln!("parley-client: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if params.list_devices {
        for name in CpalCapture::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let url = params
        .url
        .clone()
        .ok_or_else(|| anyhow!("--url is required"))?;
    let opts = build_opts(&params)?;

    let (events, events_rx) = channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();

    // Audio devices are not `Send`, so the whole session lives on one blocking thread.
    let session_events = events.clone();
    let session =
        tokio::task::spawn_blocking(move || run_session(opts, session_events, events_rx, out_tx));

    match connect_async(url.as_str()).await {
        Ok((ws, _)) => {
            info!(%url, "connected");
            bridge(ws, out_rx, events).await;
        }
        Err(err) => {
            events.send(SessionEvent::TransportFailed(err.to_string()));
        }
    }

    session
        .await
        .context("session thread panicked")?
        .context("session failed")?;
    Ok(())
}

fn build_opts(params: &Params) -> Result<SessionOpts> {
    let mut opts = match &params.config_path {
        Some(path) => SessionOpts::from_json_file(path)
            .with_context(|| format!("failed to load config {path}"))?,
        None => SessionOpts::default(),
    };

    if let Some(api_key) = &params.api_key {
        opts.credentials.api_key = api_key.clone();
    }
    if let Some(identity) = &params.identity {
        opts.credentials.identity = identity.clone();
    }
    if let Some(kind) = params.segmenter {
        opts.segmenter.kind = kind;
    }
    if let Some(path) = &params.vad_model_path {
        opts.segmenter.vad_model_path = Some(path.clone());
    }

    opts.validate().context("invalid session options")?;
    Ok(opts)
}

fn run_session(
    opts: SessionOpts,
    events: EventSender,
    events_rx: EventReceiver,
    out_tx: mpsc::UnboundedSender<Outbound>,
) -> parley::Result<()> {
    let devices = default_devices(&opts, &events)?;
    let mut session = Session::new(opts, devices, WsTransport::new(out_tx))?;
    session.initialize()?;
    session.run(&events_rx)
}

/// Pump frames between the socket and the session until either side goes away.
async fn bridge<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sink, mut ws_stream) = ws.split();

    let writer_events = events.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if let Err(err) = ws_sink.send(message).await {
                writer_events.send(SessionEvent::TransportFailed(err.to_string()));
                return;
            }
        }

        // The session dropped its sender: close politely.
        if let Err(err) = ws_sink.close().await {
            warn!(error = %err, "failed to close websocket");
        }
    });

    if !events.send(SessionEvent::TransportOpened) {
        writer.abort();
        return;
    }

    loop {
        let event = tokio::select! {
            message = ws_stream.next() => match message {
                Some(Ok(Message::Text(text))) => SessionEvent::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => SessionEvent::Binary(bytes.to_vec()),
                Some(Ok(Message::Close(_))) | None => SessionEvent::TransportClosed,
                Some(Ok(_)) => continue,
                Some(Err(err)) => SessionEvent::TransportFailed(err.to_string()),
            },
            _ = tokio::signal::ctrl_c() => SessionEvent::HangUp,
        };

        let terminal = matches!(
            event,
            SessionEvent::TransportClosed | SessionEvent::TransportFailed(_) | SessionEvent::HangUp
        );
        if !events.send(event) || terminal {
            break;
        }
    }

    if let Err(err) = writer.await {
        warn!(error = %err, "websocket writer task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_require_url_unless_listing_devices() {
        let err = Params::try_parse_from(["parley-client"])
            .err()
            .expect("expected missing-args error");
        assert!(err.to_string().contains("--url"));

        let params = Params::try_parse_from(["parley-client", "--list-devices"])
            .expect("parse list params");
        assert!(params.list_devices);
    }

    #[test]
    fn flags_override_defaults() -> anyhow::Result<()> {
        let params = Params::try_parse_from([
            "parley-client",
            "--url",
            "ws://localhost:9000",
            "--api-key",
            "k",
            "--identity",
            "me",
            "--segmenter",
            "energy",
        ])?;

        let opts = build_opts(&params)?;
        assert_eq!(opts.credentials.api_key, "k");
        assert_eq!(opts.credentials.identity, "me");
        assert_eq!(opts.segmenter.kind, SegmenterKind::Energy);
        Ok(())
    }
}
