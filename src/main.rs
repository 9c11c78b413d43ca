use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voice_turn::audio;
use voice_turn::voice::{AudioCapture, SpeakerSink, calculate_energy};
use voice_turn::{
    Config, PlaybackController, RelayMode, RelayServer, Session, SpeechSegment, TurnEvent,
};

/// Voice Turn - turn-taking voice client and relay
#[derive(Parser)]
#[command(name = "voice-turn", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Reply strategy
        #[arg(long, value_enum)]
        mode: Option<RelayMode>,
    },
    /// Run a voice session against a relay
    Connect {
        /// Relay WebSocket URL
        #[arg(long)]
        url: Option<String>,
        /// Do not let speech interrupt playback
        #[arg(long)]
        no_barge_in: bool,
        /// Reconnect after this many seconds when the channel closes
        #[arg(long)]
        reconnect_secs: Option<u64>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output through the codec and playback controller
    TestSpeaker,
    /// Write a tone as a WAV container
    Encode {
        /// Output file
        output: PathBuf,
        /// Tone length in seconds
        #[arg(long, default_value = "1.0")]
        seconds: f64,
        /// Tone frequency in Hz
        #[arg(long, default_value = "440.0")]
        frequency: f32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_turn=info",
        1 => "info,voice_turn=debug",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { host, port, mode } => serve(host, port, mode).await,
        Command::Connect {
            url,
            no_barge_in,
            reconnect_secs,
        } => connect(url, no_barge_in, reconnect_secs).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Encode {
            output,
            seconds,
            frequency,
        } => encode(&output, seconds, frequency),
    }
}

async fn serve(host: Option<String>, port: Option<u16>, mode: Option<RelayMode>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(mode) = mode {
        config.server.mode = mode;
    }
    config.validate()?;

    tracing::info!(mode = %config.server.mode, "starting relay server");

    let server = RelayServer::bind(&config.server).await?;
    server.serve(shutdown_signal()).await?;

    Ok(())
}

#[allow(clippy::future_not_send)]
async fn connect(
    url: Option<String>,
    no_barge_in: bool,
    reconnect_secs: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = url {
        config.client.url = url;
    }
    if no_barge_in {
        config.client.barge_in = false;
    }
    if let Some(secs) = reconnect_secs {
        config.client.reconnect = Some(Duration::from_secs(secs));
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    let session = Session::new(&config.client)?;
    session.run(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Device rate: {} Hz", capture.device_sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer()?;
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your default input device and levels.");

    Ok(())
}

/// Play a tone through encode, decode and the playback controller
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let tone = SpeechSegment::tone(440.0, Duration::from_secs(2), 0.3);
    let container = audio::encode(&tone);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = PlaybackController::new(SpeakerSink::new()?, tx);

    let handle = controller.play(&container)?;
    println!("Playing {} ({} bytes)...", handle, container.len());

    let wait = container.duration() + Duration::from_secs(2);
    match tokio::time::timeout(wait, rx.recv()).await {
        Ok(Some(TurnEvent::PlaybackCompleted(done))) => {
            controller.complete(done);
        }
        _ => {
            println!("Playback did not report completion");
            controller.cancel_active();
        }
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Write a tone container for inspecting the wire format
fn encode(output: &Path, seconds: f64, frequency: f32) -> anyhow::Result<()> {
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|e| anyhow::anyhow!("invalid duration {seconds}: {e}"))?;

    let tone = SpeechSegment::tone(frequency, duration, 0.3);
    let container = audio::encode(&tone);
    std::fs::write(output, container.as_bytes())?;

    println!(
        "Wrote {} samples ({} bytes) to {}",
        tone.len(),
        container.len(),
        output.display()
    );

    Ok(())
}
