use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use tofcan_lib::io::slcan::list_serial_ports;
use tofcan_lib::logging::{init_file_logging, stop_file_logging};
use tofcan_lib::{tlog, IoError, SensorConfig, SensorEvent, SensorSession, TimedMeasurement};

/// Stream distance measurements from an AFBR-S50 sensor over CAN.
#[derive(Parser, Debug)]
#[command(name = "tofcan", version, about)]
struct Args {
    /// Serial port of the slcan adapter (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// TOML config file (default: <config dir>/tofcan/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Print one JSON object per measurement
    #[arg(long)]
    json: bool,

    /// Also write the log to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Read from a SocketCAN interface (e.g., can0) instead of a serial adapter
    #[cfg(target_os = "linux")]
    #[arg(long)]
    socketcan: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tlog!("[tofcan] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), IoError> {
    if args.list_ports {
        for port in list_serial_ports()? {
            let usb_id = port
                .usb_id
                .map(|(vid, pid)| format!("{:04x}:{:04x}", vid, pid))
                .unwrap_or_default();
            println!(
                "{}\t{}\t{}\t{}",
                port.name,
                port.kind,
                usb_id,
                port.description.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    if let Some(duration) = args.duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(IoError::configuration(format!("invalid duration: {}", duration)));
        }
    }

    if let Some(dir) = &args.log_dir {
        init_file_logging(dir)?;
    }

    let mut config = match &args.config {
        Some(path) => SensorConfig::load(path)?,
        None => SensorConfig::load_or_default()?,
    };
    if let Some(port) = &args.port {
        config.port = port.clone();
    }

    let result = stream_measurements(&args, config).await;
    stop_file_logging();
    result
}

async fn stream_measurements(args: &Args, config: SensorConfig) -> Result<(), IoError> {
    let mut session = open_session(args, config).await?;
    session.start()?;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut deadline => {
                tlog!("[tofcan] Duration elapsed");
                break Ok(());
            }
            _ = &mut ctrl_c => {
                tlog!("[tofcan] Interrupted");
                break Ok(());
            }
            event = session.next_event() => match event {
                Some(SensorEvent::Measurement(m)) => print_measurement(&m, args.json),
                Some(SensorEvent::Fatal(e)) => break Err(e),
                Some(event) if event.is_terminal() => break Ok(()),
                // Framing errors are already logged by the read loop
                Some(_) => {}
                None => break Ok(()),
            },
        }
    };

    let closed = session.close().await;
    result.and(closed)
}

#[cfg_attr(not(target_os = "linux"), allow(unused_variables))]
async fn open_session(args: &Args, config: SensorConfig) -> Result<SensorSession, IoError> {
    #[cfg(target_os = "linux")]
    {
        if let Some(interface) = &args.socketcan {
            return SensorSession::open_socketcan(config, interface);
        }
    }
    SensorSession::connect_serial(config).await
}

fn print_measurement(m: &TimedMeasurement, json: bool) {
    if json {
        match serde_json::to_string(m) {
            Ok(line) => println!("{}", line),
            Err(e) => tlog!("[tofcan] Failed to serialize measurement: {}", e),
        }
        return;
    }

    let time = i64::try_from(m.timestamp_us)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_micros)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
        .unwrap_or_default();
    let r = &m.measurement;
    println!(
        "{}  {:>9.4} m  amp {:>8.2}  q {:>3}  status {:>6} ({:?})",
        time,
        r.distance_m,
        r.amplitude,
        r.quality,
        r.status,
        r.status_kind()
    );
}
