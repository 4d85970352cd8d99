use std::sync::Arc;

use grblhub::service::{self, ChannelSink};
use grblhub::{init_logging, FileConfigStore, GrblController, SerialOptions, SerialTransport};
use grblhub_core::{FsFileMonitor, ShellTaskRunner};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let store = Arc::new(FileConfigStore::load_or_default("grblhub.json")?);

    // Port and baud rate come from the command line, falling back to the
    // configuration file.
    let args: Vec<String> = std::env::args().collect();
    let serial = store.config().serial;
    let port = args.get(1).cloned().unwrap_or(serial.port);
    if port.is_empty() {
        anyhow::bail!("Usage: grblhub <port> [baudrate]");
    }
    let baudrate = match args.get(2) {
        Some(raw) => raw.parse()?,
        None => serial.baudrate,
    };

    let options = SerialOptions::new(port).with_baudrate(baudrate);
    let controller = GrblController::new(options, Box::new(SerialTransport::new()))
        .with_config(store)
        .with_task_runner(Arc::new(ShellTaskRunner))
        .with_file_monitor(Arc::new(FsFileMonitor::new("watch")));

    let handle = service::spawn(controller)?;

    // Console client: print every emitted event
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client_id = uuid::Uuid::new_v4().to_string();
    handle.add_connection(client_id, Box::new(ChannelSink::new(tx)));
    let printer = tokio::spawn(async move {
        while let Some((name, payload)) = rx.recv().await {
            println!("{} {}", name, payload);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown().await;
    printer.abort();

    Ok(())
}
