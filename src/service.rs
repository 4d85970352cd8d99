//! Tokio wiring for the synchronous controller core.
//!
//! The controller mutates all protocol state through `&mut self`; this
//! module gives it the single logical executor the design requires. One
//! task owns the controller and multiplexes three inputs: a fast serial
//! read poll, the 250 ms periodic tick, and a request channel carrying
//! client commands and connection changes.

use std::time::Duration;

use grblhub_communication::GrblController;
use grblhub_core::{ControllerEvent, EventSink};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Serial read poll cadence.
const READ_POLL_MS: u64 = 10;
/// Periodic tick cadence: status fan-out and firmware polls.
const TICK_MS: u64 = 250;

/// Requests accepted by the controller task.
pub enum ServiceRequest {
    /// Dispatch a client command
    Command {
        client: String,
        name: String,
        args: Vec<Value>,
    },
    /// Register a client event sink
    AddConnection {
        id: String,
        sink: Box<dyn EventSink>,
    },
    /// Remove a client event sink
    RemoveConnection { id: String },
    /// Close the port and stop the task
    Shutdown,
}

/// Handle to a running controller task.
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceRequest>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Dispatch a command by name with positional JSON arguments.
    pub fn command(&self, client: impl Into<String>, name: impl Into<String>, args: Vec<Value>) {
        let _ = self.tx.send(ServiceRequest::Command {
            client: client.into(),
            name: name.into(),
            args,
        });
    }

    /// Attach a client sink.
    pub fn add_connection(&self, id: impl Into<String>, sink: Box<dyn EventSink>) {
        let _ = self.tx.send(ServiceRequest::AddConnection {
            id: id.into(),
            sink,
        });
    }

    /// Detach a client sink.
    pub fn remove_connection(&self, id: impl Into<String>) {
        let _ = self
            .tx
            .send(ServiceRequest::RemoveConnection { id: id.into() });
    }

    /// Close the port and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.tx.send(ServiceRequest::Shutdown);
        let _ = self.task.await;
    }
}

/// Open the controller's port and spawn the task that drives it.
pub fn spawn(mut controller: GrblController) -> grblhub_core::Result<ServiceHandle> {
    controller.open()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ServiceRequest>();
    let task = tokio::spawn(async move {
        let mut read_poll = tokio::time::interval(Duration::from_millis(READ_POLL_MS));
        let mut tick = tokio::time::interval(Duration::from_millis(TICK_MS));

        loop {
            tokio::select! {
                _ = read_poll.tick() => {
                    controller.pump_reads();
                }
                _ = tick.tick() => {
                    controller.tick();
                }
                request = rx.recv() => match request {
                    Some(ServiceRequest::Command { client, name, args }) => {
                        if let Err(e) = controller.command(&client, &name, &args) {
                            tracing::error!("Command '{}' failed: {}", name, e);
                        }
                    }
                    Some(ServiceRequest::AddConnection { id, sink }) => {
                        controller.add_connection(id, sink);
                    }
                    Some(ServiceRequest::RemoveConnection { id }) => {
                        controller.remove_connection(&id);
                    }
                    Some(ServiceRequest::Shutdown) | None => {
                        if controller.is_open() {
                            let _ = controller.close();
                        }
                        break;
                    }
                }
            }

            // A transport error closes the port from inside the controller
            if !controller.is_open() {
                tracing::warn!("Port closed, stopping controller task");
                break;
            }
        }
    });

    Ok(ServiceHandle { tx, task })
}

/// Sink forwarding events into an unbounded channel as `(name, payload)`.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<(String, Value)>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &ControllerEvent) {
        let _ = self.tx.send((event.name().to_string(), event.payload()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grblhub_communication::{SerialOptions, Transport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockTransport {
        open: AtomicBool,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Transport for MockTransport {
        fn open(&mut self, _options: &SerialOptions) -> grblhub_core::Result<()> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> grblhub_core::Result<()> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn write(&mut self, data: &[u8]) -> grblhub_core::Result<()> {
            self.written.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn try_read(&mut self, _buf: &mut [u8]) -> grblhub_core::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_spawn_dispatch_shutdown() {
        let transport = MockTransport::default();
        let written = transport.written.clone();
        let controller =
            GrblController::new(SerialOptions::new("/dev/null"), Box::new(transport));

        let handle = spawn(controller).expect("spawn service");

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.add_connection("console", Box::new(ChannelSink::new(tx)));
        handle.command("console", "homing", vec![]);

        // the attach snapshot is the first event delivered
        let (name, _) = rx.recv().await.expect("snapshot event");
        assert_eq!(name, "controller:state");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(written
            .lock()
            .unwrap()
            .iter()
            .any(|chunk| chunk.as_slice() == b"$H\n"));

        handle.shutdown().await;
    }
}
