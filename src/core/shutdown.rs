use log::info;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinates shutdown of the manager task (and any other tasks the
/// embedding node registers).
pub struct ShutdownManager {
    pub(crate) shutdown_tx: broadcast::Sender<()>,
    pub(crate) _shutdown_rcv: broadcast::Receiver<()>,
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

pub struct Shutdown {
    pub(crate) shutdown_signal_rcv: broadcast::Receiver<()>,
}

impl ShutdownManager {
    pub fn init() -> ShutdownManager {
        let (shutdown_tx, shutdown_rcv) = broadcast::channel(1);
        Self {
            shutdown_tx,
            _shutdown_rcv: shutdown_rcv,
            handles: vec![],
        }
    }

    pub fn subscribe(&self) -> Shutdown {
        let shutdown = self.shutdown_tx.subscribe();
        Shutdown {
            shutdown_signal_rcv: shutdown,
        }
    }

    pub fn add_handle(&mut self, handle: JoinHandle<anyhow::Result<()>>) {
        self.handles.push(handle);
    }

    pub async fn stop(self) {
        info!("Starting shutdown");
        //the only subscriber may already be gone, which is fine
        let _ = self.shutdown_tx.send(());
        info!("Waiting for tasks to finish");
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => info!("Task finished successfully"),
                Ok(Err(e)) => info!("Task finished with error: {e}"),
                Err(e) => info!("Task panicked: {e}"),
            }
        }
    }
}
