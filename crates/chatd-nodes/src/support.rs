use tokio::sync::{mpsc, Mutex};

use chatd_workflow::Chunk;

/// One node's named input queue: the sender half is handed out via
/// `Node::input_sender`, the receiver is drained by `run`. Wrapped in a
/// `tokio::sync::Mutex` since `run` takes `&self` through an `Arc` and
/// needs interior mutability to claim the receiver.
pub struct InputChannel {
    name: &'static str,
    tx: mpsc::UnboundedSender<Chunk>,
    rx: Mutex<mpsc::UnboundedReceiver<Chunk>>,
}

impl InputChannel {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Chunk> {
        self.tx.clone()
    }

    pub async fn recv(&self) -> Option<Chunk> {
        self.rx.lock().await.recv().await
    }
}
