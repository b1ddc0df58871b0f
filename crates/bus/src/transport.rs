//! In-process connection halves
//!
//! A `Transport` is what a session loop reads frames from and writes
//! notifications to. Network front-ends pump socket data into one; tests
//! drive it through the matching `ClientEnd`.

use tokio::sync::mpsc;
use tracing::trace;

use crate::message::{ClientMessage, ServerMessage};

pub type FrameSender = mpsc::UnboundedSender<String>;
pub type FrameReceiver = mpsc::UnboundedReceiver<String>;
pub type ServerSender = mpsc::UnboundedSender<ServerMessage>;
pub type ServerReceiver = mpsc::UnboundedReceiver<ServerMessage>;

/// Cloneable handle for notifications back to the client
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: ServerSender,
}

impl Outbound {
    pub fn new(tx: ServerSender) -> Self {
        Self { tx }
    }

    /// Send a notification; false if the client has gone away
    pub fn send(&self, msg: ServerMessage) -> bool {
        trace!("◆ OUTBOUND: {:?}", msg);
        self.tx.send(msg).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Server half of a connection
#[derive(Debug)]
pub struct Transport {
    /// Raw inbound frames; `None` from `recv` means disconnected
    pub inbound: FrameReceiver,
    pub outbound: Outbound,
}

impl Transport {
    pub fn new(inbound: FrameReceiver, outbound: ServerSender) -> Self {
        Self {
            inbound,
            outbound: Outbound::new(outbound),
        }
    }

    /// Connected server and client halves
    pub fn pair() -> (Self, ClientEnd) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        (
            Self::new(frame_rx, server_tx),
            ClientEnd {
                sender: ClientSender { tx: frame_tx },
                receiver: server_rx,
            },
        )
    }
}

/// Client-side frame sender
#[derive(Debug, Clone)]
pub struct ClientSender {
    tx: FrameSender,
}

impl ClientSender {
    /// Send a raw frame
    #[allow(clippy::result_large_err)]
    pub fn send_raw(
        &self,
        frame: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<String>> {
        self.tx.send(frame.into())
    }

    /// Serialize and send an envelope
    #[allow(clippy::result_large_err)]
    pub fn send(&self, msg: &ClientMessage) -> Result<(), mpsc::error::SendError<String>> {
        let frame = serde_json::to_string(msg).unwrap_or_default();
        self.send_raw(frame)
    }
}

/// Client half of a connection
#[derive(Debug)]
pub struct ClientEnd {
    sender: ClientSender,
    receiver: ServerReceiver,
}

impl ClientEnd {
    pub fn sender(&self) -> &ClientSender {
        &self.sender
    }

    #[allow(clippy::result_large_err)]
    pub fn send(&self, msg: &ClientMessage) -> Result<(), mpsc::error::SendError<String>> {
        self.sender.send(msg)
    }

    #[allow(clippy::result_large_err)]
    pub fn send_raw(
        &self,
        frame: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<String>> {
        self.sender.send_raw(frame)
    }

    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.receiver.recv().await
    }

    /// Split into independently owned halves; dropping the sender disconnects
    pub fn split(self) -> (ClientSender, ServerReceiver) {
        (self.sender, self.receiver)
    }
}
