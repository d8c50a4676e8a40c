//! Control channel server: line-delimited JSON over TCP, one reply per request.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use epochctl_core::{
    credential::authorize,
    wire::{decode_line, write_frame},
    Credential, Frame, FrameReader, RequestEnvelope, ResponseEnvelope,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    errors::{DaemonError, Result},
    event_system::EVENT_REJECTED,
    scheduler::EpochScheduler,
};

/// Handle to stop the control channel. Dropping it also stops the server.
pub struct ServerHandle {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address (useful when port 0 was requested).
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Signal every loop to stop, then wait for the accept loop and open connections to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(true);
        self.task.await.map_err(|e| DaemonError::internal(format!("control channel task: {e}")))
    }
}

pub struct ControlServer {
    scheduler: EpochScheduler,
    credential: Option<Credential>,
    max_frame_len: usize,
}

impl ControlServer {
    pub fn new(scheduler: EpochScheduler, credential: Option<Credential>, max_frame_len: usize) -> Self {
        Self { scheduler, credential, max_frame_len }
    }

    /// Bind `addr` and run the receive loop in the background.
    pub async fn bind(self, addr: &str) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let (stop, stop_rx) = watch::channel(false);
        info!(addr = %local, auth = self.credential.is_some(), "control channel listening");
        let task = tokio::spawn(Arc::new(self).accept_loop(listener, stop_rx));
        Ok(ServerHandle { addr: local, stop, task })
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut stop: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                acc = listener.accept() => match acc {
                    Ok((sock, peer)) => {
                        debug!(%peer, "controller connected");
                        let this = Arc::clone(&self);
                        let stop = stop.clone();
                        connections.spawn(async move { this.serve_connection(sock, peer, stop).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }
        drop(listener);
        while connections.join_next().await.is_some() {}
        info!("control channel stopped");
    }

    async fn serve_connection(&self, sock: TcpStream, peer: SocketAddr, mut stop: watch::Receiver<bool>) {
        let (rd, mut wr) = sock.into_split();
        let mut frames = FrameReader::new(rd, self.max_frame_len);
        loop {
            let frame = tokio::select! {
                biased;
                _ = stop.changed() => break,
                f = frames.next_frame() => f,
            };
            let reply = match frame {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => {
                    debug!(%peer, "controller disconnected");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "read failed");
                    break;
                }
            };
            if let Err(e) = write_frame(&mut wr, &reply).await {
                warn!(%peer, error = %e, "reply failed");
                break;
            }
        }
    }

    /// Produce the reply for one inbound frame. Never fails; every problem becomes an ERROR reply.
    pub fn handle_frame(&self, frame: Frame) -> ResponseEnvelope {
        match frame {
            Frame::Line(line) => self.handle_line(&line),
            Frame::Rejected(e) => {
                warn!(error = %e, "unusable frame");
                ResponseEnvelope::error(vec![format!("Exception during decoding: {e}")])
            }
        }
    }

    pub fn handle_line(&self, line: &str) -> ResponseEnvelope {
        let envelope: RequestEnvelope = match decode_line(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed envelope");
                return ResponseEnvelope::error(vec![format!("Exception during decoding: {e}")]);
            }
        };
        if let Err(e) = authorize(self.credential.as_ref(), envelope.credentials.as_ref()) {
            warn!("request rejected: wrong credentials");
            self.scheduler.events().publish(EVENT_REJECTED, "wrong credentials");
            return ResponseEnvelope::error(vec![e.to_string()]);
        }
        match self.scheduler.enqueue(envelope.into_requests()) {
            Ok(messages) => ResponseEnvelope::ok(messages),
            Err(e) => ResponseEnvelope::error(vec![format!("Exception during enqueuing: {e}")]),
        }
    }
}
