// Stand-in for the robot dog's command server
//
// Accepts any number of clients, parses each line into a Command and
// forwards it. Useful on the bench when the dog is switched off.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::base::Command;

/// Serve clients until the listener fails
pub async fn serve(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<Command>,
) -> std::io::Result<()> {
    info!("Simulated robot dog listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Client connected: {}", peer);
        tokio::spawn(handle_client(stream, peer, commands.clone()));
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(cmd) => {
                    info!("{} -> {}", peer, cmd);
                    if commands.send(cmd).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{} sent malformed line {:?}: {}", peer, line, e),
            },
            Ok(None) => {
                info!("Client disconnected: {}", peer);
                return;
            }
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                return;
            }
        }
    }
}
