// TCP server and main loop for the Waypoint dedicated server.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread**: non-blocking `accept()` loop; spawns a handshake
//   thread per new stream.
// - **Handshake threads**: wait (up to `HANDSHAKE_TIMEOUT`) for the `Hello`
//   and hand the connection to the main thread as `InternalEvent::Hello`.
//   A silent or misbehaving peer only ever blocks its own thread.
// - **Reader threads** (one per admitted client): decode `ClientMessage`
//   frames and forward them as `InternalEvent::MessageFrom`. EOF, a read
//   error, malformed JSON, or `Goodbye` ends the thread with
//   `InternalEvent::Disconnected`.
// - **Main thread**: owns the `ServerSession` (and through it the mission
//   lifecycle and every client's write half). It waits with `recv_timeout`,
//   bounded by the next scheduled lifecycle event. Client messages are
//   handed over with the current elapsed wall-clock milliseconds, and every
//   wake-up ends with `ServerSession::tick`. That is the lifecycle's only
//   timer.
//
// Shutdown: `ServerHandle::stop` clears `keep_running`; the main loop notices
// within one poll interval and returns.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use waypoint_mission::{ClientId, LifecycleConfig, MissionStore};
use waypoint_protocol::{ClientMessage, ServerMessage, recv, send};

use crate::session::ServerSession;

/// Longest the main loop sleeps before re-checking `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a new connection has to send its `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    Hello {
        stream: TcpStream,
        reader: BufReader<TcpStream>,
        protocol_version: u32,
        player_name: String,
        ai_controlled: bool,
    },
    MessageFrom {
        client_id: ClientId,
        message: ClientMessage,
    },
    Disconnected {
        client_id: ClientId,
    },
}

/// Handle returned by `start_server`.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for the main loop to exit.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!("server main loop panicked");
        }
    }
}

/// Configuration for starting a dedicated server.
pub struct ServerConfig {
    /// Listen port on 127.0.0.1. 0 lets the OS pick.
    pub port: u16,
    pub max_clients: usize,
    pub lifecycle: LifecycleConfig,
    /// Where missions are read from.
    pub missions: MissionStore,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 28000,
            max_clients: 16,
            lifecycle: LifecycleConfig::default(),
            missions: MissionStore::directory(PathBuf::from("missions")),
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping
/// it and the bound address.
pub fn start_server(mut config: ServerConfig) -> std::io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(("127.0.0.1", config.port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    if config.lifecycle.mission_rotation.is_empty() {
        config.lifecycle.mission_rotation = config.missions.list();
        debug!(
            "mission rotation from store: {:?}",
            config.lifecycle.mission_rotation
        );
    }

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_main = keep_running.clone();
    let thread = thread::Builder::new()
        .name("waypoint-main".into())
        .spawn(move || run_server(listener, config, keep_running_main))?;

    info!("waypoint server listening on {addr}");
    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

fn run_server(listener: TcpListener, config: ServerConfig, keep_running: Arc<AtomicBool>) {
    let mut session: ServerSession<BufWriter<TcpStream>> =
        ServerSession::new(config.lifecycle, config.missions, config.max_clients);
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || accept_loop(listener, tx_listener, keep_running_listener));

    let started = Instant::now();
    let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    session.load_initial_mission();

    while keep_running.load(Ordering::SeqCst) {
        let timeout = session
            .time_until_next_event(elapsed_ms())
            .map_or(POLL_INTERVAL, |ms| Duration::from_millis(ms).min(POLL_INTERVAL));

        match rx.recv_timeout(timeout) {
            Ok(event) => {
                let mut next = Some(event);
                while let Some(event) = next {
                    handle_event(&mut session, event, elapsed_ms(), &tx, &keep_running);
                    next = rx.try_recv().ok();
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        session.tick(elapsed_ms());
    }
    info!("waypoint server stopped");
}

fn accept_loop(listener: TcpListener, tx: Sender<InternalEvent>, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("connection from {peer}");
                if let Err(err) = stream.set_nonblocking(false) {
                    warn!("dropping connection from {peer}: {err}");
                    continue;
                }
                let tx_handshake = tx.clone();
                thread::spawn(move || {
                    if let Err(err) = handshake(stream, &tx_handshake) {
                        warn!("handshake with {peer} failed: {err}");
                    }
                });
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                error!("accept failed: {err}");
                break;
            }
        }
    }
}

fn handle_event(
    session: &mut ServerSession<BufWriter<TcpStream>>,
    event: InternalEvent,
    now_ms: u64,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::Hello {
            stream,
            reader,
            protocol_version,
            player_name,
            ai_controlled,
        } => {
            let admitted = admit(
                session,
                stream,
                reader,
                protocol_version,
                player_name,
                ai_controlled,
                tx,
                keep_running,
            );
            if let Err(err) = admitted {
                warn!("admitting client failed: {err}");
            }
        }
        InternalEvent::MessageFrom { client_id, message } => {
            session.handle_message(client_id, message, now_ms);
        }
        InternalEvent::Disconnected { client_id } => {
            session.remove_client(client_id);
        }
    }
}

/// Read the `Hello` off a new connection and pass it to the main thread.
fn handshake(stream: TcpStream, tx: &Sender<InternalEvent>) -> std::io::Result<()> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let ClientMessage::Hello {
        protocol_version,
        player_name,
        ai_controlled,
    } = recv::<_, ClientMessage>(&mut reader)?
    else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "first message was not Hello",
        ));
    };

    let hello = InternalEvent::Hello {
        stream,
        reader,
        protocol_version,
        player_name,
        ai_controlled,
    };
    if tx.send(hello).is_err() {
        debug!("server loop gone before handshake completed");
    }
    Ok(())
}

/// Admit or reject a client that said `Hello`, and start its reader.
#[allow(clippy::too_many_arguments)]
fn admit(
    session: &mut ServerSession<BufWriter<TcpStream>>,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    protocol_version: u32,
    player_name: String,
    ai_controlled: bool,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) -> std::io::Result<()> {
    let writer = BufWriter::new(stream.try_clone()?);
    match session.add_client(protocol_version, player_name, ai_controlled, writer) {
        Ok(client_id) => {
            stream.set_read_timeout(None)?;
            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || reader_loop(reader, client_id, tx_reader, keep_running_reader));
        }
        Err(reason) => {
            info!("rejecting client: {reason}");
            send(&mut BufWriter::new(stream), &ServerMessage::Rejected { reason })?;
        }
    }
    Ok(())
}

fn reader_loop(
    mut reader: BufReader<TcpStream>,
    client_id: ClientId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match recv::<_, ClientMessage>(&mut reader) {
            Ok(ClientMessage::Goodbye) => break,
            Ok(message) => {
                if tx.send(InternalEvent::MessageFrom { client_id, message }).is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!("client {} read ended: {err}", client_id.0);
                break;
            }
        }
    }
    if tx.send(InternalEvent::Disconnected { client_id }).is_err() {
        debug!("client {} disconnect not delivered; server loop gone", client_id.0);
    }
}
